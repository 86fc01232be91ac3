use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    long_version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (dvdvideo ", env!("DVDVIDEO_VERSION"), ", built ", env!("BUILD_TIMESTAMP"), ")"
    ),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Demultiplex DVD-Video titles and menus into elementary streams with chapters",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Level at which recoverable anomalies become errors.
    pub fn fail_level(&self) -> log::Level {
        if self.strict {
            log::Level::Warn
        } else {
            log::Level::Error
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Demultiplex titles and menus into elementary streams, chapters and a
    /// mkvmerge script.
    Extract(ExtractArgs),

    /// Print the title sets, stream attributes and cell tables of a disc
    Info(InfoArgs),
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// VIDEO_TS directory or its parent.
    #[arg(short, long, value_name = "DIR")]
    pub input: PathBuf,

    /// Output directory, created when missing.
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Directory holding mkvmerge, used in the generated scripts.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub tools: PathBuf,

    /// Titles to extract: `title,menu,video,{audio,...},{subtitle,...};...`
    /// with menu and video as 0 or 1. Everything when omitted.
    #[arg(short, long, value_name = "LIST")]
    pub selection: Option<String>,

    /// Seed for chapter and edition UIDs. Derived from the clock when
    /// omitted.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// VIDEO_TS directory or its parent.
    #[arg(value_name = "DIR")]
    pub input: PathBuf,

    /// Output format.
    #[arg(long, value_enum, default_value_t = InfoFormat::Plain)]
    pub format: InfoFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum InfoFormat {
    /// Aligned text tables.
    Plain,
    /// YAML document.
    Yaml,
}
