use std::io::Write;

use anyhow::Result;
use clap::Parser as ClapParser;
use env_logger::fmt::Formatter;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

use cli::command::{Cli, Commands, LogFormat};
use cli::extract::cmd_extract;
use cli::info::cmd_info;

mod cli;
mod xml;

fn json_record(buf: &mut Formatter, record: &log::Record) -> std::io::Result<()> {
    writeln!(
        buf,
        "{{\"ts\":\"{}\",\"lvl\":\"{}\",\"msg\":\"{}\"}}",
        buf.timestamp(),
        record.level(),
        record.args().to_string().escape_default()
    )
}

/// Installs the global logger. Log lines go through the progress bars when
/// `--progress` is set.
fn init_logging(cli: &Cli, multi: &MultiProgress) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(cli.loglevel.to_level_filter());

    match cli.log_format {
        LogFormat::Plain => {
            builder.format_timestamp_secs();
        }
        LogFormat::Json => {
            builder.format(json_record);
        }
    }

    if cli.progress {
        LogWrapper::new(multi.clone(), builder.build()).try_init()?;
    } else {
        builder.try_init()?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let multi = MultiProgress::new();
    init_logging(&cli, &multi)?;

    let progress = cli.progress.then_some(&multi);
    match &cli.command {
        Commands::Extract(args) => cmd_extract(args, &cli, progress),
        Commands::Info(args) => cmd_info(args, &cli, progress),
    }
}
