use std::io;
use std::path::PathBuf;

#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum DemuxError {
    #[error("Invalid packet at byte offset {offset:#x}")]
    InvalidPacket { offset: u64 },

    #[error("Marker bit check failed in {field} at byte offset {offset:#x}")]
    MarkerBit { offset: u64, field: &'static str },

    #[error("Read past the end of the sector at byte offset {offset:#x}")]
    TruncatedPacket { offset: u64 },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Cannot open {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unknown audio format {0}")]
    UnsupportedFormat(u8),

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// How far a [`DemuxError`] reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Skip the affected track only.
    Track,
    /// Stop the current title pass.
    Title,
    /// Reject the job before any processing.
    Configuration,
}

impl DemuxError {
    pub fn scope(&self) -> ErrorScope {
        match self {
            DemuxError::UnsupportedFormat(_) | DemuxError::FileOpen { .. } => ErrorScope::Track,
            DemuxError::FileNotFound(_) => ErrorScope::Configuration,
            DemuxError::InvalidPacket { .. }
            | DemuxError::MarkerBit { .. }
            | DemuxError::TruncatedPacket { .. }
            | DemuxError::Timeline(_)
            | DemuxError::Io(_) => ErrorScope::Title,
        }
    }

    /// True for errors that abort the title pass with unusable output.
    pub fn is_fatal_to_title(&self) -> bool {
        self.scope() == ErrorScope::Title && !self.is_benign_end()
    }

    /// True for errors after which the pass outputs are still usable.
    pub fn is_benign_end(&self) -> bool {
        matches!(self, DemuxError::TruncatedPacket { .. })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum IfoError {
    #[error("{file}: bad identifier, expected {expected}")]
    BadIdentifier {
        file: String,
        expected: &'static str,
    },

    #[error("{table} table truncated at byte offset {offset:#x}")]
    Truncated { table: &'static str, offset: usize },

    #[error("Title set {0} is not present on the disc")]
    MissingTitleSet(u16),

    #[error("No IFO found in {0}")]
    NotFound(PathBuf),

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error("{0}")]
    Io(#[from] io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum M2vError {
    #[error("Chunk buffer full: {pending} pending bytes exceed capacity {capacity}")]
    BufferFull { pending: usize, capacity: usize },

    #[error("Malformed {header} header: {source}")]
    Header {
        header: &'static str,
        #[source]
        source: io::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum TimelineError {
    #[error("Cell VOB {vob} / Cell {cell} has an infinite still time, keeping {frames} frames")]
    InfiniteStill { vob: u16, cell: u8, frames: u32 },

    #[error("There is more {kind} than indicated in the cell.")]
    CellOverrun { kind: &'static str },
}
