//! Data structures of the DVD-Video formats.
//!
//! IFO navigation tables, playback cells, navigation packets, program
//! stream headers, MPEG video headers and language names.

pub mod cell;
pub mod ifo;
pub mod language;
pub mod mpeg;
pub mod nav;
pub mod pes;
pub mod time;
