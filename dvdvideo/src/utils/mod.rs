//! Supporting infrastructure shared by the parsers.
//!
//! Sector cursors, bit readers, binary header serialization, WAV output and
//! the error taxonomy.

pub mod bitstream_io;
pub mod byteorder;
pub mod errors;
pub mod sector;
pub mod wav;
