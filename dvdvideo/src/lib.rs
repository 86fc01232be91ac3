#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Demultiplexer for DVD-Video discs: IFO navigation, VOB program streams
//! and MPEG-2 elementary video.
//!
//! ### Disc Organization
//!
//! **Information files**: `VIDEO_TS.IFO` describes the Video Manager and
//! lists the title sets; each `VTS_nn_0.IFO` holds the program chains, cell
//! playback information and cell addresses of one title set.
//!
//! **Object files**: `VIDEO_TS.VOB`, `VTS_nn_0.VOB` and `VTS_nn_1..9.VOB` are
//! MPEG-2 program streams cut in 2048-byte sectors. Every VOBU starts with a
//! navigation pack whose PCI and DSI packets identify the cell being played.
//!
//! ### Timing
//!
//! Cells are laid out back to back in (VOB id, cell id) order; only cells
//! actually met in the stream advance the timeline. PES timestamps are
//! rebased on the first packet of each cell and handed to writers in
//! milliseconds.
//!
//! ## Quick Start
//!
//! 1. Load the disc with [`disc::DiscContent::open`]
//! 2. Open the object files of a pass with [`disc::blocks::VobSet::open`]
//! 3. Register per-stream writers in a [`process::demux::CompositeDemuxWriter`]
//! 4. Run the pass with [`process::vob::VobParser::run`]
//!
//! ```rust,no_run
//! use dvdvideo::disc::DiscContent;
//! use dvdvideo::disc::blocks::{VobDomain, VobSet};
//! use dvdvideo::process::demux::CompositeDemuxWriter;
//! use dvdvideo::process::vob::VobParser;
//! use dvdvideo::process::writer::Writer;
//! use std::path::Path;
//!
//! let mut disc = DiscContent::open(Path::new("/mnt/dvd"), log::Level::Error)?;
//! let vobs = VobSet::open(disc.video_ts(), 1, VobDomain::Title)?;
//!
//! let mut demux = CompositeDemuxWriter::default();
//! let _ = demux.add(0xE0, Writer::video(Path::new("VTS01"), 25.0), "");
//!
//! if let Some(title) = disc.title_mut(1) {
//!     let mut parser = VobParser::new(vobs);
//!     parser.run(title.cells_mut(false), &mut demux, |_| {})?;
//!     title.cells_mut(false).arrange();
//! }
//! demux.finalize()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Disc access.
///
/// - **Information files** ([`disc`]): `VIDEO_TS` lookup and the
///   per-title content model
/// - **Object files** ([`disc::blocks`]): sector access over the VOB files
///   of one domain
pub mod disc;

/// Processing of a title pass.
///
/// 1. **VOB demux** ([`process::vob`]): navigation packs, cell boundaries and
///    PES routing.
///
/// 2. **Writers** ([`process::demux`], [`process::writer`]): per-stream output
///    files and timecodes.
///
/// 3. **MPEG-2 video** ([`process::chunk`], [`process::m2v`]): start-code
///    chunking and presentation-order reconstruction.
///
/// 4. **Chapters** ([`process::chapters`]): chapter hierarchy of a pass.
pub mod process;

/// Data structures representing DVD-Video format components.
///
/// - **IFO tables** ([`structs::ifo`]): management tables, PGCs, cell addresses
/// - **Cells** ([`structs::cell`]): playback timeline
/// - **Navigation** ([`structs::nav`]): PCI and DSI packets
/// - **Program stream** ([`structs::pes`]): pack and PES headers
/// - **MPEG-2 video** ([`structs::mpeg`]): sequence, GOP and picture headers
/// - **Time** ([`structs::time`]): BCD playback times and frame rates
/// - **Languages** ([`structs::language`]): ISO 639 names
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Sector cursor** ([`utils::sector`]): bounds-checked sector reads
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading
/// - **Byte order** ([`utils::byteorder`]): fixed binary headers
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **WAV** ([`utils::wav`]): RIFF output for linear PCM
pub mod utils;
