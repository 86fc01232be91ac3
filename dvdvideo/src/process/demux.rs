//! Routing of demuxed packets to per-stream writers.

use log::Level;

use crate::process::writer::Writer;
use crate::structs::cell::CellListElem;
use crate::utils::errors::DemuxError;

/// Receiver of a VOB pass.
pub trait DemuxSink {
    /// Payload of stream `id`; times are milliseconds from the cell zero
    /// point.
    fn process_stream(&mut self, id: u8, data: &[u8], start: u32, end: u32) -> Result<(), DemuxError>;

    /// A navigation pack opened `cell`, starting at `start` and lasting
    /// `duration` milliseconds.
    fn set_boundary(&mut self, start: u32, duration: u32, cell: &CellListElem) -> Result<(), DemuxError>;
}

struct Slot {
    writer: Writer,
    command: String,
}

/// Up to 256 writers addressed by stream id, each with the fragment of the
/// mux command describing its output.
pub struct CompositeDemuxWriter {
    slots: Vec<Option<Slot>>,
    fail_level: Level,
}

impl Default for CompositeDemuxWriter {
    fn default() -> Self {
        Self::with_fail_level(Level::Error)
    }
}

impl std::fmt::Debug for CompositeDemuxWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.ids().map(|id| (id, self.command(id).unwrap_or_default())))
            .finish()
    }
}

impl CompositeDemuxWriter {
    pub fn with_fail_level(fail_level: Level) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(256).collect(),
            fail_level,
        }
    }

    /// Binds `writer` to `id`. An occupied slot keeps its writer and the
    /// new one is handed back.
    ///
    /// Output files are created on the first packet, so a file that cannot
    /// be opened is reported then and only that writer is dropped; streams
    /// that never carry data leave no files behind.
    pub fn add(&mut self, id: u8, mut writer: Writer, command: impl Into<String>) -> Result<(), Writer> {
        let slot = &mut self.slots[id as usize];
        if slot.is_some() {
            return Err(writer);
        }

        writer.set_fail_level(self.fail_level);
        *slot = Some(Slot {
            writer,
            command: command.into(),
        });
        Ok(())
    }

    /// Ids with a bound writer, ascending.
    pub fn ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(id, _)| id as u8)
    }

    pub fn writer(&self, id: u8) -> Option<&Writer> {
        self.slots[id as usize].as_ref().map(|slot| &slot.writer)
    }

    pub fn command(&self, id: u8) -> Option<&str> {
        self.slots[id as usize].as_ref().map(|slot| slot.command.as_str())
    }

    /// True when the writer bound to `id` created its payload file.
    pub fn file_exists(&self, id: u8) -> bool {
        self.writer(id).is_some_and(Writer::file_exists)
    }

    /// Finalizes every writer and keeps them bound.
    pub fn finalize(&mut self) -> Result<(), DemuxError> {
        let mut result = Ok(());
        for slot in self.slots.iter_mut().flatten() {
            if let Err(e) = slot.writer.finalize() {
                log::error!("Finalizing {}: {e}", slot.command.trim());
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    /// Finalizes and unbinds every writer.
    pub fn reset(&mut self) {
        if let Err(e) = self.finalize() {
            log::debug!("Reset after finalize error: {e}");
        }
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    /// Write failures cost the stream its writer. Timeline errors only
    /// reach here in strict mode and end the pass.
    fn handle(&mut self, id: u8, result: Result<(), DemuxError>) -> Result<(), DemuxError> {
        match result {
            Ok(()) => Ok(()),
            Err(e @ DemuxError::Timeline(_)) => Err(e),
            Err(e) => {
                log::error!("Stream {id:#04x}: {e}, dropping its output");
                self.slots[id as usize] = None;
                Ok(())
            }
        }
    }
}

impl DemuxSink for CompositeDemuxWriter {
    fn process_stream(&mut self, id: u8, data: &[u8], start: u32, end: u32) -> Result<(), DemuxError> {
        let Some(slot) = self.slots[id as usize].as_mut() else {
            return Ok(());
        };
        let result = slot.writer.process_stream(data, start, end);
        self.handle(id, result)
    }

    fn set_boundary(&mut self, start: u32, duration: u32, cell: &CellListElem) -> Result<(), DemuxError> {
        for id in 0..=u8::MAX {
            let Some(slot) = self.slots[id as usize].as_mut() else {
                continue;
            };
            let result = slot.writer.set_boundary(start, duration, cell);
            self.handle(id, result)?;
        }
        Ok(())
    }
}
