//! Playback cells and the per-domain cell timeline.

use std::collections::BTreeMap;

use log::Level;

use crate::log_or_err;
use crate::structs::ifo::{CellAddress, Pgc, Pgcit};
use crate::utils::errors::TimelineError;

/// Cell identity. The cell number is kept wider than its on-disc byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub vob_id: u16,
    pub cell_id: u16,
}

impl CellKey {
    pub fn new(vob_id: u16, cell_id: impl Into<u16>) -> Self {
        Self {
            vob_id,
            cell_id: cell_id.into(),
        }
    }
}

/// One physical playback cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellListElem {
    pub vob_id: u16,
    pub cell_id: u8,
    pub start_sector: u32,
    pub last_sector: u32,
    pub nb_frames: u32,
    /// Milliseconds per frame.
    pub frame_dur: f64,
    pub is_still: bool,
    /// Set once the demuxer sees a navigation packet of this cell.
    pub found: bool,
    /// Nanoseconds, assigned by [`CellList::arrange`].
    pub start_time: u64,
    /// Nanoseconds, assigned by [`CellList::arrange`].
    pub duration: u64,
}

impl CellListElem {
    pub fn key(&self) -> CellKey {
        CellKey::new(self.vob_id, self.cell_id)
    }

    /// Cell duration in whole milliseconds, as handed to writers.
    pub fn duration_ms(&self) -> u32 {
        (self.nb_frames as f64 * self.frame_dur) as u32
    }

    fn duration_ns(&self) -> u64 {
        (self.nb_frames as f64 * self.frame_dur * 1_000_000.0) as u64
    }
}

/// Deduplicated cells of one domain, iterated in (VOB id, cell id) order.
///
/// That order is assumed to be the playback order of the domain; programs
/// referencing cells out of that order are not re-sequenced.
#[derive(Debug, Clone)]
pub struct CellList {
    cells: BTreeMap<CellKey, CellListElem>,
    fail_level: Level,
}

impl Default for CellList {
    fn default() -> Self {
        Self {
            cells: BTreeMap::new(),
            fail_level: Level::Error,
        }
    }
}

impl CellList {
    pub fn set_fail_level(&mut self, fail_level: Level) {
        self.fail_level = fail_level;
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn at(&self, vob_id: u16, cell_id: impl Into<u16>) -> Option<&CellListElem> {
        self.cells.get(&CellKey::new(vob_id, cell_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellListElem> {
        self.cells.values()
    }

    /// Inserts unless a cell with the same key exists. Returns whether the
    /// cell was added.
    pub fn insert(&mut self, cell: CellListElem) -> bool {
        match self.cells.entry(cell.key()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(cell);
                true
            }
        }
    }

    /// Flags the cell as observed and returns it.
    pub fn mark_found(&mut self, vob_id: u16, cell_id: impl Into<u16>) -> Option<&CellListElem> {
        let cell = self.cells.get_mut(&CellKey::new(vob_id, cell_id))?;
        cell.found = true;
        Some(cell)
    }

    /// Adds every cell referenced by `pgc`, resolving sector ranges
    /// through the cell address table.
    pub fn add_pgc(&mut self, pgc: &Pgc, c_adt: &[CellAddress]) -> Result<(), TimelineError> {
        for (position, playback) in pgc.cell_position.iter().zip(&pgc.cell_playback) {
            let key = CellKey::new(position.vob_id_nr, position.cell_nr);
            if self.cells.contains_key(&key) {
                continue;
            }

            let Some(address) = c_adt
                .iter()
                .find(|a| a.vob_id == position.vob_id_nr && a.cell_id == position.cell_nr)
            else {
                log::debug!(
                    "VOB {} / Cell {} is missing from the cell address table",
                    position.vob_id_nr,
                    position.cell_nr
                );
                continue;
            };

            let (mut nb_frames, mut frame_dur) = playback.playback_time.to_frames();
            let is_still = playback.still_time > 0;
            if playback.still_time == 0xFF {
                log_or_err!(
                    self,
                    Level::Warn,
                    TimelineError::InfiniteStill {
                        vob: position.vob_id_nr,
                        cell: position.cell_nr,
                        frames: nb_frames,
                    }
                );
            } else if is_still {
                log::warn!(
                    "VOB {} / Cell {} is a still of {} s",
                    position.vob_id_nr,
                    position.cell_nr,
                    playback.still_time
                );
                nb_frames = 1;
                frame_dur = playback.still_time as f64 * 1000.0;
            }

            self.cells.insert(
                key,
                CellListElem {
                    vob_id: position.vob_id_nr,
                    cell_id: position.cell_nr,
                    start_sector: address.start_sector,
                    last_sector: address.last_sector,
                    nb_frames,
                    frame_dur,
                    is_still,
                    found: false,
                    start_time: 0,
                    duration: 0,
                },
            );
        }
        Ok(())
    }

    pub fn add_pgcit(&mut self, pgcit: &Pgcit, c_adt: &[CellAddress]) -> Result<(), TimelineError> {
        pgcit
            .srps
            .iter()
            .try_for_each(|srp| self.add_pgc(&srp.pgc, c_adt))
    }

    /// Assigns cumulative start times in key order. Only found cells
    /// advance the running time.
    pub fn arrange(&mut self) {
        let mut running = 0u64;
        for cell in self.cells.values_mut() {
            cell.duration = cell.duration_ns();
            cell.start_time = running;
            if cell.found {
                running += cell.duration;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::ifo::{CellPlayback, CellPosition};
    use crate::structs::time::DvdTime;

    fn pgc(cells: &[(u16, u8, u8, u8)]) -> Pgc {
        Pgc {
            nr_of_cells: cells.len() as u8,
            cell_position: cells
                .iter()
                .map(|&(vob_id_nr, cell_nr, _, _)| CellPosition { vob_id_nr, cell_nr })
                .collect(),
            cell_playback: cells
                .iter()
                .map(|&(_, _, seconds, still_time)| CellPlayback {
                    playback_time: DvdTime::from_bytes([0, 0, seconds, 0x40]),
                    still_time,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn c_adt(cells: &[(u16, u8)]) -> Vec<CellAddress> {
        cells
            .iter()
            .enumerate()
            .map(|(i, &(vob_id, cell_id))| CellAddress {
                vob_id,
                cell_id,
                start_sector: i as u32 * 10,
                last_sector: i as u32 * 10 + 9,
            })
            .collect()
    }

    #[test]
    fn deduplicates_cells_across_pgcs() -> anyhow::Result<()> {
        let adt = c_adt(&[(1, 1), (1, 2), (2, 1)]);
        let mut list = CellList::default();
        list.add_pgc(&pgc(&[(2, 1, 0x01, 0), (1, 1, 0x02, 0)]), &adt)?;
        list.add_pgc(&pgc(&[(1, 1, 0x09, 0), (1, 2, 0x03, 0)]), &adt)?;

        assert_eq!(list.len(), 3);
        // first reference wins
        assert_eq!(list.at(1, 1u8).map(|c| c.nb_frames), Some(50));
        assert_eq!(list.at(2, 1u8).map(|c| c.start_sector), Some(20));
        assert!(list.at(3, 1u8).is_none());

        let order: Vec<_> = list.iter().map(|c| (c.vob_id, c.cell_id)).collect();
        assert_eq!(order, vec![(1, 1), (1, 2), (2, 1)]);
        Ok(())
    }

    #[test]
    fn cells_without_an_address_are_skipped() -> anyhow::Result<()> {
        let mut list = CellList::default();
        list.add_pgc(&pgc(&[(9, 9, 0x02, 0), (1, 1, 0x01, 0)]), &c_adt(&[(1, 1)]))?;
        assert!(list.at(9, 9u8).is_none());
        assert_eq!(list.len(), 1);

        // a later PGC with a resolvable address still adds it
        list.add_pgc(&pgc(&[(9, 9, 0x02, 0)]), &c_adt(&[(1, 1), (9, 9)]))?;
        assert_eq!(list.at(9, 9u8).map(|c| (c.start_sector, c.last_sector)), Some((10, 19)));
        Ok(())
    }

    #[test]
    fn arrange_sums_found_durations() -> anyhow::Result<()> {
        let adt = c_adt(&[(1, 1), (1, 2), (1, 3), (2, 1)]);
        let mut list = CellList::default();
        list.add_pgc(
            &pgc(&[(1, 1, 0x02, 0), (1, 2, 0x03, 0), (1, 3, 0x04, 0), (2, 1, 0x01, 0)]),
            &adt,
        )?;
        list.mark_found(1, 1u8);
        list.mark_found(1, 3u8);
        list.mark_found(2, 1u8);
        list.arrange();

        let cells: Vec<_> = list.iter().collect();
        let mut expected = 0u64;
        for cell in &cells {
            assert_eq!(cell.start_time, expected);
            assert_eq!(
                cell.duration,
                (cell.nb_frames as f64 * cell.frame_dur * 1e6) as u64
            );
            if cell.found {
                expected += cell.duration;
            }
        }
        assert_eq!(cells[1].start_time, 2_000_000_000);
        assert_eq!(cells[2].start_time, 2_000_000_000);
        assert_eq!(cells[3].start_time, 6_000_000_000);

        // re-running starts from zero again
        list.arrange();
        assert_eq!(list.at(2, 1u8).map(|c| c.start_time), Some(6_000_000_000));
        Ok(())
    }

    #[test]
    fn still_cells() -> anyhow::Result<()> {
        let adt = c_adt(&[(1, 1), (1, 2)]);
        let mut list = CellList::default();
        list.add_pgc(&pgc(&[(1, 1, 0x04, 5), (1, 2, 0x04, 0xFF)]), &adt)?;

        let timed = list.at(1, 1u8).cloned();
        assert_eq!(timed.as_ref().map(|c| c.nb_frames), Some(1));
        assert_eq!(timed.as_ref().map(|c| c.frame_dur), Some(5000.0));
        assert_eq!(timed.map(|c| c.is_still), Some(true));

        let infinite = list.at(1, 2u8).cloned();
        assert_eq!(infinite.as_ref().map(|c| c.nb_frames), Some(100));
        assert_eq!(infinite.map(|c| c.frame_dur), Some(40.0));
        Ok(())
    }

    #[test]
    fn strict_mode_rejects_infinite_still() {
        let adt = c_adt(&[(1, 1)]);
        let mut list = CellList::default();
        list.set_fail_level(Level::Warn);
        let result = list.add_pgc(&pgc(&[(1, 1, 0x04, 0xFF)]), &adt);
        assert!(matches!(result, Err(TimelineError::InfiniteStill { .. })));
    }
}
