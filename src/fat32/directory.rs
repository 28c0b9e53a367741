//! Directory iteration and slot allocation
//!
//! Directories are walked one 32-byte slot at a time through the shared
//! sector buffer; each slot is copied out before anything else can
//! overwrite the buffer.

use super::boot::VolumeSession;
use super::entry::{Fat32FileEntry, ShortEntry};
use super::lfn::{LfnAccumulator, LongEntry};
use super::volume::Fat32Volume;
use super::{
    is_end_of_chain, ATTR_LONG_NAME, ATTR_LONG_NAME_MASK, DIR_ENTRY_SIZE, ENTRY_DELETED,
    ENTRY_END, FAT32_FREE_CLUSTER,
};
use crate::error::{Fat32Error, Result};
use crate::platform::{BlockDevice, SECTOR_SIZE};

/// Location of one 32-byte directory slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotPosition {
    pub cluster: u32,
    /// Sector inside the cluster
    pub sector_index: u32,
    /// Byte offset inside the sector
    pub offset: usize,
}

impl SlotPosition {
    pub fn lba(&self, session: &VolumeSession) -> u32 {
        session.cluster_to_sector(self.cluster) + self.sector_index
    }
}

/// Read position inside a directory's cluster chain.
#[derive(Debug)]
pub struct DirectoryCursor {
    start_cluster: u32,
    cluster: u32,
    sector_index: u32,
    offset: usize,
    finished: bool,
    lfn: LfnAccumulator,
}

impl DirectoryCursor {
    fn new(cluster: u32) -> Self {
        Self {
            start_cluster: cluster,
            cluster,
            sector_index: 0,
            offset: 0,
            finished: false,
            lfn: LfnAccumulator::default(),
        }
    }

    pub fn start_cluster(&self) -> u32 {
        self.start_cluster
    }

    /// Rewind to the first slot of the directory.
    pub fn reset(&mut self) {
        *self = Self::new(self.start_cluster);
    }

    fn continue_in(&mut self, cluster: u32) {
        self.cluster = cluster;
        self.sector_index = 0;
        self.offset = 0;
        self.finished = false;
    }
}

impl<D: BlockDevice> Fat32Volume<D> {
    /// Cursor over the directory starting at `cluster`.
    pub fn open_directory(&self, cluster: u32) -> Result<DirectoryCursor> {
        if !self.session.is_valid_cluster(cluster) {
            return Err(Fat32Error::ChainCorrupt { cluster });
        }
        Ok(DirectoryCursor::new(cluster))
    }

    /// Copy out the next raw slot, following the directory chain. `None`
    /// once the chain ends; a broken chain is `ChainCorrupt`.
    fn next_slot(&mut self, cursor: &mut DirectoryCursor) -> Result<Option<(SlotPosition, [u8; DIR_ENTRY_SIZE])>> {
        if cursor.finished {
            return Ok(None);
        }
        if cursor.offset == SECTOR_SIZE {
            cursor.offset = 0;
            cursor.sector_index += 1;
        }
        if cursor.sector_index == self.session.sectors_per_cluster {
            let next = self.next_cluster(cursor.cluster)?;
            if is_end_of_chain(next) {
                cursor.finished = true;
                return Ok(None);
            }
            if next == FAT32_FREE_CLUSTER || !self.session.is_valid_cluster(next) {
                cursor.finished = true;
                return Err(Fat32Error::ChainCorrupt {
                    cluster: cursor.cluster,
                });
            }
            cursor.cluster = next;
            cursor.sector_index = 0;
        }

        let position = SlotPosition {
            cluster: cursor.cluster,
            sector_index: cursor.sector_index,
            offset: cursor.offset,
        };
        let buf = self.io.load(position.lba(&self.session))?;
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        raw.copy_from_slice(&buf[position.offset..position.offset + DIR_ENTRY_SIZE]);
        cursor.offset += DIR_ENTRY_SIZE;
        Ok(Some((position, raw)))
    }

    /// Next live short entry, carrying the long name assembled from the
    /// fragments in front of it. `None` at the end-of-directory marker or
    /// where the chain ends or breaks.
    pub fn next_entry(&mut self, cursor: &mut DirectoryCursor) -> Result<Option<Fat32FileEntry>> {
        loop {
            let (position, raw) = match self.next_slot(cursor) {
                Ok(Some(slot)) => slot,
                Ok(None) => return Ok(None),
                Err(Fat32Error::ChainCorrupt { cluster }) => {
                    log::warn!(
                        "Directory {} chain broken after cluster {}",
                        cursor.start_cluster,
                        cluster
                    );
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            match raw[0] {
                ENTRY_END => {
                    cursor.finished = true;
                    cursor.lfn.clear();
                    return Ok(None);
                }
                ENTRY_DELETED => {
                    cursor.lfn.clear();
                    continue;
                }
                _ => {}
            }

            if raw[11] & ATTR_LONG_NAME_MASK == ATTR_LONG_NAME {
                cursor.lfn.push(LongEntry::parse(&raw), position);
                continue;
            }

            let short = ShortEntry::parse(&raw);
            let (long_name, long_slots) = cursor.lfn.take_for(&short.name);
            return Ok(Some(Fat32FileEntry::new(&short, long_name, position, long_slots)));
        }
    }

    /// Iterate over every entry of the directory at `cluster`, including
    /// subdirectories and the volume label.
    pub fn read_dir(&mut self, cluster: u32) -> Result<Directory<'_, D>> {
        let cursor = self.open_directory(cluster)?;
        Ok(Directory {
            volume: self,
            cursor,
        })
    }

    /// Reserve `count` consecutive free slots: the first run of deleted
    /// slots long enough to hold them, otherwise the slots from the
    /// end-of-directory marker on. Extends the directory chain with zeroed
    /// clusters when it runs out. Returns the slots and the number of
    /// clusters appended.
    pub(crate) fn allocate_slots(&mut self, dir_cluster: u32, count: usize) -> Result<(Vec<SlotPosition>, u32)> {
        let mut cursor = self.open_directory(dir_cluster)?;
        let mut slots = Vec::with_capacity(count);
        let mut appended = 0;
        let mut at_end = false;

        while slots.len() < count {
            match self.next_slot(&mut cursor)? {
                Some((position, raw)) => {
                    if at_end || raw[0] == ENTRY_END {
                        at_end = true;
                        slots.push(position);
                    } else if raw[0] == ENTRY_DELETED {
                        slots.push(position);
                    } else {
                        slots.clear();
                    }
                }
                None => {
                    let cluster = self.extend_directory(cursor.cluster)?;
                    appended += 1;
                    at_end = true;
                    cursor.continue_in(cluster);
                }
            }
        }
        log::debug!(
            "allocate_slots: {} slot(s) in directory {} from {}, {} cluster(s) appended",
            count,
            dir_cluster,
            if at_end { "the end marker" } else { "deleted slots" },
            appended
        );
        Ok((slots, appended))
    }

    /// Append a zero-filled cluster to the directory chain ending at
    /// `last_cluster`. The cluster is cleared before it is linked in.
    fn extend_directory(&mut self, last_cluster: u32) -> Result<u32> {
        let cluster = self.allocate_cluster(last_cluster, None)?;
        let first = self.session.cluster_to_sector(cluster);
        for sector in first..first + self.session.sectors_per_cluster {
            self.io.store_zeroed(sector)?;
        }
        self.set_next_cluster(last_cluster, cluster)?;
        log::debug!("extend_directory: cluster {} linked after {}", cluster, last_cluster);
        Ok(cluster)
    }

    /// Overwrite one directory slot.
    pub(crate) fn write_slot(&mut self, position: SlotPosition, raw: &[u8; DIR_ENTRY_SIZE]) -> Result<()> {
        let lba = position.lba(&self.session);
        self.io.load(lba)?;
        self.io.buf_mut()[position.offset..position.offset + DIR_ENTRY_SIZE].copy_from_slice(raw);
        self.io.store(lba)
    }

    /// Mark a slot deleted.
    pub(crate) fn tombstone_slot(&mut self, position: SlotPosition) -> Result<()> {
        let lba = position.lba(&self.session);
        self.io.load(lba)?;
        self.io.buf_mut()[position.offset] = ENTRY_DELETED;
        self.io.store(lba)
    }
}

/// Iterator over the entries of one directory.
pub struct Directory<'v, D: BlockDevice> {
    volume: &'v mut Fat32Volume<D>,
    cursor: DirectoryCursor,
}

impl<D: BlockDevice> Iterator for Directory<'_, D> {
    type Item = Result<Fat32FileEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.volume.next_entry(&mut self.cursor) {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.cursor.finished = true;
                Some(Err(e))
            }
        }
    }
}
