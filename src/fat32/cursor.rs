//! Per-file position cursor
//!
//! Tracks where the single open file stands inside its cluster chain and
//! moves it one sector at a time.

use super::entry::Fat32FileEntry;
use super::volume::Fat32Volume;
use super::{is_end_of_chain, FAT32_FREE_CLUSTER};
use crate::error::{Fat32Error, Result};
use crate::platform::{BlockDevice, SECTOR_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePosition {
    pub start_cluster: u32,
    /// Cluster holding the current sector
    pub cluster: u32,
    /// Next sector inside `cluster`
    pub sector_index: u32,
    /// Bytes transferred so far, in whole sectors while reading
    pub byte_counter: u64,
    pub file_size: u32,
    /// Start cluster of the directory holding the file
    pub dir_cluster: u32,
    /// Clusters allocated to the file by this cursor
    pub(crate) clusters_allocated: u32,
}

impl FilePosition {
    pub(crate) fn for_read(entry: &Fat32FileEntry, dir_cluster: u32) -> Self {
        Self {
            start_cluster: entry.start_cluster,
            cluster: entry.start_cluster,
            sector_index: 0,
            byte_counter: 0,
            file_size: entry.size,
            dir_cluster,
            clusters_allocated: 0,
        }
    }

    /// Cursor for a new file whose first cluster is already allocated.
    pub(crate) fn for_write(start_cluster: u32, dir_cluster: u32) -> Self {
        Self {
            start_cluster,
            cluster: start_cluster,
            sector_index: 0,
            byte_counter: 0,
            file_size: 0,
            dir_cluster,
            clusters_allocated: 1,
        }
    }

    pub fn is_at_end(&self) -> bool {
        self.byte_counter >= self.file_size as u64
    }
}

impl<D: BlockDevice> Fat32Volume<D> {
    /// Load the next sector of the file into the shared buffer and return
    /// how many of its bytes belong to the file. `None` once the file size
    /// is reached, or when the chain ends early.
    pub(crate) fn advance_read(&mut self, pos: &mut FilePosition) -> Result<Option<usize>> {
        if pos.is_at_end() {
            return Ok(None);
        }
        if pos.sector_index == self.session.sectors_per_cluster {
            let next = self.next_cluster(pos.cluster)?;
            if next == FAT32_FREE_CLUSTER {
                return Err(Fat32Error::ChainCorrupt {
                    cluster: pos.cluster,
                });
            }
            if is_end_of_chain(next) {
                log::warn!(
                    "Chain from cluster {} ends after {} of {} bytes",
                    pos.start_cluster,
                    pos.byte_counter,
                    pos.file_size
                );
                pos.byte_counter = pos.file_size as u64;
                return Ok(None);
            }
            if !self.session.is_valid_cluster(next) {
                return Err(Fat32Error::ChainCorrupt {
                    cluster: pos.cluster,
                });
            }
            pos.cluster = next;
            pos.sector_index = 0;
        }

        let lba = self.session.cluster_to_sector(pos.cluster) + pos.sector_index;
        self.io.load(lba)?;
        pos.byte_counter += SECTOR_SIZE as u64;
        pos.sector_index += 1;

        let valid = if pos.is_at_end() {
            (pos.file_size as u64 - (pos.byte_counter - SECTOR_SIZE as u64)) as usize
        } else {
            SECTOR_SIZE
        };
        Ok(Some(valid))
    }

    /// Make sure the sector about to be staged has a cluster behind it,
    /// linking a fresh one when the current cluster is full. Must only be
    /// called while nothing is staged: allocation reuses the shared buffer.
    pub(crate) fn prepare_write(&mut self, pos: &mut FilePosition) -> Result<()> {
        if pos.sector_index < self.session.sectors_per_cluster {
            return Ok(());
        }
        let cluster = self.allocate_cluster(pos.cluster, Some(pos.cluster))?;
        pos.cluster = cluster;
        pos.sector_index = 0;
        pos.clusters_allocated += 1;
        Ok(())
    }

    /// Write the staged sector and account `bytes_written` of it to the
    /// file.
    pub(crate) fn advance_write(&mut self, pos: &mut FilePosition, bytes_written: usize) -> Result<()> {
        let lba = self.session.cluster_to_sector(pos.cluster) + pos.sector_index;
        self.io.store(lba)?;
        pos.file_size += bytes_written as u32;
        pos.byte_counter += bytes_written as u64;
        pos.sector_index += 1;
        Ok(())
    }
}
