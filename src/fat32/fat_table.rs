//! FAT table management for FAT32
//!
//! The FAT is never held in memory: every lookup reads the one FAT
//! sector holding the entry into the shared sector buffer.

use super::fsinfo::{self, FsInfoField};
use super::utils::{read_u32, write_u32};
use super::volume::Fat32Volume;
use super::{
    is_end_of_chain, FAT32_ENTRY_MASK, FAT32_EOF, FAT32_FREE_CLUSTER, FAT_ENTRIES_PER_SECTOR,
    FIRST_CLUSTER,
};
use crate::error::{Fat32Error, Result};
use crate::platform::BlockDevice;

/// Direction of a free-cluster count adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeCountUpdate {
    /// Clusters were released
    Add,
    /// Clusters were allocated
    Remove,
}

/// Bookkeeping that could not be kept in sync with the disk. The volume
/// stays usable; the FSInfo cache is simply stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degraded {
    FsInfoReadFailed { sector: u32 },
    FsInfoWriteFailed { sector: u32 },
}

/// Capacity figures, in the spirit of a drive's "blocks free" line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeStatistics {
    pub total_clusters: u32,
    pub cluster_bytes: u32,
    pub total_bytes: u64,
    /// Cached free count, when the FSInfo cache is trusted
    pub free_clusters: Option<u32>,
    pub free_bytes: Option<u64>,
    pub next_free_hint: Option<u32>,
}

impl<D: BlockDevice> Fat32Volume<D> {
    /// First sector of a data cluster. Clusters outside the data region
    /// are `ChainCorrupt`.
    pub fn cluster_to_sector(&self, cluster: u32) -> Result<u32> {
        if !self.session.is_valid_cluster(cluster) {
            return Err(Fat32Error::ChainCorrupt { cluster });
        }
        Ok(self.session.cluster_to_sector(cluster))
    }

    /// FAT link of `cluster`, masked to 28 bits.
    pub fn next_cluster(&mut self, cluster: u32) -> Result<u32> {
        if !self.session.is_valid_cluster(cluster) {
            return Err(Fat32Error::ChainCorrupt { cluster });
        }
        let (sector, offset) = self.session.fat_entry_location(cluster);
        let buf = self.io.load_with_retry(sector)?;
        Ok(read_u32(buf, offset) & FAT32_ENTRY_MASK)
    }

    /// Store `value` as the FAT link of `cluster`, in every FAT copy when
    /// mirroring is enabled. The reserved top four bits are preserved.
    pub fn set_next_cluster(&mut self, cluster: u32, value: u32) -> Result<()> {
        if !self.session.is_valid_cluster(cluster) {
            return Err(Fat32Error::ChainCorrupt { cluster });
        }
        let (sector, offset) = self.session.fat_entry_location(cluster);
        let old = read_u32(self.io.load_with_retry(sector)?, offset);
        let new = (old & !FAT32_ENTRY_MASK) | (value & FAT32_ENTRY_MASK);
        write_u32(self.io.buf_mut(), offset, new);
        self.io.store(sector)?;

        if self.options.mirror_fats {
            for copy in 1..self.session.number_of_fats {
                self.io.store(sector + copy * self.session.fat_size)?;
            }
        }
        Ok(())
    }

    /// Find a free cluster, scanning whole FAT sectors forward from the
    /// sector holding `start_cluster`. Wraps once to the start of the FAT.
    /// `None` means the volume is full.
    pub fn search_next_free_cluster(&mut self, start_cluster: u32) -> Result<Option<u32>> {
        let max = self.session.max_cluster();
        let start = if self.session.is_valid_cluster(start_cluster) {
            start_cluster - start_cluster % FAT_ENTRIES_PER_SECTOR
        } else {
            0
        };

        if let Some(cluster) = self.scan_free(start, max)? {
            return Ok(Some(cluster));
        }
        if start > FIRST_CLUSTER {
            if let Some(cluster) = self.scan_free(0, start - 1)? {
                return Ok(Some(cluster));
            }
        }
        log::warn!("No free clusters left on volume");
        Ok(None)
    }

    /// `from` must be FAT-sector aligned.
    fn scan_free(&mut self, from: u32, to: u32) -> Result<Option<u32>> {
        let mut chunk = from;
        while chunk <= to {
            let (sector, _) = self.session.fat_entry_location(chunk);
            let buf = self.io.load_with_retry(sector)?;
            for i in 0..FAT_ENTRIES_PER_SECTOR {
                let cluster = chunk + i;
                if cluster < FIRST_CLUSTER {
                    continue;
                }
                if cluster > to {
                    break;
                }
                if read_u32(buf, i as usize * 4) & FAT32_ENTRY_MASK == FAT32_FREE_CLUSTER {
                    return Ok(Some(cluster));
                }
            }
            chunk += FAT_ENTRIES_PER_SECTOR;
        }
        Ok(None)
    }

    /// Claim a free cluster, mark it end-of-chain and, when `link_from` is
    /// given, link it behind that cluster.
    pub(crate) fn allocate_cluster(&mut self, start_hint: u32, link_from: Option<u32>) -> Result<u32> {
        let cluster = self
            .search_next_free_cluster(start_hint)?
            .ok_or(Fat32Error::NoFreeClusters)?;
        // Terminate before linking so a torn update leaks instead of cross-linking
        self.set_next_cluster(cluster, FAT32_EOF)?;
        if let Some(prev) = link_from {
            self.set_next_cluster(prev, cluster)?;
        }
        log::debug!("allocate_cluster: cluster {} (after {:?})", cluster, link_from);
        Ok(cluster)
    }

    /// Release every cluster of the chain starting at `start_cluster`.
    /// Returns the number of clusters freed.
    pub(crate) fn free_chain(&mut self, start_cluster: u32) -> Result<u32> {
        let mut freed = 0;
        let mut cluster = start_cluster;
        while self.session.is_valid_cluster(cluster) {
            let next = self.next_cluster(cluster)?;
            self.set_next_cluster(cluster, FAT32_FREE_CLUSTER)?;
            freed += 1;
            if is_end_of_chain(next) {
                break;
            }
            if next == FAT32_FREE_CLUSTER {
                log::warn!("free_chain: chain broken after cluster {}", cluster);
                break;
            }
            if !self.session.is_valid_cluster(next) {
                log::warn!("free_chain: cluster {} links to invalid {}", cluster, next);
                break;
            }
            cluster = next;
        }
        log::debug!("free_chain: freed {} cluster(s) from {}", freed, start_cluster);
        Ok(freed)
    }

    /// Read a cached FSInfo field. `None` when the FSInfo signatures are
    /// invalid and the cache cannot be trusted.
    pub fn fs_info_get(&mut self, field: FsInfoField) -> Result<Option<u32>> {
        let buf = self.io.load_with_retry(self.session.fs_info_sector)?;
        Ok(fsinfo::get(buf, field))
    }

    /// Write a cached FSInfo field. Returns false when the signatures are
    /// invalid; nothing is written in that case.
    pub fn fs_info_set(&mut self, field: FsInfoField, value: u32) -> Result<bool> {
        let sector = self.session.fs_info_sector;
        self.io.load_with_retry(sector)?;
        if !fsinfo::set(self.io.buf_mut(), field, value) {
            return Ok(false);
        }
        self.io.store(sector)?;
        Ok(true)
    }

    /// Adjust the cached free-cluster count by the clusters `byte_size`
    /// occupies. No-op unless the cached count was validated at mount.
    pub fn free_memory_update(&mut self, direction: FreeCountUpdate, byte_size: u32) {
        let clusters = self.session.bytes_to_clusters(byte_size);
        self.adjust_free_clusters(direction, clusters);
    }

    pub(crate) fn adjust_free_clusters(&mut self, direction: FreeCountUpdate, clusters: u32) {
        if !self.session.free_count_valid || clusters == 0 {
            return;
        }
        let current = match self.fs_info_get(FsInfoField::FreeClusterCount) {
            Ok(Some(count)) => count,
            Ok(None) => {
                log::warn!("FSInfo signatures vanished; free count no longer tracked");
                self.session.free_count_valid = false;
                return;
            }
            Err(e) => {
                self.note_fs_info_failure(e);
                return;
            }
        };
        let updated = match direction {
            FreeCountUpdate::Add => current
                .saturating_add(clusters)
                .min(self.session.total_clusters),
            FreeCountUpdate::Remove => current.saturating_sub(clusters),
        };
        log::debug!(
            "free_memory_update: {:?} {} cluster(s), {} -> {}",
            direction,
            clusters,
            current,
            updated
        );
        match self.fs_info_set(FsInfoField::FreeClusterCount, updated) {
            Ok(true) => {}
            Ok(false) => self.session.free_count_valid = false,
            Err(e) => self.note_fs_info_failure(e),
        }
    }

    /// Best-effort update of the FSInfo next-free hint.
    pub(crate) fn set_next_free_hint(&mut self, cluster: u32) {
        if let Err(e) = self.fs_info_set(FsInfoField::NextFreeCluster, cluster) {
            self.note_fs_info_failure(e);
        }
    }

    pub(crate) fn note_fs_info_failure(&mut self, err: Fat32Error) {
        let sector = self.session.fs_info_sector;
        let degraded = match err {
            Fat32Error::WriteFailed { .. } => Degraded::FsInfoWriteFailed { sector },
            _ => Degraded::FsInfoReadFailed { sector },
        };
        log::warn!("FSInfo bookkeeping failed, cache is stale: {}", err);
        self.degraded = Some(degraded);
    }

    /// Set when FSInfo bookkeeping failed since mount or the last recount.
    pub fn degraded(&self) -> Option<Degraded> {
        self.degraded
    }

    pub fn statistics(&mut self) -> Result<VolumeStatistics> {
        let cluster_bytes = self.session.cluster_bytes();
        let total_clusters = self.session.total_clusters;
        let free_clusters = if self.session.free_count_valid {
            self.fs_info_get(FsInfoField::FreeClusterCount)?
        } else {
            None
        };
        let next_free_hint = self
            .fs_info_get(FsInfoField::NextFreeCluster)?
            .filter(|&c| self.session.is_valid_cluster(c));
        Ok(VolumeStatistics {
            total_clusters,
            cluster_bytes,
            total_bytes: total_clusters as u64 * cluster_bytes as u64,
            free_clusters,
            free_bytes: free_clusters.map(|c| c as u64 * cluster_bytes as u64),
            next_free_hint,
        })
    }

    /// Count free clusters with a full FAT scan and rewrite the FSInfo
    /// cache from the result. Slow on large cards; never run implicitly.
    pub fn recount_free_clusters(&mut self) -> Result<u32> {
        let max = self.session.max_cluster();
        let mut free = 0u32;
        let mut first_free = None;
        let mut chunk = 0u32;
        while chunk <= max {
            let (sector, _) = self.session.fat_entry_location(chunk);
            let buf = self.io.load_with_retry(sector)?;
            for i in 0..FAT_ENTRIES_PER_SECTOR {
                let cluster = chunk + i;
                if cluster < FIRST_CLUSTER || cluster > max {
                    continue;
                }
                if read_u32(buf, i as usize * 4) & FAT32_ENTRY_MASK == FAT32_FREE_CLUSTER {
                    free += 1;
                    first_free.get_or_insert(cluster);
                }
            }
            chunk += FAT_ENTRIES_PER_SECTOR;
        }

        let next = first_free.unwrap_or(fsinfo::UNKNOWN);
        let sector = self.session.fs_info_sector;
        self.io.load_with_retry(sector)?;
        let buf = self.io.buf_mut();
        if fsinfo::has_valid_signatures(buf) {
            fsinfo::set(buf, FsInfoField::FreeClusterCount, free);
            fsinfo::set(buf, FsInfoField::NextFreeCluster, next);
        } else {
            log::warn!("recount: FSInfo signatures missing, rebuilding sector {}", sector);
            *buf = fsinfo::new_sector(free, next);
        }
        self.io.store(sector)?;

        self.session.free_count_valid = true;
        self.degraded = None;
        log::info!("Free cluster recount: {} of {} free", free, self.session.total_clusters);
        Ok(free)
    }
}
