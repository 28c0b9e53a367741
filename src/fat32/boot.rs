//! Boot sector, MBR and BIOS Parameter Block parsing

use super::sector::SectorIo;
use super::utils::{read_u16, read_u32};
use super::{FAT_ENTRIES_PER_SECTOR, FIRST_CLUSTER};
use crate::error::{Fat32Error, Result};
use crate::platform::{BlockDevice, SECTOR_SIZE};

const BOOT_SIGNATURE: u16 = 0xAA55;
const BOOT_SIGNATURE_OFFSET: usize = 510;
const PARTITION_TABLE_OFFSET: usize = 446;

/// Fields of the FAT32 BIOS Parameter Block the engine relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiosParameterBlock {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sector_count: u16,
    pub number_of_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors_16: u16,
    pub fat_size_16: u16,
    pub hidden_sectors: u32,
    pub total_sectors_32: u32,
    pub fat_size_32: u32,
    pub root_cluster: u32,
    pub fs_info_sector: u16,
    pub volume_label: [u8; 11],
}

impl BiosParameterBlock {
    pub fn parse(sector: &[u8; SECTOR_SIZE]) -> Self {
        let mut volume_label = [0u8; 11];
        volume_label.copy_from_slice(&sector[0x47..0x52]);
        Self {
            bytes_per_sector: read_u16(sector, 0x0B),
            sectors_per_cluster: sector[0x0D],
            reserved_sector_count: read_u16(sector, 0x0E),
            number_of_fats: sector[0x10],
            root_entry_count: read_u16(sector, 0x11),
            total_sectors_16: read_u16(sector, 0x13),
            fat_size_16: read_u16(sector, 0x16),
            hidden_sectors: read_u32(sector, 0x1C),
            total_sectors_32: read_u32(sector, 0x20),
            fat_size_32: read_u32(sector, 0x24),
            root_cluster: read_u32(sector, 0x2C),
            fs_info_sector: read_u16(sector, 0x30),
            volume_label,
        }
    }

    /// Rejects geometries this engine cannot drive.
    pub fn validate(&self) -> Result<()> {
        if self.bytes_per_sector as usize != SECTOR_SIZE {
            return Err(Fat32Error::not_fat32(format!(
                "unsupported sector size {}",
                self.bytes_per_sector
            )));
        }
        if self.sectors_per_cluster == 0 || !self.sectors_per_cluster.is_power_of_two() {
            return Err(Fat32Error::not_fat32(format!(
                "invalid sectors per cluster {}",
                self.sectors_per_cluster
            )));
        }
        if self.fat_size_16 != 0 || self.root_entry_count != 0 || self.fat_size_32 == 0 {
            return Err(Fat32Error::not_fat32("FAT12/16 layout"));
        }
        if self.number_of_fats == 0 || self.reserved_sector_count == 0 {
            return Err(Fat32Error::not_fat32("missing FAT region"));
        }
        if self.root_cluster < FIRST_CLUSTER {
            return Err(Fat32Error::not_fat32(format!(
                "invalid root cluster {}",
                self.root_cluster
            )));
        }
        if (self.total_sectors_32 as u64) <= self.metadata_sectors() {
            return Err(Fat32Error::not_fat32("volume smaller than its FAT region"));
        }
        Ok(())
    }

    fn metadata_sectors(&self) -> u64 {
        self.reserved_sector_count as u64 + self.number_of_fats as u64 * self.fat_size_32 as u64
    }
}

/// One entry of the MBR partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionEntry {
    pub status: u8,
    pub partition_type: u8,
    pub first_sector: u32,
    pub sector_count: u32,
}

impl PartitionEntry {
    pub fn parse(sector: &[u8; SECTOR_SIZE], index: usize) -> Self {
        let base = PARTITION_TABLE_OFFSET + index * 16;
        Self {
            status: sector[base],
            partition_type: sector[base + 4],
            first_sector: read_u32(sector, base + 8),
            sector_count: read_u32(sector, base + 12),
        }
    }
}

/// A boot sector starts with a jump instruction.
pub fn has_jump_boot(sector: &[u8; SECTOR_SIZE]) -> bool {
    sector[0] == 0xE9 || sector[0] == 0xEB
}

pub fn has_boot_signature(sector: &[u8; SECTOR_SIZE]) -> bool {
    read_u16(sector, BOOT_SIGNATURE_OFFSET) == BOOT_SIGNATURE
}

/// Geometry of a mounted volume. Set once at mount, read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeSession {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u32,
    pub reserved_sector_count: u32,
    pub number_of_fats: u32,
    pub fat_size: u32,
    pub root_cluster: u32,
    pub first_data_sector: u32,
    pub total_clusters: u32,
    /// Partition offset: sectors before the boot sector
    pub unused_sectors: u32,
    pub fs_info_sector: u32,
    /// Whether the FSInfo free-cluster count was plausible at mount
    pub free_count_valid: bool,
}

impl VolumeSession {
    pub fn from_bpb(bpb: &BiosParameterBlock, unused_sectors: u32) -> Result<Self> {
        bpb.validate()?;
        // All regions are addressed from where the boot sector was found
        if bpb.hidden_sectors != unused_sectors {
            log::warn!(
                "BPB hidden sectors ({}) differ from partition offset ({}), using the partition offset",
                bpb.hidden_sectors,
                unused_sectors
            );
        }
        let sectors_per_cluster = bpb.sectors_per_cluster as u32;
        let reserved = bpb.reserved_sector_count as u32;
        let fat_region = bpb.number_of_fats as u32 * bpb.fat_size_32;
        let data_sectors = bpb.total_sectors_32 - reserved - fat_region;
        let total_clusters = data_sectors / sectors_per_cluster;

        // The FAT must have room for every cluster it claims to map
        let fat_capacity = bpb.fat_size_32 as u64 * FAT_ENTRIES_PER_SECTOR as u64;
        if (total_clusters as u64 + FIRST_CLUSTER as u64) > fat_capacity {
            return Err(Fat32Error::not_fat32(format!(
                "FAT of {} sectors cannot map {} clusters",
                bpb.fat_size_32, total_clusters
            )));
        }
        let max_cluster = total_clusters + FIRST_CLUSTER - 1;
        if bpb.root_cluster > max_cluster {
            return Err(Fat32Error::not_fat32(format!(
                "root cluster {} beyond last cluster {}",
                bpb.root_cluster, max_cluster
            )));
        }
        let fs_info = match bpb.fs_info_sector {
            0 | 0xFFFF => 1,
            n => n as u32,
        };

        Ok(Self {
            bytes_per_sector: bpb.bytes_per_sector,
            sectors_per_cluster,
            reserved_sector_count: reserved,
            number_of_fats: bpb.number_of_fats as u32,
            fat_size: bpb.fat_size_32,
            root_cluster: bpb.root_cluster,
            first_data_sector: unused_sectors + reserved + fat_region,
            total_clusters,
            unused_sectors,
            fs_info_sector: unused_sectors + fs_info,
            free_count_valid: false,
        })
    }

    /// First sector of a data cluster. Callers check `is_valid_cluster`
    /// first; the reserved clusters 0 and 1 map onto cluster 2.
    pub fn cluster_to_sector(&self, cluster: u32) -> u32 {
        cluster.saturating_sub(FIRST_CLUSTER) * self.sectors_per_cluster + self.first_data_sector
    }

    /// Highest valid cluster number.
    pub fn max_cluster(&self) -> u32 {
        self.total_clusters + FIRST_CLUSTER - 1
    }

    pub fn is_valid_cluster(&self, cluster: u32) -> bool {
        (FIRST_CLUSTER..=self.max_cluster()).contains(&cluster)
    }

    pub fn cluster_bytes(&self) -> u32 {
        self.sectors_per_cluster * self.bytes_per_sector as u32
    }

    /// First sector of the first FAT.
    pub fn fat_start_sector(&self) -> u32 {
        self.unused_sectors + self.reserved_sector_count
    }

    /// Sector of the first FAT holding `cluster`'s entry, and the byte
    /// offset of the entry inside it.
    pub fn fat_entry_location(&self, cluster: u32) -> (u32, usize) {
        let byte = cluster as u64 * 4;
        let sector = self.fat_start_sector() + (byte / self.bytes_per_sector as u64) as u32;
        let offset = (byte % self.bytes_per_sector as u64) as usize;
        (sector, offset)
    }

    /// Whole clusters needed to hold `bytes`, rounding up.
    pub fn bytes_to_clusters(&self, bytes: u32) -> u32 {
        let sectors = bytes.div_ceil(self.bytes_per_sector as u32);
        sectors.div_ceil(self.sectors_per_cluster)
    }
}

/// Locate and parse the boot sector: sector 0 either is the boot sector
/// (superfloppy layout) or an MBR whose first partition holds it.
pub(crate) fn read_boot_sector<D: BlockDevice>(
    io: &mut SectorIo<D>,
) -> Result<(BiosParameterBlock, u32)> {
    let sector = io.load(0)?;
    if has_jump_boot(sector) {
        log::debug!("mount: sector 0 is a boot sector");
        return Ok((BiosParameterBlock::parse(sector), 0));
    }
    if !has_boot_signature(sector) {
        return Err(Fat32Error::not_fat32("sector 0 is neither boot sector nor MBR"));
    }

    let partition = PartitionEntry::parse(sector, 0);
    log::debug!(
        "mount: MBR found, first partition type {:#04x} at sector {}",
        partition.partition_type,
        partition.first_sector
    );
    if partition.first_sector == 0 {
        return Err(Fat32Error::not_fat32("first MBR partition is empty"));
    }

    let sector = io.load(partition.first_sector)?;
    if !has_jump_boot(sector) {
        return Err(Fat32Error::not_fat32(format!(
            "no boot sector at partition start {}",
            partition.first_sector
        )));
    }
    Ok((BiosParameterBlock::parse(sector), partition.first_sector))
}
