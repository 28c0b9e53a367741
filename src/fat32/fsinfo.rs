//! FSInfo sector codec
//!
//! The FSInfo sector caches the free-cluster count and a next-free hint.
//! It is only trusted when all three signatures are present.

use super::utils::{read_u32, write_u32};
use crate::platform::SECTOR_SIZE;

pub const LEAD_SIGNATURE: u32 = 0x4161_5252;
pub const STRUCT_SIGNATURE: u32 = 0x6141_7272;
pub const TRAIL_SIGNATURE: u32 = 0xAA55_0000;

const LEAD_SIGNATURE_OFFSET: usize = 0;
const STRUCT_SIGNATURE_OFFSET: usize = 484;
const FREE_COUNT_OFFSET: usize = 488;
const NEXT_FREE_OFFSET: usize = 492;
const TRAIL_SIGNATURE_OFFSET: usize = 508;

/// Value stored when a field is unknown
pub const UNKNOWN: u32 = 0xFFFF_FFFF;

/// The two cached FSInfo fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsInfoField {
    FreeClusterCount,
    NextFreeCluster,
}

impl FsInfoField {
    fn offset(self) -> usize {
        match self {
            Self::FreeClusterCount => FREE_COUNT_OFFSET,
            Self::NextFreeCluster => NEXT_FREE_OFFSET,
        }
    }
}

pub fn has_valid_signatures(sector: &[u8; SECTOR_SIZE]) -> bool {
    read_u32(sector, LEAD_SIGNATURE_OFFSET) == LEAD_SIGNATURE
        && read_u32(sector, STRUCT_SIGNATURE_OFFSET) == STRUCT_SIGNATURE
        && read_u32(sector, TRAIL_SIGNATURE_OFFSET) == TRAIL_SIGNATURE
}

/// Read a field, or `None` when the signatures are invalid.
pub fn get(sector: &[u8; SECTOR_SIZE], field: FsInfoField) -> Option<u32> {
    has_valid_signatures(sector).then(|| read_u32(sector, field.offset()))
}

/// Patch a field in place. Returns false, leaving the sector untouched,
/// when the signatures are invalid.
pub fn set(sector: &mut [u8; SECTOR_SIZE], field: FsInfoField, value: u32) -> bool {
    if !has_valid_signatures(sector) {
        return false;
    }
    write_u32(sector, field.offset(), value);
    true
}

/// A freshly initialised FSInfo sector.
pub fn new_sector(free_clusters: u32, next_free: u32) -> [u8; SECTOR_SIZE] {
    let mut sector = [0u8; SECTOR_SIZE];
    write_u32(&mut sector, LEAD_SIGNATURE_OFFSET, LEAD_SIGNATURE);
    write_u32(&mut sector, STRUCT_SIGNATURE_OFFSET, STRUCT_SIGNATURE);
    write_u32(&mut sector, FREE_COUNT_OFFSET, free_clusters);
    write_u32(&mut sector, NEXT_FREE_OFFSET, next_free);
    write_u32(&mut sector, TRAIL_SIGNATURE_OFFSET, TRAIL_SIGNATURE);
    sector
}
