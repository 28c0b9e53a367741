#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor};
use std::rc::Rc;
use std::sync::Once;

use fat32_drive::{BlockDevice, Fat32FileEntry, Fat32Volume, ImageDisk, SECTOR_SIZE};

pub type MemVolume = Fat32Volume<ImageDisk<Cursor<Vec<u8>>>>;

pub const RESERVED_SECTORS: u32 = 32;
pub const NUM_FATS: u32 = 2;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// Shape of a freshly formatted test image.
#[derive(Debug, Clone)]
pub struct ImageSpec {
    /// Sectors in the FAT32 volume itself
    pub total_sectors: u32,
    pub sectors_per_cluster: u8,
    /// Put an MBR in sector 0 and start the volume here
    pub partition_offset: Option<u32>,
    /// Volume label entry in the root directory
    pub label: Option<&'static [u8; 11]>,
    /// `SUBDIR` entry in the root pointing at cluster 3
    pub subdirectory: bool,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            total_sectors: 8192,
            sectors_per_cluster: 1,
            partition_offset: None,
            label: None,
            subdirectory: false,
        }
    }
}

/// Where everything lives inside a formatted image.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub part: u32,
    pub fat_size: u32,
    pub spc: u32,
    pub first_data: u32,
    pub total_clusters: u32,
}

impl ImageSpec {
    pub fn layout(&self) -> Layout {
        let spc = self.sectors_per_cluster as u32;
        let estimate = (self.total_sectors - RESERVED_SECTORS) / spc;
        let fat_size = (estimate + 2).div_ceil(128);
        let part = self.partition_offset.unwrap_or(0);
        let data_sectors = self.total_sectors - RESERVED_SECTORS - NUM_FATS * fat_size;
        Layout {
            part,
            fat_size,
            spc,
            first_data: part + RESERVED_SECTORS + NUM_FATS * fat_size,
            total_clusters: data_sectors / spc,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let layout = self.layout();
        let part = layout.part as usize;
        let mut img = vec![0u8; (part + self.total_sectors as usize) * SECTOR_SIZE];

        if self.partition_offset.is_some() {
            let mbr = &mut img[..SECTOR_SIZE];
            mbr[446] = 0x80;
            mbr[446 + 4] = 0x0C;
            mbr[446 + 8..446 + 12].copy_from_slice(&layout.part.to_le_bytes());
            mbr[446 + 12..446 + 16].copy_from_slice(&self.total_sectors.to_le_bytes());
            mbr[510] = 0x55;
            mbr[511] = 0xAA;
        }

        let boot = &mut img[part * SECTOR_SIZE..(part + 1) * SECTOR_SIZE];
        boot[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        boot[3..11].copy_from_slice(b"MSWIN4.1");
        put_u16(boot, 0x0B, SECTOR_SIZE as u16);
        boot[0x0D] = self.sectors_per_cluster;
        put_u16(boot, 0x0E, RESERVED_SECTORS as u16);
        boot[0x10] = NUM_FATS as u8;
        boot[0x15] = 0xF8;
        put_u16(boot, 0x18, 63);
        put_u16(boot, 0x1A, 255);
        put_u32(boot, 0x1C, layout.part);
        put_u32(boot, 0x20, self.total_sectors);
        put_u32(boot, 0x24, layout.fat_size);
        put_u32(boot, 0x2C, 2);
        put_u16(boot, 0x30, 1);
        put_u16(boot, 0x32, 6);
        boot[0x40] = 0x80;
        boot[0x42] = 0x29;
        put_u32(boot, 0x43, 0x1234_5678);
        boot[0x47..0x52].copy_from_slice(b"NO NAME    ");
        boot[0x52..0x5A].copy_from_slice(b"FAT32   ");
        boot[510] = 0x55;
        boot[511] = 0xAA;

        let used = if self.subdirectory { 2 } else { 1 };
        let fsinfo = &mut img[(part + 1) * SECTOR_SIZE..(part + 2) * SECTOR_SIZE];
        put_u32(fsinfo, 0, 0x4161_5252);
        put_u32(fsinfo, 484, 0x6141_7272);
        put_u32(fsinfo, 488, layout.total_clusters - used);
        put_u32(fsinfo, 492, 2 + used);
        put_u32(fsinfo, 508, 0xAA55_0000);

        layout.set_fat_entry(&mut img, 0, 0x0FFF_FFF8);
        layout.set_fat_entry(&mut img, 1, 0x0FFF_FFFF);
        layout.set_fat_entry(&mut img, 2, 0x0FFF_FFFF);

        let mut root_slot = 0;
        if let Some(label) = self.label {
            let slot = layout.slot_mut(&mut img, 2, root_slot);
            slot[0..11].copy_from_slice(label);
            slot[11] = 0x08;
            root_slot += 1;
        }
        if self.subdirectory {
            layout.set_fat_entry(&mut img, 3, 0x0FFF_FFFF);
            let slot = layout.slot_mut(&mut img, 2, root_slot);
            write_dir_entry(slot, b"SUBDIR     ", 3);

            let dot = layout.slot_mut(&mut img, 3, 0);
            write_dir_entry(dot, b".          ", 3);
            let dotdot = layout.slot_mut(&mut img, 3, 1);
            write_dir_entry(dotdot, b"..         ", 0);
        }
        img
    }
}

impl Layout {
    pub fn fat_offset(&self, copy: u32, cluster: u32) -> usize {
        let fat_start = self.part + RESERVED_SECTORS + copy * self.fat_size;
        fat_start as usize * SECTOR_SIZE + cluster as usize * 4
    }

    pub fn fat_entry(&self, img: &[u8], cluster: u32) -> u32 {
        get_u32(img, self.fat_offset(0, cluster)) & 0x0FFF_FFFF
    }

    pub fn set_fat_entry(&self, img: &mut [u8], cluster: u32, value: u32) {
        for copy in 0..NUM_FATS {
            put_u32(img, self.fat_offset(copy, cluster), value);
        }
    }

    pub fn cluster_offset(&self, cluster: u32) -> usize {
        (self.first_data + (cluster - 2) * self.spc) as usize * SECTOR_SIZE
    }

    pub fn slot<'a>(&self, img: &'a [u8], cluster: u32, index: usize) -> &'a [u8] {
        let start = self.cluster_offset(cluster) + index * 32;
        &img[start..start + 32]
    }

    pub fn slot_mut<'a>(&self, img: &'a mut [u8], cluster: u32, index: usize) -> &'a mut [u8] {
        let start = self.cluster_offset(cluster) + index * 32;
        &mut img[start..start + 32]
    }

    pub fn fsinfo_offset(&self) -> usize {
        (self.part + 1) as usize * SECTOR_SIZE
    }

    /// Clusters of the chain starting at `start`, in order.
    pub fn chain(&self, img: &[u8], start: u32) -> Vec<u32> {
        let mut chain = vec![start];
        let mut cluster = start;
        loop {
            let next = self.fat_entry(img, cluster);
            if next >= 0x0FFF_FFF8 || next < 2 {
                break;
            }
            chain.push(next);
            cluster = next;
        }
        chain
    }
}

fn write_dir_entry(slot: &mut [u8], name: &[u8; 11], cluster: u32) {
    slot[0..11].copy_from_slice(name);
    slot[11] = 0x10;
    put_u16(slot, 20, (cluster >> 16) as u16);
    put_u16(slot, 26, cluster as u16);
}

pub fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn get_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

pub fn mount(img: Vec<u8>) -> MemVolume {
    init_logging();
    Fat32Volume::mount(ImageDisk::new(Cursor::new(img))).expect("mount")
}

pub fn unmount(volume: MemVolume) -> Vec<u8> {
    volume.unmount().into_inner().into_inner()
}

pub fn write_file(volume: &mut MemVolume, name: &str, data: &[u8]) -> Fat32FileEntry {
    let mut writer = volume.open_for_write(name).expect("open for write");
    writer.write_block(data).expect("write");
    writer.close().expect("close")
}

pub fn read_file(volume: &mut MemVolume, name: &str) -> Vec<u8> {
    let mut reader = volume.open_for_read(name).expect("open for read");
    let mut out = Vec::new();
    reader.read_to_vec(&mut out).expect("read");
    out
}

/// Deterministic non-repeating-per-sector test data.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 7 + i / 512) % 251) as u8).collect()
}

/// Failures to inject, shared with the test that owns the disk.
#[derive(Debug, Default)]
pub struct Faults {
    /// Remaining failing reads per sector
    pub read_failures: HashMap<u32, u32>,
    /// Sectors whose writes always fail
    pub failing_writes: HashSet<u32>,
    /// Device reads seen per sector
    pub reads: HashMap<u32, u32>,
}

/// A block device that fails on demand.
pub struct FlakyDisk<D> {
    inner: D,
    faults: Rc<RefCell<Faults>>,
}

impl<D: BlockDevice> FlakyDisk<D> {
    pub fn new(inner: D) -> (Self, Rc<RefCell<Faults>>) {
        let faults = Rc::new(RefCell::new(Faults::default()));
        (
            Self {
                inner,
                faults: Rc::clone(&faults),
            },
            faults,
        )
    }

    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<D: BlockDevice> BlockDevice for FlakyDisk<D> {
    fn read_sector(&mut self, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> io::Result<()> {
        {
            let mut faults = self.faults.borrow_mut();
            *faults.reads.entry(lba).or_default() += 1;
            if let Some(remaining) = faults.read_failures.get_mut(&lba) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(io::Error::other(format!("injected read failure at {}", lba)));
                }
            }
        }
        self.inner.read_sector(lba, buf)
    }

    fn write_sector(&mut self, lba: u32, buf: &[u8; SECTOR_SIZE]) -> io::Result<()> {
        if self.faults.borrow().failing_writes.contains(&lba) {
            return Err(io::Error::other(format!("injected write failure at {}", lba)));
        }
        self.inner.write_sector(lba, buf)
    }
}
