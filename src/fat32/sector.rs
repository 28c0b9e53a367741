//! The single shared sector buffer
//!
//! Every sector the engine touches passes through this one 512-byte
//! buffer. `resident` records which LBA the buffer currently mirrors;
//! it is dropped as soon as the contents are handed out mutably, so a
//! later `load` of the same LBA always sees what is on disk.

use crate::error::{Fat32Error, Result};
use crate::platform::{BlockDevice, SECTOR_SIZE};

pub(crate) struct SectorIo<D> {
    device: D,
    buf: [u8; SECTOR_SIZE],
    resident: Option<u32>,
    read_retries: u8,
}

impl<D: BlockDevice> SectorIo<D> {
    pub(crate) fn new(device: D, read_retries: u8) -> Self {
        Self {
            device,
            buf: [0u8; SECTOR_SIZE],
            resident: None,
            read_retries: read_retries.max(1),
        }
    }

    pub(crate) fn into_device(self) -> D {
        self.device
    }

    /// Read `lba` into the buffer with a single attempt.
    pub(crate) fn load(&mut self, lba: u32) -> Result<&[u8; SECTOR_SIZE]> {
        self.load_attempts(lba, 1)
    }

    /// Read `lba` into the buffer, retrying transient failures.
    pub(crate) fn load_with_retry(&mut self, lba: u32) -> Result<&[u8; SECTOR_SIZE]> {
        self.load_attempts(lba, self.read_retries)
    }

    fn load_attempts(&mut self, lba: u32, attempts: u8) -> Result<&[u8; SECTOR_SIZE]> {
        if self.resident == Some(lba) {
            return Ok(&self.buf);
        }
        self.resident = None;
        let mut attempt = 1;
        loop {
            match self.device.read_sector(lba, &mut self.buf) {
                Ok(()) => break,
                Err(e) if attempt < attempts => {
                    log::warn!(
                        "Read of sector {} failed (attempt {}/{}): {}",
                        lba,
                        attempt,
                        attempts,
                        e
                    );
                    attempt += 1;
                }
                Err(source) => {
                    return Err(Fat32Error::ReadFailed {
                        sector: lba,
                        source,
                    });
                }
            }
        }
        self.resident = Some(lba);
        Ok(&self.buf)
    }

    pub(crate) fn buf(&self) -> &[u8; SECTOR_SIZE] {
        &self.buf
    }

    /// Mutable access; the buffer no longer mirrors any sector afterwards.
    pub(crate) fn buf_mut(&mut self) -> &mut [u8; SECTOR_SIZE] {
        self.resident = None;
        &mut self.buf
    }

    /// Write the buffer to `lba`. Failures are never retried.
    pub(crate) fn store(&mut self, lba: u32) -> Result<()> {
        self.resident = None;
        self.device
            .write_sector(lba, &self.buf)
            .map_err(|source| Fat32Error::WriteFailed {
                sector: lba,
                source,
            })?;
        self.resident = Some(lba);
        Ok(())
    }

    /// Zero the buffer and write it to `lba`.
    pub(crate) fn store_zeroed(&mut self, lba: u32) -> Result<()> {
        self.buf_mut().fill(0);
        self.store(lba)
    }
}
