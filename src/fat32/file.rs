//! Open file handles
//!
//! A handle mutably borrows the volume, so at most one file is open at a
//! time and nothing else can touch the shared sector buffer while a
//! handle is alive.

use std::io;

use super::cursor::FilePosition;
use super::entry::{pack_short_name, Fat32FileEntry, ShortEntry};
use super::fat_table::FreeCountUpdate;
use super::lfn::{encode_long_entries, is_long_filename, lfn_checksum};
use super::volume::Fat32Volume;
use crate::error::{Fat32Error, Result};
use crate::platform::{BlockDevice, SECTOR_SIZE};

/// One sector's worth of file data, borrowed from the sector buffer.
#[derive(Debug)]
pub struct Block<'a> {
    pub data: &'a [u8],
    /// No more data follows this block
    pub is_last: bool,
}

/// A file opened for reading.
pub struct FileReader<'v, D: BlockDevice> {
    volume: &'v mut Fat32Volume<D>,
    entry: Fat32FileEntry,
    position: FilePosition,
    /// Valid bytes of the sector currently in the buffer
    block_len: usize,
    /// Bytes of that sector already handed out through `io::Read`
    consumed: usize,
}

impl<'v, D: BlockDevice> FileReader<'v, D> {
    pub(crate) fn new(volume: &'v mut Fat32Volume<D>, entry: Fat32FileEntry, dir_cluster: u32) -> Self {
        let position = FilePosition::for_read(&entry, dir_cluster);
        Self {
            volume,
            entry,
            position,
            block_len: 0,
            consumed: 0,
        }
    }

    pub fn entry(&self) -> &Fat32FileEntry {
        &self.entry
    }

    pub fn size(&self) -> u32 {
        self.position.file_size
    }

    pub fn position(&self) -> &FilePosition {
        &self.position
    }

    /// Next block of the file, `None` once everything was returned. Any
    /// bytes of the previous block not yet taken through `io::Read` are
    /// skipped.
    pub fn read_block(&mut self) -> Result<Option<Block<'_>>> {
        self.block_len = 0;
        self.consumed = 0;
        let Some(len) = self.volume.advance_read(&mut self.position)? else {
            return Ok(None);
        };
        Ok(Some(Block {
            data: &self.volume.io.buf()[..len],
            is_last: self.position.is_at_end(),
        }))
    }

    /// Read the rest of the file into `out`, returning the byte count.
    pub fn read_to_vec(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let before = out.len();
        while let Some(block) = self.read_block()? {
            out.extend_from_slice(block.data);
        }
        Ok(out.len() - before)
    }
}

impl<D: BlockDevice> io::Read for FileReader<'_, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.consumed == self.block_len {
            match self.volume.advance_read(&mut self.position)? {
                Some(len) => {
                    self.block_len = len;
                    self.consumed = 0;
                }
                None => return Ok(0),
            }
        }
        let available = &self.volume.io.buf()[self.consumed..self.block_len];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consumed += n;
        Ok(n)
    }
}

/// A file opened for writing.
///
/// Data goes to disk sector by sector; the directory entry only appears
/// when [`FileWriter::close`] commits it. A writer dropped without close
/// leaves its clusters allocated but unreferenced.
pub struct FileWriter<'v, D: BlockDevice> {
    volume: &'v mut Fat32Volume<D>,
    name: String,
    position: FilePosition,
    /// Bytes staged in the sector buffer, not yet written
    fill: usize,
    closed: bool,
}

impl<'v, D: BlockDevice> FileWriter<'v, D> {
    pub(crate) fn new(volume: &'v mut Fat32Volume<D>, name: String, position: FilePosition) -> Self {
        Self {
            volume,
            name,
            position,
            fill: 0,
            closed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes written so far, including staged ones.
    pub fn size(&self) -> u32 {
        self.position.file_size + self.fill as u32
    }

    pub fn start_cluster(&self) -> u32 {
        self.position.start_cluster
    }

    /// Append `data` to the file.
    pub fn write_block(&mut self, mut data: &[u8]) -> Result<()> {
        if (self.size() as u64) + data.len() as u64 > u32::MAX as u64 {
            return Err(Fat32Error::Io(io::Error::new(
                io::ErrorKind::FileTooLarge,
                format!("'{}' would exceed 4 GiB", self.name),
            )));
        }
        while !data.is_empty() {
            if self.fill == 0 {
                self.volume.prepare_write(&mut self.position)?;
            }
            let n = (SECTOR_SIZE - self.fill).min(data.len());
            self.volume.io.buf_mut()[self.fill..self.fill + n].copy_from_slice(&data[..n]);
            self.fill += n;
            data = &data[n..];

            if self.fill == SECTOR_SIZE {
                self.volume.advance_write(&mut self.position, SECTOR_SIZE)?;
                self.fill = 0;
            }
        }
        Ok(())
    }

    /// Flush the staged tail and commit the directory entry.
    pub fn close(mut self) -> Result<Fat32FileEntry> {
        self.closed = true;
        let result = self.commit();
        if let Err(e) = &result {
            log::warn!(
                "close: '{}' failed with {} cluster(s) allocated: {}",
                self.name,
                self.position.clusters_allocated,
                e
            );
        }
        result
    }

    fn flush_staged(&mut self) -> Result<()> {
        if self.fill == 0 {
            return Ok(());
        }
        let fill = self.fill;
        self.volume.io.buf_mut()[fill..].fill(0);
        self.volume.advance_write(&mut self.position, fill)?;
        self.fill = 0;
        Ok(())
    }

    fn commit(&mut self) -> Result<Fat32FileEntry> {
        self.flush_staged()?;

        let volume = &mut *self.volume;
        let dir_cluster = self.position.dir_cluster;

        let replaced = match volume.find_file_in(&self.name, dir_cluster)? {
            Some(existing) if existing.is_directory() => {
                return Err(Fat32Error::is_a_directory(&self.name));
            }
            Some(_) if !volume.options.replace_existing => {
                return Err(Fat32Error::already_exists(&self.name));
            }
            other => other,
        };
        let skip = replaced.as_ref().map(Fat32FileEntry::location);

        let (short_name, long_name) = if is_long_filename(&self.name) {
            let short = volume.unique_short_name(&self.name, dir_cluster, skip)?;
            (short, Some(self.name.clone()))
        } else {
            let short = pack_short_name(&self.name)
                .ok_or_else(|| Fat32Error::invalid_file_name(&self.name, "not a valid 8.3 name"))?;
            if volume.short_name_in_use(&short, dir_cluster, skip)? {
                return Err(Fat32Error::already_exists(&self.name));
            }
            (short, None)
        };

        let long_entries = match &long_name {
            Some(name) => encode_long_entries(name, lfn_checksum(&short_name))?,
            None => Vec::new(),
        };
        let (slots, appended) = volume.allocate_slots(dir_cluster, long_entries.len() + 1)?;
        let (short_slot, long_slots) = match slots.split_last() {
            Some((short_slot, long_slots)) => (*short_slot, long_slots.to_vec()),
            None => return Err(Fat32Error::ChainCorrupt { cluster: dir_cluster }),
        };

        for (entry, slot) in long_entries.iter().zip(long_slots.iter()) {
            volume.write_slot(*slot, &entry.to_bytes())?;
        }
        let short = ShortEntry::new_file(
            short_name,
            self.position.start_cluster,
            self.position.file_size,
        );
        volume.write_slot(short_slot, &short.to_bytes())?;

        // An empty file still holds its first cluster
        volume.free_memory_update(FreeCountUpdate::Remove, self.position.file_size.max(1));
        volume.adjust_free_clusters(FreeCountUpdate::Remove, appended);
        volume.set_next_free_hint(self.position.cluster);

        log::info!(
            "Created '{}' ({} bytes, {} long entries, start cluster {})",
            self.name,
            self.position.file_size,
            long_entries.len(),
            self.position.start_cluster
        );

        // The old copy only goes once the new entry is on disk
        if let Some(old) = replaced {
            log::debug!("close: removing replaced '{}'", old.name);
            if let Err(e) = volume.remove_entry(&old) {
                log::warn!("close: '{}' saved, old copy not fully removed: {}", self.name, e);
                return Err(e);
            }
        }
        Ok(Fat32FileEntry::new(&short, long_name, short_slot, long_slots))
    }
}

impl<D: BlockDevice> io::Write for FileWriter<'_, D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_block(buf)?;
        Ok(buf.len())
    }

    /// Staged bytes stay in the sector buffer until the sector fills or
    /// the file is closed.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<D: BlockDevice> Drop for FileWriter<'_, D> {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!(
                "'{}' dropped without close: {} cluster(s) from {} leaked",
                self.name,
                self.position.clusters_allocated,
                self.position.start_cluster
            );
        }
    }
}
