use super::boot::{self, VolumeSession};
use super::cursor::FilePosition;
use super::entry::Fat32FileEntry;
use super::fat_table::{Degraded, FreeCountUpdate};
use super::file::{FileReader, FileWriter};
use super::fsinfo::FsInfoField;
use super::sector::SectorIo;
use super::MAX_LONG_NAME;
use crate::config::MountOptions;
use crate::error::{Fat32Error, Result};
use crate::platform::BlockDevice;

/// Characters that can never appear in a file name.
const RESERVED_CHARS: &[char] = &['"', '*', '/', ':', '<', '>', '?', '\\', '|'];

/// A mounted FAT32 volume.
///
/// Owns the block device and the one sector buffer every operation goes
/// through.
pub struct Fat32Volume<D> {
    pub(crate) io: SectorIo<D>,
    pub(crate) session: VolumeSession,
    pub(crate) options: MountOptions,
    pub(crate) degraded: Option<Degraded>,
}

impl<D: BlockDevice> Fat32Volume<D> {
    /// Mount with default options.
    pub fn mount(device: D) -> Result<Self> {
        Self::mount_with(device, MountOptions::default())
    }

    /// Locate the boot sector (directly at sector 0 or through the MBR),
    /// derive the volume geometry and check the FSInfo free count.
    pub fn mount_with(device: D, options: MountOptions) -> Result<Self> {
        let mut io = SectorIo::new(device, options.read_retries);
        let (bpb, unused_sectors) = boot::read_boot_sector(&mut io)?;
        let session = VolumeSession::from_bpb(&bpb, unused_sectors)?;

        let mut volume = Self {
            io,
            session,
            options,
            degraded: None,
        };
        volume.validate_free_count();

        log::info!(
            "Mounted FAT32 volume: {} clusters of {} bytes, root cluster {}, partition offset {}",
            volume.session.total_clusters,
            volume.session.cluster_bytes(),
            volume.session.root_cluster,
            volume.session.unused_sectors
        );
        Ok(volume)
    }

    /// Trust the cached free count only if it fits the volume.
    fn validate_free_count(&mut self) {
        let total = self.session.total_clusters;
        self.session.free_count_valid = match self.fs_info_get(FsInfoField::FreeClusterCount) {
            Ok(Some(count)) if count <= total => true,
            Ok(Some(count)) => {
                log::debug!("mount: FSInfo free count {} exceeds {} clusters", count, total);
                false
            }
            Ok(None) => {
                log::warn!("mount: FSInfo signatures invalid, free count not tracked");
                false
            }
            Err(e) => {
                self.note_fs_info_failure(e);
                false
            }
        };
    }

    pub fn session(&self) -> &VolumeSession {
        &self.session
    }

    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    pub fn root_cluster(&self) -> u32 {
        self.session.root_cluster
    }

    /// Give the block device back.
    pub fn unmount(self) -> D {
        log::debug!("unmount: releasing block device");
        self.io.into_device()
    }

    /// Files of the root directory, as shown in a drive catalogue:
    /// subdirectories and the volume label are left out.
    pub fn list_directory(&mut self) -> Result<Vec<Fat32FileEntry>> {
        let root = self.session.root_cluster;
        self.list_directory_in(root)
    }

    pub fn list_directory_in(&mut self, dir_cluster: u32) -> Result<Vec<Fat32FileEntry>> {
        let mut files = Vec::new();
        for entry in self.read_dir(dir_cluster)? {
            let entry = entry?;
            if entry.is_directory() || entry.is_volume_label() {
                continue;
            }
            files.push(entry);
        }
        log::debug!("list_directory: {} file(s) in directory {}", files.len(), dir_cluster);
        Ok(files)
    }

    /// Open a file of the root directory for reading.
    pub fn open_for_read(&mut self, name: &str) -> Result<FileReader<'_, D>> {
        let root = self.session.root_cluster;
        self.open_for_read_in(name, root)
    }

    pub fn open_for_read_in(&mut self, name: &str, dir_cluster: u32) -> Result<FileReader<'_, D>> {
        let entry = self
            .find_file_in(name, dir_cluster)?
            .ok_or_else(|| Fat32Error::not_found(name))?;
        if entry.is_directory() {
            return Err(Fat32Error::is_a_directory(&entry.name));
        }
        if entry.size > 0 && !self.session.is_valid_cluster(entry.start_cluster) {
            return Err(Fat32Error::ChainCorrupt {
                cluster: entry.start_cluster,
            });
        }
        log::debug!(
            "open_for_read: '{}' ({} bytes from cluster {})",
            entry.name,
            entry.size,
            entry.start_cluster
        );
        Ok(FileReader::new(self, entry, dir_cluster))
    }

    /// Open a new file in the root directory for writing.
    pub fn open_for_write(&mut self, name: &str) -> Result<FileWriter<'_, D>> {
        let root = self.session.root_cluster;
        self.open_for_write_in(name, root)
    }

    /// Allocate the first cluster of a new file. The directory entry is
    /// only written when the returned writer is closed; an existing file
    /// of the same name is replaced at that point.
    pub fn open_for_write_in(&mut self, name: &str, dir_cluster: u32) -> Result<FileWriter<'_, D>> {
        validate_file_name(name)?;
        if let Some(existing) = self.find_file_in(name, dir_cluster)? {
            if existing.is_directory() {
                return Err(Fat32Error::is_a_directory(name));
            }
            if !self.options.replace_existing {
                return Err(Fat32Error::already_exists(name));
            }
        }

        let hint = match self.fs_info_get(FsInfoField::NextFreeCluster) {
            Ok(Some(cluster)) if self.session.is_valid_cluster(cluster) => cluster,
            Ok(_) => self.session.root_cluster,
            Err(e) => {
                self.note_fs_info_failure(e);
                self.session.root_cluster
            }
        };
        let start = self.allocate_cluster(hint, None)?;
        log::debug!("open_for_write: '{}' starts at cluster {}", name, start);

        let position = FilePosition::for_write(start, dir_cluster);
        Ok(FileWriter::new(self, name.to_string(), position))
    }

    /// Delete a file of the root directory.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let root = self.session.root_cluster;
        self.delete_in(name, root)
    }

    pub fn delete_in(&mut self, name: &str, dir_cluster: u32) -> Result<()> {
        let entry = self
            .find_file_in(name, dir_cluster)?
            .ok_or_else(|| Fat32Error::not_found(name))?;
        if entry.is_directory() {
            return Err(Fat32Error::is_a_directory(&entry.name));
        }
        self.remove_entry(&entry)
    }

    /// Tombstone the entry and its long-name fragments, then free its
    /// chain. A crash in between leaks clusters instead of leaving an
    /// entry that points at free space.
    pub(crate) fn remove_entry(&mut self, entry: &Fat32FileEntry) -> Result<()> {
        for slot in &entry.long_slots {
            self.tombstone_slot(*slot)?;
        }
        self.tombstone_slot(entry.location)?;

        let freed = if self.session.is_valid_cluster(entry.start_cluster) {
            self.free_chain(entry.start_cluster)?
        } else {
            0
        };
        self.adjust_free_clusters(FreeCountUpdate::Add, freed);
        log::info!(
            "Deleted '{}' ({} bytes, {} cluster(s) freed)",
            entry.name,
            entry.size,
            freed
        );
        Ok(())
    }
}

/// Names a new file may carry.
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Fat32Error::invalid_file_name(name, "empty name"));
    }
    if name == "." || name == ".." {
        return Err(Fat32Error::invalid_file_name(name, "reserved name"));
    }
    if name.encode_utf16().count() > MAX_LONG_NAME {
        return Err(Fat32Error::invalid_file_name(
            name,
            format!("longer than {} characters", MAX_LONG_NAME),
        ));
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_control() || RESERVED_CHARS.contains(c))
    {
        return Err(Fat32Error::invalid_file_name(
            name,
            format!("reserved character {:?}", c),
        ));
    }
    Ok(())
}
