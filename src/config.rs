//! Mount-time configuration

/// Options controlling how a volume is mounted and maintained.
#[derive(Debug, Clone)]
pub struct MountOptions {
    /// Attempts made for each FAT sector read before giving up
    pub read_retries: u8,
    /// Extension placed in generated short names (`NAME~1.EXT`)
    pub short_name_extension: [u8; 3],
    /// Replace an existing file of the same name when a written file is closed
    pub replace_existing: bool,
    /// Write FAT updates to every FAT copy, not only the first
    pub mirror_fats: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            read_retries: 10,
            short_name_extension: *b"PRG",
            replace_existing: true,
            mirror_fats: true,
        }
    }
}

impl MountOptions {
    pub fn read_retries(mut self, retries: u8) -> Self {
        self.read_retries = retries.max(1);
        self
    }

    /// Sets the generated short-name extension. Lowercase letters are
    /// uppercased; anything shorter than three characters is space padded.
    pub fn short_name_extension(mut self, ext: &str) -> Self {
        let mut out = [b' '; 3];
        for (slot, b) in out.iter_mut().zip(ext.bytes()) {
            *slot = b.to_ascii_uppercase();
        }
        self.short_name_extension = out;
        self
    }

    pub fn replace_existing(mut self, replace: bool) -> Self {
        self.replace_existing = replace;
        self
    }

    pub fn mirror_fats(mut self, mirror: bool) -> Self {
        self.mirror_fats = mirror;
        self
    }
}
