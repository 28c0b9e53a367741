//! Name lookup inside a directory
//!
//! Matching is case-insensitive. A `*` is a single truncation point: the
//! characters before the first `*` must prefix the entry's name and
//! everything after it is ignored. There is no `?` and no other glob
//! syntax.

use super::directory::SlotPosition;
use super::entry::{pack_short_name, Fat32FileEntry};
use super::lfn::{is_long_filename, short_name_with_tail};
use super::volume::Fat32Volume;
use crate::error::{Fat32Error, Result};
use crate::platform::BlockDevice;

const WILDCARD: char = '*';
const MAX_NUMERIC_TAIL: u8 = 9;

/// A parsed search name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern {
    /// Uppercased name, cut at the wildcard
    upper: String,
    wildcard: bool,
    /// Canonical 8.3 form of a plain short name
    short: Option<[u8; 11]>,
}

impl NamePattern {
    pub fn new(name: &str) -> Self {
        let (prefix, wildcard) = match name.find(WILDCARD) {
            Some(at) => (&name[..at], true),
            None => (name, false),
        };
        let short = if wildcard || is_long_filename(prefix) {
            None
        } else {
            pack_short_name(prefix)
        };
        Self {
            upper: prefix.to_uppercase(),
            wildcard,
            short,
        }
    }

    pub fn has_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Whether the query is a plain 8.3 name.
    pub fn is_short(&self) -> bool {
        self.short.is_some()
    }

    pub fn matches(&self, entry: &Fat32FileEntry) -> bool {
        let long = entry.long_name.as_deref().map(str::to_uppercase);
        if self.wildcard {
            return long.as_deref().is_some_and(|l| l.starts_with(&self.upper))
                || entry.short_display_name().starts_with(&self.upper);
        }
        if long.as_deref() == Some(self.upper.as_str()) {
            return true;
        }
        match self.short {
            Some(short) => entry.short_name == short,
            None => long.is_none() && entry.short_display_name() == self.upper,
        }
    }
}

impl<D: BlockDevice> Fat32Volume<D> {
    /// First entry of the root directory matching `name`.
    pub fn find_file(&mut self, name: &str) -> Result<Option<Fat32FileEntry>> {
        let root = self.session.root_cluster;
        self.find_file_in(name, root)
    }

    /// First entry of the directory at `dir_cluster` matching `name`, in
    /// directory order. Volume labels never match.
    pub fn find_file_in(&mut self, name: &str, dir_cluster: u32) -> Result<Option<Fat32FileEntry>> {
        let pattern = NamePattern::new(name);
        let mut cursor = self.open_directory(dir_cluster)?;
        while let Some(entry) = self.next_entry(&mut cursor)? {
            if entry.is_volume_label() {
                continue;
            }
            if pattern.matches(&entry) {
                log::debug!(
                    "find_file: '{}' matched '{}' at cluster {}",
                    name,
                    entry.name,
                    entry.start_cluster
                );
                return Ok(Some(entry));
            }
        }
        log::debug!("find_file: '{}' not found in directory {}", name, dir_cluster);
        Ok(None)
    }

    /// Short alias for `long_name` whose numeric tail is not yet used in
    /// the directory. The entry at `skip` (a file about to be replaced)
    /// does not count.
    pub(crate) fn unique_short_name(
        &mut self,
        long_name: &str,
        dir_cluster: u32,
        skip: Option<SlotPosition>,
    ) -> Result<[u8; 11]> {
        let ext = self.options.short_name_extension;
        let candidates: Vec<[u8; 11]> = (1..=MAX_NUMERIC_TAIL)
            .map(|tail| short_name_with_tail(long_name, ext, tail))
            .collect();
        let mut taken = [false; MAX_NUMERIC_TAIL as usize];

        let mut cursor = self.open_directory(dir_cluster)?;
        while let Some(entry) = self.next_entry(&mut cursor)? {
            if Some(entry.location) == skip {
                continue;
            }
            if let Some(i) = candidates.iter().position(|c| *c == entry.short_name) {
                taken[i] = true;
            }
        }
        candidates
            .iter()
            .zip(taken.iter())
            .find(|(_, taken)| !**taken)
            .map(|(candidate, _)| *candidate)
            .ok_or_else(|| Fat32Error::already_exists(long_name))
    }

    /// Whether some entry other than the one at `skip` already uses
    /// `short_name`.
    pub(crate) fn short_name_in_use(
        &mut self,
        short_name: &[u8; 11],
        dir_cluster: u32,
        skip: Option<SlotPosition>,
    ) -> Result<bool> {
        let mut cursor = self.open_directory(dir_cluster)?;
        while let Some(entry) = self.next_entry(&mut cursor)? {
            if entry.short_name == *short_name && Some(entry.location) != skip {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fat32::entry::ShortEntry;
    use crate::fat32::SlotPosition;

    fn entry(short: &[u8; 11], long: Option<&str>) -> Fat32FileEntry {
        Fat32FileEntry::new(
            &ShortEntry::new_file(*short, 3, 10),
            long.map(str::to_string),
            SlotPosition::default(),
            Vec::new(),
        )
    }

    #[test]
    fn short_queries_compare_canonical_names() {
        let e = entry(b"TEST    BIN", None);
        assert!(NamePattern::new("test.bin").matches(&e));
        assert!(NamePattern::new("TEST.BIN").matches(&e));
        assert!(!NamePattern::new("TEST.BI").matches(&e));
        assert!(!NamePattern::new("TEST").matches(&e));
    }

    #[test]
    fn long_queries_compare_long_names_case_insensitively() {
        let e = entry(b"VERYLO~1PRG", Some("VeryLongFileName.txt"));
        assert!(NamePattern::new("verylongfilename.TXT").matches(&e));
        assert!(!NamePattern::new("verylongfilename").matches(&e));
    }

    #[test]
    fn alias_still_finds_long_named_entries() {
        let e = entry(b"VERYLO~1PRG", Some("VeryLongFileName.txt"));
        assert!(NamePattern::new("verylo~1.prg").matches(&e));
    }

    #[test]
    fn wildcard_truncates_the_comparison() {
        let short = entry(b"GAME    PRG", None);
        let long = entry(b"SPACE_~1PRG", Some("Space Invaders"));
        assert!(NamePattern::new("GA*").matches(&short));
        assert!(NamePattern::new("game.p*").matches(&short));
        assert!(NamePattern::new("space i*").matches(&long));
        assert!(NamePattern::new("*").matches(&short));
        assert!(NamePattern::new("*").matches(&long));
        assert!(!NamePattern::new("GB*").matches(&short));
        // Only one truncation point: everything after `*` is ignored
        assert!(NamePattern::new("GA*XYZ").matches(&short));
    }
}
