//! Error types for the fat32-drive library

use std::fmt;
use std::io;

/// Result type for fat32-drive operations
pub type Result<T> = std::result::Result<T, Fat32Error>;

/// Main error type for fat32-drive operations
#[derive(Debug)]
pub enum Fat32Error {
    /// Host I/O error outside of sector transfers (e.g. opening an image)
    Io(io::Error),

    /// A sector could not be read from the block device
    ReadFailed { sector: u32, source: io::Error },

    /// A sector could not be written to the block device
    WriteFailed { sector: u32, source: io::Error },

    /// Neither a FAT32 boot sector nor an MBR pointing at one
    NotFat32 { message: String },

    /// File not found in the searched directory
    NotFound { name: String },

    /// File already exists and replacement is disabled
    AlreadyExists { name: String },

    /// No free clusters available
    NoFreeClusters,

    /// A FAT link was free or out of range where a chain link was expected
    ChainCorrupt { cluster: u32 },

    /// Invalid file name
    InvalidFileName { name: String, reason: String },

    /// The entry is a directory, not a file
    IsADirectory { name: String },
}

impl fmt::Display for Fat32Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::ReadFailed { sector, source } => {
                write!(f, "Failed to read sector {}: {}", sector, source)
            }
            Self::WriteFailed { sector, source } => {
                write!(f, "Failed to write sector {}: {}", sector, source)
            }
            Self::NotFat32 { message } => write!(f, "Not a FAT32 volume: {}", message),
            Self::NotFound { name } => write!(f, "File not found: {}", name),
            Self::AlreadyExists { name } => write!(f, "Already exists: {}", name),
            Self::NoFreeClusters => write!(f, "No free clusters available"),
            Self::ChainCorrupt { cluster } => {
                write!(f, "Corrupt cluster chain at cluster {}", cluster)
            }
            Self::InvalidFileName { name, reason } => {
                write!(f, "Invalid file name '{}': {}", name, reason)
            }
            Self::IsADirectory { name } => write!(f, "Is a directory: {}", name),
        }
    }
}

impl std::error::Error for Fat32Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::ReadFailed { source, .. } | Self::WriteFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Fat32Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<Fat32Error> for io::Error {
    fn from(err: Fat32Error) -> Self {
        let kind = match &err {
            Fat32Error::Io(e) => e.kind(),
            Fat32Error::ReadFailed { source, .. } | Fat32Error::WriteFailed { source, .. } => {
                source.kind()
            }
            Fat32Error::NotFound { .. } => io::ErrorKind::NotFound,
            Fat32Error::AlreadyExists { .. } => io::ErrorKind::AlreadyExists,
            Fat32Error::NoFreeClusters => io::ErrorKind::StorageFull,
            Fat32Error::InvalidFileName { .. } => io::ErrorKind::InvalidInput,
            Fat32Error::IsADirectory { .. } => io::ErrorKind::IsADirectory,
            Fat32Error::NotFat32 { .. } | Fat32Error::ChainCorrupt { .. } => {
                io::ErrorKind::InvalidData
            }
        };
        io::Error::new(kind, err)
    }
}

// Convenience constructors
impl Fat32Error {
    pub fn not_fat32(message: impl Into<String>) -> Self {
        Self::NotFat32 {
            message: message.into(),
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists { name: name.into() }
    }

    pub fn invalid_file_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFileName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn is_a_directory(name: impl Into<String>) -> Self {
        Self::IsADirectory { name: name.into() }
    }
}
