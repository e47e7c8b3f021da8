//! Filesystem vocabulary and the platform backends the cache reads through.
/// Host filesystem backend.
pub mod local;
/// Simulated in-memory filesystem backend.
pub mod memory;
/// The boundary between the cache and a filesystem.
pub mod platform;

pub use local::LocalPlatform;
pub use memory::MemoryPlatform;
pub use platform::Platform;

use std::time::SystemTime;

use crate::name::Name;

/// What a platform reports an entry to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A directory.
    Directory,
    /// A regular file.
    File,
    /// Anything else: devices, sockets, dangling links.
    Other,
}

/// What a cache object currently represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// A directory.
    Directory,
    /// A regular file.
    File,
    /// Anything else that exists.
    Other,
    /// A name known not to exist.
    Missing,
}

impl From<EntryKind> for ObjectKind {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Directory => Self::Directory,
            EntryKind::File => Self::File,
            EntryKind::Other => Self::Other,
        }
    }
}

impl ObjectKind {
    /// Whether this is [`ObjectKind::Missing`].
    #[must_use]
    pub const fn is_missing(self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Whether this is [`ObjectKind::Directory`].
    #[must_use]
    pub const fn is_dir(self) -> bool {
        matches!(self, Self::Directory)
    }
}

/// The tuple that identifies a file independently of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    /// Volume serial or device number.
    pub volume: u64,
    /// File index or inode number.
    pub file_id: u64,
}

/// Cached attributes of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attributes {
    /// Size in bytes.
    pub size: u64,
    /// Last-write time.
    pub modified: Option<SystemTime>,
    /// Creation time, where the platform records one.
    pub created: Option<SystemTime>,
    /// Mode bits, or the attribute word on platforms without modes.
    pub mode: u32,
}

/// One answer from an attribute query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// What the entry is.
    pub kind: EntryKind,
    /// Its attributes.
    pub attrs: Attributes,
    /// Its identity, if the platform can tell.
    pub identity: Option<FileIdentity>,
    /// Whether another volume is mounted on this entry.
    pub mount_point: bool,
}

/// One entry returned by directory enumeration or a single-name query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDirEntry {
    /// The long name.
    pub name: Name,
    /// The short (8.3) alias, if the platform keeps one.
    pub short_name: Option<Name>,
    /// What the platform knows about the entry.
    pub stat: Stat,
}
