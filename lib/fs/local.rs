//! A platform that reads the host filesystem through `std::fs`.
use std::fs::{self, Metadata, ReadDir};
use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::fs::{Attributes, EntryKind, FileIdentity, Platform, RawDirEntry, Stat};
use crate::name::Name;
use crate::path::{self, PathStyle, RootSpec};

const BATCH: usize = 256;

/// An open directory on the host.
#[derive(Debug)]
pub struct LocalHandle {
    path: PathBuf,
    entries: Option<ReadDir>,
    dev: Option<u64>,
}

/// The host filesystem.
///
/// Symlinks are followed; a link whose target is gone is reported as [`EntryKind::Other`].
/// A directory whose device differs from its parent's is reported as a mount point.
#[derive(Debug, Clone, Copy)]
pub struct LocalPlatform {
    style: PathStyle,
}

impl Default for LocalPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn identity(meta: &Metadata) -> Option<FileIdentity> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt as _;
        Some(FileIdentity {
            volume: meta.dev(),
            file_id: meta.ino(),
        })
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        None
    }
}

fn mode(meta: &Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt as _;
        meta.mode()
    }
    #[cfg(not(unix))]
    {
        u32::from(meta.permissions().readonly())
    }
}

fn stat_path(path: &Path) -> io::Result<Stat> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        // Dangling symlink.
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::symlink_metadata(path)?,
        Err(e) => return Err(e),
    };
    let kind = if meta.is_dir() {
        EntryKind::Directory
    } else if meta.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    };
    Ok(Stat {
        kind,
        attrs: Attributes {
            size: meta.len(),
            modified: meta.modified().ok(),
            created: meta.created().ok(),
            mode: mode(&meta),
        },
        identity: identity(&meta),
        mount_point: false,
    })
}

fn entry_for(parent_dev: Option<u64>, name: Name, path: &Path) -> io::Result<RawDirEntry> {
    let mut stat = stat_path(path)?;
    stat.mount_point = stat.kind == EntryKind::Directory
        && parent_dev.is_some()
        && stat.identity.map(|id| id.volume) != parent_dev;
    Ok(RawDirEntry {
        name,
        short_name: None,
        stat,
    })
}

impl LocalPlatform {
    /// A platform using the host's path conventions.
    #[must_use]
    pub fn new() -> Self {
        let style = if cfg!(windows) {
            PathStyle::Windows
        } else {
            PathStyle::Posix
        };
        Self { style }
    }

    /// The path style this platform expects.
    #[must_use]
    pub fn style(&self) -> PathStyle {
        self.style
    }

    fn open_path(path: PathBuf) -> io::Result<LocalHandle> {
        let stat = stat_path(&path)?;
        if stat.kind != EntryKind::Directory {
            return Err(io::Error::from(io::ErrorKind::NotADirectory));
        }
        Ok(LocalHandle {
            path,
            entries: None,
            dev: stat.identity.map(|id| id.volume),
        })
    }
}

impl Platform for LocalPlatform {
    type Handle = LocalHandle;

    fn open_root(&self, root: &RootSpec) -> io::Result<LocalHandle> {
        let path = match (root, self.style) {
            (RootSpec::Posix, PathStyle::Posix) => PathBuf::from("/"),
            (RootSpec::Drive(letter), PathStyle::Windows) => {
                PathBuf::from(format!("{}:\\", char::from(*letter)))
            }
            (RootSpec::Share { server, share }, PathStyle::Windows) => {
                PathBuf::from(format!("\\\\{server}\\{share}\\"))
            }
            _ => return Err(io::Error::from(io::ErrorKind::Unsupported)),
        };
        Self::open_path(path)
    }

    fn open_dir(&self, parent: &LocalHandle, name: &Name) -> io::Result<LocalHandle> {
        Self::open_path(parent.path.join(name.to_os_string()))
    }

    fn read_dir_batch(
        &self,
        handle: &mut LocalHandle,
        restart: bool,
    ) -> io::Result<Option<Vec<RawDirEntry>>> {
        if restart {
            handle.entries = Some(fs::read_dir(&handle.path)?);
        }
        let Some(entries) = handle.entries.as_mut() else {
            return Ok(None);
        };

        let mut batch = Vec::new();
        for entry in entries.by_ref().take(BATCH) {
            let entry = entry?;
            let path = entry.path();
            let name = Name::from_os_str(&entry.file_name());
            match entry_for(handle.dev, name, &path) {
                Ok(raw) => batch.push(raw),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    trace!(path = ?path, "entry vanished during enumeration");
                }
                Err(e) => return Err(e),
            }
        }
        if batch.is_empty() {
            handle.entries = None;
            return Ok(None);
        }
        Ok(Some(batch))
    }

    fn stat_handle(&self, handle: &LocalHandle) -> io::Result<Stat> {
        stat_path(&handle.path)
    }

    fn stat_child(&self, parent: &LocalHandle, name: &Name) -> io::Result<RawDirEntry> {
        let path = parent.path.join(name.to_os_string());
        entry_for(parent.dev, name.clone(), &path)
    }

    fn absolutize(&self, path: &[u8]) -> io::Result<Vec<u8>> {
        let cwd = std::env::current_dir()?;
        let cwd = Name::from_os_str(cwd.as_os_str());
        path::absolutize_lexically(self.style, cwd.as_bytes(), path)
    }
}
