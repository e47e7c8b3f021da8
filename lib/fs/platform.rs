use std::io;

use crate::fs::{RawDirEntry, Stat};
use crate::name::Name;
use crate::path::RootSpec;

/// A filesystem the cache can read through.
///
/// Every method is called with the cache lock held, so implementations must not call back
/// into the cache. Errors are reported as [`io::Error`]; the cache maps `NotFound`,
/// `NotADirectory` and `PermissionDenied` onto its own taxonomy.
pub trait Platform: Send + Sync + 'static {
    /// An open directory. The cache keeps one per directory object and reuses it for every
    /// enumeration and child query until the directory is destroyed or found deleted.
    type Handle: Send + 'static;

    /// Open the root of a drive, share or posix tree.
    fn open_root(&self, root: &RootSpec) -> io::Result<Self::Handle>;

    /// Open the child directory `name` of `parent`.
    fn open_dir(&self, parent: &Self::Handle, name: &Name) -> io::Result<Self::Handle>;

    /// Read the next batch of entries.
    ///
    /// `restart` rewinds the handle to the first entry. Returns `Ok(None)` once the listing is
    /// exhausted. Implementations may or may not report `.` and `..`; the cache skips them.
    fn read_dir_batch(
        &self,
        handle: &mut Self::Handle,
        restart: bool,
    ) -> io::Result<Option<Vec<RawDirEntry>>>;

    /// Query the attributes of the directory behind `handle`.
    ///
    /// The cache compares the modified time reported here against the one it recorded at the
    /// last enumeration to decide whether cached negative entries are still valid.
    fn stat_handle(&self, handle: &Self::Handle) -> io::Result<Stat>;

    /// Query a single name inside the directory behind `parent`.
    fn stat_child(&self, parent: &Self::Handle, name: &Name) -> io::Result<RawDirEntry>;

    /// Turn a relative, drive-relative or dotted byte path into an absolute one free of `.`
    /// and `..` components.
    fn absolutize(&self, path: &[u8]) -> io::Result<Vec<u8>>;

    /// Wide counterpart of [`absolutize`](Self::absolutize).
    ///
    /// The default round-trips through UTF-8.
    fn absolutize_wide(&self, path: &[u16]) -> io::Result<Vec<u16>> {
        let narrow = String::from_utf16(path)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let absolute = self.absolutize(narrow.as_bytes())?;
        Ok(String::from_utf8_lossy(&absolute).encode_utf16().collect())
    }
}
