//! fscache shared library.
//!
//! An in-process filesystem metadata cache: directory trees, attributes and path lookup
//! results (including negative ones) are memoized, and invalidated by bumping generation
//! counters rather than by tearing anything down.

/// The cache itself.
pub mod cache;
pub mod error;
/// Filesystem vocabulary and platform backends.
pub mod fs;
/// String hashing used by the child index.
pub mod hash;
pub mod name;
pub mod options;
/// Path styles and root specifiers.
pub mod path;
pub mod sync;

pub use cache::{
    CacheStats, CustomInvalidation, FsCache, LookupFlags, NameForm, ObjFlags, ObjId, ObjectInfo,
    ObjectRef, UserDataKey,
};
pub use error::{CacheError, LookupFailure, Result};
pub use fs::{
    Attributes, EntryKind, FileIdentity, LocalPlatform, MemoryPlatform, ObjectKind, Platform,
    RawDirEntry, Stat,
};
pub use name::Name;
pub use options::CacheOptions;
pub use path::{PathStyle, RootSpec};
