#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use fscache::{CacheOptions, FsCache, MemoryPlatform, ObjectRef, PathStyle};

pub type MemCache = FsCache<MemoryPlatform>;
pub type MemRef = ObjectRef<MemoryPlatform>;

/// Drive-letter tree:
///
/// ```text
/// C:\a\b\c.txt      (12 bytes)
/// C:\a\b\d.txt      (34 bytes)
/// C:\a\e.txt        (5 bytes)
/// C:\src\main.c     (100 bytes)
/// ```
pub fn windows_tree() -> MemoryPlatform {
    let fs = MemoryPlatform::windows();
    fs.mkdir_p(r"C:\a\b").unwrap();
    fs.mkdir_p(r"C:\src").unwrap();
    fs.create_file(r"C:\a\b\c.txt", 12).unwrap();
    fs.create_file(r"C:\a\b\d.txt", 34).unwrap();
    fs.create_file(r"C:\a\e.txt", 5).unwrap();
    fs.create_file(r"C:\src\main.c", 100).unwrap();
    fs.reset_counters();
    fs
}

/// The same shape under a `/` root.
pub fn posix_tree() -> MemoryPlatform {
    let fs = MemoryPlatform::posix();
    fs.mkdir_p("/a/b").unwrap();
    fs.mkdir_p("/src").unwrap();
    fs.create_file("/a/b/c.txt", 12).unwrap();
    fs.create_file("/a/b/d.txt", 34).unwrap();
    fs.create_file("/a/e.txt", 5).unwrap();
    fs.create_file("/src/main.c", 100).unwrap();
    fs.reset_counters();
    fs
}

pub fn posix_options() -> CacheOptions {
    CacheOptions {
        case_sensitive: true,
        path_style: PathStyle::Posix,
        ..CacheOptions::default()
    }
}

pub fn windows_cache(fs: &MemoryPlatform) -> MemCache {
    FsCache::new(fs.clone(), CacheOptions::default()).unwrap()
}

pub fn posix_cache(fs: &MemoryPlatform) -> MemCache {
    FsCache::new(fs.clone(), posix_options()).unwrap()
}

pub fn cache_with(fs: &MemoryPlatform, options: CacheOptions) -> MemCache {
    FsCache::new(fs.clone(), options).unwrap()
}

/// Look a path up and panic with the error if it fails.
pub fn must(cache: &MemCache, path: &str) -> MemRef {
    cache
        .lookup(path)
        .unwrap_or_else(|e| panic!("lookup of {path} failed: {e}"))
}

/// Sorted names of the present children of `dir`.
pub fn listing(cache: &MemCache, dir: &MemRef) -> Vec<String> {
    let mut names: Vec<String> = cache
        .read_dir(dir)
        .unwrap()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    names.sort();
    names
}
