//! A simulated filesystem for tests and embedders' tests.
//!
//! [`MemoryPlatform`] keeps a tree of directories and files in memory, in either path style,
//! and implements [`Platform`] over it. Mutations advance a simulated clock and bump the
//! modified time of the parent directory the way a real filesystem would, so the cache's
//! change detection can be exercised deterministically. Every enumeration, attribute query
//! and handle open is counted.

use std::io;
use std::time::{Duration, SystemTime};

use rustc_hash::FxHashMap;

use crate::fs::{Attributes, EntryKind, FileIdentity, Platform, RawDirEntry, Stat};
use crate::name::{Name, units_eq};
use crate::path::{self, Parsed, PathStyle, RootSpec};
use crate::sync::atomic::{AtomicUsize, Ordering};
use crate::sync::{Arc, Mutex, lock};

const VOLUME: u64 = 1;
const MOUNTED_VOLUME: u64 = 2;
const DEFAULT_BATCH: usize = 64;

struct MemNode {
    name: Name,
    short_name: Option<Name>,
    parent: Option<u64>,
    kind: EntryKind,
    size: u64,
    created: SystemTime,
    modified: SystemTime,
    /// Attributes of the volume mounted here, if any.
    mount: Option<Attributes>,
    children: Vec<u64>,
}

/// Fails the next enumeration of a directory after `after` entries.
struct InjectedFailure {
    after: usize,
}

struct Tree {
    nodes: FxHashMap<u64, MemNode>,
    roots: FxHashMap<RootSpec, u64>,
    next_id: u64,
    clock: SystemTime,
    cwd: Vec<u8>,
    batch_size: usize,
    enumerations_by_dir: FxHashMap<u64, usize>,
    failures: FxHashMap<u64, InjectedFailure>,
}

struct Inner {
    style: PathStyle,
    case_sensitive: bool,
    tree: Mutex<Tree>,
    enumerations: AtomicUsize,
    stat_calls: AtomicUsize,
    open_calls: AtomicUsize,
}

/// An open directory of a [`MemoryPlatform`].
#[derive(Debug)]
pub struct MemoryHandle {
    id: u64,
    cursor: usize,
    dots_sent: bool,
}

/// An in-memory [`Platform`].
#[derive(Clone)]
pub struct MemoryPlatform {
    inner: Arc<Inner>,
}

fn not_found() -> io::Error {
    io::Error::from(io::ErrorKind::NotFound)
}

fn not_a_directory() -> io::Error {
    io::Error::from(io::ErrorKind::NotADirectory)
}

fn invalid(path: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{path:?} is not an absolute path"),
    )
}

impl Tree {
    fn tick(&mut self) -> SystemTime {
        self.clock += Duration::from_secs(1);
        self.clock
    }

    fn node(&self, id: u64) -> io::Result<&MemNode> {
        self.nodes.get(&id).ok_or_else(not_found)
    }

    fn dir(&self, id: u64) -> io::Result<&MemNode> {
        let node = self.node(id)?;
        if node.kind == EntryKind::Directory {
            Ok(node)
        } else {
            Err(not_a_directory())
        }
    }

    fn alloc(&mut self, node: MemNode) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    fn touch_dir(&mut self, id: u64) {
        let now = self.tick();
        if let Some(node) = self.nodes.get_mut(&id) {
            node.modified = now;
        }
    }

    fn stat(&self, id: u64) -> io::Result<Stat> {
        let node = self.node(id)?;
        let mode = match node.kind {
            EntryKind::Directory => 0o040_755,
            EntryKind::File => 0o100_644,
            EntryKind::Other => 0o020_644,
        };
        Ok(Stat {
            kind: node.kind,
            attrs: Attributes {
                size: node.size,
                modified: Some(node.modified),
                created: Some(node.created),
                mode,
            },
            identity: Some(FileIdentity {
                volume: VOLUME,
                file_id: id,
            }),
            mount_point: node.mount.is_some(),
        })
    }

    fn entry(&self, id: u64) -> io::Result<RawDirEntry> {
        let node = self.node(id)?;
        Ok(RawDirEntry {
            name: node.name.clone(),
            short_name: node.short_name.clone(),
            stat: self.stat(id)?,
        })
    }

    fn remove_subtree(&mut self, id: u64) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                stack.extend(node.children);
            }
            self.failures.remove(&id);
        }
    }
}

impl MemoryPlatform {
    /// An empty tree with drive letters and case-insensitive names.
    #[must_use]
    pub fn windows() -> Self {
        Self::new(PathStyle::Windows, false, br"C:\".to_vec())
    }

    /// An empty tree with a `/` root and case-sensitive names.
    #[must_use]
    pub fn posix() -> Self {
        let platform = Self::new(PathStyle::Posix, true, b"/".to_vec());
        {
            let mut tree = lock(&platform.inner.tree);
            let now = tree.clock;
            let root = tree.alloc(MemNode {
                name: Name::from(""),
                short_name: None,
                parent: None,
                kind: EntryKind::Directory,
                size: 0,
                created: now,
                modified: now,
                mount: None,
                children: Vec::new(),
            });
            tree.roots.insert(RootSpec::Posix, root);
        }
        platform
    }

    fn new(style: PathStyle, case_sensitive: bool, cwd: Vec<u8>) -> Self {
        let tree = Tree {
            nodes: FxHashMap::default(),
            roots: FxHashMap::default(),
            next_id: 1,
            clock: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000),
            cwd,
            batch_size: DEFAULT_BATCH,
            enumerations_by_dir: FxHashMap::default(),
            failures: FxHashMap::default(),
        };
        Self {
            inner: Arc::new(Inner {
                style,
                case_sensitive,
                tree: Mutex::new(tree),
                enumerations: AtomicUsize::new(0),
                stat_calls: AtomicUsize::new(0),
                open_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// The path style this tree is addressed in.
    #[must_use]
    pub fn style(&self) -> PathStyle {
        self.inner.style
    }

    fn find_child(&self, tree: &Tree, dir: u64, name: &[u8]) -> io::Result<Option<u64>> {
        let node = tree.dir(dir)?;
        Ok(node.children.iter().copied().find(|id| {
            tree.nodes.get(id).is_some_and(|child| {
                child.name.matches(name, self.inner.case_sensitive)
                    || child
                        .short_name
                        .as_ref()
                        .is_some_and(|s| s.matches(name, self.inner.case_sensitive))
            })
        }))
    }

    fn split<'a>(&self, path: &'a str) -> io::Result<(RootSpec, Vec<&'a [u8]>)> {
        match path::parse(path.as_bytes(), self.inner.style, usize::MAX) {
            Ok(Parsed::Walkable(parsed)) => Ok((
                parsed.root.key(self.inner.case_sensitive),
                parsed.components,
            )),
            _ => Err(invalid(path)),
        }
    }

    /// Resolve `path` to a node id.
    fn resolve(&self, tree: &Tree, path: &str) -> io::Result<u64> {
        let (root, components) = self.split(path)?;
        let mut id = *tree.roots.get(&root).ok_or_else(not_found)?;
        for component in components {
            id = self.find_child(tree, id, component)?.ok_or_else(not_found)?;
        }
        Ok(id)
    }

    /// Resolve the parent of `path`, returning its id and the final name.
    fn resolve_parent<'a>(&self, tree: &Tree, path: &'a str) -> io::Result<(u64, &'a [u8])> {
        let (root, mut components) = self.split(path)?;
        let leaf = components.pop().ok_or_else(|| invalid(path))?;
        let mut id = *tree.roots.get(&root).ok_or_else(not_found)?;
        for component in components {
            id = self.find_child(tree, id, component)?.ok_or_else(not_found)?;
        }
        tree.dir(id)?;
        Ok((id, leaf))
    }

    fn insert(&self, tree: &mut Tree, parent: u64, name: &[u8], kind: EntryKind, size: u64) -> u64 {
        let now = tree.tick();
        let id = tree.alloc(MemNode {
            name: Name::from_bytes(name),
            short_name: None,
            parent: Some(parent),
            kind,
            size,
            created: now,
            modified: now,
            mount: None,
            children: Vec::new(),
        });
        if let Some(dir) = tree.nodes.get_mut(&parent) {
            dir.children.push(id);
            dir.modified = now;
        }
        id
    }

    /// Create a directory and any missing ancestors, including the drive or share root.
    pub fn mkdir_p(&self, path: &str) -> io::Result<()> {
        let (root, components) = self.split(path)?;
        let mut tree = lock(&self.inner.tree);
        let mut id = if let Some(id) = tree.roots.get(&root) {
            *id
        } else {
            let now = tree.tick();
            let id = tree.alloc(MemNode {
                name: root.name(),
                short_name: None,
                parent: None,
                kind: EntryKind::Directory,
                size: 0,
                created: now,
                modified: now,
                mount: None,
                children: Vec::new(),
            });
            tree.roots.insert(root, id);
            id
        };
        for component in components {
            id = match self.find_child(&tree, id, component)? {
                Some(child) => {
                    tree.dir(child)?;
                    child
                }
                None => self.insert(&mut tree, id, component, EntryKind::Directory, 0),
            };
        }
        Ok(())
    }

    fn create(&self, path: &str, kind: EntryKind, size: u64) -> io::Result<()> {
        let mut tree = lock(&self.inner.tree);
        let (parent, leaf) = self.resolve_parent(&tree, path)?;
        match self.find_child(&tree, parent, leaf)? {
            Some(existing) => {
                let now = tree.tick();
                let node = tree.nodes.get_mut(&existing).ok_or_else(not_found)?;
                if node.kind == EntryKind::Directory {
                    return Err(io::Error::from(io::ErrorKind::AlreadyExists));
                }
                node.size = size;
                node.modified = now;
            }
            None => {
                self.insert(&mut tree, parent, leaf, kind, size);
            }
        }
        Ok(())
    }

    /// Create a regular file, or overwrite an existing one with a new size.
    pub fn create_file(&self, path: &str, size: u64) -> io::Result<()> {
        self.create(path, EntryKind::File, size)
    }

    /// Create something that is neither a file nor a directory.
    pub fn create_other(&self, path: &str) -> io::Result<()> {
        self.create(path, EntryKind::Other, 0)
    }

    /// Remove a file or a whole directory tree.
    pub fn remove(&self, path: &str) -> io::Result<()> {
        let mut tree = lock(&self.inner.tree);
        let id = self.resolve(&tree, path)?;
        let parent = tree.node(id)?.parent.ok_or_else(|| invalid(path))?;
        if let Some(dir) = tree.nodes.get_mut(&parent) {
            dir.children.retain(|c| *c != id);
        }
        tree.remove_subtree(id);
        tree.touch_dir(parent);
        Ok(())
    }

    /// Move `from` to `to`, replacing whatever `to` names. The file id is kept.
    pub fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let mut tree = lock(&self.inner.tree);
        let id = self.resolve(&tree, from)?;
        let old_parent = tree.node(id)?.parent.ok_or_else(|| invalid(from))?;
        let (new_parent, leaf) = self.resolve_parent(&tree, to)?;
        if let Some(existing) = self.find_child(&tree, new_parent, leaf)?
            && existing != id
        {
            if let Some(dir) = tree.nodes.get_mut(&new_parent) {
                dir.children.retain(|c| *c != existing);
            }
            tree.remove_subtree(existing);
        }
        if let Some(dir) = tree.nodes.get_mut(&old_parent) {
            dir.children.retain(|c| *c != id);
        }
        if let Some(node) = tree.nodes.get_mut(&id) {
            node.name = Name::from_bytes(leaf);
            node.short_name = None;
            node.parent = Some(new_parent);
        }
        if let Some(dir) = tree.nodes.get_mut(&new_parent) {
            dir.children.push(id);
        }
        tree.touch_dir(old_parent);
        tree.touch_dir(new_parent);
        Ok(())
    }

    /// Give an entry a short (8.3) alias.
    pub fn set_short_name(&self, path: &str, short: &str) -> io::Result<()> {
        let mut tree = lock(&self.inner.tree);
        let id = self.resolve(&tree, path)?;
        if let Some(node) = tree.nodes.get_mut(&id) {
            node.short_name = Some(Name::from(short));
        }
        Ok(())
    }

    /// Mount a volume on a directory. Enumeration of the parent reports it as a mount point
    /// and attribute queries on a handle to it report `target`.
    pub fn set_mount_point(&self, path: &str, target: Attributes) -> io::Result<()> {
        let mut tree = lock(&self.inner.tree);
        let id = self.resolve(&tree, path)?;
        tree.dir(id)?;
        if let Some(node) = tree.nodes.get_mut(&id) {
            node.mount = Some(target);
        }
        Ok(())
    }

    /// Bump the modified time of an entry without touching its parent.
    pub fn touch(&self, path: &str) -> io::Result<()> {
        let mut tree = lock(&self.inner.tree);
        let id = self.resolve(&tree, path)?;
        tree.touch_dir(id);
        Ok(())
    }

    /// Make the next enumeration of `dir` fail after it has returned `after` entries.
    pub fn fail_enumeration(&self, dir: &str, after: usize) -> io::Result<()> {
        let mut tree = lock(&self.inner.tree);
        let id = self.resolve(&tree, dir)?;
        tree.dir(id)?;
        tree.failures.insert(id, InjectedFailure { after });
        Ok(())
    }

    /// Set the directory relative paths are resolved against.
    pub fn set_cwd(&self, path: &str) {
        lock(&self.inner.tree).cwd = path.as_bytes().to_vec();
    }

    /// Set how many entries each enumeration batch returns.
    pub fn set_batch_size(&self, entries: usize) {
        lock(&self.inner.tree).batch_size = entries.max(1);
    }

    /// Identity of the entry at `path`.
    pub fn identity(&self, path: &str) -> io::Result<FileIdentity> {
        let tree = lock(&self.inner.tree);
        let id = self.resolve(&tree, path)?;
        Ok(FileIdentity {
            volume: VOLUME,
            file_id: id,
        })
    }

    /// Number of enumerations started, across all directories.
    #[must_use]
    pub fn enumerations(&self) -> usize {
        self.inner.enumerations.load(Ordering::Relaxed)
    }

    /// Number of enumerations of the directory currently at `path`.
    #[must_use]
    pub fn enumerations_of(&self, path: &str) -> usize {
        let tree = lock(&self.inner.tree);
        self.resolve(&tree, path)
            .ok()
            .and_then(|id| tree.enumerations_by_dir.get(&id).copied())
            .unwrap_or(0)
    }

    /// Number of attribute queries, on handles and on single names.
    #[must_use]
    pub fn stat_calls(&self) -> usize {
        self.inner.stat_calls.load(Ordering::Relaxed)
    }

    /// Number of root and directory handles opened.
    #[must_use]
    pub fn open_calls(&self) -> usize {
        self.inner.open_calls.load(Ordering::Relaxed)
    }

    /// Total platform calls that touch the simulated disk.
    #[must_use]
    pub fn io_calls(&self) -> usize {
        self.enumerations() + self.stat_calls() + self.open_calls()
    }

    /// Zero every counter.
    pub fn reset_counters(&self) {
        self.inner.enumerations.store(0, Ordering::Relaxed);
        self.inner.stat_calls.store(0, Ordering::Relaxed);
        self.inner.open_calls.store(0, Ordering::Relaxed);
        lock(&self.inner.tree).enumerations_by_dir.clear();
    }
}

impl Platform for MemoryPlatform {
    type Handle = MemoryHandle;

    fn open_root(&self, root: &RootSpec) -> io::Result<MemoryHandle> {
        self.inner.open_calls.fetch_add(1, Ordering::Relaxed);
        let tree = lock(&self.inner.tree);
        let id = *tree
            .roots
            .get(&root.key(self.inner.case_sensitive))
            .ok_or_else(not_found)?;
        Ok(MemoryHandle {
            id,
            cursor: 0,
            dots_sent: false,
        })
    }

    fn open_dir(&self, parent: &MemoryHandle, name: &Name) -> io::Result<MemoryHandle> {
        self.inner.open_calls.fetch_add(1, Ordering::Relaxed);
        let tree = lock(&self.inner.tree);
        let id = self
            .find_child(&tree, parent.id, name.as_bytes())?
            .ok_or_else(not_found)?;
        tree.dir(id)?;
        Ok(MemoryHandle {
            id,
            cursor: 0,
            dots_sent: false,
        })
    }

    fn read_dir_batch(
        &self,
        handle: &mut MemoryHandle,
        restart: bool,
    ) -> io::Result<Option<Vec<RawDirEntry>>> {
        let mut tree = lock(&self.inner.tree);
        if restart {
            handle.cursor = 0;
            handle.dots_sent = false;
            self.inner.enumerations.fetch_add(1, Ordering::Relaxed);
            *tree.enumerations_by_dir.entry(handle.id).or_default() += 1;
        }
        let dir = tree.dir(handle.id)?;
        let is_root = dir.parent.is_none();
        let children = dir.children.clone();
        let batch_size = tree.batch_size;

        let mut batch = Vec::new();
        if !handle.dots_sent {
            handle.dots_sent = true;
            if !is_root && self.inner.style == PathStyle::Windows {
                let dot = tree.stat(handle.id)?;
                for name in [".", ".."] {
                    batch.push(RawDirEntry {
                        name: Name::from(name),
                        short_name: None,
                        stat: dot.clone(),
                    });
                }
            }
        }

        let fail_at = tree.failures.get(&handle.id).map(|f| f.after);
        while batch.len() < batch_size && handle.cursor < children.len() {
            if fail_at == Some(handle.cursor) {
                tree.failures.remove(&handle.id);
                return Err(io::Error::other("injected enumeration failure"));
            }
            batch.push(tree.entry(children[handle.cursor])?);
            handle.cursor += 1;
        }
        if batch.is_empty() {
            if fail_at.is_some_and(|at| at >= children.len()) {
                tree.failures.remove(&handle.id);
                return Err(io::Error::other("injected enumeration failure"));
            }
            return Ok(None);
        }
        Ok(Some(batch))
    }

    fn stat_handle(&self, handle: &MemoryHandle) -> io::Result<Stat> {
        self.inner.stat_calls.fetch_add(1, Ordering::Relaxed);
        let tree = lock(&self.inner.tree);
        let mut stat = tree.stat(handle.id)?;
        if let Some(target) = tree.node(handle.id)?.mount {
            stat.attrs = Attributes {
                modified: stat.attrs.modified,
                ..target
            };
            stat.identity = Some(FileIdentity {
                volume: MOUNTED_VOLUME,
                file_id: handle.id,
            });
            stat.mount_point = false;
        }
        Ok(stat)
    }

    fn stat_child(&self, parent: &MemoryHandle, name: &Name) -> io::Result<RawDirEntry> {
        self.inner.stat_calls.fetch_add(1, Ordering::Relaxed);
        let tree = lock(&self.inner.tree);
        let id = self
            .find_child(&tree, parent.id, name.as_bytes())?
            .ok_or_else(not_found)?;
        tree.entry(id)
    }

    fn absolutize(&self, path: &[u8]) -> io::Result<Vec<u8>> {
        let cwd = lock(&self.inner.tree).cwd.clone();
        path::absolutize_lexically(self.inner.style, &cwd, path)
    }
}

impl std::fmt::Debug for MemoryPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tree = lock(&self.inner.tree);
        f.debug_struct("MemoryPlatform")
            .field("style", &self.inner.style)
            .field("nodes", &tree.nodes.len())
            .finish_non_exhaustive()
    }
}
