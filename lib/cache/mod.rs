//! The filesystem metadata cache.
//!
//! [`FsCache`] memoizes the directory tree below every drive or share root it has been asked
//! about, and the mapping from full path strings to what they resolved to, including
//! negative results. All state sits behind one mutex; every entry point holds it for its full
//! duration and platform I/O happens under it.
//!
//! Staleness is tracked with generation counters (see [`CustomInvalidation`]). Invalidation
//! never drops cached objects: stale objects are re-validated lazily, on the next lookup that
//! touches them, and keep their identity and user data when they are found unchanged, renamed
//! or re-created.
pub(crate) mod child_index;
pub(crate) mod generation;
pub(crate) mod lookup;
pub(crate) mod object;
pub(crate) mod path_index;
pub(crate) mod populate;
pub(crate) mod user_data;

pub use generation::CustomInvalidation;
pub use lookup::LookupFlags;
pub use object::{ObjFlags, ObjId};
pub use user_data::UserDataKey;

use std::any::Any;
use std::fmt;
use std::mem;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, instrument};

use crate::cache::child_index::index_new_child;
use crate::cache::generation::Generations;
use crate::cache::object::{DirData, Node, ObjTable, Object};
use crate::cache::path_index::{PathIndex, PathTarget};
use crate::cache::user_data::{UserDataRecord, bury_all};
use crate::error::{CacheError, Result};
use crate::fs::{Attributes, FileIdentity, ObjectKind, Platform};
use crate::name::{CodeUnit, Name};
use crate::options::CacheOptions;
use crate::path::RootSpec;
use crate::sync::{Arc, Mutex, lock};

/// Counters describing what the cache has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Path lookups served, through any entry point.
    pub lookups: u64,
    /// Lookups answered by a fresh path-index entry.
    pub path_hits: u64,
    /// Lookups with no path-index entry.
    pub path_misses: u64,
    /// Stale path-index entries re-validated without a full walk.
    pub path_revalidations: u64,
    /// Component-by-component walks from a root.
    pub walks: u64,
    /// First enumerations of a directory.
    pub populations: u64,
    /// Re-enumerations of a previously populated directory.
    pub repopulations: u64,
    /// Missing placeholders re-checked against the platform.
    pub missing_refreshes: u64,
    /// Missing placeholders found to exist again.
    pub rebirths: u64,
    /// Objects allocated.
    pub objects_created: u64,
    /// Objects destroyed.
    pub objects_destroyed: u64,
}

/// Which name of each component a materialized path uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameForm {
    /// Long names.
    #[default]
    Long,
    /// Short aliases where one exists, long names elsewhere.
    Short,
}

/// A snapshot of one object's cached state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Arena address.
    pub id: ObjId,
    /// Current kind.
    pub kind: ObjectKind,
    /// Long name.
    pub name: Name,
    /// Short alias.
    pub short_name: Option<Name>,
    /// Cached attributes. `None` for missing placeholders.
    pub attributes: Option<Attributes>,
    /// Identity as last reported by the platform.
    pub identity: Option<FileIdentity>,
    /// State bits.
    pub flags: ObjFlags,
    /// Whether the object is up to date with the current generation.
    pub fresh: bool,
}

/// Everything the cache lock protects.
pub(crate) struct CacheState<H> {
    pub objects: ObjTable<H>,
    pub gens: Generations,
    pub tree_root: ObjId,
    /// Drive, share and posix roots, keyed by [`RootSpec::key`].
    pub roots: FxHashMap<RootSpec, ObjId>,
    pub paths: PathIndex,
    pub options: CacheOptions,
    pub stats: CacheStats,
    /// User data of destroyed objects, buried once the lock is released.
    pub graveyard: Vec<UserDataRecord>,
}

impl<H> CacheState<H> {
    fn new(options: CacheOptions) -> Result<Self> {
        let gens = Generations::new();
        let mut objects = ObjTable::new();
        let mut dir = DirData::new();
        dir.populated = true;
        let mut root = Object::new(
            Node::Directory(Box::new(dir)),
            Name::from(""),
            None,
            gens.current(false, false),
        );
        root.flags = ObjFlags::TREE_ROOT;
        let tree_root = objects.insert(root)?;
        Ok(Self {
            objects,
            gens,
            tree_root,
            roots: FxHashMap::default(),
            paths: PathIndex::new(),
            options,
            stats: CacheStats {
                objects_created: 1,
                ..CacheStats::default()
            },
            graveyard: Vec::new(),
        })
    }

    pub(crate) fn is_fresh(&self, id: ObjId) -> bool {
        self.objects.get(id).is_some_and(|obj| {
            obj.flags.contains(ObjFlags::TREE_ROOT)
                || obj.stamp == self.gens.current(obj.is_missing(), obj.uses_custom())
        })
    }

    /// Mark `id` as up to date with the generation matching its current kind and scope.
    pub(crate) fn restamp(&mut self, id: ObjId) {
        let obj = &self.objects[id];
        let stamp = self.gens.current(obj.is_missing(), obj.uses_custom());
        self.objects[id].stamp = stamp;
    }

    /// Allocate a child of `parent` and attach it. The child inherits the parent's scope.
    pub(crate) fn new_child(
        &mut self,
        parent: ObjId,
        node: Node<H>,
        name: Name,
        short_name: Option<Name>,
    ) -> Result<ObjId> {
        let custom = self.objects[parent].uses_custom();
        let missing = matches!(node, Node::Missing);
        let mut obj = Object::new(node, name, Some(parent), self.gens.current(missing, custom));
        obj.short_name = short_name;
        obj.flags.set(ObjFlags::CUSTOM_GENERATION, custom);
        let id = self.objects.insert(obj)?;
        self.stats.objects_created += 1;
        if let Err(e) = self.attach(parent, id) {
            self.release_with(id, false);
            return Err(e);
        }
        Ok(id)
    }

    /// Append `child` to `parent`'s child list. The parent takes over the child's initial
    /// reference.
    pub(crate) fn attach(&mut self, parent: ObjId, child: ObjId) -> Result<()> {
        let Some(dir) = self.objects[parent].dir_mut() else {
            return Err(CacheError::NotADirectory);
        };
        dir.children.try_reserve(1)?;
        dir.children.push(child);
        index_new_child(&mut self.objects, parent, child);
        Ok(())
    }

    /// Synthesize a missing placeholder for `name` under `parent`.
    pub(crate) fn add_missing(&mut self, parent: ObjId, name: Name) -> Result<ObjId> {
        self.new_child(parent, Node::Missing, name, None)
    }

    fn release_with(&mut self, id: ObjId, detach: bool) {
        let destroyed = self.objects.release(id, detach, &mut self.graveyard);
        self.stats.objects_destroyed += destroyed as u64;
    }

    /// Drop a reference held outside the tree (a caller or a path-index entry).
    pub(crate) fn release(&mut self, id: ObjId) {
        self.release_with(id, false);
    }

    /// Drop the parent's reference on each of `children`.
    pub(crate) fn release_children(&mut self, children: Vec<ObjId>) {
        for child in children {
            self.release_with(child, true);
        }
    }

    /// Remove `id` from its parent's child list and drop the parent's reference.
    pub(crate) fn detach(&mut self, id: ObjId) {
        let Some(parent) = self.objects.get(id).and_then(|obj| obj.parent) else {
            return;
        };
        if let Some(dir) = self.objects[parent].dir_mut() {
            dir.children.retain(|c| *c != id);
            dir.indexes = [None, None];
        }
        self.release_with(id, true);
    }

    /// Turn `id` into a fresh missing placeholder, keeping its identity and user data.
    pub(crate) fn make_missing(&mut self, id: ObjId) {
        let obj = &mut self.objects[id];
        let children = obj.replace_node(Node::Missing);
        obj.attrs = None;
        obj.flags.remove(ObjFlags::MOUNT_POINT | ObjFlags::TARGET_ATTRS);
        self.release_children(children);
        self.restamp(id);
    }

    /// Hand a new reference on `id` to a caller.
    pub(crate) fn retain_for_caller(&mut self, id: ObjId) -> ObjId {
        self.objects.retain(id);
        id
    }

    /// Insert or replace a path-index entry, keeping reference counts balanced.
    pub(crate) fn record_path<C: CodeUnit>(
        &mut self,
        path: &[C],
        target: PathTarget,
        walkable: bool,
    ) -> Result<()> {
        let stamp = self.target_stamp(target);
        if let PathTarget::Object { id, .. } = target {
            self.objects.retain(id);
            self.objects[id].path_refs += 1;
        }
        let replaced = match C::path_table(&mut self.paths).insert(path, target, stamp, walkable)
        {
            Ok(replaced) => replaced,
            Err(e) => {
                if let PathTarget::Object { id, .. } = target {
                    self.objects[id].path_refs -= 1;
                    self.release(id);
                }
                return Err(e);
            }
        };
        if let Some(PathTarget::Object { id, .. }) = replaced {
            self.objects[id].path_refs -= 1;
            self.release(id);
        }
        Ok(())
    }

    /// The stamp a path-index entry for `target` is fresh at.
    pub(crate) fn target_stamp(&self, target: PathTarget) -> u32 {
        match target {
            PathTarget::Object { id, kind } => self
                .gens
                .current(kind.is_missing(), self.objects[id].uses_custom()),
            PathTarget::Failed(_) => self.gens.current(true, false),
        }
    }

    pub(crate) fn mark_custom_subtree(&mut self, root: ObjId) -> usize {
        let mut marked = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let fresh = self.is_fresh(id);
            let obj = &mut self.objects[id];
            if obj.flags.contains(ObjFlags::TREE_ROOT) {
                continue;
            }
            obj.flags.insert(ObjFlags::CUSTOM_GENERATION);
            if let Some(dir) = obj.dir() {
                stack.extend_from_slice(&dir.children);
            }
            if fresh {
                self.restamp(id);
            }
            marked += 1;
        }
        marked
    }

    /// Drop cached handles below `dir`, force its next access to re-enumerate, and expire
    /// path-index entries that could have been answered from the old listing.
    pub(crate) fn forget_directory(&mut self, dir: ObjId) {
        let mut subtree = FxHashSet::default();
        let mut stack = vec![dir];
        while let Some(id) = stack.pop() {
            subtree.insert(id);
            if let Some(data) = self.objects[id].dir_mut() {
                data.handle = None;
                stack.extend_from_slice(&data.children);
            }
        }
        if let Some(data) = self.objects[dir].dir_mut() {
            data.needs_repopulate = true;
        }
        let expired = self.paths.narrow.expire(|id| subtree.contains(&id))
            + self.paths.wide.expire(|id| subtree.contains(&id));
        debug!(objects = subtree.len(), expired, "forgot directory");
    }

    fn full_path_units<C: CodeUnit>(&self, id: ObjId, form: NameForm) -> Vec<C> {
        let sep = C::ascii(self.options.path_style.separator());
        let mut parts: Vec<&Name> = Vec::new();
        let mut top_is_root = false;
        let mut cur = Some(id);
        while let Some(obj) = cur.and_then(|c| self.objects.get(c)) {
            if obj.flags.contains(ObjFlags::TREE_ROOT) {
                break;
            }
            top_is_root = obj.flags.contains(ObjFlags::DRIVE_ROOT);
            parts.push(match (form, &obj.short_name) {
                (NameForm::Short, Some(short)) => short,
                _ => &obj.name,
            });
            cur = obj.parent;
        }

        let mut out: Vec<C> = Vec::new();
        for (i, name) in parts.iter().rev().enumerate() {
            if i > 0 && out.last() != Some(&sep) {
                out.push(sep);
            }
            out.extend_from_slice(C::units(name));
        }
        if top_is_root && parts.len() == 1 {
            out.push(sep);
        }
        out
    }

    fn info(&self, id: ObjId) -> ObjectInfo {
        let obj = &self.objects[id];
        ObjectInfo {
            id,
            kind: obj.kind(),
            name: obj.name.clone(),
            short_name: obj.short_name.clone(),
            attributes: obj.attrs,
            identity: obj.identity,
            flags: obj.flags,
            fresh: self.is_fresh(id),
        }
    }
}

pub(crate) struct Shared<P: Platform> {
    platform: P,
    options: CacheOptions,
    state: Mutex<CacheState<P::Handle>>,
}

/// A filesystem metadata cache over a [`Platform`].
///
/// Cloning is cheap and yields another handle to the same cache.
pub struct FsCache<P: Platform> {
    shared: Arc<Shared<P>>,
}

impl<P: Platform> Clone for FsCache<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: Platform> fmt::Debug for FsCache<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsCache")
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

impl<P: Platform> FsCache<P> {
    /// Build an empty cache.
    pub fn new(platform: P, options: CacheOptions) -> Result<Self> {
        let state = CacheState::new(options.clone())?;
        Ok(Self {
            shared: Arc::new(Shared {
                platform,
                options,
                state: Mutex::new(state),
            }),
        })
    }

    /// The platform the cache reads through.
    pub fn platform(&self) -> &P {
        &self.shared.platform
    }

    /// The options the cache was built with.
    pub fn options(&self) -> &CacheOptions {
        &self.shared.options
    }

    /// Run `f` under the cache lock, then run destructors of anything it destroyed.
    fn with_state<R>(&self, f: impl FnOnce(&P, &mut CacheState<P::Handle>) -> R) -> R {
        let (result, graveyard) = {
            let mut state = lock(&self.shared.state);
            let result = f(&self.shared.platform, &mut *state);
            (result, mem::take(&mut state.graveyard))
        };
        bury_all(graveyard);
        result
    }

    /// Wrap an id the caller already holds a reference on.
    fn adopt(&self, id: ObjId) -> ObjectRef<P> {
        ObjectRef {
            shared: Arc::clone(&self.shared),
            id,
        }
    }

    fn owns(&self, obj: &ObjectRef<P>) -> bool {
        let owned = Arc::ptr_eq(&self.shared, &obj.shared);
        debug_assert!(owned, "object reference used with a different cache");
        owned
    }

    /// Resolve `path`, caching missing placeholders and the result.
    pub fn lookup(&self, path: &str) -> Result<ObjectRef<P>> {
        self.lookup_bytes(path.as_bytes(), LookupFlags::empty())
    }

    /// Resolve `path`, reporting missing placeholders as [`CacheError::NotFound`].
    pub fn lookup_no_missing(&self, path: &str) -> Result<ObjectRef<P>> {
        self.lookup_bytes(path.as_bytes(), LookupFlags::NO_MISSING)
    }

    /// Resolve a byte path.
    #[instrument(
        name = "FsCache::lookup_bytes",
        skip(self, path),
        fields(path = %String::from_utf8_lossy(path))
    )]
    pub fn lookup_bytes(&self, path: &[u8], flags: LookupFlags) -> Result<ObjectRef<P>> {
        let id = self.with_state(|platform, state| state.lookup_path(platform, path, flags))?;
        Ok(self.adopt(id))
    }

    /// Resolve a UTF-16 path.
    #[instrument(
        name = "FsCache::lookup_wide",
        skip(self, path),
        fields(path = %String::from_utf16_lossy(path))
    )]
    pub fn lookup_wide(&self, path: &[u16], flags: LookupFlags) -> Result<ObjectRef<P>> {
        let id = self.with_state(|platform, state| state.lookup_path(platform, path, flags))?;
        Ok(self.adopt(id))
    }

    /// Resolve `path` relative to the directory `dir`. `..` follows parent links and stops
    /// at the drive root. These lookups bypass the path index.
    #[instrument(name = "FsCache::lookup_relative", skip(self, dir))]
    pub fn lookup_relative(
        &self,
        dir: &ObjectRef<P>,
        path: &str,
        flags: LookupFlags,
    ) -> Result<ObjectRef<P>> {
        if !self.owns(dir) {
            return Err(CacheError::InvalidPath);
        }
        let id = self.with_state(|platform, state| {
            state.lookup_relative(platform, dir.id, path.as_bytes(), flags)
        })?;
        Ok(self.adopt(id))
    }

    /// Bring `dir` up to date and return its present children.
    #[instrument(name = "FsCache::read_dir", skip(self, dir))]
    pub fn read_dir(&self, dir: &ObjectRef<P>) -> Result<Vec<ObjectRef<P>>> {
        if !self.owns(dir) {
            return Err(CacheError::InvalidPath);
        }
        let ids = self.with_state(|platform, state| state.read_dir(platform, dir.id))?;
        Ok(ids.into_iter().map(|id| self.adopt(id)).collect())
    }

    /// Re-check one object against the platform and return its kind afterwards.
    pub fn refresh(&self, obj: &ObjectRef<P>) -> Result<ObjectKind> {
        if !self.owns(obj) {
            return Err(CacheError::InvalidPath);
        }
        self.with_state(|platform, state| state.refresh(platform, obj.id))
    }

    /// Make remembered failures and missing placeholders outside custom subtrees stale.
    pub fn invalidate_missing(&self) {
        self.with_state(|_, state| state.gens.invalidate_missing());
        debug!("invalidated missing objects");
    }

    /// Make everything stale.
    pub fn invalidate_all(&self) {
        self.with_state(|_, state| state.gens.invalidate_all());
        debug!("invalidated all objects");
    }

    /// Make objects in custom subtrees stale.
    pub fn invalidate_custom(&self, mode: CustomInvalidation) {
        self.with_state(|_, state| state.gens.invalidate_custom(mode));
        debug!(?mode, "invalidated custom subtrees");
    }

    /// Move `root` and every cached object below it into the custom invalidation scope.
    /// Objects created below it later inherit the scope.
    pub fn mark_custom_subtree(&self, root: &ObjectRef<P>) {
        if !self.owns(root) {
            return;
        }
        let marked = self.with_state(|_, state| state.mark_custom_subtree(root.id));
        debug!(marked, "marked custom subtree");
    }

    /// Tell the cache the directory at `path` was deleted (and possibly re-created). Cached
    /// handles below it are closed and it is re-enumerated on next access.
    ///
    /// Returns whether the directory was cached.
    pub fn notify_directory_deleted(&self, path: &str) -> bool {
        self.with_state(|platform, state| {
            let Ok(id) = state.probe(platform, path.as_bytes()) else {
                return false;
            };
            if !state.objects[id].is_dir() {
                return false;
            }
            state.forget_directory(id);
            true
        })
    }

    /// Attach `value` to `obj` under `key`.
    pub fn attach_user_data<T: Any + Send + Sync>(
        &self,
        obj: &ObjectRef<P>,
        key: UserDataKey,
        value: T,
    ) -> Result<std::sync::Arc<T>> {
        let value = std::sync::Arc::new(value);
        self.attach_record(obj, UserDataRecord::new(key, std::sync::Arc::clone(&value)))?;
        Ok(value)
    }

    /// Attach `value` to `obj` under `key`, running `destructor` when the object is
    /// destroyed.
    pub fn attach_user_data_with_destructor<T, F>(
        &self,
        obj: &ObjectRef<P>,
        key: UserDataKey,
        value: T,
        destructor: F,
    ) -> Result<std::sync::Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce(&T) + Send + 'static,
    {
        let value = std::sync::Arc::new(value);
        let record = UserDataRecord::with_destructor(key, std::sync::Arc::clone(&value), destructor);
        self.attach_record(obj, record)?;
        Ok(value)
    }

    fn attach_record(&self, obj: &ObjectRef<P>, record: UserDataRecord) -> Result<()> {
        if !self.owns(obj) {
            return Err(CacheError::InvalidPath);
        }
        let key = record.key;
        let outcome = self.with_state(|_, state| {
            let records = &mut state.objects[obj.id].user_data;
            if records.iter().any(|r| r.key == key) {
                return Err((CacheError::UserDataExists(key), record));
            }
            if let Err(e) = records.try_reserve(1) {
                return Err((e.into(), record));
            }
            records.push(record);
            Ok(())
        });
        // A rejected record is dropped here, outside the lock, without running its destructor.
        outcome.map_err(|(e, _record)| e)
    }

    /// The value attached to `obj` under `key`, if it has type `T`.
    pub fn get_user_data<T: Any + Send + Sync>(
        &self,
        obj: &ObjectRef<P>,
        key: UserDataKey,
    ) -> Option<std::sync::Arc<T>> {
        if !self.owns(obj) {
            return None;
        }
        self.with_state(|_, state| {
            state
                .objects
                .get(obj.id)?
                .user_data
                .iter()
                .find(|r| r.key == key)?
                .downcast::<T>()
        })
    }

    /// Detach the record under `key`, running its destructor. Returns whether one existed.
    pub fn remove_user_data(&self, obj: &ObjectRef<P>, key: UserDataKey) -> bool {
        if !self.owns(obj) {
            return false;
        }
        self.with_state(|_, state| {
            let records = &mut state.objects[obj.id].user_data;
            let Some(pos) = records.iter().position(|r| r.key == key) else {
                return false;
            };
            let record = records.swap_remove(pos);
            state.graveyard.push(record);
            true
        })
    }

    /// The full path of `obj` as bytes.
    pub fn full_path(&self, obj: &ObjectRef<P>, form: NameForm) -> Vec<u8> {
        self.with_state(|_, state| state.full_path_units(obj.id, form))
    }

    /// The full path of `obj` as UTF-16.
    pub fn full_path_wide(&self, obj: &ObjectRef<P>, form: NameForm) -> Vec<u16> {
        self.with_state(|_, state| state.full_path_units(obj.id, form))
    }

    /// The full path of `obj`, lossily decoded.
    pub fn full_path_string(&self, obj: &ObjectRef<P>, form: NameForm) -> String {
        String::from_utf8_lossy(&self.full_path(obj, form)).into_owned()
    }

    /// Write the full path of `obj` into `buf`, returning the length written.
    pub fn full_path_into(
        &self,
        obj: &ObjectRef<P>,
        form: NameForm,
        buf: &mut [u8],
    ) -> Result<usize> {
        copy_into(&self.full_path(obj, form), buf)
    }

    /// Write the UTF-16 full path of `obj` into `buf`, returning the length written.
    pub fn full_path_wide_into(
        &self,
        obj: &ObjectRef<P>,
        form: NameForm,
        buf: &mut [u16],
    ) -> Result<usize> {
        copy_into(&self.full_path_wide(obj, form), buf)
    }

    /// Counters since construction.
    pub fn stats(&self) -> CacheStats {
        self.with_state(|_, state| state.stats)
    }

    /// Number of live objects, including the tree root.
    pub fn object_count(&self) -> usize {
        self.with_state(|_, state| state.objects.len())
    }

    /// Number of path-index entries across both encodings.
    pub fn path_entry_count(&self) -> usize {
        self.with_state(|_, state| state.paths.len())
    }

    /// Whether `id` still addresses a live object.
    pub fn is_live(&self, id: ObjId) -> bool {
        self.with_state(|_, state| state.objects.contains(id))
    }
}

fn copy_into<C: Copy>(path: &[C], buf: &mut [C]) -> Result<usize> {
    let Some(dst) = buf.get_mut(..path.len()) else {
        return Err(CacheError::BufferTooSmall { needed: path.len() });
    };
    dst.copy_from_slice(path);
    Ok(path.len())
}

/// A counted reference to a cache object.
///
/// Holding one keeps the object alive (possibly detached from the tree) but not up to date:
/// freshness is only re-established by lookups. Dropping it takes the cache lock.
pub struct ObjectRef<P: Platform> {
    shared: Arc<Shared<P>>,
    id: ObjId,
}

impl<P: Platform> ObjectRef<P> {
    fn read<R>(&self, f: impl FnOnce(&CacheState<P::Handle>, &Object<P::Handle>) -> R) -> R {
        let state = lock(&self.shared.state);
        f(&*state, &state.objects[self.id])
    }

    /// Arena address of the object.
    pub fn id(&self) -> ObjId {
        self.id
    }

    /// Current kind.
    pub fn kind(&self) -> ObjectKind {
        self.read(|_, obj| obj.kind())
    }

    /// Whether this is a missing placeholder.
    pub fn is_missing(&self) -> bool {
        self.kind().is_missing()
    }

    /// Whether this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind().is_dir()
    }

    /// Long name.
    pub fn name(&self) -> Name {
        self.read(|_, obj| obj.name.clone())
    }

    /// Short alias, if any.
    pub fn short_name(&self) -> Option<Name> {
        self.read(|_, obj| obj.short_name.clone())
    }

    /// Cached attributes.
    pub fn attributes(&self) -> Option<Attributes> {
        self.read(|_, obj| obj.attrs)
    }

    /// Cached identity.
    pub fn identity(&self) -> Option<FileIdentity> {
        self.read(|_, obj| obj.identity)
    }

    /// State bits.
    pub fn flags(&self) -> ObjFlags {
        self.read(|_, obj| obj.flags)
    }

    /// Reference count, including the parent's and the path index's.
    pub fn ref_count(&self) -> u32 {
        self.read(|_, obj| obj.refs)
    }

    /// Whether the object is up to date with the current generation.
    pub fn is_fresh(&self) -> bool {
        self.read(|state, _| state.is_fresh(self.id))
    }

    /// Snapshot of all cached state.
    pub fn info(&self) -> ObjectInfo {
        self.read(|state, _| state.info(self.id))
    }

    /// The parent directory. `None` for drive roots and detached objects.
    pub fn parent(&self) -> Option<Self> {
        let mut state = lock(&self.shared.state);
        let parent = state.objects[self.id].parent?;
        if state.objects[parent].flags.contains(ObjFlags::TREE_ROOT) {
            return None;
        }
        let id = state.retain_for_caller(parent);
        Some(Self {
            shared: Arc::clone(&self.shared),
            id,
        })
    }
}

impl<P: Platform> Clone for ObjectRef<P> {
    fn clone(&self) -> Self {
        lock(&self.shared.state).objects.retain(self.id);
        Self {
            shared: Arc::clone(&self.shared),
            id: self.id,
        }
    }
}

impl<P: Platform> Drop for ObjectRef<P> {
    fn drop(&mut self) {
        let graveyard = {
            let mut state = lock(&self.shared.state);
            state.release(self.id);
            mem::take(&mut state.graveyard)
        };
        bury_all(graveyard);
    }
}

impl<P: Platform> PartialEq for ObjectRef<P> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<P: Platform> Eq for ObjectRef<P> {}

impl<P: Platform> fmt::Debug for ObjectRef<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
