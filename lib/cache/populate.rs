//! Directory population and single-object refresh.
//!
//! First population and refresh are the same operation: the old child list (empty the first
//! time) is reconciled against a fresh enumeration. Matched children are updated in place so
//! that identity, user data and outstanding references survive.

use std::io;
use std::mem;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace, warn};

use crate::cache::CacheState;
use crate::cache::lookup::LookupFlags;
use crate::cache::object::{Node, ObjFlags, ObjId, ObjTable};
use crate::error::{CacheError, Result, is_vanished};
use crate::fs::{EntryKind, FileIdentity, ObjectKind, Platform, RawDirEntry};
use crate::name::{CodeUnit, Name};

fn is_dot_entry(entry: &RawDirEntry) -> bool {
    matches!(entry.name.as_bytes(), b"." | b"..")
}

/// Comparison key for a name under the cache's case rule.
fn name_key(name: &Name, case_sensitive: bool) -> Box<[u8]> {
    if case_sensitive {
        return name.as_bytes().into();
    }
    name.as_bytes().iter().map(|&c| c.fold()).collect()
}

/// The children a directory had before the current enumeration, waiting to be matched.
struct OldChildren {
    slots: Vec<Option<ObjId>>,
    /// First slot holding each identity. Entries go stale as slots are taken.
    by_identity: FxHashMap<FileIdentity, usize>,
    hint: usize,
}

impl OldChildren {
    fn new<H>(objects: &ObjTable<H>, children: Vec<ObjId>) -> Self {
        let mut by_identity = FxHashMap::default();
        for (pos, id) in children.iter().enumerate() {
            if let Some(identity) = objects[*id].identity {
                by_identity.entry(identity).or_insert(pos);
            }
        }
        Self {
            slots: children.into_iter().map(Some).collect(),
            by_identity,
            hint: 0,
        }
    }

    fn take(&mut self, pos: usize) -> Option<(usize, ObjId)> {
        self.hint = pos + 1;
        self.slots[pos].take().map(|id| (pos, id))
    }

    fn remaining(self) -> impl Iterator<Item = ObjId> {
        self.slots.into_iter().flatten()
    }
}

impl<H> CacheState<H> {
    /// Take the cached handle of `dir`, or open one. The caller puts it back with
    /// [`put_handle`](Self::put_handle).
    pub(crate) fn open_handle<P: Platform<Handle = H>>(
        &mut self,
        platform: &P,
        dir: ObjId,
    ) -> io::Result<H> {
        let obj = &mut self.objects[dir];
        let Some(data) = obj.dir_mut() else {
            return Err(io::ErrorKind::NotADirectory.into());
        };
        if let Some(handle) = data.handle.take() {
            return Ok(handle);
        }
        if let Some(root) = &data.root {
            return platform.open_root(root);
        }
        let name = obj.name.clone();
        let Some(parent) = obj.parent else {
            return Err(io::ErrorKind::NotFound.into());
        };
        let parent_handle = self.open_handle(platform, parent)?;
        let opened = platform.open_dir(&parent_handle, &name);
        self.put_handle(parent, parent_handle);
        opened
    }

    pub(crate) fn put_handle(&mut self, dir: ObjId, handle: H) {
        if let Some(data) = self.objects.get_mut(dir).and_then(|obj| obj.dir_mut()) {
            data.handle = Some(handle);
        }
    }

    /// Bring `dir` up to date if it is unpopulated, stale, or flagged for repopulation.
    pub(crate) fn ensure_dir_fresh<P: Platform<Handle = H>>(
        &mut self,
        platform: &P,
        dir: ObjId,
        flags: LookupFlags,
    ) -> Result<()> {
        let obj = &self.objects[dir];
        if obj.flags.contains(ObjFlags::TREE_ROOT) {
            return Ok(());
        }
        let Some(data) = obj.dir() else {
            return Ok(());
        };
        let stale = !data.populated
            || data.needs_repopulate
            || obj.stamp != self.gens.current(false, obj.uses_custom());
        if !stale {
            return Ok(());
        }
        if flags.contains(LookupFlags::NO_REFRESH) {
            return if data.populated {
                Ok(())
            } else {
                Err(CacheError::NotCached)
            };
        }
        self.populate(platform, dir)
    }

    /// Enumerate `dir` and reconcile its children.
    pub(crate) fn populate<P: Platform<Handle = H>>(&mut self, platform: &P, dir: ObjId) -> Result<()> {
        let is_root = self.objects[dir].flags.contains(ObjFlags::DRIVE_ROOT);
        let had_handle = self.objects[dir]
            .dir()
            .is_some_and(|data| data.handle.is_some());

        let mut outcome = self.populate_once(platform, dir);
        if had_handle && matches!(&outcome, Err(CacheError::Io(e)) if is_vanished(e)) {
            // The cached handle may belong to a directory that was deleted and re-created.
            outcome = self.populate_once(platform, dir);
        }

        match outcome {
            Err(CacheError::Io(e)) if is_vanished(&e) && !is_root => {
                self.vanish(dir);
                Ok(())
            }
            Err(CacheError::Io(e)) => {
                warn!(dir = %self.objects[dir].name, error = %e, "directory enumeration failed");
                Err(CacheError::from_io(e))
            }
            other => other,
        }
    }

    fn populate_once<P: Platform<Handle = H>>(&mut self, platform: &P, dir: ObjId) -> Result<()> {
        let mut handle = self.open_handle(platform, dir)?;
        let result = self.reconcile(platform, dir, &mut handle);
        if result.is_ok() {
            self.put_handle(dir, handle);
        }
        result
    }

    /// Convert a directory that no longer exists into a missing placeholder.
    fn vanish(&mut self, dir: ObjId) {
        debug!(dir = %self.objects[dir].name, "directory vanished");
        self.make_missing(dir);
    }

    fn reconcile<P: Platform<Handle = H>>(
        &mut self,
        platform: &P,
        dir: ObjId,
        handle: &mut H,
    ) -> Result<()> {
        let stat = platform.stat_handle(handle)?;
        let (children, was_populated) = {
            let Some(data) = self.objects[dir].dir_mut() else {
                return Ok(());
            };
            let was_populated = data.populated || data.last_write.is_some();
            data.populated = false;
            data.indexes = [None, None];
            (mem::take(&mut data.children), was_populated)
        };
        let mut old = OldChildren::new(&self.objects, children);

        let mut restart = true;
        let outcome = loop {
            let batch = match platform.read_dir_batch(handle, restart) {
                Ok(Some(batch)) => batch,
                Ok(None) => break Ok(()),
                Err(e) => break Err(CacheError::Io(e)),
            };
            restart = false;
            if let Err(e) = self.absorb_batch(dir, &mut old, &batch) {
                break Err(e);
            }
        };

        if let Err(e) = outcome {
            let data = self.objects[dir].dir_mut();
            if let Some(data) = data {
                data.children.extend(old.remaining());
                data.populated = false;
            }
            return Err(e);
        }

        self.settle_leftovers(dir, old);

        let stamp = self.gens.current(false, self.objects[dir].uses_custom());
        let obj = &mut self.objects[dir];
        obj.stamp = stamp;
        obj.attrs = Some(stat.attrs);
        if obj.flags.contains(ObjFlags::MOUNT_POINT) {
            obj.flags.insert(ObjFlags::TARGET_ATTRS);
        }
        let children = if let Some(data) = obj.dir_mut() {
            data.populated = true;
            data.needs_repopulate = false;
            data.last_write = stat.attrs.modified;
            data.children.len()
        } else {
            0
        };
        if was_populated {
            self.stats.repopulations += 1;
        } else {
            self.stats.populations += 1;
        }
        debug!(dir = %self.objects[dir].name, children, repopulated = was_populated, "populated directory");
        Ok(())
    }

    fn absorb_batch(
        &mut self,
        dir: ObjId,
        old: &mut OldChildren,
        batch: &[RawDirEntry],
    ) -> Result<()> {
        for entry in batch.iter().filter(|e| !is_dot_entry(e)) {
            let Some((pos, id)) = self.match_entry(old, entry) else {
                self.adopt_entry(dir, entry)?;
                continue;
            };
            self.apply_entry(id, entry);
            let Some(data) = self.objects[dir].dir_mut() else {
                old.slots[pos] = Some(id);
                return Ok(());
            };
            if let Err(e) = data.children.try_reserve(1) {
                old.slots[pos] = Some(id);
                return Err(e.into());
            }
            data.children.push(id);
        }
        Ok(())
    }

    /// Find the old child an enumerated entry corresponds to: identity first, then long or
    /// short name. The positional hint is tried first, but a name match there only counts
    /// when the identities do not contradict it.
    fn match_entry(&self, old: &mut OldChildren, entry: &RawDirEntry) -> Option<(usize, ObjId)> {
        let case_sensitive = self.options.case_sensitive;
        let identity = entry.stat.identity;
        let same_identity =
            |id: ObjId| identity.is_some() && self.objects[id].identity == identity;
        let same_name = |id: ObjId| {
            let obj = &self.objects[id];
            obj.matches(entry.name.as_bytes(), case_sensitive)
                || entry
                    .short_name
                    .as_ref()
                    .is_some_and(|short| obj.name.matches(short.as_bytes(), case_sensitive))
        };
        let compatible = |id: ObjId| {
            let known = self.objects[id].identity;
            known.is_none() || identity.is_none() || known == identity
        };

        if let Some(id) = old.slots.get(old.hint).copied().flatten()
            && (same_identity(id) || (same_name(id) && compatible(id)))
        {
            return old.take(old.hint);
        }
        if let Some(wanted) = identity {
            let pos = old
                .by_identity
                .get(&wanted)
                .copied()
                .filter(|pos| old.slots[*pos].is_some_and(same_identity))
                .or_else(|| old.slots.iter().position(|slot| slot.is_some_and(same_identity)));
            if let Some(pos) = pos {
                return old.take(pos);
            }
        }
        // Linear, but only reached for entries with no identity match: new names, or
        // platforms that report no identity.
        let pos = old.slots.iter().position(|slot| slot.is_some_and(same_name))?;
        old.take(pos)
    }

    fn adopt_entry(&mut self, dir: ObjId, entry: &RawDirEntry) -> Result<ObjId> {
        let id = self.new_child(
            dir,
            Node::for_entry(entry.stat.kind),
            entry.name.clone(),
            entry.short_name.clone(),
        )?;
        let obj = &mut self.objects[id];
        obj.attrs = Some(entry.stat.attrs);
        obj.identity = entry.stat.identity;
        obj.flags.set(ObjFlags::MOUNT_POINT, entry.stat.mount_point);
        Ok(id)
    }

    /// Old children the enumeration did not report.
    fn settle_leftovers(&mut self, dir: ObjId, old: OldChildren) {
        let case_sensitive = self.options.case_sensitive;
        let mut listed = FxHashSet::default();
        if self.options.missing_objects
            && let Some(data) = self.objects[dir].dir()
        {
            for child in &data.children {
                let obj = &self.objects[*child];
                listed.insert(name_key(&obj.name, case_sensitive));
                if let Some(short) = &obj.short_name {
                    listed.insert(name_key(short, case_sensitive));
                }
            }
        }
        for id in old.remaining() {
            let keep = self.options.missing_objects
                && !listed.contains(&name_key(&self.objects[id].name, case_sensitive));
            if !keep {
                trace!(name = %self.objects[id].name, "dropping vanished child");
                self.release_children(vec![id]);
                continue;
            }
            if let Some(data) = self.objects[dir].dir_mut() {
                data.children.push(id);
            }
            if self.objects[id].is_missing() {
                self.restamp(id);
            } else {
                self.make_missing(id);
            }
        }
    }

    /// Update `id` in place from a fresh platform answer.
    pub(crate) fn apply_entry(&mut self, id: ObjId, entry: &RawDirEntry) {
        let obj = &mut self.objects[id];
        if obj.name != entry.name {
            obj.name = entry.name.clone();
        }
        obj.short_name.clone_from(&entry.short_name);
        if entry.stat.identity.is_some() {
            obj.identity = entry.stat.identity;
        }
        obj.flags.set(ObjFlags::MOUNT_POINT, entry.stat.mount_point);
        obj.flags.remove(ObjFlags::TARGET_ATTRS);
        obj.attrs = Some(entry.stat.attrs);

        let was = obj.kind();
        if was == ObjectKind::Directory && entry.stat.kind == EntryKind::Directory {
            // Directories keep their stamp: it records when the listing was last read.
            if let Some(data) = obj.dir_mut()
                && data.last_write.is_some()
                && data.last_write != entry.stat.attrs.modified
            {
                data.needs_repopulate = true;
            }
            return;
        }

        let children = obj.replace_node(Node::for_entry(entry.stat.kind));
        if was == ObjectKind::Missing {
            self.stats.rebirths += 1;
            debug!(name = %entry.name, kind = ?entry.stat.kind, "missing object reborn");
        }
        self.release_children(children);
        self.restamp(id);
    }

    /// Re-check a missing placeholder against its parent.
    pub(crate) fn refresh_missing<P: Platform<Handle = H>>(
        &mut self,
        platform: &P,
        id: ObjId,
    ) -> Result<()> {
        self.stats.missing_refreshes += 1;
        let Some(parent) = self.objects[id].parent else {
            self.restamp(id);
            return Ok(());
        };
        let handle = match self.open_handle(platform, parent) {
            Ok(handle) => handle,
            Err(e) if is_vanished(&e) => {
                self.restamp(id);
                return Ok(());
            }
            Err(e) => return Err(CacheError::from_io(e)),
        };
        let result = self.refresh_missing_with(platform, id, parent, &handle);
        self.put_handle(parent, handle);
        result
    }

    fn refresh_missing_with<P: Platform<Handle = H>>(
        &mut self,
        platform: &P,
        id: ObjId,
        parent: ObjId,
        handle: &H,
    ) -> Result<()> {
        let parent_stat = match platform.stat_handle(handle) {
            Ok(stat) => stat,
            Err(e) if is_vanished(&e) => {
                self.restamp(id);
                return Ok(());
            }
            Err(e) => return Err(CacheError::from_io(e)),
        };
        let last_write = self.objects[parent].dir().and_then(|data| data.last_write);
        if last_write.is_some() && last_write == parent_stat.attrs.modified {
            trace!(name = %self.objects[id].name, "parent unchanged, still missing");
            self.restamp(id);
            return Ok(());
        }

        if let Some(data) = self.objects[parent].dir_mut() {
            data.needs_repopulate = true;
        }
        let name = self.objects[id].name.clone();
        match platform.stat_child(handle, &name) {
            Ok(entry) => {
                self.apply_entry(id, &entry);
                Ok(())
            }
            Err(e) if is_vanished(&e) => {
                self.restamp(id);
                Ok(())
            }
            Err(e) => Err(CacheError::from_io(e)),
        }
    }

    /// Re-enumerate `dir` if it was modified since its listing was read. Returns whether it
    /// was re-enumerated.
    pub(crate) fn recheck_listing<P: Platform<Handle = H>>(
        &mut self,
        platform: &P,
        dir: ObjId,
    ) -> Result<bool> {
        let handle = match self.open_handle(platform, dir) {
            Ok(handle) => handle,
            Err(e) if is_vanished(&e) => return Ok(false),
            Err(e) => return Err(CacheError::from_io(e)),
        };
        let stat = platform.stat_handle(&handle);
        self.put_handle(dir, handle);
        let modified = match stat {
            Ok(stat) => stat.attrs.modified,
            Err(e) if is_vanished(&e) => return Ok(false),
            Err(e) => return Err(CacheError::from_io(e)),
        };
        let last_write = self.objects[dir].dir().and_then(|data| data.last_write);
        if last_write.is_some() && last_write == modified {
            return Ok(false);
        }
        trace!(dir = %self.objects[dir].name, "listing changed underneath a miss");
        if let Some(data) = self.objects[dir].dir_mut() {
            data.needs_repopulate = true;
        }
        self.populate(platform, dir)?;
        Ok(true)
    }

    /// Re-check a present non-directory through a single-name query.
    pub(crate) fn refresh_object<P: Platform<Handle = H>>(
        &mut self,
        platform: &P,
        id: ObjId,
    ) -> Result<()> {
        let Some(parent) = self.objects[id].parent else {
            self.restamp(id);
            return Ok(());
        };
        let handle = match self.open_handle(platform, parent) {
            Ok(handle) => handle,
            Err(e) if is_vanished(&e) => {
                self.object_vanished(id);
                return Ok(());
            }
            Err(e) => return Err(CacheError::from_io(e)),
        };
        let name = self.objects[id].name.clone();
        let result = match platform.stat_child(&handle, &name) {
            Ok(entry) => {
                self.apply_entry(id, &entry);
                Ok(())
            }
            Err(e) if is_vanished(&e) => {
                self.object_vanished(id);
                Ok(())
            }
            Err(e) => Err(CacheError::from_io(e)),
        };
        self.put_handle(parent, handle);
        result
    }

    fn object_vanished(&mut self, id: ObjId) {
        if self.options.missing_objects {
            self.make_missing(id);
        } else {
            self.detach(id);
        }
    }

    /// Read the attributes of a mount point through the mounted volume.
    pub(crate) fn resolve_mount_attrs<P: Platform<Handle = H>>(
        &mut self,
        platform: &P,
        id: ObjId,
    ) -> Result<()> {
        let handle = self.open_handle(platform, id).map_err(CacheError::from_io)?;
        let stat = platform.stat_handle(&handle);
        self.put_handle(id, handle);
        let stat = stat.map_err(CacheError::from_io)?;
        let obj = &mut self.objects[id];
        obj.attrs = Some(stat.attrs);
        obj.flags.insert(ObjFlags::TARGET_ATTRS);
        Ok(())
    }

    /// Refresh a directory and return its present children, each with a reference taken
    /// for the caller.
    pub(crate) fn read_dir<P: Platform<Handle = H>>(
        &mut self,
        platform: &P,
        dir: ObjId,
    ) -> Result<Vec<ObjId>> {
        match self.objects[dir].kind() {
            ObjectKind::Directory => {}
            ObjectKind::Missing => return Err(CacheError::NotFound),
            ObjectKind::File | ObjectKind::Other => return Err(CacheError::NotADirectory),
        }
        self.ensure_dir_fresh(platform, dir, LookupFlags::empty())?;
        let Some(data) = self.objects[dir].dir() else {
            return Err(CacheError::NotFound);
        };
        let ids: Vec<ObjId> = data
            .children
            .iter()
            .copied()
            .filter(|c| !self.objects[*c].is_missing())
            .collect();
        for id in &ids {
            self.objects.retain(*id);
        }
        Ok(ids)
    }

    /// Re-check one object against the platform regardless of its stamp.
    pub(crate) fn refresh<P: Platform<Handle = H>>(
        &mut self,
        platform: &P,
        id: ObjId,
    ) -> Result<ObjectKind> {
        let obj = &mut self.objects[id];
        if obj.flags.contains(ObjFlags::TREE_ROOT) {
            return Ok(obj.kind());
        }
        match obj.kind() {
            ObjectKind::Directory => {
                if let Some(data) = obj.dir_mut() {
                    data.needs_repopulate = true;
                }
                self.populate(platform, id)?;
                if self.objects[id].is_missing() {
                    // It may have been replaced by something that is not a directory.
                    self.refresh_missing(platform, id)?;
                }
            }
            ObjectKind::Missing => self.refresh_missing(platform, id)?,
            ObjectKind::File | ObjectKind::Other => self.refresh_object(platform, id)?,
        }
        match self.objects.get(id) {
            Some(obj) if !obj.flags.contains(ObjFlags::DETACHED) => Ok(obj.kind()),
            _ => Err(CacheError::NotFound),
        }
    }
}
