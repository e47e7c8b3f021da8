//! The object arena.
//!
//! Objects live in slots of an [`ObjTable`] and are addressed by [`ObjId`]: a slot index plus
//! the sequence number the slot had when the object was created. Destroying an object bumps
//! the slot's sequence, so an id that outlives its object is detected instead of silently
//! aliasing whatever reuses the slot.
//!
//! Ownership is top-down: a directory holds one reference on each child. The parent link is
//! a plain id with no reference behind it. Path-index entries and [`ObjectRef`]s hold the
//! remaining references.
//!
//! [`ObjectRef`]: crate::cache::ObjectRef

use std::mem;
use std::ops::{Index, IndexMut};
use std::time::SystemTime;

use bitflags::bitflags;

use crate::cache::child_index::ChildIndex;
use crate::cache::user_data::UserDataRecord;
use crate::error::{CacheError, Result};
use crate::fs::{Attributes, EntryKind, FileIdentity, ObjectKind};
use crate::name::{CodeUnit, Name};
use crate::path::RootSpec;

/// Address of an object in the cache.
///
/// Ids are only meaningful for the cache that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId {
    slot: u32,
    seq: u32,
}

bitflags! {
    /// Per-object state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjFlags: u16 {
        /// Freshness is judged against the custom generation counters.
        const CUSTOM_GENERATION = 1 << 0;
        /// Another volume is mounted on this directory.
        const MOUNT_POINT       = 1 << 1;
        /// The cached attributes were read through the mounted volume.
        const TARGET_ATTRS      = 1 << 2;
        /// A drive, share or posix root.
        const DRIVE_ROOT        = 1 << 3;
        /// The synthetic root every drive root hangs off.
        const TREE_ROOT         = 1 << 4;
        /// Dropped from its parent while still referenced elsewhere.
        const DETACHED          = 1 << 5;
    }
}

/// Directory-only state.
pub(crate) struct DirData<H> {
    pub children: Vec<ObjId>,
    pub populated: bool,
    pub needs_repopulate: bool,
    pub handle: Option<H>,
    /// Child name index per encoding, built lazily.
    pub indexes: [Option<ChildIndex>; 2],
    /// Modified time of the directory as of the last enumeration.
    pub last_write: Option<SystemTime>,
    /// Set on drive roots; used to reopen the handle.
    pub root: Option<RootSpec>,
}

impl<H> DirData<H> {
    pub(crate) fn new() -> Self {
        Self {
            children: Vec::new(),
            populated: false,
            needs_repopulate: false,
            handle: None,
            indexes: [None, None],
            last_write: None,
            root: None,
        }
    }
}

pub(crate) enum Node<H> {
    Directory(Box<DirData<H>>),
    File,
    Other,
    Missing,
}

impl<H> Node<H> {
    pub(crate) fn for_entry(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Directory => Self::Directory(Box::new(DirData::new())),
            EntryKind::File => Self::File,
            EntryKind::Other => Self::Other,
        }
    }

    pub(crate) fn kind(&self) -> ObjectKind {
        match self {
            Self::Directory(_) => ObjectKind::Directory,
            Self::File => ObjectKind::File,
            Self::Other => ObjectKind::Other,
            Self::Missing => ObjectKind::Missing,
        }
    }
}

pub(crate) struct Object<H> {
    pub node: Node<H>,
    pub name: Name,
    pub short_name: Option<Name>,
    pub parent: Option<ObjId>,
    /// Parent slot, path-index entries and external holders.
    pub refs: u32,
    /// How many of `refs` are held by path-index entries.
    pub path_refs: u32,
    pub attrs: Option<Attributes>,
    pub identity: Option<FileIdentity>,
    pub stamp: u32,
    pub flags: ObjFlags,
    pub user_data: Vec<UserDataRecord>,
}

impl<H> Object<H> {
    pub(crate) fn new(node: Node<H>, name: Name, parent: Option<ObjId>, stamp: u32) -> Self {
        Self {
            node,
            name,
            short_name: None,
            parent,
            refs: 1,
            path_refs: 0,
            attrs: None,
            identity: None,
            stamp,
            flags: ObjFlags::empty(),
            user_data: Vec::new(),
        }
    }

    pub(crate) fn kind(&self) -> ObjectKind {
        self.node.kind()
    }

    pub(crate) fn is_missing(&self) -> bool {
        matches!(self.node, Node::Missing)
    }

    pub(crate) fn is_dir(&self) -> bool {
        matches!(self.node, Node::Directory(_))
    }

    pub(crate) fn uses_custom(&self) -> bool {
        self.flags.contains(ObjFlags::CUSTOM_GENERATION)
    }

    pub(crate) fn dir(&self) -> Option<&DirData<H>> {
        match &self.node {
            Node::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub(crate) fn dir_mut(&mut self) -> Option<&mut DirData<H>> {
        match &mut self.node {
            Node::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    /// Whether `query` names this object by its long or short name.
    pub(crate) fn matches<C: CodeUnit>(&self, query: &[C], case_sensitive: bool) -> bool {
        self.name.matches(query, case_sensitive)
            || self
                .short_name
                .as_ref()
                .is_some_and(|short| short.matches(query, case_sensitive))
    }

    /// Replace the node, returning the children the old node owned.
    pub(crate) fn replace_node(&mut self, node: Node<H>) -> Vec<ObjId> {
        match mem::replace(&mut self.node, node) {
            Node::Directory(dir) => dir.children,
            _ => Vec::new(),
        }
    }
}

struct Slot<H> {
    seq: u32,
    obj: Option<Object<H>>,
}

/// Slot arena holding every live object.
pub(crate) struct ObjTable<H> {
    slots: Vec<Slot<H>>,
    free: Vec<u32>,
    live: usize,
}

impl<H> ObjTable<H> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn insert(&mut self, obj: Object<H>) -> Result<ObjId> {
        let id = if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            debug_assert!(entry.obj.is_none(), "free list points at a live slot");
            entry.obj = Some(obj);
            ObjId {
                slot,
                seq: entry.seq,
            }
        } else {
            self.slots.try_reserve(1)?;
            self.free.try_reserve(1)?;
            let slot = u32::try_from(self.slots.len()).map_err(|_| CacheError::OutOfMemory)?;
            self.slots.push(Slot {
                seq: 0,
                obj: Some(obj),
            });
            ObjId { slot, seq: 0 }
        };
        self.live += 1;
        Ok(id)
    }

    fn remove(&mut self, id: ObjId) -> Option<Object<H>> {
        let entry = self.slots.get_mut(id.slot as usize)?;
        if entry.seq != id.seq {
            return None;
        }
        let obj = entry.obj.take()?;
        entry.seq = entry.seq.wrapping_add(1);
        self.free.push(id.slot);
        self.live -= 1;
        Some(obj)
    }

    pub(crate) fn get(&self, id: ObjId) -> Option<&Object<H>> {
        self.slots
            .get(id.slot as usize)
            .filter(|s| s.seq == id.seq)
            .and_then(|s| s.obj.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: ObjId) -> Option<&mut Object<H>> {
        self.slots
            .get_mut(id.slot as usize)
            .filter(|s| s.seq == id.seq)
            .and_then(|s| s.obj.as_mut())
    }

    pub(crate) fn contains(&self, id: ObjId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn retain(&mut self, id: ObjId) {
        let obj = &mut self[id];
        debug_assert!(obj.refs > 0, "retaining a dead object");
        obj.refs += 1;
    }

    /// Drop one reference to `id`, destroying it and releasing its children if it was the
    /// last. User-data records of destroyed objects are moved to `graveyard` so their
    /// destructors can run once the cache lock is released.
    ///
    /// `detach_first` marks `id` as detached before releasing, for callers dropping the
    /// parent's reference. Returns the number of objects destroyed.
    pub(crate) fn release(
        &mut self,
        id: ObjId,
        detach_first: bool,
        graveyard: &mut Vec<UserDataRecord>,
    ) -> usize {
        let mut destroyed = 0;
        let mut stack = vec![(id, detach_first)];
        while let Some((id, detach)) = stack.pop() {
            debug_assert!(self.contains(id), "releasing a dead object {id:?}");
            let Some(obj) = self.get_mut(id) else {
                continue;
            };
            if detach {
                obj.parent = None;
                obj.flags.insert(ObjFlags::DETACHED);
            }
            debug_assert!(obj.refs > 0, "reference count underflow on {id:?}");
            obj.refs = obj.refs.saturating_sub(1);
            if obj.refs > 0 {
                continue;
            }
            debug_assert_eq!(
                obj.path_refs, 0,
                "destroying {id:?} while the path index still points at it"
            );
            let Some(obj) = self.remove(id) else {
                continue;
            };
            destroyed += 1;
            graveyard.extend(obj.user_data);
            if let Node::Directory(dir) = obj.node {
                stack.extend(dir.children.into_iter().map(|child| (child, true)));
            }
        }
        destroyed
    }
}

impl<H> Index<ObjId> for ObjTable<H> {
    type Output = Object<H>;

    fn index(&self, id: ObjId) -> &Object<H> {
        match self.get(id) {
            Some(obj) => obj,
            None => panic!("stale object id {id:?}"),
        }
    }
}

impl<H> IndexMut<ObjId> for ObjTable<H> {
    fn index_mut(&mut self, id: ObjId) -> &mut Object<H> {
        match self.get_mut(id) {
            Some(obj) => obj,
            None => panic!("stale object id {id:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Table = ObjTable<()>;

    fn dir(table: &mut Table, parent: Option<ObjId>) -> ObjId {
        let obj = Object::new(Node::Directory(Box::new(DirData::new())), Name::from("d"), parent, 1);
        let id = table.insert(obj).unwrap_or_else(|e| panic!("{e}"));
        if let Some(d) = parent.and_then(|p| table[p].dir_mut()) {
            d.children.push(id);
        }
        id
    }

    fn file(table: &mut Table, parent: ObjId) -> ObjId {
        let id = table
            .insert(Object::new(Node::File, Name::from("f"), Some(parent), 1))
            .unwrap_or_else(|e| panic!("{e}"));
        if let Some(d) = table[parent].dir_mut() {
            d.children.push(id);
        }
        id
    }

    #[test]
    fn release_to_zero_destroys_subtree() {
        let mut table = Table::new();
        let root = dir(&mut table, None);
        let sub = dir(&mut table, Some(root));
        let leaf = file(&mut table, sub);
        assert_eq!(table.len(), 3);

        let mut graveyard = Vec::new();
        assert_eq!(table.release(root, false, &mut graveyard), 3);
        assert_eq!(table.len(), 0);
        assert!(!table.contains(sub));
        assert!(!table.contains(leaf));
    }

    #[test]
    fn externally_held_child_survives_detached() {
        let mut table = Table::new();
        let root = dir(&mut table, None);
        let leaf = file(&mut table, root);
        table.retain(leaf);

        let mut graveyard = Vec::new();
        assert_eq!(table.release(root, false, &mut graveyard), 1);
        let survivor = &table[leaf];
        assert_eq!(survivor.parent, None);
        assert!(survivor.flags.contains(ObjFlags::DETACHED));
        assert_eq!(survivor.refs, 1);

        assert_eq!(table.release(leaf, false, &mut graveyard), 1);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn reused_slot_gets_new_sequence() {
        let mut table = Table::new();
        let first = dir(&mut table, None);
        table.release(first, false, &mut Vec::new());
        let second = dir(&mut table, None);
        assert_ne!(first, second);
        assert!(table.get(first).is_none());
        assert!(table.get(second).is_some());
    }

    #[test]
    #[should_panic(expected = "stale object id")]
    fn indexing_a_stale_id_panics() {
        let mut table = Table::new();
        let id = dir(&mut table, None);
        table.release(id, false, &mut Vec::new());
        let _ = &table[id];
    }

    #[test]
    fn deep_chains_release_without_recursion() {
        let mut table = Table::new();
        let root = dir(&mut table, None);
        let mut cur = root;
        for _ in 0..100_000 {
            cur = dir(&mut table, Some(cur));
        }
        assert_eq!(table.release(root, false, &mut Vec::new()), 100_001);
    }
}
