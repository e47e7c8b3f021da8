//! Memoized path resolutions.
//!
//! One table per encoding maps the exact string a caller passed to what it resolved to,
//! including failures. Entries keep their own generation stamp so a stale entry can be
//! re-validated cheaply instead of re-walking from the root.

use rustc_hash::FxHashMap;

use crate::cache::generation::STAMP_NEVER;
use crate::cache::object::ObjId;
use crate::error::LookupFailure;
use crate::fs::ObjectKind;
use crate::name::CodeUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PathTarget {
    /// Holds one reference on the object.
    Object { id: ObjId, kind: ObjectKind },
    Failed(LookupFailure),
}

pub(crate) struct PathEntry {
    pub target: PathTarget,
    pub stamp: u32,
    /// Absolute and free of `.` and `..`, so it can be re-validated against the tree.
    pub walkable: bool,
}

/// Entries keyed by the exact input string.
pub(crate) struct PathTable<C> {
    entries: FxHashMap<Box<[C]>, PathEntry>,
}

impl<C: CodeUnit> PathTable<C> {
    pub(crate) fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get(&self, path: &[C]) -> Option<&PathEntry> {
        self.entries.get(path)
    }

    pub(crate) fn get_mut(&mut self, path: &[C]) -> Option<&mut PathEntry> {
        self.entries.get_mut(path)
    }

    /// Insert or replace the entry for `path`, returning the target it replaced.
    ///
    /// Reference counting of object targets is the caller's job.
    pub(crate) fn insert(
        &mut self,
        path: &[C],
        target: PathTarget,
        stamp: u32,
        walkable: bool,
    ) -> crate::error::Result<Option<PathTarget>> {
        if let Some(entry) = self.entries.get_mut(path) {
            let old = std::mem::replace(&mut entry.target, target);
            entry.stamp = stamp;
            entry.walkable = walkable;
            return Ok(Some(old));
        }
        self.entries.try_reserve(1)?;
        let mut owned = Vec::new();
        owned.try_reserve_exact(path.len())?;
        owned.extend_from_slice(path);
        self.entries.insert(
            owned.into_boxed_slice(),
            PathEntry {
                target,
                stamp,
                walkable,
            },
        );
        Ok(None)
    }

    /// Make entries stale: every recorded failure, and every object entry `expire` selects.
    pub(crate) fn expire(&mut self, mut expire: impl FnMut(ObjId) -> bool) -> usize {
        let mut expired = 0;
        for entry in self.entries.values_mut() {
            let stale = match entry.target {
                PathTarget::Object { id, .. } => expire(id),
                PathTarget::Failed(_) => true,
            };
            if stale {
                entry.stamp = STAMP_NEVER;
                expired += 1;
            }
        }
        expired
    }
}

/// Path tables for both encodings.
pub(crate) struct PathIndex {
    pub narrow: PathTable<u8>,
    pub wide: PathTable<u16>,
}

impl PathIndex {
    pub(crate) fn new() -> Self {
        Self {
            narrow: PathTable::new(),
            wide: PathTable::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.narrow.len() + self.wide.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(table: &mut PathTable<u8>, path: &str, failure: LookupFailure) -> Option<PathTarget> {
        table
            .insert(path.as_bytes(), PathTarget::Failed(failure), 7, true)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn insert_then_replace() {
        let mut table = PathTable::<u8>::new();
        assert_eq!(failed(&mut table, r"C:\x", LookupFailure::NotFound), None);
        assert_eq!(
            failed(&mut table, r"C:\x", LookupFailure::NotADirectory),
            Some(PathTarget::Failed(LookupFailure::NotFound))
        );
        assert_eq!(table.len(), 1);
        let entry = table.get(br"C:\x".as_slice());
        assert!(entry.is_some_and(|e| e.target == PathTarget::Failed(LookupFailure::NotADirectory)));
    }

    #[test]
    fn lookups_are_exact() {
        let mut table = PathTable::<u8>::new();
        failed(&mut table, r"C:\Src", LookupFailure::NotFound);
        assert!(table.get(br"C:\src".as_slice()).is_none());
        assert!(table.get(br"C:\Src".as_slice()).is_some());
    }

    #[test]
    fn expire_hits_failures_and_selected_objects() {
        let mut table = PathTable::<u8>::new();
        failed(&mut table, r"C:\gone", LookupFailure::NotFound);
        let expired = table.expire(|_| true);
        assert_eq!(expired, 1);
        let entry = table.get(br"C:\gone".as_slice());
        assert!(entry.is_some_and(|e| e.stamp == STAMP_NEVER));
    }

    #[test]
    fn many_entries_stay_reachable() {
        let mut table = PathTable::<u8>::new();
        let paths: Vec<String> = (0..1000).map(|i| format!("/p/{i}")).collect();
        for p in &paths {
            failed(&mut table, p, LookupFailure::NotFound);
        }
        assert_eq!(table.len(), 1000);
        for p in &paths {
            assert!(table.get(p.as_bytes()).is_some(), "{p}");
        }
    }
}
