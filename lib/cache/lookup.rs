//! Path resolution: root handling, the component walk, and path-index memoization.

use bitflags::bitflags;
use tracing::{debug, trace, warn};

use crate::cache::CacheState;
use crate::cache::child_index::find_child;
use crate::cache::object::{DirData, Node, ObjFlags, ObjId};
use crate::cache::path_index::PathTarget;
use crate::error::{CacheError, Result};
use crate::fs::{ObjectKind, Platform};
use crate::name::CodeUnit;
use crate::path::{Component, Parsed, ParsedPath, RootSpec, parse, parse_relative};

bitflags! {
    /// Modifiers for a lookup.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LookupFlags: u8 {
        /// Report a missing placeholder as [`CacheError::NotFound`].
        const NO_MISSING = 1 << 0;
        /// Create no placeholders and no path-index entries.
        const NO_INSERT  = 1 << 1;
        /// Do no platform I/O. Stale data is served as is; unpopulated directories yield
        /// [`CacheError::NotCached`].
        const NO_REFRESH = 1 << 2;
        /// A read-only probe that never changes what the cache holds.
        const PROBE      = Self::NO_INSERT.bits() | Self::NO_REFRESH.bits();
    }
}

impl<H> CacheState<H> {
    /// Resolve `path`, going through the path index. The returned id carries a reference for
    /// the caller.
    pub(crate) fn lookup_path<P: Platform<Handle = H>, C: CodeUnit>(
        &mut self,
        platform: &P,
        path: &[C],
        flags: LookupFlags,
    ) -> Result<ObjId> {
        self.stats.lookups += 1;
        let id = self.resolve_indexed(platform, path, flags)?;
        if flags.contains(LookupFlags::NO_MISSING) && self.objects[id].is_missing() {
            return Err(CacheError::NotFound);
        }
        Ok(self.retain_for_caller(id))
    }

    fn resolve_indexed<P: Platform<Handle = H>, C: CodeUnit>(
        &mut self,
        platform: &P,
        path: &[C],
        flags: LookupFlags,
    ) -> Result<ObjId> {
        let cached = C::path_table_ref(&self.paths)
            .get(path)
            .map(|entry| (entry.target, entry.stamp, entry.walkable));

        if let Some((target, stamp, walkable)) = cached {
            let detached = matches!(target, PathTarget::Object { id, .. }
                if self.objects[id].flags.contains(ObjFlags::DETACHED));
            let fresh = stamp == self.target_stamp(target);
            if !detached && (fresh || flags.contains(LookupFlags::NO_REFRESH)) {
                if fresh {
                    self.stats.path_hits += 1;
                }
                trace!(?target, fresh, "path index hit");
                return match target {
                    PathTarget::Object { id, .. } => Ok(id),
                    PathTarget::Failed(failure) => Err(failure.into()),
                };
            }
            if let PathTarget::Object { id, kind } = target
                && walkable
                && !detached
                && let Some(id) = self.revalidate(platform, path, id, kind, flags)?
            {
                let target = PathTarget::Object {
                    id,
                    kind: self.objects[id].kind(),
                };
                let stamp = self.target_stamp(target);
                if let Some(entry) = C::path_table(&mut self.paths).get_mut(path) {
                    entry.target = target;
                    entry.stamp = stamp;
                }
                self.stats.path_revalidations += 1;
                return Ok(id);
            }
        } else {
            self.stats.path_misses += 1;
        }

        let result = self.resolve_full(platform, path, flags);
        if flags.intersects(LookupFlags::NO_INSERT | LookupFlags::NO_REFRESH) {
            return result;
        }
        let target = match &result {
            Ok(id) => Some(PathTarget::Object {
                id: *id,
                kind: self.objects[*id].kind(),
            }),
            Err(e) if self.options.missing_paths => e.as_failure().map(PathTarget::Failed),
            Err(_) => None,
        };
        if let Some(target) = target {
            let walkable = matches!(
                parse(path, self.options.path_style, self.options.max_path_len),
                Ok(Parsed::Walkable(_))
            );
            if let Err(e) = self.record_path(path, target, walkable) {
                warn!(error = %e, "could not record path");
            }
        }
        result
    }

    /// Bring a stale path-index entry up to date without walking from the root.
    ///
    /// Returns `None` when the cached ancestor chain no longer spells the path or the object
    /// changed kind, in which case the caller walks from scratch.
    fn revalidate<P: Platform<Handle = H>, C: CodeUnit>(
        &mut self,
        platform: &P,
        path: &[C],
        id: ObjId,
        kind: ObjectKind,
        flags: LookupFlags,
    ) -> Result<Option<ObjId>> {
        let Parsed::Walkable(parsed) =
            parse(path, self.options.path_style, self.options.max_path_len)?
        else {
            return Ok(None);
        };
        let Some(chain) = self.chain(&parsed, id) else {
            return Ok(None);
        };
        for dir in chain {
            if !self.objects.get(dir).is_some_and(|obj| obj.is_dir()) {
                return Ok(None);
            }
            self.ensure_dir_fresh(platform, dir, flags)?;
        }
        if self.chain(&parsed, id).is_none() {
            return Ok(None);
        }

        let id = match self.finish_terminal(platform, id, parsed.trailing_separator, flags) {
            Ok(id) => id,
            Err(e) if e.as_failure().is_some() => return Ok(None),
            Err(e) => return Err(e),
        };
        let now = self.objects[id].kind();
        if now != kind && !now.is_missing() && !kind.is_missing() {
            debug!(was = ?kind, now = ?now, "object changed kind");
            return Ok(None);
        }
        Ok(Some(id))
    }

    /// The ancestors of `id` from the root down to its parent, if they still spell `parsed`.
    fn chain<C: CodeUnit>(&self, parsed: &ParsedPath<'_, C>, id: ObjId) -> Option<Vec<ObjId>> {
        let case_sensitive = self.options.case_sensitive;
        let root = *self.roots.get(&parsed.root.key(case_sensitive))?;
        let mut chain = Vec::with_capacity(parsed.components.len());
        let mut cur = id;
        for name in parsed.components.iter().rev() {
            let obj = self.objects.get(cur)?;
            if obj.flags.contains(ObjFlags::DETACHED) || !obj.matches(name, case_sensitive) {
                return None;
            }
            cur = obj.parent?;
            if !self.objects.get(cur)?.is_dir() {
                return None;
            }
            chain.push(cur);
        }
        if cur != root {
            return None;
        }
        chain.reverse();
        Some(chain)
    }

    fn resolve_full<P: Platform<Handle = H>, C: CodeUnit>(
        &mut self,
        platform: &P,
        path: &[C],
        flags: LookupFlags,
    ) -> Result<ObjId> {
        let style = self.options.path_style;
        let max_len = self.options.max_path_len;
        match parse(path, style, max_len)? {
            Parsed::Walkable(parsed) => self.walk(platform, &parsed, flags),
            Parsed::NeedsNormalization => {
                let absolute = C::absolutize(platform, path).map_err(CacheError::from_io)?;
                match parse(&absolute, style, max_len)? {
                    Parsed::Walkable(parsed) => self.walk(platform, &parsed, flags),
                    Parsed::NeedsNormalization => Err(CacheError::InvalidPath),
                }
            }
        }
    }

    /// Resolve a path without touching the path index or taking a reference.
    pub(crate) fn probe<P: Platform<Handle = H>>(&mut self, platform: &P, path: &[u8]) -> Result<ObjId> {
        self.resolve_full(platform, path, LookupFlags::PROBE)
    }

    fn resolve_root<P: Platform<Handle = H>>(
        &mut self,
        platform: &P,
        root: &RootSpec,
        flags: LookupFlags,
    ) -> Result<ObjId> {
        let key = root.key(self.options.case_sensitive);
        if let Some(&id) = self.roots.get(&key) {
            return Ok(id);
        }
        if flags.contains(LookupFlags::NO_REFRESH) {
            return Err(CacheError::NotCached);
        }

        let handle = platform.open_root(root).map_err(CacheError::from_io)?;
        let stat = platform.stat_handle(&handle).map_err(CacheError::from_io)?;
        let mut data = DirData::new();
        data.handle = Some(handle);
        data.root = Some(root.clone());
        let id = self.new_child(
            self.tree_root,
            Node::Directory(Box::new(data)),
            root.name(),
            None,
        )?;
        let obj = &mut self.objects[id];
        obj.flags.insert(ObjFlags::DRIVE_ROOT);
        obj.attrs = Some(stat.attrs);
        obj.identity = stat.identity;
        self.roots.insert(key, id);
        debug!(root = %root.name(), "opened root");
        Ok(id)
    }

    fn walk<P: Platform<Handle = H>, C: CodeUnit>(
        &mut self,
        platform: &P,
        parsed: &ParsedPath<'_, C>,
        flags: LookupFlags,
    ) -> Result<ObjId> {
        self.stats.walks += 1;
        let root = match self.resolve_root(platform, &parsed.root, flags) {
            Err(CacheError::NotFound) if !parsed.components.is_empty() => {
                return Err(CacheError::PathComponentNotFound);
            }
            other => other?,
        };
        let Some((last, intermediate)) = parsed.components.split_last() else {
            return Ok(root);
        };

        let mut cur = root;
        for name in intermediate {
            cur = self.step_into(platform, cur, name, flags)?;
        }
        let id = self.child(platform, cur, last, flags, true)?;
        self.finish_terminal(platform, id, parsed.trailing_separator, flags)
    }

    /// Look up `name` in `dir`, synthesizing a missing placeholder on a miss.
    fn child<P: Platform<Handle = H>, C: CodeUnit>(
        &mut self,
        platform: &P,
        dir: ObjId,
        name: &[C],
        flags: LookupFlags,
        last: bool,
    ) -> Result<ObjId> {
        self.ensure_dir_fresh(platform, dir, flags)?;
        if !self.objects[dir].is_dir() {
            return Err(CacheError::PathComponentNotFound);
        }
        if let Some(id) = find_child(&mut self.objects, dir, name, &self.options) {
            return Ok(id);
        }
        let placeholder = self.options.missing_objects && !flags.contains(LookupFlags::NO_INSERT);
        // Without a placeholder nothing would notice the name appearing later.
        if !placeholder
            && !flags.contains(LookupFlags::NO_REFRESH)
            && self.recheck_listing(platform, dir)?
            && let Some(id) = find_child(&mut self.objects, dir, name, &self.options)
        {
            return Ok(id);
        }
        if !placeholder {
            return Err(if last {
                CacheError::NotFound
            } else {
                CacheError::PathComponentNotFound
            });
        }
        self.add_missing(dir, C::name_from(name))
    }

    /// Resolve an intermediate component, which must end up a directory.
    fn step_into<P: Platform<Handle = H>, C: CodeUnit>(
        &mut self,
        platform: &P,
        dir: ObjId,
        name: &[C],
        flags: LookupFlags,
    ) -> Result<ObjId> {
        let id = self.child(platform, dir, name, flags, false)?;
        let kind = self.objects[id].kind();
        if kind != ObjectKind::Directory
            && !self.is_fresh(id)
            && !flags.contains(LookupFlags::NO_REFRESH)
        {
            match kind {
                ObjectKind::Missing => self.refresh_missing(platform, id)?,
                _ => self.refresh_object(platform, id)?,
            }
        }
        match self.objects.get(id).map(|obj| obj.kind()) {
            Some(ObjectKind::Directory) => Ok(id),
            Some(ObjectKind::File | ObjectKind::Other) => Err(CacheError::NotADirectory),
            Some(ObjectKind::Missing) | None => Err(CacheError::PathComponentNotFound),
        }
    }

    /// Refresh the object a lookup landed on and check it against a trailing separator.
    fn finish_terminal<P: Platform<Handle = H>>(
        &mut self,
        platform: &P,
        id: ObjId,
        trailing_separator: bool,
        flags: LookupFlags,
    ) -> Result<ObjId> {
        if !flags.contains(LookupFlags::NO_REFRESH) {
            if !self.is_fresh(id) {
                match self.objects[id].kind() {
                    ObjectKind::Missing => self.refresh_missing(platform, id)?,
                    ObjectKind::File | ObjectKind::Other => self.refresh_object(platform, id)?,
                    ObjectKind::Directory => {}
                }
            }
            if let Some(obj) = self.objects.get(id)
                && obj.is_dir()
                && obj.flags.contains(ObjFlags::MOUNT_POINT)
                && !obj.flags.contains(ObjFlags::TARGET_ATTRS)
            {
                self.resolve_mount_attrs(platform, id)?;
            }
        }

        let Some(obj) = self.objects.get(id) else {
            return Err(CacheError::NotFound);
        };
        if obj.flags.contains(ObjFlags::DETACHED) {
            return Err(CacheError::NotFound);
        }
        if trailing_separator && matches!(obj.kind(), ObjectKind::File | ObjectKind::Other) {
            return Err(CacheError::NotADirectory);
        }
        Ok(id)
    }

    /// Resolve `path` against the directory `dir`. The returned id carries a reference for
    /// the caller.
    pub(crate) fn lookup_relative<P: Platform<Handle = H>>(
        &mut self,
        platform: &P,
        dir: ObjId,
        path: &[u8],
        flags: LookupFlags,
    ) -> Result<ObjId> {
        self.stats.lookups += 1;
        let (components, trailing_separator) =
            parse_relative(path, self.options.path_style, self.options.max_path_len)?;

        let mut cur = dir;
        let count = components.len();
        for (i, component) in components.into_iter().enumerate() {
            cur = match component {
                Component::Parent => {
                    let obj = &self.objects[cur];
                    if obj.flags.contains(ObjFlags::DRIVE_ROOT) {
                        cur
                    } else {
                        obj.parent
                            .filter(|p| !self.objects[*p].flags.contains(ObjFlags::TREE_ROOT))
                            .ok_or(CacheError::NotFound)?
                    }
                }
                Component::Name(name) if i + 1 == count => {
                    self.child(platform, cur, name, flags, true)?
                }
                Component::Name(name) => self.step_into(platform, cur, name, flags)?,
            };
        }

        let id = self.finish_terminal(platform, cur, trailing_separator, flags)?;
        if flags.contains(LookupFlags::NO_MISSING) && self.objects[id].is_missing() {
            return Err(CacheError::NotFound);
        }
        Ok(self.retain_for_caller(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_is_read_only_and_refresh_free() {
        assert!(LookupFlags::PROBE.contains(LookupFlags::NO_INSERT));
        assert!(LookupFlags::PROBE.contains(LookupFlags::NO_REFRESH));
        assert!(!LookupFlags::PROBE.contains(LookupFlags::NO_MISSING));
    }
}
