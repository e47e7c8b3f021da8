//! Per-directory child name index.
//!
//! Small directories are searched linearly. Once a directory has at least the configured
//! number of children, a bucket table keyed by case-folded name hash is attached to it for
//! the encoding being queried. The table fills itself: a name found by the linear scan is
//! inserted, and new placeholders are inserted when they are attached.

use crate::cache::object::{ObjId, ObjTable};
use crate::hash::hash_units_folded;
use crate::name::{CodeUnit, Encoding};
use crate::options::{CacheOptions, MAX_INDEX_BUCKETS};

const MIN_BUCKETS: usize = 16;

trait DedupPush<T: PartialEq> {
    fn dedup_push(&mut self, item: T);
}

impl<T: PartialEq> DedupPush<T> for Vec<T> {
    fn dedup_push(&mut self, item: T) {
        if !self.contains(&item) {
            self.push(item);
        }
    }
}

pub(crate) struct ChildIndex {
    /// Collision chains of `(folded hash, child)`.
    buckets: Vec<Vec<(u32, ObjId)>>,
}

fn bucket_count_for(children: usize) -> usize {
    children
        .saturating_mul(2)
        .checked_next_power_of_two()
        .unwrap_or(MAX_INDEX_BUCKETS)
        .clamp(MIN_BUCKETS, MAX_INDEX_BUCKETS)
}

impl ChildIndex {
    pub(crate) fn for_children(children: usize) -> Self {
        Self {
            buckets: (0..bucket_count_for(children)).map(|_| Vec::new()).collect(),
        }
    }

    fn bucket(&self, hash: u32) -> usize {
        hash as usize & (self.buckets.len() - 1)
    }

    #[cfg(test)]
    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn insert(&mut self, hash: u32, id: ObjId) {
        let bucket = self.bucket(hash);
        self.buckets[bucket].dedup_push((hash, id));
    }

    fn candidates(&self, hash: u32) -> impl Iterator<Item = ObjId> + '_ {
        self.buckets[self.bucket(hash)]
            .iter()
            .filter(move |(h, _)| *h == hash)
            .map(|(_, id)| *id)
    }

    /// Rehash into a larger table if the directory has outgrown this one.
    fn grow_for(&mut self, children: usize) {
        let wanted = bucket_count_for(children);
        if wanted <= self.buckets.len() || children <= self.buckets.len() {
            return;
        }
        let old = std::mem::replace(
            &mut self.buckets,
            (0..wanted).map(|_| Vec::new()).collect(),
        );
        for (hash, id) in old.into_iter().flatten() {
            self.insert(hash, id);
        }
    }
}

fn threshold(options: &CacheOptions, encoding: Encoding) -> usize {
    match encoding {
        Encoding::Narrow => options.narrow_index_threshold,
        Encoding::Wide => options.wide_index_threshold,
    }
}

/// Find the child of `dir` named `name` (long or short), building or growing the index for
/// this encoding as needed.
pub(crate) fn find_child<H, C: CodeUnit>(
    objects: &mut ObjTable<H>,
    dir: ObjId,
    name: &[C],
    options: &CacheOptions,
) -> Option<ObjId> {
    let slot = C::ENCODING.slot();
    let hash = hash_units_folded(name);
    let case_sensitive = options.case_sensitive;

    let data = objects.get_mut(dir)?.dir_mut()?;
    let children = data.children.len();
    let mut index = data.indexes[slot].take();
    if index.is_none() && children >= threshold(options, C::ENCODING) {
        index = Some(ChildIndex::for_children(children));
    }
    if let Some(index) = index.as_mut() {
        index.grow_for(children);
    }

    let objects_ref = &*objects;
    let is_match = |id: ObjId| {
        objects_ref
            .get(id)
            .is_some_and(|obj| obj.parent == Some(dir) && obj.matches(name, case_sensitive))
    };
    let mut found = index
        .as_ref()
        .and_then(|index| index.candidates(hash).find(|id| is_match(*id)));
    if found.is_none() {
        found = linear_scan(objects_ref, dir, name, case_sensitive);
        if let (Some(id), Some(index)) = (found, index.as_mut()) {
            index.insert(hash, id);
        }
    }

    if let Some(data) = objects.get_mut(dir).and_then(|obj| obj.dir_mut()) {
        data.indexes[slot] = index;
    }
    found
}

pub(crate) fn linear_scan<H, C: CodeUnit>(
    objects: &ObjTable<H>,
    dir: ObjId,
    name: &[C],
    case_sensitive: bool,
) -> Option<ObjId> {
    let data = objects.get(dir)?.dir()?;
    data.children
        .iter()
        .copied()
        .find(|id| objects.get(*id).is_some_and(|obj| obj.matches(name, case_sensitive)))
}

fn index_one<H, C: CodeUnit>(objects: &mut ObjTable<H>, dir: ObjId, child: ObjId) {
    let Some(obj) = objects.get(child) else {
        return;
    };
    let mut hashes = vec![hash_units_folded(C::units(&obj.name))];
    if let Some(short) = &obj.short_name {
        hashes.push(hash_units_folded(C::units(short)));
    }
    let Some(index) = objects
        .get_mut(dir)
        .and_then(|obj| obj.dir_mut())
        .and_then(|data| data.indexes[C::ENCODING.slot()].as_mut())
    else {
        return;
    };
    for hash in hashes {
        index.insert(hash, child);
    }
}

/// Add a newly attached child to whichever indexes `dir` already has.
pub(crate) fn index_new_child<H>(objects: &mut ObjTable<H>, dir: ObjId, child: ObjId) {
    index_one::<H, u8>(objects, dir, child);
    index_one::<H, u16>(objects, dir, child);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::object::{DirData, Node, Object};
    use crate::name::Name;

    fn populate(children: usize) -> (ObjTable<()>, ObjId) {
        let mut objects = ObjTable::new();
        let dir = objects
            .insert(Object::new(
                Node::Directory(Box::new(DirData::new())),
                Name::from("dir"),
                None,
                1,
            ))
            .unwrap_or_else(|e| panic!("{e}"));
        for i in 0..children {
            let mut obj = Object::new(Node::File, Name::from(format!("File{i:04}.c").as_str()), Some(dir), 1);
            if i % 3 == 0 {
                obj.short_name = Some(Name::from(format!("FILE{i}~1.C").as_str()));
            }
            let id = objects.insert(obj).unwrap_or_else(|e| panic!("{e}"));
            if let Some(data) = objects[dir].dir_mut() {
                data.children.push(id);
            }
        }
        (objects, dir)
    }

    fn queries(children: usize) -> Vec<String> {
        let mut q = Vec::new();
        for i in 0..children + 3 {
            q.push(format!("File{i:04}.c"));
            q.push(format!("file{i:04}.C"));
            q.push(format!("FILE{i}~1.C"));
            q.push(format!("file{i}~1.c"));
        }
        q.push("nope".to_owned());
        q
    }

    #[test]
    fn indexed_lookup_matches_linear_scan() {
        let options = CacheOptions {
            narrow_index_threshold: 8,
            wide_index_threshold: 5,
            ..CacheOptions::default()
        };
        for children in [0, 1, 4, 5, 7, 8, 9, 16, 17, 33, 100, 300] {
            let (mut objects, dir) = populate(children);
            for query in queries(children) {
                let narrow = query.as_bytes();
                let wide: Vec<u16> = query.encode_utf16().collect();
                let expected = linear_scan(&objects, dir, narrow, false);
                // Twice: the second pass hits entries inserted by the first.
                for _ in 0..2 {
                    assert_eq!(
                        find_child(&mut objects, dir, narrow, &options),
                        expected,
                        "{children} children, narrow {query:?}"
                    );
                    assert_eq!(
                        find_child(&mut objects, dir, &wide, &options),
                        expected,
                        "{children} children, wide {query:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn case_sensitive_lookup_respects_case() {
        let options = CacheOptions {
            case_sensitive: true,
            narrow_index_threshold: 1,
            ..CacheOptions::default()
        };
        let (mut objects, dir) = populate(20);
        assert!(find_child(&mut objects, dir, b"File0003.c".as_slice(), &options).is_some());
        assert!(find_child(&mut objects, dir, b"file0003.c".as_slice(), &options).is_none());
    }

    #[test]
    fn index_is_built_at_threshold_and_grows() {
        let options = CacheOptions {
            narrow_index_threshold: 4,
            ..CacheOptions::default()
        };
        let (mut objects, dir) = populate(3);
        find_child(&mut objects, dir, b"x".as_slice(), &options);
        assert!(objects[dir].dir().is_some_and(|d| d.indexes[0].is_none()));

        let (mut objects, dir) = populate(200);
        find_child(&mut objects, dir, b"x".as_slice(), &options);
        let buckets = objects[dir]
            .dir()
            .and_then(|d| d.indexes[0].as_ref())
            .map(ChildIndex::bucket_count);
        assert_eq!(buckets, Some(512));
        assert!(objects[dir].dir().is_some_and(|d| d.indexes[1].is_none()));
    }

    #[test]
    fn bucket_sizing() {
        assert_eq!(bucket_count_for(0), MIN_BUCKETS);
        assert_eq!(bucket_count_for(100), 256);
        assert_eq!(bucket_count_for(usize::MAX), MAX_INDEX_BUCKETS);
    }
}
