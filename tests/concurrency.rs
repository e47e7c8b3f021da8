#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use common::{must, windows_cache, windows_tree};
use fscache::{ObjId, ObjectKind};
use tokio::task::JoinSet;

const PATHS: [&str; 4] = [
    r"C:\a\b\c.txt",
    r"C:\a\b\d.txt",
    r"C:\a\e.txt",
    r"C:\src\main.c",
];

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_lookups_populate_each_directory_once() {
    let fs = windows_tree();
    let cache = windows_cache(&fs);

    let mut tasks = JoinSet::new();
    for i in 0..64 {
        let cache = cache.clone();
        tasks.spawn_blocking(move || {
            let path = PATHS[i % PATHS.len()];
            (path, cache.lookup(path).map(|obj| obj.id()))
        });
    }

    let mut seen: Vec<(&str, ObjId)> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (path, id) = joined.unwrap();
        seen.push((path, id.unwrap()));
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), PATHS.len(), "each path resolves to one object");
    // C:\, a, b and src.
    assert_eq!(fs.enumerations(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lookups_race_invalidation_safely() {
    let fs = windows_tree();
    let cache = windows_cache(&fs);
    let expected: Vec<ObjId> = PATHS.iter().map(|p| must(&cache, p).id()).collect();

    let mut tasks = JoinSet::new();
    {
        let cache = cache.clone();
        tasks.spawn_blocking(move || {
            for i in 0..200 {
                if i % 2 == 0 {
                    cache.invalidate_all();
                } else {
                    cache.invalidate_missing();
                }
            }
            Vec::new()
        });
    }
    for worker in 0..4 {
        let cache = cache.clone();
        tasks.spawn_blocking(move || {
            let mut ids = Vec::new();
            for i in 0..100 {
                let path = PATHS[(i + worker) % PATHS.len()];
                let obj = cache.lookup(path).unwrap();
                assert_ne!(obj.kind(), ObjectKind::Missing);
                ids.push((path, obj.id()));
            }
            ids
        });
    }

    while let Some(joined) = tasks.join_next().await {
        for (path, id) in joined.unwrap() {
            let want = PATHS.iter().position(|p| *p == path).unwrap();
            assert_eq!(id, expected[want], "{path} changed identity");
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn references_can_be_dropped_on_other_threads() {
    let fs = windows_tree();
    let cache = windows_cache(&fs);
    let file = must(&cache, r"C:\a\e.txt");
    let refs = file.ref_count();

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let held = file.clone();
        tasks.spawn_blocking(move || drop(held));
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }
    assert_eq!(file.ref_count(), refs);
}
