#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use common::{cache_with, must, windows_cache, windows_tree};
use fscache::{CacheError, CacheOptions, CustomInvalidation, ObjFlags};

#[test]
fn marking_a_subtree_keeps_it_fresh() {
    let fs = windows_tree();
    let cache = windows_cache(&fs);
    let src = must(&cache, r"C:\src");
    let main = must(&cache, r"C:\src\main.c");

    cache.mark_custom_subtree(&src);
    assert!(src.flags().contains(ObjFlags::CUSTOM_GENERATION));
    assert!(main.flags().contains(ObjFlags::CUSTOM_GENERATION));
    assert!(main.is_fresh());

    let io = fs.io_calls();
    assert_eq!(must(&cache, r"C:\src\main.c"), main);
    assert_eq!(fs.io_calls(), io);
}

#[test]
fn custom_invalidation_leaves_the_default_scope_alone() {
    let fs = windows_tree();
    let cache = windows_cache(&fs);
    let src = must(&cache, r"C:\src");
    let main = must(&cache, r"C:\src\main.c");
    let e = must(&cache, r"C:\a\e.txt");
    cache.mark_custom_subtree(&src);

    cache.invalidate_custom(CustomInvalidation::Both);
    assert!(!main.is_fresh());
    assert!(!src.is_fresh());
    assert!(e.is_fresh());

    assert_eq!(must(&cache, r"C:\src\main.c"), main);
    assert!(main.is_fresh());
    assert_eq!(fs.enumerations_of(r"C:\src"), 2);
    assert_eq!(fs.enumerations_of(r"C:\a"), 1);
    assert_eq!(fs.enumerations_of(r"C:\"), 1);
}

#[test]
fn missing_only_spares_present_objects() {
    let fs = windows_tree();
    let cache = windows_cache(&fs);
    let src = must(&cache, r"C:\src");
    cache.mark_custom_subtree(&src);

    let main = must(&cache, r"C:\src\main.c");
    let inside = must(&cache, r"C:\src\ghost.h");
    let outside = must(&cache, r"C:\a\ghost.h");
    assert!(inside.flags().contains(ObjFlags::CUSTOM_GENERATION));
    assert!(!outside.flags().contains(ObjFlags::CUSTOM_GENERATION));

    cache.invalidate_custom(CustomInvalidation::MissingOnly);
    assert!(main.is_fresh());
    assert!(!inside.is_fresh());
    assert!(outside.is_fresh());

    fs.create_file(r"C:\src\ghost.h", 8).unwrap();
    assert!(!must(&cache, r"C:\src\ghost.h").is_missing());
    assert_eq!(inside.attributes().map(|a| a.size), Some(8));
}

#[test]
fn children_created_later_inherit_the_scope() {
    let fs = windows_tree();
    let cache = windows_cache(&fs);
    let src = must(&cache, r"C:\src");
    cache.mark_custom_subtree(&src);

    fs.mkdir_p(r"C:\src\gen").unwrap();
    fs.create_file(r"C:\src\gen\out.c", 1).unwrap();
    cache.invalidate_custom(CustomInvalidation::Both);

    let out = must(&cache, r"C:\src\gen\out.c");
    assert!(out.flags().contains(ObjFlags::CUSTOM_GENERATION));
    assert!(out.parent().unwrap().flags().contains(ObjFlags::CUSTOM_GENERATION));

    cache.invalidate_all();
    assert!(!out.is_fresh());
}

#[test]
fn invalidate_missing_skips_custom_subtrees() {
    let fs = windows_tree();
    let cache = windows_cache(&fs);
    let src = must(&cache, r"C:\src");
    cache.mark_custom_subtree(&src);
    let ghost = must(&cache, r"C:\src\ghost.h");

    cache.invalidate_missing();
    assert!(ghost.is_fresh(), "the default missing counter does not cover custom objects");
    cache.invalidate_all();
    assert!(!ghost.is_fresh());
    assert!(!src.is_fresh());
}

#[test]
fn remembered_failures_follow_the_default_scope() {
    let fs = windows_tree();
    let cache = cache_with(
        &fs,
        CacheOptions {
            missing_objects: false,
            ..CacheOptions::default()
        },
    );
    let src = must(&cache, r"C:\src");
    cache.mark_custom_subtree(&src);
    assert!(matches!(
        cache.lookup(r"C:\src\ghost.h"),
        Err(CacheError::NotFound)
    ));

    cache.invalidate_custom(CustomInvalidation::Both);
    let io = fs.io_calls();
    assert!(matches!(
        cache.lookup(r"C:\src\ghost.h"),
        Err(CacheError::NotFound)
    ));
    assert_eq!(fs.io_calls(), io);
}
