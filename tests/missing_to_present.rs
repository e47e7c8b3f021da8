#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use common::{must, windows_cache, windows_tree};
use fscache::{ObjectKind, UserDataKey};

#[test]
fn a_placeholder_becomes_the_created_file() {
    let fs = windows_tree();
    let cache = windows_cache(&fs);
    let ghost = must(&cache, r"C:\a\later.txt");
    cache.attach_user_data(&ghost, UserDataKey(3), "dep").unwrap();

    fs.create_file(r"C:\a\later.txt", 11).unwrap();
    cache.invalidate_missing();

    let file = must(&cache, r"C:\a\later.txt");
    assert_eq!(file, ghost);
    assert_eq!(file.kind(), ObjectKind::File);
    assert!(cache.get_user_data::<&'static str>(&file, UserDataKey(3)).is_some());
    assert_eq!(cache.stats().rebirths, 1);
}

#[test]
fn a_placeholder_becomes_a_directory_that_can_be_walked() {
    let fs = windows_tree();
    let cache = windows_cache(&fs);
    let ghost = must(&cache, r"C:\a\new");

    fs.mkdir_p(r"C:\a\new").unwrap();
    fs.create_file(r"C:\a\new\x.c", 2).unwrap();
    cache.invalidate_missing();

    let x = must(&cache, r"C:\a\new\x.c");
    assert_eq!(x.attributes().map(|a| a.size), Some(2));
    assert_eq!(x.parent().unwrap(), ghost);
    assert!(ghost.is_dir());
}

#[test]
fn an_unchanged_parent_answers_without_a_name_query() {
    let fs = windows_tree();
    let cache = windows_cache(&fs);
    must(&cache, r"C:\a\nope");
    cache.invalidate_missing();

    fs.reset_counters();
    assert!(must(&cache, r"C:\a\nope").is_missing());
    assert_eq!(fs.enumerations(), 0);
    assert_eq!(fs.stat_calls(), 1, "only the parent's modified time is read");
    assert_eq!(cache.stats().missing_refreshes, 1);
}

#[test]
fn present_then_missing_then_present_keeps_one_object() {
    let fs = windows_tree();
    let cache = windows_cache(&fs);
    let first = must(&cache, r"C:\a\flip.txt");
    assert!(first.is_missing());

    fs.create_file(r"C:\a\flip.txt", 1).unwrap();
    cache.invalidate_missing();
    assert_eq!(must(&cache, r"C:\a\flip.txt").kind(), ObjectKind::File);

    fs.remove(r"C:\a\flip.txt").unwrap();
    cache.invalidate_all();
    let gone = must(&cache, r"C:\a\flip.txt");
    assert!(gone.is_missing());

    fs.create_file(r"C:\a\flip.txt", 2).unwrap();
    cache.invalidate_missing();
    let back = must(&cache, r"C:\a\flip.txt");
    assert_eq!(back.attributes().map(|a| a.size), Some(2));
    assert_eq!(back, first);
    assert_eq!(cache.stats().rebirths, 2);
}

#[test]
fn a_new_sibling_triggers_one_repopulation_of_the_parent() {
    let fs = windows_tree();
    let cache = windows_cache(&fs);
    must(&cache, r"C:\a\later.txt");
    fs.create_file(r"C:\a\later.txt", 1).unwrap();
    cache.invalidate_missing();
    must(&cache, r"C:\a\later.txt");

    // The parent changed, so its listing is read again on next access.
    let before = fs.enumerations_of(r"C:\a");
    let dir = must(&cache, r"C:\a");
    assert_eq!(common::listing(&cache, &dir), ["b", "e.txt", "later.txt"]);
    assert_eq!(fs.enumerations_of(r"C:\a"), before + 1);
}
