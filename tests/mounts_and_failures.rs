#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use common::{listing, must, windows_cache, windows_tree};
use fscache::{Attributes, CacheError, ObjFlags, ObjectKind};

fn volume_attrs() -> Attributes {
    Attributes {
        size: 4096,
        mode: 0o040_700,
        ..Attributes::default()
    }
}

#[test]
fn mount_points_report_the_mounted_volume() {
    let fs = windows_tree();
    fs.mkdir_p(r"C:\mnt").unwrap();
    fs.set_mount_point(r"C:\mnt", volume_attrs()).unwrap();
    let cache = windows_cache(&fs);

    let mnt = must(&cache, r"C:\mnt");
    let flags = mnt.flags();
    assert!(flags.contains(ObjFlags::MOUNT_POINT));
    assert!(flags.contains(ObjFlags::TARGET_ATTRS));
    assert_eq!(mnt.attributes().map(|a| a.size), Some(4096));
    assert_eq!(mnt.attributes().map(|a| a.mode), Some(0o040_700));
}

#[test]
fn enumeration_alone_reports_the_mount_point_itself() {
    let fs = windows_tree();
    fs.mkdir_p(r"C:\mnt").unwrap();
    fs.set_mount_point(r"C:\mnt", volume_attrs()).unwrap();
    let cache = windows_cache(&fs);

    let root = must(&cache, r"C:\");
    let children = cache.read_dir(&root).unwrap();
    let mnt = children
        .iter()
        .find(|c| c.name().to_string() == "mnt")
        .unwrap();
    assert!(mnt.flags().contains(ObjFlags::MOUNT_POINT));
    assert!(!mnt.flags().contains(ObjFlags::TARGET_ATTRS));
    assert_eq!(mnt.attributes().map(|a| a.size), Some(0));

    // A lookup that lands on it reads through the mount.
    assert_eq!(must(&cache, r"C:\mnt"), *mnt);
    assert_eq!(mnt.attributes().map(|a| a.size), Some(4096));

    // A refresh of the parent resets it to what enumeration reports.
    cache.invalidate_all();
    assert_eq!(must(&cache, r"C:\mnt").attributes().map(|a| a.size), Some(4096));
}

#[test]
fn failed_first_enumeration_is_retried() {
    let fs = windows_tree();
    fs.fail_enumeration(r"C:\a", 1).unwrap();
    let cache = windows_cache(&fs);

    assert!(matches!(cache.lookup(r"C:\a\e.txt"), Err(CacheError::Io(_))));
    assert_eq!(cache.path_entry_count(), 0, "I/O errors are not remembered");

    let e = must(&cache, r"C:\a\e.txt");
    assert_eq!(e.attributes().map(|a| a.size), Some(5));
    let a = must(&cache, r"C:\a");
    assert_eq!(listing(&cache, &a), ["b", "e.txt"]);
    assert_eq!(fs.enumerations_of(r"C:\a"), 2);
}

#[test]
fn failed_re_enumeration_keeps_the_children() {
    let fs = windows_tree();
    let cache = windows_cache(&fs);
    let e = must(&cache, r"C:\a\e.txt");
    let b = must(&cache, r"C:\a\b");

    fs.fail_enumeration(r"C:\a", 1).unwrap();
    cache.invalidate_all();
    assert!(matches!(cache.lookup(r"C:\a\e.txt"), Err(CacheError::Io(_))));
    assert!(!e.flags().contains(ObjFlags::DETACHED));
    assert_eq!(e.parent().unwrap().name().to_string(), "a");

    assert_eq!(must(&cache, r"C:\a\e.txt"), e);
    assert_eq!(must(&cache, r"C:\a\b"), b);
    let a = must(&cache, r"C:\a");
    assert_eq!(listing(&cache, &a), ["b", "e.txt"]);
}

#[test]
fn other_entries_are_neither_files_nor_directories() {
    let fs = windows_tree();
    fs.create_other(r"C:\a\pipe").unwrap();
    let cache = windows_cache(&fs);
    assert_eq!(must(&cache, r"C:\a\pipe").kind(), ObjectKind::Other);
    assert!(matches!(
        cache.lookup(r"C:\a\pipe\x"),
        Err(CacheError::NotADirectory)
    ));
    assert!(matches!(
        cache.lookup(r"C:\a\pipe\"),
        Err(CacheError::NotADirectory)
    ));
}

#[test]
fn small_batches_enumerate_everything() {
    let fs = windows_tree();
    for name in ["f1", "f2", "f3", "f4", "f5"] {
        fs.create_file(&format!(r"C:\a\b\{name}"), 1).unwrap();
    }
    fs.set_batch_size(2);
    let cache = windows_cache(&fs);
    let b = must(&cache, r"C:\a\b");
    assert_eq!(
        listing(&cache, &b),
        ["c.txt", "d.txt", "f1", "f2", "f3", "f4", "f5"]
    );
}
