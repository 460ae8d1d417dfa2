mod common;

use std::path::Path;

use common::*;
use fuse_reader::{
    CacheStrategy, CancelScope, DiskCache, Error, GroupRoot, MemoryWorkbook, QueryOptions,
    SourceCache, SourceError, XlsxOpener,
};
use pretty_assertions::assert_eq;

#[test]
fn building_twice_yields_identical_indices() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_items(dir.path(), "a.xlsx");
    let b = write_items(dir.path(), "b.xlsx");
    let files = [&a, &b];

    let first = SourceCache::build(&files, &XlsxOpener, &QueryOptions::default()).unwrap();
    let second = SourceCache::build(&files, &XlsxOpener, &QueryOptions::default()).unwrap();

    for file in [a.as_path(), b.as_path()] {
        let (x, y) = (first.header_index_for(file), second.header_index_for(file));
        assert_eq!(x, y);
        assert_eq!(
            serde_json::to_vec(&x).unwrap(),
            serde_json::to_vec(&y).unwrap()
        );
        assert_eq!(first.group_roots_for(file), second.group_roots_for(file));
    }
    assert_eq!(
        first.files().collect::<Vec<_>>(),
        vec![a.as_path(), b.as_path()]
    );
}

#[test]
fn exposes_the_layout_of_each_file() {
    let dir = tempfile::tempdir().unwrap();
    let items = write_items(dir.path(), "items.xlsx");

    let cache = SourceCache::build(&[&items], &XlsxOpener, &QueryOptions::default()).unwrap();

    assert_eq!(cache.header_row_for(&items), Some(1));
    assert_eq!(cache.column_count(&items), Some(header().len()));
    assert_eq!(
        cache.group_roots_for(&items).unwrap().as_slice(),
        &[GroupRoot::Leading, GroupRoot::Column(8), GroupRoot::Column(11)]
    );
    assert_eq!(
        cache.header_index_for(&items).unwrap().positions("Allergen Type Code"),
        &[9, 12]
    );
    cache.close();
}

#[test]
fn identical_headers_are_shared_across_files() {
    let cache = SourceCache::build(
        &["a.xlsx", "b.xlsx"],
        &memory_opener(&["a.xlsx", "b.xlsx"]),
        &QueryOptions::default(),
    )
    .unwrap();

    assert!(cache.shares_headers(Path::new("a.xlsx"), Path::new("b.xlsx")));
}

#[test]
fn the_disk_cache_serves_later_queries_until_its_scope_is_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    // Cache entries are keyed by the state of the file on disk.
    let items = write_items(dir.path(), "items.xlsx");

    let scope = CancelScope::new();
    let disk = DiskCache::new_in(dir.path(), &scope).unwrap();
    let options = QueryOptions::default().with_cache(CacheStrategy::OnDisk(disk.clone()));

    let first = SourceCache::build(&[&items], &SameWorkbook(memory_items()), &options).unwrap();
    assert_eq!(first.header_row_for(&items), Some(1));
    drop(first);

    // Without the cache this sheet has no header row at all.
    let headless = SameWorkbook(MemoryWorkbook::new().with_sheet("FS_Item", Vec::new()));
    let second = SourceCache::build(&[&items], &headless, &options).unwrap();
    assert_eq!(second.header_row_for(&items), Some(1));
    assert_eq!(second.column_count(&items), Some(header().len()));
    drop(second);

    scope.cancel();
    assert!(!disk.is_active());
    assert!(!disk.path().exists());

    let err = SourceCache::build(&[&items], &headless, &options)
        .err()
        .unwrap();
    assert!(matches!(
        err,
        Error::Source {
            source: SourceError::HeaderRowNotFound { max_rows: 5 },
            ..
        }
    ));
}

#[test]
fn the_disk_cache_keeps_each_sheet_apart() {
    let dir = tempfile::tempdir().unwrap();
    let items = write_items(dir.path(), "items.xlsx");

    let mut wide = header();
    wide.push("Gross Weight");
    let workbook = memory_items().with_sheet("Other", to_rows(&[wide]));
    let opener = SameWorkbook(workbook);

    let scope = CancelScope::new();
    let disk = DiskCache::new_in(dir.path(), &scope).unwrap();
    let on_disk = QueryOptions::default().with_cache(CacheStrategy::OnDisk(disk));

    let fs_item = SourceCache::build(&[&items], &opener, &on_disk).unwrap();
    assert_eq!(fs_item.header_row_for(&items), Some(1));
    assert_eq!(fs_item.column_count(&items), Some(15));
    fs_item.close();

    let other = SourceCache::build(&[&items], &opener, &on_disk.with_sheet("Other")).unwrap();
    let in_memory = SourceCache::build(
        &[&items],
        &opener,
        &QueryOptions::default().with_sheet("Other"),
    )
    .unwrap();
    assert_eq!(other.header_row_for(&items), Some(0));
    assert_eq!(other.column_count(&items), Some(16));
    assert_eq!(other.header_index_for(&items), in_memory.header_index_for(&items));
    assert_eq!(
        other.header_index_for(&items).unwrap().positions("Gross Weight"),
        &[15]
    );
    scope.cancel();
}

#[test]
fn no_files_is_a_validation_error() {
    let no_files: [&str; 0] = [];
    let err = SourceCache::build(&no_files, &XlsxOpener, &QueryOptions::default())
        .err()
        .unwrap();
    assert_eq!(err.kind(), fuse_reader::ErrorKind::Validation);
}
