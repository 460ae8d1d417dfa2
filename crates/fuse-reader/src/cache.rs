//! Query-scoped cache of open workbooks and their header indices.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fuse_model::{build_header_index, GroupRoots, HeaderIndex};

use crate::disk_cache::CachedHeader;
use crate::pool;
use crate::source::{locate_header_row, SheetSource, SourceOpener};
use crate::{CancelScope, Error, QueryOptions};

/// Header index and group roots of one distinct header row.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Headers {
    pub index: HeaderIndex,
    pub roots: GroupRoots,
}

pub(crate) struct CachedSource {
    pub path: PathBuf,
    /// 0-based worksheet row holding the headers.
    pub header_row: usize,
    pub headers: Arc<Headers>,
    handle: Mutex<Box<dyn SheetSource>>,
}

impl CachedSource {
    /// Exclusive access to the workbook handle. Each file is scanned by a
    /// single reader, so this is uncontended during a query.
    pub(crate) fn handle(&self) -> MutexGuard<'_, Box<dyn SheetSource>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Open workbook handles plus their header indices for the duration of one
/// query.
///
/// Built once, read-only afterwards, and torn down exactly once: explicitly
/// via [`SourceCache::close`] or implicitly on drop, whichever comes first.
/// Files with identical header rows share one index.
pub struct SourceCache {
    sources: Vec<CachedSource>,
    closed: bool,
}

impl SourceCache {
    /// Opens every file (the first one up front, so an obviously bad path fails
    /// before any thread is spawned, the rest on the worker pool) and then
    /// locates each file's header row.
    pub fn build<P: AsRef<Path>>(
        files: &[P],
        opener: &dyn SourceOpener,
        options: &QueryOptions,
    ) -> Result<Self, Error> {
        let paths: Vec<PathBuf> = files.iter().map(|p| p.as_ref().to_path_buf()).collect();
        let Some((first, rest)) = paths.split_first() else {
            return Err(Error::Validation("no files were given".to_owned()));
        };

        let cancel = CancelScope::new();
        let open = |path: &PathBuf| {
            opener
                .open(path)
                .map(|handle| (path.clone(), handle))
                .map_err(|err| Error::from_source(path, err))
        };

        let mut handles = vec![open(first)?];
        handles.extend(pool::try_map(rest, options.worker_count(), &cancel, open)?);
        log::debug!("opened {} workbook(s)", handles.len());

        let handles: Vec<(PathBuf, Mutex<Box<dyn SheetSource>>)> = handles
            .into_iter()
            .map(|(path, handle)| (path, Mutex::new(handle)))
            .collect();
        let located = pool::try_map(&handles, options.worker_count(), &cancel, |(path, handle)| {
            let mut handle = handle.lock().unwrap_or_else(PoisonError::into_inner);
            header_row_for(path, handle.as_mut(), options)
        })?;

        let mut shared: HashMap<Vec<String>, Arc<Headers>> = HashMap::new();
        let sources = handles
            .into_iter()
            .zip(located)
            .map(|((path, handle), header)| {
                let headers = shared
                    .entry(header.labels)
                    .or_insert_with_key(|labels| {
                        let (index, roots) = build_header_index(labels);
                        Arc::new(Headers { index, roots })
                    })
                    .clone();
                CachedSource {
                    path,
                    header_row: header.row,
                    headers,
                    handle,
                }
            })
            .collect::<Vec<_>>();
        log::debug!(
            "indexed {} distinct header row(s) across {} workbook(s)",
            shared.len(),
            sources.len()
        );

        Ok(Self {
            sources,
            closed: false,
        })
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> + '_ {
        self.sources.iter().map(|s| s.path.as_path())
    }

    pub fn header_index_for(&self, file: &Path) -> Option<&HeaderIndex> {
        self.find(file).map(|s| &s.headers.index)
    }

    pub fn group_roots_for(&self, file: &Path) -> Option<&GroupRoots> {
        self.find(file).map(|s| &s.headers.roots)
    }

    pub fn column_count(&self, file: &Path) -> Option<usize> {
        self.header_index_for(file).map(HeaderIndex::column_count)
    }

    /// 0-based worksheet row of `file`'s header row.
    pub fn header_row_for(&self, file: &Path) -> Option<usize> {
        self.find(file).map(|s| s.header_row)
    }

    /// Releases every handle and index now rather than on drop.
    pub fn close(mut self) {
        self.teardown();
    }

    pub(crate) fn sources(&self) -> &[CachedSource] {
        &self.sources
    }

    /// True when `a` and `b` share one header index allocation.
    pub fn shares_headers(&self, a: &Path, b: &Path) -> bool {
        match (self.find(a), self.find(b)) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a.headers, &b.headers),
            _ => false,
        }
    }

    fn find(&self, file: &Path) -> Option<&CachedSource> {
        self.sources.iter().find(|s| s.path == file)
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let released = std::mem::take(&mut self.sources).len();
        log::debug!("closed {released} workbook(s)");
    }
}

impl Drop for SourceCache {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn header_row_for(
    path: &Path,
    handle: &mut dyn SheetSource,
    options: &QueryOptions,
) -> Result<CachedHeader, Error> {
    let disk = options.disk_cache();
    if let Some(cached) = disk.and_then(|cache| cache.load(path, &options.sheet)) {
        log::debug!(
            "header row of {} sheet `{}` served from disk cache",
            path.display(),
            options.sheet
        );
        return Ok(cached);
    }

    let (row, labels) =
        locate_header_row(handle, &options.sheet).map_err(|err| Error::from_source(path, err))?;
    let header = CachedHeader { row, labels };
    if let Some(cache) = disk {
        cache.store(path, &options.sheet, &header);
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use fuse_model::HEADER_ROW_PREFIX;

    use super::*;
    use crate::source::{MemoryOpener, MemoryWorkbook, Row};
    use crate::ErrorKind;

    fn header(extra: &[&str]) -> Row {
        HEADER_ROW_PREFIX
            .iter()
            .chain(extra)
            .map(|s| s.to_string())
            .collect()
    }

    fn opener() -> MemoryOpener {
        MemoryOpener::new()
            .with_workbook(
                "a.xlsx",
                MemoryWorkbook::new().with_sheet("FS_Item", vec![header(&["Width"])]),
            )
            .with_workbook(
                "b.xlsx",
                MemoryWorkbook::new().with_sheet("FS_Item", vec![Row::new(), header(&["Width"])]),
            )
            .with_workbook(
                "c.xlsx",
                MemoryWorkbook::new().with_sheet("FS_Item", vec![header(&["Height"])]),
            )
    }

    #[test]
    fn identical_header_rows_share_an_index() {
        let cache = SourceCache::build(
            &["a.xlsx", "b.xlsx", "c.xlsx"],
            &opener(),
            &QueryOptions::default().with_workers(2),
        )
        .unwrap();

        let (a, b, c) = (Path::new("a.xlsx"), Path::new("b.xlsx"), Path::new("c.xlsx"));
        assert_eq!(cache.len(), 3);
        assert!(cache.shares_headers(a, b));
        assert!(!cache.shares_headers(a, c));
        assert_eq!(cache.header_row_for(a), Some(0));
        assert_eq!(cache.header_row_for(b), Some(1));
        assert_eq!(cache.column_count(c), Some(HEADER_ROW_PREFIX.len() + 1));
        assert_eq!(cache.header_index_for(c).unwrap().positions("Height"), &[7]);
        assert!(cache.group_roots_for(Path::new("d.xlsx")).is_none());
    }

    #[test]
    fn a_bad_path_fails_the_whole_build() {
        let err = SourceCache::build(
            &["a.xlsx", "missing.xlsx"],
            &opener(),
            &QueryOptions::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::Source);
        assert!(err.to_string().contains("missing.xlsx"));
    }

    #[test]
    fn a_sheet_without_headers_fails_the_build() {
        let opener = MemoryOpener::new().with_workbook(
            "plain.xlsx",
            MemoryWorkbook::new().with_sheet("FS_Item", vec![vec!["just data".to_string()]]),
        );
        let err = SourceCache::build(&["plain.xlsx"], &opener, &QueryOptions::default())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Source);
    }

    #[test]
    fn close_releases_everything_once() {
        let mut cache =
            SourceCache::build(&["a.xlsx"], &opener(), &QueryOptions::default()).unwrap();
        cache.teardown();
        assert!(cache.is_empty());
        assert!(cache.header_index_for(Path::new("a.xlsx")).is_none());
        cache.close();
    }
}
