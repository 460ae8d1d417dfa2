//! On-disk cache of located header rows.
//!
//! Entries are keyed by the worksheet name plus the file's canonical path,
//! length and modification time, so an edited workbook never reuses a stale
//! header row and one sheet never answers for another. The cache lives
//! in a scratch directory owned by the caller's [`CancelScope`]: cancelling the
//! scope deletes the directory and every later lookup misses.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::{NamedTempFile, TempDir};

use crate::CancelScope;

/// Header row of one workbook as stored on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CachedHeader {
    /// 0-based worksheet row of the header.
    pub row: usize,
    pub labels: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct DiskCache {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    dir: Mutex<Option<TempDir>>,
}

impl DiskCache {
    /// Creates the cache under the system temp directory.
    pub fn new(scope: &CancelScope) -> io::Result<Self> {
        Self::new_in(std::env::temp_dir(), scope)
    }

    pub fn new_in(parent: impl AsRef<Path>, scope: &CancelScope) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("fuse-header-cache-")
            .tempdir_in(parent)?;
        let cache = Self {
            inner: Arc::new(Inner {
                path: dir.path().to_path_buf(),
                dir: Mutex::new(Some(dir)),
            }),
        };

        let bound = cache.clone();
        scope.on_cancel(move || bound.remove());
        Ok(cache)
    }

    /// Scratch directory backing the cache.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// False once the owning scope has been cancelled.
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    pub(crate) fn load(&self, file: &Path, sheet: &str) -> Option<CachedHeader> {
        let dir = self.lock();
        let dir = dir.as_ref()?;
        let entry = dir.path().join(entry_name(file, sheet).ok()?);

        let bytes = match fs::read(&entry) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                log::warn!("failed to read header cache entry {}: {err}", entry.display());
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(header) => Some(header),
            Err(err) => {
                log::warn!("discarding corrupt header cache entry {}: {err}", entry.display());
                None
            }
        }
    }

    pub(crate) fn store(&self, file: &Path, sheet: &str, header: &CachedHeader) {
        let dir = self.lock();
        let Some(dir) = dir.as_ref() else {
            return;
        };
        if let Err(err) = write_entry(dir.path(), file, sheet, header) {
            log::warn!(
                "failed to cache header row of {} sheet `{sheet}`: {err}",
                file.display()
            );
        }
    }

    fn remove(&self) {
        let Some(dir) = self.lock().take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => log::debug!("removed header cache {}", path.display()),
            Err(err) => log::warn!("failed to remove header cache {}: {err}", path.display()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<TempDir>> {
        self.inner.dir.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn write_entry(dir: &Path, file: &Path, sheet: &str, header: &CachedHeader) -> io::Result<()> {
    let dest = dir.join(entry_name(file, sheet)?);
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer(tmp.as_file_mut(), header)?;
    tmp.as_file_mut().flush()?;
    tmp.persist(dest).map_err(|err| err.error)?;
    Ok(())
}

/// Stable cache file name for `sheet` in the current on-disk state of `file`.
fn entry_name(file: &Path, sheet: &str) -> io::Result<String> {
    let canonical = fs::canonicalize(file)?;
    let meta = File::open(&canonical)?.metadata()?;
    let modified = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    hasher.update(meta.len().to_le_bytes());
    hasher.update(modified.to_le_bytes());
    hasher.update((sheet.len() as u64).to_le_bytes());
    hasher.update(sheet.as_bytes());
    let digest = hasher.finalize();

    let mut name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    name.push_str(".json");
    Ok(name)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn header() -> CachedHeader {
        CachedHeader {
            row: 2,
            labels: vec!["RECORD TYPE".to_string(), "Item ID".to_string()],
        }
    }

    #[test]
    fn stores_and_loads_by_file_identity() {
        let scratch = tempfile::tempdir().unwrap();
        let workbook = scratch.path().join("items.xlsx");
        fs::write(&workbook, b"not really a workbook").unwrap();

        let scope = CancelScope::new();
        let cache = DiskCache::new_in(scratch.path(), &scope).unwrap();
        assert_eq!(cache.load(&workbook, "FS_Item"), None);

        cache.store(&workbook, "FS_Item", &header());
        assert_eq!(cache.load(&workbook, "FS_Item"), Some(header()));
    }

    #[test]
    fn entries_are_kept_per_sheet() {
        let scratch = tempfile::tempdir().unwrap();
        let workbook = scratch.path().join("items.xlsx");
        fs::write(&workbook, b"two sheets").unwrap();

        let cache = DiskCache::new_in(scratch.path(), &CancelScope::new()).unwrap();
        cache.store(&workbook, "FS_Item", &header());

        assert_eq!(cache.load(&workbook, "Other"), None);
        let other = CachedHeader {
            row: 0,
            labels: vec!["RECORD TYPE".to_string()],
        };
        cache.store(&workbook, "Other", &other);
        assert_eq!(cache.load(&workbook, "Other"), Some(other));
        assert_eq!(cache.load(&workbook, "FS_Item"), Some(header()));
    }

    #[test]
    fn cancelling_the_scope_removes_the_cache() {
        let scratch = tempfile::tempdir().unwrap();
        let workbook = scratch.path().join("items.xlsx");
        fs::write(&workbook, b"bytes").unwrap();

        let scope = CancelScope::new();
        let cache = DiskCache::new_in(scratch.path(), &scope).unwrap();
        cache.store(&workbook, "FS_Item", &header());
        let dir = cache.path().to_path_buf();
        assert!(dir.exists());

        scope.cancel();

        assert!(!dir.exists());
        assert!(!cache.is_active());
        assert_eq!(cache.load(&workbook, "FS_Item"), None);
        cache.store(&workbook, "FS_Item", &header());
        assert!(!dir.exists());
    }

    #[test]
    fn missing_files_never_hit() {
        let scratch = tempfile::tempdir().unwrap();
        let cache = DiskCache::new_in(scratch.path(), &CancelScope::new()).unwrap();

        assert_eq!(cache.load(&scratch.path().join("absent.xlsx"), "FS_Item"), None);
    }
}
