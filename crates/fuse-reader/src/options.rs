use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use fuse_model::WORKSHEET_FS_ITEM;

use crate::DiskCache;

/// Candidate items buffered between a file's reader and its parser. Only
/// large enough to overlap I/O with parsing.
pub(crate) const ITEM_QUEUE_CAPACITY: usize = 2;

pub const DEFAULT_ITEM_SEND_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_ITEM_RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RESULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_BLANK_ROW_LIMIT: usize = 1_000;

/// Where located header rows are kept between queries.
#[derive(Clone, Debug, Default)]
pub enum CacheStrategy {
    /// Headers are discovered per query and dropped with it.
    #[default]
    InMemory,
    /// Headers are persisted under a scratch directory that is removed when
    /// the cache's [`CancelScope`](crate::CancelScope) is cancelled.
    OnDisk(DiskCache),
}

/// Knobs for a single query. See the field docs for defaults.
#[derive(Clone, Debug)]
pub struct QueryOptions {
    /// Files processed at once. `None` uses the number of logical cores.
    pub workers: Option<NonZeroUsize>,
    /// Worksheet holding the item rows. Defaults to `FS_Item`.
    pub sheet: String,
    pub cache: CacheStrategy,
    /// Deadline for a reader to hand a candidate item to its parser.
    pub item_send_timeout: Duration,
    /// Deadline for a parser to receive the next candidate item.
    pub item_receive_timeout: Duration,
    /// Deadline for a parser to hand a field to the caller's output queue.
    pub result_send_timeout: Duration,
    /// Consecutive rows without a value under the pre-filter header after
    /// which the rest of a sheet is treated as trailing blank space.
    pub blank_row_limit: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            workers: None,
            sheet: WORKSHEET_FS_ITEM.to_owned(),
            cache: CacheStrategy::default(),
            item_send_timeout: DEFAULT_ITEM_SEND_TIMEOUT,
            item_receive_timeout: DEFAULT_ITEM_RECEIVE_TIMEOUT,
            result_send_timeout: DEFAULT_RESULT_SEND_TIMEOUT,
            blank_row_limit: DEFAULT_BLANK_ROW_LIMIT,
        }
    }
}

impl QueryOptions {
    /// Sets the worker count; `0` restores the per-core default.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = NonZeroUsize::new(workers);
        self
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = sheet.into();
        self
    }

    pub fn with_cache(mut self, cache: CacheStrategy) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_item_send_timeout(mut self, timeout: Duration) -> Self {
        self.item_send_timeout = timeout;
        self
    }

    pub fn with_item_receive_timeout(mut self, timeout: Duration) -> Self {
        self.item_receive_timeout = timeout;
        self
    }

    pub fn with_result_send_timeout(mut self, timeout: Duration) -> Self {
        self.result_send_timeout = timeout;
        self
    }

    pub fn with_blank_row_limit(mut self, limit: usize) -> Self {
        self.blank_row_limit = limit;
        self
    }

    pub fn worker_count(&self) -> usize {
        self.workers
            .or_else(|| thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get)
    }

    pub(crate) fn disk_cache(&self) -> Option<&DiskCache> {
        match &self.cache {
            CacheStrategy::InMemory => None,
            CacheStrategy::OnDisk(cache) => Some(cache),
        }
    }
}
