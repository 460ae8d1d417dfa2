//! Fixed-size worker pool with first-error-wins aggregation.
//!
//! Each call runs on its own Rayon pool sized to the query's worker count,
//! never on the global pool. The first failing job cancels the shared scope;
//! jobs not yet started are skipped once it is cancelled, and only that first
//! error is returned.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::{CancelScope, Error};

fn build_pool(threads: usize) -> Option<ThreadPool> {
    let try_build = |n| {
        ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("fuse-worker-{i}"))
            .build()
    };

    match try_build(threads) {
        Ok(pool) => Some(pool),
        Err(err) if threads > 1 => {
            log::warn!("failed to start {threads} workers ({err}); falling back to one");
            try_build(1).ok()
        }
        Err(err) => {
            log::warn!("failed to start a worker pool ({err}); running jobs inline");
            None
        }
    }
}

/// Runs `task` over `items` on at most `workers` threads.
///
/// Results come back in input order. Jobs not started before `cancel` fires
/// are skipped and have no entry in the output.
pub(crate) fn try_map<T, R, F>(
    items: &[T],
    workers: usize,
    cancel: &CancelScope,
    task: F,
) -> Result<Vec<R>, Error>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R, Error> + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let attempt = |item: &T| -> Option<Result<R, Error>> {
        if cancel.is_cancelled() {
            return None;
        }
        let out = task(item);
        if out.is_err() {
            cancel.cancel();
        }
        Some(out)
    };

    match build_pool(workers.clamp(1, items.len())) {
        Some(pool) => pool.install(|| items.par_iter().filter_map(attempt).collect()),
        None => items.iter().filter_map(attempt).collect(),
    }
}
