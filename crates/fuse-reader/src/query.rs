//! Query orchestration: validation, pre-flight resolution and the per-file
//! reader/parser pipelines run on a bounded worker pool.

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Instant;

use crossbeam_channel::Sender;
use fuse_model::HEADER_ITEM_ID;

use crate::cache::{CachedSource, SourceCache};
use crate::options::ITEM_QUEUE_CAPACITY;
use crate::parse::{FilePlan, Parser, Target};
use crate::pool;
use crate::segment::{ScanEnd, Segmenter};
use crate::source::{SourceOpener, XlsxOpener};
use crate::{
    CancelScope, Error, FieldLocation, FieldMatcher, FieldRetrieval, HeaderSpec, ItemLocation,
    QueryOptions, ResultField,
};

/// Entry point for queries over a set of workbooks.
///
/// Holds no per-query state, so one reader can serve any number of queries,
/// concurrently or not.
#[derive(Debug, Clone, Default)]
pub struct FuseReader<O = XlsxOpener> {
    opener: O,
    options: QueryOptions,
}

impl FuseReader<XlsxOpener> {
    pub fn new(options: QueryOptions) -> Self {
        Self::with_opener(XlsxOpener, options)
    }
}

impl<O: SourceOpener> FuseReader<O> {
    /// Reads workbooks through `opener` instead of from `.xlsx` files.
    pub fn with_opener(opener: O, options: QueryOptions) -> Self {
        Self { opener, options }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Finds the row whose `Item ID` cell equals `item_id`.
    ///
    /// Files are searched concurrently; the first confirmed hit cancels every
    /// other scan, so with duplicates across files any one of them may be
    /// returned.
    pub fn locate_item<P: AsRef<Path>>(
        &self,
        item_id: &str,
        files: &[P],
    ) -> Result<ItemLocation, Error> {
        if item_id.is_empty() {
            return Err(Error::Validation("item id is empty".to_owned()));
        }
        require_files(files)?;

        let locations = [FieldLocation::new(
            HEADER_ITEM_ID,
            HeaderSpec::single(HEADER_ITEM_ID),
            FieldMatcher::exact(item_id),
        )];
        let started = Instant::now();
        log::info!("locating item `{item_id}` in {} file(s)", files.len());

        let found = OnceLock::new();
        self.run(files, &locations, &[], Target::Locate { found: &found })?;

        match found.into_inner() {
            Some(location) => {
                log::info!(
                    "found item `{item_id}` in {} at row {} after {:?}",
                    location.file.display(),
                    location.row(),
                    started.elapsed()
                );
                Ok(location)
            }
            None => Err(Error::NotFound {
                item_id: item_id.to_owned(),
            }),
        }
    }

    /// Streams the fields picked by `retrievals` from every item matching all
    /// of `locations` into `output`.
    ///
    /// Every file is scanned to the end. Fields of one item arrive in
    /// declaration order and items of one file in row order; fields from
    /// different files interleave arbitrarily. Fields already delivered when
    /// an error is returned are valid.
    pub fn retrieve_fields<P: AsRef<Path>>(
        &self,
        files: &[P],
        locations: &[FieldLocation],
        retrievals: &[FieldRetrieval],
        output: Option<&Sender<ResultField>>,
    ) -> Result<(), Error> {
        require_files(files)?;
        if locations.is_empty() {
            return Err(Error::Validation("no location specs were given".to_owned()));
        }
        if retrievals.is_empty() {
            return Err(Error::Validation("no retrieval specs were given".to_owned()));
        }
        let Some(output) = output else {
            return Err(Error::Validation("no output queue was given".to_owned()));
        };

        let started = Instant::now();
        log::info!(
            "retrieving {} field spec(s) from {} file(s)",
            retrievals.len(),
            files.len()
        );
        let target = Target::Retrieve {
            specs: retrievals,
            output,
        };
        self.run(files, locations, retrievals, target)?;
        log::info!("retrieval finished after {:?}", started.elapsed());
        Ok(())
    }

    fn run<P: AsRef<Path>>(
        &self,
        files: &[P],
        locations: &[FieldLocation],
        retrievals: &[FieldRetrieval],
        target: Target<'_>,
    ) -> Result<(), Error> {
        let cache = SourceCache::build(files, &self.opener, &self.options)?;

        let plans = cache
            .sources()
            .iter()
            .map(|source| {
                FilePlan::resolve(
                    &source.path,
                    &source.headers.index,
                    &source.headers.roots,
                    locations,
                    retrievals,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let jobs: Vec<(&CachedSource, &FilePlan)> = cache.sources().iter().zip(&plans).collect();
        let cancel = CancelScope::new();
        let scanned = pool::try_map(&jobs, self.options.worker_count(), &cancel, |(source, plan)| {
            self.run_file(source, plan, locations, target, &cancel)
        })?;
        log::debug!(
            "{} of {} file(s) scanned, {} item(s) confirmed",
            scanned.len(),
            jobs.len(),
            scanned.iter().sum::<usize>()
        );

        cache.close();
        Ok(())
    }

    /// Runs one file's reader on its own thread and its parser on this one.
    fn run_file(
        &self,
        source: &CachedSource,
        plan: &FilePlan,
        locations: &[FieldLocation],
        target: Target<'_>,
        cancel: &CancelScope,
    ) -> Result<usize, Error> {
        let Some(prefilter) = locations.first() else {
            return Err(Error::Validation("no location specs were given".to_owned()));
        };
        log::debug!("scanning {}", source.path.display());

        let segmenter = Segmenter {
            file: Arc::from(source.path.as_path()),
            header_row: source.header_row,
            record_type_column: plan.record_type,
            prefilter_column: plan.prefilter,
            prefilter: &prefilter.field,
            blank_row_limit: self.options.blank_row_limit,
            send_timeout: self.options.item_send_timeout,
            cancel,
        };
        let parser = Parser {
            file: &source.path,
            index: &source.headers.index,
            plan,
            locations,
            target,
            receive_timeout: self.options.item_receive_timeout,
            send_timeout: self.options.result_send_timeout,
            cancel,
        };
        let sheet = self.options.sheet.as_str();

        let (item_tx, item_rx) = crossbeam_channel::bounded(ITEM_QUEUE_CAPACITY);
        let (read, parsed) = thread::scope(|scope| {
            let reader = scope.spawn(move || -> Result<ScanEnd, Error> {
                let mut handle = source.handle();
                let rows = handle
                    .rows(sheet)
                    .map_err(|err| Error::from_source(&source.path, err))?;
                segmenter.run(rows, &item_tx)
            });

            let parsed = parser.run(&item_rx);
            if parsed.is_err() {
                cancel.cancel();
            }
            // Unblocks a reader still trying to hand over items.
            drop(item_rx);
            match reader.join() {
                Ok(read) => (read, parsed),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        });

        let confirmed = parsed?;
        if read? == ScanEnd::Stopped {
            log::debug!("stopped scanning {} early", source.path.display());
        }
        Ok(confirmed)
    }
}

fn require_files<P: AsRef<Path>>(files: &[P]) -> Result<(), Error> {
    if files.is_empty() {
        return Err(Error::Validation("no files were given".to_owned()));
    }
    Ok(())
}

/// [`FuseReader::locate_item`] over `.xlsx` files.
pub fn locate_item<P: AsRef<Path>>(
    item_id: &str,
    files: &[P],
    options: &QueryOptions,
) -> Result<ItemLocation, Error> {
    FuseReader::new(options.clone()).locate_item(item_id, files)
}

/// [`FuseReader::retrieve_fields`] over `.xlsx` files.
pub fn retrieve_fields<P: AsRef<Path>>(
    files: &[P],
    locations: &[FieldLocation],
    retrievals: &[FieldRetrieval],
    output: Option<&Sender<ResultField>>,
    options: &QueryOptions,
) -> Result<(), Error> {
    FuseReader::new(options.clone()).retrieve_fields(files, locations, retrievals, output)
}
