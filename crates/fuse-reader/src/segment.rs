//! Read stage: splits a worksheet's row stream into item records.
//!
//! An item starts at every row whose record type is `ITEM` and runs until the
//! next such row or the end of the data. Only the first location spec is
//! checked here, as a cheap pre-filter; items that pass it are handed to the
//! parse stage, which verifies every location spec.

use std::mem;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use fuse_model::RECORD_TYPE_ITEM;

use crate::channel::{send_within, Sent};
use crate::source::{Row, Rows};
use crate::spec::{FieldMatcher, MatchCounter};
use crate::{CancelScope, Error, Stage};

/// Contiguous rows of one item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ItemRecord {
    pub file: Arc<Path>,
    /// 0-based worksheet row of the item's `ITEM` row.
    pub start_row: usize,
    pub rows: Vec<Row>,
}

/// How a scan ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanEnd {
    /// Every row up to the end of the sheet (or of the data) was read.
    Exhausted,
    /// The query was cancelled or the parser went away.
    Stopped,
}

/// Row storage reused from one item to the next.
///
/// Slots are grown when a longer item shows up and never shrunk; `len` tracks
/// how many belong to the current item.
#[derive(Debug, Default)]
struct ItemBuffer {
    slots: Vec<Row>,
    len: usize,
    start_row: Option<usize>,
}

impl ItemBuffer {
    fn open(&mut self, start_row: usize) {
        self.len = 0;
        self.start_row = Some(start_row);
    }

    fn is_open(&self) -> bool {
        self.start_row.is_some()
    }

    fn push(&mut self, row: Row) {
        match self.slots.get_mut(self.len) {
            Some(slot) => *slot = row,
            None => self.slots.push(row),
        }
        self.len += 1;
    }

    /// Moves the current item's rows out, leaving the buffer closed.
    fn take(&mut self) -> Option<(usize, Vec<Row>)> {
        let start_row = self.start_row.take()?;
        let rows = self.slots[..self.len].iter_mut().map(mem::take).collect();
        self.len = 0;
        Some((start_row, rows))
    }
}

pub(crate) struct Segmenter<'a> {
    pub file: Arc<Path>,
    /// 0-based row of the header; it and everything above it is skipped.
    pub header_row: usize,
    pub record_type_column: usize,
    pub prefilter_column: usize,
    pub prefilter: &'a FieldMatcher,
    pub blank_row_limit: usize,
    pub send_timeout: Duration,
    pub cancel: &'a CancelScope,
}

impl Segmenter<'_> {
    /// Scans `rows`, sending every candidate item to `items`.
    ///
    /// Dropping `items` once this returns is what tells the parser the file is
    /// done.
    pub(crate) fn run(&self, rows: Rows<'_>, items: &Sender<ItemRecord>) -> Result<ScanEnd, Error> {
        let mut buffer = ItemBuffer::default();
        let mut counter = MatchCounter::default();
        let mut blank_run = 0usize;
        let mut forwarded = 0usize;

        for (number, row) in rows.enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(ScanEnd::Stopped);
            }
            let row = row.map_err(|err| Error::from_source(&*self.file, err))?;
            if number <= self.header_row {
                continue;
            }

            let key_value = cell(&row, self.prefilter_column);
            if key_value.is_empty() {
                blank_run += 1;
                if blank_run > self.blank_row_limit {
                    log::debug!(
                        "{}: column {} empty for {} rows, treating row {} as the end of data",
                        self.file.display(),
                        self.prefilter_column + 1,
                        self.blank_row_limit,
                        number + 1
                    );
                    break;
                }
            } else {
                blank_run = 0;
            }

            if cell(&row, self.record_type_column) == RECORD_TYPE_ITEM {
                if self.flush(&mut buffer, &counter, items, &mut forwarded)? == ScanEnd::Stopped {
                    return Ok(ScanEnd::Stopped);
                }
                counter.reset();
                buffer.open(number);
            }

            if buffer.is_open() {
                counter.observe(self.prefilter, key_value);
                buffer.push(row);
            }
        }

        let end = self.flush(&mut buffer, &counter, items, &mut forwarded)?;
        log::debug!("{}: forwarded {forwarded} candidate item(s)", self.file.display());
        Ok(end)
    }

    /// Sends the buffered item if it passed the pre-filter.
    fn flush(
        &self,
        buffer: &mut ItemBuffer,
        counter: &MatchCounter,
        items: &Sender<ItemRecord>,
        forwarded: &mut usize,
    ) -> Result<ScanEnd, Error> {
        let passed = counter.is_satisfied(self.prefilter);
        let Some((start_row, rows)) = buffer.take() else {
            return Ok(ScanEnd::Exhausted);
        };
        if !passed {
            return Ok(ScanEnd::Exhausted);
        }

        let record = ItemRecord {
            file: Arc::clone(&self.file),
            start_row,
            rows,
        };
        match send_within(items, record, self.send_timeout, self.cancel) {
            Ok(Sent::Delivered) => {
                *forwarded += 1;
                Ok(ScanEnd::Exhausted)
            }
            Ok(Sent::Cancelled | Sent::Disconnected) => Ok(ScanEnd::Stopped),
            Err(_) => Err(Error::Timeout {
                file: self.file.to_path_buf(),
                stage: Stage::ItemSend,
                after: self.send_timeout,
            }),
        }
    }
}

pub(crate) fn cell(row: &[String], column: usize) -> &str {
    row.get(column).map_or("", String::as_str)
}
