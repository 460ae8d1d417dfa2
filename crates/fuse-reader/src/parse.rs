//! Parse stage: verifies candidate items and pulls fields out of them.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use fuse_model::{CellRef, GroupRoots, HeaderIndex, HEADER_ITEM_ID, HEADER_RECORD_TYPE};

use crate::channel::{recv_within, send_within, Received, Sent};
use crate::segment::{cell, ItemRecord};
use crate::spec::{HeaderSpec, MatchCounter};
use crate::{
    CancelScope, Error, FieldLocation, FieldRetrieval, ItemLocation, ResultField, SourceError,
    Stage,
};

/// Columns one retrieval spec reads in a given file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RetrievalPlan {
    /// Column the spec's predicate is matched under.
    pub key: usize,
    /// `key + offset` for each declared offset, in declaration order.
    pub columns: Vec<usize>,
}

/// Every header of a query resolved against one file's header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FilePlan {
    pub record_type: usize,
    pub item_id: usize,
    /// Key column of the first location spec, checked while segmenting.
    pub prefilter: usize,
    pub locations: Vec<usize>,
    pub retrievals: Vec<RetrievalPlan>,
}

impl FilePlan {
    /// Resolves every spec and bounds-checks every retrieval offset, so a
    /// plan that resolves can be executed without further lookups.
    pub(crate) fn resolve(
        file: &Path,
        index: &HeaderIndex,
        roots: &GroupRoots,
        locations: &[FieldLocation],
        retrievals: &[FieldRetrieval],
    ) -> Result<Self, Error> {
        let fixed = |label: &str| {
            HeaderSpec::single(label)
                .resolve(index, roots)
                .map_err(|err| Error::resolution(file, label, err))
        };
        let record_type = fixed(HEADER_RECORD_TYPE)?;
        let item_id = fixed(HEADER_ITEM_ID)?;

        let locations = locations
            .iter()
            .map(|spec| {
                spec.header
                    .resolve(index, roots)
                    .map_err(|err| Error::resolution(file, &spec.id, err))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let Some(&prefilter) = locations.first() else {
            return Err(Error::Validation("no location specs were given".to_owned()));
        };

        let retrievals = retrievals
            .iter()
            .map(|spec| -> Result<RetrievalPlan, Error> {
                let key = spec
                    .header
                    .resolve(index, roots)
                    .map_err(|err| Error::resolution(file, &spec.id, err))?;
                let columns = spec
                    .offsets
                    .iter()
                    .map(|&offset| {
                        index
                            .offset_column(key, offset)
                            .map_err(|err| Error::resolution(file, &spec.id, err))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RetrievalPlan { key, columns })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            record_type,
            item_id,
            prefilter,
            locations,
            retrievals,
        })
    }
}

/// What a parser does with the items it confirms.
#[derive(Clone, Copy)]
pub(crate) enum Target<'a> {
    /// Emit fields for every confirmed item.
    Retrieve {
        specs: &'a [FieldRetrieval],
        output: &'a Sender<ResultField>,
    },
    /// Record the first confirmed item and cancel the query.
    Locate { found: &'a OnceLock<ItemLocation> },
}

pub(crate) struct Parser<'a> {
    pub file: &'a Path,
    pub index: &'a HeaderIndex,
    pub plan: &'a FilePlan,
    pub locations: &'a [FieldLocation],
    pub target: Target<'a>,
    pub receive_timeout: Duration,
    pub send_timeout: Duration,
    pub cancel: &'a CancelScope,
}

impl Parser<'_> {
    /// Consumes items until the reader hangs up or the query is cancelled.
    /// Returns how many items were confirmed.
    pub(crate) fn run(&self, items: &Receiver<ItemRecord>) -> Result<usize, Error> {
        let mut counters = vec![MatchCounter::default(); self.locations.len()];
        let mut confirmed = 0;

        loop {
            let item = match recv_within(items, self.receive_timeout, self.cancel) {
                Ok(Received::Value(item)) => item,
                Ok(Received::Cancelled | Received::Disconnected) => return Ok(confirmed),
                Err(_) => {
                    return Err(Error::Timeout {
                        file: self.file.to_path_buf(),
                        stage: Stage::ItemReceive,
                        after: self.receive_timeout,
                    })
                }
            };

            let Some(row) = self.verify(&item, &mut counters) else {
                continue;
            };
            confirmed += 1;
            log::debug!(
                "{}: item at row {} confirmed",
                self.file.display(),
                item.start_row + 1
            );

            match &self.target {
                Target::Locate { found } => {
                    self.record_location(found, row)?;
                    return Ok(confirmed);
                }
                Target::Retrieve { specs, output } => {
                    if !self.retrieve(&item, specs, output)? {
                        return Ok(confirmed);
                    }
                }
            }
        }
    }

    /// Checks every location spec against `item`. Returns the worksheet row
    /// on which the last outstanding spec reached its threshold.
    fn verify(&self, item: &ItemRecord, counters: &mut [MatchCounter]) -> Option<usize> {
        counters.iter_mut().for_each(MatchCounter::reset);
        let mut pending = counters.len();

        for (offset, row) in item.rows.iter().enumerate() {
            let specs = self.locations.iter().zip(&self.plan.locations);
            for ((spec, &column), counter) in specs.zip(counters.iter_mut()) {
                if counter.observe(&spec.field, cell(row, column)) {
                    pending -= 1;
                    if pending == 0 {
                        return Some(item.start_row + offset);
                    }
                }
            }
        }
        None
    }

    fn record_location(&self, found: &OnceLock<ItemLocation>, row: usize) -> Result<(), Error> {
        let location = ItemLocation {
            file: self.file.to_path_buf(),
            cell: self.cell_ref(self.plan.item_id, row)?,
        };
        if found.set(location).is_ok() {
            self.cancel.cancel();
        }
        Ok(())
    }

    fn cell_ref(&self, column: usize, row: usize) -> Result<CellRef, Error> {
        CellRef::from_position(column, row).ok_or_else(|| {
            Error::from_source(self.file, SourceError::CellOutOfBounds { column, row })
        })
    }

    /// Emits the fields of a confirmed item. Returns `false` once the query
    /// has been cancelled.
    fn retrieve(
        &self,
        item: &ItemRecord,
        specs: &[FieldRetrieval],
        output: &Sender<ResultField>,
    ) -> Result<bool, Error> {
        let item_id = item
            .rows
            .iter()
            .map(|row| cell(row, self.plan.item_id))
            .find(|value| !value.is_empty())
            .unwrap_or_default();

        for (spec, plan) in specs.iter().zip(&self.plan.retrievals) {
            let mut counter = MatchCounter::default();
            let Some((offset, row)) = item
                .rows
                .iter()
                .enumerate()
                .find(|(_, row)| counter.observe(&spec.field, cell(row, plan.key)))
            else {
                continue;
            };
            let row_number = item.start_row + offset;

            for &column in &plan.columns {
                let field = ResultField {
                    spec_id: spec.id.clone(),
                    item_id: item_id.to_owned(),
                    header: self.index.label(column).unwrap_or_default().to_owned(),
                    value: cell(row, column).to_owned(),
                    file: item.file.to_path_buf(),
                    cell: self.cell_ref(column, row_number)?,
                };
                match send_within(output, field, self.send_timeout, self.cancel) {
                    Ok(Sent::Delivered) => {}
                    Ok(Sent::Cancelled) => return Ok(false),
                    Ok(Sent::Disconnected) => {
                        return Err(Error::Validation(
                            "output queue closed by its receiver".to_owned(),
                        ))
                    }
                    Err(_) => {
                        return Err(Error::Timeout {
                            file: self.file.to_path_buf(),
                            stage: Stage::ResultSend,
                            after: self.send_timeout,
                        })
                    }
                }
            }
        }
        Ok(true)
    }
}
