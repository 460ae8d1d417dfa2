//! Concurrent item lookup and field retrieval over FUSE `FS_Item` workbooks.
//!
//! A query opens every file once (see [`SourceCache`]), resolves every header
//! it needs up front, and then runs one reader/parser pair per file on a
//! bounded worker pool:
//! - the reader streams rows, cuts them into items at `ITEM` rows and forwards
//!   the items that pass the first location spec,
//! - the parser checks every location spec against each forwarded item and
//!   either reports its position ([`locate_item`]) or streams the requested
//!   fields to the caller ([`retrieve_fields`]).
//!
//! The first error anywhere cancels the whole query and is the only one
//! returned.

mod cache;
mod cancel;
mod channel;
mod disk_cache;
mod error;
mod options;
mod parse;
mod pool;
mod query;
mod result;
mod segment;
mod source;
mod spec;

pub use cache::SourceCache;
pub use cancel::CancelScope;
pub use disk_cache::DiskCache;
pub use error::{Error, ErrorKind, SourceError, Stage};
pub use options::{
    CacheStrategy, QueryOptions, DEFAULT_BLANK_ROW_LIMIT, DEFAULT_ITEM_RECEIVE_TIMEOUT,
    DEFAULT_ITEM_SEND_TIMEOUT, DEFAULT_RESULT_SEND_TIMEOUT,
};
pub use query::{locate_item, retrieve_fields, FuseReader};
pub use result::{ItemLocation, ResultField};
pub use source::{
    MemoryOpener, MemoryWorkbook, Row, Rows, SheetSource, SourceOpener, XlsxOpener, XlsxSource,
};
pub use spec::{FieldLocation, FieldMatcher, FieldRetrieval, HeaderSpec, Predicate};

pub use fuse_model::{CellRef, GroupRoot, GroupRoots, HeaderIndex};
