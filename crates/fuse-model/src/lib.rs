//! `fuse-model` holds the pure, I/O-free pieces of the FUSE reader:
//! - A1 cell addressing for reporting where a value came from
//! - the header vocabulary of an `FS_Item` worksheet
//! - the header resolution engine, which maps a (possibly repeated) header
//!   label onto one physical column by anchoring it to a field-group block

mod address;
mod error;
pub mod header;
mod index;

pub use address::{A1ParseError, CellRef, EXCEL_MAX_COLS, EXCEL_MAX_ROWS};
pub use error::{LayoutError, ResolveError};
pub use header::{
    is_header_row, HEADER_ITEM_ID, HEADER_NEW_GROUP_INDICATOR, HEADER_RECORD_TYPE,
    HEADER_ROW_MAX, HEADER_ROW_PREFIX, RECORD_TYPE_ITEM, WORKSHEET_FS_ITEM,
};
pub use index::{
    build_header_index, resolve_column, resolve_group_root, GroupRoot, GroupRoots, HeaderIndex,
};
