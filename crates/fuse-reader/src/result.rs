use std::path::PathBuf;

use fuse_model::CellRef;
use serde::Serialize;

/// One value pulled out of a workbook by a [`FieldRetrieval`](crate::FieldRetrieval).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResultField {
    /// Id of the retrieval spec that produced the field.
    pub spec_id: String,
    /// Item the field belongs to.
    pub item_id: String,
    /// Header label of the field's column.
    pub header: String,
    pub value: String,
    /// Workbook the field was read from.
    pub file: PathBuf,
    pub cell: CellRef,
}

impl ResultField {
    /// Cell address in A1 notation.
    pub fn address(&self) -> String {
        self.cell.to_a1()
    }
}

/// Where [`locate_item`](crate::locate_item) found an item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemLocation {
    pub file: PathBuf,
    /// Cell under the `Item ID` header holding the id.
    pub cell: CellRef,
}

impl ItemLocation {
    /// 1-based worksheet row.
    pub fn row(&self) -> u32 {
        self.cell.row + 1
    }
}
