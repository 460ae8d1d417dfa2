//! Header vocabulary of the `FS_Item` worksheet.

/// Worksheet holding one row block per item.
pub const WORKSHEET_FS_ITEM: &str = "FS_Item";

pub const HEADER_RECORD_TYPE: &str = "RECORD TYPE";
pub const HEADER_OPERATION: &str = "OPERATION";
pub const HEADER_IMPORT_ITEM: &str = "IMPORT ITEM?";
pub const HEADER_INFORMATION_PROVIDER_GLN: &str = "Information Provider GLN";
pub const HEADER_INFORMATION_PROVIDER_NAME: &str = "Information Provider Name";
pub const HEADER_ITEM_TYPE: &str = "Item Type";
pub const HEADER_ITEM_ID: &str = "Item ID";

/// Label that opens every repeated field-group block.
pub const HEADER_NEW_GROUP_INDICATOR: &str = "Indicator for New Group";

/// Value of the record-type column on the first row of every item.
pub const RECORD_TYPE_ITEM: &str = "ITEM";

/// The header row must appear within this many leading rows of the sheet.
pub const HEADER_ROW_MAX: usize = 5;

/// Labels a header row starts with, in order.
pub const HEADER_ROW_PREFIX: [&str; 7] = [
    HEADER_RECORD_TYPE,
    HEADER_OPERATION,
    HEADER_IMPORT_ITEM,
    HEADER_INFORMATION_PROVIDER_GLN,
    HEADER_INFORMATION_PROVIDER_NAME,
    HEADER_ITEM_TYPE,
    HEADER_ITEM_ID,
];

/// Returns true if `row` begins with exactly [`HEADER_ROW_PREFIX`].
pub fn is_header_row<S: AsRef<str>>(row: &[S]) -> bool {
    row.len() >= HEADER_ROW_PREFIX.len()
        && HEADER_ROW_PREFIX
            .iter()
            .zip(row)
            .all(|(expected, label)| label.as_ref() == *expected)
}
