#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fuse_reader::{
    FieldLocation, FieldMatcher, FieldRetrieval, HeaderSpec, MemoryOpener, MemoryWorkbook, Row,
    Rows, SheetSource, SourceError, SourceOpener,
};
use rust_xlsxwriter::Workbook;

pub const SOY_MILK: &str = "00011110603081";
pub const TOFU: &str = "00022220000002";

/// `FS_Item` header row with two allergen groups; starts in column A.
pub fn header() -> Vec<&'static str> {
    vec![
        "RECORD TYPE",
        "OPERATION",
        "IMPORT ITEM?",
        "Information Provider GLN",
        "Information Provider Name",
        "Item Type",
        "Item ID",
        "Product Description",
        "Indicator for New Group",
        "Allergen Type Code",
        "Level Of Containment",
        "Indicator for New Group",
        "Allergen Type Code",
        "Level Of Containment",
        "Net Content",
    ]
}

fn item_row(
    record_type: &'static str,
    item_id: &'static str,
    description: &'static str,
    allergen: &'static str,
    containment: &'static str,
) -> Vec<&'static str> {
    let mut row = vec![""; header().len()];
    row[0] = record_type;
    row[6] = item_id;
    row[7] = description;
    row[9] = allergen;
    row[10] = containment;
    row
}

/// A title row, the header row, then two items:
///
/// | row | item | allergen | containment |
/// |---|---|---|---|
/// | 3 | soy milk (`ITEM`) | | |
/// | 4 | soy milk | `AM -- Milk` | `CONTAINS -- Contains` |
/// | 5 | soy milk | `AY -- Soybean` | `FREE_FROM -- Free from` |
/// | 6 | tofu (`ITEM`) | | |
/// | 7 | tofu | `AY -- Soybean` | `CONTAINS -- Contains` |
pub fn item_rows() -> Vec<Vec<&'static str>> {
    vec![
        vec!["FUSE Item Export"],
        header(),
        item_row("ITEM", SOY_MILK, "Soy Milk 1L", "", ""),
        item_row("", SOY_MILK, "", "AM -- Milk", "CONTAINS -- Contains"),
        item_row("", SOY_MILK, "", "AY -- Soybean", "FREE_FROM -- Free from"),
        item_row("ITEM", TOFU, "Firm Tofu", "", ""),
        item_row("", TOFU, "", "AY -- Soybean", "CONTAINS -- Contains"),
    ]
}

/// Writes `rows` to the `FS_Item` sheet of a new workbook at `path`.
pub fn write_workbook(path: &Path, rows: &[Vec<&str>]) {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("FS_Item").expect("set worksheet name");
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if !value.is_empty() {
                worksheet
                    .write_string(r as u32, c as u16, *value)
                    .expect("write cell");
            }
        }
    }
    workbook.save(path).expect("save workbook");
}

pub fn write_items(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    write_workbook(&path, &item_rows());
    path
}

pub fn to_rows(rows: &[Vec<&str>]) -> Vec<Row> {
    rows.iter()
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect()
}

pub fn memory_items() -> MemoryWorkbook {
    MemoryWorkbook::new().with_sheet("FS_Item", to_rows(&item_rows()))
}

pub fn item_location(item_id: &str) -> FieldLocation {
    FieldLocation::new(
        "Location spec 01",
        HeaderSpec::single("Item ID"),
        FieldMatcher::exact(item_id),
    )
}

pub fn soybean_containment(offsets: &[isize]) -> FieldRetrieval {
    FieldRetrieval::new(
        "Retrieve spec 01",
        HeaderSpec::new("Allergen Type Code", ["Level Of Containment"], 1),
        FieldMatcher::contains("Soybean"),
        offsets.to_vec(),
    )
}

/// Counts every open it forwards to the wrapped opener.
pub struct CountingOpener<O> {
    pub inner: O,
    pub opens: Arc<AtomicUsize>,
}

impl<O> CountingOpener<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl<O: SourceOpener> SourceOpener for CountingOpener<O> {
    fn open(&self, path: &Path) -> Result<Box<dyn SheetSource>, SourceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open(path)
    }
}

/// Serves the same in-memory workbook for every path.
pub struct SameWorkbook(pub MemoryWorkbook);

impl SourceOpener for SameWorkbook {
    fn open(&self, _path: &Path) -> Result<Box<dyn SheetSource>, SourceError> {
        Ok(Box::new(self.0.clone()))
    }
}

/// Sheet source that pauses before every row past the header.
#[derive(Clone)]
pub struct SlowSource {
    pub rows: Vec<Row>,
    pub delay: Duration,
}

impl SheetSource for SlowSource {
    fn rows(&mut self, _sheet: &str) -> Result<Rows<'_>, SourceError> {
        let delay = self.delay;
        Ok(Box::new(self.rows.iter().cloned().enumerate().map(
            move |(number, row)| {
                if number > 1 {
                    thread::sleep(delay);
                }
                Ok(row)
            },
        )))
    }
}

pub struct SlowOpener(pub SlowSource);

impl SourceOpener for SlowOpener {
    fn open(&self, _path: &Path) -> Result<Box<dyn SheetSource>, SourceError> {
        Ok(Box::new(self.0.clone()))
    }
}

pub fn memory_opener(names: &[&str]) -> MemoryOpener {
    names.iter().fold(MemoryOpener::new(), |opener, name| {
        opener.with_workbook(*name, memory_items())
    })
}
