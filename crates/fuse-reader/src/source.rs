//! Boundary to the workbook reader.
//!
//! The pipeline only needs two things from a workbook: the ability to stream
//! a worksheet's rows top to bottom, as text, and to do so more than once
//! (once to find the header row, once to scan items). [`SheetSource`] captures
//! that; [`XlsxSource`] implements it over calamine's streaming cell reader so
//! a sheet is never materialised in full.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use calamine::{open_workbook, Data, Reader, Xlsx};
use fuse_model::{is_header_row, HEADER_ROW_MAX};

use crate::SourceError;

/// One worksheet row as cell text. Missing trailing cells are simply absent.
pub type Row = Vec<String>;

/// Streaming row iterator. Item `n` is worksheet row `n` (0-based); rows
/// without any cell are yielded as empty rows so numbering never drifts.
pub type Rows<'a> = Box<dyn Iterator<Item = Result<Row, SourceError>> + 'a>;

pub trait SheetSource: Send {
    /// Streams the rows of `sheet` from the first row.
    fn rows(&mut self, sheet: &str) -> Result<Rows<'_>, SourceError>;
}

pub trait SourceOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn SheetSource>, SourceError>;
}

/// Opens `.xlsx` workbooks with calamine.
#[derive(Clone, Copy, Debug, Default)]
pub struct XlsxOpener;

impl SourceOpener for XlsxOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn SheetSource>, SourceError> {
        Ok(Box::new(XlsxSource::open(path)?))
    }
}

pub struct XlsxSource {
    workbook: Xlsx<BufReader<File>>,
}

impl XlsxSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let workbook: Xlsx<_> = open_workbook(path)?;
        Ok(Self { workbook })
    }
}

impl SheetSource for XlsxSource {
    fn rows(&mut self, sheet: &str) -> Result<Rows<'_>, SourceError> {
        if !self.workbook.sheet_names().iter().any(|name| name == sheet) {
            return Err(SourceError::MissingSheet(sheet.to_owned()));
        }

        let mut cells = self.workbook.worksheet_cells_reader(sheet)?;
        let mut rows = RowAssembler::default();
        Ok(Box::new(std::iter::from_fn(move || loop {
            if let Some(row) = rows.ready.pop_front() {
                return Some(Ok(row));
            }
            if rows.finished {
                return None;
            }
            match cells.next_cell() {
                Ok(Some(cell)) => {
                    let (row, col) = cell.get_position();
                    let text = cell_text(Data::from(cell.get_value().clone()));
                    rows.push(row as usize, col as usize, text);
                }
                Ok(None) => rows.finish(),
                Err(err) => {
                    rows.finished = true;
                    return Some(Err(err.into()));
                }
            }
        })))
    }
}

/// Regroups a row-major cell stream into rows, filling skipped rows.
#[derive(Debug, Default)]
struct RowAssembler {
    ready: VecDeque<Row>,
    current: Row,
    current_row: Option<usize>,
    next_row: usize,
    finished: bool,
}

impl RowAssembler {
    fn push(&mut self, row: usize, col: usize, text: String) {
        match self.current_row {
            Some(current) if current == row => {}
            Some(_) => {
                self.complete_current();
                self.open(row);
            }
            None => self.open(row),
        }

        if self.current.len() <= col {
            self.current.resize(col + 1, String::new());
        }
        self.current[col] = text;
    }

    fn open(&mut self, row: usize) {
        while self.next_row < row {
            self.ready.push_back(Row::new());
            self.next_row += 1;
        }
        self.current_row = Some(row);
    }

    fn complete_current(&mut self) {
        if let Some(row) = self.current_row.take() {
            self.ready.push_back(std::mem::take(&mut self.current));
            self.next_row = row + 1;
        }
    }

    fn finish(&mut self) {
        self.complete_current();
        self.finished = true;
    }
}

fn cell_text(value: Data) -> String {
    match value {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s,
        Data::Int(v) => v.to_string(),
        Data::Float(v) => v.to_string(),
        Data::Bool(true) => "TRUE".to_owned(),
        Data::Bool(false) => "FALSE".to_owned(),
        Data::DateTime(v) => v.as_f64().to_string(),
        Data::Error(e) => e.to_string(),
    }
}

/// Workbook held entirely in memory, one row vector per sheet.
///
/// Useful for feeding rows decoded elsewhere (or test data) through the same
/// pipeline as `.xlsx` files.
#[derive(Clone, Debug, Default)]
pub struct MemoryWorkbook {
    sheets: HashMap<String, Arc<Vec<Row>>>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        self.sheets.insert(name.into(), Arc::new(rows));
        self
    }
}

impl SheetSource for MemoryWorkbook {
    fn rows(&mut self, sheet: &str) -> Result<Rows<'_>, SourceError> {
        let rows = self
            .sheets
            .get(sheet)
            .ok_or_else(|| SourceError::MissingSheet(sheet.to_owned()))?;
        Ok(Box::new(rows.iter().cloned().map(Ok)))
    }
}

/// Serves [`MemoryWorkbook`]s by path.
#[derive(Clone, Debug, Default)]
pub struct MemoryOpener {
    workbooks: HashMap<PathBuf, MemoryWorkbook>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workbook(mut self, path: impl Into<PathBuf>, workbook: MemoryWorkbook) -> Self {
        self.workbooks.insert(path.into(), workbook);
        self
    }
}

impl SourceOpener for MemoryOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn SheetSource>, SourceError> {
        match self.workbooks.get(path) {
            Some(workbook) => Ok(Box::new(workbook.clone())),
            None => Err(SourceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no in-memory workbook registered for {}", path.display()),
            ))),
        }
    }
}

/// Finds the header row within the first [`HEADER_ROW_MAX`] rows of `sheet`.
///
/// Returns the 0-based row number and the header labels.
pub(crate) fn locate_header_row(
    source: &mut dyn SheetSource,
    sheet: &str,
) -> Result<(usize, Row), SourceError> {
    for (number, row) in source.rows(sheet)?.take(HEADER_ROW_MAX).enumerate() {
        let row = row?;
        if is_header_row(&row) {
            return Ok((number, row));
        }
    }
    Err(SourceError::HeaderRowNotFound {
        max_rows: HEADER_ROW_MAX,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn assembler_fills_gaps_and_columns() {
        let mut rows = RowAssembler::default();
        rows.push(0, 0, "a".into());
        rows.push(0, 2, "c".into());
        rows.push(3, 1, "x".into());
        rows.finish();

        let out: Vec<Row> = rows.ready.into_iter().collect();
        assert_eq!(
            out,
            vec![
                row(&["a", "", "c"]),
                Row::new(),
                Row::new(),
                row(&["", "x"]),
            ]
        );
    }

    #[test]
    fn assembler_starting_below_the_first_row_pads_the_top() {
        let mut rows = RowAssembler::default();
        rows.push(2, 0, "first".into());
        rows.finish();

        assert_eq!(rows.ready.len(), 3);
        assert_eq!(rows.ready[2], row(&["first"]));
    }

    #[test]
    fn cell_text_formats_scalars() {
        assert_eq!(cell_text(Data::Int(42)), "42");
        assert_eq!(cell_text(Data::Float(3.0)), "3");
        assert_eq!(cell_text(Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(Data::Bool(true)), "TRUE");
        assert_eq!(cell_text(Data::Empty), "");
        assert_eq!(cell_text(Data::String("Soybean".into())), "Soybean");
    }

    #[test]
    fn header_row_is_found_below_a_title_row() {
        let mut header = row(&fuse_model::HEADER_ROW_PREFIX);
        header.push("Width".into());
        let mut workbook = MemoryWorkbook::new().with_sheet(
            "FS_Item",
            vec![row(&["FUSE export"]), Row::new(), header.clone()],
        );

        assert_eq!(locate_header_row(&mut workbook, "FS_Item").unwrap(), (2, header));
    }

    #[test]
    fn header_row_past_the_bound_is_not_found() {
        let mut rows = vec![Row::new(); HEADER_ROW_MAX];
        rows.push(row(&fuse_model::HEADER_ROW_PREFIX));
        let mut workbook = MemoryWorkbook::new().with_sheet("FS_Item", rows);

        assert!(matches!(
            locate_header_row(&mut workbook, "FS_Item"),
            Err(SourceError::HeaderRowNotFound { max_rows: 5 })
        ));
        assert!(matches!(
            locate_header_row(&mut workbook, "Other"),
            Err(SourceError::MissingSheet(_))
        ));
    }
}
