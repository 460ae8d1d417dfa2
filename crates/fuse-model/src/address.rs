use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of rows in an `.xlsx` worksheet.
pub const EXCEL_MAX_ROWS: u32 = 1_048_576;
/// Number of columns in an `.xlsx` worksheet (`A`..=`XFD`).
pub const EXCEL_MAX_COLS: u32 = 16_384;

/// Location of a single worksheet cell.
///
/// Both axes are **0-indexed** internally; they only become 1-based when
/// rendered as an A1 reference (`col = 0, row = 5` is `A6`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    #[inline]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Builds a reference from the `usize` positions used while scanning rows.
    ///
    /// Returns `None` when either position lies outside worksheet bounds.
    pub fn from_position(col: usize, row: usize) -> Option<Self> {
        let col = u32::try_from(col).ok().filter(|c| *c < EXCEL_MAX_COLS)?;
        let row = u32::try_from(row).ok().filter(|r| *r < EXCEL_MAX_ROWS)?;
        Some(Self { row, col })
    }

    /// Render as A1 notation (e.g. `A6`, `AY9`).
    pub fn to_a1(self) -> String {
        format!("{}{}", column_letters(self.col), self.row + 1)
    }

    /// Parse an A1 reference. `$` absolute markers are accepted and ignored.
    pub fn from_a1(a1: &str) -> Result<Self, A1ParseError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(A1ParseError::Empty);
        }

        let unanchored = s.strip_prefix('$').unwrap_or(s);
        let letters_end = unanchored
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(unanchored.len());
        let (letters, rest) = unanchored.split_at(letters_end);
        if letters.is_empty() {
            return Err(A1ParseError::MissingColumn);
        }

        let digits = rest.strip_prefix('$').unwrap_or(rest);
        if digits.is_empty() {
            return Err(A1ParseError::MissingRow);
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(A1ParseError::TrailingCharacters);
        }

        let col = column_index(letters)?;
        let row: u32 = digits.parse().map_err(|_| A1ParseError::InvalidRow)?;
        if row == 0 || row > EXCEL_MAX_ROWS {
            return Err(A1ParseError::InvalidRow);
        }

        Ok(Self { row: row - 1, col })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum A1ParseError {
    #[error("empty A1 reference")]
    Empty,
    #[error("missing column in A1 reference")]
    MissingColumn,
    #[error("missing row in A1 reference")]
    MissingRow,
    #[error("invalid column in A1 reference")]
    InvalidColumn,
    #[error("invalid row in A1 reference")]
    InvalidRow,
    #[error("trailing characters in A1 reference")]
    TrailingCharacters,
}

fn column_letters(col: u32) -> String {
    // Bijective base-26: `A` is 1, `Z` is 26, `AA` is 27.
    let mut n = col + 1;
    let mut out = Vec::with_capacity(3);
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    out.iter().rev().collect()
}

fn column_index(letters: &str) -> Result<u32, A1ParseError> {
    let mut col: u32 = 0;
    for b in letters.bytes() {
        let digit = u32::from(b.to_ascii_uppercase() - b'A') + 1;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(digit))
            .filter(|c| *c <= EXCEL_MAX_COLS)
            .ok_or(A1ParseError::InvalidColumn)?;
    }
    Ok(col - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_one_based_at_the_boundary() {
        assert_eq!(CellRef::new(5, 0).to_a1(), "A6");
        assert_eq!(CellRef::new(8, 50).to_a1(), "AY9");
        assert_eq!(CellRef::new(0, 25).to_a1(), "Z1");
        assert_eq!(CellRef::new(0, 26).to_a1(), "AA1");
        assert_eq!(CellRef::new(1_048_575, 16_383).to_a1(), "XFD1048576");
    }

    #[test]
    fn parses_absolute_and_lowercase_references() {
        assert_eq!(CellRef::from_a1("$AY$9").unwrap(), CellRef::new(8, 50));
        assert_eq!(CellRef::from_a1("ay9").unwrap(), CellRef::new(8, 50));
    }

    #[test]
    fn rejects_malformed_references() {
        assert_eq!(CellRef::from_a1(""), Err(A1ParseError::Empty));
        assert_eq!(CellRef::from_a1("12"), Err(A1ParseError::MissingColumn));
        assert_eq!(CellRef::from_a1("B"), Err(A1ParseError::MissingRow));
        assert_eq!(CellRef::from_a1("B0"), Err(A1ParseError::InvalidRow));
        assert_eq!(CellRef::from_a1("B2x"), Err(A1ParseError::TrailingCharacters));
        assert_eq!(CellRef::from_a1("XFE1"), Err(A1ParseError::InvalidColumn));
        assert_eq!(CellRef::from_a1("A1048577"), Err(A1ParseError::InvalidRow));
    }

    #[test]
    fn from_position_checks_sheet_bounds() {
        assert_eq!(CellRef::from_position(0, 5), Some(CellRef::new(5, 0)));
        assert_eq!(CellRef::from_position(16_384, 0), None);
        assert_eq!(CellRef::from_position(0, 1_048_576), None);
    }
}
