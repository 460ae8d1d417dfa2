//! Header resolution over repeated field-group blocks.
//!
//! FUSE exports repeat whole blocks of identically labelled columns (one block
//! per allergen, per nutrient, per packaging level, ...). A label alone is
//! therefore ambiguous. Every block starts with a
//! [`HEADER_NEW_GROUP_INDICATOR`] column, and a label is pinned to a physical
//! column by first choosing the block (its *group root*) and then taking the
//! first occurrence of the label at or after that root.
//!
//! Both [`HeaderIndex`] and [`GroupRoots`] are built once per header row and
//! never mutated afterwards, so floor/ceiling lookups are plain binary searches
//! over sorted vectors.

use core::fmt;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::header::HEADER_NEW_GROUP_INDICATOR;
use crate::{LayoutError, ResolveError};

/// Start of a field-group block.
///
/// `Leading` is the implicit block covering every column before the first
/// group indicator; it orders before every explicit root.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GroupRoot {
    Leading,
    Column(usize),
}

impl GroupRoot {
    /// Explicit column of the root, `None` for the leading block.
    pub const fn column(self) -> Option<usize> {
        match self {
            GroupRoot::Leading => None,
            GroupRoot::Column(col) => Some(col),
        }
    }

    /// First column that belongs to the block.
    const fn first_column(self) -> usize {
        match self {
            GroupRoot::Leading => 0,
            GroupRoot::Column(col) => col,
        }
    }
}

impl fmt::Display for GroupRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupRoot::Leading => f.write_str("-1"),
            GroupRoot::Column(col) => write!(f, "{col}"),
        }
    }
}

/// Label → ascending column positions for one header row.
///
/// Repeated labels keep one entry per occurrence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawHeaderIndex")]
pub struct HeaderIndex {
    labels: Vec<String>,
    positions: BTreeMap<String, Vec<usize>>,
}

#[derive(Deserialize)]
struct RawHeaderIndex {
    labels: Vec<String>,
    positions: BTreeMap<String, Vec<usize>>,
}

impl TryFrom<RawHeaderIndex> for HeaderIndex {
    type Error = LayoutError;

    fn try_from(raw: RawHeaderIndex) -> Result<Self, Self::Error> {
        let (index, _) = build_header_index(&raw.labels);
        if index.positions != raw.positions {
            return Err(LayoutError::PositionsMismatch);
        }
        Ok(index)
    }
}

impl HeaderIndex {
    /// Every column at which `label` occurs, ascending. Empty when absent.
    pub fn positions(&self, label: &str) -> &[usize] {
        self.positions.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, label: &str) -> bool {
        self.positions.contains_key(label)
    }

    /// Label of the header cell at `column`.
    pub fn label(&self, column: usize) -> Option<&str> {
        self.labels.get(column).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Width of the header row.
    pub fn column_count(&self) -> usize {
        self.labels.len()
    }

    /// Applies a signed retrieval offset to `column`, checking the result
    /// against the header row width.
    pub fn offset_column(&self, column: usize, offset: isize) -> Result<usize, ResolveError> {
        column
            .checked_add_signed(offset)
            .filter(|target| *target < self.column_count())
            .ok_or(ResolveError::OffsetOutOfBounds {
                column,
                offset,
                column_count: self.column_count(),
            })
    }

    fn occurrences(&self, label: &str) -> Result<&[usize], ResolveError> {
        match self.positions.get(label) {
            Some(found) => Ok(found.as_slice()),
            None => Err(ResolveError::LabelAbsent {
                label: label.to_owned(),
            }),
        }
    }
}

/// Ascending group roots of one header row, always starting with
/// [`GroupRoot::Leading`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGroupRoots")]
pub struct GroupRoots {
    roots: Vec<GroupRoot>,
}

#[derive(Deserialize)]
struct RawGroupRoots {
    roots: Vec<GroupRoot>,
}

impl TryFrom<RawGroupRoots> for GroupRoots {
    type Error = LayoutError;

    fn try_from(raw: RawGroupRoots) -> Result<Self, Self::Error> {
        if raw.roots.first() != Some(&GroupRoot::Leading) {
            return Err(LayoutError::MissingLeadingRoot);
        }
        if raw.roots.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(LayoutError::UnorderedRoots);
        }
        Ok(Self { roots: raw.roots })
    }
}

impl Default for GroupRoots {
    fn default() -> Self {
        Self {
            roots: vec![GroupRoot::Leading],
        }
    }
}

impl GroupRoots {
    /// Greatest root at or before `position`.
    pub fn floor(&self, position: usize) -> GroupRoot {
        let after = self
            .roots
            .partition_point(|root| *root <= GroupRoot::Column(position));
        // `Leading` sorts below every column, so `after` is at least 1.
        self.roots[after - 1]
    }

    pub fn as_slice(&self) -> &[GroupRoot] {
        &self.roots
    }

    /// Number of explicit group blocks.
    pub fn explicit_count(&self) -> usize {
        self.roots.len() - 1
    }
}

/// Indexes a header row: every (label, column) pair, and a group root at
/// every [`HEADER_NEW_GROUP_INDICATOR`] column.
pub fn build_header_index<S: AsRef<str>>(row: &[S]) -> (HeaderIndex, GroupRoots) {
    let mut index = HeaderIndex {
        labels: Vec::with_capacity(row.len()),
        positions: BTreeMap::new(),
    };
    let mut roots = GroupRoots::default();

    for (col, label) in row.iter().enumerate() {
        let label = label.as_ref();
        if label == HEADER_NEW_GROUP_INDICATOR {
            roots.roots.push(GroupRoot::Column(col));
        }
        index.labels.push(label.to_owned());
        index.positions.entry(label.to_owned()).or_default().push(col);
    }

    (index, roots)
}

/// Picks the `on_match`-th (1-based, `0` behaves as `1`) group block that
/// contains at least one occurrence of every label in `headers`.
pub fn resolve_group_root<S: AsRef<str>>(
    index: &HeaderIndex,
    roots: &GroupRoots,
    headers: &[S],
    on_match: usize,
) -> Result<GroupRoot, ResolveError> {
    let (first, rest) = headers.split_first().ok_or(ResolveError::EmptyGroup)?;

    let mut common = roots_containing(index, roots, first.as_ref())?;
    for label in rest {
        let theirs = roots_containing(index, roots, label.as_ref())?;
        common.retain(|root| theirs.binary_search(root).is_ok());
    }

    let wanted = on_match.max(1);
    common
        .get(wanted - 1)
        .copied()
        .ok_or_else(|| ResolveError::NoCommonGroup {
            headers: headers.iter().map(|h| h.as_ref().to_owned()).collect(),
            requested: wanted,
            available: common.len(),
        })
}

/// Resolves `key` to a physical column inside the group block selected by
/// `others_in_group + [key]` and `on_match`.
pub fn resolve_column<S: AsRef<str>>(
    index: &HeaderIndex,
    roots: &GroupRoots,
    key: &str,
    others_in_group: &[S],
    on_match: usize,
) -> Result<usize, ResolveError> {
    let group: Vec<&str> = others_in_group
        .iter()
        .map(AsRef::as_ref)
        .chain(std::iter::once(key))
        .collect();
    let root = resolve_group_root(index, roots, group.as_slice(), on_match)?;

    let occurrences = index.occurrences(key)?;
    let start = root.first_column();
    let at = occurrences.partition_point(|col| *col < start);
    occurrences
        .get(at)
        .copied()
        .ok_or_else(|| ResolveError::KeyNotInGroup {
            key: key.to_owned(),
            root,
        })
}

/// Distinct roots (ascending) that `label`'s occurrences fall under.
fn roots_containing(
    index: &HeaderIndex,
    roots: &GroupRoots,
    label: &str,
) -> Result<Vec<GroupRoot>, ResolveError> {
    let mut out: Vec<GroupRoot> = index
        .occurrences(label)?
        .iter()
        .map(|col| roots.floor(*col))
        .collect();
    out.dedup();
    Ok(out)
}
