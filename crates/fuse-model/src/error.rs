use thiserror::Error;

use crate::index::GroupRoot;

/// Failure to map a header spec onto a physical column.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("header `{label}` does not appear in the header row")]
    LabelAbsent { label: String },
    #[error("no headers were given to resolve a group from")]
    EmptyGroup,
    #[error(
        "headers {headers:?} share {available} common group(s); occurrence {requested} was requested"
    )]
    NoCommonGroup {
        headers: Vec<String>,
        requested: usize,
        available: usize,
    },
    #[error("header `{key}` has no occurrence at or after group root {root}")]
    KeyNotInGroup { key: String, root: GroupRoot },
    #[error("offset {offset} from column {column} falls outside the {column_count} header columns")]
    OffsetOutOfBounds {
        column: usize,
        offset: isize,
        column_count: usize,
    },
}

/// Serialised header layout that breaks the invariants of a built one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("header positions do not match the header labels")]
    PositionsMismatch,
    #[error("group roots must start with the leading block")]
    MissingLeadingRoot,
    #[error("group roots must be strictly ascending")]
    UnorderedRoots,
}
