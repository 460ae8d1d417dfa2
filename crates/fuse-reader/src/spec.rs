//! Caller-supplied descriptions of which items to pick and which fields to pull.

use std::fmt;
use std::sync::Arc;

use fuse_model::{resolve_column, GroupRoots, HeaderIndex, ResolveError};

/// Predicate applied to a cell value under a resolved header.
pub type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Identifies one physical column by header label and group membership.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderSpec {
    /// Header directly under which values are matched.
    pub key: String,
    /// Other headers of the same field group, used to tell repeated blocks apart.
    pub others_in_group: Vec<String>,
    /// Which common group to use when several contain the headers (1-based;
    /// `0` and `1` both select the first).
    pub on_match: usize,
}

impl HeaderSpec {
    pub fn new<I, S>(key: impl Into<String>, others_in_group: I, on_match: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            others_in_group: others_in_group.into_iter().map(Into::into).collect(),
            on_match,
        }
    }

    /// A header that is not part of any repeated group.
    pub fn single(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            others_in_group: Vec::new(),
            on_match: 1,
        }
    }

    pub(crate) fn resolve(
        &self,
        index: &HeaderIndex,
        roots: &GroupRoots,
    ) -> Result<usize, ResolveError> {
        resolve_column(
            index,
            roots,
            &self.key,
            self.others_in_group.as_slice(),
            self.on_match,
        )
    }
}

/// Value predicate plus how many times it has to hold before the row counts.
#[derive(Clone)]
pub struct FieldMatcher {
    predicate: Predicate,
    /// Required number of matching rows (`0` and `1` both mean the first match).
    pub on_match: usize,
}

impl FieldMatcher {
    pub fn new(predicate: impl Fn(&str) -> bool + Send + Sync + 'static, on_match: usize) -> Self {
        Self {
            predicate: Arc::new(predicate),
            on_match,
        }
    }

    /// Matches cells equal to `expected`, first occurrence.
    pub fn exact(expected: impl Into<String>) -> Self {
        let expected = expected.into();
        Self::new(move |value| value == expected, 1)
    }

    /// Matches cells containing `needle`, first occurrence.
    pub fn contains(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self::new(move |value| value.contains(needle.as_str()), 1)
    }

    pub fn with_on_match(mut self, on_match: usize) -> Self {
        self.on_match = on_match;
        self
    }

    pub fn matches(&self, value: &str) -> bool {
        (self.predicate)(value)
    }

    pub(crate) fn required(&self) -> usize {
        self.on_match.max(1)
    }
}

impl fmt::Debug for FieldMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMatcher")
            .field("on_match", &self.on_match)
            .finish_non_exhaustive()
    }
}

/// A condition an item must satisfy to be considered at all.
#[derive(Clone, Debug)]
pub struct FieldLocation {
    pub id: String,
    pub header: HeaderSpec,
    pub field: FieldMatcher,
}

impl FieldLocation {
    pub fn new(id: impl Into<String>, header: HeaderSpec, field: FieldMatcher) -> Self {
        Self {
            id: id.into(),
            header,
            field,
        }
    }
}

/// Fields to emit from a confirmed item, relative to a matched cell.
#[derive(Clone, Debug)]
pub struct FieldRetrieval {
    pub id: String,
    pub header: HeaderSpec,
    pub field: FieldMatcher,
    /// Column offsets from the matched cell whose values are emitted, in order.
    pub offsets: Vec<isize>,
}

impl FieldRetrieval {
    pub fn new(
        id: impl Into<String>,
        header: HeaderSpec,
        field: FieldMatcher,
        offsets: impl Into<Vec<isize>>,
    ) -> Self {
        Self {
            id: id.into(),
            header,
            field,
            offsets: offsets.into(),
        }
    }
}

/// Per-item match bookkeeping for one matcher.
///
/// Specs stay immutable and shareable; workers keep one counter per spec and
/// reset it at every item boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct MatchCounter {
    count: usize,
}

impl MatchCounter {
    /// Counts `value` if it matches and reports whether `field`'s threshold
    /// was reached by this very observation.
    pub(crate) fn observe(&mut self, field: &FieldMatcher, value: &str) -> bool {
        if self.is_satisfied(field) || !field.matches(value) {
            return false;
        }
        self.count += 1;
        self.is_satisfied(field)
    }

    pub(crate) fn is_satisfied(&self, field: &FieldMatcher) -> bool {
        self.count >= field.required()
    }

    pub(crate) fn reset(&mut self) {
        self.count = 0;
    }
}
