//! The closed sums of operations a relation node can carry.

use std::collections::BTreeSet;

use enum_as_inner::EnumAsInner;
use serde::Serialize;

use crate::expr::{Expression, Predicate};
use crate::tag::ColumnTag;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, EnumAsInner, strum::AsRefStr)]
pub enum UnaryOperation<T: ColumnTag> {
    Calculation(Calculation<T>),
    Deduplication,
    /// `apply` returns the operand unchanged; never appears in trees.
    Identity,
    Projection(Projection<T>),
    Selection(Selection<T>),
    Slice(Slice),
    Sort(Sort<T>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, EnumAsInner, strum::AsRefStr)]
pub enum BinaryOperation<T: ColumnTag> {
    Join(Join<T>),
    Chain,
}

/// Annotations that change no row semantics.
///
/// `Select` certifies "this subtree is a single SELECT statement"; it exists
/// only where the SQL engine's conform pass places it, and may narrow the
/// observable column set when sort keys forced a wider interior projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, EnumAsInner, strum::AsRefStr)]
pub enum MarkerKind<T: ColumnTag> {
    Materialization(Option<String>),
    Transfer,
    Select(Option<BTreeSet<T>>),
}

/// Extend each row with one computed column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Calculation<T: ColumnTag> {
    pub tag: T,
    pub expr: Expression<T>,
}

/// Restrict rows to a subset of columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Projection<T: ColumnTag> {
    pub columns: BTreeSet<T>,
}

/// Keep only rows satisfying a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Selection<T: ColumnTag> {
    pub predicate: Predicate<T>,
}

/// Positional window over the rows, `stop` exclusive (`None` = unbounded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Slice {
    pub start: usize,
    pub stop: Option<usize>,
}

impl Slice {
    /// Number of rows the window can hold.
    pub fn len(&self) -> Option<usize> {
        self.stop.map(|stop| stop - self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// `self` applied after `inner`.
    pub fn compose_after(&self, inner: &Slice) -> Slice {
        let start = inner.start + self.start;
        let stop = match (inner.stop, self.stop) {
            (Some(a), Some(b)) => Some(a.min(inner.start + b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(inner.start + b),
            (None, None) => None,
        };
        // an empty inner window stays empty
        let stop = stop.map(|s| s.max(start));
        Slice { start, stop }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Sort<T: ColumnTag> {
    pub keys: Vec<SortKey<T>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SortKey<T: ColumnTag> {
    pub expr: Expression<T>,
    pub ascending: bool,
}

impl<T: ColumnTag> SortKey<T> {
    pub fn asc(expr: Expression<T>) -> Self {
        SortKey {
            expr,
            ascending: true,
        }
    }

    pub fn desc(expr: Expression<T>) -> Self {
        SortKey {
            expr,
            ascending: false,
        }
    }
}

impl<T: ColumnTag> Sort<T> {
    pub fn columns(&self) -> BTreeSet<T> {
        let mut out = BTreeSet::new();
        for key in &self.keys {
            key.expr.collect_columns(&mut out);
        }
        out
    }
}

/// Inner join; common columns become equi-join keys, an optional predicate
/// is conjoined on top.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Join<T: ColumnTag> {
    pub predicate: Option<Predicate<T>>,
}

impl<T: ColumnTag> UnaryOperation<T> {
    /// Columns the operation itself reads (not the operand's columns).
    pub fn columns_required(&self) -> BTreeSet<T> {
        match self {
            UnaryOperation::Calculation(c) => c.expr.columns(),
            UnaryOperation::Projection(p) => p.columns.clone(),
            UnaryOperation::Selection(s) => s.predicate.columns(),
            UnaryOperation::Sort(s) => s.columns(),
            UnaryOperation::Deduplication | UnaryOperation::Identity | UnaryOperation::Slice(_) => {
                BTreeSet::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_composition() {
        // rows 10.. then rows 2..5 of that
        let outer = Slice {
            start: 2,
            stop: Some(5),
        };
        let inner = Slice {
            start: 10,
            stop: None,
        };
        assert_eq!(
            outer.compose_after(&inner),
            Slice {
                start: 12,
                stop: Some(15)
            }
        );

        // inner window caps the composed stop
        let inner = Slice {
            start: 10,
            stop: Some(13),
        };
        assert_eq!(
            outer.compose_after(&inner),
            Slice {
                start: 12,
                stop: Some(13)
            }
        );
    }
}
