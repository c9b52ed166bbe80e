//! Row payloads for the iteration engine.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::{self, Debug, Formatter};
use std::sync::Mutex;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::expr::Literal;
use crate::tag::ColumnTag;

/// One row: a mapping from column tag to value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Row<T: ColumnTag>(BTreeMap<T, Literal>);

impl<T: ColumnTag> Row<T> {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (T, Literal)>) -> Self {
        Row(pairs.into_iter().collect())
    }

    pub fn get(&self, tag: &T) -> Option<&Literal> {
        self.0.get(tag)
    }

    pub fn columns(&self) -> impl Iterator<Item = &T> {
        self.0.keys()
    }

    /// A copy of this row extended with one computed column.
    pub fn with_column(&self, tag: T, value: Literal) -> Row<T> {
        let mut map = self.0.clone();
        map.insert(tag, value);
        Row(map)
    }

    /// A copy of this row restricted to `keep`.
    pub fn project(&self, keep: &BTreeSet<T>) -> Row<T> {
        Row(self
            .0
            .iter()
            .filter(|(k, _)| keep.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Fallible stream of rows.
pub type RowIter<T> = Box<dyn Iterator<Item = Result<Row<T>>> + Send>;

/// The iteration engine's payload: a source of rows in one of three shapes.
#[derive(Debug)]
pub enum RowIterable<T: ColumnTag> {
    /// Lazy, one-shot, order-preserving.
    Generator(RowGenerator<T>),
    /// Materialized list; cheap windows, re-iterable.
    Sequence(Vec<Row<T>>),
    /// Materialized unique rows in insertion order, keyed by the full row.
    Mapping(RowMapping<T>),
}

impl<T: ColumnTag> RowIterable<T> {
    pub fn generator<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<Row<T>>> + Send + 'static,
    {
        RowIterable::Generator(RowGenerator(Mutex::new(Some(Box::new(iter)))))
    }

    pub fn sequence(rows: Vec<Row<T>>) -> Self {
        RowIterable::Sequence(rows)
    }

    pub fn mapping(rows: impl IntoIterator<Item = Row<T>>) -> Self {
        RowIterable::Mapping(RowMapping::from_rows(rows))
    }

    /// Stream the rows. Materialized shapes can be streamed repeatedly; a
    /// generator only once.
    pub fn rows(&self) -> Result<RowIter<T>> {
        match self {
            RowIterable::Generator(generator) => generator.take(),
            RowIterable::Sequence(rows) => {
                Ok(Box::new(rows.clone().into_iter().map(Ok)) as RowIter<T>)
            }
            RowIterable::Mapping(mapping) => {
                Ok(Box::new(mapping.rows.clone().into_iter().map(Ok)) as RowIter<T>)
            }
        }
    }

    /// Whether the rows are held in memory (as opposed to a pending stream).
    pub fn is_materialized(&self) -> bool {
        !matches!(self, RowIterable::Generator(_))
    }

    pub fn collect_rows(&self) -> Result<Vec<Row<T>>> {
        self.rows()?.collect()
    }
}

/// One-shot iterator slot; taking it a second time is an error.
pub struct RowGenerator<T: ColumnTag>(Mutex<Option<RowIter<T>>>);

impl<T: ColumnTag> RowGenerator<T> {
    fn take(&self) -> Result<RowIter<T>> {
        self.0
            .lock()
            .expect("row generator lock poisoned")
            .take()
            .ok_or_else(|| Error::invariant("one-shot row generator was already consumed"))
    }
}

impl<T: ColumnTag> Debug for RowGenerator<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let consumed = self
            .0
            .lock()
            .map(|slot| slot.is_none())
            .unwrap_or(true);
        write!(f, "RowGenerator {{ consumed: {consumed} }}")
    }
}

/// Unique rows in insertion order.
#[derive(Debug, Clone)]
pub struct RowMapping<T: ColumnTag> {
    rows: Vec<Row<T>>,
}

impl<T: ColumnTag> RowMapping<T> {
    pub fn from_rows(rows: impl IntoIterator<Item = Row<T>>) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for row in rows {
            if seen.insert(row.clone()) {
                unique.push(row);
            }
        }
        RowMapping { rows: unique }
    }

    pub fn rows(&self) -> &[Row<T>] {
        &self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::StringTag;

    fn row(pairs: &[(&str, i64)]) -> Row<StringTag> {
        Row::from_pairs(
            pairs
                .iter()
                .map(|(name, value)| (StringTag::new(*name), Literal::Integer(*value))),
        )
    }

    #[test]
    fn mapping_deduplicates_preserving_insertion_order() {
        let mapping = RowMapping::from_rows(vec![
            row(&[("a", 2)]),
            row(&[("a", 1)]),
            row(&[("a", 2)]),
        ]);
        assert_eq!(mapping.rows(), &[row(&[("a", 2)]), row(&[("a", 1)])]);
    }

    #[test]
    fn generator_is_one_shot() {
        let iterable = RowIterable::generator(vec![Ok(row(&[("a", 1)]))].into_iter());
        assert!(iterable.rows().is_ok());
        assert!(iterable.rows().is_err());
    }

    #[test]
    fn sequence_streams_repeatedly() {
        let iterable = RowIterable::sequence(vec![row(&[("a", 1)])]);
        assert_eq!(iterable.collect_rows().unwrap().len(), 1);
        assert_eq!(iterable.collect_rows().unwrap().len(), 1);
    }
}
