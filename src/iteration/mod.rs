//! Row-oriented, order-preserving execution backend.
//!
//! Payloads are [RowIterable]s; operations compose lazily where the shape of
//! the data allows and gather eagerly where the operation's own semantics
//! demand it (deduplication, sorting, materialization).

mod rows;

pub use rows::{Row, RowGenerator, RowIter, RowIterable, RowMapping};

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use itertools::Itertools;

use crate::engine::{Engine, EngineRef, Payload};
use crate::error::{Error, Result};
use crate::expr::{Container, Expression, Literal, Predicate};
use crate::relation::{
    BinaryOperation, MarkerKind, Relation, RelationFold, UnaryOperation,
};
use crate::tag::ColumnTag;

pub type ScalarFn = fn(&[Literal]) -> Result<Literal>;
pub type PredicateFn = fn(&[Literal]) -> Result<bool>;

#[derive(Debug, Clone, Default)]
struct FunctionRegistry {
    scalars: HashMap<String, ScalarFn>,
    predicates: HashMap<String, PredicateFn>,
}

/// The iteration engine: executes relation trees over in-memory rows.
///
/// Named scalar and predicate functions resolve against a registry; the
/// standard prelude covers arithmetic and comparisons, hosts register the
/// rest. Join is not realizable on this engine.
#[derive(Debug)]
pub struct IterationEngine<T: ColumnTag> {
    name: String,
    functions: Arc<FunctionRegistry>,
    _tag: std::marker::PhantomData<fn() -> T>,
}

impl<T: ColumnTag> IterationEngine<T> {
    pub fn new(name: impl Into<String>) -> Self {
        IterationEngine {
            name: name.into(),
            functions: Arc::new(prelude()),
            _tag: std::marker::PhantomData,
        }
    }

    pub fn with_function(mut self, name: impl Into<String>, f: ScalarFn) -> Self {
        Arc::make_mut(&mut self.functions).scalars.insert(name.into(), f);
        self
    }

    pub fn with_predicate(mut self, name: impl Into<String>, f: PredicateFn) -> Self {
        Arc::make_mut(&mut self.functions).predicates.insert(name.into(), f);
        self
    }

    fn execute_iterable(&self, relation: &Relation<T>) -> Result<Arc<RowIterable<T>>> {
        match relation {
            Relation::Leaf(leaf) => {
                let payload = leaf.payload.get().ok_or_else(|| {
                    Error::invariant(format!("leaf `{}` has no payload attached", leaf.name))
                })?;
                as_row_iterable::<T>(&self.name, payload)
            }
            Relation::UnaryOp(node) => {
                let source = self.execute_iterable(&node.target)?;
                self.apply_unary(&node.operation, source)
            }
            Relation::BinaryOp(node) => match &node.operation {
                BinaryOperation::Chain => {
                    let lhs = self.execute_iterable(&node.lhs)?.rows()?;
                    let rhs = self.execute_iterable(&node.rhs)?.rows()?;
                    Ok(Arc::new(RowIterable::generator(lhs.chain(rhs))))
                }
                BinaryOperation::Join(_) => Err(Error::not_implemented(&self.name, "Join")),
            },
            Relation::Marker(marker) => match &marker.kind {
                MarkerKind::Materialization(_) => {
                    if let Some(payload) = marker.payload.get() {
                        return as_row_iterable::<T>(&self.name, payload);
                    }
                    let source = self.execute_iterable(&marker.target)?;
                    let materialized: Arc<RowIterable<T>> = if source.is_materialized() {
                        source
                    } else {
                        Arc::new(RowIterable::sequence(source.collect_rows()?))
                    };
                    let surviving = marker.payload.attach_or_get(materialized as Payload);
                    as_row_iterable::<T>(&self.name, &surviving)
                }
                MarkerKind::Transfer => Err(Error::invariant(
                    "transfer markers must be resolved by a processor before execution",
                )),
                MarkerKind::Select(_) => Err(Error::invariant(
                    "select markers do not belong in iteration-engine trees",
                )),
            },
        }
    }

    fn apply_unary(
        &self,
        operation: &UnaryOperation<T>,
        source: Arc<RowIterable<T>>,
    ) -> Result<Arc<RowIterable<T>>> {
        Ok(match operation {
            UnaryOperation::Identity => source,
            UnaryOperation::Selection(selection) => {
                let registry = self.functions.clone();
                let predicate = selection.predicate.clone();
                let rows = source.rows()?;
                Arc::new(RowIterable::generator(rows.filter_map(move |item| {
                    match item.and_then(|row| {
                        evaluate_predicate(&registry, &predicate, &row).map(|keep| (keep, row))
                    }) {
                        Ok((true, row)) => Some(Ok(row)),
                        Ok((false, _)) => None,
                        Err(e) => Some(Err(e)),
                    }
                })))
            }
            UnaryOperation::Calculation(calculation) => {
                let registry = self.functions.clone();
                let tag = calculation.tag.clone();
                let expr = calculation.expr.clone();
                let rows = source.rows()?;
                Arc::new(RowIterable::generator(rows.map(move |item| {
                    item.and_then(|row| {
                        let value = evaluate_scalar(&registry, &expr, &row)?;
                        Ok(row.with_column(tag.clone(), value))
                    })
                })))
            }
            UnaryOperation::Projection(projection) => {
                let keep = projection.columns.clone();
                let rows = source.rows()?;
                Arc::new(RowIterable::generator(
                    rows.map(move |item| item.map(|row| row.project(&keep))),
                ))
            }
            UnaryOperation::Deduplication => {
                let rows: Vec<_> = source.rows()?.try_collect()?;
                Arc::new(RowIterable::mapping(rows))
            }
            UnaryOperation::Sort(sort) => {
                if sort.keys.is_empty() {
                    return Ok(source);
                }
                let registry = self.functions.clone();
                let mut keyed: Vec<(Vec<Literal>, Row<T>)> = source
                    .rows()?
                    .map(|item| {
                        let row = item?;
                        let keys: Vec<Literal> = sort
                            .keys
                            .iter()
                            .map(|k| evaluate_scalar(&registry, &k.expr, &row))
                            .try_collect()?;
                        Ok((keys, row))
                    })
                    .try_collect::<_, Vec<_>, Error>()?;
                keyed.sort_by(|(a, _), (b, _)| {
                    for (key, (x, y)) in sort.keys.iter().zip(a.iter().zip(b.iter())) {
                        let ord = x.cmp(y);
                        let ord = if key.ascending { ord } else { ord.reverse() };
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                    Ordering::Equal
                });
                Arc::new(RowIterable::sequence(
                    keyed.into_iter().map(|(_, row)| row).collect(),
                ))
            }
            UnaryOperation::Slice(slice) => {
                let (start, stop) = (slice.start, slice.stop);
                match source.as_ref() {
                    RowIterable::Sequence(rows) => {
                        let window = window_of(rows, start, stop);
                        Arc::new(RowIterable::sequence(window))
                    }
                    RowIterable::Mapping(mapping) => {
                        let window = window_of(mapping.rows(), start, stop);
                        Arc::new(RowIterable::sequence(window))
                    }
                    RowIterable::Generator(_) => {
                        let mut rows = source.rows()?;
                        let mut index = 0usize;
                        Arc::new(RowIterable::generator(std::iter::from_fn(move || loop {
                            if stop.map_or(false, |s| index >= s) {
                                return None;
                            }
                            match rows.next() {
                                None => return None,
                                Some(Err(e)) => return Some(Err(e)),
                                Some(Ok(row)) => {
                                    let i = index;
                                    index += 1;
                                    if i >= start {
                                        return Some(Ok(row));
                                    }
                                }
                            }
                        })))
                    }
                }
            }
        })
    }
}

fn window_of<T: ColumnTag>(rows: &[Row<T>], start: usize, stop: Option<usize>) -> Vec<Row<T>> {
    let end = stop.unwrap_or(rows.len()).min(rows.len());
    let start = start.min(end);
    rows[start..end].to_vec()
}

fn as_row_iterable<T: ColumnTag>(engine: &str, payload: &Payload) -> Result<Arc<RowIterable<T>>> {
    payload
        .clone()
        .downcast::<RowIterable<T>>()
        .map_err(|_| Error::engine(engine, "payload is not a row iterable"))
}

struct ConformCheck<'a> {
    engine: &'a str,
}

impl<T: ColumnTag> RelationFold<T> for ConformCheck<'_> {
    fn fold_relation(&mut self, relation: Relation<T>) -> Result<Relation<T>> {
        if let Some(marker) = relation.as_marker() {
            if marker.kind.is_select() {
                return Err(Error::engine(
                    self.engine,
                    "select markers do not belong in iteration-engine trees",
                ));
            }
            // a transfer's target lives on a foreign engine
            if marker.kind.is_transfer() {
                return Ok(relation);
            }
        }
        crate::relation::fold_relation(self, relation)
    }
}

impl<T: ColumnTag> Engine<T> for IterationEngine<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_unary(&self, _operation: &UnaryOperation<T>) -> bool {
        true
    }

    fn supports_binary(&self, operation: &BinaryOperation<T>) -> bool {
        matches!(operation, BinaryOperation::Chain)
    }

    fn supports_scalar_function(&self, name: &str) -> bool {
        self.functions.scalars.contains_key(name)
    }

    fn supports_predicate_function(&self, name: &str) -> bool {
        self.functions.predicates.contains_key(name)
    }

    /// The iteration shape is already executable; conform only validates.
    fn conform(&self, relation: &Relation<T>) -> Result<Relation<T>> {
        let mut check = ConformCheck { engine: &self.name };
        check.fold_relation(relation.clone())
    }

    fn execute(&self, relation: &Relation<T>) -> Result<Payload> {
        Ok(self.execute_iterable(relation)? as Payload)
    }

    fn import_rows(&self, _columns: &BTreeSet<T>, rows: Vec<Row<T>>) -> Result<Payload> {
        Ok(Arc::new(RowIterable::sequence(rows)) as Payload)
    }
}

/// Evaluate a scalar expression against one row.
pub fn evaluate<T: ColumnTag>(
    engine: &IterationEngine<T>,
    expr: &Expression<T>,
    row: &Row<T>,
) -> Result<Literal> {
    evaluate_scalar(&engine.functions, expr, row)
}

fn evaluate_scalar<T: ColumnTag>(
    registry: &FunctionRegistry,
    expr: &Expression<T>,
    row: &Row<T>,
) -> Result<Literal> {
    match expr {
        Expression::Literal { value, .. } => Ok(value.clone()),
        Expression::Reference(tag) => row.get(tag).cloned().ok_or_else(|| {
            Error::column(format!("column `{}` is absent from the row", tag.qualified_name()))
        }),
        Expression::Function { name, args, .. } => {
            let f = registry
                .scalars
                .get(name)
                .ok_or_else(|| Error::engine("iteration", format!("unknown function `{name}`")))?;
            let values: Vec<Literal> = args
                .iter()
                .map(|a| evaluate_scalar(registry, a, row))
                .try_collect()?;
            f(&values)
        }
    }
}

fn evaluate_predicate<T: ColumnTag>(
    registry: &FunctionRegistry,
    predicate: &Predicate<T>,
    row: &Row<T>,
) -> Result<bool> {
    match predicate {
        Predicate::Literal(b) => Ok(*b),
        Predicate::Reference(tag) => match row.get(tag) {
            Some(Literal::Boolean(b)) => Ok(*b),
            Some(other) => Err(Error::column(format!(
                "column `{}` is not boolean (found {})",
                tag.qualified_name(),
                other.as_ref()
            ))),
            None => Err(Error::column(format!(
                "column `{}` is absent from the row",
                tag.qualified_name()
            ))),
        },
        Predicate::Function { name, args } => {
            let f = registry.predicates.get(name).ok_or_else(|| {
                Error::engine("iteration", format!("unknown predicate `{name}`"))
            })?;
            let values: Vec<Literal> = args
                .iter()
                .map(|a| evaluate_scalar(registry, a, row))
                .try_collect()?;
            f(&values)
        }
        Predicate::Not(inner) => Ok(!evaluate_predicate(registry, inner, row)?),
        Predicate::And(inner) => {
            for p in inner {
                if !evaluate_predicate(registry, p, row)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::Or(inner) => {
            for p in inner {
                if evaluate_predicate(registry, p, row)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::InContainer { member, container } => {
            let value = evaluate_scalar(registry, member, row)?;
            match container {
                Container::ExpressionSequence(items) => {
                    for item in items {
                        if evaluate_scalar(registry, item, row)? == value {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                Container::RangeLiteral { start, stop, step } => {
                    let i = match value {
                        Literal::Integer(i) => i,
                        _ => return Ok(false),
                    };
                    range_contains(*start, *stop, *step, i)
                }
            }
        }
    }
}

fn range_contains(start: i64, stop: i64, step: i64, value: i64) -> Result<bool> {
    match step.cmp(&0) {
        Ordering::Equal => Err(Error::invariant("range step must not be zero")),
        Ordering::Greater => {
            Ok(value >= start && value < stop && (value - start) % step == 0)
        }
        Ordering::Less => Ok(value <= start && value > stop && (start - value) % (-step) == 0),
    }
}

fn as_number(value: &Literal) -> Result<f64> {
    match value {
        Literal::Integer(i) => Ok(*i as f64),
        Literal::Float(x) => Ok(*x),
        other => Err(Error::column(format!(
            "expected a number, found {}",
            other.as_ref()
        ))),
    }
}

fn compare(a: &Literal, b: &Literal) -> Result<Ordering> {
    match (a, b) {
        (Literal::Integer(_) | Literal::Float(_), Literal::Integer(_) | Literal::Float(_)) => {
            Ok(as_number(a)?.total_cmp(&as_number(b)?))
        }
        (Literal::String(x), Literal::String(y)) => Ok(x.cmp(y)),
        (Literal::Boolean(x), Literal::Boolean(y)) => Ok(x.cmp(y)),
        _ => Err(Error::column(format!(
            "cannot compare {} with {}",
            a.as_ref(),
            b.as_ref()
        ))),
    }
}

fn binary_args(args: &[Literal]) -> Result<(&Literal, &Literal)> {
    match args {
        [a, b] => Ok((a, b)),
        _ => Err(Error::column(format!(
            "expected exactly two arguments, found {}",
            args.len()
        ))),
    }
}

fn arith(args: &[Literal], int_op: fn(i64, i64) -> Option<i64>, float_op: fn(f64, f64) -> f64) -> Result<Literal> {
    let (a, b) = binary_args(args)?;
    match (a, b) {
        (Literal::Integer(x), Literal::Integer(y)) => int_op(*x, *y)
            .map(Literal::Integer)
            .ok_or_else(|| Error::column("integer overflow".to_string())),
        _ => Ok(Literal::Float(float_op(as_number(a)?, as_number(b)?))),
    }
}

fn prelude() -> FunctionRegistry {
    let mut registry = FunctionRegistry::default();
    registry
        .scalars
        .insert("add".into(), |args| arith(args, i64::checked_add, |a, b| a + b));
    registry
        .scalars
        .insert("sub".into(), |args| arith(args, i64::checked_sub, |a, b| a - b));
    registry
        .scalars
        .insert("mul".into(), |args| arith(args, i64::checked_mul, |a, b| a * b));
    registry.predicates.insert("eq".into(), |args| {
        let (a, b) = binary_args(args)?;
        Ok(compare(a, b)? == Ordering::Equal)
    });
    registry.predicates.insert("ne".into(), |args| {
        let (a, b) = binary_args(args)?;
        Ok(compare(a, b)? != Ordering::Equal)
    });
    registry.predicates.insert("lt".into(), |args| {
        let (a, b) = binary_args(args)?;
        Ok(compare(a, b)? == Ordering::Less)
    });
    registry.predicates.insert("le".into(), |args| {
        let (a, b) = binary_args(args)?;
        Ok(compare(a, b)? != Ordering::Greater)
    });
    registry.predicates.insert("gt".into(), |args| {
        let (a, b) = binary_args(args)?;
        Ok(compare(a, b)? == Ordering::Greater)
    });
    registry.predicates.insert("ge".into(), |args| {
        let (a, b) = binary_args(args)?;
        Ok(compare(a, b)? != Ordering::Less)
    });
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::DataType;
    use crate::relation::SortKey;
    use crate::tag::StringTag;

    fn tag(name: &str) -> StringTag {
        StringTag::new(name)
    }

    fn tags(names: &[&str]) -> BTreeSet<StringTag> {
        names.iter().map(|n| tag(n)).collect()
    }

    fn row(pairs: &[(&str, i64)]) -> Row<StringTag> {
        Row::from_pairs(
            pairs
                .iter()
                .map(|(name, value)| (tag(name), Literal::Integer(*value))),
        )
    }

    fn engine() -> EngineRef<StringTag> {
        EngineRef::new(IterationEngine::new("iteration"))
    }

    fn leaf_with_rows(
        engine: &EngineRef<StringTag>,
        columns: &[&str],
        rows: Vec<Row<StringTag>>,
    ) -> Relation<StringTag> {
        Relation::leaf(
            "rows",
            engine.clone(),
            tags(columns),
            false,
            Arc::new(RowIterable::sequence(rows)),
        )
    }

    fn rows_of(payload: &Payload) -> Vec<Row<StringTag>> {
        payload
            .downcast_ref::<RowIterable<StringTag>>()
            .unwrap()
            .collect_rows()
            .unwrap()
    }

    fn execute(engine: &EngineRef<StringTag>, relation: &Relation<StringTag>) -> Vec<Row<StringTag>> {
        rows_of(&engine.get().execute(relation).unwrap())
    }

    #[test]
    fn selection_filters_in_order() {
        let e = engine();
        let base = leaf_with_rows(
            &e,
            &["a"],
            vec![row(&[("a", 3)]), row(&[("a", 1)]), row(&[("a", 5)])],
        );
        let relation = base
            .selection(Predicate::function(
                "gt",
                vec![Expression::reference(tag("a")), Expression::literal(2i64)],
            ))
            .unwrap();
        assert_eq!(execute(&e, &relation), vec![row(&[("a", 3)]), row(&[("a", 5)])]);
    }

    #[test]
    fn calculation_extends_each_row() {
        let e = engine();
        let base = leaf_with_rows(&e, &["a"], vec![row(&[("a", 2)]), row(&[("a", 7)])]);
        let relation = base
            .calculation(
                tag("b"),
                Expression::function(
                    "mul",
                    vec![Expression::reference(tag("a")), Expression::literal(10i64)],
                    DataType::Integer,
                ),
            )
            .unwrap();
        assert_eq!(
            execute(&e, &relation),
            vec![row(&[("a", 2), ("b", 20)]), row(&[("a", 7), ("b", 70)])]
        );
    }

    #[test]
    fn projection_restricts_row_keys() {
        let e = engine();
        let base = leaf_with_rows(&e, &["a", "b"], vec![row(&[("a", 1), ("b", 2)])]);
        let relation = base.projection(tags(&["b"])).unwrap();
        assert_eq!(execute(&e, &relation), vec![row(&[("b", 2)])]);
    }

    #[test]
    fn deduplication_keeps_first_occurrences() {
        let e = engine();
        let base = leaf_with_rows(
            &e,
            &["a"],
            vec![row(&[("a", 2)]), row(&[("a", 1)]), row(&[("a", 2)])],
        );
        let relation = base.deduplication().unwrap();
        assert_eq!(execute(&e, &relation), vec![row(&[("a", 2)]), row(&[("a", 1)])]);
    }

    #[test]
    fn sort_is_stable_and_honors_direction() {
        let e = engine();
        let base = leaf_with_rows(
            &e,
            &["a", "b"],
            vec![
                row(&[("a", 2), ("b", 1)]),
                row(&[("a", 1), ("b", 2)]),
                row(&[("a", 2), ("b", 3)]),
            ],
        );
        let ascending = base
            .sort(vec![SortKey::asc(Expression::reference(tag("a")))])
            .unwrap();
        assert_eq!(
            execute(&e, &ascending),
            vec![
                row(&[("a", 1), ("b", 2)]),
                row(&[("a", 2), ("b", 1)]),
                row(&[("a", 2), ("b", 3)]),
            ]
        );

        let descending = base
            .sort(vec![SortKey::desc(Expression::reference(tag("a")))])
            .unwrap();
        assert_eq!(
            execute(&e, &descending),
            vec![
                row(&[("a", 2), ("b", 1)]),
                row(&[("a", 2), ("b", 3)]),
                row(&[("a", 1), ("b", 2)]),
            ]
        );
    }

    #[test]
    fn sort_with_no_keys_passes_the_payload_through() {
        let e = engine();
        let rows = vec![row(&[("a", 2)]), row(&[("a", 1)])];
        let payload: Payload = Arc::new(RowIterable::sequence(rows.clone()));
        let base = Relation::leaf("rows", e.clone(), tags(&["a"]), false, payload.clone());
        let relation = base.sort(vec![]).unwrap();
        let result = e.get().execute(&relation).unwrap();
        assert!(Arc::ptr_eq(
            &payload.downcast::<RowIterable<StringTag>>().unwrap(),
            &result.downcast::<RowIterable<StringTag>>().unwrap()
        ));
    }

    #[test]
    fn slice_windows_sequences_and_generators() {
        let e = engine();
        let rows: Vec<_> = (0..6i64).map(|i| row(&[("a", i)])).collect();
        let base = leaf_with_rows(&e, &["a"], rows.clone());
        let window = base.slice(2, Some(4)).unwrap();
        assert_eq!(execute(&e, &window), rows[2..4].to_vec());

        // a generator slices lazily
        let generator: Payload = Arc::new(RowIterable::generator(
            rows.clone().into_iter().map(Ok),
        ));
        let lazy_base = Relation::leaf("lazy", e.clone(), tags(&["a"]), false, generator);
        let lazy_window = lazy_base.slice(2, Some(4)).unwrap();
        assert_eq!(execute(&e, &lazy_window), rows[2..4].to_vec());

        let empty = base.slice(3, Some(3)).unwrap();
        assert_eq!(execute(&e, &empty), vec![]);
    }

    #[test]
    fn chain_concatenates_in_order() {
        let e = engine();
        let first = leaf_with_rows(&e, &["a"], vec![row(&[("a", 1)]), row(&[("a", 2)])]);
        let second = leaf_with_rows(&e, &["a"], vec![row(&[("a", 3)])]);
        let relation = first.chain(&second).unwrap();
        assert_eq!(
            execute(&e, &relation),
            vec![row(&[("a", 1)]), row(&[("a", 2)]), row(&[("a", 3)])]
        );
    }

    #[test]
    fn materialization_upgrades_and_caches() {
        let e = engine();
        let rows = vec![row(&[("a", 1)]), row(&[("a", 2)])];
        let generator: Payload = Arc::new(RowIterable::generator(
            rows.clone().into_iter().map(Ok),
        ));
        let base = Relation::leaf("lazy", e.clone(), tags(&["a"]), false, generator);
        let relation = base.materialization(None);

        let first = e.get().execute(&relation).unwrap();
        assert!(first
            .downcast_ref::<RowIterable<StringTag>>()
            .unwrap()
            .is_materialized());
        assert_eq!(rows_of(&first), rows);

        // the generator is spent; only the cache can answer again
        let second = e.get().execute(&relation).unwrap();
        assert!(Arc::ptr_eq(
            &first.downcast::<RowIterable<StringTag>>().unwrap(),
            &second.downcast::<RowIterable<StringTag>>().unwrap()
        ));
    }

    #[test]
    fn empty_connectives_have_identity_semantics() {
        let e = engine();
        let base = leaf_with_rows(&e, &["a"], vec![row(&[("a", 1)]), row(&[("a", 2)])]);
        let all = base.selection(Predicate::and(vec![])).unwrap();
        assert_eq!(execute(&e, &all).len(), 2);
        let none = base.selection(Predicate::or(vec![])).unwrap();
        assert_eq!(execute(&e, &none).len(), 0);
    }

    #[test]
    fn unresolved_transfers_do_not_execute() {
        let e = engine();
        let other = EngineRef::new(IterationEngine::new("other"));
        let base = leaf_with_rows(&e, &["a"], vec![row(&[("a", 1)])]);
        let transferred = base.transfer(other.clone()).unwrap();
        assert!(other.get().execute(&transferred).is_err());
    }

    #[test]
    fn range_membership() {
        assert!(range_contains(0, 10, 2, 4).unwrap());
        assert!(!range_contains(0, 10, 2, 5).unwrap());
        assert!(!range_contains(0, 10, 2, 10).unwrap());
        assert!(range_contains(10, 0, -2, 4).unwrap());
        assert!(range_contains(0, 10, 1, 0).unwrap());
        assert!(range_contains(0, 10, 1, 9).unwrap());
        assert!(!range_contains(0, 10, 1, 10).unwrap());
        assert!(range_contains(0, 0, 1, 0).is_ok_and(|b| !b));
    }
}
