//! Factory methods: the only way relation nodes come into existence.
//!
//! Every factory validates its preconditions before allocating, computes the
//! result's column set, uniqueness bit and row bounds, and fails with a typed
//! error otherwise. Trees can therefore never hold a structurally invalid
//! node.

use std::collections::BTreeSet;
use std::sync::Arc;

use itertools::Itertools;

use crate::engine::{EngineRef, Payload};
use crate::error::{Error, Result};
use crate::expr::{Expression, Predicate};
use crate::tag::ColumnTag;

use super::operations::{
    BinaryOperation, Calculation, Join, MarkerKind, Projection, Selection, Slice, Sort, SortKey,
    UnaryOperation,
};
use super::{
    BinaryOpRelation, Leaf, MarkerRelation, PayloadSlot, Relation, RowBounds, UnaryOpRelation,
};

fn names<T: ColumnTag>(columns: impl IntoIterator<Item = T>) -> String {
    columns.into_iter().map(|c| c.qualified_name()).join(", ")
}

fn require_subset<T: ColumnTag>(
    required: &BTreeSet<T>,
    available: &BTreeSet<T>,
    what: &str,
) -> Result<()> {
    let missing: BTreeSet<_> = required.difference(available).cloned().collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::column(format!(
            "{what} references columns not present in the target: {}",
            names(missing)
        )))
    }
}

impl<T: ColumnTag> Relation<T> {
    /// Base data resident in an engine.
    pub fn leaf(
        name: impl Into<String>,
        engine: EngineRef<T>,
        columns: BTreeSet<T>,
        unique: bool,
        payload: Payload,
    ) -> Relation<T> {
        Relation::Leaf(Arc::new(Leaf {
            name: name.into(),
            engine,
            columns,
            unique,
            payload: PayloadSlot::attached(payload),
        }))
    }

    /// A leaf whose payload will be attached later (single-assignment).
    pub fn deferred_leaf(
        name: impl Into<String>,
        engine: EngineRef<T>,
        columns: BTreeSet<T>,
        unique: bool,
    ) -> Relation<T> {
        Relation::Leaf(Arc::new(Leaf {
            name: name.into(),
            engine,
            columns,
            unique,
            payload: PayloadSlot::empty(),
        }))
    }

    /// Extend each row with a column computed from existing ones.
    pub fn calculation(&self, tag: T, expr: Expression<T>) -> Result<Relation<T>> {
        let engine = self.engine().clone();
        if self.columns().contains(&tag) {
            return Err(Error::column(format!(
                "calculated column `{}` already exists in the target",
                tag.qualified_name()
            )));
        }
        require_subset(&expr.columns(), self.columns(), "calculation expression")?;
        if !expr.is_supported_by(&engine) {
            return Err(Error::engine(
                engine.name(),
                "calculation expression is not supported",
            ));
        }
        let mut columns = self.columns().clone();
        columns.insert(tag.clone());
        let operation = UnaryOperation::Calculation(Calculation { tag, expr });
        self.checked_unary(operation, columns, self.is_unique(), self.bounds())
    }

    /// Restrict rows to `keep`.
    pub fn projection(&self, keep: BTreeSet<T>) -> Result<Relation<T>> {
        require_subset(&keep, self.columns(), "projection")?;
        // dropping columns can merge previously distinct rows
        let unique = self.is_unique() && keep == *self.columns();
        let operation = UnaryOperation::Projection(Projection {
            columns: keep.clone(),
        });
        self.checked_unary(operation, keep, unique, self.bounds())
    }

    /// Keep only rows satisfying `predicate`.
    pub fn selection(&self, predicate: Predicate<T>) -> Result<Relation<T>> {
        let engine = self.engine().clone();
        require_subset(&predicate.columns(), self.columns(), "selection predicate")?;
        if !predicate.is_supported_by(&engine) {
            return Err(Error::engine(
                engine.name(),
                "selection predicate is not supported",
            ));
        }
        let bounds = RowBounds {
            min_rows: 0,
            max_rows: self.bounds().max_rows,
        };
        let operation = UnaryOperation::Selection(Selection { predicate });
        self.checked_unary(operation, self.columns().clone(), self.is_unique(), bounds)
    }

    /// Positional window `[start, stop)` over the rows.
    pub fn slice(&self, start: usize, stop: Option<usize>) -> Result<Relation<T>> {
        if let Some(stop) = stop {
            if start > stop {
                return Err(Error::invariant(format!(
                    "slice start {start} exceeds stop {stop}"
                )));
            }
        }
        let slice = Slice { start, stop };
        let window = slice.len();
        let in_bounds = self.bounds();
        // both caps are optional; an absent one leaves the other in charge
        let max_rows = match (in_bounds.max_rows.map(|m| m.saturating_sub(start)), window) {
            (Some(remaining), Some(window)) => Some(remaining.min(window)),
            (remaining, None) => remaining,
            (None, window) => window,
        };
        let min_rows = in_bounds.min_rows.saturating_sub(start);
        let min_rows = window.map_or(min_rows, |w| min_rows.min(w));
        let bounds = RowBounds { min_rows, max_rows };
        let operation = UnaryOperation::Slice(slice);
        self.checked_unary(operation, self.columns().clone(), self.is_unique(), bounds)
    }

    /// Reorder rows by the given keys. Whether an engine honors the ordering
    /// is the engine's affair; the iteration engine does, the SQL engine only
    /// at the outermost position.
    pub fn sort(&self, keys: Vec<SortKey<T>>) -> Result<Relation<T>> {
        let engine = self.engine().clone();
        let sort = Sort { keys };
        require_subset(&sort.columns(), self.columns(), "sort keys")?;
        if sort.keys.iter().any(|k| !k.expr.is_supported_by(&engine)) {
            return Err(Error::engine(engine.name(), "sort key is not supported"));
        }
        let operation = UnaryOperation::Sort(sort);
        self.checked_unary(
            operation,
            self.columns().clone(),
            self.is_unique(),
            self.bounds(),
        )
    }

    /// Remove duplicate rows. Deduplicating a relation already known to be
    /// duplicate-free returns the target node itself.
    pub fn deduplication(&self) -> Result<Relation<T>> {
        let bounds = self.bounds();
        if self.is_unique() || bounds.max_rows.map_or(false, |m| m <= 1) {
            return Ok(self.clone());
        }
        let out_bounds = RowBounds {
            min_rows: bounds.min_rows.min(1),
            max_rows: bounds.max_rows,
        };
        self.checked_unary(
            UnaryOperation::Deduplication,
            self.columns().clone(),
            true,
            out_bounds,
        )
    }

    /// Inner join; common columns become equi-join keys.
    pub fn join(&self, rhs: &Relation<T>, predicate: Option<Predicate<T>>) -> Result<Relation<T>> {
        let engine = self.engine().clone();
        if !EngineRef::same_engine(&engine, rhs.engine()) {
            return Err(Error::invariant(format!(
                "join operands live on different engines: `{}` vs `{}`",
                engine.name(),
                rhs.engine().name()
            )));
        }
        let columns: BTreeSet<T> = self.columns().union(rhs.columns()).cloned().collect();
        if let Some(predicate) = &predicate {
            require_subset(&predicate.columns(), &columns, "join predicate")?;
            if !predicate.is_supported_by(&engine) {
                return Err(Error::engine(
                    engine.name(),
                    "join predicate is not supported",
                ));
            }
        }
        let operation = BinaryOperation::Join(Join { predicate });
        if !engine.get().supports_binary(&operation) {
            return Err(Error::not_implemented(engine.name(), "Join"));
        }
        // distinct operand rows pair up into distinct output rows
        let unique = self.is_unique() && rhs.is_unique();
        let bounds = RowBounds {
            min_rows: 0,
            max_rows: self
                .bounds()
                .max_rows
                .zip(rhs.bounds().max_rows)
                .map(|(a, b)| a.saturating_mul(b)),
        };
        Ok(Relation::BinaryOp(Arc::new(BinaryOpRelation {
            operation,
            lhs: self.clone(),
            rhs: rhs.clone(),
            columns,
            unique,
            bounds,
        })))
    }

    /// Multiset union of two relations over the same column set.
    pub fn chain(&self, rhs: &Relation<T>) -> Result<Relation<T>> {
        let engine = self.engine().clone();
        if !EngineRef::same_engine(&engine, rhs.engine()) {
            return Err(Error::invariant(format!(
                "chain operands live on different engines: `{}` vs `{}`",
                engine.name(),
                rhs.engine().name()
            )));
        }
        if self.columns() != rhs.columns() {
            return Err(Error::invariant(format!(
                "chain operands must have equal column sets: [{}] vs [{}]",
                names(self.columns().clone()),
                names(rhs.columns().clone())
            )));
        }
        let operation = BinaryOperation::Chain;
        if !engine.get().supports_binary(&operation) {
            return Err(Error::not_implemented(engine.name(), "Chain"));
        }
        let (lb, rb) = (self.bounds(), rhs.bounds());
        let bounds = RowBounds {
            min_rows: lb.min_rows.saturating_add(rb.min_rows),
            max_rows: lb.max_rows.zip(rb.max_rows).map(|(a, b)| a.saturating_add(b)),
        };
        Ok(Relation::BinaryOp(Arc::new(BinaryOpRelation {
            operation,
            lhs: self.clone(),
            rhs: rhs.clone(),
            columns: self.columns().clone(),
            unique: false,
            bounds,
        })))
    }

    /// Mark this relation so its first execution's payload is kept for reuse.
    pub fn materialization(&self, name: Option<String>) -> Relation<T> {
        Relation::Marker(Arc::new(MarkerRelation {
            kind: MarkerKind::Materialization(name),
            engine: self.engine().clone(),
            target: self.clone(),
            payload: PayloadSlot::empty(),
        }))
    }

    /// Mark the boundary at which rows move to another engine.
    pub fn transfer(&self, destination: EngineRef<T>) -> Result<Relation<T>> {
        if EngineRef::same_engine(self.engine(), &destination) {
            return Err(Error::invariant(format!(
                "transfer source and destination are both `{}`",
                destination.name()
            )));
        }
        Ok(Relation::Marker(Arc::new(MarkerRelation {
            kind: MarkerKind::Transfer,
            engine: destination,
            target: self.clone(),
            payload: PayloadSlot::empty(),
        })))
    }

    /// Certify that this subtree is a single SELECT statement. Placed only by
    /// the SQL engine's conform pass.
    pub(crate) fn select_marker(&self, output: Option<BTreeSet<T>>) -> Relation<T> {
        Relation::Marker(Arc::new(MarkerRelation {
            kind: MarkerKind::Select(output),
            engine: self.engine().clone(),
            target: self.clone(),
            payload: PayloadSlot::empty(),
        }))
    }

    /// Re-apply a unary operation to a (possibly rewritten) target,
    /// re-running validation and cache computation.
    pub(crate) fn rebuild_unary(
        operation: UnaryOperation<T>,
        target: &Relation<T>,
    ) -> Result<Relation<T>> {
        if let Some(rewritten) = target
            .engine()
            .get()
            .apply_custom_unary(&operation, target)?
        {
            return Ok(rewritten);
        }
        match operation {
            UnaryOperation::Calculation(c) => target.calculation(c.tag, c.expr),
            UnaryOperation::Deduplication => target.deduplication(),
            UnaryOperation::Identity => Ok(target.clone()),
            UnaryOperation::Projection(p) => target.projection(p.columns),
            UnaryOperation::Selection(s) => target.selection(s.predicate),
            UnaryOperation::Slice(s) => target.slice(s.start, s.stop),
            UnaryOperation::Sort(s) => target.sort(s.keys),
        }
    }

    fn checked_unary(
        &self,
        operation: UnaryOperation<T>,
        columns: BTreeSet<T>,
        unique: bool,
        bounds: RowBounds,
    ) -> Result<Relation<T>> {
        let engine = self.engine();
        if !engine.get().supports_unary(&operation) {
            return Err(Error::engine(
                engine.name(),
                format!("operation `{}` is not supported", operation.as_ref()),
            ));
        }
        Ok(Relation::UnaryOp(Arc::new(UnaryOpRelation {
            operation,
            target: self.clone(),
            columns,
            unique,
            bounds,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{DataType, Expression, Predicate};
    use crate::iteration::{IterationEngine, RowIterable};
    use crate::sql::SqlEngine;
    use crate::tag::StringTag;
    use crate::Reason;

    fn tag(name: &str) -> StringTag {
        StringTag::new(name)
    }

    fn tags(names: &[&str]) -> BTreeSet<StringTag> {
        names.iter().map(|n| tag(n)).collect()
    }

    fn iteration() -> EngineRef<StringTag> {
        EngineRef::new(IterationEngine::new("iteration"))
    }

    fn sql() -> EngineRef<StringTag> {
        EngineRef::new(SqlEngine::new("sql"))
    }

    fn leaf(name: &str, engine: &EngineRef<StringTag>, columns: &[&str]) -> Relation<StringTag> {
        Relation::leaf(
            name,
            engine.clone(),
            tags(columns),
            false,
            Arc::new(RowIterable::<StringTag>::sequence(vec![])),
        )
    }

    #[test]
    fn calculation_rejects_unknown_and_duplicate_columns() {
        let engine = iteration();
        let base = leaf("base", &engine, &["a", "b"]);

        let unknown = base.calculation(tag("c"), Expression::reference(tag("missing")));
        assert!(matches!(unknown.unwrap_err().reason, Reason::Column { .. }));

        let duplicate = base.calculation(tag("a"), Expression::literal(1i64));
        assert!(matches!(duplicate.unwrap_err().reason, Reason::Column { .. }));

        let ok = base
            .calculation(
                tag("c"),
                Expression::function(
                    "add",
                    vec![Expression::reference(tag("a")), Expression::literal(1i64)],
                    DataType::Integer,
                ),
            )
            .unwrap();
        assert_eq!(*ok.columns(), tags(&["a", "b", "c"]));
    }

    #[test]
    fn calculation_rejects_unregistered_functions() {
        let engine = iteration();
        let base = leaf("base", &engine, &["a"]);
        let result = base.calculation(
            tag("b"),
            Expression::function("frobnicate", vec![], DataType::Integer),
        );
        assert!(matches!(result.unwrap_err().reason, Reason::Engine { .. }));
    }

    #[test]
    fn projection_narrows_columns_and_weakens_uniqueness() {
        let engine = iteration();
        let base = Relation::leaf(
            "base",
            engine,
            tags(&["a", "b"]),
            true,
            Arc::new(RowIterable::<StringTag>::sequence(vec![])),
        );
        let narrowed = base.projection(tags(&["a"])).unwrap();
        assert_eq!(*narrowed.columns(), tags(&["a"]));
        assert!(!narrowed.is_unique());

        let full = base.projection(tags(&["a", "b"])).unwrap();
        assert!(full.is_unique());

        let missing = base.projection(tags(&["z"]));
        assert!(matches!(missing.unwrap_err().reason, Reason::Column { .. }));
    }

    #[test]
    fn slice_bounds_and_validation() {
        let engine = iteration();
        let base = leaf("base", &engine, &["a"]);

        assert!(matches!(
            base.slice(5, Some(3)).unwrap_err().reason,
            Reason::Invariant { .. }
        ));

        let window = base.slice(2, Some(5)).unwrap();
        assert_eq!(window.bounds().max_rows, Some(3));

        let empty = base.slice(4, Some(4)).unwrap();
        assert_eq!(empty.bounds().max_rows, Some(0));
        assert_eq!(*empty.columns(), tags(&["a"]));
    }

    #[test]
    fn deduplication_of_unique_target_is_the_same_node() {
        let engine = iteration();
        let base = Relation::leaf(
            "base",
            engine.clone(),
            tags(&["a"]),
            true,
            Arc::new(RowIterable::<StringTag>::sequence(vec![])),
        );
        let deduped = base.deduplication().unwrap();
        assert!(Relation::same_node(&base, &deduped));

        // a one-row window is duplicate-free even when the input is not
        let single = leaf("d", &engine, &["a"]).slice(0, Some(1)).unwrap();
        let deduped = single.deduplication().unwrap();
        assert!(Relation::same_node(&single, &deduped));
    }

    #[test]
    fn join_is_rejected_by_the_iteration_engine() {
        let engine = iteration();
        let a = leaf("a", &engine, &["x", "y"]);
        let b = leaf("b", &engine, &["x", "z"]);
        let result = a.join(&b, None);
        assert!(matches!(
            result.unwrap_err().reason,
            Reason::NotImplemented { .. }
        ));
    }

    #[test]
    fn join_merges_columns_and_uniqueness() {
        let engine = sql();
        let a = Relation::leaf(
            "a",
            engine.clone(),
            tags(&["x", "y"]),
            true,
            crate::sql::SqlTable::new("a"),
        );
        let b = Relation::leaf(
            "b",
            engine.clone(),
            tags(&["x", "z"]),
            true,
            crate::sql::SqlTable::new("b"),
        );
        let joined = a.join(&b, None).unwrap();
        assert_eq!(*joined.columns(), tags(&["x", "y", "z"]));
        assert!(joined.is_unique());

        let c = Relation::leaf(
            "c",
            engine,
            tags(&["x"]),
            false,
            crate::sql::SqlTable::new("c"),
        );
        assert!(!a.join(&c, None).unwrap().is_unique());
    }

    #[test]
    fn binary_operands_must_share_an_engine() {
        let a = leaf("a", &iteration(), &["x"]);
        let b = Relation::leaf(
            "b",
            sql(),
            tags(&["x"]),
            false,
            crate::sql::SqlTable::new("b"),
        );
        assert!(matches!(
            a.chain(&b).unwrap_err().reason,
            Reason::Invariant { .. }
        ));
    }

    #[test]
    fn chain_requires_equal_column_sets() {
        let engine = iteration();
        let a = leaf("a", &engine, &["x", "y"]);
        let b = leaf("b", &engine, &["x"]);
        assert!(matches!(
            a.chain(&b).unwrap_err().reason,
            Reason::Invariant { .. }
        ));

        let c = leaf("c", &engine, &["x", "y"]);
        let chained = a.chain(&c).unwrap();
        assert_eq!(*chained.columns(), tags(&["x", "y"]));
        assert!(!chained.is_unique());
    }

    #[test]
    fn transfer_must_change_engines() {
        let engine = iteration();
        let base = leaf("base", &engine, &["x"]);
        assert!(matches!(
            base.transfer(engine.clone()).unwrap_err().reason,
            Reason::Invariant { .. }
        ));
        let other = sql();
        let transferred = base.transfer(other.clone()).unwrap();
        assert_eq!(transferred.engine(), &other);
        assert_eq!(transferred.as_marker().unwrap().target.engine(), &engine);
    }

    #[test]
    fn payloads_are_single_assignment() {
        let engine = iteration();
        let base = Relation::deferred_leaf("base", engine, tags(&["x"]), false);
        let leaf = base.as_leaf().unwrap();
        assert!(leaf.payload.get().is_none());

        let payload: Payload = Arc::new(RowIterable::<StringTag>::sequence(vec![]));
        leaf.payload.attach(payload.clone()).unwrap();
        assert!(leaf.payload.get().is_some());

        let again: Payload = Arc::new(RowIterable::<StringTag>::sequence(vec![]));
        assert!(matches!(
            leaf.payload.attach(again).unwrap_err().reason,
            Reason::Invariant { .. }
        ));
    }

    #[test]
    fn selection_keeps_columns_and_checks_predicate() {
        let engine = iteration();
        let base = leaf("base", &engine, &["a", "b"]);
        let kept = base
            .selection(Predicate::function(
                "eq",
                vec![Expression::reference(tag("a")), Expression::literal(1i64)],
            ))
            .unwrap();
        assert_eq!(kept.columns(), base.columns());
        assert_eq!(kept.bounds().min_rows, 0);

        let missing = base.selection(Predicate::Reference(tag("nope")));
        assert!(matches!(missing.unwrap_err().reason, Reason::Column { .. }));
    }

    #[test]
    fn structural_equality_ignores_payloads() {
        let engine = iteration();
        let a = leaf("same", &engine, &["x"]);
        let b = leaf("same", &engine, &["x"]);
        assert_eq!(a, b);
        assert!(!Relation::same_node(&a, &b));

        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let hash = |r: &Relation<StringTag>| {
            let mut hasher = DefaultHasher::new();
            r.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(hash(&a), hash(&b));
    }
}
