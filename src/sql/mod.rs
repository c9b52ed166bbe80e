//! The SQL engine: conform relation trees into a canonical SELECT layering
//! and emit them as [sqlparser] queries for a database client to run.
//!
//! The engine never talks to a database itself; executing a subtree yields
//! the emitted query as the payload.

mod conform;
mod gen_expr;
mod gen_query;

pub use gen_expr::{ColumnElement, ColumnLowering};

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;

use sqlformat::{format, FormatOptions, QueryParams};
use sqlparser::ast as sql_ast;

use crate::engine::{Engine, Payload};
use crate::error::{Error, Result};
use crate::iteration::Row;
use crate::relation::{BinaryOperation, Relation, UnaryOperation};
use crate::tag::ColumnTag;

/// Leaf payload: which database table a leaf reads from. Without one, the
/// leaf's own name is the table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTable {
    pub table: String,
}

impl SqlTable {
    pub fn new(table: impl Into<String>) -> Payload {
        Arc::new(SqlTable {
            table: table.into(),
        })
    }
}

/// The emitted executable description: a single top-level `SELECT` or a
/// `UNION` of them.
#[derive(Debug, Clone)]
pub struct SqlExecutable {
    pub query: sql_ast::Query,
}

/// SQL execution backend, generic over the column tag and the logical-column
/// lowering hooks.
#[derive(Debug)]
pub struct SqlEngine<T: ColumnTag, L: ColumnLowering<T> = ColumnElement> {
    name: String,
    lowering: L,
    _tag: PhantomData<fn() -> T>,
}

impl<T: ColumnTag> SqlEngine<T> {
    pub fn new(name: impl Into<String>) -> Self {
        SqlEngine {
            name: name.into(),
            lowering: ColumnElement,
            _tag: PhantomData,
        }
    }
}

impl<T: ColumnTag, L: ColumnLowering<T>> SqlEngine<T, L> {
    pub fn with_lowering(name: impl Into<String>, lowering: L) -> Self {
        SqlEngine {
            name: name.into(),
            lowering,
            _tag: PhantomData,
        }
    }

    /// Conform `relation` and emit it as one backend query.
    pub fn to_executable(&self, relation: &Relation<T>) -> Result<sql_ast::Query> {
        let conformed = conform::conform(relation)?;
        let mut ctx = gen_expr::Context::new(&self.lowering);
        gen_query::translate_relation(&conformed, &mut ctx)
    }

    /// The emitted query as formatted SQL text.
    pub fn to_sql_string(&self, relation: &Relation<T>) -> Result<String> {
        let query = self.to_executable(relation)?;
        Ok(format(
            &query.to_string(),
            &QueryParams::default(),
            FormatOptions::default(),
        ))
    }
}

impl<T: ColumnTag, L: ColumnLowering<T>> Engine<T> for SqlEngine<T, L> {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_unary(&self, _operation: &UnaryOperation<T>) -> bool {
        true
    }

    fn supports_binary(&self, _operation: &BinaryOperation<T>) -> bool {
        true
    }

    /// Function names pass through for the database to resolve.
    fn supports_scalar_function(&self, _name: &str) -> bool {
        true
    }

    fn supports_predicate_function(&self, _name: &str) -> bool {
        true
    }

    fn conform(&self, relation: &Relation<T>) -> Result<Relation<T>> {
        conform::conform(relation)
    }

    fn execute(&self, relation: &Relation<T>) -> Result<Payload> {
        let query = self.to_executable(relation)?;
        Ok(Arc::new(SqlExecutable { query }) as Payload)
    }

    fn import_rows(&self, _columns: &BTreeSet<T>, _rows: Vec<Row<T>>) -> Result<Payload> {
        Err(Error::not_implemented(&self.name, "import of materialized rows"))
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::expr::{Container, DataType, Expression, Predicate};
    use crate::relation::{MarkerKind, SortKey, UnaryOperation};
    use crate::tag::StringTag;
    use crate::EngineRef;

    fn tag(name: &str) -> StringTag {
        StringTag::new(name)
    }

    fn tags(names: &[&str]) -> BTreeSet<StringTag> {
        names.iter().map(|n| tag(n)).collect()
    }

    fn engine() -> EngineRef<StringTag> {
        EngineRef::new(SqlEngine::new("sql"))
    }

    fn emitter() -> SqlEngine<StringTag> {
        SqlEngine::new("sql")
    }

    fn sql_leaf(
        engine: &EngineRef<StringTag>,
        name: &str,
        columns: &[&str],
    ) -> Relation<StringTag> {
        Relation::leaf(name, engine.clone(), tags(columns), false, SqlTable::new(name))
    }

    fn greater_than(column: &str, value: i64) -> Predicate<StringTag> {
        Predicate::function(
            "gt",
            vec![
                Expression::reference(tag(column)),
                Expression::literal(value),
            ],
        )
    }

    fn emitted(relation: &Relation<StringTag>) -> String {
        emitter().to_executable(relation).unwrap().to_string()
    }

    #[test]
    fn bare_leaf_emits_a_plain_select() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x", "y"]);
        assert_eq!(emitted(&a), "SELECT x, y FROM a");
    }

    #[test]
    fn adjacent_operations_collapse_into_one_select() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x", "y"]);
        let relation = a
            .selection(greater_than("x", 10))
            .unwrap()
            .projection(tags(&["y"]))
            .unwrap();
        assert_eq!(emitted(&relation), "SELECT y FROM a WHERE x > 10");
    }

    #[test]
    fn selection_distributes_into_chain_branches() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x", "y"]);
        let b = sql_leaf(&e, "b", &["x", "y"]);
        let relation = a
            .chain(&b)
            .unwrap()
            .selection(greater_than("x", 10))
            .unwrap();

        let conformed = emitter().conform(&relation).unwrap();
        let marker = conformed.as_marker().unwrap();
        assert!(matches!(marker.kind, MarkerKind::Select(None)));
        let chain = marker.target.as_binary_op().unwrap();
        assert!(chain.operation.is_chain());
        for branch in [&chain.lhs, &chain.rhs] {
            let branch = branch.as_marker().unwrap();
            let selection = branch.target.as_unary_op().unwrap();
            assert!(selection.operation.is_selection());
            assert!(selection.target.is_leaf());
        }

        assert_eq!(
            emitted(&relation),
            "SELECT x, y FROM a WHERE x > 10 UNION ALL SELECT x, y FROM b WHERE x > 10"
        );
    }

    #[test]
    fn calculation_distributes_into_chain_branches() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x", "y"]);
        let b = sql_leaf(&e, "b", &["x", "y"]);
        let relation = a
            .chain(&b)
            .unwrap()
            .calculation(
                tag("t"),
                Expression::function(
                    "add",
                    vec![Expression::reference(tag("x")), Expression::literal(1i64)],
                    DataType::Integer,
                ),
            )
            .unwrap();

        assert_eq!(
            emitted(&relation),
            "SELECT x + 1 AS t, x, y FROM a UNION ALL SELECT x + 1 AS t, x, y FROM b"
        );
    }

    #[test]
    fn sort_bubbles_above_a_projection_that_drops_its_keys() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x", "y"]);
        let relation = a
            .sort(vec![SortKey::asc(Expression::reference(tag("x")))])
            .unwrap()
            .projection(tags(&["y"]))
            .unwrap();

        let conformed = emitter().conform(&relation).unwrap();
        assert_eq!(*conformed.columns(), tags(&["y"]));
        let marker = conformed.as_marker().unwrap();
        assert!(matches!(marker.kind, MarkerKind::Select(Some(_))));
        let sort = marker.target.as_unary_op().unwrap();
        assert!(sort.operation.is_sort());
        let projection = sort.target.as_unary_op().unwrap();
        match &projection.operation {
            UnaryOperation::Projection(p) => assert_eq!(p.columns, tags(&["x", "y"])),
            other => panic!("expected a widened projection, found {}", other.as_ref()),
        }

        assert_eq!(emitted(&relation), "SELECT y FROM a ORDER BY x");
    }

    #[test]
    fn joins_emit_equi_conditions_on_common_columns() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x", "y"]);
        let b = sql_leaf(&e, "b", &["x", "z"]);
        let relation = a.join(&b, None).unwrap();
        assert_eq!(
            emitted(&relation),
            "SELECT a.x, a.y, b.z FROM a JOIN b ON a.x = b.x"
        );
    }

    #[test]
    fn join_predicates_conjoin_into_where() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x", "y"]);
        let b = sql_leaf(&e, "b", &["x", "z"]);
        let relation = a.join(&b, Some(greater_than("z", 0))).unwrap();
        assert_eq!(
            emitted(&relation),
            "SELECT a.x, a.y, b.z FROM a JOIN b ON a.x = b.x WHERE b.z > 0"
        );
    }

    #[test]
    fn deduplication_emits_group_by_over_the_select_list() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x", "y"]);
        let relation = a.deduplication().unwrap();
        assert_eq!(emitted(&relation), "SELECT x, y FROM a GROUP BY x, y");
    }

    #[test]
    fn deduplicated_chain_becomes_union_distinct() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x", "y"]);
        let b = sql_leaf(&e, "b", &["x", "y"]);
        let relation = a.chain(&b).unwrap().deduplication().unwrap();
        assert_eq!(
            emitted(&relation),
            "SELECT x, y FROM a UNION SELECT x, y FROM b"
        );
    }

    #[test]
    fn slice_emits_limit_and_offset() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x", "y"]);
        let relation = a.slice(2, Some(5)).unwrap();
        assert_eq!(emitted(&relation), "SELECT x, y FROM a LIMIT 3 OFFSET 2");
    }

    #[test]
    fn selection_above_a_slice_seals_a_subquery() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x", "y"]);
        let relation = a
            .slice(0, Some(10))
            .unwrap()
            .selection(greater_than("x", 1))
            .unwrap();
        assert_eq!(
            emitted(&relation),
            "SELECT x, y FROM (SELECT x, y FROM a LIMIT 10) AS t0 WHERE x > 1"
        );
    }

    #[test]
    fn membership_lowers_to_between_and_in_lists() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x", "y"]);
        let range = a
            .selection(Predicate::in_container(
                Expression::reference(tag("x")),
                Container::range(0, 10, 1),
            ))
            .unwrap();
        assert_eq!(
            emitted(&range),
            "SELECT x, y FROM a WHERE x BETWEEN 0 AND 9"
        );

        let sequence = a
            .selection(Predicate::in_container(
                Expression::reference(tag("x")),
                Container::sequence(vec![
                    Expression::literal(1i64),
                    Expression::literal(3i64),
                ]),
            ))
            .unwrap();
        assert_eq!(emitted(&sequence), "SELECT x, y FROM a WHERE x IN (1, 3)");
    }

    #[test]
    fn empty_connectives_emit_their_identities() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x"]);
        let all = a.selection(Predicate::and(vec![])).unwrap();
        assert_eq!(emitted(&all), "SELECT x FROM a WHERE true");
        let none = a.selection(Predicate::or(vec![])).unwrap();
        assert_eq!(emitted(&none), "SELECT x FROM a WHERE false");
    }

    #[test]
    fn empty_sort_is_a_no_op() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x", "y"]);
        let relation = a.sort(vec![]).unwrap();
        assert_eq!(emitted(&relation), "SELECT x, y FROM a");
    }

    #[test]
    fn conform_is_a_fixpoint() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x", "y"]);
        let b = sql_leaf(&e, "b", &["x", "y"]);
        let relations = vec![
            a.selection(greater_than("x", 10)).unwrap(),
            a.chain(&b).unwrap().selection(greater_than("y", 0)).unwrap(),
            a.sort(vec![SortKey::asc(Expression::reference(tag("x")))])
                .unwrap()
                .projection(tags(&["y"]))
                .unwrap(),
            a.join(&b, None).unwrap().deduplication().unwrap(),
        ];
        let sql = emitter();
        for relation in relations {
            let once = sql.conform(&relation).unwrap();
            let twice = sql.conform(&once).unwrap();
            assert_eq!(*once.columns(), *relation.columns());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn equal_relations_conform_to_equal_trees() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x", "y"]);
        // the same conjunction, assembled in two different orders
        let p = greater_than("x", 10);
        let q = greater_than("y", 0);
        let one = a.selection(p.clone()).unwrap().selection(q.clone()).unwrap();
        let other = a.selection(q).unwrap().selection(p).unwrap();
        let sql = emitter();
        assert_eq!(sql.conform(&one).unwrap(), sql.conform(&other).unwrap());
    }

    #[test]
    fn execute_yields_the_emitted_query_as_payload() {
        let e = engine();
        let a = sql_leaf(&e, "a", &["x"]);
        let payload = e.get().execute(&a).unwrap();
        let executable = payload.downcast_ref::<SqlExecutable>().unwrap();
        assert_eq!(executable.query.to_string(), "SELECT x FROM a");
    }
}
