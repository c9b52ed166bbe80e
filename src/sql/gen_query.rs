//! Translates canonical relation trees to [sqlparser] AST, from which the
//! string form is just `.to_string()`.

use std::collections::BTreeSet;

use itertools::Itertools;
use sqlparser::ast::{
    self as sql_ast, Ident, Join, JoinConstraint, JoinOperator, ObjectName, Select, SelectItem,
    SetExpr, TableAlias, TableFactor, TableWithJoins, Value,
};

use crate::error::{Error, Result};
use crate::relation::{MarkerKind, Relation, Slice};
use crate::tag::ColumnTag;

use super::conform::{reopen, Base, SelectBox};
use super::gen_expr::{
    translate_expression, translate_predicate, ColumnLowering, Context,
};
use super::{SqlExecutable, SqlTable};

pub(super) fn translate_relation<T: ColumnTag, L: ColumnLowering<T>>(
    relation: &Relation<T>,
    ctx: &mut Context<T, L>,
) -> Result<sql_ast::Query> {
    match relation {
        Relation::Leaf(_) => translate_source(relation, ctx),
        Relation::Marker(marker) => match &marker.kind {
            MarkerKind::Select(_) => {
                let select_box = reopen(marker)?;
                translate_box(select_box, ctx)
            }
            MarkerKind::Materialization(_) => {
                if let Some(payload) = marker.payload.get() {
                    if let Some(executable) = payload.downcast_ref::<SqlExecutable>() {
                        return Ok(executable.query.clone());
                    }
                }
                translate_relation(&marker.target, ctx)
            }
            MarkerKind::Transfer => Err(Error::invariant(
                "transfer markers must be resolved by a processor before emission",
            )),
        },
        _ => Err(Error::invariant(
            "only conformed relations can be emitted; conform the tree first",
        )),
    }
}

/// `SELECT <columns> FROM <source>` over a bare leaf or marker.
fn translate_source<T: ColumnTag, L: ColumnLowering<T>>(
    relation: &Relation<T>,
    ctx: &mut Context<T, L>,
) -> Result<sql_ast::Query> {
    let (factor, _, columns) = translate_from_item(relation, ctx)?;
    ctx.qualify = false;
    let projection = columns
        .iter()
        .map(|tag| ctx.lowering.select_item(tag, None))
        .collect();
    Ok(default_query(SetExpr::Select(Box::new(Select {
        projection,
        from: vec![TableWithJoins {
            relation: factor,
            joins: vec![],
        }],
        ..default_select()
    }))))
}

fn translate_box<T: ColumnTag, L: ColumnLowering<T>>(
    b: SelectBox<T>,
    ctx: &mut Context<T, L>,
) -> Result<sql_ast::Query> {
    if let Base::Chain(_) = &b.base {
        return translate_union(b, ctx);
    }

    let items = match b.base {
        Base::Source(item) => vec![item],
        Base::Join(items) => items,
        Base::Chain(_) => unreachable!(),
    };

    // FROM clause: a left-deep join over the items, equi-joined on the
    // columns they share with everything to their left.
    let mut seen_columns: BTreeSet<T> = BTreeSet::new();
    let mut from: Option<TableWithJoins> = None;
    ctx.qualify = items.len() > 1;
    for item in &items {
        let (factor, alias, columns) = translate_from_item(item, ctx)?;
        let join_keys: Vec<&T> = columns.iter().filter(|c| seen_columns.contains(c)).collect();
        for column in &columns {
            ctx.qualifiers
                .entry(column.clone())
                .or_insert_with(|| alias.clone());
        }
        match &mut from {
            None => {
                from = Some(TableWithJoins {
                    relation: factor,
                    joins: vec![],
                });
            }
            Some(from) => {
                let join_operator = if join_keys.is_empty() {
                    JoinOperator::CrossJoin
                } else {
                    let condition = join_keys
                        .iter()
                        .map(|tag| {
                            let left = ctx.qualifiers[*tag].clone();
                            ctx.lowering.join_equality(tag, &left, &alias)
                        })
                        .reduce(|left, right| sql_ast::Expr::BinaryOp {
                            left: Box::new(left),
                            op: sql_ast::BinaryOperator::And,
                            right: Box::new(right),
                        })
                        .expect("at least one join key");
                    JoinOperator::Inner(JoinConstraint::On(condition))
                };
                from.joins.push(Join {
                    relation: factor,
                    join_operator,
                });
            }
        }
        seen_columns.extend(columns);
    }
    let from = from.ok_or_else(|| Error::invariant("a select needs at least one source"))?;

    for calculation in &b.calculations {
        ctx.calculations
            .insert(calculation.tag.clone(), calculation.expr.clone());
    }
    let computed: BTreeSet<T> = b.calculations.iter().map(|c| c.tag.clone()).collect();

    // WHERE from the conjoined selections
    let selection = b
        .selections
        .iter()
        .map(|p| translate_predicate(p, ctx))
        .fold_ok(None, |acc: Option<sql_ast::Expr>, part| {
            Some(match acc {
                None => part,
                Some(acc) => sql_ast::Expr::BinaryOp {
                    left: Box::new(acc),
                    op: sql_ast::BinaryOperator::And,
                    right: Box::new(part),
                },
            })
        })?;

    // SELECT list from the declared output, the projection, or everything
    let output_columns: BTreeSet<T> = match b.output.as_ref().or(b.projection.as_ref()) {
        Some(columns) => columns.clone(),
        None => {
            let mut all = seen_columns.clone();
            all.extend(computed.iter().cloned());
            all
        }
    };
    let mut projection = Vec::new();
    let mut projected_exprs = Vec::new();
    for tag in &output_columns {
        if computed.contains(tag) {
            let expr = translate_expression(&ctx.calculations[tag].clone(), ctx)?;
            projected_exprs.push(expr.clone());
            projection.push(SelectItem::ExprWithAlias {
                expr,
                alias: Ident::new(tag.qualified_name()),
            });
        } else {
            let expr = ctx.lowering.column_expr(tag, ctx.qualifier_of(tag));
            projected_exprs.push(expr);
            projection.push(ctx.lowering.select_item(tag, ctx.qualifier_of(tag)));
        }
    }

    // deduplication becomes GROUP BY over the whole select list
    let group_by = if b.distinct { projected_exprs } else { vec![] };

    let order_by = match &b.sort {
        Some(sort) => sort
            .keys
            .iter()
            .map(|key| {
                let expr = translate_expression(&key.expr, ctx)?;
                Ok(ctx.lowering.sort_key(key, expr))
            })
            .try_collect()?,
        None => vec![],
    };

    let (limit, offset) = limit_offset(&b.slice);

    Ok(sql_ast::Query {
        order_by,
        limit,
        offset,
        ..default_query(SetExpr::Select(Box::new(Select {
            projection,
            from: vec![from],
            selection,
            group_by,
            ..default_select()
        })))
    })
}

/// A chain becomes `UNION ALL`; a deduplicated chain becomes `UNION`.
fn translate_union<T: ColumnTag, L: ColumnLowering<T>>(
    b: SelectBox<T>,
    ctx: &mut Context<T, L>,
) -> Result<sql_ast::Query> {
    if !b.calculations.is_empty() || !b.selections.is_empty() || b.projection.is_some() {
        return Err(Error::invariant(
            "row-wise operations over a chain must be distributed into its branches",
        ));
    }
    let branches = match b.base {
        Base::Chain(branches) => branches,
        _ => unreachable!(),
    };

    let lowering = ctx.lowering;
    let mut queries = branches.iter().map(|branch| {
        let mut branch_ctx = Context::new(lowering);
        translate_relation(branch, &mut branch_ctx)
    });
    let first = queries
        .next()
        .ok_or_else(|| Error::invariant("a chain needs at least one branch"))??;

    let mut body = query_to_set_expr(first, ctx);
    for query in queries {
        body = Box::new(SetExpr::SetOperation {
            op: sql_ast::SetOperator::Union,
            set_quantifier: if b.distinct {
                sql_ast::SetQuantifier::None
            } else {
                sql_ast::SetQuantifier::All
            },
            left: body,
            right: query_to_set_expr(query?, ctx),
        });
    }

    // sorting a union references output column names, unqualified
    ctx.qualify = false;
    let order_by = match &b.sort {
        Some(sort) => sort
            .keys
            .iter()
            .map(|key| {
                let expr = translate_expression(&key.expr, ctx)?;
                Ok(ctx.lowering.sort_key(key, expr))
            })
            .try_collect()?,
        None => vec![],
    };
    let (limit, offset) = limit_offset(&b.slice);

    Ok(sql_ast::Query {
        order_by,
        limit,
        offset,
        ..default_query(*body)
    })
}

fn translate_from_item<T: ColumnTag, L: ColumnLowering<T>>(
    relation: &Relation<T>,
    ctx: &mut Context<T, L>,
) -> Result<(TableFactor, String, BTreeSet<T>)> {
    let columns = relation.columns().clone();
    match relation {
        Relation::Leaf(leaf) => {
            // a cached executable reads as a derived table
            if let Some(executable) = leaf
                .payload
                .get()
                .and_then(|p| p.downcast_ref::<SqlExecutable>())
            {
                let alias = ctx.aliases.gen();
                let factor = TableFactor::Derived {
                    lateral: false,
                    subquery: Box::new(executable.query.clone()),
                    alias: Some(simple_table_alias(Ident::new(alias.clone()))),
                };
                return Ok((factor, alias, columns));
            }
            // an attached descriptor can point the leaf at another table
            let table = leaf
                .payload
                .get()
                .and_then(|p| p.downcast_ref::<SqlTable>())
                .map(|t| t.table.clone())
                .unwrap_or_else(|| leaf.name.clone());
            let factor = TableFactor::Table {
                name: ObjectName(vec![Ident::new(table.clone())]),
                alias: None,
                args: None,
                with_hints: vec![],
            };
            Ok((factor, table, columns))
        }
        Relation::Marker(_) => {
            // a subquery resolves its own names
            let mut inner_ctx = Context::new(ctx.lowering);
            let subquery = translate_relation(relation, &mut inner_ctx)?;
            let alias = ctx.aliases.gen();
            let factor = TableFactor::Derived {
                lateral: false,
                subquery: Box::new(subquery),
                alias: Some(simple_table_alias(Ident::new(alias.clone()))),
            };
            Ok((factor, alias, columns))
        }
        _ => Err(Error::invariant(
            "only leaves and markers can appear in a conformed FROM clause",
        )),
    }
}

fn limit_offset(slice: &Option<Slice>) -> (Option<sql_ast::Expr>, Option<sql_ast::Offset>) {
    let Some(slice) = slice else {
        return (None, None);
    };
    let limit = slice.len().map(|len| expr_of_usize(len));
    let offset = (slice.start > 0).then(|| sql_ast::Offset {
        value: expr_of_usize(slice.start),
        rows: sql_ast::OffsetRows::None,
    });
    (limit, offset)
}

fn expr_of_usize(number: usize) -> sql_ast::Expr {
    sql_ast::Expr::Value(Value::Number(number.to_string(), false))
}

fn default_query(body: SetExpr) -> sql_ast::Query {
    sql_ast::Query {
        with: None,
        body: Box::new(body),
        order_by: Vec::new(),
        limit: None,
        offset: None,
        fetch: None,
        locks: Vec::new(),
    }
}

fn default_select() -> Select {
    Select {
        distinct: None,
        top: None,
        projection: Vec::new(),
        into: None,
        from: Vec::new(),
        lateral_views: Vec::new(),
        selection: None,
        group_by: Vec::new(),
        cluster_by: Vec::new(),
        distribute_by: Vec::new(),
        sort_by: Vec::new(),
        having: None,
        named_window: Vec::new(),
        qualify: None,
    }
}

fn simple_table_alias(name: Ident) -> TableAlias {
    TableAlias {
        name,
        columns: Vec::new(),
    }
}

fn query_to_set_expr<T: ColumnTag, L: ColumnLowering<T>>(
    query: sql_ast::Query,
    ctx: &mut Context<T, L>,
) -> Box<SetExpr> {
    let is_simple = query.with.is_none()
        && query.order_by.is_empty()
        && query.limit.is_none()
        && query.offset.is_none()
        && query.fetch.is_none()
        && query.locks.is_empty();

    if is_simple {
        return query.body;
    }

    // not a plain SELECT, so wrap it into `SELECT * FROM (query)`
    Box::new(SetExpr::Select(Box::new(Select {
        projection: vec![SelectItem::Wildcard(
            sql_ast::WildcardAdditionalOptions::default(),
        )],
        from: vec![TableWithJoins {
            relation: TableFactor::Derived {
                lateral: false,
                subquery: Box::new(query),
                alias: Some(simple_table_alias(Ident::new(ctx.aliases.gen()))),
            },
            joins: vec![],
        }],
        ..default_select()
    })))
}
