//! Compiles column expressions into [sqlparser] nodes.

use std::collections::HashMap;
use std::fmt::Debug;

use itertools::Itertools;
use sqlparser::ast::{
    self as sql_ast, BinaryOperator, Function, FunctionArg, FunctionArgExpr, Ident, ObjectName,
    OrderByExpr, SelectItem, UnaryOperator, Value,
};

use crate::error::{Error, Result};
use crate::expr::{Container, Expression, Literal, Predicate};
use crate::relation::SortKey;
use crate::tag::ColumnTag;
use crate::utils::NameGenerator;

/// How many values a range container may expand into before emission refuses.
const MAX_RANGE_EXPANSION: i64 = 1000;

/// The logical-column hooks: how a column tag appears inside emitted
/// expressions.
///
/// The default [ColumnElement] maps one tag to one backend column. Hosts with
/// richer encodings (a region spread over several stored values, say)
/// substitute their own implementation; everything is resolved at compile
/// time, no dispatch happens per column reference.
pub trait ColumnLowering<T: ColumnTag>: Debug + Send + Sync + 'static {
    fn column_expr(&self, tag: &T, qualifier: Option<&str>) -> sql_ast::Expr {
        let name = Ident::new(tag.qualified_name());
        match qualifier {
            Some(q) => sql_ast::Expr::CompoundIdentifier(vec![Ident::new(q), name]),
            None => sql_ast::Expr::Identifier(name),
        }
    }

    fn select_item(&self, tag: &T, qualifier: Option<&str>) -> SelectItem {
        SelectItem::UnnamedExpr(self.column_expr(tag, qualifier))
    }

    fn join_equality(&self, tag: &T, left: &str, right: &str) -> sql_ast::Expr {
        sql_ast::Expr::BinaryOp {
            left: Box::new(self.column_expr(tag, Some(left))),
            op: BinaryOperator::Eq,
            right: Box::new(self.column_expr(tag, Some(right))),
        }
    }

    fn sort_key(&self, key: &SortKey<T>, expr: sql_ast::Expr) -> OrderByExpr {
        OrderByExpr {
            expr,
            // default order is ASC, so there is no need to emit it
            asc: if key.ascending { None } else { Some(false) },
            nulls_first: None,
        }
    }
}

/// One tag, one backend column.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnElement;

impl<T: ColumnTag> ColumnLowering<T> for ColumnElement {}

/// Shared state of one emission run.
pub(super) struct Context<'a, T: ColumnTag, L: ColumnLowering<T>> {
    pub lowering: &'a L,
    /// Which FROM item provides each column.
    pub qualifiers: HashMap<T, String>,
    /// Computed columns, inlined wherever they are referenced.
    pub calculations: HashMap<T, Expression<T>>,
    /// False while a single FROM item makes prefixes noise.
    pub qualify: bool,
    pub aliases: NameGenerator,
}

impl<'a, T: ColumnTag, L: ColumnLowering<T>> Context<'a, T, L> {
    pub fn new(lowering: &'a L) -> Self {
        Context {
            lowering,
            qualifiers: HashMap::new(),
            calculations: HashMap::new(),
            qualify: false,
            aliases: NameGenerator::new("t"),
        }
    }

    pub fn qualifier_of(&self, tag: &T) -> Option<&str> {
        if self.qualify {
            self.qualifiers.get(tag).map(|q| q.as_str())
        } else {
            None
        }
    }
}

pub(super) fn translate_expression<T: ColumnTag, L: ColumnLowering<T>>(
    expr: &Expression<T>,
    ctx: &Context<T, L>,
) -> Result<sql_ast::Expr> {
    Ok(match expr {
        Expression::Literal { value, .. } => translate_literal(value),
        Expression::Reference(tag) => {
            if let Some(computed) = ctx.calculations.get(tag) {
                translate_expression(computed, ctx)?
            } else {
                ctx.lowering.column_expr(tag, ctx.qualifier_of(tag))
            }
        }
        Expression::Function { name, args, .. } => {
            let args: Vec<sql_ast::Expr> = args
                .iter()
                .map(|a| translate_expression(a, ctx))
                .try_collect()?;
            translate_function_call(name, args)?
        }
    })
}

pub(super) fn translate_predicate<T: ColumnTag, L: ColumnLowering<T>>(
    predicate: &Predicate<T>,
    ctx: &Context<T, L>,
) -> Result<sql_ast::Expr> {
    Ok(match predicate {
        Predicate::Literal(b) => sql_ast::Expr::Value(Value::Boolean(*b)),
        Predicate::Reference(tag) => ctx.lowering.column_expr(tag, ctx.qualifier_of(tag)),
        Predicate::Function { name, args } => {
            let args: Vec<sql_ast::Expr> = args
                .iter()
                .map(|a| translate_expression(a, ctx))
                .try_collect()?;
            translate_function_call(name, args)?
        }
        Predicate::Not(inner) => sql_ast::Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(sql_ast::Expr::Nested(Box::new(translate_predicate(
                inner, ctx,
            )?))),
        },
        Predicate::And(inner) => {
            translate_connective(inner, ctx, BinaryOperator::And, Value::Boolean(true))?
        }
        Predicate::Or(inner) => {
            translate_connective(inner, ctx, BinaryOperator::Or, Value::Boolean(false))?
        }
        Predicate::InContainer { member, container } => {
            translate_membership(member, container, ctx)?
        }
    })
}

fn translate_connective<T: ColumnTag, L: ColumnLowering<T>>(
    predicates: &[Predicate<T>],
    ctx: &Context<T, L>,
    op: BinaryOperator,
    empty: Value,
) -> Result<sql_ast::Expr> {
    let mut parts = predicates.iter();
    let Some(first) = parts.next() else {
        return Ok(sql_ast::Expr::Value(empty));
    };
    let mut expr = translate_predicate(first, ctx)?;
    for part in parts {
        expr = sql_ast::Expr::BinaryOp {
            left: Box::new(expr),
            op: op.clone(),
            right: Box::new(translate_predicate(part, ctx)?),
        };
    }
    Ok(expr)
}

fn translate_membership<T: ColumnTag, L: ColumnLowering<T>>(
    member: &Expression<T>,
    container: &Container<T>,
    ctx: &Context<T, L>,
) -> Result<sql_ast::Expr> {
    let member = translate_expression(member, ctx)?;
    Ok(match container {
        Container::ExpressionSequence(items) => sql_ast::Expr::InList {
            expr: Box::new(member),
            list: items
                .iter()
                .map(|i| translate_expression(i, ctx))
                .try_collect()?,
            negated: false,
        },
        Container::RangeLiteral { start, stop, step } => {
            if *step == 1 {
                sql_ast::Expr::Between {
                    expr: Box::new(member),
                    negated: false,
                    low: Box::new(translate_literal(&Literal::Integer(*start))),
                    high: Box::new(translate_literal(&Literal::Integer(*stop - 1))),
                }
            } else {
                if *step == 0 {
                    return Err(Error::invariant("range step must not be zero"));
                }
                let count = (stop - start) / step;
                if count > MAX_RANGE_EXPANSION {
                    return Err(Error::invariant(format!(
                        "range of {count} values is too large to expand into SQL"
                    )));
                }
                let mut list = Vec::new();
                let mut value = *start;
                while (*step > 0 && value < *stop) || (*step < 0 && value > *stop) {
                    list.push(translate_literal(&Literal::Integer(value)));
                    value += step;
                }
                sql_ast::Expr::InList {
                    expr: Box::new(member),
                    list,
                    negated: false,
                }
            }
        }
    })
}

pub(super) fn translate_literal(literal: &Literal) -> sql_ast::Expr {
    sql_ast::Expr::Value(match literal {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Integer(i) => Value::Number(format!("{i}"), false),
        Literal::Float(f) => Value::Number(format!("{f:?}"), false),
        Literal::String(s) => Value::SingleQuotedString(s.clone()),
    })
}

fn translate_function_call(name: &str, mut args: Vec<sql_ast::Expr>) -> Result<sql_ast::Expr> {
    // Operators the iteration prelude also knows go out as operators; every
    // other name passes through as a function call for the database to
    // resolve.
    let op = match name {
        "eq" => Some(BinaryOperator::Eq),
        "ne" => Some(BinaryOperator::NotEq),
        "lt" => Some(BinaryOperator::Lt),
        "le" => Some(BinaryOperator::LtEq),
        "gt" => Some(BinaryOperator::Gt),
        "ge" => Some(BinaryOperator::GtEq),
        "add" => Some(BinaryOperator::Plus),
        "sub" => Some(BinaryOperator::Minus),
        "mul" => Some(BinaryOperator::Multiply),
        "div" => Some(BinaryOperator::Divide),
        _ => None,
    };
    if let Some(op) = op {
        if args.len() == 2 {
            let right = args.pop().expect("two arguments");
            let left = args.pop().expect("two arguments");
            return Ok(sql_ast::Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }
        return Err(Error::column(format!(
            "operator `{name}` expects exactly two arguments, found {}",
            args.len()
        )));
    }
    Ok(sql_ast::Expr::Function(Function {
        name: ObjectName(vec![Ident::new(name)]),
        args: args
            .into_iter()
            .map(|a| FunctionArg::Unnamed(FunctionArgExpr::Expr(a)))
            .collect(),
        over: None,
        distinct: false,
        special: false,
        order_by: vec![],
    }))
}
