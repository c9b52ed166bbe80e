//! Column expressions: scalar expressions, predicates and containers.
//!
//! These are the values relations compute over. Each family is a closed sum;
//! all dispatch is exhaustive pattern matching.

mod literal;

pub use literal::{DataType, Literal};

use std::collections::BTreeSet;

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::engine::EngineRef;
use crate::tag::ColumnTag;

/// A scalar expression over the columns of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumAsInner)]
pub enum Expression<T: ColumnTag> {
    Literal {
        value: Literal,
        data_type: DataType,
    },
    Reference(T),
    Function {
        name: String,
        args: Vec<Expression<T>>,
        data_type: DataType,
    },
}

/// A boolean expression over the columns of a relation.
///
/// An empty [Predicate::And] is true; an empty [Predicate::Or] is false.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumAsInner)]
pub enum Predicate<T: ColumnTag> {
    Literal(bool),
    Reference(T),
    Function {
        name: String,
        args: Vec<Expression<T>>,
    },
    Not(Box<Predicate<T>>),
    And(Vec<Predicate<T>>),
    Or(Vec<Predicate<T>>),
    InContainer {
        member: Expression<T>,
        container: Container<T>,
    },
}

/// A container a scalar can be tested for membership in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumAsInner)]
pub enum Container<T: ColumnTag> {
    ExpressionSequence(Vec<Expression<T>>),
    /// Half-open integer range, `stop` exclusive.
    RangeLiteral { start: i64, stop: i64, step: i64 },
}

impl<T: ColumnTag> Expression<T> {
    pub fn literal<L: Into<Literal>>(value: L) -> Self {
        let value = value.into();
        let data_type = value.data_type();
        Expression::Literal { value, data_type }
    }

    pub fn reference(tag: T) -> Self {
        Expression::Reference(tag)
    }

    pub fn function<S: Into<String>>(
        name: S,
        args: Vec<Expression<T>>,
        data_type: DataType,
    ) -> Self {
        Expression::Function {
            name: name.into(),
            args,
            data_type,
        }
    }

    /// The set of column tags this expression reads.
    pub fn columns(&self) -> BTreeSet<T> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    pub(crate) fn collect_columns(&self, out: &mut BTreeSet<T>) {
        match self {
            Expression::Literal { .. } => {}
            Expression::Reference(tag) => {
                out.insert(tag.clone());
            }
            Expression::Function { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Expression::Literal { data_type, .. } => *data_type,
            // Tags do not carry a type; the host's schema does.
            Expression::Reference(_) => DataType::Unknown,
            Expression::Function { data_type, .. } => *data_type,
        }
    }

    pub fn is_supported_by(&self, engine: &EngineRef<T>) -> bool {
        match self {
            Expression::Literal { .. } | Expression::Reference(_) => true,
            Expression::Function { name, args, .. } => {
                engine.get().supports_scalar_function(name)
                    && args.iter().all(|a| a.is_supported_by(engine))
            }
        }
    }
}

impl<T: ColumnTag> Predicate<T> {
    pub fn function<S: Into<String>>(name: S, args: Vec<Expression<T>>) -> Self {
        Predicate::Function {
            name: name.into(),
            args,
        }
    }

    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Conjunction; nested conjunctions are flattened.
    pub fn and(predicates: Vec<Predicate<T>>) -> Self {
        let mut flat = Vec::with_capacity(predicates.len());
        for p in predicates {
            match p {
                Predicate::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Predicate::And(flat)
    }

    /// Disjunction; nested disjunctions are flattened.
    pub fn or(predicates: Vec<Predicate<T>>) -> Self {
        let mut flat = Vec::with_capacity(predicates.len());
        for p in predicates {
            match p {
                Predicate::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Predicate::Or(flat)
    }

    pub fn in_container(member: Expression<T>, container: Container<T>) -> Self {
        Predicate::InContainer { member, container }
    }

    pub fn columns(&self) -> BTreeSet<T> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    pub(crate) fn collect_columns(&self, out: &mut BTreeSet<T>) {
        match self {
            Predicate::Literal(_) => {}
            Predicate::Reference(tag) => {
                out.insert(tag.clone());
            }
            Predicate::Function { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
            Predicate::Not(inner) => inner.collect_columns(out),
            Predicate::And(inner) | Predicate::Or(inner) => {
                for p in inner {
                    p.collect_columns(out);
                }
            }
            Predicate::InContainer { member, container } => {
                member.collect_columns(out);
                container.collect_columns(out);
            }
        }
    }

    pub fn is_supported_by(&self, engine: &EngineRef<T>) -> bool {
        match self {
            Predicate::Literal(_) | Predicate::Reference(_) => true,
            Predicate::Function { name, args } => {
                engine.get().supports_predicate_function(name)
                    && args.iter().all(|a| a.is_supported_by(engine))
            }
            Predicate::Not(inner) => inner.is_supported_by(engine),
            Predicate::And(inner) | Predicate::Or(inner) => {
                inner.iter().all(|p| p.is_supported_by(engine))
            }
            Predicate::InContainer { member, container } => {
                member.is_supported_by(engine) && container.is_supported_by(engine)
            }
        }
    }
}

impl<T: ColumnTag> Container<T> {
    pub fn sequence(items: Vec<Expression<T>>) -> Self {
        Container::ExpressionSequence(items)
    }

    pub fn range(start: i64, stop: i64, step: i64) -> Self {
        Container::RangeLiteral { start, stop, step }
    }

    pub fn columns(&self) -> BTreeSet<T> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    pub(crate) fn collect_columns(&self, out: &mut BTreeSet<T>) {
        match self {
            Container::ExpressionSequence(items) => {
                for item in items {
                    item.collect_columns(out);
                }
            }
            Container::RangeLiteral { .. } => {}
        }
    }

    pub fn is_supported_by(&self, engine: &EngineRef<T>) -> bool {
        match self {
            Container::ExpressionSequence(items) => {
                items.iter().all(|i| i.is_supported_by(engine))
            }
            Container::RangeLiteral { .. } => true,
        }
    }
}
