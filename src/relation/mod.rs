//! The relation expression tree.
//!
//! Relations are immutable value types shared through [Arc]; equality and
//! hashing are structural and ignore payload slots, so interned subtrees can
//! be shared freely across threads. The only post-construction mutation
//! anywhere in the tree is the single-assignment payload slot on leaves and
//! markers.

mod factory;
mod fold;
mod operations;

pub use fold::{fold_relation, RelationFold};
pub use operations::{
    BinaryOperation, Calculation, Join, MarkerKind, Projection, Selection, Slice, Sort, SortKey,
    UnaryOperation,
};

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use enum_as_inner::EnumAsInner;
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::engine::{EngineRef, Payload};
use crate::error::{Error, Result};
use crate::tag::ColumnTag;

/// Row-count bounds a factory can prove about its result.
///
/// `max_rows = None` means unbounded. The bounds drive short-circuits such as
/// "deduplicating a relation that can hold at most one row is the identity".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RowBounds {
    pub min_rows: usize,
    pub max_rows: Option<usize>,
}

impl RowBounds {
    pub fn unbounded() -> Self {
        RowBounds {
            min_rows: 0,
            max_rows: None,
        }
    }
}

/// The single-assignment slot payloads live in.
///
/// Attachment compare-exchanges from empty to value; readers observe either
/// nothing or a fully initialized payload. The slot does not take part in
/// value equality or hashing.
#[derive(Debug, Clone, Default)]
pub struct PayloadSlot(OnceCell<Payload>);

impl PayloadSlot {
    pub fn empty() -> Self {
        PayloadSlot(OnceCell::new())
    }

    pub fn attached(payload: Payload) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(payload);
        PayloadSlot(cell)
    }

    pub fn get(&self) -> Option<&Payload> {
        self.0.get()
    }

    /// Attach a payload to an empty slot; a second attachment is an
    /// invariant violation.
    pub fn attach(&self, payload: Payload) -> Result<()> {
        self.0
            .set(payload)
            .map_err(|_| Error::invariant("payload is already attached and may not be replaced"))
    }

    /// First attachment wins; every caller gets the surviving payload back.
    pub fn attach_or_get(&self, payload: Payload) -> Payload {
        self.0.get_or_init(|| payload).clone()
    }
}

impl PartialEq for PayloadSlot {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for PayloadSlot {}

impl Hash for PayloadSlot {
    fn hash<H: Hasher>(&self, _: &mut H) {}
}

/// An immutable node in the expression tree: a table with a defined column
/// set and a best-effort uniqueness bit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, EnumAsInner)]
pub enum Relation<T: ColumnTag> {
    Leaf(Arc<Leaf<T>>),
    UnaryOp(Arc<UnaryOpRelation<T>>),
    BinaryOp(Arc<BinaryOpRelation<T>>),
    Marker(Arc<MarkerRelation<T>>),
}

/// Engine-resident base data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Leaf<T: ColumnTag> {
    pub name: String,
    pub engine: EngineRef<T>,
    pub columns: BTreeSet<T>,
    pub unique: bool,
    #[serde(skip)]
    pub payload: PayloadSlot,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UnaryOpRelation<T: ColumnTag> {
    pub operation: UnaryOperation<T>,
    pub target: Relation<T>,
    pub columns: BTreeSet<T>,
    pub unique: bool,
    pub bounds: RowBounds,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BinaryOpRelation<T: ColumnTag> {
    pub operation: BinaryOperation<T>,
    pub lhs: Relation<T>,
    pub rhs: Relation<T>,
    pub columns: BTreeSet<T>,
    pub unique: bool,
    pub bounds: RowBounds,
}

/// An annotation on a target relation. For [MarkerKind::Transfer] the
/// marker's engine differs from the target's; all other markers share it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MarkerRelation<T: ColumnTag> {
    pub kind: MarkerKind<T>,
    pub target: Relation<T>,
    pub engine: EngineRef<T>,
    #[serde(skip)]
    pub payload: PayloadSlot,
}

impl<T: ColumnTag> MarkerRelation<T> {
    pub fn columns(&self) -> &BTreeSet<T> {
        match &self.kind {
            MarkerKind::Select(Some(output)) => output,
            _ => self.target.columns(),
        }
    }
}

impl<T: ColumnTag> Relation<T> {
    pub fn engine(&self) -> &EngineRef<T> {
        match self {
            Relation::Leaf(leaf) => &leaf.engine,
            Relation::UnaryOp(op) => op.target.engine(),
            Relation::BinaryOp(op) => op.lhs.engine(),
            Relation::Marker(marker) => &marker.engine,
        }
    }

    /// The column set; a deterministic function of kind and operands, fixed
    /// at construction.
    pub fn columns(&self) -> &BTreeSet<T> {
        match self {
            Relation::Leaf(leaf) => &leaf.columns,
            Relation::UnaryOp(op) => &op.columns,
            Relation::BinaryOp(op) => &op.columns,
            Relation::Marker(marker) => marker.columns(),
        }
    }

    /// Whether no duplicate rows are observable. Operations may weaken but
    /// never falsely strengthen this.
    pub fn is_unique(&self) -> bool {
        match self {
            Relation::Leaf(leaf) => leaf.unique,
            Relation::UnaryOp(op) => op.unique,
            Relation::BinaryOp(op) => op.unique,
            Relation::Marker(marker) => marker.target.is_unique(),
        }
    }

    pub fn bounds(&self) -> RowBounds {
        match self {
            Relation::Leaf(_) => RowBounds::unbounded(),
            Relation::UnaryOp(op) => op.bounds,
            Relation::BinaryOp(op) => op.bounds,
            Relation::Marker(marker) => marker.target.bounds(),
        }
    }

    /// The attached payload, if this is a leaf or marker that has one.
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Relation::Leaf(leaf) => leaf.payload.get(),
            Relation::Marker(marker) => marker.payload.get(),
            _ => None,
        }
    }

    /// Whether two handles point at the very same node (not merely
    /// structurally equal ones).
    pub fn same_node(a: &Relation<T>, b: &Relation<T>) -> bool {
        match (a, b) {
            (Relation::Leaf(x), Relation::Leaf(y)) => Arc::ptr_eq(x, y),
            (Relation::UnaryOp(x), Relation::UnaryOp(y)) => Arc::ptr_eq(x, y),
            (Relation::BinaryOp(x), Relation::BinaryOp(y)) => Arc::ptr_eq(x, y),
            (Relation::Marker(x), Relation::Marker(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }

    /// Short display label for logs.
    pub fn label(&self) -> String {
        match self {
            Relation::Leaf(leaf) => leaf.name.clone(),
            Relation::UnaryOp(op) => op.operation.as_ref().to_string(),
            Relation::BinaryOp(op) => op.operation.as_ref().to_string(),
            Relation::Marker(marker) => marker.kind.as_ref().to_string(),
        }
    }
}
