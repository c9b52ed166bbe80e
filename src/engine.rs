//! The contract any execution backend must satisfy.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::error::Result;
use crate::iteration::Row;
use crate::relation::{BinaryOperation, Relation, UnaryOperation};
use crate::tag::ColumnTag;

/// An engine-specific representation of rows, or of an executable description
/// of rows. The engine that produced a payload is the only one that can look
/// inside it.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// An execution backend: holds payloads, normalizes relation trees into its
/// canonical shape and drives conformed single-engine subtrees to payloads.
pub trait Engine<T: ColumnTag>: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Whether relations with this operation may be constructed on this
    /// engine. Factories consult this before allocating a node.
    fn supports_unary(&self, operation: &UnaryOperation<T>) -> bool;

    fn supports_binary(&self, operation: &BinaryOperation<T>) -> bool;

    fn supports_scalar_function(&self, name: &str) -> bool;

    fn supports_predicate_function(&self, name: &str) -> bool;

    /// Return a semantically equal relation in this engine's canonical shape.
    fn conform(&self, relation: &Relation<T>) -> Result<Relation<T>>;

    /// Drive a fully-conformed single-engine subtree to a payload.
    fn execute(&self, relation: &Relation<T>) -> Result<Payload>;

    /// Build a leaf payload from rows ferried in from another engine.
    ///
    /// Engines that cannot hold materialized rows return
    /// [crate::error::Reason::NotImplemented].
    fn import_rows(&self, columns: &BTreeSet<T>, rows: Vec<Row<T>>) -> Result<Payload>;

    /// Hook for engine-specific handling of an operation the generic
    /// machinery does not cover. `Ok(None)` means "no special handling".
    fn apply_custom_unary(
        &self,
        _operation: &UnaryOperation<T>,
        _target: &Relation<T>,
    ) -> Result<Option<Relation<T>>> {
        Ok(None)
    }
}

/// Shared handle to an engine.
///
/// Engines compare by identity: two handles are equal iff they point at the
/// same engine object. Hashing uses the engine name so structurally equal
/// relations hash equal across clones of the same handle.
#[derive(Clone)]
pub struct EngineRef<T: ColumnTag>(Arc<dyn Engine<T>>);

impl<T: ColumnTag> EngineRef<T> {
    pub fn new<E: Engine<T> + 'static>(engine: E) -> Self {
        EngineRef(Arc::new(engine))
    }

    pub fn get(&self) -> &dyn Engine<T> {
        self.0.as_ref()
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn same_engine(a: &EngineRef<T>, b: &EngineRef<T>) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl<T: ColumnTag> PartialEq for EngineRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: ColumnTag> Eq for EngineRef<T> {}

impl<T: ColumnTag> Hash for EngineRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name().hash(state);
    }
}

impl<T: ColumnTag> Debug for EngineRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EngineRef({})", self.0.name())
    }
}

impl<T: ColumnTag> Serialize for EngineRef<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.name())
    }
}
