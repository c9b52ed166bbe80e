//! Build, normalize and translate relational-algebra expression trees that
//! span multiple execution backends.
//!
//! The crate has three load-bearing parts:
//!
//! ```ascii
//!       factories (relation)
//!            │
//!            ▼
//!     Relation tree  ──────────► serde (tagged tree)
//!            │
//!     engine.conform
//!            │
//!            ▼
//!    canonical tree ── sql::SqlEngine ──► sqlparser query
//!            │                              (SELECT … UNION …)
//!     engine.execute
//!            │          iteration::IterationEngine ──► rows
//!            ▼
//!         payload
//! ```
//!
//! Trees that cross engines carry explicit transfer markers; a
//! [processor::Processor] walks such trees, executes each engine's subtree
//! on that engine and ferries intermediate payloads across.

pub mod engine;
mod error;
pub mod expr;
pub mod iteration;
pub mod processor;
pub mod relation;
pub mod sql;
mod tag;
mod utils;

pub use engine::{Engine, EngineRef, Payload};
pub use error::{Error, Reason, Result, WithErrorInfo};
pub use expr::{Container, DataType, Expression, Literal, Predicate};
pub use relation::{Relation, RowBounds, SortKey};
pub use tag::{ColumnTag, StringTag};

/// JSON serialization of a relation tree: one tag per node kind, stable
/// field names, engines by name. Payloads are not serialized; deserializing
/// a tree back needs an engine registry and is the host's affair.
pub fn json_of_relation<T: ColumnTag + serde::Serialize>(
    relation: &Relation<T>,
) -> Result<String> {
    serde_json::to_string(relation)
        .map_err(|e| Error::invariant(format!("relation tree failed to serialize: {e}")))
}
