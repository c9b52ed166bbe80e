//! Driving multi-engine trees to payloads.
//!
//! A processor walks a tree, executes each maximal single-engine subtree on
//! its engine and ferries intermediate results across [Transfer
//! boundaries](MarkerKind::Transfer). The one hook a host must supply is the
//! ferry itself; everything else is provided.

use std::marker::PhantomData;

use crate::engine::{EngineRef, Payload};
use crate::error::Result;
use crate::relation::{fold_relation, MarkerKind, Relation, RelationFold};
use crate::tag::ColumnTag;

pub trait Processor<T: ColumnTag> {
    /// Bridge one engine boundary: `payload` is the evaluated source subtree
    /// on its own engine; the result must be a payload the destination
    /// engine can attach to a leaf. Most hosts export rows from the source
    /// payload and hand them to [crate::engine::Engine::import_rows].
    fn transfer(
        &mut self,
        source: &Relation<T>,
        payload: &Payload,
        destination: &EngineRef<T>,
    ) -> Result<Payload>;

    /// Evaluate a (possibly multi-engine) relation tree to a payload.
    ///
    /// Idempotent on already-evaluated trees: a materialization whose slot
    /// is filled short-circuits without touching its engine again, and
    /// concurrent processors racing on the same marker see exactly one
    /// effective execution.
    fn process(&mut self, relation: &Relation<T>) -> Result<Payload>
    where
        Self: Sized,
    {
        if let Some(marker) = relation.as_marker() {
            if marker.kind.is_materialization() {
                if let Some(payload) = marker.payload.get() {
                    log::debug!("materialization cache hit for `{}`", relation.label());
                    return Ok(payload.clone());
                }
                let payload = process_tree(self, &marker.target)?;
                return Ok(marker.payload.attach_or_get(payload));
            }
        }
        process_tree(self, relation)
    }
}

fn process_tree<T: ColumnTag, P: Processor<T>>(
    processor: &mut P,
    relation: &Relation<T>,
) -> Result<Payload> {
    let mut resolver = BoundaryResolver {
        processor,
        _tag: PhantomData,
    };
    let resolved = resolver.fold_relation(relation.clone())?;
    let engine = resolved.engine().clone();
    log::debug!(
        "processing `{}` on engine `{}`",
        resolved.label(),
        engine.name()
    );
    let conformed = engine.get().conform(&resolved)?;
    engine.get().execute(&conformed)
}

/// Rewrites engine boundaries into engine-local leaves: a transfer becomes a
/// leaf holding the ferried payload, a materialization becomes a leaf
/// holding its cache. An unfilled materialization is evaluated through the
/// node the caller shares, so the fill lands in that node's slot and every
/// later walk short-circuits on it.
struct BoundaryResolver<'a, T: ColumnTag, P: Processor<T>> {
    processor: &'a mut P,
    _tag: PhantomData<T>,
}

impl<T: ColumnTag, P: Processor<T>> RelationFold<T> for BoundaryResolver<'_, T, P> {
    fn fold_relation(&mut self, relation: Relation<T>) -> Result<Relation<T>> {
        if let Relation::Marker(marker) = &relation {
            match &marker.kind {
                MarkerKind::Transfer => {
                    let source_payload = self.processor.process(&marker.target)?;
                    let payload = self.processor.transfer(
                        &marker.target,
                        &source_payload,
                        &marker.engine,
                    )?;
                    log::debug!(
                        "transfer `{}` -> `{}` complete",
                        marker.target.engine().name(),
                        marker.engine.name()
                    );
                    return Ok(Relation::leaf(
                        format!("transfer_{}", marker.target.label()),
                        marker.engine.clone(),
                        marker.target.columns().clone(),
                        marker.target.is_unique(),
                        payload,
                    ));
                }
                MarkerKind::Materialization(name) => {
                    let payload = match marker.payload.get() {
                        Some(payload) => payload.clone(),
                        // evaluate through the marker itself: process fills
                        // the slot of this very node, which the caller still
                        // holds
                        None => self.processor.process(&relation)?,
                    };
                    let name = name
                        .clone()
                        .unwrap_or_else(|| marker.target.label());
                    return Ok(Relation::leaf(
                        name,
                        marker.engine.clone(),
                        marker.target.columns().clone(),
                        marker.target.is_unique(),
                        payload,
                    ));
                }
                MarkerKind::Select(_) => {}
            }
        }
        fold_relation(self, relation)
    }
}
