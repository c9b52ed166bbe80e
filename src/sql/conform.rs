//! Commutation-driven normalization into the canonical SELECT layering.
//!
//! A subtree is rebuilt bottom-up through a [SelectBox]: each operation is
//! absorbed into the current box when it commutes into its canonical layer,
//! otherwise the box is sealed behind a [Select marker](MarkerKind::Select)
//! and becomes a subquery. The canonical layering, root to leaves, is
//!
//! ```text
//! Select · Slice? · Sort? · Dedup? · Projection? · Selection* · Calculation*
//!        · (Join-tree of Leaves/Markers | Chain of conformed branches)
//! ```

use std::collections::BTreeSet;

use itertools::Itertools;

use crate::error::{Error, Result};
use crate::expr::Predicate;
use crate::relation::{
    BinaryOperation, Calculation, MarkerKind, MarkerRelation, Relation, Slice, Sort,
    UnaryOperation,
};
use crate::tag::ColumnTag;

/// One SELECT statement under construction.
pub(super) struct SelectBox<T: ColumnTag> {
    pub base: Base<T>,
    /// In construction order; later calculations may read earlier ones.
    pub calculations: Vec<Calculation<T>>,
    pub selections: Vec<Predicate<T>>,
    /// The interior projection. Widened past the declared output when sort
    /// keys fall outside it.
    pub projection: Option<BTreeSet<T>>,
    /// Declared narrow output, recorded on the sealing Select marker.
    pub output: Option<BTreeSet<T>>,
    pub distinct: bool,
    pub sort: Option<Sort<T>>,
    pub slice: Option<Slice>,
}

pub(super) enum Base<T: ColumnTag> {
    /// A single leaf or marker usable as a FROM item.
    Source(Relation<T>),
    /// Two or more FROM items; equi-join keys are their common columns.
    Join(Vec<Relation<T>>),
    /// Conformed branches of a union.
    Chain(Vec<Relation<T>>),
}

impl<T: ColumnTag> SelectBox<T> {
    fn source(relation: Relation<T>) -> Self {
        SelectBox {
            base: Base::Source(relation),
            calculations: Vec::new(),
            selections: Vec::new(),
            projection: None,
            output: None,
            distinct: false,
            sort: None,
            slice: None,
        }
    }

    fn is_trivial(&self) -> bool {
        matches!(self.base, Base::Source(_))
            && self.calculations.is_empty()
            && self.selections.is_empty()
            && self.projection.is_none()
            && self.output.is_none()
            && !self.distinct
            && self.sort.is_none()
            && self.slice.is_none()
    }

    /// Whether this box can dissolve into an enclosing join.
    fn is_join_mergeable(&self) -> bool {
        !matches!(self.base, Base::Chain(_))
            && self.projection.is_none()
            && self.output.is_none()
            && !self.distinct
            && self.sort.is_none()
            && self.slice.is_none()
    }
}

/// Normalize a relation tree into the SQL engine's canonical shape.
pub(super) fn conform<T: ColumnTag>(relation: &Relation<T>) -> Result<Relation<T>> {
    seal(conform_box(relation)?)
}

fn conform_box<T: ColumnTag>(relation: &Relation<T>) -> Result<SelectBox<T>> {
    Ok(match relation {
        Relation::Leaf(_) => SelectBox::source(relation.clone()),
        Relation::Marker(marker) => match &marker.kind {
            // an already-conformed subquery reopens, so conform is a fixpoint
            MarkerKind::Select(_) => reopen(marker)?,
            MarkerKind::Transfer => SelectBox::source(relation.clone()),
            MarkerKind::Materialization(name) => {
                if marker.payload.get().is_some() {
                    // the cached payload belongs to the tree as built
                    SelectBox::source(relation.clone())
                } else {
                    let target = conform(&marker.target)?;
                    if target == marker.target {
                        SelectBox::source(relation.clone())
                    } else {
                        SelectBox::source(target.materialization(name.clone()))
                    }
                }
            }
        },
        Relation::UnaryOp(node) => {
            let inner = conform_box(&node.target)?;
            push_unary(inner, &node.operation)?
        }
        Relation::BinaryOp(node) => match &node.operation {
            BinaryOperation::Join(join) => {
                let lhs = conform_box(&node.lhs)?;
                let rhs = conform_box(&node.rhs)?;
                merge_join(lhs, rhs, join.predicate.clone())?
            }
            BinaryOperation::Chain => {
                let mut branches = Vec::new();
                collect_chain_branches(&node.lhs, &mut branches)?;
                collect_chain_branches(&node.rhs, &mut branches)?;
                SelectBox {
                    base: Base::Chain(branches),
                    ..SelectBox::source(relation.clone())
                }
            }
        },
    })
}

/// Conform one union branch, splicing nested unions into list form.
fn collect_chain_branches<T: ColumnTag>(
    branch: &Relation<T>,
    out: &mut Vec<Relation<T>>,
) -> Result<()> {
    let conformed = conform(branch)?;
    if let Some(marker) = conformed.as_marker() {
        if matches!(marker.kind, MarkerKind::Select(None)) {
            if let Some(node) = marker.target.as_binary_op() {
                if node.operation.is_chain() {
                    collect_chain_branches(&node.lhs, out)?;
                    collect_chain_branches(&node.rhs, out)?;
                    return Ok(());
                }
            }
        }
    }
    out.push(conformed);
    Ok(())
}

fn push_unary<T: ColumnTag>(
    mut b: SelectBox<T>,
    operation: &UnaryOperation<T>,
) -> Result<SelectBox<T>> {
    match operation {
        UnaryOperation::Identity => Ok(b),

        UnaryOperation::Selection(selection) => {
            if b.slice.is_some() {
                // filtering after a positional window cannot move below it
                log::debug!("sealing subquery: selection above slice");
                b = SelectBox::source(seal(b)?);
            }
            if let Base::Chain(branches) = &b.base {
                let predicate = &selection.predicate;
                let branches = branches
                    .iter()
                    .map(|branch| conform(&branch.selection(predicate.clone())?))
                    .try_collect()?;
                b.base = Base::Chain(branches);
            } else {
                b.selections.push(selection.predicate.clone());
            }
            Ok(b)
        }

        UnaryOperation::Calculation(calculation) => {
            if let Base::Chain(branches) = &b.base {
                // every branch must cover the read set on its own
                for branch in branches {
                    let missing: Vec<_> = calculation
                        .expr
                        .columns()
                        .difference(branch.columns())
                        .map(|c| c.qualified_name())
                        .collect();
                    if !missing.is_empty() {
                        return Err(Error::column(format!(
                            "calculation reads columns a union branch lacks: {}",
                            missing.join(", ")
                        )));
                    }
                }
                let branches = branches
                    .iter()
                    .map(|branch| {
                        conform(&branch.calculation(
                            calculation.tag.clone(),
                            calculation.expr.clone(),
                        )?)
                    })
                    .try_collect()?;
                b.base = Base::Chain(branches);
            } else {
                if let Some(projection) = &mut b.projection {
                    projection.insert(calculation.tag.clone());
                }
                if let Some(output) = &mut b.output {
                    output.insert(calculation.tag.clone());
                }
                b.calculations.push(calculation.clone());
            }
            Ok(b)
        }

        UnaryOperation::Projection(projection) => {
            if b.distinct {
                // projecting away columns may merge rows the dedup kept apart
                log::debug!("sealing subquery: projection above deduplication");
                b = SelectBox::source(seal(b)?);
            }
            let keep = projection.columns.clone();
            if let Base::Chain(branches) = &b.base {
                let branches = branches
                    .iter()
                    .map(|branch| conform(&branch.projection(keep.clone())?))
                    .try_collect()?;
                b.base = Base::Chain(branches);
                return Ok(b);
            }
            let sort_columns = b.sort.as_ref().map(|s| s.columns()).unwrap_or_default();
            if sort_columns.is_subset(&keep) {
                b.projection = Some(keep);
                b.output = None;
            } else {
                log::debug!("widening projection to keep sort keys visible");
                b.projection = Some(keep.union(&sort_columns).cloned().collect());
                b.output = Some(keep);
            }
            drop_dead_calculations(&mut b);
            Ok(b)
        }

        UnaryOperation::Deduplication => {
            if b.slice.is_some() || b.output.is_some() {
                log::debug!("sealing subquery: deduplication above slice or narrowed output");
                b = SelectBox::source(seal(b)?);
            }
            b.distinct = true;
            Ok(b)
        }

        UnaryOperation::Sort(sort) => {
            if b.slice.is_some() {
                // reordering below an applied window changes which rows the
                // window held
                log::debug!("sealing subquery: sort above slice");
                b = SelectBox::source(seal(b)?);
            }
            // an interior sort is superseded; its keys stop mattering
            b.sort = Some(sort.clone());
            if let Some(output) = b.output.clone() {
                let sort_columns = sort.columns();
                if sort_columns.is_subset(&output) {
                    b.projection = Some(output);
                    b.output = None;
                } else {
                    b.projection = Some(output.union(&sort_columns).cloned().collect());
                }
            }
            Ok(b)
        }

        UnaryOperation::Slice(slice) => {
            b.slice = Some(match b.slice {
                Some(inner) => slice.compose_after(&inner),
                None => *slice,
            });
            Ok(b)
        }
    }
}

/// A calculation whose column the projection discards, and which nothing
/// else in the box reads, computes a value no one observes.
fn drop_dead_calculations<T: ColumnTag>(b: &mut SelectBox<T>) {
    let Some(projection) = &b.projection else {
        return;
    };
    let mut needed = projection.clone();
    for predicate in &b.selections {
        needed.extend(predicate.columns());
    }
    let mut kept = Vec::new();
    for calculation in b.calculations.drain(..).rev() {
        if needed.contains(&calculation.tag) {
            needed.extend(calculation.expr.columns());
            kept.push(calculation);
        } else {
            log::debug!(
                "dropping projected-away calculation `{}`",
                calculation.tag.qualified_name()
            );
        }
    }
    kept.reverse();
    b.calculations = kept;
}

fn merge_join<T: ColumnTag>(
    lhs: SelectBox<T>,
    rhs: SelectBox<T>,
    predicate: Option<Predicate<T>>,
) -> Result<SelectBox<T>> {
    let mut items = Vec::new();
    let mut calculations = Vec::new();
    let mut selections = Vec::new();
    for side in [lhs, rhs] {
        let side = if side.is_join_mergeable() {
            side
        } else {
            log::debug!("sealing subquery: join operand is not a plain filtered join tree");
            SelectBox::source(seal(side)?)
        };
        match side.base {
            Base::Source(item) => items.push(item),
            Base::Join(more) => items.extend(more),
            Base::Chain(_) => unreachable!("chains are sealed before merging"),
        }
        calculations.extend(side.calculations);
        selections.extend(side.selections);
    }
    selections.extend(predicate);

    Ok(SelectBox {
        base: Base::Join(items),
        calculations,
        selections,
        projection: None,
        output: None,
        distinct: false,
        sort: None,
        slice: None,
    })
}

/// Render a box into canonical relation layers behind a Select marker.
///
/// A trivial box dissolves back into its single source: a bare leaf or
/// marker is already canonical.
pub(super) fn seal<T: ColumnTag>(b: SelectBox<T>) -> Result<Relation<T>> {
    if b.is_trivial() {
        if let Base::Source(source) = b.base {
            return Ok(source);
        }
        unreachable!("trivial boxes hold a single source");
    }

    let mut relation = match b.base {
        Base::Source(source) => source,
        Base::Join(items) => {
            let mut items = items.into_iter();
            let first = items
                .next()
                .ok_or_else(|| Error::invariant("join base must hold at least one item"))?;
            items.try_fold(first, |acc, item| acc.join(&item, None))?
        }
        Base::Chain(branches) => {
            let mut branches = branches.into_iter();
            let first = branches
                .next()
                .ok_or_else(|| Error::invariant("chain base must hold at least one branch"))?;
            branches.try_fold(first, |acc, branch| acc.chain(&branch))?
        }
    };

    for calculation in b.calculations {
        relation = relation.calculation(calculation.tag, calculation.expr)?;
    }
    // a canonical order within the layer, so equal relations conform and
    // hash equal
    let mut selections = b.selections;
    selections.sort_by(|a, c| a.columns().cmp(&c.columns()));
    for predicate in selections {
        relation = relation.selection(predicate)?;
    }
    if let Some(projection) = b.projection {
        relation = relation.projection(projection)?;
    }
    if b.distinct {
        relation = relation.deduplication()?;
    }
    if let Some(sort) = b.sort {
        relation = relation.sort(sort.keys)?;
    }
    if let Some(slice) = b.slice {
        relation = relation.slice(slice.start, slice.stop)?;
    }
    Ok(relation.select_marker(b.output))
}

/// Parse the canonical layers under a Select marker back into a box.
pub(super) fn reopen<T: ColumnTag>(marker: &MarkerRelation<T>) -> Result<SelectBox<T>> {
    let output = match &marker.kind {
        MarkerKind::Select(output) => output.clone(),
        _ => return Err(Error::invariant("only select markers can be reopened")),
    };

    let mut slice = None;
    let mut sort = None;
    let mut distinct = false;
    let mut projection = None;
    let mut selections = Vec::new();
    let mut calculations = Vec::new();

    // layer order is fixed; anything out of place is not canonical
    let mut cursor = marker.target.clone();
    let mut layer = 0u8;
    loop {
        let Some(node) = cursor.as_unary_op().cloned() else {
            break;
        };
        let next_layer = match &node.operation {
            UnaryOperation::Slice(s) if layer < 1 => {
                slice = Some(*s);
                1
            }
            UnaryOperation::Sort(s) if layer < 2 => {
                sort = Some(s.clone());
                2
            }
            UnaryOperation::Deduplication if layer < 3 => {
                distinct = true;
                3
            }
            UnaryOperation::Projection(p) if layer < 4 => {
                projection = Some(p.columns.clone());
                4
            }
            UnaryOperation::Selection(s) if layer <= 5 => {
                selections.push(s.predicate.clone());
                5
            }
            UnaryOperation::Calculation(c) if layer <= 6 => {
                calculations.push(c.clone());
                6
            }
            _ => {
                return Err(Error::invariant(format!(
                    "select marker target is not in canonical form at `{}`",
                    node.operation.as_ref()
                )))
            }
        };
        layer = next_layer;
        cursor = node.target.clone();
    }
    // the walk saw outermost first
    calculations.reverse();
    selections.reverse();

    let base = match &cursor {
        Relation::Leaf(_) | Relation::Marker(_) => Base::Source(cursor.clone()),
        Relation::BinaryOp(node) => match &node.operation {
            BinaryOperation::Join(_) => {
                let mut items = Vec::new();
                flatten_join(&cursor, &mut items, &mut selections)?;
                Base::Join(items)
            }
            BinaryOperation::Chain => {
                let mut branches = Vec::new();
                flatten_conformed_chain(&cursor, &mut branches);
                Base::Chain(branches)
            }
        },
        Relation::UnaryOp(_) => unreachable!("the layer walk consumed unary operations"),
    };

    Ok(SelectBox {
        base,
        calculations,
        selections,
        projection,
        output,
        distinct,
        sort,
        slice,
    })
}

fn flatten_join<T: ColumnTag>(
    relation: &Relation<T>,
    items: &mut Vec<Relation<T>>,
    selections: &mut Vec<Predicate<T>>,
) -> Result<()> {
    if let Some(node) = relation.as_binary_op() {
        if let BinaryOperation::Join(join) = &node.operation {
            flatten_join(&node.lhs, items, selections)?;
            flatten_join(&node.rhs, items, selections)?;
            selections.extend(join.predicate.clone());
            return Ok(());
        }
        return Err(Error::invariant(
            "a chain below a join must be sealed as a subquery",
        ));
    }
    items.push(relation.clone());
    Ok(())
}

fn flatten_conformed_chain<T: ColumnTag>(relation: &Relation<T>, out: &mut Vec<Relation<T>>) {
    if let Some(node) = relation.as_binary_op() {
        if node.operation.is_chain() {
            flatten_conformed_chain(&node.lhs, out);
            flatten_conformed_chain(&node.rhs, out);
            return;
        }
    }
    out.push(relation.clone());
}
