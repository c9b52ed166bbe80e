/// A trait to "fold" a relation tree, so we can transitively apply some logic
/// to a whole tree by just defining how we want to handle each node kind.
use crate::error::Result;
use crate::tag::ColumnTag;

use super::{MarkerKind, Relation};

// Implementors override the cases they care about and call the free function
// for the default recursion, so a rewrite pass is just one method.
pub trait RelationFold<T: ColumnTag> {
    fn fold_relation(&mut self, relation: Relation<T>) -> Result<Relation<T>> {
        fold_relation(self, relation)
    }
}

pub fn fold_relation<T: ColumnTag, F: ?Sized + RelationFold<T>>(
    fold: &mut F,
    relation: Relation<T>,
) -> Result<Relation<T>> {
    Ok(match relation {
        Relation::Leaf(_) => relation,
        Relation::UnaryOp(node) => {
            let target = fold.fold_relation(node.target.clone())?;
            if Relation::same_node(&target, &node.target) {
                Relation::UnaryOp(node)
            } else {
                Relation::rebuild_unary(node.operation.clone(), &target)?
            }
        }
        Relation::BinaryOp(node) => {
            let lhs = fold.fold_relation(node.lhs.clone())?;
            let rhs = fold.fold_relation(node.rhs.clone())?;
            if Relation::same_node(&lhs, &node.lhs) && Relation::same_node(&rhs, &node.rhs) {
                Relation::BinaryOp(node)
            } else {
                match &node.operation {
                    super::BinaryOperation::Join(join) => lhs.join(&rhs, join.predicate.clone())?,
                    super::BinaryOperation::Chain => lhs.chain(&rhs)?,
                }
            }
        }
        Relation::Marker(node) => {
            let target = fold.fold_relation(node.target.clone())?;
            if Relation::same_node(&target, &node.target) {
                // keep the node itself: its payload slot is the cache
                Relation::Marker(node)
            } else {
                match node.kind.clone() {
                    // a rewritten target gets a fresh, empty slot
                    MarkerKind::Materialization(name) => target.materialization(name),
                    MarkerKind::Transfer => target.transfer(node.engine.clone())?,
                    MarkerKind::Select(output) => target.select_marker(output),
                }
            }
        }
    })
}
