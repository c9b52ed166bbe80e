use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a column.
///
/// The host application owns the identifier type; the crate requires only
/// equality, hashing, a total order (column sets are kept in that order so
/// structurally equal trees hash equal) and a rendering into the name the
/// column carries in emitted expressions.
pub trait ColumnTag: Clone + Eq + Ord + Hash + Debug + Send + Sync + 'static {
    fn qualified_name(&self) -> String;
}

/// Plain string tags, for hosts without a richer identifier scheme.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StringTag(String);

impl StringTag {
    pub fn new<S: Into<String>>(name: S) -> Self {
        StringTag(name.into())
    }
}

impl ColumnTag for StringTag {
    fn qualified_name(&self) -> String {
        self.0.clone()
    }
}

impl Display for StringTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StringTag {
    fn from(name: &str) -> Self {
        StringTag::new(name)
    }
}
