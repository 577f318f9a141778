//! Parameter tree engine: template-driven tree state, leaf validation,
//! validity propagation and mapping to and from XML profile documents.
//!
//! A [`ParameterTree`] is built from a parsed template description. Leaves
//! are validated as values are written; every change is propagated up to the
//! root so [`ParameterTree::is_complete`] reflects whether the whole tree is
//! ready. [`serialize`] and [`load`] convert between the tree and a profile
//! document.

use thiserror::Error;

mod load;
mod model;
mod propagate;
mod serialize;
mod validate;

#[cfg(test)]
mod testutil;

pub use load::{load, load_profile_str, LoadSummary};
pub use model::{
    FileValue, LeafData, LeafInput, NodeId, NodeKind, ParameterTree, TreeNode, TreeOptions,
    ValidityEvent, ValidityObserver,
};
pub use serialize::{profile_xml, serialize, SerializeOptions};
pub use validate::{is_integer, parse_number, validate_leaf, RestrictionSet, Validity, ValueType};

/// Error type produced by structural tree operations.
///
/// Bad leaf values are not errors; they surface as [`Validity::Invalid`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    /// No node answers to the given path or handle.
    #[error("node not found: {0}")]
    NodeNotFound(String),
    /// A value operation was attempted on a branch.
    #[error("not a leaf: {0}")]
    NotALeaf(String),
    /// The operation does not match the leaf's input kind.
    #[error("input kind mismatch for node: {0}")]
    InputKind(String),
    /// The leaf has no unit field.
    #[error("node has no unit: {0}")]
    NoUnit(String),
    #[error("not a choice group: {0}")]
    NotAChoice(String),
    #[error("{child} is not a member of choice group {group}")]
    NotAChoiceMember { group: String, child: String },
    /// Only optional nodes can be enabled or disabled.
    #[error("node is not optional: {0}")]
    NotOptional(String),
    #[error("node is not repeatable: {0}")]
    NotRepeatable(String),
    /// Another occurrence would exceed the declared maximum.
    #[error("maximum occurrences reached for node: {0}")]
    MaxOccurs(String),
    /// Only repeated copies can be removed.
    #[error("node cannot be removed: {0}")]
    NotRemovable(String),
    #[error("'{option}' is not an option of {node}")]
    UnknownOption { node: String, option: String },
    /// Malformed node path.
    #[error("path error: {0}")]
    Path(String),
}
