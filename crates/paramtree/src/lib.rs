#![cfg_attr(docsrs, feature(doc_cfg))]
//! High level parameter tree facade that re-exports the workspace crates and
//! provides an explicit editing session.
//!
//! ```rust,no_run
//! use paramtree::{DirTemplateSource, MemoryProfileStore, Session, SessionError};
//!
//! # async fn run() -> Result<(), SessionError> {
//! let source = DirTemplateSource::new("templates");
//! let store = MemoryProfileStore::new();
//! let mut session = Session::new();
//! session.open_template(&source, "solver").await?;
//! session.edit(|tree| {
//!     let iterations = tree.find("Iterations")?;
//!     tree.set_value(iterations, "7")
//! })?;
//! if session.ready() {
//!     session.save_profile(&store, "fast").await?;
//! }
//! # Ok(())
//! # }
//! ```

pub use paramtree_core as tree;
pub use paramtree_xml as xml;

pub mod render;
pub mod session;
pub mod store;

use thiserror::Error;

pub use paramtree_core::{
    LoadSummary, NodeId, ParameterTree, SerializeOptions, TreeError, TreeOptions, Validity,
};
pub use paramtree_xml::XmlError;
pub use render::{describe, render_text};
pub use session::{Session, Ticket};
pub use store::{DirTemplateSource, MemoryProfileStore, ProfileStore, TemplateSource};

/// Error type produced by the session facade.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Template or profile document could not be parsed.
    #[error(transparent)]
    Xml(#[from] XmlError),
    /// Structural tree operation failed.
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// An asynchronous completion arrived after another template was requested.
    #[error("stale completion for generation {ticket}, current generation is {current}")]
    Stale { ticket: u64, current: u64 },
    /// The operation needs a template to be installed first.
    #[error("no template is loaded")]
    NoTemplate,
    #[error("template not found: {0}")]
    TemplateNotFound(String),
    #[error("profile already exists: {0}")]
    ProfileExists(String),
    #[error("profile not found: {0}")]
    ProfileNotFound(String),
    /// Template or profile storage failed.
    #[error("storage: {0}")]
    Storage(String),
}

impl SessionError {
    fn storage<S: Into<String>>(msg: S) -> Self {
        SessionError::Storage(msg.into())
    }
}
