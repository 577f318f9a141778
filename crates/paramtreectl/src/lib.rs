//! Command implementations behind the `paramtreectl` binary.

pub mod cmd_check;
pub mod cmd_generate;
pub mod cmd_tree;
pub mod cmd_validate;
pub mod common;
