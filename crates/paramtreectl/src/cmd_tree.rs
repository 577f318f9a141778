use std::path::Path;

use anyhow::Result;
use paramtree::render::{describe, expands};
use paramtree::{NodeId, ParameterTree, TreeOptions};
use termtree::Tree;

use crate::common;

/// Build a printable view of the subtree at `id`.
pub fn build_view(tree: &ParameterTree, id: NodeId) -> Tree<String> {
    let leaves = if expands(tree, id) {
        tree.children(id)
            .iter()
            .map(|child| build_view(tree, *child))
            .collect()
    } else {
        Vec::new()
    };
    Tree::new(describe(tree, id)).with_leaves(leaves)
}

pub async fn run(template: &Path, profile: Option<&Path>, expand_optional: bool) -> Result<()> {
    let options = TreeOptions {
        disable_optional_branches: !expand_optional,
    };
    let tree = common::open_tree(template, profile, &options).await?;
    print!("{}", build_view(&tree, tree.root()));
    Ok(())
}
