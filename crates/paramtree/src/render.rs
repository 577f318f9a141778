//! Text view of a parameter tree.

use paramtree_core::{LeafInput, NodeId, NodeKind, ParameterTree, Validity};

/// One-line description of a node: name, value and validity marker.
pub fn describe(tree: &ParameterTree, id: NodeId) -> String {
    let Some(node) = tree.node(id) else {
        return format!("<missing {id}>");
    };
    let mut line = node.name().to_string();
    if node.is_repeated_copy() {
        line.push_str(" (copy)");
    }
    match node.kind() {
        NodeKind::Leaf(leaf) if leaf.input == LeafInput::None => {}
        NodeKind::Leaf(leaf) => {
            line.push_str(" = ");
            line.push_str(display_value(leaf.value()));
            if let Some(unit) = leaf.unit().filter(|unit| !unit.is_empty()) {
                line.push(' ');
                line.push_str(unit);
            }
            if let LeafInput::Select(options) = &leaf.input {
                line.push_str(&format!(" ({})", options.join("|")));
            }
        }
        NodeKind::Branch { choice: true, .. } => line.push_str(" (choice)"),
        NodeKind::Branch { .. } => {}
    }
    if !node.is_enabled() {
        line.push_str(" [disabled]");
    } else if !is_chosen(tree, id) {
        line.push_str(" [not chosen]");
    } else {
        line.push(' ');
        line.push_str(marker(node.validity()));
        if let Some(message) = node.validity().message() {
            line.push(' ');
            line.push_str(message);
        }
    }
    line
}

/// Render the tree as indented text, two spaces per level.
///
/// Disabled branches and unchosen alternatives are listed but not expanded.
pub fn render_text(tree: &ParameterTree) -> String {
    let mut out = String::new();
    render_node(tree, tree.root(), 0, &mut out);
    out
}

fn render_node(tree: &ParameterTree, id: NodeId, depth: usize, out: &mut String) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(&describe(tree, id));
    out.push('\n');
    if expands(tree, id) {
        for child in tree.children(id) {
            render_node(tree, *child, depth + 1, out);
        }
    }
}

/// Whether a view should list the children of `id`.
pub fn expands(tree: &ParameterTree, id: NodeId) -> bool {
    tree.node(id).map_or(false, |node| node.is_enabled()) && is_chosen(tree, id)
}

fn is_chosen(tree: &ParameterTree, id: NodeId) -> bool {
    match tree.parent(id).and_then(|parent| tree.node(parent)) {
        Some(parent) if parent.is_choice() => parent.chosen() == Some(id),
        _ => true,
    }
}

fn marker(validity: &Validity) -> &'static str {
    match validity {
        Validity::Valid => "[ok]",
        Validity::Unset => "[unset]",
        Validity::Invalid(_) => "[invalid]",
    }
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "\"\""
    } else {
        value
    }
}
