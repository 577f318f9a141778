//! Serialize the active part of a tree into a profile document.

use paramtree_xml::{XmlElement, XmlError};

use crate::model::{NodeId, NodeKind, ParameterTree};

/// Knobs for writing profile documents.
#[derive(Debug, Clone)]
pub struct SerializeOptions {
    /// Indentation unit per depth level.
    pub indent: String,
    /// Emit the contents of attached files instead of their names.
    pub use_file_content: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            indent: "  ".to_string(),
            use_file_content: false,
        }
    }
}

/// Build the element tree for the enabled, chosen part of `tree`.
pub fn serialize(tree: &ParameterTree, options: &SerializeOptions) -> XmlElement {
    element_for(tree, tree.root(), options)
}

/// Serialize `tree` into a complete profile document string.
///
/// Fails only when `options.indent` is not a run of one whitespace character.
pub fn profile_xml(tree: &ParameterTree, options: &SerializeOptions) -> Result<String, XmlError> {
    serialize(tree, options).to_document_string(&options.indent)
}

/// Children that take part in serialization and validity, in schema order.
pub(crate) fn active_children(tree: &ParameterTree, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    let node = &tree.nodes[id.0];
    let chosen = node.chosen();
    let choice = node.is_choice();
    node.children
        .iter()
        .copied()
        .filter(move |child| tree.nodes[child.0].enabled && (!choice || chosen == Some(*child)))
}

fn element_for(tree: &ParameterTree, id: NodeId, options: &SerializeOptions) -> XmlElement {
    let node = &tree.nodes[id.0];
    let mut element = XmlElement::new(node.name.as_str());
    match &node.kind {
        NodeKind::Leaf(leaf) => {
            if let Some(unit) = leaf.unit().filter(|unit| !unit.is_empty()) {
                element = element.with_attribute("UNIT", unit);
            }
            let text = match leaf.file() {
                Some(file) if options.use_file_content => file
                    .contents
                    .as_deref()
                    .unwrap_or_else(|| file.base_name())
                    .trim()
                    .to_string(),
                Some(file) => file.base_name().to_string(),
                None => leaf.value().trim().to_string(),
            };
            element.with_text(text)
        }
        NodeKind::Branch { .. } => {
            for child in active_children(tree, id) {
                element.push_child(element_for(tree, child, options));
            }
            element
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileValue;
    use crate::testutil::{build_tree, complete};

    #[test]
    fn write_completed_profile() {
        let mut tree = build_tree();
        complete(&mut tree);
        let iterations = tree.find("Iterations").unwrap();
        tree.set_unit(iterations, "steps").unwrap();

        let expected = concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<SolverParams>\n",
            "  <Iterations UNIT=\"steps\">5</Iterations>\n",
            "  <Method>\n",
            "    <Direct>\n",
            "      <Marker></Marker>\n",
            "    </Direct>\n",
            "  </Method>\n",
            "  <Precond>JACOBI</Precond>\n",
            "  <Limits>\n",
            "    <Kind>\n",
            "      <Hard>\n",
            "        <Max>1.0</Max>\n",
            "      </Hard>\n",
            "    </Kind>\n",
            "  </Limits>\n",
            "</SolverParams>\n",
        );
        assert_eq!(profile_xml(&tree, &SerializeOptions::default()).unwrap(), expected);
    }

    #[test]
    fn unchosen_members_are_left_out() {
        let mut tree = build_tree();
        complete(&mut tree);
        let method = tree.find("Method").unwrap();
        let iterative = tree.find("Method/Iterative").unwrap();
        let tolerance = tree.find("Method/Iterative/Tolerance").unwrap();
        tree.set_value(tolerance, "0.01").unwrap();
        tree.select_choice(method, iterative).unwrap();

        let doc = serialize(&tree, &SerializeOptions::default());
        let method = doc.child("Method").expect("method element");
        assert_eq!(method.children.len(), 1);
        assert_eq!(method.children[0].name, "Iterative");
        assert_eq!(method.children[0].children[0].text, "0.01");
    }

    #[test]
    fn disabled_and_empty_branches() {
        let mut tree = build_tree();
        let doc = serialize(&tree, &SerializeOptions::default());
        assert!(doc.child("Output").is_none());
        assert!(doc.child("Method").expect("method").children.is_empty());

        let output = tree.find("Output").unwrap();
        tree.set_enabled(output, true).unwrap();
        let doc = serialize(&tree, &SerializeOptions::default());
        assert_eq!(doc.child("Output").expect("output").children.len(), 1);
    }

    #[test]
    fn file_leaves_write_name_or_contents() {
        let mut tree = build_tree();
        let output = tree.find("Output").unwrap();
        tree.set_enabled(output, true).unwrap();
        let path = tree.find("Output/Path").unwrap();
        tree.set_file(path, FileValue::new("/tmp/in/mesh.xml").with_contents("  <mesh/>\n"))
            .unwrap();

        let by_name = serialize(&tree, &SerializeOptions::default());
        assert_eq!(by_name.child("Output").unwrap().children[0].text, "mesh.xml");

        let options = SerializeOptions {
            use_file_content: true,
            ..SerializeOptions::default()
        };
        let by_content = serialize(&tree, &options);
        assert_eq!(by_content.child("Output").unwrap().children[0].text, "<mesh/>");
    }

    #[test]
    fn serialization_is_deterministic() {
        let mut tree = build_tree();
        complete(&mut tree);
        let options = SerializeOptions {
            indent: "\t".to_string(),
            ..SerializeOptions::default()
        };
        let first = profile_xml(&tree, &options).unwrap();
        assert_eq!(first, profile_xml(&tree, &options).unwrap());
        assert!(first.contains("\n\t<Precond>JACOBI</Precond>\n"));
    }
}
