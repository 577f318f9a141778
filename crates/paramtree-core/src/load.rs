//! Populate a tree from a profile document.

use paramtree_xml::{parse_document, XmlElement, XmlError};
use tracing::{debug, warn};

use crate::model::{LeafInput, NodeId, ParameterTree, TreeNode};
use crate::TreeError;

/// Outcome of one load pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Elements that found a node to write into.
    pub matched: usize,
    /// Elements without a counterpart in the tree, including their subtrees.
    pub skipped: usize,
    /// Branches repeated to hold additional occurrences.
    pub repeated: usize,
}

/// Write the values of `doc` into `tree`.
///
/// Elements are matched by name against the children of the current node;
/// unknown elements are skipped so richer documents still load.
pub fn load(doc: &XmlElement, tree: &mut ParameterTree) -> LoadSummary {
    tree.reset_loaded();
    let root = tree.root();
    let root_name = tree.nodes[root.0].name.clone();
    if doc.name != root_name {
        warn!(expected = %root_name, found = %doc.name, "profile root does not match template root");
    }
    tree.mark_loaded(root);
    let mut summary = LoadSummary::default();
    load_children(doc, root, tree, &mut summary);
    debug!(
        matched = summary.matched,
        skipped = summary.skipped,
        repeated = summary.repeated,
        "profile loaded"
    );
    summary
}

/// Parse a profile document and load it into `tree`.
pub fn load_profile_str(xml: &str, tree: &mut ParameterTree) -> Result<LoadSummary, XmlError> {
    let doc = parse_document(xml)?;
    Ok(load(&doc, tree))
}

fn load_children(
    element: &XmlElement,
    parent: NodeId,
    tree: &mut ParameterTree,
    summary: &mut LoadSummary,
) {
    for child in &element.children {
        match load_element(child, parent, tree, summary) {
            Ok(true) => {}
            Ok(false) => summary.skipped += 1,
            Err(err) => {
                warn!(element = %child.name, error = %err, "could not load element");
                summary.skipped += 1;
            }
        }
    }
}

fn load_element(
    element: &XmlElement,
    parent: NodeId,
    tree: &mut ParameterTree,
    summary: &mut LoadSummary,
) -> Result<bool, TreeError> {
    let Some(mut target) = tree.last_child_named(parent, &element.name) else {
        debug!(element = %element.name, parent = %tree.nodes[parent.0].name, "no matching node");
        return Ok(false);
    };

    let node = tree.get(target)?;
    if !node.enabled {
        tree.apply_enabled(target, true)?;
    }
    let node = tree.get(target)?;
    if node.loaded && node.is_repeatable() {
        target = tree.repeat(target)?;
        summary.repeated += 1;
    }

    write_leaf(tree, target, element)?;
    if tree.get(parent)?.is_choice() {
        tree.select_choice(parent, target)?;
    }
    tree.mark_loaded(target);
    summary.matched += 1;

    if !tree.get(target)?.is_leaf() {
        load_children(element, target, tree, summary);
    }
    Ok(true)
}

fn write_leaf(tree: &mut ParameterTree, id: NodeId, element: &XmlElement) -> Result<(), TreeError> {
    let Some(leaf) = tree.node(id).and_then(TreeNode::leaf) else {
        return Ok(());
    };
    let input = leaf.input.clone();
    if leaf.has_unit() {
        if let Some(unit) = element.attribute("UNIT") {
            tree.set_unit(id, unit)?;
        }
    }
    match input {
        LeafInput::None => {}
        LeafInput::Select(options) => {
            let wanted = element.text.to_uppercase();
            let option = options
                .iter()
                .find(|option| **option == wanted)
                .or_else(|| {
                    options
                        .iter()
                        .find(|option| option.eq_ignore_ascii_case(&element.text))
                })
                .map(String::as_str);
            if option.is_none() && !element.text.is_empty() {
                debug!(element = %element.name, value = %element.text, "no option matches, clearing selection");
            }
            tree.set_value(id, option.unwrap_or_default())?;
        }
        LeafInput::Text | LeafInput::File => {
            tree.set_value(id, &element.text)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::{profile_xml, SerializeOptions};
    use crate::testutil::{build_tree, complete};
    use crate::Validity;

    fn leaf_values(tree: &ParameterTree) -> Vec<(String, String, Option<String>)> {
        tree.leaves()
            .into_iter()
            .filter(|id| tree.is_active(*id))
            .map(|id| {
                let leaf = tree.node(id).unwrap().leaf().unwrap();
                (
                    tree.path_of(id).unwrap(),
                    leaf.value().to_string(),
                    leaf.unit().map(str::to_string),
                )
            })
            .collect()
    }

    #[test]
    fn round_trip_reproduces_values() {
        let mut source = build_tree();
        complete(&mut source);
        let iterations = source.find("Iterations").unwrap();
        source.set_value(iterations, "7").unwrap();
        source.set_unit(iterations, "steps").unwrap();
        let output = source.find("Output").unwrap();
        source.set_enabled(output, true).unwrap();
        let path = source.find("Output/Path").unwrap();
        source.set_value(path, "result.xml").unwrap();
        let xml = profile_xml(&source, &SerializeOptions::default()).unwrap();

        let mut target = build_tree();
        let summary = load_profile_str(&xml, &mut target).expect("load profile");
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.repeated, 0);
        assert_eq!(leaf_values(&target), leaf_values(&source));
        assert!(target.is_complete());
        assert_eq!(profile_xml(&target, &SerializeOptions::default()).unwrap(), xml);
    }

    #[test]
    fn repeated_elements_get_their_own_copies() {
        let xml = r#"
            <SolverParams>
                <Output><Path>a.xml</Path></Output>
                <Output><Path>b.xml</Path></Output>
                <Output><Path>c.txt</Path></Output>
            </SolverParams>
        "#;
        let mut tree = build_tree();
        let summary = load_profile_str(xml, &mut tree).unwrap();
        assert_eq!(summary.repeated, 2);
        let outputs: Vec<NodeId> = tree.children_named(tree.root(), "Output").collect();
        assert_eq!(outputs.len(), 3);
        let paths: Vec<String> = (0..3)
            .map(|i| {
                let path = tree.find(&format!("Output[{i}]/Path")).unwrap();
                tree.node(path).unwrap().leaf().unwrap().value().to_string()
            })
            .collect();
        assert_eq!(paths, ["a.xml", "b.xml", "c.txt"]);
        let last = tree.find("Output[2]/Path").unwrap();
        assert!(tree.validity(last).unwrap().is_invalid());
        assert!(tree.node(outputs[0]).unwrap().is_enabled());
    }

    #[test]
    fn occurrences_beyond_max_are_skipped() {
        let xml = r#"
            <SolverParams>
                <Limits><Kind><Hard><Max>1</Max></Hard></Kind></Limits>
                <Limits><Kind><Soft><Weight>2</Weight></Soft></Kind></Limits>
                <Limits><Kind><Soft><Weight>3</Weight></Soft></Kind></Limits>
            </SolverParams>
        "#;
        let mut tree = build_tree();
        let summary = load_profile_str(xml, &mut tree).unwrap();
        assert_eq!(summary.repeated, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(tree.children_named(tree.root(), "Limits").count(), 2);
        let kind = tree.find("Limits[1]/Kind").unwrap();
        let soft = tree.find("Limits[1]/Kind/Soft").unwrap();
        assert_eq!(tree.node(kind).unwrap().chosen(), Some(soft));
    }

    #[test]
    fn unknown_elements_and_root_mismatch_are_tolerated() {
        let xml = r#"
            <OtherRoot>
                <Iterations UNIT="s">3</Iterations>
                <Unknown><Deep>1</Deep></Unknown>
                <Method><Direct><Marker/></Direct><Extra/></Method>
            </OtherRoot>
        "#;
        let mut tree = build_tree();
        let summary = load_profile_str(xml, &mut tree).unwrap();
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.matched, 4);
        let iterations = tree.find("Iterations").unwrap();
        let leaf = tree.node(iterations).unwrap().leaf().unwrap();
        assert_eq!(leaf.value(), "3");
        assert_eq!(leaf.unit(), Some("s"));
        let method = tree.find("Method").unwrap();
        assert_eq!(tree.validity(method), Some(&Validity::Valid));
    }

    #[test]
    fn select_text_is_matched_upper_cased() {
        let mut tree = build_tree();
        load_profile_str("<SolverParams><Precond>jacobi</Precond></SolverParams>", &mut tree)
            .unwrap();
        let precond = tree.find("Precond").unwrap();
        assert_eq!(tree.node(precond).unwrap().leaf().unwrap().value(), "JACOBI");
        assert_eq!(tree.validity(precond), Some(&Validity::Valid));

        load_profile_str("<SolverParams><Precond>ilu</Precond></SolverParams>", &mut tree)
            .unwrap();
        assert_eq!(tree.node(precond).unwrap().leaf().unwrap().value(), "");
        assert_eq!(tree.validity(precond), Some(&Validity::Unset));
    }

    #[test]
    fn mixed_case_options_match_ignoring_case() {
        let template = r#"
            <Template Id="mode">
                <Branch Name="Run">
                    <Leaf Name="Mode" Input="select">
                        <Option>Auto</Option>
                        <Option>MANUAL</Option>
                    </Leaf>
                </Branch>
            </Template>
        "#;
        let model = paramtree_xml::parse(template).unwrap();
        let mut tree = ParameterTree::from_template(&model, &crate::TreeOptions::default());
        let mode = tree.find("Mode").unwrap();

        load_profile_str("<Run><Mode>auto</Mode></Run>", &mut tree).unwrap();
        assert_eq!(tree.node(mode).unwrap().leaf().unwrap().value(), "Auto");
        assert_eq!(tree.validity(mode), Some(&Validity::Valid));

        load_profile_str("<Run><Mode>manual</Mode></Run>", &mut tree).unwrap();
        assert_eq!(tree.node(mode).unwrap().leaf().unwrap().value(), "MANUAL");
        assert!(tree.is_complete());
    }

    #[test]
    fn malformed_documents_are_errors() {
        let mut tree = build_tree();
        assert!(matches!(
            load_profile_str("<SolverParams>", &mut tree),
            Err(XmlError::Xml(_))
        ));
    }
}
