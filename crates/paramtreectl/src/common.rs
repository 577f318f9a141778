use std::path::Path;

use anyhow::{Context, Result};
use paramtree::tree::{load_profile_str, NodeKind};
use paramtree::{ParameterTree, TreeOptions, Validity};
use serde::Serialize;
use tracing::info;

pub async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))
}

/// Build a tree from a template file and optionally fill it from a profile file.
pub async fn open_tree(
    template: &Path,
    profile: Option<&Path>,
    options: &TreeOptions,
) -> Result<ParameterTree> {
    let xml = read_text(template).await?;
    let model = paramtree::xml::parse(&xml)
        .with_context(|| format!("parse template {}", template.display()))?;
    info!(template = %model.id, root = %model.root.name, "template loaded");
    let mut tree = ParameterTree::from_template(&model, options);

    if let Some(profile) = profile {
        let xml = read_text(profile).await?;
        let summary = load_profile_str(&xml, &mut tree)
            .with_context(|| format!("parse profile {}", profile.display()))?;
        info!(
            matched = summary.matched,
            skipped = summary.skipped,
            repeated = summary.repeated,
            "profile applied"
        );
    }
    Ok(tree)
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialise JSON output")?;
    println!("{text}");
    Ok(())
}

/// Clap value parser for `PATH=VALUE` assignments.
pub fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(path, value)| (path.trim().to_string(), value.to_string()))
        .filter(|(path, _)| !path.is_empty())
        .ok_or_else(|| format!("expected PATH=VALUE, got '{raw}'"))
}

pub fn status_label(validity: &Validity) -> &'static str {
    match validity {
        Validity::Valid => "valid",
        Validity::Unset => "unset",
        Validity::Invalid(_) => "invalid",
    }
}

/// Something that keeps the tree from being complete.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Issue {
    pub path: String,
    pub status: &'static str,
    pub message: Option<String>,
}

/// Active leaves that are not valid and choice groups without a selection.
pub fn issues(tree: &ParameterTree) -> Result<Vec<Issue>> {
    let mut found = Vec::new();
    for id in tree.descendants(tree.root()) {
        if !tree.is_active(id) {
            continue;
        }
        let Some(node) = tree.node(id) else {
            continue;
        };
        let issue = match node.kind() {
            NodeKind::Leaf(_) if !node.validity().is_valid() => Some(Issue {
                path: tree.path_of(id)?,
                status: status_label(node.validity()),
                message: node.validity().message().map(str::to_string),
            }),
            NodeKind::Branch {
                choice: true,
                chosen: None,
            } => Some(Issue {
                path: tree.path_of(id)?,
                status: "unset",
                message: Some("no alternative chosen".to_string()),
            }),
            _ => None,
        };
        found.extend(issue);
    }
    Ok(found)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_assignments() {
        assert_eq!(
            parse_assignment("Output[1]/Path = a=b.xml"),
            Ok(("Output[1]/Path".to_string(), " a=b.xml".to_string()))
        );
        assert!(parse_assignment("Iterations").is_err());
        assert!(parse_assignment("=5").is_err());
    }

    #[test]
    fn issues_list_leaves_and_open_choices() {
        let mut tree = fixtures::tree();
        let iterations = tree.find("Iterations").unwrap();
        tree.set_value(iterations, "11").unwrap();

        let found = issues(&tree).unwrap();
        assert_eq!(
            found,
            vec![
                Issue {
                    path: "Iterations".into(),
                    status: "invalid",
                    message: Some(
                        "A value less than or equal to 10 is required for this parameter".into()
                    ),
                },
                Issue {
                    path: "Method".into(),
                    status: "unset",
                    message: Some("no alternative chosen".into()),
                },
            ]
        );
    }
}
