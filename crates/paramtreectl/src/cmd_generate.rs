use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use paramtree::tree::{profile_xml, FileValue, LeafInput};
use paramtree::{ParameterTree, SerializeOptions, TreeOptions};
use serde::Serialize;
use tracing::{info, warn};

use crate::common::{self, Issue};

#[derive(Debug, Clone, Default)]
pub struct GenerateArgs {
    pub template: PathBuf,
    pub profile: Option<PathBuf>,
    pub set: Vec<(String, String)>,
    pub enable: Vec<String>,
    pub choose: Vec<String>,
    pub repeat: Vec<String>,
    pub file_content: bool,
    pub force: bool,
    pub out: Option<PathBuf>,
    pub indent: usize,
}

#[derive(Serialize)]
struct GenerateResponse {
    out: Option<String>,
    complete: bool,
    issues: Vec<Issue>,
    xml: Option<String>,
}

/// Apply command line edits in a fixed order: enable, repeat, choose, set.
pub async fn apply_edits(tree: &mut ParameterTree, args: &GenerateArgs) -> Result<()> {
    for path in &args.enable {
        let id = tree.find(path)?;
        tree.set_enabled(id, true)
            .with_context(|| format!("enable {path}"))?;
    }
    for path in &args.repeat {
        let id = tree.find(path)?;
        tree.repeat(id).with_context(|| format!("repeat {path}"))?;
    }
    for path in &args.choose {
        let id = tree.find(path)?;
        let group = tree
            .parent(id)
            .ok_or_else(|| anyhow!("{path} has no choice group"))?;
        tree.select_choice(group, id)
            .with_context(|| format!("choose {path}"))?;
    }
    for (path, value) in &args.set {
        let id = tree.find(path)?;
        let is_file = tree
            .node(id)
            .and_then(|node| node.leaf())
            .map_or(false, |leaf| leaf.input == LeafInput::File);
        let result = if is_file && args.file_content {
            let contents = common::read_text(Path::new(value)).await?;
            tree.set_file(id, FileValue::new(value.as_str()).with_contents(contents))
        } else {
            tree.set_value(id, value)
        };
        let verdict = result.with_context(|| format!("set {path}"))?;
        if let Some(message) = verdict.message() {
            warn!(path = %path, message, "value rejected");
        }
    }
    Ok(())
}

pub async fn run(args: GenerateArgs, json: bool) -> Result<()> {
    let mut tree = common::open_tree(&args.template, args.profile.as_deref(), &TreeOptions::default())
        .await?;
    apply_edits(&mut tree, &args).await?;

    let issues = common::issues(&tree)?;
    let complete = tree.is_complete();
    if !complete && !args.force {
        for issue in &issues {
            warn!(path = %issue.path, status = issue.status, message = ?issue.message, "incomplete");
        }
        bail!(
            "profile is not complete ({} issue(s)); pass --force to write it anyway",
            issues.len()
        );
    }

    let options = SerializeOptions {
        indent: " ".repeat(args.indent),
        use_file_content: args.file_content,
    };
    let xml = profile_xml(&tree, &options).context("write profile document")?;
    if let Some(path) = &args.out {
        tokio::fs::write(path, &xml)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        info!(path = %path.display(), complete, "profile written");
    }

    if json {
        common::print_json(&GenerateResponse {
            out: args.out.as_ref().map(|path| path.display().to_string()),
            complete,
            issues,
            xml: args.out.is_none().then_some(xml),
        })?;
    } else if args.out.is_none() {
        print!("{xml}");
    }
    Ok(())
}
