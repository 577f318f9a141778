use std::path::Path;

use anyhow::{bail, Result};
use paramtree::TreeOptions;
use serde::Serialize;

use crate::common::{self, Issue};

#[derive(Serialize)]
struct CheckResponse {
    complete: bool,
    issues: Vec<Issue>,
}

/// Report what keeps a profile from being complete; fails when anything does.
pub async fn run(template: &Path, profile: &Path, json: bool) -> Result<()> {
    let tree = common::open_tree(template, Some(profile), &TreeOptions::default()).await?;
    let issues = common::issues(&tree)?;
    let complete = tree.is_complete();
    let count = issues.len();

    if json {
        common::print_json(&CheckResponse { complete, issues })?;
    } else if complete {
        println!("complete");
    } else {
        for issue in &issues {
            match &issue.message {
                Some(message) => println!("{:<8} {}: {message}", issue.status, issue.path),
                None => println!("{:<8} {}", issue.status, issue.path),
            }
        }
    }

    if !complete {
        bail!("profile {} is not complete ({count} issue(s))", profile.display());
    }
    Ok(())
}
