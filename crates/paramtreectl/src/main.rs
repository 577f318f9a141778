use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use paramtreectl::cmd_check;
use paramtreectl::cmd_generate::{self, GenerateArgs};
use paramtreectl::cmd_tree;
use paramtreectl::cmd_validate;
use paramtreectl::common::parse_assignment;

#[derive(Parser, Debug)]
#[command(name = "paramtreectl", version, about = "Parameter tree CLI")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Output JSON where applicable
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Validate a single value against a type and restriction set
    Validate {
        #[arg(long = "type", default_value = "xs:string")]
        value_type: String,
        /// Restriction set as a JSON object, e.g. '{"xs:maxInclusive": 10}'
        #[arg(long)]
        restrictions: Option<String>,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Print a template tree, optionally filled from a profile
    Tree {
        #[arg(long)]
        template: PathBuf,
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Start with optional branches enabled
        #[arg(long)]
        expand_optional: bool,
    },
    /// Write a profile document from a template and edits
    Generate {
        #[arg(long)]
        template: PathBuf,
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Leaf assignment PATH=VALUE (repeatable)
        #[arg(long = "set", value_parser = parse_assignment)]
        set: Vec<(String, String)>,
        /// Enable an optional branch (repeatable)
        #[arg(long)]
        enable: Vec<String>,
        /// Select a choice alternative (repeatable)
        #[arg(long)]
        choose: Vec<String>,
        /// Add an occurrence of a repeatable branch (repeatable)
        #[arg(long)]
        repeat: Vec<String>,
        /// Embed file contents instead of file names
        #[arg(long)]
        file_content: bool,
        /// Write the profile even when it is incomplete
        #[arg(long)]
        force: bool,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = 2)]
        indent: usize,
    },
    /// Report leaves that keep a profile from being complete
    Check {
        #[arg(long)]
        template: PathBuf,
        #[arg(long)]
        profile: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { verbose, json, cmd } = Cli::parse();

    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.into()),
        ))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cmd {
        Cmd::Validate {
            value_type,
            restrictions,
            value,
        } => cmd_validate::run(&value_type, restrictions.as_deref(), &value, json)?,
        Cmd::Tree {
            template,
            profile,
            expand_optional,
        } => cmd_tree::run(&template, profile.as_deref(), expand_optional).await?,
        Cmd::Generate {
            template,
            profile,
            set,
            enable,
            choose,
            repeat,
            file_content,
            force,
            out,
            indent,
        } => {
            let args = GenerateArgs {
                template,
                profile,
                set,
                enable,
                choose,
                repeat,
                file_content,
                force,
                out,
                indent,
            };
            cmd_generate::run(args, json).await?
        }
        Cmd::Check { template, profile } => cmd_check::run(&template, &profile, json).await?,
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_validate_defaults() {
        let cli = Cli::parse_from(["paramtreectl", "validate", "-4"]);
        match cli.cmd {
            Cmd::Validate {
                value_type,
                restrictions,
                value,
            } => {
                assert_eq!(value_type, "xs:string");
                assert_eq!(restrictions, None);
                assert_eq!(value, "-4");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn parse_generate_edits() {
        let cli = Cli::parse_from([
            "paramtreectl",
            "--json",
            "generate",
            "--template",
            "solver.xml",
            "--set",
            "Iterations=7",
            "--set",
            "Output[1]/Path=mesh.xml",
            "--enable",
            "Output",
            "--choose",
            "Method/Direct",
            "--force",
        ]);
        assert!(cli.json);
        match cli.cmd {
            Cmd::Generate {
                template,
                set,
                enable,
                choose,
                force,
                indent,
                out,
                ..
            } => {
                assert_eq!(template, PathBuf::from("solver.xml"));
                assert_eq!(
                    set,
                    vec![
                        ("Iterations".to_string(), "7".to_string()),
                        ("Output[1]/Path".to_string(), "mesh.xml".to_string()),
                    ]
                );
                assert_eq!(enable, ["Output"]);
                assert_eq!(choose, ["Method/Direct"]);
                assert!(force);
                assert_eq!(indent, 2);
                assert_eq!(out, None);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn reject_malformed_assignment() {
        let result = Cli::try_parse_from([
            "paramtreectl",
            "generate",
            "--template",
            "t.xml",
            "--set",
            "Iterations",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_check_args() {
        let cli = Cli::parse_from([
            "paramtreectl",
            "-vv",
            "check",
            "--template",
            "t.xml",
            "--profile",
            "p.xml",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.cmd {
            Cmd::Check { profile, .. } => assert_eq!(profile, PathBuf::from("p.xml")),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
