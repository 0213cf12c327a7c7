use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "refdb", about = "Reference store maintenance: migrate, verify, list", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repository directory
    #[arg(long, global = true, default_value = ".")]
    pub repo: PathBuf,

    /// Debug logging on stderr
    #[arg(short = 'v', global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty repository
    Init(InitArgs),
    /// Low-level access to the reference store
    #[command(subcommand)]
    Refs(RefsCommand),
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Storage format; defaults to `[refs] default_format` from config.toml
    #[arg(long = "ref-format")]
    pub ref_format: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum RefsCommand {
    /// Move the reference store to another storage format
    Migrate(MigrateArgs),
    /// Check the reference stores of every worktree
    Verify(VerifyArgs),
    /// List references
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    #[arg(long = "ref-format")]
    pub ref_format: String,
    /// Stage the migration without publishing it
    #[arg(long)]
    pub dry_run: bool,
    /// Do not carry reflogs over
    #[arg(long = "no-reflog")]
    pub no_reflog: bool,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Also check reflog order and per-worktree placement; warnings fail
    #[arg(long)]
    pub strict: bool,
    /// Print every ref as it is checked
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Patterns matched against full ref names
    pub patterns: Vec<String>,

    /// Read patterns from standard input, one per line
    #[arg(long)]
    pub stdin: bool,

    /// Show at most N refs; 0 shows all
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub count: i64,

    #[arg(short = 's', long)]
    pub shell: bool,
    #[arg(short = 'p', long)]
    pub perl: bool,
    #[arg(long)]
    pub python: bool,
    #[arg(long)]
    pub tcl: bool,

    /// Sort key, e.g. `refname`, `-objectsize`, `version:refname`
    #[arg(long)]
    pub sort: Vec<String>,

    /// Output template with `%(atom)` placeholders
    #[arg(long)]
    pub format: Option<String>,

    #[arg(long)]
    pub include_root_refs: bool,

    /// Only refs pointing at the object, directly or through a tag
    #[arg(long = "points-at", value_name = "OBJECT")]
    pub points_at: Vec<String>,

    #[arg(long, value_name = "OBJECT", num_args = 0..=1, require_equals = true, default_missing_value = "HEAD")]
    pub merged: Vec<String>,

    #[arg(long = "no-merged", value_name = "OBJECT", num_args = 0..=1, require_equals = true, default_missing_value = "HEAD")]
    pub no_merged: Vec<String>,

    #[arg(long, value_name = "OBJECT", num_args = 0..=1, require_equals = true, default_missing_value = "HEAD")]
    pub contains: Vec<String>,

    #[arg(long = "no-contains", value_name = "OBJECT", num_args = 0..=1, require_equals = true, default_missing_value = "HEAD")]
    pub no_contains: Vec<String>,

    #[arg(long)]
    pub exclude: Vec<String>,

    #[arg(long)]
    pub ignore_case: bool,

    /// Skip lines that render empty
    #[arg(long)]
    pub omit_empty: bool,

    #[arg(long)]
    pub branches: bool,

    #[arg(long)]
    pub tags: bool,

    #[arg(long)]
    pub remotes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_args(argv: &[&str]) -> ListArgs {
        let mut full = vec!["refdb", "refs", "list"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Command::Refs(RefsCommand::List(args)) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn migrate_flags() {
        let cli = Cli::try_parse_from(["refdb", "--repo", "/tmp/r", "refs", "migrate", "--ref-format=table", "--dry-run"])
            .unwrap();
        assert_eq!(cli.repo, PathBuf::from("/tmp/r"));
        match cli.command {
            Command::Refs(RefsCommand::Migrate(args)) => {
                assert_eq!(args.ref_format, "table");
                assert!(args.dry_run);
                assert!(!args.no_reflog);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(["refdb", "refs", "migrate"]).is_err());
    }

    #[test]
    fn verify_flags() {
        let cli = Cli::try_parse_from(["refdb", "-v", "refs", "verify", "--strict"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(
            cli.command,
            Command::Refs(RefsCommand::Verify(VerifyArgs { strict: true, verbose: false }))
        ));
    }

    #[test]
    fn bare_ancestry_options_default_to_head() {
        let args = list_args(&["--merged", "--no-contains=v1", "refs/heads"]);
        assert_eq!(args.merged, vec!["HEAD"]);
        assert_eq!(args.no_contains, vec!["v1"]);
        assert_eq!(args.patterns, vec!["refs/heads"]);
        assert!(args.contains.is_empty());
    }

    #[test]
    fn list_options() {
        let args = list_args(&[
            "--sort=-refname",
            "--sort",
            "objectsize",
            "--format",
            "%(refname:short)",
            "--count=-1",
            "--shell",
            "--branches",
            "--exclude",
            "refs/heads/wip",
        ]);
        assert_eq!(args.sort, vec!["-refname", "objectsize"]);
        assert_eq!(args.format.as_deref(), Some("%(refname:short)"));
        assert_eq!(args.count, -1);
        assert!(args.shell && args.branches);
        assert_eq!(args.exclude, vec!["refs/heads/wip"]);
    }
}
