use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context};
use colored::Colorize;

use refdb_filter::{list, ListRequest, ObjectFilter, QuoteStyle, RefKinds};
use refdb_fsck::{verify_worktrees, FsckOptions, Severity, VerificationReport};
use refdb_migrate::{migrate_repository, MigrationFlags};
use refdb_refs::names::check_refname_format;
use refdb_refs::{RefStorageFormat, RefView, RepoConfig, WorktreeRegistry};
use refdb_store::LooseObjectStore;
use refdb_types::ObjectId;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = RepoConfig::load_from_repo(&cli.repo)
        .with_context(|| format!("cannot load configuration of {}", cli.repo.display()))?;
    match cli.command {
        Command::Init(args) => cmd_init(&cli.repo, &config, args),
        Command::Refs(RefsCommand::Migrate(args)) => cmd_migrate(&cli.repo, args),
        Command::Refs(RefsCommand::Verify(args)) => cmd_verify(&cli.repo, &config, args),
        Command::Refs(RefsCommand::List(args)) => {
            let stdout = io::stdout();
            cmd_list(&cli.repo, &config, args, &mut io::stdin().lock(), &mut stdout.lock())
        }
    }
}

fn cmd_init(repo: &Path, config: &RepoConfig, args: InitArgs) -> anyhow::Result<ExitCode> {
    let format = match args.ref_format {
        Some(name) => name.parse::<RefStorageFormat>()?,
        None => config.refs.default_format,
    };
    WorktreeRegistry::init(repo, format)?;
    println!(
        "{} Initialized repository in {} ({} refs)",
        "✓".green().bold(),
        repo.display().to_string().bold(),
        format.to_string().cyan()
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_migrate(repo: &Path, args: MigrateArgs) -> anyhow::Result<ExitCode> {
    let registry = WorktreeRegistry::open(repo)?;
    let flags = MigrationFlags {
        dry_run: args.dry_run,
        drop_reflogs: args.no_reflog,
    };
    let report = migrate_repository(&registry, &args.ref_format, flags)?;
    for rejected in &report.rejected {
        println!("  {} {}: {}", "rejected".red(), rejected.name.yellow(), rejected.reason);
    }
    let mark = if report.is_clean() { "✓".green().bold() } else { "✗".red().bold() };
    println!("{mark} {report}");
    Ok(if report.is_clean() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn cmd_verify(repo: &Path, config: &RepoConfig, args: VerifyArgs) -> anyhow::Result<ExitCode> {
    let registry = WorktreeRegistry::open(repo)?;
    let objects = LooseObjectStore::open(registry.objects_dir());
    let options = FsckOptions::from_config(&config.fsck)?
        .strict(args.strict)
        .verbose(args.verbose);
    let reports = verify_worktrees(&registry, &objects, &options)?;

    let mut failed = false;
    for report in &reports {
        print_report(report, args.verbose);
        failed |= report.failed();
    }
    if failed {
        println!("{} reference verification failed", "✗".red().bold());
        Ok(ExitCode::FAILURE)
    } else {
        println!("{} references verified", "✓".green().bold());
        Ok(ExitCode::SUCCESS)
    }
}

fn print_report(report: &VerificationReport, verbose: bool) {
    println!("{}", report.database.bold());
    if verbose {
        for name in &report.checked {
            println!("  checking {}", name.dimmed());
        }
    }
    if let Some(error) = &report.error {
        println!("  {}: {error}", "error".red().bold());
    }
    for violation in &report.violations {
        let severity = match violation.severity {
            Severity::Error => violation.severity.to_string().red().bold(),
            Severity::Warn => violation.severity.to_string().yellow(),
            Severity::Ignore => continue,
        };
        println!(
            "  {severity}: {}: {}: {}",
            violation.name.yellow(),
            violation.kind,
            violation.description
        );
    }
}

fn cmd_list(
    repo: &Path,
    config: &RepoConfig,
    args: ListArgs,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> anyhow::Result<ExitCode> {
    let registry = WorktreeRegistry::open(repo)?;
    let shared = registry.shared_database()?;
    let view = RefView::new(&shared);
    let objects = LooseObjectStore::open(registry.objects_dir());

    let stdin_patterns = if args.stdin {
        let mut patterns = Vec::new();
        for line in input.lines() {
            let line = line.context("cannot read patterns from standard input")?;
            if !line.is_empty() {
                patterns.push(line);
            }
        }
        Some(patterns)
    } else {
        None
    };

    let mut request = ListRequest {
        patterns: args.patterns,
        stdin_patterns,
        exclude: args.exclude,
        kinds: kinds(args.branches, args.tags, args.remotes),
        include_root_refs: args.include_root_refs,
        objects: ObjectFilter::default(),
        ignore_case: args.ignore_case,
        sort: if args.sort.is_empty() { config.list.sort.clone() } else { args.sort },
        format: args.format.or_else(|| config.list.format.clone()),
        quote: [
            (args.shell, QuoteStyle::Shell),
            (args.perl, QuoteStyle::Perl),
            (args.python, QuoteStyle::Python),
            (args.tcl, QuoteStyle::Tcl),
        ]
        .into_iter()
        .filter_map(|(set, style)| set.then_some(style))
        .collect(),
        omit_empty: args.omit_empty,
        count: args.count,
    };
    request.validate()?;

    let resolve_all = |specs: &[String]| -> anyhow::Result<Vec<ObjectId>> {
        specs.iter().map(|spec| resolve_object(&view, spec)).collect()
    };
    request.objects = ObjectFilter {
        points_at: resolve_all(&args.points_at)?,
        merged: resolve_all(&args.merged)?,
        no_merged: resolve_all(&args.no_merged)?,
        contains: resolve_all(&args.contains)?,
        no_contains: resolve_all(&args.no_contains)?,
    };

    for line in list(&view, &objects, &request)? {
        writeln!(out, "{}", line?)?;
    }
    Ok(ExitCode::SUCCESS)
}

fn kinds(branches: bool, tags: bool, remotes: bool) -> RefKinds {
    let mut kinds = RefKinds::empty();
    kinds.set(RefKinds::BRANCHES, branches);
    kinds.set(RefKinds::TAGS, tags);
    kinds.set(RefKinds::REMOTES, remotes);
    kinds
}

/// A full hex object id, or a ref name in any of its usual short forms.
fn resolve_object(view: &RefView<'_>, spec: &str) -> anyhow::Result<ObjectId> {
    if let Ok(id) = ObjectId::from_hex(spec) {
        return Ok(id);
    }
    let candidates = [
        spec.to_string(),
        format!("refs/{spec}"),
        format!("refs/tags/{spec}"),
        format!("refs/heads/{spec}"),
        format!("refs/remotes/{spec}"),
    ];
    for name in candidates.iter().filter(|name| check_refname_format(name).is_ok()) {
        match view.resolve(name) {
            Ok(resolved) => match resolved.id {
                Some(id) => return Ok(id),
                None => bail!("'{spec}' does not point at an object yet"),
            },
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e).with_context(|| format!("cannot resolve '{spec}'")),
        }
    }
    bail!("malformed object name '{spec}'")
}
