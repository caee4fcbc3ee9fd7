use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use migrafix::config::{load_config, Config};
use migrafix::context::{ContextAssembler, EnterpriseCatalog};
use migrafix::deps::DependencyFixer;
use migrafix::embedder;
use migrafix::heuristics::TypeCatalog;
use migrafix::history::FixHistory;
use migrafix::mapping::MappingIndex;
use migrafix::oracle::{ChatOracle, TextOracle, UnavailableOracle};
use migrafix::packages::normalize_tree;
use migrafix::repair::FileRepairer;
use migrafix::retry::{RetryController, RunReport};
use migrafix::scanner::ScanOptions;
use migrafix::stitch::stitch_fragments;
use migrafix::validator::{BuildValidator, CommandRunner};
use migrafix::vector_store::SimilarityIndex;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "migrafix")]
#[command(version)]
#[command(about = "Repair a migrated Java project until its build passes")]
struct Cli {
    /// Config file (defaults to ./migrafix.json, then ~/.migrafix/config.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG still wins)
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only warnings and errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the migrated tree and run the repair loop
    Run {
        /// Legacy (source) project root
        #[arg(long, value_name = "DIR")]
        legacy: PathBuf,
        /// Migrated (target) project root; the build runs here
        #[arg(long, value_name = "DIR")]
        migrated: PathBuf,
        /// Versioned mapping file (source -> target)
        #[arg(long = "map", value_name = "FILE")]
        map: PathBuf,
        /// Shared framework sources offered as extra context
        #[arg(long, value_name = "DIR")]
        enterprise: Option<PathBuf>,
        /// Reference corpus for nearest-neighbour context
        #[arg(long, value_name = "DIR")]
        reference: Option<PathBuf>,
        /// Override retry.max_retries
        #[arg(long)]
        max_retries: Option<usize>,
        /// Override build.command (split on whitespace)
        #[arg(long, value_name = "CMD")]
        build_cmd: Option<String>,
        /// Override build.success_marker
        #[arg(long, value_name = "TEXT")]
        success_marker: Option<String>,
        /// Print the full run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build or refresh the reference embedding cache
    Index {
        #[arg(long, value_name = "DIR")]
        reference: PathBuf,
    },
    /// Print the fix-type summary recorded for one target file
    History {
        #[arg(long, value_name = "DIR")]
        log_dir: Option<PathBuf>,
        /// Target path, relative to the migrated root
        file: String,
    },
    /// Rewrite `package` declarations of every .java file from its location
    Normalize {
        #[arg(long, value_name = "DIR")]
        migrated: PathBuf,
        #[arg(long, value_name = "PKG")]
        base_package: String,
    },
    /// Merge migrated fragments of one class into a single target file
    Stitch {
        #[arg(long, value_name = "DIR")]
        migrated: PathBuf,
        /// Output path, relative to the migrated root
        #[arg(long, value_name = "FILE")]
        target: String,
        /// Fragment paths, relative to the migrated root, in merge order
        #[arg(required = true, value_name = "FRAGMENT")]
        fragments: Vec<String>,
    },
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.enable_steady_tick(Duration::from_millis(80));
    pb.set_message(msg.to_string());
    pb
}

fn require_dir(path: &Path, what: &str) -> Result<()> {
    if !path.is_dir() {
        bail!("{what} directory not found: {}", path.display());
    }
    Ok(())
}

fn open_similarity_index(cfg: &Config, corpus: &Path) -> Result<SimilarityIndex> {
    let model_spinner = spinner("loading embedding model...");
    let embedder = embedder::from_config(&cfg.embeddings);
    model_spinner.finish_and_clear();
    let embedder = embedder?;

    let mut index = SimilarityIndex::open(corpus, &cfg.embeddings.cache_path, embedder, cfg.token_estimator.chars_per_token);
    let exts: Vec<&str> = cfg.embeddings.extensions.iter().map(String::as_str).collect();
    let mut opts = ScanOptions::new(corpus, &exts);
    opts.include = cfg.embeddings.include.clone();
    opts.exclude_dir_names = cfg.scan.exclude_dir_names.clone();

    let index_spinner = spinner("indexing reference corpus...");
    match index.build_index(&opts) {
        Ok(stats) => index_spinner.finish_with_message(format!(
            "reference index: {} files ({} embedded, {} reused, {} removed, {} failed)",
            stats.scanned, stats.embedded, stats.reused, stats.removed, stats.failed
        )),
        Err(e) => {
            index_spinner.finish_and_clear();
            return Err(e);
        }
    }
    Ok(index)
}

fn build_oracle(cfg: &Config) -> Box<dyn TextOracle> {
    match ChatOracle::new(&cfg.oracle) {
        Ok(oracle) => Box::new(oracle),
        Err(e) => {
            log::warn!("{e}; every oracle repair will fail");
            Box::new(UnavailableOracle { reason: e.to_string() })
        }
    }
}

fn print_report(report: &RunReport, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("status: {}", report.status.as_str());
    println!("retry_attempts: {}", report.retry_attempts);
    if !report.dependency_fixes.is_empty() {
        println!("dependency_fixes: {}", report.dependency_fixes.len());
    }
    for e in &report.errors {
        println!("  {}:{}: {}", e.file, e.line, e.message);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    mut cfg: Config,
    legacy: PathBuf,
    migrated: PathBuf,
    map: PathBuf,
    enterprise: Option<PathBuf>,
    reference: Option<PathBuf>,
    max_retries: Option<usize>,
    build_cmd: Option<String>,
    success_marker: Option<String>,
    json: bool,
) -> Result<i32> {
    require_dir(&legacy, "Legacy")?;
    require_dir(&migrated, "Migrated")?;
    if let Some(dir) = enterprise.as_deref() {
        require_dir(dir, "Enterprise")?;
    }
    if let Some(n) = max_retries {
        cfg.retry.max_retries = n;
    }
    if let Some(cmd) = build_cmd {
        cfg.build.command = cmd.split_whitespace().map(str::to_string).collect();
    }
    if let Some(marker) = success_marker {
        cfg.build.success_marker = marker;
    }

    let mapping = MappingIndex::from_file(&map)?;
    log::info!("loaded {} mapping entries", mapping.len());

    let similarity = match reference.as_deref() {
        Some(dir) => {
            require_dir(dir, "Reference")?;
            match open_similarity_index(&cfg, dir) {
                Ok(index) => Some(index),
                Err(e) => {
                    log::warn!("reference retrieval disabled: {e:#}");
                    None
                }
            }
        }
        None => None,
    };

    let enterprise_catalog = match enterprise.as_deref() {
        Some(dir) => {
            let catalog = EnterpriseCatalog::scan(dir)?;
            if catalog.is_empty() {
                log::warn!("no .java files under enterprise root {}", dir.display());
            } else {
                log::info!("enterprise catalog: {} files", catalog.len());
            }
            Some(catalog)
        }
        None => None,
    };
    let mut type_roots = vec![migrated.clone()];
    type_roots.extend(enterprise.clone());
    let types = TypeCatalog::scan(&type_roots);

    let assembler = ContextAssembler::new(&legacy, &migrated, cfg.context.clone(), cfg.token_estimator.chars_per_token)
        .with_enterprise_root(enterprise.as_deref())
        .with_similarity(similarity);
    let history = FixHistory::new(&cfg.history.log_dir, cfg.history.cap_chars);
    let mut repairer = FileRepairer::new(assembler, build_oracle(&cfg), history)
        .with_types(Box::new(types))
        .with_enterprise(enterprise_catalog)
        .with_heuristics(cfg.heuristics.clone());

    let runner = CommandRunner::new(cfg.build.command.clone(), &migrated)?;
    let mut validator = BuildValidator::new(runner, &cfg.build.success_marker);
    let deps = cfg
        .retry
        .dependency_fix
        .then(|| DependencyFixer::new(&migrated, &cfg.build.build_file, cfg.build.dependency_suggestions.clone()));

    let pb = spinner("starting");
    let report = RetryController::new(&mut validator, &mut repairer, &mapping, &migrated, cfg.retry.max_retries)
        .with_dependency_fixer(deps.as_ref())
        .with_progress(|msg| pb.set_message(msg.to_string()))
        .run();
    pb.finish_and_clear();

    print_report(&report, json)?;
    Ok(report.status.exit_code())
}

fn cmd_index(cfg: Config, reference: PathBuf) -> Result<i32> {
    require_dir(&reference, "Reference")?;
    let index = open_similarity_index(&cfg, &reference)?;
    println!(
        "{}",
        serde_json::to_string(&json!({
            "cache_path": cfg.embeddings.cache_path,
            "entries": index.cache().len(),
        }))?
    );
    Ok(0)
}

fn cmd_history(cfg: Config, log_dir: Option<PathBuf>, file: String) -> Result<i32> {
    let dir = log_dir.unwrap_or(cfg.history.log_dir);
    let history = FixHistory::new(&dir, cfg.history.cap_chars);
    let entries = history.entries(&file)?;
    let summary = history.summarize_fix_types(&file)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "file": file,
            "attempts": entries.len(),
            "fix_types": summary,
        }))?
    );
    Ok(0)
}

fn cmd_normalize(migrated: PathBuf, base_package: String) -> Result<i32> {
    require_dir(&migrated, "Migrated")?;
    let updated = normalize_tree(&migrated, &base_package)
        .with_context(|| format!("Failed to normalize packages under {}", migrated.display()))?;
    println!("normalized {updated} files");
    Ok(0)
}

fn cmd_stitch(migrated: PathBuf, target: String, fragments: Vec<String>) -> Result<i32> {
    require_dir(&migrated, "Migrated")?;
    let outcome = stitch_fragments(&migrated, &target, &fragments)?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(0)
}

fn run(cli: Cli) -> Result<i32> {
    let cwd = std::env::current_dir().context("Cannot determine current directory")?;
    let cfg = load_config(cli.config.as_deref(), &cwd)?;
    match cli.command {
        Command::Run {
            legacy,
            migrated,
            map,
            enterprise,
            reference,
            max_retries,
            build_cmd,
            success_marker,
            json,
        } => cmd_run(cfg, legacy, migrated, map, enterprise, reference, max_retries, build_cmd, success_marker, json),
        Command::Index { reference } => cmd_index(cfg, reference),
        Command::History { log_dir, file } => cmd_history(cfg, log_dir, file),
        Command::Normalize { migrated, base_package } => cmd_normalize(migrated, base_package),
        Command::Stitch {
            migrated,
            target,
            fragments,
        } => cmd_stitch(migrated, target, fragments),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            1
        }
    };
    std::process::exit(code);
}
