//! mdtree - Markdown source tree with live reload.
//!
//! Usage:
//!   mdtree scan [PATH]       Build the tree once and print a summary
//!   mdtree export [PATH]     Build the tree and write it as JSON
//!   mdtree watch [PATH]      Stream update events until interrupted
//!   mdtree --help            Show help
//!
//! PATH defaults to `$MDTREE_ROOT`, then `./wiki`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use tracing_subscriber::EnvFilter;

use mdtree_core::{
    DEFAULT_MAX_DEPTH, DEFAULT_MAX_ENTRIES, DEFAULT_MAX_FILE_SIZE, HubMessage, IngestConfig,
    SourceNode, SourceTree, TraversalLimits,
};
use mdtree_live::{Engine, EngineConfig, WatchConfig};
use mdtree_scan::TreeBuilder;

const DEFAULT_ROOT: &str = "./wiki";

#[derive(Parser)]
#[command(
    name = "mdtree",
    version,
    about = "Markdown source tree with live reload",
    long_about = "mdtree turns a directory of Markdown documents into a JSON tree \
                  of rendered pages and keeps it current as files change."
)]
struct Cli {
    #[command(flatten)]
    limits: LimitArgs,

    /// Log debug output to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct LimitArgs {
    /// Maximum directory depth below the root
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: u32,

    /// Maximum entries read per directory
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_ENTRIES)]
    max_entries: usize,

    /// Documents larger than this many bytes become placeholders
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_FILE_SIZE)]
    max_file_size: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Build the tree once and show a summary
    Scan {
        /// Source root
        #[arg(env = "MDTREE_ROOT", default_value = DEFAULT_ROOT)]
        path: PathBuf,

        /// Maximum depth to display
        #[arg(short, long, default_value = "3")]
        depth: u32,

        /// List every warning instead of a count
        #[arg(short, long)]
        warnings: bool,
    },

    /// Build the tree and export it as JSON
    Export {
        /// Source root
        #[arg(env = "MDTREE_ROOT", default_value = DEFAULT_ROOT)]
        path: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Include build statistics and warnings, not just the node tree
        #[arg(long)]
        full: bool,

        /// Pretty-print the JSON
        #[arg(short, long)]
        pretty: bool,
    },

    /// Watch the root and print an event frame for each update
    Watch {
        /// Source root
        #[arg(env = "MDTREE_ROOT", default_value = DEFAULT_ROOT)]
        path: PathBuf,

        /// Quiet period after the last change before rebuilding
        #[arg(long, default_value = "500")]
        debounce_ms: u64,

        /// Emit the initial tree right after the connected event
        #[arg(long)]
        initial: bool,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = ingest_config(&cli.limits)?;

    match cli.command {
        Command::Scan {
            path,
            depth,
            warnings,
        } => run_scan(&path, config, depth, warnings),
        Command::Export {
            path,
            output,
            full,
            pretty,
        } => run_export(&path, config, output, full, pretty),
        Command::Watch {
            path,
            debounce_ms,
            initial,
        } => {
            let watch = WatchConfig {
                debounce: Duration::from_millis(debounce_ms),
            };
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(run_watch(&path, config, watch, initial))
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "mdtree=debug" } else { "mdtree=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn ingest_config(args: &LimitArgs) -> Result<IngestConfig> {
    let limits = TraversalLimits::builder()
        .max_depth(args.max_depth)
        .max_entries(args.max_entries)
        .max_file_size(args.max_file_size)
        .build()?;
    let config = IngestConfig::builder()
        .limits(limits)
        .build()
        .context("Invalid traversal limits")?;
    Ok(config)
}

fn build(path: &Path, config: IngestConfig) -> Result<SourceTree> {
    eprintln!("Reading {}...", path.display());
    let builder = TreeBuilder::new(config)?;
    builder
        .build(path)
        .with_context(|| format!("Failed to build tree from {}", path.display()))
}

/// Build once and print a summary.
fn run_scan(path: &Path, config: IngestConfig, max_depth: u32, list_warnings: bool) -> Result<()> {
    let tree = build(path, config)?;
    let stats = &tree.stats;

    println!();
    println!("{}", "─".repeat(60));
    println!(" {} - {}", tree.root_path.display(), format_size(stats.total_bytes));
    println!(
        " {} documents, {} directories",
        stats.documents, stats.directories
    );
    if stats.placeholders > 0 || stats.truncated_dirs > 0 {
        println!(
            " {} placeholders, {} truncated directories",
            stats.placeholders, stats.truncated_dirs
        );
    }
    println!(" Built in {:.2}s", tree.build_duration.as_secs_f64());
    println!("{}", "─".repeat(60));
    println!();

    print_node(&tree.root, 0, max_depth);

    if tree.has_warnings() {
        println!();
        if list_warnings {
            for warning in &tree.warnings {
                println!(
                    " [{}] {}: {}",
                    warning.kind,
                    warning.path.display(),
                    warning.message
                );
            }
        } else {
            println!("{} warning(s) during build", tree.warnings.len());
        }
    }

    Ok(())
}

/// Build once and write JSON.
fn run_export(
    path: &Path,
    config: IngestConfig,
    output: Option<PathBuf>,
    full: bool,
    pretty: bool,
) -> Result<()> {
    let tree = build(path, config)?;

    let json = match (full, pretty) {
        (true, true) => serde_json::to_string_pretty(&tree)?,
        (true, false) => serde_json::to_string(&tree)?,
        (false, true) => serde_json::to_string_pretty(&*tree.root)?,
        (false, false) => serde_json::to_string(&*tree.root)?,
    };

    match output {
        Some(output_path) => {
            std::fs::write(&output_path, json)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            eprintln!("Exported to {}", output_path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}

/// Ingest, then stream event frames to stdout until Ctrl-C.
async fn run_watch(
    path: &Path,
    config: IngestConfig,
    watch: WatchConfig,
    initial: bool,
) -> Result<()> {
    let engine = Engine::new(EngineConfig {
        ingest: config,
        watch,
        ..EngineConfig::default()
    })?;

    let tree = engine
        .ingest(path)
        .await
        .with_context(|| format!("Failed to build tree from {}", path.display()))?;
    eprintln!(
        "Loaded {} documents from {}",
        tree.total_documents(),
        tree.root_path.display()
    );

    let mut updates = engine.subscribe();
    engine
        .start_live_reload(path)
        .context("Failed to start watching")?;
    eprintln!("Watching for changes, press Ctrl-C to stop");

    let mut first = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            message = updates.recv() => {
                let Some(message) = message else { break };
                emit(&message)?;
                if first && initial {
                    emit(&HubMessage::SourcesUpdated { sources: tree.root.clone() })?;
                }
                first = false;
            }
        }
    }

    engine.stop_watching();
    eprintln!("Stopped");
    Ok(())
}

fn emit(message: &HubMessage) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(message.to_event_frame()?.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Print a node and its children.
fn print_node(node: &SourceNode, depth: u32, max_depth: u32) {
    let indent = "  ".repeat(depth as usize);

    match node {
        SourceNode::Directory { name, children } => {
            println!("{}▼ {}/ ({} items)", indent, name, children.len());
            if depth < max_depth {
                for child in children {
                    print_node(child, depth + 1, max_depth);
                }
            } else if !children.is_empty() {
                println!("{}  ...", indent);
            }
        }
        SourceNode::File { document } => {
            let marker = if document.is_placeholder() { " !" } else { "" };
            println!(
                "{}  {:<40} {:>10}{}",
                indent,
                truncate(&document.title, 40),
                format_size(document.raw_content.len() as u64),
                marker
            );
        }
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 1).collect();
        format!("{}…", head)
    }
}
