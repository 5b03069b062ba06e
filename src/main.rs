mod app;
mod block;
mod click;
mod config;
mod edit;
mod flatten;
mod markdown;
mod resolve;
mod score;
mod task;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use click::{handle_preview_click, parse_line_hint, truncate_preview, ClickTarget, Outcome, Skip};
use edit::{DocumentStore, FileStore, Snapshot};
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const NO_MATCH_EXIT: u8 = 3;

#[derive(Parser)]
#[command(
    name = "taskmark",
    version,
    about = "Markdown task viewer that cycles task markers on click"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Markdown file to open
    file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the config file in $EDITOR (default: nvim)
    Config,
    /// Advance the marker of the task matching TEXT and save the file
    Cycle {
        file: PathBuf,
        #[command(flatten)]
        query: Query,
    },
    /// Show which line a click on TEXT would change, without writing
    Locate {
        file: PathBuf,
        #[command(flatten)]
        query: Query,
    },
    /// List every task line with its marker and flattened text
    List { file: PathBuf },
}

#[derive(clap::Args)]
struct Query {
    /// Zero-based source line the task is expected near
    #[arg(long)]
    line: Option<String>,
    /// Rendered task text; without it `--line` is taken as exact
    #[arg(long, required_unless_present = "line")]
    text: Option<String>,
}

impl Query {
    fn hint(&self) -> Option<usize> {
        self.line.as_deref().and_then(parse_line_hint)
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Some(command) = cli.command {
        init_stderr_logging();
        return match command {
            Commands::Config => config::open_config_in_editor().map(|_| ExitCode::SUCCESS),
            Commands::Cycle { file, query } => run_cycle(file, &query),
            Commands::Locate { file, query } => run_locate(file, &query),
            Commands::List { file } => run_list(file).map(|_| ExitCode::SUCCESS),
        };
    }

    let file = cli
        .file
        .ok_or_else(|| anyhow::anyhow!("No file provided. Try `taskmark <file.md>`."))?;

    let cfg = config::load_config()?;
    init_file_logging()?;
    app::run_app(file, cfg)?;
    Ok(ExitCode::SUCCESS)
}

fn run_cycle(file: PathBuf, query: &Query) -> Result<ExitCode> {
    let cfg = config::load_config()?;
    let cycle = cfg.marker_cycle()?;
    let store = FileStore::new(file);
    let Some(text) = query.text.as_deref() else {
        let index = query.hint().context("--line must be a line number")?;
        return match edit::apply_whole_file(&store, index, &cycle)? {
            Some(line) => {
                println!("{index}\t{line}");
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("{}: line {index} is not a task", store.path().display());
                Ok(ExitCode::from(NO_MATCH_EXIT))
            }
        };
    };
    let target = ClickTarget {
        element: 0,
        hint: query.hint(),
        preview: truncate_preview(text, cfg.preview_max_chars),
    };
    match handle_preview_click(&store, &target, &cycle)? {
        Outcome::Cycled { index, line } => {
            println!("{index}\t{line}");
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Skipped(skip) => {
            let reason = match skip {
                Skip::NoMatch => "no matching task",
                Skip::NotTask => "matched line is not a task",
            };
            eprintln!("{}: {reason}", store.path().display());
            Ok(ExitCode::from(NO_MATCH_EXIT))
        }
    }
}

fn run_locate(file: PathBuf, query: &Query) -> Result<ExitCode> {
    let cfg = config::load_config()?;
    let store = FileStore::new(file);
    let snapshot = Snapshot::from_text(&store.read_whole()?);
    let expected = query
        .text
        .as_deref()
        .and_then(|text| truncate_preview(text, cfg.preview_max_chars))
        .unwrap_or_default();
    match resolve::resolve_task_line(&snapshot.lines, query.hint(), &expected) {
        Some(found) => {
            println!("{}\t{}\t{}", found.index, found.score, snapshot.lines[found.index]);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("{}: no matching task", store.path().display());
            Ok(ExitCode::from(NO_MATCH_EXIT))
        }
    }
}

fn run_list(file: PathBuf) -> Result<()> {
    let store = FileStore::new(file);
    let snapshot = Snapshot::from_text(&store.read_whole()?);
    for (index, line) in snapshot.lines.iter().enumerate() {
        let Some(task) = task::TaskLine::parse(line) else {
            continue;
        };
        let text = flatten::flatten(&block::assemble_block(&snapshot.lines, index));
        println!("{index}\t[{}]\t{text}", task.marker);
    }
    Ok(())
}

// Logging is opt-in via TASKMARK_LOG; invalid or huge filters are ignored.
fn log_filter() -> Option<EnvFilter> {
    std::env::var("TASKMARK_LOG").ok().and_then(|raw| {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > 4096 {
            return None;
        }
        EnvFilter::try_new(raw).ok()
    })
}

fn init_stderr_logging() {
    let Some(filter) = log_filter() else {
        return;
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

// The TUI owns the terminal, so its log goes to a file under the cache dir.
fn init_file_logging() -> Result<()> {
    let Some(filter) = log_filter() else {
        return Ok(());
    };
    let path = config::log_path()?;
    config::ensure_parent_dir(&path)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .with(filter)
        .init();
    Ok(())
}
