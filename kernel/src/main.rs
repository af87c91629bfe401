//! Redline command-line entry point.
//!
//! A thin shell over the kernel: preview a change as a unified diff, follow
//! content streamed on stdin, apply a file's content to a workspace target,
//! or prune expired backups.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use redline_kernel::apply::{ApplyOptions, ApplyOrchestrator, FileOperation};
use redline_kernel::diff::{compute_file_diff, render_unified};
use redline_kernel::events::{EventError, RedlineEvent};
use redline_kernel::infrastructure::config::Settings;
use redline_kernel::infrastructure::telemetry::TelemetryBuilder;
use redline_kernel::streaming::{ContentBlock, StreamingDiffCoordinator};
use redline_kernel::vfs::{BackupStore, LocalFileSystem};

#[derive(Parser, Debug)]
#[command(name = "redline")]
#[command(version)]
#[command(about = "Preview, apply and prune file changes", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the unified diff between two files
    Diff {
        /// Original file (may be missing, for a new-file diff)
        old: PathBuf,
        /// Proposed file (may be missing, for a delete diff)
        new: PathBuf,
        /// Context lines around each change (overrides configuration)
        #[arg(short = 'U', long)]
        context: Option<usize>,
        /// Treat lines differing only in whitespace as equal
        #[arg(short = 'w', long)]
        ignore_whitespace: bool,
    },

    /// Diff content read line by line from stdin against TARGET as it arrives
    Stream {
        /// Workspace root
        workspace: PathBuf,
        /// Target path, relative to the workspace
        target: PathBuf,
    },

    /// Write the content of SOURCE to TARGET inside WORKSPACE
    Apply {
        /// Workspace root
        workspace: PathBuf,
        /// Target path, relative to the workspace
        target: PathBuf,
        /// File holding the new content
        source: PathBuf,
        /// Skip the backup of an existing target
        #[arg(long)]
        no_backup: bool,
    },

    /// Remove backups older than the configured maximum age
    Cleanup {
        /// Keep pruning at the configured interval until interrupted
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::new().context("Failed to load configuration")?;

    TelemetryBuilder::from_settings(&settings.telemetry)
        .init()
        .context("Failed to initialize telemetry")?;

    match args.command {
        Commands::Diff {
            old,
            new,
            context,
            ignore_whitespace,
        } => diff(&settings, &old, &new, context, ignore_whitespace).await,
        Commands::Stream { workspace, target } => stream(&settings, &workspace, target).await,
        Commands::Apply {
            workspace,
            target,
            source,
            no_backup,
        } => apply(&settings, &workspace, target, &source, no_backup).await,
        Commands::Cleanup { watch } => cleanup(&settings, watch).await,
    }
}

async fn stream(settings: &Settings, workspace: &Path, target: PathBuf) -> Result<()> {
    let coordinator = StreamingDiffCoordinator::builder(Arc::new(LocalFileSystem::new()))
        .options(settings.diff.to_options()?)
        .debounce(settings.streaming.debounce())
        .build();

    let mut events = coordinator.events().subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RedlineEvent::DiffComputed {
                    revision, result, ..
                }) => {
                    let stats = result.stats();
                    eprintln!(
                        "revision {revision}: +{} -{} ~{}",
                        stats.added, stats.removed, stats.modified
                    );
                }
                Ok(_) | Err(EventError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
    });

    let mut block = ContentBlock::new("stdin", target.clone(), String::new());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut first = true;
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        block.content.push_str(&line);
        block.content.push('\n');
        if first {
            coordinator.on_content_detected(&block, workspace);
            first = false;
        } else {
            coordinator.on_content_updated(&block, workspace);
        }
    }

    let result = coordinator
        .finalize(&block, workspace)
        .await
        .context("Failed to compute the final diff")?;
    reporter.abort();
    let label = target.display().to_string();
    print!("{}", render_unified(&result, &label, &label));
    Ok(())
}

async fn cleanup(settings: &Settings, watch: bool) -> Result<()> {
    let store = Arc::new(BackupStore::new(&settings.backup.directory));
    if !watch {
        let removed = store.cleanup_expired(settings.backup.max_age()).await;
        println!("Removed {removed} expired backup(s)");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let task = store.spawn_cleanup_task(
        settings.backup.cleanup_interval(),
        settings.backup.max_age(),
        cancel.clone(),
    );
    info!(
        interval_secs = settings.backup.cleanup_interval_secs,
        "Pruning backups until interrupted"
    );
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for interrupt")?;
    debug!("Interrupt received");
    cancel.cancel();
    task.await.context("Cleanup task failed")?;
    Ok(())
}

async fn diff(
    settings: &Settings,
    old: &Path,
    new: &Path,
    context: Option<usize>,
    ignore_whitespace: bool,
) -> Result<()> {
    let mut diff_settings = settings.diff.clone();
    if let Some(context) = context {
        diff_settings.context_lines = context;
    }
    diff_settings.ignore_whitespace |= ignore_whitespace;
    let options = diff_settings.to_options()?;

    let original = read_optional(old).await?;
    let proposed = read_optional(new).await?;
    if original.is_none() && proposed.is_none() {
        bail!("Neither '{}' nor '{}' exists", old.display(), new.display());
    }

    let result = compute_file_diff(original.as_deref(), proposed.as_deref(), new, &options);
    print!(
        "{}",
        render_unified(&result, &old.display().to_string(), &new.display().to_string())
    );
    Ok(())
}

async fn apply(
    settings: &Settings,
    workspace: &Path,
    target: PathBuf,
    source: &Path,
    no_backup: bool,
) -> Result<()> {
    let content = tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("Failed to read '{}'", source.display()))?;

    let backups = Arc::new(BackupStore::new(&settings.backup.directory));
    let orchestrator = ApplyOrchestrator::new(Arc::new(LocalFileSystem::new()), backups)
        .with_history_limit(settings.history.max_records_per_file);
    let options = ApplyOptions {
        create_backup: !no_backup,
        ..ApplyOptions::default()
    };

    let result = orchestrator
        .apply_operation(
            &FileOperation::write(target, content),
            workspace,
            options,
            &CancellationToken::new(),
        )
        .await;
    if let Some(error) = result.error {
        return Err(error).context("Apply failed");
    }
    for record in &result.records {
        info!(record_id = %record.id, "Change recorded");
        println!("{}", serde_json::to_string_pretty(record)?);
    }
    Ok(())
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read '{}'", path.display())),
    }
}
