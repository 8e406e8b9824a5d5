//! diskbridge Daemon
//!
//! Serves disk, partition and file browsing to a remote peer.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use daemon::config::Config;
use daemon::files::FileStreamer;
use daemon::server::{Server, SessionFactory};
use daemon::storage::{Hierarchy, LsblkEnumerator, StorageAdapter, StorageEnumerator};
use tokio_util::sync::CancellationToken;

/// diskbridge Daemon - remote disk, partition and file browser.
#[derive(Parser, Debug)]
#[command(name = "diskbridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Accept peer connections and serve browse requests
    Serve {
        /// Address to listen on (overrides the config file)
        #[arg(long, short, value_name = "ADDR")]
        listen: Option<String>,
    },

    /// Enumerate local disks and partitions once and print them
    List {
        /// Also list the files of each mounted partition
        #[arg(long)]
        files: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, overrides) = load_config(&cli)?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.daemon.log_level.as_str()
    };
    daemon::logging::init(level, config.daemon.log_dir.as_deref())?;

    for (key, value) in &overrides {
        tracing::info!(key = *key, value = %value, "Overriding configuration from environment");
    }
    tracing::debug!(config = ?cli.config, "configuration loaded");

    match cli.command {
        Commands::Serve { .. } => run_server(&config).await?,
        Commands::List { files, json } => {
            let enumerator = LsblkEnumerator::locate(&config.storage.lsblk_program)?;
            let adapter = StorageAdapter::new(enumerator, config.storage.mount_prefix.clone());
            let model = inventory(&adapter, &config, files)?;

            if json {
                println!("{}", serde_json::to_string_pretty(model.disks())?);
            } else {
                print!("{}", render_tree(&model, files));
            }
        }
    }

    Ok(())
}

/// Load, override and validate the configuration.
///
/// Returns the environment overrides that were applied. Nothing is logged
/// here since the subscriber depends on the result.
fn load_config(cli: &Cli) -> anyhow::Result<(Config, Vec<(&'static str, String)>)> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    let overrides = config.apply_env_overrides();

    if let Commands::Serve {
        listen: Some(addr), ..
    } = &cli.command
    {
        config.transport.listen_addr = addr.clone();
    }

    config.validate()?;
    Ok((config, overrides))
}

async fn run_server(config: &Config) -> anyhow::Result<()> {
    let enumerator = LsblkEnumerator::locate(&config.storage.lsblk_program)
        .context("cannot enumerate storage")?;
    let factory = SessionFactory {
        enumerator,
        mount_prefix: config.storage.mount_prefix.clone(),
        capacity: config.capacity(),
        streamer: FileStreamer::new(config.transfer.staging_dir.clone()),
        options: config.session_options(),
    };

    let addr = config.listen_addr()?;
    let server = Server::bind(addr, factory)
        .await
        .with_context(|| format!("failed to listen on {addr}"))?;
    tracing::info!(addr = %server.local_addr()?, "diskbridge daemon listening");

    let shutdown = CancellationToken::new();
    let serving = tokio::spawn(server.serve(shutdown.clone()));

    wait_for_shutdown_signal().await?;
    shutdown.cancel();

    let served = serving.await.context("server task failed")?;
    tracing::info!(sessions = served, "diskbridge daemon stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}

/// Enumerate every disk and its partitions, and optionally their files.
///
/// Per-disk and per-partition failures are logged and leave that entry empty.
fn inventory<E: StorageEnumerator>(
    adapter: &StorageAdapter<E>,
    config: &Config,
    files: bool,
) -> anyhow::Result<Hierarchy> {
    let mut model = Hierarchy::new(config.capacity());
    adapter
        .load_disks(&mut model)
        .context("failed to enumerate disks")?;

    let disks: Vec<_> = model
        .disks()
        .iter()
        .filter_map(|d| model.find_disk(d.name()))
        .collect();

    for disk in disks {
        if let Err(e) = adapter.ensure_partitions(&mut model, disk) {
            tracing::warn!(error = %e, "failed to enumerate partitions");
            continue;
        }
        if !files {
            continue;
        }

        let partitions: Vec<_> = model
            .disk(disk)
            .map(|d| {
                d.partitions()
                    .iter()
                    .filter_map(|p| model.find_partition(disk, p.name()))
                    .collect()
            })
            .unwrap_or_default();
        for partition in partitions {
            if let Err(e) = adapter.ensure_files(&mut model, disk, partition) {
                tracing::warn!(error = %e, "failed to list files");
            }
        }
    }

    Ok(model)
}

/// Render the hierarchy as an indented tree.
fn render_tree(model: &Hierarchy, files: bool) -> String {
    let mut out = String::new();
    if model.disks().is_empty() {
        out.push_str("no disks found\n");
        return out;
    }

    for disk in model.disks() {
        let _ = writeln!(out, "{}", disk.name());
        for partition in disk.partitions() {
            let _ = writeln!(
                out,
                "  {}  {}",
                partition.name(),
                partition.mount_point().display()
            );
            if files {
                for file in partition.files() {
                    let _ = writeln!(out, "    {}", file.name());
                }
            }
        }
    }
    out
}
