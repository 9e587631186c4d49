use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mailsync_core::config::Config;
use mailsync_core::core_sync::{
    Attributes, BaselineStore, EngineSnapshot, FileBaselineStore, MemoryBaselineStore,
    MemoryReplicaStore, Record, RecordId, RecordSet, Side, SideReconciler, SyncEngine,
};
use mailsync_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use mailsync_core::metrics::init_metrics;
use mailsync_core::shutdown::{install_signal_handlers, ShutdownCoordinator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mailsync")]
#[command(author, version, about = "Two-replica mailbox synchronization", long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// TOML config file; MAILSYNC_* environment variables are used without one
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay the two-pass mailbox scenario and print both sides after each pass
    Demo {
        /// Print snapshots as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Keep two demo mailboxes in sync until interrupted
    Watch {
        /// Seconds between cycles; defaults to the configured cycle_interval
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop on its own after this many seconds
        #[arg(long)]
        stop_after: Option<u64>,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env().context("reading MAILSYNC_* environment")?,
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    Ok(config)
}

/// Mailboxes as they stand after an earlier sync agreed on records 1 and 2:
/// right has since marked 2 read and received 3
fn demo_mailboxes() -> Result<(MemoryReplicaStore, MemoryReplicaStore, RecordSet)> {
    let agreed = vec![
        Record::with_id(1, "Welcome to your mailbox"),
        Record::with_id(2, "Quarterly report"),
    ];
    let left = MemoryReplicaStore::with_records(agreed.clone())?.with_identity_space(1, 2);
    let right = MemoryReplicaStore::with_records(vec![
        Record::with_id(1, "Welcome to your mailbox"),
        Record::with_id(2, "Quarterly report").with_attribute(Attributes::READ, true),
        Record::with_id(3, "Lunch on Friday?"),
    ])?
    .with_identity_space(0, 2);
    Ok((left, right, RecordSet::from_records(agreed)?))
}

fn demo_engine(
    left: &MemoryReplicaStore,
    right: &MemoryReplicaStore,
    agreed: &RecordSet,
    config: &Config,
) -> SyncEngine {
    let slot = || MemoryBaselineStore::with_baseline(agreed.clone());
    SyncEngine::new(
        SideReconciler::new(Side::Left, left.clone(), slot(), slot()),
        SideReconciler::new(Side::Right, right.clone(), slot(), slot()),
        config.sync.clone(),
    )
}

fn print_snapshot(pass: usize, outcome: &str, snapshot: &EngineSnapshot, json: bool) -> Result<()> {
    if json {
        let line = serde_json::json!({
            "pass": pass,
            "outcome": outcome,
            "converged": snapshot.converged(),
            "snapshot": snapshot,
        });
        println!("{}", serde_json::to_string(&line)?);
        return Ok(());
    }

    println!("== pass {} ({}) ==", pass, outcome);
    for side in [&snapshot.left, &snapshot.right] {
        println!("{} store:         {}", side.side, side.store);
        println!("{} own baseline:  {}", side.side, side.own_baseline);
        println!("{} peer baseline: {}", side.side, side.peer_baseline);
    }
    println!("converged: {}", snapshot.converged());
    Ok(())
}

async fn run_demo(config: &Config, json: bool) -> Result<()> {
    let (left, right, agreed) = demo_mailboxes()?;
    let engine = demo_engine(&left, &right, &agreed, config);

    let report = engine.run_cycle().await?;
    info!(cycle = %report.cycle_id, "pass 1 finished");
    print_snapshot(1, &format!("{:?}", report.outcome()), &engine.inspect().await?, json)?;

    right.modify(RecordId(3), |r| r.mark_important()).await;
    let report = engine.run_cycle().await?;
    info!(cycle = %report.cycle_id, "pass 2 finished");
    print_snapshot(2, &format!("{:?}", report.outcome()), &engine.inspect().await?, json)?;

    let report = engine.run_cycle().await?;
    if !report.is_quiescent() {
        warn!("replicas still differ after two passes");
    }
    Ok(())
}

async fn run_watch(config: &Config, interval: Option<u64>, stop_after: Option<u64>) -> Result<()> {
    let mut sync = config.sync.clone();
    if let Some(secs) = interval {
        sync.cycle_interval = Duration::from_secs(secs.max(1));
    }

    let (left, right, agreed) = demo_mailboxes()?;
    let state_dir = &config.baseline.state_dir;
    for name in ["left.own", "left.peer", "right.own", "right.peer"] {
        let slot = FileBaselineStore::in_dir(state_dir, name);
        if !slot.path().exists() {
            slot.write(agreed.clone()).await?;
        }
    }
    let engine = SyncEngine::new(
        SideReconciler::with_file_baselines(Side::Left, left, state_dir),
        SideReconciler::with_file_baselines(Side::Right, right, state_dir),
        sync,
    );

    let coordinator = Arc::new(ShutdownCoordinator::new(config.sync.apply_timeout));
    install_signal_handlers(Arc::clone(&coordinator));
    if let Some(secs) = stop_after {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            coordinator.shutdown().await;
        });
    }

    info!(
        state_dir = %state_dir.display(),
        interval = ?engine.config().cycle_interval,
        "watching replicas"
    );

    let periodic = engine.run_periodic(coordinator.wait_for_shutdown());
    tokio::pin!(periodic);
    let overdue = async {
        coordinator.wait_for_shutdown().await;
        tokio::time::sleep(coordinator.grace()).await;
    };

    tokio::select! {
        stats = &mut periodic => {
            info!(
                cycles = stats.total_cycles(),
                committed = stats.cycles_committed,
                conflicted = stats.cycles_conflicted,
                failed = stats.cycles_failed,
                changes = stats.changes_sent,
                "stopped watching"
            );
        }
        _ = overdue => warn!("cycle still applying after grace period, exiting"),
    }

    coordinator.complete().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let log_config = LogConfig::from_config(&config.logging).unwrap_or_else(|e| {
        eprintln!("{}, using 'info'", e);
        LogConfig::new(LogLevel::Info).json_format(config.logging.json_format)
    });
    init_logging_with_config(log_config)?;
    init_metrics();

    info!("mailsync started");

    match args.command {
        Command::Demo { json } => run_demo(&config, json).await?,
        Command::Watch {
            interval,
            stop_after,
        } => run_watch(&config, interval, stop_after).await?,
    }

    info!("mailsync finished");

    Ok(())
}
