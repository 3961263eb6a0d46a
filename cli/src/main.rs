use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use lib_gwsync::cache::{CacheBackend, CacheStore, FileBackend, MemoryBackend, RedisBackend};
use lib_gwsync::configs::{CacheBackendKind, SyncConfig};
use lib_gwsync::core::{launch, LeagueSnapshot, SnapshotPhase, SyncEngine};
use lib_gwsync::feeds::HttpGameweekSource;
use lib_gwsync::ingestors::{transport_for, ChannelSettings, ConnectionState};

mod config;
mod logger;

/// Rows printed in the standings table.
const TABLE_ROWS: usize = 20;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = config::Cli::parse();
    let cfg = config::resolve(&cli)?;
    logger::setup_logging(&cfg.log_dir, &cfg.log_level)?;
    log::info!(
        "gw-sync starting: api={} live={} cache={:?}",
        cfg.api_base,
        cfg.live_url,
        cfg.cache_backend
    );

    let backend = open_backend(&cfg).await?;
    let cache = CacheStore::new(backend, cfg.schema_version);
    let source = Arc::new(HttpGameweekSource::from_config(&cfg)?);
    let engine = SyncEngine::new(source, cache);

    if cli.once {
        let handle = engine.run_cycle().await?;
        let outcome = handle.finish().await;
        log::info!("Cycle finished: {:?}", outcome);
        print_snapshot(&engine.snapshot(), cli.json)?;
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let transport = transport_for(&cfg.live_url, cfg.request_timeout())?;
    let running = launch(
        Arc::clone(&engine),
        transport,
        ChannelSettings::from(&cfg),
        cfg.full_resync_interval(),
        &shutdown,
    );

    let printer = {
        let mut snapshots = engine.subscribe();
        let mut connection = running.connection.clone();
        let stop = shutdown.child_token();
        let json = cli.json;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snap = Arc::clone(&snapshots.borrow_and_update());
                        if let Err(e) = print_snapshot(&snap, json) {
                            log::error!("Failed to render snapshot: {}", e);
                        }
                    }
                    changed = connection.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = *connection.borrow_and_update();
                        print_connection(state);
                    }
                }
            }
        })
    };

    wait_for_signal().await?;

    shutdown.cancel();
    running.join().await;
    let _ = printer.await;

    log::info!("Shutdown complete.");
    Ok(())
}

async fn open_backend(cfg: &SyncConfig) -> Result<Arc<dyn CacheBackend>> {
    let backend: Arc<dyn CacheBackend> = match cfg.cache_backend {
        CacheBackendKind::Memory => Arc::new(MemoryBackend::with_capacity(cfg.cache_capacity)),
        CacheBackendKind::File => Arc::new(
            FileBackend::open(&cfg.cache_dir, cfg.cache_capacity as u64)
                .await
                .with_context(|| format!("opening cache dir {}", cfg.cache_dir.display()))?,
        ),
        CacheBackendKind::Redis => Arc::new(
            RedisBackend::connect(&cfg.redis_url)
                .await
                .context("connecting to redis")?,
        ),
    };
    log::info!("Cache backend: {}", backend.name());
    Ok(backend)
}

async fn wait_for_signal() -> Result<()> {
    tokio::select! {
        r = signal::ctrl_c() => {
            r?;
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        r = terminate() => {
            r?;
            log::info!("SIGTERM received, initiating shutdown.");
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn terminate() -> Result<()> {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    term.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminate() -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}

fn print_connection(state: ConnectionState) {
    let label = match state {
        ConnectionState::Connected => "live".green(),
        ConnectionState::Connecting => "connecting".yellow(),
        ConnectionState::ReconnectWait { attempt, delay } => {
            format!("reconnect #{} in {}ms", attempt, delay.as_millis()).yellow()
        }
        ConnectionState::PollingFallback => "degraded: polling".red().bold(),
        ConnectionState::Disconnected => "disconnected".dimmed(),
    };
    println!("{} {}", "connection:".bold(), label);
}

fn print_snapshot(snap: &LeagueSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snap)?);
        return Ok(());
    }

    let phase = match snap.phase {
        SnapshotPhase::Empty => "empty".dimmed(),
        SnapshotPhase::Partial => "partial".yellow(),
        SnapshotPhase::Final => "final".green(),
        SnapshotPhase::LiveRefresh => "live".cyan(),
    };
    let latest = snap
        .latest_period
        .map_or_else(|| "-".to_string(), |gw| format!("GW{gw}"));
    println!(
        "{} {} {} {} gameweeks, updated {}",
        "snapshot".bold(),
        snap.cycle,
        phase,
        snap.periods.len(),
        snap.updated_at.format("%H:%M:%S")
    );
    println!("  current: {}", latest);

    let gaps = snap.gaps();
    if !gaps.is_empty() {
        println!("  {} {:?}", "missing:".red(), gaps);
    }
    if let Some(err) = &snap.error {
        println!("  {} {}", "error:".red().bold(), err);
    }
    if let Some(status) = &snap.status {
        let finished = if status.finished { "finished" } else { "in progress" };
        println!("  status: {}", finished);
    }
    if let (Some(fixtures), Some(chips)) = (&snap.fixtures, &snap.chips) {
        println!("  fixtures: {}, chips played: {}", fixtures.fixtures.len(), chips.len());
    }

    for row in snap.standings.iter().take(TABLE_ROWS) {
        let change = match row.rank_change {
            c if c > 0 => format!("+{c}").green(),
            c if c < 0 => format!("{c}").red(),
            _ => "=".dimmed(),
        };
        println!(
            "  {:>3} {:>4} {:<28} {:<28} {:>7.0}",
            row.rank,
            change,
            row.manager_name,
            row.team_name,
            row.total_points
        );
    }
    if snap.standings.is_empty() {
        if let Some(gw) = snap.latest_period.and_then(|gw| snap.period(gw)) {
            for p in gw.participants.iter().take(TABLE_ROWS) {
                println!(
                    "  {:>3} {:<28} {:<28} {:>5.0}",
                    p.rank, p.manager_name, p.team_name, p.total_points_applied
                );
            }
        }
    }
    Ok(())
}
