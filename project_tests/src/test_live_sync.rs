//! # Live Sync Runner
//!
//! Runs one full cycle against a real data API and prints the reconciled
//! snapshot. The API base comes from `GWSYNC_API_BASE` (default
//! `http://127.0.0.1:8080/`).

use std::sync::Arc;

use lib_gwsync::cache::{CacheStore, MemoryBackend};
use lib_gwsync::configs::SyncConfigLayer;
use lib_gwsync::core::SyncEngine;
use lib_gwsync::feeds::HttpGameweekSource;

/// Executes the live cycle.
///
/// // Statement: Prints the final snapshot as JSON on success.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // // Statement: Resolve the config from the environment on top of defaults
    let cfg = SyncConfigLayer {
        api_base: std::env::var("GWSYNC_API_BASE").ok(),
        ..Default::default()
    }
    .resolve()?;

    let source = Arc::new(HttpGameweekSource::from_config(&cfg)?);
    let engine = SyncEngine::new(source, CacheStore::new(Arc::new(MemoryBackend::unbounded()), cfg.schema_version));

    println!("[*] Running one sync cycle against {} ...", cfg.api_base);

    match engine.run_cycle().await {
        Ok(handle) => {
            let outcome = handle.finish().await;
            let snapshot = engine.snapshot();

            // // Statement: Success - Print the merged view as formatted JSON
            println!("\n[SUCCESS] Cycle {} finished: {:?}", snapshot.cycle, outcome);
            println!("-----------------------------------------------");
            println!("{}", serde_json::to_string_pretty(&*snapshot)?);
            println!("-----------------------------------------------");

            // // Statement: Show the gameweeks that could not be fetched
            println!("[INFO] Gaps: {:?}", snapshot.gaps());
        }
        Err(e) => {
            // // Statement: Failure - Print specific error details to stderr
            eprintln!("\n[ERROR] Sync cycle failed:");
            eprintln!(">>> {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
