//! Start command: runs the scheduler daemon against a tenant layout.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use railyard_cache::ChangeCache;
use railyard_config::Layout;
use railyard_coord::MemoryStore;
use railyard_driver::GerritDriver;
use railyard_server::{Daemon, ServerConfig};
use railyard_sim::ScriptedGerritClient;
use tracing::info;

/// Runs the daemon against `layout_path`'s tenants.
///
/// `development` wires an in-memory [`MemoryStore`] and a scripted
/// Gerrit client with no scripted changes — enough to exercise the
/// full leader-election/main-loop/shutdown path against an empty
/// queue, the way a single-node development mode runs with no
/// replication. This workspace ships no real network `GerritClient`,
/// so a genuine production run links a real implementation in through
/// the library API rather than through this binary.
pub fn run(layout_path: &str, development: bool) -> Result<()> {
    if !development {
        bail!(
            "railyard-cli ships no production GerritClient (the wire protocol is out of scope); \
             link a real implementation against railyard-driver::GerritClient \
             and drive railyard_server::Daemon directly, or pass --development to run against \
             the in-memory scripted client."
        );
    }

    let layout = Layout::load(std::path::Path::new(layout_path)).context("failed to load tenant layout")?;

    println!();
    println!("railyard - pipeline scheduling core");
    println!();
    println!("  Layout:   {layout_path}");
    println!("  Tenants:  {}", layout.tenants.len());
    println!("  Mode:     development (in-memory coordination store, scripted Gerrit client)");
    println!();

    let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;
    runtime.block_on(run_daemon(&layout))
}

async fn run_daemon(layout: &Layout) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(ChangeCache::new(store.clone(), "/railyard/cache/gerrit"));
    let client = Arc::new(ScriptedGerritClient::new());
    let driver = Arc::new(GerritDriver::new("gerrit", client, cache));
    let config = ServerConfig::new();
    let daemon = Daemon::new(store, driver, &config, layout);

    info!(session = %daemon.session(), "daemon ready, press Ctrl+C to stop");
    println!("Server is ready. Press Ctrl+C to stop.");
    println!();

    daemon.run_with_shutdown().await?;

    println!();
    println!("Server stopped gracefully.");
    Ok(())
}
