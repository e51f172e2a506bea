//! sentinel-cli: run a Redis connection pool until interrupted.
//!
//! Builds one pool from the command line, periodically borrows a connection
//! to show which master it reaches, and closes the pool on Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! # Direct mode
//! sentinel-cli --redis-url redis://:secret@10.0.0.5:6379/0
//!
//! # Discovery mode through Sentinel
//! sentinel-cli --sentinels 10.0.0.1:26379,10.0.0.2:26379 \
//!     --master-name mymaster --password secret --database 0
//!
//! # Verbose pool logging
//! RUST_LOG=sentinel_pool=debug sentinel-cli --redis-url redis://127.0.0.1:6379
//! ```

mod cli;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sentinel_pool::{PoolError, PoolMode, RedisPool, build_redis_pool};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = cli.pool_config().context("invalid configuration")?;
    let pool = build_redis_pool(&config).context("invalid configuration")?;
    log_startup(&cli, &pool);

    let probe = cli
        .probe_interval()
        .map(|interval| tokio::spawn(probe(pool.clone(), interval)));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");

    if let Some(probe) = probe {
        probe.abort();
    }
    pool.close();
    if tokio::time::timeout(cli.drain_timeout(), pool.drained())
        .await
        .is_err()
    {
        tracing::warn!(
            outstanding = pool.status().open,
            "gave up waiting for outstanding connections"
        );
    }

    let metrics = pool.metrics();
    tracing::info!(
        created = metrics.connections_created,
        checkouts = metrics.checkouts_successful,
        failed = metrics.checkouts_failed,
        validation_failures = metrics.validation_failures,
        "quitting"
    );
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn log_startup(cli: &Cli, pool: &RedisPool) {
    let options = pool.options();
    match pool.mode() {
        PoolMode::Direct(target) => tracing::info!(
            namespace = %cli.ns,
            redis = %target,
            max_active = options.max_active,
            max_idle = options.max_idle,
            "starting in direct mode"
        ),
        PoolMode::Discovery(discovery) => tracing::info!(
            namespace = %cli.ns,
            sentinels = ?discovery.monitors,
            master_name = %discovery.cluster_name,
            database = %discovery.database,
            password = discovery.password.is_some(),
            max_active = options.max_active,
            max_idle = options.max_idle,
            "starting in discovery mode"
        ),
    }
}

// Stand-in for the pool's real consumer: borrow a connection now and then
// and report where it points.
async fn probe(pool: RedisPool, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match pool.acquire_timeout(interval).await {
            Ok(conn) => tracing::info!(
                endpoint = %conn.endpoint(),
                connection_id = conn.metadata().id,
                status = ?pool.status(),
                "probe reached master"
            ),
            Err(PoolError::PoolClosed) => break,
            Err(err) => tracing::warn!(
                error = %err,
                transient = err.is_transient(),
                "probe failed"
            ),
        }
    }
}
