//! Pool construction.
//!
//! Configuration is validated here, once. A pool that was built never
//! reports a configuration error afterwards.

use std::sync::Arc;

use crate::config::{DiscoveryConfig, PoolConfig, PoolMode, PoolOptions};
use crate::connection::Connector;
use crate::endpoint::ConnectionString;
use crate::error::PoolError;
use crate::pool::Pool;
use crate::resolver::{MasterResolver, MonitorClient};
use crate::strategy::DialStrategy;

/// Build a pool from a configuration, picking the mode it describes.
///
/// `monitor_client` is only used in discovery mode.
///
/// # Errors
///
/// Returns [`PoolError::Configuration`] when the configuration sets both
/// modes, neither mode, an incomplete discovery mode, or invalid sizing.
pub fn build_pool<C: Connector>(
    config: &PoolConfig,
    connector: C,
    monitor_client: Arc<dyn MonitorClient>,
) -> Result<Pool<C>, PoolError> {
    let options = config.options()?;
    let pool = match config.mode()? {
        PoolMode::Direct(target) => build_direct_pool(target, options, connector),
        PoolMode::Discovery(discovery) => {
            build_discovery_pool(discovery, options, connector, monitor_client)
        }
    };
    Ok(pool)
}

/// Build a pool that always dials `target`.
pub fn build_direct_pool<C: Connector>(
    target: ConnectionString,
    options: PoolOptions,
    connector: C,
) -> Pool<C> {
    let strategy = DialStrategy::Direct {
        target: target.clone(),
    };
    Pool::from_parts(connector, strategy, PoolMode::Direct(target), options)
}

/// Build a pool that resolves the master through the monitors on every dial
/// and role-checks idle connections before reuse.
pub fn build_discovery_pool<C: Connector>(
    discovery: DiscoveryConfig,
    options: PoolOptions,
    connector: C,
    monitor_client: Arc<dyn MonitorClient>,
) -> Pool<C> {
    let strategy = DialStrategy::Discovery {
        resolver: MasterResolver::from_config(&discovery, monitor_client),
        password: discovery.password.clone(),
        database: discovery.database,
    };
    Pool::from_parts(connector, strategy, PoolMode::Discovery(discovery), options)
}

impl<C: Connector> Pool<C> {
    /// Create a new pool. Shorthand for [`build_pool`].
    pub fn new(
        config: &PoolConfig,
        connector: C,
        monitor_client: Arc<dyn MonitorClient>,
    ) -> Result<Self, PoolError> {
        build_pool(config, connector, monitor_client)
    }
}
