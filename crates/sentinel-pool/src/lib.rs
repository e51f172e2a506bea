//! # sentinel-pool
//!
//! Connection pool for Redis that keeps pointing at the current master
//! across Sentinel failovers.
//!
//! A pool is built in one of two modes:
//!
//! - **Direct**: every connection is dialed from a fixed connection string.
//! - **Discovery**: every dial first asks the Sentinel monitors where the
//!   master of a named cluster is. Idle connections are role-checked before
//!   they are handed out again; one that no longer talks to a master is
//!   closed and replaced by a fresh dial.
//!
//! ## Features
//!
//! - Bounded number of open connections; `acquire` waits when saturated
//! - Bounded idle set with idle expiry
//! - Ordered monitor fallback with a per-monitor timeout
//! - Explicit close with a drain wait
//! - `redis` feature (default): connector and monitor client for the
//!   `redis` crate
//!
//! ## Example
//!
//! ```rust,ignore
//! use sentinel_pool::{DatabaseIndex, PoolConfig, build_redis_pool};
//!
//! let config = PoolConfig::discovery(["10.0.0.1:26379", "10.0.0.2:26379"], "mymaster")
//!     .password("secret")
//!     .database(DatabaseIndex::new(0));
//!
//! let pool = build_redis_pool(&config)?;
//! let mut conn = pool.acquire().await?;
//! let _: () = redis::cmd("SET").arg("k").arg("v").query_async(conn.connection()).await?;
//! // Connection returned to the pool on drop
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod factory;
pub mod lifecycle;
pub mod metrics;
pub mod pool;
#[cfg(feature = "redis")]
pub mod redis_backend;
pub mod resolver;
pub mod strategy;

pub use config::{DatabaseIndex, DiscoveryConfig, PoolConfig, PoolMode, PoolOptions, TimeoutConfig};
pub use connection::{ConnectTarget, Connector, Role, StoreConnection};
pub use endpoint::{ConnectionString, Endpoint};
pub use error::{
    ConfigError, ConnectError, MonitorFailure, MonitorFailureReason, PoolError, ResolutionError,
};
pub use factory::{build_direct_pool, build_discovery_pool, build_pool};
pub use lifecycle::ConnectionMetadata;
pub use metrics::PoolMetrics;
pub use pool::{Pool, PoolStatus, PooledConnection};
#[cfg(feature = "redis")]
pub use redis_backend::{
    RedisConnection, RedisConnector, RedisMonitorClient, RedisPool, build_redis_pool,
};
pub use resolver::{MasterResolver, MonitorClient, verify_role};
pub use strategy::DialStrategy;
