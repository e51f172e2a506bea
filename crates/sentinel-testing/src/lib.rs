//! # sentinel-testing
//!
//! Test infrastructure for sentinel-pool.
//!
//! ## Features
//!
//! - In-memory Sentinel cluster for pool tests (no Redis required)
//! - Redis container management via testcontainers
//!
//! ## Fake Cluster Example
//!
//! ```rust,ignore
//! use sentinel_pool::{PoolConfig, Role, build_pool};
//! use sentinel_testing::FakeCluster;
//!
//! #[tokio::test]
//! async fn test_failover() {
//!     let cluster = FakeCluster::new()
//!         .with_node("10.0.0.5:6379", Role::Master)
//!         .with_node("10.0.0.6:6379", Role::Replica)
//!         .with_monitor("10.0.0.1:26379", "c1", "10.0.0.5:6379");
//!
//!     let config = PoolConfig::discovery(["10.0.0.1:26379"], "c1");
//!     let pool = build_pool(&config, cluster.clone(), Arc::new(cluster.clone())).unwrap();
//!
//!     drop(pool.acquire().await.unwrap());
//!     cluster.failover("c1", "10.0.0.6:6379");
//!
//!     let conn = pool.acquire().await.unwrap();
//!     assert_eq!(conn.endpoint().to_string(), "10.0.0.6:6379");
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cluster;
pub mod container;

pub use cluster::{ClusterStats, FakeCluster, FakeConnection};
pub use container::RedisContainer;

use std::sync::Arc;

use sentinel_pool::{MonitorClient, Pool, PoolConfig, PoolError, build_pool};

/// Build a pool whose nodes and monitors are both served by `cluster`.
pub fn fake_pool(
    config: &PoolConfig,
    cluster: &FakeCluster,
) -> Result<Pool<FakeCluster>, PoolError> {
    let monitors: Arc<dyn MonitorClient> = Arc::new(cluster.clone());
    build_pool(config, cluster.clone(), monitors)
}
