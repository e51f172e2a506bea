//! Connector and monitor client backed by the `redis` crate.
//!
//! Store connections are multiplexed async connections. Monitor queries open
//! a short-lived connection per query; the resolver bounds each one with its
//! per-monitor timeout.

use std::fmt;

use redis::aio::MultiplexedConnection;
use redis::{ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo};

use crate::config::PoolConfig;
use crate::connection::{ConnectTarget, Connector, Role, StoreConnection};
use crate::endpoint::Endpoint;
use crate::error::{ConnectError, PoolError};
use crate::pool::Pool;
use crate::resolver::MonitorClient;

/// A pool of Redis connections.
pub type RedisPool = Pool<RedisConnector>;

/// Build a [`RedisPool`] from a configuration, using [`RedisMonitorClient`]
/// for Sentinel queries in discovery mode.
pub fn build_redis_pool(config: &PoolConfig) -> Result<RedisPool, PoolError> {
    crate::factory::build_pool(
        config,
        RedisConnector,
        std::sync::Arc::new(RedisMonitorClient),
    )
}

/// Opens [`RedisConnection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

#[async_trait::async_trait]
impl Connector for RedisConnector {
    type Connection = RedisConnection;

    async fn connect(&self, target: &ConnectTarget) -> Result<Self::Connection, ConnectError> {
        let info = match target {
            ConnectTarget::Url(cs) => cs.as_str().into_connection_info()?,
            ConnectTarget::Node {
                endpoint,
                password,
                database,
            } => ConnectionInfo {
                addr: tcp_addr(endpoint),
                redis: RedisConnectionInfo {
                    db: i64::from(database.get()),
                    password: password.clone(),
                    ..Default::default()
                },
            },
        };

        let inner = redis::Client::open(info)?
            .get_multiplexed_async_connection()
            .await?;
        Ok(RedisConnection {
            inner,
            endpoint: target.endpoint().clone(),
        })
    }
}

/// A Redis connection handed out by the pool.
pub struct RedisConnection {
    inner: MultiplexedConnection,
    endpoint: Endpoint,
}

impl RedisConnection {
    /// The underlying connection, for issuing commands.
    pub fn connection(&mut self) -> &mut MultiplexedConnection {
        &mut self.inner
    }

    /// The node this connection talks to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConnection")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl StoreConnection for RedisConnection {
    async fn role(&mut self) -> Result<Role, ConnectError> {
        let reply: Vec<redis::Value> = redis::cmd("ROLE").query_async(&mut self.inner).await?;
        let Some(first) = reply.first() else {
            return Err(ConnectError::Backend("empty ROLE reply".into()));
        };
        let name: String = redis::from_redis_value(first)?;
        let Ok(role) = name.parse::<Role>();
        Ok(role)
    }
}

/// Queries Sentinel monitors with `SENTINEL get-master-addr-by-name`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisMonitorClient;

#[async_trait::async_trait]
impl MonitorClient for RedisMonitorClient {
    async fn master_address(
        &self,
        monitor: &Endpoint,
        cluster_name: &str,
    ) -> Result<Option<Endpoint>, ConnectError> {
        let info = ConnectionInfo {
            addr: tcp_addr(monitor),
            redis: RedisConnectionInfo::default(),
        };
        let mut conn = redis::Client::open(info)?
            .get_multiplexed_async_connection()
            .await?;

        let reply: Option<(String, u16)> = redis::cmd("SENTINEL")
            .arg("get-master-addr-by-name")
            .arg(cluster_name)
            .query_async(&mut conn)
            .await?;
        Ok(reply.map(|(host, port)| Endpoint::new(host, port)))
    }
}

fn tcp_addr(endpoint: &Endpoint) -> ConnectionAddr {
    ConnectionAddr::Tcp(endpoint.host().to_string(), endpoint.port())
}

impl From<redis::RedisError> for ConnectError {
    fn from(err: redis::RedisError) -> Self {
        if err.kind() == redis::ErrorKind::AuthenticationFailed {
            Self::Authentication(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}
