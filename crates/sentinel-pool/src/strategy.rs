//! Dial and borrow-validation strategies.
//!
//! A pool runs in exactly one of two modes, fixed at construction:
//!
//! - **Direct**: dial the configured connection string, never validate.
//! - **Discovery**: resolve the master through the monitors on every dial,
//!   and check the role of an idle connection before reusing it.
//!
//! Freshly dialed connections are never validated. They already target the
//! address the monitors just reported; if that answer was stale, the next
//! borrow of the connection catches it.

use std::time::Duration;

use crate::config::DatabaseIndex;
use crate::connection::{ConnectTarget, Connector, Role, StoreConnection};
use crate::endpoint::{ConnectionString, Endpoint};
use crate::error::{ConnectError, PoolError};
use crate::resolver::{MasterResolver, verify_role};

/// How a pool opens and validates connections.
#[derive(Debug)]
pub enum DialStrategy {
    /// Fixed endpoint, no borrow-time validation.
    Direct {
        /// Connection string to dial.
        target: ConnectionString,
    },
    /// Endpoint resolved per dial, role-checked on reuse.
    Discovery {
        /// Resolver asked on every dial.
        resolver: MasterResolver,
        /// Password used against the master.
        password: Option<String>,
        /// Database selected on the master.
        database: DatabaseIndex,
    },
}

impl DialStrategy {
    /// Open a new connection according to the strategy.
    ///
    /// In discovery mode this resolves the master first; resolution and
    /// connect failures are returned unchanged to the caller of `acquire`.
    pub async fn dial<C: Connector>(
        &self,
        connector: &C,
        connect_timeout: Duration,
    ) -> Result<(C::Connection, Endpoint), PoolError> {
        let target = match self {
            Self::Direct { target } => ConnectTarget::Url(target.clone()),
            Self::Discovery {
                resolver,
                password,
                database,
            } => ConnectTarget::Node {
                endpoint: resolver.resolve_master_address().await?,
                password: password.clone(),
                database: *database,
            },
        };
        let endpoint = target.endpoint().clone();

        tracing::debug!(endpoint = %endpoint, database = %target.database(), "dialing");
        match tokio::time::timeout(connect_timeout, connector.connect(&target)).await {
            Ok(Ok(conn)) => Ok((conn, endpoint)),
            Ok(Err(source)) => Err(PoolError::Dial { endpoint, source }),
            Err(_) => Err(PoolError::Dial {
                endpoint,
                source: ConnectError::Timeout(connect_timeout),
            }),
        }
    }

    /// Check whether an idle connection may be handed out again.
    ///
    /// Always true in direct mode. In discovery mode the connection must
    /// report itself as master within `timeout`.
    pub async fn validate<T>(&self, conn: &mut T, timeout: Duration) -> bool
    where
        T: StoreConnection,
    {
        match self {
            Self::Direct { .. } => true,
            Self::Discovery { .. } => {
                tokio::time::timeout(timeout, verify_role(conn, &Role::Master))
                    .await
                    .unwrap_or(false)
            }
        }
    }

    /// Whether idle connections are role-checked before reuse.
    #[must_use]
    pub fn validates_on_borrow(&self) -> bool {
        matches!(self, Self::Discovery { .. })
    }

    /// The resolver, in discovery mode.
    #[must_use]
    pub fn resolver(&self) -> Option<&MasterResolver> {
        match self {
            Self::Direct { .. } => None,
            Self::Discovery { resolver, .. } => Some(resolver),
        }
    }
}
