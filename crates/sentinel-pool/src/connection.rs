//! Store connection traits.
//!
//! The pool never speaks the store protocol itself. It opens connections
//! through a [`Connector`] and asks them for their replication role through
//! [`StoreConnection`]. The `redis` feature provides implementations backed
//! by the `redis` crate; tests plug in in-memory fakes.

use std::fmt;
use std::str::FromStr;

use crate::config::DatabaseIndex;
use crate::endpoint::{ConnectionString, Endpoint};
use crate::error::ConnectError;

/// Replication role a store node reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    /// The node accepts writes.
    Master,
    /// The node replicates from a master.
    Replica,
    /// The node is a monitor, not a data node.
    Monitor,
    /// Anything else the node reported.
    Other(String),
}

impl Role {
    /// The name the store uses for this role.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Master => "master",
            Self::Replica => "slave",
            Self::Monitor => "sentinel",
            Self::Other(name) => name,
        }
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "master" => Self::Master,
            "slave" | "replica" => Self::Replica,
            "sentinel" => Self::Monitor,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a [`Connector`] should open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// Open the literal connection string; it already carries host, port,
    /// credentials and database.
    Url(ConnectionString),
    /// Open a resolved node, then authenticate and select a database.
    Node {
        /// Where to connect.
        endpoint: Endpoint,
        /// Password to authenticate with, if any.
        password: Option<String>,
        /// Database to select.
        database: DatabaseIndex,
    },
}

impl ConnectTarget {
    /// The endpoint this target dials.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        match self {
            Self::Url(cs) => cs.endpoint(),
            Self::Node { endpoint, .. } => endpoint,
        }
    }

    /// The database this target selects.
    #[must_use]
    pub fn database(&self) -> DatabaseIndex {
        match self {
            Self::Url(cs) => cs.database(),
            Self::Node { database, .. } => *database,
        }
    }
}

/// An open connection to a store node.
#[async_trait::async_trait]
pub trait StoreConnection: Send + 'static {
    /// Ask the node which role it currently holds.
    async fn role(&mut self) -> Result<Role, ConnectError>;
}

/// Opens store connections.
///
/// Implementations should not apply their own retry policy; the pool bounds
/// every call with its connect timeout and surfaces failures to the caller
/// of `acquire`.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced.
    type Connection: StoreConnection;

    /// Open a connection to `target`.
    async fn connect(&self, target: &ConnectTarget) -> Result<Self::Connection, ConnectError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("master".parse(), Ok(Role::Master));
        assert_eq!("MASTER".parse(), Ok(Role::Master));
        assert_eq!("slave".parse(), Ok(Role::Replica));
        assert_eq!("replica".parse(), Ok(Role::Replica));
        assert_eq!("sentinel".parse(), Ok(Role::Monitor));
        assert_eq!("witness".parse(), Ok(Role::Other("witness".into())));
    }

    #[test]
    fn test_connect_target_endpoint() {
        let target = ConnectTarget::Node {
            endpoint: Endpoint::new("10.0.0.5", 6379),
            password: None,
            database: DatabaseIndex::new(1),
        };
        assert_eq!(target.endpoint().to_string(), "10.0.0.5:6379");
        assert_eq!(target.database().get(), 1);
    }
}
