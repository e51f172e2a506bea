//! Pool error types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::endpoint::Endpoint;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The pool configuration is invalid. Raised once, at construction.
    #[error("pool configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// No monitor could tell us where the master is.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Opening a connection to the store failed.
    #[error("failed to connect to {endpoint}: {source}")]
    Dial {
        /// The endpoint the dial targeted.
        endpoint: Endpoint,
        /// Underlying connect failure.
        #[source]
        source: ConnectError,
    },

    /// Pool is closed.
    #[error("pool is closed")]
    PoolClosed,

    /// Failed to acquire a connection within the caller-supplied timeout.
    #[error("connection acquisition timeout after {0:?}")]
    AcquireTimeout(Duration),
}

impl PoolError {
    /// Check if this error is transient and `acquire` may succeed on retry.
    ///
    /// Resolution and dial failures are expected during a failover window.
    /// Configuration errors and a closed pool are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Resolution(_) | Self::Dial { .. } | Self::AcquireTimeout(_)
        )
    }
}

/// Invalid pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Neither a connection string nor a monitor set was configured.
    #[error("either a connection string or monitor addresses with a cluster name must be set")]
    MissingMode,

    /// Both a connection string and monitor settings were configured.
    #[error("connection string and monitor settings are mutually exclusive")]
    AmbiguousMode,

    /// Monitor addresses were given without a cluster name.
    #[error("monitor addresses require a cluster name")]
    MissingClusterName,

    /// A cluster name was given without monitor addresses.
    #[error("cluster name {0:?} requires at least one monitor address")]
    MissingMonitors(String),

    /// A monitor address is not `host:port`.
    #[error("invalid address {0:?}: expected host:port")]
    InvalidAddress(String),

    /// The connection string could not be used.
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// The database index is not a non-negative integer.
    #[error("{0:?} is not a valid database index")]
    InvalidDatabase(String),

    /// Pool sizing is inconsistent.
    #[error("invalid pool sizing: {0}")]
    InvalidSizing(String),
}

/// Failure to open or talk to a single store or monitor node.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectError {
    /// The node did not answer in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The node rejected our credentials.
    #[error("authentication rejected: {0}")]
    Authentication(String),

    /// Network failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure reported by the protocol client.
    #[error("{0}")]
    Backend(String),
}

/// Master resolution failed on every configured monitor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolutionError {
    /// The resolver has no monitors to ask.
    #[error("no monitors configured")]
    NoMonitors,

    /// Every monitor failed or did not know the cluster.
    #[error("no monitor reported a master for {cluster:?} ({})", FailureList(.failures))]
    NoMaster {
        /// The cluster name that was queried.
        cluster: String,
        /// One entry per monitor asked, in query order.
        failures: Vec<MonitorFailure>,
    },
}

/// Why a single monitor did not yield a master address.
#[derive(Debug)]
pub struct MonitorFailure {
    /// The monitor that was queried.
    pub monitor: Endpoint,
    /// What went wrong.
    pub reason: MonitorFailureReason,
}

/// Reason a monitor query produced no answer.
#[derive(Debug)]
#[non_exhaustive]
pub enum MonitorFailureReason {
    /// The monitor could not be reached or returned an error.
    Unreachable(ConnectError),
    /// The monitor did not answer within the per-query timeout.
    TimedOut(Duration),
    /// The monitor answered but does not know the cluster name.
    UnknownCluster,
}

impl fmt::Display for MonitorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            MonitorFailureReason::Unreachable(err) => write!(f, "{}: {err}", self.monitor),
            MonitorFailureReason::TimedOut(timeout) => {
                write!(f, "{}: timed out after {timeout:?}", self.monitor)
            }
            MonitorFailureReason::UnknownCluster => write!(f, "{}: unknown cluster", self.monitor),
        }
    }
}

struct FailureList<'a>(&'a [MonitorFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn endpoint(s: &str) -> Endpoint {
        s.parse().unwrap()
    }

    #[test]
    fn test_no_master_lists_every_monitor() {
        let err = ResolutionError::NoMaster {
            cluster: "c1".into(),
            failures: vec![
                MonitorFailure {
                    monitor: endpoint("10.0.0.1:26379"),
                    reason: MonitorFailureReason::TimedOut(Duration::from_millis(500)),
                },
                MonitorFailure {
                    monitor: endpoint("10.0.0.2:26379"),
                    reason: MonitorFailureReason::UnknownCluster,
                },
            ],
        };

        let message = err.to_string();
        assert!(message.contains("\"c1\""));
        assert!(message.contains("10.0.0.1:26379: timed out after 500ms"));
        assert!(message.contains("10.0.0.2:26379: unknown cluster"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(PoolError::Resolution(ResolutionError::NoMonitors).is_transient());
        assert!(
            PoolError::Dial {
                endpoint: endpoint("10.0.0.5:6379"),
                source: ConnectError::Timeout(Duration::from_secs(1)),
            }
            .is_transient()
        );
        assert!(!PoolError::PoolClosed.is_transient());
        assert!(!PoolError::Configuration(ConfigError::MissingMode).is_transient());
    }
}
