//! Master discovery through monitor nodes.
//!
//! The resolver answers two questions: where is the current master of a
//! named cluster, and is an open connection still talking to a master.
//! It keeps no cached answer. Every call to
//! [`MasterResolver::resolve_master_address`] asks the monitors again, so a
//! failover between two dials is picked up by the second one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::DiscoveryConfig;
use crate::connection::{Role, StoreConnection};
use crate::endpoint::Endpoint;
use crate::error::{ConnectError, MonitorFailure, MonitorFailureReason, ResolutionError};

/// Client side of the monitor protocol.
///
/// This trait is object safe; the resolver holds it as
/// `Arc<dyn MonitorClient>` so the pool type does not depend on it.
#[async_trait::async_trait]
pub trait MonitorClient: Send + Sync {
    /// Ask `monitor` for the address of the current master of
    /// `cluster_name`.
    ///
    /// Returns `Ok(None)` when the monitor answers but does not know the
    /// cluster. The resolver applies its own timeout around this call.
    async fn master_address(
        &self,
        monitor: &Endpoint,
        cluster_name: &str,
    ) -> Result<Option<Endpoint>, ConnectError>;
}

/// Resolves the current master of a cluster by querying monitors.
pub struct MasterResolver {
    cluster_name: String,
    // Query order. The last monitor to answer is moved to the front.
    monitors: Mutex<Vec<Endpoint>>,
    client: Arc<dyn MonitorClient>,
    query_timeout: Duration,
}

impl fmt::Debug for MasterResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterResolver")
            .field("cluster_name", &self.cluster_name)
            .field("monitors", &*self.monitors.lock())
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

impl MasterResolver {
    /// Create a resolver for `cluster_name` over `monitors`.
    pub fn new(
        monitors: Vec<Endpoint>,
        cluster_name: impl Into<String>,
        client: Arc<dyn MonitorClient>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            monitors: Mutex::new(monitors),
            client,
            query_timeout,
        }
    }

    /// Create a resolver from validated discovery settings.
    pub fn from_config(config: &DiscoveryConfig, client: Arc<dyn MonitorClient>) -> Self {
        Self::new(
            config.monitors.clone(),
            config.cluster_name.clone(),
            client,
            config.monitor_timeout,
        )
    }

    /// The cluster name queried.
    #[must_use]
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// The monitors in their current query order.
    #[must_use]
    pub fn monitors(&self) -> Vec<Endpoint> {
        self.monitors.lock().clone()
    }

    /// Ask the monitors, in order, where the master currently is.
    ///
    /// The first monitor that reports an address wins. Each query is bounded
    /// by the resolver's query timeout so an unreachable monitor only costs
    /// that much before the next one is tried.
    pub async fn resolve_master_address(&self) -> Result<Endpoint, ResolutionError> {
        let monitors = self.monitors();
        if monitors.is_empty() {
            return Err(ResolutionError::NoMonitors);
        }

        let mut failures = Vec::new();
        for monitor in monitors {
            let query = self.client.master_address(&monitor, &self.cluster_name);
            let reason = match tokio::time::timeout(self.query_timeout, query).await {
                Ok(Ok(Some(master))) => {
                    tracing::debug!(
                        cluster = %self.cluster_name,
                        monitor = %monitor,
                        master = %master,
                        "resolved master"
                    );
                    self.promote(&monitor);
                    return Ok(master);
                }
                Ok(Ok(None)) => MonitorFailureReason::UnknownCluster,
                Ok(Err(err)) => MonitorFailureReason::Unreachable(err),
                Err(_) => MonitorFailureReason::TimedOut(self.query_timeout),
            };

            let failure = MonitorFailure { monitor, reason };
            tracing::debug!(cluster = %self.cluster_name, "monitor query failed: {failure}");
            failures.push(failure);
        }

        let err = ResolutionError::NoMaster {
            cluster: self.cluster_name.clone(),
            failures,
        };
        tracing::warn!("{err}");
        Err(err)
    }

    fn promote(&self, monitor: &Endpoint) {
        let mut monitors = self.monitors.lock();
        if let Some(pos) = monitors.iter().position(|m| m == monitor) {
            if pos > 0 {
                let answered = monitors.remove(pos);
                monitors.insert(0, answered);
            }
        }
    }
}

/// Check that `conn` currently reports `expected` as its role.
///
/// Any error from the role query counts as a mismatch.
pub async fn verify_role<T>(conn: &mut T, expected: &Role) -> bool
where
    T: StoreConnection + ?Sized,
{
    match conn.role().await {
        Ok(role) if role == *expected => true,
        Ok(role) => {
            tracing::debug!(expected = %expected, actual = %role, "role mismatch");
            false
        }
        Err(err) => {
            tracing::debug!(expected = %expected, error = %err, "role check failed");
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Answer {
        Master(&'static str),
        Unknown,
        Refused,
        Hang,
    }

    #[derive(Default)]
    struct ScriptedMonitors {
        answers: HashMap<String, Answer>,
        queries: AtomicUsize,
    }

    impl ScriptedMonitors {
        fn with(mut self, monitor: &str, answer: Answer) -> Self {
            self.answers.insert(monitor.to_string(), answer);
            self
        }
    }

    #[async_trait::async_trait]
    impl MonitorClient for ScriptedMonitors {
        async fn master_address(
            &self,
            monitor: &Endpoint,
            _cluster_name: &str,
        ) -> Result<Option<Endpoint>, ConnectError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            match self.answers.get(&monitor.to_string()) {
                Some(Answer::Master(addr)) => Ok(Some(addr.parse().unwrap())),
                Some(Answer::Unknown) => Ok(None),
                Some(Answer::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(None)
                }
                Some(Answer::Refused) | None => Err(ConnectError::Io(
                    std::io::ErrorKind::ConnectionRefused.into(),
                )),
            }
        }
    }

    fn resolver(monitors: &[&str], client: Arc<ScriptedMonitors>) -> MasterResolver {
        MasterResolver::new(
            monitors.iter().map(|m| m.parse().unwrap()).collect(),
            "c1",
            client,
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn test_falls_back_to_next_monitor() {
        let client = Arc::new(
            ScriptedMonitors::default()
                .with("10.0.0.1:26379", Answer::Refused)
                .with("10.0.0.2:26379", Answer::Master("10.0.0.5:6379")),
        );
        let resolver = resolver(&["10.0.0.1:26379", "10.0.0.2:26379"], client);

        let master = resolver.resolve_master_address().await.unwrap();
        assert_eq!(master, Endpoint::new("10.0.0.5", 6379));
    }

    #[tokio::test]
    async fn test_answering_monitor_is_promoted() {
        let client = Arc::new(
            ScriptedMonitors::default()
                .with("10.0.0.1:26379", Answer::Refused)
                .with("10.0.0.2:26379", Answer::Unknown)
                .with("10.0.0.3:26379", Answer::Master("10.0.0.5:6379")),
        );
        let resolver = resolver(
            &["10.0.0.1:26379", "10.0.0.2:26379", "10.0.0.3:26379"],
            client.clone(),
        );

        resolver.resolve_master_address().await.unwrap();
        let order: Vec<String> = resolver.monitors().iter().map(ToString::to_string).collect();
        assert_eq!(order, ["10.0.0.3:26379", "10.0.0.1:26379", "10.0.0.2:26379"]);

        // Next resolution asks the promoted monitor first and stops there.
        let before = client.queries.load(Ordering::SeqCst);
        resolver.resolve_master_address().await.unwrap();
        assert_eq!(client.queries.load(Ordering::SeqCst), before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_monitor_times_out() {
        let client = Arc::new(
            ScriptedMonitors::default()
                .with("10.0.0.1:26379", Answer::Hang)
                .with("10.0.0.2:26379", Answer::Master("10.0.0.5:6379")),
        );
        let resolver = resolver(&["10.0.0.1:26379", "10.0.0.2:26379"], client);

        let start = tokio::time::Instant::now();
        let master = resolver.resolve_master_address().await.unwrap();
        assert_eq!(master.to_string(), "10.0.0.5:6379");
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_no_monitor_answers() {
        let client = Arc::new(
            ScriptedMonitors::default()
                .with("10.0.0.1:26379", Answer::Refused)
                .with("10.0.0.2:26379", Answer::Unknown),
        );
        let resolver = resolver(&["10.0.0.1:26379", "10.0.0.2:26379"], client);

        match resolver.resolve_master_address().await {
            Err(ResolutionError::NoMaster { cluster, failures }) => {
                assert_eq!(cluster, "c1");
                assert_eq!(failures.len(), 2);
                assert!(matches!(
                    failures[0].reason,
                    MonitorFailureReason::Unreachable(_)
                ));
                assert!(matches!(
                    failures[1].reason,
                    MonitorFailureReason::UnknownCluster
                ));
            }
            other => panic!("expected NoMaster, got {other:?}"),
        }
        // Failed resolutions do not reorder monitors.
        assert_eq!(resolver.monitors()[0].to_string(), "10.0.0.1:26379");
    }

    #[tokio::test]
    async fn test_empty_monitor_list() {
        let resolver = resolver(&[], Arc::new(ScriptedMonitors::default()));
        assert!(matches!(
            resolver.resolve_master_address().await,
            Err(ResolutionError::NoMonitors)
        ));
    }

    struct FixedRole(Result<Role, ()>);

    #[async_trait::async_trait]
    impl StoreConnection for FixedRole {
        async fn role(&mut self) -> Result<Role, ConnectError> {
            self.0
                .clone()
                .map_err(|()| ConnectError::Backend("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_verify_role() {
        assert!(verify_role(&mut FixedRole(Ok(Role::Master)), &Role::Master).await);
        assert!(!verify_role(&mut FixedRole(Ok(Role::Replica)), &Role::Master).await);
        assert!(!verify_role(&mut FixedRole(Err(())), &Role::Master).await);
    }
}
