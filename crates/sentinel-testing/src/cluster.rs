//! In-memory Sentinel cluster.
//!
//! [`FakeCluster`] plays both sides a pool talks to: it is a
//! [`Connector`] for store nodes and a [`MonitorClient`] for the monitors.
//! Tests script roles, reachability and failovers on it and read back what
//! the pool did through [`ClusterStats`].
//!
//! Connections read their role from the shared state on every `ROLE`
//! query, so a failover is visible to connections that are already open,
//! just like on a real cluster.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sentinel_pool::{
    ConnectError, ConnectTarget, Connector, Endpoint, MonitorClient, Role, StoreConnection,
};

/// Counters observed by a [`FakeCluster`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterStats {
    /// Connect attempts against store nodes, successful or not.
    pub dials: u64,
    /// Connect attempts per node.
    pub dials_by_node: HashMap<Endpoint, u64>,
    /// Master queries sent to monitors.
    pub monitor_queries: u64,
    /// `ROLE` queries sent on open connections.
    pub role_checks: u64,
    /// Store connections currently open.
    pub live_connections: u32,
    /// Highest number of store connections open at once.
    pub peak_connections: u32,
}

impl ClusterStats {
    /// Connect attempts against `node`.
    #[must_use]
    pub fn dials_to(&self, node: &str) -> u64 {
        node.parse::<Endpoint>()
            .ok()
            .and_then(|ep| self.dials_by_node.get(&ep).copied())
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct NodeState {
    role: Role,
    reachable: bool,
    dial_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct MonitorState {
    reachable: bool,
    masters: HashMap<String, Endpoint>,
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct ClusterState {
    nodes: HashMap<Endpoint, NodeState>,
    monitors: HashMap<Endpoint, MonitorState>,
    password: Option<String>,
    stats: ClusterStats,
}

/// A scripted Sentinel cluster. Clones share state.
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl fmt::Debug for FakeCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeCluster")
            .field("stats", &self.state.lock().stats)
            .finish_non_exhaustive()
    }
}

impl FakeCluster {
    /// Create an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reachable store node.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a `host:port` pair.
    #[must_use]
    pub fn with_node(self, addr: &str, role: Role) -> Self {
        self.state.lock().nodes.insert(
            endpoint(addr),
            NodeState {
                role,
                reachable: true,
                dial_delay: None,
            },
        );
        self
    }

    /// Add a reachable monitor that reports `master` for `cluster`.
    #[must_use]
    pub fn with_monitor(self, addr: &str, cluster: &str, master: &str) -> Self {
        let mut monitor = MonitorState {
            reachable: true,
            ..MonitorState::default()
        };
        monitor.masters.insert(cluster.to_string(), endpoint(master));
        self.state.lock().monitors.insert(endpoint(addr), monitor);
        self
    }

    /// Add a reachable monitor that does not know any cluster.
    #[must_use]
    pub fn with_empty_monitor(self, addr: &str) -> Self {
        self.state.lock().monitors.insert(
            endpoint(addr),
            MonitorState {
                reachable: true,
                ..MonitorState::default()
            },
        );
        self
    }

    /// Require `password` on every store connection.
    #[must_use]
    pub fn with_password(self, password: &str) -> Self {
        self.state.lock().password = Some(password.to_string());
        self
    }

    /// Change the role a node reports.
    pub fn set_role(&self, node: &str, role: Role) {
        if let Some(state) = self.state.lock().nodes.get_mut(&endpoint(node)) {
            state.role = role;
        }
    }

    /// Make a node refuse (or accept again) connections and queries.
    pub fn set_node_reachable(&self, node: &str, reachable: bool) {
        if let Some(state) = self.state.lock().nodes.get_mut(&endpoint(node)) {
            state.reachable = reachable;
        }
    }

    /// Delay every connect to `node` by `delay`.
    pub fn set_dial_delay(&self, node: &str, delay: Duration) {
        if let Some(state) = self.state.lock().nodes.get_mut(&endpoint(node)) {
            state.dial_delay = Some(delay);
        }
    }

    /// Make a monitor refuse (or accept again) queries.
    pub fn set_monitor_reachable(&self, monitor: &str, reachable: bool) {
        if let Some(state) = self.state.lock().monitors.get_mut(&endpoint(monitor)) {
            state.reachable = reachable;
        }
    }

    /// Delay every answer from `monitor` by `delay`.
    pub fn set_monitor_delay(&self, monitor: &str, delay: Duration) {
        if let Some(state) = self.state.lock().monitors.get_mut(&endpoint(monitor)) {
            state.delay = Some(delay);
        }
    }

    /// Promote `new_master` for `cluster`.
    ///
    /// Every node currently reporting master is demoted to replica, the new
    /// master reports master, and every monitor reports the new address.
    pub fn failover(&self, cluster: &str, new_master: &str) {
        let new_master = endpoint(new_master);
        let mut state = self.state.lock();
        for (addr, node) in &mut state.nodes {
            if *addr == new_master {
                node.role = Role::Master;
            } else if node.role == Role::Master {
                node.role = Role::Replica;
            }
        }
        for monitor in state.monitors.values_mut() {
            monitor
                .masters
                .insert(cluster.to_string(), new_master.clone());
        }
        tracing::debug!(cluster, master = %new_master, "fake failover");
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> ClusterStats {
        self.state.lock().stats.clone()
    }
}

#[async_trait::async_trait]
impl Connector for FakeCluster {
    type Connection = FakeConnection;

    async fn connect(&self, target: &ConnectTarget) -> Result<Self::Connection, ConnectError> {
        let node = target.endpoint().clone();
        let delay = {
            let mut state = self.state.lock();
            state.stats.dials += 1;
            *state.stats.dials_by_node.entry(node.clone()).or_default() += 1;
            state.nodes.get(&node).and_then(|n| n.dial_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        match state.nodes.get(&node) {
            Some(n) if n.reachable => {}
            _ => return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into()),
        }
        if let Some(required) = &state.password {
            if target_password(target).as_deref() != Some(required.as_str()) {
                return Err(ConnectError::Authentication(
                    "WRONGPASS invalid username-password pair".into(),
                ));
            }
        }

        state.stats.live_connections += 1;
        state.stats.peak_connections = state
            .stats
            .peak_connections
            .max(state.stats.live_connections);
        Ok(FakeConnection {
            node,
            database: target.database().get(),
            state: Arc::clone(&self.state),
        })
    }
}

#[async_trait::async_trait]
impl MonitorClient for FakeCluster {
    async fn master_address(
        &self,
        monitor: &Endpoint,
        cluster_name: &str,
    ) -> Result<Option<Endpoint>, ConnectError> {
        let delay = {
            let mut state = self.state.lock();
            state.stats.monitor_queries += 1;
            state.monitors.get(monitor).and_then(|m| m.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        match state.monitors.get(monitor) {
            Some(m) if m.reachable => Ok(m.masters.get(cluster_name).cloned()),
            _ => Err(io::Error::from(io::ErrorKind::ConnectionRefused).into()),
        }
    }
}

/// A connection to a node of a [`FakeCluster`].
pub struct FakeConnection {
    node: Endpoint,
    database: u32,
    state: Arc<Mutex<ClusterState>>,
}

impl FakeConnection {
    /// The node this connection was opened to.
    #[must_use]
    pub fn node(&self) -> &Endpoint {
        &self.node
    }

    /// The database selected at connect time.
    #[must_use]
    pub fn database(&self) -> u32 {
        self.database
    }
}

impl fmt::Debug for FakeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeConnection")
            .field("node", &self.node)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl StoreConnection for FakeConnection {
    async fn role(&mut self) -> Result<Role, ConnectError> {
        let mut state = self.state.lock();
        state.stats.role_checks += 1;
        match state.nodes.get(&self.node) {
            Some(n) if n.reachable => Ok(n.role.clone()),
            _ => Err(io::Error::from(io::ErrorKind::ConnectionReset).into()),
        }
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.state.lock().stats.live_connections -= 1;
    }
}

fn target_password(target: &ConnectTarget) -> Option<String> {
    match target {
        ConnectTarget::Url(cs) => url::Url::parse(cs.as_str())
            .ok()
            .and_then(|u| u.password().map(str::to_string)),
        ConnectTarget::Node { password, .. } => password.clone(),
    }
}

#[allow(clippy::expect_used)]
fn endpoint(addr: &str) -> Endpoint {
    addr.parse().expect("fake cluster addresses are host:port")
}
