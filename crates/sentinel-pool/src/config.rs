//! Pool configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::endpoint::{ConnectionString, Endpoint};
use crate::error::ConfigError;

/// Default maximum open connections for a direct pool.
pub const DEFAULT_DIRECT_MAX_ACTIVE: u32 = 3;
/// Default maximum idle connections for a direct pool.
pub const DEFAULT_DIRECT_MAX_IDLE: u32 = 3;
/// Default maximum open connections for a discovery pool.
pub const DEFAULT_DISCOVERY_MAX_ACTIVE: u32 = 5;
/// Default maximum idle connections for a discovery pool.
pub const DEFAULT_DISCOVERY_MAX_IDLE: u32 = 5;
/// Default time an idle connection may sit in the pool.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(240);

/// Logical database index selected after connecting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatabaseIndex(u32);

impl DatabaseIndex {
    /// Create a database index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw index.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for DatabaseIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

impl FromStr for DatabaseIndex {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| ConfigError::InvalidDatabase(s.to_string()))
    }
}

impl fmt::Display for DatabaseIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Timeouts for the network operations the pool performs.
///
/// Every monitor query, dial and role check runs under one of these so a
/// single unreachable node cannot stall every caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Per-monitor bound on a master address query (default: 500ms).
    pub monitor_timeout: Duration,
    /// Bound on opening a store connection, including auth and database
    /// selection (default: 3s).
    pub connect_timeout: Duration,
    /// Bound on the role check of an idle connection (default: 1s).
    pub validation_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            monitor_timeout: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(3),
            validation_timeout: Duration::from_secs(1),
        }
    }
}

impl TimeoutConfig {
    /// Create a new timeout configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-monitor query timeout.
    #[must_use]
    pub fn monitor_timeout(mut self, timeout: Duration) -> Self {
        self.monitor_timeout = timeout;
        self
    }

    /// Set the store connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the idle connection role check timeout.
    #[must_use]
    pub fn validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }
}

/// Configuration for building a pool.
///
/// The mode is derived from which fields are populated: a connection string
/// selects direct mode, monitor addresses plus a cluster name select
/// discovery mode. Exactly one of the two must be present; see
/// [`PoolConfig::mode`].
///
/// This struct is marked `#[non_exhaustive]`. Use [`PoolConfig::direct`],
/// [`PoolConfig::discovery`] or [`Default::default()`] plus the builder
/// methods to construct instances.
#[derive(Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Connection string for direct mode.
    pub connection_string: Option<String>,

    /// Monitor addresses (`host:port`) for discovery mode, in query order.
    pub monitor_addresses: Vec<String>,

    /// Name the monitors know the cluster by.
    pub cluster_name: Option<String>,

    /// Password used against the discovered master. Direct mode carries
    /// credentials in the connection string instead.
    pub password: Option<String>,

    /// Database selected on the discovered master.
    pub database: DatabaseIndex,

    /// Maximum number of open connections.
    pub max_active: u32,

    /// Maximum number of idle connections retained.
    pub max_idle: u32,

    /// Time a connection can be idle before it is discarded instead of
    /// reused. Zero disables expiry.
    pub idle_timeout: Duration,

    /// Network timeouts.
    pub timeouts: TimeoutConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            monitor_addresses: Vec::new(),
            cluster_name: None,
            password: None,
            database: DatabaseIndex::default(),
            max_active: DEFAULT_DISCOVERY_MAX_ACTIVE,
            max_idle: DEFAULT_DISCOVERY_MAX_IDLE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let connection_string = self.connection_string.as_deref().map(|raw| {
            ConnectionString::parse(raw)
                .map(|cs| cs.to_string())
                .unwrap_or_else(|_| "<invalid>".to_string())
        });
        f.debug_struct("PoolConfig")
            .field("connection_string", &connection_string)
            .field("monitor_addresses", &self.monitor_addresses)
            .field("cluster_name", &self.cluster_name)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("max_active", &self.max_active)
            .field("max_idle", &self.max_idle)
            .field("idle_timeout", &self.idle_timeout)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values and no mode.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct mode configuration with the direct-mode sizing defaults.
    #[must_use]
    pub fn direct(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: Some(connection_string.into()),
            max_active: DEFAULT_DIRECT_MAX_ACTIVE,
            max_idle: DEFAULT_DIRECT_MAX_IDLE,
            ..Self::default()
        }
    }

    /// Discovery mode configuration with the discovery-mode sizing defaults.
    #[must_use]
    pub fn discovery<I, S>(monitor_addresses: I, cluster_name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            monitor_addresses: monitor_addresses.into_iter().map(Into::into).collect(),
            cluster_name: Some(cluster_name.into()),
            ..Self::default()
        }
    }

    /// Set the connection string.
    #[must_use]
    pub fn connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    /// Set the monitor addresses.
    #[must_use]
    pub fn monitor_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.monitor_addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    /// Set the cluster name.
    #[must_use]
    pub fn cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = Some(name.into());
        self
    }

    /// Set the password used against the discovered master.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the database selected on the discovered master.
    #[must_use]
    pub fn database(mut self, database: impl Into<DatabaseIndex>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the maximum number of open connections.
    #[must_use]
    pub fn max_active(mut self, count: u32) -> Self {
        self.max_active = count;
        self
    }

    /// Set the maximum number of idle connections.
    #[must_use]
    pub fn max_idle(mut self, count: u32) -> Self {
        self.max_idle = count;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the network timeouts.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Determine and validate the pool mode.
    pub fn mode(&self) -> Result<PoolMode, ConfigError> {
        let connection_string = self
            .connection_string
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let cluster_name = self
            .cluster_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let has_monitors = !self.monitor_addresses.is_empty();

        match (connection_string, has_monitors, cluster_name) {
            (Some(_), true, _) | (Some(_), _, Some(_)) => Err(ConfigError::AmbiguousMode),
            (Some(raw), false, None) => Ok(PoolMode::Direct(ConnectionString::parse(raw)?)),
            (None, true, Some(cluster)) => {
                let monitors = self
                    .monitor_addresses
                    .iter()
                    .map(|addr| addr.parse::<Endpoint>())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(PoolMode::Discovery(DiscoveryConfig {
                    monitors,
                    cluster_name: cluster.to_string(),
                    password: self.password.clone().filter(|p| !p.is_empty()),
                    database: self.database,
                    monitor_timeout: self.timeouts.monitor_timeout,
                }))
            }
            (None, true, None) => Err(ConfigError::MissingClusterName),
            (None, false, Some(cluster)) => Err(ConfigError::MissingMonitors(cluster.to_string())),
            (None, false, None) => Err(ConfigError::MissingMode),
        }
    }

    /// Pool sizing and timeouts, validated.
    pub fn options(&self) -> Result<PoolOptions, ConfigError> {
        if self.max_active == 0 {
            return Err(ConfigError::InvalidSizing(
                "max_active must be greater than 0".into(),
            ));
        }
        if self.max_idle > self.max_active {
            return Err(ConfigError::InvalidSizing(
                "max_idle cannot be greater than max_active".into(),
            ));
        }
        Ok(PoolOptions {
            max_active: self.max_active,
            max_idle: self.max_idle,
            idle_timeout: self.idle_timeout,
            connect_timeout: self.timeouts.connect_timeout,
            validation_timeout: self.timeouts.validation_timeout,
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mode()?;
        self.options()?;
        Ok(())
    }
}

/// The validated mode a pool runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolMode {
    /// Always dial the endpoint encoded in the connection string.
    Direct(ConnectionString),
    /// Ask the monitors for the current master on every dial.
    Discovery(DiscoveryConfig),
}

impl PoolMode {
    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Discovery(_) => "discovery",
        }
    }
}

/// Validated discovery mode settings.
#[derive(Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Monitors to query, in order.
    pub monitors: Vec<Endpoint>,
    /// Name the monitors know the cluster by.
    pub cluster_name: String,
    /// Password used against the master.
    pub password: Option<String>,
    /// Database selected on the master.
    pub database: DatabaseIndex,
    /// Per-monitor query timeout.
    pub monitor_timeout: Duration,
}

impl fmt::Debug for DiscoveryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryConfig")
            .field("monitors", &self.monitors)
            .field("cluster_name", &self.cluster_name)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("monitor_timeout", &self.monitor_timeout)
            .finish()
    }
}

/// Validated sizing and timeouts the pool enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Maximum number of open connections.
    pub max_active: u32,
    /// Maximum number of idle connections retained.
    pub max_idle: u32,
    /// Idle expiry; zero disables it.
    pub idle_timeout: Duration,
    /// Bound on a single dial.
    pub connect_timeout: Duration,
    /// Bound on a single borrow-time role check.
    pub validation_timeout: Duration,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.max_active, DEFAULT_DISCOVERY_MAX_ACTIVE);
        assert_eq!(config.max_idle, DEFAULT_DISCOVERY_MAX_IDLE);
        assert_eq!(config.idle_timeout, Duration::from_secs(240));
        assert_eq!(config.timeouts.monitor_timeout, Duration::from_millis(500));
        assert_eq!(config.mode(), Err(ConfigError::MissingMode));
    }

    #[test]
    fn test_direct_mode() {
        let config = PoolConfig::direct("redis://:pw@10.0.0.9:6380/2");
        assert_eq!(config.max_active, DEFAULT_DIRECT_MAX_ACTIVE);
        assert_eq!(config.max_idle, DEFAULT_DIRECT_MAX_IDLE);

        match config.mode().unwrap() {
            PoolMode::Direct(cs) => {
                assert_eq!(cs.endpoint(), &Endpoint::new("10.0.0.9", 6380));
                assert_eq!(cs.database(), DatabaseIndex::new(2));
            }
            other => panic!("expected direct mode, got {other:?}"),
        }
    }

    #[test]
    fn test_discovery_mode() {
        let config = PoolConfig::discovery(["10.0.0.1:26379", "10.0.0.2:26379"], "c1")
            .password("pw")
            .database(4u32);

        let expected = DiscoveryConfig {
            monitors: vec![
                Endpoint::new("10.0.0.1", 26379),
                Endpoint::new("10.0.0.2", 26379),
            ],
            cluster_name: "c1".into(),
            password: Some("pw".into()),
            database: DatabaseIndex::new(4),
            monitor_timeout: Duration::from_millis(500),
        };
        assert_eq!(config.mode().unwrap(), PoolMode::Discovery(expected));
    }

    #[test]
    fn test_mode_errors() {
        assert_eq!(
            PoolConfig::direct("redis://localhost")
                .cluster_name("c1")
                .mode(),
            Err(ConfigError::AmbiguousMode)
        );
        assert_eq!(
            PoolConfig::direct("redis://localhost")
                .monitor_addresses(["10.0.0.1:26379"])
                .mode(),
            Err(ConfigError::AmbiguousMode)
        );
        assert_eq!(
            PoolConfig::new().monitor_addresses(["10.0.0.1:26379"]).mode(),
            Err(ConfigError::MissingClusterName)
        );
        assert_eq!(
            PoolConfig::new().cluster_name("c1").mode(),
            Err(ConfigError::MissingMonitors("c1".into()))
        );
        assert_eq!(
            PoolConfig::discovery(["10.0.0.1:26379"], "  ").mode(),
            Err(ConfigError::MissingClusterName)
        );
        assert_eq!(
            PoolConfig::discovery(["10.0.0.1"], "c1").mode(),
            Err(ConfigError::InvalidAddress("10.0.0.1".into()))
        );
    }

    #[test]
    fn test_blank_connection_string_is_absent() {
        let config = PoolConfig::discovery(["10.0.0.1:26379"], "c1").connection_string("  ");
        assert!(matches!(config.mode(), Ok(PoolMode::Discovery(_))));
    }

    #[test]
    fn test_database_index_parse() {
        assert_eq!("7".parse::<DatabaseIndex>(), Ok(DatabaseIndex::new(7)));
        assert_eq!(
            "seven".parse::<DatabaseIndex>(),
            Err(ConfigError::InvalidDatabase("seven".into()))
        );
        assert_eq!(
            "-1".parse::<DatabaseIndex>(),
            Err(ConfigError::InvalidDatabase("-1".into()))
        );
    }

    #[test]
    fn test_config_validation_zero_max() {
        let config = PoolConfig::direct("redis://localhost").max_active(0).max_idle(0);
        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("max_active must be greater than 0")
        );
    }

    #[test]
    fn test_config_validation_idle_greater_than_active() {
        let config = PoolConfig::direct("redis://localhost").max_active(2).max_idle(3);
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("max_idle cannot be greater than max_active")
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = PoolConfig::direct("redis://:hunter2@localhost:6379/0");
        assert!(!format!("{config:?}").contains("hunter2"));

        let config = PoolConfig::discovery(["10.0.0.1:26379"], "c1").password("hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
