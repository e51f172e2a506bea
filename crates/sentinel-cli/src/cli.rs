//! Command-line arguments.

use std::time::Duration;

use clap::Parser;
use sentinel_pool::config::{
    DEFAULT_DIRECT_MAX_ACTIVE, DEFAULT_DIRECT_MAX_IDLE, DEFAULT_DISCOVERY_MAX_ACTIVE,
    DEFAULT_DISCOVERY_MAX_IDLE,
};
use sentinel_pool::{ConfigError, DatabaseIndex, PoolConfig};

/// Run a Redis connection pool that follows the Sentinel-elected master.
#[derive(Debug, Parser)]
#[command(name = "sentinel-cli", version, about)]
pub struct Cli {
    /// Namespace the pool's consumers work in
    #[arg(long, default_value = "work")]
    pub ns: String,

    /// Redis connection string (direct mode)
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Comma-separated Sentinel addresses (discovery mode)
    #[arg(long, env = "REDIS_SENTINELS", value_delimiter = ',')]
    pub sentinels: Vec<String>,

    /// Name Sentinel knows the master by (discovery mode)
    #[arg(long, env = "REDIS_MASTER_NAME")]
    pub master_name: Option<String>,

    /// Database index to select (discovery mode)
    #[arg(long, env = "REDIS_DATABASE", default_value = "0")]
    pub database: String,

    /// Password for the master (discovery mode)
    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Maximum open connections [default: 3 direct, 5 discovery]
    #[arg(long)]
    pub max_active: Option<u32>,

    /// Maximum idle connections kept [default: 3 direct, 5 discovery]
    #[arg(long)]
    pub max_idle: Option<u32>,

    /// Seconds before an idle connection is closed (0 keeps them forever)
    #[arg(long, default_value_t = 240)]
    pub idle_timeout: u64,

    /// Seconds between probe acquisitions (0 disables probing)
    #[arg(long, default_value_t = 10)]
    pub probe_interval: u64,

    /// Seconds to wait for outstanding connections on shutdown
    #[arg(long, default_value_t = 5)]
    pub drain_timeout: u64,
}

impl Cli {
    /// Translate the flags into a pool configuration.
    ///
    /// Mode selection and completeness are checked later by
    /// [`PoolConfig::validate`]; only the database index is parsed here.
    pub fn pool_config(&self) -> Result<PoolConfig, ConfigError> {
        let database: DatabaseIndex = self.database.parse()?;
        let discovery = self.redis_url.is_none();

        let mut config = PoolConfig::new()
            .monitor_addresses(
                self.sentinels
                    .iter()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty()),
            )
            .database(database)
            .idle_timeout(Duration::from_secs(self.idle_timeout));
        if let Some(url) = &self.redis_url {
            config = config.connection_string(url.as_str());
        }
        if let Some(name) = &self.master_name {
            config = config.cluster_name(name.as_str());
        }
        if let Some(password) = &self.password {
            config = config.password(password.as_str());
        }

        let (default_active, default_idle) = if discovery {
            (DEFAULT_DISCOVERY_MAX_ACTIVE, DEFAULT_DISCOVERY_MAX_IDLE)
        } else {
            (DEFAULT_DIRECT_MAX_ACTIVE, DEFAULT_DIRECT_MAX_IDLE)
        };
        let max_active = self.max_active.unwrap_or(default_active);
        let max_idle = self.max_idle.unwrap_or(default_idle.min(max_active));
        Ok(config.max_active(max_active).max_idle(max_idle))
    }

    /// Interval between probes, `None` when disabled.
    pub fn probe_interval(&self) -> Option<Duration> {
        (self.probe_interval > 0).then(|| Duration::from_secs(self.probe_interval))
    }

    /// Bound on the shutdown drain wait.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sentinel_pool::PoolMode;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("sentinel-cli").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_direct_mode_flags() {
        let cli = parse(&["--redis-url", "redis://10.0.0.5:6379/1"]);
        let config = cli.pool_config().unwrap();

        assert_eq!(cli.ns, "work");
        assert_eq!(config.max_active, DEFAULT_DIRECT_MAX_ACTIVE);
        assert_eq!(config.max_idle, DEFAULT_DIRECT_MAX_IDLE);
        assert_eq!(config.idle_timeout, Duration::from_secs(240));
        assert!(matches!(config.mode().unwrap(), PoolMode::Direct(_)));
    }

    #[test]
    fn test_discovery_mode_flags() {
        let cli = parse(&[
            "--sentinels",
            "10.0.0.1:26379, 10.0.0.2:26379",
            "--master-name",
            "mymaster",
            "--database",
            "2",
            "--password",
            "secret",
            "--max-active",
            "8",
        ]);
        let config = cli.pool_config().unwrap();

        assert_eq!(config.monitor_addresses, ["10.0.0.1:26379", "10.0.0.2:26379"]);
        assert_eq!(config.max_active, 8);
        assert_eq!(config.max_idle, DEFAULT_DISCOVERY_MAX_IDLE);
        match config.mode().unwrap() {
            PoolMode::Discovery(discovery) => {
                assert_eq!(discovery.cluster_name, "mymaster");
                assert_eq!(discovery.database, DatabaseIndex::new(2));
                assert_eq!(discovery.password.as_deref(), Some("secret"));
            }
            other => panic!("expected discovery mode, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_database() {
        let cli = parse(&["--sentinels", "10.0.0.1:26379", "--database", "zero"]);
        assert!(matches!(
            cli.pool_config(),
            Err(ConfigError::InvalidDatabase(_))
        ));
    }

    #[test]
    fn test_no_mode_is_rejected() {
        let cli = parse(&[]);
        assert_eq!(
            cli.pool_config().unwrap().validate(),
            Err(ConfigError::MissingMode)
        );
    }

    #[test]
    fn test_probe_interval_zero_disables() {
        let cli = parse(&["--probe-interval", "0"]);
        assert_eq!(cli.probe_interval(), None);
    }

    #[test]
    fn test_idle_default_follows_smaller_max_active() {
        let cli = parse(&["--redis-url", "redis://10.0.0.5:6379", "--max-active", "2"]);
        let config = cli.pool_config().unwrap();
        assert_eq!(config.max_idle, 2);
        assert!(config.validate().is_ok());
    }
}
