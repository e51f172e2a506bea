//! Network endpoints and connection strings.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::config::DatabaseIndex;
use crate::error::ConfigError;

/// Default port of a store node.
pub const DEFAULT_STORE_PORT: u16 = 6379;

/// Scheme accepted in connection strings.
pub const CONNECTION_STRING_SCHEME: &str = "redis";

/// A `host:port` pair.
///
/// Produced fresh by the master resolver for every dial, and parsed from
/// configured monitor addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP address, without brackets for IPv6.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    /// Parse `host:port` or `[v6-addr]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidAddress(s.to_string());
        let trimmed = s.trim();

        let (host, port) = trimmed.rsplit_once(':').ok_or_else(invalid)?;
        let host = match host.strip_prefix('[') {
            Some(rest) => rest.strip_suffix(']').ok_or_else(invalid)?,
            None if host.contains(':') => return Err(invalid()),
            None => host,
        };
        if host.is_empty() {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }

        Ok(Self::new(host, port))
    }
}

/// A validated `redis://` connection string.
///
/// The literal string is kept for dialing, so whatever the protocol client
/// understands (credentials, database path) is passed through untouched.
/// `Display` and `Debug` never print the password.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    raw: String,
    endpoint: Endpoint,
    database: DatabaseIndex,
    has_password: bool,
}

impl ConnectionString {
    /// Parse and validate a connection string of the form
    /// `redis://[[user]:password@]host[:port][/db]`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| ConfigError::InvalidConnectionString(e.to_string()))?;

        if url.scheme() != CONNECTION_STRING_SCHEME {
            return Err(ConfigError::InvalidConnectionString(format!(
                "unsupported scheme {:?}, expected {CONNECTION_STRING_SCHEME:?}",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::InvalidConnectionString("missing host".into()))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let port = url.port().unwrap_or(DEFAULT_STORE_PORT);

        let database = match url.path().trim_start_matches('/') {
            "" => DatabaseIndex::default(),
            path => path.parse()?,
        };

        Ok(Self {
            raw: raw.trim().to_string(),
            endpoint: Endpoint::new(host, port),
            database,
            has_password: url.password().is_some(),
        })
    }

    /// The literal connection string, including credentials.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The host and port encoded in the string.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The database selected by the string's path (0 when absent).
    #[must_use]
    pub fn database(&self) -> DatabaseIndex {
        self.database
    }
}

impl FromStr for ConnectionString {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let auth = if self.has_password { ":***@" } else { "" };
        write!(
            f,
            "{CONNECTION_STRING_SCHEME}://{auth}{}/{}",
            self.endpoint, self.database
        )
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionString")
            .field(&format_args!("{self}"))
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse() {
        let ep: Endpoint = "10.0.0.5:6379".parse().unwrap();
        assert_eq!(ep.host(), "10.0.0.5");
        assert_eq!(ep.port(), 6379);
        assert_eq!(ep.to_string(), "10.0.0.5:6379");
    }

    #[test]
    fn test_endpoint_parse_ipv6() {
        let ep: Endpoint = "[::1]:26379".parse().unwrap();
        assert_eq!(ep.host(), "::1");
        assert_eq!(ep.to_string(), "[::1]:26379");
    }

    #[test]
    fn test_endpoint_parse_rejects_garbage() {
        for bad in ["", "10.0.0.5", ":6379", "host:", "host:0", "host:99999", "::1:6379"] {
            assert_eq!(
                bad.parse::<Endpoint>(),
                Err(ConfigError::InvalidAddress(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_connection_string_full() {
        let cs = ConnectionString::parse("redis://:secret@cache.internal:6380/3").unwrap();
        assert_eq!(cs.endpoint(), &Endpoint::new("cache.internal", 6380));
        assert_eq!(cs.database().get(), 3);
        assert_eq!(cs.as_str(), "redis://:secret@cache.internal:6380/3");
    }

    #[test]
    fn test_connection_string_defaults() {
        let cs = ConnectionString::parse("redis://localhost").unwrap();
        assert_eq!(cs.endpoint(), &Endpoint::new("localhost", DEFAULT_STORE_PORT));
        assert_eq!(cs.database().get(), 0);
    }

    #[test]
    fn test_connection_string_redacts_password() {
        let cs = ConnectionString::parse("redis://:hunter2@localhost:6379/1").unwrap();
        assert_eq!(cs.to_string(), "redis://:***@localhost:6379/1");
        assert!(!format!("{cs:?}").contains("hunter2"));
    }

    #[test]
    fn test_connection_string_rejects_bad_input() {
        assert!(matches!(
            ConnectionString::parse("http://localhost:6379"),
            Err(ConfigError::InvalidConnectionString(_))
        ));
        assert!(matches!(
            ConnectionString::parse("not a url"),
            Err(ConfigError::InvalidConnectionString(_))
        ));
        assert_eq!(
            ConnectionString::parse("redis://localhost/zero"),
            Err(ConfigError::InvalidDatabase("zero".into()))
        );
    }
}
