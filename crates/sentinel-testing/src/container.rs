//! Redis container support via testcontainers.

use testcontainers::Image;
use testcontainers::core::{ContainerPort, WaitFor};

/// Port the Redis server listens on inside the container.
pub const REDIS_PORT: u16 = 6379;

/// Redis container image.
///
/// Uses the official `redis` image. With a password set, the server is
/// started with `--requirepass`.
#[derive(Debug, Clone)]
pub struct RedisContainer {
    /// Password required by the server, if any.
    pub password: Option<String>,
    /// Container tag (version).
    pub tag: String,
    cmd: Vec<String>,
}

impl Default for RedisContainer {
    fn default() -> Self {
        Self {
            password: None,
            tag: "7-alpine".to_string(),
            cmd: Vec::new(),
        }
    }
}

impl RedisContainer {
    /// Create a new Redis container configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.cmd = vec![
            "redis-server".to_string(),
            "--requirepass".to_string(),
            password.clone(),
        ];
        self.password = Some(password);
        self
    }

    /// Set the container tag (Redis version).
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Connection string for a server reachable at `host:port`.
    #[must_use]
    pub fn connection_string(&self, host: &str, port: u16) -> String {
        match &self.password {
            Some(password) => format!("redis://:{password}@{host}:{port}/0"),
            None => format!("redis://{host}:{port}/0"),
        }
    }
}

impl Image for RedisContainer {
    fn name(&self) -> &str {
        "redis"
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    fn ready_conditions(&self) -> Vec<WaitFor> {
        vec![WaitFor::message_on_stdout("Ready to accept connections")]
    }

    fn cmd(&self) -> impl IntoIterator<Item = impl Into<std::borrow::Cow<'_, str>>> {
        self.cmd.iter().map(String::as_str)
    }

    fn expose_ports(&self) -> &[ContainerPort] {
        &[ContainerPort::Tcp(REDIS_PORT)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string() {
        let image = RedisContainer::new();
        assert_eq!(
            image.connection_string("127.0.0.1", 32768),
            "redis://127.0.0.1:32768/0"
        );

        let image = RedisContainer::new().with_password("secret");
        assert_eq!(
            image.connection_string("127.0.0.1", 32768),
            "redis://:secret@127.0.0.1:32768/0"
        );
    }
}
