//! Connection lifecycle bookkeeping.
//!
//! Metadata the pool keeps alongside each physical connection: where it
//! points, when it was created and last returned, how often it was handed
//! out. Idle expiry is decided from this.

use std::time::Duration;

use tokio::time::Instant;

use crate::endpoint::Endpoint;

/// Metadata about a pooled connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Unique identifier for this connection within its pool.
    pub id: u64,
    /// The endpoint the connection was dialed to.
    pub endpoint: Endpoint,
    /// When the connection was created.
    pub created_at: Instant,
    /// When the connection was last checked out or returned.
    pub last_used_at: Instant,
    /// Number of times the connection has been checked out.
    pub checkout_count: u64,
}

impl ConnectionMetadata {
    /// Create metadata for a freshly dialed connection.
    pub fn new(id: u64, endpoint: Endpoint) -> Self {
        let now = Instant::now();
        Self {
            id,
            endpoint,
            created_at: now,
            last_used_at: now,
            checkout_count: 0,
        }
    }

    /// Check if the connection has been idle too long. A zero timeout never
    /// expires.
    #[must_use]
    pub fn is_idle_expired(&self, idle_timeout: Duration) -> bool {
        !idle_timeout.is_zero() && self.last_used_at.elapsed() > idle_timeout
    }

    /// Mark the connection as checked out.
    pub fn mark_checkout(&mut self) {
        self.last_used_at = Instant::now();
        self.checkout_count += 1;
    }

    /// Mark the connection as returned to idle.
    pub fn mark_checkin(&mut self) {
        self.last_used_at = Instant::now();
    }
}
