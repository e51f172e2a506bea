//! Connection pool implementation.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::config::{PoolMode, PoolOptions};
use crate::connection::Connector;
use crate::endpoint::Endpoint;
use crate::error::PoolError;
use crate::lifecycle::ConnectionMetadata;
use crate::metrics::{PoolCounters, PoolMetrics};
use crate::strategy::DialStrategy;

/// A bounded pool of connections to the current master.
///
/// The pool hands out at most `max_active` connections at once. When all of
/// them are in use, [`acquire`](Pool::acquire) waits for one to come back
/// instead of failing. Returned connections are kept (up to `max_idle`) and
/// reused; in discovery mode each reused connection must still report
/// itself as master, otherwise it is closed and a fresh one is dialed
/// against the newly resolved master.
///
/// `Pool` is a cheap handle; clones share the same connections.
pub struct Pool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("mode", &self.inner.mode)
            .field("options", &self.inner.options)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

struct PoolInner<C: Connector> {
    connector: C,
    strategy: DialStrategy,
    mode: PoolMode,
    options: PoolOptions,
    state: Mutex<PoolState<C::Connection>>,
    // Capacity freed or pool closed.
    available: Notify,
    // Open count dropped to zero.
    emptied: Notify,
    counters: PoolCounters,
    next_id: AtomicU64,
}

struct PoolState<T> {
    // Most recently returned first.
    idle: VecDeque<IdleConnection<T>>,
    // Idle + checked out + being dialed.
    open: u32,
    closed: bool,
}

struct IdleConnection<T> {
    conn: T,
    meta: ConnectionMetadata,
}

impl<T> PoolState<T> {
    fn take_expired(&mut self, idle_timeout: Duration) -> Vec<IdleConnection<T>> {
        if idle_timeout.is_zero() {
            return Vec::new();
        }
        let mut expired = Vec::new();
        // Oldest entries sit at the back.
        while self
            .idle
            .back()
            .is_some_and(|idle| idle.meta.is_idle_expired(idle_timeout))
        {
            if let Some(idle) = self.idle.pop_back() {
                expired.push(idle);
            }
        }
        self.open -= expired.len() as u32;
        expired
    }
}

enum Reservation<T> {
    Idle(IdleConnection<T>),
    Dial,
}

impl<C: Connector> Pool<C> {
    pub(crate) fn from_parts(
        connector: C,
        strategy: DialStrategy,
        mode: PoolMode,
        options: PoolOptions,
    ) -> Self {
        tracing::info!(
            mode = mode.name(),
            max_active = options.max_active,
            max_idle = options.max_idle,
            idle_timeout = ?options.idle_timeout,
            "connection pool created"
        );
        Self {
            inner: Arc::new(PoolInner {
                connector,
                strategy,
                mode,
                options,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    open: 0,
                    closed: false,
                }),
                available: Notify::new(),
                emptied: Notify::new(),
                counters: PoolCounters::default(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Get a connection to the current master.
    ///
    /// Reuses an idle connection if one is available (after the role check
    /// in discovery mode), dials a new one if the pool is below
    /// `max_active`, and otherwise waits until a connection is returned.
    /// The wait is unbounded; use [`acquire_timeout`](Self::acquire_timeout)
    /// or drop the future to give up.
    ///
    /// Fails with the resolution or dial error of the attempt, or with
    /// [`PoolError::PoolClosed`] once the pool is closed.
    pub async fn acquire(&self) -> Result<PooledConnection<C>, PoolError> {
        let result = self.checkout().await;
        self.inner.counters.checkout(result.is_ok());
        result
    }

    /// Like [`acquire`](Self::acquire), but give up after `timeout`.
    pub async fn acquire_timeout(
        &self,
        timeout: Duration,
    ) -> Result<PooledConnection<C>, PoolError> {
        match tokio::time::timeout(timeout, self.checkout()).await {
            Ok(result) => {
                self.inner.counters.checkout(result.is_ok());
                result
            }
            Err(_) => {
                self.inner.counters.checkout(false);
                Err(PoolError::AcquireTimeout(timeout))
            }
        }
    }

    /// Return a connection to the pool.
    ///
    /// Dropping a [`PooledConnection`] does the same; this variant reports
    /// [`PoolError::PoolClosed`] when the pool has been closed, in which
    /// case the connection is closed instead.
    pub fn release(&self, conn: PooledConnection<C>) -> Result<(), PoolError> {
        conn.release()
    }

    /// Close the pool.
    ///
    /// Idle connections are closed immediately, waiting and future
    /// `acquire` calls fail with [`PoolError::PoolClosed`], and connections
    /// still checked out are closed when they are returned. Calling this
    /// more than once has no further effect.
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.open -= drained.len() as u32;
            drained
        };
        self.inner.available.notify_waiters();

        let closed_idle = drained.len();
        self.inner.counters.connections_closed(closed_idle);
        drop(drained);
        let outstanding = self.status().open;
        if outstanding == 0 {
            self.inner.emptied.notify_waiters();
        }
        tracing::info!(closed_idle, outstanding, "connection pool closed");
    }

    /// Wait until every connection of a closed pool has been returned and
    /// closed. Returns immediately if nothing is open.
    pub async fn drained(&self) {
        loop {
            let notified = self.inner.emptied.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.state.lock().open == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        let idle = state.idle.len() as u32;
        PoolStatus {
            idle,
            in_use: state.open - idle,
            open: state.open,
            max_active: self.inner.options.max_active,
            max_idle: self.inner.options.max_idle,
        }
    }

    /// Get the pool counters.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        self.inner.counters.snapshot()
    }

    /// The mode the pool was built in.
    #[must_use]
    pub fn mode(&self) -> &PoolMode {
        &self.inner.mode
    }

    /// Sizing and timeouts the pool enforces.
    #[must_use]
    pub fn options(&self) -> &PoolOptions {
        &self.inner.options
    }

    /// The dial strategy.
    #[must_use]
    pub fn strategy(&self) -> &DialStrategy {
        &self.inner.strategy
    }

    async fn checkout(&self) -> Result<PooledConnection<C>, PoolError> {
        let inner = &self.inner;
        let (slot, reservation) = self.reserve().await?;

        if let Reservation::Idle(mut idle) = reservation {
            if inner
                .strategy
                .validate(&mut idle.conn, inner.options.validation_timeout)
                .await
            {
                return slot.hand_out(idle.conn, idle.meta);
            }

            inner.counters.validation_failed();
            inner.counters.connections_closed(1);
            tracing::info!(
                connection_id = idle.meta.id,
                endpoint = %idle.meta.endpoint,
                "idle connection is no longer master, redialing"
            );
            // The slot stays reserved for the redial.
            drop(idle);
        }

        let (conn, endpoint) = inner
            .strategy
            .dial(&inner.connector, inner.options.connect_timeout)
            .await?;
        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        inner.counters.connection_created();
        tracing::debug!(connection_id = id, endpoint = %endpoint, "connection established");

        slot.hand_out(conn, ConnectionMetadata::new(id, endpoint))
    }

    async fn reserve(&self) -> Result<(Slot<C>, Reservation<C::Connection>), PoolError> {
        let inner = &self.inner;
        loop {
            let notified = inner.available.notified();
            tokio::pin!(notified);
            // Register before looking at the state so a release between the
            // check and the await is not missed.
            notified.as_mut().enable();

            let (reservation, expired) = {
                let mut state = inner.state.lock();
                if state.closed {
                    return Err(PoolError::PoolClosed);
                }
                let expired = state.take_expired(inner.options.idle_timeout);
                let reservation = if let Some(idle) = state.idle.pop_front() {
                    Some(Reservation::Idle(idle))
                } else if state.open < inner.options.max_active {
                    state.open += 1;
                    Some(Reservation::Dial)
                } else {
                    None
                };
                (reservation, expired)
            };

            if !expired.is_empty() {
                inner.counters.idle_expired(expired.len());
                inner.counters.connections_closed(expired.len());
                tracing::debug!(count = expired.len(), "closing expired idle connections");
                drop(expired);
                inner.available.notify_waiters();
            }

            match reservation {
                Some(reservation) => return Ok((Slot::new(Arc::clone(inner)), reservation)),
                None => {
                    tracing::trace!("pool saturated, waiting for a connection");
                    notified.await;
                }
            }
        }
    }
}

impl<C: Connector> PoolInner<C> {
    // Give back an open-connection slot whose connection is gone.
    fn release_slot(&self) {
        let open = {
            let mut state = self.state.lock();
            state.open -= 1;
            state.open
        };
        self.wake(open);
    }

    fn check_in(&self, conn: C::Connection, mut meta: ConnectionMetadata) -> Result<(), PoolError> {
        let (rejected, result, open) = {
            let mut state = self.state.lock();
            if state.closed {
                state.open -= 1;
                (Some(conn), Err(PoolError::PoolClosed), state.open)
            } else if state.idle.len() >= self.options.max_idle as usize {
                state.open -= 1;
                (Some(conn), Ok(()), state.open)
            } else {
                meta.mark_checkin();
                state.idle.push_front(IdleConnection { conn, meta });
                (None, Ok(()), state.open)
            }
        };

        if let Some(conn) = rejected {
            self.counters.connections_closed(1);
            drop(conn);
        }
        self.wake(open);
        result
    }

    fn wake(&self, open: u32) {
        self.available.notify_one();
        if open == 0 {
            self.emptied.notify_waiters();
        }
    }
}

// An open-connection slot reserved by `acquire`. Released on drop unless it
// was turned into a `PooledConnection`, so failed or cancelled attempts do
// not leak capacity.
struct Slot<C: Connector> {
    pool: Option<Arc<PoolInner<C>>>,
}

impl<C: Connector> Slot<C> {
    fn new(pool: Arc<PoolInner<C>>) -> Self {
        Self { pool: Some(pool) }
    }

    fn hand_out(
        mut self,
        conn: C::Connection,
        mut meta: ConnectionMetadata,
    ) -> Result<PooledConnection<C>, PoolError> {
        let Some(pool) = self.pool.take() else {
            return Err(PoolError::PoolClosed);
        };
        if pool.state.lock().closed {
            // Closed while we were dialing or validating.
            pool.counters.connections_closed(1);
            drop(conn);
            pool.release_slot();
            return Err(PoolError::PoolClosed);
        }
        meta.mark_checkout();
        Ok(PooledConnection {
            conn: Some(conn),
            meta,
            pool,
        })
    }
}

impl<C: Connector> Drop for Slot<C> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release_slot();
        }
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub idle: u32,
    /// Number of connections checked out or being established.
    pub in_use: u32,
    /// Total number of open connections.
    pub open: u32,
    /// Maximum allowed open connections.
    pub max_active: u32,
    /// Maximum retained idle connections.
    pub max_idle: u32,
}

/// A connection retrieved from the pool.
///
/// Dereferences to the underlying store connection. When dropped, the
/// connection is returned to the pool.
pub struct PooledConnection<C: Connector> {
    // Always `Some` until the connection is released, discarded or dropped.
    conn: Option<C::Connection>,
    meta: ConnectionMetadata,
    pool: Arc<PoolInner<C>>,
}

impl<C: Connector> PooledConnection<C> {
    /// Metadata about this connection.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.meta
    }

    /// The endpoint this connection was dialed to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.meta.endpoint
    }

    /// Return the connection to the pool, reporting
    /// [`PoolError::PoolClosed`] if the pool no longer accepts it.
    pub fn release(mut self) -> Result<(), PoolError> {
        match self.conn.take() {
            Some(conn) => self.pool.check_in(conn, self.meta.clone()),
            None => Ok(()),
        }
    }

    /// Close the connection instead of returning it, e.g. after an I/O
    /// error left it in an unknown state. Frees its slot.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::debug!(connection_id = self.meta.id, "discarding connection");
            self.pool.counters.connections_closed(1);
            drop(conn);
            self.pool.release_slot();
        }
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    #[allow(clippy::expect_used)] // conn is only taken by consuming methods and Drop
    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("pooled connection already released")
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    #[allow(clippy::expect_used)] // conn is only taken by consuming methods and Drop
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("pooled connection already released")
    }
}

impl<C: Connector> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::trace!(connection_id = self.meta.id, "returning connection to pool");
            // A closed pool closes the connection; nothing to report here.
            let _ = self.pool.check_in(conn, self.meta.clone());
        }
    }
}
