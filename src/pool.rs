//! Fixed-size connection pool over the spatial engine.
//!
//! The pool converts unbounded request concurrency into admission control:
//! at most `size` queries run against the engine at once, and everything
//! else waits in [`ConnectionPool::acquire`].
//!
//! # Lifecycle
//!
//! - [`ConnectionPool::initialize`] opens every connection up front and runs
//!   the manager's capability check on each. Any failure aborts startup.
//! - [`ConnectionPool::acquire`] waits (FIFO) for an idle connection and
//!   returns a [`PooledConnection`] guard. Dropping the guard returns the
//!   connection, whether the borrower finished, failed, or was cancelled.
//! - [`ConnectionPool::shutdown`] closes idle connections and wakes every
//!   waiter with [`PoolError::Closed`]. Connections still on loan are closed
//!   when their guard drops.
//!
//! # Waiting
//!
//! `acquire` has no timeout and waits for as long as the pool stays
//! exhausted. [`ConnectionPool::acquire_timeout`] is the bounded variant.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::engine::{ConnectionManager, SpatialConnection};
use crate::error::PoolError;

/// Default number of pooled connections.
pub const DEFAULT_POOL_SIZE: usize = 4;

// =============================================================================
// Pool
// =============================================================================

/// A fixed set of engine connections, lent out one request at a time.
///
/// Cloning is cheap and shares the same pool.
pub struct ConnectionPool<C: SpatialConnection> {
    shared: Arc<Shared<C>>,
    permits: Arc<Semaphore>,
    size: usize,
}

struct Shared<C> {
    /// Connections not currently on loan, plus the closed flag. Both live
    /// under one lock so a returning guard and `shutdown` cannot interleave.
    state: Mutex<IdleState<C>>,
}

struct IdleState<C> {
    idle: Vec<C>,
    closed: bool,
}

impl<C> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, IdleState<C>> {
        // Critical sections only push/pop a Vec, so a poisoned lock still
        // holds consistent data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: SpatialConnection> ConnectionPool<C> {
    /// Open `size` connections through `manager`, checking each one.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidSize`] for a zero size, and
    /// [`PoolError::StartupCheckFailed`] if any connection cannot be opened
    /// or fails its check. Connections opened before the failure are closed.
    pub async fn initialize<M>(size: usize, manager: &M) -> Result<Self, PoolError>
    where
        M: ConnectionManager<Connection = C>,
    {
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }

        let mut connections = Vec::with_capacity(size);
        for index in 0..size {
            let opened = match manager.connect().await {
                Ok(mut conn) => match manager.check(&mut conn).await {
                    Ok(()) => Ok(conn),
                    Err(e) => {
                        let _ = conn.close().await;
                        Err(e)
                    }
                },
                Err(e) => Err(e),
            };

            match opened {
                Ok(conn) => {
                    debug!(connection = index + 1, of = size, "Opened pooled connection");
                    connections.push(conn);
                }
                Err(e) => {
                    for conn in connections {
                        let _ = conn.close().await;
                    }
                    return Err(PoolError::StartupCheckFailed(format!(
                        "connection {} of {}: {}",
                        index + 1,
                        size,
                        e
                    )));
                }
            }
        }

        info!(size, "Connection pool ready");
        Self::from_connections(connections)
    }

    /// Build a pool from already-open connections, skipping the checks.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidSize`] if `connections` is empty.
    pub fn from_connections(connections: Vec<C>) -> Result<Self, PoolError> {
        if connections.is_empty() {
            return Err(PoolError::InvalidSize);
        }
        let size = connections.len();
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(IdleState {
                    idle: connections,
                    closed: false,
                }),
            }),
            permits: Arc::new(Semaphore::new(size)),
            size,
        })
    }

    /// Borrow a connection, waiting as long as necessary.
    ///
    /// Waiters are served in arrival order. Fails with [`PoolError::Closed`]
    /// once the pool is shut down, including for tasks already waiting.
    pub async fn acquire(&self) -> Result<PooledConnection<C>, PoolError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        self.checkout(permit)
    }

    /// Borrow a connection, giving up after `timeout`.
    pub async fn acquire_timeout(
        &self,
        timeout: Duration,
    ) -> Result<PooledConnection<C>, PoolError> {
        match tokio::time::timeout(timeout, self.acquire()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?timeout, "Timed out waiting for a pooled connection");
                Err(PoolError::ExhaustedTimeout(timeout))
            }
        }
    }

    fn checkout(&self, permit: OwnedSemaphorePermit) -> Result<PooledConnection<C>, PoolError> {
        let mut state = self.shared.lock();
        if state.closed {
            return Err(PoolError::Closed);
        }
        // A permit is only granted while an idle connection exists
        let conn = state.idle.pop().ok_or(PoolError::Closed)?;
        Ok(PooledConnection {
            conn: Some(conn),
            shared: Arc::clone(&self.shared),
            permit: Some(permit),
        })
    }

    /// Close the pool.
    ///
    /// Idle connections are closed now; borrowed ones are closed as they come
    /// back. Further `acquire` calls fail immediately. Calling this twice is
    /// harmless.
    pub async fn shutdown(&self) {
        let idle = {
            let mut state = self.shared.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.idle)
        };
        self.permits.close();

        let on_loan = self.size - idle.len();
        let mut failed = 0usize;
        for conn in idle {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "Failed to close pooled connection");
                failed += 1;
            }
        }

        info!(
            size = self.size,
            on_loan, failed, "Connection pool shut down"
        );
    }

    /// Total number of connections.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Connections currently idle.
    pub fn idle(&self) -> usize {
        self.shared.lock().idle.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl<C: SpatialConnection> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            permits: Arc::clone(&self.permits),
            size: self.size,
        }
    }
}

// =============================================================================
// Pooled Connection
// =============================================================================

/// A borrowed connection. Returned to the pool on drop.
pub struct PooledConnection<C: SpatialConnection> {
    conn: Option<C>,
    shared: Arc<Shared<C>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl<C: SpatialConnection> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Only taken in Drop
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<C: SpatialConnection> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<C: SpatialConnection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        let leftover = {
            let mut state = self.shared.lock();
            if state.closed {
                Some(conn)
            } else {
                state.idle.push(conn);
                None
            }
        };

        // Release the permit only after the connection is back, so the woken
        // waiter is guaranteed to find it.
        drop(self.permit.take());

        if let Some(conn) = leftover {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = conn.close().await {
                            warn!(error = %e, "Failed to close returned connection");
                        }
                    });
                }
                Err(_) => drop(conn),
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
