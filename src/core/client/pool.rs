// src/core/client/pool.rs

//! A bounded pool of `RespConnection`s.
//!
//! Checked-out connections are limited by a semaphore sized to `pool.size`.
//! Idle connections are kept in a FIFO queue and discarded once they exceed
//! `pool.max_age` or have been idle longer than `pool.idle_timeout`. A reaper
//! task runs every `pool.idle_check_interval` to evict stale idle connections
//! and keep at least `pool.min_idle` ready.

use super::connection::RespConnection;
use crate::config::Settings;
use crate::core::DatasourceError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tokio::time::{self, Instant};
use tracing::debug;

struct IdleConnection {
    conn: RespConnection,
    created_at: Instant,
    idle_since: Instant,
}

/// A connection checked out of the pool. It holds one pool permit until it is
/// either returned with [`ConnectionPool::put`] or dropped (which discards it).
pub(crate) struct PooledConnection {
    pub(crate) conn: RespConnection,
    created_at: Instant,
    _permit: OwnedSemaphorePermit,
}

/// A point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: usize,
    pub idle: usize,
    pub in_use: usize,
}

pub(crate) struct ConnectionPool {
    settings: Settings,
    idle: Mutex<VecDeque<IdleConnection>>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl ConnectionPool {
    /// Creates the pool and dials its first connection eagerly so that an
    /// unreachable store is reported immediately.
    pub(crate) async fn connect(settings: &Settings) -> Result<Arc<Self>, DatasourceError> {
        let first = RespConnection::connect(settings).await?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let now = Instant::now();

        let pool = Arc::new(Self {
            settings: settings.clone(),
            idle: Mutex::new(VecDeque::from([IdleConnection {
                conn: first,
                created_at: now,
                idle_since: now,
            }])),
            permits: Arc::new(Semaphore::new(settings.pool().size)),
            closed: AtomicBool::new(false),
            shutdown_tx,
        });

        let check_interval = settings.pool().idle_check_interval;
        if !check_interval.is_zero() {
            tokio::spawn(run_reaper(Arc::downgrade(&pool), check_interval, shutdown_rx));
        }
        Ok(pool)
    }

    /// Checks out a connection, reusing a fresh idle one or dialing a new one.
    /// Waits at most `pool.pool_timeout` for a free slot.
    pub(crate) async fn get(&self) -> Result<PooledConnection, DatasourceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DatasourceError::ConnectionClosed);
        }

        let permit = match time::timeout(
            self.settings.pool().pool_timeout,
            self.permits.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(DatasourceError::ConnectionClosed),
            Err(_) => return Err(DatasourceError::PoolTimeout),
        };

        loop {
            let next = self.idle.lock().pop_front();
            let Some(idle) = next else { break };
            if self.is_stale(&idle, Instant::now()) {
                debug!("Discarding stale idle connection.");
                continue;
            }
            return Ok(PooledConnection {
                conn: idle.conn,
                created_at: idle.created_at,
                _permit: permit,
            });
        }

        let conn = RespConnection::connect(&self.settings).await?;
        Ok(PooledConnection {
            conn,
            created_at: Instant::now(),
            _permit: permit,
        })
    }

    /// Returns a healthy connection to the idle queue. Connections that failed
    /// mid-request must be dropped instead.
    pub(crate) fn put(&self, pooled: PooledConnection) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let PooledConnection {
            conn,
            created_at,
            _permit,
        } = pooled;
        self.idle.lock().push_back(IdleConnection {
            conn,
            created_at,
            idle_since: Instant::now(),
        });
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let size = self.settings.pool().size;
        PoolStats {
            size,
            idle: self.idle.lock().len(),
            in_use: size.saturating_sub(self.permits.available_permits()),
        }
    }

    /// Drops every idle connection, stops the reaper and fails pending checkouts.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        self.permits.close();
        self.idle.lock().clear();
    }

    fn is_stale(&self, idle: &IdleConnection, now: Instant) -> bool {
        let pool = self.settings.pool();
        let too_old = !pool.max_age.is_zero() && now.duration_since(idle.created_at) >= pool.max_age;
        let too_idle =
            !pool.idle_timeout.is_zero() && now.duration_since(idle.idle_since) >= pool.idle_timeout;
        too_old || too_idle
    }

    async fn reap(&self) {
        let now = Instant::now();
        let evicted = {
            let mut idle = self.idle.lock();
            let before = idle.len();
            idle.retain(|c| !self.is_stale(c, now));
            before - idle.len()
        };
        if evicted > 0 {
            debug!("Pool reaper evicted {} stale idle connection(s).", evicted);
        }

        let min_idle = self.settings.pool().min_idle;
        while !self.closed.load(Ordering::Acquire) && self.idle.lock().len() < min_idle {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                break;
            };
            match RespConnection::connect(&self.settings).await {
                Ok(conn) => self.put(PooledConnection {
                    conn,
                    created_at: Instant::now(),
                    _permit: permit,
                }),
                Err(e) => {
                    debug!("Pool reaper could not replenish idle connections: {}", e);
                    break;
                }
            }
        }
    }
}

async fn run_reaper(
    pool: Weak<ConnectionPool>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut timer = time::interval_at(Instant::now() + interval, interval);
    timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = timer.tick() => {
                let Some(pool) = pool.upgrade() else { return };
                pool.reap().await;
            }
            _ = shutdown_rx.recv() => return,
        }
    }
}
