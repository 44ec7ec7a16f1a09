// src/core/datasource/mod.rs

//! The managed datasource: one live connection, a health supervisor that keeps
//! it alive, and observers notified of every status change.
//!
//! All command traffic borrows the current handle through [`Datasource::conn`].
//! Only the supervisor and the explicit control operations (`reconnect`,
//! `close`) ever replace it, and they do so under a short exclusive lock.

use crate::config::Settings;
use crate::core::DatasourceError;
use crate::core::client::{Connector, Handle, RespConnector};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::{info, warn};

mod dispatcher;
mod prober;
mod reconnector;
pub mod report;
mod scan;
pub mod state;
mod supervisor;

use self::report::{ReportBuilder, StatusKind, StatusReport};
pub use self::scan::KeyEntry;
use self::state::{ConnectionState, ReplicaCallback, Slot, StatusCallback};

/// A cheaply cloneable handle to a managed connection.
#[derive(Clone)]
pub struct Datasource {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    settings: Settings,
    connector: Arc<dyn Connector>,
    state: RwLock<ConnectionState>,
    shutdown_tx: broadcast::Sender<()>,
    supervised: AtomicBool,
}

impl fmt::Debug for Datasource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Datasource")
            .field("identity", &self.inner.settings.redacted_url())
            .field("connected", &(state.handle.is_some() && state.report.is_success()))
            .field("status", &state.report.kind())
            .field("supervised", &self.is_supervised())
            .finish()
    }
}

impl Datasource {
    /// Opens a datasource over the RESP client.
    pub async fn open(settings: Settings) -> Self {
        Self::open_with(settings, Arc::new(RespConnector)).await
    }

    /// Opens a datasource using `connector` to create connection handles.
    ///
    /// Never fails: the outcome of the initial connect is available through
    /// [`Datasource::wrap`]. When the datasource is disabled no connection is
    /// attempted. When keepalive is enabled and the initial connect succeeded,
    /// the supervisor is started on the current runtime.
    pub async fn open_with(settings: Settings, connector: Arc<dyn Connector>) -> Self {
        let mut builder = ReportBuilder::start();
        let identity = settings.redacted_url();

        if !settings.is_enabled() {
            info!("Datasource is disabled; no connection will be made.");
            let err = DatasourceError::ServiceDisabled;
            let report = builder.fail(err.status_kind(), "datasource is disabled", &err);
            return Self::from_parts(settings, connector, None, report);
        }

        builder.debug("address", identity.clone());
        let handle = match connector.connect(&settings).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Could not connect to {}: {}", identity, e);
                builder.debug("connect_error", e.to_string());
                let report = builder.fail(
                    StatusKind::ConnectionUnavailable,
                    "could not create a connection",
                    &e,
                );
                return Self::from_parts(settings, connector, None, report);
            }
        };

        if let Err(e) = handle.ping().await {
            warn!("Initial ping to {} failed: {}", identity, e);
            handle.close().await;
            builder.debug("probe_error", e.to_string());
            let err = DatasourceError::Unreachable(e.to_string());
            let report = builder.fail(
                err.status_kind(),
                "data store did not answer the initial ping",
                &err,
            );
            return Self::from_parts(settings, connector, None, report);
        }

        if settings.is_debugging() {
            for (key, value) in handle.stats() {
                builder.debug(key, value);
            }
        }
        let report = builder.succeed(StatusKind::Connected, "connection established");
        info!("Connected to {}", identity);

        let keepalive = settings.is_keepalive_enabled();
        let datasource = Self::from_parts(settings, connector, Some(handle), report);
        if keepalive {
            supervisor::spawn(datasource.clone());
        }
        datasource
    }

    fn from_parts(
        settings: Settings,
        connector: Arc<dyn Connector>,
        handle: Option<Handle>,
        report: StatusReport,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(Inner {
                settings,
                connector,
                state: RwLock::new(ConnectionState::new(handle, report)),
                shutdown_tx,
                supervised: AtomicBool::new(false),
            }),
        }
    }

    /// The current connection handle, if any. Holding the handle does not keep
    /// it open: once a reconnect or `close` retires it, the handle is closed and
    /// further commands on it fail with `ConnectionClosed`. Call `conn()` again
    /// for each unit of work.
    pub fn conn(&self) -> Option<Handle> {
        self.inner.state.read().handle.clone()
    }

    /// The most recently published status report.
    pub fn wrap(&self) -> StatusReport {
        self.inner.state.read().report.clone()
    }

    /// True if a handle is installed and the last report was a success.
    pub fn is_connected(&self) -> bool {
        let state = self.inner.state.read();
        state.handle.is_some() && state.report.is_success()
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// True while the background supervisor task is running. It turns false
    /// once the task has exited, shortly after [`Datasource::stop`].
    pub fn is_supervised(&self) -> bool {
        self.inner.supervised.load(Ordering::Acquire)
    }

    /// Registers the callback invoked with published reports, replacing any
    /// previous one. While a call is still running, newer reports skip the
    /// callback instead of queueing behind it.
    pub fn set_on<F>(&self, callback: F)
    where
        F: Fn(StatusReport) + Send + Sync + 'static,
    {
        let callback: StatusCallback = Arc::new(callback);
        self.inner.state.write().on_status = Some(Slot::new(callback));
    }

    /// Registers the callback invoked with every report and a clone of this datasource.
    pub fn set_on_replica<F>(&self, callback: F)
    where
        F: Fn(StatusReport, Datasource) + Send + Sync + 'static,
    {
        let callback: ReplicaCallback = Arc::new(callback);
        self.inner.state.write().on_replica_status = Some(Slot::new(callback));
    }

    /// Registers the notification callback (used by alerting integrations).
    pub fn set_notifier<F>(&self, callback: F)
    where
        F: Fn(StatusReport) + Send + Sync + 'static,
    {
        let callback: StatusCallback = Arc::new(callback);
        self.inner.state.write().on_notify = Some(Slot::new(callback));
    }

    /// Pings the current handle without changing any state.
    pub async fn probe(&self) -> Result<(), DatasourceError> {
        if !self.inner.settings.is_enabled() {
            return Err(DatasourceError::ServiceDisabled);
        }
        prober::probe(&self.inner).await
    }

    /// Replaces the current handle with a freshly verified one and publishes
    /// the outcome. On failure the existing handle is kept.
    pub async fn reconnect(&self) -> Result<(), DatasourceError> {
        if !self.inner.settings.is_enabled() {
            return Err(DatasourceError::ServiceDisabled);
        }
        let mut builder = ReportBuilder::start();
        builder.debug("address", self.inner.settings.redacted_url());

        let outcome = reconnector::reconnect(&self.inner).await;
        let report = match &outcome {
            Ok(()) => {
                info!("Manual reconnect to {} succeeded.", self.inner.settings.redacted_url());
                self.add_stats(&mut builder);
                builder.succeed(StatusKind::Reconnected, "connection was re-established")
            }
            Err(e) => {
                warn!("Manual reconnect failed: {}", e);
                builder.debug("reconnect_error", e.to_string());
                builder
                    .attempt(1)
                    .fail(e.status_kind(), "manual reconnect failed", e)
            }
        };
        if let Some(report) = self.publish_live(report) {
            dispatcher::dispatch(self, &report);
        }
        outcome
    }

    /// Signals the supervisor to stop, interrupting a tick in flight. The
    /// current handle stays installed and usable.
    pub fn stop(&self) {
        if self.is_supervised() && self.inner.shutdown_tx.send(()).is_ok() {
            info!("Stop requested for the supervisor of {}.", self.inner.settings.redacted_url());
        }
    }

    /// Stops the supervisor, removes and closes the handle, and publishes a
    /// `Closed` report. Later reconnects are refused.
    pub async fn close(&self) {
        self.stop();
        let retired = {
            let mut state = self.inner.state.write();
            if state.closed {
                return;
            }
            state.closed = true;
            state.handle.take()
        };

        let builder = ReportBuilder::start();
        let report = self.publish(builder.fail(
            StatusKind::Closed,
            "datasource was closed",
            &DatasourceError::ConnectionUnavailable,
        ));
        dispatcher::dispatch(self, &report);

        if let Some(handle) = retired {
            handle.close().await;
        }
        info!("Datasource {} closed.", self.inner.settings.redacted_url());
    }

    /// Lists keys matching `pattern` along with their types. `count` is the
    /// per-iteration `SCAN` hint.
    pub async fn scan_keys(
        &self,
        pattern: &str,
        count: usize,
    ) -> Result<Vec<KeyEntry>, DatasourceError> {
        if !self.inner.settings.is_enabled() {
            return Err(DatasourceError::ServiceDisabled);
        }
        let handle = self.conn().ok_or(DatasourceError::ConnectionUnavailable)?;
        scan::scan_keys(handle, pattern, count).await
    }

    pub(crate) fn publish(&self, report: StatusReport) -> StatusReport {
        self.inner.state.write().publish(report)
    }

    /// Publishes `report` unless the datasource was closed while it was being produced.
    pub(crate) fn publish_live(&self, report: StatusReport) -> Option<StatusReport> {
        let mut state = self.inner.state.write();
        if state.closed {
            return None;
        }
        Some(state.publish(report))
    }

    /// Adds the current handle's statistics to `builder` when debugging is on.
    pub(crate) fn add_stats(&self, builder: &mut ReportBuilder) {
        if !self.inner.settings.is_debugging() {
            return;
        }
        if let Some(handle) = self.conn() {
            for (key, value) in handle.stats() {
                builder.debug(key, value);
            }
        }
    }
}
