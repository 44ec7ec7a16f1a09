// src/core/datasource/state.rs

use super::Datasource;
use super::report::StatusReport;
use crate::core::client::Handle;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Invoked with every published report.
pub type StatusCallback = Arc<dyn Fn(StatusReport) + Send + Sync>;

/// Invoked with every published report and a handle back to the datasource.
pub type ReplicaCallback = Arc<dyn Fn(StatusReport, Datasource) + Send + Sync>;

/// A registered callback and whether a call to it is still running. A slot
/// runs at most one call at a time; reports published meanwhile skip it.
#[derive(Clone)]
pub(crate) struct Slot<C> {
    pub(crate) callback: C,
    pub(crate) busy: Arc<AtomicBool>,
}

impl<C> Slot<C> {
    pub(crate) fn new(callback: C) -> Self {
        Self {
            callback,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Everything guarded by the datasource's single lock.
pub(crate) struct ConnectionState {
    pub(crate) handle: Option<Handle>,
    pub(crate) report: StatusReport,
    pub(crate) on_status: Option<Slot<StatusCallback>>,
    pub(crate) on_replica_status: Option<Slot<ReplicaCallback>>,
    pub(crate) on_notify: Option<Slot<StatusCallback>>,
    /// Set by `close`; no handle may be installed afterwards.
    pub(crate) closed: bool,
    next_tick: u64,
}

/// The callbacks registered at the moment of a dispatch.
pub(crate) struct Observers {
    pub(crate) on_status: Option<Slot<StatusCallback>>,
    pub(crate) on_replica_status: Option<Slot<ReplicaCallback>>,
    pub(crate) on_notify: Option<Slot<StatusCallback>>,
}

impl ConnectionState {
    pub(crate) fn new(handle: Option<Handle>, report: StatusReport) -> Self {
        Self {
            handle,
            report: report.with_tick(0),
            on_status: None,
            on_replica_status: None,
            on_notify: None,
            closed: false,
            next_tick: 1,
        }
    }

    /// Replaces the current report, stamping it with the next sequence number.
    pub(crate) fn publish(&mut self, report: StatusReport) -> StatusReport {
        let report = report.with_tick(self.next_tick);
        self.next_tick += 1;
        self.report = report.clone();
        report
    }

    pub(crate) fn observers(&self) -> Observers {
        Observers {
            on_status: self.on_status.clone(),
            on_replica_status: self.on_replica_status.clone(),
            on_notify: self.on_notify.clone(),
        }
    }
}
