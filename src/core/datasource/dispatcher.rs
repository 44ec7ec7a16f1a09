// src/core/datasource/dispatcher.rs

//! Fans a published report out to the registered callbacks.
//!
//! Each callback runs on the blocking pool so a slow observer cannot stall the
//! runtime or the supervisor. A small async task awaits each one and logs a
//! panic instead of letting it escape. A slot never has more than one call in
//! flight, so a callback that never returns holds one blocking thread at most.

use super::Datasource;
use super::report::StatusReport;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

pub(crate) fn dispatch(datasource: &Datasource, report: &StatusReport) {
    let observers = datasource.inner.state.read().observers();

    if let Some(slot) = observers.on_status {
        let report = report.clone();
        let callback = slot.callback;
        run_supervised("on_status", slot.busy, move || callback(report));
    }
    if let Some(slot) = observers.on_replica_status {
        let report = report.clone();
        let datasource = datasource.clone();
        let callback = slot.callback;
        run_supervised("on_replica_status", slot.busy, move || {
            callback(report, datasource)
        });
    }
    if let Some(slot) = observers.on_notify {
        let report = report.clone();
        let callback = slot.callback;
        run_supervised("on_notify", slot.busy, move || callback(report));
    }
}

fn run_supervised<F>(name: &'static str, busy: Arc<AtomicBool>, callback: F)
where
    F: FnOnce() + Send + 'static,
{
    if busy
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        debug!(
            "Status callback '{}' is still running; skipping this report.",
            name
        );
        return;
    }

    let task = tokio::task::spawn_blocking(callback);
    tokio::spawn(async move {
        let outcome = task.await;
        busy.store(false, Ordering::Release);
        if let Err(e) = outcome {
            if e.is_panic() {
                error!(
                    "Status callback '{}' panicked: {}",
                    name,
                    panic_message(e.into_panic().as_ref())
                );
            } else {
                error!("Status callback '{}' was cancelled.", name);
            }
        }
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
