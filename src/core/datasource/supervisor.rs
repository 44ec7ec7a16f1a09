// src/core/datasource/supervisor.rs

//! The background health loop: probe, reconnect on failure, publish one report
//! per tick, dispatch it.

use super::report::{ReportBuilder, StatusKind, StatusReport};
use super::{Datasource, dispatcher, prober, reconnector};
use std::sync::atomic::Ordering;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Where the supervisor believes the connection stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Healthy,
    /// `attempt` consecutive reconnects have failed.
    Degraded { attempt: u32 },
}

struct Supervisor {
    datasource: Datasource,
    phase: Phase,
}

/// Starts the supervisor for `datasource` on the current runtime.
pub(crate) fn spawn(datasource: Datasource) {
    // Subscribe before spawning so a `stop()` issued right away is not missed.
    let shutdown_rx = datasource.inner.shutdown_tx.subscribe();
    datasource.inner.supervised.store(true, Ordering::Release);
    let supervisor = Supervisor {
        datasource,
        phase: Phase::Healthy,
    };
    tokio::spawn(supervisor.run(shutdown_rx));
}

impl Supervisor {
    async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        let interval = self.datasource.settings().ping_interval();
        let identity = self.datasource.settings().redacted_url();
        info!(
            "Supervisor for {} started with ping interval {:?}.",
            identity, interval
        );

        // The first probe happens one interval after `open`, which already verified the handle.
        let mut timer = time::interval_at(Instant::now() + interval, interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = timer.tick() => {}
            }
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Supervisor for {} interrupted mid-tick.", identity);
                    break;
                }
                _ = self.tick() => {}
            }
        }

        self.datasource
            .inner
            .supervised
            .store(false, Ordering::Release);
        info!("Supervisor for {} stopped.", identity);
    }

    /// Runs one probe/reconnect cycle and publishes exactly one report.
    async fn tick(&mut self) {
        let inner = &self.datasource.inner;
        let mut builder = ReportBuilder::start();
        builder.debug("address", inner.settings.redacted_url());

        let report = match prober::probe(inner).await {
            Ok(()) => {
                self.phase = Phase::Healthy;
                self.datasource.add_stats(&mut builder);
                builder.succeed(StatusKind::Connected, "connection is healthy")
            }
            Err(probe_err) => {
                warn!("Health probe failed: {}", probe_err);
                builder.debug("probe_error", probe_err.to_string());
                match reconnector::reconnect(inner).await {
                    Ok(()) => {
                        self.phase = Phase::Healthy;
                        self.datasource.add_stats(&mut builder);
                        builder.succeed(StatusKind::Reconnected, "connection was re-established")
                    }
                    Err(reconnect_err) => {
                        builder.debug("reconnect_error", reconnect_err.to_string());
                        let (kind, attempt) = match self.phase {
                            Phase::Healthy => (StatusKind::Unreachable, 1),
                            Phase::Degraded { attempt } => {
                                (StatusKind::ReconnectFailed, attempt.saturating_add(1))
                            }
                        };
                        self.phase = Phase::Degraded { attempt };
                        builder.attempt(attempt).fail(
                            kind,
                            "data store is unreachable and reconnect failed",
                            &reconnect_err,
                        )
                    }
                }
            }
        };

        let Some(report) = self.datasource.publish_live(report) else {
            return;
        };
        log_report(&report);
        dispatcher::dispatch(&self.datasource, &report);
    }
}

fn log_report(report: &StatusReport) {
    match report.kind() {
        StatusKind::Connected => debug!(tick = report.tick(), "{}", report),
        StatusKind::Reconnected => info!(tick = report.tick(), "{}", report),
        _ => warn!(
            tick = report.tick(),
            attempt = report.attempt(),
            "{}",
            report
        ),
    }
    if !report.debug().is_empty() {
        debug!(tick = report.tick(), "Report details: {:?}", report.debug());
    }
}
