//! Connectivity monitor for the LangFlow backend.
//!
//! **Design**:
//! - `HealthMonitor` owns the process-scoped connectivity state and publishes
//!   every change on a `watch` channel (`subscribe()`)
//! - `start()` spawns a periodic task: one probe immediately, then one per interval
//! - `MonitorHandle` cancels the task (`shutdown()`, or drop)
//! - At most one probe is in flight. `check_now()` while a probe runs is a no-op

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::gateway::StatusProbe;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Reachability of the diagnosis backend, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    /// Initial state, and the state while a probe is in flight.
    Checking,
    Connected,
    Disconnected,
}

impl ConnectivityState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Checking => "Checking...",
            Self::Connected => "LangFlow Connected",
            Self::Disconnected => "LangFlow Offline",
        }
    }

    /// Remediation shown next to the offline badge.
    pub fn offline_hint(self) -> Option<&'static str> {
        match self {
            Self::Disconnected => Some("Cannot reach LangFlow. Is it running? Start it with: langflow run --port 7860"),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ═══════════════════════════════════════════════════════════
// HealthMonitor
// ═══════════════════════════════════════════════════════════

struct MonitorInner {
    probe: Arc<dyn StatusProbe>,
    state: watch::Sender<ConnectivityState>,
    /// Held for the duration of a probe.
    in_flight: tokio::sync::Mutex<()>,
    /// When the last probe finished (ISO 8601).
    last_checked_at: Mutex<Option<String>>,
}

/// Cloneable handle on the shared connectivity state.
#[derive(Clone)]
pub struct HealthMonitor {
    inner: Arc<MonitorInner>,
}

impl HealthMonitor {
    /// Create a monitor in the `Checking` state. No probe runs until
    /// `start()` or `check_now()`.
    pub fn new(probe: Arc<dyn StatusProbe>) -> Self {
        let (state, _) = watch::channel(ConnectivityState::Checking);
        Self {
            inner: Arc::new(MonitorInner {
                probe,
                state,
                in_flight: tokio::sync::Mutex::new(()),
                last_checked_at: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.inner.state.borrow()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.inner.state.subscribe()
    }

    /// Is a probe running right now?
    pub fn is_checking(&self) -> bool {
        self.inner.in_flight.try_lock().is_err()
    }

    pub fn last_checked_at(&self) -> Option<String> {
        self.inner.last_checked_at.lock().ok()?.clone()
    }

    /// Probe once and publish the outcome.
    ///
    /// Returns `None` without probing if another probe is already in flight.
    pub async fn check_now(&self) -> Option<ConnectivityState> {
        let Ok(_guard) = self.inner.in_flight.try_lock() else {
            tracing::debug!("Health probe already in flight, skipping");
            return None;
        };

        let previous = self.inner.state.send_replace(ConnectivityState::Checking);
        let mut restore = RestoreOnDrop {
            state: &self.inner.state,
            previous: Some(previous),
        };

        let next = match self.inner.probe.probe().await {
            Ok(()) => ConnectivityState::Connected,
            Err(e) => {
                tracing::debug!(error = %e, "Health probe failed");
                ConnectivityState::Disconnected
            }
        };

        restore.previous = None;
        self.settle(previous, next);
        if let Ok(mut last) = self.inner.last_checked_at.lock() {
            *last = Some(chrono::Utc::now().to_rfc3339());
        }

        Some(next)
    }

    /// Publish a probe outcome. Returns whether it differs from the state
    /// held before the probe started.
    fn settle(&self, previous: ConnectivityState, next: ConnectivityState) -> bool {
        self.inner.state.send_replace(next);
        let changed = previous != next;
        if changed {
            tracing::info!(from = ?previous, state = ?next, "Connectivity changed");
        }
        changed
    }

    /// Spawn the periodic probe task on the current tokio runtime.
    ///
    /// The first probe runs immediately. A tick that lands while a manual
    /// check is in flight is skipped.
    pub fn start(&self, interval: Duration) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let monitor = self.clone();

        let task = tokio::spawn(async move {
            tracing::info!(interval_ms = interval.as_millis() as u64, "Health monitor started");

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = async {
                        ticker.tick().await;
                        monitor.check_now().await
                    } => {}
                }
            }

            tracing::info!("Health monitor stopped");
        });

        MonitorHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Puts the pre-probe state back when a probe is abandoned mid-flight.
struct RestoreOnDrop<'a> {
    state: &'a watch::Sender<ConnectivityState>,
    previous: Option<ConnectivityState>,
}

impl Drop for RestoreOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.state.send_replace(previous);
        }
    }
}

// ═══════════════════════════════════════════════════════════
// MonitorHandle
// ═══════════════════════════════════════════════════════════

/// Owns the periodic probe task. Dropping the handle stops the task.
pub struct MonitorHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Stop scheduling probes. A probe in flight is abandoned and the state it
    /// replaced is restored.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Shut down and wait for the task to exit.
    pub async fn stopped(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
