use crate::broker::BrokerGateway;
use crate::ledger::{LedgerStatus, PassSummary, TradeLedger};
use crate::model::{ClosureEvent, OpenPosition};
use crate::notify::ClosureSink;
use crate::reconciler::{ReconcileError, Reconciler};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub type SharedStatus = Arc<RwLock<LedgerStatus>>;
pub type PassResult = Result<Vec<ClosureEvent>, ReconcileError>;

/// Upper bound for both the polling interval and the backoff ceiling.
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
pub enum LoopCommand {
    RecordOpen(OpenPosition),
    Pause,
    Resume,
    ReconcileNow(oneshot::Sender<PassResult>),
    Shutdown,
}

#[derive(Error, Debug)]
#[error("Reconcile loop is not running")]
pub struct LoopClosed;

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub interval: Duration,
    pub max_backoff: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_backoff: Duration::from_secs(300),
        }
    }
}

/// Cloneable front for a running [`ReconcileLoop`].
#[derive(Clone)]
pub struct LoopHandle {
    commands: mpsc::UnboundedSender<LoopCommand>,
    status: SharedStatus,
}

impl LoopHandle {
    fn send(&self, cmd: LoopCommand) -> Result<(), LoopClosed> {
        self.commands.send(cmd).map_err(|_| LoopClosed)
    }

    pub fn record_open(&self, position: OpenPosition) -> Result<(), LoopClosed> {
        self.send(LoopCommand::RecordOpen(position))
    }

    pub fn pause(&self) -> Result<(), LoopClosed> {
        self.send(LoopCommand::Pause)
    }

    pub fn resume(&self) -> Result<(), LoopClosed> {
        self.send(LoopCommand::Resume)
    }

    pub fn shutdown(&self) -> Result<(), LoopClosed> {
        self.send(LoopCommand::Shutdown)
    }

    /// Run a pass as soon as the loop is free and wait for its outcome.
    /// Commands sent earlier through this handle are applied first.
    pub async fn reconcile_now(&self) -> Result<PassResult, LoopClosed> {
        let (tx, rx) = oneshot::channel();
        self.send(LoopCommand::ReconcileNow(tx))?;
        rx.await.map_err(|_| LoopClosed)
    }

    /// Latest published snapshot.
    pub fn status(&self) -> LedgerStatus {
        self.status.read().clone()
    }
}

/// Polling loop around the reconciler.
///
/// Owns the ledger outright, so passes are single-flight by construction and
/// readers only ever see published snapshots.
pub struct ReconcileLoop<S: ClosureSink> {
    reconciler: Reconciler,
    gateway: Arc<dyn BrokerGateway>,
    ledger: TradeLedger,
    sink: S,
    commands: mpsc::UnboundedReceiver<LoopCommand>,
    status: SharedStatus,
    settings: LoopSettings,
    paused: bool,
    current_delay: Duration,
    last_pass: Option<PassSummary>,
}

impl<S: ClosureSink> ReconcileLoop<S> {
    pub fn new(
        reconciler: Reconciler,
        gateway: Arc<dyn BrokerGateway>,
        ledger: TradeLedger,
        sink: S,
        settings: LoopSettings,
    ) -> (Self, LoopHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let status = Arc::new(RwLock::new(
            ledger.status(false, reconciler.now()),
        ));
        let handle = LoopHandle {
            commands: tx,
            status: status.clone(),
        };

        let settings = LoopSettings {
            interval: settings.interval.clamp(Duration::from_millis(1), MAX_DELAY),
            max_backoff: settings.max_backoff.min(MAX_DELAY),
        };
        let current_delay = settings.interval;
        let this = Self {
            reconciler,
            gateway,
            ledger,
            sink,
            commands: rx,
            status,
            settings,
            paused: false,
            current_delay,
            last_pass: None,
        };
        (this, handle)
    }

    /// Drive the loop until shutdown or until every handle is dropped.
    /// Returns the ledger so callers can inspect final state.
    pub async fn run(mut self) -> TradeLedger {
        info!(
            gateway = self.gateway.name(),
            interval_secs = self.settings.interval.as_secs(),
            "🚀 Reconcile loop started"
        );

        let mut next_pass = Instant::now() + self.current_delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next_pass) => {
                    if self.paused {
                        debug!("Loop paused - scheduled pass skipped");
                    } else {
                        let _ = self.pass().await;
                    }
                    next_pass = Instant::now() + self.current_delay;
                }
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(LoopCommand::RecordOpen(position)) => {
                            self.ledger.record_open(position);
                            self.publish();
                        }
                        Some(LoopCommand::Pause) => {
                            if !self.paused {
                                self.paused = true;
                                info!("Reconcile loop paused");
                                self.publish();
                            }
                        }
                        Some(LoopCommand::Resume) => {
                            if self.paused {
                                self.paused = false;
                                info!("Reconcile loop resumed");
                                self.publish();
                            }
                        }
                        Some(LoopCommand::ReconcileNow(reply)) => {
                            let result = self.pass().await;
                            next_pass = Instant::now() + self.current_delay;
                            if reply.send(result).is_err() {
                                debug!("Reconcile requester went away before the result");
                            }
                        }
                        Some(LoopCommand::Shutdown) | None => break,
                    }
                }
            }
        }

        info!(
            tracked = self.ledger.tracker().len(),
            "Reconcile loop stopped"
        );
        self.ledger
    }

    async fn pass(&mut self) -> PassResult {
        let result = self
            .reconciler
            .run_pass(&mut self.ledger, self.gateway.as_ref(), &mut self.sink)
            .await;

        match &result {
            Ok(_) => {
                self.current_delay = self.settings.interval;
            }
            Err(e) => {
                self.current_delay = self
                    .current_delay
                    .saturating_mul(2)
                    .min(self.settings.max_backoff.max(self.settings.interval));
                warn!(
                    error = %e,
                    next_pass_secs = self.current_delay.as_secs(),
                    "Broker unreachable - backing off"
                );
            }
        }

        self.last_pass = Some(PassSummary {
            finished_at: self.reconciler.now(),
            closures: result.as_ref().map(|events| events.len()).unwrap_or(0),
            error: result.as_ref().err().map(|e| e.to_string()),
        });
        self.publish();
        result
    }

    fn publish(&self) {
        let mut snapshot = self.ledger.status(self.paused, self.reconciler.now());
        snapshot.last_pass = self.last_pass.clone();
        *self.status.write() = snapshot;
    }
}
