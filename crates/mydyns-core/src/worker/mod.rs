//! Update batching worker
//!
//! A single long-lived task owns the work-set of pending hostname → IP
//! changes. Request handlers hand entries over through a bounded queue and
//! never wait on the worker.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   try_send    ┌──────────────┐   tick    ┌──────────────────┐
//! │ UpdateQueue  │──────────────▶│ UpdateWorker │──────────▶│ UpdateDispatcher │
//! │ (handlers)   │  QueueFull →  │  (work-set)  │  batch    │   (nsupdate)     │
//! └──────────────┘  Backpressure └──────────────┘           └──────────────────┘
//!                                       │
//!                                       ▼
//!                                ┌─────────────┐
//!                                │   Events    │
//!                                └─────────────┘
//! ```
//!
//! ## Flush Cycle
//!
//! 1. Wait for the next tick (or shutdown)
//! 2. Drain the queue without blocking, merging by hostname (last write wins)
//! 3. If the work-set is non-empty, dispatch it
//! 4. Clear the work-set on success; keep it on failure so the next tick
//!    retries the accumulated state

use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::traits::{UpdateBatch, UpdateDispatcher};
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// A hostname → IP change waiting for the next flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    /// Hostname label inside the zone
    pub hostname: String,
    /// Address to publish
    pub ip: IpAddr,
}

impl PendingUpdate {
    pub fn new(hostname: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            hostname: hostname.into(),
            ip,
        }
    }
}

/// Events emitted by the UpdateWorker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Worker started
    Started {
        flush_interval_secs: u64,
    },

    /// A batch was dispatched and the work-set cleared
    Flushed {
        records: usize,
    },

    /// Dispatch failed; the work-set is kept for the next tick
    FlushFailed {
        error: String,
        pending: usize,
    },

    /// Worker stopped
    Stopped {
        reason: String,
    },
}

/// Cloneable handle for enqueuing updates
#[derive(Debug, Clone)]
pub struct UpdateQueue {
    tx: mpsc::Sender<PendingUpdate>,
}

impl UpdateQueue {
    /// Enqueue an update without blocking
    ///
    /// Fails with [`Error::Backpressure`] when the queue is saturated.
    pub fn update(&self, entry: PendingUpdate) -> Result<()> {
        match self.tx.try_send(entry) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(entry)) => {
                warn!("Update queue full, rejecting update for {}", entry.hostname);
                Err(Error::backpressure("queue full"))
            }
            Err(TrySendError::Closed(_)) => Err(Error::Other("update worker stopped".to_string())),
        }
    }

    /// Maximum number of queued entries
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Batching worker
///
/// ## Lifecycle
///
/// 1. Create with [`UpdateWorker::new()`], keeping the returned [`UpdateQueue`]
/// 2. Spawn [`UpdateWorker::run_with_shutdown()`] on its own task
/// 3. Send on (or drop) the shutdown sender to stop it
///
/// Entries still queued or pending at shutdown are discarded. Clients resend
/// on their own schedule, so nothing is persisted.
pub struct UpdateWorker {
    dispatcher: Box<dyn UpdateDispatcher>,
    queue_rx: mpsc::Receiver<PendingUpdate>,
    flush_interval: Duration,
    pending: UpdateBatch,
    event_tx: mpsc::Sender<WorkerEvent>,
}

impl UpdateWorker {
    /// Create a new worker
    ///
    /// # Returns
    ///
    /// A tuple of (worker, queue handle, event receiver)
    pub fn new(
        dispatcher: Box<dyn UpdateDispatcher>,
        config: &WorkerConfig,
    ) -> Result<(Self, UpdateQueue, mpsc::Receiver<WorkerEvent>)> {
        config.validate()?;

        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);

        let worker = Self {
            dispatcher,
            queue_rx,
            flush_interval: Duration::from_secs(config.flush_interval_secs),
            pending: UpdateBatch::new(),
            event_tx,
        };

        Ok((worker, UpdateQueue { tx: queue_tx }, event_rx))
    }

    /// Run until the shutdown signal fires or its sender is dropped
    pub async fn run_with_shutdown(mut self, mut shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        self.emit_event(WorkerEvent::Started {
            flush_interval_secs: self.flush_interval.as_secs(),
        });
        info!(
            "Update worker started (dispatcher: {}, interval: {:?})",
            self.dispatcher.dispatcher_name(),
            self.flush_interval
        );

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                biased;

                signal = &mut shutdown_rx => {
                    break match signal {
                        Ok(()) => "Shutdown signal",
                        Err(_) => "Shutdown handle dropped",
                    };
                }

                _ = ticker.tick() => {
                    self.flush().await;
                }
            }
        };

        if !self.pending.is_empty() {
            warn!(
                "Discarding {} undispatched updates on shutdown",
                self.pending.len()
            );
        }
        info!("Update worker stopped: {}", reason);
        self.emit_event(WorkerEvent::Stopped {
            reason: reason.to_string(),
        });

        Ok(())
    }

    /// Move everything currently queued into the work-set
    fn drain(&mut self) -> usize {
        let mut drained = 0;
        loop {
            match self.queue_rx.try_recv() {
                Ok(entry) => {
                    debug!("Queued {} -> {}", entry.hostname, entry.ip);
                    self.pending.insert(entry.hostname, entry.ip);
                    drained += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        drained
    }

    async fn flush(&mut self) {
        let drained = self.drain();
        if self.pending.is_empty() {
            return;
        }

        debug!(
            "Flushing {} records ({} newly drained)",
            self.pending.len(),
            drained
        );
        match self.dispatcher.dispatch(&self.pending).await {
            Ok(()) => {
                let records = self.pending.len();
                self.pending.clear();
                self.emit_event(WorkerEvent::Flushed { records });
            }
            Err(e) => {
                error!(
                    "Dispatch via {} failed, keeping {} pending updates: {}",
                    self.dispatcher.dispatcher_name(),
                    self.pending.len(),
                    e
                );
                self.emit_event(WorkerEvent::FlushFailed {
                    error: e.to_string(),
                    pending: self.pending.len(),
                });
            }
        }
    }

    fn emit_event(&self, event: WorkerEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Worker event channel full, dropping event");
        }
    }
}
