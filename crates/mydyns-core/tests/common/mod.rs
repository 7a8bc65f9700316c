//! Test doubles and common utilities for contract tests
//!
//! Provides a dispatcher that records every batch instead of running
//! nsupdate, and credential databases written to a temporary directory.

#![allow(dead_code)]

use mydyns_core::config::{CredentialPaths, WorkerConfig};
use mydyns_core::credentials::sha_entry;
use mydyns_core::error::{Error, Result};
use mydyns_core::traits::{UpdateBatch, UpdateDispatcher};
use mydyns_core::worker::{UpdateQueue, UpdateWorker, WorkerEvent};
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A dispatcher that records batches and can be told to fail
#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    /// Call counter for dispatch(), failures included
    dispatch_call_count: Arc<AtomicUsize>,
    /// Batches that were dispatched successfully
    batches: Arc<Mutex<Vec<UpdateBatch>>>,
    /// When set, dispatch() fails without recording
    failing: Arc<AtomicBool>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of times dispatch() was called
    pub fn dispatch_call_count(&self) -> usize {
        self.dispatch_call_count.load(Ordering::SeqCst)
    }

    /// Get the successfully dispatched batches
    pub fn batches(&self) -> Vec<UpdateBatch> {
        self.batches.lock().unwrap().clone()
    }

    /// Make subsequent dispatches fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl UpdateDispatcher for RecordingDispatcher {
    async fn dispatch(&self, batch: &UpdateBatch) -> Result<()> {
        self.dispatch_call_count.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::dispatch("simulated nsupdate failure"));
        }
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }

    fn dispatcher_name(&self) -> &'static str {
        "recording"
    }
}

/// A worker running on its own task
pub struct RunningWorker {
    pub queue: UpdateQueue,
    pub events: mpsc::Receiver<WorkerEvent>,
    pub shutdown: Option<oneshot::Sender<()>>,
    pub handle: JoinHandle<Result<()>>,
}

impl RunningWorker {
    /// Wait for the next flush outcome, skipping other events
    pub async fn next_flush(&mut self) -> WorkerEvent {
        loop {
            match self.events.recv().await {
                Some(event @ WorkerEvent::Flushed { .. })
                | Some(event @ WorkerEvent::FlushFailed { .. }) => return event,
                Some(_) => continue,
                None => panic!("worker event channel closed"),
            }
        }
    }

    /// Signal shutdown and wait for the worker to exit
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.expect("worker task panicked")
    }
}

/// Spawn a worker with default timing around the given dispatcher
pub fn spawn_worker(dispatcher: RecordingDispatcher, queue_capacity: usize) -> RunningWorker {
    let config = WorkerConfig {
        queue_capacity,
        ..WorkerConfig::default()
    };
    let (worker, queue, events) =
        UpdateWorker::new(Box::new(dispatcher), &config).expect("worker construction succeeds");
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(worker.run_with_shutdown(shutdown_rx));

    RunningWorker {
        queue,
        events,
        shutdown: Some(shutdown_tx),
        handle,
    }
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// Credential databases in a temporary directory
pub struct CredentialFixture {
    dir: tempfile::TempDir,
    pub paths: CredentialPaths,
}

impl CredentialFixture {
    /// alice/wonderland owns `example`; bob/builder owns `garage`
    pub fn new(security: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = CredentialPaths {
            users: dir.path().join("users"),
            hosts: dir.path().join("hosts"),
            security: dir.path().join("security"),
        };

        write(
            &paths.users,
            &format!(
                "# htpasswd -s\nalice:{}\nbob:{}\n",
                sha_entry("wonderland"),
                sha_entry("builder")
            ),
        );
        write(&paths.hosts, "example:alice\ngarage:bob\n");
        write(&paths.security, security);

        Self { dir, paths }
    }

    /// Replace the security database contents
    pub fn set_security(&self, contents: &str) {
        write(&self.paths.security, contents);
    }

    /// Replace the hosts database contents
    pub fn set_hosts(&self, contents: &str) {
        write(&self.paths.hosts, contents);
    }
}

fn write(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
}
