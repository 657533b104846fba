// ABOUTME: Worker pool executing queued, non-interactive commands.
// ABOUTME: Workers share one work channel and flag the store while busy.

use crate::channels::{Work, WorkReceiver};
use crate::engine::Engine;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Work channel receiver shared by every worker of the pool
pub type SharedWork = Arc<Mutex<WorkReceiver>>;

pub struct Worker {
    engine: Arc<Engine>,
    index: usize,
}

impl Worker {
    pub fn new(engine: Arc<Engine>, index: usize) -> Self {
        Self { engine, index }
    }

    /// Take work items until this worker gets its sentinel or is cancelled
    pub async fn run(&self, work: SharedWork, cancel: CancellationToken) {
        let poll = self.engine.config().poll_interval;
        tracing::info!(worker = self.index, "Worker started");

        while self.engine.is_running() {
            let item = {
                let mut receiver = tokio::select! {
                    _ = cancel.cancelled() => break,
                    receiver = work.lock() => receiver,
                };
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = receiver.recv() => match item {
                        Some(item) => item,
                        None => break,
                    },
                    _ = tokio::time::sleep(poll) => continue,
                }
            };

            match item {
                Work::Sentinel => break,
                Work::Task {
                    room_id,
                    verb,
                    arguments,
                } => {
                    if let Err(e) = self.process(&room_id, &verb, &arguments).await {
                        tracing::error!(worker = self.index, verb = %verb, error = %e, "Queued command failed");
                    }
                }
            }
        }

        tracing::info!(worker = self.index, "Worker stopped");
    }

    /// Execute one queued command on behalf of the bot of `room_id`
    pub async fn process(&self, room_id: &str, verb: &str, arguments: &str) -> Result<()> {
        let context = self.engine.context();
        context.track("worker.active", 1, "worker.busy")?;
        tracing::debug!(worker = self.index, room_id = %room_id, verb = %verb, "Executing queued command");

        let outcome = match self.engine.get_bot(room_id).await {
            Ok(bot) => self.engine.shell().execute(&bot, verb, arguments).await,
            Err(e) => Err(e),
        };

        context.track("worker.active", -1, "worker.busy")?;
        context.increment("worker.counter", 1)?;
        crate::metrics::work_item();

        outcome
    }
}
