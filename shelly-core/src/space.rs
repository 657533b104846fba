// ABOUTME: Space trait that chat transports implement, plus an in-process LocalSpace.
// ABOUTME: LocalSpace records everything sent to it and serves queued inbound items.

use crate::channels::{Inbound, Reply};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Transport adapter to a chat platform.
///
/// `receive` returns `Ok(None)` once the space has nothing more to deliver.
#[async_trait]
pub trait Space: Send + Sync {
    /// Short platform identifier (e.g. "local", "console")
    fn name(&self) -> &str;

    async fn send(&self, reply: &Reply) -> anyhow::Result<()>;

    async fn receive(&self) -> anyhow::Result<Option<Inbound>>;

    /// Register a webhook so the platform pushes events to `url`
    async fn register(&self, url: &str) -> anyhow::Result<()>;

    async fn add_participants(&self, room_id: &str, participants: &[String])
        -> anyhow::Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Space living entirely in memory
#[derive(Debug, Default)]
pub struct LocalSpace {
    inbound: Mutex<VecDeque<Inbound>>,
    sent: Mutex<Vec<Reply>>,
    webhooks: Mutex<Vec<String>>,
    participants: Mutex<Vec<(String, Vec<String>)>>,
    failing: AtomicBool,
}

impl LocalSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw item for `receive`
    pub fn push(&self, item: impl Into<Inbound>) {
        lock(&self.inbound).push_back(item.into());
    }

    /// Queue a message payload for `receive`
    pub fn push_message(&self, room_id: &str, text: &str) {
        self.push(Inbound::Payload(serde_json::json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "room_id": room_id,
            "text": text,
        })));
    }

    pub fn push_payload(&self, payload: Value) {
        self.push(Inbound::Payload(payload));
    }

    /// Make every following `send` fail
    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Reply> {
        lock(&self.sent).clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        lock(&self.sent).iter().map(|r| r.text.clone()).collect()
    }

    pub fn webhooks(&self) -> Vec<String> {
        lock(&self.webhooks).clone()
    }

    pub fn participants(&self) -> Vec<(String, Vec<String>)> {
        lock(&self.participants).clone()
    }

    /// Wait until at least `count` replies were sent, or `limit` elapses
    pub async fn wait_for_sent(&self, count: usize, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            if lock(&self.sent).len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Space for LocalSpace {
    fn name(&self) -> &str {
        "local"
    }

    async fn send(&self, reply: &Reply) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("local space is refusing to send");
        }
        tracing::debug!(text = %reply.text, "Local space received reply");
        lock(&self.sent).push(reply.clone());
        Ok(())
    }

    async fn receive(&self) -> anyhow::Result<Option<Inbound>> {
        Ok(lock(&self.inbound).pop_front())
    }

    async fn register(&self, url: &str) -> anyhow::Result<()> {
        lock(&self.webhooks).push(url.to_string());
        Ok(())
    }

    async fn add_participants(
        &self,
        room_id: &str,
        participants: &[String],
    ) -> anyhow::Result<()> {
        lock(&self.participants).push((room_id.to_string(), participants.to_vec()));
        Ok(())
    }
}
