// ABOUTME: Outbound worker - drains queued replies and hands them to the space.
// ABOUTME: Transport failures are logged and never stop the loop.

use crate::channels::{Outbound, OutboundReceiver, Reply};
use crate::context::Context;
use crate::space::Space;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Speaker {
    context: Context,
    space: Arc<dyn Space>,
    poll_interval: Duration,
}

impl Speaker {
    pub fn new(context: Context, space: Arc<dyn Space>, poll_interval: Duration) -> Self {
        Self {
            context,
            space,
            poll_interval,
        }
    }

    fn is_running(&self) -> bool {
        self.context.get_str("general.switch").as_deref() == Some("on")
    }

    /// Deliver replies in FIFO order until a sentinel, cancellation, or switch-off
    pub async fn run(&self, mut mouth: OutboundReceiver, cancel: CancellationToken) {
        tracing::info!(space = %self.space.name(), "Speaker started");

        while self.is_running() {
            let item = tokio::select! {
                _ = cancel.cancelled() => break,
                item = mouth.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
                _ = tokio::time::sleep(self.poll_interval) => continue,
            };

            match item {
                Outbound::Sentinel => break,
                Outbound::Reply(reply) => {
                    if let Err(e) = self.process(&reply).await {
                        crate::metrics::speaker_error();
                        tracing::error!(error = %e, "Failed to send reply");
                    }
                }
            }
        }

        tracing::info!("Speaker stopped");
    }

    /// Send one reply; only a successful send is counted
    pub async fn process(&self, reply: &Reply) -> anyhow::Result<()> {
        self.space.send(reply).await?;
        self.context.increment("speaker.counter", 1)?;
        crate::metrics::speaker_item();
        Ok(())
    }
}
