// ABOUTME: sleep - a queued command that waits, used to exercise the worker pool.

use super::{Command, CommandContext};
use async_trait::async_trait;
use std::time::Duration;

pub struct Sleep;

#[async_trait]
impl Command for Sleep {
    fn keyword(&self) -> &str {
        "sleep"
    }

    fn information_message(&self) -> &str {
        "Sleep for a while."
    }

    fn usage_message(&self) -> Option<&str> {
        Some("sleep <n>")
    }

    fn is_interactive(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &CommandContext<'_>, arguments: &str) -> anyhow::Result<()> {
        let seconds: f64 = match arguments.trim() {
            "" => 1.0,
            text => text
                .parse()
                .map_err(|_| anyhow::anyhow!("'{text}' is not a number of seconds"))?,
        };
        if !seconds.is_finite() || seconds < 0.0 {
            anyhow::bail!("cannot sleep for {seconds} seconds");
        }

        tracing::debug!(room_id = %ctx.bot.room_id(), seconds, "Sleeping");
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(())
    }
}
