// ABOUTME: echo - repeats the arguments back to the room.

use super::{Command, CommandContext};
use async_trait::async_trait;

pub struct Echo;

#[async_trait]
impl Command for Echo {
    fn keyword(&self) -> &str {
        "echo"
    }

    fn information_message(&self) -> &str {
        "Echo input string."
    }

    fn usage_message(&self) -> Option<&str> {
        Some("echo \"message\"")
    }

    async fn execute(&self, ctx: &CommandContext<'_>, arguments: &str) -> anyhow::Result<()> {
        ctx.bot.say(arguments).await?;
        Ok(())
    }
}
