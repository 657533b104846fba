// ABOUTME: *default - handles verbs no other command claims.

use super::{Command, CommandContext};
use async_trait::async_trait;

pub struct Fallback;

#[async_trait]
impl Command for Fallback {
    fn keyword(&self) -> &str {
        "*default"
    }

    fn information_message(&self) -> &str {
        "Handle unmatched command."
    }

    fn is_hidden(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &CommandContext<'_>, _arguments: &str) -> anyhow::Result<()> {
        ctx.bot
            .say(format!("Sorry, I do not know how to handle '{}'", ctx.verb))
            .await?;
        Ok(())
    }
}
