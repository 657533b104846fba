// ABOUTME: *empty - runs when the bot is addressed without a verb.
// ABOUTME: Delegates to whatever help command the shell currently holds.

use super::{Command, CommandContext};
use async_trait::async_trait;

pub struct Empty;

#[async_trait]
impl Command for Empty {
    fn keyword(&self) -> &str {
        "*empty"
    }

    fn information_message(&self) -> &str {
        "Handle empty command."
    }

    fn is_hidden(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &CommandContext<'_>, _arguments: &str) -> anyhow::Result<()> {
        let help = ctx
            .shell
            .command("help")
            .ok_or_else(|| anyhow::anyhow!("No help command has been found"))?;
        help.execute(ctx, "").await
    }
}
