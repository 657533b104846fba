// ABOUTME: version - reports bot name and version from the shared store.

use super::{Command, CommandContext};
use crate::engine::{DEFAULT_NAME, UNKNOWN_VERSION};
use async_trait::async_trait;

pub struct Version;

#[async_trait]
impl Command for Version {
    fn keyword(&self) -> &str {
        "version"
    }

    fn information_message(&self) -> &str {
        "Display software version."
    }

    async fn execute(&self, ctx: &CommandContext<'_>, _arguments: &str) -> anyhow::Result<()> {
        let name = ctx
            .context
            .get_str("bot.name")
            .unwrap_or_else(|| DEFAULT_NAME.to_string());
        let version = ctx
            .context
            .get_str("bot.version")
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        ctx.bot.say(format!("{name} version {version}")).await?;
        Ok(())
    }
}
