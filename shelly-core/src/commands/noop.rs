// ABOUTME: noop - does nothing, useful to test the shell plumbing.

use super::{Command, CommandContext};
use async_trait::async_trait;

pub struct Noop;

#[async_trait]
impl Command for Noop {
    fn keyword(&self) -> &str {
        "noop"
    }

    fn information_message(&self) -> &str {
        "Do absolutely nothing."
    }

    async fn execute(&self, _ctx: &CommandContext<'_>, _arguments: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
