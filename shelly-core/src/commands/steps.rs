// ABOUTME: step and state - drive the room's step machine from chat.

use super::{Command, CommandContext};
use async_trait::async_trait;

const NO_PROCESS: &str = "There is no process in this room.";

/// Moves the process to its next step
pub struct Advance;

#[async_trait]
impl Command for Advance {
    fn keyword(&self) -> &str {
        "step"
    }

    fn information_message(&self) -> &str {
        "Move process to next state."
    }

    async fn execute(&self, ctx: &CommandContext<'_>, _arguments: &str) -> anyhow::Result<()> {
        match ctx.bot.machine() {
            Some(machine) => machine.advance(ctx.bot).await?,
            None => ctx.bot.say(NO_PROCESS).await?,
        }
        Ok(())
    }
}

/// Tells where the process currently is
pub struct State;

#[async_trait]
impl Command for State {
    fn keyword(&self) -> &str {
        "state"
    }

    fn information_message(&self) -> &str {
        "Display current state in process."
    }

    async fn execute(&self, ctx: &CommandContext<'_>, _arguments: &str) -> anyhow::Result<()> {
        match ctx.bot.machine() {
            Some(machine) => {
                ctx.bot
                    .say(format!("Current state: {}", machine.describe()))
                    .await?
            }
            None => ctx.bot.say(NO_PROCESS).await?,
        }
        Ok(())
    }
}
