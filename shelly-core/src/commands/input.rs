// ABOUTME: input - lists what the conversation has captured so far.
// ABOUTME: Reads the "input" mapping from the bot's memory.

use super::{Command, CommandContext};
use async_trait::async_trait;
use serde_json::Value;

pub struct Input;

#[async_trait]
impl Command for Input {
    fn keyword(&self) -> &str {
        "input"
    }

    fn information_message(&self) -> &str {
        "Display all input."
    }

    async fn execute(&self, ctx: &CommandContext<'_>, _arguments: &str) -> anyhow::Result<()> {
        let input = match ctx.bot.store().recall("input") {
            Some(Value::Object(map)) if !map.is_empty() => map,
            _ => {
                ctx.bot.say("There is nothing to display").await?;
                return Ok(());
            }
        };

        let mut keys: Vec<&String> = input.keys().collect();
        keys.sort();

        let mut lines = vec!["Input:".to_string()];
        for key in keys {
            let value = match &input[key] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            lines.push(format!("{key} - {value}"));
        }
        ctx.bot.say(lines.join("\n")).await?;
        Ok(())
    }
}
