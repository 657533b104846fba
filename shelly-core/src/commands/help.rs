// ABOUTME: help - lists visible commands, or explains one of them.

use super::{Command, CommandContext};
use async_trait::async_trait;

pub struct Help;

#[async_trait]
impl Command for Help {
    fn keyword(&self) -> &str {
        "help"
    }

    fn information_message(&self) -> &str {
        "Show commands and usage"
    }

    fn usage_message(&self) -> Option<&str> {
        Some("help <command>")
    }

    async fn execute(&self, ctx: &CommandContext<'_>, arguments: &str) -> anyhow::Result<()> {
        let arguments = arguments.trim();

        if arguments.is_empty() {
            let lines: Vec<String> = ctx
                .shell
                .commands()
                .into_iter()
                .filter_map(|keyword| ctx.shell.command(&keyword))
                .filter(|command| !command.is_hidden())
                .map(|command| {
                    format!("{} - {}", command.keyword(), command.information_message())
                })
                .collect();

            if lines.is_empty() {
                ctx.bot.say("No command has been found.").await?;
            } else {
                ctx.bot
                    .say(format!("Available commands:\n{}", lines.join("\n")))
                    .await?;
            }
            return Ok(());
        }

        match ctx.shell.command(arguments) {
            Some(command) => {
                let usage = command.usage_message().unwrap_or_else(|| command.keyword());
                ctx.bot
                    .say(format!(
                        "{} - {}\nusage: {}",
                        command.keyword(),
                        command.information_message(),
                        usage
                    ))
                    .await?;
            }
            None => {
                ctx.bot.say("This command is unknown.").await?;
            }
        }
        Ok(())
    }
}
