// ABOUTME: Command shell - parses a line into verb and arguments and routes it.
// ABOUTME: Interactive commands run inline, the others are queued for the worker pool.

use crate::bot::ShellBot;
use crate::channels::{Work, WorkSender};
use crate::commands::{default_commands, Command, CommandContext};
use crate::context::Context;
use crate::error::{BotError, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const EMPTY_VERB: &str = "*empty";
const DEFAULT_VERB: &str = "*default";

fn apology(verb: &str) -> String {
    format!("Sorry, I do not know how to handle '{verb}'")
}

/// Apologize in the room for a failed command, then hand the error back
async fn report(bot: &ShellBot, verb: &str, outcome: Result<()>) -> Result<()> {
    if let Err(e) = &outcome {
        tracing::warn!(room_id = %bot.room_id(), verb = %verb, error = %e, "Command failed");
        if let Err(say_error) = bot.say(apology(verb)).await {
            tracing::warn!(error = %say_error, "Could not report command failure");
        }
    }
    outcome
}

/// Split a line into its verb and the remaining arguments
pub fn split_line(line: &str) -> (&str, &str) {
    let line = line.trim();
    let (verb, arguments) = match line.split_once(char::is_whitespace) {
        Some((verb, arguments)) => (verb, arguments.trim_start()),
        None => (line, ""),
    };
    if verb.is_empty() {
        (EMPTY_VERB, arguments)
    } else {
        (verb, arguments)
    }
}

pub struct Shell {
    context: Context,
    commands: RwLock<HashMap<String, Arc<dyn Command>>>,
    inbox: Option<WorkSender>,
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("commands", &self.commands())
            .field("has_inbox", &self.inbox.is_some())
            .finish()
    }
}

impl Shell {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            commands: RwLock::new(HashMap::new()),
            inbox: None,
        }
    }

    /// Channel that receives non-interactive commands
    pub fn with_inbox(mut self, inbox: WorkSender) -> Self {
        self.inbox = Some(inbox);
        self
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Register a command; a later command with the same keyword replaces it
    pub fn load_command(&self, command: Arc<dyn Command>) {
        let keyword = command.keyword().to_string();
        let mut commands = self
            .commands
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if commands.insert(keyword.clone(), command).is_some() {
            tracing::debug!(keyword = %keyword, "Command has been replaced");
        }
    }

    pub fn load_commands(&self, commands: impl IntoIterator<Item = Arc<dyn Command>>) {
        for command in commands {
            self.load_command(command);
        }
    }

    pub fn load_default_commands(&self) {
        self.load_commands(default_commands());
    }

    pub fn command(&self, keyword: &str) -> Option<Arc<dyn Command>> {
        self.commands
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(keyword)
            .cloned()
    }

    /// Registered keywords, sorted
    pub fn commands(&self) -> Vec<String> {
        let mut keywords: Vec<String> = self
            .commands
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        keywords.sort();
        keywords
    }

    /// How many lines this shell handled, across every process sharing the store
    pub fn count(&self) -> i64 {
        self.context.get_i64("shell.count").unwrap_or(0)
    }

    /// Exact verb first, then `*default`
    fn resolve(&self, verb: &str) -> Option<(Arc<dyn Command>, bool)> {
        match self.command(verb) {
            Some(command) => Some((command, false)),
            None => self.command(DEFAULT_VERB).map(|command| (command, true)),
        }
    }

    /// Handle one line of text typed to the bot.
    ///
    /// An unknown verb with no `*default` gets the apology and is not an
    /// error. A failing command gets the apology and its error is returned.
    pub async fn handle(&self, bot: &ShellBot, line: &str) -> Result<()> {
        let (verb, arguments) = split_line(line);
        self.context.increment("shell.count", 1)?;
        tracing::debug!(room_id = %bot.room_id(), verb = %verb, "Handling command line");

        let Some((command, fallback)) = self.resolve(verb) else {
            bot.say(apology(verb)).await?;
            return Ok(());
        };
        crate::metrics::command_handled(command.keyword());

        let outcome = if command.is_interactive() {
            self.run(bot, command.as_ref(), verb, arguments).await
        } else {
            let queued = if fallback { verb } else { command.keyword() };
            self.enqueue(bot, queued, arguments).await
        };
        report(bot, verb, outcome).await
    }

    /// Run a queued verb now, for the worker pool
    pub async fn execute(&self, bot: &ShellBot, verb: &str, arguments: &str) -> Result<()> {
        let Some((command, _)) = self.resolve(verb) else {
            bot.say(apology(verb)).await?;
            return Ok(());
        };
        let outcome = self.run(bot, command.as_ref(), verb, arguments).await;
        report(bot, verb, outcome).await
    }

    async fn run(
        &self,
        bot: &ShellBot,
        command: &dyn Command,
        verb: &str,
        arguments: &str,
    ) -> Result<()> {
        let ctx = CommandContext {
            shell: self,
            context: &self.context,
            bot,
            verb,
        };
        command
            .execute(&ctx, arguments)
            .await
            .map_err(|source| BotError::Command {
                verb: verb.to_string(),
                source,
            })
    }

    async fn enqueue(&self, bot: &ShellBot, verb: &str, arguments: &str) -> Result<()> {
        let inbox = self
            .inbox
            .as_ref()
            .ok_or_else(|| BotError::NoWorkChannel(verb.to_string()))?;

        let busy = self.context.get_bool("worker.busy").unwrap_or(false);
        let ack = if busy {
            "Ok, will work on it as soon as possible"
        } else {
            "Ok, working on it"
        };
        bot.say(ack).await?;

        inbox
            .send(Work::Task {
                room_id: bot.room_id().to_string(),
                verb: verb.to_string(),
                arguments: arguments.to_string(),
            })
            .await
            .map_err(|_| BotError::ChannelClosed("work"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_line() {
        assert_eq!(split_line("version"), ("version", ""));
        assert_eq!(split_line("  echo  hello   world "), ("echo", "hello   world"));
        assert_eq!(split_line(""), ("*empty", ""));
        assert_eq!(split_line("   "), ("*empty", ""));
    }
}
