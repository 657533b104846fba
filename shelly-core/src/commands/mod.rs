// ABOUTME: Command trait for shell verbs and the built-in command set.
// ABOUTME: Commands get the shell, the shared store and the bot at execution time.

mod echo;
mod empty;
mod fallback;
mod help;
mod input;
mod noop;
mod sleep;
mod steps;
mod version;

pub use echo::Echo;
pub use empty::Empty;
pub use fallback::Fallback;
pub use help::Help;
pub use input::Input;
pub use noop::Noop;
pub use sleep::Sleep;
pub use steps::{Advance, State};
pub use version::Version;

use crate::bot::ShellBot;
use crate::context::Context;
use crate::shell::Shell;
use async_trait::async_trait;
use std::sync::Arc;

/// Everything a command may touch while it runs
pub struct CommandContext<'a> {
    pub shell: &'a Shell,
    pub context: &'a Context,
    pub bot: &'a ShellBot,
    /// Verb as typed by the user, which differs from the keyword for `*default`
    pub verb: &'a str,
}

/// A verb the shell can route to.
///
/// Interactive commands run inline; the others are acknowledged and
/// queued for the worker pool.
#[async_trait]
pub trait Command: Send + Sync {
    fn keyword(&self) -> &str;

    fn information_message(&self) -> &str;

    fn usage_message(&self) -> Option<&str> {
        None
    }

    /// Hidden commands are left out of `help`
    fn is_hidden(&self) -> bool {
        false
    }

    fn is_interactive(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &CommandContext<'_>, arguments: &str) -> anyhow::Result<()>;
}

/// The commands `Shell::load_default_commands` registers
pub fn default_commands() -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(Fallback),
        Arc::new(Echo),
        Arc::new(Empty),
        Arc::new(Help),
        Arc::new(Input),
        Arc::new(Noop),
        Arc::new(Sleep),
        Arc::new(Advance),
        Arc::new(State),
        Arc::new(Version),
    ]
}
