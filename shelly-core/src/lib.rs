// ABOUTME: shelly-core - concurrent event and command pipeline for chat bots.
// ABOUTME: Shared store, event bus, command shell, listener, speaker, workers and engine.

pub mod bot;
pub mod bus;
pub mod channels;
pub mod commands;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod listener;
pub mod machines;
pub mod memory;
pub mod metrics;
pub mod shell;
pub mod space;
pub mod speaker;
pub mod triggers;
pub mod worker;

pub use bot::ShellBot;
pub use bus::{EventBus, EventName, FnSubscriber, Payload, Subscriber};
pub use channels::{Inbound, Outbound, Reply, Work};
pub use commands::{Command, CommandContext};
pub use context::{Check, Context};
pub use engine::{Engine, EngineConfig};
pub use error::{BotError, Result};
pub use events::{Event, EventKind};
pub use listener::Listener;
pub use machines::{Step, Steps};
pub use memory::MemoryStore;
pub use shell::Shell;
pub use space::{LocalSpace, Space};
pub use speaker::Speaker;
pub use worker::Worker;
