// ABOUTME: ShellBot - the runtime attached to one room.
// ABOUTME: Speaks through the outbound channel and carries per-room memory and step machine.

use crate::channels::{Outbound, OutboundSender, Reply};
use crate::context::Context;
use crate::error::{BotError, Result};
use crate::machines::Steps;
use crate::memory::MemoryStore;
use crate::space::Space;
use std::sync::Arc;

pub struct ShellBot {
    room_id: String,
    context: Context,
    store: MemoryStore,
    mouth: OutboundSender,
    space: Arc<dyn Space>,
    machine: Option<Arc<Steps>>,
}

impl std::fmt::Debug for ShellBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellBot")
            .field("room_id", &self.room_id)
            .field("space", &self.space.name())
            .field("has_machine", &self.machine.is_some())
            .finish()
    }
}

impl ShellBot {
    /// Build a bot for `room_id`; its memory is seeded from `bot.store`
    pub fn new(
        room_id: impl Into<String>,
        context: Context,
        mouth: OutboundSender,
        space: Arc<dyn Space>,
    ) -> Self {
        let store = MemoryStore::from_settings(context.get("bot.store"));
        Self {
            room_id: room_id.into(),
            context,
            store,
            mouth,
            space,
            machine: None,
        }
    }

    pub fn with_machine(mut self, machine: Steps) -> Self {
        self.machine = Some(Arc::new(machine));
        self
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn space(&self) -> &Arc<dyn Space> {
        &self.space
    }

    pub fn machine(&self) -> Option<&Arc<Steps>> {
        self.machine.as_ref()
    }

    /// Queue a plain-text reply for this room; empty text is skipped
    pub async fn say(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        if text.is_empty() {
            return Ok(());
        }
        self.say_reply(Reply::text(text)).await
    }

    /// Queue a structured reply, addressed to this room unless it names one
    pub async fn say_reply(&self, mut reply: Reply) -> Result<()> {
        if reply.room_id.is_none() {
            reply.room_id = Some(self.room_id.clone());
        }
        self.mouth
            .send(Outbound::Reply(reply))
            .await
            .map_err(|_| BotError::ChannelClosed("outbound"))
    }

    pub async fn add_participants(&self, participants: &[String]) -> anyhow::Result<()> {
        if participants.is_empty() {
            return Ok(());
        }
        tracing::info!(room_id = %self.room_id, count = participants.len(), "Adding participants");
        self.space
            .add_participants(&self.room_id, participants)
            .await
    }
}
