// ABOUTME: Inbound worker - classifies raw items from the space and routes them.
// ABOUTME: Commands go to the shell, everything else is dispatched on the event bus.

use crate::bus::{EventName, Payload};
use crate::channels::{Inbound, InboundReceiver};
use crate::engine::Engine;
use crate::error::{BotError, Result};
use crate::events::{Event, EventKind};
use crate::triggers::{parse_trigger, Trigger};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Replaces or rejects an event right after parsing.
///
/// Returning `BotError::Interrupted` stops the listener.
pub type EventFilter = Arc<dyn Fn(Event) -> Result<Event> + Send + Sync>;

pub struct Listener {
    engine: Arc<Engine>,
    filter: Option<EventFilter>,
}

impl Listener {
    /// Listener for `engine`, using the engine's event filter if one is set
    pub fn new(engine: Arc<Engine>) -> Self {
        let filter = engine.filter();
        Self { engine, filter }
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(Event) -> Result<Event> + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Consume the inbound channel until a sentinel, cancellation, or switch-off
    pub async fn run(&self, mut ingress: InboundReceiver, cancel: CancellationToken) {
        let poll = self.engine.config().poll_interval;
        tracing::info!("Listener started");

        while self.engine.is_running() {
            let item = tokio::select! {
                _ = cancel.cancelled() => break,
                item = ingress.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
                _ = tokio::time::sleep(poll) => continue,
            };

            if item == Inbound::Sentinel {
                break;
            }

            match self.process(item).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    tracing::info!("Listener interrupted");
                    break;
                }
                Err(e) => {
                    crate::metrics::listener_error();
                    tracing::error!(error = %e, "Failed to process inbound item");
                }
            }
        }

        tracing::info!("Listener stopped");
    }

    /// Count, parse, filter and route one raw item
    pub async fn process(&self, item: Inbound) -> Result<()> {
        let value = match &item {
            Inbound::Sentinel => return Err(BotError::Interrupted),
            Inbound::Text(text) => serde_json::from_str::<Value>(text)
                .map_err(|e| BotError::MalformedPayload(format!("invalid JSON: {e}"))),
            Inbound::Payload(value) => Ok(value.clone()),
        };

        self.engine.context().increment("listener.counter", 1)?;
        crate::metrics::listener_item();

        let mut event = Event::from_value(value?)?;
        if let Some(filter) = &self.filter {
            event = filter(event)?;
        }
        tracing::debug!(kind = %event.kind, room_id = %event.room_id, "Inbound event");

        match event.kind {
            EventKind::Message => self.on_message(&event, &item).await,
            EventKind::Attachment => self.on_attachment(&event),
            EventKind::Join => self.on_join(&event).await,
            EventKind::Leave => self.on_leave(&event).await,
            EventKind::Generic => self.on_inbound(&event),
        }
    }

    fn bot_id(&self) -> Option<String> {
        self.engine.context().get_str("bot.id")
    }

    /// Route a message to the shell when it addresses the bot.
    ///
    /// The event is dispatched under `message` in every case.
    pub async fn on_message(&self, event: &Event, raw: &Inbound) -> Result<()> {
        event.expect_kind(EventKind::Message)?;

        let bot_id = self.bot_id();
        let from_self = bot_id.is_some() && event.from_id == bot_id;
        let mentioned = bot_id
            .as_ref()
            .is_some_and(|id| event.mentioned_ids.contains(id));

        let trigger = if from_self {
            Trigger::Message
        } else {
            parse_trigger(&event.text, &self.engine.name(), mentioned, event.is_direct())
        };

        let outcome = match trigger {
            Trigger::Command(line) => {
                let bot = self.engine.get_bot(&event.room_id).await?;
                self.engine.shell().handle(&bot, &line).await
            }
            Trigger::Message => {
                if !from_self {
                    self.forward_to_fan(raw).await;
                }
                Ok(())
            }
        };

        self.engine
            .bus()
            .dispatch(&EventName::Message, &Payload::Event(event.clone()))?;
        outcome
    }

    async fn forward_to_fan(&self, raw: &Inbound) {
        let Some(fan) = self.engine.fan_sink() else {
            return;
        };
        if !self.engine.context().has("fan.stamp") {
            return;
        }
        if fan.send(raw.clone()).await.is_err() {
            tracing::warn!("Fan sink is closed, dropping message");
        }
    }

    pub fn on_attachment(&self, event: &Event) -> Result<()> {
        event.expect_kind(EventKind::Attachment)?;
        self.engine
            .bus()
            .dispatch(&EventName::Attachment, &Payload::Event(event.clone()))?;
        Ok(())
    }

    /// `enter` when the bot itself joined, `join` for anyone else
    pub async fn on_join(&self, event: &Event) -> Result<()> {
        event.expect_kind(EventKind::Join)?;

        if event.actor_id.is_some() && event.actor_id == self.bot_id() {
            tracing::info!(room_id = %event.room_id, "Bot entered room");
            let bot = self.engine.get_bot(&event.room_id).await?;
            if let Some(greeting) = self.engine.context().get_str("bot.on_enter") {
                bot.say(greeting).await?;
            }
            self.engine
                .bus()
                .dispatch(&EventName::Enter, &Payload::Event(event.clone()))?;
        } else {
            self.engine
                .bus()
                .dispatch(&EventName::Join, &Payload::Event(event.clone()))?;
        }
        Ok(())
    }

    /// `exit` when the bot itself left, `leave` for anyone else
    pub async fn on_leave(&self, event: &Event) -> Result<()> {
        event.expect_kind(EventKind::Leave)?;

        if event.actor_id.is_some() && event.actor_id == self.bot_id() {
            tracing::info!(room_id = %event.room_id, "Bot exited room");
            self.engine
                .bus()
                .dispatch(&EventName::Exit, &Payload::Event(event.clone()))?;
            self.engine.dispose_bot(&event.room_id)?;
        } else {
            self.engine
                .bus()
                .dispatch(&EventName::Leave, &Payload::Event(event.clone()))?;
        }
        Ok(())
    }

    pub fn on_inbound(&self, event: &Event) -> Result<()> {
        event.expect_kind(EventKind::Generic)?;
        self.engine
            .bus()
            .dispatch(&EventName::Inbound, &Payload::Event(event.clone()))?;
        Ok(())
    }
}
