// ABOUTME: Name-keyed publish/subscribe registry for lifecycle and inbound events.
// ABOUTME: Subscribers declare what they handle; dispatch runs them in subscription order.

use crate::error::{BotError, Result};
use crate::events::{Event, EventKind};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Event names known to the bus.
///
/// The reserved names are declared when the bus is built. Anything else is
/// a `Custom` name, declared by its first subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    Bond,
    Dispose,
    Start,
    Stop,
    Message,
    Attachment,
    Join,
    Leave,
    Enter,
    Exit,
    Inbound,
    Custom(String),
}

impl EventName {
    pub const RESERVED: [EventName; 11] = [
        EventName::Bond,
        EventName::Dispose,
        EventName::Start,
        EventName::Stop,
        EventName::Message,
        EventName::Attachment,
        EventName::Join,
        EventName::Leave,
        EventName::Enter,
        EventName::Exit,
        EventName::Inbound,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            EventName::Bond => "bond",
            EventName::Dispose => "dispose",
            EventName::Start => "start",
            EventName::Stop => "stop",
            EventName::Message => "message",
            EventName::Attachment => "attachment",
            EventName::Join => "join",
            EventName::Leave => "leave",
            EventName::Enter => "enter",
            EventName::Exit => "exit",
            EventName::Inbound => "inbound",
            EventName::Custom(name) => name,
        }
    }

    /// Parse a textual name, rejecting empty names and names with whitespace
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(BotError::InvalidEventName(name.to_string()));
        }

        Ok(Self::RESERVED
            .into_iter()
            .find(|reserved| reserved.as_str() == name)
            .unwrap_or_else(|| EventName::Custom(name.to_string())))
    }

    fn validate(&self) -> Result<()> {
        match self {
            EventName::Custom(name) if name.is_empty() || name.chars().any(char::is_whitespace) => {
                Err(BotError::InvalidEventName(name.clone()))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EventKind> for EventName {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Message => EventName::Message,
            EventKind::Attachment => EventName::Attachment,
            EventKind::Join => EventName::Join,
            EventKind::Leave => EventName::Leave,
            EventKind::Generic => EventName::Inbound,
        }
    }
}

/// What a dispatch carries to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    Event(Event),
    /// Room identity of the bot a lifecycle event is about
    Bot(String),
    Data(Value),
}

/// Receives events from the bus.
///
/// `handles` is checked once, at subscription time.
pub trait Subscriber: Send + Sync {
    fn handles(&self, event: &EventName) -> bool;

    fn on_event(&self, event: &EventName, payload: &Payload) -> anyhow::Result<()>;
}

/// Subscriber backed by a closure
pub struct FnSubscriber<F> {
    events: Option<Vec<EventName>>,
    callback: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&EventName, &Payload) -> anyhow::Result<()> + Send + Sync,
{
    /// Handles every event name
    pub fn new(callback: F) -> Self {
        Self {
            events: None,
            callback,
        }
    }

    /// Handles only the given names
    pub fn for_events(events: impl IntoIterator<Item = EventName>, callback: F) -> Self {
        Self {
            events: Some(events.into_iter().collect()),
            callback,
        }
    }
}

impl<F> Subscriber for FnSubscriber<F>
where
    F: Fn(&EventName, &Payload) -> anyhow::Result<()> + Send + Sync,
{
    fn handles(&self, event: &EventName) -> bool {
        self.events
            .as_ref()
            .map_or(true, |events| events.contains(event))
    }

    fn on_event(&self, event: &EventName, payload: &Payload) -> anyhow::Result<()> {
        (self.callback)(event, payload)
    }
}

type Registry = HashMap<EventName, Vec<Arc<dyn Subscriber>>>;

pub struct EventBus {
    subscribers: RwLock<Registry>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let subscribers = EventName::RESERVED
            .into_iter()
            .map(|name| (name, Vec::new()))
            .collect();
        Self {
            subscribers: RwLock::new(subscribers),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        self.subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Declare a name without subscribing to it
    pub fn declare(&self, event: EventName) -> Result<()> {
        event.validate()?;
        self.write().entry(event).or_default();
        Ok(())
    }

    pub fn is_declared(&self, event: &EventName) -> bool {
        self.read().contains_key(event)
    }

    pub fn subscriber_count(&self, event: &EventName) -> usize {
        self.read().get(event).map_or(0, Vec::len)
    }

    /// Add a subscriber; it must handle the event
    pub fn subscribe(&self, event: EventName, subscriber: Arc<dyn Subscriber>) -> Result<()> {
        event.validate()?;
        if !subscriber.handles(&event) {
            return Err(BotError::MissingHandler(event.to_string()));
        }

        tracing::debug!(event = %event, "Subscribing to event");
        self.write().entry(event).or_default().push(subscriber);
        Ok(())
    }

    /// Subscribe by textual name
    pub fn subscribe_named(&self, event: &str, subscriber: Arc<dyn Subscriber>) -> Result<()> {
        self.subscribe(EventName::parse(event)?, subscriber)
    }

    /// Invoke every current subscriber once, in subscription order.
    ///
    /// Returns how many subscribers ran. A failing subscriber is logged and
    /// does not prevent the next ones from running.
    pub fn dispatch(&self, event: &EventName, payload: &Payload) -> Result<usize> {
        let current: Vec<Arc<dyn Subscriber>> = {
            let registry = self.read();
            let Some(subscribers) = registry.get(event) else {
                return Err(BotError::UnknownEvent(event.to_string()));
            };
            subscribers.clone()
        };

        tracing::trace!(event = %event, subscribers = current.len(), "Dispatching event");
        for subscriber in &current {
            if let Err(e) = subscriber.on_event(event, payload) {
                tracing::warn!(event = %event, error = %e, "Subscriber failed");
            }
        }

        Ok(current.len())
    }

    /// Dispatch by textual name
    pub fn dispatch_named(&self, event: &str, payload: &Payload) -> Result<usize> {
        self.dispatch(&EventName::parse(event)?, payload)
    }
}
