// ABOUTME: Step machine scripting a multi-stage conversation for one room.
// ABOUTME: Entering a step announces it and adds the step's participants.

use crate::bot::ShellBot;
use crate::channels::Reply;
use crate::context::Context;
use crate::error::{BotError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// One stage of a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub label: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<String>,
}

impl Step {
    pub fn new(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            message: message.into(),
            content: None,
            participants: Vec::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_participants(mut self, participants: Vec<String>) -> Self {
        self.participants = participants;
        self
    }
}

/// Ordered steps plus the current position, always within bounds
#[derive(Debug)]
pub struct Steps {
    steps: Vec<Step>,
    current: Mutex<usize>,
}

impl Steps {
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        if steps.is_empty() {
            return Err(BotError::Validation {
                path: "process.steps".to_string(),
                reason: "a step machine needs at least one step".to_string(),
            });
        }
        Ok(Self {
            steps,
            current: Mutex::new(0),
        })
    }

    /// Build from `process.steps` when the store configures it
    pub fn from_context(context: &Context) -> Result<Option<Self>> {
        if !context.has("process.steps") {
            return Ok(None);
        }
        let steps: Vec<Step> = context.get_as("process.steps").ok_or_else(|| {
            BotError::Validation {
                path: "process.steps".to_string(),
                reason: "expected a list of steps".to_string(),
            }
        })?;
        Self::new(steps).map(Some)
    }

    fn index(&self) -> std::sync::MutexGuard<'_, usize> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn current_index(&self) -> usize {
        *self.index()
    }

    pub fn current(&self) -> &Step {
        &self.steps[self.current_index()]
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Current label and message, without changing state
    pub fn describe(&self) -> String {
        let step = self.current();
        format!("{} - {}", step.label, step.message)
    }

    /// Enter the first step
    pub async fn start(&self, bot: &ShellBot) -> Result<()> {
        self.enter(0, bot).await
    }

    /// Move to the next step; on the last step, announce it again
    pub async fn advance(&self, bot: &ShellBot) -> Result<()> {
        let next = {
            let current = self.index();
            (*current + 1).min(self.steps.len() - 1)
        };
        self.enter(next, bot).await
    }

    pub async fn reset(&self, bot: &ShellBot) -> Result<()> {
        self.enter(0, bot).await
    }

    /// Jump to the step at `index`
    pub async fn set(&self, index: usize, bot: &ShellBot) -> Result<()> {
        if index >= self.steps.len() {
            return Err(BotError::Validation {
                path: "process.steps".to_string(),
                reason: format!("no step at position {index}"),
            });
        }
        self.enter(index, bot).await
    }

    async fn enter(&self, index: usize, bot: &ShellBot) -> Result<()> {
        *self.index() = index;
        let step = &self.steps[index];
        tracing::debug!(room_id = %bot.room_id(), step = %step.label, index, "Entering step");

        bot.say(format!("New state: {} - {}", step.label, step.message))
            .await?;
        if let Some(content) = &step.content {
            bot.say_reply(Reply::text(content.clone()).with_markdown(content.clone()))
                .await?;
        }
        if let Err(e) = bot.add_participants(&step.participants).await {
            tracing::warn!(room_id = %bot.room_id(), error = %e, "Failed to add participants");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_steps_rejected() {
        assert!(matches!(
            Steps::new(Vec::new()),
            Err(BotError::Validation { .. })
        ));
    }

    #[test]
    fn test_from_context() {
        let context = Context::new().unwrap();
        assert!(Steps::from_context(&context).unwrap().is_none());

        context
            .set(
                "process.steps",
                json!([{"label": "Start", "message": "Go"}, {"label": "End"}]),
            )
            .unwrap();
        let steps = Steps::from_context(&context).unwrap().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps.describe(), "Start - Go");

        context.set("process.steps", json!("bogus")).unwrap();
        assert!(Steps::from_context(&context).is_err());
    }
}
