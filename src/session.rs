use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::locale::Locale;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// A button offered by the bot. `title` may carry a second line used as a
/// short description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickReply {
    pub title: String,
    pub payload: String,
}

impl QuickReply {
    pub fn new(title: impl Into<String>, payload: impl Into<String>) -> Self {
        Self { title: title.into(), payload: payload.into() }
    }

    pub fn label(&self) -> &str {
        self.title.split_once('\n').map_or(self.title.as_str(), |(label, _)| label)
    }

    pub fn description(&self) -> Option<&str> {
        self.title.split_once('\n').map(|(_, desc)| desc)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<QuickReply>>,
}

/// One bot turn as handed over by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotEntry {
    pub text: String,
    pub buttons: Option<Vec<QuickReply>>,
}

const GREETING_ID: &str = "1";

/// Buttons of the most recent bot turn; older offers are stale.
pub fn last_quick_replies(messages: &[Message]) -> &[QuickReply] {
    messages
        .iter()
        .rev()
        .find(|m| m.sender == Sender::Bot)
        .and_then(|m| m.buttons.as_deref())
        .unwrap_or(&[])
}

/// Ordered, append-only chat history plus the free-text input buffer.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    messages: Vec<Message>,
    pending_input: String,
    connection_degraded: bool,
    revision: u64,
    #[serde(skip)]
    next_id: u64,
}

impl Session {
    /// Starts a session seeded with the localized greeting.
    pub fn new(locale: Locale) -> Self {
        let greeting = Message {
            id: MessageId(GREETING_ID.to_string()),
            text: locale.greeting().to_string(),
            sender: Sender::Bot,
            timestamp: Utc::now(),
            buttons: Some(locale.greeting_quick_replies()),
        };
        Self {
            messages: vec![greeting],
            pending_input: String::new(),
            connection_degraded: false,
            revision: 1,
            next_id: 2,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    pub fn connection_degraded(&self) -> bool {
        self.connection_degraded
    }

    /// Bumped on every append; surfaces poll it to know the history grew.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_pending_input(&mut self, text: impl Into<String>) {
        self.pending_input = text.into();
    }

    pub fn clear_pending_input(&mut self) {
        self.pending_input.clear();
    }

    /// Returns `None` without touching the history when `text` is blank.
    pub fn append_user_message(&mut self, text: &str) -> Option<Message> {
        if text.trim().is_empty() {
            return None;
        }
        Some(self.push(text.to_string(), Sender::User, None))
    }

    /// Appends the input buffer as a user message and clears it.
    pub fn submit_input(&mut self) -> Option<Message> {
        let text = std::mem::take(&mut self.pending_input);
        match self.append_user_message(&text) {
            Some(msg) => Some(msg),
            None => {
                self.pending_input = text;
                None
            }
        }
    }

    pub fn append_bot_messages(&mut self, entries: Vec<BotEntry>) -> Vec<Message> {
        entries
            .into_iter()
            .map(|entry| self.push(entry.text, Sender::Bot, entry.buttons))
            .collect()
    }

    pub fn append_system_error_message(&mut self, text: &str) -> Message {
        self.push(text.to_string(), Sender::Bot, None)
    }

    pub(crate) fn mark_degraded(&mut self) {
        self.connection_degraded = true;
    }

    fn push(&mut self, text: String, sender: Sender, buttons: Option<Vec<QuickReply>>) -> Message {
        let id = MessageId(self.next_id.to_string());
        self.next_id += 1;
        // quick replies only ever ride on bot turns
        let buttons = match sender {
            Sender::Bot => buttons,
            Sender::User => None,
        };
        let msg = Message { id, text, sender, timestamp: Utc::now(), buttons };
        self.messages.push(msg.clone());
        self.revision += 1;
        msg
    }
}
