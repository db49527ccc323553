use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::progress::SlotMap;
use crate::session::QuickReply;

pub const WEBHOOK_PATH: &str = "webhooks/rest/webhook";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookRequest {
    pub sender: String,
    pub message: String,
}

/// One item of the backend's reply array. Every field is optional; unknown
/// fields (images, attachments) are dropped.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BotReply {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub buttons: Option<Vec<QuickReply>>,
    #[serde(default)]
    pub slots: Option<Value>,
    #[serde(default)]
    pub custom: Option<Value>,
}

impl BotReply {
    /// Slot map carried either directly or inside a custom payload. A slot
    /// field that is not an object is ignored in both places.
    pub fn slot_map(&self) -> Option<SlotMap> {
        let direct = self.slots.as_ref().filter(|v| v.is_object());
        let raw = direct.or_else(|| self.custom.as_ref()?.get("slots"))?;
        serde_json::from_value(raw.clone()).ok()
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("backend answered {0}")]
    Status(StatusCode),
    #[error("malformed backend response: {0}")]
    Malformed(String),
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[async_trait]
pub trait DialogueBackend: Send + Sync {
    async fn exchange(&self, req: &WebhookRequest) -> Result<Vec<BotReply>, BackendError>;
}

/// REST channel of the dialogue backend.
#[derive(Clone)]
pub struct RestWebhook {
    endpoint: url::Url,
    client: reqwest::Client,
}

impl RestWebhook {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let mut base = url::Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join(WEBHOOK_PATH)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BackendError::Transport)?;
        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

#[async_trait]
impl DialogueBackend for RestWebhook {
    async fn exchange(&self, req: &WebhookRequest) -> Result<Vec<BotReply>, BackendError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(req)
            .send()
            .await
            .map_err(BackendError::Transport)?;
        if !resp.status().is_success() {
            return Err(BackendError::Status(resp.status()));
        }
        let body = resp.bytes().await.map_err(BackendError::Transport)?;
        parse_replies(&body)
    }
}

/// Decodes a reply body. `null` and an empty body both mean "no reply".
pub fn parse_replies(body: &[u8]) -> Result<Vec<BotReply>, BackendError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let replies: Option<Vec<BotReply>> =
        serde_json::from_slice(body).map_err(|e| BackendError::Malformed(e.to_string()))?;
    Ok(replies.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_joins_webhook_path() {
        let b = RestWebhook::new("http://localhost:5005", Duration::from_secs(1)).unwrap();
        assert_eq!(b.endpoint().as_str(), "http://localhost:5005/webhooks/rest/webhook");
        let b = RestWebhook::new("https://bot.example.ph/rasa", Duration::from_secs(1)).unwrap();
        assert_eq!(b.endpoint().as_str(), "https://bot.example.ph/rasa/webhooks/rest/webhook");
    }

    #[test]
    fn rejects_garbage_url() {
        let err = RestWebhook::new("not a url", Duration::from_secs(1)).err();
        assert!(matches!(err, Some(BackendError::InvalidUrl(_))));
    }

    #[test]
    fn parses_text_and_buttons() {
        let body = json!([
            {"recipient_id": "x", "text": "Hi Juan!"},
            {"buttons": [{"title": "Yes", "payload": "/affirm"}]},
            {"image": "https://example.com/a.png"}
        ]);
        let replies = parse_replies(body.to_string().as_bytes()).unwrap();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0].text.as_deref(), Some("Hi Juan!"));
        assert_eq!(replies[1].text, None);
        assert_eq!(replies[1].buttons.as_ref().unwrap()[0].payload, "/affirm");
    }

    #[test]
    fn empty_bodies_mean_no_reply() {
        assert!(parse_replies(b"[]").unwrap().is_empty());
        assert!(parse_replies(b"").unwrap().is_empty());
        assert!(parse_replies(b"null").unwrap().is_empty());
    }

    #[test]
    fn wrong_shape_is_malformed() {
        assert!(matches!(parse_replies(b"{\"text\":\"hi\"}"), Err(BackendError::Malformed(_))));
        assert!(matches!(parse_replies(b"<html>"), Err(BackendError::Malformed(_))));
        assert!(matches!(parse_replies(b"[{\"text\": 5}]"), Err(BackendError::Malformed(_))));
    }

    #[test]
    fn slot_map_from_either_location() {
        let direct: BotReply = serde_json::from_value(json!({"slots": {"first_name": "Juan"}})).unwrap();
        assert_eq!(direct.slot_map().unwrap()["first_name"], "Juan");
        let nested: BotReply =
            serde_json::from_value(json!({"custom": {"slots": {"email": null}}})).unwrap();
        assert!(nested.slot_map().unwrap()["email"].is_null());
        assert!(BotReply::default().slot_map().is_none());
    }

    #[test]
    fn bad_slot_field_keeps_the_reply() {
        let replies = parse_replies(br#"[{"text":"Hi Juan!","slots":"oops"}]"#).unwrap();
        assert_eq!(replies[0].text.as_deref(), Some("Hi Juan!"));
        assert!(replies[0].slot_map().is_none());

        let nested: BotReply = serde_json::from_value(json!({"custom": {"slots": [1, 2]}})).unwrap();
        assert!(nested.slot_map().is_none());

        // a broken direct field falls back to the custom payload
        let both: BotReply =
            serde_json::from_value(json!({"slots": 7, "custom": {"slots": {"email": "j@x.ph"}}})).unwrap();
        assert_eq!(both.slot_map().unwrap()["email"], "j@x.ph");
    }
}
