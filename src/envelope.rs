//! Wire shape of the messages exchanged with a wallet container.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::{Error, Result};

/// Field carrying the protocol tag. Messages without it belong to other
/// traffic sharing the transport.
pub const TAG_FIELD: &str = "ethers";
pub const PROTOCOL_TAG: &str = "v\u{1}\n";

pub const READY_ACTION: &str = "ready";
pub const ACCOUNT_CHANGED_ACTION: &str = "accountChanged";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "ethers")]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub params: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

impl Envelope {
    pub fn request(action: &str, id: u64, params: JsonValue) -> Self {
        Self {
            tag: PROTOCOL_TAG.to_string(),
            action: Some(action.to_string()),
            id: Some(id),
            params,
            result: None,
            error: None,
            account: None,
        }
    }

    pub fn reply(id: u64, result: JsonValue) -> Self {
        Self {
            tag: PROTOCOL_TAG.to_string(),
            action: None,
            id: Some(id),
            params: JsonValue::Null,
            result: Some(result),
            error: None,
            account: None,
        }
    }

    pub fn error_reply(id: u64, message: &str) -> Self {
        Self {
            error: Some(JsonValue::String(message.to_string())),
            result: None,
            ..Self::reply(id, JsonValue::Null)
        }
    }

    pub fn notification(action: &str, account: Option<&str>) -> Self {
        Self {
            tag: PROTOCOL_TAG.to_string(),
            action: Some(action.to_string()),
            id: None,
            params: json!({}),
            result: None,
            error: None,
            account: account.map(str::to_string),
        }
    }

    /// Parse an inbound message. `None` when it does not carry the protocol tag.
    pub fn from_inbound(data: &JsonValue) -> Option<Result<Self>> {
        if data.get(TAG_FIELD).and_then(JsonValue::as_str) != Some(PROTOCOL_TAG) {
            return None;
        }
        Some(serde_json::from_value(data.clone()).map_err(Error::from))
    }

    pub fn to_value(&self) -> Result<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }

    /// Error message of a reply; empty and null errors count as success.
    pub fn error_message(&self) -> Option<String> {
        match &self.error {
            None | Some(JsonValue::Null) | Some(JsonValue::Bool(false)) => None,
            Some(JsonValue::String(message)) if message.is_empty() => None,
            Some(JsonValue::String(message)) => Some(message.clone()),
            Some(JsonValue::Object(object)) => Some(
                object
                    .get("message")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| JsonValue::Object(object.clone()).to_string()),
            ),
            Some(other) => Some(other.to_string()),
        }
    }

    /// Outcome of a reply: the remote error, or the result (null if absent).
    pub fn outcome(&self) -> Result<JsonValue> {
        match self.error_message() {
            Some(message) => Err(Error::Remote(message)),
            None => Ok(self.result.clone().unwrap_or(JsonValue::Null)),
        }
    }

    /// Account carried by a notification, top-level or inside `params`.
    pub fn account(&self) -> Option<String> {
        self.account.clone().or_else(|| {
            self.params
                .get("account")
                .and_then(JsonValue::as_str)
                .map(str::to_string)
        })
    }
}

/// Unsolicited messages from the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    AccountChanged(Option<String>),
    Ready {
        account: Option<String>,
        title: Option<String>,
    },
}

impl Notification {
    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        match envelope.action.as_deref() {
            Some(ACCOUNT_CHANGED_ACTION) => Ok(Notification::AccountChanged(envelope.account())),
            Some(READY_ACTION) => Ok(Notification::Ready {
                account: envelope.account(),
                title: envelope
                    .params
                    .get("title")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string),
            }),
            other => Err(Error::UnknownAction(other.unwrap_or_default().to_string())),
        }
    }

    pub fn account(&self) -> Option<&str> {
        match self {
            Notification::AccountChanged(account) => account.as_deref(),
            Notification::Ready { account, .. } => account.as_deref(),
        }
    }
}
