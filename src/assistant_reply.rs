//! Replies from the external AI assistant layer.
//!
//! The assistant answers with free text that may or may not be JSON. Callers
//! get an explicit tagged value instead of guessing.

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssistantReply<T> {
    Structured { data: T },
    Text { text: String },
}

impl<T: DeserializeOwned> AssistantReply<T> {
    /// Structured when the reply (optionally wrapped in a Markdown code fence) deserializes as `T`.
    pub fn parse(raw: &str) -> Self {
        let body = strip_code_fence(raw);
        match serde_json::from_str::<T>(body) {
            Ok(data) => AssistantReply::Structured { data },
            Err(_) => AssistantReply::Text {
                text: raw.trim().to_string(),
            },
        }
    }
}

impl<T> AssistantReply<T> {
    pub fn structured(&self) -> Option<&T> {
        match self {
            AssistantReply::Structured { data } => Some(data),
            AssistantReply::Text { .. } => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            AssistantReply::Text { text } => Some(text),
            AssistantReply::Structured { .. } => None,
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening fence line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
