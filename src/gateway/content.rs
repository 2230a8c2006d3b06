//! Normalized tool call results.
//!
//! Every connector returns a `CallResult`, whatever the backend sent.

use serde::{Deserialize, Serialize};

use super::errors::RpcError;
use super::types::error_codes;

/// One piece of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text { text: String },
    /// Anything else the backend returned (images, resources, structured
    /// output), kept as JSON.
    Structured { value: serde_json::Value },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            ContentPart::Structured { .. } => None,
        }
    }
}

/// Canonical result of a tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub parts: Vec<ContentPart>,
}

impl CallResult {
    pub fn new(parts: Vec<ContentPart>) -> Self {
        Self { parts }
    }

    /// A result holding a single text part.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![ContentPart::text(text)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Text parts joined with newlines; structured parts are rendered as
    /// compact JSON.
    pub fn to_text(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => text.clone(),
                ContentPart::Structured { value } => value.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Normalize a `tools/call` result object.
    ///
    /// Expects `{content: [...], isError?, structuredContent?}`. `text` items
    /// become text parts, every other item is kept as a structured part.
    /// `structuredContent` is only used when `content` is empty. A result
    /// flagged `isError` is returned as a remote error carrying its text.
    pub fn from_tool_result(result: serde_json::Value) -> Result<Self, RpcError> {
        let serde_json::Value::Object(mut obj) = result else {
            return Err(RpcError::malformed("tool result is not an object"));
        };

        let content = match obj.remove("content") {
            Some(serde_json::Value::Array(items)) => items,
            Some(serde_json::Value::Null) | None => {
                if obj.contains_key("structuredContent") {
                    Vec::new()
                } else {
                    return Err(RpcError::malformed("tool result has no content"));
                }
            }
            Some(_) => return Err(RpcError::malformed("tool result content is not an array")),
        };

        let mut parts = content
            .into_iter()
            .map(parse_part)
            .collect::<Result<Vec<_>, _>>()?;

        if parts.is_empty() {
            if let Some(value) = obj.remove("structuredContent").filter(|v| !v.is_null()) {
                parts.push(ContentPart::Structured { value });
            }
        }

        let result = Self { parts };

        let is_error = obj
            .get("isError")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if is_error {
            return Err(RpcError::Remote {
                code: error_codes::TOOL_ERROR,
                message: result.to_text(),
                data: None,
            });
        }

        Ok(result)
    }

    /// Best-effort normalization used by the direct HTTP bypass.
    ///
    /// A result with a `content` array goes through [`from_tool_result`];
    /// anything else becomes one text part (strings verbatim, other values as
    /// JSON).
    pub fn from_loose_result(result: serde_json::Value) -> Result<Self, RpcError> {
        let has_content = result
            .get("content")
            .map(|c| c.is_array())
            .unwrap_or(false);
        if has_content {
            return Self::from_tool_result(result);
        }

        Ok(match result {
            serde_json::Value::String(text) => Self::from_text(text),
            other => Self::from_text(other.to_string()),
        })
    }
}

fn parse_part(item: serde_json::Value) -> Result<ContentPart, RpcError> {
    if !item.is_object() {
        return Err(RpcError::malformed(format!(
            "content item is not an object: {item}"
        )));
    }

    let is_text = item.get("type").and_then(|t| t.as_str()) == Some("text");
    let text = item
        .get("text")
        .and_then(|t| t.as_str())
        .map(str::to_owned);

    match (is_text, text) {
        (true, Some(text)) => Ok(ContentPart::Text { text }),
        (true, None) => Err(RpcError::malformed("text content item has no text")),
        (false, _) => Ok(ContentPart::Structured { value: item }),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
