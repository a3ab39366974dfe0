//! Token estimation.
//!
//! A character-based heuristic good enough for budget pre-checks: one token
//! per four characters, plus fixed per-message overhead. Exact counts come
//! back from the upstream after dispatch and replace these estimates in the
//! usage record.

use relay_core::{ChatMessage, RelayError, RelayRequest, RequestContent};
use serde_json::Value;
use tracing::warn;

/// Per-message base overhead in tokens.
const MESSAGE_BASE_TOKENS: u32 = 4;
/// Extra overhead when a tool invocation is attached.
const TOOL_BASE_TOKENS: u32 = 4;
/// Fallback estimate used when raw content is unrecognizable.
const FALLBACK: TokenEstimate = TokenEstimate {
    input_tokens: 100,
    estimated_output_tokens: 150,
};

/// A predicted token pair for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimate {
    /// Predicted input tokens
    pub input_tokens: u32,
    /// Predicted output tokens
    pub estimated_output_tokens: u32,
}

impl TokenEstimate {
    /// Derive the output estimate from an input count: 1.5× input, capped by
    /// the caller's `max_tokens` when one is set.
    #[must_use]
    pub fn from_input(input_tokens: u32, max_tokens: Option<u32>) -> Self {
        let raw = input_tokens.saturating_mul(3) / 2;
        let estimated_output_tokens = match max_tokens {
            Some(cap) => raw.min(cap),
            None => raw,
        };
        Self {
            input_tokens,
            estimated_output_tokens,
        }
    }
}

/// Tokens in a plain string: ⌈chars / 4⌉, zero for the empty string.
#[must_use]
pub fn estimate_text(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars.div_ceil(4)
}

/// Tokens in one chat message: base overhead plus content, name, and tool
/// invocation contributions.
#[must_use]
pub fn estimate_message(message: &ChatMessage) -> u32 {
    let mut tokens = MESSAGE_BASE_TOKENS + estimate_text(&message.content);

    if let Some(ref name) = message.name {
        tokens += 1 + estimate_text(name);
    }

    if let Some(ref tool_call) = message.tool_call {
        tokens += TOOL_BASE_TOKENS + estimate_text(&tool_call.name) + estimate_text(&tool_call.arguments);
    }

    tokens
}

/// Estimate a typed request.
#[must_use]
pub fn estimate_request(request: &RelayRequest) -> TokenEstimate {
    let input_tokens = match &request.content {
        RequestContent::Messages(messages) => messages.iter().map(estimate_message).sum(),
        RequestContent::Prompt {
            prompt,
            system_prompt,
        } => {
            estimate_text(prompt)
                + system_prompt
                    .as_deref()
                    .map(estimate_text)
                    .unwrap_or_default()
        }
    };

    TokenEstimate::from_input(input_tokens, request.max_tokens)
}

/// Estimate raw, not-yet-validated content.
///
/// # Errors
/// Returns `InvalidRequest` when the value is neither a string, a message
/// array, nor a prompt object.
pub fn estimate_value(content: &Value, max_tokens: Option<u32>) -> Result<TokenEstimate, RelayError> {
    let input_tokens = match content {
        Value::Null => 0,
        Value::String(text) => estimate_text(text),
        Value::Array(items) => {
            let mut total = 0u32;
            for item in items {
                total += estimate_message_value(item)?;
            }
            total
        }
        Value::Object(map) if map.contains_key("prompt") => {
            let prompt = map
                .get("prompt")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let system = map
                .get("system_prompt")
                .and_then(Value::as_str)
                .unwrap_or_default();
            estimate_text(prompt) + estimate_text(system)
        }
        other => {
            return Err(RelayError::invalid_request(
                format!("unrecognized content shape: {}", value_kind(other)),
                Some("content".to_string()),
            ))
        }
    };

    Ok(TokenEstimate::from_input(input_tokens, max_tokens))
}

/// Estimate raw content, degrading to the documented fallback pair instead
/// of failing. The failure is still surfaced to logs.
#[must_use]
pub fn estimate_value_or_fallback(content: &Value, max_tokens: Option<u32>) -> TokenEstimate {
    match estimate_value(content, max_tokens) {
        Ok(estimate) => estimate,
        Err(error) => {
            warn!(error = %error, "Token estimation failed, using fallback estimate");
            FALLBACK
        }
    }
}

fn estimate_message_value(item: &Value) -> Result<u32, RelayError> {
    let Value::Object(map) = item else {
        return Err(RelayError::invalid_request(
            "message entries must be objects",
            Some("content".to_string()),
        ));
    };

    let mut tokens = MESSAGE_BASE_TOKENS
        + map
            .get("content")
            .and_then(Value::as_str)
            .map(estimate_text)
            .unwrap_or_default();

    if let Some(name) = map.get("name").and_then(Value::as_str) {
        tokens += 1 + estimate_text(name);
    }

    if let Some(Value::Object(tool)) = map.get("tool_call") {
        let name = tool.get("name").and_then(Value::as_str).unwrap_or_default();
        let arguments = tool
            .get("arguments")
            .and_then(Value::as_str)
            .unwrap_or_default();
        tokens += TOOL_BASE_TOKENS + estimate_text(name) + estimate_text(arguments);
    }

    Ok(tokens)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ToolInvocation;
    use serde_json::json;

    #[test]
    fn test_empty_string_yields_zero() {
        assert_eq!(estimate_text(""), 0);
    }

    #[test]
    fn test_hello_world_is_three_tokens() {
        assert_eq!(estimate_text("Hello world"), 3);
    }

    #[test]
    fn test_single_user_message() {
        // 4 base + ceil(5 / 4) content
        let message = ChatMessage::user("Hello");
        assert_eq!(estimate_message(&message), 6);
    }

    #[test]
    fn test_message_with_name() {
        // 4 base + 2 content + 1 presence + 1 name
        let message = ChatMessage::user("Hello").with_name("bob");
        assert_eq!(estimate_message(&message), 8);
    }

    #[test]
    fn test_message_with_tool_call() {
        let message = ChatMessage::assistant("").with_tool_call(ToolInvocation {
            name: "calc".to_string(),
            arguments: "{\"x\":1}".to_string(),
        });
        // 4 base + 0 content + 4 tool base + 1 name + 2 arguments
        assert_eq!(estimate_message(&message), 11);
    }

    #[test]
    fn test_chat_sums_messages() {
        let request = RelayRequest::builder()
            .messages(vec![ChatMessage::user("Hello"), ChatMessage::user("Hello")])
            .build()
            .expect("build");

        let estimate = estimate_request(&request);
        assert_eq!(estimate.input_tokens, 12);
        assert_eq!(estimate.estimated_output_tokens, 18);
    }

    #[test]
    fn test_output_capped_by_max_tokens() {
        let estimate = TokenEstimate::from_input(100, Some(50));
        assert_eq!(estimate.estimated_output_tokens, 50);

        let uncapped = TokenEstimate::from_input(100, None);
        assert_eq!(uncapped.estimated_output_tokens, 150);
    }

    #[test]
    fn test_null_content_yields_zero() {
        let estimate = estimate_value(&Value::Null, None).expect("estimate");
        assert_eq!(estimate.input_tokens, 0);
        assert_eq!(estimate.estimated_output_tokens, 0);
    }

    #[test]
    fn test_unrecognized_content_fails_strict() {
        let result = estimate_value(&json!(42), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_unrecognized_content_falls_back() {
        let estimate = estimate_value_or_fallback(&json!(42), None);
        assert_eq!(estimate.input_tokens, 100);
        assert_eq!(estimate.estimated_output_tokens, 150);
    }

    #[test]
    fn test_value_estimation_matches_typed() {
        let request = RelayRequest::builder()
            .messages(vec![ChatMessage::user("Hello world")])
            .build()
            .expect("build");

        let typed = estimate_request(&request);
        let raw = estimate_value(&json!([{"role": "user", "content": "Hello world"}]), None)
            .expect("estimate");
        assert_eq!(typed, raw);
    }

    #[test]
    fn test_idempotence() {
        let request = RelayRequest::builder()
            .messages(vec![ChatMessage::user("Hello world")])
            .build()
            .expect("build");

        assert_eq!(estimate_request(&request), estimate_request(&request));
    }
}
