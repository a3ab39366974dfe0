//! The steering context.
//!
//! Steering rules see the request as a JSON tree. The pipeline builds it
//! once after token estimation; rules read and transform it through dotted
//! paths.

use relay_core::{RelayRequest, RequestContent};
use relay_cost::TokenEstimate;
use serde_json::{json, Value};

/// Build the evaluation context for one request.
///
/// Layout:
/// - `request.id`, `request.body.{messages|prompt,system_prompt}`,
///   `request.metadata.*`, `request.constraints.*`
/// - `tokens.input`, `tokens.estimated_output`
/// - `routing.*` and `reject.*` are written by steering actions
#[must_use]
pub fn build_context(request: &RelayRequest, estimate: &TokenEstimate) -> Value {
    let body = match &request.content {
        RequestContent::Messages(messages) => json!({
            "messages": messages,
        }),
        RequestContent::Prompt {
            prompt,
            system_prompt,
        } => json!({
            "prompt": prompt,
            "system_prompt": system_prompt,
        }),
    };

    json!({
        "request": {
            "id": request.request_id,
            "body": body,
            "metadata": request.metadata,
            "constraints": request.constraints,
        },
        "tokens": {
            "input": estimate.input_tokens,
            "estimated_output": estimate.estimated_output_tokens,
        },
    })
}
