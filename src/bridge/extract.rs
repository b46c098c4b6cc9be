//! Result normalization.
//!
//! Tool servers wrap their payload inconsistently. The response is classified
//! into one [`ResultShape`] by a pure function, then unwrapped.

/// Known payload shapes, in precedence order.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultShape {
    /// `result.result`: doubly-wrapped payload.
    ///
    /// Unverified against real MCP servers.
    Nested(serde_json::Value),
    /// `result.content[0].text`: MCP text content block.
    ContentArrayText(serde_json::Value),
    /// `result.content` in any other shape.
    ContentRaw(serde_json::Value),
    /// No known wrapper: the whole response.
    Passthrough(serde_json::Value),
}

impl ResultShape {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            ResultShape::Nested(_) => "nested",
            ResultShape::ContentArrayText(_) => "content_array_text",
            ResultShape::ContentRaw(_) => "content_raw",
            ResultShape::Passthrough(_) => "passthrough",
        }
    }

    /// The caller-facing value.
    pub fn into_value(self) -> serde_json::Value {
        match self {
            ResultShape::Nested(v)
            | ResultShape::ContentArrayText(v)
            | ResultShape::ContentRaw(v)
            | ResultShape::Passthrough(v) => v,
        }
    }
}

/// Classify a parsed JSON-RPC response by payload shape.
pub fn classify(response: &serde_json::Value) -> ResultShape {
    let Some(result) = response.get("result") else {
        return ResultShape::Passthrough(response.clone());
    };

    if let Some(nested) = result.get("result") {
        return ResultShape::Nested(nested.clone());
    }

    match result.get("content") {
        Some(serde_json::Value::Array(blocks)) => {
            match blocks.first().and_then(|block| block.get("text")) {
                Some(text) => ResultShape::ContentArrayText(text.clone()),
                None => ResultShape::ContentRaw(serde_json::Value::Array(blocks.clone())),
            }
        }
        Some(content) => ResultShape::ContentRaw(content.clone()),
        None => ResultShape::Passthrough(response.clone()),
    }
}

/// Extract the caller-facing value from a parsed response.
pub fn extract(response: &serde_json::Value) -> serde_json::Value {
    classify(response).into_value()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
