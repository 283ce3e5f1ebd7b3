use crate::errors::ToolError;
use crate::services::tool_result::{ContentBlock, ToolCallResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static TEXT_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""text"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("text field regex")
});
static CONTENT_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""content"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("content field regex")
});

const DONE_SENTINEL: &str = "[DONE]";

/// The whole streamed response folded into one assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedMessage {
    pub role: &'static str,
    pub content: Vec<ContentBlock>,
}

impl AggregatedMessage {
    pub fn text(&self) -> String {
        self.content.iter().map(|block| block.text.as_str()).collect()
    }
}

impl From<AggregatedMessage> for ToolCallResult {
    fn from(message: AggregatedMessage) -> Self {
        ToolCallResult::from_blocks(message.content)
    }
}

/// Extracts the ordered text fragments of a streamed body.
///
/// Quoted `"text"` fields win over quoted `"content"` fields; with neither,
/// the body is split into blank-line separated events. The whole body is
/// consumed before anything is returned and any undecodable fragment fails
/// the aggregation.
pub fn aggregate(raw: &str) -> Result<Vec<String>, ToolError> {
    if TEXT_FIELD.is_match(raw) {
        return collect_fields(&TEXT_FIELD, raw);
    }
    if CONTENT_FIELD.is_match(raw) {
        return collect_fields(&CONTENT_FIELD, raw);
    }
    let normalized = raw.replace("\r\n", "\n");
    Ok(normalized
        .split("\n\n")
        .filter_map(|segment| {
            let trimmed = strip_event_prefix(segment.trim()).trim();
            if trimmed.is_empty() || trimmed == DONE_SENTINEL {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect())
}

pub fn aggregate_message(raw: &str) -> Result<AggregatedMessage, ToolError> {
    let content = aggregate(raw)?
        .into_iter()
        .map(ContentBlock::text)
        .collect();
    Ok(AggregatedMessage {
        role: "assistant",
        content,
    })
}

/// Decodes field bodies. Fragments keep their own whitespace; only
/// whitespace-only fragments are dropped.
fn collect_fields(pattern: &Regex, raw: &str) -> Result<Vec<String>, ToolError> {
    let mut out = Vec::new();
    for (index, captures) in pattern.captures_iter(raw).enumerate() {
        let Some(escaped) = captures.get(1) else {
            continue;
        };
        let decoded: String = serde_json::from_str(&format!("\"{}\"", escaped.as_str()))
            .map_err(|err| {
                ToolError::stream_processing_failure(format!(
                    "Could not decode stream fragment {}: {}",
                    index, err
                ))
            })?;
        let fragment = strip_event_prefix(&decoded);
        if fragment.trim().is_empty() {
            continue;
        }
        out.push(fragment.to_string());
    }
    Ok(out)
}

fn strip_event_prefix(chunk: &str) -> &str {
    chunk.strip_prefix("data:").unwrap_or(chunk)
}
