use crate::errors::{ToolError, ToolErrorKind};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum ErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
    ServerError = -32000,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct McpError {
    pub code: ErrorCode,
    pub message: String,
}

impl McpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Renders a tool failure as a protocol error that names the tool and the cause.
    pub fn from_tool_error(tool: &str, error: &ToolError) -> Self {
        let mut lines = vec![
            "ToolCallError".to_string(),
            format!("tool: {}", tool),
            format!("kind: {}", error.kind.as_str()),
            format!("code: {}", error.code),
            format!("retryable: {}", error.retryable),
            format!("message: {}", error.message),
        ];
        if let Some(hint) = &error.hint {
            lines.push(format!("hint: {}", hint));
        }
        if let Some(details) = &error.details {
            lines.push(format!("details: {}", details));
        }
        let message = lines.join("\n");

        match error.kind {
            ToolErrorKind::InvalidParams => McpError::new(ErrorCode::InvalidParams, message),
            ToolErrorKind::ToolNotFound => McpError::new(ErrorCode::InvalidRequest, message),
            ToolErrorKind::ExecutionFailure | ToolErrorKind::StreamProcessingFailure => {
                McpError::new(ErrorCode::ServerError, message)
            }
            _ => McpError::new(ErrorCode::InternalError, message),
        }
    }
}

impl fmt::Display for McpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for McpError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failure_message_names_tool_and_cause() {
        let err = ToolError::execution_failure("upstream returned 502").with_hint("retry later");
        let mapped = McpError::from_tool_error("createPet", &err);
        assert_eq!(mapped.code, ErrorCode::ServerError);
        assert!(mapped.message.contains("tool: createPet"));
        assert!(mapped.message.contains("kind: execution_failure"));
        assert!(mapped.message.contains("message: upstream returned 502"));
        assert!(mapped.message.contains("hint: retry later"));
    }

    #[test]
    fn unknown_tool_maps_to_invalid_request() {
        let mapped = McpError::from_tool_error("nope", &ToolError::tool_not_found("nope"));
        assert_eq!(mapped.code.as_i32(), -32600);
    }
}
