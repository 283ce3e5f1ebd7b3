use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    NotFound,
    InvalidSpec,
    FetchFailure,
    ParseFailure,
    ToolNotFound,
    ExecutionFailure,
    StreamProcessingFailure,
    InvalidParams,
    Internal,
}

impl ToolErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolErrorKind::NotFound => "not_found",
            ToolErrorKind::InvalidSpec => "invalid_spec",
            ToolErrorKind::FetchFailure => "fetch_failure",
            ToolErrorKind::ParseFailure => "parse_failure",
            ToolErrorKind::ToolNotFound => "tool_not_found",
            ToolErrorKind::ExecutionFailure => "execution_failure",
            ToolErrorKind::StreamProcessingFailure => "stream_processing_failure",
            ToolErrorKind::InvalidParams => "invalid_params",
            ToolErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub retryable: bool,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
            retryable: matches!(kind, ToolErrorKind::FetchFailure),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound, "NOT_FOUND", message)
    }

    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidSpec, "INVALID_SPEC", message)
    }

    pub fn fetch_failure(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::FetchFailure, "FETCH_FAILURE", message)
    }

    pub fn parse_failure(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::ParseFailure, "PARSE_FAILURE", message)
    }

    pub fn tool_not_found(name: &str) -> Self {
        Self::new(
            ToolErrorKind::ToolNotFound,
            "TOOL_NOT_FOUND",
            format!("Unknown tool: {}", name),
        )
    }

    pub fn execution_failure(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::ExecutionFailure, "EXECUTION_FAILURE", message)
    }

    pub fn stream_processing_failure(message: impl Into<String>) -> Self {
        Self::new(
            ToolErrorKind::StreamProcessingFailure,
            "STREAM_PROCESSING_FAILURE",
            message,
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidParams, "INVALID_PARAMS", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Internal, "INTERNAL", message)
    }

    pub fn is(&self, kind: ToolErrorKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl Error for ToolError {}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            return ToolError::not_found(err.to_string());
        }
        ToolError::internal(err.to_string())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        ToolError::parse_failure(err.to_string())
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ToolError::fetch_failure("HTTP request timed out");
        }
        ToolError::fetch_failure(err.to_string())
    }
}
