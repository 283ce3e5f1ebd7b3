use crate::config::DefaultsMap;
use crate::constants::{limits, network};
use crate::errors::ToolError;
use crate::services::logger::Logger;
use crate::services::request_reconstructor;
use crate::services::stream_aggregator::aggregate_message;
use crate::services::tool_definition::{ParameterLocation, ToolDefinition, ToolRegistry};
use crate::services::tool_result::ToolCallResult;
use crate::utils::text::truncate_utf8_prefix;
use futures::StreamExt;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

static PATH_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}/]+)\}").expect("path placeholder regex"));

const JSON_CONTENT_TYPE: &str = "application/json";
const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// A fully resolved outgoing call, before any I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl PreparedRequest {
    pub fn wants_stream(&self) -> bool {
        self.body
            .as_ref()
            .and_then(|body| body.get("stream"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Turns `tools/call` invocations into HTTP requests against the described API.
pub struct ToolExecutor {
    logger: Logger,
    registry: Arc<ToolRegistry>,
    client: Client,
    base_url: String,
    headers: IndexMap<String, String>,
    defaults: DefaultsMap,
}

impl ToolExecutor {
    pub fn new(
        logger: Logger,
        registry: Arc<ToolRegistry>,
        base_url: impl Into<String>,
        headers: IndexMap<String, String>,
        defaults: DefaultsMap,
    ) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(network::TIMEOUT_TOOL_REQUEST_MS))
            .connect_timeout(Duration::from_millis(network::TIMEOUT_CONNECTION_MS))
            .user_agent(network::USER_AGENT)
            .build()
            .map_err(|err| ToolError::internal(format!("Failed to build HTTP client: {}", err)))?;
        Ok(Self {
            logger: logger.child("executor"),
            registry,
            client,
            base_url: base_url.into(),
            headers,
            defaults,
        })
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn list_tools(&self) -> Vec<&ToolDefinition> {
        self.registry.list().collect()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<ToolCallResult, ToolError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::tool_not_found(name))?;
        let args = match args {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(ToolError::invalid_params(format!(
                    "Tool arguments must be an object, got {}",
                    json_kind(&other)
                )))
            }
        };
        let prepared = self.prepare(tool, &args)?;
        self.logger.info(
            "Calling tool",
            Some(&serde_json::json!({
                "tool": name,
                "method": prepared.method.as_str(),
                "path": tool.metadata.original_path,
            })),
        );
        self.send(name, prepared).await
    }

    /// Resolves path, header, query and body values for one call.
    pub fn prepare(
        &self,
        tool: &ToolDefinition,
        args: &Map<String, Value>,
    ) -> Result<PreparedRequest, ToolError> {
        let metadata = &tool.metadata;
        let method = Method::from_bytes(metadata.http_method.as_bytes()).map_err(|_| {
            ToolError::internal(format!("Unsupported HTTP method {}", metadata.http_method))
        })?;
        let mut consumed: HashSet<&str> = HashSet::new();

        let path = substitute_path(&metadata.original_path, args, &mut consumed)?;
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);

        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        headers.push(("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()));
        for param in metadata.parameters_in(ParameterLocation::Header) {
            consumed.insert(param.name.as_str());
            match args.get(&param.name) {
                Some(value) if !value.is_null() => {
                    headers.push((param.name.clone(), scalar_text(value)))
                }
                _ if param.required => return Err(missing_parameter("header", &param.name)),
                _ => {}
            }
        }
        let cookies: Vec<String> = metadata
            .parameters_in(ParameterLocation::Cookie)
            .filter_map(|param| {
                consumed.insert(param.name.as_str());
                args.get(&param.name)
                    .filter(|value| !value.is_null())
                    .map(|value| format!("{}={}", param.name, scalar_text(value)))
            })
            .collect();
        if !cookies.is_empty() {
            headers.push(("Cookie".to_string(), cookies.join("; ")));
        }

        let mut query = Vec::new();
        if metadata.sends_query_only() {
            for (key, value) in args {
                if !consumed.contains(key.as_str()) {
                    push_query_pairs(&mut query, key, value);
                }
            }
            return Ok(PreparedRequest {
                method,
                url,
                headers,
                query,
                body: None,
            });
        }

        for param in metadata.parameters_in(ParameterLocation::Query) {
            consumed.insert(param.name.as_str());
            if let Some(value) = args.get(&param.name) {
                push_query_pairs(&mut query, &param.name, value);
            }
        }
        let remaining: Map<String, Value> = args
            .iter()
            .filter(|(key, _)| !consumed.contains(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let body = request_reconstructor::build(&remaining, tool, &self.defaults);
        Ok(PreparedRequest {
            method,
            url,
            headers,
            query,
            body: Some(body),
        })
    }

    async fn send(&self, tool: &str, prepared: PreparedRequest) -> Result<ToolCallResult, ToolError> {
        let started = Instant::now();
        let wants_stream = prepared.wants_stream();
        let mut request = self.client.request(prepared.method.clone(), &prepared.url);
        if !prepared.query.is_empty() {
            request = request.query(&prepared.query);
        }
        for (name, value) in &prepared.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &prepared.body {
            let encoded = serde_json::to_vec(body)
                .map_err(|err| encoding_failure("request body", err))?;
            request = request.body(encoded);
        }

        let response = request.send().await.map_err(|err| {
            ToolError::execution_failure(format!("Request to {} failed: {}", prepared.url, err))
                .with_retryable(err.is_timeout() || err.is_connect())
                .with_details(serde_json::json!({"url": prepared.url}))
        })?;
        let status = response.status();
        let streamed = wants_stream
            || response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.contains(EVENT_STREAM_CONTENT_TYPE))
                .unwrap_or(false);
        let bytes = read_body(response, streamed).await?;

        self.logger.debug(
            "Tool call finished",
            Some(&serde_json::json!({
                "tool": tool,
                "status": status.as_u16(),
                "bytes": bytes.len(),
                "streamed": streamed,
                "duration_ms": started.elapsed().as_millis(),
            })),
        );

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            return Err(ToolError::execution_failure(format!(
                "{} {} returned HTTP {}",
                prepared.method, prepared.url, status
            ))
            .with_retryable(status.is_server_error() || status.as_u16() == 429)
            .with_details(serde_json::json!({
                "status": status.as_u16(),
                "url": prepared.url,
                "body": truncate_utf8_prefix(&text, limits::ERROR_BODY_PREVIEW_BYTES),
            })));
        }

        if streamed {
            let text = String::from_utf8(bytes).map_err(|err| {
                ToolError::stream_processing_failure(format!(
                    "Streamed response is not valid UTF-8: {}",
                    err
                ))
            })?;
            return Ok(aggregate_message(&text)?.into());
        }

        let text = String::from_utf8_lossy(&bytes).into_owned();
        let rendered = match serde_json::from_str::<Value>(&text) {
            Ok(parsed) => serde_json::to_string_pretty(&parsed)
                .map_err(|err| encoding_failure("response body", err))?,
            Err(_) => text,
        };
        Ok(ToolCallResult::single_text(rendered))
    }
}

/// Serializing our own values is not a parse failure of upstream input.
fn encoding_failure(what: &str, err: serde_json::Error) -> ToolError {
    ToolError::internal(format!("Failed to encode {}: {}", what, err))
}

/// Collects the body chunk by chunk. A transport error mid-stream fails the
/// whole call.
async fn read_body(response: reqwest::Response, streamed: bool) -> Result<Vec<u8>, ToolError> {
    let mut stream = response.bytes_stream();
    let mut buffer = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| {
            let message = format!("Failed to read response body: {}", err);
            if streamed {
                ToolError::stream_processing_failure(message)
            } else {
                ToolError::execution_failure(message)
            }
        })?;
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer)
}

fn substitute_path<'a>(
    template: &str,
    args: &'a Map<String, Value>,
    consumed: &mut HashSet<&'a str>,
) -> Result<String, ToolError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for captures in PATH_PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        let (key, value) = args
            .get_key_value(name.as_str())
            .filter(|(_, value)| !value.is_null())
            .ok_or_else(|| missing_parameter("path", name.as_str()))?;
        consumed.insert(key.as_str());
        out.push_str(&encode_path_segment(&scalar_text(value)));
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

fn push_query_pairs(query: &mut Vec<(String, String)>, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items.iter().filter(|item| !item.is_null()) {
                query.push((key.to_string(), scalar_text(item)));
            }
        }
        other => query.push((key.to_string(), scalar_text(other))),
    }
}

/// Strings go out bare; everything else as its JSON text.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn encode_path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn missing_parameter(location: &str, name: &str) -> ToolError {
    ToolError::invalid_params(format!("Missing required {} parameter `{}`", location, name))
        .with_details(serde_json::json!({"parameter": name, "in": location}))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ToolErrorKind;
    use crate::services::schema_deriver::SchemaDeriver;
    use crate::services::spec_document::SpecDocument;
    use serde_json::json;

    fn executor(spec: Value, defaults: DefaultsMap) -> ToolExecutor {
        let logger = Logger::with_level("test", crate::services::logger::LogLevel::Error);
        let document = SpecDocument::from_value(spec).expect("valid spec");
        let registry = SchemaDeriver::new(logger.clone()).derive(&document);
        let mut headers = IndexMap::new();
        headers.insert("Authorization".to_string(), "Bearer token".to_string());
        ToolExecutor::new(
            logger,
            Arc::new(registry),
            "https://api.example.com/v1/",
            headers,
            defaults,
        )
        .expect("executor")
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    fn pets_spec() -> Value {
        json!({
            "paths": {
                "/pets/{petId}": {
                    "parameters": [{"name": "petId", "in": "path", "required": true, "schema": {"type": "string"}}],
                    "get": {
                        "operationId": "getPet",
                        "parameters": [
                            {"name": "X-Request-Id", "in": "header", "schema": {"type": "string"}},
                            {"name": "session", "in": "cookie", "schema": {"type": "string"}}
                        ]
                    },
                    "patch": {
                        "operationId": "updatePet",
                        "parameters": [{"name": "dryRun", "in": "query", "schema": {"type": "boolean"}}],
                        "requestBody": {"content": {"application/json": {"schema": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "owner": {"type": "object", "properties": {"email": {"type": "string"}}}
                            }
                        }}}}
                    }
                }
            }
        })
    }

    #[test]
    fn get_substitutes_path_and_routes_rest_to_query() {
        let executor = executor(pets_spec(), DefaultsMap::new());
        let tool = executor.registry().get("getPet").expect("tool");
        let prepared = executor
            .prepare(
                tool,
                &args(json!({
                    "petId": "a b/c",
                    "X-Request-Id": "req-1",
                    "session": "s1",
                    "tags": ["x", "y"],
                    "filter": {"kind": "cat"},
                    "skip": null
                })),
            )
            .expect("prepare");
        assert_eq!(prepared.method, Method::GET);
        assert_eq!(prepared.url, "https://api.example.com/v1/pets/a%20b%2Fc");
        assert!(prepared.body.is_none());
        assert_eq!(
            prepared.query,
            vec![
                ("tags".to_string(), "x".to_string()),
                ("tags".to_string(), "y".to_string()),
                ("filter".to_string(), r#"{"kind":"cat"}"#.to_string()),
            ]
        );
        assert!(prepared
            .headers
            .contains(&("X-Request-Id".to_string(), "req-1".to_string())));
        assert!(prepared
            .headers
            .contains(&("Cookie".to_string(), "session=s1".to_string())));
        assert!(prepared
            .headers
            .contains(&("Content-Type".to_string(), "application/json".to_string())));
    }

    #[test]
    fn body_methods_split_declared_query_from_body() {
        let mut defaults = DefaultsMap::new();
        defaults.insert("source", json!("env"));
        let executor = executor(pets_spec(), defaults);
        let tool = executor.registry().get("updatePet").expect("tool");
        let prepared = executor
            .prepare(
                tool,
                &args(json!({"petId": 7, "dryRun": true, "name": "Rex", "owner_email": "a@b.c"})),
            )
            .expect("prepare");
        assert_eq!(prepared.method, Method::PATCH);
        assert_eq!(prepared.url, "https://api.example.com/v1/pets/7");
        assert_eq!(prepared.query, vec![("dryRun".to_string(), "true".to_string())]);
        assert_eq!(
            prepared.body,
            Some(json!({"name": "Rex", "owner": {"email": "a@b.c"}, "source": "env"}))
        );
    }

    #[test]
    fn missing_path_argument_is_invalid_params() {
        let executor = executor(pets_spec(), DefaultsMap::new());
        let tool = executor.registry().get("getPet").expect("tool");
        let err = executor.prepare(tool, &Map::new()).unwrap_err();
        assert!(err.is(ToolErrorKind::InvalidParams));
        assert!(err.message.contains("petId"));
    }

    #[test]
    fn stream_flag_in_body_requests_aggregation() {
        let prepared = PreparedRequest {
            method: Method::POST,
            url: "http://localhost/chat".to_string(),
            headers: Vec::new(),
            query: Vec::new(),
            body: Some(json!({"stream": true})),
        };
        assert!(prepared.wants_stream());
    }

    #[test]
    fn encodes_reserved_path_characters() {
        assert_eq!(encode_path_segment("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(encode_path_segment("x?y#z"), "x%3Fy%23z");
    }

    #[test]
    fn local_serialization_errors_are_internal() {
        let err = serde_json::from_str::<Value>("{").unwrap_err();
        let mapped = encoding_failure("request body", err);
        assert!(mapped.is(ToolErrorKind::Internal));
        assert!(!mapped.is(ToolErrorKind::ParseFailure));
        assert!(mapped.message.starts_with("Failed to encode request body"));
    }
}
