use crate::constants::env as env_constants;
use crate::errors::ToolError;
use crate::services::spec_loader::SpecSource;
use crate::utils::paths::resolve_cache_dir;
use clap::Parser;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(
    name = "openapi-mcp",
    version,
    about = "Serve the operations of an OpenAPI document as MCP tools over stdio"
)]
pub struct Cli {
    /// Path or http(s) URL of the OpenAPI document.
    #[arg(long, env = "OPENAPI_SPEC")]
    pub spec: String,

    /// Base URL for outgoing calls. Defaults to the document's first server.
    #[arg(long, env = "OPENAPI_BASE_URL")]
    pub base_url: Option<String>,

    /// Static request header, `Name: value`. Repeatable.
    #[arg(long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// Static request headers as a JSON object.
    #[arg(long, env = "OPENAPI_HEADERS")]
    pub headers_json: Option<String>,

    #[arg(long, env = "OPENAPI_MCP_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Prefix prepended to every tool name.
    #[arg(long, env = "OPENAPI_TOOL_PREFIX")]
    pub tool_prefix: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid header `{0}`: expected `Name: value`")]
    InvalidHeader(String),
    #[error("OPENAPI_HEADERS must be a JSON object of strings: {0}")]
    InvalidHeadersJson(String),
    #[error("invalid base URL `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl From<ConfigError> for ToolError {
    fn from(err: ConfigError) -> Self {
        ToolError::invalid_params(err.to_string())
    }
}

/// Request-body defaults taken from `DEFAULT_*` environment variables.
///
/// `DEFAULT_model=gpt-4o` becomes `{"model": "gpt-4o"}`. Values starting with
/// `{` or `[` are parsed as JSON when they parse; everything else stays a string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultsMap(Map<String, Value>);

impl DefaultsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map = Map::new();
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(env_constants::DEFAULTS_PREFIX) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            map.insert(name.to_string(), Self::parse_value(value.as_ref()));
        }
        Self(map)
    }

    pub fn parse_value(raw: &str) -> Value {
        let trimmed = raw.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
                return parsed;
            }
        }
        Value::String(raw.to_string())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Fully resolved settings for one server process.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub spec_source: SpecSource,
    pub base_url: Option<String>,
    pub headers: IndexMap<String, String>,
    pub cache_dir: PathBuf,
    pub tool_prefix: Option<String>,
    pub defaults: DefaultsMap,
}

impl BridgeConfig {
    pub fn new(spec_source: SpecSource) -> Self {
        Self {
            spec_source,
            base_url: None,
            headers: IndexMap::new(),
            cache_dir: resolve_cache_dir(None),
            tool_prefix: None,
            defaults: DefaultsMap::new(),
        }
    }

    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let mut headers = IndexMap::new();
        if let Some(raw) = cli.headers_json.as_deref().filter(|raw| !raw.trim().is_empty()) {
            headers.extend(parse_headers_json(raw)?);
        }
        for raw in &cli.headers {
            let (name, value) = parse_header_line(raw)?;
            headers.insert(name, value);
        }
        let base_url = cli
            .base_url
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());
        if let Some(url) = &base_url {
            url::Url::parse(url).map_err(|err| ConfigError::InvalidBaseUrl {
                url: url.clone(),
                reason: err.to_string(),
            })?;
        }
        Ok(Self {
            spec_source: SpecSource::parse(&cli.spec),
            base_url,
            headers,
            cache_dir: resolve_cache_dir(cli.cache_dir.as_deref()),
            tool_prefix: cli.tool_prefix,
            defaults: DefaultsMap::from_env(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn with_tool_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tool_prefix = Some(prefix.into());
        self
    }

    pub fn with_defaults(mut self, defaults: DefaultsMap) -> Self {
        self.defaults = defaults;
        self
    }
}

fn parse_header_line(raw: &str) -> Result<(String, String), ConfigError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| ConfigError::InvalidHeader(raw.to_string()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ConfigError::InvalidHeader(raw.to_string()));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_headers_json(raw: &str) -> Result<IndexMap<String, String>, ConfigError> {
    let parsed: Value = serde_json::from_str(raw)
        .map_err(|err| ConfigError::InvalidHeadersJson(err.to_string()))?;
    let Value::Object(map) = parsed else {
        return Err(ConfigError::InvalidHeadersJson("not an object".to_string()));
    };
    map.into_iter()
        .map(|(name, value)| match value {
            Value::String(text) => Ok((name, text)),
            Value::Number(_) | Value::Bool(_) => Ok((name, value.to_string())),
            _ => Err(ConfigError::InvalidHeadersJson(format!(
                "header `{}` must be a string",
                name
            ))),
        })
        .collect()
}
