use crate::config::BridgeConfig;
use crate::constants::protocol::SERVER_NAME;
use crate::errors::ToolError;
use crate::services::logger::Logger;
use crate::services::schema_deriver::SchemaDeriver;
use crate::services::spec_cache::SpecCache;
use crate::services::spec_document::SpecDocument;
use crate::services::spec_loader::{SpecLoader, SpecSource};
use crate::services::tool_executor::ToolExecutor;
use std::sync::Arc;

/// Everything a running server needs, built once at startup.
pub struct App {
    pub logger: Logger,
    pub title: Option<String>,
    pub executor: ToolExecutor,
}

impl App {
    /// Loads the document, derives the registry and wires the executor.
    /// Any failure here aborts startup.
    pub async fn initialize(config: BridgeConfig) -> Result<Self, ToolError> {
        let logger = Logger::new(SERVER_NAME);
        let cache = SpecCache::new(logger.clone(), config.cache_dir.clone());
        let loader = SpecLoader::new(logger.clone(), cache)?;
        let document = loader.load(config.spec_source.clone()).await?;
        Self::from_document(logger, config, document)
    }

    pub fn from_document(
        logger: Logger,
        config: BridgeConfig,
        document: SpecDocument,
    ) -> Result<Self, ToolError> {
        let base_url = resolve_base_url(config.base_url.as_deref(), &document, &config.spec_source)?;
        let registry = SchemaDeriver::new(logger.clone())
            .with_prefix(config.tool_prefix.clone())
            .derive(&document);
        if registry.is_empty() {
            logger.warn(
                "No operations found, serving an empty tool list",
                Some(&serde_json::json!({"source": config.spec_source.describe()})),
            );
        }
        logger.info(
            "Bridge ready",
            Some(&serde_json::json!({
                "base_url": base_url,
                "tools": registry.len(),
                "defaults": config.defaults.as_map().len(),
            })),
        );
        let executor = ToolExecutor::new(
            logger.clone(),
            Arc::new(registry),
            base_url,
            config.headers,
            config.defaults,
        )?;
        Ok(Self {
            logger,
            title: document.title().map(str::to_string),
            executor,
        })
    }
}

/// Explicit base URL first, then the document's first server. A relative
/// server URL is resolved against the URL the document came from.
pub fn resolve_base_url(
    explicit: Option<&str>,
    document: &SpecDocument,
    source: &SpecSource,
) -> Result<String, ToolError> {
    if let Some(url) = explicit.map(str::trim).filter(|url| !url.is_empty()) {
        return Ok(url.to_string());
    }
    let missing = || {
        ToolError::invalid_params("No base URL for outgoing requests")
            .with_hint("Pass --base-url or declare an absolute URL under `servers` in the document")
    };
    let server = document.servers_url().ok_or_else(missing)?;
    if let Ok(url) = url::Url::parse(server) {
        return Ok(url.to_string());
    }
    match source {
        SpecSource::Url(origin) => url::Url::parse(origin)
            .and_then(|origin| origin.join(server))
            .map(|url| url.to_string())
            .map_err(|err| {
                ToolError::invalid_spec(format!("Cannot resolve server URL `{}`: {}", server, err))
            }),
        _ => Err(missing().with_details(serde_json::json!({"server": server}))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(servers: serde_json::Value) -> SpecDocument {
        SpecDocument::from_value(json!({"paths": {}, "servers": servers})).expect("valid")
    }

    #[test]
    fn explicit_base_url_wins() {
        let doc = document(json!([{"url": "https://spec.example.com"}]));
        let url = resolve_base_url(Some("http://localhost:8080"), &doc, &SpecSource::Document(json!({})))
            .expect("url");
        assert_eq!(url, "http://localhost:8080");
    }

    #[test]
    fn relative_server_joins_document_url() {
        let doc = document(json!([{"url": "/v2"}]));
        let source = SpecSource::Url("https://api.example.com/docs/openapi.json".to_string());
        assert_eq!(
            resolve_base_url(None, &doc, &source).expect("url"),
            "https://api.example.com/v2"
        );
    }

    #[test]
    fn relative_server_without_origin_is_an_error() {
        let doc = document(json!([{"url": "/v2"}]));
        let source = SpecSource::Path("openapi.json".into());
        assert!(resolve_base_url(None, &doc, &source).is_err());
    }
}
