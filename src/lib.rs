pub mod app;
pub mod config;
pub mod constants;
pub mod errors;

pub mod mcp {
    pub mod protocol;
    pub mod server;
}

pub mod services {
    pub mod logger;
    pub mod request_reconstructor;
    pub mod schema;
    pub mod schema_deriver;
    pub mod spec_cache;
    pub mod spec_document;
    pub mod spec_loader;
    pub mod stream_aggregator;
    pub mod tool_definition;
    pub mod tool_executor;
    pub mod tool_result;
}

pub mod utils {
    pub mod fs_atomic;
    pub mod merge;
    pub mod paths;
    pub mod text;
}
