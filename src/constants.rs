pub mod network {
    pub const TIMEOUT_SPEC_FETCH_MS: u64 = 30_000;
    pub const TIMEOUT_TOOL_REQUEST_MS: u64 = 120_000;
    pub const TIMEOUT_CONNECTION_MS: u64 = 10_000;
    pub const USER_AGENT: &str = concat!("openapi-mcp/", env!("CARGO_PKG_VERSION"));
}

pub mod retry {
    pub const MAX_ATTEMPTS: usize = 3;
    pub const BASE_DELAY_MS: u64 = 1_000;
    pub const MAX_DELAY_MS: u64 = 5_000;
}

pub mod cache {
    pub const TTL_MS: i64 = 3_600_000;
    pub const DEFAULT_DIR: &str = ".cache";
}

pub mod schema {
    pub const HTTP_METHODS: &[&str] = &[
        "get", "put", "post", "delete", "options", "head", "patch", "trace",
    ];
    pub const MAX_REF_DEPTH: usize = 16;
    pub const MAX_TOOL_NAME_LEN: usize = 64;
}

pub mod limits {
    pub const ERROR_BODY_PREVIEW_BYTES: usize = 2_048;
}

pub mod env {
    pub const DEFAULTS_PREFIX: &str = "DEFAULT_";
    pub const CACHE_DIR: &str = "OPENAPI_MCP_CACHE_DIR";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
}

pub mod protocol {
    pub const VERSION: &str = "2025-06-18";
    pub const SERVER_NAME: &str = "openapi-mcp";
}
