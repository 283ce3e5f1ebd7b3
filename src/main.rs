use clap::Parser;
use openapi_mcp::config::{BridgeConfig, Cli};

#[tokio::main]
async fn main() {
    let config = match BridgeConfig::from_cli(Cli::parse()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("openapi-mcp: {}", err);
            std::process::exit(2);
        }
    };
    if let Err(err) = openapi_mcp::mcp::server::run_stdio(config).await {
        eprintln!("openapi-mcp: {}", err);
        std::process::exit(1);
    }
}
