use openapi_mcp::app::App;
use openapi_mcp::config::BridgeConfig;
use openapi_mcp::mcp::server::McpServer;
use openapi_mcp::services::logger::{LogLevel, Logger};
use openapi_mcp::services::spec_document::SpecDocument;
use openapi_mcp::services::spec_loader::SpecSource;
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;

fn server() -> McpServer {
    let spec = json!({
        "openapi": "3.0.3",
        "info": {"title": "Echo API", "version": "1"},
        "servers": [{"url": "http://127.0.0.1:9"}],
        "paths": {
            "/echo": {"post": {
                "summary": "Echo|Shout",
                "description": "Echo the input|Echo it louder",
                "requestBody": {"content": {"application/json": {"schema": {
                    "type": "object",
                    "properties": {"message": {"type": "string"}},
                    "required": ["message"]
                }}}}
            }}
        }
    });
    let document = SpecDocument::from_value(spec.clone()).expect("valid spec");
    let config = BridgeConfig::new(SpecSource::Document(spec));
    let app = App::from_document(Logger::with_level("test", LogLevel::Error), config, document)
        .expect("app");
    McpServer::new(app)
}

async fn call(server: &McpServer, request: Value) -> Value {
    let response = server
        .handle_line(&request.to_string())
        .await
        .expect("response");
    serde_json::from_str(&response.to_line()).expect("json")
}

#[tokio::test]
async fn initialize_reports_server_info() {
    let response = call(
        &server(),
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
    )
    .await;
    assert_eq!(response["id"], json!(1));
    assert_eq!(response["result"]["protocolVersion"], json!("2025-06-18"));
    assert_eq!(response["result"]["serverInfo"]["name"], json!("openapi-mcp"));
    assert_eq!(response["result"]["serverInfo"]["title"], json!("Echo API"));
    assert!(response["result"]["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn tools_list_exposes_every_variant() {
    let response = call(
        &server(),
        json!({"jsonrpc": "2.0", "id": "list", "method": "tools/list"}),
    )
    .await;
    let tools = response["result"]["tools"].as_array().expect("tools");
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0]["name"], json!("Echo"));
    assert_eq!(tools[1]["name"], json!("Shout"));
    assert_eq!(tools[1]["description"], json!("Echo it louder"));
    assert_eq!(
        tools[0]["inputSchema"],
        json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": ["message"]
        })
    );
}

#[tokio::test]
async fn tool_errors_name_the_tool() {
    let response = call(
        &server(),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "missing", "arguments": {}}}),
    )
    .await;
    assert_eq!(response["error"]["code"], json!(-32600));
    let message = response["error"]["message"].as_str().expect("message");
    assert!(message.contains("tool: missing"));
    assert!(message.contains("kind: tool_not_found"));

    let response = call(
        &server(),
        json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {}}),
    )
    .await;
    assert_eq!(response["error"]["code"], json!(-32602));
}

#[tokio::test]
async fn protocol_errors_and_notifications() {
    let server = server();
    let parse = server.handle_line("{not json").await.expect("response");
    let parse: Value = serde_json::from_str(&parse.to_line()).expect("json");
    assert_eq!(parse["error"]["code"], json!(-32700));
    assert_eq!(parse["id"], Value::Null);

    let unknown = call(&server, json!({"jsonrpc": "2.0", "id": 5, "method": "resources/list"})).await;
    assert_eq!(unknown["error"]["code"], json!(-32601));

    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await
        .is_none());
    assert!(server.handle_line("   ").await.is_none());
}

#[tokio::test]
async fn serve_answers_each_request_line() {
    let input = concat!(
        "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n",
        "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
        "\n",
        "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n"
    );
    let (client, output) = tokio::io::duplex(64 * 1024);
    server()
        .serve(input.as_bytes(), output)
        .await
        .expect("serve");

    let mut client = client;
    let mut written = String::new();
    client.read_to_string(&mut written).await.expect("read");
    let mut ids: Vec<i64> = written
        .lines()
        .map(|line| {
            let value: Value = serde_json::from_str(line).expect("json line");
            value["id"].as_i64().expect("id")
        })
        .collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2]);
}
