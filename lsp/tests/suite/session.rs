//! Session lifecycle: the initialize handshake, request gating and
//! shutdown.

use serde_json::{Value, json};
use tempfile::TempDir;

use crate::common::{Client, FakeFactory, uri};

#[tokio::test]
async fn test_requests_before_initialize_are_rejected() {
    let mut client = Client::start(FakeFactory::default());
    let response = client
        .request(
            "textDocument/hover",
            json!({ "textDocument": { "uri": "file:///a.hbs" }, "position": { "line": 0, "character": 0 } }),
        )
        .await;
    assert_eq!(response["error"]["code"], -32002);

    let response = client
        .request("initialize", json!({ "rootUri": "file:///work/app" }))
        .await;
    let capabilities = &response["result"]["capabilities"];
    assert_eq!(capabilities["textDocumentSync"]["change"], 2);
    assert_eq!(capabilities["hoverProvider"], true);
    assert_eq!(response["result"]["serverInfo"]["name"], "trellis");

    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_second_initialize_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut client = Client::initialized(FakeFactory::default(), dir.path()).await;
    let response = client
        .request("initialize", json!({ "rootUri": uri(dir.path()) }))
        .await;
    assert_eq!(response["error"]["code"], -32600);
    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_unknown_request_is_method_not_found() {
    let dir = TempDir::new().unwrap();
    let mut client = Client::initialized(FakeFactory::default(), dir.path()).await;
    let response = client.request("textDocument/rename", json!({})).await;
    assert_eq!(response["error"]["code"], -32601);
    assert!(
        response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("textDocument/rename")
    );
    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_malformed_params_are_invalid() {
    let dir = TempDir::new().unwrap();
    let mut client = Client::initialized(FakeFactory::default(), dir.path()).await;
    let response = client
        .request("textDocument/hover", json!({ "position": "nowhere" }))
        .await;
    assert_eq!(response["error"]["code"], -32602);
    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_checkers_and_gates_requests() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let checker = factory.checker.clone();
    let mut client = Client::initialized(factory, dir.path()).await;
    let template = dir.path().join("card.hbs");
    client.open(&template, "<p></p>").await;
    client.diagnostics(&template).await;

    let response = client.request("shutdown", Value::Null).await;
    assert_eq!(response["result"], Value::Null);
    assert!(checker.state().shut_down);

    let response = client
        .request("trellis/getIR", json!({ "uri": uri(&template) }))
        .await;
    assert_eq!(response["error"]["code"], -32600);

    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_eof_ends_the_session() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory::default();
    let checker = factory.checker.clone();
    let mut client = Client::initialized(factory, dir.path()).await;
    let template = dir.path().join("card.hbs");
    client.open(&template, "<p></p>").await;
    client.diagnostics(&template).await;

    client.disconnect().await.unwrap();
    assert!(checker.state().shut_down);
}
