//! Document sync, diagnostics publishing and position queries through the
//! editor protocol.

use serde_json::{Value, json};
use tempfile::TempDir;

use crate::common::{Client, FakeFactory, uri};

const UNKNOWN_GLOBAL: &str = "Element implicitly has an 'any' type because expression of type \
                              '\"Foo\"' can't be used to index type 'Globals'.";

fn factory_reporting_unknown_foo() -> FakeFactory {
    let factory = FakeFactory::default();
    factory
        .checker
        .report("__reg.Globals[\"Foo\"]", 7053, UNKNOWN_GLOBAL);
    factory
}

// ── Diagnostics ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_open_publishes_augmented_diagnostics() {
    let dir = TempDir::new().unwrap();
    let factory = factory_reporting_unknown_foo();
    let created = factory.created.clone();
    let mut client = Client::initialized(factory, dir.path()).await;
    let template = dir.path().join("components/card.hbs");

    client.open(&template, "<Foo />").await;
    let diagnostics = client.diagnostics(&template).await;

    assert_eq!(diagnostics.len(), 1);
    let diagnostic = &diagnostics[0];
    assert!(
        diagnostic["message"]
            .as_str()
            .unwrap()
            .contains("Unknown name 'Foo'")
    );
    assert_eq!(diagnostic["source"], "trellis:ts(7053)");
    assert_eq!(diagnostic["severity"], 1);
    assert_eq!(diagnostic["range"]["start"]["line"], 0);
    assert_eq!(*created.lock().unwrap(), vec![dir.path().to_path_buf()]);

    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_change_republishes_diagnostics() {
    let dir = TempDir::new().unwrap();
    let mut client = Client::initialized(factory_reporting_unknown_foo(), dir.path()).await;
    let template = dir.path().join("card.hbs");
    client.open(&template, "<Foo />").await;
    assert_eq!(client.diagnostics(&template).await.len(), 1);

    client
        .notify(
            "textDocument/didChange",
            json!({
                "textDocument": { "uri": uri(&template), "version": 2 },
                "contentChanges": [{
                    "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 7 } },
                    "text": "<p>fine</p>"
                }]
            }),
        )
        .await;
    assert!(client.diagnostics(&template).await.is_empty());

    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_rapid_changes_publish_in_edit_order() {
    let dir = TempDir::new().unwrap();
    let mut client = Client::initialized(factory_reporting_unknown_foo(), dir.path()).await;
    let template = dir.path().join("card.hbs");
    client.open(&template, "<p>fine</p>").await;

    let edits = ["<Foo />", "<p>a</p>", "<Foo /><Foo />"];
    for (version, text) in (2..).zip(edits) {
        client
            .notify(
                "textDocument/didChange",
                json!({
                    "textDocument": { "uri": uri(&template), "version": version },
                    "contentChanges": [{ "text": text }]
                }),
            )
            .await;
    }

    let mut counts = Vec::new();
    for _ in 0..=edits.len() {
        counts.push(client.diagnostics(&template).await.len());
    }
    assert_eq!(counts.first(), Some(&0));
    assert_eq!(counts.last(), Some(&2));

    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_close_clears_diagnostics_and_checker_file() {
    let dir = TempDir::new().unwrap();
    let factory = factory_reporting_unknown_foo();
    let checker = factory.checker.clone();
    let mut client = Client::initialized(factory, dir.path()).await;
    let template = dir.path().join("card.hbs");
    client.open(&template, "<Foo />").await;
    assert_eq!(client.diagnostics(&template).await.len(), 1);

    client
        .notify(
            "textDocument/didClose",
            json!({ "textDocument": { "uri": uri(&template) } }),
        )
        .await;
    assert!(client.diagnostics(&template).await.is_empty());

    // The close has been applied once a later request gets through.
    let response = client
        .request("trellis/getIR", json!({ "uri": uri(&template) }))
        .await;
    assert_eq!(response["result"], Value::Null);
    assert_eq!(checker.state().closed, vec![dir.path().join("card.ts")]);

    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_configuration_change_republishes_open_documents() {
    let dir = TempDir::new().unwrap();
    let mut client = Client::initialized(factory_reporting_unknown_foo(), dir.path()).await;
    let template = dir.path().join("card.hbs");
    client.open(&template, "<Foo />").await;
    assert_eq!(client.diagnostics(&template).await.len(), 1);

    client
        .notify("workspace/didChangeConfiguration", json!({ "settings": {} }))
        .await;
    assert_eq!(client.diagnostics(&template).await.len(), 1);

    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_checker_start_failure_is_shown_to_the_user() {
    let dir = TempDir::new().unwrap();
    let factory = FakeFactory {
        fail: true,
        ..FakeFactory::default()
    };
    let mut client = Client::initialized(factory, dir.path()).await;
    client.open(&dir.path().join("card.hbs"), "<p></p>").await;

    let message = client.notification("window/showMessage").await;
    assert_eq!(message["type"], 1);
    assert!(
        message["message"]
            .as_str()
            .unwrap()
            .contains("typescript-language-server not found")
    );

    client.finish().await.unwrap();
}

// ── Queries ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_hover_maps_back_to_template_range() {
    let dir = TempDir::new().unwrap();
    let mut client = Client::initialized(FakeFactory::default(), dir.path()).await;
    let template = dir.path().join("card.hbs");
    client.open(&template, "<p>{{this.title}}</p>").await;

    let response = client
        .request(
            "textDocument/hover",
            json!({
                "textDocument": { "uri": uri(&template) },
                "position": { "line": 0, "character": 11 }
            }),
        )
        .await;
    let hover = &response["result"];
    assert_eq!(hover["contents"]["kind"], "markdown");
    assert_eq!(hover["contents"]["value"], "(property) title");
    assert_eq!(
        hover["range"],
        json!({ "start": { "line": 0, "character": 10 }, "end": { "line": 0, "character": 15 } })
    );

    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_get_ir_returns_backing_module() {
    let dir = TempDir::new().unwrap();
    let mut client = Client::initialized(FakeFactory::default(), dir.path()).await;
    let template = dir.path().join("card.hbs");
    client.open(&template, "<Foo />").await;

    let response = client
        .request("trellis/getIR", json!({ "uri": uri(&template) }))
        .await;
    let ir = &response["result"];
    assert_eq!(ir["uri"], uri(&dir.path().join("card.ts")));
    assert!(
        ir["contents"]
            .as_str()
            .unwrap()
            .contains("__reg.Globals[\"Foo\"]")
    );

    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_unsupported_documents_get_empty_results() {
    let dir = TempDir::new().unwrap();
    let mut client = Client::initialized(FakeFactory::default(), dir.path()).await;
    let stylesheet = dir.path().join("card.css");
    client.open(&stylesheet, "p { color: red; }").await;

    let response = client
        .request(
            "textDocument/hover",
            json!({
                "textDocument": { "uri": uri(&stylesheet) },
                "position": { "line": 0, "character": 0 }
            }),
        )
        .await;
    assert!(response.get("error").is_none());
    assert_eq!(response["result"], Value::Null);

    client.finish().await.unwrap();
}
