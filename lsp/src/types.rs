//! LSP payloads on both sides of the bridge.
//!
//! Editor-facing params are typed and deserialized; checker responses are
//! read leniently from raw JSON because servers differ in which of the
//! protocol's alternative shapes they send.

use std::path::Path;
use std::process;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use trellis_core::{CheckerDiagnostic, CheckerHover, CheckerLocation};
use trellis_types::{
    CompletionItem, CompletionKind, Diagnostic, DiagnosticTag, Hover, LineIndex, Location,
    Position, Range, Severity,
};

use crate::protocol::{path_to_uri, uri_to_path};

// ============================================================================
// Editor-facing params
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InitializeParams {
    pub root_uri: Option<String>,
    pub workspace_folders: Option<Vec<WorkspaceFolder>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkspaceFolder {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextDocumentIdentifier {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextDocumentItem {
    pub uri: String,
    pub version: i32,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VersionedTextDocumentIdentifier {
    pub uri: String,
    pub version: i32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentChange {
    pub range: Option<Range>,
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DidOpenParams {
    pub text_document: TextDocumentItem,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DidChangeParams {
    pub text_document: VersionedTextDocumentIdentifier,
    pub content_changes: Vec<ContentChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DidCloseParams {
    pub text_document: TextDocumentIdentifier,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TextDocumentPositionParams {
    pub text_document: TextDocumentIdentifier,
    pub position: Position,
}

/// Params of `trellis/getIR`.
#[derive(Debug, Deserialize)]
pub(crate) struct GetIrParams {
    pub uri: String,
}

// ============================================================================
// Editor-facing results
// ============================================================================

pub(crate) fn server_capabilities() -> Value {
    json!({
        "capabilities": {
            "textDocumentSync": { "openClose": true, "change": 2 },
            "hoverProvider": true,
            "completionProvider": { "triggerCharacters": [".", "@", "<", "{", "("] },
            "definitionProvider": true
        },
        "serverInfo": { "name": "trellis", "version": env!("CARGO_PKG_VERSION") }
    })
}

pub(crate) fn diagnostic_to_lsp(diagnostic: &Diagnostic) -> Value {
    let mut object = Map::new();
    object.insert("range".into(), json!(diagnostic.range()));
    object.insert("severity".into(), json!(diagnostic.severity().to_lsp()));
    if let Some(code) = diagnostic.code() {
        object.insert("code".into(), json!(code));
    }
    object.insert("source".into(), json!(diagnostic.source()));
    object.insert("message".into(), json!(diagnostic.message()));
    if !diagnostic.tags().is_empty() {
        let tags: Vec<u8> = diagnostic.tags().iter().map(|tag| *tag as u8).collect();
        object.insert("tags".into(), json!(tags));
    }
    Value::Object(object)
}

pub(crate) fn hover_to_lsp(hover: &Hover) -> Value {
    let mut value = json!({
        "contents": { "kind": "markdown", "value": hover.contents }
    });
    if let Some(range) = hover.range {
        value["range"] = json!(range);
    }
    value
}

pub(crate) fn completion_to_lsp(item: &CompletionItem) -> Value {
    let mut value = json!({ "label": item.label, "kind": item.kind.to_lsp() });
    if let Some(detail) = &item.detail {
        value["detail"] = json!(detail);
    }
    value
}

pub(crate) fn location_to_lsp(location: &Location) -> Option<Value> {
    let uri = path_to_uri(&location.path).ok()?;
    Some(json!({ "uri": uri.as_str(), "range": location.range }))
}

// ============================================================================
// Checker-facing requests
// ============================================================================

pub(crate) fn initialize_params(root_uri: &str) -> Value {
    json!({
        "processId": process::id(),
        "rootUri": root_uri,
        "capabilities": {
            "textDocument": {
                "synchronization": { "dynamicRegistration": false, "didSave": false },
                "publishDiagnostics": {
                    "relatedInformation": false,
                    "versionSupport": true,
                    "tagSupport": { "valueSet": [1, 2] }
                },
                "hover": { "contentFormat": ["markdown", "plaintext"] },
                "completion": { "completionItem": { "snippetSupport": false } },
                "definition": { "linkSupport": true }
            }
        },
        "workspaceFolders": [{ "uri": root_uri, "name": "trellis" }]
    })
}

/// `typescript` unless the path is a plain JavaScript module.
pub(crate) fn language_id(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("js" | "mjs" | "cjs") => "javascript",
        _ => "typescript",
    }
}

pub(crate) fn did_open_params(uri: &str, language_id: &str, version: i32, text: &str) -> Value {
    json!({
        "textDocument": { "uri": uri, "languageId": language_id, "version": version, "text": text }
    })
}

pub(crate) fn did_change_params(uri: &str, version: i32, text: &str) -> Value {
    json!({
        "textDocument": { "uri": uri, "version": version },
        "contentChanges": [{ "text": text }]
    })
}

pub(crate) fn text_document_params(uri: &str) -> Value {
    json!({ "textDocument": { "uri": uri } })
}

pub(crate) fn position_params(uri: &str, position: Position) -> Value {
    json!({ "textDocument": { "uri": uri }, "position": position })
}

// ============================================================================
// Checker-facing results
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PublishDiagnosticsParams {
    pub uri: String,
    pub version: Option<i32>,
    pub diagnostics: Vec<LspDiagnostic>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct LspDiagnostic {
    pub range: Range,
    pub severity: Option<u64>,
    pub code: Option<Value>,
    pub message: String,
    #[serde(default)]
    pub tags: Vec<u64>,
}

impl LspDiagnostic {
    /// Convert into synthetic byte coordinates of the text `lines` holds.
    pub fn to_checker(&self, lines: &LineIndex) -> CheckerDiagnostic {
        let code = self.code.as_ref().and_then(|code| match code {
            Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(text) => text.parse().ok(),
            _ => None,
        });
        CheckerDiagnostic {
            span: lines.span(self.range),
            severity: self
                .severity
                .and_then(Severity::from_lsp)
                .unwrap_or(Severity::Error),
            code,
            message: self.message.clone(),
            tags: self
                .tags
                .iter()
                .filter_map(|tag| DiagnosticTag::from_lsp(*tag))
                .collect(),
        }
    }
}

/// Items of a `textDocument/diagnostic` full report.
pub(crate) fn parse_pull_diagnostics(result: Value) -> Vec<LspDiagnostic> {
    result
        .get("items")
        .cloned()
        .and_then(|items| serde_json::from_value(items).ok())
        .unwrap_or_default()
}

pub(crate) fn parse_hover(result: &Value, lines: &LineIndex) -> Option<CheckerHover> {
    let contents = hover_text(result.get("contents")?);
    if contents.is_empty() {
        return None;
    }
    let span = result
        .get("range")
        .and_then(|range| serde_json::from_value::<Range>(range.clone()).ok())
        .map(|range| lines.span(range));
    Some(CheckerHover { contents, span })
}

/// Flatten `MarkupContent`, `MarkedString` or a list of them into markdown.
fn hover_text(contents: &Value) -> String {
    match contents {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(hover_text)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        Value::Object(object) => {
            let value = object.get("value").and_then(Value::as_str).unwrap_or("");
            match object.get("language").and_then(Value::as_str) {
                Some(language) => format!("```{language}\n{value}\n```"),
                None => value.to_string(),
            }
        }
        _ => String::new(),
    }
}

/// Items of a `CompletionItem[]` or `CompletionList` result.
pub(crate) fn parse_completions(result: &Value) -> Vec<CompletionItem> {
    let items = match result {
        Value::Array(items) => items.as_slice(),
        Value::Object(list) => list
            .get("items")
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice),
        _ => &[],
    };
    items
        .iter()
        .filter_map(|item| {
            let label = item.get("label")?.as_str()?;
            let kind = item
                .get("kind")
                .and_then(Value::as_u64)
                .map_or(CompletionKind::Other, CompletionKind::from_lsp);
            let mut completion = CompletionItem::new(label, kind);
            completion.detail = item.get("detail").and_then(Value::as_str).map(String::from);
            Some(completion)
        })
        .collect()
}

/// Targets of a `Location`, `Location[]` or `LocationLink[]` result. Targets
/// outside the local filesystem are dropped.
pub(crate) fn parse_locations(result: &Value) -> Vec<CheckerLocation> {
    let entries = match result {
        Value::Array(entries) => entries.iter().collect(),
        Value::Object(_) => vec![result],
        _ => Vec::new(),
    };
    entries
        .into_iter()
        .filter_map(|entry| {
            let (uri, range) = match entry.get("targetUri") {
                Some(uri) => (
                    uri,
                    entry
                        .get("targetSelectionRange")
                        .or_else(|| entry.get("targetRange"))?,
                ),
                None => (entry.get("uri")?, entry.get("range")?),
            };
            Some(CheckerLocation {
                path: uri_to_path(uri.as_str()?)?,
                range: serde_json::from_value(range.clone()).ok()?,
            })
        })
        .collect()
}
