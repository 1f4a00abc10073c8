//! Position queries and template/companion pairing.

use std::path::{Path, PathBuf};

use trellis_types::{DocumentVersion, Position, Range, Span};

use crate::common::{Definition, FakeChecker, completion, project};

const TEMPLATE: &str = "/work/app/components/card.hbs";
const SCRIPT: &str = "/work/app/components/card.ts";
const SCRIPT_TEXT: &str = "import Component from '@glimmer/component';\n\
                           export default class Card extends Component {\n  \
                           title = 'Hello';\n}\n";

fn v(version: i32) -> DocumentVersion {
    DocumentVersion::new(version)
}

fn pos(line: u32, character: u32) -> Position {
    Position::new(line, character)
}

// ── Hover ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_hover_maps_both_ways() {
    let checker = FakeChecker::new();
    let mut project = project(&checker);
    let text = "<p>{{this.title}}</p>";
    project.open(Path::new(TEMPLATE), v(1), text).await.unwrap();

    let hover = project
        .hover(Path::new(TEMPLATE), pos(0, 11))
        .await
        .unwrap()
        .expect("hover on a mapped name");
    assert_eq!(hover.contents, "(property) title");
    assert_eq!(hover.span, Some(Span::new(10, 15)));
    assert_eq!(hover.range, Some(Range::new(pos(0, 10), pos(0, 15))));
}

#[tokio::test]
async fn test_hover_outside_mapped_text_is_empty() {
    let checker = FakeChecker::new();
    let mut project = project(&checker);
    project
        .open(Path::new(TEMPLATE), v(1), "<p>{{this.title}}</p>")
        .await
        .unwrap();
    let hover = project.hover(Path::new(TEMPLATE), pos(0, 3)).await.unwrap();
    assert!(hover.is_none());
}

// ── Completions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_completions_hide_generated_names() {
    let checker = FakeChecker::new();
    checker.state().completions = ["__ctx", "title", "__el0", "__blk2", "__dsl", "item"]
        .into_iter()
        .map(completion)
        .collect();
    let mut project = project(&checker);
    project
        .open(Path::new(TEMPLATE), v(1), "{{this.title}}")
        .await
        .unwrap();

    let items = project
        .completions(Path::new(TEMPLATE), pos(0, 12))
        .await
        .unwrap();
    let labels: Vec<&str> = items.iter().map(|item| item.label.as_str()).collect();
    assert_eq!(labels, vec!["title", "item"]);
}

// ── Companion scripts ───────────────────────────────────────────────────

async fn paired(checker: &FakeChecker) -> trellis_core::Project<FakeChecker> {
    let mut project = project(checker);
    project
        .open(Path::new(SCRIPT), v(1), SCRIPT_TEXT)
        .await
        .unwrap();
    project
        .open(Path::new(TEMPLATE), v(1), "<h1>{{this.title}}</h1>\n")
        .await
        .unwrap();
    project
}

#[tokio::test]
async fn test_template_and_companion_share_a_backing_module() {
    let checker = FakeChecker::new();
    let mut project = paired(&checker).await;

    let ir = project.debug_ir(Path::new(TEMPLATE)).unwrap();
    assert_eq!(ir.virtual_path, PathBuf::from(SCRIPT));
    assert!(ir.contents.starts_with(SCRIPT_TEXT));
    assert!(ir.contents.contains("templateForBackingValue"));
    assert_eq!(checker.file(Path::new(SCRIPT)), Some(ir.contents));

    assert_eq!(
        project.related_documents(Path::new(TEMPLATE)),
        vec![PathBuf::from(SCRIPT)]
    );
    assert_eq!(
        project.related_documents(Path::new(SCRIPT)),
        vec![PathBuf::from(TEMPLATE)]
    );
}

#[tokio::test]
async fn test_diagnostics_are_split_between_template_and_companion() {
    let checker = FakeChecker::new();
    checker.report(
        "title = 'Hello'",
        "title",
        2564,
        "Property 'title' has no initializer.",
    );
    checker.report("__ctx.this?.title", "title", 2339, "Property 'title' is private.");
    let mut project = paired(&checker).await;

    let script = project.diagnostics(Path::new(SCRIPT)).await.unwrap();
    assert_eq!(script.len(), 1);
    assert_eq!(script[0].span().slice(SCRIPT_TEXT), "title");
    assert_eq!(script[0].range().start, pos(2, 2));

    let template = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    assert_eq!(template.len(), 1);
    assert_eq!(template[0].range(), Range::new(pos(0, 11), pos(0, 16)));
}

#[tokio::test]
async fn test_definitions_map_into_companion_and_pass_through_external() {
    let checker = FakeChecker::new();
    let external = PathBuf::from("/work/node_modules/typescript/lib/lib.dom.d.ts");
    let external_range = Range::new(pos(100, 4), pos(100, 9));
    checker.state().definitions = vec![
        Definition::InFile {
            path: PathBuf::from(SCRIPT),
            needle: "title = 'Hello'".to_string(),
        },
        Definition::InFile {
            path: PathBuf::from(SCRIPT),
            needle: "templateForBackingValue".to_string(),
        },
        Definition::External {
            path: external.clone(),
            range: external_range,
        },
    ];
    let mut project = paired(&checker).await;

    let locations = project
        .definitions(Path::new(TEMPLATE), pos(0, 13))
        .await
        .unwrap();
    assert_eq!(locations.len(), 2);

    assert_eq!(locations[0].path, PathBuf::from(SCRIPT));
    let span = locations[0].span.unwrap();
    assert_eq!(span.slice(SCRIPT_TEXT), "title = 'Hello'");
    assert_eq!(locations[0].range, Range::new(pos(2, 2), pos(2, 17)));

    assert_eq!(locations[1].path, external);
    assert_eq!(locations[1].span, None);
    assert_eq!(locations[1].range, external_range);
}

#[tokio::test]
async fn test_embedded_document_virtual_path() {
    let checker = FakeChecker::new();
    let mut project = project(&checker);
    let path = Path::new("/work/app/components/badge.gts");
    let text = "const label = 'x';\n<template>{{label}}</template>\n";
    project.open(path, v(1), text).await.unwrap();

    let ir = project.debug_ir(path).unwrap();
    assert_eq!(ir.virtual_path, PathBuf::from("/work/app/components/badge.ts"));
    assert!(ir.contents.starts_with("const label = 'x';\n"));
}
