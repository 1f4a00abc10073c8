//! Diagnostics through the whole pipeline: generation, checking,
//! augmentation and directive handling.

use std::path::{Path, PathBuf};

use trellis_core::{CheckerError, ProjectError, TextEdit};
use trellis_types::{Diagnostic, DocumentVersion};

use crate::common::{FakeChecker, project};

const TEMPLATE: &str = "/work/app/components/card.hbs";

fn v(version: i32) -> DocumentVersion {
    DocumentVersion::new(version)
}

fn summary<'t>(text: &'t str, diagnostics: &[Diagnostic]) -> Vec<(&'t str, String)> {
    diagnostics
        .iter()
        .map(|d| (d.span().slice(text), d.primary_message().to_string()))
        .collect()
}

#[tokio::test]
async fn test_arity_diagnostics_anchor_at_argument_lists() {
    let checker = FakeChecker::new();
    checker.report(
        "__dsl.resolve(__reg.Globals[\"repeat\"])(\"a\")",
        "__dsl.resolve(__reg.Globals[\"repeat\"])(\"a\")",
        2554,
        "Expected 2 arguments, but got 1.",
    );
    checker.report("(\"a\", 1, 2)", "2", 2554, "Expected 2 arguments, but got 3.");
    checker.report(
        "(\"a\", 1, { n: 2 })",
        "{ n: 2 }",
        2554,
        "Expected 2 arguments, but got 3.",
    );
    let mut project = project(&checker);
    let text = "{{repeat \"a\"}}\n{{repeat \"a\" 1 2}}\n{{repeat \"a\" 1 n=2}}\n";
    project.open(Path::new(TEMPLATE), v(1), text).await.unwrap();

    let diagnostics = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    assert_eq!(
        summary(text, &diagnostics),
        vec![
            ("\"a\"", "Expected 2 arguments, but got 1.".to_string()),
            ("\"a\" 1 2", "Expected 2 arguments, but got 3.".to_string()),
            (
                "\"a\" 1 n=2",
                "Expected 2 arguments, but got 3. Note that named args are passed together as a \
                 final argument, so they collectively increase the given arg count by 1."
                    .to_string()
            ),
        ]
    );
    assert!(diagnostics.iter().all(|d| d.source() == "trellis:ts(2554)"));
    assert_eq!(diagnostics[0].range().start.line, 0);
    assert_eq!(diagnostics[2].range().start.line, 2);
}

#[tokio::test]
async fn test_attribute_and_content_values_are_distinguished() {
    let checker = FakeChecker::new();
    let value = "__dsl.resolveOrReturn(__ctx.this?.handler)()";
    checker.report(
        "__el0.attributes[\"class\"]",
        "__el0.attributes[\"class\"]",
        2322,
        "Type '() => void' is not assignable to type 'AttrValue'.",
    );
    checker.report(
        &format!("__dsl.emitContent({value})"),
        value,
        2345,
        "Argument of type '() => void' is not assignable to parameter of type 'ContentValue'.",
    );
    let mut project = project(&checker);
    let text = "<div class={{this.handler}}></div>\n{{this.handler}}\n";
    project.open(Path::new(TEMPLATE), v(1), text).await.unwrap();

    let diagnostics = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    assert_eq!(diagnostics.len(), 2);
    let (attribute, content) = (&diagnostics[0], &diagnostics[1]);

    assert_eq!(attribute.span().slice(text), "this.handler");
    assert_eq!(attribute.range().start.line, 0);
    assert!(attribute.primary_message().contains("are assignable as HTML attributes"));
    assert_eq!(attribute.rule(), Some("attribute-value"));

    assert_eq!(content.span().slice(text), "this.handler");
    assert_eq!(content.range().start.line, 1);
    assert!(content.primary_message().contains("usable as top-level template content"));
    assert_eq!(content.rule(), Some("content-value"));
}

#[tokio::test]
async fn test_unresolved_global_versus_local() {
    let checker = FakeChecker::new();
    checker.report(
        "__reg.Globals[\"Foo\"]",
        "__reg.Globals[\"Foo\"]",
        7053,
        "Element implicitly has an 'any' type because expression of type '\"Foo\"' can't be used \
         to index type 'Globals'.",
    );
    checker.report(
        "?.[\"bad-thing\"]",
        "bad-thing",
        7053,
        "Element implicitly has an 'any' type because expression of type '\"bad-thing\"' can't \
         be used to index type '{ message: string; }'.",
    );
    let mut project = project(&checker);
    let text = "{{Foo}}\n{{#let this.locals as |locals|}}{{locals.bad-thing}}{{/let}}\n";
    project.open(Path::new(TEMPLATE), v(1), text).await.unwrap();

    let diagnostics = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(diagnostics[0].span().slice(text), "Foo");
    assert!(diagnostics[0].message().contains("missing a registry entry"));
    assert_eq!(diagnostics[1].span().slice(text), "bad-thing");
    assert!(!diagnostics[1].message().contains("registry"));
    assert!(!diagnostics[1].is_augmented());
}

#[tokio::test]
async fn test_direct_component_invocation_rejected_inline_and_block() {
    let checker = FakeChecker::new();
    let direct = "__dsl.directComponent(__dsl.componentByName(__reg.Globals, \"my-component\"))";
    checker.report(
        &format!("__dsl.emitContent({direct})"),
        direct,
        2345,
        "Argument of type 'X' is not assignable to parameter of type 'ContentValue'.",
    );
    let mut project = project(&checker);
    let text = "{{component 'my-component'}}\n";
    project.open(Path::new(TEMPLATE), v(1), text).await.unwrap();
    let diagnostics = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].span().slice(text), "{{component 'my-component'}}");
    assert!(
        diagnostics[0]
            .message()
            .contains("{{#let (component 'component-name') as |ComponentName|}}")
    );
    assert!(diagnostics[0].primary_message().ends_with("'<ComponentName @arg={{value}} />'."));

    let block = "{{#component 'my-component'}}hi{{/component}}\n";
    project
        .change(
            Path::new(TEMPLATE),
            v(2),
            &[TextEdit::full(block)],
        )
        .await
        .unwrap();
    let diagnostics = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].span().slice(block).starts_with("{{#component"));
    assert!(
        diagnostics[0]
            .primary_message()
            .ends_with("'<ComponentName @arg={{value}}>...</ComponentName>'.")
    );
}

#[tokio::test]
async fn test_direct_component_without_a_name_is_rejected() {
    let checker = FakeChecker::new();
    for name in ["undefined", "null"] {
        let direct = format!("__dsl.directComponent(__dsl.componentByName(__reg.Globals, {name}))");
        checker.report(
            &format!("__dsl.emitContent({direct})"),
            &direct,
            2345,
            "Argument of type 'DirectComponentInvocation' is not assignable to parameter of \
             type 'ContentValue'.",
        );
    }
    let mut project = project(&checker);
    let text = "{{component}}\n{{component null}}\n";
    project.open(Path::new(TEMPLATE), v(1), text).await.unwrap();
    let diagnostics = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    let spans: Vec<_> = diagnostics.iter().map(|d| d.span().slice(text)).collect();
    assert_eq!(spans, vec!["{{component}}", "{{component null}}"]);
    assert!(diagnostics.iter().all(|d| d.rule() == Some("direct-component-invocation")));
}

#[tokio::test]
async fn test_error_nested_in_direct_component_keeps_its_own_location() {
    let checker = FakeChecker::new();
    checker.report(
        "__dsl.resolve(__reg.Globals[\"repeat\"])(1)",
        "1",
        2345,
        "Argument of type 'number' is not assignable to parameter of type 'string'.",
    );
    let mut project = project(&checker);
    let text = "{{component \"my-card\" title=(repeat 1)}}\n";
    project.open(Path::new(TEMPLATE), v(1), text).await.unwrap();
    let diagnostics = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].span().slice(text), "1");
    assert_eq!(diagnostics[0].rule(), None);
    assert_eq!(
        diagnostics[0].primary_message(),
        "Argument of type 'number' is not assignable to parameter of type 'string'."
    );
}

#[tokio::test]
async fn test_zero_argument_content_invocation_anchors_at_mustache() {
    let checker = FakeChecker::new();
    let call = "__dsl.resolveOrReturn(__reg.Globals[\"repeat\"])()";
    checker.report(call, call, 2554, "Expected 2 arguments, but got 0.");
    let mut project = project(&checker);
    let text = "<p>{{repeat}}</p>\n";
    project.open(Path::new(TEMPLATE), v(1), text).await.unwrap();
    let diagnostics = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    assert_eq!(
        summary(text, &diagnostics),
        vec![("{{repeat}}", "Expected 2 arguments, but got 0.".to_string())]
    );
    assert_eq!(diagnostics[0].rule(), Some("arity"));
}

#[tokio::test]
async fn test_scaffolding_diagnostics_never_surface() {
    let checker = FakeChecker::new();
    checker.report("templateExpression", "templateExpression", 2305, "Module has no member.");
    checker.report("__ctx.args", "__ctx", 2339, "Property does not exist.");
    let mut project = project(&checker);
    let text = "<p>{{@title}}</p>\n";
    project.open(Path::new(TEMPLATE), v(1), text).await.unwrap();

    let diagnostics = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
}

#[tokio::test]
async fn test_diagnostics_are_idempotent() {
    let checker = FakeChecker::new();
    checker.report("__reg.Globals[\"Foo\"]", "Foo", 7053, "Unknown.");
    checker.report("__reg.Globals[\"Bar\"]", "Bar", 7053, "Unknown.");
    checker.report("(1)", "1", 2554, "Expected 0 arguments, but got 1.");
    let mut project = project(&checker);
    let text = "{{Bar}} {{Foo}} {{Foo 1}}\n";
    project.open(Path::new(TEMPLATE), v(1), text).await.unwrap();

    let first = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    let second = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    assert_eq!(first, second);
    assert!(!first.is_empty());
    assert!(first.windows(2).all(|w| w[0].span().start <= w[1].span().start));
}

#[tokio::test]
async fn test_duplicate_reports_are_merged() {
    let checker = FakeChecker::new();
    checker.report("__reg.Globals[\"Foo\"]", "Foo", 7053, "Unknown.");
    checker.report("__reg.Globals[\"Foo\"]", "Foo", 7053, "Unknown.");
    let mut project = project(&checker);
    project
        .open(Path::new(TEMPLATE), v(1), "{{Foo}}")
        .await
        .unwrap();
    let diagnostics = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    assert_eq!(diagnostics.len(), 1);
}

// ── Directives ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ignore_directive_suppresses_next_node() {
    let checker = FakeChecker::new();
    checker.report("__reg.Globals[\"Foo\"]", "Foo", 7053, "Unknown.");
    checker.report("__reg.Globals[\"Bar\"]", "Bar", 7053, "Unknown.");
    let mut project = project(&checker);
    let text = "{{! @trellis-ignore }}\n{{Foo}}\n{{Bar}}\n";
    project.open(Path::new(TEMPLATE), v(1), text).await.unwrap();

    let diagnostics = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].span().slice(text), "Bar");
}

#[tokio::test]
async fn test_unused_expect_error_is_reported() {
    let checker = FakeChecker::new();
    let mut project = project(&checker);
    let text = "{{! @trellis-expect-error }}\n{{this.fine}}\n";
    project.open(Path::new(TEMPLATE), v(1), text).await.unwrap();

    let diagnostics = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0].message(),
        "Unused '@trellis-expect-error' directive."
    );
    assert_eq!(
        diagnostics[0].span().slice(text),
        "{{! @trellis-expect-error }}"
    );
    assert_eq!(diagnostics[0].source(), "trellis");
}

#[tokio::test]
async fn test_nocheck_silences_the_region() {
    let checker = FakeChecker::new();
    checker.report("__reg.Globals[\"Foo\"]", "Foo", 7053, "Unknown.");
    let mut project = project(&checker);
    let text = "{{! @trellis-nocheck }}\n<p>{{Foo}}</p>\n";
    project.open(Path::new(TEMPLATE), v(1), text).await.unwrap();
    assert!(project.diagnostics(Path::new(TEMPLATE)).await.unwrap().is_empty());
}

// ── Errors ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_parse_error_is_a_bridge_diagnostic() {
    let checker = FakeChecker::new();
    let mut project = project(&checker);
    let text = "<p>{{this.title</p>\n";
    project.open(Path::new(TEMPLATE), v(1), text).await.unwrap();

    let diagnostics = project.diagnostics(Path::new(TEMPLATE)).await.unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].source(), "trellis");
    assert!(diagnostics[0].code().is_none());
}

#[tokio::test]
async fn test_checker_failure_propagates() {
    let checker = FakeChecker::new();
    let mut project = project(&checker);
    project
        .open(Path::new(TEMPLATE), v(1), "{{this.title}}")
        .await
        .unwrap();
    checker.state().fail_checks = true;
    let err = project.diagnostics(Path::new(TEMPLATE)).await.unwrap_err();
    assert!(matches!(
        err,
        ProjectError::Checker(CheckerError::Timeout { .. })
    ));
}

#[tokio::test]
async fn test_diagnostics_for_unopened_document() {
    let checker = FakeChecker::new();
    let mut project = project(&checker);
    let err = project
        .diagnostics(&PathBuf::from("/work/app/missing.hbs"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProjectError::NotOpen(_)));
}
