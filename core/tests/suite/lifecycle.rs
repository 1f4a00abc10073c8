//! Document lifecycle, environment reloads, and per-project queues.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use trellis_config::{CONFIG_FILE_NAME, ProjectSettings};
use trellis_core::{Project, ProjectError, ProjectHandle, TextEdit, Workspace};
use trellis_types::{DocumentVersion, Position, Range};

use crate::common::{FakeChecker, FakeFactory, project};

const TEMPLATE: &str = "/work/app/components/card.hbs";
const SCRIPT: &str = "/work/app/components/card.ts";
const VIRTUAL: &str = "/work/app/components/card.ts";

fn v(version: i32) -> DocumentVersion {
    DocumentVersion::new(version)
}

fn pos(line: u32, character: u32) -> Position {
    Position::new(line, character)
}

// ── Open / change / close ───────────────────────────────────────────────

#[tokio::test]
async fn test_open_rejects_unsupported_files() {
    let checker = FakeChecker::new();
    let mut project = project(&checker);
    let err = project
        .open(Path::new("/work/app/styles/app.css"), v(1), "p {}")
        .await
        .unwrap_err();
    assert!(matches!(err, ProjectError::Unsupported(_)));
    assert_eq!(checker.state().sync_count, 0);
}

#[tokio::test]
async fn test_ranged_edit_regenerates_backing_module() {
    let checker = FakeChecker::new();
    let mut project = project(&checker);
    project
        .open(Path::new(TEMPLATE), v(1), "<Foo />\n")
        .await
        .unwrap();
    let before = checker.state().sync_count;
    assert!(checker.file(Path::new(VIRTUAL)).unwrap().contains("__reg.Globals[\"Foo\"]"));

    project
        .change(
            Path::new(TEMPLATE),
            v(2),
            &[TextEdit::ranged(Range::new(pos(0, 1), pos(0, 4)), "Bar")],
        )
        .await
        .unwrap();

    assert_eq!(project.document(Path::new(TEMPLATE)).unwrap().text(), "<Bar />\n");
    let synced = checker.file(Path::new(VIRTUAL)).unwrap();
    assert!(synced.contains("__reg.Globals[\"Bar\"]"));
    assert!(!synced.contains("__reg.Globals[\"Foo\"]"));
    assert!(checker.state().sync_count > before);
}

#[tokio::test]
async fn test_stale_change_is_ignored() {
    let checker = FakeChecker::new();
    let mut project = project(&checker);
    project
        .open(Path::new(TEMPLATE), v(3), "<Foo />")
        .await
        .unwrap();
    project
        .change(Path::new(TEMPLATE), v(2), &[TextEdit::full("<Bar />")])
        .await
        .unwrap();

    let document = project.document(Path::new(TEMPLATE)).unwrap();
    assert_eq!(document.text(), "<Foo />");
    assert_eq!(document.version(), v(3));
}

#[tokio::test]
async fn test_change_of_unknown_document_fails() {
    let checker = FakeChecker::new();
    let mut project = project(&checker);
    let err = project
        .change(Path::new(TEMPLATE), v(2), &[TextEdit::full("x")])
        .await
        .unwrap_err();
    assert!(matches!(err, ProjectError::NotOpen(_)));
}

#[tokio::test]
async fn test_closing_last_owner_closes_checker_file() {
    let checker = FakeChecker::new();
    let mut project = project(&checker);
    project
        .open(Path::new(TEMPLATE), v(1), "{{this.title}}")
        .await
        .unwrap();
    project.close(Path::new(TEMPLATE)).await.unwrap();

    assert_eq!(checker.state().closed, vec![PathBuf::from(VIRTUAL)]);
    assert!(checker.file(Path::new(VIRTUAL)).is_none());
    let err = project.diagnostics(Path::new(TEMPLATE)).await.unwrap_err();
    assert!(matches!(err, ProjectError::NotOpen(_)));
    assert!(matches!(
        project.close(Path::new(TEMPLATE)).await.unwrap_err(),
        ProjectError::NotOpen(_)
    ));
}

#[tokio::test]
async fn test_closing_template_hands_module_back_to_script() {
    let checker = FakeChecker::new();
    let mut project = project(&checker);
    let script = "export default class Card {}\n";
    project.open(Path::new(SCRIPT), v(1), script).await.unwrap();
    project
        .open(Path::new(TEMPLATE), v(1), "{{this.title}}")
        .await
        .unwrap();
    assert_ne!(checker.file(Path::new(SCRIPT)).as_deref(), Some(script));

    project.close(Path::new(TEMPLATE)).await.unwrap();

    assert_eq!(checker.file(Path::new(SCRIPT)).as_deref(), Some(script));
    assert!(checker.state().closed.is_empty());
    assert!(project.related_documents(Path::new(SCRIPT)).is_empty());
}

// ── Configuration ───────────────────────────────────────────────────────

fn write_config(dir: &Path, text: &str) -> PathBuf {
    let path = dir.join(CONFIG_FILE_NAME);
    fs::write(&path, text).unwrap();
    path
}

#[tokio::test]
async fn test_reload_environment_regenerates_open_documents() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    let template = root.join("app/components/card.hbs");
    let checker = FakeChecker::new();
    let mut project = Project::new(ProjectSettings::defaults(&root), checker.clone());
    project.open(&template, v(1), "<Greeting />").await.unwrap();
    let virtual_path = template.with_extension("ts");
    assert!(
        !checker
            .file(&virtual_path)
            .unwrap()
            .contains("typeof import(\"./greeting\").default")
    );

    let config = write_config(
        &root,
        "environment = [\"loose\"]\n\n[registry]\nGreeting = 'typeof import(\"./greeting\").default'\n",
    );
    project
        .reload_environment(ProjectSettings::from_file(&config).unwrap())
        .await
        .unwrap();

    let synced = checker.file(&virtual_path).unwrap();
    assert!(synced.contains("\"Greeting\": typeof import(\"./greeting\").default;"));

    let err = project
        .open(&root.join("app/components/badge.gts"), v(1), "<template></template>")
        .await
        .unwrap_err();
    assert!(matches!(err, ProjectError::Unsupported(_)));
}

#[tokio::test]
async fn test_excluded_documents_are_rejected() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "exclude = [\"vendor/**\"]\n");
    let checker = FakeChecker::new();
    let mut project = Project::new(ProjectSettings::from_file(&config).unwrap(), checker.clone());

    let err = project
        .open(&dir.path().join("vendor/widget.hbs"), v(1), "{{x}}")
        .await
        .unwrap_err();
    assert!(matches!(err, ProjectError::Excluded(_)));

    project
        .open(&dir.path().join("app/widget.hbs"), v(1), "{{x}}")
        .await
        .unwrap();
}

// ── Project queue ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_handle_serializes_requests_and_shuts_down() {
    let checker = FakeChecker::new();
    checker.report(
        "__reg.Globals[\"Foo\"]",
        "__reg.Globals[\"Foo\"]",
        7053,
        "Element implicitly has an 'any' type because expression of type '\"Foo\"' can't be \
         used to index type 'Globals'.",
    );
    let handle = ProjectHandle::spawn(project(&checker));
    assert_eq!(handle.root(), Path::new("/work/app"));

    handle
        .open(PathBuf::from(TEMPLATE), v(1), "<Foo />".to_string())
        .await
        .unwrap();
    let diagnostics = handle.diagnostics(PathBuf::from(TEMPLATE)).await.unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].message().contains("Unknown name 'Foo'"));

    handle.shutdown().await;
    assert!(checker.state().shut_down);
    let err = handle.diagnostics(PathBuf::from(TEMPLATE)).await.unwrap_err();
    assert!(matches!(err, ProjectError::Closed));
}

// ── Workspace routing ───────────────────────────────────────────────────

#[tokio::test]
async fn test_workspace_starts_one_project_per_config_root() {
    let dir = TempDir::new().unwrap();
    let folder = dir.path().to_path_buf();
    let nested = folder.join("packages/ui");
    fs::create_dir_all(nested.join("src")).unwrap();
    write_config(&nested, "");

    let factory = FakeFactory::default();
    let mut workspace = Workspace::new(factory.clone(), vec![folder.clone()]);

    let top = folder.join("app/card.hbs");
    let inner = nested.join("src/button.hbs");
    let sibling = nested.join("src/icon.hbs");

    let a = workspace.project_for(&top).await.unwrap();
    let b = workspace.project_for(&inner).await.unwrap();
    let c = workspace.project_for(&sibling).await.unwrap();
    assert_eq!(a.root(), folder.as_path());
    assert_eq!(b.root(), nested.as_path());
    assert_eq!(c.root(), nested.as_path());
    assert_eq!(*factory.created.lock().unwrap(), vec![folder.clone(), nested.clone()]);

    let routed = workspace.route(&nested.join("src/unopened.hbs")).unwrap();
    assert_eq!(routed.root(), nested.as_path());
    assert!(workspace.route(Path::new("/elsewhere/x.hbs")).is_none());

    workspace.shutdown().await;
    assert!(workspace.route(&inner).is_none());
}
