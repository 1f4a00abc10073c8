//! Per-project request queues.
//!
//! Each [`Project`] runs on its own task and receives requests over a
//! bounded channel, so every edit and query against one project is
//! serialized while separate projects proceed independently.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};
use trellis_config::ProjectSettings;
use trellis_types::{CompletionItem, Diagnostic, DocumentVersion, Hover, Location, Position};

use crate::checker::{CheckerError, TypeChecker};
use crate::document::TextEdit;
use crate::project::{DebugIr, Project, ProjectError};

const QUEUE_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, ProjectError>>;

enum Request {
    Open {
        path: PathBuf,
        version: DocumentVersion,
        text: String,
        reply: Reply<()>,
    },
    Change {
        path: PathBuf,
        version: DocumentVersion,
        edits: Vec<TextEdit>,
        reply: Reply<()>,
    },
    Close {
        path: PathBuf,
        reply: Reply<()>,
    },
    Reload {
        settings: Box<ProjectSettings>,
        reply: Reply<()>,
    },
    Diagnostics {
        path: PathBuf,
        reply: Reply<Vec<Diagnostic>>,
    },
    Hover {
        path: PathBuf,
        position: Position,
        reply: Reply<Option<Hover>>,
    },
    Completions {
        path: PathBuf,
        position: Position,
        reply: Reply<Vec<CompletionItem>>,
    },
    Definitions {
        path: PathBuf,
        position: Position,
        reply: Reply<Vec<Location>>,
    },
    DebugIr {
        path: PathBuf,
        reply: Reply<DebugIr>,
    },
    Related {
        path: PathBuf,
        reply: Reply<Vec<PathBuf>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable sender side of a project's queue.
#[derive(Debug, Clone)]
pub struct ProjectHandle {
    root: PathBuf,
    tx: mpsc::Sender<Request>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Request::Open { .. } => "Open",
            Request::Change { .. } => "Change",
            Request::Close { .. } => "Close",
            Request::Reload { .. } => "Reload",
            Request::Diagnostics { .. } => "Diagnostics",
            Request::Hover { .. } => "Hover",
            Request::Completions { .. } => "Completions",
            Request::Definitions { .. } => "Definitions",
            Request::DebugIr { .. } => "DebugIr",
            Request::Related { .. } => "Related",
            Request::Shutdown { .. } => "Shutdown",
        };
        f.write_str(name)
    }
}

impl ProjectHandle {
    /// Move `project` onto its own task.
    pub fn spawn<C: TypeChecker>(project: Project<C>) -> Self {
        let root = project.settings().root().to_path_buf();
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run(project, rx));
        Self { root, tx }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn open(
        &self,
        path: PathBuf,
        version: DocumentVersion,
        text: String,
    ) -> Result<(), ProjectError> {
        self.request(|reply| Request::Open {
            path,
            version,
            text,
            reply,
        })
        .await
    }

    pub async fn change(
        &self,
        path: PathBuf,
        version: DocumentVersion,
        edits: Vec<TextEdit>,
    ) -> Result<(), ProjectError> {
        self.request(|reply| Request::Change {
            path,
            version,
            edits,
            reply,
        })
        .await
    }

    pub async fn close(&self, path: PathBuf) -> Result<(), ProjectError> {
        self.request(|reply| Request::Close { path, reply }).await
    }

    pub async fn reload_environment(&self, settings: ProjectSettings) -> Result<(), ProjectError> {
        self.request(|reply| Request::Reload {
            settings: Box::new(settings),
            reply,
        })
        .await
    }

    pub async fn diagnostics(&self, path: PathBuf) -> Result<Vec<Diagnostic>, ProjectError> {
        self.request(|reply| Request::Diagnostics { path, reply })
            .await
    }

    pub async fn hover(
        &self,
        path: PathBuf,
        position: Position,
    ) -> Result<Option<Hover>, ProjectError> {
        self.request(|reply| Request::Hover {
            path,
            position,
            reply,
        })
        .await
    }

    pub async fn completions(
        &self,
        path: PathBuf,
        position: Position,
    ) -> Result<Vec<CompletionItem>, ProjectError> {
        self.request(|reply| Request::Completions {
            path,
            position,
            reply,
        })
        .await
    }

    pub async fn definitions(
        &self,
        path: PathBuf,
        position: Position,
    ) -> Result<Vec<Location>, ProjectError> {
        self.request(|reply| Request::Definitions {
            path,
            position,
            reply,
        })
        .await
    }

    pub async fn debug_ir(&self, path: PathBuf) -> Result<DebugIr, ProjectError> {
        self.request(|reply| Request::DebugIr { path, reply }).await
    }

    pub async fn related_documents(&self, path: PathBuf) -> Result<Vec<PathBuf>, ProjectError> {
        self.request(|reply| Request::Related { path, reply }).await
    }

    /// Stop the project's checker and its task. Later requests fail with
    /// [`ProjectError::Closed`].
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Request::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T, ProjectError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| ProjectError::Closed)?;
        rx.await.map_err(|_| ProjectError::Closed)?
    }
}

async fn run<C: TypeChecker>(mut project: Project<C>, mut rx: mpsc::Receiver<Request>) {
    tracing::info!(root = %project.settings().root().display(), "Project started");
    while let Some(request) = rx.recv().await {
        tracing::trace!(?request, "Project request");
        // A dropped reply receiver means the caller gave up; the work is
        // still applied so later requests see a consistent state.
        match request {
            Request::Open {
                path,
                version,
                text,
                reply,
            } => {
                let _ = reply.send(project.open(&path, version, &text).await);
            }
            Request::Change {
                path,
                version,
                edits,
                reply,
            } => {
                let _ = reply.send(project.change(&path, version, &edits).await);
            }
            Request::Close { path, reply } => {
                let _ = reply.send(project.close(&path).await);
            }
            Request::Reload { settings, reply } => {
                let _ = reply.send(project.reload_environment(*settings).await);
            }
            Request::Diagnostics { path, reply } => {
                let _ = reply.send(project.diagnostics(&path).await);
            }
            Request::Hover {
                path,
                position,
                reply,
            } => {
                let _ = reply.send(project.hover(&path, position).await);
            }
            Request::Completions {
                path,
                position,
                reply,
            } => {
                let _ = reply.send(project.completions(&path, position).await);
            }
            Request::Definitions {
                path,
                position,
                reply,
            } => {
                let _ = reply.send(project.definitions(&path, position).await);
            }
            Request::DebugIr { path, reply } => {
                let _ = reply.send(project.debug_ir(&path));
            }
            Request::Related { path, reply } => {
                let _ = reply.send(Ok(project.related_documents(&path)));
            }
            Request::Shutdown { reply } => {
                project.shutdown().await;
                let _ = reply.send(());
                break;
            }
        }
    }
    tracing::info!(root = %project.settings().root().display(), "Project stopped");
}

// ============================================================================
// Workspace
// ============================================================================

/// Starts a checker for a newly discovered project.
pub trait CheckerFactory: Send + Sync + 'static {
    type Checker: TypeChecker;

    fn create(
        &self,
        settings: &ProjectSettings,
    ) -> impl Future<Output = Result<Self::Checker, CheckerError>> + Send;
}

/// Every project in the editor's workspace, keyed by root directory.
pub struct Workspace<F> {
    factory: F,
    /// Workspace folders; a document with no config file belongs to the
    /// innermost folder containing it.
    folders: Vec<PathBuf>,
    projects: HashMap<PathBuf, ProjectHandle>,
    /// Document path to project root.
    routes: HashMap<PathBuf, PathBuf>,
}

impl<F: CheckerFactory> Workspace<F> {
    pub fn new(factory: F, folders: Vec<PathBuf>) -> Self {
        Self {
            factory,
            folders,
            projects: HashMap::new(),
            routes: HashMap::new(),
        }
    }

    /// The project `path` belongs to, starting it if needed.
    pub async fn project_for(&mut self, path: &Path) -> Result<ProjectHandle, ProjectError> {
        if let Some(handle) = self.routed(path) {
            return Ok(handle);
        }
        let fallback_root = self
            .folder_for(path)
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        let settings = ProjectSettings::discover(path, &fallback_root)?;
        let root = settings.root().to_path_buf();
        let handle = match self.projects.get(&root) {
            Some(handle) => handle.clone(),
            None => {
                tracing::info!(
                    root = %root.display(),
                    config = ?settings.config_path(),
                    "Starting project"
                );
                let checker = self.factory.create(&settings).await?;
                let handle = ProjectHandle::spawn(Project::new(settings, checker));
                self.projects.insert(root.clone(), handle.clone());
                handle
            }
        };
        self.routes.insert(path.to_path_buf(), root);
        Ok(handle)
    }

    /// The project for a path without starting one: the project the path
    /// was opened in, else the project with the longest root prefix.
    #[must_use]
    pub fn route(&self, path: &Path) -> Option<ProjectHandle> {
        self.routed(path).or_else(|| {
            self.projects
                .iter()
                .filter(|(root, _)| path.starts_with(root))
                .max_by_key(|(root, _)| root.components().count())
                .map(|(_, handle)| handle.clone())
        })
    }

    /// Re-read every project's config file.
    pub async fn reload(&mut self) {
        let mut roots: Vec<&PathBuf> = self.projects.keys().collect();
        roots.sort();
        for root in roots {
            let settings = match ProjectSettings::discover(root, root) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!(root = %root.display(), "Keeping previous project settings: {e}");
                    continue;
                }
            };
            if let Err(e) = self.projects[root].reload_environment(settings).await {
                tracing::warn!(root = %root.display(), "Failed to reload project: {e}");
            }
        }
    }

    pub async fn shutdown(&mut self) {
        for (_, handle) in self.projects.drain() {
            handle.shutdown().await;
        }
        self.routes.clear();
    }

    fn routed(&self, path: &Path) -> Option<ProjectHandle> {
        let root = self.routes.get(path)?;
        self.projects.get(root).cloned()
    }

    fn folder_for(&self, path: &Path) -> Option<PathBuf> {
        self.folders
            .iter()
            .filter(|folder| path.starts_with(folder))
            .max_by_key(|folder| folder.components().count())
            .cloned()
    }
}
