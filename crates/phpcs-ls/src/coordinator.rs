//
// coordinator.rs
//
// Starts, supersedes and commits phpcs runs per document
//

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::{Diagnostic, Url};

use crate::diagnostic_store::DiagnosticStore;
use crate::error::LintError;
use crate::events::{emit, LintEvent, LintEventSender};
use crate::perf::{self, TimingGuard};
use crate::report::parse_output;
use crate::run_registry::{RunHandle, RunRegistry};
use crate::runner::{Linter, RunOptions, RunOutcome};
use crate::settings::SettingsSource;
use crate::state::DocumentSnapshot;

/// How a validation ended
#[derive(Debug)]
pub enum LintResult {
    /// Superseded, closed, or cancelled; nothing was committed
    Cancelled,
    /// phpcs printed nothing; prior diagnostics were kept
    Empty,
    /// Diagnostics were committed to the store
    Parsed(Vec<Diagnostic>),
    /// Spawn or parse failure; prior diagnostics were kept
    Failed(LintError),
}

/// Owns the run-per-document lifecycle.
///
/// Only the most recently started run for a document can write to the
/// [`DiagnosticStore`]; anything it supersedes is cancelled and its output
/// discarded.
pub struct RunCoordinator {
    registry: RunRegistry,
    store: Arc<DiagnosticStore>,
    linter: Arc<dyn Linter>,
    settings: Arc<dyn SettingsSource>,
    working_dir: RwLock<Option<PathBuf>>,
    events: LintEventSender,
}

impl RunCoordinator {
    pub fn new(
        store: Arc<DiagnosticStore>,
        linter: Arc<dyn Linter>,
        settings: Arc<dyn SettingsSource>,
        events: LintEventSender,
    ) -> Self {
        Self {
            registry: RunRegistry::new(),
            store,
            linter,
            settings,
            working_dir: RwLock::new(None),
            events,
        }
    }

    pub fn store(&self) -> &Arc<DiagnosticStore> {
        &self.store
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    /// Use the first workspace folder on disk as the phpcs working directory
    pub async fn set_workspace_folders(&self, folders: &[Url]) {
        let dir = folders
            .iter()
            .filter(|f| f.scheme() == "file")
            .find_map(|f| f.to_file_path().ok());
        log::trace!("phpcs working directory: {:?}", dir);
        *self.working_dir.write().await = dir;
    }

    /// Lint `snapshot`, cancelling any run already in flight for it.
    ///
    /// The new run is registered before this returns, so runs start in the
    /// order `validate` is called. Returns `None` for non-PHP documents.
    pub fn validate(self: &Arc<Self>, snapshot: DocumentSnapshot) -> Option<JoinHandle<LintResult>> {
        if !snapshot.is_php() {
            log::trace!(
                "Skipping {} (language '{}')",
                snapshot.uri,
                snapshot.language_id
            );
            return None;
        }

        let handle = self.registry.begin(&snapshot.uri);
        let coordinator = Arc::clone(self);
        Some(tokio::spawn(async move {
            coordinator.execute(snapshot, handle).await
        }))
    }

    /// Drop every diagnostic and re-lint the given open documents
    pub fn refresh(self: &Arc<Self>, snapshots: Vec<DocumentSnapshot>) -> Vec<JoinHandle<LintResult>> {
        log::trace!("Refreshing diagnostics for {} documents", snapshots.len());
        self.store.clear_all();
        snapshots
            .into_iter()
            .filter_map(|snapshot| self.validate(snapshot))
            .collect()
    }

    /// Forget `uri` entirely: cancel its run and remove its diagnostics
    pub fn clear(&self, uri: &Url) {
        self.registry.cancel(uri);
        self.store.clear(uri);
    }

    /// Cancel all in-flight runs
    pub fn shutdown(&self) {
        self.registry.cancel_all();
    }

    async fn execute(&self, snapshot: DocumentSnapshot, handle: RunHandle) -> LintResult {
        let uri = snapshot.uri.clone();
        emit(
            &self.events,
            LintEvent::RunStarted {
                uri: uri.clone(),
                message: format!("PHP_CodeSniffer: validating {}", snapshot.display_name()),
            },
        );

        let result = self.lint(&snapshot, &handle).await;
        match &result {
            LintResult::Cancelled => {
                perf::increment_runs_cancelled();
                log::trace!("Run {} for {} cancelled", handle.id, uri)
            }
            LintResult::Empty => {
                log::trace!("phpcs returned no output for {}, keeping diagnostics", uri)
            }
            LintResult::Parsed(diagnostics) => {
                log::trace!("{} diagnostics for {}", diagnostics.len(), uri)
            }
            LintResult::Failed(e) => {
                perf::increment_runs_failed();
                log::error!("phpcs failed for {}: {}", uri, e);
                emit(
                    &self.events,
                    LintEvent::Error {
                        uri: uri.clone(),
                        message: e.to_string(),
                    },
                );
            }
        }

        self.registry.finish(&uri, &handle);
        emit(&self.events, LintEvent::RunFinished { uri });
        result
    }

    async fn lint(&self, snapshot: &DocumentSnapshot, handle: &RunHandle) -> LintResult {
        // Settings are resolved per run so edits apply without a restart
        let config = {
            let _timing = TimingGuard::new("resolve settings");
            tokio::select! {
                _ = handle.token.cancelled() => return LintResult::Cancelled,
                config = self.settings.resolve(&snapshot.uri) => config,
            }
        };
        let options = RunOptions {
            executables_folder: config.executables_folder,
            standard: config.standard,
            working_dir: self.working_dir.read().await.clone(),
        };

        let outcome = match self
            .linter
            .run(snapshot, &options, handle.token.clone())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return LintResult::Failed(e),
        };

        let (stdout, stderr) = match outcome {
            RunOutcome::Cancelled => return LintResult::Cancelled,
            RunOutcome::Empty => return LintResult::Empty,
            RunOutcome::Output { stdout, stderr } => (stdout, stderr),
        };

        if handle.is_cancelled() {
            return LintResult::Cancelled;
        }

        let diagnostics = match parse_output(&stdout, &stderr) {
            Ok(diagnostics) => diagnostics,
            Err(e) => return LintResult::Failed(e),
        };

        let committed = self.registry.commit_if_current(&snapshot.uri, handle, || {
            self.store.set(&snapshot.uri, diagnostics.clone())
        });
        if committed {
            LintResult::Parsed(diagnostics)
        } else {
            LintResult::Cancelled
        }
    }
}
