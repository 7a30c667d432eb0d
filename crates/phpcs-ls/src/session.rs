//
// session.rs
//
// Document lifecycle and configuration fan-out. The backend decodes LSP
// notifications and hands them here; everything below talks to the
// scheduler and coordinator only.
//

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, Url};

use crate::config::{self, LintConfig};
use crate::coordinator::{LintResult, RunCoordinator};
use crate::state::WorldState;
use crate::trigger::TriggerScheduler;

/// What a configuration change did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChange {
    /// Nothing for us in the payload; configuration kept as is
    Ignored,
    /// Stored, trigger subscription untouched
    Updated,
    /// Stored and the trigger subscription reinstalled
    Rewired,
}

pub struct LintSession {
    state: Arc<RwLock<WorldState>>,
    coordinator: Arc<RunCoordinator>,
    scheduler: TriggerScheduler,
}

impl LintSession {
    pub fn new(state: Arc<RwLock<WorldState>>, coordinator: Arc<RunCoordinator>) -> Self {
        let scheduler = TriggerScheduler::new(coordinator.clone());
        Self {
            state,
            coordinator,
            scheduler,
        }
    }

    pub fn state(&self) -> &Arc<RwLock<WorldState>> {
        &self.state
    }

    pub fn coordinator(&self) -> &Arc<RunCoordinator> {
        &self.coordinator
    }

    pub fn scheduler(&self) -> &TriggerScheduler {
        &self.scheduler
    }

    /// Record the initial workspace folders and any configuration sent with
    /// `initializationOptions`
    pub async fn initialize(&self, folders: Vec<Url>, config: Option<LintConfig>) {
        {
            let mut state = self.state.write().await;
            for folder in &folders {
                log::info!("Adding workspace folder: {}", folder);
            }
            state.workspace_folders = folders.clone();
            if let Some(config) = config {
                state.config = config;
            }
        }
        self.coordinator.set_workspace_folders(&folders).await;
    }

    /// Install the first trigger subscription, preferring `pulled` over
    /// whatever configuration is already stored
    pub async fn start(&self, pulled: Option<LintConfig>) -> LintConfig {
        let config = {
            let mut state = self.state.write().await;
            if let Some(config) = pulled {
                state.config = config;
            }
            state.config.clone()
        };
        config::log_config(&config);
        self.install_trigger(&config);
        config
    }

    fn install_trigger(&self, config: &LintConfig) {
        self.scheduler.reconfigure(
            config.run,
            Duration::from_millis(config.on_type_delay_ms),
        );
    }

    /// Opening always lints, whatever the trigger mode
    pub async fn document_opened(
        &self,
        uri: Url,
        text: &str,
        language_id: &str,
        version: i32,
    ) -> Option<JoinHandle<LintResult>> {
        let snapshot = {
            let mut state = self.state.write().await;
            state.open_document(uri.clone(), text, language_id, Some(version));
            state.snapshot(&uri)
        }?;
        self.coordinator.validate(snapshot)
    }

    pub async fn document_changed(
        &self,
        uri: &Url,
        changes: Vec<TextDocumentContentChangeEvent>,
        version: i32,
    ) {
        let snapshot = {
            let mut state = self.state.write().await;
            for change in changes {
                state.apply_change(uri, change);
            }
            state.set_version(uri, version);
            state.snapshot(uri)
        };
        if let Some(snapshot) = snapshot {
            self.scheduler.document_changed(snapshot);
        }
    }

    pub async fn document_saved(&self, uri: &Url) {
        let snapshot = self.state.read().await.snapshot(uri);
        if let Some(snapshot) = snapshot {
            self.scheduler.document_saved(snapshot);
        }
    }

    /// Drop the document, its pending debounce, its run and its diagnostics
    pub async fn document_closed(&self, uri: &Url) {
        self.state.write().await.close_document(uri);
        self.scheduler.document_closed(uri);
        self.coordinator.clear(uri);
    }

    /// Apply a configuration change. `None` means the notification carried
    /// nothing we could parse, and the current configuration stays.
    ///
    /// Any accepted change re-lints every open document; only a change of
    /// `run` or `onTypeDelay` reinstalls the trigger subscription.
    pub async fn configuration_changed(
        &self,
        new_config: Option<LintConfig>,
    ) -> (ConfigChange, Vec<JoinHandle<LintResult>>) {
        let Some(new_config) = new_config else {
            log::warn!("No phpcs settings in configuration change, keeping current configuration");
            return (ConfigChange::Ignored, Vec::new());
        };

        let trigger_changed = {
            let mut state = self.state.write().await;
            let changed = state.config.trigger_settings_changed(&new_config);
            state.config = new_config.clone();
            changed
        };
        config::log_config(&new_config);

        let change = if trigger_changed {
            self.install_trigger(&new_config);
            ConfigChange::Rewired
        } else {
            ConfigChange::Updated
        };
        (change, self.refresh_all().await)
    }

    pub async fn workspace_folders_changed(
        &self,
        added: Vec<Url>,
        removed: Vec<Url>,
    ) -> Vec<JoinHandle<LintResult>> {
        let folders = {
            let mut state = self.state.write().await;
            state.workspace_folders.retain(|f| !removed.contains(f));
            for folder in added {
                log::info!("Adding workspace folder: {}", folder);
                state.workspace_folders.push(folder);
            }
            state.workspace_folders.clone()
        };

        self.coordinator.set_workspace_folders(&folders).await;
        self.refresh_all().await
    }

    async fn refresh_all(&self) -> Vec<JoinHandle<LintResult>> {
        let snapshots = self.state.read().await.snapshots();
        self.coordinator.refresh(snapshots)
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.coordinator.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use crate::config::{parse_lint_config, TriggerMode};
    use crate::diagnostic_store::DiagnosticStore;
    use crate::error::LintError;
    use crate::events::{self, LintEventReceiver};
    use crate::runner::{Linter, RunOptions, RunOutcome};
    use crate::settings::StaticSettings;
    use crate::state::DocumentSnapshot;
    use crate::trigger::DebounceState;

    const ONE_WARNING: &str = r#"{"files":{"STDIN":{"messages":[{"message":"meh","line":1,"column":1,"type":"WARNING","source":"Y.Sniff"}]}}}"#;

    /// Records every run and answers with one warning
    #[derive(Default)]
    struct RecordingLinter {
        calls: Mutex<Vec<(String, RunOptions)>>,
    }

    impl RecordingLinter {
        fn texts(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(text, _)| text.clone())
                .collect()
        }

        fn last_options(&self) -> Option<RunOptions> {
            self.calls.lock().unwrap().last().map(|(_, o)| o.clone())
        }
    }

    #[async_trait]
    impl Linter for RecordingLinter {
        async fn run(
            &self,
            snapshot: &DocumentSnapshot,
            options: &RunOptions,
            _cancel: CancellationToken,
        ) -> Result<RunOutcome, LintError> {
            self.calls
                .lock()
                .unwrap()
                .push((snapshot.text.clone(), options.clone()));
            Ok(RunOutcome::Output {
                stdout: ONE_WARNING.to_string(),
                stderr: String::new(),
            })
        }
    }

    struct Fixture {
        session: LintSession,
        linter: Arc<RecordingLinter>,
        _events: LintEventReceiver,
    }

    fn fixture() -> Fixture {
        let (tx, rx) = events::channel();
        let linter = Arc::new(RecordingLinter::default());
        let coordinator = Arc::new(RunCoordinator::new(
            Arc::new(DiagnosticStore::new(tx.clone())),
            linter.clone(),
            Arc::new(StaticSettings(LintConfig::default())),
            tx,
        ));
        let state = Arc::new(RwLock::new(WorldState::new()));
        Fixture {
            session: LintSession::new(state, coordinator),
            linter,
            _events: rx,
        }
    }

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///project/{}", name)).unwrap()
    }

    fn on_type(delay_ms: u64) -> LintConfig {
        LintConfig {
            run: TriggerMode::OnType,
            on_type_delay_ms: delay_ms,
            ..LintConfig::default()
        }
    }

    async fn join(handles: Vec<JoinHandle<LintResult>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_open_validates_in_on_save_mode() {
        let f = fixture();
        f.session.start(None).await;
        assert_eq!(f.session.scheduler().active_mode(), Some(TriggerMode::OnSave));

        let run = f
            .session
            .document_opened(uri("a.php"), "<?php", "php", 1)
            .await
            .unwrap();
        run.await.unwrap();

        assert_eq!(f.linter.texts(), vec!["<?php".to_string()]);
        assert!(f.session.coordinator().store().contains(&uri("a.php")));
    }

    #[tokio::test]
    async fn test_open_skips_other_languages() {
        let f = fixture();
        f.session.start(None).await;
        assert!(f
            .session
            .document_opened(uri("notes.txt"), "hi", "plaintext", 1)
            .await
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_debounce_and_clears_diagnostics() {
        let f = fixture();
        f.session.start(Some(on_type(250))).await;

        let run = f
            .session
            .document_opened(uri("a.php"), "<?php", "php", 1)
            .await
            .unwrap();
        run.await.unwrap();

        let full = TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: "<?php echo 1;".to_string(),
        };
        f.session.document_changed(&uri("a.php"), vec![full], 2).await;
        assert!(matches!(
            f.session.scheduler().pending_state(&uri("a.php")),
            DebounceState::Pending { .. }
        ));

        f.session.document_closed(&uri("a.php")).await;
        assert_eq!(
            f.session.scheduler().pending_state(&uri("a.php")),
            DebounceState::Idle
        );
        assert!(!f.session.coordinator().store().contains(&uri("a.php")));
        assert!(f.session.state().read().await.get_document(&uri("a.php")).is_none());

        // The cancelled debounce never fires
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(f.linter.texts(), vec!["<?php".to_string()]);
    }

    #[tokio::test]
    async fn test_foreign_settings_keep_on_type_mode() {
        let f = fixture();
        f.session.start(Some(on_type(400))).await;
        let installs = f.session.scheduler().installs();

        let pushed = parse_lint_config(&serde_json::json!({
            "intelephense": { "files": { "maxSize": 5 } }
        }));
        let (change, runs) = f.session.configuration_changed(pushed).await;

        assert_eq!(change, ConfigChange::Ignored);
        assert!(runs.is_empty());
        assert_eq!(f.session.scheduler().active_mode(), Some(TriggerMode::OnType));
        assert_eq!(f.session.scheduler().installs(), installs);
        assert_eq!(f.session.state().read().await.config, on_type(400));
    }

    #[tokio::test]
    async fn test_standard_change_refreshes_without_rewiring() {
        let f = fixture();
        f.session.start(Some(on_type(400))).await;
        join(
            f.session
                .document_opened(uri("a.php"), "<?php", "php", 1)
                .await
                .into_iter()
                .collect(),
        )
        .await;
        let installs = f.session.scheduler().installs();

        let new_config = LintConfig {
            standard: "PSR2".to_string(),
            ..on_type(400)
        };
        let (change, runs) = f.session.configuration_changed(Some(new_config)).await;
        assert_eq!(change, ConfigChange::Updated);
        assert_eq!(runs.len(), 1);
        join(runs).await;

        assert_eq!(f.session.scheduler().installs(), installs);
        assert_eq!(f.linter.texts().len(), 2);
        assert_eq!(f.session.state().read().await.config.standard, "PSR2");
    }

    #[tokio::test]
    async fn test_mode_change_rewires_and_refreshes() {
        let f = fixture();
        f.session.start(Some(on_type(400))).await;
        join(
            f.session
                .document_opened(uri("a.php"), "<?php", "php", 1)
                .await
                .into_iter()
                .collect(),
        )
        .await;
        let installs = f.session.scheduler().installs();

        let (change, runs) = f
            .session
            .configuration_changed(Some(LintConfig::default()))
            .await;
        assert_eq!(change, ConfigChange::Rewired);
        join(runs).await;

        assert_eq!(f.session.scheduler().active_mode(), Some(TriggerMode::OnSave));
        assert_eq!(f.session.scheduler().installs(), installs + 1);
        assert_eq!(f.linter.texts().len(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_workspace_folder_change_moves_working_dir() {
        let f = fixture();
        f.session.initialize(vec![uri("old")], None).await;
        f.session.start(None).await;
        join(
            f.session
                .document_opened(uri("a.php"), "<?php", "php", 1)
                .await
                .into_iter()
                .collect(),
        )
        .await;
        assert_eq!(
            f.linter.last_options().unwrap().working_dir,
            Some(PathBuf::from("/project/old"))
        );

        let runs = f
            .session
            .workspace_folders_changed(vec![uri("new")], vec![uri("old")])
            .await;
        assert_eq!(runs.len(), 1);
        join(runs).await;

        assert_eq!(
            f.linter.last_options().unwrap().working_dir,
            Some(PathBuf::from("/project/new"))
        );
        assert_eq!(
            f.session.state().read().await.workspace_folders,
            vec![uri("new")]
        );
    }

    #[tokio::test]
    async fn test_initialization_options_seed_config() {
        let f = fixture();
        f.session.initialize(Vec::new(), Some(on_type(100))).await;
        let config = f.session.start(None).await;
        assert_eq!(config, on_type(100));
        assert_eq!(f.session.scheduler().active_mode(), Some(TriggerMode::OnType));
    }
}
