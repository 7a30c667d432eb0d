//! End-to-end tests for the lint pipeline: trigger scheduling, run
//! supersession, and diagnostic publication, driven through the public API
//! with a scripted linter in place of phpcs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::Url;

use phpcs_ls::config::{LintConfig, TriggerMode};
use phpcs_ls::coordinator::{LintResult, RunCoordinator};
use phpcs_ls::diagnostic_store::DiagnosticStore;
use phpcs_ls::error::LintError;
use phpcs_ls::events::{self, LintEvent, LintEventReceiver};
use phpcs_ls::runner::{Linter, RunOptions, RunOutcome};
use phpcs_ls::settings::StaticSettings;
use phpcs_ls::state::DocumentSnapshot;
use phpcs_ls::trigger::TriggerScheduler;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Reports one warning whose message is the document text. Texts with a
/// registered gate block until the gate is opened.
#[derive(Default)]
struct EchoLinter {
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    calls: Mutex<Vec<String>>,
}

impl EchoLinter {
    fn gate(&self, text: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(text.to_string(), gate.clone());
        gate
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Linter for EchoLinter {
    async fn run(
        &self,
        snapshot: &DocumentSnapshot,
        _options: &RunOptions,
        _cancel: CancellationToken,
    ) -> Result<RunOutcome, LintError> {
        self.calls.lock().unwrap().push(snapshot.text.clone());
        let gate = self.gates.lock().unwrap().get(&snapshot.text).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        // Output comes back even when cancelled; the coordinator must drop it
        let stdout = serde_json::json!({
            "files": { "STDIN": { "messages": [{
                "message": snapshot.text,
                "line": 1,
                "column": 1,
                "type": "WARNING",
                "source": "Echo.Sniff"
            }]}}
        })
        .to_string();
        Ok(RunOutcome::Output {
            stdout,
            stderr: String::new(),
        })
    }
}

struct Pipeline {
    coordinator: Arc<RunCoordinator>,
    linter: Arc<EchoLinter>,
    events: LintEventReceiver,
}

fn pipeline() -> Pipeline {
    let (tx, events) = events::channel();
    let linter = Arc::new(EchoLinter::default());
    let store = Arc::new(DiagnosticStore::new(tx.clone()));
    let coordinator = Arc::new(RunCoordinator::new(
        store,
        linter.clone(),
        Arc::new(StaticSettings(LintConfig::default())),
        tx,
    ));
    Pipeline {
        coordinator,
        linter,
        events,
    }
}

fn uri(name: &str) -> Url {
    Url::parse(&format!("file:///project/{}", name)).unwrap()
}

fn php(name: &str, text: &str) -> DocumentSnapshot {
    DocumentSnapshot::new(uri(name), text, "php")
}

/// Message texts of the diagnostics currently published for `uri`
fn published(coordinator: &RunCoordinator, uri: &Url) -> Option<Vec<String>> {
    coordinator.store().get(uri).map(|diagnostics| {
        diagnostics
            .into_iter()
            .map(|d| d.message.trim_start_matches("[Echo.Sniff]\n").to_string())
            .collect()
    })
}

fn drain(events: &mut LintEventReceiver) -> Vec<LintEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn newer_run_wins_over_slower_older_run() {
    let p = pipeline();
    let old_gate = p.linter.gate("<?php // v1");

    let old = p.coordinator.validate(php("a.php", "<?php // v1")).unwrap();
    let new = p.coordinator.validate(php("a.php", "<?php // v2")).unwrap();

    assert!(matches!(new.await.unwrap(), LintResult::Parsed(_)));
    assert_eq!(
        published(&p.coordinator, &uri("a.php")),
        Some(vec!["<?php // v2".to_string()])
    );

    // The superseded run finishing late must not overwrite anything
    old_gate.notify_one();
    assert!(matches!(old.await.unwrap(), LintResult::Cancelled));
    assert_eq!(
        published(&p.coordinator, &uri("a.php")),
        Some(vec!["<?php // v2".to_string()])
    );
}

#[tokio::test]
async fn closing_during_a_run_leaves_no_diagnostics() {
    let p = pipeline();
    let gate = p.linter.gate("<?php echo 1;");

    let run = p.coordinator.validate(php("a.php", "<?php echo 1;")).unwrap();
    p.coordinator.clear(&uri("a.php"));
    gate.notify_one();

    assert!(matches!(run.await.unwrap(), LintResult::Cancelled));
    assert_eq!(published(&p.coordinator, &uri("a.php")), None);
    assert!(!p.coordinator.registry().is_running(&uri("a.php")));
}

#[tokio::test]
async fn one_run_publishes_status_then_diagnostics() {
    let mut p = pipeline();

    let run = p.coordinator.validate(php("index.php", "<?php")).unwrap();
    run.await.unwrap();

    let events = drain(&mut p.events);
    assert_eq!(events.len(), 3);
    assert_eq!(
        events[0],
        LintEvent::RunStarted {
            uri: uri("index.php"),
            message: "PHP_CodeSniffer: validating index.php".to_string(),
        }
    );
    assert!(matches!(&events[1], LintEvent::Diagnostics { diagnostics, .. } if diagnostics.len() == 1));
    assert_eq!(events[2], LintEvent::RunFinished { uri: uri("index.php") });
}

#[tokio::test(start_paused = true)]
async fn typing_burst_lints_only_the_final_text() {
    let p = pipeline();
    let scheduler = TriggerScheduler::new(p.coordinator.clone());
    scheduler.reconfigure(TriggerMode::OnType, Duration::from_millis(250));

    for text in ["<?php $", "<?php $a", "<?php $a = 1;"] {
        scheduler.document_changed(php("a.php", text));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(p.linter.calls().is_empty());

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(p.linter.calls(), vec!["<?php $a = 1;".to_string()]);
    assert_eq!(
        published(&p.coordinator, &uri("a.php")),
        Some(vec!["<?php $a = 1;".to_string()])
    );
}

#[tokio::test(start_paused = true)]
async fn switching_to_on_save_stops_on_type_runs() {
    let p = pipeline();
    let scheduler = TriggerScheduler::new(p.coordinator.clone());
    scheduler.reconfigure(TriggerMode::OnType, Duration::from_millis(250));

    scheduler.document_changed(php("a.php", "<?php // typed"));
    scheduler.reconfigure(TriggerMode::OnSave, Duration::from_millis(250));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(p.linter.calls().is_empty());

    scheduler.document_changed(php("a.php", "<?php // typed again"));
    scheduler.document_saved(php("a.php", "<?php // saved"));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(p.linter.calls(), vec!["<?php // saved".to_string()]);
}

#[tokio::test]
async fn refresh_relints_every_open_document() {
    let p = pipeline();

    let runs = p.coordinator.refresh(vec![
        php("a.php", "<?php // a"),
        php("b.php", "<?php // b"),
        DocumentSnapshot::new(uri("notes.txt"), "plain", "plaintext"),
    ]);
    assert_eq!(runs.len(), 2);
    for run in runs {
        run.await.unwrap();
    }

    assert_eq!(
        published(&p.coordinator, &uri("a.php")),
        Some(vec!["<?php // a".to_string()])
    );
    assert_eq!(
        published(&p.coordinator, &uri("b.php")),
        Some(vec!["<?php // b".to_string()])
    );
    assert_eq!(published(&p.coordinator, &uri("notes.txt")), None);
}
