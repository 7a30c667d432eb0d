//
// backend.rs
//
// Copyright (C) 2022-2026 Posit Software, PBC. All rights reserved.
// Modifications copyright (C) 2026 Jonathan Marc Bearak
//

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::notification::Notification;
use tower_lsp::lsp_types::*;
use tower_lsp::Client;
use tower_lsp::LanguageServer;
use tower_lsp::LspService;
use tower_lsp::Server;

use crate::config::{parse_lint_config, parse_section, LintConfig, SETTINGS_SECTION};
use crate::coordinator::RunCoordinator;
use crate::diagnostic_store::DiagnosticStore;
use crate::events::{self, LintEvent, LintEventReceiver};
use crate::perf;
use crate::runner::PhpcsRunner;
use crate::session::LintSession;
use crate::settings::ClientSettings;
use crate::state::WorldState;

/// Whether a run is starting or ending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusState {
    Begin,
    End,
}

/// Parameters for the phpcs/status notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusParams {
    pub uri: Url,
    pub state: StatusState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Transient status shown while a phpcs run is in flight
pub enum StatusNotification {}

impl Notification for StatusNotification {
    type Params = StatusParams;
    const METHOD: &'static str = "phpcs/status";
}

pub struct Backend {
    client: Client,
    settings: Arc<ClientSettings>,
    session: LintSession,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        let state = Arc::new(RwLock::new(WorldState::new()));
        let (events_tx, events_rx) = events::channel();

        let settings = Arc::new(ClientSettings::new(client.clone(), state.clone()));
        let store = Arc::new(DiagnosticStore::new(events_tx.clone()));
        let coordinator = Arc::new(RunCoordinator::new(
            store,
            Arc::new(PhpcsRunner::new()),
            settings.clone(),
            events_tx,
        ));

        tokio::spawn(forward_events(client.clone(), events_rx));

        Self {
            client,
            settings,
            session: LintSession::new(state, coordinator),
        }
    }

    /// Ask the client for the unscoped `phpcs` section
    async fn pull_global_config(&self) -> Option<LintConfig> {
        if !self.settings.supports_configuration() {
            return None;
        }

        let item = ConfigurationItem {
            scope_uri: None,
            section: Some(SETTINGS_SECTION.to_string()),
        };
        match self.client.configuration(vec![item]).await {
            Ok(values) => values.first().and_then(parse_section),
            Err(e) => {
                log::warn!("workspace/configuration failed: {}", e);
                None
            }
        }
    }
}

/// Deliver lint events to the client, in the order they were produced
async fn forward_events(client: Client, mut events: LintEventReceiver) {
    while let Some(event) = events.recv().await {
        match event {
            LintEvent::Diagnostics { uri, diagnostics } => {
                client.publish_diagnostics(uri, diagnostics, None).await;
            }
            LintEvent::RunStarted { uri, message } => {
                client
                    .send_notification::<StatusNotification>(StatusParams {
                        uri,
                        state: StatusState::Begin,
                        message: Some(message),
                    })
                    .await;
            }
            LintEvent::RunFinished { uri } => {
                client
                    .send_notification::<StatusNotification>(StatusParams {
                        uri,
                        state: StatusState::End,
                        message: None,
                    })
                    .await;
            }
            LintEvent::Error { uri, message } => {
                client
                    .log_message(MessageType::ERROR, format!("{}: {}", uri, message))
                    .await;
                client.show_message(MessageType::ERROR, message).await;
            }
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        log::info!("Initializing phpcs-ls");

        let supports_configuration = params
            .capabilities
            .workspace
            .as_ref()
            .and_then(|w| w.configuration)
            .unwrap_or(false);
        self.settings
            .set_supports_configuration(supports_configuration);

        let folders = match params.workspace_folders {
            Some(folders) => folders.into_iter().map(|f| f.uri).collect(),
            None => params.root_uri.into_iter().collect(),
        };
        let config = params
            .initialization_options
            .as_ref()
            .and_then(parse_lint_config);
        self.session.initialize(folders, config).await;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(false),
                        })),
                        ..Default::default()
                    },
                )),
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                        supported: Some(true),
                        change_notifications: Some(OneOf::Left(true)),
                    }),
                    file_operations: None,
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: String::from("phpcs-ls"),
                version: Some(String::from(env!("CARGO_PKG_VERSION"))),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        log::info!("phpcs-ls initialized");
        let pulled = self.pull_global_config().await;
        self.session.start(pulled).await;
    }

    async fn shutdown(&self) -> Result<()> {
        log::info!("phpcs-ls shutting down");
        self.session.shutdown();
        perf::log_summary();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        let _ = self
            .session
            .document_opened(doc.uri, &doc.text, &doc.language_id, doc.version)
            .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        self.session
            .document_changed(
                &params.text_document.uri,
                params.content_changes,
                params.text_document.version,
            )
            .await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        self.session.document_saved(&params.text_document.uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.session.document_closed(&params.text_document.uri).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        log::trace!("Configuration changed");

        // Only our own section counts; otherwise ask the client, which may
        // send an empty payload and expect a pull
        let new_config = match parse_lint_config(&params.settings) {
            Some(config) => Some(config),
            None => self.pull_global_config().await,
        };
        let _ = self.session.configuration_changed(new_config).await;
    }

    async fn did_change_workspace_folders(&self, params: DidChangeWorkspaceFoldersParams) {
        let added = params.event.added.into_iter().map(|f| f.uri).collect();
        let removed = params.event.removed.into_iter().map(|f| f.uri).collect();
        let _ = self
            .session
            .workspace_folders_changed(added, removed)
            .await;
    }
}

pub async fn start_lsp() -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}
