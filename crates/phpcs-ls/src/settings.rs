//
// settings.rs
//
// Per-document settings resolution
//

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tower_lsp::lsp_types::{ConfigurationItem, Url};
use tower_lsp::Client;

use crate::config::{parse_section, LintConfig, SETTINGS_SECTION};
use crate::state::WorldState;

/// Source of lint configuration, asked afresh for every run
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn resolve(&self, uri: &Url) -> LintConfig;
}

/// Always returns the same configuration
pub struct StaticSettings(pub LintConfig);

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn resolve(&self, _uri: &Url) -> LintConfig {
        self.0.clone()
    }
}

/// Asks the client for the `phpcs` section scoped to the document, falling
/// back to the last configuration pushed via `didChangeConfiguration`.
pub struct ClientSettings {
    client: Client,
    state: Arc<RwLock<WorldState>>,
    supports_configuration: AtomicBool,
}

impl ClientSettings {
    pub fn new(client: Client, state: Arc<RwLock<WorldState>>) -> Self {
        Self {
            client,
            state,
            supports_configuration: AtomicBool::new(false),
        }
    }

    /// Record whether the client advertised `workspace.configuration`
    pub fn set_supports_configuration(&self, supported: bool) {
        self.supports_configuration.store(supported, Ordering::Relaxed);
    }

    pub fn supports_configuration(&self) -> bool {
        self.supports_configuration.load(Ordering::Relaxed)
    }

    async fn fallback(&self) -> LintConfig {
        self.state.read().await.config.clone()
    }
}

#[async_trait]
impl SettingsSource for ClientSettings {
    async fn resolve(&self, uri: &Url) -> LintConfig {
        if !self.supports_configuration() {
            return self.fallback().await;
        }

        let item = ConfigurationItem {
            scope_uri: Some(uri.clone()),
            section: Some(SETTINGS_SECTION.to_string()),
        };
        match self.client.configuration(vec![item]).await {
            Ok(values) => match values.first().and_then(parse_section) {
                Some(config) => config,
                None => {
                    log::trace!("No phpcs settings for {}, using last known", uri);
                    self.fallback().await
                }
            },
            Err(e) => {
                log::warn!("workspace/configuration failed for {}: {}", uri, e);
                self.fallback().await
            }
        }
    }
}
