//
// diagnostic_store.rs
//
// Last-known phpcs diagnostics per open document
//

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tower_lsp::lsp_types::{Diagnostic, Url};

use crate::events::{emit, LintEvent, LintEventSender};

/// Diagnostic sets keyed by document.
///
/// Every mutation is forwarded to the event channel while the entry is still
/// locked, so the client observes mutations in the order they were applied.
pub struct DiagnosticStore {
    entries: DashMap<Url, Vec<Diagnostic>>,
    events: LintEventSender,
}

impl DiagnosticStore {
    pub fn new(events: LintEventSender) -> Self {
        Self {
            entries: DashMap::new(),
            events,
        }
    }

    /// Replace the diagnostics for `uri`
    pub fn set(&self, uri: &Url, diagnostics: Vec<Diagnostic>) {
        let mut entry = self.entries.entry(uri.clone()).or_default();
        *entry = diagnostics;
        emit(
            &self.events,
            LintEvent::Diagnostics {
                uri: uri.clone(),
                diagnostics: entry.clone(),
            },
        );
    }

    /// Remove the entry for `uri`. Returns whether one existed.
    pub fn clear(&self, uri: &Url) -> bool {
        match self.entries.entry(uri.clone()) {
            Entry::Occupied(occupied) => {
                emit(
                    &self.events,
                    LintEvent::Diagnostics {
                        uri: uri.clone(),
                        diagnostics: Vec::new(),
                    },
                );
                occupied.remove();
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Remove every entry
    pub fn clear_all(&self) {
        let uris: Vec<Url> = self.entries.iter().map(|e| e.key().clone()).collect();
        for uri in uris {
            self.clear(&uri);
        }
    }

    pub fn get(&self, uri: &Url) -> Option<Vec<Diagnostic>> {
        self.entries.get(uri).map(|e| e.value().clone())
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.entries.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
