//
// run_registry.rs
//
// One live cancellation handle per document
//

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::Url;

/// Ownership token for one in-flight run of one document
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub id: u64,
    pub token: CancellationToken,
}

impl RunHandle {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Tracks the current run per document.
///
/// Replacing a handle cancels the previous one in the same map operation,
/// so two interleaved triggers for one document can never both hold a live
/// handle.
#[derive(Debug, Default)]
pub struct RunRegistry {
    handles: DashMap<Url, RunHandle>,
    next_id: AtomicU64,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run for `uri`, cancelling any previous one
    pub fn begin(&self, uri: &Url) -> RunHandle {
        let handle = RunHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        if let Some(previous) = self.handles.insert(uri.clone(), handle.clone()) {
            log::trace!("Cancelling superseded run {} for {}", previous.id, uri);
            previous.token.cancel();
        }
        handle
    }

    /// Unregister a finished run. Does nothing if a newer run replaced it.
    pub fn finish(&self, uri: &Url, handle: &RunHandle) -> bool {
        self.handles
            .remove_if(uri, |_, current| current.id == handle.id)
            .is_some()
    }

    /// Run `commit` only while `handle` is the live run for `uri`.
    ///
    /// The registry entry stays locked during `commit`, so a concurrent
    /// [`begin`](Self::begin) or [`cancel`](Self::cancel) for the same
    /// document waits until the commit is done.
    pub fn commit_if_current<F>(&self, uri: &Url, handle: &RunHandle, commit: F) -> bool
    where
        F: FnOnce(),
    {
        match self.handles.get(uri) {
            Some(current) if current.id == handle.id && !current.is_cancelled() => {
                commit();
                true
            }
            _ => false,
        }
    }

    /// Cancel and forget the run for `uri`
    pub fn cancel(&self, uri: &Url) {
        if let Some((_, handle)) = self.handles.remove(uri) {
            handle.token.cancel();
        }
    }

    /// Cancel and forget every run
    pub fn cancel_all(&self) {
        let uris: Vec<Url> = self.handles.iter().map(|e| e.key().clone()).collect();
        for uri in uris {
            self.cancel(&uri);
        }
    }

    pub fn is_running(&self, uri: &Url) -> bool {
        self.handles.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
