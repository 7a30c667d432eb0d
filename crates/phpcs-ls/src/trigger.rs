//
// trigger.rs
//
// Decides when document events turn into lint runs
//

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::Url;

use crate::config::TriggerMode;
use crate::coordinator::RunCoordinator;
use crate::state::DocumentSnapshot;

/// Receiver of snapshots that should be linted now
pub trait ValidationTarget: Send + Sync + 'static {
    fn trigger(self: Arc<Self>, snapshot: DocumentSnapshot);
}

impl ValidationTarget for RunCoordinator {
    fn trigger(self: Arc<Self>, snapshot: DocumentSnapshot) {
        // Fire and forget; the run reports through the store and events
        let _ = self.validate(snapshot);
    }
}

/// Debounce state of one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending { deadline: Instant },
}

struct PendingRun {
    id: u64,
    deadline: Instant,
    token: CancellationToken,
}

/// Collapses bursts of change events per document into one trigger.
///
/// Every event moves its document to `Pending(now + delay)`, cancelling the
/// timer of the previous event. A timer that survives its deadline fires
/// with the snapshot it was armed with, which is by construction the latest.
/// Dropping the debouncer cancels every pending timer.
pub struct Debouncer {
    delay: Duration,
    target: Arc<dyn ValidationTarget>,
    pending: Arc<DashMap<Url, PendingRun>>,
    root: CancellationToken,
    next_id: AtomicU64,
}

impl Debouncer {
    fn new(delay: Duration, target: Arc<dyn ValidationTarget>) -> Self {
        Self {
            delay,
            target,
            pending: Arc::new(DashMap::new()),
            root: CancellationToken::new(),
            next_id: AtomicU64::new(0),
        }
    }

    fn push(&self, snapshot: DocumentSnapshot) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + self.delay;
        let token = self.root.child_token();

        let previous = self.pending.insert(
            snapshot.uri.clone(),
            PendingRun {
                id,
                deadline,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        let pending = Arc::clone(&self.pending);
        let target = Arc::clone(&self.target);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => {}
            }
            let fired = pending
                .remove_if(&snapshot.uri, |_, run| run.id == id && !token.is_cancelled())
                .is_some();
            if fired {
                log::trace!("Debounce elapsed for {}", snapshot.uri);
                target.trigger(snapshot);
            }
        });
    }

    fn cancel(&self, uri: &Url) {
        if let Some((_, run)) = self.pending.remove(uri) {
            run.token.cancel();
        }
    }

    fn state(&self, uri: &Url) -> DebounceState {
        match self.pending.get(uri) {
            Some(run) => DebounceState::Pending {
                deadline: run.deadline,
            },
            None => DebounceState::Idle,
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.root.cancel();
        self.pending.clear();
    }
}

/// The one installed listener
enum Subscription {
    OnSave,
    OnType(Debouncer),
}

impl Subscription {
    fn mode(&self) -> TriggerMode {
        match self {
            Subscription::OnSave => TriggerMode::OnSave,
            Subscription::OnType(_) => TriggerMode::OnType,
        }
    }
}

/// Routes change/save events to the validation target according to the
/// configured trigger mode. Holds at most one subscription at a time.
pub struct TriggerScheduler {
    target: Arc<dyn ValidationTarget>,
    subscription: Mutex<Option<Subscription>>,
    installs: AtomicUsize,
}

impl TriggerScheduler {
    pub fn new(target: Arc<dyn ValidationTarget>) -> Self {
        Self {
            target,
            subscription: Mutex::new(None),
            installs: AtomicUsize::new(0),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tear down the current subscription and install one for `mode`
    pub fn reconfigure(&self, mode: TriggerMode, delay: Duration) {
        let mut slot = self.slot();
        // Dropping a debouncer cancels its pending timers
        drop(slot.take());

        *slot = Some(match mode {
            TriggerMode::OnSave => Subscription::OnSave,
            TriggerMode::OnType => {
                Subscription::OnType(Debouncer::new(delay, Arc::clone(&self.target)))
            }
        });
        self.installs.fetch_add(1, Ordering::Relaxed);
        log::info!("Linting {:?} (delay {:?})", mode, delay);
    }

    /// Remove the subscription; later events are ignored
    pub fn shutdown(&self) {
        drop(self.slot().take());
    }

    pub fn document_changed(&self, snapshot: DocumentSnapshot) {
        if let Some(Subscription::OnType(debouncer)) = self.slot().as_ref() {
            debouncer.push(snapshot);
        }
    }

    pub fn document_saved(&self, snapshot: DocumentSnapshot) {
        let listening = matches!(self.slot().as_ref(), Some(Subscription::OnSave));
        if listening {
            Arc::clone(&self.target).trigger(snapshot);
        }
    }

    pub fn document_closed(&self, uri: &Url) {
        if let Some(Subscription::OnType(debouncer)) = self.slot().as_ref() {
            debouncer.cancel(uri);
        }
    }

    pub fn active_mode(&self) -> Option<TriggerMode> {
        self.slot().as_ref().map(Subscription::mode)
    }

    pub fn pending_state(&self, uri: &Url) -> DebounceState {
        match self.slot().as_ref() {
            Some(Subscription::OnType(debouncer)) => debouncer.state(uri),
            _ => DebounceState::Idle,
        }
    }

    /// Number of subscriptions installed so far
    pub fn installs(&self) -> usize {
        self.installs.load(Ordering::Relaxed)
    }
}
