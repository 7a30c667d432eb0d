//
// events.rs
//
// Outbound events from the lint pipeline to the client
//

use tokio::sync::mpsc;
use tower_lsp::lsp_types::{Diagnostic, Url};

/// Something the client should be told about
#[derive(Debug, Clone, PartialEq)]
pub enum LintEvent {
    /// Current diagnostic set for a document (empty after a clear)
    Diagnostics {
        uri: Url,
        diagnostics: Vec<Diagnostic>,
    },
    /// A run for `uri` is in flight
    RunStarted { uri: Url, message: String },
    /// The run for `uri` finished, was cancelled, or failed
    RunFinished { uri: Url },
    /// A failure the user should see
    Error { uri: Url, message: String },
}

pub type LintEventSender = mpsc::UnboundedSender<LintEvent>;
pub type LintEventReceiver = mpsc::UnboundedReceiver<LintEvent>;

pub fn channel() -> (LintEventSender, LintEventReceiver) {
    mpsc::unbounded_channel()
}

/// Send an event, ignoring a closed receiver (server shutting down)
pub(crate) fn emit(sender: &LintEventSender, event: LintEvent) {
    if sender.send(event).is_err() {
        log::trace!("Lint event receiver closed, dropping event");
    }
}
