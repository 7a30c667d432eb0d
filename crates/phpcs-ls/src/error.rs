//
// error.rs
//
// Failures a lint run surfaces to the user
//

use std::path::PathBuf;

/// Lint failures worth telling the user about.
///
/// Cancellation, empty output and timeouts are not errors; they are
/// reported through [`crate::runner::RunOutcome`] instead.
#[derive(Debug, thiserror::Error)]
pub enum LintError {
    #[error("failed to spawn {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse phpcs report:\n{raw}\n{source}")]
    Parse {
        /// stdout followed by stderr, exactly as the tool produced them
        raw: String,
        #[source]
        source: serde_json::Error,
    },
}
