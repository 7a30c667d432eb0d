//
// report.rs
//
// Decoding of `phpcs --report=json` output into LSP diagnostics
//

use indexmap::IndexMap;
use serde::Deserialize;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};

use crate::error::LintError;

/// Value of `Diagnostic::source` for everything we publish
pub const DIAGNOSTIC_SOURCE: &str = "phpcs";

/// Top-level JSON report. Totals are ignored.
#[derive(Debug, Deserialize)]
pub struct RawReport {
    pub files: IndexMap<String, RawFile>,
}

#[derive(Debug, Deserialize)]
pub struct RawFile {
    pub messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
pub struct RawMessage {
    pub message: String,
    /// 1-based
    pub line: u32,
    /// 1-based
    pub column: u32,
    #[serde(rename = "type")]
    pub kind: RawMessageKind,
    /// Sniff code, e.g. `PSR12.Files.FileHeader.SpacingAfterBlock`
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RawMessageKind {
    Error,
    Warning,
}

impl From<RawMessageKind> for DiagnosticSeverity {
    fn from(kind: RawMessageKind) -> Self {
        match kind {
            RawMessageKind::Error => DiagnosticSeverity::ERROR,
            RawMessageKind::Warning => DiagnosticSeverity::WARNING,
        }
    }
}

impl RawMessage {
    pub fn to_diagnostic(&self) -> Diagnostic {
        let point = Position::new(self.line.saturating_sub(1), self.column.saturating_sub(1));
        Diagnostic {
            range: Range::new(point, point),
            severity: Some(self.kind.into()),
            source: Some(DIAGNOSTIC_SOURCE.to_string()),
            message: format!("[{}]\n{}", self.source, self.message),
            ..Default::default()
        }
    }
}

/// Decode a report into diagnostics, in the order phpcs emitted them
pub fn parse_report(stdout: &str) -> Result<Vec<Diagnostic>, serde_json::Error> {
    let report: RawReport = serde_json::from_str(stdout)?;
    Ok(report
        .files
        .values()
        .flat_map(|file| file.messages.iter())
        .map(RawMessage::to_diagnostic)
        .collect())
}

/// Like [`parse_report`], but keeps the raw output around on failure so it can be logged
pub fn parse_output(stdout: &str, stderr: &str) -> Result<Vec<Diagnostic>, LintError> {
    parse_report(stdout).map_err(|source| LintError::Parse {
        raw: format!("{}{}", stdout, stderr),
        source,
    })
}
