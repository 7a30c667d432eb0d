// cli/check.rs - `phpcs-ls check` subcommand
//
// Lints a single file through the same runner and report parser the server
// uses, then prints one line per diagnostic. Handy for checking that a
// phpcs install and standard work before wiring up an editor.

use std::path::PathBuf;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity};
use url::Url;

use crate::config::LintConfig;
use crate::report::parse_output;
use crate::runner::{Linter, PhpcsRunner, RunOptions, RunOutcome};
use crate::state::{DocumentSnapshot, PHP_LANGUAGE_ID};

/// Parsed arguments for the `check` subcommand.
#[derive(Debug, PartialEq, Eq)]
pub struct CheckArgs {
    pub path: PathBuf,
    pub standard: String,
    pub executables_folder: String,
}

/// Parse `check` arguments from the remaining CLI args.
///
/// Expected usage: `phpcs-ls check <file> [--standard <name>] [--executables-folder <dir>]`
pub fn parse_args(args: &mut impl Iterator<Item = String>) -> Result<CheckArgs, String> {
    let defaults = LintConfig::default();
    let mut path: Option<PathBuf> = None;
    let mut standard = defaults.standard;
    let mut executables_folder = defaults.executables_folder;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--standard" => {
                standard = args
                    .next()
                    .ok_or_else(|| "--standard requires a name".to_string())?;
            }
            "--executables-folder" => {
                executables_folder = args
                    .next()
                    .ok_or_else(|| "--executables-folder requires a directory".to_string())?;
            }
            other if other.starts_with('-') => {
                return Err(format!("Unknown flag: '{}'", other));
            }
            _ => {
                if path.is_some() {
                    return Err("Multiple files provided; expected exactly one".to_string());
                }
                path = Some(PathBuf::from(arg));
            }
        }
    }

    let path = path.ok_or_else(|| "Missing required <file> argument".to_string())?;
    if !path.is_file() {
        return Err(format!("Not a file: {}", path.display()));
    }

    Ok(CheckArgs {
        path,
        standard,
        executables_folder,
    })
}

/// Lint the file once and print its diagnostics. Returns how many were found.
pub async fn run_check(args: &CheckArgs) -> anyhow::Result<usize> {
    let path = args
        .path
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", args.path.display()))?;
    let text = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let uri = Url::from_file_path(&path)
        .map_err(|_| anyhow::anyhow!("not an absolute path: {}", path.display()))?;

    let snapshot = DocumentSnapshot::new(uri, text, PHP_LANGUAGE_ID);
    let options = RunOptions {
        executables_folder: args.executables_folder.clone(),
        standard: args.standard.clone(),
        working_dir: std::env::current_dir().ok(),
    };

    let outcome = PhpcsRunner::new()
        .run(&snapshot, &options, CancellationToken::new())
        .await?;

    let diagnostics = match outcome {
        RunOutcome::Output { stdout, stderr } => parse_output(&stdout, &stderr)?,
        RunOutcome::Empty => {
            eprintln!("phpcs produced no output for {}", path.display());
            return Ok(0);
        }
        RunOutcome::Cancelled => return Ok(0),
    };

    for diagnostic in &diagnostics {
        println!("{}", format_diagnostic(&path.display().to_string(), diagnostic));
    }
    Ok(diagnostics.len())
}

/// `path:line:col: severity message`, with 1-based line and column
pub fn format_diagnostic(path: &str, diagnostic: &Diagnostic) -> String {
    let severity = match diagnostic.severity {
        Some(DiagnosticSeverity::ERROR) => "error",
        Some(DiagnosticSeverity::WARNING) => "warning",
        Some(DiagnosticSeverity::INFORMATION) => "info",
        _ => "hint",
    };
    format!(
        "{}:{}:{}: {} {}",
        path,
        diagnostic.range.start.line + 1,
        diagnostic.range.start.character + 1,
        severity,
        diagnostic.message.replace('\n', " ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::{Position, Range};

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_parse_args_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let parsed = parse_args(&mut args(&[&path])).unwrap();
        assert_eq!(parsed.path, PathBuf::from(&path));
        assert_eq!(parsed.standard, "PSR12");
        assert_eq!(parsed.executables_folder, "");
    }

    #[test]
    fn test_parse_args_all_flags() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let parsed = parse_args(&mut args(&[
            "--standard",
            "PSR2",
            &path,
            "--executables-folder",
            "vendor/bin",
        ]))
        .unwrap();
        assert_eq!(parsed.standard, "PSR2");
        assert_eq!(parsed.executables_folder, "vendor/bin");
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&mut args(&[])).unwrap_err().contains("Missing"));
        assert!(parse_args(&mut args(&["--standard"]))
            .unwrap_err()
            .contains("requires"));
        assert!(parse_args(&mut args(&["--bogus"]))
            .unwrap_err()
            .contains("Unknown flag"));
        assert!(parse_args(&mut args(&["/definitely/not/here.php"]))
            .unwrap_err()
            .contains("Not a file"));

        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert!(parse_args(&mut args(&[&path, &path]))
            .unwrap_err()
            .contains("Multiple"));
    }

    #[test]
    fn test_format_diagnostic() {
        let diagnostic = Diagnostic {
            range: Range::new(Position::new(2, 4), Position::new(2, 4)),
            severity: Some(DiagnosticSeverity::WARNING),
            source: Some("phpcs".to_string()),
            message: "[Generic.Files.LineLength.TooLong]\nLine exceeds 120 characters".to_string(),
            ..Default::default()
        };
        assert_eq!(
            format_diagnostic("src/a.php", &diagnostic),
            "src/a.php:3:5: warning [Generic.Files.LineLength.TooLong] Line exceeds 120 characters"
        );
    }
}
