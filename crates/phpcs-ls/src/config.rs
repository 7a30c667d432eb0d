//
// config.rs
//
// Lint configuration and client settings parsing
//

use std::path::{Path, PathBuf};

/// Settings section the client stores our keys under
pub const SETTINGS_SECTION: &str = "phpcs";

/// When a document gets linted after the user touches it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerMode {
    /// Lint when the document is saved
    #[default]
    OnSave,
    /// Lint after edits, once the document has been quiet for `on_type_delay_ms`
    OnType,
}

impl TriggerMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "onSave" => Some(TriggerMode::OnSave),
            "onType" => Some(TriggerMode::OnType),
            _ => None,
        }
    }
}

/// Resolved configuration for linting one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintConfig {
    /// Trigger mode (`run` setting)
    pub run: TriggerMode,
    /// Quiet period before an on-type run fires
    pub on_type_delay_ms: u64,
    /// Folder holding the phpcs executable; empty means resolve via PATH
    pub executables_folder: String,
    /// Coding standard passed to `--standard`
    pub standard: String,
    /// Sniffs a fixer skips when formatting snippets. Carried for clients
    /// that share one settings section with a fixer; linting ignores it.
    pub snippet_exclude_sniffs: Vec<String>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            run: TriggerMode::OnSave,
            on_type_delay_ms: 250,
            executables_folder: String::new(),
            standard: String::from("PSR12"),
            snippet_exclude_sniffs: Vec::new(),
        }
    }
}

impl LintConfig {
    /// Whether switching from `self` to `new` requires reinstalling the trigger subscription
    pub fn trigger_settings_changed(&self, new: &LintConfig) -> bool {
        self.run != new.run || self.on_type_delay_ms != new.on_type_delay_ms
    }
}

/// Platform-specific name of the phpcs executable
pub fn binary_name() -> &'static str {
    if cfg!(windows) {
        "phpcs.bat"
    } else {
        "phpcs"
    }
}

/// Resolve the program to spawn for the given executables folder.
///
/// An empty folder yields the bare binary name so the OS searches `PATH`.
/// A relative folder is resolved against `working_dir` when one is known.
pub fn resolve_executable(executables_folder: &str, working_dir: Option<&Path>) -> PathBuf {
    let folder = executables_folder.trim();
    if folder.is_empty() {
        return PathBuf::from(binary_name());
    }

    let folder = Path::new(folder);
    match working_dir {
        Some(wd) if folder.is_relative() => wd.join(folder).join(binary_name()),
        _ => folder.join(binary_name()),
    }
}

/// Parse lint configuration pushed by the client, as sent with
/// `initializationOptions` or `workspace/didChangeConfiguration`.
///
/// The payload is the whole settings object, so our keys must sit under
/// `phpcs`. Returns `None` when that key is missing, which is the case for
/// notifications carrying only other servers' settings.
///
/// # Examples
///
/// ```
/// use phpcs_ls::config::{parse_lint_config, TriggerMode};
/// use serde_json::json;
///
/// let cfg = parse_lint_config(&json!({
///     "phpcs": { "run": "onType", "onTypeDelay": 400, "standard": "PSR2" }
/// }))
/// .unwrap();
/// assert_eq!(cfg.run, TriggerMode::OnType);
/// assert_eq!(cfg.on_type_delay_ms, 400);
/// assert_eq!(cfg.standard, "PSR2");
///
/// assert!(parse_lint_config(&json!({ "intelephense": {} })).is_none());
/// ```
pub fn parse_lint_config(settings: &serde_json::Value) -> Option<LintConfig> {
    parse_section(settings.get(SETTINGS_SECTION)?)
}

/// Parse the `phpcs` section itself, as returned by `workspace/configuration`.
///
/// Keys that are absent or have the wrong type keep their defaults. Returns
/// `None` when `section` is not a JSON object (clients answer `null` for an
/// unset section).
pub fn parse_section(section: &serde_json::Value) -> Option<LintConfig> {
    let section = section.as_object()?;

    let mut config = LintConfig::default();

    if let Some(v) = section.get("run").and_then(|v| v.as_str()) {
        match TriggerMode::parse(v) {
            Some(mode) => config.run = mode,
            None => log::warn!("Unknown run mode '{}', using {:?}", v, config.run),
        }
    }
    if let Some(v) = section.get("onTypeDelay").and_then(|v| v.as_u64()) {
        config.on_type_delay_ms = v;
    }
    if let Some(v) = section.get("executablesFolder").and_then(|v| v.as_str()) {
        config.executables_folder = v.to_string();
    }
    if let Some(v) = section.get("standard").and_then(|v| v.as_str()) {
        if !v.trim().is_empty() {
            config.standard = v.trim().to_string();
        }
    }
    if let Some(v) = section.get("snippetExcludeSniffs").and_then(|v| v.as_array()) {
        config.snippet_exclude_sniffs = v
            .iter()
            .filter_map(|s| s.as_str())
            .map(str::to_string)
            .collect();
    }

    Some(config)
}

/// Log a parsed configuration at info level
pub fn log_config(config: &LintConfig) {
    log::info!("phpcs configuration:");
    log::info!("  run: {:?}", config.run);
    log::info!("  on_type_delay_ms: {}", config.on_type_delay_ms);
    log::info!("  executables_folder: {:?}", config.executables_folder);
    log::info!("  standard: {}", config.standard);
    log::info!(
        "  snippet_exclude_sniffs: {:?}",
        config.snippet_exclude_sniffs
    );
}
