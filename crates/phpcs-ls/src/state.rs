//
// state.rs
//
// Copyright (C) 2024-2026 Posit Software, PBC. All rights reserved.
// Modifications copyright (C) 2026 Jonathan Marc Bearak
//

use std::collections::HashMap;
use std::path::PathBuf;

use ropey::Rope;
use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, Url};

use crate::config::LintConfig;

/// Language id of documents we lint
pub const PHP_LANGUAGE_ID: &str = "php";

/// An open document
pub struct Document {
    pub contents: Rope,
    pub language_id: String,
    pub version: Option<i32>,
    pub revision: u64,
}

impl Document {
    pub fn new(text: &str, language_id: &str, version: Option<i32>) -> Self {
        Self {
            contents: Rope::from_str(text),
            language_id: language_id.to_string(),
            version,
            revision: 0,
        }
    }

    pub fn apply_change(&mut self, change: TextDocumentContentChangeEvent) {
        if let Some(range) = change.range {
            let start_idx = self.position_to_char(range.start.line, range.start.character);
            let end_idx = self.position_to_char(range.end.line, range.end.character);
            let (start_idx, end_idx) = (start_idx.min(end_idx), start_idx.max(end_idx));

            self.contents.remove(start_idx..end_idx);
            self.contents.insert(start_idx, &change.text);
        } else {
            // Full document sync
            self.contents = Rope::from_str(&change.text);
        }

        self.revision += 1;
    }

    pub fn text(&self) -> String {
        self.contents.to_string()
    }

    /// Char index of an LSP position, clamped to the document
    fn position_to_char(&self, line: u32, utf16_character: u32) -> usize {
        let line = line as usize;
        if line >= self.contents.len_lines() {
            return self.contents.len_chars();
        }
        let line_text = self.contents.line(line).to_string();
        let line_text = line_text.trim_end_matches(['\n', '\r']);
        self.contents.line_to_char(line) + utf16_offset_to_char_offset(line_text, utf16_character)
    }
}

fn utf16_offset_to_char_offset(line_text: &str, utf16_offset: u32) -> usize {
    let utf16_offset = utf16_offset as usize;
    let mut utf16_count = 0;
    let mut char_count = 0;

    for ch in line_text.chars() {
        if utf16_count >= utf16_offset {
            return char_count;
        }
        utf16_count += ch.len_utf16();
        char_count += 1;
    }
    char_count
}

/// Immutable copy of a document handed to a lint run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub uri: Url,
    pub text: String,
    pub language_id: String,
    pub version: Option<i32>,
}

impl DocumentSnapshot {
    pub fn new(uri: Url, text: impl Into<String>, language_id: impl Into<String>) -> Self {
        Self {
            uri,
            text: text.into(),
            language_id: language_id.into(),
            version: None,
        }
    }

    /// Filesystem path backing this document, if it has one
    pub fn file_path(&self) -> Option<PathBuf> {
        if self.uri.scheme() != "file" {
            return None;
        }
        self.uri.to_file_path().ok()
    }

    pub fn is_php(&self) -> bool {
        self.language_id == PHP_LANGUAGE_ID
    }

    /// Short name for status messages
    pub fn display_name(&self) -> String {
        self.uri
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.uri.to_string())
    }
}

/// Server-wide mutable state guarded by the backend's lock
pub struct WorldState {
    pub documents: HashMap<Url, Document>,
    pub workspace_folders: Vec<Url>,
    /// Last configuration received from the client (unscoped)
    pub config: LintConfig,
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldState {
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
            workspace_folders: Vec::new(),
            config: LintConfig::default(),
        }
    }

    pub fn open_document(&mut self, uri: Url, text: &str, language_id: &str, version: Option<i32>) {
        self.documents
            .insert(uri, Document::new(text, language_id, version));
    }

    pub fn close_document(&mut self, uri: &Url) {
        self.documents.remove(uri);
    }

    pub fn apply_change(&mut self, uri: &Url, change: TextDocumentContentChangeEvent) {
        if let Some(doc) = self.documents.get_mut(uri) {
            doc.apply_change(change);
        }
    }

    pub fn set_version(&mut self, uri: &Url, version: i32) {
        if let Some(doc) = self.documents.get_mut(uri) {
            doc.version = Some(version);
        }
    }

    pub fn get_document(&self, uri: &Url) -> Option<&Document> {
        self.documents.get(uri)
    }

    pub fn snapshot(&self, uri: &Url) -> Option<DocumentSnapshot> {
        self.documents.get(uri).map(|doc| DocumentSnapshot {
            uri: uri.clone(),
            text: doc.text(),
            language_id: doc.language_id.clone(),
            version: doc.version,
        })
    }

    /// Snapshots of every open document
    pub fn snapshots(&self) -> Vec<DocumentSnapshot> {
        self.documents
            .keys()
            .filter_map(|uri| self.snapshot(uri))
            .collect()
    }
}
