use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;

use crate::errors::DeskPilotResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Observation,
    Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: EntryKind,
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Append-only session log. Planning prompts only ever see a trailing window.
pub struct SessionHistory {
    pub session_id: String,
    entries: Vec<HistoryEntry>,
    file_path: Option<PathBuf>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            entries: Vec::new(),
            file_path: None,
        }
    }

    /// Also append every entry to `<dir>/session_<id>.jsonl`.
    pub fn persisted_in(dir: PathBuf) -> Self {
        let mut history = Self::new();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot create history dir; not persisting");
            return history;
        }
        history.file_path = Some(dir.join(format!("session_{}.jsonl", history.session_id)));
        history
    }

    pub fn push(&mut self, kind: EntryKind, text: impl Into<String>) {
        self.entries.push(HistoryEntry {
            kind,
            text: text.into(),
            timestamp: chrono::Utc::now(),
        });
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "history entry not persisted");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent `size` entries, oldest first.
    pub fn window(&self, size: usize) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(size);
        &self.entries[start..]
    }

    /// Prompt rendering of [`Self::window`].
    pub fn render_window(&self, size: usize) -> String {
        let window = self.window(size);
        if window.is_empty() {
            return "(no history yet)".to_string();
        }
        window
            .iter()
            .map(|e| {
                let tag = match e.kind {
                    EntryKind::Observation => "OBSERVATION",
                    EntryKind::Action => "ACTION",
                };
                format!("[{}] {tag}: {}", e.timestamp.format("%H:%M:%S"), e.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn into_entries(self) -> Vec<HistoryEntry> {
        self.entries
    }

    /// Append the latest entry to the JSONL file.
    fn flush(&self) -> DeskPilotResult<()> {
        let (Some(path), Some(last)) = (&self.file_path, self.entries.last()) else {
            return Ok(());
        };
        let line = serde_json::to_string(last)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", line)?;
        tracing::trace!(path = %path.display(), "history entry flushed");
        Ok(())
    }
}

impl Default for SessionHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// `<data-local-dir>/deskpilot/sessions`, falling back to the working directory.
pub fn default_history_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("deskpilot").join("sessions"))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}
