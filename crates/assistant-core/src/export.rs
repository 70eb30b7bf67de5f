//! Plain-text transcript download
//!
//! One entry per message:
//!
//! ```text
//! [14:02] You [📎 report.pdf]:
//! Summarize this please
//! ---
//! [14:03] Assistant:
//! Title
//! • first point
//! ```

use crate::fragment::to_plain_text;
use crate::markdown::render;
use crate::state::{ChatMessage, ChatRole, Transcript};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const ENTRY_SEPARATOR: &str = "---\n";

/// Where exported transcripts are written
pub trait TranscriptSink {
    /// Store `contents` under `file_name` and return where it ended up.
    fn save(&mut self, file_name: &str, contents: &str) -> Result<PathBuf>;
}

/// Writes transcripts as files into a directory
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `preferred`, else the user's download directory, else the working directory
    pub fn default_location(preferred: Option<&Path>) -> Self {
        let dir = preferred
            .map(Path::to_path_buf)
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TranscriptSink for DirectorySink {
    fn save(&mut self, file_name: &str, contents: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        fs::write(&path, contents)?;
        Ok(path)
    }
}

/// Text of a message as it appears in a transcript: assistant markdown is
/// rendered and flattened, user input is kept as typed.
pub fn message_plain_text(message: &ChatMessage) -> String {
    match message.role() {
        ChatRole::Assistant => to_plain_text(&render(message.raw_text())),
        ChatRole::User => message.raw_text().to_string(),
    }
}

fn format_entry(message: &ChatMessage) -> String {
    let marker = message
        .attachment_name()
        .map(|name| format!(" [📎 {name}]"))
        .unwrap_or_default();

    format!(
        "[{}] {}{}:\n{}\n",
        message.time_label(),
        message.role().label(),
        marker,
        message_plain_text(message)
    )
}

pub fn format_transcript(transcript: &Transcript) -> String {
    transcript
        .iter()
        .map(format_entry)
        .collect::<Vec<_>>()
        .join(ENTRY_SEPARATOR)
}

pub fn export_file_name(now: DateTime<Local>) -> String {
    format!("chat-transcript-{}.txt", now.format("%Y%m%d-%H%M%S"))
}

/// Write the transcript through `sink`. An empty transcript writes nothing.
pub fn export_transcript(
    transcript: &Transcript,
    sink: &mut dyn TranscriptSink,
    now: DateTime<Local>,
) -> Result<PathBuf> {
    if transcript.is_empty() {
        return Err(anyhow!("Nothing to download yet"));
    }

    let path = sink.save(&export_file_name(now), &format_transcript(transcript))?;
    info!(path = %path.display(), messages = transcript.len(), "transcript exported");
    Ok(path)
}
