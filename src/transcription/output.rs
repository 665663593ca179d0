//! The recognizer's output file.
//!
//! The recognizer rewrites the whole file after every phrase:
//!
//! ```text
//! Model loaded & listening
//!
//! === TIMESTAMPED TRANSCRIPTION ===
//!
//! [14:02:11] [0.0s] first phrase
//! [14:02:15] [4.2s] second phrase
//!
//! === PLAIN TEXT ===
//!
//! first phrase second phrase
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::Result;

pub const READY_MESSAGE: &str = "Model loaded & listening";
pub const TIMESTAMPED_MARKER: &str = "=== TIMESTAMPED TRANSCRIPTION ===";
pub const PLAIN_MARKER: &str = "=== PLAIN TEXT ===";

/// One recognized phrase.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Wall-clock time, `HH:MM:SS`.
    pub real_time: String,
    /// Offset from the start of recording, e.g. `4.2s`.
    pub relative_time: String,
    pub text: String,
}

/// Read the output file, trimmed. A missing file reads as empty.
pub fn load(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().to_string()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err.into()),
    }
}

/// Whether the recognizer has finished loading its model.
pub fn is_model_ready(content: &str) -> bool {
    content.contains("Model") && content.contains("loaded & listening")
}

/// The parts of an output file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sections {
    /// Text before the timestamped section, usually the status line.
    pub status: String,
    /// Timestamped lines, trimmed as a block.
    pub timestamped: String,
    /// Plain text; the timestamped block when the file has no plain section.
    pub plain: String,
}

impl Sections {
    pub fn parse(content: &str) -> Self {
        let content = content.trim();
        let Some((status, rest)) = content.split_once(TIMESTAMPED_MARKER) else {
            if content.is_empty() || content == READY_MESSAGE {
                return Self::default();
            }
            return Self {
                status: String::new(),
                timestamped: String::new(),
                plain: content.to_string(),
            };
        };
        let (timestamped, plain) = match rest.split_once(PLAIN_MARKER) {
            Some((ts, plain)) => (ts.trim(), plain.trim()),
            None => (rest.trim(), rest.trim()),
        };
        Self {
            status: status.trim().to_string(),
            timestamped: timestamped.to_string(),
            plain: plain.to_string(),
        }
    }

    pub fn has_text(&self) -> bool {
        !self.plain.is_empty()
    }
}

/// The timestamped transcription as the user edits it before upload.
///
/// Without `show_relative`, `[real] [relative] text` lines become `[real] text`. Other
/// non-empty lines pass through.
pub fn editing_text(content: &str, show_relative: bool) -> String {
    let sections = Sections::parse(content);
    if show_relative {
        return sections.timestamped;
    }
    sections
        .timestamped
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if !line.starts_with('[') {
                return line.to_string();
            }
            let parts: Vec<&str> = line.splitn(3, "] ").collect();
            match parts.as_slice() {
                [real, _relative, text] => format!("[{}] {text}", &real[1..]),
                _ => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Markdown uploaded to the journal. `timestamp` is the upload time.
pub fn format_for_upload(content: &str, include_timestamps: bool, timestamp: &str) -> String {
    let has_stamps = content.contains('[') && content.contains(']');
    if include_timestamps && !content.trim().is_empty() && has_stamps {
        format!(
            "**Transcription with Timestamps - {timestamp}**\n\n{content}\n\n---\n*Transcription captured with real-time and relative timestamps*"
        )
    } else {
        format!("**Transcription - {timestamp}**\n\n{content}")
    }
}

/// Render the file contents for `segments`.
pub fn render(status: &str, segments: &[Segment]) -> String {
    let mut out = String::from(status);
    if !segments.is_empty() {
        out.push('\n');
        out.push_str(TIMESTAMPED_MARKER);
        out.push_str("\n\n");
        for s in segments {
            out.push_str(&format!("[{}] [{}] {}\n", s.real_time, s.relative_time, s.text));
        }
        out.push('\n');
        out.push_str(PLAIN_MARKER);
        out.push_str("\n\n");
        for s in segments {
            out.push_str(&s.text);
            out.push(' ');
        }
    }
    out
}

/// Rewrite the output file, creating its directory if needed.
pub fn write(path: &Path, status: &str, segments: &[Segment]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, render(status, segments))?;
    Ok(())
}

/// Truncate the output file and remove a leftover stop sentinel.
pub fn clear(output: &Path, stop_signal: &Path) -> Result<()> {
    if let Some(dir) = output.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(output, "")?;
    match fs::remove_file(stop_signal) {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}
