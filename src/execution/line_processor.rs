//! Turns raw output chunks into trimmed, classified lines.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Terminal control sequences k6 uses for colors and progress redraws.
static ANSI_SEQUENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[mGKH]").expect("Valid regex pattern"));

const PROGRESS_MARKERS: [&str; 3] = ["default [", "%", "VUs"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Log,
    Error,
    Progress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputLine {
    pub text: String,
    pub kind: LineKind,
}

/// Stateless: a chunk is processed without reference to earlier chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineProcessor;

impl LineProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&self, chunk: &[u8]) -> Vec<OutputLine> {
        let text = String::from_utf8_lossy(chunk);

        text.split('\n')
            .filter_map(|raw| {
                let stripped = strip_ansi(raw);
                let trimmed = stripped.trim();
                if trimmed.is_empty() {
                    return None;
                }
                Some(OutputLine {
                    kind: classify(trimmed),
                    text: trimmed.to_string(),
                })
            })
            .collect()
    }

    /// Like [`process`](Self::process) but tags every line as an error, for
    /// chunks read from stderr.
    pub fn process_error(&self, chunk: &[u8]) -> Vec<OutputLine> {
        self.process(chunk)
            .into_iter()
            .map(|line| OutputLine {
                kind: LineKind::Error,
                ..line
            })
            .collect()
    }
}

pub fn strip_ansi(line: &str) -> std::borrow::Cow<'_, str> {
    ANSI_SEQUENCE.replace_all(line, "")
}

pub fn is_progress_line(line: &str) -> bool {
    PROGRESS_MARKERS.iter().all(|marker| line.contains(marker))
}

fn classify(line: &str) -> LineKind {
    if is_progress_line(line) {
        LineKind::Progress
    } else {
        LineKind::Log
    }
}
