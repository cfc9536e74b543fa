//! The helper process line protocol.

/// One line of recognizer output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerLine {
    /// In-progress transcription of the current utterance.
    Partial(String),
    /// Completed utterance; the helper keeps listening afterwards.
    Final(String),
    /// Non-fatal condition reported by the helper.
    Error(String),
}

/// Parse one stdout line. Returns `None` for lines outside the protocol,
/// which the caller logs and drops.
pub fn parse_line(line: &str) -> Option<RecognizerLine> {
    let line = line.trim();
    if let Some(text) = line.strip_prefix("PARTIAL:") {
        Some(RecognizerLine::Partial(text.trim().to_string()))
    } else if let Some(text) = line.strip_prefix("FINAL:") {
        Some(RecognizerLine::Final(text.trim().to_string()))
    } else if let Some(text) = line.strip_prefix("ERROR:") {
        Some(RecognizerLine::Error(text.trim().to_string()))
    } else {
        None
    }
}
