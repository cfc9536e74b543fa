//! Vosk model discovery.

use std::path::PathBuf;

/// Model directory name searched for in the well-known locations.
pub const DEFAULT_MODEL_NAME: &str = "vosk-model-small-en-us-0.15";

/// Environment variable overriding model discovery entirely.
pub const MODEL_PATH_ENV: &str = "VOSK_MODEL_PATH";

/// Locate a Vosk model directory.
///
/// `VOSK_MODEL_PATH` wins when set and pointing at a directory; otherwise
/// the default model name is probed relative to the working directory, under
/// `models/`, and in the per-user data locations.
pub fn locate_model() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(MODEL_PATH_ENV) {
        if !path.is_empty() {
            let path = PathBuf::from(path);
            if path.is_dir() {
                return Some(path);
            }
            tracing::warn!(
                path = %path.display(),
                "{MODEL_PATH_ENV} is set but is not a directory"
            );
        }
    }

    let mut candidates = vec![
        PathBuf::from(DEFAULT_MODEL_NAME),
        PathBuf::from("models").join(DEFAULT_MODEL_NAME),
    ];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".genie").join(DEFAULT_MODEL_NAME));
        candidates.push(
            home.join("Library")
                .join("Application Support")
                .join("Genie")
                .join(DEFAULT_MODEL_NAME),
        );
    }

    let found = candidates.into_iter().find(|p| p.is_dir());
    match &found {
        Some(path) => tracing::info!(path = %path.display(), "Found Vosk model"),
        None => tracing::debug!("No Vosk model found in any known location"),
    }
    found
}
