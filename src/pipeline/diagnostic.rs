//! Pipeline diagnostic dump: writes intermediate artifacts to disk.
//!
//! Disabled unless a dump directory is configured (`INCIDENT_COPILOT_DUMP_DIR`).
//! Output structure:
//! ```text
//! {dump_dir}/{run_id}/
//!   01-prompt.txt
//!   02-response-1.txt
//!   02-response-2.txt      (only when a second model call happened)
//!   03-result.json | 03-error.txt
//! ```
//!
//! Nothing here can fail a pipeline run: write errors are logged and dropped.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Environment variable that enables the dump. Read once by `Config`.
pub const DUMP_DIR_VAR: &str = "INCIDENT_COPILOT_DUMP_DIR";

/// Create `<base>/<run_id>/`. Returns `None` (with a warning) if creation fails.
pub fn dump_dir_in(base: &Path, run_id: &Uuid) -> Option<PathBuf> {
    let dir = base.join(run_id.to_string());

    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(
            path = %dir.display(),
            error = %e,
            "Diagnostic dump: failed to create directory"
        );
        return None;
    }

    Some(dir)
}

/// Write a JSON artifact, pretty-printed.
pub fn dump_json<T: serde::Serialize>(dir: &Path, filename: &str, value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => dump_text(dir, filename, &json),
        Err(e) => tracing::warn!(
            path = %dir.join(filename).display(),
            error = %e,
            "Diagnostic dump: failed to serialize JSON"
        ),
    }
}

/// Write a text artifact (prompt, raw model response, error).
pub fn dump_text(dir: &Path, filename: &str, text: &str) {
    let path = dir.join(filename);
    match std::fs::write(&path, text.as_bytes()) {
        Ok(()) => tracing::debug!(
            path = %path.display(),
            size = text.len(),
            "Diagnostic dump: text written"
        ),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to write text"
        ),
    }
}
