use crate::state::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How often the in-memory state is checked for changes
pub const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Spawn a background task that rewrites the state file whenever the
/// in-memory state changed since the last write
pub fn spawn_state_autosaver(state: Arc<AppState>, path: PathBuf, interval: Duration) {
    tokio::spawn(async move {
        let mut last_written: Option<String> = None;

        loop {
            tokio::time::sleep(interval).await;

            let mut export = match state.export_state().await {
                Ok(export) => export,
                Err(e) => {
                    tracing::warn!("Failed to read state for autosave: {}", e);
                    continue;
                }
            };
            // Timestamp alone is not a change
            export.exported_at.clear();
            let fingerprint = match serde_json::to_string(&export) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!("Failed to serialize state for autosave: {}", e);
                    continue;
                }
            };

            if last_written.as_deref() == Some(fingerprint.as_str()) {
                continue;
            }

            match state.save_to_file(&path).await {
                Ok(()) => {
                    tracing::debug!("State saved to {}", path.display());
                    last_written = Some(fingerprint);
                }
                Err(e) => tracing::warn!("Failed to save state to {}: {}", path.display(), e),
            }
        }
    });
}
