//! Post-run data synchronisation.
//!
//! After every traversal the controller launches a site-specific sync script
//! (typically an rsync wrapper copying the data directory to a file server)
//! with the user name as its only argument. The script runs detached; the
//! controller does not wait for it.

use crate::config::SyncSettings;
use std::path::PathBuf;
use tokio::process::Command;

/// Script name inside the exec directory.
#[cfg(windows)]
pub const SCRIPT_NAME: &str = "rsync.bat";
/// Script name inside the exec directory.
#[cfg(not(windows))]
pub const SCRIPT_NAME: &str = "rsync";

/// Script to run, if any: the explicit path, else `<exec_dir>/rsync`.
pub fn resolve_script(settings: &SyncSettings) -> Option<PathBuf> {
    if !settings.enabled {
        return None;
    }
    settings
        .script
        .clone()
        .or_else(|| settings.exec_dir.as_ref().map(|dir| dir.join(SCRIPT_NAME)))
}

/// Launch the sync script for `user`.
///
/// Returns whether a script was started. Failures are logged, never returned:
/// a broken sync must not turn a finished measurement into an error.
pub fn run(settings: &SyncSettings, user: &str) -> bool {
    let Some(script) = resolve_script(settings) else {
        tracing::debug!("No sync script configured");
        return false;
    };
    tracing::info!(script = %script.display(), user, "Calling sync script");
    match Command::new(&script).arg(user).kill_on_drop(false).spawn() {
        Ok(child) => {
            tracing::debug!(pid = ?child.id(), "Sync script started");
            true
        }
        Err(e) => {
            tracing::warn!(script = %script.display(), error = %e, "Failed to start sync script");
            false
        }
    }
}
