//! # Script Runner
//!
//! Scripts are opaque executables referenced by [`ScriptId`]. The engine
//! hands the trigger context to a [`ScriptRunner`] and gets back either a
//! success, optionally carrying a replacement action hint, or an error
//! string. A failing script never affects input processing.
//!
//! [`ProcessScriptRunner`] runs `<scripts_dir>/<id>` as a child process:
//!
//! - the environment is cleared except for a minimal `PATH` and the
//!   `CK_*` context variables
//! - the working directory is the scripts directory
//! - the process is killed when the timeout elapses
//! - the first non-empty stdout line becomes the action hint

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::binding::action::ScriptId;
use crate::engine::PressType;
use crate::input::button::Button;

/// `PATH` visible to scripts.
const SCRIPT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// What triggered a script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptContext {
    /// Triggering button; `None` for chords, sequences and gestures.
    pub button: Option<Button>,
    pub press: PressType,
    /// Name of the layer the binding was found on.
    pub layer: Option<String>,
}

/// Successful script result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutcome {
    /// Replacement for the displayed action hint.
    pub hint: Option<String>,
}

/// Executes user scripts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Runs a script to completion.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message if the script cannot be started,
    /// times out, or exits unsuccessfully.
    async fn run(&self, id: &ScriptId, context: &ScriptContext) -> Result<ScriptOutcome, String>;
}

/// Runs scripts as child processes from one directory.
#[derive(Debug, Clone)]
pub struct ProcessScriptRunner {
    dir: PathBuf,
    timeout: Duration,
}

impl ProcessScriptRunner {
    #[must_use]
    pub fn new<P: AsRef<Path>>(dir: P, timeout: Duration) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            timeout,
        }
    }

    /// Maps an id to a file inside the scripts directory.
    fn resolve(&self, id: &ScriptId) -> Result<PathBuf, String> {
        let name = id.0.as_str();
        if name.is_empty() || name.starts_with('.') || name.contains(|c: char| c == '/' || c == '\\') {
            return Err(format!("invalid script id '{}'", name));
        }
        let path = self.dir.join(name);
        if !path.is_file() {
            return Err(format!("script not found: {}", path.display()));
        }
        Ok(path)
    }
}

#[async_trait]
impl ScriptRunner for ProcessScriptRunner {
    async fn run(&self, id: &ScriptId, context: &ScriptContext) -> Result<ScriptOutcome, String> {
        let path = self.resolve(id)?;

        let mut command = Command::new(&path);
        command
            .env_clear()
            .env("PATH", SCRIPT_PATH)
            .env("CK_SCRIPT", &id.0)
            .env("CK_PRESS_TYPE", context.press.name())
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(button) = context.button {
            command.env("CK_BUTTON", button.name());
        }
        if let Some(layer) = &context.layer {
            command.env("CK_LAYER", layer);
        }

        debug!("Running script {}", path.display());
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| format!("timed out after {} ms", self.timeout.as_millis()))?
            .map_err(|e| format!("failed to start: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(stderr
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(String::from)
                .unwrap_or_else(|| format!("exited with {}", output.status)));
        }

        let hint = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(String::from);
        Ok(ScriptOutcome { hint })
    }
}
