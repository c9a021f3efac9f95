//! # Error Types
//!
//! Custom error types for Controller Keys using `thiserror`.
//!
//! Two families live here:
//!
//! - [`ControllerKeysError`]: loading, authoring and persistence failures.
//!   Authoring errors (bad chords, sequences, layers) are raised while a
//!   binding table is being built and never reach the running engine.
//! - [`DispatchError`]: failures while performing an action. These are
//!   always recovered locally (logged, counted, surfaced as a
//!   notification) and never propagate back into the input path.

use thiserror::Error;

use crate::input::button::Button;

/// Main error type for Controller Keys
#[derive(Debug, Error)]
pub enum ControllerKeysError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Profile or telemetry (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A chord needs at least two buttons
    #[error("chord needs at least 2 buttons, got {0}")]
    ChordTooSmall(usize),

    /// Two chords share the exact same button set
    #[error("a chord with buttons [{0}] already exists")]
    DuplicateChord(String),

    /// A sequence needs at least two steps
    #[error("sequence needs at least 2 steps, got {0}")]
    SequenceTooShort(usize),

    /// Sequence step timeout must be positive
    #[error("sequence step timeout must be positive")]
    InvalidStepTimeout,

    /// Two layers use the same activator button
    #[error("button {0} already activates another layer")]
    DuplicateLayerActivator(Button),

    /// An action references a macro that does not exist
    #[error("unknown macro: {0}")]
    UnknownMacro(String),
}

/// Failure while performing a dispatched action.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The OS input synthesis collaborator refused an event
    #[error("input synthesis failed: {0}")]
    Synthesis(String),

    /// A script returned an error or could not be run
    #[error("script {id} failed: {message}")]
    Script { id: String, message: String },

    /// A launched process or shell command failed to start
    #[error("command failed: {0}")]
    Command(String),

    /// An HTTP request failed or returned an error status
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// OBS websocket call failed
    #[error("OBS request failed: {0}")]
    Obs(String),

    /// An action references a macro missing from the library
    #[error("unknown macro: {0}")]
    UnknownMacro(String),

    /// The worker context is no longer accepting jobs
    #[error("action worker is not running")]
    WorkerGone,
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        DispatchError::Http(err.to_string())
    }
}

/// Result type alias for Controller Keys
pub type Result<T> = std::result::Result<T, ControllerKeysError>;
