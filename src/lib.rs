//! # Controller Keys Library
//!
//! Turn a game controller into a keyboard, mouse and macro pad.
//!
//! Decoded controller input goes through the [`engine`], which resolves
//! layers, chords, sequences, long holds, double taps and gestures into
//! triggers. The [`dispatch`] module performs them, [`telemetry`] counts
//! them, and the [`optimizer`] suggests better layouts from the counts.

pub mod binding;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod input;
pub mod optimizer;
pub mod profile;
pub mod runtime;
pub mod telemetry;
