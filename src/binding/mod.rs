//! # Binding Module
//!
//! Static binding data for a profile.
//!
//! This module handles:
//! - The closed [`action::Action`] union and its payload types
//! - Per-button binding entries, layers, chords, sequences and gestures
//! - Authoring-time validation of the table
//! - Macro definitions referenced by actions

pub mod action;
pub mod macros;
pub mod table;
