//! # Input Module
//!
//! Normalized controller input as handed over by the decoding
//! collaborator.
//!
//! This module handles:
//! - Button identifiers with category and hand metadata
//! - Typed per-button containers (no string keys in engine code)
//! - Timestamped button/motion events and per-frame axis samples

pub mod button;
pub mod event;
