//! `elablog`: a command-line laboratory notebook logger for eLabFTW.
//!
//! This crate provides:
//! - A blocking client for the eLabFTW v2 API behind the [`elab::Notebook`] trait
//! - Round-tripping of the structured HTML fragments kept in entry bodies (treatment and
//!   measurement steps, positions, sample information)
//! - A timestamped journal, form templates and a bridge to an external speech recognizer
//! - An encrypted local key store and a persisted session
//!
//! Fragment parsing is best-effort: unreadable values come back as zero or empty rather than
//! as errors, so a hand-edited entry never blocks the tool.

// Crate-wide configuration and errors.
pub mod config;
pub mod error;

// Remote notebook access.
pub mod elab;

// HTML fragment model and the fragments built on it.
pub mod catalog;
pub mod conditions;
pub mod html;
pub mod positions;
pub mod resources;
pub mod sample;
pub mod steps;
pub mod units;

// Operations over entries.
pub mod editor;
pub mod journal;
pub mod templates;

// Local state.
pub mod keystore;
pub mod session;

// Speech-to-text bridge.
pub mod transcription;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

pub use config::Config;
pub use editor::Editor;
pub use error::{Error, Result};
