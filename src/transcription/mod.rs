//! Bridge to an external speech-to-text recognizer.
//!
//! The recognizer runs as a separate process. It is started with a handful of flags, told to
//! stop through a sentinel file, and reports through an output file that elablog polls.

mod bridge;
pub mod output;

pub use bridge::{
    FileWatch, PidProbe, ProcessProbe, StopOutcome, StopPolicy, StopReason, StopWatch,
    recognizer_args, send_stop_signal, spawn, stop, wait_for_stop,
};
pub use output::{Sections, Segment};

use crate::Result;
use crate::config::TranscriptionConfig;

/// Current state of the output file.
pub fn status(cfg: &TranscriptionConfig) -> Result<Sections> {
    Ok(Sections::parse(&output::load(&cfg.output)?))
}

/// Forget the last transcription.
pub fn clear(cfg: &TranscriptionConfig) -> Result<()> {
    output::clear(&cfg.output, &cfg.stop_signal)
}
