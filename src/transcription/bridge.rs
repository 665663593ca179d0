use std::fs;
use std::process::{Child, Command};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::output;
use crate::config::TranscriptionConfig;
use crate::{Error, Result};

/// Launch the recognizer with a fresh output file.
pub fn spawn(cfg: &TranscriptionConfig) -> Result<Child> {
    let (program, leading) = cfg
        .command
        .split_first()
        .ok_or_else(|| Error::msg("recognizer command is empty"))?;

    output::clear(&cfg.output, &cfg.stop_signal)?;

    let child = Command::new(program)
        .args(leading)
        .args(recognizer_args(cfg))
        .spawn()?;
    info!(pid = child.id(), model = %cfg.model, "recognizer started");
    Ok(child)
}

/// Flags passed after the configured command.
pub fn recognizer_args(cfg: &TranscriptionConfig) -> Vec<String> {
    vec![
        "--model".to_string(),
        cfg.model.clone(),
        "--energy-threshold".to_string(),
        cfg.energy_threshold.to_string(),
        "--record-timeout".to_string(),
        cfg.record_timeout.to_string(),
        "--phrase-timeout".to_string(),
        cfg.phrase_timeout.to_string(),
        "--mic-index".to_string(),
        cfg.mic_index.to_string(),
    ]
}

/// Ask the recognizer to finish by creating the stop sentinel.
pub fn send_stop_signal(cfg: &TranscriptionConfig) -> Result<()> {
    fs::write(&cfg.stop_signal, "stop")?;
    debug!(path = %cfg.stop_signal.display(), "stop signal written");
    Ok(())
}

/// Answers whether the recognizer process is gone.
pub trait ProcessProbe {
    fn has_exited(&mut self) -> bool;
}

impl ProcessProbe for Child {
    fn has_exited(&mut self) -> bool {
        // A failing wait counts as gone.
        !matches!(self.try_wait(), Ok(None))
    }
}

/// Probe for a recognizer started by an earlier invocation, known only by pid.
#[derive(Debug, Clone, Copy)]
pub struct PidProbe(pub u32);

impl ProcessProbe for PidProbe {
    #[cfg(target_os = "linux")]
    fn has_exited(&mut self) -> bool {
        !std::path::Path::new(&format!("/proc/{}", self.0)).exists()
    }

    #[cfg(not(target_os = "linux"))]
    fn has_exited(&mut self) -> bool {
        false
    }
}

/// When to stop waiting for the recognizer's last words.
#[derive(Debug, Clone)]
pub struct StopPolicy {
    pub max_wait: Duration,
    pub interval: Duration,
    /// Stable time required once the process has exited.
    pub after_exit: Duration,
    /// Stable time required once the sentinel has been consumed.
    pub after_sentinel: Duration,
    /// Stable time that ends the wait regardless.
    pub stable: Duration,
    /// Pause after the wait before the final read.
    pub settle: Duration,
}

impl StopPolicy {
    pub fn from_config(cfg: &TranscriptionConfig) -> Self {
        Self {
            max_wait: cfg.stop_timeout,
            interval: cfg.poll_interval,
            ..Self::default()
        }
    }
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(15),
            interval: Duration::from_millis(300),
            after_exit: Duration::from_secs(1),
            after_sentinel: Duration::from_secs(2),
            stable: Duration::from_secs(5),
            settle: Duration::from_millis(500),
        }
    }
}

/// Why the wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ProcessExited,
    SentinelGone,
    Stable,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopOutcome {
    pub reason: StopReason,
    /// Polling time spent, excluding the settle pause.
    pub waited: Duration,
    pub initial: String,
    pub last: String,
}

impl StopOutcome {
    /// Whether text arrived after the stop was requested.
    pub fn gained_content(&self) -> bool {
        !self.last.is_empty() && self.last != self.initial
    }
}

/// What the stop wait observes on each poll.
pub trait StopWatch {
    fn content(&mut self) -> String;
    fn sentinel_present(&mut self) -> bool;
    fn process_exited(&mut self) -> bool;
}

/// Poll until the recognizer is done or the policy gives up.
///
/// `sleep` is called once per poll with the interval and once with the settle pause. Time is
/// counted in intervals, not read from a clock. The process is never killed.
pub fn wait_for_stop(
    policy: &StopPolicy,
    watch: &mut dyn StopWatch,
    mut sleep: impl FnMut(Duration),
) -> StopOutcome {
    let initial = watch.content();
    let mut last = initial.clone();
    let mut waited = Duration::ZERO;
    let mut stable = Duration::ZERO;
    let mut reason = StopReason::TimedOut;

    while waited < policy.max_wait {
        sleep(policy.interval);
        waited += policy.interval;

        let current = watch.content();
        if current != last {
            last = current;
            stable = Duration::ZERO;
        } else {
            stable += policy.interval;
        }

        if watch.process_exited() && stable >= policy.after_exit {
            reason = StopReason::ProcessExited;
            break;
        }
        if !watch.sentinel_present() && stable >= policy.after_sentinel {
            reason = StopReason::SentinelGone;
            break;
        }
        if stable >= policy.stable {
            reason = StopReason::Stable;
            break;
        }
    }

    if reason == StopReason::TimedOut {
        warn!(?waited, "recognizer did not finish in time; leaving it running");
    }
    sleep(policy.settle);
    let last = watch.content();
    debug!(?reason, ?waited, "stop wait finished");
    StopOutcome {
        reason,
        waited,
        initial,
        last,
    }
}

/// The real files plus a process probe.
pub struct FileWatch<'a, P: ProcessProbe + ?Sized> {
    pub cfg: &'a TranscriptionConfig,
    pub probe: &'a mut P,
}

impl<P: ProcessProbe + ?Sized> StopWatch for FileWatch<'_, P> {
    fn content(&mut self) -> String {
        output::load(&self.cfg.output).unwrap_or_default()
    }

    fn sentinel_present(&mut self) -> bool {
        self.cfg.stop_signal.exists()
    }

    fn process_exited(&mut self) -> bool {
        self.probe.has_exited()
    }
}

/// Signal the recognizer and wait for it to wrap up.
pub fn stop(
    cfg: &TranscriptionConfig,
    probe: &mut dyn ProcessProbe,
    sleep: impl FnMut(Duration),
) -> Result<StopOutcome> {
    send_stop_signal(cfg)?;
    let policy = StopPolicy::from_config(cfg);
    let mut watch = FileWatch { cfg, probe };
    Ok(wait_for_stop(&policy, &mut watch, sleep))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted observations, one entry per poll; the last entry repeats.
    struct Script {
        contents: Vec<&'static str>,
        sentinel: Vec<bool>,
        exited: Vec<bool>,
        poll: usize,
    }

    impl Script {
        fn at<T: Copy>(v: &[T], i: usize) -> T {
            v[i.min(v.len() - 1)]
        }
    }

    impl StopWatch for Script {
        fn content(&mut self) -> String {
            let c = Self::at(&self.contents, self.poll).to_string();
            self.poll += 1;
            c
        }
        fn sentinel_present(&mut self) -> bool {
            Self::at(&self.sentinel, self.poll)
        }
        fn process_exited(&mut self) -> bool {
            Self::at(&self.exited, self.poll)
        }
    }

    fn run(script: &mut Script) -> (StopOutcome, Vec<Duration>) {
        let mut sleeps = Vec::new();
        let out = wait_for_stop(&StopPolicy::default(), script, |d| sleeps.push(d));
        (out, sleeps)
    }

    #[test]
    fn exit_needs_one_second_of_quiet() {
        let mut s = Script {
            contents: vec!["a", "ab", "ab"],
            sentinel: vec![true],
            exited: vec![true],
            poll: 0,
        };
        let (out, sleeps) = run(&mut s);
        assert_eq!(out.reason, StopReason::ProcessExited);
        // Content changes on poll 1, then four quiet polls reach 1.2 s.
        assert_eq!(out.waited, Duration::from_millis(1500));
        assert_eq!(sleeps.last(), Some(&Duration::from_millis(500)));
        assert!(out.gained_content());
    }

    #[test]
    fn consumed_sentinel_needs_two_seconds() {
        let mut s = Script {
            contents: vec!["x"],
            sentinel: vec![false],
            exited: vec![false],
            poll: 0,
        };
        let (out, _) = run(&mut s);
        assert_eq!(out.reason, StopReason::SentinelGone);
        assert_eq!(out.waited, Duration::from_millis(2100));
        assert!(!out.gained_content());
    }

    #[test]
    fn stable_content_ends_wait() {
        let mut s = Script {
            contents: vec!["x"],
            sentinel: vec![true],
            exited: vec![false],
            poll: 0,
        };
        let (out, _) = run(&mut s);
        assert_eq!(out.reason, StopReason::Stable);
        assert_eq!(out.waited, Duration::from_millis(5100));
    }

    #[test]
    fn gives_up_after_max_wait() {
        let mut s = Script {
            contents: vec!["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n",
                "o", "p", "q", "r", "s", "t", "u", "v", "w", "x", "y", "z", "A", "B", "C", "D",
                "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S", "T",
                "U", "V", "W", "X", "Y", "Z"],
            sentinel: vec![true],
            exited: vec![false],
            poll: 0,
        };
        let (out, sleeps) = run(&mut s);
        assert_eq!(out.reason, StopReason::TimedOut);
        assert_eq!(out.waited, Duration::from_secs(15));
        assert_eq!(sleeps.len(), 51);
    }

    #[test]
    fn recognizer_flags() {
        let cfg = TranscriptionConfig::with_home(std::path::Path::new("/tmp"));
        assert_eq!(
            recognizer_args(&cfg),
            [
                "--model", "small", "--energy-threshold", "300", "--record-timeout", "3",
                "--phrase-timeout", "15", "--mic-index", "0"
            ]
        );
    }
}
