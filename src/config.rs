use std::path::{Path, PathBuf};
use std::time::Duration;

/// The API root of the instance elablog talks to when nothing else is configured.
pub const DEFAULT_HOST: &str = "https://elabftw-qa-2024.zit.ph.tum.de/api/v2";

/// Options that control where elablog reads and writes its state and which notebook it talks to.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The CLI is responsible for mapping flags and environment variables into this type so that
/// tests and other front-ends can construct it programmatically.
#[derive(Debug, Clone)]
pub struct Config {
    /// eLabFTW API root, e.g. `https://host/api/v2`.
    pub host: String,

    /// Whether TLS certificates of the notebook service are verified.
    ///
    /// Off by default: the QA instance is served with a private CA.
    pub verify_tls: bool,

    /// Directory holding the encrypted `<short_name>.enc` key files.
    pub keys_dir: PathBuf,

    /// Directory holding `session.json`.
    pub state_dir: PathBuf,

    /// Directory scanned for `*.yaml` / `*.yml` form templates.
    pub templates_dir: PathBuf,

    pub transcription: TranscriptionConfig,
}

/// Files and process settings for the speech-to-text bridge.
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    /// Program and leading arguments used to launch the recognizer.
    pub command: Vec<String>,

    /// Sentinel file. The recognizer stops once it appears and deletes it on exit.
    pub stop_signal: PathBuf,

    /// File the recognizer rewrites with its current output.
    pub output: PathBuf,

    pub model: String,
    pub energy_threshold: u32,
    pub record_timeout: f64,
    pub phrase_timeout: f64,
    pub mic_index: u32,

    /// Upper bound on the stop wait.
    pub stop_timeout: Duration,
    pub poll_interval: Duration,
}

impl Config {
    /// Build a configuration rooted at `home` with all other settings at their defaults.
    pub fn with_home(home: impl AsRef<Path>) -> Self {
        let home = home.as_ref();
        Self {
            host: DEFAULT_HOST.to_string(),
            verify_tls: false,
            keys_dir: home.join("keys"),
            state_dir: home.to_path_buf(),
            templates_dir: home.join("templates"),
            transcription: TranscriptionConfig::with_home(home),
        }
    }

    /// Web base of the instance, used for links into the notebook UI.
    ///
    /// `https://host/api/v2` becomes `https://host`.
    pub fn web_base(&self) -> String {
        let trimmed = self.host.trim_end_matches('/');
        match trimmed.find("/api/") {
            Some(idx) => trimmed[..idx].to_string(),
            None => trimmed.to_string(),
        }
    }

    pub fn session_path(&self) -> PathBuf {
        self.state_dir.join("session.json")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_home(".")
    }
}

impl TranscriptionConfig {
    pub fn with_home(home: &Path) -> Self {
        Self {
            command: vec![
                "python".to_string(),
                "-m".to_string(),
                "pages.transcribe".to_string(),
            ],
            stop_signal: home.join("stop_signal.txt"),
            output: home.join("temp").join("transcription_output.txt"),
            model: "small".to_string(),
            energy_threshold: 300,
            record_timeout: 3.0,
            phrase_timeout: 15.0,
            mic_index: 0,
            stop_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_base_strips_api_suffix() {
        let mut cfg = Config::default();
        assert_eq!(cfg.web_base(), "https://elabftw-qa-2024.zit.ph.tum.de");

        cfg.host = "http://localhost:3148/api/v2/".to_string();
        assert_eq!(cfg.web_base(), "http://localhost:3148");

        cfg.host = "http://plain.example".to_string();
        assert_eq!(cfg.web_base(), "http://plain.example");
    }

    #[test]
    fn paths_hang_off_home() {
        let cfg = Config::with_home("/tmp/lab");
        assert_eq!(cfg.keys_dir, PathBuf::from("/tmp/lab/keys"));
        assert_eq!(cfg.session_path(), PathBuf::from("/tmp/lab/session.json"));
        assert_eq!(
            cfg.transcription.output,
            PathBuf::from("/tmp/lab/temp/transcription_output.txt")
        );
    }
}
