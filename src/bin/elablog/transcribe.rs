use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use indicatif::{ProgressBar, ProgressStyle};

use elablog::elab::ElabClient;
use elablog::journal;
use elablog::session::Session;
use elablog::transcription::{self, PidProbe, ProcessProbe, StopOutcome, output};

use crate::app::App;

#[derive(Subcommand, Debug)]
pub enum TranscribeCommand {
    /// Start the recognizer in the background.
    Start(RecognizerArgs),

    /// Ask the background recognizer to stop and wait for its last words.
    Stop,

    /// Record in the foreground until Enter is pressed.
    Record(RecognizerArgs),

    /// Whether the model is loaded and how much text there is.
    Status,

    /// Print the transcription.
    Show {
        /// Timestamped lines instead of plain text.
        #[arg(long)]
        timestamps: bool,

        /// Keep the relative-time column.
        #[arg(long)]
        relative: bool,
    },

    /// Append the transcription to the selected entry.
    Upload {
        /// Upload timestamped lines instead of plain text.
        #[arg(long)]
        timestamps: bool,

        #[arg(long)]
        relative: bool,

        /// Upload this (edited) file instead of the recognizer output.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Empty the output file.
    Clear,
}

#[derive(clap::Args, Debug)]
pub struct RecognizerArgs {
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    energy_threshold: Option<u32>,

    /// Seconds.
    #[arg(long)]
    record_timeout: Option<f64>,

    /// Seconds.
    #[arg(long)]
    phrase_timeout: Option<f64>,

    #[arg(long)]
    mic_index: Option<u32>,
}

impl RecognizerArgs {
    fn apply(&self, app: &mut App) {
        let cfg = &mut app.config.transcription;
        if let Some(m) = &self.model {
            cfg.model = m.clone();
        }
        if let Some(e) = self.energy_threshold {
            cfg.energy_threshold = e;
        }
        if let Some(r) = self.record_timeout {
            cfg.record_timeout = r;
        }
        if let Some(p) = self.phrase_timeout {
            cfg.phrase_timeout = p;
        }
        if let Some(i) = self.mic_index {
            cfg.mic_index = i;
        }
    }
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn stop_with(app: &App, probe: &mut dyn ProcessProbe) -> Result<StopOutcome> {
    let pb = spinner("Stopping transcription and processing final audio...");
    let outcome = transcription::stop(&app.config.transcription, probe, thread::sleep);
    pb.finish_and_clear();
    let outcome = outcome?;
    if outcome.gained_content() {
        println!("Transcription stopped. Final content saved.");
    } else {
        println!("Transcription stopped.");
    }
    Ok(outcome)
}

fn wait_for_model(app: &App, probe: &mut dyn ProcessProbe) -> Result<()> {
    let pb = spinner("Loading model...");
    let ready = loop {
        let content = output::load(&app.config.transcription.output)?;
        if output::is_model_ready(&content) {
            break true;
        }
        if probe.has_exited() {
            break false;
        }
        thread::sleep(app.config.transcription.poll_interval);
    };
    pb.finish_and_clear();
    if !ready {
        bail!("the recognizer exited before loading its model");
    }
    Ok(())
}

/// Commands that work without a notebook connection.
pub fn run_local(mut app: App, cmd: TranscribeCommand) -> Result<()> {
    let cfg_output = app.config.transcription.output.clone();
    match cmd {
        TranscribeCommand::Start(args) => {
            let mut session = app.session()?;
            if let Some(pid) = session.recognizer_pid {
                if !PidProbe(pid).has_exited() {
                    bail!("a recognizer is already running (pid {pid}); stop it first");
                }
            }
            args.apply(&mut app);
            let child = transcription::spawn(&app.config.transcription)
                .context("failed to start the recognizer")?;
            session.recognizer_pid = Some(child.id());
            app.save_session(&session)?;
            println!("Recognizer started (pid {}).", child.id());
        }
        TranscribeCommand::Stop => {
            let mut session = app.session()?;
            let Some(pid) = session.recognizer_pid else {
                bail!("no recognizer was started");
            };
            stop_with(&app, &mut PidProbe(pid))?;
            session.recognizer_pid = None;
            app.save_session(&session)?;
        }
        TranscribeCommand::Record(args) => {
            args.apply(&mut app);
            let mut child = transcription::spawn(&app.config.transcription)
                .context("failed to start the recognizer")?;
            wait_for_model(&app, &mut child)?;
            crate::app::prompt("Listening. Press Enter to stop. ")?;
            let outcome = stop_with(&app, &mut child)?;
            let sections = transcription::Sections::parse(&outcome.last);
            println!("{}", sections.plain);
        }
        TranscribeCommand::Status => {
            let content = output::load(&cfg_output)?;
            let sections = transcription::Sections::parse(&content);
            println!(
                "model: {}",
                if output::is_model_ready(&content) { "ready" } else { "not ready" }
            );
            println!("words: {}", sections.plain.split_whitespace().count());
        }
        TranscribeCommand::Show {
            timestamps,
            relative,
        } => {
            let content = output::load(&cfg_output)?;
            if timestamps {
                println!("{}", output::editing_text(&content, relative));
            } else {
                println!("{}", transcription::Sections::parse(&content).plain);
            }
        }
        TranscribeCommand::Clear => {
            transcription::clear(&app.config.transcription)?;
            println!("Transcription cleared.");
        }
        TranscribeCommand::Upload { .. } => bail!("uploading needs a notebook connection"),
    }
    Ok(())
}

pub fn upload(
    app: &App,
    session: &mut Session,
    client: &ElabClient,
    timestamps: bool,
    relative: bool,
    file: Option<PathBuf>,
) -> Result<()> {
    let selection = session.selected()?.clone();
    let content = match file {
        Some(path) => fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let raw = output::load(&app.config.transcription.output)?;
            if timestamps {
                output::editing_text(&raw, relative)
            } else {
                transcription::Sections::parse(&raw).plain
            }
        }
    };
    if content.trim().is_empty() {
        bail!("nothing to upload");
    }
    let markdown = output::format_for_upload(&content, timestamps, &journal::timestamp_now());
    journal::append_to_entry(client, selection.entity, selection.id, &markdown, None)?;
    session.record_comment(&markdown);
    app.save_session(session)?;
    println!("Uploaded transcription to {} '{}'.", selection.entity, selection.title);
    Ok(())
}
