use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use elablog::elab::{ElabClient, EntityType};
use elablog::keystore::KeyStore;
use elablog::session::Session;
use elablog::{Config, Editor};

/// Global flags shared by every subcommand.
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalArgs {
    /// eLabFTW API root.
    #[arg(long, env = "ELABLOG_HOST", global = true)]
    pub host: Option<String>,

    /// Directory holding keys, session and templates.
    #[arg(long, env = "ELABLOG_HOME", default_value = ".", global = true)]
    pub home: PathBuf,

    /// PIN unlocking the stored API key. Prompted for when absent.
    #[arg(long, env = "ELABLOG_PIN", hide_env_values = true, global = true)]
    pub pin: Option<String>,

    /// Use this API key instead of the key store.
    #[arg(long, env = "ELABLOG_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Skip TLS certificate verification (`--insecure false` to verify).
    #[arg(
        long,
        env = "ELABLOG_INSECURE",
        default_value_t = true,
        action = clap::ArgAction::Set,
        global = true
    )]
    pub insecure: bool,
}

impl GlobalArgs {
    pub fn config(&self) -> Config {
        let mut config = Config::with_home(&self.home);
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        config.verify_tls = !self.insecure;
        config
    }
}

/// Everything a command handler needs.
pub struct App {
    pub args: GlobalArgs,
    pub config: Config,
}

impl App {
    pub fn new(args: GlobalArgs) -> Self {
        let config = args.config();
        Self { args, config }
    }

    pub fn keystore(&self) -> KeyStore {
        KeyStore::new(&self.config.keys_dir)
    }

    pub fn session(&self) -> Result<Session> {
        Ok(Session::require(&self.config.session_path())?)
    }

    pub fn save_session(&self, session: &Session) -> Result<()> {
        session
            .save(&self.config.session_path())
            .context("failed to save session")
    }

    pub fn pin(&self) -> Result<String> {
        match &self.args.pin {
            Some(pin) => Ok(pin.clone()),
            None => prompt("PIN: "),
        }
    }

    pub fn client_with_key(&self, api_key: &str) -> Result<ElabClient> {
        ElabClient::new(&self.config.host, api_key, self.config.verify_tls)
            .context("failed to build HTTP client")
    }

    /// A client for the logged-in user: the API key from the environment, else the key store.
    pub fn client(&self, session: &Session) -> Result<ElabClient> {
        if let Some(key) = &self.args.api_key {
            return self.client_with_key(key);
        }
        let Some(user) = &session.short_name else {
            bail!("this session was opened with an API key; set ELABLOG_API_KEY again");
        };
        let key = self
            .keystore()
            .load(user, &self.pin()?)
            .with_context(|| format!("failed to unlock the key of '{user}'"))?;
        self.client_with_key(&key)
    }

    /// Session plus client, for commands that talk to the notebook.
    pub fn connect(&self) -> Result<(Session, ElabClient)> {
        let session = self.session()?;
        let client = self.client(&session)?;
        Ok((session, client))
    }
}

pub fn editor(client: &ElabClient) -> Editor<'_> {
    Editor::new(client)
}

/// Selected experiment id, with a readable error.
pub fn experiment_id(session: &Session) -> Result<i64> {
    Ok(session
        .selected_experiment()
        .context("select an experiment first (`elablog select <id>`)")?
        .id)
}

pub fn entity_or(session: &Session, entity: Option<EntityType>) -> EntityType {
    entity.unwrap_or(session.entity)
}

/// Read one line from stdin after printing `label` to stderr.
pub fn prompt(label: &str) -> Result<String> {
    eprint!("{label}");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Text from an argument, or from stdin when the argument is `-` or missing.
pub fn text_or_stdin(text: Option<String>) -> Result<String> {
    match text.as_deref() {
        Some("-") | None => {
            let mut buf = String::new();
            io::Read::read_to_string(&mut io::stdin(), &mut buf)?;
            Ok(buf)
        }
        Some(t) => Ok(t.to_string()),
    }
}
