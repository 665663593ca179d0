use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use elablog::elab::{EntityType, Notebook};
use elablog::positions::Position;
use elablog::session::{self, Session};
use elablog::steps::StepFamily;
use elablog::{html, journal, templates};

mod app;
mod steps;
mod transcribe;

use app::{App, GlobalArgs, editor, entity_or, experiment_id, prompt, text_or_stdin};
use steps::StepCommand;
use transcribe::TranscribeCommand;

#[derive(Parser, Debug)]
#[command(name = "elablog")]
#[command(about = "Keep a laboratory notebook in eLabFTW from the command line")]
#[command(version)]
struct Params {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store an API key under a short name, encrypted with a PIN.
    Setup {
        /// Lowercase letters, digits and underscores, starting with a letter.
        user: String,
    },

    /// Open a session with a stored key, or with `--api-key`.
    Login {
        #[arg(long)]
        user: Option<String>,

        /// Team name or id, when the account belongs to several teams.
        #[arg(long)]
        team: Option<String>,
    },

    Logout,

    /// Print the logged-in user, team and selection.
    Whoami,

    /// Teams of the key's owner.
    Teams,

    /// Short names with a stored key.
    Users,

    /// List experiments or resources.
    List {
        #[arg(long, value_enum)]
        entity: Option<EntityType>,

        /// Only titles containing this text (case-insensitive).
        #[arg(long)]
        search: Option<String>,
    },

    /// Select the entry that later commands work on.
    Select {
        id: i64,

        #[arg(long, value_enum)]
        entity: Option<EntityType>,
    },

    /// Show the selected entry.
    Show {
        /// Print the raw HTML body.
        #[arg(long = "html")]
        raw: bool,
    },

    /// Create an entry and select it.
    Create {
        #[arg(long, value_enum)]
        entity: Option<EntityType>,

        #[arg(long)]
        title: String,

        /// Initial body text.
        #[arg(long, default_value = "")]
        comment: String,

        /// Category id or title.
        #[arg(long)]
        category: Option<String>,
    },

    /// Experiment categories of the team, or resource types.
    Categories {
        #[arg(long, value_enum)]
        entity: Option<EntityType>,
    },

    /// Append a timestamped markdown comment to the selected entry.
    Comment {
        /// Text, or `-` to read stdin.
        text: Option<String>,
    },

    /// The last comments written in this session.
    History,

    #[command(subcommand)]
    Template(TemplateCommand),

    /// Upload an image and show it in the selected entry.
    Image {
        path: PathBuf,

        /// `path` names a file already uploaded to the entry.
        #[arg(long)]
        uploaded: bool,
    },

    #[command(subcommand)]
    Treatment(StepCommand),

    #[command(subcommand)]
    Measurement(StepCommand),

    #[command(subcommand)]
    Position(PositionCommand),

    #[command(subcommand)]
    Sample(SampleCommand),

    #[command(subcommand)]
    Transcribe(TranscribeCommand),
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    /// Built-in and YAML templates.
    List,

    /// Fields of a template.
    Fields { name: String },

    /// Fill a template and print the text, or append it to the selected entry.
    Fill {
        name: String,

        /// `Label=value`; units go in `"<Label> unit=value"`. Repeatable.
        #[arg(long = "set", value_name = "LABEL=VALUE")]
        values: Vec<String>,

        #[arg(long)]
        append: bool,
    },
}

#[derive(clap::Args, Debug)]
struct Coordinates {
    /// mm
    #[arg(long, allow_hyphen_values = true)]
    x: f64,

    #[arg(long, allow_hyphen_values = true)]
    y: f64,

    #[arg(long, allow_hyphen_values = true)]
    z: f64,

    /// Degrees.
    #[arg(long, allow_hyphen_values = true)]
    angle: Option<f64>,
}

impl Coordinates {
    fn position(&self) -> Position {
        Position {
            name: String::new(),
            x: self.x,
            y: self.y,
            z: self.z,
            angle: self.angle,
        }
    }
}

#[derive(Subcommand, Debug)]
enum PositionCommand {
    List,
    Add(Coordinates),
    Set {
        /// `Position 2` or `2`.
        name: String,

        #[command(flatten)]
        coordinates: Coordinates,
    },
    Delete {
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum SampleCommand {
    /// Samples linked to the selected experiment.
    List,

    /// Use this sample for new steps.
    Select { item: i64 },

    /// Sample information and the experiments linking it.
    Show { item: Option<i64> },

    Link { item: i64 },

    Unlink { item: i64 },

    /// Rewrite the sample's information block.
    Edit {
        item: Option<i64>,

        #[arg(long)]
        name: Option<String>,

        /// Stainless Steel, Molybdenum or Tantalum.
        #[arg(long)]
        material: Option<String>,

        #[arg(long)]
        comment: Option<String>,
    },
}

fn main() -> ExitCode {
    elablog::logging::init();
    let params = Params::parse();
    match run(params) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(params: Params) -> Result<()> {
    let app = App::new(params.global);

    match params.command {
        Command::Setup { user } => setup(&app, &user),
        Command::Login { user, team } => login(&app, user, team),
        Command::Logout => {
            Session::clear(&app.config.session_path())?;
            println!("Logged out.");
            Ok(())
        }
        Command::Whoami => {
            let session = app.session()?;
            println!("{} (user {})", session.fullname, session.user_id);
            if !session.team.name.is_empty() {
                println!("team: {} ({})", session.team.name, session.team.id);
            }
            if let Ok(sel) = session.selected() {
                println!("selected: {} {} '{}'", sel.entity, sel.id, sel.title);
            }
            if let Some(sample) = session.sample_id {
                println!("sample: {sample}");
            }
            Ok(())
        }
        Command::Teams => {
            let (_, client) = app.connect()?;
            for team in client.me()?.teams {
                println!("{}\t{}", team.id, team.name);
            }
            Ok(())
        }
        Command::Users => {
            for user in app.keystore().list_users()? {
                println!("{user}");
            }
            Ok(())
        }
        Command::List { entity, search } => {
            let (session, client) = app.connect()?;
            let entity = entity_or(&session, entity);
            let needle = search.map(|s| s.to_lowercase());
            for entry in client.list_entries(entity)? {
                if needle
                    .as_deref()
                    .is_some_and(|n| !entry.title.to_lowercase().contains(n))
                {
                    continue;
                }
                println!("{}\t{}\t{}", entry.id, entry.title, entry.category_title);
            }
            Ok(())
        }
        Command::Select { id, entity } => {
            let (mut session, client) = app.connect()?;
            let entity = entity_or(&session, entity);
            let entry = client.get_entry(entity, id)?;
            session.select(entity, entry.id, &entry.title);
            app.save_session(&session)?;
            println!("Selected {entity} {} '{}'.", entry.id, entry.title);
            Ok(())
        }
        Command::Show { raw } => {
            let (session, client) = app.connect()?;
            let sel = session.selected()?;
            let entry = client.get_entry(sel.entity, sel.id)?;
            println!("{}\n", entry.title);
            println!("{}\n", editor(&client).info_summary(sel.entity, sel.id)?);
            if raw {
                println!("{}", entry.body);
            } else {
                println!("{}", html::text_content(&entry.body));
            }
            Ok(())
        }
        Command::Create {
            entity,
            title,
            comment,
            category,
        } => {
            let (mut session, client) = app.connect()?;
            let entity = entity_or(&session, entity);
            let ed = editor(&client);
            let category = match category {
                Some(c) => Some(resolve_category(&ed, entity, session.team.id, &c)?),
                None => None,
            };
            let id = ed.create_entry(entity, &title, &comment, category)?;
            session.select(entity, id, &title);
            app.save_session(&session)?;
            println!("Created {entity} {id} '{title}'.");
            Ok(())
        }
        Command::Categories { entity } => {
            let (session, client) = app.connect()?;
            let entity = entity_or(&session, entity);
            for cat in editor(&client).categories(entity, session.team.id)? {
                println!("{}\t{}", cat.id, cat.title);
            }
            Ok(())
        }
        Command::Comment { text } => {
            let (mut session, client) = app.connect()?;
            let sel = session.selected()?.clone();
            let text = text_or_stdin(text)?;
            if text.trim().is_empty() {
                bail!("empty comment");
            }
            journal::append_to_entry(&client, sel.entity, sel.id, &text, None)?;
            session.record_comment(&text);
            app.save_session(&session)?;
            println!("Comment added to {} '{}'.", sel.entity, sel.title);
            Ok(())
        }
        Command::History => {
            let session = app.session()?;
            for line in &session.comment_history {
                println!("{line}");
            }
            Ok(())
        }
        Command::Template(cmd) => template(&app, cmd),
        Command::Image { path, uploaded } => {
            let (session, client) = app.connect()?;
            let sel = session.selected()?;
            if uploaded {
                let name = path.to_string_lossy();
                journal::insert_image(&client, sel.entity, sel.id, &name)?;
            } else {
                journal::add_image(&client, sel.entity, sel.id, &path)
                    .with_context(|| format!("failed to add {}", path.display()))?;
            }
            println!("Image added to {} '{}'.", sel.entity, sel.title);
            Ok(())
        }
        Command::Treatment(cmd) => {
            let (session, client) = app.connect()?;
            steps::run(StepFamily::Treatment, cmd, &session, &client)
        }
        Command::Measurement(cmd) => {
            let (session, client) = app.connect()?;
            steps::run(StepFamily::Measurement, cmd, &session, &client)
        }
        Command::Position(cmd) => position(&app, cmd),
        Command::Sample(cmd) => sample(&app, cmd),
        Command::Transcribe(TranscribeCommand::Upload {
            timestamps,
            relative,
            file,
        }) => {
            let (mut session, client) = app.connect()?;
            transcribe::upload(&app, &mut session, &client, timestamps, relative, file)
        }
        Command::Transcribe(cmd) => transcribe::run_local(app, cmd),
    }
}

fn setup(app: &App, user: &str) -> Result<()> {
    let store = app.keystore();
    if store.user_exists(user) {
        bail!("a key for '{user}' already exists");
    }
    let api_key = match &app.args.api_key {
        Some(key) => key.clone(),
        None => prompt("API key: ")?,
    };
    let pin = match &app.args.pin {
        Some(pin) => pin.clone(),
        None => {
            let pin = prompt("New PIN: ")?;
            if prompt("Repeat PIN: ")? != pin {
                bail!("the PINs differ");
            }
            pin
        }
    };
    if pin.is_empty() {
        bail!("the PIN must not be empty");
    }

    let me = app
        .client_with_key(api_key.trim())?
        .me()
        .context("the API key was not accepted")?;
    store.save(user, &pin, &api_key)?;
    println!("Stored the key of {} as '{user}'.", me.fullname);
    Ok(())
}

fn login(app: &App, user: Option<String>, team: Option<String>) -> Result<()> {
    let (client, short_name) = match (&user, &app.args.api_key) {
        (Some(user), _) => {
            let key = app
                .keystore()
                .load(user, &app.pin()?)
                .with_context(|| format!("failed to unlock the key of '{user}'"))?;
            (app.client_with_key(&key)?, Some(user.as_str()))
        }
        (None, Some(key)) => (app.client_with_key(key)?, None),
        (None, None) => bail!("pass --user, or set ELABLOG_API_KEY"),
    };
    let session = session::login(&client, short_name, team.as_deref())?;
    app.save_session(&session)?;
    match session.team.name.as_str() {
        "" => println!("Logged in as {}.", session.fullname),
        team => println!("Logged in as {} in team {team}.", session.fullname),
    }
    Ok(())
}

fn resolve_category(
    ed: &elablog::Editor<'_>,
    entity: EntityType,
    team: i64,
    wanted: &str,
) -> Result<i64> {
    if let Ok(id) = wanted.trim().parse() {
        return Ok(id);
    }
    ed.categories(entity, team)?
        .into_iter()
        .find(|c| c.title.eq_ignore_ascii_case(wanted.trim()))
        .map(|c| c.id)
        .with_context(|| format!("no category '{wanted}'"))
}

fn template(app: &App, cmd: TemplateCommand) -> Result<()> {
    let all = templates::registry(&app.config.templates_dir)?;
    let find = |name: &str| {
        templates::find(&all, name).with_context(|| format!("no template '{name}'"))
    };

    match cmd {
        TemplateCommand::List => {
            for t in &all {
                println!("{}", t.name());
            }
        }
        TemplateCommand::Fields { name } => {
            for field in find(&name)?.fields() {
                let mut line = format!("{} ({:?})", field.label, field.kind);
                if !field.units.is_empty() {
                    line.push_str(&format!(" units: {}", field.units.join(", ")));
                }
                if !field.options.is_empty() {
                    line.push_str(&format!(" options: {}", field.options.join(", ")));
                }
                if let Some(default) = &field.default {
                    line.push_str(&format!(" default: {default}"));
                }
                println!("{line}");
            }
        }
        TemplateCommand::Fill {
            name,
            values,
            append,
        } => {
            let text = find(&name)?.render(&templates::parse_assignments(&values)?)?;
            if !append {
                println!("{text}");
                return Ok(());
            }
            let (mut session, client) = app.connect()?;
            let sel = session.selected()?.clone();
            journal::append_to_entry(&client, sel.entity, sel.id, &text, None)?;
            session.record_comment(&text);
            app.save_session(&session)?;
            println!("Template '{name}' added to {} '{}'.", sel.entity, sel.title);
        }
    }
    Ok(())
}

fn position(app: &App, cmd: PositionCommand) -> Result<()> {
    let (session, client) = app.connect()?;
    let exp = experiment_id(&session)?;
    let ed = editor(&client);

    match cmd {
        PositionCommand::List => {
            for pos in ed.positions(exp)? {
                println!("{pos}");
            }
        }
        PositionCommand::Add(coordinates) => {
            let name = ed.add_position(exp, coordinates.position())?;
            println!("Added {name}.");
        }
        PositionCommand::Set { name, coordinates } => {
            ed.set_position(exp, &name, coordinates.position())?;
            println!("Updated {}.", elablog::editor::position_name(&name));
        }
        PositionCommand::Delete { name } => {
            ed.delete_position(exp, &name)?;
            println!("Deleted {}.", elablog::editor::position_name(&name));
        }
    }
    Ok(())
}

fn print_sample(info: &elablog::sample::SampleInfo) {
    println!("{} (resource {})", info.name, info.id);
    if !info.material.is_empty() {
        println!("  Plate Material: {}", info.material);
    }
    if !info.comment.is_empty() {
        println!("  Comment: {}", info.comment);
    }
    for (id, title) in &info.linked_experiments {
        println!("  linked from experiment {id} '{title}'");
    }
}

fn sample(app: &App, cmd: SampleCommand) -> Result<()> {
    let (mut session, client) = app.connect()?;
    let ed = editor(&client);
    let item_or_selected = |item: Option<i64>, session: &Session| -> Result<i64> {
        match item {
            Some(item) => Ok(item),
            None => Ok(session.selected_sample()?),
        }
    };

    match cmd {
        SampleCommand::List => {
            let exp = experiment_id(&session)?;
            for link in ed.linked_samples(exp)? {
                let marker = if session.sample_id == Some(link.entityid) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {}\t{}", link.entityid, link.title);
            }
        }
        SampleCommand::Select { item } => {
            let entry = client.get_entry(EntityType::Items, item)?;
            session.sample_id = Some(entry.id);
            app.save_session(&session)?;
            println!("Selected sample {} '{}'.", entry.id, entry.title);
        }
        SampleCommand::Show { item } => {
            let item = item_or_selected(item, &session)?;
            print_sample(&ed.sample_info(item)?);
        }
        SampleCommand::Link { item } => {
            let exp = experiment_id(&session)?;
            ed.link_sample(exp, item)?;
            println!("Linked resource {item}.");
        }
        SampleCommand::Unlink { item } => {
            let exp = experiment_id(&session)?;
            ed.unlink_sample(exp, item)?;
            if session.sample_id == Some(item) {
                session.sample_id = None;
                app.save_session(&session)?;
            }
            println!("Unlinked resource {item}.");
        }
        SampleCommand::Edit {
            item,
            name,
            material,
            comment,
        } => {
            let item = item_or_selected(item, &session)?;
            let info = ed.edit_sample(
                item,
                name.as_deref(),
                material.as_deref(),
                comment.as_deref(),
                &app.config.web_base(),
            )?;
            print_sample(&info);
        }
    }
    Ok(())
}
