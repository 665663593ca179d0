use anyhow::{Result, bail};
use clap::Subcommand;

use elablog::conditions::GasComposition;
use elablog::editor::{self, ConditionRef, MeasurementUpdate};
use elablog::elab::ElabClient;
use elablog::session::Session;
use elablog::steps::{Step, StepFamily, StepKind};

use crate::app::{editor, experiment_id};

#[derive(Subcommand, Debug)]
pub enum StepCommand {
    /// List the steps of the selected experiment.
    List,

    /// Show one step.
    Show { title: String },

    /// Append a new empty step, referencing the selected sample.
    New {
        /// sputter | anneal for treatments, mess | ref for measurements.
        kind: String,
    },

    /// Delete a step and its journal row.
    Delete { title: String },

    /// Change a step's note, conditions or (measurements) instrument fields.
    Set {
        title: String,

        #[arg(long)]
        note: Option<String>,

        /// `class=value`, e.g. `temp=650 K` or `dura=1 h, 30 min`. Repeatable.
        /// `ramp:2=...` targets the second condition of a repeated class.
        #[arg(long = "condition", value_name = "CLASS[:N]=VALUE")]
        conditions: Vec<String>,

        #[command(flatten)]
        measurement: MeasurementArgs,
    },

    /// Append a condition with its default value or `value`.
    AddCondition {
        title: String,
        class: String,
        value: Option<String>,
    },

    /// Remove one condition, `class` or `class:N` for the N-th of that class.
    RemoveCondition { title: String, condition: String },
}

#[derive(clap::Args, Debug, Default)]
pub struct MeasurementArgs {
    /// Excitation line, by name or source element (`Al`).
    #[arg(long)]
    excitation: Option<String>,

    #[arg(long)]
    spot: Option<String>,

    /// W
    #[arg(long)]
    power: Option<f64>,

    /// kV
    #[arg(long)]
    voltage: Option<f64>,

    /// Comma separated, e.g. `C 1s, Ti 2p`.
    #[arg(long)]
    core_levels: Option<String>,

    #[arg(long)]
    max_cps: Option<f64>,

    #[arg(long)]
    reference_peak: Option<String>,

    /// `N2 (2e-5 mbar), O2 (1e-6 mbar)` or `UHV`.
    #[arg(long)]
    gases: Option<String>,

    /// Position name or number.
    #[arg(long)]
    position: Option<String>,
}

impl MeasurementArgs {
    fn update(&self) -> MeasurementUpdate {
        MeasurementUpdate {
            excitation: self.excitation.clone(),
            spot: self.spot.clone(),
            power: self.power,
            voltage: self.voltage,
            core_levels: self.core_levels.as_ref().map(|levels| {
                levels
                    .split(',')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
            max_cps: self.max_cps,
            reference_peak: self.reference_peak.clone(),
            gases: self.gases.as_deref().map(GasComposition::parse),
            position: self.position.clone(),
        }
    }
}

fn parse_kind(family: StepFamily, name: &str) -> Result<StepKind> {
    match StepKind::from_name(name) {
        Some(kind) if kind.family() == family => Ok(kind),
        _ => {
            let names: Vec<&str> = family.kinds().iter().map(|k| k.class()).collect();
            bail!("unknown step kind '{name}'; choose one of: {}", names.join(", "))
        }
    }
}

fn print_step(step: &Step) {
    match step.sample_ref {
        Some(n) => println!("{} (Sample {n})", step.title),
        None => println!("{}", step.title),
    }
    if let Some(m) = &step.measurement {
        println!("  Excitation Energy: {}", m.excitation);
        println!("  Spot Setting: {}", m.spot);
        println!("  Power: {} W", m.power);
        println!("  Voltage: {} kV", m.voltage);
        if step.kind == StepKind::Reference {
            println!("  Max. CPS: {}", m.max_cps);
            println!("  Reference Peak: {}", m.reference_peak);
        } else {
            println!("  Core Levels: {}", m.core_levels.join(", "));
        }
        println!("  Set Gas: {}", m.gases);
        println!("  Position: {}", m.position);
    }
    for (i, cond) in step.conditions.iter().enumerate() {
        let occurrence = step.conditions[..=i]
            .iter()
            .filter(|c| c.class() == cond.class())
            .count();
        let at = ConditionRef::new(cond.class(), occurrence);
        println!("  {} [{at}]: {}", cond.label(), cond.to_text());
    }
    if !step.note.is_empty() {
        println!("  Note: {}", step.note);
    }
}

pub fn run(
    family: StepFamily,
    cmd: StepCommand,
    session: &Session,
    client: &ElabClient,
) -> Result<()> {
    let exp = experiment_id(session)?;
    let ed = editor(client);

    match cmd {
        StepCommand::List => {
            for step in ed.steps(exp, family)? {
                println!("{}", step.title);
            }
        }
        StepCommand::Show { title } => {
            let step = ed.step(exp, family, &title)?;
            if step.is_empty() {
                bail!("no step titled '{title}'");
            }
            print_step(&step);
        }
        StepCommand::New { kind } => {
            let kind = parse_kind(family, &kind)?;
            let step = ed.new_step(exp, kind, session.sample_id)?;
            println!("Created {}", step.title);
        }
        StepCommand::Delete { title } => {
            ed.delete_step(exp, family, &title)?;
            println!("Deleted {title}");
        }
        StepCommand::Set {
            title,
            note,
            conditions,
            measurement,
        } => {
            let update = measurement.update();
            if family == StepFamily::Treatment && !update.is_empty() {
                bail!("instrument fields only apply to measurements");
            }
            let assignments = conditions
                .iter()
                .map(|c| -> Result<(ConditionRef, String)> {
                    let (at, value) = c
                        .split_once('=')
                        .ok_or_else(|| anyhow::anyhow!("expected CLASS=VALUE, got '{c}'"))?;
                    Ok((ConditionRef::parse(at)?, value.trim().to_string()))
                })
                .collect::<Result<Vec<_>>>()?;

            let step = ed.modify_step(exp, family, &title, |step, positions| {
                if let Some(note) = &note {
                    step.note = note.clone();
                }
                for (at, value) in &assignments {
                    editor::set_condition(step, at, value)?;
                }
                if !update.is_empty() {
                    editor::apply_measurement(step, &update, positions)?;
                }
                Ok(())
            })?;
            print_step(&step);
        }
        StepCommand::AddCondition {
            title,
            class,
            value,
        } => {
            let step = ed.modify_step(exp, family, &title, |step, _| {
                editor::add_condition(step, &class, value.as_deref())
            })?;
            print_step(&step);
        }
        StepCommand::RemoveCondition { title, condition } => {
            let at = ConditionRef::parse(&condition)?;
            let step = ed.modify_step(exp, family, &title, |step, _| {
                editor::remove_condition(step, &at).map(drop)
            })?;
            print_step(&step);
        }
    }
    Ok(())
}
