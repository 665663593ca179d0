//! Read-modify-write operations on notebook entries.
//!
//! Every operation fetches the entry, edits its body as text and sends the whole body back.
//! Concurrent edits from elsewhere are overwritten; the last writer wins.

use tracing::info;

use crate::catalog;
use crate::conditions::{Condition, GasComposition};
use crate::elab::{Category, EntityType, Entry, EntryPatch, ItemLink, Notebook};
use crate::journal;
use crate::positions::{self, Position};
use crate::sample::{self, SampleInfo, SampleLine};
use crate::steps::{self, Step, StepFamily, StepKind};
use crate::{Error, Result};

/// Instrument settings to change on a measurement step. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementUpdate {
    pub excitation: Option<String>,
    pub spot: Option<String>,
    pub power: Option<f64>,
    pub voltage: Option<f64>,
    pub core_levels: Option<Vec<String>>,
    pub max_cps: Option<f64>,
    pub reference_peak: Option<String>,
    pub gases: Option<GasComposition>,
    pub position: Option<String>,
}

impl MeasurementUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One condition of a step: its class and which occurrence of that class (1-based).
///
/// Written `class` or `class:N`, e.g. `ramp:2` for the second ramp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionRef {
    pub class: String,
    pub occurrence: usize,
}

impl ConditionRef {
    pub fn new(class: impl Into<String>, occurrence: usize) -> Self {
        Self {
            class: class.into(),
            occurrence,
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        match text.rsplit_once(':') {
            Some((class, n)) => {
                let occurrence = n
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|&n| n > 0)
                    .ok_or_else(|| Error::msg(format!("bad condition occurrence in '{text}'")))?;
                Ok(Self::new(class.trim(), occurrence))
            }
            None => Ok(Self::new(text, 1)),
        }
    }

    fn index_in(&self, step: &Step) -> Option<usize> {
        step.conditions
            .iter()
            .enumerate()
            .filter(|(_, c)| c.class() == self.class)
            .nth(self.occurrence.checked_sub(1)?)
            .map(|(i, _)| i)
    }
}

impl std::fmt::Display for ConditionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.occurrence == 1 {
            f.write_str(&self.class)
        } else {
            write!(f, "{}:{}", self.class, self.occurrence)
        }
    }
}

/// Append a condition of `class`, starting from its default or from `text`. A class may repeat.
pub fn add_condition(step: &mut Step, class: &str, text: Option<&str>) -> Result<()> {
    let allowed = step.family().condition_classes();
    if !allowed.contains(&class) {
        return Err(Error::msg(format!(
            "'{class}' is not a {} condition; choose one of: {}",
            family_noun(step.family()),
            allowed.join(", ")
        )));
    }
    let fresh = Condition::default_for(class)
        .ok_or_else(|| Error::msg(format!("unknown condition '{class}'")))?;
    step.conditions.push(match text {
        Some(t) => fresh.with_text(t),
        None => fresh,
    });
    Ok(())
}

/// Set the value of the condition `at` from text.
///
/// When `at` names the occurrence right after the last existing one, the condition is added.
pub fn set_condition(step: &mut Step, at: &ConditionRef, text: &str) -> Result<()> {
    if let Some(i) = at.index_in(step) {
        step.conditions[i] = step.conditions[i].with_text(text);
        return Ok(());
    }
    let count = step.conditions.iter().filter(|c| c.class() == at.class).count();
    if at.occurrence == count + 1 {
        return add_condition(step, &at.class, Some(text));
    }
    Err(Error::NotFound(format!("condition '{at}' on {}", step.title)))
}

/// Remove only the condition `at`; other conditions of the same class stay.
pub fn remove_condition(step: &mut Step, at: &ConditionRef) -> Result<Condition> {
    let i = at
        .index_in(step)
        .ok_or_else(|| Error::NotFound(format!("condition '{at}' on {}", step.title)))?;
    Ok(step.conditions.remove(i))
}

/// Apply `update` to a measurement step, checking values against the instrument catalog and
/// the experiment's positions.
pub fn apply_measurement(
    step: &mut Step,
    update: &MeasurementUpdate,
    position_names: &[String],
) -> Result<()> {
    if step.family() != StepFamily::Measurement {
        return Err(Error::msg(format!("{} is not a measurement", step.title)));
    }
    let reference = step.kind == StepKind::Reference;
    let fields = step.measurement.get_or_insert_with(Default::default);

    if let Some(input) = &update.excitation {
        fields.excitation = catalog::resolve_excitation(input)
            .ok_or_else(|| {
                Error::msg(format!(
                    "unknown excitation '{input}'; choose one of: {}",
                    catalog::excitation_names().collect::<Vec<_>>().join(", ")
                ))
            })?
            .to_string();
    }
    if let Some(spot) = &update.spot {
        fields.spot = spot.trim().to_string();
    }
    if !fields.spot.is_empty() {
        let spots = catalog::spot_settings(&fields.excitation);
        if !spots.contains(&fields.spot.as_str()) {
            return Err(Error::msg(format!(
                "spot '{}' does not belong to '{}'; choose one of: {}",
                fields.spot,
                fields.excitation,
                spots.join(", ")
            )));
        }
    }
    if let Some(p) = update.power {
        fields.power = p;
    }
    if let Some(v) = update.voltage {
        fields.voltage = v;
    }
    if let Some(levels) = &update.core_levels {
        if reference {
            return Err(Error::msg("reference measurements record max. CPS, not core levels"));
        }
        let invalid: Vec<&str> = levels
            .iter()
            .map(String::as_str)
            .filter(|l| !catalog::is_valid_core_level(l))
            .collect();
        if !invalid.is_empty() {
            return Err(Error::msg(format!("invalid core levels: {}", invalid.join(", "))));
        }
        fields.core_levels = levels.clone();
    }
    if update.max_cps.is_some() || update.reference_peak.is_some() {
        if !reference {
            return Err(Error::msg("only reference measurements record max. CPS and a peak"));
        }
        if let Some(cps) = update.max_cps {
            fields.max_cps = cps;
        }
        if let Some(peak) = &update.reference_peak {
            fields.reference_peak = peak.clone();
        }
    }
    if let Some(gases) = &update.gases {
        fields.gases = gases.clone();
    }
    if let Some(pos) = &update.position {
        let wanted = position_name(pos);
        if !position_names.contains(&wanted) {
            return Err(Error::NotFound(format!("position '{pos}'")));
        }
        fields.position = wanted;
    }
    Ok(())
}

fn family_noun(family: StepFamily) -> &'static str {
    match family {
        StepFamily::Treatment => "treatment",
        StepFamily::Measurement => "measurement",
    }
}

/// `"3"` and `"position 3"` both mean `"Position 3"`.
pub fn position_name(input: &str) -> String {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("Position")
        .or_else(|| trimmed.strip_prefix("position"))
        .unwrap_or(trimmed)
        .trim();
    match digits.parse::<usize>() {
        Ok(n) => format!("Position {n}"),
        Err(_) => trimmed.to_string(),
    }
}

/// High-level edits against one notebook.
pub struct Editor<'a> {
    notebook: &'a dyn Notebook,
}

impl<'a> Editor<'a> {
    pub fn new(notebook: &'a dyn Notebook) -> Self {
        Self { notebook }
    }

    pub fn notebook(&self) -> &'a dyn Notebook {
        self.notebook
    }

    fn experiment(&self, id: i64) -> Result<Entry> {
        self.notebook.get_entry(EntityType::Experiments, id)
    }

    fn patch_experiment(&self, id: i64, body: &str) -> Result<()> {
        self.notebook.patch_body(EntityType::Experiments, id, body)
    }

    // ----- entries -----

    /// Create an entry, then set its title, initial comment and category.
    pub fn create_entry(
        &self,
        entity: EntityType,
        title: &str,
        comment: &str,
        category: Option<i64>,
    ) -> Result<i64> {
        let id = self.notebook.create_entry(entity, None)?;
        self.notebook
            .patch_entry(entity, id, &EntryPatch::title(title))?;
        if !comment.is_empty() {
            self.notebook.patch_body(entity, id, comment)?;
        }
        if let Some(cat) = category {
            self.notebook
                .patch_entry(entity, id, &EntryPatch::category(cat))?;
        }
        info!(%entity, id, title, "entry created");
        Ok(id)
    }

    /// Category, author and modification summary of an entry.
    pub fn info_summary(&self, entity: EntityType, id: i64) -> Result<String> {
        let entry = self.notebook.get_entry(entity, id)?;
        let editor = if entry.lastchangeby > 0 {
            self.notebook.user(entry.lastchangeby)?.fullname
        } else {
            String::new()
        };
        Ok(format!(
            "Category: {}\n\nCreated by {} on {}\n\nLast modified by {} on {}",
            entry.category_title, entry.fullname, entry.created_at, editor, entry.modified_at
        ))
    }

    pub fn categories(&self, entity: EntityType, team: i64) -> Result<Vec<Category>> {
        match entity {
            EntityType::Experiments => self.notebook.experiment_categories(team),
            EntityType::Items => self.notebook.resource_categories(),
        }
    }

    // ----- steps -----

    pub fn steps(&self, exp: i64, family: StepFamily) -> Result<Vec<Step>> {
        Ok(steps::read_steps(&self.experiment(exp)?.body, family))
    }

    /// The step titled `title`, or the empty step when there is none.
    pub fn step(&self, exp: i64, family: StepFamily, title: &str) -> Result<Step> {
        Ok(steps::select_step(&self.steps(exp, family)?, title))
    }

    /// Append a new empty step through the journal, numbered with the smallest free number.
    ///
    /// `sample_id` is referenced by its position among the experiment's linked items.
    pub fn new_step(&self, exp: i64, kind: StepKind, sample_id: Option<i64>) -> Result<Step> {
        let entry = self.experiment(exp)?;
        let num = steps::next_number(&entry.body, kind.family());
        let sample_ref = sample_id.and_then(|s| entry.link_index(s));
        let html = steps::skeleton_html(kind, num, sample_ref);
        journal::append_to_entry(self.notebook, EntityType::Experiments, exp, &html, None)?;
        Ok(Step::new(kind, num, sample_ref))
    }

    pub fn delete_step(&self, exp: i64, family: StepFamily, title: &str) -> Result<()> {
        let entry = self.experiment(exp)?;
        let step = steps::select_step(&steps::read_steps(&entry.body, family), title);
        if step.is_empty() {
            return Err(Error::NotFound(format!("step '{title}'")));
        }
        let body = steps::remove_step(&entry.body, step.kind, &step.title)
            .ok_or_else(|| Error::NotFound(format!("step '{title}'")))?;
        self.patch_experiment(exp, &body)?;
        info!(exp, title = %step.title, "step deleted");
        Ok(())
    }

    /// Edit the step titled `title` in place and write it back.
    ///
    /// `edit` also receives the experiment's position names.
    pub fn modify_step<F>(&self, exp: i64, family: StepFamily, title: &str, edit: F) -> Result<Step>
    where
        F: FnOnce(&mut Step, &[String]) -> Result<()>,
    {
        let entry = self.experiment(exp)?;
        let mut step = steps::select_step(&steps::read_steps(&entry.body, family), title);
        if step.is_empty() {
            return Err(Error::NotFound(format!("step '{title}'")));
        }
        edit(&mut step, &positions::position_names(&entry.body))?;
        let body = steps::replace_step(&entry.body, &step)
            .ok_or_else(|| Error::NotFound(format!("step '{title}'")))?;
        self.patch_experiment(exp, &body)?;
        info!(exp, title = %step.title, "step updated");
        Ok(step)
    }

    // ----- positions -----

    pub fn positions(&self, exp: i64) -> Result<Vec<Position>> {
        Ok(positions::read_positions(&self.experiment(exp)?.body))
    }

    fn rewrite_positions<F>(&self, exp: i64, edit: F) -> Result<Vec<Position>>
    where
        F: FnOnce(&mut Vec<Position>) -> Result<()>,
    {
        let entry = self.experiment(exp)?;
        let mut list = positions::read_positions(&entry.body);
        edit(&mut list)?;
        let body = positions::write_positions(&entry.body, &list);
        self.patch_experiment(exp, &body)?;
        Ok(positions::read_positions(&body))
    }

    /// Append a position; returns its name.
    pub fn add_position(&self, exp: i64, position: Position) -> Result<String> {
        let list = self.rewrite_positions(exp, |list| {
            list.push(position);
            Ok(())
        })?;
        Ok(list.last().map(|p| p.name.clone()).unwrap_or_default())
    }

    pub fn set_position(&self, exp: i64, name: &str, position: Position) -> Result<()> {
        let wanted = position_name(name);
        self.rewrite_positions(exp, |list| {
            let slot = list
                .iter_mut()
                .find(|p| p.name == wanted)
                .ok_or_else(|| Error::NotFound(format!("position '{name}'")))?;
            *slot = Position {
                name: wanted.clone(),
                ..position
            };
            Ok(())
        })
        .map(|_| ())
    }

    /// Remove a position. Later positions move up a number.
    pub fn delete_position(&self, exp: i64, name: &str) -> Result<()> {
        let wanted = position_name(name);
        self.rewrite_positions(exp, |list| {
            let before = list.len();
            list.retain(|p| p.name != wanted);
            if list.len() == before {
                return Err(Error::NotFound(format!("position '{name}'")));
            }
            Ok(())
        })
        .map(|_| ())
    }

    // ----- samples -----

    pub fn linked_samples(&self, exp: i64) -> Result<Vec<ItemLink>> {
        Ok(self.experiment(exp)?.items_links)
    }

    /// Rewrite the sample lines of the resource section from the current item links.
    fn sync_sample_lines(&self, exp: i64) -> Result<()> {
        let entry = self.experiment(exp)?;
        let lines: Vec<SampleLine> = entry
            .items_links
            .iter()
            .map(|l| SampleLine {
                id: l.entityid,
                title: l.title.clone(),
            })
            .collect();
        let body = sample::write_sample_lines(&entry.body, &lines);
        self.patch_experiment(exp, &body)
    }

    pub fn link_sample(&self, exp: i64, item: i64) -> Result<()> {
        self.notebook.link_item(exp, item)?;
        self.sync_sample_lines(exp)
    }

    pub fn unlink_sample(&self, exp: i64, item: i64) -> Result<()> {
        self.notebook.unlink_item(exp, item)?;
        self.sync_sample_lines(exp)
    }

    /// Information about a sample, including every experiment that links it.
    pub fn sample_info(&self, item: i64) -> Result<SampleInfo> {
        let entry = self.notebook.get_entry(EntityType::Items, item)?;
        let mut info = SampleInfo::read(item, &entry.title, &entry.body);
        for exp in self.notebook.list_entries(EntityType::Experiments)? {
            let links = if exp.items_links.is_empty() {
                self.experiment(exp.id)?.items_links
            } else {
                exp.items_links
            };
            if links.iter().any(|l| l.entityid == item) {
                info.linked_experiments.push((exp.id, exp.title));
            }
        }
        Ok(info)
    }

    /// Rewrite a sample's information block. `None` keeps the current value.
    pub fn edit_sample(
        &self,
        item: i64,
        name: Option<&str>,
        material: Option<&str>,
        comment: Option<&str>,
        web_base: &str,
    ) -> Result<SampleInfo> {
        let mut info = self.sample_info(item)?;
        if let Some(m) = material {
            let m = catalog::PLATE_MATERIALS
                .iter()
                .find(|p| p.eq_ignore_ascii_case(m.trim()))
                .ok_or_else(|| {
                    Error::msg(format!(
                        "unknown plate material '{m}'; choose one of: {}",
                        catalog::PLATE_MATERIALS.join(", ")
                    ))
                })?;
            info.material = m.to_string();
        }
        if let Some(c) = comment {
            info.comment = c.to_string();
        }
        let entry = self.notebook.get_entry(EntityType::Items, item)?;
        if let Some(n) = name {
            info.name = n.to_string();
            if n != entry.title {
                self.notebook
                    .patch_entry(EntityType::Items, item, &EntryPatch::title(n))?;
            }
        }
        let body = sample::apply_info_block(&entry.body, &info.render(web_base));
        self.notebook.patch_body(EntityType::Items, item, &body)?;
        info!(item, "sample information updated");
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement() -> Step {
        Step::new(StepKind::Measurement, 1, None)
    }

    #[test]
    fn conditions_follow_family_rules() -> anyhow::Result<()> {
        let mut t = Step::new(StepKind::Anneal, 1, None);
        add_condition(&mut t, "xenergy", None)?;
        assert_eq!(t.conditions[0].to_text(), "0.0 V (20.0 mA)");
        assert!(add_condition(&mut t, "xsource", None).is_err());

        let temp = ConditionRef::parse("temp")?;
        set_condition(&mut t, &temp, "650 K")?;
        assert_eq!(t.conditions[1], Condition::Temp(650.0));
        set_condition(&mut t, &temp, "700")?;
        assert_eq!(t.conditions[1], Condition::Temp(700.0));
        assert!(set_condition(&mut t, &ConditionRef::new("temp", 3), "1").is_err());

        let xenergy = ConditionRef::parse("xenergy")?;
        remove_condition(&mut t, &xenergy)?;
        assert!(remove_condition(&mut t, &xenergy).is_err());
        assert_eq!(t.conditions.len(), 1);
        Ok(())
    }

    #[test]
    fn repeated_classes_are_addressed_by_occurrence() -> anyhow::Result<()> {
        let mut t = Step::new(StepKind::Anneal, 1, None);
        add_condition(&mut t, "ramp", Some("0.2 W -> 20 W; @ 0.1 W/step"))?;
        add_condition(&mut t, "temp", Some("600 K"))?;
        add_condition(&mut t, "ramp", Some("600 K -> 900 K; @ 1 K/step"))?;

        let second = ConditionRef::parse("ramp:2")?;
        set_condition(&mut t, &second, "600 -> 1000; @ 2")?;
        assert_eq!(t.conditions[2].to_text(), "600.0 K → 1000.0 K; @ 2.0 K/step");
        assert_eq!(t.conditions[0].to_text(), "0.2 W → 20.0 W; @ 0.1 W/step");

        let removed = remove_condition(&mut t, &ConditionRef::new("ramp", 1))?;
        assert_eq!(removed.to_text(), "0.2 W → 20.0 W; @ 0.1 W/step");
        let classes: Vec<&str> = t.conditions.iter().map(|c| c.class()).collect();
        assert_eq!(classes, ["temp", "ramp"]);

        assert!(ConditionRef::parse("ramp:0").is_err());
        assert!(ConditionRef::parse("ramp:x").is_err());
        assert_eq!(ConditionRef::new("ramp", 2).to_string(), "ramp:2");
        Ok(())
    }

    #[test]
    fn measurement_update_checks_catalog() -> anyhow::Result<()> {
        let names = vec!["Position 1".to_string(), "Position 2".to_string()];
        let mut m = measurement();
        apply_measurement(
            &mut m,
            &MeasurementUpdate {
                excitation: Some("Al".into()),
                spot: Some("Al 250um 100W".into()),
                power: Some(100.0),
                core_levels: Some(vec!["Ti 2p".into(), "O 1s".into()]),
                position: Some("2".into()),
                ..Default::default()
            },
            &names,
        )?;
        let f = m.measurement.clone().unwrap_or_default();
        assert_eq!(f.excitation, "Al K α₁ (1486.6 eV)");
        assert_eq!(f.position, "Position 2");

        let bad_spot = MeasurementUpdate {
            excitation: Some("Cr".into()),
            ..Default::default()
        };
        assert!(apply_measurement(&mut m.clone(), &bad_spot, &names).is_err());

        let bad_level = MeasurementUpdate {
            core_levels: Some(vec!["Ti 9z".into()]),
            ..Default::default()
        };
        assert!(apply_measurement(&mut m.clone(), &bad_level, &names).is_err());

        let cps = MeasurementUpdate {
            max_cps: Some(1e5),
            ..Default::default()
        };
        assert!(apply_measurement(&mut m.clone(), &cps, &names).is_err());
        let mut r = Step::new(StepKind::Reference, 2, None);
        apply_measurement(&mut r, &cps, &names)?;

        let missing = MeasurementUpdate {
            position: Some("Position 7".into()),
            ..Default::default()
        };
        assert!(apply_measurement(&mut m, &missing, &names).is_err());
        Ok(())
    }

    #[test]
    fn position_names_normalize() {
        assert_eq!(position_name("3"), "Position 3");
        assert_eq!(position_name("position 12"), "Position 12");
        assert_eq!(position_name("Position 1"), "Position 1");
        assert_eq!(position_name("garage"), "garage");
    }
}
