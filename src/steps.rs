//! Treatment and measurement step fragments.
//!
//! A step is a `<div class="{kind}">` block inside an experiment body. Its title carries a
//! sequence number (`"Annealing #2"`) that is unique within the step family, an optional
//! reference to a linked sample, a list of conditions and an optional note. Measurement steps
//! additionally carry a fixed set of instrument fields.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::conditions::{Condition, GasComposition, MEASUREMENT_CONDITIONS, TREATMENT_CONDITIONS};
use crate::html::{Document, Splice, escape};
use crate::units::{format_float, leading_float};

/// Which page a step belongs to. Numbers are allocated per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepFamily {
    Treatment,
    Measurement,
}

impl StepFamily {
    pub fn kinds(self) -> &'static [StepKind] {
        match self {
            StepFamily::Treatment => &[StepKind::Sputter, StepKind::Anneal],
            StepFamily::Measurement => &[StepKind::Reference, StepKind::Measurement],
        }
    }

    /// Condition classes a user may add to steps of this family.
    pub fn condition_classes(self) -> &'static [&'static str] {
        match self {
            StepFamily::Treatment => TREATMENT_CONDITIONS,
            StepFamily::Measurement => MEASUREMENT_CONDITIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StepKind {
    #[default]
    Sputter,
    Anneal,
    Reference,
    Measurement,
}

impl StepKind {
    /// CSS class of the fragment div.
    pub fn class(self) -> &'static str {
        match self {
            StepKind::Sputter => "sputter",
            StepKind::Anneal => "anneal",
            StepKind::Reference => "mess_ref",
            StepKind::Measurement => "mess",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            StepKind::Sputter => "Sputtering",
            StepKind::Anneal => "Annealing",
            StepKind::Reference => "Reference Measurement",
            StepKind::Measurement => "Measurement",
        }
    }

    pub fn family(self) -> StepFamily {
        match self {
            StepKind::Sputter | StepKind::Anneal => StepFamily::Treatment,
            StepKind::Reference | StepKind::Measurement => StepFamily::Measurement,
        }
    }

    pub fn from_class(class: &str) -> Option<Self> {
        [
            StepKind::Sputter,
            StepKind::Anneal,
            StepKind::Reference,
            StepKind::Measurement,
        ]
        .into_iter()
        .find(|k| k.class() == class)
    }

    /// Accepts the class (`anneal`), the display name (`Annealing`) or a short alias.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        match lower.as_str() {
            "sputter" | "sputtering" => Some(StepKind::Sputter),
            "anneal" | "annealing" => Some(StepKind::Anneal),
            "mess_ref" | "ref" | "reference" | "reference measurement" => {
                Some(StepKind::Reference)
            }
            "mess" | "measurement" => Some(StepKind::Measurement),
            _ => None,
        }
    }
}

/// Instrument settings every measurement step records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementFields {
    pub excitation: String,
    pub spot: String,
    /// W
    pub power: f64,
    /// kV
    pub voltage: f64,
    /// Plain measurements only, e.g. `["Ti 2p", "O 1s"]`.
    pub core_levels: Vec<String>,
    /// Reference measurements only.
    pub max_cps: f64,
    /// Reference measurements only.
    pub reference_peak: String,
    pub gases: GasComposition,
    /// Name of a position from the experiment's resource section.
    pub position: String,
}

/// Classes of the mandatory measurement fields, as they appear in the body.
const MEASUREMENT_FIELD_CLASSES: &[&str] = &[
    "excite", "spot", "power", "voltage", "corelvls", "maxcps", "refpeak", "pos",
];

/// A parsed step fragment.
///
/// The default value is the empty step returned when a lookup finds nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Step {
    pub kind: StepKind,
    /// `"Annealing #2"`
    pub title: String,
    pub num: u32,
    /// 1-based index into the experiment's linked items.
    pub sample_ref: Option<usize>,
    /// Present for measurement kinds.
    pub measurement: Option<MeasurementFields>,
    pub conditions: Vec<Condition>,
    pub note: String,
}

impl Step {
    pub fn new(kind: StepKind, num: u32, sample_ref: Option<usize>) -> Self {
        Self {
            kind,
            title: format!("{} #{num}", kind.display_name()),
            num,
            sample_ref,
            measurement: (kind.family() == StepFamily::Measurement)
                .then(MeasurementFields::default),
            conditions: Vec::new(),
            note: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
    }

    pub fn family(&self) -> StepFamily {
        self.kind.family()
    }
}

/// Read all numbered steps of `family` from `body`, in document order.
///
/// Fragments whose title has no `#N` sequence number are skipped.
pub fn read_steps(body: &str, family: StepFamily) -> Vec<Step> {
    let doc = Document::parse(body);
    (0..doc.len())
        .filter(|&id| doc.element(id).name == "div")
        .filter_map(|id| {
            let kind = doc
                .element(id)
                .classes()
                .filter_map(StepKind::from_class)
                .find(|k| k.family() == family)?;
            read_step(&doc, id, kind)
        })
        .collect()
}

fn read_step(doc: &Document<'_>, id: usize, kind: StepKind) -> Option<Step> {
    let title = doc
        .find_in(id, "div", "title")
        .map(|t| title_text(&doc.text(t)))?;
    let num = parse_title_number(&title)?;

    let sample_ref = doc
        .find_in(id, "div", "sample")
        .and_then(|s| parse_sample_ref(&doc.text(s)));
    let note = doc
        .find_in(id, "div", "note")
        .map(|n| doc.text(n))
        .unwrap_or_default();

    let mut measurement = (kind.family() == StepFamily::Measurement).then(MeasurementFields::default);
    let mut mandatory_gases_seen = false;
    let mut seen_fields: HashSet<&str> = HashSet::new();
    let mut conditions = Vec::new();

    for div in doc.find_all_in(id, "div", "") {
        let el = doc.element(div);
        let Some(class) = el.primary_class() else {
            continue;
        };
        if matches!(class, "title" | "sample" | "note") {
            continue;
        }
        let text = doc.text(div);

        if let Some(fields) = measurement.as_mut() {
            if MEASUREMENT_FIELD_CLASSES.contains(&class) {
                if seen_fields.insert(class) {
                    set_measurement_field(fields, class, &text);
                }
                continue;
            }
            if class == "gases" && !mandatory_gases_seen {
                mandatory_gases_seen = true;
                fields.gases = GasComposition::parse(&text);
                continue;
            }
        }

        // Conditions are list items; bare divs elsewhere in the fragment are layout.
        let Some(li) = doc.ancestor(div, "li") else {
            continue;
        };
        let label = doc
            .find_in(li, "b", "")
            .or_else(|| doc.find_in(li, "strong", ""))
            .map(|b| doc.text(b).trim_end_matches(':').to_string())
            .unwrap_or_default();
        conditions.push(Condition::from_text(class, &label, &text));
    }

    Some(Step {
        kind,
        title,
        num,
        sample_ref,
        measurement,
        conditions,
        note,
    })
}

fn set_measurement_field(fields: &mut MeasurementFields, class: &str, text: &str) {
    match class {
        "excite" => fields.excitation = text.to_string(),
        "spot" => fields.spot = text.to_string(),
        "power" => fields.power = leading_float(text),
        "voltage" => fields.voltage = leading_float(text),
        "corelvls" => {
            fields.core_levels = text
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        "maxcps" => fields.max_cps = leading_float(text),
        "refpeak" => fields.reference_peak = text.to_string(),
        "pos" => fields.position = text.to_string(),
        _ => {}
    }
}

fn title_text(raw: &str) -> String {
    raw.trim().trim_end_matches(':').trim_end().to_string()
}

/// The sequence number after `#` in a title.
pub fn parse_title_number(title: &str) -> Option<u32> {
    let (_, rest) = title.split_once('#')?;
    rest.trim().parse().ok()
}

/// Read `"Sample 2"` or `"( Sample 2 )"`. Non-positive references are treated as absent.
pub fn parse_sample_ref(text: &str) -> Option<usize> {
    let (_, rest) = text.split_once("Sample")?;
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<usize>().ok().filter(|&n| n > 0)
}

fn push_item(html: &mut String, label: &str, class: &str, value: &str) {
    let _ = write!(
        html,
        "\n<li><b>{}</b>: <div class=\"{}\" style=\"display:inline;\">{}</div></li>",
        escape(label),
        escape(class),
        escape(value)
    );
}

/// Serialize a step to its fragment HTML.
pub fn render_step(step: &Step) -> String {
    let mut html = String::new();
    let _ = write!(html, "<div class=\"{}\">", step.kind.class());
    let _ = write!(
        html,
        "\n<b><div class=\"title\" style=\"display:inline;\">{}</div>:</b>",
        escape(&step.title)
    );
    if let Some(n) = step.sample_ref {
        let _ = write!(
            html,
            "\n<a>(<div class=\"sample\" style=\"display:inline;\">Sample {n}</div>)</a>"
        );
    }

    html.push_str("\n<ul>");
    if step.family() == StepFamily::Measurement {
        let fields = step.measurement.clone().unwrap_or_default();
        push_item(&mut html, "Excitation Energy", "excite", &fields.excitation);
        push_item(&mut html, "Spot Setting", "spot", &fields.spot);
        push_item(&mut html, "Power", "power", &format!("{} W", format_float(fields.power)));
        push_item(
            &mut html,
            "Voltage",
            "voltage",
            &format!("{} kV", format_float(fields.voltage)),
        );
        if step.kind == StepKind::Reference {
            push_item(&mut html, "Max. CPS", "maxcps", &format_float(fields.max_cps));
            push_item(&mut html, "Reference Peak", "refpeak", &fields.reference_peak);
        } else {
            push_item(&mut html, "Core Levels", "corelvls", &fields.core_levels.join(", "));
        }
        push_item(&mut html, "Set Gas", "gases", &fields.gases.to_string());
        push_item(&mut html, "Position", "pos", &fields.position);
    }
    for cond in &step.conditions {
        push_item(&mut html, cond.label(), cond.class(), &cond.to_text());
    }
    html.push_str("\n</ul>");

    if !step.note.is_empty() {
        let _ = write!(
            html,
            "\n<small><b>Note</b>: <div class=\"note\" style=\"display:inline;\">{}</div></small>",
            escape(&step.note)
        );
    }
    html.push_str("\n</div>");
    html
}

/// HTML for a new, empty step numbered `num`.
pub fn skeleton_html(kind: StepKind, num: u32, sample_ref: Option<usize>) -> String {
    let sample = sample_ref
        .map(|n| {
            format!(" <a><div class='sample' style='display:inline;'>( Sample {n} )</div></a>")
        })
        .unwrap_or_default();
    format!(
        "<div class='{class}'><h5><div class='title' style='display:inline;'>{name} #{num}</div>:{sample}</h5><br><ul></ul></div>",
        class = kind.class(),
        name = kind.display_name(),
    )
}

/// Fragments of `kind` whose title is `title`.
fn matching_fragments(doc: &Document<'_>, kind: StepKind, title: &str) -> Vec<usize> {
    let wanted = title_text(title);
    doc.find_all("div", kind.class())
        .into_iter()
        .filter(|&id| {
            doc.find_in(id, "div", "title")
                .is_some_and(|t| title_text(&doc.text(t)) == wanted)
        })
        .collect()
}

/// Replace the fragment with `step`'s kind and title by a fresh rendering of `step`.
///
/// Returns `None` when no such fragment exists.
pub fn replace_step(body: &str, step: &Step) -> Option<String> {
    let doc = Document::parse(body);
    let targets = matching_fragments(&doc, step.kind, &step.title);
    if targets.is_empty() {
        return None;
    }
    let rendered = render_step(step);
    let mut edits = Splice::new();
    for id in outermost(&doc, targets) {
        edits.replace(doc.element(id).outer(), rendered.clone());
    }
    Some(edits.apply(body))
}

/// Remove the step titled `title`: its enclosing journal table row if it has one, else the
/// fragment itself.
///
/// Returns `None` when no such fragment exists.
pub fn remove_step(body: &str, kind: StepKind, title: &str) -> Option<String> {
    let doc = Document::parse(body);
    let targets: Vec<usize> = matching_fragments(&doc, kind, title)
        .into_iter()
        .map(|id| doc.ancestor(id, "tr").unwrap_or(id))
        .collect();
    if targets.is_empty() {
        return None;
    }
    let mut edits = Splice::new();
    for id in outermost(&doc, targets) {
        edits.remove(doc.element(id).outer());
    }
    Some(edits.apply(body))
}

/// Drop ids nested inside another id of the set, and duplicates, so splices never overlap.
fn outermost(doc: &Document<'_>, mut ids: Vec<usize>) -> Vec<usize> {
    ids.sort_unstable();
    ids.dedup();
    let mut out: Vec<usize> = Vec::new();
    for id in ids {
        let inside_previous = out
            .last()
            .is_some_and(|&prev| doc.element(id).start < doc.element(prev).end);
        if !inside_previous {
            out.push(id);
        }
    }
    out
}

/// The step titled `title`, or the default empty step.
pub fn select_step(steps: &[Step], title: &str) -> Step {
    let wanted = title_text(title);
    steps
        .iter()
        .find(|s| s.title == wanted)
        .cloned()
        .unwrap_or_default()
}

/// Smallest positive number not in `nums`.
pub fn smallest_available(nums: impl IntoIterator<Item = u32>) -> u32 {
    let taken: HashSet<u32> = nums.into_iter().collect();
    (1..).find(|n| !taken.contains(n)).unwrap_or(1)
}

/// The number a new step of `family` in `body` gets.
pub fn next_number(body: &str, family: StepFamily) -> u32 {
    smallest_available(read_steps(body, family).iter().map(|s| s.num))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{Electrical, Ramp, RampKind};
    use crate::units::parse_duration;

    fn anneal() -> Step {
        let mut gases = GasComposition::new();
        gases.set("O2", 1e-6);
        Step {
            kind: StepKind::Anneal,
            title: "Annealing #2".into(),
            num: 2,
            sample_ref: Some(1),
            measurement: None,
            conditions: vec![
                Condition::InitialTemp(298.0),
                Condition::Gases(gases),
                Condition::Ramp(Ramp {
                    kind: RampKind::Temperature,
                    start: 700.0,
                    stop: 1000.0,
                    step: 1.0,
                }),
                Condition::Duration(parse_duration("1 h, 30 min")),
                Condition::Comment("Slow & steady <careful>".into()),
            ],
            note: "Nothing unusual.".into(),
        }
    }

    #[test]
    fn render_then_read_is_identity() {
        let step = anneal();
        let body = format!("<p>intro</p>{}", render_step(&step));
        let steps = read_steps(&body, StepFamily::Treatment);
        assert_eq!(steps, vec![step]);
    }

    #[test]
    fn measurement_render_then_read_is_identity() {
        let mut step = Step::new(StepKind::Measurement, 1, Some(2));
        let fields = step.measurement.as_mut().unwrap();
        fields.excitation = "Al K α₁ (1486.6 eV)".into();
        fields.spot = "Al 250um 100W".into();
        fields.power = 100.0;
        fields.voltage = 15.0;
        fields.core_levels = vec!["Ti 2p".into(), "O 1s".into()];
        fields.gases.set("N2", 2e-5);
        fields.position = "Position 1".into();
        step.conditions.push(Condition::Gases(GasComposition::new()));
        step.conditions.push(Condition::XraySource(Electrical {
            voltage: 15.0,
            current: 10.0,
        }));

        let body = render_step(&step);
        assert_eq!(read_steps(&body, StepFamily::Measurement), vec![step]);
        assert!(read_steps(&body, StepFamily::Treatment).is_empty());
    }

    #[test]
    fn reference_measurement_keeps_cps_and_peak() {
        let mut step = Step::new(StepKind::Reference, 3, None);
        let fields = step.measurement.as_mut().unwrap();
        fields.max_cps = 120000.0;
        fields.reference_peak = "Au 4f at 84 eV".into();
        let back = read_steps(&render_step(&step), StepFamily::Measurement);
        assert_eq!(back, vec![step]);
    }

    #[test]
    fn skeleton_reads_back_as_empty_step() {
        let html = skeleton_html(StepKind::Sputter, 4, Some(3));
        let steps = read_steps(&html, StepFamily::Treatment);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].title, "Sputtering #4");
        assert_eq!(steps[0].num, 4);
        assert_eq!(steps[0].sample_ref, Some(3));
        assert!(steps[0].conditions.is_empty());

        let steps = read_steps(&skeleton_html(StepKind::Measurement, 1, None), StepFamily::Measurement);
        assert_eq!(steps[0].measurement, Some(MeasurementFields::default()));
    }

    #[test]
    fn unnumbered_fragments_are_skipped() {
        let body = r#"<div class="anneal"><div class="title">Annealing</div></div>
<div class="sputter"><div class="title">Sputtering #x</div></div>
<div class="sputter"></div>"#;
        assert!(read_steps(body, StepFamily::Treatment).is_empty());
    }

    #[test]
    fn unknown_conditions_survive() {
        let body = r#"<div class="sputter"><b><div class="title">Sputtering #1</div>:</b><ul><li><b>Bias</b>: <div class="bias" style="display:inline;">-5 V</div></li></ul></div>"#;
        let steps = read_steps(body, StepFamily::Treatment);
        assert_eq!(steps[0].conditions.len(), 1);
        let rendered = render_step(&steps[0]);
        assert!(rendered.contains(r#"<li><b>Bias</b>: <div class="bias" style="display:inline;">-5 V</div></li>"#));
    }

    #[test]
    fn select_missing_title_yields_default() {
        let steps = vec![anneal()];
        assert_eq!(select_step(&steps, "Annealing #2"), steps[0]);
        let missing = select_step(&steps, "Annealing #9");
        assert_eq!(missing, Step::default());
        assert!(missing.is_empty());
    }

    #[test]
    fn smallest_available_fills_gaps() {
        assert_eq!(smallest_available([]), 1);
        assert_eq!(smallest_available([1, 2, 4]), 3);
        assert_eq!(smallest_available([2, 3]), 1);
    }

    #[test]
    fn numbering_is_per_family() {
        let body = format!(
            "{}{}{}",
            skeleton_html(StepKind::Sputter, 1, None),
            skeleton_html(StepKind::Anneal, 2, None),
            skeleton_html(StepKind::Measurement, 1, None),
        );
        assert_eq!(next_number(&body, StepFamily::Treatment), 3);
        assert_eq!(next_number(&body, StepFamily::Measurement), 2);
    }

    #[test]
    fn remove_drops_table_row_only() {
        let row = |html: &str| format!("<tr style=\"border-width:0px;\"><td>t</td><td> {html}</td></tr>");
        let body = format!(
            "<p>head</p><table>{}\n{}</table><p>tail</p>",
            row(&skeleton_html(StepKind::Anneal, 1, None)),
            row(&skeleton_html(StepKind::Anneal, 2, None)),
        );
        let out = remove_step(&body, StepKind::Anneal, "Annealing #1").unwrap();
        assert_eq!(
            out,
            format!("<p>head</p><table>\n{}</table><p>tail</p>", row(&skeleton_html(StepKind::Anneal, 2, None)))
        );
        assert!(remove_step(&out, StepKind::Sputter, "Annealing #2").is_none());
    }

    #[test]
    fn remove_without_row_drops_fragment() {
        let body = format!("<p>a</p>{}<p>b</p>", skeleton_html(StepKind::Sputter, 1, None));
        assert_eq!(
            remove_step(&body, StepKind::Sputter, "Sputtering #1").unwrap(),
            "<p>a</p><p>b</p>"
        );
    }

    #[test]
    fn replace_keeps_surroundings() {
        let body = format!("<p>a</p>{}<p>b</p>", skeleton_html(StepKind::Anneal, 2, Some(1)));
        let step = anneal();
        let out = replace_step(&body, &step).unwrap();
        assert_eq!(out, format!("<p>a</p>{}<p>b</p>", render_step(&step)));
        assert!(replace_step("<p>none</p>", &step).is_none());
    }

    #[test]
    fn sample_reference_parsing() {
        assert_eq!(parse_sample_ref("( Sample 2 )"), Some(2));
        assert_eq!(parse_sample_ref("Sample 11"), Some(11));
        assert_eq!(parse_sample_ref("Sample -1"), None);
        assert_eq!(parse_sample_ref("nothing"), None);
    }
}
