//! Form templates that turn a few typed values into journal text.
//!
//! Four templates are built in. More can be dropped into the templates directory as YAML:
//!
//! ```yaml
//! name: Raman
//! fields:
//!   - label: Laser
//!     type: select
//!     options: [532 nm, 785 nm]
//!   - label: Power
//!     type: number
//!     units: [mW, W]
//! output: "Raman with {Laser} at {Power}"
//! ```
//!
//! Values are given by field label. A field with units takes its unit from `"<label> unit"`,
//! falling back to the first unit listed.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog;
use crate::units::format_float;
use crate::{Error, Result};

/// Field values keyed by label.
pub type FormValues = IndexMap<String, String>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Rendered with three decimals.
    Number,
    /// Rendered in scientific notation, or verbatim if it does not parse.
    SciNumber,
    Select,
    Textarea,
    #[default]
    #[serde(other)]
    Text,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub label: String,

    #[serde(rename = "type", default)]
    pub kind: FieldType,

    #[serde(default)]
    pub units: Vec<String>,

    #[serde(default)]
    pub options: Vec<String>,

    #[serde(default)]
    pub placeholder: String,

    #[serde(default)]
    pub default: Option<String>,
}

impl Field {
    fn new(label: &str, kind: FieldType) -> Self {
        Self {
            label: label.to_string(),
            kind,
            ..Default::default()
        }
    }

    fn units(mut self, units: &[&str]) -> Self {
        self.units = units.iter().map(|u| u.to_string()).collect();
        self
    }

    fn options(mut self, options: impl IntoIterator<Item = &'static str>) -> Self {
        self.options = options.into_iter().map(str::to_string).collect();
        self
    }

    fn default_value(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }

    fn placeholder(mut self, text: &str) -> Self {
        self.placeholder = text.to_string();
        self
    }
}

/// A template read from a YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YamlTemplate {
    pub name: String,
    pub fields: Vec<Field>,
    /// Text with `{Label}` placeholders.
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Template1,
    Template2,
    XpsMeasurement,
    XpsReference,
}

impl Builtin {
    pub const ALL: [Builtin; 4] = [
        Builtin::Template1,
        Builtin::Template2,
        Builtin::XpsMeasurement,
        Builtin::XpsReference,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Template1 => "Template 1",
            Builtin::Template2 => "Template 2",
            Builtin::XpsMeasurement => "XPS Measurement",
            Builtin::XpsReference => "XPS Reference Measurement",
        }
    }

    fn fields(self) -> Vec<Field> {
        let conditions = || {
            vec![
                Field::new("Temperature", FieldType::Number).units(&["K", "°C"]),
                Field::new("Pressure", FieldType::Number).units(&["bar", "torr", "PSI"]),
            ]
        };
        let xps_head = || {
            vec![
                Field::new("Excitation Energy", FieldType::Select)
                    .options(catalog::excitation_names()),
                Field::new("Spot", FieldType::Select)
                    .placeholder("a spot setting of the chosen excitation"),
                Field::new("Power [W]", FieldType::Number).default_value("50"),
                Field::new("Voltage [kV]", FieldType::Number).default_value("15"),
            ]
        };
        let xps_tail = || {
            vec![
                Field::new("Gas 1", FieldType::Text).placeholder("e.g., N2"),
                Field::new("Pressure 1 [mbar]", FieldType::Number).default_value("0"),
                Field::new("Gas 2", FieldType::Text).placeholder("e.g., O2"),
                Field::new("Pressure 2 [mbar]", FieldType::Number).default_value("0"),
                Field::new("Comment", FieldType::Textarea).placeholder("Additional notes..."),
            ]
        };

        match self {
            Builtin::Template1 => {
                let mut f = conditions();
                f.push(Field::new("Comment", FieldType::Text));
                f
            }
            Builtin::Template2 => {
                let mut f = conditions();
                f.push(
                    Field::new("Excitation wavelength", FieldType::Number)
                        .units(&["nm", "cm⁻¹", "eV"]),
                );
                f.push(Field::new("Comment", FieldType::Text));
                f
            }
            Builtin::XpsMeasurement => {
                let mut f = xps_head();
                f.push(
                    Field::new("Core Levels", FieldType::Text).placeholder("e.g., C 1s, O 1s, Ti 2p"),
                );
                f.extend(xps_tail());
                f
            }
            Builtin::XpsReference => {
                let mut f = xps_head();
                f.push(Field::new("Max. CPS", FieldType::Number).default_value("100000"));
                f.push(
                    Field::new("Reference Peak", FieldType::Text)
                        .placeholder("e.g., O 1s at 530 eV"),
                );
                f.extend(xps_tail());
                f
            }
        }
    }

    fn render(self, form: &Form<'_>) -> Result<String> {
        match self {
            Builtin::Template1 | Builtin::Template2 => {
                let t = form.number("Temperature", 0.0)?;
                let t_unit = form.unit("Temperature", &["K", "°C"])?;
                let p = form.number("Pressure", 0.0)?;
                let p_unit = form.unit("Pressure", &["bar", "torr", "PSI"])?;
                let comment = form.text("Comment");
                let head = format!("Measured at T = {t:.3} {t_unit} and p = {p:.3} {p_unit}\n \n ");
                if self == Builtin::Template1 {
                    return Ok(format!("{head}{comment}"));
                }
                let e = form.number("Excitation wavelength", 0.0)?;
                let e_unit = form.unit("Excitation wavelength", &["nm", "cm⁻¹", "eV"])?;
                Ok(format!(
                    "{head}Excited at {} {e_unit} \n \n {comment}",
                    format_float(e)
                ))
            }
            Builtin::XpsMeasurement | Builtin::XpsReference => {
                let excitation = match form.get("Excitation Energy") {
                    Some(input) => catalog::resolve_excitation(input).ok_or_else(|| {
                        Error::msg(format!("unknown excitation energy '{input}'"))
                    })?,
                    None => catalog::EXCITATIONS[0].0,
                };
                let spot = form.select("Spot", catalog::spot_settings(excitation))?;
                let power = form.number("Power [W]", 50.0)?;
                let voltage = form.number("Voltage [kV]", 15.0)?;

                let reference = self == Builtin::XpsReference;
                let mut parts = vec![
                    if reference {
                        "**XPS Reference Measurement**".to_string()
                    } else {
                        "**XPS Measurement**".to_string()
                    },
                    format!("Excitation: {excitation}"),
                    format!("Spot Setting: {spot}"),
                    format!(
                        "Power: {} W, Voltage: {} kV",
                        format_float(power),
                        format_float(voltage)
                    ),
                ];
                if reference {
                    parts.push(format!("Max. CPS: {:.0}", form.number("Max. CPS", 100000.0)?));
                    let peak = form.text("Reference Peak");
                    if !peak.trim().is_empty() {
                        parts.push(format!("Reference Peak: {peak}"));
                    }
                } else {
                    let levels = form.text("Core Levels");
                    if !levels.trim().is_empty() {
                        parts.push(format!("Core Levels: {levels}"));
                    }
                }

                let mut gases = Vec::new();
                for n in 1..=2 {
                    let gas = form.text(&format!("Gas {n}"));
                    let pressure = form.number(&format!("Pressure {n} [mbar]"), 0.0)?;
                    if !gas.trim().is_empty() && pressure > 0.0 {
                        gases.push(format!("{gas} ({pressure:.2e} mbar)"));
                    }
                }
                if !gases.is_empty() {
                    parts.push(format!("Gases: {}", gases.join(", ")));
                }
                let comment = form.text("Comment");
                if !comment.trim().is_empty() {
                    parts.push(format!("Comment: {comment}"));
                }
                Ok(parts.join("\n"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    Builtin(Builtin),
    Yaml(YamlTemplate),
}

impl Template {
    pub fn name(&self) -> &str {
        match self {
            Template::Builtin(b) => b.name(),
            Template::Yaml(t) => &t.name,
        }
    }

    pub fn fields(&self) -> Vec<Field> {
        match self {
            Template::Builtin(b) => b.fields(),
            Template::Yaml(t) => t.fields.clone(),
        }
    }

    /// Produce the journal text for `values`.
    pub fn render(&self, values: &FormValues) -> Result<String> {
        let form = Form { values };
        match self {
            Template::Builtin(b) => b.render(&form),
            Template::Yaml(t) => render_yaml(t, &form),
        }
    }
}

fn render_yaml(template: &YamlTemplate, form: &Form<'_>) -> Result<String> {
    let mut out = template.output.clone();
    for field in &template.fields {
        let value = match field.kind {
            FieldType::Number => {
                let default = field
                    .default
                    .as_deref()
                    .and_then(|d| d.trim().parse().ok())
                    .unwrap_or(0.0);
                let v = form.number(&field.label, default)?;
                with_unit(format!("{v:.3}"), form.unit_of(field)?)
            }
            FieldType::SciNumber => {
                let raw = form.text(&field.label);
                let raw = raw.trim();
                let formatted = if raw.is_empty() {
                    format!("{:.3e}", 0.0)
                } else {
                    match raw.parse::<f64>() {
                        Ok(v) => format!("{v:.3e}"),
                        Err(_) => raw.to_string(),
                    }
                };
                with_unit(formatted, form.unit_of(field)?)
            }
            FieldType::Select => {
                let options: Vec<&str> = field.options.iter().map(String::as_str).collect();
                form.select(&field.label, &options)?
            }
            FieldType::Textarea | FieldType::Text => form.text(&field.label),
        };
        out = out.replace(&format!("{{{}}}", field.label), &value);
    }
    Ok(out)
}

fn with_unit(value: String, unit: Option<String>) -> String {
    match unit {
        Some(u) if !u.is_empty() => format!("{value} {u}"),
        _ => value,
    }
}

/// Typed access to raw field values.
struct Form<'a> {
    values: &'a FormValues,
}

impl Form<'_> {
    fn get(&self, label: &str) -> Option<&str> {
        self.values
            .get(label)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    fn text(&self, label: &str) -> String {
        self.values.get(label).cloned().unwrap_or_default()
    }

    fn number(&self, label: &str, default: f64) -> Result<f64> {
        match self.get(label) {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| Error::msg(format!("{label}: '{v}' is not a number"))),
            None => Ok(default),
        }
    }

    fn select(&self, label: &str, options: &[&str]) -> Result<String> {
        match self.get(label) {
            Some(v) if options.is_empty() || options.contains(&v) => Ok(v.to_string()),
            Some(v) => Err(Error::msg(format!(
                "{label}: '{v}' is not one of {}",
                options.join(", ")
            ))),
            None => Ok(options.first().map(|o| o.to_string()).unwrap_or_default()),
        }
    }

    fn unit(&self, label: &str, units: &[&str]) -> Result<String> {
        self.select(&format!("{label} unit"), units)
    }

    fn unit_of(&self, field: &Field) -> Result<Option<String>> {
        if field.units.is_empty() {
            return Ok(None);
        }
        let units: Vec<&str> = field.units.iter().map(String::as_str).collect();
        self.unit(&field.label, &units).map(Some)
    }
}

/// Parse `Label=value` assignments.
pub fn parse_assignments<S: AsRef<str>>(pairs: &[S]) -> Result<FormValues> {
    pairs
        .iter()
        .map(|pair| {
            let pair = pair.as_ref();
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .ok_or_else(|| Error::msg(format!("expected Label=value, got '{pair}'")))
        })
        .collect()
}

/// YAML templates in `dir`, in file-name order. Unreadable files are skipped with a warning.
pub fn load_yaml_templates(dir: &Path) -> Result<Vec<YamlTemplate>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml")
        })
        .collect();
    paths.sort();

    let mut out: Vec<YamlTemplate> = Vec::new();
    for path in paths {
        let parsed = fs::read_to_string(&path)
            .map_err(Error::from)
            .and_then(|text| serde_yaml::from_str::<YamlTemplate>(&text).map_err(Error::from));
        match parsed {
            Ok(t) => {
                debug!(path = %path.display(), name = %t.name, "loaded template");
                out.retain(|existing| existing.name != t.name);
                out.push(t);
            }
            Err(err) => warn!(path = %path.display(), error = %err, "skipping template"),
        }
    }
    Ok(out)
}

/// Built-in templates followed by the YAML ones.
pub fn registry(dir: &Path) -> Result<Vec<Template>> {
    let mut all: Vec<Template> = Builtin::ALL.into_iter().map(Template::Builtin).collect();
    all.extend(load_yaml_templates(dir)?.into_iter().map(Template::Yaml));
    Ok(all)
}

/// Look a template up by name, ignoring case. Built-ins win over YAML of the same name.
pub fn find<'a>(templates: &'a [Template], name: &str) -> Option<&'a Template> {
    templates
        .iter()
        .find(|t| t.name().eq_ignore_ascii_case(name.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[&str]) -> FormValues {
        parse_assignments(pairs).unwrap()
    }

    #[test]
    fn template_one() -> anyhow::Result<()> {
        let out = Template::Builtin(Builtin::Template1).render(&values(&[
            "Temperature=298.15",
            "Pressure=1",
            "Pressure unit=torr",
            "Comment=baseline",
        ]))?;
        assert_eq!(out, "Measured at T = 298.150 K and p = 1.000 torr\n \n baseline");
        Ok(())
    }

    #[test]
    fn template_two() -> anyhow::Result<()> {
        let out = Template::Builtin(Builtin::Template2).render(&values(&[
            "Excitation wavelength=532",
            "Excitation wavelength unit=nm",
        ]))?;
        assert_eq!(
            out,
            "Measured at T = 0.000 K and p = 0.000 bar\n \n Excited at 532.0 nm \n \n "
        );
        Ok(())
    }

    #[test]
    fn xps_measurement() -> anyhow::Result<()> {
        let out = Template::Builtin(Builtin::XpsMeasurement).render(&values(&[
            "Excitation Energy=Ag",
            "Spot=Ag 260um 50W",
            "Core Levels=C 1s, O 1s",
            "Gas 1=O2",
            "Pressure 1 [mbar]=2e-6",
            "Gas 2=N2",
        ]))?;
        assert_eq!(
            out,
            "**XPS Measurement**\nExcitation: Ag L α₁ (2984.3 eV)\nSpot Setting: Ag 260um 50W\n\
             Power: 50.0 W, Voltage: 15.0 kV\nCore Levels: C 1s, O 1s\nGases: O2 (2.00e-6 mbar)"
        );
        Ok(())
    }

    #[test]
    fn xps_reference_defaults() -> anyhow::Result<()> {
        let out = Template::Builtin(Builtin::XpsReference).render(&FormValues::new())?;
        assert_eq!(
            out,
            "**XPS Reference Measurement**\nExcitation: Al K α₁ (1486.6 eV)\n\
             Spot Setting: Al 120um 50W\nPower: 50.0 W, Voltage: 15.0 kV\nMax. CPS: 100000"
        );
        Ok(())
    }

    #[test]
    fn bad_inputs_are_rejected() {
        let t = Template::Builtin(Builtin::Template1);
        assert!(t.render(&values(&["Temperature=hot"])).is_err());
        assert!(t.render(&values(&["Temperature unit=F"])).is_err());
        let xps = Template::Builtin(Builtin::XpsMeasurement);
        assert!(xps.render(&values(&["Excitation Energy=Al", "Spot=Ag 70um 10W"])).is_err());
        assert!(parse_assignments(&["novalue"]).is_err());
    }

    #[test]
    fn yaml_template_renders() -> anyhow::Result<()> {
        let t: YamlTemplate = serde_yaml::from_str(
            r#"
name: Deposition
fields:
  - label: Rate
    type: number
    units: [nm/min, "Å/s"]
  - label: Base pressure
    type: sci_number
    units: [mbar]
  - label: Target
    type: select
    options: [Au, Pt]
  - label: Notes
    type: textarea
  - label: Operator
    type: fancy
output: "{Target} at {Rate}, base {Base pressure}. {Notes} ({Operator})"
"#,
        )?;
        assert_eq!(t.fields[4].kind, FieldType::Text);
        let out = Template::Yaml(t.clone()).render(&values(&[
            "Rate=1.5",
            "Rate unit=Å/s",
            "Base pressure=3e-10",
            "Notes=smooth",
            "Operator=jd",
        ]))?;
        assert_eq!(out, "Au at 1.500 Å/s, base 3.000e-10 mbar. smooth (jd)");

        let raw = Template::Yaml(t).render(&values(&["Base pressure=low"]))?;
        assert!(raw.contains("base low mbar"));
        Ok(())
    }

    #[test]
    fn registry_reads_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("b.yaml"),
            "name: Second\nfields: []\noutput: two\n",
        )?;
        fs::write(dir.path().join("a.yml"), "name: First\nfields: []\noutput: one\n")?;
        fs::write(dir.path().join("broken.yaml"), "fields: [")?;
        fs::write(dir.path().join("notes.txt"), "name: Ignored\nfields: []\n")?;

        let all = registry(dir.path())?;
        let names: Vec<&str> = all.iter().map(Template::name).collect();
        assert_eq!(
            names,
            [
                "Template 1",
                "Template 2",
                "XPS Measurement",
                "XPS Reference Measurement",
                "First",
                "Second"
            ]
        );
        assert!(find(&all, "xps measurement").is_some());
        assert_eq!(registry(&dir.path().join("missing"))?.len(), 4);
        Ok(())
    }
}
