//! Typed process conditions and their text encodings.
//!
//! A condition lives in a step fragment as `<div class="{class}">{text}</div>`. Each variant
//! knows its class name, its list label, and how to read and write its text. Reading never
//! fails: malformed text degrades to zero values.

use std::fmt;

use indexmap::IndexMap;

use crate::units::{self, TimeBreakdown, format_float, format_pressure, leading_float};

/// Partial pressures per gas, in mbar, in insertion order.
///
/// An empty composition means ultra-high vacuum and is written as `UHV`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GasComposition(pub IndexMap<String, f64>);

impl GasComposition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) the partial pressure of `gas`. Non-positive pressures are ignored.
    pub fn set(&mut self, gas: impl Into<String>, pressure: f64) {
        if pressure > 0.0 {
            self.0.insert(gas.into(), pressure);
        }
    }

    pub fn remove(&mut self, gas: &str) -> Option<f64> {
        self.0.shift_remove(gas)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse `"N2 (2.0e-5 mbar), O2 (1.0e-6 mbar)"`. Terms without a readable pressure are
    /// skipped.
    pub fn parse(text: &str) -> Self {
        let mut out = IndexMap::new();
        let text = text.trim();
        if text.eq_ignore_ascii_case("uhv") {
            return Self(out);
        }
        for term in text.split(',') {
            let Some((gas, rest)) = term.split_once('(') else {
                continue;
            };
            let gas = gas.trim();
            if gas.is_empty() {
                continue;
            }
            let pressure = rest.trim().trim_end_matches(')');
            if let Some(p) = pressure
                .split_whitespace()
                .next()
                .and_then(|t| t.parse::<f64>().ok())
            {
                out.insert(gas.to_string(), p);
            }
        }
        Self(out)
    }
}

impl fmt::Display for GasComposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("UHV");
        }
        let terms: Vec<String> = self
            .0
            .iter()
            .map(|(gas, p)| format!("{gas} ({} mbar)", format_pressure(*p)))
            .collect();
        f.write_str(&terms.join(", "))
    }
}

/// What a heating ramp controls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RampKind {
    #[default]
    Power,
    Temperature,
}

impl RampKind {
    pub fn unit(self) -> &'static str {
        match self {
            RampKind::Power => "W",
            RampKind::Temperature => "K",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RampKind::Power => "Ramp Power",
            RampKind::Temperature => "Ramp Temperature",
        }
    }

    /// Accepts `pow…` / `temp…` prefixes, case-insensitively. Anything else is power.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        if name.starts_with("temp") || name == "k" {
            RampKind::Temperature
        } else {
            RampKind::Power
        }
    }
}

/// A linear ramp from `start` to `stop` in increments of `step`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ramp {
    pub kind: RampKind,
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

const RAMP_ARROWS: [&str; 4] = ["&#8614;", "↦", "➔", "->"];

impl Ramp {
    /// Parse `"0.2 W → 20.0 W; @ 0.002 W/step"`.
    ///
    /// Also accepts the `↦`, `➔`, `&#8614;` and `->` arrows and `W/s` / `K/s` rates. A start
    /// value without a `W` or `K` unit is read as power.
    pub fn parse(text: &str) -> Self {
        Self::parse_as(text, RampKind::Power)
    }

    /// Like [`Ramp::parse`], but a start value without a unit keeps `fallback` as its kind.
    pub fn parse_as(text: &str, fallback: RampKind) -> Self {
        let mut normalized = text.trim().to_string();
        for arrow in RAMP_ARROWS {
            normalized = normalized.replace(arrow, "→");
        }
        let (left, right) = normalized.split_once('→').unwrap_or((normalized.as_str(), ""));
        let left = left.trim();

        let kind = if left.ends_with('K') {
            RampKind::Temperature
        } else if left.ends_with('W') {
            RampKind::Power
        } else {
            fallback
        };
        let step = right
            .split_once('@')
            .map(|(_, rate)| leading_float(rate.trim()))
            .unwrap_or(0.0);

        Self {
            kind,
            start: leading_float(left),
            stop: leading_float(right.trim()),
            step,
        }
    }
}

impl fmt::Display for Ramp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = self.kind.unit();
        write!(
            f,
            "{} {unit} → {} {unit}; @ {} {unit}/step",
            format_float(self.start),
            format_float(self.stop),
            format_float(self.step),
        )
    }
}

/// A voltage/current pair, used for ion guns and x-ray sources: `"4.0 V (20.0 mA)"`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Electrical {
    pub voltage: f64,
    pub current: f64,
}

impl Electrical {
    pub fn parse(text: &str) -> Self {
        match text.split_once('(') {
            Some((v, i)) => Self {
                voltage: leading_float(v.trim()),
                current: leading_float(i.trim()),
            },
            None => Self {
                voltage: leading_float(text.trim()),
                current: 0.0,
            },
        }
    }
}

impl fmt::Display for Electrical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} V ({} mA)",
            format_float(self.voltage),
            format_float(self.current)
        )
    }
}

/// One entry in a step's condition list.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `temp0`, in K.
    InitialTemp(f64),
    /// `temp`, in K.
    Temp(f64),
    /// `temp_p`, in K.
    PlateTemp(f64),
    Gases(GasComposition),
    Ramp(Ramp),
    /// `xenergy`
    IonEnergy(Electrical),
    /// `xsource`
    XraySource(Electrical),
    /// `dura`
    Duration(TimeBreakdown),
    Comment(String),
    /// A condition class elablog does not model; carried through unchanged.
    Other {
        class: String,
        label: String,
        text: String,
    },
}

/// Condition classes that may appear on treatment steps, in menu order.
pub const TREATMENT_CONDITIONS: &[&str] =
    &["temp0", "temp", "gases", "ramp", "xenergy", "dura", "comment"];

/// Optional condition classes on measurement steps, in menu order.
pub const MEASUREMENT_CONDITIONS: &[&str] =
    &["gases", "dura", "temp", "temp_p", "ramp", "comment", "xsource"];

impl Condition {
    /// The fresh value a newly added condition of `class` starts with.
    pub fn default_for(class: &str) -> Option<Self> {
        let cond = match class {
            "temp0" => Condition::InitialTemp(0.0),
            "temp" => Condition::Temp(0.0),
            "temp_p" => Condition::PlateTemp(0.0),
            "gases" => Condition::Gases(GasComposition::new()),
            "ramp" => Condition::Ramp(Ramp::default()),
            "xenergy" => Condition::IonEnergy(Electrical {
                voltage: 0.0,
                current: 20.0,
            }),
            "xsource" => Condition::XraySource(Electrical::default()),
            "dura" => Condition::Duration(TimeBreakdown::default()),
            "comment" => Condition::Comment(String::new()),
            _ => return None,
        };
        Some(cond)
    }

    /// Decode the text of a `<div class="{class}">`. `label` is only kept for unknown classes.
    pub fn from_text(class: &str, label: &str, text: &str) -> Self {
        match class {
            "temp0" => Condition::InitialTemp(leading_float(text)),
            "temp" => Condition::Temp(leading_float(text)),
            "temp_p" => Condition::PlateTemp(leading_float(text)),
            "gases" => Condition::Gases(GasComposition::parse(text)),
            "ramp" => Condition::Ramp(Ramp::parse(text)),
            "xenergy" => Condition::IonEnergy(Electrical::parse(text)),
            "xsource" => Condition::XraySource(Electrical::parse(text)),
            "dura" => Condition::Duration(units::parse_duration(text)),
            "comment" => Condition::Comment(text.to_string()),
            _ => Condition::Other {
                class: class.to_string(),
                label: label.to_string(),
                text: text.to_string(),
            },
        }
    }

    pub fn class(&self) -> &str {
        match self {
            Condition::InitialTemp(_) => "temp0",
            Condition::Temp(_) => "temp",
            Condition::PlateTemp(_) => "temp_p",
            Condition::Gases(_) => "gases",
            Condition::Ramp(_) => "ramp",
            Condition::IonEnergy(_) => "xenergy",
            Condition::XraySource(_) => "xsource",
            Condition::Duration(_) => "dura",
            Condition::Comment(_) => "comment",
            Condition::Other { class, .. } => class,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Condition::InitialTemp(_) => "Initial Temp.",
            Condition::Temp(_) => "Const. Temp.",
            Condition::PlateTemp(_) => "Plate Temp.",
            Condition::Gases(_) => "Set Gases",
            Condition::Ramp(r) => r.kind.label(),
            Condition::IonEnergy(_) => "Ion Energy",
            Condition::XraySource(_) => "X-Ray Source",
            Condition::Duration(_) => "Duration",
            Condition::Comment(_) => "Comment",
            Condition::Other { label, class, .. } => {
                if label.is_empty() {
                    class
                } else {
                    label
                }
            }
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Condition::InitialTemp(t) | Condition::Temp(t) | Condition::PlateTemp(t) => {
                format!("{} K", format_float(*t))
            }
            Condition::Gases(g) => g.to_string(),
            Condition::Ramp(r) => r.to_string(),
            Condition::IonEnergy(e) | Condition::XraySource(e) => e.to_string(),
            Condition::Duration(d) => d.to_string(),
            Condition::Comment(c) => c.clone(),
            Condition::Other { text, .. } => text.clone(),
        }
    }

    /// Replace this condition's value from user-typed text, keeping its class.
    pub fn with_text(&self, text: &str) -> Self {
        match self {
            Condition::Ramp(r) => Condition::Ramp(Ramp::parse_as(text, r.kind)),
            _ => Condition::from_text(self.class(), self.label(), text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_composition_formats_and_parses() {
        let mut g = GasComposition::new();
        g.set("N2", 2e-5);
        g.set("O2", 1e-6);
        g.set("Ar", 0.0);
        assert_eq!(g.to_string(), "N2 (2.0e-5 mbar), O2 (1.0e-6 mbar)");
        assert_eq!(GasComposition::parse(&g.to_string()), g);
    }

    #[test]
    fn empty_gas_composition_is_uhv() {
        assert_eq!(GasComposition::new().to_string(), "UHV");
        assert!(GasComposition::parse("UHV").is_empty());
        assert!(GasComposition::parse("").is_empty());
    }

    #[test]
    fn gas_parse_skips_broken_terms() {
        let g = GasComposition::parse("N2 (abc mbar), CO, H2 (3e-7 mbar)");
        assert_eq!(g.0.len(), 1);
        assert_eq!(g.0.get("H2"), Some(&3e-7));
    }

    #[test]
    fn ramp_accepts_legacy_arrows_and_rates() {
        let r = Ramp::parse("0.2 W &#8614; 20 W; @ 0.002 W/s");
        assert_eq!(
            r,
            Ramp {
                kind: RampKind::Power,
                start: 0.2,
                stop: 20.0,
                step: 0.002
            }
        );

        let r = Ramp::parse("700.0 K ↦ 1000.0 K; @ 1.0 K/s");
        assert_eq!(r.kind, RampKind::Temperature);
        assert_eq!((r.start, r.stop, r.step), (700.0, 1000.0, 1.0));

        let r = Ramp::parse("1 W -> 2 W; @ 0.5 W/step");
        assert_eq!((r.start, r.stop, r.step), (1.0, 2.0, 0.5));
    }

    #[test]
    fn ramp_formats_with_arrow() {
        let r = Ramp {
            kind: RampKind::Temperature,
            start: 700.0,
            stop: 1000.0,
            step: 1.0,
        };
        assert_eq!(r.to_string(), "700.0 K → 1000.0 K; @ 1.0 K/step");
        assert_eq!(Ramp::parse(&r.to_string()), r);
    }

    #[test]
    fn unitless_ramp_keeps_its_kind_when_edited() {
        let temp = Condition::Ramp(Ramp {
            kind: RampKind::Temperature,
            ..Ramp::default()
        });
        let Condition::Ramp(edited) = temp.with_text("700 -> 900; @ 2") else {
            panic!("ramp changed class");
        };
        assert_eq!(edited.kind, RampKind::Temperature);
        assert_eq!((edited.start, edited.stop, edited.step), (700.0, 900.0, 2.0));

        let Condition::Ramp(power) = temp.with_text("1 W -> 2 W") else {
            panic!("ramp changed class");
        };
        assert_eq!(power.kind, RampKind::Power);
        assert_eq!(Ramp::parse("700 -> 900").kind, RampKind::Power);
    }

    #[test]
    fn malformed_ramp_degrades_to_zero() {
        assert_eq!(Ramp::parse("garbage"), Ramp::default());
    }

    #[test]
    fn electrical_pair() {
        let e = Electrical::parse("4 V (20 mA)");
        assert_eq!(
            e,
            Electrical {
                voltage: 4.0,
                current: 20.0
            }
        );
        assert_eq!(e.to_string(), "4.0 V (20.0 mA)");
        assert_eq!(Electrical::parse("x").voltage, 0.0);
    }

    #[test]
    fn condition_text_round_trip() {
        for class in TREATMENT_CONDITIONS.iter().chain(MEASUREMENT_CONDITIONS) {
            let cond = Condition::default_for(class).unwrap();
            let back = Condition::from_text(class, cond.label(), &cond.to_text());
            assert_eq!(back, cond, "class {class}");
        }
    }

    #[test]
    fn unknown_class_is_kept_verbatim() {
        let cond = Condition::from_text("bias", "Sample Bias", "-5 V");
        assert_eq!(cond.class(), "bias");
        assert_eq!(cond.label(), "Sample Bias");
        assert_eq!(cond.to_text(), "-5 V");
        assert!(Condition::default_for("bias").is_none());
    }

    #[test]
    fn temperature_reads_leading_number() {
        assert_eq!(
            Condition::from_text("temp", "", "298 K"),
            Condition::Temp(298.0)
        );
        assert_eq!(Condition::from_text("temp0", "", "hot"), Condition::InitialTemp(0.0));
        assert_eq!(Condition::Temp(298.0).to_text(), "298.0 K");
    }
}
