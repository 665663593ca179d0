//! Number and duration conventions shared by the form renderers.
//!
//! Every parser here is lenient: malformed input yields zero rather than an error, because the
//! text comes from hand-edited notebook bodies.

use std::fmt;

pub const DAY_MICROS: u64 = 24 * 60 * 60 * 1_000_000;
pub const HOUR_MICROS: u64 = 60 * 60 * 1_000_000;
pub const MIN_MICROS: u64 = 60 * 1_000_000;
pub const SEC_MICROS: u64 = 1_000_000;
pub const MILLI_MICROS: u64 = 1_000;

/// A duration split into calendar-ish components, largest unit first.
///
/// The breakdown is always normalized: `"90 min"` becomes one hour and thirty minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeBreakdown {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub millis: u64,
    pub micros: u64,
}

impl TimeBreakdown {
    pub fn from_micros(total: u64) -> Self {
        let mut rest = total;
        let mut take = |unit: u64| {
            let n = rest / unit;
            rest -= n * unit;
            n
        };
        let days = take(DAY_MICROS);
        let hours = take(HOUR_MICROS);
        let minutes = take(MIN_MICROS);
        let seconds = take(SEC_MICROS);
        let millis = take(MILLI_MICROS);
        Self {
            days,
            hours,
            minutes,
            seconds,
            millis,
            micros: rest,
        }
    }

    /// Saturates at `u64::MAX`.
    pub fn total_micros(&self) -> u64 {
        [
            (self.days, DAY_MICROS),
            (self.hours, HOUR_MICROS),
            (self.minutes, MIN_MICROS),
            (self.seconds, SEC_MICROS),
            (self.millis, MILLI_MICROS),
            (self.micros, 1),
        ]
        .iter()
        .fold(0u64, |acc, &(n, unit)| acc.saturating_add(n.saturating_mul(unit)))
    }

    /// Whole seconds, truncating sub-second components.
    pub fn total_seconds(&self) -> u64 {
        self.total_micros() / SEC_MICROS
    }

    pub fn is_zero(&self) -> bool {
        self.total_micros() == 0
    }
}

impl fmt::Display for TimeBreakdown {
    /// Formats as `"1 h, 30 min, 5 s"`, skipping zero components; zero is `"0 µs"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            (self.days, "d"),
            (self.hours, "h"),
            (self.minutes, "min"),
            (self.seconds, "s"),
            (self.millis, "ms"),
            (self.micros, "µs"),
        ];
        let rendered: Vec<String> = parts
            .iter()
            .filter(|(n, _)| *n > 0)
            .map(|(n, unit)| format!("{n} {unit}"))
            .collect();
        if rendered.is_empty() {
            return f.write_str("0 µs");
        }
        f.write_str(&rendered.join(", "))
    }
}

fn unit_micros(unit: &str) -> Option<u64> {
    match unit {
        "d" => Some(DAY_MICROS),
        "h" => Some(HOUR_MICROS),
        "min" => Some(MIN_MICROS),
        "s" => Some(SEC_MICROS),
        "ms" => Some(MILLI_MICROS),
        "us" | "µs" | "μs" => Some(1),
        _ => None,
    }
}

fn is_unit_char(c: char) -> bool {
    c.is_ascii_lowercase() || c == 'µ' || c == 'μ'
}

/// Parse free-form duration text such as `"1 h, 30 min, 5 s"` or `"2.5min"`.
///
/// A number is attributed to the unit that follows it. Numbers without a unit and unknown
/// units are ignored; the result is normalized.
pub fn parse_duration(text: &str) -> TimeBreakdown {
    let mut total: u64 = 0;
    let mut number = String::new();
    let mut unit = String::new();
    let mut pending: Option<f64> = None;

    let flush_unit = |pending: &mut Option<f64>, unit: &mut String, total: &mut u64| {
        if let (Some(value), Some(scale)) = (pending.take(), unit_micros(unit)) {
            // `as` saturates, so a huge component clamps instead of wrapping.
            *total = total.saturating_add((value * scale as f64).floor().max(0.0) as u64);
        }
        unit.clear();
    };

    for c in text.chars() {
        if c.is_ascii_digit() || (c == '.' && !number.contains('.')) {
            if !unit.is_empty() {
                flush_unit(&mut pending, &mut unit, &mut total);
            }
            number.push(c);
            continue;
        }

        if !number.is_empty() {
            pending = Some(number.parse::<f64>().unwrap_or(0.0));
            number.clear();
        }

        if is_unit_char(c) {
            unit.push(c);
        } else if !unit.is_empty() {
            flush_unit(&mut pending, &mut unit, &mut total);
        }
    }

    if !unit.is_empty() {
        flush_unit(&mut pending, &mut unit, &mut total);
    }

    TimeBreakdown::from_micros(total)
}

/// Normalize duration text the way the duration input does: parse, then re-format.
pub fn normalize_duration(text: &str) -> String {
    parse_duration(text).to_string()
}

/// The leading number of a value like `"298 K"`; zero when absent or malformed.
pub fn leading_float(text: &str) -> f64 {
    text.split_whitespace()
        .next()
        .and_then(|token| token.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parse a user-typed float, keeping `default` when the text is not a number.
pub fn parse_float_or(text: &str, default: f64) -> f64 {
    text.trim().parse::<f64>().unwrap_or(default)
}

/// Format a float so it always reads as a float (`20.0`, `0.2`, `1e-5`).
///
/// The output parses back to the identical `f64`.
pub fn format_float(value: f64) -> String {
    format!("{value:?}")
}

/// Format a pressure in the compact scientific style used in gas lines (`2.0e-5`).
pub fn format_pressure(value: f64) -> String {
    format!("{value:.1e}")
}
