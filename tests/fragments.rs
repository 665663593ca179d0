use proptest::prelude::*;

use elablog::catalog::GASES;
use elablog::conditions::{Condition, GasComposition, Ramp, RampKind};
use elablog::positions::{Position, read_positions, write_positions};
use elablog::steps::{Step, StepFamily, StepKind, read_steps, render_step};
use elablog::units::{TimeBreakdown, parse_duration};

/// Pressures that survive the one-decimal scientific notation of gas lines.
fn pressure() -> impl Strategy<Value = f64> {
    (1u8..=9, 0u8..=9, 1u8..=11).prop_map(|(lead, frac, exp)| {
        format!("{lead}.{frac}e-{exp}")
            .parse()
            .unwrap_or(1e-6)
    })
}

fn gases() -> impl Strategy<Value = GasComposition> {
    proptest::sample::subsequence(GASES.to_vec(), 0..=GASES.len())
        .prop_flat_map(|names| {
            let n = names.len();
            (Just(names), proptest::collection::vec(pressure(), n))
        })
        .prop_map(|(names, pressures)| {
            let mut g = GasComposition::new();
            for (name, p) in names.into_iter().zip(pressures) {
                g.set(name, p);
            }
            g
        })
}

fn ramp() -> impl Strategy<Value = Ramp> {
    (
        prop_oneof![Just(RampKind::Power), Just(RampKind::Temperature)],
        0.0f64..2000.0,
        0.0f64..2000.0,
        0.0f64..10.0,
    )
        .prop_map(|(kind, start, stop, step)| Ramp {
            kind,
            start,
            stop,
            step,
        })
}

fn coordinate() -> impl Strategy<Value = f64> {
    -100.0f64..100.0
}

fn note() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 ,.&<>]{0,30}[A-Za-z0-9]"
}

proptest! {
    #[test]
    fn gas_lines_round_trip(g in gases()) {
        prop_assert_eq!(GasComposition::parse(&g.to_string()), g);
    }

    #[test]
    fn ramps_round_trip(r in ramp()) {
        prop_assert_eq!(Ramp::parse(&r.to_string()), r);
    }

    #[test]
    fn durations_round_trip(micros in 0u64..(30 * 24 * 3600 * 1_000_000)) {
        let t = TimeBreakdown::from_micros(micros);
        prop_assert_eq!(parse_duration(&t.to_string()), t);
    }

    #[test]
    fn temperatures_round_trip_through_text(t in 0.0f64..3000.0) {
        for cond in [Condition::InitialTemp(t), Condition::Temp(t), Condition::PlateTemp(t)] {
            let back = Condition::from_text(cond.class(), cond.label(), &cond.to_text());
            prop_assert_eq!(back, cond);
        }
    }

    #[test]
    fn positions_round_trip(
        coords in proptest::collection::vec(
            (coordinate(), coordinate(), coordinate(), proptest::option::of(1.0f64..360.0)),
            0..6,
        )
    ) {
        let positions: Vec<Position> = coords
            .iter()
            .enumerate()
            .map(|(i, &(x, y, z, angle))| Position {
                name: format!("Position {}", i + 1),
                x,
                y,
                z,
                angle,
            })
            .collect();
        let body = write_positions("<p>Sample transfer at 10:00</p>", &positions);
        prop_assert_eq!(read_positions(&body), positions);
    }

    #[test]
    fn treatment_steps_round_trip(
        num in 1u32..50,
        sample_ref in proptest::option::of(1usize..5),
        temp in 200.0f64..1500.0,
        g in gases(),
        r in ramp(),
        text in note(),
    ) {
        let mut step = Step::new(StepKind::Anneal, num, sample_ref);
        step.conditions = vec![
            Condition::Temp(temp),
            Condition::Gases(g),
            Condition::Ramp(r),
            Condition::Comment(text.clone()),
        ];
        step.note = text;
        let body = format!("<p>before</p>{}<p>after</p>", render_step(&step));
        prop_assert_eq!(read_steps(&body, StepFamily::Treatment), vec![step]);
    }
}

#[test]
fn measurement_gases_are_not_conditions() {
    let mut step = Step::new(StepKind::Measurement, 1, None);
    if let Some(fields) = step.measurement.as_mut() {
        fields.gases.set("O2", 1e-6);
    }
    step.conditions.push(Condition::Gases(GasComposition::new()));

    let back = read_steps(&render_step(&step), StepFamily::Measurement);
    assert_eq!(back.len(), 1);
    assert_eq!(back[0].measurement.as_ref().map(|m| m.gases.to_string()), Some("O2 (1.0e-6 mbar)".to_string()));
    assert_eq!(back[0].conditions, vec![Condition::Gases(GasComposition::new())]);
}

#[test]
fn repeated_condition_classes_survive_a_round_trip() {
    let mut step = Step::new(StepKind::Anneal, 3, Some(1));
    step.conditions = vec![
        Condition::Ramp(Ramp {
            kind: RampKind::Power,
            start: 0.2,
            stop: 20.0,
            step: 0.1,
        }),
        Condition::Temp(600.0),
        Condition::Ramp(Ramp {
            kind: RampKind::Temperature,
            start: 600.0,
            stop: 900.0,
            step: 1.0,
        }),
    ];
    let back = read_steps(&render_step(&step), StepFamily::Treatment);
    assert_eq!(back, vec![step]);
}
