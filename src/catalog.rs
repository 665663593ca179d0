//! Instrument option lists for XPS measurement steps.

/// X-ray excitation lines offered for a measurement, with the spot settings each source
/// supports.
pub const EXCITATIONS: &[(&str, &[&str])] = &[
    (
        "Al K α₁ (1486.6 eV)",
        &["Al 120um 50W", "Al 250um 100W", "Al 330um 150W", "Al 70um 20W"],
    ),
    (
        "Ag L α₁ (2984.3 eV)",
        &[
            "Ag 130um 25W",
            "Ag 260um 50W",
            "Ag 370um 75W",
            "Ag 500um 100W",
            "Ag 70um 10W",
        ],
    ),
    (
        "Cr K α₁ (5414.8 eV)",
        &[
            "Cr 200um 10W",
            "Cr 200um 10W (Energy = 23kV)",
            "Cr 200um 25W",
            "Cr 330um 50W",
            "Cr 330um  50W (Energy = 23kV)",
            "Cr 430um 75W",
            "Cr 530um 100W",
        ],
    ),
];

/// Core-level orbitals that can be recorded per element.
pub const VALID_ORBITALS: &[(&str, &[&str])] = &[
    ("C", &["1s"]),
    ("O", &["1s"]),
    ("Ti", &["2p", "2s"]),
    ("Ag", &["3d", "3p"]),
    ("Pd", &["3d", "3p"]),
    ("Al", &["2p", "2s"]),
    ("Cr", &["2p", "2s"]),
    ("Ni", &["2p"]),
    ("Fe", &["2p"]),
    ("Cu", &["2p", "3p"]),
    ("Zn", &["2p", "3p"]),
    ("Si", &["2p", "2s"]),
    ("N", &["1s"]),
];

/// Plate materials a sample can be mounted on.
pub const PLATE_MATERIALS: &[&str] = &["Stainless Steel", "Molybdenum", "Tantalum"];

/// Gases offered by the gas composer.
pub const GASES: &[&str] = &["Ar", "CO", "H2", "He", "N2", "O2"];

pub fn excitation_names() -> impl Iterator<Item = &'static str> {
    EXCITATIONS.iter().map(|(name, _)| *name)
}

/// Spot settings available for `excitation`; empty for an unknown line.
pub fn spot_settings(excitation: &str) -> &'static [&'static str] {
    match EXCITATIONS.iter().find(|(name, _)| *name == excitation) {
        Some((_, spots)) => *spots,
        None => &[],
    }
}

/// Resolve a user-typed excitation by exact name or by its source element prefix (`"Al"`).
pub fn resolve_excitation(input: &str) -> Option<&'static str> {
    let input = input.trim();
    excitation_names().find(|name| *name == input).or_else(|| {
        excitation_names().find(|name| {
            name.split_whitespace()
                .next()
                .is_some_and(|el| el.eq_ignore_ascii_case(input))
        })
    })
}

/// Whether `level` (e.g. `"Ti 2p"`) names a recordable core level.
pub fn is_valid_core_level(level: &str) -> bool {
    let mut parts = level.split_whitespace();
    let (Some(element), Some(orbital), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    VALID_ORBITALS
        .iter()
        .any(|(el, orbitals)| *el == element && orbitals.contains(&orbital))
}

/// Every valid core level, `"C 1s"`, `"O 1s"`, `"Ti 2p"`, …
pub fn core_levels() -> Vec<String> {
    VALID_ORBITALS
        .iter()
        .flat_map(|(el, orbitals)| orbitals.iter().map(move |o| format!("{el} {o}")))
        .collect()
}
