use std::fmt;

use crate::html::escape;
use crate::resources;
use crate::units::format_float;

/// A sample position on the manipulator, in mm (and degrees for the optional angle).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Position {
    /// `"Position 3"`; assigned from list order.
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub angle: Option<f64>,
}

impl Position {
    /// Parse `"x = 1.0 mm, y = 2.0 mm, z = 0.0 mm, angle = 45.0 °"`.
    ///
    /// Returns `None` when none of `x`, `y`, `z` is present. Unreadable values are zero.
    pub fn parse(name: impl Into<String>, text: &str) -> Option<Self> {
        let cleaned = text.replace("mm", "").replace('°', "").replace(' ', "");
        let mut pos = Position {
            name: name.into(),
            ..Default::default()
        };
        let mut any_axis = false;
        for param in cleaned.split(',') {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let value = value.parse::<f64>().unwrap_or(0.0);
            match key {
                "x" => pos.x = value,
                "y" => pos.y = value,
                "z" => pos.z = value,
                "angle" => {
                    pos.angle = Some(value);
                    continue;
                }
                _ => continue,
            }
            any_axis = true;
        }
        any_axis.then_some(pos)
    }

    /// Coordinates as written into the body.
    pub fn coordinates(&self) -> String {
        let mut out = format!(
            "x = {} mm, y = {} mm, z = {} mm",
            format_float(self.x),
            format_float(self.y),
            format_float(self.z)
        );
        if let Some(angle) = self.angle.filter(|a| *a != 0.0) {
            out.push_str(&format!(", angle = {} °", format_float(angle)));
        }
        out
    }

    fn to_item(&self) -> String {
        format!(
            "<li><strong>{}</strong>: <div class=\"pos\" style=\"display: inline;\">{}</div></li>",
            escape(&self.name),
            self.coordinates()
        )
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.coordinates())
    }
}

/// Positions listed in the body's resource section, named by their order.
pub fn read_positions(body: &str) -> Vec<Position> {
    resources::item_texts(body, "pos")
        .iter()
        .filter_map(|text| Position::parse("", text))
        .enumerate()
        .map(|(i, mut p)| {
            p.name = format!("Position {}", i + 1);
            p
        })
        .collect()
}

/// Replace the resource section's position list with `positions`, renumbered from 1.
///
/// Creates the resource section when the body has none.
pub fn write_positions(body: &str, positions: &[Position]) -> String {
    let items: Vec<String> = positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            Position {
                name: format!("Position {}", i + 1),
                ..p.clone()
            }
            .to_item()
        })
        .collect();
    resources::rewrite_items(body, "pos", None, &items)
}

/// Names of the body's positions, for measurement steps to refer to.
pub fn position_names(body: &str) -> Vec<String> {
    read_positions(body).into_iter().map(|p| p.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_axes_and_angle() {
        let p = Position::parse("Position 1", "x = 1.5 mm, y = -2.0 mm, z = 0 mm, angle = 45.0 °")
            .unwrap();
        assert_eq!((p.x, p.y, p.z, p.angle), (1.5, -2.0, 0.0, Some(45.0)));

        let p = Position::parse("", "x=1,y=abc").unwrap();
        assert_eq!((p.x, p.y, p.z), (1.0, 0.0, 0.0));

        assert!(Position::parse("", "Position 1").is_none());
    }

    #[test]
    fn write_then_read() {
        let positions = vec![
            Position {
                name: String::new(),
                x: 1.0,
                y: 2.0,
                z: 0.0,
                angle: None,
            },
            Position {
                name: String::new(),
                x: 0.5,
                y: 0.0,
                z: 3.25,
                angle: Some(90.0),
            },
        ];
        let body = write_positions("<p class=\"dscrpt\">d</p>", &positions);
        assert!(body.contains(
            "<li><strong>Position 1</strong>: <div class=\"pos\" style=\"display: inline;\">x = 1.0 mm, y = 2.0 mm, z = 0.0 mm</div></li>"
        ));
        let back = read_positions(&body);
        assert_eq!(back.len(), 2);
        assert_eq!(back[1].name, "Position 2");
        assert_eq!(back[1].angle, Some(90.0));
        assert_eq!(position_names(&body), vec!["Position 1", "Position 2"]);

        let fewer = write_positions(&body, &back[1..]);
        let left = read_positions(&fewer);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].name, "Position 1");
        assert_eq!(left[0].z, 3.25);
    }

    #[test]
    fn measurement_position_fields_are_not_positions() {
        let body = r#"<div class="mess"><div class="pos">Position 1</div></div>"#;
        assert!(read_positions(body).is_empty());
    }
}
