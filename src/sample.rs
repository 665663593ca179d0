//! Sample metadata: the `fixed_layout` information block in a resource body, and the sample
//! lines listed in an experiment's resource section.

use crate::html::{Document, Splice, escape};
use crate::resources;

/// Contents of a sample's information block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleInfo {
    pub id: i64,
    pub name: String,
    /// One of [`crate::catalog::PLATE_MATERIALS`].
    pub material: String,
    pub comment: String,
    /// `(experiment id, experiment title)` of every experiment linking the sample.
    pub linked_experiments: Vec<(i64, String)>,
}

impl SampleInfo {
    /// Fill name, material and comment from an existing information block, if any.
    pub fn read(id: i64, title: &str, body: &str) -> Self {
        let doc = Document::parse(body);
        let field = |class: &str| {
            doc.find("div", "fixed_layout")
                .and_then(|block| doc.find_in(block, "div", class))
                .map(|d| doc.text(d))
        };
        Self {
            id,
            name: field("name").unwrap_or_else(|| title.to_string()),
            material: field("material").unwrap_or_default(),
            comment: field("comment").unwrap_or_default(),
            linked_experiments: Vec::new(),
        }
    }

    /// The information block; links point at `web_base` (e.g. `https://host`).
    pub fn render(&self, web_base: &str) -> String {
        let mut html = String::from("<div class='fixed_layout'><hr><h3>Sample Information</h3><ul>");
        let items = [
            ("Sample ID", "sample_id", self.id.to_string()),
            ("Sample Name", "name", escape(&self.name)),
            ("Plate Material", "material", escape(&self.material)),
            ("Comment", "comment", escape(&self.comment)),
        ];
        for (label, class, value) in items {
            html.push_str(&format!(
                "<li><b>{label}</b>: <div class='{class}' style='display:inline;'>{value}</div></li>"
            ));
        }
        html.push_str("</ul><hr><h3>Linked Experiments</h3><ul>");
        for (i, (id, title)) in self.linked_experiments.iter().enumerate() {
            html.push_str(&format!(
                "<li><b>Experiment {}</b>: <a href='{web_base}/experiments.php?mode=view&amp;id={id}'>{}</a></li>",
                i + 1,
                escape(title)
            ));
        }
        html.push_str("</ul><hr></div>");
        html
    }
}

/// Put `block` at the top of `body`, dropping any previous information block.
pub fn apply_info_block(body: &str, block: &str) -> String {
    let doc = Document::parse(body);
    let mut edits = Splice::new();
    let mut last_end = 0;
    for id in doc.find_all("div", "fixed_layout") {
        let el = doc.element(id);
        if el.start >= last_end {
            edits.remove(el.outer());
            last_end = el.end;
        }
    }
    format!("{block}{}", edits.apply(body))
}

/// A sample linked to an experiment, as listed in its resource section.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleLine {
    pub id: i64,
    pub title: String,
}

impl SampleLine {
    fn to_item(&self, index: usize) -> String {
        format!(
            "<li><strong>Sample {index}</strong>: <div class=\"smpl\" style=\"display: inline;\">{} (ID: {})</div></li>",
            escape(&self.title),
            self.id
        )
    }

    /// Parse `"Gold foil (ID: 12)"`.
    pub fn parse(text: &str) -> Option<Self> {
        let (title, rest) = text.rsplit_once("(ID:")?;
        let id = rest.trim().trim_end_matches(')').trim().parse().ok()?;
        Some(Self {
            id,
            title: title.trim().to_string(),
        })
    }
}

/// Sample lines currently in the body's resource section.
pub fn read_sample_lines(body: &str) -> Vec<SampleLine> {
    resources::item_texts(body, "smpl")
        .iter()
        .filter_map(|t| SampleLine::parse(t))
        .collect()
}

/// Rewrite the resource section's sample lines, keeping them ahead of the positions.
pub fn write_sample_lines(body: &str, samples: &[SampleLine]) -> String {
    let items: Vec<String> = samples
        .iter()
        .enumerate()
        .map(|(i, s)| s.to_item(i + 1))
        .collect();
    resources::rewrite_items(body, "smpl", Some("pos"), &items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::positions::{Position, read_positions, write_positions};

    fn info() -> SampleInfo {
        SampleInfo {
            id: 7,
            name: "TiO2 (110)".into(),
            material: "Molybdenum".into(),
            comment: "cleaved in air".into(),
            linked_experiments: vec![(3, "Anneal series".into())],
        }
    }

    #[test]
    fn block_reads_back() {
        let html = info().render("https://elab.example");
        assert!(html.contains(
            "<a href='https://elab.example/experiments.php?mode=view&amp;id=3'>Anneal series</a>"
        ));
        let back = SampleInfo::read(7, "ignored", &html);
        assert_eq!(back.name, "TiO2 (110)");
        assert_eq!(back.material, "Molybdenum");
        assert_eq!(back.comment, "cleaved in air");
    }

    #[test]
    fn read_without_block_uses_title() {
        let back = SampleInfo::read(1, "Foil", "<p>free text</p>");
        assert_eq!(back.name, "Foil");
        assert!(back.material.is_empty());
    }

    #[test]
    fn apply_replaces_old_block_and_keeps_rest() {
        let old = format!("{}<p>notes</p>", info().render("h"));
        let mut newer = info();
        newer.comment = "sputtered".into();
        let block = newer.render("h");
        let out = apply_info_block(&old, &block);
        assert_eq!(out, format!("{block}<p>notes</p>"));
    }

    #[test]
    fn sample_lines_precede_positions() {
        let body = write_positions("", &[Position { x: 1.0, ..Default::default() }]);
        let body = write_sample_lines(
            &body,
            &[SampleLine {
                id: 12,
                title: "Gold foil".into(),
            }],
        );
        assert_eq!(
            read_sample_lines(&body),
            vec![SampleLine {
                id: 12,
                title: "Gold foil".into()
            }]
        );
        assert_eq!(read_positions(&body).len(), 1);
        let smpl = body.find("smpl").unwrap();
        let pos = body.find("class=\"pos\"").unwrap();
        assert!(smpl < pos);
    }

    #[test]
    fn sample_line_parse() {
        assert_eq!(
            SampleLine::parse("Crystal (a) (ID: 4)"),
            Some(SampleLine {
                id: 4,
                title: "Crystal (a)".into()
            })
        );
        assert!(SampleLine::parse("no id").is_none());
    }
}
