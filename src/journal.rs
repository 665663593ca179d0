//! The timestamped journal table at the bottom of an entry.
//!
//! Everything elablog adds to an entry (comments, template output, new steps, images,
//! transcriptions) goes in as a row of a borderless two-column table: timestamp, then content
//! rendered from markdown.

use std::path::Path;

use pulldown_cmark::{Options, Parser, html};
use tracing::info;

use crate::elab::{EntityType, Notebook, Upload};
use crate::html::{Document, Splice};
use crate::{Error, Result};

const TABLE_OPEN: &str =
    r#"<table style="border-collapse:collapse;width:100%;border-width:0px;" border="1">"#;

/// Local time in the journal's timestamp format.
pub fn timestamp_now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Render markdown to HTML. Raw HTML blocks pass through unchanged.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut out = String::new();
    html::push_html(&mut out, Parser::new_ext(markdown, Options::ENABLE_TABLES));
    out
}

/// One journal row.
pub fn journal_row(timestamp: &str, content_html: &str) -> String {
    format!(
        "<tr style=\"border-width:0px;\">\n<td style=\"border-width:0px;\">{timestamp}</td>\n<td style=\"border-width:0px;\"> {content_html}</td>\n</tr>"
    )
}

/// The journal table: the first borderless collapsed table, ignoring whitespace in its style.
fn journal_table(doc: &Document<'_>) -> Option<usize> {
    doc.find_all("table", "").into_iter().find(|&id| {
        let style: String = doc
            .element(id)
            .attr("style")
            .unwrap_or("")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        style.contains("border-collapse:collapse") && style.contains("border-width:0px")
    })
}

/// Add `row` to the body's journal.
///
/// The row goes at the end of the journal table (inside its `<tbody>` when the editor added
/// one). Other tables, including ones rendered inside earlier rows, are left alone. A body
/// without a journal gets a new journal table appended.
pub fn append_row(body: &str, row: &str) -> String {
    let doc = Document::parse(body);
    let Some(table) = journal_table(&doc) else {
        return format!("{body}<br>\n{TABLE_OPEN}\n{row}\n</table>");
    };
    let container = doc.children(table, "tbody").into_iter().next().unwrap_or(table);
    let mut edits = Splice::new();
    edits.insert(doc.element(container).close_start, format!("{row}\n"));
    edits.apply(body)
}

/// Append markdown `content` as a journal row and patch the entry. Returns the new body.
pub fn append_to_entry(
    notebook: &dyn Notebook,
    entity: EntityType,
    id: i64,
    content: &str,
    timestamp: Option<&str>,
) -> Result<String> {
    let entry = notebook.get_entry(entity, id)?;
    let timestamp = timestamp.map_or_else(timestamp_now, str::to_string);
    let row = journal_row(&timestamp, &markdown_to_html(content));
    let body = append_row(&entry.body, &row);
    notebook.patch_body(entity, id, &body)?;
    info!(%entity, id, "appended journal row");
    Ok(body)
}

/// HTML showing an uploaded image at its recorded size.
pub fn image_html(upload: &Upload, size: Option<(u32, u32)>) -> Option<String> {
    let (width, height) = size.or_else(|| upload.dimensions())?;
    Some(format!(
        "<p><img src=\"app/download.php?name={}&amp;f={}&amp;storage={}\" width=\"{width}\" height=\"{height}\" ></p>",
        upload.real_name, upload.long_name, upload.storage
    ))
}

/// Upload an image file, recording its size as the `"W:H"` upload comment.
pub fn upload_image(
    notebook: &dyn Notebook,
    entity: EntityType,
    id: i64,
    path: &Path,
) -> Result<(u32, u32)> {
    let (width, height) = image::image_dimensions(path)?;
    notebook.upload_file(entity, id, path, &format!("{width}:{height}"))?;
    Ok((width, height))
}

/// Show a previously uploaded image (by file name) in the journal.
pub fn insert_image(
    notebook: &dyn Notebook,
    entity: EntityType,
    id: i64,
    real_name: &str,
) -> Result<String> {
    let upload = notebook
        .uploads(entity, id)?
        .into_iter()
        .rev()
        .find(|u| u.real_name == real_name)
        .ok_or_else(|| Error::NotFound(format!("upload '{real_name}'")))?;
    let content = image_html(&upload, None)
        .ok_or_else(|| Error::msg(format!("upload '{real_name}' has no recorded size")))?;
    append_to_entry(notebook, entity, id, &content, None)
}

/// Upload an image and show it in the journal.
pub fn add_image(
    notebook: &dyn Notebook,
    entity: EntityType,
    id: i64,
    path: &Path,
) -> Result<String> {
    upload_image(notebook, entity, id, path)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::msg(format!("not a file path: {}", path.display())))?;
    insert_image(notebook, entity, id, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_row_creates_table() {
        let out = append_row("<p>intro</p>", "<tr>r</tr>");
        assert_eq!(
            out,
            format!("<p>intro</p><br>\n{TABLE_OPEN}\n<tr>r</tr>\n</table>")
        );
    }

    #[test]
    fn later_rows_go_into_the_journal() {
        let once = append_row("<p>intro</p>", "<tr>1</tr>");
        let twice = append_row(&once, "<tr>2</tr>");
        assert!(twice.ends_with("<tr>1</tr>\n<tr>2</tr>\n</table>"));
        assert_eq!(twice.matches("<table").count(), 1);
    }

    #[test]
    fn rows_skip_tables_outside_the_journal() {
        let body = format!(
            "<table><tr><td>sample</td></tr></table><br>\n{TABLE_OPEN}\n<tr><td>t</td><td><table><tr><td>nested</td></tr></table></td></tr>\n</table><p>end</p>"
        );
        let out = append_row(&body, "<tr>new</tr>");
        assert!(out.starts_with("<table><tr><td>sample</td></tr></table>"));
        assert!(out.contains("<td>nested</td></tr></table></td></tr>\n<tr>new</tr>\n</table><p>end</p>"));
        assert_eq!(out.matches("<table").count(), 3);
    }

    #[test]
    fn rows_go_inside_tbody() {
        let body = "<table style=\"border-collapse: collapse; width: 100%; border-width: 0px;\" border=\"1\"><tbody><tr><td>a</td></tr></tbody></table>";
        assert_eq!(
            append_row(body, "<tr>b</tr>"),
            "<table style=\"border-collapse: collapse; width: 100%; border-width: 0px;\" border=\"1\"><tbody><tr><td>a</td></tr><tr>b</tr>\n</tbody></table>"
        );
    }

    #[test]
    fn unstyled_table_gets_a_journal_of_its_own() {
        let out = append_row("<table><tr><td>x</td></tr></table>", "<tr>r</tr>");
        assert_eq!(
            out,
            format!("<table><tr><td>x</td></tr></table><br>\n{TABLE_OPEN}\n<tr>r</tr>\n</table>")
        );
    }

    #[test]
    fn markdown_renders_and_passes_html() {
        assert_eq!(markdown_to_html("**bold**"), "<p><strong>bold</strong></p>\n");
        let raw = "<div class='anneal'><ul></ul></div>";
        assert!(markdown_to_html(raw).starts_with(raw));
    }

    #[test]
    fn row_layout() {
        assert_eq!(
            journal_row("2024-01-01 10:00:00", "<p>x</p>"),
            "<tr style=\"border-width:0px;\">\n<td style=\"border-width:0px;\">2024-01-01 10:00:00</td>\n<td style=\"border-width:0px;\"> <p>x</p></td>\n</tr>"
        );
    }

    #[test]
    fn image_markup() {
        let up = Upload {
            id: 1,
            real_name: "sketch.png".into(),
            long_name: "ab/abcdef.png".into(),
            storage: 1,
            comment: "640:480".into(),
        };
        assert_eq!(
            image_html(&up, None).unwrap(),
            "<p><img src=\"app/download.php?name=sketch.png&amp;f=ab/abcdef.png&amp;storage=1\" width=\"640\" height=\"480\" ></p>"
        );
        assert!(image_html(&Upload::default(), None).is_none());
        assert!(image_html(&Upload::default(), Some((1, 2))).is_some());
    }

    #[test]
    fn timestamp_shape() {
        let ts = timestamp_now();
        assert_eq!(ts.len(), 19);
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, "%Y-%m-%d %H:%M:%S").is_ok());
    }
}
