//! The `resc` section of an experiment body: a headed list of linked samples and positions.

use crate::html::{Document, Splice};

const SECTION_HTML: &str =
    "<div class='resc'><hr><h5><strong>Resources:</strong></h5><ul></ul><hr></div>";

/// Make sure `body` has a resource section with a list, creating what is missing.
///
/// A new section goes right after the `<p class="dscrpt">` description paragraph, or at the
/// very top of the body.
pub fn ensure_section(body: &str) -> String {
    let doc = Document::parse(body);
    let Some(resc) = doc.find("div", "resc") else {
        let at = doc
            .find("p", "dscrpt")
            .map_or(0, |p| doc.element(p).end);
        let mut edits = Splice::new();
        edits.insert(at, SECTION_HTML);
        return edits.apply(body);
    };
    if doc.find_in(resc, "ul", "").is_some() {
        return body.to_string();
    }

    let at = doc
        .find_in(resc, "h5", "")
        .or_else(|| doc.find_in(resc, "h4", ""))
        .or_else(|| doc.find_in(resc, "h3", ""))
        .map_or(doc.element(resc).close_start, |h| doc.element(h).end);
    let mut edits = Splice::new();
    edits.insert(at, "<ul></ul>");
    edits.apply(body)
}

/// Replace every list item in the section's list that holds a `div.{class}` with `items`.
///
/// New items go before the first remaining item holding a `div.{before_class}`, or at the end
/// of the list. The section is created when missing.
pub(crate) fn rewrite_items(
    body: &str,
    class: &str,
    before_class: Option<&str>,
    items: &[String],
) -> String {
    let body = ensure_section(body);
    let doc = Document::parse(&body);
    let Some(ul) = doc
        .find("div", "resc")
        .and_then(|resc| doc.find_in(resc, "ul", ""))
    else {
        return body;
    };

    let mut edits = Splice::new();
    let mut insert_at = None;
    for li in doc.children(ul, "li") {
        if doc.find_in(li, "div", class).is_some() {
            edits.remove(doc.element(li).outer());
        } else if insert_at.is_none()
            && before_class.is_some_and(|c| doc.find_in(li, "div", c).is_some())
        {
            insert_at = Some(doc.element(li).start);
        }
    }
    let at = insert_at.unwrap_or(doc.element(ul).close_start);
    if !items.is_empty() {
        edits.insert(at, items.concat());
    }
    edits.apply(&body)
}

/// Texts of every `div.{class}` inside the section, in order.
pub(crate) fn item_texts(body: &str, class: &str) -> Vec<String> {
    let doc = Document::parse(body);
    let Some(resc) = doc.find("div", "resc") else {
        return Vec::new();
    };
    doc.find_all_in(resc, "div", class)
        .into_iter()
        .map(|id| doc.text(id))
        .collect()
}
