//! A forgiving HTML element index over an entry body.
//!
//! Entry bodies are edited by hand in the notebook's rich-text editor, so tags are often left
//! open. `quick-xml` tokenizes the body with name checks switched off; the tree is then built
//! here with HTML's void elements and implied closes. Every element keeps its byte offsets in
//! the source, which is enough to look fragments up by tag and class and to splice replacements
//! into the body without re-serializing the parts that were not touched.

use std::ops::Range;

use quick_xml::Reader;
use quick_xml::escape::resolve_html5_entity;
use quick_xml::events::{BytesStart, Event};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// One element of the body, with byte offsets into the source.
#[derive(Debug, Clone)]
pub struct Element {
    /// Lowercased tag name.
    pub name: String,
    pub attrs: Vec<(String, String)>,
    /// Offset of `<`.
    pub start: usize,
    /// Offset just past the opening tag's `>`.
    pub open_end: usize,
    /// Offset of the closing tag's `<`, or where the element was implicitly closed.
    pub close_start: usize,
    /// Offset just past the closing tag.
    pub end: usize,
    pub parent: Option<usize>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// The first class, which is what identifies a fragment's kind.
    pub fn primary_class(&self) -> Option<&str> {
        self.classes().next()
    }

    pub fn outer(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn inner(&self) -> Range<usize> {
        self.open_end..self.close_start
    }
}

/// Element index of a body string. Element ids are positions in document order.
#[derive(Debug)]
pub struct Document<'a> {
    src: &'a str,
    elements: Vec<Element>,
}

impl<'a> Document<'a> {
    pub fn parse(src: &'a str) -> Self {
        let mut elements: Vec<Element> = Vec::new();
        let mut open: Vec<usize> = Vec::new();
        let mut reader = tag_soup_reader(src);

        loop {
            let start = offset(&reader);
            let event = match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(event) => event,
                Err(err) => {
                    tracing::debug!(%err, at = start, "stopped indexing malformed body");
                    break;
                }
            };
            let end = offset(&reader);

            let (tag, void) = match &event {
                Event::Start(tag) => (tag, false),
                Event::Empty(tag) => (tag, true),
                Event::End(tag) => {
                    let name = String::from_utf8_lossy(tag.name().as_ref()).to_ascii_lowercase();
                    let Some(pos) = open.iter().rposition(|&id| elements[id].name == name) else {
                        continue; // stray close tag
                    };
                    for id in open.drain(pos..).rev() {
                        let el = &mut elements[id];
                        el.close_start = start;
                        el.end = if el.name == name { end } else { start };
                    }
                    continue;
                }
                _ => continue,
            };

            let name = String::from_utf8_lossy(tag.name().as_ref()).to_ascii_lowercase();
            if let Some(pos) = implied_close(&elements, &open, &name) {
                for id in open.drain(pos..) {
                    elements[id].close_start = start;
                    elements[id].end = start;
                }
            }

            let id = elements.len();
            let void = void || VOID_ELEMENTS.contains(&name.as_str());
            elements.push(Element {
                attrs: attributes(tag),
                start,
                open_end: end,
                close_start: end,
                end,
                parent: open.last().copied(),
                name,
            });
            if !void {
                open.push(id);
            }
        }

        for id in open {
            elements[id].close_start = src.len();
            elements[id].end = src.len();
        }

        Self { src, elements }
    }

    pub fn source(&self) -> &'a str {
        self.src
    }

    pub fn element(&self, id: usize) -> &Element {
        &self.elements[id]
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// All elements named `tag` carrying `class`, in document order.
    pub fn find_all(&self, tag: &str, class: &str) -> Vec<usize> {
        (0..self.elements.len())
            .filter(|&id| self.matches(id, tag, class))
            .collect()
    }

    pub fn find(&self, tag: &str, class: &str) -> Option<usize> {
        (0..self.elements.len()).find(|&id| self.matches(id, tag, class))
    }

    /// Elements named `tag` (any tag when empty) with `class` (any when empty) nested in `scope`.
    pub fn find_all_in(&self, scope: usize, tag: &str, class: &str) -> Vec<usize> {
        (scope + 1..self.elements.len())
            .take_while(|&id| self.elements[id].start < self.elements[scope].close_start)
            .filter(|&id| self.is_descendant(id, scope) && self.matches(id, tag, class))
            .collect()
    }

    pub fn find_in(&self, scope: usize, tag: &str, class: &str) -> Option<usize> {
        self.find_all_in(scope, tag, class).into_iter().next()
    }

    /// Direct children of `scope` named `tag`.
    pub fn children(&self, scope: usize, tag: &str) -> Vec<usize> {
        (scope + 1..self.elements.len())
            .take_while(|&id| self.elements[id].start < self.elements[scope].close_start)
            .filter(|&id| self.elements[id].parent == Some(scope) && self.elements[id].name == tag)
            .collect()
    }

    /// Nearest enclosing element named `tag`.
    pub fn ancestor(&self, id: usize, tag: &str) -> Option<usize> {
        let mut cur = self.elements[id].parent;
        while let Some(p) = cur {
            if self.elements[p].name == tag {
                return Some(p);
            }
            cur = self.elements[p].parent;
        }
        None
    }

    /// Text of an element: every text run trimmed, entities decoded, runs concatenated.
    pub fn text(&self, id: usize) -> String {
        text_content(&self.src[self.elements[id].inner()])
    }

    pub fn outer_html(&self, id: usize) -> &'a str {
        &self.src[self.elements[id].outer()]
    }

    fn matches(&self, id: usize, tag: &str, class: &str) -> bool {
        let el = &self.elements[id];
        (tag.is_empty() || el.name == tag) && (class.is_empty() || el.has_class(class))
    }

    fn is_descendant(&self, id: usize, scope: usize) -> bool {
        let mut cur = self.elements[id].parent;
        while let Some(p) = cur {
            if p == scope {
                return true;
            }
            cur = self.elements[p].parent;
        }
        false
    }
}

/// Position in the open stack of a sibling that opening `name` closes, e.g. `<li>` after `<li>`.
fn implied_close(elements: &[Element], open: &[usize], name: &str) -> Option<usize> {
    let (siblings, scopes): (&[&str], &[&str]) = match name {
        "li" => (&["li"], &["ul", "ol"]),
        "tr" => (&["tr"], &["table", "tbody", "thead", "tfoot"]),
        "td" | "th" => (&["td", "th"], &["tr", "table"]),
        "option" => (&["option"], &["select"]),
        _ => return None,
    };
    for (pos, &id) in open.iter().enumerate().rev() {
        let open_name = elements[id].name.as_str();
        if scopes.contains(&open_name) {
            return None;
        }
        if siblings.contains(&open_name) {
            return Some(pos);
        }
    }
    None
}

/// A reader that reports every tag as written, leaving nesting to [`Document::parse`].
fn tag_soup_reader(src: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(src);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.check_comments = false;
    config.expand_empty_elements = false;
    reader
}

fn offset(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

fn attributes(tag: &BytesStart<'_>) -> Vec<(String, String)> {
    tag.html_attributes()
        .filter_map(|attr| attr.ok())
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
            let value = decode_entities(&String::from_utf8_lossy(&attr.value));
            (key, value)
        })
        .collect()
}

/// Strip tags from an HTML snippet, trim each text run and concatenate them.
pub fn text_content(snippet: &str) -> String {
    let mut reader = tag_soup_reader(snippet);
    let mut out = String::new();
    loop {
        let start = offset(&reader);
        match reader.read_event() {
            Ok(Event::Text(_)) => {
                let end = offset(&reader).min(snippet.len());
                out.push_str(decode_entities(&snippet[start..end]).trim());
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => {
                out.push_str(decode_entities(&snippet[start.min(snippet.len())..]).trim());
                break;
            }
        }
    }
    out
}

/// Decode HTML5 named entities and numeric references. Anything unrecognized is kept as is.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &rest[1..semi];
            let text = match resolve_html5_entity(entity) {
                Some(named) => Some(named.to_string()),
                None => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32)
                    .map(String::from),
            };
            text.map(|t| (t, semi + 1))
        });
        match decoded {
            Some((text, consumed)) => {
                out.push_str(&text);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Escape text for use inside element content or a quoted attribute.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// A batch of byte-range replacements against one source string.
///
/// Ranges must not overlap; they are applied back to front so offsets stay valid.
#[derive(Debug, Default)]
pub struct Splice {
    edits: Vec<(Range<usize>, String)>,
}

impl Splice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, range: Range<usize>, with: impl Into<String>) -> &mut Self {
        self.edits.push((range, with.into()));
        self
    }

    pub fn remove(&mut self, range: Range<usize>) -> &mut Self {
        self.replace(range, String::new())
    }

    pub fn insert(&mut self, at: usize, text: impl Into<String>) -> &mut Self {
        self.replace(at..at, text)
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn apply(mut self, src: &str) -> String {
        self.edits
            .sort_by(|a, b| b.0.start.cmp(&a.0.start).then(b.0.end.cmp(&a.0.end)));
        let mut out = src.to_string();
        for (range, text) in self.edits {
            out.replace_range(range, &text);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"<p class="dscrpt">Intro</p>
<table><tr><td>2024</td><td><div class="anneal"><b><div class="title" style="display:inline;">Annealing #1</div>:</b><ul><li><b>Const. Temp.</b>: <div class="temp" style="display:inline;">500.0 K</div></li></ul></div></td></tr></table>
<br><img src="a.png"><div class='resc'><ul><li>one<li>two</ul></div>"#;

    #[test]
    fn finds_elements_by_class() {
        let doc = Document::parse(BODY);
        let anneal = doc.find("div", "anneal").unwrap();
        let title = doc.find_in(anneal, "div", "title").unwrap();
        assert_eq!(doc.text(title), "Annealing #1");
        let temp = doc.find_in(anneal, "div", "temp").unwrap();
        assert_eq!(doc.text(temp), "500.0 K");
        assert!(doc.find_in(anneal, "div", "resc").is_none());
    }

    #[test]
    fn ancestor_walks_up_to_row() {
        let doc = Document::parse(BODY);
        let anneal = doc.find("div", "anneal").unwrap();
        let tr = doc.ancestor(anneal, "tr").unwrap();
        assert!(doc.outer_html(tr).starts_with("<tr>"));
        assert!(doc.outer_html(tr).ends_with("</tr>"));
    }

    #[test]
    fn implicitly_closed_items() {
        let doc = Document::parse(BODY);
        let resc = doc.find("div", "resc").unwrap();
        let ul = doc.find_in(resc, "ul", "").unwrap();
        let items = doc.children(ul, "li");
        assert_eq!(items.len(), 2);
        assert_eq!(doc.text(items[0]), "one");
        assert_eq!(doc.text(items[1]), "two");
        assert!(doc.outer_html(resc).ends_with("</div>"));
    }

    #[test]
    fn text_decodes_entities() {
        assert_eq!(text_content("a &amp; b &#8614; c&nbsp;"), "a & b ↦ c");
        assert_eq!(text_content("<b> x </b> y"), "xy");
        assert_eq!(decode_entities("&bogus; &"), "&bogus; &");
        assert_eq!(decode_entities("&#x41;"), "A");
    }

    #[test]
    fn splice_keeps_untouched_bytes() {
        let doc = Document::parse(BODY);
        let anneal = doc.find("div", "anneal").unwrap();
        let tr = doc.ancestor(anneal, "tr").unwrap();
        let mut edits = Splice::new();
        edits.remove(doc.element(tr).outer());
        edits.insert(0, "<h1>x</h1>");
        let out = edits.apply(BODY);
        assert!(out.starts_with("<h1>x</h1><p class=\"dscrpt\">Intro</p>\n<table></table>"));
        assert!(out.ends_with("<li>two</ul></div>"));
    }

    #[test]
    fn escape_round_trips_through_text() {
        let raw = "T < 5 & \"dry\"";
        assert_eq!(text_content(&escape(raw)), raw);
    }

    #[test]
    fn editor_markup_variants_are_indexed() {
        let src = "<!-- saved --><DIV CLASS=temp hidden>5 K</DIV><p title=\"a &amp; b\">x</p>";
        let doc = Document::parse(src);
        let temp = doc.find("div", "temp").unwrap();
        assert_eq!(doc.text(temp), "5 K");
        assert_eq!(doc.element(temp).attr("hidden"), Some(""));
        let p = doc.find("p", "").unwrap();
        assert_eq!(doc.element(p).attr("title"), Some("a & b"));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn stray_and_unclosed_tags_are_tolerated() {
        let doc = Document::parse("</p><div class='a'><span>x");
        let a = doc.find("div", "a").unwrap();
        assert_eq!(doc.element(a).end, "</p><div class='a'><span>x".len());
        assert_eq!(doc.text(a), "x");
    }
}
