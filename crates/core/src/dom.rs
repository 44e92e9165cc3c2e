use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PollError;

/// A node in the page tree. Comments and processing instructions are never
/// represented; the fragment parser drops them before they reach this model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with an ordered attribute list and ordered children.
/// Tag names are stored ASCII-lowercase; comparisons are case-insensitive
/// anyway so callers can pass tags in any case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    /// Concatenated text of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Element(el) => el.collect_text(out),
                Node::Text(text) => out.push_str(text),
            }
        }
    }

    /// All `<tr>` descendants in document order. Descendant search, not
    /// direct children, so rows nested under `<tbody>` count the same as
    /// rows placed directly under the table.
    pub fn rows(&self) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_rows(&mut found);
        found
    }

    fn collect_rows<'a>(&'a self, found: &mut Vec<&'a Element>) {
        for child in &self.children {
            if let Node::Element(el) = child {
                if el.is("tr") {
                    found.push(el);
                } else {
                    el.collect_rows(found);
                }
            }
        }
    }

    /// The element that directly holds the first `<tr>` descendant,
    /// i.e. the parent new rows get appended to.
    pub fn row_container_mut(&mut self) -> Option<&mut Element> {
        let has_row = self
            .children
            .iter()
            .any(|c| matches!(c, Node::Element(el) if el.is("tr")));
        if has_row {
            return Some(self);
        }
        for child in &mut self.children {
            if let Node::Element(el) = child {
                if let Some(container) = el.row_container_mut() {
                    return Some(container);
                }
            }
        }
        None
    }
}

fn escape_into(f: &mut fmt::Formatter<'_>, raw: &str) -> fmt::Result {
    for ch in raw.chars() {
        match ch {
            '&' => f.write_str("&amp;")?,
            '<' => f.write_str("&lt;")?,
            '>' => f.write_str("&gt;")?,
            '"' => f.write_str("&quot;")?,
            _ => fmt::Write::write_char(f, ch)?,
        }
    }
    Ok(())
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        for (name, value) in &self.attrs {
            write!(f, " {}=\"", name)?;
            escape_into(f, value)?;
            write!(f, "\"")?;
        }
        write!(f, ">")?;
        for child in &self.children {
            match child {
                Node::Element(el) => write!(f, "{}", el)?,
                Node::Text(text) => escape_into(f, text)?,
            }
        }
        write!(f, "</{}>", self.tag)
    }
}

/// The host page: a tree of elements addressed by their `id` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub root: Element,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    pub fn element_by_id(&self, id: &str) -> Option<&Element> {
        fn walk<'a>(el: &'a Element, id: &str) -> Option<&'a Element> {
            if el.id() == Some(id) {
                return Some(el);
            }
            for child in &el.children {
                if let Node::Element(inner) = child {
                    if let Some(found) = walk(inner, id) {
                        return Some(found);
                    }
                }
            }
            None
        }
        walk(&self.root, id)
    }

    pub fn element_by_id_mut(&mut self, id: &str) -> Option<&mut Element> {
        fn walk<'a>(el: &'a mut Element, id: &str) -> Option<&'a mut Element> {
            if el.id() == Some(id) {
                return Some(el);
            }
            for child in &mut el.children {
                if let Node::Element(inner) = child {
                    if let Some(found) = walk(inner, id) {
                        return Some(found);
                    }
                }
            }
            None
        }
        walk(&mut self.root, id)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

/// Replaces every row after the target's header row with deep copies of the
/// source's rows from index 1 onward, in source order. Full replacement:
/// no diffing, no key matching. The header row of the target is untouched
/// and the source's own header row is skipped.
///
/// Anything after the header row in its container is dropped, including
/// stray text nodes between rows.
pub fn replace_rows(target: &mut Element, source: &Element) -> Result<usize, PollError> {
    let container = target.row_container_mut().ok_or(PollError::MissingHeader)?;
    let header_at = container
        .children
        .iter()
        .position(|c| matches!(c, Node::Element(el) if el.is("tr")))
        .ok_or(PollError::MissingHeader)?;
    container.children.truncate(header_at + 1);

    let mut appended = 0;
    for row in source.rows().into_iter().skip(1) {
        container.children.push(Node::Element(row.clone()));
        appended += 1;
    }
    Ok(appended)
}
