use scraper::{ElementRef, Html, node::Node as HtmlNode};
use tabsync_core::{Element, Node, PollError};

/// Parses a server-rendered fragment and returns its root table element.
///
/// The root element's tag must be `table` (case-insensitive); anything else
/// is rejected so the caller can discard the response without merging.
pub fn table_fragment(body: &str) -> Result<Element, PollError> {
    let fragment = Html::parse_fragment(body);
    let root = fragment
        .root_element()
        .children()
        .filter_map(ElementRef::wrap)
        .next()
        .ok_or_else(|| PollError::parse("fragment has no root element"))?;

    let name = root.value().name();
    if !name.eq_ignore_ascii_case("table") {
        return Err(PollError::UnexpectedRoot(name.to_string()));
    }
    Ok(convert(root))
}

/// Deep copy of a parsed element into the owned tree model. Attributes are
/// copied verbatim, element and text children recurse, and every other node
/// kind (comments, processing instructions) is dropped.
fn convert(el: ElementRef) -> Element {
    let mut out = Element::new(el.value().name());
    for (name, value) in el.value().attrs() {
        out.attrs.push((name.to_string(), value.to_string()));
    }
    for child in el.children() {
        match child.value() {
            HtmlNode::Element(_) => {
                if let Some(inner) = ElementRef::wrap(child) {
                    out.children.push(Node::Element(convert(inner)));
                }
            }
            HtmlNode::Text(text) => {
                out.children.push(Node::Text(text.text.to_string()));
            }
            _ => {}
        }
    }
    out
}
