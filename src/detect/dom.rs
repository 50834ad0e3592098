use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// Formatting tags that never count as a container on their own.
const INLINE_TAGS: &[&str] = &[
    "span", "b", "strong", "em", "i", "u", "small", "mark", "abbr", "sup", "sub", "font",
];

/// One fetched page of markup.
///
/// Wraps the parsed document and exposes the handful of lookups the detection
/// pipeline needs: selector queries, text projection, and the structural
/// neighbours (container, heading, anchor) of a matching text node.
pub struct Page {
    html: Html,
}

impl Page {
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_document(markup),
        }
    }

    /// All elements matching a CSS selector. An unparsable selector matches nothing.
    pub fn find_all(&self, selector: &str) -> Vec<ElementRef<'_>> {
        match Selector::parse(selector) {
            Ok(sel) => self.html.select(&sel).collect(),
            Err(e) => {
                debug!("Ignoring invalid selector {:?}: {:?}", selector, e);
                Vec::new()
            }
        }
    }

    /// Detach every element matching `selector`; returns how many were removed.
    pub fn remove_all(&mut self, selector: &str) -> usize {
        let ids: Vec<_> = self.find_all(selector).iter().map(|el| el.id()).collect();
        let mut removed = 0;
        for id in ids {
            if let Some(mut node) = self.html.tree.get_mut(id) {
                node.detach();
                removed += 1;
            }
        }
        removed
    }

    /// Plain-text projection of the whole document, one space between text nodes.
    pub fn text(&self) -> String {
        text_of(self.html.root_element())
    }

    /// Text of the `<title>` element, if any.
    pub fn title(&self) -> Option<String> {
        self.find_all("title")
            .first()
            .map(|el| collapse_whitespace(&text_of(*el)))
    }

    /// Every element in document order, the root included.
    pub fn elements(&self) -> Vec<ElementRef<'_>> {
        self.html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .collect()
    }

    /// Containers of every text node for which `matches` returns true, in document order.
    /// A container shared by several matching text nodes is reported once per node.
    pub fn containers_of_text<P>(&self, mut matches: P) -> Vec<ElementRef<'_>>
    where
        P: FnMut(&str) -> bool,
    {
        let mut out = Vec::new();
        for node in self.html.root_element().descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            if !matches(&**text) {
                continue;
            }
            if let Some(parent) = node.parent().and_then(ElementRef::wrap) {
                out.push(container_of(parent));
            }
        }
        out
    }
}

/// Climb from a text node's parent past inline formatting tags.
fn container_of(el: ElementRef<'_>) -> ElementRef<'_> {
    let mut current = el;
    while INLINE_TAGS.contains(&current.value().name()) {
        match current.parent().and_then(ElementRef::wrap) {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current
}

pub fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_heading(el: ElementRef<'_>) -> bool {
    HEADING_TAGS.contains(&el.value().name())
}

/// Closest ancestor (the element itself excluded) with the given tag name.
pub fn nearest_ancestor_of_tag<'a>(el: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == tag)
}

/// Heading text for a container: the first heading level (h1..h6 in order)
/// present inside it, else the closest heading before it in the document,
/// else the closest one after it.
pub fn nearest_heading(order: &[ElementRef<'_>], container: ElementRef<'_>) -> Option<String> {
    for tag in HEADING_TAGS {
        let inside = container
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == *tag)
            .find_map(|el| heading_text(&el));
        if inside.is_some() {
            return inside;
        }
    }

    let pos = order.iter().position(|el| *el == container)?;
    order[..pos]
        .iter()
        .rev()
        .filter(|el| is_heading(**el))
        .find_map(heading_text)
        .or_else(|| {
            order[pos + 1..]
                .iter()
                .filter(|el| is_heading(**el))
                .find_map(heading_text)
        })
}

fn heading_text(el: &ElementRef<'_>) -> Option<String> {
    let t = collapse_whitespace(&text_of(*el));
    (!t.is_empty()).then_some(t)
}

/// `href` of the first anchor inside the container (itself included), else of
/// the closest enclosing anchor.
pub fn nearest_anchor<'a>(container: ElementRef<'a>) -> Option<&'a str> {
    container
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "a" && el.value().attr("href").is_some())
        .or_else(|| nearest_ancestor_of_tag(container, "a"))
        .and_then(|el| el.value().attr("href"))
}

/// Resolve an `href` against the site base. Only http(s) results are kept.
pub fn absolute_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}
