pub mod city;
pub mod clean;
pub mod dom;
pub mod extract;
pub mod pagination;
pub mod validate;

use tracing::debug;
use url::Url;

use city::TargetCity;
use dom::Page;
use validate::{RejectReason, Verdict};

/// A validated mention of the city inside one block of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub title: String,
    /// Absolute http(s) URL.
    pub link: Option<String>,
    pub context: String,
    pub postal_code: String,
}

/// An occurrence tagged with the result page it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMatch {
    pub occurrence: Occurrence,
    pub page_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// City name nowhere in the cleaned text.
    NoMention,
    /// Named, but the page as a whole failed postal-code correlation.
    Rejected(RejectReason),
    /// Page passed; may still hold zero occurrences once each block is checked.
    Matches(Vec<Occurrence>),
}

impl PageOutcome {
    pub fn into_occurrences(self) -> Vec<Occurrence> {
        match self {
            PageOutcome::Matches(found) => found,
            _ => Vec::new(),
        }
    }
}

/// Result of analysing the first page: its outcome plus the page-count estimate.
pub struct FirstPage {
    pub total_pages: u32,
    pub outcome: PageOutcome,
}

/// Pipeline for one page: clean, whole-word match, validate, extract.
pub fn analyze_page(markup: &str, city: &TargetCity, base: &Url) -> PageOutcome {
    let mut page = Page::parse(markup);
    analyze(&mut page, city, base)
}

/// Same as [`analyze_page`], also estimating pagination on the raw markup.
pub fn analyze_first_page(markup: &str, city: &TargetCity, base: &Url) -> FirstPage {
    let mut page = Page::parse(markup);
    let total_pages = pagination::estimate_pages(&page);
    let outcome = analyze(&mut page, city, base);
    FirstPage {
        total_pages,
        outcome,
    }
}

fn analyze(page: &mut Page, city: &TargetCity, base: &Url) -> PageOutcome {
    clean::strip_search_ui(page);
    let text = page.text();

    if !city.occurs_in(&text) {
        return PageOutcome::NoMention;
    }
    if let Verdict::Rejected(reason) = validate::validate(&text, city) {
        debug!("Page mentions {} but fails validation: {}", city.name(), reason);
        return PageOutcome::Rejected(reason);
    }

    PageOutcome::Matches(extract::extract_occurrences(page, city, base))
}
