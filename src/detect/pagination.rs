use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::dom::{text_of, Page};

static TITLE_PAGES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)page\s+[0-9]+\s+(?:sur|of)\s+([0-9]+)").unwrap());
static RESULTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]+)\s+résultats?").unwrap());
static PAGE_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[?&]page=([0-9]+)").unwrap());

const PAGINATION_SELECTORS: &[&str] = &[
    ".pagination",
    r#"[class*="paging"]"#,
    r#"[class*="pagination"]"#,
    r#"nav[aria-label*="pagination"]"#,
    ".page-numbers",
];

const RESULTS_PER_PAGE: u64 = 20;
const MAX_ESTIMATED_PAGES: u32 = 10;

/// Number of result pages, never less than 1.
///
/// Pagination markup changes between site revisions, so this walks a chain of
/// increasingly indirect signals and takes the first that answers:
/// title ("page 1 sur 4"), pagination widget labels, the "N résultats" count,
/// then `page=N` in link targets.
pub fn estimate_pages(page: &Page) -> u32 {
    let estimate = from_title(page)
        .or_else(|| from_pagination_nav(page))
        .or_else(|| from_results_count(page))
        .unwrap_or_else(|| from_page_links(page));
    estimate.max(1)
}

fn from_title(page: &Page) -> Option<u32> {
    let title = page.title()?;
    let n = TITLE_PAGES_RE.captures(&title)?[1].parse().ok()?;
    debug!("Pagination from title: {} pages", n);
    Some(n)
}

fn from_pagination_nav(page: &Page) -> Option<u32> {
    for selector in PAGINATION_SELECTORS {
        let Some(nav) = page.find_all(selector).into_iter().next() else {
            continue;
        };
        let max = nav
            .descendants()
            .skip(1)
            .filter_map(scraper::ElementRef::wrap)
            .filter(|el| matches!(el.value().name(), "a" | "span" | "button"))
            .filter_map(|el| {
                let label = text_of(el);
                let label = label.trim();
                if !label.is_empty() && label.chars().all(|c| c.is_ascii_digit()) {
                    label.parse::<u32>().ok()
                } else {
                    None
                }
            })
            .max();
        if let Some(n) = max {
            debug!("Pagination from {:?}: {} pages", selector, n);
            return Some(n);
        }
    }
    None
}

fn from_results_count(page: &Page) -> Option<u32> {
    let text = page.text();
    let caps = RESULTS_RE.captures(&text)?;
    // all digits, so a parse failure can only be overflow
    let total: u64 = caps[1].parse().unwrap_or(u64::MAX);
    let pages = total
        .div_ceil(RESULTS_PER_PAGE)
        .min(u64::from(MAX_ESTIMATED_PAGES)) as u32;
    debug!("Pagination from result count {}: {} pages", total, pages);
    Some(pages)
}

fn from_page_links(page: &Page) -> u32 {
    page.find_all("a[href]")
        .iter()
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| PAGE_PARAM_RE.captures(href)?[1].parse::<u32>().ok())
        .max()
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(html: &str) -> u32 {
        estimate_pages(&Page::parse(html))
    }

    #[test]
    fn title_wins() {
        let html = r#"<title>Recherche - Page 2 sur 7</title>
            <ul class="pagination"><li><a>1</a></li><li><a>3</a></li></ul>"#;
        assert_eq!(estimate(html), 7);
        assert_eq!(estimate("<title>page 1 of 4</title>"), 4);
    }

    #[test]
    fn nav_labels_max() {
        let html = r#"<nav class="fr-pagination" aria-label="Pagination">
            <ul><li><a href="?page=1">1</a></li><li><a href="?page=2">2</a></li>
            <li><span>…</span></li><li><a href="?page=12">12</a></li>
            <li><a href="?page=2">Suivant</a></li></ul></nav>"#;
        assert_eq!(estimate(html), 12);
    }

    #[test]
    fn nav_without_numbers_falls_through() {
        let html = r#"<div class="pagination"><a>Suivant</a></div><p>45 résultats</p>"#;
        assert_eq!(estimate(html), 3);
    }

    #[test]
    fn results_count_is_capped() {
        assert_eq!(estimate("<p>41 résultats</p>"), 3);
        assert_eq!(estimate("<p>20 RÉSULTATS</p>"), 1);
        assert_eq!(estimate("<p>1000 résultats</p>"), 10);
        assert_eq!(estimate("<p>1 résultat</p>"), 1);
    }

    #[test]
    fn huge_results_count_hits_the_cap() {
        assert_eq!(estimate("<p>99999999999 résultats</p>"), 10);
        assert_eq!(estimate("<p>123456789012345678901234567890 résultats</p>"), 10);
    }

    #[test]
    fn zero_results_still_one_page() {
        assert_eq!(estimate("<p>0 résultat</p>"), 1);
    }

    #[test]
    fn page_params_in_links() {
        let html = r#"<a href="/tools/42/search?page=2">2</a>
            <a href="/tools/42/search?sort=asc&page=5">5</a>
            <a href="/tools/42/search?frontpage=9">x</a>"#;
        assert_eq!(estimate(html), 5);
    }

    #[test]
    fn no_signal_means_one() {
        assert_eq!(estimate("<html><body><p>Aucun logement</p></body></html>"), 1);
        assert_eq!(estimate(""), 1);
    }
}
