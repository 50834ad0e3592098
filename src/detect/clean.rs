use tracing::debug;

use super::dom::Page;

/// Search widgets and non-content blocks. Layout chrome, navigation and the
/// listings themselves are left alone.
const STRIP_SELECTORS: &[&str] = &[
    ".search-suggestions",
    ".autocomplete",
    ".search-form",
    ".search-bar",
    ".search-input",
    r#"input[type="search"]"#,
    r#"[class*="search-suggestion"]"#,
    r#"[class*="autocomplete"]"#,
    r#"[id*="search-suggestion"]"#,
    r#"[id*="autocomplete"]"#,
    "script",
    "style",
];

/// Strip search UI and script/style blocks in place. Idempotent.
pub fn strip_search_ui(page: &mut Page) -> usize {
    let removed: usize = STRIP_SELECTORS.iter().map(|sel| page.remove_all(sel)).sum();
    if removed > 0 {
        debug!("Stripped {} search/script elements", removed);
    }
    removed
}
