use std::collections::HashSet;

use tracing::debug;
use url::Url;

use super::city::TargetCity;
use super::dom::{self, Page};
use super::validate::{validate, Verdict};
use super::Occurrence;

pub const CONTEXT_MAX_CHARS: usize = 400;
const CONTEXT_MIN_CHARS: usize = 10;
/// Characters kept before the city when the context has to be windowed.
const CONTEXT_LEAD_CHARS: usize = 100;
const DEDUP_KEY_CHARS: usize = 100;
pub const MAX_PER_PAGE: usize = 5;

/// Validated occurrences of the city on a cleaned page, deduplicated and capped.
pub fn extract_occurrences(page: &Page, city: &TargetCity, base: &Url) -> Vec<Occurrence> {
    let order = page.elements();
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for container in page.containers_of_text(|t| city.occurs_in(t)) {
        let Some(context) = build_context(&dom::text_of(container), city) else {
            continue;
        };

        let postal_code = match validate(&context, city) {
            Verdict::Accepted { postal_code } => postal_code,
            Verdict::Rejected(reason) => {
                debug!("Rejected candidate ({}): {}", reason, truncate_chars(&context, 80));
                continue;
            }
        };

        let title = dom::nearest_heading(&order, container).unwrap_or_else(|| "Unknown".to_string());
        let link = dom::nearest_anchor(container).and_then(|href| dom::absolute_link(base, href));

        let key = dedup_key(&title, &context);
        if !seen.insert(key) {
            continue;
        }

        out.push(Occurrence {
            title,
            link,
            context,
            postal_code,
        });
        if out.len() == MAX_PER_PAGE {
            break;
        }
    }

    out
}

/// `(title, first 100 chars of context)`.
pub fn dedup_key(title: &str, context: &str) -> (String, String) {
    (title.to_string(), truncate_chars(context, DEDUP_KEY_CHARS))
}

/// Whitespace-collapsed context of at most 400 chars that still contains the
/// city as a whole word; `None` when too short to be useful.
fn build_context(raw: &str, city: &TargetCity) -> Option<String> {
    let collapsed = dom::collapse_whitespace(raw);
    let m = city.find_in(&collapsed)?;
    let start = collapsed[..m.start()].chars().count();
    let end = start + m.as_str().chars().count();

    let skip = if end <= CONTEXT_MAX_CHARS {
        0
    } else {
        start.saturating_sub(CONTEXT_LEAD_CHARS)
    };
    let window: String = collapsed.chars().skip(skip).take(CONTEXT_MAX_CHARS).collect();
    let context = window.trim().to_string();

    (context.chars().count() > CONTEXT_MIN_CHARS).then_some(context)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
