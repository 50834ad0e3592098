use chrono::{DateTime, Local};

use crate::detect::ValidatedMatch;

/// Telegram caps messages at 4096 chars; stay clear of it.
const MESSAGE_BUDGET: usize = 4000;
const CONTEXT_PREVIEW_CHARS: usize = 200;
const TITLE_MAX_CHARS: usize = 200;

/// "saint-étienne" → "Saint-Étienne".
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_html(s).replace('\'', "&#39;").replace('"', "&quot;")
}

/// Render a non-empty result set as one notification payload.
pub fn format_alert(city: &str, matches: &[ValidatedMatch], checked_at: DateTime<Local>) -> String {
    let city = title_case(city);
    let mut message = format!("🏠 <b>CROUS Housing Alert for {}!</b>\n\n", escape_html(&city));
    message.push_str(&format!(
        "Found {} mention(s) of {}:\n\n",
        matches.len(),
        escape_html(&city)
    ));
    let footer = format!("🕐 Checked at: {}", checked_at.format("%Y-%m-%d %H:%M:%S"));

    for (i, m) in matches.iter().enumerate() {
        let entry = format_entry(i + 1, m);
        let remaining = matches.len() - i;
        // room for the "and N more" line
        let reserve = if remaining > 1 { 40 } else { 0 };
        if message.chars().count() + entry.chars().count() + footer.chars().count() + reserve
            > MESSAGE_BUDGET
        {
            message.push_str(&format!("... and {} more\n\n", remaining));
            break;
        }
        message.push_str(&entry);
    }

    message.push_str(&footer);
    message
}

fn format_entry(n: usize, m: &ValidatedMatch) -> String {
    let o = &m.occurrence;
    let preview: String = o.context.chars().take(CONTEXT_PREVIEW_CHARS).collect();
    let title: String = o.title.chars().take(TITLE_MAX_CHARS).collect();
    let mut entry = format!("<b>{}. {}</b>\n", n, escape_html(&title));
    entry.push_str(&format!("📍 {}...\n", escape_html(&preview)));
    if let Some(link) = &o.link {
        entry.push_str(&format!("🔗 <a href='{}'>View Details</a>\n", escape_attr(link)));
    }
    entry.push_str(&format!("📄 Page {}\n\n", m.page_number));
    entry
}

pub fn startup_message(city: &str, max_pages: u32, interval_minutes: f64) -> String {
    let city = escape_html(&title_case(city));
    format!(
        "🤖 <b>CROUS {city} Monitor Started!</b>\n\n\
         Monitoring for {city} with strict postal code validation.\n\
         Scanning up to {max_pages} pages every {interval_minutes} minutes."
    )
}

pub fn stop_message(city: &str) -> String {
    format!(
        "🛑 <b>CROUS {} Monitor Stopped</b>\n\nMonitoring has been stopped.",
        escape_html(&title_case(city))
    )
}

pub fn unexpected_stop_message(city: &str) -> String {
    format!(
        "❌ <b>CROUS {} Monitor Stopped</b>\n\nMonitoring has stopped unexpectedly.",
        escape_html(&title_case(city))
    )
}
