use std::sync::LazyLock;

use anyhow::{bail, Result};
use regex::{Match, Regex, RegexBuilder};

static POSTAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b([0-9]{5})\b").unwrap());

/// Two-digit département prefix of genuine postal codes, per city.
const POSTAL_PREFIXES: &[(&str, &str)] = &[
    ("paris", "75"),
    ("lyon", "69"),
    ("marseille", "13"),
    ("toulouse", "31"),
    ("nice", "06"),
    ("nantes", "44"),
    ("strasbourg", "67"),
    ("montpellier", "34"),
    ("bordeaux", "33"),
    ("lille", "59"),
    ("rennes", "35"),
    ("reims", "51"),
    ("grenoble", "38"),
];

/// The city being monitored, with its whole-word matcher.
#[derive(Debug, Clone)]
pub struct TargetCity {
    name: String,
    pattern: Regex,
    prefix: Option<&'static str>,
}

impl TargetCity {
    pub fn new(raw: &str) -> Result<Self> {
        let name = raw.trim().to_lowercase();
        if name.is_empty() {
            bail!("target city is empty");
        }
        let pattern = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(&name)))
            .case_insensitive(true)
            .build()?;
        let prefix = postal_prefix(&name);
        Ok(Self {
            name,
            pattern,
            prefix,
        })
    }

    /// Lower-cased, trimmed name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> Option<&'static str> {
        self.prefix
    }

    /// Whole-word, case-insensitive occurrence anywhere in `text`.
    pub fn occurs_in(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    pub fn find_in<'t>(&self, text: &'t str) -> Option<Match<'t>> {
        self.pattern.find(text)
    }
}

pub fn postal_prefix(city: &str) -> Option<&'static str> {
    POSTAL_PREFIXES
        .iter()
        .find(|(name, _)| *name == city)
        .map(|(_, prefix)| *prefix)
}

/// First standalone five-digit sequence in `text`.
pub fn first_postal_code(text: &str) -> Option<&str> {
    POSTAL_RE.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}
