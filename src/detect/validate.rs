use std::fmt;

use super::city::{first_postal_code, TargetCity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted { postal_code: String },
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Unmapped city whose name is not in the block.
    CityAbsent,
    NoPostalCode,
    PrefixMismatch { found: String, expected: &'static str },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::CityAbsent => write!(f, "city name absent"),
            RejectReason::NoPostalCode => write!(f, "no postal code"),
            RejectReason::PrefixMismatch { found, expected } => {
                write!(f, "postal code {} outside {}xxx", found, expected)
            }
        }
    }
}

/// Decide whether a text block genuinely refers to the target city.
///
/// Only the first five-digit code of the block is considered. For a city with
/// a known département prefix that code must exist and start with the prefix,
/// which is what separates "Paris 75013" from "Paris Saclay 91190". A city
/// without a known prefix is accepted on name plus any postal code.
pub fn validate(text: &str, city: &TargetCity) -> Verdict {
    let postal = first_postal_code(text);

    match (city.prefix(), postal) {
        (Some(_), None) => Verdict::Rejected(RejectReason::NoPostalCode),
        (Some(expected), Some(code)) if !code.starts_with(expected) => {
            Verdict::Rejected(RejectReason::PrefixMismatch {
                found: code.to_string(),
                expected,
            })
        }
        (Some(_), Some(code)) => Verdict::Accepted {
            postal_code: code.to_string(),
        },
        // Unmapped: any postal code counts, a deliberately looser rule.
        (None, _) if !city.occurs_in(text) => Verdict::Rejected(RejectReason::CityAbsent),
        (None, None) => Verdict::Rejected(RejectReason::NoPostalCode),
        (None, Some(code)) => Verdict::Accepted {
            postal_code: code.to_string(),
        },
    }
}
