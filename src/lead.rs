//! Heuristic lead extraction from user messages.
//!
//! Pure and stateless: pulls the first email, North-American phone number,
//! self-introduced name, and program-interest keyword out of raw user text.
//! Absence of a match leaves the field unset — extraction never blocks the
//! pipeline and never errors. The organisation's own contact details are
//! excluded so the business never captures itself as a lead.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::OrgConfig;

/// Captured lead fields. All optional; persisted non-empty fields overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadInfo {
    /// Parent or guardian name.
    pub name: Option<String>,
    /// Contact email, lower-cased.
    pub email: Option<String>,
    /// Contact phone in `+1XXXXXXXXXX` form.
    pub phone: Option<String>,
    /// Program interest label from the fixed keyword table.
    pub program_interest: Option<String>,
}

impl LeadInfo {
    /// Whether any field was captured.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.program_interest.is_none()
    }
}

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").expect("hardcoded pattern"));

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b").expect("hardcoded pattern")
});

static NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:(?i)my name is|i am|i'm|this is|call me)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)")
        .expect("hardcoded pattern")
});

/// Keyword-to-label table for program interest. First match wins, so more
/// specific programs come before generic ones.
pub const PROGRAM_KEYWORDS: &[(&str, &str)] = &[
    ("robotics", "Robotics"),
    ("coding", "Coding"),
    ("lego", "LEGO"),
    ("camp", "Camp"),
    ("party", "Birthday Party"),
    ("workshop", "Workshop"),
    ("field trip", "Field Trip"),
    ("after-school", "After-School"),
    ("after school", "After-School"),
];

/// Extract lead fields from one raw user message.
pub fn extract_lead_info(text: &str, org: &OrgConfig) -> LeadInfo {
    let mut info = LeadInfo::default();

    let org_domain = org.domain().to_lowercase();
    if let Some(m) = EMAIL.find(text) {
        let email = m.as_str().trim_end_matches('.').to_lowercase();
        // Never capture the business's own address as a lead.
        if !email.ends_with(&format!("@{org_domain}")) {
            info.email = Some(email);
        }
    }

    let org_phone = org.phone_digits();
    for m in PHONE.find_iter(text) {
        let digits: String = m.as_str().chars().filter(char::is_ascii_digit).collect();
        let normalized = match digits.len() {
            10 => format!("+1{digits}"),
            11 if digits.starts_with('1') => format!("+{digits}"),
            _ => continue,
        };
        if normalized.trim_start_matches("+1") == org_phone {
            continue;
        }
        info.phone = Some(normalized);
        break;
    }

    if let Some(cap) = NAME.captures(text) {
        info.name = Some(cap[1].trim().to_owned());
    }

    let lower = text.to_lowercase();
    for (keyword, label) in PROGRAM_KEYWORDS {
        if lower.contains(keyword) {
            info.program_interest = Some((*label).to_owned());
            break;
        }
    }

    info
}
