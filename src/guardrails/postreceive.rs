//! Post-receive guardrail chain.
//!
//! Runs against the model's raw output (and, for the escalation triggers,
//! the user's own text). Unlike the pre-send chain, multiple concerns may
//! co-occur: flags and escalations accumulate across checks. The two
//! corrective/critical rules — enrollment confirmation and PII echo-back —
//! short-circuit with a full rewrite, since a false confirmation or a
//! repeated card number must never reach a user.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::OrgConfig;

use super::presend::{card_sequences, ssn_sequences, COMPETITORS};
use super::{Reason, Severity, Verdict};

// ---------------------------------------------------------------------------
// Enrollment / payment confirmation (critical)
// ---------------------------------------------------------------------------

/// Phrases implying completed enrollment, payment, or reservation. The
/// single highest-stakes rule in the system: a false confirmation is a
/// business and possibly legal liability.
pub const ENROLLMENT_PHRASES: &[&str] = &[
    "you are now enrolled",
    "you're now enrolled",
    "enrollment confirmed",
    "you have been registered",
    "registration complete",
    "payment processed",
    "your payment has been",
    "your spot is reserved",
    "you're all set",
    "enrollment is complete",
];

fn enrollment_redirect(org: &OrgConfig) -> String {
    format!(
        "I can't complete enrollment in chat, but it's easy to finish online! Visit {} or \
         email {} and our team will get you all set up.",
        org.registration_url, org.email
    )
}

// ---------------------------------------------------------------------------
// PII echo-back (critical)
// ---------------------------------------------------------------------------

const PII_SCRUBBED_REPLY: &str = "I've removed sensitive information from my reply. For your \
     security, please never share payment or personal identification numbers in chat — our \
     team collects anything needed securely.";

/// True if the reply repeats any digit sequence (full or last-4) the user
/// shared as a card or SSN.
fn echoes_user_pii(reply: &str, user_text: &str) -> bool {
    let reply_digits: String = reply
        .chars()
        .map(|c| if c.is_ascii_digit() { c } else { ' ' })
        .collect();
    let compact: String = reply.chars().filter(char::is_ascii_digit).collect();

    let mut sequences = card_sequences(user_text);
    sequences.extend(ssn_sequences(user_text));

    sequences.iter().any(|seq| {
        if compact.contains(seq.as_str()) {
            return true;
        }
        let last4 = &seq[seq.len().saturating_sub(4)..];
        reply_digits
            .split_whitespace()
            .any(|run| run == last4 || run.ends_with(last4) && run.len() == seq.len())
    })
}

// ---------------------------------------------------------------------------
// Contact-info accuracy
// ---------------------------------------------------------------------------

static EMAIL_IN_REPLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").expect("hardcoded pattern"));

static PHONE_IN_REPLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(?\d{3}\)?[-.\s]\d{3}[-.\s]?\d{4}").expect("hardcoded pattern")
});

static DOMAIN_IN_REPLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9][a-z0-9-]*\.(?:com|org|net|edu|io)\b").expect("hardcoded pattern")
});

/// Any email, phone, or web domain in the reply that is not the canonical
/// value is a correction candidate.
fn contact_info_mismatch(reply: &str, org: &OrgConfig) -> bool {
    let canonical_email = org.email.to_lowercase();
    for m in EMAIL_IN_REPLY.find_iter(reply) {
        if m.as_str().trim_end_matches('.').to_lowercase() != canonical_email {
            return true;
        }
    }

    let canonical_phone = org.phone_digits();
    for m in PHONE_IN_REPLY.find_iter(reply) {
        let digits: String = m.as_str().chars().filter(char::is_ascii_digit).collect();
        let normalized = digits.strip_prefix('1').unwrap_or(&digits);
        if normalized != canonical_phone {
            return true;
        }
    }

    let lower = reply.to_lowercase();
    for m in DOMAIN_IN_REPLY.find_iter(&lower) {
        let domain = m.as_str();
        let allowed = org
            .allowed_domains
            .iter()
            .any(|d| domain.eq_ignore_ascii_case(d))
            || canonical_email.ends_with(&format!("@{domain}"));
        if !allowed {
            return true;
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Hallucination markers
// ---------------------------------------------------------------------------

static HALLUCINATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Invented street addresses.
        r"\d+\s+\w+\s+(?:street|st\.|avenue|ave\.?,|road|rd\.|boulevard|blvd|drive|suite)",
        // Invented opening hours.
        r"open\s+(?:from\s+)?\d{1,2}(?::\d{2})?\s*(?:am|pm)",
        r"hours\s+are\s+\d{1,2}(?::\d{2})?\s*(?:am|pm)",
        // Invented founding facts.
        r"founded\s+in\s+\d{4}",
        r"in\s+business\s+(?:for\s+)?(?:over\s+)?\d+\s+years",
        // Invented statistics.
        r"\d+%\s+of\s+(?:our\s+)?(?:students|kids|families|parents)",
        // Unconditional guarantees.
        r"\bwe\s+guarantee\b",
        r"\bguaranteed\s+to\b",
        r"\b100%\s+guarantee",
        // Unauthorized discounts.
        r"\d+%\s+(?:off|discount)",
        r"\bfree\s+(?:month|week|class|session)\b",
        r"\bspecial\s+(?:deal|discount|offer)\s+just\s+for\s+you",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("hardcoded pattern"))
    .collect()
});

// ---------------------------------------------------------------------------
// Tone safety
// ---------------------------------------------------------------------------

const HOSTILE_PHRASES: &[&str] = &[
    "calm down",
    "that's not my problem",
    "not my problem",
    "i don't care",
    "you're wrong",
    "that's a stupid",
    "figure it out yourself",
    "don't waste my time",
    "as i already told you",
];

fn apologetic_retry(org: &OrgConfig) -> String {
    format!(
        "I'm sorry — that didn't come out the way it should have. Let me try again: I'm \
         happy to help with any questions about our programs, and if you'd rather talk to a \
         person, our team is at {} or {}.",
        org.email, org.phone
    )
}

// ---------------------------------------------------------------------------
// User-message escalation triggers
// ---------------------------------------------------------------------------

struct EscalationTrigger {
    keywords: &'static [&'static str],
    reason: Reason,
}

static ESCALATION_TRIGGERS: &[EscalationTrigger] = &[
    EscalationTrigger {
        keywords: &["enroll", "sign up", "register", "join"],
        reason: Reason::EnrollmentRequest,
    },
    EscalationTrigger {
        keywords: &[
            "special needs",
            "accommodation",
            "iep",
            "disability",
            "504 plan",
            "autism",
        ],
        reason: Reason::SpecialNeedsInquiry,
    },
    EscalationTrigger {
        keywords: &[
            "complaint",
            "refund",
            "unhappy",
            "disappointed",
            "terrible",
            "worst",
        ],
        reason: Reason::Complaint,
    },
    EscalationTrigger {
        keywords: &["cancel", "cancellation"],
        reason: Reason::CancellationRequest,
    },
    EscalationTrigger {
        keywords: &["billing", "overcharged", "charged twice", "invoice", "double charge"],
        reason: Reason::BillingIssue,
    },
    EscalationTrigger {
        keywords: &[
            "speak to someone",
            "talk to a person",
            "human",
            "real person",
            "manager",
        ],
        reason: Reason::HumanHandoffRequest,
    },
    EscalationTrigger {
        keywords: &[
            "schedule conflict",
            "can't make it",
            "reschedule",
            "change the time",
        ],
        reason: Reason::SchedulingConflict,
    },
    EscalationTrigger {
        keywords: &[
            "partnership",
            "partner with",
            "corporate event",
            "school district",
            "pta",
        ],
        reason: Reason::PartnershipInquiry,
    },
    EscalationTrigger {
        keywords: &[
            "got hurt",
            "injured",
            "incident",
            "unsafe",
            "safety concern",
            "bullied",
        ],
        reason: Reason::SafetyIncident,
    },
    EscalationTrigger {
        keywords: &["journalist", "reporter", "press inquiry", "media inquiry"],
        reason: Reason::MediaInquiry,
    },
];

/// Handoff language the model may already have produced. Connective
/// phrasings only: a bare mention of the team is not an offer to hand off.
const HANDOFF_PHRASES: &[&str] = &[
    "connect you with",
    "let me get someone",
    "have someone reach out",
    "put you in touch",
];

// ---------------------------------------------------------------------------
// Chain entry points
// ---------------------------------------------------------------------------

/// Classify the model's output against the user's text.
///
/// Enrollment confirmation and PII echo-back short-circuit with a rewrite;
/// everything after accumulates flags and escalation signals, with the
/// first escalation reason winning.
pub fn check_escalation(model_text: &str, user_text: &str, org: &OrgConfig) -> Verdict {
    let reply_lower = model_text.to_lowercase();
    let user_lower = user_text.to_lowercase();
    let mut verdict = Verdict::pass();

    // 1. Enrollment / payment confirmation.
    if ENROLLMENT_PHRASES.iter().any(|p| reply_lower.contains(p)) {
        verdict.mark_escalated(Reason::EnrollmentConfirmationDetected);
        verdict.flag(Reason::EnrollmentConfirmationDetected, Severity::High);
        verdict.rewrite_text = Some(enrollment_redirect(org));
        return verdict;
    }

    // 2. PII echo-back.
    if echoes_user_pii(model_text, user_text) {
        verdict.mark_escalated(Reason::PiiEchoDetected);
        verdict.flag(Reason::PiiEchoDetected, Severity::High);
        verdict.rewrite_text = Some(PII_SCRUBBED_REPLY.to_owned());
        return verdict;
    }

    // 3. Contact-info accuracy: corrected block is appended, not replaced.
    if contact_info_mismatch(model_text, org) {
        verdict.flag(Reason::ContactInfoMismatch, Severity::High);
    }

    // 4. Hallucination markers: a human should verify, text is untouched.
    if HALLUCINATION_PATTERNS.iter().any(|p| p.is_match(&reply_lower)) {
        verdict.flag(Reason::HallucinationSuspected, Severity::High);
        verdict.mark_escalated(Reason::HallucinationSuspected);
    }

    // 5. Competitor named in the reply.
    if COMPETITORS.iter().any(|c| reply_lower.contains(c)) {
        verdict.flag(Reason::CompetitorInReply, Severity::Low);
    }

    // 6. Tone safety: full apologetic replacement.
    if HOSTILE_PHRASES.iter().any(|p| reply_lower.contains(p)) {
        verdict.flag(Reason::ToneSafety, Severity::High);
        verdict.mark_escalated(Reason::ToneSafety);
        verdict.rewrite_text = Some(apologetic_retry(org));
    }

    // 7. User-turn escalation triggers, independent of model output.
    for trigger in ESCALATION_TRIGGERS {
        if trigger.keywords.iter().any(|k| user_lower.contains(k)) {
            verdict.mark_escalated(trigger.reason);
            break;
        }
    }

    // 8. The model's own reply offering a handoff is itself a signal.
    if !verdict.escalate && HANDOFF_PHRASES.iter().any(|p| reply_lower.contains(p)) {
        verdict.mark_escalated(Reason::AiSuggestedHandoff);
    }

    verdict
}

/// Maximum characters in a finished reply.
pub const MAX_REPLY_CHARS: usize = 2000;

/// Sentence-boundary truncation will not cut earlier than this.
const MIN_SENTENCE_CUT: usize = 1000;

const MEDICAL_DISCLAIMER: &str =
    "*Please consult your child's pediatrician for specific medical guidance.*";

/// Apply the verdict's corrections and the standard appendices to the
/// model's text, producing the final user-facing reply.
pub fn post_process(
    model_text: &str,
    verdict: &Verdict,
    medical_flagged: bool,
    org: &OrgConfig,
) -> String {
    let mut text = verdict
        .rewrite_text
        .clone()
        .unwrap_or_else(|| model_text.to_owned());

    if verdict.has_flag(Reason::ContactInfoMismatch) && verdict.rewrite_text.is_none() {
        text.push_str(&format!(
            "\n\nThe best ways to reach us directly: {} or {}.",
            org.email, org.phone
        ));
    }

    let lower = text.to_lowercase();
    if medical_flagged && !lower.contains("consult") && !lower.contains("pediatrician") {
        text.push_str("\n\n");
        text.push_str(MEDICAL_DISCLAIMER);
    }

    if verdict.escalate && !contains_handoff_language(&text, org) {
        text.push_str(&format!(
            "\n\nWould you like me to connect you with a team member who can help further? \
             You can reach our team at {} or {}.",
            org.email, org.phone
        ));
    }

    truncate_reply(&text)
}

fn contains_handoff_language(text: &str, org: &OrgConfig) -> bool {
    let lower = text.to_lowercase();
    HANDOFF_PHRASES.iter().any(|p| lower.contains(p))
        || lower.contains(&org.email.to_lowercase())
        || text.contains(&org.phone)
}

/// Hard-truncate a reply over [`MAX_REPLY_CHARS`] at the last sentence
/// boundary before the limit — never mid-word. Ellipsis truncation at the
/// last word boundary is the fallback when no sentence boundary exists past
/// [`MIN_SENTENCE_CUT`].
pub fn truncate_reply(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= MAX_REPLY_CHARS {
        return text.to_owned();
    }

    let window = &chars[..MAX_REPLY_CHARS];
    let sentence_end = window
        .iter()
        .rposition(|c| matches!(c, '.' | '!' | '?'))
        .filter(|idx| *idx >= MIN_SENTENCE_CUT);

    if let Some(idx) = sentence_end {
        return window[..=idx].iter().collect::<String>().trim_end().to_owned();
    }

    // No usable sentence boundary: cut at the last word break and add an
    // ellipsis, keeping the result within the limit.
    let budget = MAX_REPLY_CHARS.saturating_sub(1);
    let cut = chars[..budget]
        .iter()
        .rposition(|c| c.is_whitespace())
        .unwrap_or(budget);
    let mut truncated: String = chars[..cut].iter().collect::<String>().trim_end().to_owned();
    truncated.push('…');
    truncated
}
