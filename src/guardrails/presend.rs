//! Pre-send guardrail chain.
//!
//! An ordered sequence of independent classifiers run against sanitised user
//! text before the model is invoked. The chain is data: a fixed-priority
//! list of pure rule functions sharing one contract, executed by a fold that
//! stops at the first blocking result but accumulates flag-only results.
//! Each rule's pattern set, reason code, and canned refusal live together.

use std::sync::LazyLock;

use chrono::{Datelike, Utc};
use regex::Regex;
use url::Url;

use super::flood::{FloodMonitor, FLOOD_REPLY};
use super::{Reason, RuleOutcome, Severity, Verdict};

// ---------------------------------------------------------------------------
// Canned refusals
// ---------------------------------------------------------------------------

const GARBAGE_REPLY: &str =
    "I didn't quite catch that — could you rephrase your question about our programs?";

const INJECTION_REPLY: &str =
    "I'm here to help with our STEAM programs! What would you like to know?";

const CARD_REPLY: &str = "For your security, please don't share payment card information in \
     chat. Our team will collect payment details securely when you're ready to enroll. Would \
     you like me to connect you with someone?";

const SSN_REPLY: &str = "For your privacy, please don't share sensitive personal \
     identification numbers in chat. Is there something else I can help you with?";

const BANK_REPLY: &str = "Please don't share bank account details in chat. Our team handles \
     all payment setup securely. Can I help with anything else?";

const CREDENTIAL_REPLY: &str = "Please don't share passwords or login credentials in chat — \
     I'll never ask for them. What else can I help you with?";

const VIOLENCE_REPLY: &str = "I can't help with that topic. I'm here to talk about our \
     hands-on STEAM programs for kids — want to hear about those?";

const SELF_HARM_REPLY: &str = "I'm not able to help with that, but you don't have to go \
     through it alone. You can call or text 988 (Suicide & Crisis Lifeline) any time to talk \
     with someone who can help.";

const SEXUAL_REPLY: &str = "That's not something I can discuss here. I'm happy to answer \
     questions about our programs for kids!";

const DRUGS_REPLY: &str = "That's not a topic I can help with. Is there anything about our \
     programs I can answer?";

const HATE_REPLY: &str = "We keep this a welcoming space for every family. I'm happy to help \
     with questions about our programs.";

const ABUSE_REPLY: &str = "Let's keep things friendly! I'm happy to help with any questions \
     about our programs.";

const URL_REPLY: &str = "I can't open links shared in chat. If you have a question about our \
     programs, just ask and I'll do my best to help!";

// ---------------------------------------------------------------------------
// Chain definition
// ---------------------------------------------------------------------------

/// Input shared by every rule in the chain.
#[derive(Debug)]
pub struct RuleInput<'a> {
    /// Sanitised user text.
    pub text: &'a str,
    /// Lower-cased copy, computed once.
    pub lower: &'a str,
    /// Hostnames user links are allowed to point at.
    pub allowed_domains: &'a [String],
}

/// One classifier in the chain.
pub struct PreSendRule {
    /// Stable rule name, for logs and table-driven tests.
    pub name: &'static str,
    /// The classifier itself. Must be total: never panics, never errors.
    pub check: fn(&RuleInput<'_>) -> RuleOutcome,
}

/// The chain in fixed priority order. Flood runs separately first because it
/// needs session state; everything here is pure text classification.
pub static PRE_SEND_RULES: &[PreSendRule] = &[
    PreSendRule {
        name: "garbage_input",
        check: check_garbage,
    },
    PreSendRule {
        name: "prompt_injection",
        check: check_injection,
    },
    PreSendRule {
        name: "credit_card",
        check: check_credit_card,
    },
    PreSendRule {
        name: "ssn",
        check: check_ssn,
    },
    PreSendRule {
        name: "bank_info",
        check: check_bank_info,
    },
    PreSendRule {
        name: "credential_sharing",
        check: check_credentials,
    },
    PreSendRule {
        name: "dob_disclosure",
        check: check_dob,
    },
    PreSendRule {
        name: "age_inappropriate",
        check: check_inappropriate,
    },
    PreSendRule {
        name: "abuse",
        check: check_abuse,
    },
    PreSendRule {
        name: "url_allowlist",
        check: check_urls,
    },
    PreSendRule {
        name: "off_topic",
        check: check_off_topic,
    },
    PreSendRule {
        name: "medical",
        check: check_medical,
    },
];

/// Run the full pre-send chain for one inbound message.
///
/// The flood check records the message first (its timestamp counts even when
/// later rules block). The remaining rules run in priority order: the first
/// block wins, flags accumulate, and a chain with only flag hits returns an
/// unblocked verdict carrying them forward as context hints.
pub fn apply_guardrails(
    text: &str,
    session_id: &str,
    flood: &FloodMonitor,
    allowed_domains: &[String],
) -> Verdict {
    if flood.record(session_id) {
        return Verdict::block(Reason::FloodDetected, FLOOD_REPLY);
    }

    let lower = text.to_lowercase();
    let input = RuleInput {
        text,
        lower: &lower,
        allowed_domains,
    };

    let mut verdict = Verdict::pass();
    for rule in PRE_SEND_RULES {
        match (rule.check)(&input) {
            RuleOutcome::Pass => {}
            RuleOutcome::Block { reason, reply } => {
                let mut blocked = Verdict::block(reason, reply);
                blocked.flags = verdict.flags;
                return blocked;
            }
            RuleOutcome::Flag { reason, severity } => verdict.flag(reason, severity),
        }
    }
    verdict
}

// ---------------------------------------------------------------------------
// Rule: garbage / empty input
// ---------------------------------------------------------------------------

fn check_garbage(input: &RuleInput<'_>) -> RuleOutcome {
    let text = input.text;
    let block = || RuleOutcome::Block {
        reason: Reason::GarbageInput,
        reply: GARBAGE_REPLY.to_owned(),
    };

    if text.is_empty() {
        return block();
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() == 1 && !chars[0].is_alphanumeric() {
        return block();
    }

    // 16+ repeated identical characters anywhere.
    let mut run = 1usize;
    for pair in chars.windows(2) {
        run = if pair[0] == pair[1] {
            run.saturating_add(1)
        } else {
            1
        };
        if run >= 16 {
            return block();
        }
    }

    // Over 10 chars with under 20% alphanumeric-plus-space content.
    if chars.len() > 10 {
        let meaningful = chars
            .iter()
            .filter(|c| c.is_alphanumeric() || **c == ' ')
            .count();
        if meaningful.saturating_mul(5) < chars.len() {
            return block();
        }
    }

    RuleOutcome::Pass
}

// ---------------------------------------------------------------------------
// Rule: prompt injection / jailbreak
// ---------------------------------------------------------------------------

static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Instruction override.
        r"ignore\s+(?:all\s+|the\s+)?(?:previous|prior|above|your)\s+(?:instructions|rules|prompts?)",
        r"disregard\s+(?:all\s+|the\s+)?(?:previous|prior|above|your)\s+(?:instructions|rules)",
        r"forget\s+(?:all\s+|everything\s+)?(?:you|your)\s+(?:were told|instructions|rules)",
        // Role reassignment.
        r"you\s+are\s+now\s+(?:a|an|the)\b",
        r"pretend\s+(?:to\s+be|you(?:'re|\s+are))",
        r"act\s+as\s+(?:if\s+you|a|an)\b",
        r"roleplay\s+as\b",
        // Delimiter / context escape.
        r"\[\s*system\s*\]",
        r"#{2,}\s*system",
        r"```\s*system",
        r"<\s*system\s*>",
        // Named jailbreaks.
        r"\bdan\s+mode\b",
        r"\bdo\s+anything\s+now\b",
        r"\bdeveloper\s+mode\b",
        r"\bgod\s+mode\b",
        r"\bjailbreak\b",
        // Filter bypass.
        r"bypass\s+(?:your\s+|the\s+)?(?:filters?|restrictions?|rules|safety)",
        r"without\s+(?:any\s+)?(?:filters?|restrictions?|limitations?)",
        r"(?:reveal|show|print)\s+(?:me\s+)?your\s+(?:system\s+)?(?:prompt|instructions)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("hardcoded pattern"))
    .collect()
});

fn check_injection(input: &RuleInput<'_>) -> RuleOutcome {
    for pattern in INJECTION_PATTERNS.iter() {
        if pattern.is_match(input.lower) {
            return RuleOutcome::Block {
                reason: Reason::PromptInjection,
                reply: INJECTION_REPLY.to_owned(),
            };
        }
    }
    RuleOutcome::Pass
}

// ---------------------------------------------------------------------------
// Rule: payment cards
// ---------------------------------------------------------------------------

static CARD_CANDIDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d(?:[\s-]?\d){12,18}").expect("hardcoded pattern"));

/// Major issuer prefix check on a separator-stripped digit string.
fn has_card_prefix(digits: &str) -> bool {
    let two: u32 = digits.get(..2).and_then(|s| s.parse().ok()).unwrap_or(0);
    let four: u32 = digits.get(..4).and_then(|s| s.parse().ok()).unwrap_or(0);
    digits.starts_with('4')                    // Visa
        || (51..=55).contains(&two)            // Mastercard classic
        || (2221..=2720).contains(&four)       // Mastercard 2-series
        || two == 34 || two == 37              // Amex
        || four == 6011 || two == 65 // Discover
}

/// All card-shaped digit sequences (13–16 digits, optional separators,
/// known issuer prefix) in the text, separator-stripped.
pub fn card_sequences(text: &str) -> Vec<String> {
    CARD_CANDIDATE
        .find_iter(text)
        .filter_map(|m| {
            let digits: String = m.as_str().chars().filter(char::is_ascii_digit).collect();
            ((13..=16).contains(&digits.len()) && has_card_prefix(&digits)).then_some(digits)
        })
        .collect()
}

/// Detect a card-shaped digit sequence anywhere in the text.
pub fn contains_card_number(text: &str) -> bool {
    !card_sequences(text).is_empty()
}

fn check_credit_card(input: &RuleInput<'_>) -> RuleOutcome {
    if contains_card_number(input.text) {
        return RuleOutcome::Block {
            reason: Reason::CreditCardDetected,
            reply: CARD_REPLY.to_owned(),
        };
    }
    RuleOutcome::Pass
}

// ---------------------------------------------------------------------------
// Rule: SSN
// ---------------------------------------------------------------------------

static SSN_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{3})-?(\d{2})-?(\d{4})\b").expect("hardcoded pattern"));

/// All SSN-shaped sequences passing the basic validity range check (area
/// 1–899 excluding 666, non-zero group and serial), digits only.
///
/// Known heuristic: legitimately-formatted strings (phone extensions, order
/// numbers) can pass this check, and real SSNs typed with unusual separators
/// are missed. The acceptance range is deliberate — do not tighten it
/// without product input.
pub fn ssn_sequences(text: &str) -> Vec<String> {
    SSN_SHAPE
        .captures_iter(text)
        .filter_map(|cap| {
            let area: u32 = cap[1].parse().unwrap_or(0);
            let group: u32 = cap[2].parse().unwrap_or(0);
            let serial: u32 = cap[3].parse().unwrap_or(0);
            let valid = (1..=899).contains(&area) && area != 666 && group != 0 && serial != 0;
            valid.then(|| format!("{}{}{}", &cap[1], &cap[2], &cap[3]))
        })
        .collect()
}

/// Detect a validity-checked SSN-shaped sequence anywhere in the text.
pub fn contains_ssn(text: &str) -> bool {
    !ssn_sequences(text).is_empty()
}

fn check_ssn(input: &RuleInput<'_>) -> RuleOutcome {
    if contains_ssn(input.text) {
        return RuleOutcome::Block {
            reason: Reason::SsnDetected,
            reply: SSN_REPLY.to_owned(),
        };
    }
    RuleOutcome::Pass
}

// ---------------------------------------------------------------------------
// Rule: bank info and credential sharing
// ---------------------------------------------------------------------------

const BANK_PHRASES: &[&str] = &[
    "routing number",
    "bank account number",
    "account number is",
    "wire transfer to",
    "iban",
    "swift code",
];

fn check_bank_info(input: &RuleInput<'_>) -> RuleOutcome {
    if BANK_PHRASES.iter().any(|p| input.lower.contains(p)) {
        return RuleOutcome::Block {
            reason: Reason::BankInfoDetected,
            reply: BANK_REPLY.to_owned(),
        };
    }
    RuleOutcome::Pass
}

const CREDENTIAL_PHRASES: &[&str] = &[
    "my password is",
    "password is ",
    "my pin is",
    "login credentials",
    "my username and password",
    "api key is",
];

fn check_credentials(input: &RuleInput<'_>) -> RuleOutcome {
    if CREDENTIAL_PHRASES.iter().any(|p| input.lower.contains(p)) {
        return RuleOutcome::Block {
            reason: Reason::CredentialSharing,
            reply: CREDENTIAL_REPLY.to_owned(),
        };
    }
    RuleOutcome::Pass
}

// ---------------------------------------------------------------------------
// Rule: date-of-birth disclosure (flag, not block)
// ---------------------------------------------------------------------------

static DOB_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:date of birth|born on|birthday is|\bdob\b)").expect("hardcoded pattern")
});

fn check_dob(input: &RuleInput<'_>) -> RuleOutcome {
    if DOB_PATTERN.is_match(input.lower) {
        // Annotated so the record stores only an age range, never the date.
        return RuleOutcome::Flag {
            reason: Reason::DobShared,
            severity: Severity::Low,
        };
    }
    RuleOutcome::Pass
}

static DATE_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d{1,2}[/.-]\d{1,2}[/.-]\d{2,4}\b|\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?(?:,?\s+\d{4})?\b",
    )
    .expect("hardcoded pattern")
});

static FOUR_DIGIT_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("hardcoded pattern"));

/// Replace every date-shaped token with an age range (when a plausible birth
/// year is present) or a removal marker. Run on the user turn whenever the
/// chain flags [`Reason::DobShared`], so the conversation record keeps an age
/// range and never the exact date.
pub fn redact_dob(text: &str) -> String {
    DATE_SHAPE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let year = FOUR_DIGIT_YEAR
                .find(&caps[0])
                .and_then(|m| m.as_str().parse::<i32>().ok());
            match year {
                Some(y) => {
                    let age = Utc::now().year().saturating_sub(y);
                    if (0..=120).contains(&age) {
                        format!("[age {}-{}]", age.saturating_sub(1), age)
                    } else {
                        "[date removed]".to_owned()
                    }
                }
                None => "[date removed]".to_owned(),
            }
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Rule: age-inappropriate content
// ---------------------------------------------------------------------------

struct ContentCategory {
    patterns: &'static [&'static str],
    reason: Reason,
    reply: &'static str,
}

/// Self-harm is listed first so its crisis-line referral wins over the
/// generic violence refusal when both pattern sets match.
static CONTENT_CATEGORIES: &[ContentCategory] = &[
    ContentCategory {
        patterns: &[
            "kill myself",
            "hurt myself",
            "end my life",
            "self harm",
            "self-harm",
            "suicide",
            "cutting myself",
            "want to die",
        ],
        reason: Reason::InappropriateSelfHarm,
        reply: SELF_HARM_REPLY,
    },
    ContentCategory {
        patterns: &[
            "kill someone",
            "how to kill",
            "murder",
            "shoot up",
            "build a bomb",
            "make a weapon",
            "hurt him",
            "hurt her",
            "beat up",
        ],
        reason: Reason::InappropriateViolence,
        reply: VIOLENCE_REPLY,
    },
    ContentCategory {
        patterns: &["porn", "nude", "naked", "sexual", "explicit photos", "send pics"],
        reason: Reason::InappropriateSexual,
        reply: SEXUAL_REPLY,
    },
    ContentCategory {
        patterns: &[
            "marijuana", "cocaine", "heroin", "fentanyl", "get high", "buy drugs", "vape",
        ],
        reason: Reason::InappropriateDrugs,
        reply: DRUGS_REPLY,
    },
    ContentCategory {
        patterns: &[
            "racial slur",
            "white power",
            "go back to your country",
            "i hate immigrants",
            "those people don't belong",
        ],
        reason: Reason::InappropriateHate,
        reply: HATE_REPLY,
    },
];

fn check_inappropriate(input: &RuleInput<'_>) -> RuleOutcome {
    for category in CONTENT_CATEGORIES {
        if category.patterns.iter().any(|p| input.lower.contains(p)) {
            return RuleOutcome::Block {
                reason: category.reason,
                reply: category.reply.to_owned(),
            };
        }
    }
    RuleOutcome::Pass
}

// ---------------------------------------------------------------------------
// Rule: abuse and threats
// ---------------------------------------------------------------------------

static THREAT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"i(?:'ll| will)\s+(?:kill|hurt|find|come for)\s+you",
        r"you(?:'ll| will)\s+(?:regret|pay for)\s+this",
        r"watch\s+your\s+back",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("hardcoded pattern"))
    .collect()
});

const PROFANITY: &[&str] = &[
    "fuck", "shit", "bitch", "asshole", "bastard", "dickhead", "piss off",
];

fn check_abuse(input: &RuleInput<'_>) -> RuleOutcome {
    let threat = THREAT_PATTERNS.iter().any(|p| p.is_match(input.lower));
    let profane = PROFANITY.iter().any(|p| input.lower.contains(p));
    if threat || profane {
        return RuleOutcome::Block {
            reason: Reason::AbusiveLanguage,
            reply: ABUSE_REPLY.to_owned(),
        };
    }
    RuleOutcome::Pass
}

// ---------------------------------------------------------------------------
// Rule: URL allow-list
// ---------------------------------------------------------------------------

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"]+"#).expect("hardcoded pattern")
});

fn host_allowed(host: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|domain| {
        let domain = domain.to_lowercase();
        host == domain || host.ends_with(&format!(".{domain}"))
    })
}

fn check_urls(input: &RuleInput<'_>) -> RuleOutcome {
    let block = || RuleOutcome::Block {
        reason: Reason::SuspiciousUrl,
        reply: URL_REPLY.to_owned(),
    };

    for m in URL_PATTERN.find_iter(input.text) {
        let raw = m.as_str().trim_end_matches(['.', ',', ')', '!', '?']);
        let with_scheme = if raw.to_lowercase().starts_with("www.") {
            format!("https://{raw}")
        } else {
            raw.to_owned()
        };
        match Url::parse(&with_scheme) {
            Ok(url) => {
                let host = url.host_str().unwrap_or("").to_lowercase();
                if !host_allowed(&host, input.allowed_domains) {
                    return block();
                }
            }
            // A link we cannot parse is a link we cannot vet: fail closed.
            Err(_) => return block(),
        }
    }
    RuleOutcome::Pass
}

// ---------------------------------------------------------------------------
// Rule: off-topic / competitor mention (flag, not block)
// ---------------------------------------------------------------------------

/// Known education and voice-assistant competitors. Hard-coded phrase set;
/// promote to config if the competitive set starts changing often.
pub const COMPETITORS: &[&str] = &[
    "code ninjas",
    "snapology",
    "mad science",
    "bricks 4 kidz",
    "engineering for kids",
    "sylvan learning",
    "chatgpt",
    "alexa",
    "siri",
];

const OFF_TOPIC_PHRASES: &[&str] = &[
    "politics",
    "election",
    "who did you vote",
    "religion",
    "controversial",
];

fn check_off_topic(input: &RuleInput<'_>) -> RuleOutcome {
    if COMPETITORS.iter().any(|c| input.lower.contains(c)) {
        // Carried as a context hint: steer back on-topic without
        // disparaging the competitor.
        return RuleOutcome::Flag {
            reason: Reason::CompetitorMention,
            severity: Severity::Low,
        };
    }
    if OFF_TOPIC_PHRASES.iter().any(|p| input.lower.contains(p)) {
        return RuleOutcome::Flag {
            reason: Reason::OffTopic,
            severity: Severity::Low,
        };
    }
    RuleOutcome::Pass
}

// ---------------------------------------------------------------------------
// Rule: medical keywords (flag, not block)
// ---------------------------------------------------------------------------

const MEDICAL_KEYWORDS: &[&str] = &[
    "diagnosis",
    "medication",
    "prescription",
    "medical condition",
    "adhd medication",
    "dosage",
    "treatment plan",
    "medical advice",
    "should i give my child",
    "is it safe to",
];

fn check_medical(input: &RuleInput<'_>) -> RuleOutcome {
    if MEDICAL_KEYWORDS.iter().any(|k| input.lower.contains(k)) {
        return RuleOutcome::Flag {
            reason: Reason::MedicalKeyword,
            severity: Severity::Low,
        };
    }
    RuleOutcome::Pass
}
