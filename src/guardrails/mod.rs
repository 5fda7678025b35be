//! Deterministic guardrails around every model call.
//!
//! Two ordered rule chains share one verdict contract:
//! - [`presend`] runs against sanitised user text *before* the model is
//!   invoked; the first blocking rule wins, flag-only rules accumulate.
//! - [`postreceive`] runs against the model's raw output (and the user turn)
//!   *after* invocation; it can rewrite the reply, flag escalation, or both.
//!
//! The [`flood`] monitor feeds the pre-send chain with per-session rate
//! state. No rule is ever allowed to fail: every classifier returns a
//! verdict, including a "no match" verdict, so each chain is total.

pub mod flood;
pub mod postreceive;
pub mod presend;

use serde::{Deserialize, Serialize};

/// Stable identifier for the rule that fired. Persisted into message
/// metadata and conversation escalation reasons, so variants are append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    // Pre-send blocking rules.
    /// Session exceeded the rolling message-rate ceiling.
    FloodDetected,
    /// Empty, repeated-character, or mostly non-alphanumeric input.
    GarbageInput,
    /// Instruction-override, role-reassignment, or jailbreak phrasing.
    PromptInjection,
    /// Payment-card-shaped digit sequence with a known issuer prefix.
    CreditCardDetected,
    /// SSN-shaped digit sequence passing the validity range check.
    SsnDetected,
    /// Bank account or routing number phrasing.
    BankInfoDetected,
    /// Password or credential sharing phrasing.
    CredentialSharing,
    /// Violent content.
    InappropriateViolence,
    /// Self-harm content (refusal carries a crisis-line referral).
    InappropriateSelfHarm,
    /// Sexual content.
    InappropriateSexual,
    /// Drug references.
    InappropriateDrugs,
    /// Hate speech.
    InappropriateHate,
    /// Direct threats or profanity.
    AbusiveLanguage,
    /// URL pointing outside the allow-listed domains, or unparseable.
    SuspiciousUrl,

    // Pre-send flag-only rules.
    /// Date-of-birth disclosure; stored as an age range, never the date.
    DobShared,
    /// Off-topic drift or competitor mention in the user turn.
    OffTopic,
    /// Competitor named in the user turn.
    CompetitorMention,
    /// Medical keyword; reply gets a disclaimer if the model omits one.
    MedicalKeyword,

    // Post-receive corrective / escalation rules.
    /// Reply implied completed enrollment, payment, or reservation.
    EnrollmentConfirmationDetected,
    /// Reply echoed card or SSN digits the user shared.
    PiiEchoDetected,
    /// Reply carried contact details that are not the canonical ones.
    ContactInfoMismatch,
    /// Reply contained fabricated specifics a human should verify.
    HallucinationSuspected,
    /// Reply named a known competitor.
    CompetitorInReply,
    /// Reply was dismissive or hostile.
    ToneSafety,

    // User-turn escalation triggers.
    /// User wants to enroll or register.
    EnrollmentRequest,
    /// Special-needs or accommodation question.
    SpecialNeedsInquiry,
    /// Complaint or refund request.
    Complaint,
    /// Cancellation request.
    CancellationRequest,
    /// Billing issue.
    BillingIssue,
    /// Explicit request for a human.
    HumanHandoffRequest,
    /// Scheduling conflict.
    SchedulingConflict,
    /// School or corporate partnership inquiry.
    PartnershipInquiry,
    /// Safety concern or incident report.
    SafetyIncident,
    /// Press or media inquiry.
    MediaInquiry,
    /// The model's own reply offered to hand off to a team member.
    AiSuggestedHandoff,
}

impl Reason {
    /// Stable string form used in metadata and escalation reasons.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FloodDetected => "flood_detected",
            Self::GarbageInput => "garbage_input",
            Self::PromptInjection => "prompt_injection",
            Self::CreditCardDetected => "credit_card_detected",
            Self::SsnDetected => "ssn_detected",
            Self::BankInfoDetected => "bank_info_detected",
            Self::CredentialSharing => "credential_sharing",
            Self::InappropriateViolence => "inappropriate_violence",
            Self::InappropriateSelfHarm => "inappropriate_self_harm",
            Self::InappropriateSexual => "inappropriate_sexual",
            Self::InappropriateDrugs => "inappropriate_drugs",
            Self::InappropriateHate => "inappropriate_hate",
            Self::AbusiveLanguage => "abusive_language",
            Self::SuspiciousUrl => "suspicious_url",
            Self::DobShared => "dob_shared",
            Self::OffTopic => "off_topic",
            Self::CompetitorMention => "competitor_mention",
            Self::MedicalKeyword => "medical_keyword",
            Self::EnrollmentConfirmationDetected => "enrollment_confirmation_detected",
            Self::PiiEchoDetected => "pii_echo_detected",
            Self::ContactInfoMismatch => "contact_info_mismatch",
            Self::HallucinationSuspected => "hallucination_suspected",
            Self::CompetitorInReply => "competitor_in_reply",
            Self::ToneSafety => "tone_safety",
            Self::EnrollmentRequest => "enrollment_request",
            Self::SpecialNeedsInquiry => "special_needs_inquiry",
            Self::Complaint => "complaint",
            Self::CancellationRequest => "cancellation_request",
            Self::BillingIssue => "billing_issue",
            Self::HumanHandoffRequest => "human_handoff_request",
            Self::SchedulingConflict => "scheduling_conflict",
            Self::PartnershipInquiry => "partnership_inquiry",
            Self::SafetyIncident => "safety_incident",
            Self::MediaInquiry => "media_inquiry",
            Self::AiSuggestedHandoff => "ai_suggested_handoff",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How urgently a flagged concern should be reviewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, logged but not blocking.
    Low,
    /// Needs human follow-up.
    High,
}

/// The in-memory result of running a guardrail chain. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct Verdict {
    /// Halts the pipeline and substitutes [`Verdict::reply`] verbatim.
    /// A blocked verdict and a model invocation are mutually exclusive.
    pub blocked: bool,
    /// Marks the conversation for human follow-up.
    pub escalate: bool,
    /// Which rule fired first (block or first escalation trigger).
    pub reason: Option<Reason>,
    /// Canned user-facing reply substituted when blocked.
    pub reply: Option<String>,
    /// Replaces the model's output verbatim when set.
    pub rewrite_text: Option<String>,
    /// Non-blocking signals accumulated along the chain.
    pub flags: Vec<(Reason, Severity)>,
}

impl Verdict {
    /// A verdict that lets the text pass untouched.
    pub fn pass() -> Self {
        Self::default()
    }

    /// A blocking verdict with its canned user-facing reply.
    pub fn block(reason: Reason, reply: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason),
            reply: Some(reply.into()),
            ..Self::default()
        }
    }

    /// Whether any non-blocking flag was raised.
    pub fn flagged(&self) -> bool {
        !self.flags.is_empty()
    }

    /// Whether a specific flag was raised.
    pub fn has_flag(&self, reason: Reason) -> bool {
        self.flags.iter().any(|(r, _)| *r == reason)
    }

    /// Record a non-blocking flag.
    pub fn flag(&mut self, reason: Reason, severity: Severity) {
        if !self.has_flag(reason) {
            self.flags.push((reason, severity));
        }
    }

    /// Record an escalation; the first reason recorded wins.
    pub fn mark_escalated(&mut self, reason: Reason) {
        self.escalate = true;
        if self.reason.is_none() {
            self.reason = Some(reason);
        }
    }
}

/// Outcome of a single classifier in the pre-send chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// No match; the chain continues.
    Pass,
    /// Decisive match: stop the chain and answer with the canned reply.
    Block {
        /// Which rule fired.
        reason: Reason,
        /// Canned user-facing refusal.
        reply: String,
    },
    /// Non-decisive match carried forward as an annotation.
    Flag {
        /// Which rule fired.
        reason: Reason,
        /// Review urgency.
        severity: Severity,
    },
}
