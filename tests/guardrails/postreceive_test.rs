//! Post-receive chain: escalation classification and reply post-processing.

use guardpost::config::OrgConfig;
use guardpost::guardrails::postreceive::{
    check_escalation, post_process, truncate_reply, ENROLLMENT_PHRASES, MAX_REPLY_CHARS,
};
use guardpost::guardrails::{Reason, Verdict};

fn org() -> OrgConfig {
    OrgConfig::default()
}

// --- enrollment confirmation ------------------------------------------------

#[test]
fn every_enrollment_phrase_triggers_a_rewrite() {
    for phrase in ENROLLMENT_PHRASES {
        let reply = format!("Great news — {phrase}!");
        let verdict = check_escalation(&reply, "thanks", &org());
        assert!(verdict.escalate, "no escalation for {phrase:?}");
        assert_eq!(
            verdict.reason,
            Some(Reason::EnrollmentConfirmationDetected)
        );
        let rewrite = verdict.rewrite_text.unwrap_or_default();
        assert!(
            rewrite.contains(&org().registration_url),
            "rewrite for {phrase:?} should point at registration"
        );
    }
}

#[test]
fn the_rewrite_replaces_the_reply_entirely() {
    let verdict = check_escalation("You're all set, see you Monday!", "ok", &org());
    let out = post_process("You're all set, see you Monday!", &verdict, false, &org());
    assert!(!out.contains("see you Monday"));
    assert!(out.contains(&org().registration_url));
}

// --- pii echo-back ----------------------------------------------------------

#[test]
fn echoed_card_number_is_scrubbed() {
    let user = "my card is 4111 1111 1111 1111";
    let reply = "Thanks! I've noted card 4111111111111111 for you.";
    let verdict = check_escalation(reply, user, &org());
    assert!(verdict.escalate);
    assert!(verdict.has_flag(Reason::PiiEchoDetected));
    assert!(verdict.rewrite_text.is_some());
}

#[test]
fn echoed_last_four_is_scrubbed() {
    let user = "card number 4111 1111 1111 1234 please";
    let reply = "Got it, the card ending in 1234.";
    let verdict = check_escalation(reply, user, &org());
    assert!(verdict.has_flag(Reason::PiiEchoDetected));
}

#[test]
fn unrelated_digits_are_not_treated_as_pii_echo() {
    let user = "my card is 4111 1111 1111 1111";
    let reply = "Camps run from June 20 to August 15.";
    let verdict = check_escalation(reply, user, &org());
    assert!(!verdict.has_flag(Reason::PiiEchoDetected));
}

// --- contact info accuracy --------------------------------------------------

#[test]
fn wrong_contact_details_get_a_correction_appendix() {
    let reply = "You can email us at hello@steamjourney.net anytime.";
    let verdict = check_escalation(reply, "how do i reach you", &org());
    assert!(verdict.has_flag(Reason::ContactInfoMismatch));

    let out = post_process(reply, &verdict, false, &org());
    assert!(out.contains(&org().email));
}

#[test]
fn canonical_contact_details_pass() {
    let reply = format!("Reach us at {} or {}.", org().email, org().phone);
    let verdict = check_escalation(&reply, "how do i reach you", &org());
    assert!(!verdict.has_flag(Reason::ContactInfoMismatch));
}

// --- hallucination markers --------------------------------------------------

#[test]
fn invented_facts_escalate_for_review() {
    let cases = [
        "We were founded in 2009.",
        "We're open from 9am to 5pm.",
        "95% of our students love it.",
        "We guarantee your child will learn to code.",
        "Here's a 20% discount just for asking!",
    ];
    for reply in cases {
        let verdict = check_escalation(reply, "tell me more", &org());
        assert!(
            verdict.has_flag(Reason::HallucinationSuspected),
            "not flagged: {reply:?}"
        );
        assert!(verdict.escalate);
        // Text is never rewritten for hallucination alone.
        assert!(verdict.rewrite_text.is_none());
    }
}

// --- tone safety ------------------------------------------------------------

#[test]
fn hostile_tone_is_replaced_with_an_apology() {
    let verdict = check_escalation("Calm down, I already told you.", "why!!", &org());
    assert!(verdict.has_flag(Reason::ToneSafety));
    let rewrite = verdict.rewrite_text.unwrap_or_default();
    assert!(rewrite.contains("sorry"));
    assert!(rewrite.contains(&org().email));
}

// --- user-message triggers --------------------------------------------------

#[test]
fn enrollment_intent_in_user_text_escalates() {
    let verdict = check_escalation(
        "Our robotics club meets weekly.",
        "I want to enroll my daughter",
        &org(),
    );
    assert!(verdict.escalate);
    assert_eq!(verdict.reason, Some(Reason::EnrollmentRequest));
}

#[test]
fn first_matching_trigger_wins() {
    // Both enrollment ("sign up") and billing ("invoice") appear; the
    // trigger table is ordered, so enrollment is the recorded reason.
    let verdict = check_escalation(
        "Happy to help.",
        "I'd like to sign up but my last invoice was wrong",
        &org(),
    );
    assert_eq!(verdict.reason, Some(Reason::EnrollmentRequest));
}

#[test]
fn special_needs_and_safety_inquiries_escalate() {
    let special = check_escalation("Sure.", "my son has an IEP, can he attend?", &org());
    assert_eq!(special.reason, Some(Reason::SpecialNeedsInquiry));

    let safety = check_escalation("Sure.", "my daughter got hurt at camp", &org());
    assert_eq!(safety.reason, Some(Reason::SafetyIncident));
}

#[test]
fn model_offering_a_handoff_is_itself_a_signal() {
    let verdict = check_escalation(
        "Let me connect you with our team member who handles that.",
        "what about field trips for schools",
        &org(),
    );
    assert!(verdict.escalate);
}

#[test]
fn a_bare_team_mention_is_not_a_handoff_signal() {
    let verdict = check_escalation(
        "Our team members love robotics too!",
        "do the instructors like robots?",
        &org(),
    );
    assert!(!verdict.escalate);
}

#[test]
fn benign_exchange_does_not_escalate() {
    let verdict = check_escalation(
        "Our robotics club is for ages 5-12.",
        "what ages is robotics for?",
        &org(),
    );
    assert!(!verdict.escalate);
    assert!(!verdict.blocked);
    assert!(verdict.rewrite_text.is_none());
}

// --- post-processing --------------------------------------------------------

#[test]
fn escalated_replies_get_a_handoff_invitation() {
    let mut verdict = Verdict::pass();
    verdict.mark_escalated(Reason::Complaint);
    let out = post_process("I understand that's frustrating.", &verdict, false, &org());
    assert!(out.contains("team member"));
    assert!(out.contains(&org().email));
}

#[test]
fn no_duplicate_invitation_when_handoff_already_present() {
    let mut verdict = Verdict::pass();
    verdict.mark_escalated(Reason::Complaint);
    let reply = format!("I'll connect you with our team at {}.", org().email);
    let out = post_process(&reply, &verdict, false, &org());
    assert_eq!(out.matches(&org().email).count(), 1);
}

#[test]
fn medical_disclaimer_is_appended_once() {
    let verdict = Verdict::pass();
    let out = post_process("We can accommodate snack breaks.", &verdict, true, &org());
    assert!(out.contains("pediatrician"));

    // Already-covered replies are left alone.
    let covered = "Please consult your pediatrician about that.";
    let out = post_process(covered, &verdict, true, &org());
    assert_eq!(out, covered);
}

// --- truncation -------------------------------------------------------------

#[test]
fn short_replies_are_untouched() {
    assert_eq!(truncate_reply("Hello!"), "Hello!");
}

#[test]
fn long_replies_cut_at_a_sentence_boundary() {
    let sentence = "This is a sentence about robots. ";
    let long = sentence.repeat(100);
    let out = truncate_reply(&long);
    assert!(out.chars().count() <= MAX_REPLY_CHARS);
    assert!(out.ends_with('.'));
}

#[test]
fn boundary_free_text_gets_an_ellipsis() {
    let long = "word ".repeat(600);
    let out = truncate_reply(&long);
    assert!(out.chars().count() <= MAX_REPLY_CHARS);
    assert!(out.ends_with('…'));
}
