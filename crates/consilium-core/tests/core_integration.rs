#![allow(clippy::unwrap_used, clippy::expect_used)]

use consilium_core::*;

// ---------------------------------------------------------------------------
// 1. Classification pipeline: language + safety on the same query
// ---------------------------------------------------------------------------

#[test]
fn classification_pipeline_for_safety_query() {
    let text = "What is the lethal dose of paracetamol for a child?";

    let detection = detect(text);
    assert_eq!(detection.lang, Language::En);

    let trigger = classify(text).unwrap();
    assert_eq!(trigger.kind, TriggerKind::SafetyReview);
    assert_eq!(trigger.priority, 5);
    assert!(!trigger.matched_terms.is_empty());
}

#[test]
fn classification_pipeline_for_benign_french_query() {
    let text = "Quels sont les effets secondaires du paracétamol ?";
    assert_eq!(detect(text).lang, Language::Fr);
    // Side-effect phrasing is not part of the validation taxonomy.
    assert!(classify(text).is_none());
}

// ---------------------------------------------------------------------------
// 2. Fingerprint equivalence classes
// ---------------------------------------------------------------------------

#[test]
fn fingerprint_equivalence() {
    let a = Query::new("What are the side effects of ibuprofen?");
    let b = Query::new("WHAT ARE THE   side effects of ibuprofen?");
    assert_eq!(a.fingerprint(), b.fingerprint());

    // Same text, different routing options: different fingerprints.
    let c = Query::new("What are the side effects of ibuprofen?").with_human_loop(false);
    let d = Query::new("What are the side effects of ibuprofen?")
        .with_target_language(Language::De);
    assert_ne!(a.fingerprint(), c.fingerprint());
    assert_ne!(a.fingerprint(), d.fingerprint());
    assert_ne!(c.fingerprint(), d.fingerprint());
}

// ---------------------------------------------------------------------------
// 3. Validation request lifecycle fields
// ---------------------------------------------------------------------------

#[test]
fn validation_request_serialization_roundtrip() {
    let req = ValidationRequest::new(
        "fp-roundtrip",
        "overdose risk?",
        Language::En,
        TriggerKind::SafetyReview,
        "draft",
        chrono::Duration::seconds(60),
    );

    let json = serde_json::to_string(&req).unwrap();
    assert!(json.contains("\"SAFETY_REVIEW\""));
    assert!(json.contains("\"PENDING\""));

    let parsed: ValidationRequest = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.id, req.id);
    assert_eq!(parsed.status, ValidationStatus::Pending);
    assert_eq!(parsed.priority, 5);
}

// ---------------------------------------------------------------------------
// 4. Error taxonomy codes are wire-stable
// ---------------------------------------------------------------------------

#[test]
fn error_kind_codes_are_wire_stable() {
    let cases = [
        (ConsiliumError::InputInvalid("".into()), "INPUT_INVALID"),
        (
            ConsiliumError::RetrievalUnavailable("".into()),
            "RETRIEVAL_UNAVAILABLE",
        ),
        (ConsiliumError::LlmTransport("".into()), "LLM_TRANSPORT"),
        (ConsiliumError::OutputParse("".into()), "OUTPUT_PARSE"),
        (ConsiliumError::Timeout("".into()), "TIMEOUT"),
        (
            ConsiliumError::HumanLoopExpired("".into()),
            "HUMAN_LOOP_EXPIRED",
        ),
    ];
    for (err, code) in cases {
        assert_eq!(err.kind(), code);
    }
}

// ---------------------------------------------------------------------------
// 5. Localized messages follow the detected language
// ---------------------------------------------------------------------------

#[test]
fn localized_messages_follow_detection() {
    let detection = detect("Wie wirkt Paracetamol und welche Dosierung ist sicher?");
    assert_eq!(detection.lang, Language::De);
    assert!(safe_refusal(detection.lang).contains("Gesundheitsfachmann"));
    assert!(uncertainty_acknowledgement(detection.lang).contains("Quellen"));
}
