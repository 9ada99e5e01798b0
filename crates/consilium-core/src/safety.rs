//! Safety classification against the fixed validation-trigger taxonomy.
//!
//! A match here is what routes a query into the human-validation path, so
//! the taxonomy and its priorities are deliberately closed: new trigger
//! kinds are a code change, not configuration.

use crate::lang::normalize_for_matching;
use serde::{Deserialize, Serialize};

/// Categories of human validation, ordered by taxonomy rank (used to break
/// priority ties).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    SafetyReview,
    MedicalApproval,
    RegulatoryCompliance,
    CriticalDecision,
    QualityAssurance,
}

impl TriggerKind {
    /// Validation priority, 1..=5 with 5 highest.
    pub fn priority(&self) -> u8 {
        match self {
            TriggerKind::SafetyReview => 5,
            TriggerKind::MedicalApproval => 3,
            TriggerKind::RegulatoryCompliance => 4,
            TriggerKind::CriticalDecision => 5,
            TriggerKind::QualityAssurance => 2,
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriggerKind::SafetyReview => "SAFETY_REVIEW",
            TriggerKind::MedicalApproval => "MEDICAL_APPROVAL",
            TriggerKind::RegulatoryCompliance => "REGULATORY_COMPLIANCE",
            TriggerKind::CriticalDecision => "CRITICAL_DECISION",
            TriggerKind::QualityAssurance => "QUALITY_ASSURANCE",
        };
        f.write_str(s)
    }
}

/// A matched validation trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyTrigger {
    pub kind: TriggerKind,
    pub priority: u8,
    pub matched_terms: Vec<String>,
}

// Indicator lists cover all four supported languages. Matching is whole-word
// over punctuation-normalized text, so multi-word phrases match too.

const SAFETY_REVIEW_TERMS: &[&str] = &[
    "overdose", "toxicity", "pregnancy", "child", "children",
    "contraindication", "contraindications", "warning", "lactation",
    // FR
    "surdosage", "toxicité", "grossesse", "enfant", "enfants",
    "contre-indication", "contre-indications", "avertissement", "allaitement",
    // ES
    "sobredosis", "toxicidad", "embarazo", "niño", "niños",
    "contraindicación", "contraindicaciones", "advertencia", "lactancia",
    // DE
    "überdosis", "überdosierung", "toxizität", "schwangerschaft", "kind",
    "kinder", "kontraindikation", "kontraindikationen", "warnung", "stillzeit",
];

const MEDICAL_APPROVAL_TERMS: &[&str] = &[
    "diagnosis", "treatment", "dosage", "clinical",
    // FR
    "diagnostic", "traitement", "posologie", "clinique",
    // ES
    "diagnóstico", "tratamiento", "dosificación", "clínico", "clínica",
    // DE
    "diagnose", "behandlung", "dosierung", "klinisch", "klinische",
];

const REGULATORY_COMPLIANCE_TERMS: &[&str] = &[
    "fda", "ema", "regulatory", "approval", "compliance",
    // FR
    "ansm", "réglementaire", "approbation", "conformité",
    // ES
    "aemps", "regulatorio", "aprobación", "cumplimiento",
    // DE
    "bfarm", "regulatorisch", "zulassung",
];

const CRITICAL_DECISION_TERMS: &[&str] = &[
    "lethal", "emergency", "life-threatening",
    // FR
    "létal", "létale", "mortel", "mortelle", "urgence",
    // ES
    "letal", "mortal", "emergencia",
    // DE
    "tödlich", "notfall", "lebensbedrohlich",
];

const QUALITY_ASSURANCE_TERMS: &[&str] = &[
    "verify", "double-check",
    // FR
    "vérifier", "revérifier",
    // ES
    "verificar", "comprobar",
    // DE
    "überprüfen", "nachprüfen",
];

const TAXONOMY: &[(TriggerKind, &[&str])] = &[
    (TriggerKind::SafetyReview, SAFETY_REVIEW_TERMS),
    (TriggerKind::MedicalApproval, MEDICAL_APPROVAL_TERMS),
    (TriggerKind::RegulatoryCompliance, REGULATORY_COMPLIANCE_TERMS),
    (TriggerKind::CriticalDecision, CRITICAL_DECISION_TERMS),
    (TriggerKind::QualityAssurance, QUALITY_ASSURANCE_TERMS),
];

/// Classify `text` against the validation-trigger taxonomy.
///
/// If several kinds match, the highest-priority one wins; priority ties go
/// to the earlier taxonomy entry.
pub fn classify(text: &str) -> Option<SafetyTrigger> {
    let padded = format!(" {} ", normalize_for_matching(text));

    let mut best: Option<SafetyTrigger> = None;
    for (kind, terms) in TAXONOMY {
        let matched: Vec<String> = terms
            .iter()
            .filter(|t| padded.contains(&format!(" {} ", t)))
            .map(|t| t.to_string())
            .collect();
        if matched.is_empty() {
            continue;
        }
        let trigger = SafetyTrigger {
            kind: *kind,
            priority: kind.priority(),
            matched_terms: matched,
        };
        match &best {
            Some(b) if b.priority >= trigger.priority => {}
            _ => best = Some(trigger),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_trigger_on_benign_query() {
        assert!(classify("What is the weather today?").is_none());
        assert!(classify("").is_none());
    }

    #[test]
    fn safety_review_on_overdose() {
        let t = classify("What happens in case of paracetamol overdose?").unwrap();
        assert_eq!(t.kind, TriggerKind::SafetyReview);
        assert_eq!(t.priority, 5);
        assert!(t.matched_terms.contains(&"overdose".to_string()));
    }

    #[test]
    fn safety_review_wins_priority_tie_against_critical() {
        // Both SAFETY_REVIEW ("child") and CRITICAL_DECISION ("lethal")
        // match at priority 5; taxonomy order decides.
        let t = classify("What is the lethal dose of paracetamol for a child?").unwrap();
        assert_eq!(t.kind, TriggerKind::SafetyReview);
        assert_eq!(t.priority, 5);
    }

    #[test]
    fn critical_decision_alone() {
        let t = classify("Is this an emergency situation?").unwrap();
        assert_eq!(t.kind, TriggerKind::CriticalDecision);
        assert_eq!(t.priority, 5);
    }

    #[test]
    fn regulatory_outranks_medical() {
        let t = classify("Which treatment has fda approval?").unwrap();
        assert_eq!(t.kind, TriggerKind::RegulatoryCompliance);
        assert_eq!(t.priority, 4);
    }

    #[test]
    fn medical_approval_on_dosage() {
        let t = classify("Recommended dosage for adults").unwrap();
        assert_eq!(t.kind, TriggerKind::MedicalApproval);
        assert_eq!(t.priority, 3);
    }

    #[test]
    fn quality_assurance_lowest() {
        let t = classify("Please verify this answer").unwrap();
        assert_eq!(t.kind, TriggerKind::QualityAssurance);
        assert_eq!(t.priority, 2);
    }

    #[test]
    fn matching_is_case_insensitive_and_whole_word() {
        assert!(classify("OVERDOSE risk").is_some());
        // "warnings" is not the whole word "warning".
        assert!(classify("warnings").is_none());
    }

    #[test]
    fn multilingual_terms_match() {
        assert_eq!(
            classify("Risque de surdosage pendant la grossesse").unwrap().kind,
            TriggerKind::SafetyReview
        );
        assert_eq!(
            classify("¿Es seguro durante el embarazo?").unwrap().kind,
            TriggerKind::SafetyReview
        );
        assert_eq!(
            classify("Überdosierung bei Kindern").unwrap().kind,
            TriggerKind::SafetyReview
        );
    }

    #[test]
    fn hyphenated_phrases_match() {
        let t = classify("Is this condition life-threatening?").unwrap();
        assert_eq!(t.kind, TriggerKind::CriticalDecision);
    }

    #[test]
    fn trigger_kind_serialization() {
        let json = serde_json::to_string(&TriggerKind::SafetyReview).unwrap();
        assert_eq!(json, "\"SAFETY_REVIEW\"");
        let parsed: TriggerKind = serde_json::from_str("\"CRITICAL_DECISION\"").unwrap();
        assert_eq!(parsed, TriggerKind::CriticalDecision);
    }
}
