//! Language detection for the four supported query languages.
//!
//! Deterministic keyword scoring with an English-priority tie-break: the
//! service answers an international audience, so an ambiguous query defaults
//! to English rather than guessing.

use serde::{Deserialize, Serialize};

/// The closed set of supported languages. Callers supplying anything else
/// receive `INPUT_INVALID` at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    En,
    Fr,
    Es,
    De,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "EN",
            Language::Fr => "FR",
            Language::Es => "ES",
            Language::De => "DE",
        }
    }

    /// Parse a language code, case-insensitively.
    pub fn parse(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "EN" => Some(Language::En),
            "FR" => Some(Language::Fr),
            "ES" => Some(Language::Es),
            "DE" => Some(Language::De),
            _ => None,
        }
    }

    /// Human-readable name, used in prompt templates.
    pub fn name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Fr => "French",
            Language::Es => "Spanish",
            Language::De => "German",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Result of language detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub lang: Language,
    pub confidence: f32,
}

// Indicator inventories mix general function words with medical-domain terms
// so short pharmaceutical queries still score.
const EN_INDICATORS: &[&str] = &[
    "what", "how", "why", "which", "when", "where", "who", "the", "and", "are",
    "is", "of", "for", "with", "can", "should", "side effects", "dose",
    "dosage", "treatment", "medicine", "drug", "paracetamol", "ibuprofen",
    "overdose", "pregnancy", "child", "children", "lethal", "interactions",
    "mechanism", "action", "safe", "warnings",
];

const FR_INDICATORS: &[&str] = &[
    "quels", "quelles", "quel", "quelle", "comment", "pourquoi", "quand",
    "sont", "est", "les", "des", "une", "pour", "avec", "peut", "doit",
    "effets", "secondaires", "posologie", "traitement", "médicament",
    "paracétamol", "surdosage", "grossesse", "enfant", "enfants", "mortelle",
    "interactions", "mécanisme", "sûr", "avertissements",
];

const ES_INDICATORS: &[&str] = &[
    "qué", "cuáles", "cuál", "cómo", "cuándo", "dónde", "son", "los", "las",
    "del", "para", "con", "puede", "debe", "efectos", "secundarios", "dosis",
    "tratamiento", "medicamento", "paracetamol", "sobredosis", "embarazo",
    "niño", "niños", "letal", "interacciones", "mecanismo", "seguro",
    "advertencias",
];

const DE_INDICATORS: &[&str] = &[
    "was", "wie", "warum", "welche", "welcher", "wann", "wo", "sind", "ist",
    "der", "die", "das", "und", "für", "mit", "kann", "soll",
    "nebenwirkungen", "dosierung", "behandlung", "medikament", "paracetamol",
    "überdosis", "schwangerschaft", "kind", "kinder", "tödlich",
    "wechselwirkungen", "wirkmechanismus", "sicher", "warnhinweise",
];

/// Lowercase the text and turn punctuation into spaces so indicators match
/// whole words only. Intra-word hyphens are kept ("contre-indication").
pub(crate) fn normalize_for_matching(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mapped: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn score(normalized: &str, indicators: &[&str]) -> u32 {
    let padded = format!(" {} ", normalized);
    indicators
        .iter()
        .filter(|ind| padded.contains(&format!(" {} ", ind)))
        .count() as u32
}

/// Classify `text` into one of the supported languages.
///
/// Total function: unrecognizable input yields English with confidence 0.
/// English wins any tie it participates in; otherwise the strictly highest
/// non-English score wins, checked in FR, ES, DE order.
pub fn detect(text: &str) -> Detection {
    let normalized = normalize_for_matching(text);

    let en = score(&normalized, EN_INDICATORS);
    let fr = score(&normalized, FR_INDICATORS);
    let es = score(&normalized, ES_INDICATORS);
    let de = score(&normalized, DE_INDICATORS);

    let total = en + fr + es + de;
    if total == 0 {
        return Detection {
            lang: Language::En,
            confidence: 0.0,
        };
    }

    let non_en_max = fr.max(es).max(de);
    let (lang, winner_score) = if en > 0 && en >= non_en_max {
        (Language::En, en)
    } else {
        let mut best = (Language::Fr, fr);
        for candidate in [(Language::Es, es), (Language::De, de)] {
            if candidate.1 > best.1 {
                best = candidate;
            }
        }
        best
    };

    Detection {
        lang,
        confidence: winner_score as f32 / total.max(1) as f32,
    }
}

/// The answer the Generator must give when the retrieved context does not
/// cover the question.
pub fn uncertainty_acknowledgement(lang: Language) -> &'static str {
    match lang {
        Language::En => "I cannot find this information in the provided sources.",
        Language::Fr => "Je ne trouve pas cette information dans les sources fournies.",
        Language::Es => "No encuentro esta información en las fuentes proporcionadas.",
        Language::De => {
            "Ich kann diese Information in den bereitgestellten Quellen nicht finden."
        }
    }
}

/// Safe-refusal message used for FALLBACK envelopes.
pub fn safe_refusal(lang: Language) -> &'static str {
    match lang {
        Language::En => {
            "I cannot safely answer without further review. \
             Please consult a qualified healthcare professional."
        }
        Language::Fr => {
            "Je ne peux pas répondre en toute sécurité sans examen complémentaire. \
             Veuillez consulter un professionnel de santé qualifié."
        }
        Language::Es => {
            "No puedo responder con seguridad sin una revisión adicional. \
             Consulte a un profesional de salud calificado."
        }
        Language::De => {
            "Ich kann ohne weitere Prüfung keine sichere Antwort geben. \
             Bitte konsultieren Sie einen qualifizierten Gesundheitsfachmann."
        }
    }
}
