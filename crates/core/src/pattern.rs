//! Linguistic patterns extracted from Tier-3 decisions.
//!
//! A pattern is a reusable fact (synonym pair, filler word, trigger
//! keyword) that, once promoted into the template, lets a cheaper tier
//! resolve the same phrasing next time.

use serde::{Deserialize, Serialize};

/// Type-specific pattern payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternKind {
    /// Technical term ↔ colloquial phrasing pair.
    Synonym { technical: String, colloquial: String },
    /// A word callers use that carries no intent signal.
    Filler { word: String },
    /// A trigger keyword for a specific scenario.
    Keyword { scenario_id: String, word: String },
    /// A veto keyword for a specific scenario.
    NegativeKeyword { scenario_id: String, word: String },
}

impl PatternKind {
    /// Short tag for logs and alert details.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Synonym { .. } => "synonym",
            Self::Filler { .. } => "filler",
            Self::Keyword { .. } => "keyword",
            Self::NegativeKeyword { .. } => "negative_keyword",
        }
    }
}

/// A pattern plus the extractor's confidence in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(flatten)]
    pub kind: PatternKind,
    pub confidence: f32,
}

impl Pattern {
    pub fn new(kind: PatternKind, confidence: f32) -> Self {
        Self { kind, confidence }
    }

    /// Check the pattern is well-formed.
    ///
    /// Invalid patterns are skipped by the promoter, never raised;
    /// the returned message feeds the discard log.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside [0,1]", self.confidence));
        }
        let non_empty = |label: &str, s: &str| {
            if s.trim().is_empty() {
                Err(format!("{label} is empty"))
            } else {
                Ok(())
            }
        };
        match &self.kind {
            PatternKind::Synonym {
                technical,
                colloquial,
            } => {
                non_empty("technical term", technical)?;
                non_empty("colloquial term", colloquial)?;
                if technical.trim().eq_ignore_ascii_case(colloquial.trim()) {
                    return Err("synonym maps a term to itself".into());
                }
                Ok(())
            }
            PatternKind::Filler { word } => non_empty("filler word", word),
            PatternKind::Keyword { scenario_id, word }
            | PatternKind::NegativeKeyword { scenario_id, word } => {
                non_empty("scenario id", scenario_id)?;
                non_empty("keyword", word)
            }
        }
    }

    /// Stable key for suggestion deduplication.
    ///
    /// Two extractions of the same fact (modulo case and whitespace)
    /// must produce the same key.
    pub fn dedup_key(&self) -> String {
        let norm = |s: &str| s.trim().to_lowercase();
        match &self.kind {
            PatternKind::Synonym {
                technical,
                colloquial,
            } => format!("synonym:{}:{}", norm(technical), norm(colloquial)),
            PatternKind::Filler { word } => format!("filler:{}", norm(word)),
            PatternKind::Keyword { scenario_id, word } => {
                format!("keyword:{}:{}", norm(scenario_id), norm(word))
            }
            PatternKind::NegativeKeyword { scenario_id, word } => {
                format!("negative_keyword:{}:{}", norm(scenario_id), norm(word))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synonym(technical: &str, colloquial: &str, confidence: f32) -> Pattern {
        Pattern::new(
            PatternKind::Synonym {
                technical: technical.into(),
                colloquial: colloquial.into(),
            },
            confidence,
        )
    }

    #[test]
    fn valid_synonym_passes() {
        assert!(synonym("gastroscopy", "stomach check", 0.9).validate().is_ok());
    }

    #[test]
    fn empty_field_fails() {
        assert!(synonym("", "stomach check", 0.9).validate().is_err());
        assert!(synonym("gastroscopy", "  ", 0.9).validate().is_err());
    }

    #[test]
    fn self_synonym_fails() {
        assert!(synonym("checkup", "Checkup", 0.9).validate().is_err());
    }

    #[test]
    fn out_of_range_confidence_fails() {
        assert!(synonym("a", "b", 1.2).validate().is_err());
        assert!(synonym("a", "b", -0.1).validate().is_err());
    }

    #[test]
    fn dedup_key_is_case_insensitive() {
        let a = synonym("Gastroscopy", "Stomach Check", 0.9);
        let b = synonym("gastroscopy", " stomach check ", 0.7);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn dedup_key_distinguishes_kinds() {
        let keyword = Pattern::new(
            PatternKind::Keyword {
                scenario_id: "sc_1".into(),
                word: "reschedule".into(),
            },
            0.8,
        );
        let negative = Pattern::new(
            PatternKind::NegativeKeyword {
                scenario_id: "sc_1".into(),
                word: "reschedule".into(),
            },
            0.8,
        );
        assert_ne!(keyword.dedup_key(), negative.dedup_key());
    }

    #[test]
    fn pattern_json_shape() {
        let p = synonym("gastroscopy", "stomach check", 0.9);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "synonym");
        assert_eq!(json["technical"], "gastroscopy");

        let back: Pattern = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }
}
