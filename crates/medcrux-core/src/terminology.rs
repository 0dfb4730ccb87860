//! Maps raw lesion descriptors onto the controlled vocabulary.
//!
//! A value that matches nothing is reported back verbatim as non-standard.
//! Unusual descriptors (a cord-like echo pattern, a band-like shape) are
//! themselves findings, so they are never folded into the closest term.

use serde::{Deserialize, Serialize};

use crate::config::{CanonicalTerms, Vocabulary};
use crate::findings::Dimension;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermCheck {
    pub is_standard: bool,
    pub standard_term: Option<String>,
    pub non_standard: Option<String>,
}

impl TermCheck {
    fn standard(term: &str) -> Self {
        Self {
            is_standard: true,
            standard_term: Some(term.to_string()),
            non_standard: None,
        }
    }

    fn non_standard(value: &str) -> Self {
        Self {
            is_standard: false,
            standard_term: None,
            non_standard: Some(value.to_string()),
        }
    }

    fn empty() -> Self {
        Self {
            is_standard: false,
            standard_term: None,
            non_standard: None,
        }
    }
}

struct SynonymEntry {
    dimension: Dimension,
    variant: String,
    term: String,
}

/// Stateless after construction; safe to share across threads.
pub struct Standardizer {
    terms: CanonicalTerms,
    synonyms: Vec<SynonymEntry>,
}

impl Standardizer {
    #[must_use]
    pub fn new(vocabulary: &Vocabulary) -> Self {
        let synonyms = vocabulary
            .synonyms
            .iter()
            .map(|s| SynonymEntry {
                dimension: s.dimension,
                variant: s.variant.to_lowercase(),
                term: s.term.clone(),
            })
            .collect();

        Self {
            terms: vocabulary.terms.clone(),
            synonyms,
        }
    }

    #[must_use]
    pub fn canonical_terms(&self, dimension: Dimension) -> &[String] {
        self.terms.for_dimension(dimension)
    }

    /// Classifies `value` for `dimension`. Synonyms are tried before the
    /// canonical list; the first contained entry wins.
    #[must_use]
    pub fn check_terminology(&self, value: &str, dimension: Dimension) -> TermCheck {
        if value.trim().is_empty() {
            return TermCheck::empty();
        }
        if !dimension.is_term() {
            return TermCheck::non_standard(value);
        }

        let lowered = value.to_lowercase();

        let synonym = self
            .synonyms
            .iter()
            .filter(|s| s.dimension == dimension)
            .find(|s| lowered.contains(&s.variant));
        if let Some(entry) = synonym {
            return TermCheck::standard(&entry.term);
        }

        self.canonical_terms(dimension)
            .iter()
            .find(|term| lowered.contains(&term.to_lowercase()))
            .map_or_else(|| TermCheck::non_standard(value), |term| TermCheck::standard(term))
    }

    /// The canonical term for `value`, or `value` itself when it is non-standard.
    #[must_use]
    pub fn standardize(&self, value: &str, dimension: Dimension) -> String {
        self.check_terminology(value, dimension)
            .standard_term
            .unwrap_or_else(|| value.to_string())
    }
}

impl Default for Standardizer {
    fn default() -> Self {
        Self::new(&Vocabulary::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonym_maps_to_canonical() {
        let s = Standardizer::default();
        let check = s.check_terminology("清晰", Dimension::Boundary);
        assert!(check.is_standard);
        assert_eq!(check.standard_term.as_deref(), Some("circumscribed"));
        assert_eq!(check.non_standard, None);

        assert_eq!(s.standardize("Well-Defined margin", Dimension::Boundary), "circumscribed");
        assert_eq!(s.standardize("不清晰", Dimension::Boundary), "indistinct");
        assert_eq!(s.standardize("unclear", Dimension::Boundary), "indistinct");
    }

    #[test]
    fn test_negated_boundary_is_not_circumscribed() {
        let s = Standardizer::default();
        for value in ["not well-defined", "Not well defined", "not clear", "边界欠清晰", "边界欠清", "边界不清"] {
            assert_eq!(s.standardize(value, Dimension::Boundary), "indistinct", "{value}");
        }
        assert_eq!(s.standardize("clear", Dimension::Boundary), "circumscribed");
        assert_eq!(s.standardize("边界清晰", Dimension::Boundary), "circumscribed");
    }

    #[test]
    fn test_canonical_containment_is_case_insensitive() {
        let s = Standardizer::default();
        assert_eq!(s.standardize("Oval mass", Dimension::Shape), "oval");
        assert_eq!(
            s.standardize("Mostly Circumscribed", Dimension::Boundary),
            "mostly circumscribed"
        );
        assert_eq!(s.standardize("non-parallel", Dimension::Orientation), "not parallel");
    }

    #[test]
    fn test_non_standard_value_is_preserved() {
        let s = Standardizer::default();
        let check = s.check_terminology("Band-like", Dimension::Shape);
        assert!(!check.is_standard);
        assert_eq!(check.standard_term, None);
        assert_eq!(check.non_standard.as_deref(), Some("Band-like"));
        assert_eq!(s.standardize("Band-like", Dimension::Shape), "Band-like");
    }

    #[test]
    fn test_hypoechoic_is_not_coerced() {
        let s = Standardizer::default();
        let check = s.check_terminology("hypoechoic", Dimension::Echo);
        assert!(!check.is_standard);
        assert_eq!(s.standardize("hypoechoic", Dimension::Echo), "hypoechoic");
        assert_eq!(
            s.standardize("不均匀低回声", Dimension::Echo),
            "heterogeneous"
        );
    }

    #[test]
    fn test_standardize_is_idempotent() {
        let s = Standardizer::default();
        for dimension in Dimension::TERMS {
            for term in s.canonical_terms(dimension) {
                assert_eq!(&s.standardize(term, dimension), term, "{dimension}: {term}");
            }
        }

        for (value, dimension) in [
            ("椭圆形", Dimension::Shape),
            ("band-like", Dimension::Shape),
            ("ill-defined", Dimension::Boundary),
            ("hypoechoic", Dimension::Echo),
            ("vertical", Dimension::Orientation),
        ] {
            let once = s.standardize(value, dimension);
            assert_eq!(s.standardize(&once, dimension), once);
        }
    }

    #[test]
    fn test_empty_and_unknown_dimension() {
        let s = Standardizer::default();
        assert_eq!(s.check_terminology("  ", Dimension::Shape), TermCheck::empty());

        let check = s.check_terminology("0.8", Dimension::AspectRatio);
        assert!(!check.is_standard);
        assert_eq!(check.non_standard.as_deref(), Some("0.8"));
    }
}
