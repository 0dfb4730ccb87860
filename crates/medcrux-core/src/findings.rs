use serde::{Deserialize, Serialize};

/// A feature axis of a lesion description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Shape,
    Boundary,
    Echo,
    Orientation,
    AspectRatio,
    MalignantSigns,
}

impl Dimension {
    pub const TERMS: [Self; 4] = [Self::Shape, Self::Boundary, Self::Echo, Self::Orientation];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shape => "shape",
            Self::Boundary => "boundary",
            Self::Echo => "echo",
            Self::Orientation => "orientation",
            Self::AspectRatio => "aspect_ratio",
            Self::MalignantSigns => "malignant_signs",
        }
    }

    /// Human-readable name used in violation messages.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::AspectRatio => "aspect ratio",
            Self::MalignantSigns => "malignant signs",
            other => other.as_str(),
        }
    }

    /// Dimensions whose values are vocabulary terms.
    #[must_use]
    pub fn is_term(&self) -> bool {
        Self::TERMS.contains(self)
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dimension {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shape" => Ok(Self::Shape),
            "boundary" => Ok(Self::Boundary),
            "echo" => Ok(Self::Echo),
            "orientation" => Ok(Self::Orientation),
            "aspect_ratio" => Ok(Self::AspectRatio),
            "malignant_signs" => Ok(Self::MalignantSigns),
            _ => Err(crate::Error::InvalidDimension(s.to_string())),
        }
    }
}

/// Morphology of one lesion as reported by an external extractor.
/// Read-only input to the verifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFindings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f64>,
    #[serde(default)]
    pub malignant_signs: Vec<String>,
}

impl ExtractedFindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_shape(mut self, shape: impl Into<String>) -> Self {
        self.shape = Some(shape.into());
        self
    }

    #[must_use]
    pub fn with_boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    #[must_use]
    pub fn with_echo(mut self, echo: impl Into<String>) -> Self {
        self.echo = Some(echo.into());
        self
    }

    #[must_use]
    pub fn with_orientation(mut self, orientation: impl Into<String>) -> Self {
        self.orientation = Some(orientation.into());
        self
    }

    #[must_use]
    pub fn with_aspect_ratio(mut self, ratio: f64) -> Self {
        self.aspect_ratio = Some(ratio);
        self
    }

    #[must_use]
    pub fn with_malignant_sign(mut self, sign: impl Into<String>) -> Self {
        self.malignant_signs.push(sign.into());
        self
    }

    /// The descriptor for a term dimension, `None` when absent or blank.
    #[must_use]
    pub fn term(&self, dimension: Dimension) -> Option<&str> {
        let value = match dimension {
            Dimension::Shape => self.shape.as_deref(),
            Dimension::Boundary => self.boundary.as_deref(),
            Dimension::Echo => self.echo.as_deref(),
            Dimension::Orientation => self.orientation.as_deref(),
            Dimension::AspectRatio | Dimension::MalignantSigns => None,
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn has_malignant_signs(&self) -> bool {
        self.malignant_signs.iter().any(|s| !s.trim().is_empty())
    }

    /// All term descriptors joined into one lowercase string.
    #[must_use]
    pub fn morphology_text(&self) -> String {
        Dimension::TERMS
            .iter()
            .filter_map(|d| self.term(*d))
            .chain(self.malignant_signs.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_terms_are_absent() {
        let findings = ExtractedFindings::new().with_shape("  ").with_echo(" anechoic ");
        assert_eq!(findings.term(Dimension::Shape), None);
        assert_eq!(findings.term(Dimension::Echo), Some("anechoic"));
        assert_eq!(findings.term(Dimension::AspectRatio), None);
    }

    #[test]
    fn test_findings_deserialize_with_missing_fields() {
        let findings: ExtractedFindings =
            serde_json::from_str(r#"{"shape": "oval", "aspect_ratio": 0.8}"#).unwrap();
        assert_eq!(findings.shape.as_deref(), Some("oval"));
        assert_eq!(findings.aspect_ratio, Some(0.8));
        assert!(findings.malignant_signs.is_empty());
        assert!(!findings.has_malignant_signs());
    }

    #[test]
    fn test_dimension_order_and_names() {
        assert!(Dimension::Shape < Dimension::MalignantSigns);
        assert_eq!("aspect_ratio".parse::<Dimension>().unwrap(), Dimension::AspectRatio);
        assert_eq!(Dimension::MalignantSigns.label(), "malignant signs");
        assert!(!Dimension::AspectRatio.is_term());
    }
}
