use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ErrorKind, PilahError, Result};

/// Closed set of waste categories, in model output index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WasteCategory {
    Organik,
    Anorganik,
}

impl WasteCategory {
    /// Label table indexed by model output position.
    pub const ALL: [WasteCategory; 2] = [WasteCategory::Organik, WasteCategory::Anorganik];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            WasteCategory::Organik => 0,
            WasteCategory::Anorganik => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WasteCategory::Organik => "Organik",
            WasteCategory::Anorganik => "Anorganik",
        }
    }
}

impl fmt::Display for WasteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WasteCategory {
    type Err = PilahError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| PilahError::NetworkFailure(format!("unknown category label '{trimmed}'")))
    }
}

/// Scale a classifier reports confidence on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceScale {
    /// Fraction in [0, 1].
    #[default]
    Unit,
    /// Already a percentage in [0, 100].
    Percent,
}

impl ConfidenceScale {
    /// Normalize a raw confidence to [0, 1], rejecting values outside the scale.
    pub fn normalize(self, raw: f64) -> Result<f32> {
        let value = match self {
            ConfidenceScale::Unit => raw,
            ConfidenceScale::Percent => raw / 100.0,
        };
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(PilahError::NetworkFailure(format!(
                "confidence {raw} is outside the {:?} scale",
                self
            )));
        }
        Ok(value as f32)
    }
}

/// Outcome of one successful classification. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    label: WasteCategory,
    confidence: f32,
    produced_at: DateTime<Utc>,
}

impl ClassificationResult {
    pub fn new(label: WasteCategory, confidence: f32) -> Result<Self> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(PilahError::InferenceFailure(format!(
                "confidence {confidence} is outside [0, 1]"
            )));
        }
        Ok(Self {
            label,
            confidence,
            produced_at: Utc::now(),
        })
    }

    pub fn label(&self) -> WasteCategory {
        self.label
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }

    /// Confidence rendered as a percentage with two decimals, e.g. `87.00%`.
    pub fn confidence_percent(&self) -> String {
        format!("{:.2}%", f64::from(self.confidence) * 100.0)
    }

    pub fn label_line(&self) -> String {
        format!("Classification: {}", self.label)
    }

    pub fn confidence_line(&self) -> String {
        format!("Confidence: {}", self.confidence_percent())
    }
}

/// User-facing description of a failed cycle step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub cause: Option<String>,
}

impl ClassificationFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl From<&PilahError> for ClassificationFailure {
    fn from(err: &PilahError) -> Self {
        let failure = ClassificationFailure::new(err.kind(), err.detail());
        match err {
            PilahError::Other(inner) => match inner.chain().nth(1) {
                Some(source) => failure.with_cause(source.to_string()),
                None => failure,
            },
            _ => failure,
        }
    }
}

impl fmt::Display for ClassificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{} ({cause})", self.message),
            None => f.write_str(&self.message),
        }
    }
}
