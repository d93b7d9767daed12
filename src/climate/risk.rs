//! Rain-amount risk score.

use std::fmt;

use serde::{Serialize, Serializer};

/// Three-level label derived from a 0–100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLabel {
    Low,
    Medium,
    High,
}

impl RiskLabel {
    pub fn from_score(score: u8) -> Self {
        match score {
            70.. => RiskLabel::High,
            40.. => RiskLabel::Medium,
            _ => RiskLabel::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLabel::Low => "Low Risk",
            RiskLabel::Medium => "Medium Risk",
            RiskLabel::High => "High Risk",
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RiskLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Piecewise-linear score in `[0, 100]` for a rain amount in mm.
///
/// ```text
/// mm <= 0        0
/// 0 < mm < 1     15
/// 1 <= mm < 5    40 .. 70
/// 5 <= mm < 20   70 .. 100
/// mm >= 20       100
/// ```
pub fn rain_score_raw(mm: Option<f64>) -> f64 {
    match mm {
        Some(mm) if mm.is_nan() || mm <= 0.0 => 0.0,
        None => 0.0,
        Some(mm) if mm < 1.0 => 15.0,
        Some(mm) if mm < 5.0 => 40.0 + (mm - 1.0) / 4.0 * 30.0,
        Some(mm) if mm < 20.0 => 70.0 + (mm - 5.0) / 15.0 * 30.0,
        Some(_) => 100.0,
    }
}

/// Rounded score.
pub fn rain_score(mm: Option<f64>) -> u8 {
    rain_score_raw(mm).round().clamp(0.0, 100.0) as u8
}

pub fn assess(mm: Option<f64>) -> (u8, RiskLabel) {
    let score = rain_score(mm);
    (score, RiskLabel::from_score(score))
}
