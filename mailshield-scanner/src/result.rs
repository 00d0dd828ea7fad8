use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bucketed category derived from a risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const HIGH_THRESHOLD: u8 = 50;
    pub const MEDIUM_THRESHOLD: u8 = 25;

    pub fn from_score(score: u8) -> Self {
        if score >= Self::HIGH_THRESHOLD {
            RiskLevel::High
        } else if score >= Self::MEDIUM_THRESHOLD {
            RiskLevel::Medium
        } else if score > 0 {
            RiskLevel::Low
        } else {
            RiskLevel::Safe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "safe" => Ok(RiskLevel::Safe),
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level '{}'", other)),
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized outcome of one scoring call. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    url: String,
    risk_score: u8,
    risk_level: RiskLevel,
    reasons: Vec<String>,
}

impl ScanResult {
    /// Scores above 100 are clamped; the level always follows the score.
    pub fn new(url: impl Into<String>, risk_score: u8, reasons: Vec<String>) -> Self {
        let risk_score = risk_score.min(100);
        Self {
            url: url.into(),
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            reasons,
        }
    }

    pub fn safe(url: impl Into<String>) -> Self {
        Self::new(url, 0, Vec::new())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn risk_score(&self) -> u8 {
        self.risk_score
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    pub fn is_safe(&self) -> bool {
        self.risk_score == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_thresholds() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_score(1), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(24), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(25), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(49), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(50), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::High);
    }

    #[test]
    fn test_score_is_clamped() {
        let result = ScanResult::new("https://bad.example/", 250, vec![]);
        assert_eq!(result.risk_score(), 100);
        assert_eq!(result.risk_level(), RiskLevel::High);
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!("HIGH".parse::<RiskLevel>(), Ok(RiskLevel::High));
        assert_eq!(" medium ".parse::<RiskLevel>(), Ok(RiskLevel::Medium));
        assert!("critical".parse::<RiskLevel>().is_err());
    }
}
