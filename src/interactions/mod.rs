pub mod aggregator;

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Moderate,
    High,
}

impl Severity {
    /// Higher renders first.
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 3,
            Self::Moderate => 2,
            Self::Low => 1,
        }
    }

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Moderate => "moderate",
            Self::Low => "low",
        }
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown severity: {0}")]
pub struct SeverityParseError(pub String);

impl FromStr for Severity {
    type Err = SeverityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "minor" => Ok(Self::Low),
            "moderate" | "medium" => Ok(Self::Moderate),
            "high" | "major" | "severe" => Ok(Self::High),
            _ => Err(SeverityParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reference {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InteractionFinding {
    pub medication1: String,
    pub medication2: String,
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub effects: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub references: Vec<Reference>,
}

impl InteractionFinding {
    pub fn new(medication1: &str, medication2: &str, severity: Severity) -> Self {
        Self {
            medication1: medication1.to_string(),
            medication2: medication2.to_string(),
            severity,
            description: String::new(),
            effects: Vec::new(),
            recommendations: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_effects(mut self, effects: &[&str]) -> Self {
        self.effects = effects.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_recommendations(mut self, recommendations: &[&str]) -> Self {
        self.recommendations = recommendations.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_reference(mut self, title: &str, url: &str) -> Self {
        self.references.push(Reference {
            title: title.to_string(),
            url: url.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InteractionSummary {
    pub high_count: usize,
    pub moderate_count: usize,
    pub low_count: usize,
    pub interactions: Vec<InteractionFinding>,
}

impl InteractionSummary {
    pub fn from_findings(interactions: Vec<InteractionFinding>) -> Self {
        let count = |severity: Severity| {
            interactions
                .iter()
                .filter(|finding| finding.severity == severity)
                .count()
        };
        Self {
            high_count: count(Severity::High),
            moderate_count: count(Severity::Moderate),
            low_count: count(Severity::Low),
            interactions,
        }
    }

    pub fn total(&self) -> usize {
        self.interactions.len()
    }

    /// Findings high-first; pair order is kept within a severity.
    pub fn by_severity(&self) -> Vec<&InteractionFinding> {
        let mut sorted = self.interactions.iter().collect::<Vec<_>>();
        sorted.sort_by(|a, b| b.severity.cmp(&a.severity));
        sorted
    }

    pub fn filtered(&self, severity: Severity) -> Vec<&InteractionFinding> {
        self.interactions
            .iter()
            .filter(|finding| finding.severity == severity)
            .collect()
    }
}
