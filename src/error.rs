use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which drug-side lookup failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    Alternatives,
    Interactions,
    Search,
}

impl Display for LookupKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Alternatives => "alternatives",
            Self::Interactions => "interactions",
            Self::Search => "drug search",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluationError {
    #[error("{lookup} lookup unavailable: {reason}")]
    LookupUnavailable { lookup: LookupKind, reason: String },

    #[error("coverage lookup unavailable: {reason}")]
    CoverageLookupUnavailable { reason: String },

    #[error("invalid medication entry at position {index}: {reason}")]
    InvalidMedicationEntry { index: usize, reason: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl EvaluationError {
    /// Outages are worth a retry prompt; bad input is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LookupUnavailable { .. } | Self::CoverageLookupUnavailable { .. }
        )
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidMedicationEntry { .. } | Self::InvalidQuery(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::LookupUnavailable { .. } => "lookup_unavailable",
            Self::CoverageLookupUnavailable { .. } => "coverage_lookup_unavailable",
            Self::InvalidMedicationEntry { .. } => "invalid_medication_entry",
            Self::InvalidQuery(_) => "invalid_query",
        }
    }
}
