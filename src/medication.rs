use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EvaluationError;

const CURRENCY_DP: u32 = 2;

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum DrugType {
    #[default]
    Branded,
    Generic,
}

impl DrugType {
    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Branded => "branded",
            Self::Generic => "generic",
        }
    }
}

impl Display for DrugType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown drug type: {0}")]
pub struct DrugTypeParseError(pub String);

impl FromStr for DrugType {
    type Err = DrugTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "branded" | "brand" => Ok(Self::Branded),
            "generic" => Ok(Self::Generic),
            _ => Err(DrugTypeParseError(s.to_string())),
        }
    }
}

/// A prescribed medication as produced by the upstream prescription parser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationEntry {
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub frequency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(rename = "type", default)]
    pub drug_type: DrugType,
    #[serde(default)]
    pub price: Decimal,
}

impl MedicationEntry {
    pub fn new(name: &str, price: Decimal) -> Self {
        Self {
            name: name.to_string(),
            dosage: String::new(),
            frequency: String::new(),
            duration: None,
            drug_type: DrugType::default(),
            price,
        }
    }

    pub fn with_dosage(mut self, dosage: &str) -> Self {
        self.dosage = dosage.to_string();
        self
    }

    pub fn with_type(mut self, drug_type: DrugType) -> Self {
        self.drug_type = drug_type;
        self
    }

    /// Lookup key: trimmed, lowercase name.
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }

    pub fn validate(&self, index: usize) -> Result<(), EvaluationError> {
        if self.name.trim().is_empty() {
            return Err(EvaluationError::InvalidMedicationEntry {
                index,
                reason: "name is required".to_string(),
            });
        }
        if self.price < Decimal::ZERO {
            return Err(EvaluationError::InvalidMedicationEntry {
                index,
                reason: format!("price {} is negative", self.price),
            });
        }
        Ok(())
    }
}

pub fn validate_all(medications: &[MedicationEntry]) -> Result<(), EvaluationError> {
    medications
        .iter()
        .enumerate()
        .try_for_each(|(index, medication)| medication.validate(index))
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// `round(part / whole * 100, 2)`, or zero when `whole` is zero.
pub fn percentage(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    round_currency(part * Decimal::ONE_HUNDRED / whole)
}
