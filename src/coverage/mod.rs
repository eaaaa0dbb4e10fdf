pub mod formulary;
pub mod reconciler;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::alternatives::AlternativeCandidate;
use crate::medication::{percentage, MedicationEntry};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InsuranceProfile {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub policy_id: String,
    #[serde(default)]
    pub plan_name: String,
    #[serde(default, alias = "connected")]
    pub is_connected: bool,
}

impl InsuranceProfile {
    pub fn connected(provider: &str, policy_id: &str, plan_name: &str) -> Self {
        Self {
            provider: provider.to_string(),
            policy_id: policy_id.to_string(),
            plan_name: plan_name.to_string(),
            is_connected: true,
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }
}

/// What a coverage source says about one medication under one policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CoverageDecision {
    pub is_covered: bool,
    #[serde(default)]
    pub covered_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<u8>,
    #[serde(default)]
    pub prior_authorization: bool,
}

impl CoverageDecision {
    pub fn not_covered() -> Self {
        Self::default()
    }

    pub fn covered(covered_amount: Decimal) -> Self {
        Self {
            is_covered: true,
            covered_amount,
            tier: None,
            prior_authorization: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverageResult {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub price: Decimal,
    pub is_covered: bool,
    pub covered_amount: Decimal,
    pub out_of_pocket: Decimal,
    pub alternatives: Vec<AlternativeCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<u8>,
    #[serde(default)]
    pub prior_authorization: bool,
}

impl CoverageResult {
    pub fn uncovered(medication: &MedicationEntry) -> Self {
        Self {
            name: medication.name.clone(),
            dosage: medication.dosage.clone(),
            frequency: medication.frequency.clone(),
            price: medication.price,
            is_covered: false,
            covered_amount: Decimal::ZERO,
            out_of_pocket: medication.price,
            alternatives: Vec::new(),
            tier: None,
            prior_authorization: false,
        }
    }

    /// `covered_amount` must already lie within `[0, price]`.
    pub fn covered(medication: &MedicationEntry, covered_amount: Decimal) -> Self {
        Self {
            is_covered: true,
            covered_amount,
            out_of_pocket: (medication.price - covered_amount).max(Decimal::ZERO),
            ..Self::uncovered(medication)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CoverageReport {
    pub is_connected: bool,
    pub provider: String,
    pub policy_id: String,
    pub plan_name: String,
    pub covered_count: usize,
    pub total_count: usize,
    pub coverage_percentage: Decimal,
    pub covered_amount: Decimal,
    pub amount_percentage: Decimal,
    pub out_of_pocket: Decimal,
    pub medications: Vec<CoverageResult>,
}

impl CoverageReport {
    pub fn from_results(insurance: &InsuranceProfile, medications: Vec<CoverageResult>) -> Self {
        let covered_count = medications.iter().filter(|m| m.is_covered).count();
        let total_count = medications.len();
        let total_price = medications.iter().map(|m| m.price).sum::<Decimal>();
        let covered_amount = medications.iter().map(|m| m.covered_amount).sum::<Decimal>();
        Self {
            is_connected: insurance.is_connected,
            provider: insurance.provider.clone(),
            policy_id: insurance.policy_id.clone(),
            plan_name: insurance.plan_name.clone(),
            covered_count,
            total_count,
            coverage_percentage: percentage(
                Decimal::from(covered_count as u64),
                Decimal::from(total_count as u64),
            ),
            covered_amount,
            amount_percentage: percentage(covered_amount, total_price),
            out_of_pocket: total_price - covered_amount,
            medications,
        }
    }
}
