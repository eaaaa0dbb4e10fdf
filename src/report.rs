use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::alternatives::AlternativeCandidate;
use crate::coverage::{CoverageReport, InsuranceProfile};
use crate::interactions::InteractionSummary;
use crate::medication::{DrugType, MedicationEntry};

/// Input document accepted by the CLI `--file` flag and the REST body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    #[serde(default)]
    pub medications: Vec<MedicationEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance: Option<InsuranceProfile>,
}

impl Prescription {
    pub fn new(medications: Vec<MedicationEntry>) -> Self {
        Self {
            medications,
            insurance: None,
        }
    }

    pub fn with_insurance(mut self, insurance: InsuranceProfile) -> Self {
        self.insurance = Some(insurance);
        self
    }

    pub fn insurance_or(&self, fallback: &InsuranceProfile) -> InsuranceProfile {
        self.insurance.clone().unwrap_or_else(|| fallback.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlternativeView {
    pub name: String,
    #[serde(rename = "type")]
    pub drug_type: DrugType,
    pub dosage: String,
    pub manufacturer: String,
    pub similarity_score: u8,
    pub price: Decimal,
    pub coverage: bool,
    pub recommended: bool,
    /// Original price minus this price; negative when the substitute costs more.
    pub savings: Decimal,
    /// What the patient would pay under the policy the list was priced for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_of_pocket: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlternativesEntry {
    pub original_name: String,
    pub original_type: DrugType,
    pub original_dosage: String,
    pub original_frequency: String,
    pub original_price: Decimal,
    pub original_coverage: bool,
    pub alternatives: Vec<AlternativeView>,
}

impl AlternativesEntry {
    pub fn new(
        medication: &MedicationEntry,
        original_coverage: bool,
        candidates: &[AlternativeCandidate],
    ) -> Self {
        Self {
            original_name: medication.name.clone(),
            original_type: medication.drug_type,
            original_dosage: medication.dosage.clone(),
            original_frequency: medication.frequency.clone(),
            original_price: medication.price,
            original_coverage,
            alternatives: candidates
                .iter()
                .map(|candidate| AlternativeView {
                    name: candidate.name.clone(),
                    drug_type: candidate.drug_type,
                    dosage: candidate.dosage.clone(),
                    manufacturer: candidate.manufacturer.clone(),
                    similarity_score: candidate.similarity_score,
                    price: candidate.price,
                    coverage: candidate.coverage,
                    recommended: candidate.recommended,
                    savings: candidate.savings_against(medication),
                    out_of_pocket: candidate.out_of_pocket,
                    tier: candidate.tier,
                })
                .collect(),
        }
    }

    pub fn recommended(&self) -> Option<&AlternativeView> {
        self.alternatives.iter().find(|alt| alt.recommended)
    }
}

/// Merged view handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionReport {
    pub alternatives: Vec<AlternativesEntry>,
    pub interactions: InteractionSummary,
    pub coverage: CoverageReport,
}

impl PrescriptionReport {
    /// Sum of positive savings from each recommended substitute.
    pub fn potential_savings(&self) -> Decimal {
        self.alternatives
            .iter()
            .filter_map(AlternativesEntry::recommended)
            .map(|alt| alt.savings.max(Decimal::ZERO))
            .sum()
    }
}
