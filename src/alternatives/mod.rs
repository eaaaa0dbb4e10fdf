pub mod matcher;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::medication::{DrugType, MedicationEntry};

pub const MAX_SIMILARITY: u8 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlternativeCandidate {
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(rename = "type", default)]
    pub drug_type: DrugType,
    pub price: Decimal,
    #[serde(deserialize_with = "clamped_similarity")]
    pub similarity_score: u8,
    #[serde(default)]
    pub coverage: bool,
    #[serde(default)]
    pub recommended: bool,
    /// Patient share under the user's policy, set once a payer has priced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_of_pocket: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<u8>,
}

/// Sources may report any number; it is rounded into `0..=100`.
fn clamped_similarity<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(raw.round().clamp(0.0, f64::from(MAX_SIMILARITY)) as u8)
}

impl AlternativeCandidate {
    pub fn new(name: &str, price: Decimal, similarity_score: u8) -> Self {
        Self {
            name: name.to_string(),
            dosage: String::new(),
            manufacturer: String::new(),
            drug_type: DrugType::Generic,
            price,
            similarity_score: similarity_score.min(MAX_SIMILARITY),
            coverage: false,
            recommended: false,
            out_of_pocket: None,
            tier: None,
        }
    }

    pub fn with_dosage(mut self, dosage: &str) -> Self {
        self.dosage = dosage.to_string();
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: &str) -> Self {
        self.manufacturer = manufacturer.to_string();
        self
    }

    pub fn with_type(mut self, drug_type: DrugType) -> Self {
        self.drug_type = drug_type;
        self
    }

    pub fn with_coverage(mut self, coverage: bool) -> Self {
        self.coverage = coverage;
        self
    }

    /// The substitute as a medication the payer can be asked about.
    pub fn as_entry(&self) -> MedicationEntry {
        MedicationEntry::new(&self.name, self.price)
            .with_dosage(&self.dosage)
            .with_type(self.drug_type)
    }

    /// Positive when the substitute is cheaper. Never clamped.
    pub fn savings_against(&self, medication: &MedicationEntry) -> Decimal {
        medication.price - self.price
    }
}
