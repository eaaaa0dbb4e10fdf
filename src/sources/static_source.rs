use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alternatives::AlternativeCandidate;
use crate::coverage::formulary::{match_rule, FormularyRule};
use crate::coverage::{CoverageDecision, InsuranceProfile};
use crate::interactions::aggregator::same_pair;
use crate::interactions::{InteractionFinding, Severity};
use crate::medication::{normalize_name, DrugType, MedicationEntry};
use crate::sources::{CoverageSource, DrugCatalog, DrugSummary, InteractionSource, LookupError};

static SEEDED: Lazy<Arc<StaticKnowledge>> =
    Lazy::new(|| Arc::new(StaticKnowledge::from_dataset(seed_dataset())));

/// On-disk shape of a local knowledge file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeDataset {
    #[serde(default)]
    pub drugs: Vec<DrugSummary>,
    /// Keyed by the prescribed medication's name.
    #[serde(default)]
    pub alternatives: BTreeMap<String, Vec<AlternativeCandidate>>,
    #[serde(default)]
    pub interactions: Vec<InteractionFinding>,
    /// Keyed by covered drug name.
    #[serde(default)]
    pub formulary: BTreeMap<String, FormularyRule>,
}

/// In-memory drug, interaction and formulary tables.
///
/// A single formulary is applied to every connected policy.
#[derive(Debug, Clone)]
pub struct StaticKnowledge {
    drugs: Vec<DrugSummary>,
    alternatives: BTreeMap<String, Vec<AlternativeCandidate>>,
    interactions: Vec<InteractionFinding>,
    formulary: BTreeMap<String, FormularyRule>,
}

impl StaticKnowledge {
    pub fn seeded() -> Arc<Self> {
        SEEDED.clone()
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading knowledge dataset {}", path.display()))?;
        let dataset: KnowledgeDataset = serde_json::from_str(&raw)
            .with_context(|| format!("invalid knowledge dataset {}", path.display()))?;
        let knowledge = Self::from_dataset(dataset);
        debug!(
            "loaded {} drugs, {} interactions, {} formulary rules from {}",
            knowledge.drugs.len(),
            knowledge.interactions.len(),
            knowledge.formulary.len(),
            path.display()
        );
        Ok(knowledge)
    }

    pub fn from_dataset(dataset: KnowledgeDataset) -> Self {
        let alternatives = dataset
            .alternatives
            .into_iter()
            .map(|(name, candidates)| (normalize_name(&name), candidates))
            .collect();
        let formulary = dataset
            .formulary
            .into_iter()
            .map(|(name, rule)| (normalize_name(&name), rule))
            .collect();
        let mut drugs = dataset.drugs;
        drugs.sort_by_key(|drug| normalize_name(&drug.name));
        drugs.dedup_by_key(|drug| normalize_name(&drug.name));
        Self {
            drugs,
            alternatives,
            interactions: dataset.interactions,
            formulary,
        }
    }

    pub fn dataset(&self) -> KnowledgeDataset {
        KnowledgeDataset {
            drugs: self.drugs.clone(),
            alternatives: self.alternatives.clone(),
            interactions: self.interactions.clone(),
            formulary: self.formulary.clone(),
        }
    }

    fn is_on_formulary(&self, name: &str) -> bool {
        match_rule(&self.formulary, name).is_some()
    }
}

#[async_trait]
impl DrugCatalog for StaticKnowledge {
    fn name(&self) -> &str {
        "static"
    }

    async fn alternatives_for(
        &self,
        medication: &MedicationEntry,
    ) -> Result<Vec<AlternativeCandidate>, LookupError> {
        let Some(candidates) = self.alternatives.get(&medication.key()) else {
            return Ok(Vec::new());
        };
        Ok(candidates
            .iter()
            .cloned()
            .map(|mut candidate| {
                candidate.coverage = candidate.coverage || self.is_on_formulary(&candidate.name);
                candidate
            })
            .collect())
    }

    /// Prefix matches first, then substring matches, each by name.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<DrugSummary>, LookupError> {
        let needle = normalize_name(query);
        if needle.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let mut hits = self
            .drugs
            .iter()
            .filter_map(|drug| {
                let name = normalize_name(&drug.name);
                if name.starts_with(&needle) {
                    Some((0u8, drug))
                } else if name.contains(&needle) {
                    Some((1u8, drug))
                } else {
                    None
                }
            })
            .collect::<Vec<_>>();
        hits.sort_by_key(|(rank, drug)| (*rank, normalize_name(&drug.name)));
        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(_, drug)| drug.clone())
            .collect())
    }
}

#[async_trait]
impl InteractionSource for StaticKnowledge {
    fn name(&self) -> &str {
        "static"
    }

    async fn interaction_between(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<InteractionFinding>, LookupError> {
        Ok(self
            .interactions
            .iter()
            .find(|finding| same_pair(finding, a, b))
            .cloned())
    }
}

#[async_trait]
impl CoverageSource for StaticKnowledge {
    fn name(&self) -> &str {
        "static"
    }

    async fn coverage_for(
        &self,
        _insurance: &InsuranceProfile,
        medication: &MedicationEntry,
    ) -> Result<CoverageDecision, LookupError> {
        Ok(match_rule(&self.formulary, &medication.name)
            .map(|rule| rule.decide(medication.price))
            .unwrap_or_else(CoverageDecision::not_covered))
    }
}

fn drug(name: &str, drug_type: DrugType, manufacturer: &str, price: i64) -> DrugSummary {
    DrugSummary {
        name: name.to_string(),
        drug_type,
        manufacturer: manufacturer.to_string(),
        price: Decimal::from(price),
    }
}

fn alt(
    name: &str,
    dosage: &str,
    manufacturer: &str,
    price: i64,
    similarity: u8,
) -> AlternativeCandidate {
    AlternativeCandidate::new(name, Decimal::from(price), similarity)
        .with_dosage(dosage)
        .with_manufacturer(manufacturer)
}

fn seed_dataset() -> KnowledgeDataset {
    use DrugType::{Branded, Generic};

    let drugs = vec![
        drug("Paracetamol", Generic, "GSK", 40),
        drug("Dolo", Branded, "Micro Labs", 35),
        drug("Crocin", Branded, "GSK", 50),
        drug("Calpol", Branded, "GSK", 45),
        drug("Lipitor", Branded, "Pfizer", 250),
        drug("Atorvastatin", Generic, "Cipla Ltd.", 75),
        drug("Simvastatin", Generic, "Sun Pharma", 60),
        drug("Crestor", Branded, "AstraZeneca", 320),
        drug("Rosuvastatin", Generic, "Dr. Reddy's", 110),
        drug("Zestril", Branded, "AstraZeneca", 90),
        drug("Lisinopril", Generic, "Lupin", 20),
        drug("Prinivil", Branded, "Merck", 85),
        drug("Glucophage", Branded, "Merck", 70),
        drug("Metformin", Generic, "Sun Pharma", 15),
        drug("Warfarin", Generic, "Taro", 30),
        drug("Aspirin", Generic, "Bayer", 10),
        drug("Ibuprofen", Generic, "Abbott", 12),
        drug("Fluoxetine", Generic, "Eli Lilly", 25),
        drug("Clarithromycin", Generic, "Abbott", 55),
        drug("Amoxicillin", Generic, "Cipla Ltd.", 18),
        drug("Humira", Branded, "AbbVie", 2400),
    ];

    let alternatives = BTreeMap::from([
        (
            "paracetamol".to_string(),
            vec![
                alt("Dolo", "650mg", "Micro Labs", 35, 95),
                alt("Crocin", "500mg", "GSK", 50, 98).with_type(Branded),
                alt("Calpol", "500mg", "GSK", 45, 92).with_type(Branded),
            ],
        ),
        (
            "lipitor".to_string(),
            vec![
                alt("Atorvastatin", "20mg", "Cipla Ltd.", 75, 98),
                alt("Simvastatin", "40mg", "Sun Pharma", 60, 85),
                alt("Rosuvastatin", "10mg", "Dr. Reddy's", 110, 80),
            ],
        ),
        (
            "crestor".to_string(),
            vec![alt("Rosuvastatin", "10mg", "Dr. Reddy's", 110, 99)],
        ),
        (
            "zestril".to_string(),
            vec![
                alt("Lisinopril", "10mg", "Lupin", 20, 99),
                alt("Prinivil", "10mg", "Merck", 85, 97).with_type(Branded),
            ],
        ),
        (
            "glucophage".to_string(),
            vec![alt("Metformin", "500mg", "Sun Pharma", 15, 99)],
        ),
    ]);

    let interactions = vec![
        InteractionFinding::new("Warfarin", "Aspirin", Severity::High)
            .with_description("Combining these medications increases the risk of bleeding.")
            .with_effects(&[
                "Increased risk of internal bleeding",
                "Prolonged bleeding time",
                "Higher risk of gastrointestinal bleeding",
            ])
            .with_recommendations(&[
                "Avoid concurrent use if possible",
                "If concurrent use is necessary, monitor closely for signs of bleeding",
                "Consider reducing the warfarin dosage",
            ])
            .with_reference("Drug Interaction Study (2024)", "#")
            .with_reference("Clinical Guidelines on Anticoagulants", "#"),
        InteractionFinding::new("Simvastatin", "Clarithromycin", Severity::High)
            .with_description("Clarithromycin raises simvastatin levels sharply.")
            .with_effects(&["Muscle pain or weakness", "Risk of rhabdomyolysis"])
            .with_recommendations(&["Pause simvastatin during the antibiotic course"]),
        InteractionFinding::new("Fluoxetine", "Ibuprofen", Severity::Moderate)
            .with_description("This combination may increase the risk of gastrointestinal bleeding.")
            .with_effects(&[
                "Increased risk of stomach bleeding",
                "Possible stomach ulcers",
            ])
            .with_recommendations(&[
                "Consider an alternative pain reliever such as paracetamol",
                "Take ibuprofen with food",
            ])
            .with_reference("SSRI-NSAID Interaction Study", "#"),
        InteractionFinding::new("Ibuprofen", "Aspirin", Severity::Moderate)
            .with_description("Ibuprofen can blunt the antiplatelet effect of low-dose aspirin.")
            .with_recommendations(&["Take aspirin at least 30 minutes before ibuprofen"]),
        InteractionFinding::new("Lisinopril", "Ibuprofen", Severity::Moderate)
            .with_description("NSAIDs reduce the blood-pressure effect of ACE inhibitors.")
            .with_effects(&["Raised blood pressure", "Reduced kidney function"]),
        InteractionFinding::new("Paracetamol", "Warfarin", Severity::Low)
            .with_description("Regular paracetamol use may slightly raise INR.")
            .with_recommendations(&["Monitor INR when starting regular paracetamol"]),
    ];

    let tier = |n: u8| FormularyRule::standard_tier(n);
    let formulary = [
        ("dolo", 1),
        ("amoxicillin", 1),
        ("lisinopril", 1),
        ("metformin", 1),
        ("atorvastatin", 1),
        ("simvastatin", 1),
        ("lipitor", 2),
        ("zestril", 2),
        ("glucophage", 2),
        ("crestor", 3),
        ("prinivil", 3),
        ("humira", 4),
    ]
    .into_iter()
    .filter_map(|(name, n)| tier(n).map(|rule| (name.to_string(), rule)))
    .collect();

    KnowledgeDataset {
        drugs,
        alternatives,
        interactions,
        formulary,
    }
}
