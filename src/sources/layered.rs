use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::alternatives::AlternativeCandidate;
use crate::interactions::InteractionFinding;
use crate::medication::{normalize_name, MedicationEntry};
use crate::sources::{DrugCatalog, DrugSummary, InteractionSource, LookupError};

/// Merges catalogs in priority order. Any failing layer fails the lookup.
#[derive(Clone)]
pub struct LayeredCatalog {
    layers: Vec<Arc<dyn DrugCatalog>>,
    label: String,
}

impl LayeredCatalog {
    pub fn new(layers: Vec<Arc<dyn DrugCatalog>>) -> Self {
        let label = layered_label(layers.iter().map(|layer| layer.name()));
        Self { layers, label }
    }
}

#[async_trait]
impl DrugCatalog for LayeredCatalog {
    fn name(&self) -> &str {
        &self.label
    }

    async fn alternatives_for(
        &self,
        medication: &MedicationEntry,
    ) -> Result<Vec<AlternativeCandidate>, LookupError> {
        let mut merged: Vec<AlternativeCandidate> = Vec::new();
        let mut index = BTreeMap::new();
        for layer in &self.layers {
            for candidate in layer.alternatives_for(medication).await? {
                let key = normalize_name(&candidate.name);
                match index.get(&key) {
                    Some(&pos) => fill_missing(&mut merged[pos], candidate),
                    None => {
                        index.insert(key, merged.len());
                        merged.push(candidate);
                    }
                }
            }
        }
        Ok(merged)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<DrugSummary>, LookupError> {
        let mut merged: Vec<DrugSummary> = Vec::new();
        for layer in &self.layers {
            if merged.len() >= limit {
                break;
            }
            for drug in layer.search(query, limit).await? {
                let key = normalize_name(&drug.name);
                if !merged.iter().any(|seen| normalize_name(&seen.name) == key) {
                    merged.push(drug);
                }
            }
        }
        merged.truncate(limit);
        Ok(merged)
    }
}

/// Earlier layers win; later ones only fill blank descriptive fields.
fn fill_missing(kept: &mut AlternativeCandidate, later: AlternativeCandidate) {
    if kept.dosage.trim().is_empty() {
        kept.dosage = later.dosage;
    }
    if kept.manufacturer.trim().is_empty() {
        kept.manufacturer = later.manufacturer;
    }
}

#[derive(Clone)]
pub struct LayeredInteractions {
    layers: Vec<Arc<dyn InteractionSource>>,
    label: String,
}

impl LayeredInteractions {
    pub fn new(layers: Vec<Arc<dyn InteractionSource>>) -> Self {
        let label = layered_label(layers.iter().map(|layer| layer.name()));
        Self { layers, label }
    }
}

#[async_trait]
impl InteractionSource for LayeredInteractions {
    fn name(&self) -> &str {
        &self.label
    }

    async fn interaction_between(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<InteractionFinding>, LookupError> {
        for layer in &self.layers {
            if let Some(finding) = layer.interaction_between(a, b).await? {
                return Ok(Some(finding));
            }
        }
        Ok(None)
    }
}

fn layered_label<'a>(names: impl Iterator<Item = &'a str>) -> String {
    format!("layered({})", names.collect::<Vec<_>>().join(" > "))
}
