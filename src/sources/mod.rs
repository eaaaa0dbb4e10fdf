pub mod http;
pub mod layered;
pub mod static_source;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::alternatives::AlternativeCandidate;
use crate::config::{Config, KnowledgeSourceKind};
use crate::coverage::{CoverageDecision, InsuranceProfile};
use crate::interactions::InteractionFinding;
use crate::medication::{DrugType, MedicationEntry};
use crate::sources::http::HttpKnowledgeSource;
use crate::sources::layered::{LayeredCatalog, LayeredInteractions};
use crate::sources::static_source::StaticKnowledge;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("lookup timed out")]
    Timeout,
    #[error("{0}")]
    Unavailable(String),
}

/// Catalog row returned by drug search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrugSummary {
    pub name: String,
    #[serde(rename = "type", default)]
    pub drug_type: DrugType,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub price: Decimal,
}

#[async_trait]
pub trait DrugCatalog: Send + Sync {
    fn name(&self) -> &str;
    /// Unranked substitutes; an unknown medication yields an empty list.
    async fn alternatives_for(
        &self,
        medication: &MedicationEntry,
    ) -> Result<Vec<AlternativeCandidate>, LookupError>;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<DrugSummary>, LookupError>;
}

#[async_trait]
pub trait InteractionSource: Send + Sync {
    fn name(&self) -> &str;
    /// Must answer the same for `(a, b)` and `(b, a)`.
    async fn interaction_between(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<InteractionFinding>, LookupError>;
}

#[async_trait]
pub trait CoverageSource: Send + Sync {
    fn name(&self) -> &str;
    async fn coverage_for(
        &self,
        insurance: &InsuranceProfile,
        medication: &MedicationEntry,
    ) -> Result<CoverageDecision, LookupError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupPolicy {
    pub timeout: Duration,
    pub retry_on_timeout: bool,
    pub max_concurrent_lookups: usize,
}

impl LookupPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_millis(config.lookup.timeout_ms.max(1)),
            retry_on_timeout: config.lookup.retry_on_timeout,
            max_concurrent_lookups: config.lookup.max_concurrent_lookups.max(1),
        }
    }
}

impl Default for LookupPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2_500),
            retry_on_timeout: true,
            max_concurrent_lookups: 8,
        }
    }
}

/// Runs one knowledge-source call under the policy timeout.
///
/// A timeout (ours or one the source reports) is retried once when the
/// policy allows it. `Unavailable` is returned as-is.
pub async fn guarded_lookup<T, F, Fut>(
    policy: &LookupPolicy,
    label: &str,
    mut call: F,
) -> Result<T, LookupError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LookupError>>,
{
    let attempts = if policy.retry_on_timeout { 2 } else { 1 };
    for attempt in 1..=attempts {
        debug!("{label}: attempt {attempt}/{attempts}");
        match tokio::time::timeout(policy.timeout, call()).await {
            Ok(Err(LookupError::Timeout)) | Err(_) => {
                warn!(
                    "{label}: timed out after {}ms (attempt {attempt}/{attempts})",
                    policy.timeout.as_millis()
                );
            }
            Ok(result) => return result,
        }
    }
    Err(LookupError::Timeout)
}

#[derive(Clone)]
pub struct KnowledgeBase {
    pub catalog: Arc<dyn DrugCatalog>,
    pub interactions: Arc<dyn InteractionSource>,
    pub coverage: Arc<dyn CoverageSource>,
}

impl KnowledgeBase {
    pub fn new(
        catalog: Arc<dyn DrugCatalog>,
        interactions: Arc<dyn InteractionSource>,
        coverage: Arc<dyn CoverageSource>,
    ) -> Self {
        Self {
            catalog,
            interactions,
            coverage,
        }
    }

    pub fn from_static(knowledge: Arc<StaticKnowledge>) -> Self {
        Self {
            catalog: knowledge.clone(),
            interactions: knowledge.clone(),
            coverage: knowledge,
        }
    }

    pub fn seeded() -> Self {
        Self::from_static(StaticKnowledge::seeded())
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let local = match config.resolved_dataset_path() {
            Some(path) => Arc::new(StaticKnowledge::from_path(&path)?),
            None => StaticKnowledge::seeded(),
        };
        let base = match config.knowledge.source {
            KnowledgeSourceKind::Static => return Ok(Self::from_static(local)),
            KnowledgeSourceKind::Http | KnowledgeSourceKind::Layered => {
                if config.knowledge.base_url.trim().is_empty() {
                    return Err(anyhow!(
                        "knowledge.base_url is required for the {} source",
                        config.knowledge.source
                    ));
                }
                Arc::new(HttpKnowledgeSource::new(
                    &config.knowledge.base_url,
                    Duration::from_millis(config.lookup.timeout_ms.max(1)),
                )?)
            }
        };
        if config.knowledge.source == KnowledgeSourceKind::Http {
            return Ok(Self::new(base.clone(), base.clone(), base));
        }
        let catalog = LayeredCatalog::new(vec![
            base.clone() as Arc<dyn DrugCatalog>,
            local.clone() as Arc<dyn DrugCatalog>,
        ]);
        let interactions = LayeredInteractions::new(vec![
            base.clone() as Arc<dyn InteractionSource>,
            local as Arc<dyn InteractionSource>,
        ]);
        Ok(Self::new(Arc::new(catalog), Arc::new(interactions), base))
    }
}
