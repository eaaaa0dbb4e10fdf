use anyhow::Result;
use tracing::info;

use crate::alternatives::matcher;
use crate::alternatives::AlternativeCandidate;
use crate::config::Config;
use crate::coverage::reconciler;
use crate::coverage::{CoverageReport, InsuranceProfile};
use crate::error::{EvaluationError, LookupKind};
use crate::interactions::aggregator;
use crate::interactions::InteractionSummary;
use crate::medication::{validate_all, MedicationEntry};
use crate::report::{AlternativesEntry, Prescription, PrescriptionReport};
use crate::sources::{guarded_lookup, DrugSummary, KnowledgeBase, LookupPolicy};

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Runs the three components against one knowledge base.
#[derive(Clone)]
pub struct Evaluator {
    knowledge: KnowledgeBase,
    policy: LookupPolicy,
    default_insurance: InsuranceProfile,
}

impl Evaluator {
    pub fn new(knowledge: KnowledgeBase, policy: LookupPolicy) -> Self {
        Self {
            knowledge,
            policy,
            default_insurance: InsuranceProfile::disconnected(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            KnowledgeBase::from_config(config)?,
            LookupPolicy::from_config(config),
        )
        .with_default_insurance(config.insurance.profile()))
    }

    pub fn with_default_insurance(mut self, insurance: InsuranceProfile) -> Self {
        self.default_insurance = insurance;
        self
    }

    pub fn default_insurance(&self) -> &InsuranceProfile {
        &self.default_insurance
    }

    pub async fn find_alternatives(
        &self,
        medication: &MedicationEntry,
    ) -> Result<Vec<AlternativeCandidate>, EvaluationError> {
        matcher::find_alternatives(self.knowledge.catalog.as_ref(), &self.policy, medication).await
    }

    /// Ranked substitutes per entry, priced under `insurance` when connected.
    async fn ranked_alternatives(
        &self,
        medications: &[MedicationEntry],
        insurance: &InsuranceProfile,
    ) -> Result<Vec<Vec<AlternativeCandidate>>, EvaluationError> {
        let mut ranked = Vec::with_capacity(medications.len());
        for medication in medications {
            let candidates = self.find_alternatives(medication).await?;
            ranked.push(
                reconciler::price_alternatives(
                    self.knowledge.coverage.as_ref(),
                    &self.policy,
                    insurance,
                    medication,
                    candidates,
                )
                .await?,
            );
        }
        Ok(ranked)
    }

    /// Alternatives view for every entry. `original_coverage` stays false
    /// because the prescribed drugs themselves are not looked up here.
    pub async fn alternatives_for_all(
        &self,
        medications: &[MedicationEntry],
        insurance: &InsuranceProfile,
    ) -> Result<Vec<AlternativesEntry>, EvaluationError> {
        validate_all(medications)?;
        let ranked = self.ranked_alternatives(medications, insurance).await?;
        Ok(medications
            .iter()
            .zip(&ranked)
            .map(|(medication, candidates)| AlternativesEntry::new(medication, false, candidates))
            .collect())
    }

    pub async fn check_interactions(
        &self,
        medications: &[MedicationEntry],
    ) -> Result<InteractionSummary, EvaluationError> {
        aggregator::check_interactions(
            self.knowledge.interactions.clone(),
            &self.policy,
            medications,
        )
        .await
    }

    pub async fn reconcile_coverage(
        &self,
        medications: &[MedicationEntry],
        insurance: &InsuranceProfile,
    ) -> Result<CoverageReport, EvaluationError> {
        reconciler::reconcile_coverage(
            self.knowledge.coverage.as_ref(),
            self.knowledge.catalog.as_ref(),
            &self.policy,
            medications,
            insurance,
        )
        .await
    }

    /// Alternatives and interactions run concurrently, then coverage reuses
    /// the ranked lists. The first failure fails the report.
    pub async fn evaluate_prescription(
        &self,
        prescription: &Prescription,
    ) -> Result<PrescriptionReport, EvaluationError> {
        let medications = prescription.medications.as_slice();
        validate_all(medications)?;
        let insurance = prescription.insurance_or(&self.default_insurance);

        let (ranked, interactions) = tokio::try_join!(
            self.ranked_alternatives(medications, &insurance),
            self.check_interactions(medications),
        )?;
        let coverage = reconciler::reconcile_with_ranked(
            self.knowledge.coverage.as_ref(),
            &self.policy,
            medications,
            &insurance,
            &ranked,
        )
        .await?;

        let alternatives = medications
            .iter()
            .zip(&ranked)
            .zip(&coverage.medications)
            .map(|((medication, candidates), result)| {
                AlternativesEntry::new(medication, result.is_covered, candidates)
            })
            .collect();

        info!(
            "evaluated {} medications: {} interactions ({} high), {}/{} covered",
            medications.len(),
            interactions.total(),
            interactions.high_count,
            coverage.covered_count,
            coverage.total_count
        );
        Ok(PrescriptionReport {
            alternatives,
            interactions,
            coverage,
        })
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<DrugSummary>, EvaluationError> {
        if query.trim().is_empty() {
            return Err(EvaluationError::InvalidQuery(
                "search query is required".to_string(),
            ));
        }
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
        let catalog = self.knowledge.catalog.as_ref();
        let label = format!("search {query:?} via {}", catalog.name());
        guarded_lookup(&self.policy, &label, || catalog.search(query, limit))
            .await
            .map_err(|error| EvaluationError::LookupUnavailable {
                lookup: LookupKind::Search,
                reason: error.to_string(),
            })
    }
}
