use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::alternatives::matcher::{find_alternatives, rank_candidates};
use crate::alternatives::AlternativeCandidate;
use crate::coverage::{CoverageDecision, CoverageReport, CoverageResult, InsuranceProfile};
use crate::error::EvaluationError;
use crate::medication::{round_currency, validate_all, MedicationEntry};
use crate::sources::{guarded_lookup, CoverageSource, DrugCatalog, LookupPolicy};

/// Where uncovered items get their substitutes from.
#[derive(Clone, Copy)]
enum Substitutes<'a> {
    Lookup(&'a dyn DrugCatalog),
    /// One list per medication, already priced under the same profile.
    Ranked(&'a [Vec<AlternativeCandidate>]),
}

pub async fn reconcile_coverage(
    coverage: &dyn CoverageSource,
    catalog: &dyn DrugCatalog,
    policy: &LookupPolicy,
    medications: &[MedicationEntry],
    insurance: &InsuranceProfile,
) -> Result<CoverageReport, EvaluationError> {
    reconcile(
        coverage,
        policy,
        medications,
        insurance,
        Substitutes::Lookup(catalog),
    )
    .await
}

/// Like [`reconcile_coverage`], reusing lists from [`price_alternatives`]
/// instead of asking the catalog again.
pub async fn reconcile_with_ranked(
    coverage: &dyn CoverageSource,
    policy: &LookupPolicy,
    medications: &[MedicationEntry],
    insurance: &InsuranceProfile,
    ranked: &[Vec<AlternativeCandidate>],
) -> Result<CoverageReport, EvaluationError> {
    reconcile(
        coverage,
        policy,
        medications,
        insurance,
        Substitutes::Ranked(ranked),
    )
    .await
}

async fn reconcile(
    coverage: &dyn CoverageSource,
    policy: &LookupPolicy,
    medications: &[MedicationEntry],
    insurance: &InsuranceProfile,
    substitutes: Substitutes<'_>,
) -> Result<CoverageReport, EvaluationError> {
    validate_all(medications)?;

    if !insurance.is_connected {
        info!(
            "insurance not connected; reporting {} medications as uncovered",
            medications.len()
        );
        let results = medications.iter().map(CoverageResult::uncovered).collect();
        return Ok(CoverageReport::from_results(insurance, results));
    }

    let mut results = Vec::with_capacity(medications.len());
    for (index, medication) in medications.iter().enumerate() {
        let decision = lookup_decision(coverage, policy, insurance, medication).await?;

        let result = if decision.is_covered {
            apply_decision(medication, &decision)
        } else {
            let candidates = match substitutes {
                Substitutes::Lookup(catalog) => {
                    let ranked = find_alternatives(catalog, policy, medication).await?;
                    price_alternatives(coverage, policy, insurance, medication, ranked).await?
                }
                Substitutes::Ranked(lists) => lists.get(index).cloned().unwrap_or_default(),
            };
            let covered_alternatives = candidates
                .into_iter()
                .filter(|candidate| candidate.coverage)
                .collect::<Vec<_>>();
            debug!(
                "{} not covered; {} covered alternatives",
                medication.name,
                covered_alternatives.len()
            );
            CoverageResult {
                alternatives: covered_alternatives,
                ..CoverageResult::uncovered(medication)
            }
        };
        results.push(result);
    }

    let report = CoverageReport::from_results(insurance, results);
    info!(
        "coverage {}/{} items, {}% of amount",
        report.covered_count, report.total_count, report.amount_percentage
    );
    Ok(report)
}

/// Asks the user's payer about every candidate and re-ranks, so `coverage`
/// and `recommended` follow this policy rather than the catalog's flag.
/// A disconnected profile keeps the catalog's view and gets no amounts.
pub async fn price_alternatives(
    coverage: &dyn CoverageSource,
    policy: &LookupPolicy,
    insurance: &InsuranceProfile,
    medication: &MedicationEntry,
    candidates: Vec<AlternativeCandidate>,
) -> Result<Vec<AlternativeCandidate>, EvaluationError> {
    if !insurance.is_connected || candidates.is_empty() {
        return Ok(candidates);
    }
    let mut priced = Vec::with_capacity(candidates.len());
    for mut candidate in candidates {
        let entry = candidate.as_entry();
        let decision = lookup_decision(coverage, policy, insurance, &entry).await?;
        let result = if decision.is_covered {
            apply_decision(&entry, &decision)
        } else {
            CoverageResult::uncovered(&entry)
        };
        candidate.coverage = result.is_covered;
        candidate.out_of_pocket = Some(result.out_of_pocket);
        candidate.tier = result.tier;
        priced.push(candidate);
    }
    Ok(rank_candidates(medication, priced))
}

async fn lookup_decision(
    coverage: &dyn CoverageSource,
    policy: &LookupPolicy,
    insurance: &InsuranceProfile,
    medication: &MedicationEntry,
) -> Result<CoverageDecision, EvaluationError> {
    let label = format!(
        "coverage for {} under {}/{} via {}",
        medication.name,
        insurance.provider,
        insurance.policy_id,
        coverage.name()
    );
    guarded_lookup(policy, &label, || {
        coverage.coverage_for(insurance, medication)
    })
    .await
    .map_err(|error| EvaluationError::CoverageLookupUnavailable {
        reason: error.to_string(),
    })
}

/// Clamps the source amount into `[0, price]` before deriving out-of-pocket.
fn apply_decision(medication: &MedicationEntry, decision: &CoverageDecision) -> CoverageResult {
    let reported = round_currency(decision.covered_amount);
    let covered_amount = reported.max(Decimal::ZERO).min(medication.price);
    if covered_amount != reported {
        warn!(
            "clamped covered amount for {} from {} to {}",
            medication.name, reported, covered_amount
        );
    }
    CoverageResult {
        tier: decision.tier,
        prior_authorization: decision.prior_authorization,
        ..CoverageResult::covered(medication, covered_amount)
    }
}
