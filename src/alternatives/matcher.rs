use std::cmp::Ordering;
use std::collections::BTreeSet;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::alternatives::{AlternativeCandidate, MAX_SIMILARITY};
use crate::error::{EvaluationError, LookupKind};
use crate::medication::{normalize_name, MedicationEntry};
use crate::sources::{guarded_lookup, DrugCatalog, LookupPolicy};

pub async fn find_alternatives(
    catalog: &dyn DrugCatalog,
    policy: &LookupPolicy,
    medication: &MedicationEntry,
) -> Result<Vec<AlternativeCandidate>, EvaluationError> {
    medication.validate(0)?;
    let label = format!("alternatives for {} via {}", medication.name, catalog.name());
    let raw = guarded_lookup(policy, &label, || catalog.alternatives_for(medication))
        .await
        .map_err(|error| EvaluationError::LookupUnavailable {
            lookup: LookupKind::Alternatives,
            reason: error.to_string(),
        })?;
    let ranked = rank_candidates(medication, raw);
    debug!("{label}: {} candidates", ranked.len());
    Ok(ranked)
}

/// Orders candidates and sets the single `recommended` flag.
pub fn rank_candidates(
    medication: &MedicationEntry,
    raw: Vec<AlternativeCandidate>,
) -> Vec<AlternativeCandidate> {
    let original = medication.key();
    let mut candidates = raw
        .into_iter()
        .filter(|candidate| {
            if normalize_name(&candidate.name) == original || candidate.name.trim().is_empty() {
                return false;
            }
            if candidate.price < Decimal::ZERO {
                warn!(
                    "dropping alternative {} for {}: negative price {}",
                    candidate.name, medication.name, candidate.price
                );
                return false;
            }
            true
        })
        .map(|mut candidate| {
            candidate.similarity_score = candidate.similarity_score.min(MAX_SIMILARITY);
            candidate.recommended = false;
            candidate
        })
        .collect::<Vec<_>>();

    candidates.sort_by(compare_candidates);

    let mut seen = BTreeSet::new();
    candidates.retain(|candidate| seen.insert(normalize_name(&candidate.name)));

    let pick = candidates
        .iter()
        .position(|candidate| candidate.coverage)
        .or_else(|| (!candidates.is_empty()).then_some(0));
    if let Some(idx) = pick {
        candidates[idx].recommended = true;
    }
    candidates
}

/// Similarity desc, then price asc, then name so the order is total.
pub fn compare_candidates(a: &AlternativeCandidate, b: &AlternativeCandidate) -> Ordering {
    b.similarity_score
        .cmp(&a.similarity_score)
        .then_with(|| a.price.cmp(&b.price))
        .then_with(|| normalize_name(&a.name).cmp(&normalize_name(&b.name)))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tokio_test::assert_err;

    use super::*;
    use crate::sources::{DrugSummary, LookupError};

    struct FixedCatalog(Vec<AlternativeCandidate>);

    #[async_trait]
    impl DrugCatalog for FixedCatalog {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn alternatives_for(
            &self,
            medication: &MedicationEntry,
        ) -> Result<Vec<AlternativeCandidate>, LookupError> {
            if medication.key() == "paracetamol" {
                Ok(self.0.clone())
            } else {
                Ok(Vec::new())
            }
        }

        async fn search(&self, _: &str, _: usize) -> Result<Vec<DrugSummary>, LookupError> {
            Ok(Vec::new())
        }
    }

    struct DownCatalog;

    #[async_trait]
    impl DrugCatalog for DownCatalog {
        fn name(&self) -> &str {
            "down"
        }

        async fn alternatives_for(
            &self,
            _: &MedicationEntry,
        ) -> Result<Vec<AlternativeCandidate>, LookupError> {
            Err(LookupError::Timeout)
        }

        async fn search(&self, _: &str, _: usize) -> Result<Vec<DrugSummary>, LookupError> {
            Err(LookupError::Timeout)
        }
    }

    fn paracetamol() -> MedicationEntry {
        MedicationEntry::new("Paracetamol", dec!(40))
    }

    fn dolo_and_crocin() -> Vec<AlternativeCandidate> {
        vec![
            AlternativeCandidate::new("Dolo", dec!(35), 95).with_coverage(true),
            AlternativeCandidate::new("Crocin", dec!(50), 98).with_coverage(false),
        ]
    }

    #[tokio::test]
    async fn recommends_best_covered_candidate() {
        let catalog = FixedCatalog(dolo_and_crocin());
        let ranked = find_alternatives(&catalog, &LookupPolicy::default(), &paracetamol())
            .await
            .unwrap();

        let names = ranked.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Crocin", "Dolo"]);
        assert!(!ranked[0].recommended);
        assert!(ranked[1].recommended);
        assert_eq!(ranked[1].savings_against(&paracetamol()), dec!(5));
        assert_eq!(ranked[0].savings_against(&paracetamol()), dec!(-10));
    }

    #[test]
    fn falls_back_to_global_best_when_nothing_is_covered() {
        let raw = vec![
            AlternativeCandidate::new("A", dec!(10), 70),
            AlternativeCandidate::new("B", dec!(12), 90),
        ];
        let ranked = rank_candidates(&paracetamol(), raw);
        assert_eq!(ranked[0].name, "B");
        assert!(ranked[0].recommended);
        assert_eq!(ranked.iter().filter(|c| c.recommended).count(), 1);
    }

    #[test]
    fn breaks_similarity_ties_by_price() {
        let raw = vec![
            AlternativeCandidate::new("Pricey", dec!(80), 90).with_coverage(true),
            AlternativeCandidate::new("Cheap", dec!(20), 90).with_coverage(true),
        ];
        let ranked = rank_candidates(&paracetamol(), raw);
        assert_eq!(ranked[0].name, "Cheap");
        assert!(ranked[0].recommended);
        assert!(!ranked[1].recommended);
    }

    #[test]
    fn drops_self_negative_price_and_duplicates() {
        let raw = vec![
            AlternativeCandidate::new("paracetamol ", dec!(30), 100),
            AlternativeCandidate::new("Broken", dec!(-1), 99),
            AlternativeCandidate::new("Dolo", dec!(35), 95),
            AlternativeCandidate::new("DOLO", dec!(33), 80),
        ];
        let ranked = rank_candidates(&paracetamol(), raw);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].price, dec!(35));
    }

    #[test]
    fn exactly_one_recommended_for_many_candidates() {
        let raw = (0..10u8)
            .map(|i| {
                AlternativeCandidate::new(&format!("Alt{i}"), Decimal::from(i), 50 + i * 5)
                    .with_coverage(i % 3 == 0)
            })
            .collect::<Vec<_>>();
        let ranked = rank_candidates(&paracetamol(), raw);
        assert_eq!(ranked.iter().filter(|c| c.recommended).count(), 1);
        let recommended = ranked.iter().find(|c| c.recommended).unwrap();
        let best_covered = ranked
            .iter()
            .filter(|c| c.coverage)
            .map(|c| c.similarity_score)
            .max()
            .unwrap();
        assert_eq!(recommended.similarity_score, best_covered);
        assert!(ranked
            .windows(2)
            .all(|w| w[0].similarity_score >= w[1].similarity_score));
    }

    #[tokio::test]
    async fn unknown_medication_is_empty_not_error() {
        let catalog = FixedCatalog(dolo_and_crocin());
        let ranked = find_alternatives(
            &catalog,
            &LookupPolicy::default(),
            &MedicationEntry::new("Unobtainium", dec!(10)),
        )
        .await
        .unwrap();
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn backend_timeout_is_lookup_unavailable() {
        let err = assert_err!(
            find_alternatives(&DownCatalog, &LookupPolicy::default(), &paracetamol()).await
        );
        assert!(matches!(
            err,
            EvaluationError::LookupUnavailable {
                lookup: LookupKind::Alternatives,
                ..
            }
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn rejects_invalid_entry_before_lookup() {
        let err = find_alternatives(
            &DownCatalog,
            &LookupPolicy::default(),
            &MedicationEntry::new("", dec!(10)),
        )
        .await
        .unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[tokio::test]
    async fn repeated_calls_are_identical() {
        let catalog = FixedCatalog(dolo_and_crocin());
        let policy = LookupPolicy::default();
        let first = find_alternatives(&catalog, &policy, &paracetamol()).await.unwrap();
        let second = find_alternatives(&catalog, &policy, &paracetamol()).await.unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
