use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::{EvaluationError, LookupKind};
use crate::interactions::{InteractionFinding, InteractionSummary};
use crate::medication::{normalize_name, validate_all, MedicationEntry};
use crate::sources::{guarded_lookup, InteractionSource, LookupError, LookupPolicy};

/// Unordered pairs in canonical order: i ascending, then j ascending.
///
/// Same-name pairs are skipped and each name pair appears once.
pub fn candidate_pairs(medications: &[MedicationEntry]) -> Vec<(usize, usize)> {
    let keys = medications.iter().map(MedicationEntry::key).collect::<Vec<_>>();
    let mut seen = BTreeSet::new();
    let mut pairs = Vec::new();
    for i in 0..keys.len() {
        for j in (i + 1)..keys.len() {
            if keys[i] == keys[j] {
                continue;
            }
            let identity = if keys[i] < keys[j] {
                (keys[i].clone(), keys[j].clone())
            } else {
                (keys[j].clone(), keys[i].clone())
            };
            if seen.insert(identity) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

pub async fn check_interactions(
    source: Arc<dyn InteractionSource>,
    policy: &LookupPolicy,
    medications: &[MedicationEntry],
) -> Result<InteractionSummary, EvaluationError> {
    validate_all(medications)?;
    let pairs = candidate_pairs(medications);
    if pairs.is_empty() {
        return Ok(InteractionSummary::default());
    }

    let limiter = Arc::new(Semaphore::new(policy.max_concurrent_lookups.max(1)));
    let mut tasks = JoinSet::new();
    for (order, (i, j)) in pairs.iter().copied().enumerate() {
        let source = source.clone();
        let limiter = limiter.clone();
        let policy = *policy;
        let a = medications[i].name.clone();
        let b = medications[j].name.clone();
        tasks.spawn(async move {
            let _permit = limiter
                .acquire_owned()
                .await
                .map_err(|_| LookupError::Unavailable("lookup limiter closed".to_string()))?;
            let label = format!("interaction {a} + {b} via {}", source.name());
            let found = guarded_lookup(&policy, &label, || source.interaction_between(&a, &b))
                .await?;
            Ok::<_, LookupError>((order, found))
        });
    }

    let mut collected = Vec::with_capacity(pairs.len());
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.map_err(|error| EvaluationError::LookupUnavailable {
            lookup: LookupKind::Interactions,
            reason: format!("interaction lookup task failed: {error}"),
        })?;
        let (order, found) = outcome.map_err(|error| EvaluationError::LookupUnavailable {
            lookup: LookupKind::Interactions,
            reason: error.to_string(),
        })?;
        collected.push((order, found));
    }
    // completion order is arbitrary
    collected.sort_by_key(|(order, _)| *order);

    let findings = collected
        .into_iter()
        .filter_map(|(order, found)| {
            let (i, j) = pairs[order];
            found.map(|finding| orient(finding, &medications[i], &medications[j]))
        })
        .collect::<Vec<_>>();

    let summary = InteractionSummary::from_findings(findings);
    debug!(
        "checked {} pairs: {} high, {} moderate, {} low",
        pairs.len(),
        summary.high_count,
        summary.moderate_count,
        summary.low_count
    );
    Ok(summary)
}

/// Rewrites the pair names to the prescription's spelling in i, j order.
fn orient(
    mut finding: InteractionFinding,
    first: &MedicationEntry,
    second: &MedicationEntry,
) -> InteractionFinding {
    finding.medication1 = first.name.clone();
    finding.medication2 = second.name.clone();
    finding
}

pub fn same_pair(finding: &InteractionFinding, a: &str, b: &str) -> bool {
    let (x, y) = (
        normalize_name(&finding.medication1),
        normalize_name(&finding.medication2),
    );
    let (a, b) = (normalize_name(a), normalize_name(b));
    (x == a && y == b) || (x == b && y == a)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tokio_test::assert_err;

    use super::*;
    use crate::interactions::Severity;

    struct PairTable {
        known: Vec<InteractionFinding>,
        calls: AtomicUsize,
    }

    impl PairTable {
        fn new(known: Vec<InteractionFinding>) -> Arc<Self> {
            Arc::new(Self {
                known,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl InteractionSource for PairTable {
        fn name(&self) -> &str {
            "pairs"
        }

        async fn interaction_between(
            &self,
            a: &str,
            b: &str,
        ) -> Result<Option<InteractionFinding>, LookupError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            // later pairs finish first
            tokio::time::sleep(Duration::from_millis(50u64.saturating_sub(call as u64 * 10)))
                .await;
            Ok(self.known.iter().find(|f| same_pair(f, a, b)).cloned())
        }
    }

    struct Outage;

    #[async_trait]
    impl InteractionSource for Outage {
        fn name(&self) -> &str {
            "outage"
        }

        async fn interaction_between(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Option<InteractionFinding>, LookupError> {
            Err(LookupError::Unavailable("connection reset".to_string()))
        }
    }

    struct Stalled {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InteractionSource for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn interaction_between(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Option<InteractionFinding>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(None)
        }
    }

    fn meds(names: &[&str]) -> Vec<MedicationEntry> {
        names
            .iter()
            .map(|name| MedicationEntry::new(name, dec!(10)))
            .collect()
    }

    #[tokio::test]
    async fn zero_or_one_medication_is_empty() {
        let source = PairTable::new(Vec::new());
        for list in [meds(&[]), meds(&["A"])] {
            let summary = check_interactions(source.clone(), &LookupPolicy::default(), &list)
                .await
                .unwrap();
            assert!(summary.interactions.is_empty());
            assert_eq!(
                (summary.high_count, summary.moderate_count, summary.low_count),
                (0, 0, 0)
            );
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reports_only_known_pair() {
        let source = PairTable::new(vec![InteractionFinding::new("C", "A", Severity::High)]);
        let summary =
            check_interactions(source.clone(), &LookupPolicy::default(), &meds(&["A", "B", "C"]))
                .await
                .unwrap();
        assert_eq!(summary.interactions.len(), 1);
        let finding = &summary.interactions[0];
        assert_eq!(finding.medication1, "A");
        assert_eq!(finding.medication2, "C");
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(summary.high_count, 1);
        assert_eq!(summary.moderate_count, 0);
        assert_eq!(summary.low_count, 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_pair_order_despite_completion_order() {
        let source = PairTable::new(vec![
            InteractionFinding::new("A", "B", Severity::Low),
            InteractionFinding::new("A", "D", Severity::Moderate),
            InteractionFinding::new("B", "C", Severity::High),
            InteractionFinding::new("C", "D", Severity::Low),
        ]);
        let summary = check_interactions(
            source,
            &LookupPolicy::default(),
            &meds(&["A", "B", "C", "D"]),
        )
        .await
        .unwrap();
        let pairs = summary
            .interactions
            .iter()
            .map(|f| format!("{}{}", f.medication1, f.medication2))
            .collect::<Vec<_>>();
        assert_eq!(pairs, vec!["AB", "AD", "BC", "CD"]);
        assert_eq!(summary.low_count + summary.moderate_count + summary.high_count, 4);
    }

    #[test]
    fn duplicate_names_are_evaluated_once() {
        let pairs = candidate_pairs(&meds(&["A", "C", "a ", "B"]));
        assert_eq!(pairs, vec![(0, 1), (0, 3), (1, 3)]);
    }

    #[tokio::test]
    async fn outage_fails_the_whole_summary() {
        let err = assert_err!(
            check_interactions(Arc::new(Outage), &LookupPolicy::default(), &meds(&["A", "B"]))
                .await
        );
        assert!(matches!(
            err,
            EvaluationError::LookupUnavailable {
                lookup: LookupKind::Interactions,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_source_times_out_after_one_retry() {
        let source = Arc::new(Stalled {
            calls: AtomicUsize::new(0),
        });
        let err = check_interactions(source.clone(), &LookupPolicy::default(), &meds(&["A", "B"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::LookupUnavailable {
                lookup: LookupKind::Interactions,
                ..
            }
        ));
        assert!(err.is_retryable());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_entry_skips_all_lookups() {
        let source = PairTable::new(Vec::new());
        let mut list = meds(&["A", "B"]);
        list.push(MedicationEntry::new("C", dec!(-3)));
        let err = check_interactions(source.clone(), &LookupPolicy::default(), &list)
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
