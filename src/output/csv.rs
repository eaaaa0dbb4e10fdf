use anyhow::Result;

use crate::coverage::CoverageReport;
use crate::interactions::InteractionSummary;
use crate::report::AlternativesEntry;

/// One row per (original, alternative) pair.
pub fn alternatives_to_csv(entries: &[AlternativesEntry]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "original_name",
        "original_price",
        "original_coverage",
        "name",
        "type",
        "manufacturer",
        "similarity_score",
        "price",
        "savings",
        "coverage",
        "recommended",
        "out_of_pocket",
        "tier",
    ])?;
    for entry in entries {
        for alt in &entry.alternatives {
            writer.write_record([
                entry.original_name.clone(),
                entry.original_price.to_string(),
                entry.original_coverage.to_string(),
                alt.name.clone(),
                alt.drug_type.to_string(),
                alt.manufacturer.clone(),
                alt.similarity_score.to_string(),
                alt.price.to_string(),
                alt.savings.to_string(),
                alt.coverage.to_string(),
                alt.recommended.to_string(),
                alt.out_of_pocket.map(|v| v.to_string()).unwrap_or_default(),
                alt.tier.map(|t| t.to_string()).unwrap_or_default(),
            ])?;
        }
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn interactions_to_csv(summary: &InteractionSummary) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["medication1", "medication2", "severity", "description", "effects"])?;
    for finding in &summary.interactions {
        writer.write_record([
            finding.medication1.clone(),
            finding.medication2.clone(),
            finding.severity.to_string(),
            finding.description.clone(),
            finding.effects.join("; "),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn coverage_to_csv(report: &CoverageReport) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "name",
        "price",
        "is_covered",
        "covered_amount",
        "out_of_pocket",
        "tier",
        "covered_alternatives",
    ])?;
    for item in &report.medications {
        writer.write_record([
            item.name.clone(),
            item.price.to_string(),
            item.is_covered.to_string(),
            item.covered_amount.to_string(),
            item.out_of_pocket.to_string(),
            item.tier.map(|t| t.to_string()).unwrap_or_default(),
            item.alternatives
                .iter()
                .map(|alt| alt.name.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::alternatives::AlternativeCandidate;
    use crate::interactions::{InteractionFinding, Severity};
    use crate::medication::MedicationEntry;

    #[test]
    fn interactions_csv_quotes_commas() {
        let summary = InteractionSummary::from_findings(vec![InteractionFinding::new(
            "Warfarin",
            "Aspirin",
            Severity::High,
        )
        .with_description("bleeding, bruising")]);
        let csv = interactions_to_csv(&summary).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("medication1,medication2,severity,description,effects")
        );
        assert_eq!(lines.next(), Some("Warfarin,Aspirin,high,\"bleeding, bruising\","));
    }

    #[test]
    fn coverage_csv_has_row_per_medication() {
        use crate::coverage::{CoverageResult, InsuranceProfile};

        let report = CoverageReport::from_results(
            &InsuranceProfile::disconnected(),
            vec![
                CoverageResult::uncovered(&MedicationEntry::new("X", dec!(100))),
                CoverageResult::uncovered(&MedicationEntry::new("Y", dec!(5.5))),
            ],
        );
        let csv = coverage_to_csv(&report).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.contains("Y,5.5,false,0,5.5,,"));
    }

    #[test]
    fn alternatives_csv_leaves_unpriced_share_blank() {
        let lipitor = MedicationEntry::new("Lipitor", dec!(250));
        let mut priced =
            AlternativeCandidate::new("Atorvastatin", dec!(75), 98).with_coverage(true);
        priced.out_of_pocket = Some(dec!(5));
        priced.tier = Some(1);
        let entries = [AlternativesEntry::new(
            &lipitor,
            true,
            &[priced, AlternativeCandidate::new("Rosuvastatin", dec!(110), 80)],
        )];
        let csv = alternatives_to_csv(&entries).unwrap();
        let rows = csv.lines().collect::<Vec<_>>();
        assert!(rows[0].ends_with("recommended,out_of_pocket,tier"));
        assert!(rows[1].ends_with(",175,true,false,5,1"));
        assert!(rows[2].ends_with(",140,false,false,,"));
    }
}
