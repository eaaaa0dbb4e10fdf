use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};
use rust_decimal::Decimal;

use crate::coverage::CoverageReport;
use crate::interactions::{InteractionSummary, Severity};
use crate::report::{AlternativesEntry, PrescriptionReport};
use crate::sources::DrugSummary;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn money(value: Decimal) -> String {
    format!("{:.2}", value)
}

fn yes_no(flag: bool) -> Cell {
    if flag {
        Cell::new("YES").fg(Color::Green)
    } else {
        Cell::new("NO").fg(Color::Red)
    }
}

fn severity_cell(severity: Severity) -> Cell {
    let color = match severity {
        Severity::High => Color::Red,
        Severity::Moderate => Color::Yellow,
        Severity::Low => Color::Blue,
    };
    Cell::new(severity.as_slug().to_uppercase()).fg(color)
}

pub fn render_alternatives_table(entries: &[AlternativesEntry]) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Original",
        "Alternative",
        "Type",
        "Similarity",
        "Price",
        "Savings",
        "Covered",
        "You Pay",
        "",
    ]);
    for entry in entries {
        if entry.alternatives.is_empty() {
            table.add_row(vec![
                format!("{} ({})", entry.original_name, money(entry.original_price)),
                "no alternatives found".to_string(),
            ]);
            continue;
        }
        for alt in &entry.alternatives {
            let savings = if alt.savings < Decimal::ZERO {
                Cell::new(money(alt.savings)).fg(Color::Red)
            } else {
                Cell::new(money(alt.savings))
            };
            table.add_row(Row::from(vec![
                Cell::new(format!(
                    "{} ({})",
                    entry.original_name,
                    money(entry.original_price)
                )),
                Cell::new(&alt.name),
                Cell::new(alt.drug_type.to_string()),
                Cell::new(format!("{}%", alt.similarity_score)),
                Cell::new(money(alt.price)),
                savings,
                yes_no(alt.coverage),
                Cell::new(alt.out_of_pocket.map(money).unwrap_or_else(|| "-".to_string())),
                Cell::new(if alt.recommended { "recommended" } else { "" }),
            ]));
        }
    }
    table.to_string()
}

pub fn render_interactions_table(summary: &InteractionSummary) -> String {
    let mut table = new_table();
    table.set_header(vec!["Severity", "Medications", "Description", "Recommendations"]);
    for finding in summary.by_severity() {
        table.add_row(Row::from(vec![
            severity_cell(finding.severity),
            Cell::new(format!("{} + {}", finding.medication1, finding.medication2)),
            Cell::new(&finding.description),
            Cell::new(finding.recommendations.join("\n")),
        ]));
    }
    format!(
        "{}\nHigh: {}  Moderate: {}  Low: {}",
        table,
        summary.high_count,
        summary.moderate_count,
        summary.low_count
    )
}

pub fn render_coverage_table(report: &CoverageReport) -> String {
    if !report.is_connected {
        return format!(
            "Insurance not connected: {} medications, {} out of pocket",
            report.total_count,
            money(report.out_of_pocket)
        );
    }
    let mut table = new_table();
    table.set_header(vec![
        "Medication",
        "Price",
        "Covered",
        "Tier",
        "Plan Pays",
        "You Pay",
        "Covered Alternatives",
    ]);
    for item in &report.medications {
        table.add_row(Row::from(vec![
            Cell::new(&item.name),
            Cell::new(money(item.price)),
            yes_no(item.is_covered),
            Cell::new(item.tier.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())),
            Cell::new(money(item.covered_amount)),
            Cell::new(money(item.out_of_pocket)),
            Cell::new(
                item.alternatives
                    .iter()
                    .map(|alt| alt.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        ]));
    }
    format!(
        "{} / {} ({})\n{}\nCovered items: {}/{} ({}%)  Plan pays: {} ({}%)  Out of pocket: {}",
        report.provider,
        report.plan_name,
        report.policy_id,
        table,
        report.covered_count,
        report.total_count,
        report.coverage_percentage,
        money(report.covered_amount),
        report.amount_percentage,
        money(report.out_of_pocket)
    )
}

pub fn render_report_tables(report: &PrescriptionReport, fingerprint: &str) -> String {
    format!(
        "Alternatives\n{}\n\nInteractions\n{}\n\nCoverage\n{}\n\nPotential savings: {}\nFingerprint: {}",
        render_alternatives_table(&report.alternatives),
        render_interactions_table(&report.interactions),
        render_coverage_table(&report.coverage),
        money(report.potential_savings()),
        fingerprint
    )
}

pub fn render_search_table(drugs: &[DrugSummary]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Name", "Type", "Manufacturer", "Price"]);
    for drug in drugs {
        table.add_row(vec![
            drug.name.clone(),
            drug.drug_type.to_string(),
            drug.manufacturer.clone(),
            money(drug.price),
        ]);
    }
    table.to_string()
}
