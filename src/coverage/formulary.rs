use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::coverage::CoverageDecision;
use crate::medication::{normalize_name, round_currency};

/// One formulary line: the plan pays `coverage_percentage` of the price,
/// but the patient never pays more than `copay`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormularyRule {
    pub tier: u8,
    pub coverage_percentage: Decimal,
    pub copay: Decimal,
    #[serde(default)]
    pub prior_authorization: bool,
}

impl FormularyRule {
    /// Standard tiers: generics, preferred brands, non-preferred brands, specialty.
    pub fn standard_tier(tier: u8) -> Option<Self> {
        let (coverage_percentage, copay) = match tier {
            1 => (90, 5),
            2 => (75, 30),
            3 => (50, 60),
            4 => (25, 150),
            _ => return None,
        };
        Some(Self {
            tier,
            coverage_percentage: Decimal::from(coverage_percentage),
            copay: Decimal::from(copay),
            prior_authorization: tier >= 3,
        })
    }

    pub fn patient_share(&self, price: Decimal) -> Decimal {
        let percent = self
            .coverage_percentage
            .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
        let share = round_currency(price * (Decimal::ONE_HUNDRED - percent) / Decimal::ONE_HUNDRED);
        share
            .min(self.copay)
            .min(price)
            .max(Decimal::ZERO)
    }

    pub fn decide(&self, price: Decimal) -> CoverageDecision {
        CoverageDecision {
            is_covered: true,
            covered_amount: price - self.patient_share(price),
            tier: Some(self.tier),
            prior_authorization: self.prior_authorization,
        }
    }
}

/// Exact name first, then the first entry where either name contains the other.
pub fn match_rule<'a>(
    formulary: &'a BTreeMap<String, FormularyRule>,
    name: &str,
) -> Option<&'a FormularyRule> {
    let key = normalize_name(name);
    if key.is_empty() {
        return None;
    }
    formulary.get(&key).or_else(|| {
        formulary
            .iter()
            .find(|(covered, _)| key.contains(covered.as_str()) || covered.contains(&key))
            .map(|(_, rule)| rule)
    })
}
