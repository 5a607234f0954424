//! Pass-through (HHY) allocation rules.
//!
//! A partnership's incoming net amount is not taxed at the partnership; it is
//! split across downstream individuals by the rule's allocation map and
//! taxed there according to each share's income nature.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::*;

/// How an individual's share of partnership income is taxed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeNature {
    /// Joins salary/service income; bonus and dividend transfers keep their
    /// own treatment where the merge policy allows it.
    #[default]
    Comprehensive,
    Salary,
    #[serde(alias = "service_income")]
    Service,
    Bonus,
    Dividend,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergePolicy {
    /// Shares join the recipient's main comprehensive-income base instead of
    /// being reconciled on their own.
    #[serde(default, alias = "merge_to_szw")]
    pub merge_comprehensive: bool,
    /// Bonus transfers routed through the partnership keep the annual
    /// one-time bonus method.
    #[serde(default)]
    pub bonus_special_tax: bool,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationParams {
    #[serde(default)]
    pub min_ratio: Option<Rate>,
    #[serde(default)]
    pub max_ratio: Option<Rate>,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HhyRule {
    pub hhy_code: String,
    pub rule_version: String,
    pub allocations: BTreeMap<String, Rate>,
    pub income_nature: BTreeMap<String, IncomeNature>,
    pub merge_policy: MergePolicy,
    pub validation: ValidationParams,
}

impl HhyRule {
    pub fn allocation_ratio(&self, individual_code: &str) -> Rate {
        self.allocations
            .get(individual_code)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn income_nature(&self, individual_code: &str) -> IncomeNature {
        self.income_nature
            .get(individual_code)
            .copied()
            .unwrap_or_default()
    }

    pub fn merges_comprehensive(&self) -> bool {
        self.merge_policy.merge_comprehensive
    }

    pub fn applies_bonus_special_tax(&self) -> bool {
        self.merge_policy.bonus_special_tax
    }

    pub fn allocation_total(&self) -> Rate {
        self.allocations.values().copied().sum()
    }

    /// Ratios outside the rule's own bounds, or shares that do not add up
    /// to the whole. Advisory only.
    pub fn check_allocations(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for (code, ratio) in &self.allocations {
            if let Some(min) = self.validation.min_ratio {
                if *ratio < min {
                    warnings.push(format!(
                        "{}: allocation to {} ({}) is below min_ratio {}",
                        self.hhy_code, code, ratio, min
                    ));
                }
            }
            if let Some(max) = self.validation.max_ratio {
                if *ratio > max {
                    warnings.push(format!(
                        "{}: allocation to {} ({}) is above max_ratio {}",
                        self.hhy_code, code, ratio, max
                    ));
                }
            }
        }

        let total = self.allocation_total();
        if !self.allocations.is_empty() && total != Decimal::ONE {
            warnings.push(format!(
                "{}: allocation ratios sum to {}, not 1",
                self.hhy_code, total
            ));
        }
        if self.allocations.is_empty() {
            warnings.push(format!("{}: allocation map is empty", self.hhy_code));
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rule(allocations: &[(&str, Rate)]) -> HhyRule {
        HhyRule {
            hhy_code: "HHY".to_string(),
            rule_version: "v1.0".to_string(),
            allocations: allocations
                .iter()
                .map(|(c, r)| (c.to_string(), *r))
                .collect(),
            income_nature: BTreeMap::new(),
            merge_policy: MergePolicy::default(),
            validation: ValidationParams {
                min_ratio: Some(dec!(0)),
                max_ratio: Some(dec!(1)),
                extensions: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn test_lookup_defaults() {
        let r = rule(&[("SZW", dec!(1))]);
        assert_eq!(r.allocation_ratio("SZW"), dec!(1));
        assert_eq!(r.allocation_ratio("SXP"), dec!(0));
        assert_eq!(r.income_nature("SZW"), IncomeNature::Comprehensive);
        assert!(!r.merges_comprehensive());
        assert!(!r.applies_bonus_special_tax());
    }

    #[test]
    fn test_check_allocations_clean() {
        let r = rule(&[("A", dec!(0.6)), ("B", dec!(0.4))]);
        assert!(r.check_allocations().is_empty());
    }

    #[test]
    fn test_check_allocations_flags_bounds_and_sum() {
        let r = rule(&[("A", dec!(1.2)), ("B", dec!(-0.1))]);
        let warnings = r.check_allocations();
        assert!(warnings.iter().any(|w| w.contains("above max_ratio")));
        assert!(warnings.iter().any(|w| w.contains("below min_ratio")));
        assert!(warnings.iter().any(|w| w.contains("sum to 1.1")));
    }

    #[test]
    fn test_merge_policy_accepts_legacy_key_and_keeps_unknowns() {
        let policy: MergePolicy = serde_json::from_str(
            r#"{"merge_to_szw": true, "bonus_special_tax": false, "cap_mode": "soft"}"#,
        )
        .unwrap();
        assert!(policy.merge_comprehensive);
        assert!(!policy.bonus_special_tax);
        assert_eq!(policy.extensions["cap_mode"], "soft");
    }

    #[test]
    fn test_income_nature_names() {
        let natures: BTreeMap<String, IncomeNature> = serde_json::from_str(
            r#"{"A": "comprehensive", "B": "service_income", "C": "dividend"}"#,
        )
        .unwrap();
        assert_eq!(natures["A"], IncomeNature::Comprehensive);
        assert_eq!(natures["B"], IncomeNature::Service);
        assert_eq!(natures["C"], IncomeNature::Dividend);
    }
}
