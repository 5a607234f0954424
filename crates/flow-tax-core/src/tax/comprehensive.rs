use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FlowTaxError;
use crate::tax::income::{calc_bonus_tax, calc_dividend_tax, calc_progressive_tax};
use crate::types::*;
use crate::FlowTaxResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The four income streams of one individual.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeStreams {
    #[serde(default)]
    pub salary: Money,
    #[serde(default)]
    pub bonus: Money,
    #[serde(default)]
    pub service_income: Money,
    #[serde(default)]
    pub dividend: Money,
}

/// Selects one of the four streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeStream {
    Salary,
    Bonus,
    ServiceIncome,
    Dividend,
}

impl IncomeStreams {
    pub fn credit(&mut self, stream: IncomeStream, amount: Money) {
        match stream {
            IncomeStream::Salary => self.salary += amount,
            IncomeStream::Bonus => self.bonus += amount,
            IncomeStream::ServiceIncome => self.service_income += amount,
            IncomeStream::Dividend => self.dividend += amount,
        }
    }

    pub fn total(&self) -> Money {
        self.salary + self.bonus + self.service_income + self.dividend
    }

    pub fn is_empty(&self) -> bool {
        self.total().is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComprehensiveIncomeResult {
    pub salary: Money,
    pub salary_tax: Money,
    pub salary_net: Money,
    pub bonus: Money,
    pub bonus_tax: Money,
    pub bonus_net: Money,
    pub service_income: Money,
    pub service_tax: Money,
    pub service_net: Money,
    pub dividend: Money,
    pub dividend_tax: Money,
    pub dividend_net: Money,
    /// Salary plus service income, taxed as one base.
    pub comprehensive_income: Money,
    pub comprehensive_tax: Money,
    /// Tax salary and service income would bear if taxed apart.
    pub standalone_comprehensive_tax: Money,
    /// Extra tax caused by merging the two streams into one base.
    pub merging_uplift: Money,
    pub total_income: Money,
    pub total_tax: Money,
    pub total_net: Money,
    pub effective_rate: Rate,
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Tax salary and service income as one progressive base, then split the
/// combined tax back across the two streams by their share of the base.
/// Bonus and dividend keep their own special methods.
pub fn reconcile_comprehensive_income(streams: &IncomeStreams) -> ComprehensiveIncomeResult {
    let salary = streams.salary;
    let service_income = streams.service_income;

    let standalone_salary = calc_progressive_tax(salary);
    let standalone_service = calc_progressive_tax(service_income);
    let bonus = calc_bonus_tax(streams.bonus);
    let dividend = calc_dividend_tax(streams.dividend);

    let combined_income = salary + service_income;
    let combined = calc_progressive_tax(combined_income);

    let (salary_tax, service_tax) = if combined_income > Decimal::ZERO {
        let ratio = salary / combined_income;
        (
            round_money(combined.tax * ratio),
            round_money(combined.tax * (Decimal::ONE - ratio)),
        )
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };

    let total_tax = round_money(salary_tax + service_tax + bonus.tax + dividend.tax);
    let total_income = streams.total();
    let effective_rate = if total_income > Decimal::ZERO {
        round_money(total_tax / total_income)
    } else {
        Decimal::ZERO
    };

    let standalone_comprehensive_tax = standalone_salary.tax + standalone_service.tax;
    let comprehensive_tax = salary_tax + service_tax;

    ComprehensiveIncomeResult {
        salary,
        salary_tax,
        salary_net: salary - salary_tax,
        bonus: streams.bonus,
        bonus_tax: bonus.tax,
        bonus_net: bonus.net,
        service_income,
        service_tax,
        service_net: service_income - service_tax,
        dividend: streams.dividend,
        dividend_tax: dividend.tax,
        dividend_net: dividend.net,
        comprehensive_income: combined_income,
        comprehensive_tax,
        standalone_comprehensive_tax,
        merging_uplift: comprehensive_tax - standalone_comprehensive_tax,
        total_income,
        total_tax,
        total_net: total_income - total_tax,
        effective_rate,
    }
}

/// Validated, enveloped form of [`reconcile_comprehensive_income`].
pub fn calculate_comprehensive_income(
    input: &IncomeStreams,
) -> FlowTaxResult<ComputationOutput<ComprehensiveIncomeResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    for (field, value) in [
        ("salary", input.salary),
        ("bonus", input.bonus),
        ("service_income", input.service_income),
        ("dividend", input.dividend),
    ] {
        if value < Decimal::ZERO {
            return Err(FlowTaxError::InvalidInput {
                field: field.to_string(),
                reason: "Income streams cannot be negative".to_string(),
            });
        }
    }

    if input.is_empty() {
        warnings.push("All income streams are zero".to_string());
    }

    let result = reconcile_comprehensive_income(input);

    if result.merging_uplift > Decimal::ZERO {
        warnings.push(format!(
            "Merging salary and service income raises their tax by {}",
            result.merging_uplift
        ));
    }

    let assumptions = serde_json::json!({
        "salary": input.salary.to_string(),
        "bonus": input.bonus.to_string(),
        "service_income": input.service_income.to_string(),
        "dividend": input.dividend.to_string(),
        "bonus_method": "annual one-time bonus, monthly-equivalent bracket",
        "dividend_rate": "0.20",
    });

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Comprehensive income reconciliation: salary and service income taxed on one \
         progressive base, split back pro rata",
        &assumptions,
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn streams(salary: Money, bonus: Money, service: Money, dividend: Money) -> IncomeStreams {
        IncomeStreams {
            salary,
            bonus,
            service_income: service,
            dividend,
        }
    }

    #[test]
    fn test_salary_only_matches_plain_progressive() {
        let r = reconcile_comprehensive_income(&streams(dec!(100000), dec!(0), dec!(0), dec!(0)));
        assert_eq!(r.salary_tax, calc_progressive_tax(dec!(100000)).tax);
        assert_eq!(r.salary_tax, dec!(7480));
        assert_eq!(r.service_tax, dec!(0));
        assert_eq!(r.merging_uplift, dec!(0));
        assert_eq!(r.total_tax, dec!(7480));
        assert_eq!(r.effective_rate, dec!(0.0748));
    }

    #[test]
    fn test_salary_and_service_split_pro_rata() {
        // combined 200,000 -> 200,000 x 20% - 16,920 = 23,080
        let r = reconcile_comprehensive_income(&streams(dec!(150000), dec!(0), dec!(50000), dec!(0)));
        assert_eq!(r.comprehensive_tax, dec!(23080));
        assert_eq!(r.salary_tax, dec!(17310));
        assert_eq!(r.service_tax, dec!(5770));
        // apart: 150,000 -> 13,080; 50,000 -> 2,480
        assert_eq!(r.standalone_comprehensive_tax, dec!(15560));
        assert_eq!(r.merging_uplift, dec!(7520));
        assert_eq!(r.salary_net, dec!(132690));
        assert_eq!(r.service_net, dec!(44230));
    }

    #[test]
    fn test_repeating_ratio_split_rounds_each_share() {
        // combined 90,000 -> 6,480; thirds 2,160 / 4,320
        let r = reconcile_comprehensive_income(&streams(dec!(30000), dec!(0), dec!(60000), dec!(0)));
        assert_eq!(r.comprehensive_tax, dec!(6480.0000));
        assert_eq!(r.salary_tax, dec!(2160.0000));
        assert_eq!(r.service_tax, dec!(4320.0000));
    }

    #[test]
    fn test_all_streams() {
        let r = reconcile_comprehensive_income(&streams(
            dec!(100000),
            dec!(120000),
            dec!(0),
            dec!(100000),
        ));
        assert_eq!(r.bonus_tax, dec!(3600));
        assert_eq!(r.bonus_net, dec!(116400));
        assert_eq!(r.dividend_tax, dec!(20000));
        assert_eq!(r.dividend_net, dec!(80000));
        assert_eq!(r.total_income, dec!(320000));
        assert_eq!(r.total_tax, dec!(31080));
        assert_eq!(r.total_net, dec!(288920));
        // 31,080 / 320,000 = 0.097125
        assert_eq!(r.effective_rate, dec!(0.0971));
    }

    #[test]
    fn test_zero_income() {
        let r = reconcile_comprehensive_income(&IncomeStreams::default());
        assert_eq!(r.total_tax, dec!(0));
        assert_eq!(r.effective_rate, dec!(0));
        assert_eq!(r.salary_tax, dec!(0));
        assert_eq!(r.service_tax, dec!(0));
    }

    #[test]
    fn test_service_only() {
        let r = reconcile_comprehensive_income(&streams(dec!(0), dec!(0), dec!(36000), dec!(0)));
        assert_eq!(r.salary_tax, dec!(0));
        assert_eq!(r.service_tax, dec!(1080));
    }

    #[test]
    fn test_credit_streams() {
        let mut a = IncomeStreams::default();
        a.credit(IncomeStream::Salary, dec!(100));
        a.credit(IncomeStream::Salary, dec!(50));
        a.credit(IncomeStream::Dividend, dec!(10));
        a.credit(IncomeStream::ServiceIncome, dec!(5));
        a.credit(IncomeStream::Bonus, dec!(1));
        assert_eq!(a, streams(dec!(150), dec!(1), dec!(5), dec!(10)));
        assert_eq!(a.total(), dec!(166));
        assert!(!a.is_empty());
    }

    #[test]
    fn test_calculate_rejects_negative_stream() {
        let err = calculate_comprehensive_income(&streams(dec!(1), dec!(-1), dec!(0), dec!(0)))
            .unwrap_err();
        match err {
            FlowTaxError::InvalidInput { field, .. } => assert_eq!(field, "bonus"),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_calculate_warns_on_merging_uplift() {
        let output =
            calculate_comprehensive_income(&streams(dec!(150000), dec!(0), dec!(50000), dec!(0)))
                .unwrap();
        assert!(output.warnings.iter().any(|w| w.contains("Merging")));
        assert_eq!(output.result.total_tax, dec!(23080));
    }
}
