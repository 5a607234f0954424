use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FlowTaxError;
use crate::types::*;
use crate::FlowTaxResult;

// ---------------------------------------------------------------------------
// Bracket table
// ---------------------------------------------------------------------------

/// One slice of the annual comprehensive-income schedule. `max` is
/// inclusive; `None` marks the open-ended top bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressiveBracket {
    pub min: Money,
    pub max: Option<Money>,
    pub rate: Rate,
    pub quick_deduction: Money,
}

pub const PROGRESSIVE_BRACKETS: [ProgressiveBracket; 7] = [
    ProgressiveBracket {
        min: dec!(0),
        max: Some(dec!(36000)),
        rate: dec!(0.03),
        quick_deduction: dec!(0),
    },
    ProgressiveBracket {
        min: dec!(36000),
        max: Some(dec!(144000)),
        rate: dec!(0.10),
        quick_deduction: dec!(2520),
    },
    ProgressiveBracket {
        min: dec!(144000),
        max: Some(dec!(300000)),
        rate: dec!(0.20),
        quick_deduction: dec!(16920),
    },
    ProgressiveBracket {
        min: dec!(300000),
        max: Some(dec!(420000)),
        rate: dec!(0.25),
        quick_deduction: dec!(31920),
    },
    ProgressiveBracket {
        min: dec!(420000),
        max: Some(dec!(660000)),
        rate: dec!(0.30),
        quick_deduction: dec!(52920),
    },
    ProgressiveBracket {
        min: dec!(660000),
        max: Some(dec!(960000)),
        rate: dec!(0.35),
        quick_deduction: dec!(85920),
    },
    ProgressiveBracket {
        min: dec!(960000),
        max: None,
        rate: dec!(0.45),
        quick_deduction: dec!(181920),
    },
];

/// Flat withholding applied to dividends unless a rate is given.
pub const DEFAULT_DIVIDEND_TAX_RATE: Rate = dec!(0.20);

/// Annual one-time bonuses are spread over this many months to pick a bracket.
pub const BONUS_SPREAD_MONTHS: Decimal = dec!(12);

/// First bracket whose upper bound covers `amount`; the open top bracket
/// catches everything else.
pub fn bracket_for(amount: Money) -> &'static ProgressiveBracket {
    PROGRESSIVE_BRACKETS
        .iter()
        .find(|b| b.max.map_or(true, |max| amount <= max))
        .unwrap_or(&PROGRESSIVE_BRACKETS[PROGRESSIVE_BRACKETS.len() - 1])
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Progressive tax using the quick-deduction method.
pub fn calc_progressive_tax(amount: Money) -> TaxAmount {
    if amount <= Decimal::ZERO {
        return TaxAmount::ZERO;
    }

    let amount = round_money(amount);
    let bracket = bracket_for(amount);
    let tax = round_money((amount * bracket.rate - bracket.quick_deduction).max(Decimal::ZERO));

    TaxAmount {
        tax,
        net: amount - tax,
    }
}

/// Annual one-time bonus: the monthly equivalent picks the bracket, the
/// monthly tax is scaled back up to the year.
pub fn calc_bonus_tax(bonus: Money) -> TaxAmount {
    if bonus <= Decimal::ZERO {
        return TaxAmount::ZERO;
    }

    let bonus = round_money(bonus);
    let monthly_equivalent = bonus / BONUS_SPREAD_MONTHS;
    let monthly = calc_progressive_tax(monthly_equivalent);
    let tax = round_money(monthly.tax * BONUS_SPREAD_MONTHS);

    TaxAmount {
        tax,
        net: bonus - tax,
    }
}

/// Dividend withholding at [`DEFAULT_DIVIDEND_TAX_RATE`].
pub fn calc_dividend_tax(amount: Money) -> TaxAmount {
    calc_dividend_tax_at(amount, DEFAULT_DIVIDEND_TAX_RATE)
}

/// Dividend withholding at an explicit flat rate.
pub fn calc_dividend_tax_at(amount: Money, rate: Rate) -> TaxAmount {
    if amount <= Decimal::ZERO {
        return TaxAmount::ZERO;
    }

    let amount = round_money(amount);
    let tax = round_money(amount * rate);

    TaxAmount {
        tax,
        net: amount - tax,
    }
}

// ---------------------------------------------------------------------------
// Wrapped calculation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeTaxKind {
    Progressive,
    Bonus,
    Dividend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeTaxInput {
    pub kind: IncomeTaxKind,
    pub amount: Money,
    /// Only used for dividends; defaults to 20%.
    #[serde(default)]
    pub dividend_rate: Option<Rate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeTaxOutput {
    pub kind: IncomeTaxKind,
    pub amount: Money,
    pub tax: Money,
    pub net: Money,
    pub marginal_rate: Option<Rate>,
    pub quick_deduction: Option<Money>,
    pub effective_rate: Rate,
}

/// Compute one income-tax primitive and wrap it with methodology and
/// warnings.
pub fn calculate_income_tax(
    input: &IncomeTaxInput,
) -> FlowTaxResult<ComputationOutput<IncomeTaxOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let dividend_rate = input.dividend_rate.unwrap_or(DEFAULT_DIVIDEND_TAX_RATE);
    if dividend_rate < Decimal::ZERO || dividend_rate > Decimal::ONE {
        return Err(FlowTaxError::InvalidInput {
            field: "dividend_rate".to_string(),
            reason: "Dividend rate must be between 0 and 1".to_string(),
        });
    }
    if input.dividend_rate.is_some() && input.kind != IncomeTaxKind::Dividend {
        warnings.push("dividend_rate is ignored for non-dividend income".to_string());
    }

    let positive = input.amount > Decimal::ZERO;
    if !positive {
        warnings.push("Non-positive amount: no tax is due".to_string());
    }

    let (amount, methodology, bracket) = match input.kind {
        IncomeTaxKind::Progressive => (
            calc_progressive_tax(input.amount),
            "Seven-bracket progressive schedule with quick deduction",
            positive.then(|| bracket_for(round_money(input.amount))),
        ),
        IncomeTaxKind::Bonus => (
            calc_bonus_tax(input.amount),
            "Annual one-time bonus: monthly-equivalent bracket, tax scaled by 12",
            positive.then(|| bracket_for(round_money(round_money(input.amount) / BONUS_SPREAD_MONTHS))),
        ),
        IncomeTaxKind::Dividend => (
            calc_dividend_tax_at(input.amount, dividend_rate),
            "Flat dividend withholding",
            None,
        ),
    };

    let marginal_rate = match input.kind {
        IncomeTaxKind::Dividend => positive.then_some(dividend_rate),
        _ => bracket.map(|b| b.rate),
    };

    let effective_rate = if positive {
        round_money(amount.tax / round_money(input.amount))
    } else {
        Decimal::ZERO
    };

    let result = IncomeTaxOutput {
        kind: input.kind,
        amount: if positive { round_money(input.amount) } else { Decimal::ZERO },
        tax: amount.tax,
        net: amount.net,
        marginal_rate,
        quick_deduction: bracket.map(|b| b.quick_deduction),
        effective_rate,
    };

    let assumptions = serde_json::json!({
        "kind": input.kind,
        "amount": input.amount.to_string(),
        "dividend_rate": dividend_rate.to_string(),
        "rounding": "4dp half-even after every step",
    });

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(methodology, &assumptions, warnings, elapsed, result))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_progressive_first_bracket_upper_bound() {
        let r = calc_progressive_tax(dec!(36000));
        assert_eq!(r.tax, dec!(1080.0000));
        assert_eq!(r.net, dec!(34920.0000));
    }

    #[test]
    fn test_progressive_second_bracket_upper_bound() {
        let r = calc_progressive_tax(dec!(144000));
        assert_eq!(r.tax, dec!(11880.0000));
        assert_eq!(r.net, dec!(132120.0000));
    }

    #[test]
    fn test_progressive_top_bracket_fallback() {
        // 2,000,000 x 45% - 181,920
        let r = calc_progressive_tax(dec!(2_000_000));
        assert_eq!(r.tax, dec!(718080));
        assert_eq!(r.net, dec!(1281920));
        assert_eq!(bracket_for(dec!(5_000_000_000)).rate, dec!(0.45));
    }

    #[test]
    fn test_progressive_rounds_input_first() {
        let r = calc_progressive_tax(dec!(1000.00005));
        // 1000.0000 x 3%
        assert_eq!(r.tax, dec!(30.0000));
        assert_eq!(r.net, dec!(970.0000));
    }

    #[test]
    fn test_non_positive_inputs_are_zero() {
        for amount in [dec!(0), dec!(-1), dec!(-250000.5)] {
            assert_eq!(calc_progressive_tax(amount), TaxAmount::ZERO);
            assert_eq!(calc_bonus_tax(amount), TaxAmount::ZERO);
            assert_eq!(calc_dividend_tax(amount), TaxAmount::ZERO);
            assert_eq!(calc_dividend_tax_at(amount, dec!(0.10)), TaxAmount::ZERO);
        }
    }

    #[test]
    fn test_progressive_monotonic() {
        let mut previous = Decimal::ZERO;
        let mut amount = dec!(0);
        while amount <= dec!(1_200_000) {
            let tax = calc_progressive_tax(amount).tax;
            assert!(tax >= previous, "tax fell at {}", amount);
            previous = tax;
            amount += dec!(7919.37);
        }
    }

    #[test]
    fn test_progressive_continuous_at_boundaries() {
        for bracket in PROGRESSIVE_BRACKETS.iter().filter_map(|b| b.max) {
            let below = calc_progressive_tax(bracket - dec!(0.0001)).tax;
            let at = calc_progressive_tax(bracket).tax;
            let above = calc_progressive_tax(bracket + dec!(0.0001)).tax;
            assert!((at - below).abs() <= dec!(0.0001), "gap below {}", bracket);
            assert!((above - at).abs() <= dec!(0.0001), "gap above {}", bracket);
        }
    }

    #[test]
    fn test_bonus_monthly_equivalent() {
        let r = calc_bonus_tax(dec!(120000));
        assert_eq!(r.tax, dec!(3600.0000));
        assert_eq!(r.net, dec!(116400.0000));
    }

    #[test]
    fn test_bonus_higher_slice() {
        // monthly 50,000 -> 50,000 x 10% - 2,520 = 2,480; x 12
        let r = calc_bonus_tax(dec!(600000));
        assert_eq!(r.tax, dec!(29760));
        assert_eq!(r.net, dec!(570240));
    }

    #[test]
    fn test_dividend_default_rate() {
        let r = calc_dividend_tax(dec!(100000));
        assert_eq!(r.tax, dec!(20000.0000));
        assert_eq!(r.net, dec!(80000.0000));
    }

    #[test]
    fn test_dividend_explicit_rate() {
        let r = calc_dividend_tax_at(dec!(100000), dec!(0.10));
        assert_eq!(r.tax, dec!(10000));
        assert_eq!(r.net, dec!(90000));
    }

    #[test]
    fn test_calculate_income_tax_progressive_envelope() {
        let input = IncomeTaxInput {
            kind: IncomeTaxKind::Progressive,
            amount: dec!(100000),
            dividend_rate: None,
        };
        let output = calculate_income_tax(&input).unwrap();
        let r = &output.result;
        assert_eq!(r.tax, dec!(7480));
        assert_eq!(r.marginal_rate, Some(dec!(0.10)));
        assert_eq!(r.quick_deduction, Some(dec!(2520)));
        assert_eq!(r.effective_rate, dec!(0.0748));
        assert!(output.warnings.is_empty());
        assert!(!output.metadata.version.is_empty());
    }

    #[test]
    fn test_calculate_income_tax_bonus_bracket_uses_monthly_slice() {
        let input = IncomeTaxInput {
            kind: IncomeTaxKind::Bonus,
            amount: dec!(120000),
            dividend_rate: None,
        };
        let r = calculate_income_tax(&input).unwrap().result;
        assert_eq!(r.marginal_rate, Some(dec!(0.03)));
        assert_eq!(r.tax, dec!(3600));
    }

    #[test]
    fn test_calculate_income_tax_zero_amount_warns() {
        let input = IncomeTaxInput {
            kind: IncomeTaxKind::Dividend,
            amount: dec!(0),
            dividend_rate: None,
        };
        let output = calculate_income_tax(&input).unwrap();
        assert_eq!(output.result.tax, dec!(0));
        assert_eq!(output.result.marginal_rate, None);
        assert!(output.warnings.iter().any(|w| w.contains("Non-positive")));
    }

    #[test]
    fn test_calculate_income_tax_rejects_bad_dividend_rate() {
        let input = IncomeTaxInput {
            kind: IncomeTaxKind::Dividend,
            amount: dec!(1000),
            dividend_rate: Some(dec!(1.5)),
        };
        match calculate_income_tax(&input).unwrap_err() {
            FlowTaxError::InvalidInput { field, .. } => assert_eq!(field, "dividend_rate"),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }
}
