use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FlowTaxError;
use crate::tax::indirect::{calc_surtax, calc_vat};
use crate::types::*;
use crate::FlowTaxResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One transfer with the rates that may apply to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeFrictionInput {
    pub sender_code: String,
    pub receiver_code: String,
    pub amount: Money,
    #[serde(default)]
    pub mode: TransferMode,
    #[serde(default)]
    pub sender_vat_rate: Option<Rate>,
    #[serde(default)]
    pub sender_surtax_rate: Option<Rate>,
    #[serde(default)]
    pub sender_eit_rate: Option<Rate>,
    #[serde(default)]
    pub receiver_pit_rate: Option<Rate>,
    /// Defaults to `mode == pre_tax` when omitted.
    #[serde(default)]
    pub is_pre_tax: Option<bool>,
}

impl EdgeFrictionInput {
    pub fn pre_tax(&self) -> bool {
        self.is_pre_tax.unwrap_or_else(|| self.mode.is_pre_tax())
    }
}

/// Friction breakdown of one transfer. Components that do not apply are zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeFriction {
    pub sender_code: String,
    pub receiver_code: String,
    pub mode: TransferMode,
    pub input_amount: Money,
    pub vat_amount: Money,
    pub surtax_amount: Money,
    pub eit_amount: Money,
    pub pit_amount: Money,
    pub total_friction: Money,
    pub net_amount: Money,
}

impl EdgeFriction {
    fn zero(sender_code: &str, receiver_code: &str, mode: TransferMode) -> Self {
        EdgeFriction {
            sender_code: sender_code.to_string(),
            receiver_code: receiver_code.to_string(),
            mode,
            input_amount: Decimal::ZERO,
            vat_amount: Decimal::ZERO,
            surtax_amount: Decimal::ZERO,
            eit_amount: Decimal::ZERO,
            pit_amount: Decimal::ZERO,
            total_friction: Decimal::ZERO,
            net_amount: Decimal::ZERO,
        }
    }
}

/// A zero rate means the tax does not apply at all.
fn applicable(rate: Option<Rate>) -> Option<Rate> {
    rate.filter(|r| *r > Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Compose the tax primitives for one transfer.
///
/// Pre-tax: the sender levies VAT and surtax (only when it carries both
/// rates), plus EIT on the VAT-exclusive price when it carries an EIT rate.
/// Post-tax: the receiver's PIT rate applies to the whole amount. The other
/// side's taxes are never levied.
pub fn calc_edge_friction(input: &EdgeFrictionInput) -> EdgeFriction {
    if input.amount <= Decimal::ZERO {
        return EdgeFriction::zero(&input.sender_code, &input.receiver_code, input.mode);
    }

    let amount = round_money(input.amount);
    let mut record = EdgeFriction::zero(&input.sender_code, &input.receiver_code, input.mode);
    record.input_amount = amount;

    if input.pre_tax() {
        if let (Some(vat_rate), Some(surtax_rate)) = (
            applicable(input.sender_vat_rate),
            applicable(input.sender_surtax_rate),
        ) {
            let vat = calc_vat(amount, vat_rate);
            record.vat_amount = vat.tax;
            record.surtax_amount = calc_surtax(vat.tax, surtax_rate);
            record.total_friction = record.vat_amount + record.surtax_amount;

            if let Some(eit_rate) = applicable(input.sender_eit_rate) {
                record.eit_amount = round_money(vat.net * eit_rate);
                record.total_friction += record.eit_amount;
            }
        }
    } else if let Some(pit_rate) = applicable(input.receiver_pit_rate) {
        record.pit_amount = round_money(amount * pit_rate);
        record.total_friction = record.pit_amount;
    }

    record.net_amount = round_money(amount - record.total_friction);
    record
}

/// Validated, enveloped form of [`calc_edge_friction`].
pub fn calculate_edge_friction(
    input: &EdgeFrictionInput,
) -> FlowTaxResult<ComputationOutput<EdgeFriction>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    for (field, rate) in [
        ("sender_vat_rate", input.sender_vat_rate),
        ("sender_surtax_rate", input.sender_surtax_rate),
        ("sender_eit_rate", input.sender_eit_rate),
        ("receiver_pit_rate", input.receiver_pit_rate),
    ] {
        if let Some(r) = rate {
            if r < Decimal::ZERO || r > Decimal::ONE {
                return Err(FlowTaxError::InvalidInput {
                    field: field.to_string(),
                    reason: "Rate must be between 0 and 1".to_string(),
                });
            }
        }
    }

    if input.amount <= Decimal::ZERO {
        warnings.push("Non-positive amount: transfer carries no friction".to_string());
    }

    let pre_tax = input.pre_tax();
    if pre_tax {
        if applicable(input.sender_vat_rate).is_some()
            != applicable(input.sender_surtax_rate).is_some()
        {
            warnings.push(
                "Sender carries only one of VAT/surtax rates; indirect tax is levied only \
                 when both are present"
                    .to_string(),
            );
        }
        if applicable(input.receiver_pit_rate).is_some() {
            warnings.push("Receiver PIT is not levied on pre-tax transfers".to_string());
        }
    } else if applicable(input.sender_vat_rate).is_some() {
        warnings.push(
            "Sender VAT/surtax/EIT are not levied on post-tax transfers".to_string(),
        );
    }

    let result = calc_edge_friction(input);

    let assumptions = serde_json::json!({
        "sender_code": input.sender_code,
        "receiver_code": input.receiver_code,
        "amount": input.amount.to_string(),
        "mode": input.mode,
        "is_pre_tax": pre_tax,
    });

    let methodology = if pre_tax {
        "Pre-tax transfer: VAT backed out of the gross amount, surtax on VAT, EIT on the \
         VAT-exclusive price"
    } else {
        "Post-tax transfer: receiver income tax at a flat rate on the amount received"
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(methodology, &assumptions, warnings, elapsed, result))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn company_edge(amount: Money, mode: TransferMode) -> EdgeFrictionInput {
        EdgeFrictionInput {
            sender_code: "PXA".to_string(),
            receiver_code: "KKG".to_string(),
            amount,
            mode,
            sender_vat_rate: Some(dec!(0.06)),
            sender_surtax_rate: Some(dec!(0.12)),
            sender_eit_rate: None,
            receiver_pit_rate: None,
            is_pre_tax: None,
        }
    }

    #[test]
    fn test_pre_tax_vat_and_surtax() {
        let r = calc_edge_friction(&company_edge(dec!(100000), TransferMode::PreTax));
        assert_eq!(r.input_amount, dec!(100000));
        assert_eq!(r.vat_amount, dec!(5660.3774));
        assert_eq!(r.surtax_amount, dec!(679.2453));
        assert_eq!(r.eit_amount, dec!(0));
        assert_eq!(r.total_friction, dec!(6339.6227));
        assert_eq!(r.net_amount, dec!(93660.3773));
    }

    #[test]
    fn test_pre_tax_with_eit_on_vat_net_price() {
        let mut input = company_edge(dec!(100000), TransferMode::PreTax);
        input.sender_eit_rate = Some(dec!(0.25));
        let r = calc_edge_friction(&input);
        // 94,339.6226 x 25% = 23,584.90565 -> half-even
        assert_eq!(r.eit_amount, dec!(23584.9056));
        assert_eq!(r.total_friction, dec!(29924.5283));
        assert_eq!(r.net_amount, dec!(70075.4717));
    }

    #[test]
    fn test_pre_tax_partnership_sender_is_pass_through() {
        let mut input = company_edge(dec!(50000), TransferMode::PreTax);
        input.sender_vat_rate = None;
        input.sender_surtax_rate = None;
        let r = calc_edge_friction(&input);
        assert_eq!(r.total_friction, dec!(0));
        assert_eq!(r.net_amount, dec!(50000));
    }

    #[test]
    fn test_pre_tax_requires_both_indirect_rates() {
        let mut input = company_edge(dec!(50000), TransferMode::PreTax);
        input.sender_surtax_rate = Some(dec!(0));
        input.sender_eit_rate = Some(dec!(0.25));
        let r = calc_edge_friction(&input);
        assert_eq!(r.vat_amount, dec!(0));
        assert_eq!(r.eit_amount, dec!(0));
        assert_eq!(r.net_amount, dec!(50000));
    }

    #[test]
    fn test_post_tax_receiver_pit() {
        let mut input = company_edge(dec!(80000), TransferMode::PostTax);
        input.receiver_pit_rate = Some(dec!(0.20));
        let r = calc_edge_friction(&input);
        assert_eq!(r.vat_amount, dec!(0));
        assert_eq!(r.surtax_amount, dec!(0));
        assert_eq!(r.pit_amount, dec!(16000));
        assert_eq!(r.total_friction, dec!(16000));
        assert_eq!(r.net_amount, dec!(64000));
    }

    #[test]
    fn test_dividend_and_bonus_modes_follow_post_tax_path() {
        for mode in [TransferMode::Dividend, TransferMode::Bonus] {
            let mut input = company_edge(dec!(10000), mode);
            input.receiver_pit_rate = Some(dec!(0.20));
            let r = calc_edge_friction(&input);
            assert_eq!(r.mode, mode);
            assert_eq!(r.vat_amount, dec!(0));
            assert_eq!(r.pit_amount, dec!(2000));
        }
    }

    #[test]
    fn test_explicit_pre_tax_flag_overrides_mode() {
        let mut input = company_edge(dec!(100000), TransferMode::Dividend);
        input.is_pre_tax = Some(true);
        let r = calc_edge_friction(&input);
        assert_eq!(r.vat_amount, dec!(5660.3774));
    }

    #[test]
    fn test_non_positive_amount_zero_record() {
        for amount in [dec!(0), dec!(-100)] {
            let r = calc_edge_friction(&company_edge(amount, TransferMode::PreTax));
            assert_eq!(
                r,
                EdgeFriction {
                    sender_code: "PXA".to_string(),
                    receiver_code: "KKG".to_string(),
                    mode: TransferMode::PreTax,
                    input_amount: dec!(0),
                    vat_amount: dec!(0),
                    surtax_amount: dec!(0),
                    eit_amount: dec!(0),
                    pit_amount: dec!(0),
                    total_friction: dec!(0),
                    net_amount: dec!(0),
                }
            );
        }
    }

    #[test]
    fn test_calculate_warns_on_ignored_sender_rates() {
        let output = calculate_edge_friction(&company_edge(dec!(1000), TransferMode::PostTax))
            .unwrap();
        assert!(output
            .warnings
            .iter()
            .any(|w| w.contains("not levied on post-tax")));
        assert_eq!(output.result.net_amount, dec!(1000));
    }

    #[test]
    fn test_calculate_rejects_rate_above_one() {
        let mut input = company_edge(dec!(1000), TransferMode::PreTax);
        input.sender_eit_rate = Some(dec!(25));
        match calculate_edge_friction(&input).unwrap_err() {
            FlowTaxError::InvalidInput { field, .. } => assert_eq!(field, "sender_eit_rate"),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }
}
