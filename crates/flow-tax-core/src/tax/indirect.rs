use rust_decimal::Decimal;

use crate::types::*;

/// Back VAT out of a VAT-inclusive price. `tax` is the VAT amount, `net`
/// the price excluding VAT.
pub fn calc_vat(price_gross: Money, vat_rate: Rate) -> TaxAmount {
    if price_gross <= Decimal::ZERO || vat_rate <= Decimal::ZERO {
        return TaxAmount::ZERO;
    }

    let price_gross = round_money(price_gross);
    let vat_rate = round_money(vat_rate);

    let vat = round_money(price_gross / (Decimal::ONE + vat_rate) * vat_rate);
    let price_net = round_money(price_gross - vat);

    TaxAmount {
        tax: vat,
        net: price_net,
    }
}

/// Urban-maintenance and education surcharges levied on the VAT paid.
pub fn calc_surtax(vat_amount: Money, surtax_rate: Rate) -> Money {
    if vat_amount <= Decimal::ZERO || surtax_rate <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    round_money(round_money(vat_amount) * round_money(surtax_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_vat_gross_up_six_percent() {
        let r = calc_vat(dec!(100000), dec!(0.06));
        assert_eq!(r.tax, dec!(5660.3774));
        assert_eq!(r.net, dec!(94339.6226));
    }

    #[test]
    fn test_vat_thirteen_percent() {
        // 113 / 1.13 x 0.13 = 13
        let r = calc_vat(dec!(113), dec!(0.13));
        assert_eq!(r.tax, dec!(13));
        assert_eq!(r.net, dec!(100));
    }

    #[test]
    fn test_vat_zero_cases() {
        assert_eq!(calc_vat(dec!(0), dec!(0.06)), TaxAmount::ZERO);
        assert_eq!(calc_vat(dec!(-5), dec!(0.06)), TaxAmount::ZERO);
        assert_eq!(calc_vat(dec!(1000), dec!(0)), TaxAmount::ZERO);
        assert_eq!(calc_vat(dec!(1000), dec!(-0.06)), TaxAmount::ZERO);
    }

    #[test]
    fn test_surtax_on_vat() {
        assert_eq!(calc_surtax(dec!(5660.3774), dec!(0.12)), dec!(679.2453));
        assert_eq!(calc_surtax(dec!(0), dec!(0.12)), dec!(0));
        assert_eq!(calc_surtax(dec!(100), dec!(0)), dec!(0));
    }

    #[test]
    fn test_surtax_rounds_rate_before_multiplying() {
        // 0.00005 rounds half-even to 0.0000, 0.00015 to 0.0002
        assert_eq!(calc_surtax(dec!(10000), dec!(0.07005)), dec!(700.0000));
        assert_eq!(calc_surtax(dec!(10000), dec!(0.07015)), dec!(702.0000));
    }
}
