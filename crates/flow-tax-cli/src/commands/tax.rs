use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

use flow_tax_core::tax::comprehensive::{self, IncomeStreams};
use flow_tax_core::tax::friction::{self, EdgeFrictionInput};
use flow_tax_core::tax::income::{self, IncomeTaxInput, IncomeTaxKind};
use flow_tax_core::tax::indirect;
use flow_tax_core::{with_metadata, Money, Rate, TransferMode};

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    Progressive,
    Bonus,
    Dividend,
}

impl From<KindArg> for IncomeTaxKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Progressive => IncomeTaxKind::Progressive,
            KindArg::Bonus => IncomeTaxKind::Bonus,
            KindArg::Dividend => IncomeTaxKind::Dividend,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    PreTax,
    PostTax,
    Dividend,
    Bonus,
}

impl From<ModeArg> for TransferMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::PreTax => TransferMode::PreTax,
            ModeArg::PostTax => TransferMode::PostTax,
            ModeArg::Dividend => TransferMode::Dividend,
            ModeArg::Bonus => TransferMode::Bonus,
        }
    }
}

// ---------------------------------------------------------------------------
// income-tax
// ---------------------------------------------------------------------------

/// Arguments for a single income-tax calculation
#[derive(Args)]
pub struct IncomeTaxArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Which method to apply
    #[arg(long, value_enum, default_value = "progressive")]
    pub kind: KindArg,

    /// Taxable amount
    #[arg(long)]
    pub amount: Option<Decimal>,

    /// Dividend withholding rate (default 0.20)
    #[arg(long)]
    pub dividend_rate: Option<Decimal>,
}

pub fn run_income_tax(args: IncomeTaxArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let tax_input: IncomeTaxInput = match input::read_input(args.input.as_deref())? {
        Some(parsed) => parsed,
        None => IncomeTaxInput {
            kind: args.kind.into(),
            amount: args.amount.ok_or("--amount is required (or provide --input)")?,
            dividend_rate: args.dividend_rate,
        },
    };

    let result = income::calculate_income_tax(&tax_input)?;
    Ok(serde_json::to_value(result)?)
}

// ---------------------------------------------------------------------------
// vat
// ---------------------------------------------------------------------------

/// Arguments for VAT and surtax on a VAT-inclusive price
#[derive(Args)]
pub struct VatArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// VAT-inclusive price
    #[arg(long)]
    pub amount: Option<Decimal>,

    /// VAT rate
    #[arg(long, default_value = "0.06")]
    pub vat_rate: Decimal,

    /// Surtax rate applied to the VAT
    #[arg(long, default_value = "0.12")]
    pub surtax_rate: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
struct VatInput {
    amount: Money,
    #[serde(default = "default_vat_rate")]
    vat_rate: Rate,
    #[serde(default = "default_surtax_rate")]
    surtax_rate: Rate,
}

fn default_vat_rate() -> Rate {
    dec!(0.06)
}

fn default_surtax_rate() -> Rate {
    dec!(0.12)
}

#[derive(Debug, Serialize)]
struct VatOutput {
    amount: Money,
    vat: Money,
    price_net: Money,
    surtax: Money,
    total_indirect_tax: Money,
}

pub fn run_vat(args: VatArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let vat_input: VatInput = match input::read_input(args.input.as_deref())? {
        Some(parsed) => parsed,
        None => VatInput {
            amount: args.amount.ok_or("--amount is required (or provide --input)")?,
            vat_rate: args.vat_rate,
            surtax_rate: args.surtax_rate,
        },
    };

    let vat = indirect::calc_vat(vat_input.amount, vat_input.vat_rate);
    let surtax = indirect::calc_surtax(vat.tax, vat_input.surtax_rate);

    let mut warnings = Vec::new();
    if vat_input.amount <= Decimal::ZERO {
        warnings.push("Non-positive amount: no VAT is due".to_string());
    }

    let result = VatOutput {
        amount: vat_input.amount,
        vat: vat.tax,
        price_net: vat.net,
        surtax,
        total_indirect_tax: vat.tax + surtax,
    };
    let output = with_metadata(
        "VAT backed out of a VAT-inclusive price; surtax levied on the VAT",
        &vat_input,
        warnings,
        start.elapsed().as_micros() as u64,
        result,
    );
    Ok(serde_json::to_value(output)?)
}

// ---------------------------------------------------------------------------
// edge-friction
// ---------------------------------------------------------------------------

/// Arguments for the friction of one transfer
#[derive(Args)]
pub struct EdgeFrictionArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Sender code
    #[arg(long, default_value = "SENDER")]
    pub sender: String,

    /// Receiver code
    #[arg(long, default_value = "RECEIVER")]
    pub receiver: String,

    /// Transfer amount
    #[arg(long)]
    pub amount: Option<Decimal>,

    /// Transfer mode
    #[arg(long, value_enum, default_value = "post-tax")]
    pub mode: ModeArg,

    /// Sender VAT rate
    #[arg(long)]
    pub vat_rate: Option<Decimal>,

    /// Sender surtax rate
    #[arg(long)]
    pub surtax_rate: Option<Decimal>,

    /// Sender enterprise income tax rate
    #[arg(long)]
    pub eit_rate: Option<Decimal>,

    /// Receiver personal income tax rate
    #[arg(long)]
    pub pit_rate: Option<Decimal>,
}

pub fn run_edge_friction(args: EdgeFrictionArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let edge_input: EdgeFrictionInput = match input::read_input(args.input.as_deref())? {
        Some(parsed) => parsed,
        None => EdgeFrictionInput {
            sender_code: args.sender,
            receiver_code: args.receiver,
            amount: args.amount.ok_or("--amount is required (or provide --input)")?,
            mode: args.mode.into(),
            sender_vat_rate: args.vat_rate,
            sender_surtax_rate: args.surtax_rate,
            sender_eit_rate: args.eit_rate,
            receiver_pit_rate: args.pit_rate,
            is_pre_tax: None,
        },
    };

    let result = friction::calculate_edge_friction(&edge_input)?;
    Ok(serde_json::to_value(result)?)
}

// ---------------------------------------------------------------------------
// comprehensive
// ---------------------------------------------------------------------------

/// Arguments for reconciling one individual's income streams
#[derive(Args)]
pub struct ComprehensiveArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    #[arg(long, default_value = "0")]
    pub salary: Decimal,

    /// Annual one-time bonus
    #[arg(long, default_value = "0")]
    pub bonus: Decimal,

    /// Labour service income
    #[arg(long, default_value = "0")]
    pub service_income: Decimal,

    #[arg(long, default_value = "0")]
    pub dividend: Decimal,
}

pub fn run_comprehensive(args: ComprehensiveArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let streams: IncomeStreams = match input::read_input(args.input.as_deref())? {
        Some(parsed) => parsed,
        None => IncomeStreams {
            salary: args.salary,
            bonus: args.bonus,
            service_income: args.service_income,
            dividend: args.dividend,
        },
    };

    let result = comprehensive::calculate_comprehensive_income(&streams)?;
    Ok(serde_json::to_value(result)?)
}
