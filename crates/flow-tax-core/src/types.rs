use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.06 = 6%). Never as percentages.
pub type Rate = Decimal;

/// Fractional digits kept on every stored or returned amount.
pub const ROUND_DECIMAL_PLACES: u32 = 4;

/// Zero carried at [`ROUND_DECIMAL_PLACES`].
pub const ZERO_MONEY: Decimal = Decimal::from_parts(0, 0, 0, false, ROUND_DECIMAL_PLACES);

/// Round half-to-even at [`ROUND_DECIMAL_PLACES`], padding shorter values
/// out to the same scale so `1080` comes back as `1080.0000`.
///
/// Applied after each arithmetic step, not only on final figures.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(ROUND_DECIMAL_PLACES, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(ROUND_DECIMAL_PLACES);
    rounded
}

/// How a transfer is taxed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Sender levies VAT/surtax (and EIT) before the net reaches the receiver.
    PreTax,
    /// Receiver bears income tax on the amount received.
    #[default]
    PostTax,
    Dividend,
    Bonus,
}

impl TransferMode {
    pub fn is_pre_tax(self) -> bool {
        self == TransferMode::PreTax
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferMode::PreTax => "pre_tax",
            TransferMode::PostTax => "post_tax",
            TransferMode::Dividend => "dividend",
            TransferMode::Bonus => "bonus",
        }
    }
}

/// Tax withheld and the amount left after it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxAmount {
    pub tax: Money,
    pub net: Money,
}

impl TaxAmount {
    pub const ZERO: TaxAmount = TaxAmount {
        tax: ZERO_MONEY,
        net: ZERO_MONEY,
    };
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit_4dp_half_even".to_string(),
        },
    }
}
