use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::error::{AppError, Result};

/// Decimal places the authority schema accepts for every amount
pub const AMOUNT_SCALE: u32 = 2;

/// Currency code the authority expects for pesos
pub const PESOS_CODE: &str = "PES";

/// Rounds an amount to the authority scale (half away from zero)
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Renders an amount exactly as transmitted: always two decimals, dot separator
pub fn format_wire_amount(amount: Decimal) -> String {
    let mut rounded = round_amount(amount);
    rounded.rescale(AMOUNT_SCALE);
    rounded.to_string()
}

/// Smallest representable difference between totals (one cent)
pub fn tolerance() -> Decimal {
    Decimal::new(1, AMOUNT_SCALE)
}

/// Net, VAT and total of one voucher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherAmounts {
    pub net: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
}

impl VoucherAmounts {
    /// Build amounts, rejecting negative values and totals that do not balance
    ///
    /// `total` must equal `net + vat` within one cent once all three are
    /// rounded to the transmission scale.
    pub fn new(net: Decimal, vat: Decimal, total: Decimal) -> Result<Self> {
        let amounts = Self {
            net: round_amount(net),
            vat: round_amount(vat),
            total: round_amount(total),
        };
        amounts.validate()?;
        Ok(amounts)
    }

    pub fn validate(&self) -> Result<()> {
        if self.net < Decimal::ZERO || self.vat < Decimal::ZERO {
            return Err(AppError::validation("Amounts cannot be negative"));
        }

        if self.total <= Decimal::ZERO {
            return Err(AppError::validation("Total must be greater than 0"));
        }

        let difference = (self.net + self.vat - self.total).abs();
        if difference > tolerance() {
            return Err(AppError::validation(format!(
                "Total {} does not match net {} + VAT {}",
                self.total, self.net, self.vat
            )));
        }

        Ok(())
    }

    /// Total actually transmitted; the authority requires it to equal net + VAT exactly
    pub fn balanced_total(&self) -> Decimal {
        self.net + self.vat
    }
}
