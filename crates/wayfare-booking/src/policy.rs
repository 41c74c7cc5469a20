use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use wayfare_types::Money;

use crate::error::{BookingError, BookingResult};

/// Commercial parameters of the marketplace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingPolicy {
    /// Fraction of the booking total kept on cancellation.
    pub cancellation_fee: Decimal,
    /// Balance a wallet opens with.
    pub starting_balance: Money,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            cancellation_fee: Decimal::new(2, 1),
            starting_balance: Decimal::from(1000),
        }
    }
}

impl BookingPolicy {
    pub fn validate(&self) -> BookingResult<()> {
        if self.cancellation_fee < Decimal::ZERO || self.cancellation_fee >= Decimal::ONE {
            return Err(BookingError::Validation(format!(
                "cancellation_fee must be in [0, 1), got {}",
                self.cancellation_fee
            )));
        }
        if self.starting_balance < Decimal::ZERO {
            return Err(BookingError::Validation(format!(
                "starting_balance must not be negative, got {}",
                self.starting_balance
            )));
        }
        Ok(())
    }

    /// `total * (1 - fee)`, rounded to cents.
    pub fn refund_for(&self, total: Money) -> Money {
        (total * (Decimal::ONE - self.cancellation_fee)).round_dp(2)
    }
}
