use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier, rejecting blank values.
            pub fn new(raw: impl Into<String>) -> Result<Self, TypeError> {
                let raw = raw.into();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(TypeError::EmptyIdentifier($label));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Ledger identity of a customer, provider, or administrator.
    UserId,
    "user id"
);
string_id!(
    /// Identifier of a booking record on the ledger.
    BookingId,
    "booking id"
);
string_id!(
    /// Identifier of a ticket record on the ledger.
    TicketId,
    "ticket id"
);
string_id!(
    /// External reference proving a payment (gateway transaction id or
    /// wallet transaction id).
    PaymentReference,
    "payment reference"
);
string_id!(
    /// Client-supplied key that suppresses duplicate application of one
    /// logical wallet mutation.
    IdempotencyKey,
    "idempotency key"
);

impl BookingId {
    /// Generate a fresh booking id of the form `booking_` followed by the
    /// 32 hex digits of a UUID v7.
    pub fn generate() -> Self {
        let simple = uuid::Uuid::now_v7().simple().to_string();
        Self(format!("booking_{}", simple.to_uppercase()))
    }
}

impl IdempotencyKey {
    /// Key for the wallet debit that settles a booking. Each attempt that
    /// was reversed gets the next attempt number, so paying again charges
    /// again.
    pub fn booking_payment(booking: &BookingId, attempt: u32) -> Self {
        Self(format!("booking-payment:{booking}:{attempt}"))
    }

    /// Key for the compensating credit of one payment attempt whose
    /// confirmation the ledger refused.
    pub fn booking_payment_reversal(booking: &BookingId, attempt: u32) -> Self {
        Self(format!("booking-payment-reversal:{booking}:{attempt}"))
    }

    /// Key for the cancellation refund of a booking.
    pub fn booking_refund(booking: &BookingId) -> Self {
        Self(format!("booking-refund:{booking}"))
    }

    /// Key supplied by an API client. Kept in its own namespace so it can
    /// never match a key derived above.
    pub fn client(raw: impl Into<String>) -> Result<Self, TypeError> {
        let raw = Self::new(raw)?;
        Ok(Self(format!("client:{}", raw.0)))
    }
}
