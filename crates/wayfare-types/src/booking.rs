use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ids::{BookingId, PaymentReference, TicketId, UserId};
use crate::money::Money;

/// Lifecycle state of a booking.
///
/// `Cancelled` is terminal. Legal transitions are `Pending -> Confirmed`,
/// `Pending -> Cancelled`, and `Confirmed -> Cancelled`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Confirmed, Self::Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Confirmed => f.write_str("Confirmed"),
            Self::Cancelled => f.write_str("Cancelled"),
        }
    }
}

/// A booking record as stored on the ledger and mirrored off-chain.
///
/// Bookings are never physically deleted; cancellation is a status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub ticket_id: TicketId,
    pub user_id: UserId,
    pub seat_ids: Vec<String>,
    pub number_of_seats: u32,
    pub total_price: Money,
    pub status: BookingStatus,
    pub is_payment_confirmed: bool,
    #[serde(default)]
    pub payment_reference: Option<PaymentReference>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Check the structural invariants of a booking record.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.seat_ids.is_empty() {
            return Err(TypeError::Serialization(format!(
                "booking {} has no seats",
                self.id
            )));
        }
        let unique: HashSet<&String> = self.seat_ids.iter().collect();
        if unique.len() != self.seat_ids.len() {
            return Err(TypeError::Serialization(format!(
                "booking {} has duplicate seats",
                self.id
            )));
        }
        if self.number_of_seats as usize != self.seat_ids.len() {
            return Err(TypeError::Serialization(format!(
                "booking {} seat count {} does not match {} seat ids",
                self.id,
                self.number_of_seats,
                self.seat_ids.len()
            )));
        }
        if self.total_price <= Decimal::ZERO {
            return Err(TypeError::InvalidAmount {
                field: "totalPrice",
                reason: format!("booking {} has non-positive total", self.id),
            });
        }
        Ok(())
    }

    /// Move to `next`, refusing illegal transitions.
    pub fn transition(&mut self, next: BookingStatus, at: DateTime<Utc>) -> Result<(), TypeError> {
        if !self.status.can_transition_to(next) {
            return Err(TypeError::IllegalTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.user_id == user
    }
}
