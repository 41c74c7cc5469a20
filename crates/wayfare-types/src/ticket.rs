use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ids::{TicketId, UserId};
use crate::money::Money;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Air,
    Land,
    Water,
}

impl FromStr for TransportMode {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "air" => Ok(Self::Air),
            "land" => Ok(Self::Land),
            "water" => Ok(Self::Water),
            other => Err(TypeError::UnknownVariant {
                kind: "transport mode",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Air => f.write_str("air"),
            Self::Land => f.write_str("land"),
            Self::Water => f.write_str("water"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Vacant,
    Booked,
    Blocked,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub id: String,
    pub number: String,
    pub status: SeatStatus,
    #[serde(default)]
    pub booked_by: Option<UserId>,
}

/// Ticket record owned by the ledger. Read-mostly from this system's view:
/// it supplies the booking total and the projection shown next to bookings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub price: Money,
    pub dynamic_price: Money,
    pub available_seats: u32,
    pub total_seats: u32,
    pub seats: Vec<Seat>,
    pub service_provider: UserId,
    pub transport_mode: TransportMode,
    /// `Available` or `Booked` (no vacant seat left).
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn seat_id(ticket: &TicketId, number: &str) -> String {
        format!("{ticket}-seat-{number}")
    }

    pub fn vacant_seats(&self) -> impl Iterator<Item = &Seat> {
        self.seats.iter().filter(|s| s.status == SeatStatus::Vacant)
    }

    /// Projection returned alongside a booking.
    ///
    /// `with_pricing` adds the base and dynamic price, which the booking
    /// detail view shows and the payment confirmation does not.
    pub fn summary(&self, with_pricing: bool) -> TicketSummary {
        TicketSummary {
            id: self.id.clone(),
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            departure_time: self.departure_time,
            arrival_time: self.arrival_time,
            service_provider: self.service_provider.clone(),
            transport_mode: self.transport_mode,
            price: with_pricing.then_some(self.price),
            dynamic_price: with_pricing.then_some(self.dynamic_price),
        }
    }
}

/// Minimal ticket projection composed into booking responses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketSummary {
    pub id: TicketId,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub service_provider: UserId,
    pub transport_mode: TransportMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_price: Option<Money>,
}
