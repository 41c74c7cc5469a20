//! Ledger-owned entities this system reads but does not model itself.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use wayfare_types::{BookingId, Money, TicketId, TransportMode, TypeError, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Anonymous,
}

impl FromStr for Visibility {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "anonymous" => Ok(Self::Anonymous),
            other => Err(TypeError::UnknownVariant {
                kind: "visibility",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Anonymous => f.write_str("anonymous"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub visibility: Visibility,
    pub registered_date: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default)]
    pub booking_history: Vec<BookingId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub transport_mode: TransportMode,
    pub rating: Decimal,
    pub total_ratings: u32,
    pub registered_date: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default)]
    pub transport_list: Vec<TicketId>,
}

/// Arguments of `RegisterCustomer`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRegistration {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub visibility: Visibility,
}

/// Arguments of `RegisterProvider`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRegistration {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub transport_mode: TransportMode,
}

/// Arguments of `CreateTicket`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    pub id: TicketId,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub price: Money,
    pub seat_numbers: Vec<String>,
    pub provider: UserId,
    pub transport_mode: TransportMode,
}
