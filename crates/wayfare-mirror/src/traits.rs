use async_trait::async_trait;
use wayfare_types::{Booking, BookingId, UserId};

use crate::error::Result;

/// Off-chain queryable replica of ledger bookings.
///
/// The mirror is never authoritative. It is always written from canonical
/// ledger state, so `upsert_booking` must be idempotent: writing the same
/// booking twice leaves one record.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    async fn upsert_booking(&self, booking: &Booking) -> Result<()>;

    /// Returns `Ok(None)` if the booking has never been mirrored.
    async fn find_booking(&self, id: &BookingId) -> Result<Option<Booking>>;

    async fn find_bookings_by_user(&self, user: &UserId) -> Result<Vec<Booking>>;
}
