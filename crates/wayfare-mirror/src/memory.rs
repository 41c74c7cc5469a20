//! In-memory mirror for tests, local demos, and `--in-memory` mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;
use wayfare_types::{Booking, BookingId, UserId};

use crate::error::{MirrorError, Result};
use crate::traits::MirrorStore;

/// Bookings keyed by id behind a `RwLock`.
///
/// An upsert carrying an older `updated_at` than the stored record is
/// ignored, so a slow writer cannot move a booking backwards.
#[derive(Debug, Default)]
pub struct InMemoryMirror {
    bookings: RwLock<HashMap<BookingId, Booking>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every upsert fails with [`MirrorError::WriteFailed`].
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of upserts applied.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.bookings.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MirrorStore for InMemoryMirror {
    async fn upsert_booking(&self, booking: &Booking) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MirrorError::WriteFailed(format!(
                "booking {} not written",
                booking.id
            )));
        }
        let mut bookings = self
            .bookings
            .write()
            .map_err(|e| MirrorError::Internal(format!("lock poisoned: {e}")))?;
        if let Some(existing) = bookings.get(&booking.id) {
            if existing.updated_at > booking.updated_at {
                debug!(booking_id = %booking.id, "ignoring stale mirror upsert");
                return Ok(());
            }
        }
        bookings.insert(booking.id.clone(), booking.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_booking(&self, id: &BookingId) -> Result<Option<Booking>> {
        let bookings = self
            .bookings
            .read()
            .map_err(|e| MirrorError::Internal(format!("lock poisoned: {e}")))?;
        Ok(bookings.get(id).cloned())
    }

    async fn find_bookings_by_user(&self, user: &UserId) -> Result<Vec<Booking>> {
        let bookings = self
            .bookings
            .read()
            .map_err(|e| MirrorError::Internal(format!("lock poisoned: {e}")))?;
        let mut found: Vec<Booking> = bookings
            .values()
            .filter(|b| &b.user_id == user)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }
}
