//! Booking lifecycle.
//!
//! [`BookingManager`] coordinates one booking across three stores that fail
//! independently: the ledger (authoritative), the mirror (queryable copy)
//! and the wallet ledger (money). Ledger failures abort an operation with
//! nothing changed locally. Mirror writes and wallet refunds that fail after
//! the ledger committed are not reported as errors; they land in the repair
//! log and are retried by [`BookingManager::reconcile`].

pub mod error;
pub mod manager;
pub mod policy;
pub mod views;

pub use error::{BookingError, BookingResult};
pub use manager::BookingManager;
pub use policy::BookingPolicy;
pub use views::{
    BookingView, Cancellation, ConfirmedBooking, CreatedBooking, ReconcileReport, WalletRefund,
    WalletSettlement,
};
