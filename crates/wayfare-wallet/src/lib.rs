//! Wallet ledger.
//!
//! One balance and append-only transaction log per user, independent of
//! the booking ledger. The invariant kept at every point is
//! `balance == starting + deposits + refunds - payments`, with the balance
//! never negative.

pub mod config;
pub mod error;
pub mod journal;
pub mod ledger;

pub use config::{WalletConfig, JOURNAL_FILE};
pub use error::{WalletError, WalletResult};
pub use journal::{CompactionStats, JournalEvent, JournalRecord, SyncMode, WalletJournal};
pub use ledger::{WalletLedger, WalletReceipt};
