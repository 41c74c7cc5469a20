//! Off-chain booking mirror.
//!
//! The mirror answers listing queries without touching the ledger. It is
//! eventually consistent with the ledger: every write comes from canonical
//! state read back after a commit, and writes that fail are tracked in the
//! [`RepairLog`] until reconciliation catches them up.

pub mod error;
pub mod memory;
pub mod repair;
pub mod traits;

pub use error::{MirrorError, Result};
pub use memory::InMemoryMirror;
pub use repair::{PendingRepair, RepairLog, RepairTask};
pub use traits::MirrorStore;
