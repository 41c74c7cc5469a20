//! Ledger gateway adapter.
//!
//! The permissioned ledger is the authoritative store for customers,
//! providers, tickets and bookings. This crate is the only place that talks
//! to it:
//!
//! - [`LedgerGateway`] is the raw identity-scoped `submit` / `evaluate` seam.
//! - [`ContractClient`] wraps a gateway with one typed method per contract
//!   operation, an enrolment check and a per-call timeout.
//! - [`InMemoryLedger`] simulates the travel contract in-process.

pub mod config;
pub mod contract;
pub mod error;
pub mod identity;
pub mod memory;
pub mod pricing;
pub mod records;
pub mod traits;

pub use config::GatewayConfig;
pub use contract::ContractClient;
pub use error::{GatewayError, GatewayResult};
pub use identity::{IdentityRegistry, LedgerIdentity};
pub use memory::{InMemoryLedger, SubmittedTransaction};
pub use pricing::dynamic_price;
pub use records::{
    Customer, CustomerRegistration, NewTicket, Provider, ProviderRegistration, Visibility,
};
pub use traits::LedgerGateway;
