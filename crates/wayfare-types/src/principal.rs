use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Provider,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer => f.write_str("customer"),
            Self::Provider => f.write_str("provider"),
            Self::Admin => f.write_str("admin"),
        }
    }
}

/// Something a principal is allowed to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Create bookings under one's own identity.
    BookTickets,
    /// Hold and spend a wallet.
    UseWallet,
    /// Read or cancel bookings owned by anyone.
    ActOnAnyBooking,
    /// Trigger mirror repair and reconciliation.
    Reconcile,
}

/// The authenticated caller, resolved once at the edge and passed explicitly.
///
/// Business logic asks for capabilities instead of comparing role strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn customer(user_id: UserId) -> Self {
        Self { user_id, role: Role::Customer }
    }

    pub fn provider(user_id: UserId) -> Self {
        Self { user_id, role: Role::Provider }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self { user_id, role: Role::Admin }
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        match self.role {
            Role::Customer => &[Capability::BookTickets, Capability::UseWallet],
            Role::Provider => &[Capability::UseWallet],
            Role::Admin => &[
                Capability::BookTickets,
                Capability::UseWallet,
                Capability::ActOnAnyBooking,
                Capability::Reconcile,
            ],
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Owner of the record, or holder of [`Capability::ActOnAnyBooking`].
    pub fn may_act_on(&self, owner: &UserId) -> bool {
        &self.user_id == owner || self.can(Capability::ActOnAnyBooking)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.user_id)
    }
}
