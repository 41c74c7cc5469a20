use std::collections::HashSet;
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use wayfare_types::UserId;

/// Enrolled principal under which ledger transactions are signed.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerIdentity(String);

impl LedgerIdentity {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is(&self, user: &UserId) -> bool {
        self.0 == user.as_str()
    }
}

impl From<&UserId> for LedgerIdentity {
    fn from(user: &UserId) -> Self {
        Self(user.as_str().to_string())
    }
}

impl fmt::Debug for LedgerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerIdentity({})", self.0)
    }
}

impl fmt::Display for LedgerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local store of enrolled identities, consulted before every gateway call.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    enrolled: RwLock<HashSet<LedgerIdentity>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identities<I>(identities: I) -> Self
    where
        I: IntoIterator<Item = LedgerIdentity>,
    {
        Self {
            enrolled: RwLock::new(identities.into_iter().collect()),
        }
    }

    /// Enroll an identity. Returns `false` if it was already enrolled.
    pub fn enroll(&self, identity: LedgerIdentity) -> bool {
        self.enrolled
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(identity)
    }

    pub fn revoke(&self, identity: &LedgerIdentity) -> bool {
        self.enrolled
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(identity)
    }

    pub fn contains(&self, identity: &LedgerIdentity) -> bool {
        self.enrolled
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains(identity)
    }

    pub fn len(&self) -> usize {
        self.enrolled.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enroll_and_revoke() {
        let registry = IdentityRegistry::new();
        let alice = LedgerIdentity::new("alice");
        assert!(!registry.contains(&alice));
        assert!(registry.enroll(alice.clone()));
        assert!(!registry.enroll(alice.clone()));
        assert!(registry.contains(&alice));
        assert!(registry.revoke(&alice));
        assert!(registry.is_empty());
    }

    #[test]
    fn identity_from_user() {
        let user = UserId::new("cust-9").unwrap();
        let identity = LedgerIdentity::from(&user);
        assert!(identity.is(&user));
        assert_eq!(identity.to_string(), "cust-9");
    }
}
