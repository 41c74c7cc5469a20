use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identity::LedgerIdentity;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Identity used for reads that are not scoped to a caller.
    pub service_identity: String,
    pub call_timeout_ms: u64,
    pub channel: String,
    pub chaincode: String,
}

impl GatewayConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn service_identity(&self) -> LedgerIdentity {
        LedgerIdentity::new(self.service_identity.clone())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service_identity: "admin".into(),
            call_timeout_ms: 30_000,
            channel: "mychannel".into(),
            chaincode: "travel".into(),
        }
    }
}
