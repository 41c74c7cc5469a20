use async_trait::async_trait;

use crate::error::GatewayResult;
use crate::identity::LedgerIdentity;

/// Boundary to the permissioned ledger.
///
/// Both calls are identity-scoped. `submit` orders and commits a
/// state-changing transaction; `evaluate` runs a read-only query against
/// current world state. Arguments are strings (money as decimal strings,
/// lists as JSON) and results are raw bytes, usually JSON.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn submit(
        &self,
        identity: &LedgerIdentity,
        transaction: &str,
        args: &[String],
    ) -> GatewayResult<Vec<u8>>;

    async fn evaluate(
        &self,
        identity: &LedgerIdentity,
        query: &str,
        args: &[String],
    ) -> GatewayResult<Vec<u8>>;
}
