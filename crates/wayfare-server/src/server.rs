use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use wayfare_booking::BookingManager;
use wayfare_gateway::{
    ContractClient, IdentityRegistry, InMemoryLedger, LedgerGateway, LedgerIdentity,
};
use wayfare_mirror::{InMemoryMirror, MirrorStore};
use wayfare_types::Principal;
use wayfare_wallet::WalletLedger;

use crate::auth::TokenAuthenticator;
use crate::config::WayfareConfig;
use crate::demo;
use crate::error::ServerResult;
use crate::handler::AppState;
use crate::router::build_router;

/// Wayfare HTTP service.
pub struct WayfareServer {
    config: WayfareConfig,
    state: AppState,
    principals: Vec<Principal>,
}

impl WayfareServer {
    /// Wire the service over a ledger gateway and a mirror store.
    ///
    /// The service identity and every configured token holder are enrolled
    /// with the gateway. Wallets are journaled under `wallet.data_dir`, or
    /// kept in memory when it is unset.
    pub fn build(
        config: WayfareConfig,
        gateway: Arc<dyn LedgerGateway>,
        mirror: Arc<dyn MirrorStore>,
    ) -> ServerResult<Self> {
        config.validate()?;
        let auth = TokenAuthenticator::from_config(&config.server);
        let principals: Vec<Principal> = auth.principals().cloned().collect();

        let service_identity = config.ledger.service_identity();
        let registry = IdentityRegistry::with_identities(
            std::iter::once(service_identity.clone())
                .chain(principals.iter().map(|p| LedgerIdentity::from(&p.user_id))),
        );
        let contract = ContractClient::new(
            gateway,
            Arc::new(registry),
            config.ledger.call_timeout(),
        );

        let starting_balance = config.policy.starting_balance;
        let wallets = match config.wallet.journal_path() {
            Some(path) => WalletLedger::open(&path, starting_balance, config.wallet.sync_mode)?,
            None => {
                warn!("wallet.data_dir not set; wallets will not survive a restart");
                WalletLedger::in_memory(starting_balance)
            }
        };

        let manager = BookingManager::new(
            contract,
            mirror,
            Arc::new(wallets),
            config.policy.clone(),
            service_identity,
        );
        let state = AppState {
            manager: Arc::new(manager),
            auth: Arc::new(auth),
            channel: config.ledger.channel.clone(),
            chaincode: config.ledger.chaincode.clone(),
        };
        info!(
            principals = principals.len(),
            channel = %config.ledger.channel,
            chaincode = %config.ledger.chaincode,
            "wayfare service assembled"
        );
        Ok(Self {
            config,
            state,
            principals,
        })
    }

    /// Run against the in-process ledger simulator and mirror, with every
    /// configured customer and provider registered and a demo ticket listed.
    pub async fn in_memory(config: WayfareConfig) -> ServerResult<Self> {
        let ledger = Arc::new(InMemoryLedger::new(config.ledger.service_identity()));
        let admin = config.ledger.service_identity();
        let server = Self::build(config, ledger, Arc::new(InMemoryMirror::new()))?;
        let ticket = demo::seed(server.manager().contract(), &admin, &server.principals).await?;
        info!(ticket_id = %ticket, "in-memory ledger seeded");
        Ok(server)
    }

    pub fn config(&self) -> &WayfareConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<BookingManager> {
        &self.state.manager
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve until ctrl-c.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let addr = self.config.server.bind_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %addr, "wayfare server listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("wayfare server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for ctrl-c; serving until killed");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenGrant;
    use wayfare_types::{Role, UserId};

    fn config() -> WayfareConfig {
        let mut config = WayfareConfig::default();
        config.wallet.data_dir = None;
        config.server.tokens.insert(
            "alice-token".into(),
            TokenGrant {
                user: UserId::new("alice").unwrap(),
                role: Role::Customer,
            },
        );
        config
    }

    #[test]
    fn token_holders_are_enrolled() {
        let server = WayfareServer::build(
            config(),
            Arc::new(InMemoryLedger::default()),
            Arc::new(InMemoryMirror::new()),
        )
        .unwrap();
        let identities = server.manager().contract().identities();
        assert!(identities.contains(&LedgerIdentity::new("admin")));
        assert!(identities.contains(&LedgerIdentity::new("alice")));
        assert!(!server.manager().wallets().is_durable());
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut bad = config();
        bad.ledger.call_timeout_ms = 0;
        let result = WayfareServer::build(
            bad,
            Arc::new(InMemoryLedger::default()),
            Arc::new(InMemoryMirror::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn journal_lives_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.wallet.data_dir = Some(dir.path().to_path_buf());
        let server = WayfareServer::in_memory(config).await.unwrap();
        assert!(server.manager().wallets().is_durable());
        assert!(dir.path().join(wayfare_wallet::JOURNAL_FILE).exists());
    }
}
