use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};
use wayfare_booking::BookingPolicy;
use wayfare_gateway::GatewayConfig;
use wayfare_types::{Role, UserId};
use wayfare_wallet::WalletConfig;

use crate::error::{ServerError, ServerResult};

/// Whole-service configuration, one TOML file with a table per section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WayfareConfig {
    pub server: ServerConfig,
    pub ledger: GatewayConfig,
    pub wallet: WalletConfig,
    pub policy: BookingPolicy,
}

impl WayfareConfig {
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn validate(&self) -> ServerResult<()> {
        self.policy
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        if self.ledger.call_timeout_ms == 0 {
            return Err(ServerError::Config(
                "ledger.call_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.ledger.service_identity.trim().is_empty() {
            return Err(ServerError::Config(
                "ledger.service_identity must not be empty".into(),
            ));
        }
        if let Some(token) = self
            .server
            .admin_tokens
            .keys()
            .find(|t| self.server.tokens.contains_key(*t))
        {
            return Err(ServerError::Config(format!(
                "token {} is listed as both admin and user token",
                redact(token)
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Bearer token to administrator user id.
    pub admin_tokens: BTreeMap<String, UserId>,
    /// Bearer token to customer or provider grant.
    pub tokens: BTreeMap<String, TokenGrant>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            admin_tokens: BTreeMap::new(),
            tokens: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub user: UserId,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Customer
}

/// First few characters of a token, for log and error messages.
pub(crate) fn redact(token: &str) -> String {
    let shown: String = token.chars().take(4).collect();
    format!("{shown}...")
}
