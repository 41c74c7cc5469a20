use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use wayfare_types::{Principal, Role};

use crate::config::{redact, ServerConfig};
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| Self::Bearer(t.to_string()))
            .unwrap_or(Self::Anonymous)
    }
}

/// Resolves request credentials to the caller.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Principal>;
}

/// Static bearer-token table.
#[derive(Debug, Default)]
pub struct TokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl TokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        let mut auth = Self::new();
        for (token, user) in &config.admin_tokens {
            auth.insert(token.clone(), Principal::admin(user.clone()));
        }
        for (token, grant) in &config.tokens {
            let principal = Principal {
                user_id: grant.user.clone(),
                role: grant.role,
            };
            auth.insert(token.clone(), principal);
        }
        auth
    }

    pub fn insert(&mut self, token: impl Into<String>, principal: Principal) {
        self.tokens.insert(token.into(), principal);
    }

    pub fn principals(&self) -> impl Iterator<Item = &Principal> {
        self.tokens.values()
    }

    /// Principals holding `role`, ordered by user id.
    pub fn principals_with_role(&self, role: Role) -> Vec<Principal> {
        let mut found: Vec<Principal> = self
            .tokens
            .values()
            .filter(|p| p.role == role)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        found.dedup();
        found
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl AuthProvider for TokenAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Principal> {
        match credentials {
            Credentials::Bearer(token) => self
                .tokens
                .get(token)
                .cloned()
                .ok_or_else(|| ServerError::AuthFailed(format!("unknown token {}", redact(token)))),
            Credentials::Anonymous => Err(ServerError::AuthFailed("missing bearer token".into())),
        }
    }
}

/// The authenticated caller of a request.
#[derive(Clone, Debug)]
pub struct Authenticated(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ServerResult<Self> {
        let credentials = Credentials::from_headers(&parts.headers);
        let principal = state.auth.authenticate(&credentials).await?;
        tracing::debug!(principal = %principal, "request authenticated");
        Ok(Self(principal))
    }
}
