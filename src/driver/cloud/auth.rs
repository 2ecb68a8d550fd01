//! Bearer token handling for the cloud driver.
//!
//! The consent flow itself is opaque: a [`TokenProvider`] hands out short-lived
//! tokens and [`TokenCache`] keeps reusing one until it is about to expire.

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Short-lived bearer token
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            token: token.into(),
            expires_at: Utc::now() + lifetime,
        }
    }

    /// Valid for at least `skew` more.
    pub fn is_fresh(&self, skew: Duration) -> bool {
        self.expires_at - skew > Utc::now()
    }
}

/// Interactive consent collaborator. Fails with `AuthRequired` when no
/// credential can be obtained and `AuthCancelled` when the user declines.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn request_token(&self) -> Result<AccessToken, StorageError>;
}

/// Provider returning a fixed token (tests, service accounts).
pub struct StaticTokenProvider {
    token: String,
    lifetime: Duration,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            token: token.into(),
            lifetime,
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn request_token(&self) -> Result<AccessToken, StorageError> {
        Ok(AccessToken::new(self.token.clone(), self.lifetime))
    }
}

/// Provider reading the token from an environment variable on each consent.
pub struct EnvTokenProvider {
    var: String,
    lifetime: Duration,
}

impl EnvTokenProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            lifetime: Duration::hours(1),
        }
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn request_token(&self) -> Result<AccessToken, StorageError> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => {
                Ok(AccessToken::new(token.trim(), self.lifetime))
            }
            _ => Err(StorageError::AuthRequired(format!(
                "cloud token not available (set {})",
                self.var
            ))),
        }
    }
}

/// Caches the current token and only goes back to the provider when it is
/// absent or expired.
pub struct TokenCache {
    provider: Arc<dyn TokenProvider>,
    cached: Mutex<Option<AccessToken>>,
    refresh: tokio::sync::Mutex<()>,
    skew: Duration,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn TokenProvider>, skew: Duration) -> Self {
        Self {
            provider,
            cached: Mutex::new(None),
            refresh: tokio::sync::Mutex::new(()),
            skew,
        }
    }

    fn fresh_cached(&self) -> Option<String> {
        self.cached
            .lock()
            .as_ref()
            .filter(|t| t.is_fresh(self.skew))
            .map(|t| t.token.clone())
    }

    /// A valid bearer token, asking the provider for consent only when needed.
    pub async fn token(&self) -> Result<String, StorageError> {
        if let Some(token) = self.fresh_cached() {
            return Ok(token);
        }

        // One consent at a time; whoever waited behind it reuses the result.
        let _guard = self.refresh.lock().await;
        if let Some(token) = self.fresh_cached() {
            return Ok(token);
        }

        debug!("Requesting new cloud token");
        let token = self.provider.request_token().await?;
        info!(expires_at = %token.expires_at, "Obtained cloud token");
        let value = token.token.clone();
        *self.cached.lock() = Some(token);
        Ok(value)
    }

    /// Drop the cached token (disconnect, or the store rejected it).
    pub fn clear(&self) {
        *self.cached.lock() = None;
    }

    pub fn has_token(&self) -> bool {
        self.fresh_cached().is_some()
    }
}
