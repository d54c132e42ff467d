//! Access/refresh token lifecycle
//!
//! [`CredentialManager`] answers "is this token about to expire" from the
//! stored JWTs and runs the refresh exchange against the REST contract. It
//! never logs the guard out itself; [`CredentialManager::check`] reports an
//! expired session and the caller decides what to do.

pub mod jwt;

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::api::DispatchApi;
use crate::error::Result;
use crate::store::CredentialStore;
use crate::types::options::TokenThresholds;
use crate::types::session::TokenPair;

/// Outcome of one credential check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialCheck {
    /// Refresh token is expired; the session cannot continue
    SessionExpired,
    /// Tokens were exchanged and persisted
    Refreshed(TokenPair),
    /// Nothing to do, or the exchange failed
    NoAction,
}

/// Token expiry arithmetic and refresh orchestration
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    api: Arc<dyn DispatchApi>,
    thresholds: TokenThresholds,
}

impl CredentialManager {
    /// Create a manager over `store` and `api`
    pub fn new(
        store: Arc<dyn CredentialStore>,
        api: Arc<dyn DispatchApi>,
        thresholds: TokenThresholds,
    ) -> Self {
        Self {
            store,
            api,
            thresholds,
        }
    }

    /// Current Unix time in seconds
    #[must_use]
    pub fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// Expiry windows in use
    #[must_use]
    pub const fn thresholds(&self) -> TokenThresholds {
        self.thresholds
    }

    // ========================================================================
    // Expiry checks
    // ========================================================================

    /// Access token missing or expiring within the access window
    #[must_use]
    pub fn is_access_token_near_expiration(&self) -> bool {
        self.is_access_token_near_expiration_at(Self::now())
    }

    /// [`Self::is_access_token_near_expiration`] at an explicit time
    #[must_use]
    pub fn is_access_token_near_expiration_at(&self, now: i64) -> bool {
        let token = Self::read_token("access", self.store.access_token());
        Self::near(token.as_deref(), self.thresholds.access_secs, now)
    }

    /// Refresh token missing or expiring within the refresh window
    #[must_use]
    pub fn is_refresh_token_near_expiration(&self) -> bool {
        self.is_refresh_token_near_expiration_at(Self::now())
    }

    /// [`Self::is_refresh_token_near_expiration`] at an explicit time
    #[must_use]
    pub fn is_refresh_token_near_expiration_at(&self, now: i64) -> bool {
        let token = Self::read_token("refresh", self.store.refresh_token());
        Self::near(token.as_deref(), self.thresholds.refresh_secs, now)
    }

    /// Refresh token missing or already expired
    #[must_use]
    pub fn is_refresh_token_expired(&self) -> bool {
        self.is_refresh_token_expired_at(Self::now())
    }

    /// [`Self::is_refresh_token_expired`] at an explicit time
    #[must_use]
    pub fn is_refresh_token_expired_at(&self, now: i64) -> bool {
        let token = Self::read_token("refresh", self.store.refresh_token());
        Self::near(token.as_deref(), self.thresholds.refresh_expired_secs, now)
    }

    fn near(token: Option<&str>, threshold_secs: i64, now: i64) -> bool {
        match token {
            None => true,
            Some(token) => jwt::expires_within(token, threshold_secs, now),
        }
    }

    fn read_token(which: &str, read: Result<Option<String>>) -> Option<String> {
        read.unwrap_or_else(|e| {
            warn!("Failed to read {which} token: {e}");
            None
        })
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Refresh whatever is close to expiring
    ///
    /// Returns the new pair after persisting it, or `None` when no refresh was
    /// needed, no refresh token is stored, or the exchange failed.
    pub async fn refresh_if_needed(&self) -> Option<TokenPair> {
        self.refresh_if_needed_at(Self::now()).await
    }

    /// [`Self::refresh_if_needed`] at an explicit time
    pub async fn refresh_if_needed_at(&self, now: i64) -> Option<TokenPair> {
        let refresh_token = Self::read_token("refresh", self.store.refresh_token())?;

        let pair = if self.is_refresh_token_near_expiration_at(now) {
            debug!("Refresh token near expiration; refreshing both tokens");
            match self.api.refresh_both_tokens(&refresh_token).await {
                Ok(pair) if pair.refresh_token.is_some() => pair,
                Ok(_) => {
                    warn!("Token refresh answered without a refresh token");
                    return None;
                }
                Err(e) => {
                    warn!("Failed to refresh both tokens: {e}");
                    return None;
                }
            }
        } else if self.is_access_token_near_expiration_at(now) {
            debug!("Access token near expiration; refreshing access token");
            match self.api.refresh_access_token(&refresh_token).await {
                Ok(access) if !access.is_empty() => TokenPair::new(access, Some(refresh_token)),
                Ok(_) => {
                    warn!("Token refresh answered with an empty access token");
                    return None;
                }
                Err(e) => {
                    warn!("Failed to refresh access token: {e}");
                    return None;
                }
            }
        } else {
            return None;
        };

        if let Err(e) = self.store.save_tokens(&pair) {
            error!("Failed to persist refreshed tokens: {e}");
        }
        info!("Credentials refreshed");
        Some(pair)
    }

    /// One credential check, as run on the token cadence
    ///
    /// An expired refresh token short-circuits without calling the server.
    pub async fn check(&self) -> CredentialCheck {
        self.check_at(Self::now()).await
    }

    /// [`Self::check`] at an explicit time
    pub async fn check_at(&self, now: i64) -> CredentialCheck {
        if self.is_refresh_token_expired_at(now) {
            info!("Refresh token expired; session cannot be renewed");
            return CredentialCheck::SessionExpired;
        }
        match self.refresh_if_needed_at(now).await {
            Some(pair) => CredentialCheck::Refreshed(pair),
            None => CredentialCheck::NoAction,
        }
    }
}
