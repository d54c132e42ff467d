//! Credential and session persistence
//!
//! The engine persists a handful of string values: the tokens, the guard id,
//! the last status and the last report id. [`CredentialStore`] is the raw
//! get/set contract; the provided methods layer typed access on top of it.

mod file;
mod memory;

use std::fmt;

use log::warn;

use crate::error::Result;
use crate::types::identifiers::{GuardId, ReportId};
use crate::types::session::{GuardSession, TokenPair};
use crate::types::status::GuardStatus;

pub use file::JsonFileStore;
pub use memory::MemoryCredentialStore;

/// Keys persisted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    /// Current access token
    AccessToken,
    /// Current refresh token
    RefreshToken,
    /// Logged-in guard
    GuardId,
    /// Last known guard status code
    Status,
    /// Last assigned report id (-1 when none)
    LastReportId,
}

impl StoreKey {
    /// All keys, in persistence order
    pub const ALL: [Self; 5] = [
        Self::AccessToken,
        Self::RefreshToken,
        Self::GuardId,
        Self::Status,
        Self::LastReportId,
    ];

    /// Key name as stored
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
            Self::GuardId => "guard_id",
            Self::Status => "guard_status",
            Self::LastReportId => "last_report_id",
        }
    }

    /// Look a key up by its stored name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent key-value storage for one guard session
pub trait CredentialStore: Send + Sync {
    /// Read a value
    ///
    /// # Errors
    /// Returns `Store` if the backing storage cannot be read
    fn get(&self, key: StoreKey) -> Result<Option<String>>;

    /// Write a value
    ///
    /// # Errors
    /// Returns `Store` if the backing storage cannot be written
    fn set(&self, key: StoreKey, value: &str) -> Result<()>;

    /// Delete a value
    ///
    /// # Errors
    /// Returns `Store` if the backing storage cannot be written
    fn remove(&self, key: StoreKey) -> Result<()>;

    /// Delete every value
    ///
    /// # Errors
    /// Returns `Store` if the backing storage cannot be written
    fn clear(&self) -> Result<()>;

    // ------------------------------------------------------------------------
    // Typed access
    // ------------------------------------------------------------------------

    /// Stored access token
    ///
    /// # Errors
    /// Returns `Store` on read failure
    fn access_token(&self) -> Result<Option<String>> {
        self.get(StoreKey::AccessToken)
    }

    /// Stored refresh token
    ///
    /// # Errors
    /// Returns `Store` on read failure
    fn refresh_token(&self) -> Result<Option<String>> {
        self.get(StoreKey::RefreshToken)
    }

    /// Persist a refreshed pair; an access-only pair leaves the refresh token alone
    ///
    /// # Errors
    /// Returns `Store` on write failure
    fn save_tokens(&self, tokens: &TokenPair) -> Result<()> {
        self.set(StoreKey::AccessToken, &tokens.access_token)?;
        if let Some(ref refresh) = tokens.refresh_token {
            self.set(StoreKey::RefreshToken, refresh)?;
        }
        Ok(())
    }

    /// Stored guard id; unparseable values read as `None`
    ///
    /// # Errors
    /// Returns `Store` on read failure
    fn guard_id(&self) -> Result<Option<GuardId>> {
        Ok(self
            .get(StoreKey::GuardId)?
            .and_then(|raw| match raw.parse::<i64>() {
                Ok(id) => Some(GuardId::new(id)),
                Err(e) => {
                    warn!("Ignoring stored guard id {raw:?}: {e}");
                    None
                }
            }))
    }

    /// Stored status, `Unavailable` when missing or unreadable
    ///
    /// # Errors
    /// Returns `Store` on read failure
    fn status(&self) -> Result<GuardStatus> {
        let Some(raw) = self.get(StoreKey::Status)? else {
            return Ok(GuardStatus::default());
        };
        let status = raw
            .parse::<u8>()
            .ok()
            .and_then(|code| GuardStatus::from_code(code).ok());
        Ok(status.unwrap_or_else(|| {
            warn!("Ignoring stored status {raw:?}");
            GuardStatus::default()
        }))
    }

    /// Persist the guard status
    ///
    /// # Errors
    /// Returns `Store` on write failure
    fn set_status(&self, status: GuardStatus) -> Result<()> {
        self.set(StoreKey::Status, &status.code().to_string())
    }

    /// Stored last report id
    ///
    /// # Errors
    /// Returns `Store` on read failure
    fn last_report_id(&self) -> Result<Option<ReportId>> {
        Ok(self
            .get(StoreKey::LastReportId)?
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(ReportId::from_persisted))
    }

    /// Persist the last report id
    ///
    /// # Errors
    /// Returns `Store` on write failure
    fn set_last_report_id(&self, id: Option<ReportId>) -> Result<()> {
        self.set(
            StoreKey::LastReportId,
            &ReportId::to_persisted(id).to_string(),
        )
    }

    /// Assemble the persisted session
    ///
    /// # Errors
    /// Returns `Store` on read failure
    fn load_session(&self) -> Result<GuardSession> {
        Ok(GuardSession {
            guard_id: self.guard_id()?,
            status: self.status()?,
            access_token: self.access_token()?,
            refresh_token: self.refresh_token()?,
            last_report_id: self.last_report_id()?,
        })
    }

    /// Persist a whole session
    ///
    /// # Errors
    /// Returns `Store` on write failure
    fn save_session(&self, session: &GuardSession) -> Result<()> {
        match session.guard_id {
            Some(id) => self.set(StoreKey::GuardId, &id.to_string())?,
            None => self.remove(StoreKey::GuardId)?,
        }
        match session.access_token {
            Some(ref token) => self.set(StoreKey::AccessToken, token)?,
            None => self.remove(StoreKey::AccessToken)?,
        }
        match session.refresh_token {
            Some(ref token) => self.set(StoreKey::RefreshToken, token)?,
            None => self.remove(StoreKey::RefreshToken)?,
        }
        self.set_status(session.status)?;
        self.set_last_report_id(session.last_report_id)
    }
}
