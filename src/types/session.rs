//! Guard session and intervention report records

use std::fmt;

use serde::{Deserialize, Serialize};

use super::identifiers::{GuardId, ReportId};
use super::location::GeoPoint;
use super::status::GuardStatus;

// ============================================================================
// Tokens
// ============================================================================

/// Access/refresh token pair returned by a successful refresh
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived credential for REST and channel auth
    pub access_token: String,
    /// Long-lived credential used to mint access tokens
    pub refresh_token: Option<String>,
}

impl TokenPair {
    /// Create a token pair
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Result of the external login/registration contract
#[derive(Clone)]
pub struct LoginGrant {
    /// Guard identity assigned by the server
    pub guard_id: GuardId,
    /// Initial tokens
    pub tokens: TokenPair,
}

impl LoginGrant {
    /// Create a login grant
    pub fn new(
        guard_id: GuardId,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            guard_id,
            tokens: TokenPair::new(access_token, refresh_token),
        }
    }
}

impl fmt::Debug for LoginGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginGrant")
            .field("guard_id", &self.guard_id)
            .field("tokens", &self.tokens)
            .finish()
    }
}

// ============================================================================
// Guard session
// ============================================================================

/// Authoritative local view of one guard's session
#[derive(Clone, PartialEq, Eq, Default)]
pub struct GuardSession {
    /// Guard identity; `None` before login
    pub guard_id: Option<GuardId>,
    /// Current patrol status
    pub status: GuardStatus,
    /// Current access token
    pub access_token: Option<String>,
    /// Current refresh token
    pub refresh_token: Option<String>,
    /// Most recently assigned report
    pub last_report_id: Option<ReportId>,
}

impl GuardSession {
    /// Fresh session for a guard that just logged in
    #[must_use]
    pub fn from_grant(grant: &LoginGrant, status: GuardStatus) -> Self {
        Self {
            guard_id: Some(grant.guard_id),
            status,
            access_token: Some(grant.tokens.access_token.clone()),
            refresh_token: grant.tokens.refresh_token.clone(),
            last_report_id: None,
        }
    }

    /// Whether a guard is logged in
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.guard_id.is_some()
    }

    /// Last report id in its persisted form (-1 when none)
    #[must_use]
    pub const fn last_report_id_raw(&self) -> i64 {
        ReportId::to_persisted(self.last_report_id)
    }

    /// Apply refreshed tokens, keeping the existing refresh token when the
    /// refresh was access-only
    pub fn apply_tokens(&mut self, tokens: &TokenPair) {
        self.access_token = Some(tokens.access_token.clone());
        if let Some(ref refresh) = tokens.refresh_token {
            self.refresh_token = Some(refresh.clone());
        }
    }
}

impl fmt::Debug for GuardSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardSession")
            .field("guard_id", &self.guard_id)
            .field("status", &self.status)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("last_report_id", &self.last_report_id)
            .finish()
    }
}

// ============================================================================
// Intervention report
// ============================================================================

/// Lifecycle of an intervention report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportLifecycle {
    /// Pushed by the server, awaiting the guard's decision
    PendingConfirm,
    /// Guard accepted and is on the way
    Accepted,
    /// Guard confirmed arrival
    Arrived,
    /// Guard finished the intervention
    Finished,
    /// Withdrawn by the server or abandoned by the guard
    Cancelled,
}

impl ReportLifecycle {
    /// Whether a report in this state still occupies the session
    ///
    /// Finished and cancelled reports are dropped from the session and only
    /// show up in [`crate::SessionEvent::ReportCleared`].
    #[must_use]
    pub const fn is_live(self) -> bool {
        !matches!(self, Self::Finished | Self::Cancelled)
    }

    /// Whether the guard is already working on the report
    #[must_use]
    pub const fn is_in_progress(self) -> bool {
        matches!(self, Self::Accepted | Self::Arrived)
    }
}

/// An assignment in flight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterventionReport {
    /// Report identifier
    pub report_id: ReportId,
    /// Target location
    pub location: GeoPoint,
    /// Current lifecycle state
    pub lifecycle: ReportLifecycle,
}

impl InterventionReport {
    /// New report awaiting confirmation
    #[must_use]
    pub const fn pending(report_id: ReportId, location: GeoPoint) -> Self {
        Self {
            report_id,
            location,
            lifecycle: ReportLifecycle::PendingConfirm,
        }
    }
}

/// Active intervention discovered through the REST contract at login
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveIntervention {
    /// Report id, when the server included one
    pub report_id: Option<ReportId>,
    /// Target location
    pub location: GeoPoint,
}
