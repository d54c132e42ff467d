//! REST contract consumed by the engine
//!
//! Login, registration and profile editing live outside the engine. What the
//! engine itself needs from the server's REST side is token refresh, the
//! stale-action check and the login-time active intervention lookup.

#[cfg(feature = "http")]
mod http;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use crate::error::{DispatchError, Result};
use crate::types::identifiers::{GuardId, ReportId};
use crate::types::location::GeoPoint;
use crate::types::session::{ActiveIntervention, TokenPair};

#[cfg(feature = "http")]
pub use http::HttpDispatchApi;

/// Endpoint paths, relative to the API base URL
pub mod endpoints {
    /// Access-only refresh
    pub const REFRESH_ACCESS: &str = "auth/guard/refresh_token";
    /// Refresh of both tokens
    pub const REFRESH_BOTH: &str = "auth/guard/refresh_refresh_token";
    /// Liveness of a report
    pub const IS_REPORT_ACTIVE: &str = "action/isReportActive";
    /// Active intervention assigned to a guard
    pub const ACTIVE_INTERVENTION: &str = "action/getActiveInterventionLocationAssignedToGuard";
}

/// Dispatch server REST contract
#[async_trait]
pub trait DispatchApi: Send + Sync {
    /// Exchange a refresh token for a new access token
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String>;

    /// Exchange a refresh token for a new access and refresh token
    async fn refresh_both_tokens(&self, refresh_token: &str) -> Result<TokenPair>;

    /// Whether the server still considers `report_id` live
    async fn is_report_active(&self, report_id: ReportId) -> Result<bool>;

    /// The intervention currently assigned to `guard_id`, if any
    async fn active_intervention(&self, guard_id: GuardId) -> Result<Option<ActiveIntervention>>;
}

/// Contract used when no REST endpoint is configured; every call fails
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredApi;

#[async_trait]
impl DispatchApi for UnconfiguredApi {
    async fn refresh_access_token(&self, _refresh_token: &str) -> Result<String> {
        Err(DispatchError::api("REST endpoint not configured"))
    }

    async fn refresh_both_tokens(&self, _refresh_token: &str) -> Result<TokenPair> {
        Err(DispatchError::api("REST endpoint not configured"))
    }

    async fn is_report_active(&self, _report_id: ReportId) -> Result<bool> {
        Err(DispatchError::api("REST endpoint not configured"))
    }

    async fn active_intervention(&self, _guard_id: GuardId) -> Result<Option<ActiveIntervention>> {
        Err(DispatchError::api("REST endpoint not configured"))
    }
}

/// Token response body
#[cfg_attr(not(feature = "http"), allow(dead_code))]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[cfg_attr(not(feature = "http"), allow(dead_code))]
impl TokenResponse {
    /// Access token, rejecting an empty one
    pub(crate) fn into_access_token(self) -> Result<String> {
        match self.access_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(DispatchError::api("Refresh response carried no access token")),
        }
    }

    /// Both tokens, rejecting an empty access token
    pub(crate) fn into_pair(self) -> Result<TokenPair> {
        let refresh = self.refresh_token.clone().filter(|t| !t.is_empty());
        Ok(TokenPair::new(self.into_access_token()?, refresh))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveInterventionBody {
    #[serde(default)]
    report_id: Option<ReportId>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lng: Option<f64>,
}

/// Parse the active-intervention response body
///
/// An empty body, `null` or a body without coordinates means no intervention.
///
/// # Errors
/// Returns `JsonDecode` if the body is not JSON
pub fn parse_active_intervention(body: &str) -> Result<Option<ActiveIntervention>> {
    let body = body.trim();
    if body.is_empty() || body == "null" {
        return Ok(None);
    }

    let parsed: ActiveInterventionBody = serde_json::from_str(body)?;
    match (parsed.lat, parsed.lng) {
        (Some(lat), Some(lng)) => Ok(Some(ActiveIntervention {
            report_id: parsed.report_id,
            location: GeoPoint::new(lat, lng),
        })),
        _ => {
            debug!("Active intervention body without coordinates: {body}");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_no_intervention() {
        assert_eq!(parse_active_intervention("").unwrap(), None);
        assert_eq!(parse_active_intervention("null").unwrap(), None);
    }

    #[test]
    fn parses_report_and_location() {
        let active = parse_active_intervention(r#"{"reportId":12,"lat":51.1079,"lng":17.0385}"#)
            .unwrap()
            .unwrap();
        assert_eq!(active.report_id, Some(ReportId::new(12)));
        assert_eq!(active.location, GeoPoint::new(51.1079, 17.0385));
    }

    #[test]
    fn missing_coordinates_is_no_intervention() {
        assert_eq!(parse_active_intervention(r#"{"reportId":3}"#).unwrap(), None);
    }

    #[test]
    fn empty_access_token_is_a_failure() {
        let response = TokenResponse {
            access_token: Some(String::new()),
            refresh_token: Some("r".into()),
        };
        assert!(response.into_pair().is_err());
    }
}
