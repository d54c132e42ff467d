//! Dispatch protocol message types
//!
//! Inbound frames are discriminated by their `status` field. Outbound frames
//! carry no discriminator; the server tells them apart by their field set.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::identifiers::{GuardId, ReportId};
use crate::types::location::GeoPoint;
use crate::types::status::GuardStatus;

// ============================================================================
// Inbound
// ============================================================================

/// Server → guard message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum InboundMessage {
    /// Server finished its side of the (re)connect handshake
    Connected,
    /// New assignment or assignment update
    Confirm {
        /// Report being assigned
        #[serde(rename = "reportId", default)]
        report_id: Option<ReportId>,
        /// Target location
        #[serde(default)]
        location: Option<GeoPoint>,
    },
    /// Guard ignored a pending assignment
    Warning,
    /// Assignment withdrawn by the server
    Cancel,
    /// Assignment no longer active
    NotActive,
    /// Any other `status` value
    #[serde(other)]
    Unknown,
}

// ============================================================================
// Outbound
// ============================================================================

/// Action carried by an intervention message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InterventionAction {
    /// Guard takes the assignment
    Accept,
    /// Guard rejects the assignment
    Cancel,
    /// Guard is on site
    ConfirmArrival,
    /// Intervention done
    Finish,
    /// Guard abandons an accepted intervention
    CancelStarted,
    /// Guard requests backup
    SupportNeeded,
}

/// Guard → server message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    /// Full resynchronisation after start or reconnect
    #[serde(rename_all = "camelCase")]
    Init {
        /// Always `true`
        init_message: bool,
        /// Sender
        guard_id: GuardId,
        /// Current status code
        status: GuardStatus,
        /// Latitude in degrees
        latitude: f64,
        /// Longitude in degrees
        longitude: f64,
    },
    /// Periodic position report
    #[serde(rename_all = "camelCase")]
    Position {
        /// Sender
        guard_id: GuardId,
        /// Current status code
        status: GuardStatus,
        /// Latitude in degrees
        latitude: f64,
        /// Longitude in degrees
        longitude: f64,
    },
    /// Status change without a position
    #[serde(rename_all = "camelCase")]
    Status {
        /// Sender
        guard_id: GuardId,
        /// New status code
        status: GuardStatus,
    },
    /// Guard action on an assignment
    #[serde(rename_all = "camelCase")]
    Intervention {
        /// Report acted on
        report_id: ReportId,
        /// The action
        intervention: InterventionAction,
    },
    /// Liveness ask for an assignment
    #[serde(rename_all = "camelCase")]
    AskIsActive {
        /// Always `"isActive"`
        ask: &'static str,
        /// Report asked about
        report_id: ReportId,
    },
}

impl OutboundMessage {
    /// Init message for the given position
    #[must_use]
    pub const fn init(guard_id: GuardId, status: GuardStatus, point: GeoPoint) -> Self {
        Self::Init {
            init_message: true,
            guard_id,
            status,
            latitude: point.latitude,
            longitude: point.longitude,
        }
    }

    /// Periodic position message
    #[must_use]
    pub const fn position(guard_id: GuardId, status: GuardStatus, point: GeoPoint) -> Self {
        Self::Position {
            guard_id,
            status,
            latitude: point.latitude,
            longitude: point.longitude,
        }
    }

    /// Status-only message
    #[must_use]
    pub const fn status(guard_id: GuardId, status: GuardStatus) -> Self {
        Self::Status { guard_id, status }
    }

    /// Intervention action message
    #[must_use]
    pub const fn intervention(report_id: ReportId, intervention: InterventionAction) -> Self {
        Self::Intervention {
            report_id,
            intervention,
        }
    }

    /// `{"ask":"isActive","reportId":..}`
    #[must_use]
    pub const fn ask_is_active(report_id: ReportId) -> Self {
        Self::AskIsActive {
            ask: "isActive",
            report_id,
        }
    }

    /// Serialize to a text frame
    ///
    /// # Errors
    /// Returns `JsonDecode` if serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
