//! Observable session state and events

use crate::types::identifiers::ReportId;
use crate::types::session::{GuardSession, InterventionReport, ReportLifecycle};
use crate::types::status::GuardStatus;

/// Read-only view of the session published after every change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    /// The guard session
    pub session: GuardSession,
    /// Live intervention report, if any
    pub report: Option<InterventionReport>,
    /// A pushed report is waiting for the guard's decision
    pub intervention_pending: bool,
}

impl SessionSnapshot {
    /// Current guard status
    #[must_use]
    pub const fn status(&self) -> GuardStatus {
        self.session.status
    }

    /// Status changes are locked until the warning is acknowledged
    #[must_use]
    pub fn acknowledgement_required(&self) -> bool {
        self.session.status == GuardStatus::NotResponding
    }

    /// Report the next intervention action refers to: the live report, or
    /// the last assigned one
    #[must_use]
    pub fn current_report_id(&self) -> Option<ReportId> {
        self.report
            .as_ref()
            .map(|report| report.report_id)
            .or(self.session.last_report_id)
    }
}

/// Session events for UI collaborators
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Guard status changed
    StatusChanged(GuardStatus),
    /// A report was pushed and awaits confirmation
    InterventionPending(InterventionReport),
    /// The server withdrew the assignment
    InterventionCancelled {
        /// Report that was live, if any
        report_id: Option<ReportId>,
    },
    /// The guard ignored an assignment and must acknowledge
    AcknowledgementRequired,
    /// The refresh token expired and the session was cleared; the guard must
    /// log in again
    ReauthenticationRequired,
    /// The server completed the (re)connect handshake
    ConnectionReady,
    /// The report ended: finished, abandoned, rejected or displaced
    ReportCleared {
        /// Report that was cleared
        report_id: ReportId,
        /// Terminal lifecycle, `Finished` or `Cancelled`
        lifecycle: ReportLifecycle,
    },
}

/// Result of an intent that is checked against the server first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentOutcome {
    /// State changed and the message was handed to the connection
    Sent,
    /// The report was no longer live; nothing changed
    Suppressed,
}
