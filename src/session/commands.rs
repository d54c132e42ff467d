//! Session command protocol
//!
//! Every mutation of the guard session goes through these commands so the
//! session task stays the single writer.

use tokio::sync::oneshot;

use crate::error::Result;
use crate::protocol::InterventionAction;
use crate::types::identifiers::ReportId;
use crate::types::session::{ActiveIntervention, LoginGrant, TokenPair};
use crate::types::status::GuardStatus;

use super::state::IntentOutcome;

pub(super) enum SessionCommand {
    /// Start a session from a login grant
    Begin {
        grant: LoginGrant,
        response_tx: oneshot::Sender<Result<()>>,
    },

    /// Drop the session and wipe the store
    Clear {
        response_tx: oneshot::Sender<Result<()>>,
    },

    /// The refresh token expired; drop the session and ask for a new login
    Expire {
        response_tx: oneshot::Sender<Result<()>>,
    },

    /// Tokens were refreshed and persisted
    UpdateTokens { tokens: TokenPair },

    /// Accept or reject a pending report, after the server said it is live
    Decide {
        report_id: ReportId,
        accept: bool,
        response_tx: oneshot::Sender<Result<IntentOutcome>>,
    },

    /// Arrival, finish, abandon or support request on the current report
    Act {
        action: InterventionAction,
        response_tx: oneshot::Sender<Result<ReportId>>,
    },

    /// Explicit status change
    ChangeStatus {
        status: GuardStatus,
        response_tx: oneshot::Sender<Result<()>>,
    },

    /// Flip between on and off patrol
    TogglePatrol {
        response_tx: oneshot::Sender<Result<GuardStatus>>,
    },

    /// Leave NOT_RESPONDING
    AcknowledgeWarning {
        response_tx: oneshot::Sender<Result<()>>,
    },

    /// Result of the login-time active intervention lookup
    AdoptActive {
        active: Option<ActiveIntervention>,
        response_tx: oneshot::Sender<Result<()>>,
    },
}
