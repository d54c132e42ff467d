//! Cloneable front end of the session task

use std::sync::Arc;

use log::info;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::commands::SessionCommand;
use super::state::{IntentOutcome, SessionEvent, SessionSnapshot};
use crate::api::DispatchApi;
use crate::error::{DispatchError, Result};
use crate::protocol::InterventionAction;
use crate::types::identifiers::ReportId;
use crate::types::session::{LoginGrant, TokenPair};
use crate::types::status::GuardStatus;

/// Handle to the session task
#[derive(Clone)]
pub struct SessionHandle {
    pub(super) command_tx: mpsc::UnboundedSender<SessionCommand>,
    pub(super) snapshot_rx: watch::Receiver<SessionSnapshot>,
    pub(super) events_tx: broadcast::Sender<SessionEvent>,
    pub(super) api: Arc<dyn DispatchApi>,
}

impl SessionHandle {
    // ========================================================================
    // Observation
    // ========================================================================

    /// Current session view
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Current guard status
    #[must_use]
    pub fn status(&self) -> GuardStatus {
        self.snapshot_rx.borrow().status()
    }

    /// Observable session view
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Subscribe to session events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Start a session for a freshly logged-in guard
    ///
    /// # Errors
    /// Returns `Store` if the session cannot be persisted
    pub async fn begin(&self, grant: LoginGrant) -> Result<()> {
        self.request(|response_tx| SessionCommand::Begin { grant, response_tx })
            .await?
    }

    /// Forget the session and wipe the store
    ///
    /// # Errors
    /// Returns `Store` if the store cannot be cleared
    pub async fn clear(&self) -> Result<()> {
        self.request(|response_tx| SessionCommand::Clear { response_tx })
            .await?
    }

    /// Forget a session whose refresh token expired
    ///
    /// Subscribers get [`SessionEvent::ReauthenticationRequired`].
    ///
    /// # Errors
    /// Returns `Store` if the store cannot be cleared
    pub async fn expire(&self) -> Result<()> {
        self.request(|response_tx| SessionCommand::Expire { response_tx })
            .await?
    }

    /// Apply tokens the credential manager already persisted
    pub fn update_tokens(&self, tokens: TokenPair) {
        let _ = self.command_tx.send(SessionCommand::UpdateTokens { tokens });
    }

    // ========================================================================
    // Report decisions (checked against the server first)
    // ========================================================================

    /// Accept the pending report
    ///
    /// # Errors
    /// Returns `AcknowledgementRequired` while NOT_RESPONDING, `NoLiveReport`
    /// without a report, or the error of the availability check
    pub async fn confirm_intervention(&self) -> Result<IntentOutcome> {
        self.decide(true).await
    }

    /// Reject the pending report
    ///
    /// # Errors
    /// Same as [`Self::confirm_intervention`]
    pub async fn reject_intervention(&self) -> Result<IntentOutcome> {
        self.decide(false).await
    }

    async fn decide(&self, accept: bool) -> Result<IntentOutcome> {
        let snapshot = self.snapshot();
        if snapshot.acknowledgement_required() {
            return Err(DispatchError::AcknowledgementRequired);
        }
        let report_id = snapshot
            .current_report_id()
            .ok_or(DispatchError::NoLiveReport)?;

        if !self.api.is_report_active(report_id).await? {
            info!("Report {report_id} is no longer active; suppressing decision");
            return Ok(IntentOutcome::Suppressed);
        }

        self.request(|response_tx| SessionCommand::Decide {
            report_id,
            accept,
            response_tx,
        })
        .await?
    }

    // ========================================================================
    // Intervention actions
    // ========================================================================

    /// Report arrival on site
    ///
    /// # Errors
    /// Returns `NoLiveReport` without a current report
    pub async fn confirm_arrival(&self) -> Result<ReportId> {
        self.act(InterventionAction::ConfirmArrival).await
    }

    /// Finish the intervention and go back on patrol
    ///
    /// # Errors
    /// Returns `AcknowledgementRequired` while NOT_RESPONDING or `NoLiveReport`
    pub async fn finish_intervention(&self) -> Result<ReportId> {
        self.act(InterventionAction::Finish).await
    }

    /// Abandon the accepted intervention and go back on patrol
    ///
    /// # Errors
    /// Returns `AcknowledgementRequired` while NOT_RESPONDING or `NoLiveReport`
    pub async fn cancel_started_intervention(&self) -> Result<ReportId> {
        self.act(InterventionAction::CancelStarted).await
    }

    /// Request backup
    ///
    /// # Errors
    /// Returns `NoLiveReport` without a current report
    pub async fn call_for_support(&self) -> Result<ReportId> {
        self.act(InterventionAction::SupportNeeded).await
    }

    async fn act(&self, action: InterventionAction) -> Result<ReportId> {
        self.request(|response_tx| SessionCommand::Act {
            action,
            response_tx,
        })
        .await?
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Persist, broadcast and send a status change
    ///
    /// # Errors
    /// Returns `AcknowledgementRequired` while NOT_RESPONDING
    pub async fn send_status_change(&self, status: GuardStatus) -> Result<()> {
        self.request(|response_tx| SessionCommand::ChangeStatus {
            status,
            response_tx,
        })
        .await?
    }

    /// Go on patrol when off, off patrol when on; returns the new status
    ///
    /// # Errors
    /// Returns `AcknowledgementRequired` while NOT_RESPONDING
    pub async fn toggle_patrol(&self) -> Result<GuardStatus> {
        self.request(|response_tx| SessionCommand::TogglePatrol { response_tx })
            .await?
    }

    /// Acknowledge the not-responding warning
    ///
    /// # Errors
    /// Returns `TaskStopped` if the session task is gone
    pub async fn acknowledge_warning(&self) -> Result<()> {
        self.request(|response_tx| SessionCommand::AcknowledgeWarning { response_tx })
            .await?
    }

    /// Look up the intervention assigned while the app was away and adopt it
    ///
    /// # Errors
    /// Returns `NotAuthenticated` without a guard id, or the lookup error
    pub async fn sync_active_intervention(&self) -> Result<()> {
        let guard_id = self
            .snapshot()
            .session
            .guard_id
            .ok_or_else(|| DispatchError::not_authenticated("no guard session"))?;

        let active = self.api.active_intervention(guard_id).await?;
        self.request(|response_tx| SessionCommand::AdoptActive {
            active,
            response_tx,
        })
        .await?
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> SessionCommand,
    ) -> Result<R> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build(response_tx))
            .map_err(|_| DispatchError::task_stopped("session"))?;
        response_rx
            .await
            .map_err(|_| DispatchError::task_stopped("session"))
    }
}
