//! Dispatch engine
//!
//! [`DispatchEngine`] wires the store, the REST contract, the connection
//! task, the session task and the reporter together, and is what the
//! keep-running driver talks to.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::api::DispatchApi;
use crate::connection::{ConnectionHandle, ConnectionManager, UrlSource};
use crate::credentials::{CredentialCheck, CredentialManager};
use crate::error::{DispatchError, Result};
use crate::reporter::{CredentialTask, LocationReporter, Report, TickOutcome};
use crate::session::{PollSettings, SessionHandle, SessionStateMachine};
use crate::store::CredentialStore;
use crate::transport::Transport;
use crate::types::location::LocationSample;
use crate::types::options::{EngineOptions, TokenCadence};
use crate::types::session::LoginGrant;
use crate::types::status::CloseCode;

/// Composition root of one guard's client runtime
pub struct DispatchEngine {
    options: EngineOptions,
    store: Arc<dyn CredentialStore>,
    credentials: Arc<CredentialManager>,
    connection: ConnectionHandle,
    session: SessionHandle,
    credential_task: CredentialTask,
    reporter: Mutex<LocationReporter>,
    token_timer: parking_lot::Mutex<Option<CancellationToken>>,
    shutdown: CancellationToken,
}

impl DispatchEngine {
    /// Build the engine and spawn its tasks
    ///
    /// Must be called inside a tokio runtime. The persisted session is loaded
    /// from `store`; nothing connects until [`Self::start`].
    pub fn new<T: Transport>(
        options: EngineOptions,
        transport: T,
        api: Arc<dyn DispatchApi>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let connection = ConnectionManager::spawn(
            transport,
            options.reconnect_delay,
            inbound_tx,
            shutdown.child_token(),
        );
        let session = SessionStateMachine::spawn(
            Arc::clone(&store),
            Arc::clone(&api),
            connection.clone(),
            inbound_rx,
            PollSettings {
                interval: options.activity_poll_interval,
                attempts: options.activity_poll_attempts,
            },
            shutdown.child_token(),
        );
        let credentials = Arc::new(CredentialManager::new(
            Arc::clone(&store),
            api,
            options.thresholds,
        ));
        let credential_task =
            CredentialTask::new(Arc::clone(&credentials), connection.clone(), session.clone());
        let reporter = LocationReporter::new(
            &options,
            connection.clone(),
            session.clone(),
            credential_task.clone(),
        );

        Self {
            options,
            store,
            credentials,
            connection,
            session,
            credential_task,
            reporter: Mutex::new(reporter),
            token_timer: parking_lot::Mutex::new(None),
            shutdown,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Engine options
    #[must_use]
    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Connection handle
    #[must_use]
    pub const fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// Session handle with the guard intents
    #[must_use]
    pub const fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Credential manager
    #[must_use]
    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Start a session from a login grant and adopt any active intervention
    ///
    /// A failed intervention lookup is logged; the session still starts.
    ///
    /// # Errors
    /// Returns `Store` if the session cannot be persisted
    pub async fn login(&self, grant: LoginGrant) -> Result<()> {
        self.session.begin(grant).await?;
        if let Err(e) = self.session.sync_active_intervention().await {
            warn!("Active intervention lookup failed: {e}");
        }
        Ok(())
    }

    /// Connect, send the init message and start the credential cadence
    ///
    /// A failed first connect is logged and retried by the connection task.
    ///
    /// # Errors
    /// Returns `NotAuthenticated` without a guard session
    pub async fn start(&self, sample: LocationSample) -> Result<()> {
        if !self.session.snapshot().session.is_authenticated() {
            return Err(DispatchError::not_authenticated("no guard session to start"));
        }

        if let Err(e) = self.connection.connect_with(self.channel_url_source()).await {
            warn!(
                "First connect failed ({e}); retrying in {:?}",
                self.options.reconnect_delay
            );
        }

        let report = self.reporter.lock().await.on_start(sample).await;
        if report != Report::Init {
            debug!("Init message not delivered at start: {report:?}");
        }

        self.start_token_timer();
        info!("Engine started");
        Ok(())
    }

    /// Feed one periodic location sample
    pub async fn on_location(&self, sample: LocationSample) -> TickOutcome {
        self.reporter.lock().await.on_tick(sample).await
    }

    /// Run a credential check now, unless one is already running
    pub async fn check_credentials(&self) -> Option<CredentialCheck> {
        let handle = self.credential_task.spawn()?;
        handle.await.ok()
    }

    /// Stop the credential cadence and close the channel
    ///
    /// # Errors
    /// Returns `TaskStopped` if the connection task is gone
    pub async fn stop(&self) -> Result<()> {
        self.stop_token_timer();
        self.connection.disconnect().await?;
        info!("Engine stopped");
        Ok(())
    }

    /// Close with the logout code and forget the session
    ///
    /// # Errors
    /// Returns `TaskStopped` or `Store` errors
    pub async fn logout(&self) -> Result<()> {
        self.connection.set_close_code(CloseCode::LOGOUT);
        self.stop().await?;
        self.session.clear().await?;
        info!("Logged out");
        Ok(())
    }

    /// Stop every engine task
    pub fn shutdown(&self) {
        self.stop_token_timer();
        self.shutdown.cancel();
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Channel URL built from the store at every connect attempt
    fn channel_url_source(&self) -> UrlSource {
        let base = self.options.ws_url.clone();
        let store = Arc::clone(&self.store);
        Arc::new(move || channel_url(&base, store.as_ref()))
    }

    fn start_token_timer(&self) {
        let TokenCadence::Timer(period) = self.options.token_cadence else {
            return;
        };

        let cancel = self.shutdown.child_token();
        if let Some(previous) = self.token_timer.lock().replace(cancel.clone()) {
            previous.cancel();
        }

        let task = self.credential_task.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(check) = task.spawn() else { continue };
                        if matches!(check.await, Ok(CredentialCheck::SessionExpired)) {
                            debug!("Token timer stopping after session expiry");
                            break;
                        }
                    }
                }
            }
        });
    }

    fn stop_token_timer(&self) {
        if let Some(cancel) = self.token_timer.lock().take() {
            cancel.cancel();
        }
    }
}

/// `base` with the stored access token as `token` parameter
fn channel_url(base: &Url, store: &dyn CredentialStore) -> Result<Url> {
    let mut url = base.clone();
    if let Some(token) = store.access_token()? {
        url.query_pairs_mut().append_pair("token", &token);
    }
    Ok(url)
}

impl Drop for DispatchEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
