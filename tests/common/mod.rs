//! Shared fixtures: an in-process transport, a scripted REST contract and
//! JWT helpers

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use guard_dispatch::api::DispatchApi;
use guard_dispatch::{
    ActiveIntervention, CloseCode, DispatchError, GuardId, ReportId, Result, TokenPair, Transport,
    TransportEvent,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn ws_url() -> Url {
    Url::parse("ws://dispatch.test/ws").unwrap()
}

/// Let every task run until it blocks; with paused time this advances 1 ms
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Default)]
struct RemoteState {
    connects: usize,
    overlapping_connects: usize,
    failing_connects: usize,
    connect_delay: Option<Duration>,
    open: bool,
    channel: Option<mpsc::UnboundedSender<TransportEvent>>,
    sent: Vec<String>,
    closes: Vec<CloseCode>,
    urls: Vec<Url>,
}

/// Server side of a [`MockTransport`]
#[derive(Clone, Default)]
pub struct Remote(Arc<Mutex<RemoteState>>);

impl Remote {
    pub fn connects(&self) -> usize {
        self.0.lock().connects
    }

    /// Connects issued while a channel was still open
    pub fn overlapping_connects(&self) -> usize {
        self.0.lock().overlapping_connects
    }

    pub fn is_open(&self) -> bool {
        self.0.lock().open
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.0.lock().failing_connects = count;
    }

    /// Every later handshake takes `delay` before it resolves
    pub fn slow_connects(&self, delay: Duration) {
        self.0.lock().connect_delay = Some(delay);
    }

    /// `token` query parameter of the last connect attempt
    pub fn last_token(&self) -> Option<String> {
        let url = self.0.lock().urls.last().cloned()?;
        url.query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
    }

    pub fn urls(&self) -> Vec<Url> {
        self.0.lock().urls.clone()
    }

    pub fn closes(&self) -> Vec<CloseCode> {
        self.0.lock().closes.clone()
    }

    pub fn sent(&self) -> Vec<Value> {
        self.0
            .lock()
            .sent
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }

    pub fn take_sent(&self) -> Vec<Value> {
        let frames = self.sent();
        self.0.lock().sent.clear();
        frames
    }

    /// Deliver a frame to the client; `false` without an open channel
    pub fn push(&self, frame: Value) -> bool {
        match self.0.lock().channel.as_ref() {
            Some(tx) => tx.send(TransportEvent::Message(frame)).is_ok(),
            None => false,
        }
    }

    /// Close the open channel from the server side
    pub fn drop_channel(&self, code: Option<u16>) {
        let mut state = self.0.lock();
        state.open = false;
        if let Some(tx) = state.channel.take() {
            let _ = tx.send(TransportEvent::Closed {
                code,
                reason: "server closed".to_string(),
            });
        }
    }
}

/// Transport whose far end is a [`Remote`]
pub struct MockTransport {
    remote: Remote,
    pending: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl MockTransport {
    pub fn new() -> (Self, Remote) {
        let remote = Remote::default();
        (
            Self {
                remote: remote.clone(),
                pending: None,
            },
            remote,
        )
    }
}

impl Transport for MockTransport {
    async fn connect(&mut self, url: &Url) -> Result<()> {
        let delay = self.remote.0.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.remote.0.lock();
        state.connects += 1;
        state.urls.push(url.clone());
        if state.open {
            state.overlapping_connects += 1;
        }
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(DispatchError::connection("connection refused"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.channel = Some(tx);
        state.open = true;
        self.pending = Some(rx);
        Ok(())
    }

    async fn write(&mut self, data: &str) -> Result<()> {
        let mut state = self.remote.0.lock();
        if !state.open {
            return Err(DispatchError::transport("channel closed"));
        }
        state.sent.push(data.to_string());
        Ok(())
    }

    fn read_messages(&mut self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.pending
            .take()
            .unwrap_or_else(|| mpsc::unbounded_channel().1)
    }

    fn is_ready(&self) -> bool {
        self.remote.0.lock().open
    }

    async fn close(&mut self, code: CloseCode) -> Result<()> {
        let mut state = self.remote.0.lock();
        state.closes.push(code);
        state.open = false;
        state.channel = None;
        Ok(())
    }
}

// ============================================================================
// REST contract
// ============================================================================

/// Scripted REST contract that counts its calls
pub struct MockApi {
    pub access_refreshes: AtomicUsize,
    pub both_refreshes: AtomicUsize,
    pub activity_checks: AtomicUsize,
    pub active_lookups: AtomicUsize,
    pub report_active: AtomicBool,
    pub access_reply: Mutex<std::result::Result<String, String>>,
    pub both_reply: Mutex<std::result::Result<TokenPair, String>>,
    pub active: Mutex<Option<ActiveIntervention>>,
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            access_refreshes: AtomicUsize::new(0),
            both_refreshes: AtomicUsize::new(0),
            activity_checks: AtomicUsize::new(0),
            active_lookups: AtomicUsize::new(0),
            report_active: AtomicBool::new(true),
            access_reply: Mutex::new(Ok("new-access".to_string())),
            both_reply: Mutex::new(Ok(TokenPair::new(
                "new-access",
                Some("new-refresh".to_string()),
            ))),
            active: Mutex::new(None),
        }
    }
}

impl MockApi {
    pub fn refresh_calls(&self) -> usize {
        self.access_refreshes.load(Ordering::SeqCst) + self.both_refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DispatchApi for MockApi {
    async fn refresh_access_token(&self, _refresh_token: &str) -> Result<String> {
        self.access_refreshes.fetch_add(1, Ordering::SeqCst);
        self.access_reply.lock().clone().map_err(DispatchError::api)
    }

    async fn refresh_both_tokens(&self, _refresh_token: &str) -> Result<TokenPair> {
        self.both_refreshes.fetch_add(1, Ordering::SeqCst);
        self.both_reply.lock().clone().map_err(DispatchError::api)
    }

    async fn is_report_active(&self, _report_id: ReportId) -> Result<bool> {
        self.activity_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.report_active.load(Ordering::SeqCst))
    }

    async fn active_intervention(&self, _guard_id: GuardId) -> Result<Option<ActiveIntervention>> {
        self.active_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.active.lock().clone())
    }
}

// ============================================================================
// Tokens
// ============================================================================

/// Unsigned JWT whose `exp` claim is `exp`
pub fn jwt_expiring_at(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"guard","exp":{exp}}}"#));
    format!("{header}.{payload}.signature")
}

/// Unsigned JWT expiring `secs` from the wall clock
pub fn jwt_expiring_in(secs: i64) -> String {
    jwt_expiring_at(chrono::Utc::now().timestamp() + secs)
}
