//! Integration tests for the location reporter and the piggy-backed
//! credential cadence

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    MockApi, MockTransport, Remote, init_logging, jwt_expiring_in, settle, ws_url,
};
use guard_dispatch::reporter::CredentialTask;
use guard_dispatch::session::{PollSettings, SessionStateMachine};
use guard_dispatch::store::{CredentialStore, MemoryCredentialStore};
use guard_dispatch::{
    CloseCode, ConnectionHandle, ConnectionManager, ConnectionState, CredentialCheck,
    CredentialManager, EngineOptions, GeoPoint, GuardId, LocationReporter, LocationSample,
    LoginGrant, Report, SessionEvent, SessionHandle, TokenCadence,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const LAT: f64 = 51.1079;
const LNG: f64 = 17.0385;

struct Rig {
    reporter: LocationReporter,
    connection: ConnectionHandle,
    session: SessionHandle,
    remote: Remote,
    api: Arc<MockApi>,
    _shutdown: tokio_util::sync::DropGuard,
}

async fn rig(cadence: TokenCadence, access_token: String, refresh_token: String) -> Rig {
    init_logging();
    let options = EngineOptions::builder(ws_url())
        .token_cadence(cadence)
        .build()
        .unwrap();
    let (transport, remote) = MockTransport::new();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
    let api = Arc::new(MockApi::default());

    let connection = ConnectionManager::spawn(
        transport,
        options.reconnect_delay,
        inbound_tx,
        shutdown.child_token(),
    );
    let session = SessionStateMachine::spawn(
        store.clone(),
        api.clone(),
        connection.clone(),
        inbound_rx,
        PollSettings {
            interval: options.activity_poll_interval,
            attempts: options.activity_poll_attempts,
        },
        shutdown.child_token(),
    );
    session
        .begin(LoginGrant::new(GuardId::new(42), access_token, Some(refresh_token)))
        .await
        .unwrap();
    connection.connect(ws_url()).await.unwrap();

    let credentials = Arc::new(CredentialManager::new(store, api.clone(), options.thresholds));
    let task = CredentialTask::new(credentials, connection.clone(), session.clone());
    let reporter = LocationReporter::new(&options, connection.clone(), session.clone(), task);

    Rig {
        reporter,
        connection,
        session,
        remote,
        api,
        _shutdown: shutdown.drop_guard(),
    }
}

async fn fresh_rig(cadence: TokenCadence) -> Rig {
    rig(cadence, jwt_expiring_in(3_600), jwt_expiring_in(30 * 86_400)).await
}

/// Sample `metres` north of the start point
fn north(metres: f64) -> LocationSample {
    LocationSample::new(LAT + metres / 111_195.0, LNG)
}

#[tokio::test(start_paused = true)]
async fn test_start_sends_init_message() {
    let mut rig = fresh_rig(TokenCadence::Timer(Duration::from_secs(150))).await;

    assert_eq!(rig.reporter.on_start(north(0.0)).await, Report::Init);

    assert_eq!(
        rig.remote.sent(),
        vec![json!({
            "initMessage": true,
            "guardId": 42,
            "status": 1,
            "latitude": LAT,
            "longitude": LNG,
        })]
    );
    assert_eq!(rig.reporter.last_reported(), Some(GeoPoint::new(LAT, LNG)));
}

#[tokio::test(start_paused = true)]
async fn test_small_moves_are_suppressed() {
    let mut rig = fresh_rig(TokenCadence::Timer(Duration::from_secs(150))).await;
    rig.reporter.on_start(north(0.0)).await;
    rig.remote.take_sent();

    assert_eq!(rig.reporter.on_tick(north(3.0)).await.report, Report::Skipped);
    assert_eq!(rig.reporter.on_tick(north(4.9)).await.report, Report::Skipped);
    assert!(rig.remote.sent().is_empty());

    assert_eq!(rig.reporter.on_tick(north(5.1)).await.report, Report::Position);
    let frames = rig.remote.take_sent();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["guardId"], 42);
    assert!(frames[0].get("initMessage").is_none());

    // Measured from the last reported point, not the start
    assert_eq!(rig.reporter.on_tick(north(8.0)).await.report, Report::Skipped);
    assert_eq!(rig.reporter.on_tick(north(10.5)).await.report, Report::Position);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_gate_forces_init() {
    let mut rig = fresh_rig(TokenCadence::Timer(Duration::from_secs(150))).await;
    rig.reporter.on_start(north(0.0)).await;

    rig.remote.drop_channel(None);
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert!(rig.connection.status().handshake_pending);
    rig.remote.take_sent();

    // Same spot, but the server owes us a handshake
    assert_eq!(rig.reporter.on_tick(north(0.0)).await.report, Report::Init);
    assert_eq!(rig.remote.take_sent()[0]["initMessage"], true);

    rig.remote.push(json!({"status": "connected"}));
    settle().await;
    assert_eq!(rig.reporter.on_tick(north(0.0)).await.report, Report::Skipped);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_send_keeps_last_reported() {
    let mut rig = fresh_rig(TokenCadence::Timer(Duration::from_secs(150))).await;
    rig.reporter.on_start(north(0.0)).await;

    rig.remote.fail_next_connects(5);
    rig.remote.drop_channel(None);
    settle().await;

    assert_eq!(rig.reporter.on_tick(north(20.0)).await.report, Report::Dropped);
    assert_eq!(rig.reporter.last_reported(), Some(GeoPoint::new(LAT, LNG)));
}

#[tokio::test(start_paused = true)]
async fn test_timer_cadence_never_checks_on_ticks() {
    let mut rig = fresh_rig(TokenCadence::Timer(Duration::from_secs(150))).await;
    rig.reporter.on_start(north(0.0)).await;

    for _ in 0..40 {
        assert!(rig.reporter.on_tick(north(0.0)).await.credential_check.is_none());
    }
    assert_eq!(rig.reporter.ticks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_expired_refresh_token_disconnects_on_tick() {
    let mut rig = rig(
        TokenCadence::PiggyBack,
        jwt_expiring_in(-120),
        jwt_expiring_in(-60),
    )
    .await;
    let mut events = rig.session.subscribe();
    rig.reporter.on_start(north(0.0)).await;

    for _ in 0..14 {
        assert!(rig.reporter.on_tick(north(0.0)).await.credential_check.is_none());
    }
    let check = rig
        .reporter
        .on_tick(north(0.0))
        .await
        .credential_check
        .unwrap();

    assert_eq!(check.await.unwrap(), CredentialCheck::SessionExpired);
    assert_eq!(rig.api.refresh_calls(), 0);
    assert_eq!(rig.connection.status().state, ConnectionState::Disconnected);
    assert_eq!(rig.remote.closes(), vec![CloseCode::NORMAL]);

    let snapshot = rig.session.snapshot();
    assert!(!snapshot.session.is_authenticated());
    assert_eq!(snapshot.session.refresh_token, None);
    assert_eq!(events.try_recv().unwrap(), SessionEvent::ReauthenticationRequired);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(rig.remote.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_piggy_back_refresh_updates_session() {
    let mut rig = rig(
        TokenCadence::PiggyBack,
        jwt_expiring_in(60),
        jwt_expiring_in(30 * 86_400),
    )
    .await;
    rig.reporter.on_start(north(0.0)).await;

    let mut checks = Vec::new();
    for _ in 0..15 {
        if let Some(check) = rig.reporter.on_tick(north(0.0)).await.credential_check {
            checks.push(check);
        }
    }
    assert_eq!(checks.len(), 1);

    let outcome = checks.pop().unwrap().await.unwrap();
    assert!(matches!(outcome, CredentialCheck::Refreshed(_)));
    settle().await;

    let session = rig.session.snapshot().session;
    assert_eq!(session.access_token.as_deref(), Some("new-access"));
    assert_eq!(rig.api.refresh_calls(), 1);
    assert!(rig.connection.status().is_connected());
}
