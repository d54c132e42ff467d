#![warn(missing_docs)]
#![warn(clippy::all)]

//! # Guard dispatch client engine
//!
//! The client-side runtime of a field-guard dispatch application. A guard's
//! device keeps a live WebSocket session with the dispatch server, reports
//! its position, and reacts to intervention assignments and cancellations.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use guard_dispatch::api::UnconfiguredApi;
//! use guard_dispatch::store::MemoryCredentialStore;
//! use guard_dispatch::{
//!     DispatchEngine, EngineOptions, GuardId, LocationSample, LoginGrant, WebSocketTransport,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = EngineOptions::builder("wss://dispatch.example/ws".parse()?).build()?;
//!     let engine = DispatchEngine::new(
//!         options,
//!         WebSocketTransport::new(),
//!         Arc::new(UnconfiguredApi),
//!         Arc::new(MemoryCredentialStore::new()),
//!     );
//!
//!     engine
//!         .login(LoginGrant::new(GuardId::new(1), "access", Some("refresh".into())))
//!         .await?;
//!     engine.start(LocationSample::new(51.1079, 17.0385)).await?;
//!
//!     // Feed samples every update interval
//!     engine.on_location(LocationSample::new(51.1081, 17.0385)).await;
//!
//!     // Guard intents go through the session handle
//!     let mut events = engine.session().subscribe();
//!     while let Ok(event) = events.recv().await {
//!         log::info!("session event: {event:?}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Components
//!
//! - [`connection`]: one duplex channel, fixed-delay reconnects, explicit
//!   close codes
//! - [`credentials`]: JWT expiry arithmetic and refresh orchestration
//! - [`session`]: guard status and intervention state machine
//! - [`reporter`]: position reporting and the credential cadence
//! - [`store`]: persistence of tokens, guard id, status and last report
//! - [`engine`]: the composition root driven by the keep-running service

pub mod api;
pub mod connection;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod message;
pub mod protocol;
pub mod reporter;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

// Re-export commonly used types for external API
pub use api::DispatchApi;
pub use connection::{ConnectionEvent, ConnectionHandle, ConnectionManager, UrlSource};
pub use credentials::{CredentialCheck, CredentialManager};
pub use engine::DispatchEngine;
pub use error::{DispatchError, Result};
pub use message::parse_inbound;
pub use protocol::{InboundMessage, InterventionAction, OutboundMessage};
pub use reporter::{LocationReporter, Report, TickOutcome};
pub use session::{IntentOutcome, SessionEvent, SessionHandle, SessionSnapshot};
pub use store::{CredentialStore, JsonFileStore, MemoryCredentialStore, StoreKey};
pub use transport::{Transport, TransportEvent, WebSocketTransport};

// Re-export type submodules for flat public API
pub use types::identifiers::{GuardId, ReportId};
pub use types::location::{GeoPoint, LocationSample};
pub use types::options::{EngineOptions, EngineOptionsBuilder, TokenCadence, TokenThresholds};
pub use types::session::{
    ActiveIntervention, GuardSession, InterventionReport, LoginGrant, ReportLifecycle, TokenPair,
};
pub use types::status::{CloseCode, ConnectionState, ConnectionStatus, GuardStatus};

/// Version of the engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
