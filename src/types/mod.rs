//! Type definitions for the dispatch engine
//!
//! This module contains the core type definitions used throughout the engine,
//! organized into focused submodules.

pub mod identifiers;
pub mod location;
pub mod options;
pub mod session;
pub mod status;

// Re-export all public types for convenience
pub use identifiers::{GuardId, ReportId};
pub use location::{GeoPoint, LocationSample};
pub use options::{EngineOptions, EngineOptionsBuilder, TokenCadence, TokenThresholds};
pub use session::{
    ActiveIntervention, GuardSession, InterventionReport, LoginGrant, ReportLifecycle, TokenPair,
};
pub use status::{CloseCode, ConnectionState, ConnectionStatus, GuardStatus};
