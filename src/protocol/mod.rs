//! Dispatch wire protocol
//!
//! JSON text frames exchanged with the dispatch server over the duplex
//! channel. Inbound frames are parsed by [`crate::message::parse_inbound`];
//! outbound frames are built with the [`OutboundMessage`] constructors.
//!
//! # Example
//!
//! ```rust
//! use guard_dispatch::protocol::{InterventionAction, OutboundMessage};
//! use guard_dispatch::types::ReportId;
//!
//! let msg = OutboundMessage::intervention(ReportId::new(7), InterventionAction::Finish);
//! assert_eq!(
//!     msg.to_json().unwrap(),
//!     r#"{"reportId":7,"intervention":"finish"}"#
//! );
//! ```

pub mod messages;

pub use messages::{InboundMessage, InterventionAction, OutboundMessage};
