//! Inbound frame parsing

pub mod parser;

pub use parser::parse_inbound;
