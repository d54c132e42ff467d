//! Guard status, connection state and close codes

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};

/// Patrol/assignment status of the guard
///
/// Serialized as its integer wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum GuardStatus {
    /// On patrol and free to take an assignment
    Available,
    /// Off patrol
    #[default]
    Unavailable,
    /// Assigned to an intervention
    Intervention,
    /// Ignored a pending intervention; locked until acknowledged
    NotResponding,
}

impl GuardStatus {
    /// Integer code used on the wire and in the store
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Available => 0,
            Self::Unavailable => 1,
            Self::Intervention => 2,
            Self::NotResponding => 3,
        }
    }

    /// Decode a wire/store code
    ///
    /// # Errors
    /// Returns `InvalidConfig` for codes outside `0..=3`
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Available),
            1 => Ok(Self::Unavailable),
            2 => Ok(Self::Intervention),
            3 => Ok(Self::NotResponding),
            other => Err(DispatchError::invalid_config(format!(
                "Unknown guard status code: {other}"
            ))),
        }
    }

    /// Whether the guard counts as on patrol
    #[must_use]
    pub const fn is_patrol_active(self) -> bool {
        matches!(self, Self::Available | Self::Intervention)
    }
}

impl From<GuardStatus> for u8 {
    fn from(status: GuardStatus) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for GuardStatus {
    type Error = DispatchError;

    fn try_from(code: u8) -> Result<Self> {
        Self::from_code(code)
    }
}

impl fmt::Display for GuardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Available => "AVAILABLE",
            Self::Unavailable => "UNAVAILABLE",
            Self::Intervention => "INTERVENTION",
            Self::NotResponding => "NOT_RESPONDING",
        };
        f.write_str(name)
    }
}

/// State of the duplex channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No channel and none scheduled
    #[default]
    Disconnected,
    /// Opening a channel or waiting for a scheduled reconnect
    Connecting,
    /// Channel is open
    Connected,
}

/// Observable connection status published by the connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    /// Channel state
    pub state: ConnectionState,
    /// Raised while a (re)connect handshake is owed; released by the server's
    /// `connected` message
    pub handshake_pending: bool,
    /// Code to use for the next explicit disconnect
    pub close_code: Option<CloseCode>,
}

impl ConnectionStatus {
    /// Whether a payload would be written right now
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Whether the UI should treat the link as still connecting
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.state == ConnectionState::Connecting || self.handshake_pending
    }
}

/// WebSocket close code used for explicit disconnects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(u16);

impl CloseCode {
    /// Normal, user-initiated close
    pub const NORMAL: Self = Self(1000);
    /// Application-level logout; never reconnects
    pub const LOGOUT: Self = Self(4000);

    /// Wrap an arbitrary close code
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Raw code
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl Default for CloseCode {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
