//! Connection command protocol
//!
//! Commands sent from [`super::ConnectionHandle`] clones to the connection
//! task, which is the only owner of the transport.

use tokio::sync::oneshot;

use super::UrlSource;
use crate::error::Result;
use crate::types::status::CloseCode;

pub(super) enum ConnectionCommand {
    /// Open a channel unless one is already open; `source` is asked for the
    /// URL again on every reconnect
    Connect {
        source: UrlSource,
        response_tx: oneshot::Sender<Result<()>>,
    },

    /// Write one text frame if connected
    Send {
        payload: String,
        response_tx: oneshot::Sender<bool>,
    },

    /// Code for the next explicit disconnect
    SetCloseCode { code: CloseCode },

    /// Close the channel and stop reconnecting
    Disconnect { response_tx: oneshot::Sender<()> },

    /// Server acknowledged the (re)connect
    ReleaseHandshake,
}
