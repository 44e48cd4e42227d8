//! Frames exchanged over the display link
//!
//! The link is newline-delimited JSON. The bridge pushes `ServerFrame`s; the
//! display answers every `Display` frame with an `Ack` or `Nack` carrying the
//! same sequence number and may send its own requests at any time.

use serde::{Deserialize, Serialize};

use crate::{DisplayMessage, API_VERSION};

/// Frames sent from the bridge to the display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent once when a display connects
    Hello { api_version: u32 },

    /// A message the display must acknowledge
    Display { seq: u64, message: DisplayMessage },
}

impl ServerFrame {
    pub fn hello() -> Self {
        ServerFrame::Hello {
            api_version: API_VERSION,
        }
    }

    pub fn display(seq: u64, message: DisplayMessage) -> Self {
        ServerFrame::Display { seq, message }
    }
}

/// Frames sent from the display (or configuration collaborator) to the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Message `seq` was rendered
    Ack { seq: u64 },

    /// Message `seq` was rejected
    Nack {
        seq: u64,
        #[serde(default)]
        reason: Option<String>,
    },

    /// Manual refresh
    RequestData,

    /// The configuration page was closed.
    /// `response` is the raw settings payload; absent means "no change".
    ConfigurationClosed {
        #[serde(default)]
        response: Option<String>,
    },
}
