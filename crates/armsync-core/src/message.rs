//! Session messages
//!
//! Every message is broadcast to the whole session, the sender included
//! when the transport echoes.

use serde::{Deserialize, Serialize};

use crate::PeerId;

/// Replication message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Authoritative value push
    #[serde(rename = "state")]
    StateUpdate { value: bool, authority: PeerId },
    /// A non-authority peer asks the authority to flip the value
    #[serde(rename = "request")]
    ToggleRequest { requester: PeerId },
}

impl Message {
    pub fn state_update(value: bool, authority: PeerId) -> Self {
        Message::StateUpdate { value, authority }
    }

    pub fn toggle_request(requester: PeerId) -> Self {
        Message::ToggleRequest { requester }
    }

    /// Wire discriminant
    pub fn kind(&self) -> &'static str {
        match self {
            Message::StateUpdate { .. } => "state",
            Message::ToggleRequest { .. } => "request",
        }
    }
}
