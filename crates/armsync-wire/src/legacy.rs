//! Legacy flat message record
//!
//! Older peers exchange a single record shape for every message type:
//! `{"type", "state", "requester", "authority"}`. Fields that do not apply
//! to the message type are present but zero-valued.

use serde::{Deserialize, Serialize};

use armsync_core::{ArmsyncError, ArmsyncResult, Message, PeerId};

pub const LEGACY_TYPE_STATE: &str = "state";
pub const LEGACY_TYPE_REQUEST: &str = "request";

/// Flat record with every field of every message type
///
/// Senders always write all four fields. A field missing on decode is
/// only tolerated when the record's type does not use it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub state: Option<bool>,
    #[serde(default)]
    pub requester: Option<PeerId>,
    #[serde(default)]
    pub authority: Option<PeerId>,
}

impl From<&Message> for LegacyRecord {
    fn from(msg: &Message) -> Self {
        match msg {
            Message::StateUpdate { value, authority } => LegacyRecord {
                kind: LEGACY_TYPE_STATE.to_string(),
                state: Some(*value),
                requester: Some(PeerId::default()),
                authority: Some(authority.clone()),
            },
            Message::ToggleRequest { requester } => LegacyRecord {
                kind: LEGACY_TYPE_REQUEST.to_string(),
                state: Some(false),
                requester: Some(requester.clone()),
                authority: Some(PeerId::default()),
            },
        }
    }
}

impl TryFrom<LegacyRecord> for Message {
    type Error = ArmsyncError;

    fn try_from(record: LegacyRecord) -> ArmsyncResult<Self> {
        match record.kind.as_str() {
            LEGACY_TYPE_STATE => Ok(Message::StateUpdate {
                value: required(record.state, "state", &record.kind)?,
                authority: required(record.authority, "authority", &record.kind)?,
            }),
            LEGACY_TYPE_REQUEST => Ok(Message::ToggleRequest {
                requester: required(record.requester, "requester", &record.kind)?,
            }),
            _ => Err(ArmsyncError::UnknownMessageType(record.kind)),
        }
    }
}

fn required<T>(field: Option<T>, name: &str, kind: &str) -> ArmsyncResult<T> {
    field.ok_or_else(|| {
        ArmsyncError::InvalidWireFormat(format!("{} record without `{}`", kind, name))
    })
}
