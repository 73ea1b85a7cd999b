//! Message codec
//!
//! Two encodings are supported. [`WireFormat::Tagged`] carries only the
//! fields of the variant, discriminated by `type`. [`WireFormat::Legacy`]
//! produces the flat record older peers expect.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use armsync_core::{ArmsyncError, ArmsyncResult, Message};

use crate::LegacyRecord;

/// Payload encoding
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    #[default]
    Tagged,
    Legacy,
}

/// Encodes and decodes replication messages
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageCodec {
    format: WireFormat,
}

impl MessageCodec {
    pub fn new(format: WireFormat) -> Self {
        MessageCodec { format }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn encode(&self, msg: &Message) -> ArmsyncResult<Bytes> {
        let encoded = match self.format {
            WireFormat::Tagged => serde_json::to_vec(msg),
            WireFormat::Legacy => serde_json::to_vec(&LegacyRecord::from(msg)),
        }
        .map_err(|e| ArmsyncError::InvalidWireFormat(e.to_string()))?;

        Ok(Bytes::from(encoded))
    }

    pub fn decode(&self, buf: &[u8]) -> ArmsyncResult<Message> {
        match self.format {
            WireFormat::Tagged => {
                serde_json::from_slice(buf).map_err(|e| classify_tagged_error(buf, e))
            }
            WireFormat::Legacy => {
                let record: LegacyRecord = serde_json::from_slice(buf)
                    .map_err(|e| ArmsyncError::InvalidWireFormat(e.to_string()))?;
                Message::try_from(record)
            }
        }
    }
}

/// Unknown `type` values surface as serde data errors; report them by name
fn classify_tagged_error(buf: &[u8], err: serde_json::Error) -> ArmsyncError {
    if err.is_data() {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(buf) {
            if let Some(kind) = value.get("type").and_then(|t| t.as_str()) {
                if kind != "state" && kind != "request" {
                    return ArmsyncError::UnknownMessageType(kind.to_string());
                }
            }
        }
    }
    ArmsyncError::InvalidWireFormat(err.to_string())
}
