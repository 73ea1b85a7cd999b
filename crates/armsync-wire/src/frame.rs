//! Datagram frame for packet transports
//!
//! Frame layout:
//! - Byte 0: Wire version
//! - Bytes 1-16: Session ID
//! - Bytes 17-18: Sender id length (LE)
//! - Sender id (UTF-8)
//! - Payload (encoded message)

use bytes::{Buf, BufMut, Bytes, BytesMut};

use armsync_core::{ArmsyncError, ArmsyncResult, PeerId, SessionId};

/// Current frame version
pub const WIRE_VERSION: u8 = 1;

/// Fixed part of the frame header
pub const FRAME_HEADER_SIZE: usize = 1 + 16 + 2;

/// Maximum frame size (MTU-friendly)
pub const MAX_FRAME_SIZE: usize = 1400;

/// Framed payload with its sender
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub session: SessionId,
    pub sender: PeerId,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(session: SessionId, sender: PeerId, payload: Bytes) -> Self {
        Frame {
            session,
            sender,
            payload,
        }
    }

    pub fn serialized_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.sender.as_bytes().len() + self.payload.len()
    }

    pub fn serialize(&self) -> ArmsyncResult<Bytes> {
        let sender = self.sender.as_bytes();
        let size = self.serialized_size();

        if size > MAX_FRAME_SIZE {
            return Err(ArmsyncError::FrameTooLarge {
                size,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(size);
        buf.put_u8(WIRE_VERSION);
        buf.put_slice(&self.session.to_bytes());
        buf.put_u16_le(sender.len() as u16);
        buf.put_slice(sender);
        buf.put_slice(&self.payload);

        Ok(buf.freeze())
    }

    pub fn parse(mut buf: &[u8]) -> ArmsyncResult<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(ArmsyncError::FrameTooShort {
                expected: FRAME_HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let version = buf.get_u8();
        if version != WIRE_VERSION {
            return Err(ArmsyncError::InvalidWireFormat(format!(
                "Unsupported frame version {}",
                version
            )));
        }

        let mut session = [0u8; 16];
        buf.copy_to_slice(&mut session);

        let sender_len = buf.get_u16_le() as usize;
        if buf.len() < sender_len {
            return Err(ArmsyncError::FrameTooShort {
                expected: FRAME_HEADER_SIZE + sender_len,
                actual: FRAME_HEADER_SIZE + buf.len(),
            });
        }

        let sender = std::str::from_utf8(&buf[..sender_len])
            .map_err(|_| ArmsyncError::InvalidWireFormat("Sender id is not UTF-8".into()))?;
        let sender = PeerId::new(sender);
        buf.advance(sender_len);

        Ok(Frame {
            session: SessionId::new(session),
            sender,
            payload: Bytes::copy_from_slice(buf),
        })
    }
}
