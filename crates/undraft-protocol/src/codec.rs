//! Frame codec.
//!
//! ```text
//! | channel: u16 BE | kind: u8 | len: u32 BE | payload (CBOR) |
//! ```

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::messages::limits::MAX_FRAME_PAYLOAD;

/// Bytes before the payload.
pub const HEADER_LEN: usize = 2 + 1 + 4;

/// Channel identifier on the wire, derived from the channel name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelToken(pub u16);

impl ChannelToken {
    /// First two bytes of `blake3(name)`.
    pub fn for_name(name: &str) -> Self {
        let hash = blake3::hash(name.as_bytes());
        let bytes = hash.as_bytes();
        Self(u16::from_be_bytes([bytes[0], bytes[1]]))
    }
}

impl fmt::Debug for ChannelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelToken({:#06x})", self.0)
    }
}

/// Message kind within a channel, numbered in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageKind(pub u8);

/// One framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub channel: ChannelToken,
    pub kind: MessageKind,
    pub payload: Bytes,
}

impl Frame {
    /// Encoded length of this frame.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Append the encoded frame to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        check_payload_len(self.payload.len())?;
        let len = u32::try_from(self.payload.len()).map_err(|_| CodecError::PayloadTooLarge {
            len: self.payload.len(),
            max: MAX_FRAME_PAYLOAD,
        })?;
        buf.reserve(self.encoded_len());
        buf.put_u16(self.channel.0);
        buf.put_u8(self.kind.0);
        buf.put_u32(len);
        buf.extend_from_slice(&self.payload);
        Ok(())
    }

    /// Take one frame off the front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not yet hold a complete frame; the
    /// buffer is left untouched in that case.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]) as usize;
        check_payload_len(len)?;
        if buf.len() < HEADER_LEN + len {
            return Ok(None);
        }

        let channel = ChannelToken(buf.get_u16());
        let kind = MessageKind(buf.get_u8());
        buf.advance(4);
        let payload = buf.split_to(len).freeze();
        Ok(Some(Frame {
            channel,
            kind,
            payload,
        }))
    }

    /// Decode a buffer holding exactly one frame.
    pub fn decode_exact(bytes: &[u8]) -> Result<Frame, CodecError> {
        let mut buf = BytesMut::from(bytes);
        match Frame::decode(&mut buf)? {
            Some(frame) if buf.is_empty() => Ok(frame),
            Some(_) => Err(CodecError::TrailingBytes(buf.len())),
            None => {
                let needed = if bytes.len() < HEADER_LEN {
                    HEADER_LEN
                } else {
                    HEADER_LEN + u32::from_be_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]) as usize
                };
                Err(CodecError::Truncated {
                    needed,
                    available: bytes.len(),
                })
            }
        }
    }
}

fn check_payload_len(len: usize) -> Result<(), CodecError> {
    if len > MAX_FRAME_PAYLOAD {
        return Err(CodecError::PayloadTooLarge {
            len,
            max: MAX_FRAME_PAYLOAD,
        });
    }
    Ok(())
}

/// Serialize a message payload as CBOR.
pub fn encode_payload<T: Serialize>(message: &T) -> Result<Bytes, CodecError> {
    let mut out = Vec::new();
    ciborium::into_writer(message, &mut out).map_err(|e| CodecError::Encode(e.to_string()))?;
    check_payload_len(out.len())?;
    Ok(Bytes::from(out))
}

/// Deserialize a CBOR message payload.
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    ciborium::from_reader(payload).map_err(|e| CodecError::Decode(e.to_string()))
}
