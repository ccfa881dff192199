//! Splice message types.
//!
//! These messages travel on the private channel while the host handshake is
//! held between the reduced and the full identification.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::channel::MessageChannel;
use crate::error::{ProtocolError, Result};

/// Message size limits.
pub mod limits {
    /// Max payload bytes in one frame. Each package file travels whole in a
    /// single [`TransferChunk`](super::TransferChunk), so this also bounds
    /// the size of a drafted package.
    pub const MAX_FRAME_PAYLOAD: usize = 256 * 1024 * 1024;
    /// Max entries in DraftAnnouncement.entries.
    pub const MAX_ANNOUNCED_ENTRIES: usize = 1024;
    /// Max names in TransferRequest.file_names.
    pub const MAX_REQUESTED_FILES: usize = 1024;
    /// Max bytes in a file name on the wire.
    pub const MAX_FILE_NAME_LEN: usize = 255;
}

/// A type that can be carried on a [`MessageChannel`].
pub trait ChannelMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Human-readable type name used in errors and logs.
    const NAME: &'static str;

    /// Check if this message respects size limits.
    fn validate_limits(&self) -> std::result::Result<(), &'static str> {
        Ok(())
    }
}

/// One drafted package offered to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftEntry {
    /// Registry site identifier.
    pub site_id: String,
    /// File name in the package store.
    pub file_name: String,
}

/// Server → client: the drafted packages withheld from this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftAnnouncement {
    pub entries: Vec<DraftEntry>,
    /// Token of the channel the client must answer on.
    pub channel_token: u16,
}

impl DraftAnnouncement {
    /// File names in announcement order.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.file_name.as_str())
    }
}

impl ChannelMessage for DraftAnnouncement {
    const NAME: &'static str = "DraftAnnouncement";

    fn validate_limits(&self) -> std::result::Result<(), &'static str> {
        if self.entries.len() > limits::MAX_ANNOUNCED_ENTRIES {
            return Err("too many announced entries");
        }
        if self
            .entries
            .iter()
            .any(|e| e.file_name.len() > limits::MAX_FILE_NAME_LEN)
        {
            return Err("announced file name too long");
        }
        Ok(())
    }
}

/// Server → client: one whole package file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferChunk {
    pub file_name: String,
    pub data: Bytes,
}

impl ChannelMessage for TransferChunk {
    const NAME: &'static str = "TransferChunk";

    fn validate_limits(&self) -> std::result::Result<(), &'static str> {
        if self.file_name.len() > limits::MAX_FILE_NAME_LEN {
            return Err("chunk file name too long");
        }
        if self.data.len() > limits::MAX_FRAME_PAYLOAD {
            return Err("chunk too large");
        }
        Ok(())
    }
}

/// Client → server: the announced files the client is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub file_names: Vec<String>,
}

impl ChannelMessage for TransferRequest {
    const NAME: &'static str = "TransferRequest";

    fn validate_limits(&self) -> std::result::Result<(), &'static str> {
        if self.file_names.len() > limits::MAX_REQUESTED_FILES {
            return Err("too many requested files");
        }
        if self
            .file_names
            .iter()
            .any(|n| n.len() > limits::MAX_FILE_NAME_LEN)
        {
            return Err("requested file name too long");
        }
        Ok(())
    }
}

/// Register the splice message types on `channel`.
///
/// Kinds are numbered in registration order, so both ends must call this
/// (and nothing else) on a fresh channel.
pub fn register_splice_messages(channel: &MessageChannel) -> Result<()> {
    channel.register_message_type::<DraftAnnouncement>()?;
    channel.register_message_type::<TransferChunk>()?;
    channel.register_message_type::<TransferRequest>()?;
    Ok(())
}

pub(crate) fn check_limits<T: ChannelMessage>(message: &T) -> Result<()> {
    message
        .validate_limits()
        .map_err(ProtocolError::LimitExceeded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_limits_ok() {
        let announcement = DraftAnnouncement {
            entries: vec![DraftEntry {
                site_id: "site1".into(),
                file_name: "modX_1.0.zip".into(),
            }],
            channel_token: 7,
        };
        assert!(announcement.validate_limits().is_ok());
        assert_eq!(announcement.file_names().collect::<Vec<_>>(), vec!["modX_1.0.zip"]);
    }

    #[test]
    fn test_message_limits_exceeded() {
        let request = TransferRequest {
            file_names: vec!["a.zip".to_string(); limits::MAX_REQUESTED_FILES + 1],
        };
        assert!(matches!(
            check_limits(&request),
            Err(ProtocolError::LimitExceeded("too many requested files"))
        ));

        let chunk = TransferChunk {
            file_name: "x".repeat(limits::MAX_FILE_NAME_LEN + 1),
            data: Bytes::new(),
        };
        assert!(chunk.validate_limits().is_err());
    }
}
