//! Client side of the handshake splice.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use undraft_core::SessionId;
use undraft_store::{PackageStore, WriteOutcome};

use crate::channel::MessageChannel;
use crate::error::{ProtocolError, Result};
use crate::messages::{DraftAnnouncement, TransferChunk, TransferRequest};
use crate::transfer::{missing_entries, persist_chunk};
use crate::transport::Destination;

/// What the client has seen of the current splice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientProgress {
    /// Entries in the last announcement.
    pub announced: usize,
    /// Files requested from the server.
    pub requested: BTreeSet<String>,
    /// Requested files received so far.
    pub received: BTreeSet<String>,
}

impl ClientProgress {
    /// Requested files not yet received.
    pub fn pending(&self) -> Vec<&str> {
        self.requested
            .difference(&self.received)
            .map(String::as_str)
            .collect()
    }

    pub fn is_transfer_complete(&self) -> bool {
        self.requested.is_subset(&self.received)
    }
}

/// Answers announcements and stores received packages.
pub struct DraftClient {
    me: Weak<Self>,
    store: Arc<dyn PackageStore>,
    channel: Arc<MessageChannel>,
    progress: Mutex<ClientProgress>,
}

impl DraftClient {
    pub fn new(store: Arc<dyn PackageStore>, channel: Arc<MessageChannel>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            store,
            channel,
            progress: Mutex::new(ClientProgress::default()),
        })
    }

    /// Route announcements and chunks on the channel to this client.
    pub fn attach(&self) -> Result<()> {
        let me = self.me.clone();
        self.channel
            .set_handler::<DraftAnnouncement, _, _>(move |from, announcement| {
                let me = me.clone();
                async move {
                    match me.upgrade() {
                        Some(client) => client.handle_announcement(&from, announcement).await.map(|_| ()),
                        None => Ok(()),
                    }
                }
            })?;

        let me = self.me.clone();
        self.channel
            .set_handler::<TransferChunk, _, _>(move |_, chunk| {
                let me = me.clone();
                async move {
                    match me.upgrade() {
                        Some(client) => client.handle_chunk(chunk).await.map(|_| ()),
                        None => Ok(()),
                    }
                }
            })
    }

    /// Request the announced files missing from the local store.
    ///
    /// Sends nothing when every file is present.
    pub async fn handle_announcement(
        &self,
        from: &SessionId,
        announcement: DraftAnnouncement,
    ) -> Result<Option<TransferRequest>> {
        let expected = self.channel.token().0;
        if announcement.channel_token != expected {
            return Err(ProtocolError::ChannelMismatch {
                expected,
                got: announcement.channel_token,
            });
        }

        let missing = missing_entries(self.store.as_ref(), &announcement.entries).await?;
        {
            let mut progress = self.lock_progress()?;
            *progress = ClientProgress {
                announced: announcement.entries.len(),
                requested: missing.iter().cloned().collect(),
                received: BTreeSet::new(),
            };
        }

        if missing.is_empty() {
            tracing::info!(
                "all {} drafted packages already present",
                announcement.entries.len()
            );
            return Ok(None);
        }

        tracing::info!(
            "requesting {} of {} drafted packages",
            missing.len(),
            announcement.entries.len()
        );
        let request = TransferRequest { file_names: missing };
        self.channel
            .send(Destination::PreHandshake(*from), &request)
            .await?;
        Ok(Some(request))
    }

    /// Store a received package unless it is already present.
    pub async fn handle_chunk(&self, chunk: TransferChunk) -> Result<WriteOutcome> {
        let outcome = persist_chunk(self.store.as_ref(), &chunk).await?;
        let mut progress = self.lock_progress()?;
        if progress.requested.contains(&chunk.file_name) {
            progress.received.insert(chunk.file_name);
        }
        if progress.is_transfer_complete() && !progress.requested.is_empty() {
            tracing::info!("received all {} requested packages", progress.requested.len());
        }
        Ok(outcome)
    }

    pub fn progress(&self) -> ClientProgress {
        self.lock_progress()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Forget the current splice.
    pub fn reset(&self) {
        if let Ok(mut progress) = self.lock_progress() {
            *progress = ClientProgress::default();
        }
    }

    fn lock_progress(&self) -> Result<MutexGuard<'_, ClientProgress>> {
        self.progress
            .lock()
            .map_err(|_| ProtocolError::Poisoned("client progress"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelRegistry;
    use crate::codec::{decode_payload, ChannelToken};
    use crate::messages::{register_splice_messages, DraftEntry};
    use crate::transport::memory::MemoryNetwork;
    use crate::transport::Transport;
    use bytes::Bytes;
    use std::time::Duration;
    use undraft_store::MemoryPackageStore;

    struct Fixture {
        client: Arc<DraftClient>,
        store: Arc<MemoryPackageStore>,
        server_transport: Arc<dyn Transport>,
        server_id: SessionId,
        token: ChannelToken,
    }

    async fn fixture(files: &[&str]) -> Fixture {
        let network = MemoryNetwork::new();
        let server_id = SessionId::from_bytes([1; 8]);
        let client_id = SessionId::from_bytes([2; 8]);
        let server_transport: Arc<dyn Transport> =
            Arc::new(network.create_transport(server_id).await);
        let registry = ChannelRegistry::new(Arc::new(network.create_transport(client_id).await));
        let channel = registry.register_channel("undrafter").unwrap();
        register_splice_messages(&channel).unwrap();
        let token = channel.token();

        let store = Arc::new(MemoryPackageStore::with_files(
            files.iter().map(|f| (f.to_string(), Bytes::from_static(b"old"))),
        ));
        let client = DraftClient::new(store.clone(), channel);
        client.attach().unwrap();
        Fixture {
            client,
            store,
            server_transport,
            server_id,
            token,
        }
    }

    fn announcement(token: ChannelToken, files: &[&str]) -> DraftAnnouncement {
        DraftAnnouncement {
            entries: files
                .iter()
                .map(|f| DraftEntry {
                    site_id: format!("site-{f}"),
                    file_name: f.to_string(),
                })
                .collect(),
            channel_token: token.0,
        }
    }

    #[tokio::test]
    async fn test_requests_only_missing_files() {
        let f = fixture(&["have.zip"]).await;

        let request = f
            .client
            .handle_announcement(&f.server_id, announcement(f.token, &["have.zip", "need.zip"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.file_names, vec!["need.zip".to_string()]);

        let (from, frame) = f
            .server_transport
            .recv_timeout(Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from, SessionId::from_bytes([2; 8]));
        let sent: TransferRequest = decode_payload(&frame.payload).unwrap();
        assert_eq!(sent, request);

        let progress = f.client.progress();
        assert_eq!(progress.announced, 2);
        assert_eq!(progress.pending(), vec!["need.zip"]);
    }

    #[tokio::test]
    async fn test_nothing_missing_sends_nothing() {
        let f = fixture(&["a.zip"]).await;
        let request = f
            .client
            .handle_announcement(&f.server_id, announcement(f.token, &["a.zip"]))
            .await
            .unwrap();
        assert!(request.is_none());
        assert!(f
            .server_transport
            .recv_timeout(Duration::from_millis(20))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_wrong_token_rejected() {
        let f = fixture(&[]).await;
        let wrong = ChannelToken(f.token.0.wrapping_add(1));
        let err = f
            .client
            .handle_announcement(&f.server_id, announcement(wrong, &["x.zip"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ChannelMismatch { .. }));
    }

    #[tokio::test]
    async fn test_chunks_are_write_once() {
        let f = fixture(&["have.zip"]).await;
        f.client
            .handle_announcement(&f.server_id, announcement(f.token, &["have.zip", "new.zip"]))
            .await
            .unwrap();

        let present = TransferChunk {
            file_name: "have.zip".into(),
            data: Bytes::from_static(b"replacement"),
        };
        assert_eq!(
            f.client.handle_chunk(present).await.unwrap(),
            WriteOutcome::AlreadyPresent
        );
        assert_eq!(
            f.store.read("have.zip").await.unwrap(),
            Some(Bytes::from_static(b"old"))
        );

        let new = TransferChunk {
            file_name: "new.zip".into(),
            data: Bytes::from_static(b"fresh"),
        };
        assert_eq!(f.client.handle_chunk(new.clone()).await.unwrap(), WriteOutcome::Written);
        assert!(f.client.progress().is_transfer_complete());
        assert_eq!(
            f.client.handle_chunk(new).await.unwrap(),
            WriteOutcome::AlreadyPresent
        );

        f.client.reset();
        assert_eq!(f.client.progress(), ClientProgress::default());
    }
}
