//! Server side of the handshake splice.
//!
//! The coordinator replaces the host's identification send for each
//! connecting session:
//!
//! ```text
//! Server                                   Client
//!   |-- Identification (drafted removed) -->|   AdvertisedReduced
//!   |-- DraftAnnouncement ----------------->|   AwaitingRequest
//!   |<------------------ TransferRequest ---|   Transferring
//!   |-- TransferChunk (one per file) ------>|
//!   |-- Identification (full) ------------->|   Finalizing → Complete
//! ```
//!
//! With nothing to announce the session goes straight from
//! `AdvertisedReduced` to `Finalizing`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use undraft_core::{HandshakePhase, Identification, PackageDescriptor, PhaseTracker, SessionId};
use undraft_store::PackageStore;

use crate::channel::MessageChannel;
use crate::context::{DraftIndex, ServerContext};
use crate::error::{ProtocolError, Result};
use crate::host::{HandshakeHost, HookOutcome, IdentificationHooks};
use crate::messages::TransferRequest;
use crate::transfer::{compose_announcement, serve_request};
use crate::transport::Destination;

/// Coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// How long a session waits in `AwaitingRequest` before it is finalized
    /// without a transfer.
    ///
    /// A client that already holds every announced file sends no request,
    /// so its session is finalized only when this expires. Keep it short.
    #[serde(with = "undraft_core::durations::secs")]
    pub request_timeout: Duration,
    /// How long a connecting session waits for the server context.
    #[serde(with = "undraft_core::durations::secs")]
    pub context_wait: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            context_wait: Duration::from_secs(30),
        }
    }
}

type Sessions = Mutex<HashMap<SessionId, SessionSplice>>;

struct SessionSplice {
    index: Arc<DraftIndex>,
    tracker: PhaseTracker,
    withheld: Vec<PackageDescriptor>,
    announced: HashSet<String>,
    full_pass: bool,
    request_timer: Option<JoinHandle<()>>,
}

impl SessionSplice {
    fn new(index: Arc<DraftIndex>) -> Self {
        Self {
            index,
            tracker: PhaseTracker::new(),
            withheld: Vec::new(),
            announced: HashSet::new(),
            full_pass: false,
            request_timer: None,
        }
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.request_timer.take() {
            timer.abort();
        }
    }
}

/// Scope in which the session's identification is built unfiltered.
struct FullIdentificationPass<'a> {
    sessions: &'a Sessions,
    session: SessionId,
}

impl<'a> FullIdentificationPass<'a> {
    fn enter(sessions: &'a Sessions, session: &SessionId) -> Result<Self> {
        let mut guard = sessions
            .lock()
            .map_err(|_| ProtocolError::Poisoned("splice sessions"))?;
        let state = guard
            .get_mut(session)
            .ok_or(ProtocolError::UnknownSession(*session))?;
        assert!(
            !state.full_pass,
            "full identification pass for {} entered twice",
            session
        );
        state.full_pass = true;
        Ok(Self {
            sessions,
            session: *session,
        })
    }
}

impl Drop for FullIdentificationPass<'_> {
    fn drop(&mut self) {
        let mut guard = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(state) = guard.get_mut(&self.session) {
            debug_assert!(state.full_pass);
            state.full_pass = false;
        }
    }
}

/// Runs the handshake splice for every connecting session.
pub struct HandshakeCoordinator {
    me: Weak<Self>,
    host: Arc<dyn HandshakeHost>,
    store: Arc<dyn PackageStore>,
    channel: Arc<MessageChannel>,
    context: Arc<ServerContext>,
    config: CoordinatorConfig,
    sessions: Sessions,
}

impl HandshakeCoordinator {
    pub fn new(
        host: Arc<dyn HandshakeHost>,
        store: Arc<dyn PackageStore>,
        channel: Arc<MessageChannel>,
        context: Arc<ServerContext>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            host,
            store,
            channel,
            context,
            config,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn channel(&self) -> &Arc<MessageChannel> {
        &self.channel
    }

    /// Route incoming transfer requests on the channel to this coordinator.
    pub fn attach(&self) -> Result<()> {
        let me = self.me.clone();
        self.channel
            .set_handler::<TransferRequest, _, _>(move |from, request| {
                let me = me.clone();
                async move {
                    match me.upgrade() {
                        Some(coordinator) => coordinator.handle_transfer_request(&from, request).await,
                        None => Ok(()),
                    }
                }
            })
    }

    /// Current phase of `session`.
    pub fn phase(&self, session: &SessionId) -> Option<HandshakePhase> {
        let sessions = self.sessions.lock().ok()?;
        sessions.get(session).map(|s| s.tracker.phase())
    }

    /// Phases `session` went through, oldest first.
    pub fn phase_history(&self, session: &SessionId) -> Option<Vec<HandshakePhase>> {
        let sessions = self.sessions.lock().ok()?;
        sessions.get(session).map(|s| s.tracker.history().to_vec())
    }

    /// Number of sessions with splice state.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Drop every session's state and stop pending timers.
    pub fn clear_sessions(&self) {
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for state in sessions.values_mut() {
            state.stop_timer();
        }
        sessions.clear();
    }

    /// Serve a client's transfer request, then finalize the session.
    ///
    /// Ignored unless the session is awaiting a request. Only names announced
    /// to this session are served, each once.
    pub async fn handle_transfer_request(
        &self,
        session: &SessionId,
        request: TransferRequest,
    ) -> Result<()> {
        let announced = {
            let mut sessions = self.lock_sessions()?;
            let Some(state) = sessions.get_mut(session) else {
                tracing::warn!("transfer request from {} outside a splice, ignored", session);
                return Ok(());
            };
            if state.tracker.phase() != HandshakePhase::AwaitingRequest {
                tracing::warn!(
                    "transfer request from {} ignored in phase {:?}",
                    session,
                    state.tracker.phase()
                );
                return Ok(());
            }
            state.tracker.advance(HandshakePhase::Transferring)?;
            state.stop_timer();
            std::mem::take(&mut state.announced)
        };

        let result = self.transfer(session, request, &announced).await;
        self.settle(session, result).await
    }

    async fn transfer(
        &self,
        session: &SessionId,
        request: TransferRequest,
        announced: &HashSet<String>,
    ) -> Result<()> {
        let names: Vec<String> = request
            .file_names
            .into_iter()
            .filter(|name| {
                let ok = announced.contains(name);
                if !ok {
                    tracing::warn!("{} requested unannounced file {}, skipped", session, name);
                }
                ok
            })
            .collect();

        let chunks = serve_request(self.store.as_ref(), &names).await;
        tracing::info!("sending {} drafted packages to {}", chunks.len(), session);
        for chunk in &chunks {
            match self
                .channel
                .send(Destination::PreHandshake(*session), chunk)
                .await
            {
                Ok(()) => {}
                Err(
                    e @ (ProtocolError::LimitExceeded(_)
                    | ProtocolError::Codec(_)
                    | ProtocolError::Malformed(_)),
                ) => {
                    tracing::warn!("chunk {} for {} not sent: {}", chunk.file_name, session, e);
                }
                Err(e) => return Err(e),
            }
        }
        self.finalize(session).await
    }

    async fn splice(&self, session: &SessionId) -> Result<()> {
        let index = self.context.wait_ready(self.config.context_wait).await;
        {
            let mut sessions = self.lock_sessions()?;
            if let Some(existing) = sessions.get(session) {
                if !existing.tracker.phase().is_terminal() {
                    return Err(ProtocolError::SpliceInProgress(*session));
                }
            }
            sessions.insert(*session, SessionSplice::new(Arc::clone(&index)));
        }

        let reduced = self.host.build_identification(session);
        tracing::debug!(
            "reduced identification for {}: {} packages",
            session,
            reduced.packages.len()
        );
        self.host
            .send_identification_packet(session, reduced)
            .await?;
        self.advance(session, HandshakePhase::AdvertisedReduced)?;

        let withheld = self.with_state(session, |s| std::mem::take(&mut s.withheld))?;
        let announcement = compose_announcement(
            &withheld,
            &index.draft_set,
            &index.catalog,
            self.channel.token(),
        );
        if announcement.entries.is_empty() {
            tracing::debug!("nothing to announce to {}", session);
            return self.finalize(session).await;
        }

        let names: HashSet<String> = announcement.file_names().map(str::to_string).collect();
        let timer = self.arm_request_timeout(*session);
        self.with_state(session, |s| {
            s.announced = names;
            s.request_timer = Some(timer);
            s.tracker.advance(HandshakePhase::AwaitingRequest)
        })??;

        tracing::info!(
            "announcing {} drafted packages to {}",
            announcement.entries.len(),
            session
        );
        self.channel
            .send(Destination::PreHandshake(*session), &announcement)
            .await
    }

    async fn finalize(&self, session: &SessionId) -> Result<()> {
        self.advance(session, HandshakePhase::Finalizing)?;
        let full = {
            let _pass = FullIdentificationPass::enter(&self.sessions, session)?;
            self.host.build_identification(session)
        };
        self.host.send_identification_packet(session, full).await?;
        self.advance(session, HandshakePhase::Complete)?;
        tracing::info!("handshake splice complete for {}", session);
        Ok(())
    }

    fn arm_request_timeout(&self, session: SessionId) -> JoinHandle<()> {
        let me = self.me.clone();
        let timeout = self.config.request_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(coordinator) = me.upgrade() {
                let result = coordinator.expire_request(&session).await;
                if let Err(e) = coordinator.settle(&session, result).await {
                    tracing::warn!("request timeout for {} failed: {}", session, e);
                }
            }
        })
    }

    async fn expire_request(&self, session: &SessionId) -> Result<()> {
        let expired = {
            let mut sessions = self.lock_sessions()?;
            match sessions.get_mut(session) {
                Some(state) if state.tracker.phase() == HandshakePhase::AwaitingRequest => {
                    state.tracker.advance(HandshakePhase::Transferring)?;
                    state.request_timer = None;
                    state.announced.clear();
                    true
                }
                _ => false,
            }
        };
        if !expired {
            return Ok(());
        }
        tracing::info!(
            "no transfer request from {} within {:?}, finalizing without transfer",
            session,
            self.config.request_timeout
        );
        self.finalize(session).await
    }

    /// Salvage the session if `result` is an error.
    async fn settle(&self, session: &SessionId, result: Result<()>) -> Result<()> {
        if result.is_err() {
            self.salvage(session).await;
        }
        result
    }

    fn reached_reduced(&self, session: &SessionId) -> bool {
        self.phase(session)
            .is_some_and(|phase| phase >= HandshakePhase::AdvertisedReduced)
    }

    /// Send the full identification to a session whose splice failed after
    /// the reduced one went out, then drop its state.
    async fn salvage(&self, session: &SessionId) {
        let pending = {
            let mut sessions = match self.sessions.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            match sessions.get_mut(session) {
                Some(state) => {
                    state.stop_timer();
                    let phase = state.tracker.phase();
                    phase >= HandshakePhase::AdvertisedReduced
                        && !phase.is_terminal()
                        && !state.full_pass
                }
                None => false,
            }
        };

        if pending {
            let full = match FullIdentificationPass::enter(&self.sessions, session) {
                Ok(_pass) => Some(self.host.build_identification(session)),
                Err(e) => {
                    tracing::warn!("cannot rebuild identification for {}: {}", session, e);
                    None
                }
            };
            if let Some(full) = full {
                match self.host.send_identification_packet(session, full).await {
                    Ok(()) => tracing::info!("full identification sent to {} after failed splice", session),
                    Err(e) => tracing::warn!("full identification for {} not sent: {}", session, e),
                }
            }
        }
        self.forget(session);
    }

    fn forget(&self, session: &SessionId) {
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut state) = sessions.remove(session) {
            state.stop_timer();
        }
    }

    fn lock_sessions(&self) -> Result<MutexGuard<'_, HashMap<SessionId, SessionSplice>>> {
        self.sessions
            .lock()
            .map_err(|_| ProtocolError::Poisoned("splice sessions"))
    }

    fn with_state<R>(
        &self,
        session: &SessionId,
        f: impl FnOnce(&mut SessionSplice) -> R,
    ) -> Result<R> {
        let mut sessions = self.lock_sessions()?;
        let state = sessions
            .get_mut(session)
            .ok_or(ProtocolError::UnknownSession(*session))?;
        Ok(f(state))
    }

    fn advance(&self, session: &SessionId, next: HandshakePhase) -> Result<()> {
        self.with_state(session, |s| s.tracker.advance(next))??;
        tracing::debug!("{} -> {:?}", session, next);
        Ok(())
    }
}

#[async_trait]
impl IdentificationHooks for HandshakeCoordinator {
    fn on_before_build_identification(&self, session: &SessionId, identification: &mut Identification) {
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Builds outside a running splice go out unfiltered.
        let Some(state) = sessions.get_mut(session) else {
            return;
        };
        if state.full_pass || state.tracker.phase().is_terminal() {
            return;
        }
        let packages = std::mem::take(&mut identification.packages);
        let (advertised, withheld) = state.index.draft_set.partition(packages);
        identification.packages = advertised;
        state.withheld = withheld;
    }

    async fn on_before_send_identification(&self, session: &SessionId) -> HookOutcome {
        match self.splice(session).await {
            Ok(()) => HookOutcome::Suppress,
            // The running splice sends both identifications.
            Err(e @ ProtocolError::SpliceInProgress(_)) => {
                tracing::warn!("{}", e);
                HookOutcome::Suppress
            }
            Err(e) if self.reached_reduced(session) => {
                tracing::warn!("splice for {} failed: {}", session, e);
                self.salvage(session).await;
                HookOutcome::Suppress
            }
            Err(e) => {
                tracing::warn!(
                    "splice for {} failed before the reduced identification, host send proceeds: {}",
                    session,
                    e
                );
                self.forget(session);
                HookOutcome::Proceed
            }
        }
    }

    async fn on_session_closed(&self, session: &SessionId) {
        tracing::debug!("session {} closed", session);
        self.forget(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelRegistry;
    use crate::messages::{register_splice_messages, DraftAnnouncement, TransferChunk};
    use crate::transport::memory::MemoryNetwork;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::OnceLock;
    use undraft_core::{Catalog, CatalogEntry, DraftSet, PackageId};
    use undraft_store::MemoryPackageStore;

    const CHANNEL: &str = "undrafter";

    struct RecordingHost {
        packages: Vec<PackageDescriptor>,
        hooks: OnceLock<Weak<HandshakeCoordinator>>,
        sent: Mutex<Vec<(SessionId, Identification)>>,
        failing_sends: AtomicUsize,
    }

    impl RecordingHost {
        fn fail_next_sends(&self, count: usize) {
            self.failing_sends.store(count, Ordering::SeqCst);
        }

        fn sent_ids(&self) -> Vec<Vec<String>> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, ident)| ident.package_ids().into_iter().map(String::from).collect())
                .collect()
        }
    }

    #[async_trait]
    impl HandshakeHost for RecordingHost {
        fn build_identification(&self, session: &SessionId) -> Identification {
            let mut ident = Identification {
                server_name: "test".into(),
                packages: self.packages.clone(),
            };
            if let Some(hooks) = self.hooks.get().and_then(Weak::upgrade) {
                hooks.on_before_build_identification(session, &mut ident);
            }
            ident
        }

        async fn send_identification_packet(
            &self,
            session: &SessionId,
            identification: Identification,
        ) -> Result<()> {
            let failing = self.failing_sends.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_sends.store(failing - 1, Ordering::SeqCst);
                return Err(crate::error::TransportError::Disconnected(*session).into());
            }
            self.sent.lock().unwrap().push((*session, identification));
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Received {
        Announcement(DraftAnnouncement),
        Chunk(TransferChunk),
    }

    struct Harness {
        network: Arc<MemoryNetwork>,
        coordinator: Arc<HandshakeCoordinator>,
        host: Arc<RecordingHost>,
        server: ChannelRegistry,
        client: ChannelRegistry,
        client_channel: Arc<MessageChannel>,
        received: Arc<Mutex<Vec<Received>>>,
        server_id: SessionId,
        client_id: SessionId,
    }

    impl Harness {
        async fn new(drafted: &[&str], config: CoordinatorConfig) -> Self {
            let network = MemoryNetwork::new();
            let server_id = SessionId::from_bytes([0x5E; 8]);
            let client_id = SessionId::from_bytes([0xC1; 8]);
            let server = ChannelRegistry::new(Arc::new(network.create_transport(server_id).await));
            let client = ChannelRegistry::new(Arc::new(network.create_transport(client_id).await));

            let server_channel = server.register_channel(CHANNEL).unwrap();
            let client_channel = client.register_channel(CHANNEL).unwrap();
            register_splice_messages(&server_channel).unwrap();
            register_splice_messages(&client_channel).unwrap();

            let received = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&received);
            client_channel
                .set_handler::<DraftAnnouncement, _, _>(move |_, a| {
                    let sink = Arc::clone(&sink);
                    async move {
                        sink.lock().unwrap().push(Received::Announcement(a));
                        Ok(())
                    }
                })
                .unwrap();
            let sink = Arc::clone(&received);
            client_channel
                .set_handler::<TransferChunk, _, _>(move |_, c| {
                    let sink = Arc::clone(&sink);
                    async move {
                        sink.lock().unwrap().push(Received::Chunk(c));
                        Ok(())
                    }
                })
                .unwrap();

            let ids = ["modX", "modY", "modZ"];
            let packages: Vec<_> = ids
                .iter()
                .map(|id| PackageDescriptor::universal(PackageId::new(*id).unwrap(), "1.0"))
                .collect();
            let catalog: Catalog = ids
                .iter()
                .map(|id| {
                    CatalogEntry::new(
                        PackageId::new(*id).unwrap(),
                        format!("site-{id}"),
                        format!("{id}_1.0.zip"),
                    )
                })
                .collect();
            let draft_set: DraftSet = drafted.iter().map(|id| PackageId::new(*id).unwrap()).collect();
            let store = MemoryPackageStore::with_files(
                ids.iter()
                    .map(|id| (format!("{id}_1.0.zip"), Bytes::from(format!("zip:{id}")))),
            );

            let context = Arc::new(ServerContext::new());
            context.publish(draft_set, catalog).unwrap();

            let host = Arc::new(RecordingHost {
                packages,
                hooks: OnceLock::new(),
                sent: Mutex::new(Vec::new()),
                failing_sends: AtomicUsize::new(0),
            });
            let coordinator = HandshakeCoordinator::new(
                host.clone(),
                Arc::new(store),
                server_channel,
                context,
                config,
            );
            coordinator.attach().unwrap();
            let _ = host.hooks.set(Arc::downgrade(&coordinator));

            Self {
                network,
                coordinator,
                host,
                server,
                client,
                client_channel,
                received,
                server_id,
                client_id,
            }
        }

        async fn connect(&self) -> HookOutcome {
            self.coordinator
                .on_before_send_identification(&self.client_id)
                .await
        }

        async fn drain_client(&self) {
            while self.client.pump_once(Duration::from_millis(20)).await.unwrap() {}
        }

        async fn request(&self, names: &[&str]) {
            let request = TransferRequest {
                file_names: names.iter().map(|s| s.to_string()).collect(),
            };
            self.client_channel
                .send(Destination::PreHandshake(self.server_id), &request)
                .await
                .unwrap();
            assert!(self.server.pump_once(Duration::from_secs(1)).await.unwrap());
        }

        fn received(&self) -> Vec<Received> {
            self.received.lock().unwrap().clone()
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_drafted_package_is_spliced() {
        let h = Harness::new(&["modX"], CoordinatorConfig::default()).await;

        assert_eq!(h.connect().await, HookOutcome::Suppress);
        assert_eq!(h.host.sent_ids(), vec![ids(&["modY", "modZ"])]);
        assert_eq!(h.coordinator.phase(&h.client_id), Some(HandshakePhase::AwaitingRequest));

        h.drain_client().await;
        let expected = DraftAnnouncement {
            entries: vec![crate::messages::DraftEntry {
                site_id: "site-modX".into(),
                file_name: "modX_1.0.zip".into(),
            }],
            channel_token: h.client_channel.token().0,
        };
        assert_eq!(h.received(), vec![Received::Announcement(expected)]);

        h.request(&["modX_1.0.zip"]).await;
        h.drain_client().await;

        let received = h.received();
        assert_eq!(received.len(), 2);
        assert_eq!(
            received[1],
            Received::Chunk(TransferChunk {
                file_name: "modX_1.0.zip".into(),
                data: Bytes::from_static(b"zip:modX"),
            })
        );
        assert_eq!(
            h.host.sent_ids(),
            vec![ids(&["modY", "modZ"]), ids(&["modX", "modY", "modZ"])]
        );
        assert_eq!(
            h.coordinator.phase_history(&h.client_id).unwrap(),
            vec![
                HandshakePhase::Idle,
                HandshakePhase::AdvertisedReduced,
                HandshakePhase::AwaitingRequest,
                HandshakePhase::Transferring,
                HandshakePhase::Finalizing,
                HandshakePhase::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_nothing_drafted_skips_announcement() {
        let h = Harness::new(&[], CoordinatorConfig::default()).await;

        assert_eq!(h.connect().await, HookOutcome::Suppress);
        h.drain_client().await;

        assert!(h.received().is_empty());
        let all = ids(&["modX", "modY", "modZ"]);
        assert_eq!(h.host.sent_ids(), vec![all.clone(), all]);
        assert_eq!(
            h.coordinator.phase_history(&h.client_id).unwrap(),
            vec![
                HandshakePhase::Idle,
                HandshakePhase::AdvertisedReduced,
                HandshakePhase::Finalizing,
                HandshakePhase::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_request_restricted_to_announced_names() {
        let h = Harness::new(&["modX"], CoordinatorConfig::default()).await;
        h.connect().await;
        h.drain_client().await;

        h.request(&["modY_1.0.zip", "modX_1.0.zip", "modX_1.0.zip"]).await;
        h.drain_client().await;

        let chunks: Vec<_> = h
            .received()
            .into_iter()
            .filter_map(|r| match r {
                Received::Chunk(c) => Some(c.file_name),
                Received::Announcement(_) => None,
            })
            .collect();
        assert_eq!(chunks, vec!["modX_1.0.zip".to_string()]);
        assert_eq!(h.coordinator.phase(&h.client_id), Some(HandshakePhase::Complete));
    }

    #[tokio::test]
    async fn test_late_request_is_ignored() {
        let h = Harness::new(&[], CoordinatorConfig::default()).await;
        h.connect().await;
        assert_eq!(h.coordinator.phase(&h.client_id), Some(HandshakePhase::Complete));

        h.coordinator
            .handle_transfer_request(&h.client_id, TransferRequest { file_names: ids(&["modX_1.0.zip"]) })
            .await
            .unwrap();
        h.drain_client().await;

        assert!(h.received().is_empty());
        assert_eq!(h.host.sent_ids().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_finalizes() {
        let config = CoordinatorConfig {
            request_timeout: Duration::from_secs(10),
            ..CoordinatorConfig::default()
        };
        let h = Harness::new(&["modX", "modY"], config).await;
        h.connect().await;
        assert_eq!(h.coordinator.phase(&h.client_id), Some(HandshakePhase::AwaitingRequest));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(h.coordinator.phase(&h.client_id), Some(HandshakePhase::AwaitingRequest));
        assert_eq!(h.host.sent_ids().len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(h.coordinator.phase(&h.client_id), Some(HandshakePhase::Complete));
        assert_eq!(
            h.host.sent_ids(),
            vec![ids(&["modZ"]), ids(&["modX", "modY", "modZ"])]
        );
        assert!(h
            .coordinator
            .phase_history(&h.client_id)
            .unwrap()
            .contains(&HandshakePhase::Transferring));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_disarms_timeout() {
        let h = Harness::new(&["modX"], CoordinatorConfig::default()).await;
        h.connect().await;
        h.drain_client().await;
        h.request(&["modX_1.0.zip"]).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.host.sent_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_closed_session_is_abandoned() {
        let h = Harness::new(&["modX"], CoordinatorConfig::default()).await;
        h.connect().await;
        assert_eq!(h.coordinator.session_count(), 1);

        h.coordinator.on_session_closed(&h.client_id).await;
        assert_eq!(h.coordinator.phase(&h.client_id), None);

        h.request(&["modX_1.0.zip"]).await;
        assert_eq!(h.host.sent_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_second_splice_for_running_session_is_refused() {
        let h = Harness::new(&["modX"], CoordinatorConfig::default()).await;
        h.connect().await;
        assert_eq!(h.connect().await, HookOutcome::Suppress);

        assert_eq!(h.host.sent_ids().len(), 1);
        assert_eq!(h.coordinator.phase(&h.client_id), Some(HandshakePhase::AwaitingRequest));
    }

    #[tokio::test]
    async fn test_build_outside_splice_is_unfiltered() {
        let h = Harness::new(&["modY"], CoordinatorConfig::default()).await;
        let other = SessionId::from_bytes([7; 8]);
        let ident = h.host.build_identification(&other);
        assert_eq!(ident.package_ids(), vec!["modX", "modY", "modZ"]);
    }

    #[tokio::test]
    async fn test_rebuild_after_complete_is_unfiltered() {
        let h = Harness::new(&["modX"], CoordinatorConfig::default()).await;
        h.connect().await;
        h.drain_client().await;
        h.request(&["modX_1.0.zip"]).await;
        assert_eq!(h.coordinator.phase(&h.client_id), Some(HandshakePhase::Complete));

        let ident = h.host.build_identification(&h.client_id);
        assert_eq!(ident.package_ids(), vec!["modX", "modY", "modZ"]);
    }

    #[tokio::test]
    async fn test_failed_reduced_send_lets_host_send_proceed() {
        let h = Harness::new(&["modX"], CoordinatorConfig::default()).await;
        h.host.fail_next_sends(1);

        assert_eq!(h.connect().await, HookOutcome::Proceed);

        assert_eq!(h.coordinator.phase(&h.client_id), None);
        assert!(h.host.sent_ids().is_empty());
        // The host's own send builds the full identification.
        let ident = h.host.build_identification(&h.client_id);
        assert_eq!(ident.package_ids(), vec!["modX", "modY", "modZ"]);
    }

    #[tokio::test]
    async fn test_failed_announcement_still_sends_full_identification() {
        let h = Harness::new(&["modX"], CoordinatorConfig::default()).await;
        h.network.disconnect(&h.client_id).await;

        assert_eq!(h.connect().await, HookOutcome::Suppress);

        assert_eq!(
            h.host.sent_ids(),
            vec![ids(&["modY", "modZ"]), ids(&["modX", "modY", "modZ"])]
        );
        assert_eq!(h.coordinator.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_transfer_still_sends_full_identification() {
        let h = Harness::new(&["modX"], CoordinatorConfig::default()).await;
        h.connect().await;
        h.drain_client().await;
        h.network.disconnect(&h.client_id).await;

        h.request(&["modX_1.0.zip"]).await;

        assert_eq!(
            h.host.sent_ids(),
            vec![ids(&["modY", "modZ"]), ids(&["modX", "modY", "modZ"])]
        );
        assert_eq!(h.coordinator.session_count(), 0);

        // The request timer was stopped with the session.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.host.sent_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_final_send_is_retried_once() {
        let h = Harness::new(&["modX"], CoordinatorConfig::default()).await;
        h.connect().await;
        h.drain_client().await;
        h.host.fail_next_sends(1);
        h.request(&["modX_1.0.zip"]).await;

        assert_eq!(
            h.host.sent_ids(),
            vec![ids(&["modY", "modZ"]), ids(&["modX", "modY", "modZ"])]
        );
        assert_eq!(h.coordinator.session_count(), 0);
    }

    #[tokio::test]
    #[should_panic(expected = "entered twice")]
    async fn test_full_pass_cannot_nest() {
        let h = Harness::new(&["modX"], CoordinatorConfig::default()).await;
        h.connect().await;
        let _outer = FullIdentificationPass::enter(&h.coordinator.sessions, &h.client_id).unwrap();
        let _inner = FullIdentificationPass::enter(&h.coordinator.sessions, &h.client_id);
    }

    #[test]
    fn test_config_defaults() {
        let config: CoordinatorConfig = serde_json::from_str(r#"{"request_timeout": 2}"#).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.context_wait, Duration::from_secs(30));
    }
}
