//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: scriptable hosts, a static
//! registry, a phase runner, and package builders.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use undraft::{ClientHost, HostPhase, LifecycleGate, PhaseRunner, ServerHost};
use undraft_core::{Identification, PackageDescriptor, PackageId, PackageSide, SessionId};
use undraft_protocol::{
    ChannelRegistry, HandshakeHost, HookOutcome, IdentificationHooks, MemoryNetwork,
};
use undraft_registry::{ProbeOutcome, RegistryError, RegistryProbe};

/// A universal, client-required package.
pub fn package(id: &str) -> PackageDescriptor {
    PackageDescriptor::universal(PackageId::new(id).expect("non-empty package id"), "1.0")
}

/// A universal package clients may lack.
pub fn optional_package(id: &str) -> PackageDescriptor {
    PackageDescriptor {
        required_on_client: false,
        ..package(id)
    }
}

/// A package that only runs on the server.
pub fn server_only_package(id: &str) -> PackageDescriptor {
    PackageDescriptor {
        side: PackageSide::Server,
        ..package(id)
    }
}

/// Universal, client-required packages for `ids`.
pub fn packages(ids: &[&str]) -> Vec<PackageDescriptor> {
    ids.iter().map(|id| package(id)).collect()
}

/// Write `<root>/<dir_name>/modinfo.json` for a package.
pub fn write_modinfo(
    root: &Path,
    dir_name: &str,
    mod_id: &str,
    website_id: &str,
) -> std::io::Result<PathBuf> {
    let dir = root.join(dir_name);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("modinfo.json");
    let json = serde_json::json!({ "modid": mod_id, "websiteid": website_id });
    std::fs::write(&path, json.to_string())?;
    Ok(path)
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Registry that answers from fixed sets.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    not_found: HashSet<String>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl StaticRegistry {
    /// Registry that does not know `ids`; every other package exists.
    pub fn drafted<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            not_found: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Make probes for `id` fail.
    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// Number of probes answered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryProbe for StaticRegistry {
    async fn probe(&self, package_id: &PackageId) -> undraft_registry::Result<ProbeOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(package_id.as_str()) {
            return Err(RegistryError::Timeout(package_id.to_string()));
        }
        if self.not_found.contains(package_id.as_str()) {
            Ok(ProbeOutcome::NotFound)
        } else {
            Ok(ProbeOutcome::Exists)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Phase runner
// ─────────────────────────────────────────────────────────────────────────────

/// The host's pre-start phases, in the order [`TestRunner`] runs them.
pub const PRE_START_PHASES: [HostPhase; 4] = [
    HostPhase::ReloadAssets,
    HostPhase::StartPlugins,
    HostPhase::OwnSetup,
    HostPhase::UiReady,
];

/// Phase runner that records which phases ran and which the gate skipped.
#[derive(Debug, Default)]
pub struct TestRunner {
    ran: Mutex<Vec<HostPhase>>,
    skipped: Mutex<Vec<HostPhase>>,
}

impl TestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ran(&self) -> Vec<HostPhase> {
        self.ran.lock().expect("runner lock").clone()
    }

    pub fn skipped(&self) -> Vec<HostPhase> {
        self.skipped.lock().expect("runner lock").clone()
    }
}

impl PhaseRunner for TestRunner {
    fn rerun_pre_start(
        &self,
        gate: &LifecycleGate,
        own_setup: &mut dyn FnMut() -> undraft::Result<()>,
    ) -> undraft::Result<()> {
        for phase in PRE_START_PHASES {
            if !gate.allows(phase) {
                self.skipped.lock().expect("runner lock").push(phase);
                continue;
            }
            self.ran.lock().expect("runner lock").push(phase);
            if phase == HostPhase::OwnSetup {
                own_setup()?;
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hosts
// ─────────────────────────────────────────────────────────────────────────────

/// Server host over the in-memory network.
///
/// Identifications are recorded instead of sent; tests hand them to the
/// client plugin.
pub struct TestServerHost {
    server_name: String,
    packages: Vec<PackageDescriptor>,
    dedicated: bool,
    channels: ChannelRegistry,
    hooks: RwLock<Option<Arc<dyn IdentificationHooks>>>,
    sent: Mutex<Vec<(SessionId, Identification)>>,
}

impl TestServerHost {
    pub fn new(packages: Vec<PackageDescriptor>, channels: ChannelRegistry) -> Self {
        Self {
            server_name: "test server".to_string(),
            packages,
            dedicated: true,
            channels,
            hooks: RwLock::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// A listen server inside a singleplayer game.
    pub fn non_dedicated(mut self) -> Self {
        self.dedicated = false;
        self
    }

    pub fn hooks(&self) -> Option<Arc<dyn IdentificationHooks>> {
        self.hooks.read().expect("hooks lock").clone()
    }

    pub fn has_hooks(&self) -> bool {
        self.hooks().is_some()
    }

    /// The host's identification step for a connecting session.
    pub async fn identify(&self, session: &SessionId) -> HookOutcome {
        let outcome = match self.hooks() {
            Some(hooks) => hooks.on_before_send_identification(session).await,
            None => HookOutcome::Proceed,
        };
        if outcome == HookOutcome::Proceed {
            let identification = self.build_identification(session);
            self.record(session, identification);
        }
        outcome
    }

    /// The connection for `session` closed.
    pub async fn close(&self, session: &SessionId) {
        if let Some(hooks) = self.hooks() {
            hooks.on_session_closed(session).await;
        }
    }

    /// Identifications sent to `session`, oldest first.
    pub fn identifications_for(&self, session: &SessionId) -> Vec<Identification> {
        self.sent
            .lock()
            .expect("sent lock")
            .iter()
            .filter(|(s, _)| s == session)
            .map(|(_, ident)| ident.clone())
            .collect()
    }

    /// Package ids of each identification sent to `session`.
    pub fn advertised_ids(&self, session: &SessionId) -> Vec<Vec<String>> {
        self.identifications_for(session)
            .iter()
            .map(|ident| ident.package_ids().into_iter().map(String::from).collect())
            .collect()
    }

    fn record(&self, session: &SessionId, identification: Identification) {
        self.sent
            .lock()
            .expect("sent lock")
            .push((*session, identification));
    }
}

#[async_trait]
impl HandshakeHost for TestServerHost {
    fn build_identification(&self, session: &SessionId) -> Identification {
        let mut identification = Identification {
            server_name: self.server_name.clone(),
            packages: self
                .packages
                .iter()
                .filter(|p| p.side.is_universal())
                .cloned()
                .collect(),
        };
        if let Some(hooks) = self.hooks() {
            hooks.on_before_build_identification(session, &mut identification);
        }
        identification
    }

    async fn send_identification_packet(
        &self,
        session: &SessionId,
        identification: Identification,
    ) -> undraft_protocol::Result<()> {
        self.record(session, identification);
        Ok(())
    }
}

impl ServerHost for TestServerHost {
    fn packages(&self) -> Vec<PackageDescriptor> {
        self.packages.clone()
    }

    fn is_dedicated(&self) -> bool {
        self.dedicated
    }

    fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    fn install_identification_hooks(&self, hooks: Arc<dyn IdentificationHooks>) {
        *self.hooks.write().expect("hooks lock") = Some(hooks);
    }

    fn remove_identification_hooks(&self) {
        *self.hooks.write().expect("hooks lock") = None;
    }
}

/// Client host over the in-memory network.
pub struct TestClientHost {
    multiplayer: bool,
    channels: ChannelRegistry,
    delivered: Mutex<Vec<Identification>>,
}

impl TestClientHost {
    pub fn new(channels: ChannelRegistry) -> Self {
        Self {
            multiplayer: true,
            channels,
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// Identifications the plugin delivered after holding them.
    pub fn delivered(&self) -> Vec<Identification> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn singleplayer(mut self) -> Self {
        self.multiplayer = false;
        self
    }
}

impl ClientHost for TestClientHost {
    fn is_multiplayer(&self) -> bool {
        self.multiplayer
    }

    fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    fn deliver_identification(&self, identification: Identification) {
        self.delivered.lock().unwrap().push(identification);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// World
// ─────────────────────────────────────────────────────────────────────────────

/// One server and one client on an in-memory network.
pub struct TestWorld {
    pub network: Arc<MemoryNetwork>,
    pub server_id: SessionId,
    pub client_id: SessionId,
    pub server_host: Arc<TestServerHost>,
    pub client_host: Arc<TestClientHost>,
}

impl TestWorld {
    pub async fn new(packages: Vec<PackageDescriptor>) -> Self {
        Self::with_hosts(packages, |server| server, |client| client).await
    }

    /// Build the world, letting the caller adjust each host first.
    pub async fn with_hosts(
        packages: Vec<PackageDescriptor>,
        server: impl FnOnce(TestServerHost) -> TestServerHost,
        client: impl FnOnce(TestClientHost) -> TestClientHost,
    ) -> Self {
        let network = MemoryNetwork::new();
        let server_id = SessionId::from_bytes([0x5E; 8]);
        let client_id = SessionId::from_bytes([0xC1; 8]);
        let server_channels =
            ChannelRegistry::new(Arc::new(network.create_transport(server_id).await));
        let client_channels =
            ChannelRegistry::new(Arc::new(network.create_transport(client_id).await));

        Self {
            network,
            server_id,
            client_id,
            server_host: Arc::new(server(TestServerHost::new(packages, server_channels))),
            client_host: Arc::new(client(TestClientHost::new(client_channels))),
        }
    }

    /// Dispatch client-bound frames until none arrives within `idle`.
    pub async fn pump_client(&self, idle: Duration) -> usize {
        pump(&self.client_host.channels, idle).await
    }

    /// Dispatch server-bound frames until none arrives within `idle`.
    pub async fn pump_server(&self, idle: Duration) -> usize {
        pump(&self.server_host.channels, idle).await
    }
}

async fn pump(channels: &ChannelRegistry, idle: Duration) -> usize {
    let mut frames = 0;
    while let Ok(true) = channels.pump_once(idle).await {
        frames += 1;
    }
    frames
}
