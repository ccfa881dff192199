//! Server plugin.

use std::sync::{Arc, Mutex};

use undraft_core::{Catalog, PackageDescriptor};
use undraft_protocol::{
    register_splice_messages, ChannelRegistry, HandshakeCoordinator, HandshakeHost,
    IdentificationHooks, ServerContext,
};
use undraft_registry::{populate_draft_set, HttpRegistry, PopulationReport, RegistryProbe};
use undraft_store::{scan_metadata, DirPackageStore, PackageStore};

use crate::config::UndraftConfig;
use crate::error::{Result, UndraftError};
use crate::lifecycle::{LifecycleGate, PhaseRunner, SetupOutcome};

/// What the server host provides beyond the identification seam.
pub trait ServerHost: HandshakeHost {
    /// Every package loaded on the server.
    fn packages(&self) -> Vec<PackageDescriptor>;

    /// Whether this is a dedicated server. The plugin is inert otherwise.
    fn is_dedicated(&self) -> bool;

    /// The host's channels over its client connections.
    fn channels(&self) -> &ChannelRegistry;

    /// Route identification hooks to `hooks`.
    fn install_identification_hooks(&self, hooks: Arc<dyn IdentificationHooks>);

    /// Stop calling identification hooks.
    fn remove_identification_hooks(&self);
}

/// Result of `on_start`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartReport {
    /// Registry probing summary.
    pub population: PopulationReport,
    /// Catalogued packages.
    pub catalogued: usize,
}

/// The server half of Undraft.
pub struct ServerPlugin<H: ServerHost + 'static> {
    host: Arc<H>,
    config: UndraftConfig,
    gate: LifecycleGate,
    context: Arc<ServerContext>,
    store: Arc<dyn PackageStore>,
    probe: Arc<dyn RegistryProbe>,
    coordinator: Mutex<Option<Arc<HandshakeCoordinator>>>,
}

impl<H: ServerHost + 'static> ServerPlugin<H> {
    pub fn new(
        host: Arc<H>,
        store: Arc<dyn PackageStore>,
        probe: Arc<dyn RegistryProbe>,
        config: UndraftConfig,
    ) -> Self {
        Self {
            host,
            config,
            gate: LifecycleGate::new(),
            context: Arc::new(ServerContext::new()),
            store,
            probe,
            coordinator: Mutex::new(None),
        }
    }

    /// Plugin over the configured package directory and the HTTP registry.
    pub fn open(host: Arc<H>, config: UndraftConfig) -> Result<Self> {
        let store = DirPackageStore::create(&config.package_dir)?;
        let probe = HttpRegistry::new(&config.registry)?;
        Ok(Self::new(host, Arc::new(store), Arc::new(probe), config))
    }

    pub fn config(&self) -> &UndraftConfig {
        &self.config
    }

    pub fn gate(&self) -> &LifecycleGate {
        &self.gate
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// The installed coordinator.
    pub fn coordinator(&self) -> Option<Arc<HandshakeCoordinator>> {
        self.coordinator.lock().ok()?.clone()
    }

    /// Install the channel, handlers and identification hooks, then re-enter
    /// the host's pre-start phases with everything but our own setup gated.
    pub fn on_pre_start(&self, runner: &dyn PhaseRunner) -> Result<SetupOutcome> {
        if self.gate.is_self_installing() {
            tracing::debug!("pre-start re-entered during self-install");
            return Ok(SetupOutcome::Reentered);
        }
        if !self.host.is_dedicated() {
            tracing::info!("not a dedicated server, undraft stays inactive");
            return Ok(SetupOutcome::Inert);
        }
        if self.coordinator().is_some() {
            return Ok(SetupOutcome::AlreadyInstalled);
        }

        let channel = self
            .host
            .channels()
            .register_channel(&self.config.channel_name)?;
        register_splice_messages(&channel)?;
        let coordinator = HandshakeCoordinator::new(
            self.host.clone(),
            Arc::clone(&self.store),
            channel,
            Arc::clone(&self.context),
            self.config.coordinator.clone(),
        );
        coordinator.attach()?;
        self.host.install_identification_hooks(coordinator.clone());
        self.set_coordinator(Some(coordinator));

        {
            let _scope = self.gate.self_install();
            runner.rerun_pre_start(&self.gate, &mut || self.on_pre_start(runner).map(|_| ()))?;
        }

        tracing::info!("undraft installed on channel {}", self.config.channel_name);
        Ok(SetupOutcome::Installed)
    }

    /// Probe the registry, scan package metadata and publish the result.
    ///
    /// Connections that arrive earlier wait for the publication.
    pub async fn on_start(&self) -> Result<StartReport> {
        if self.coordinator().is_none() {
            return Ok(StartReport::default());
        }

        let packages = self.host.packages();
        let (draft_set, population) = populate_draft_set(
            Arc::clone(&self.probe),
            &packages,
            &self.config.plugin_id,
            &self.config.registry,
        )
        .await;

        let metadata_dir = self.config.metadata_dir.clone();
        let scanned = tokio::task::spawn_blocking(move || scan_metadata(metadata_dir))
            .await
            .map_err(|e| UndraftError::Task(e.to_string()))?;
        let catalog = match scanned {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!("metadata scan failed, no drafted package can be sent: {}", e);
                Catalog::empty()
            }
        };

        let report = StartReport {
            population,
            catalogued: catalog.len(),
        };
        self.context.publish(draft_set, catalog)?;
        Ok(report)
    }

    /// Remove every seam and reset process-wide state. Safe to call twice.
    pub fn on_dispose(&self) {
        let Some(coordinator) = self.take_coordinator() else {
            self.gate.reset();
            return;
        };
        self.host.remove_identification_hooks();
        coordinator.channel().clear_handlers();
        coordinator.clear_sessions();
        self.context.reset();
        self.gate.reset();
        tracing::info!("undraft disposed");
    }

    fn set_coordinator(&self, coordinator: Option<Arc<HandshakeCoordinator>>) {
        match self.coordinator.lock() {
            Ok(mut slot) => *slot = coordinator,
            Err(poisoned) => *poisoned.into_inner() = coordinator,
        }
    }

    fn take_coordinator(&self) -> Option<Arc<HandshakeCoordinator>> {
        match self.coordinator.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}
