//! Client plugin.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::task::JoinHandle;

use undraft_core::Identification;
use undraft_protocol::{register_splice_messages, ChannelRegistry, ClientProgress, DraftClient};
use undraft_store::{DirPackageStore, PackageStore};

use crate::config::UndraftConfig;
use crate::error::Result;
use crate::lifecycle::{LifecycleGate, PhaseRunner, SetupOutcome};

/// What the client host provides.
pub trait ClientHost: Send + Sync {
    /// Whether the current game is multiplayer. The splice only runs there.
    fn is_multiplayer(&self) -> bool;

    /// The host's channels over its server connection.
    fn channels(&self) -> &ChannelRegistry;

    /// Process an identification the plugin held back earlier.
    fn deliver_identification(&self, identification: Identification);
}

/// Where the client is in holding the host's handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpliceHold {
    /// Not holding anything.
    #[default]
    Released,
    /// Waiting for the reduced identification, which is held back.
    AwaitingReduced,
    /// Reduced identification held; waiting for the full one.
    AwaitingFull,
}

#[derive(Default)]
struct HoldState {
    hold: SpliceHold,
    held: Option<Identification>,
    timer: Option<JoinHandle<()>>,
}

impl HoldState {
    fn release(&mut self) {
        self.hold = SpliceHold::Released;
        self.held = None;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

fn lock_state(state: &Mutex<HoldState>) -> MutexGuard<'_, HoldState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The client half of Undraft.
pub struct ClientPlugin<H: ClientHost + 'static> {
    host: Arc<H>,
    config: UndraftConfig,
    gate: LifecycleGate,
    store: Arc<dyn PackageStore>,
    client: Mutex<Option<Arc<DraftClient>>>,
    hold: Arc<Mutex<HoldState>>,
}

impl<H: ClientHost + 'static> ClientPlugin<H> {
    pub fn new(host: Arc<H>, store: Arc<dyn PackageStore>, config: UndraftConfig) -> Self {
        Self {
            host,
            config,
            gate: LifecycleGate::new(),
            store,
            client: Mutex::new(None),
            hold: Arc::new(Mutex::new(HoldState::default())),
        }
    }

    /// Plugin over the configured package directory.
    pub fn open(host: Arc<H>, config: UndraftConfig) -> Result<Self> {
        let store = DirPackageStore::create(&config.package_dir)?;
        Ok(Self::new(host, Arc::new(store), config))
    }

    pub fn config(&self) -> &UndraftConfig {
        &self.config
    }

    pub fn gate(&self) -> &LifecycleGate {
        &self.gate
    }

    pub fn client(&self) -> Option<Arc<DraftClient>> {
        self.client.lock().ok()?.clone()
    }

    /// Transfer progress of the current connection.
    pub fn progress(&self) -> ClientProgress {
        self.client().map(|c| c.progress()).unwrap_or_default()
    }

    /// Install the channel and handlers, then re-enter the host's pre-start
    /// phases with everything but our own setup gated.
    pub fn on_pre_start(&self, runner: &dyn PhaseRunner) -> Result<SetupOutcome> {
        if self.gate.is_self_installing() {
            tracing::debug!("pre-start re-entered during self-install");
            return Ok(SetupOutcome::Reentered);
        }
        if self.client().is_some() {
            return Ok(SetupOutcome::AlreadyInstalled);
        }

        let channel = self
            .host
            .channels()
            .register_channel(&self.config.channel_name)?;
        register_splice_messages(&channel)?;
        let client = DraftClient::new(Arc::clone(&self.store), channel);
        client.attach()?;
        match self.client.lock() {
            Ok(mut slot) => *slot = Some(client),
            Err(poisoned) => *poisoned.into_inner() = Some(client),
        }

        {
            let _scope = self.gate.self_install();
            runner.rerun_pre_start(&self.gate, &mut || self.on_pre_start(runner).map(|_| ()))?;
        }

        tracing::info!("undraft client installed on channel {}", self.config.channel_name);
        Ok(SetupOutcome::Installed)
    }

    /// A connection to a server is starting.
    pub fn on_connecting(&self) {
        let Some(client) = self.client() else {
            return;
        };
        if !self.host.is_multiplayer() {
            return;
        }
        client.reset();
        let mut state = self.lock_hold();
        state.release();
        state.hold = SpliceHold::AwaitingReduced;
        tracing::debug!("holding identification for the splice");
    }

    /// An identification arrived. Returns whether the host should process it.
    ///
    /// The first identification of a splice is held; the second releases the
    /// hold and goes through. If no announcement follows the first within
    /// `hold_timeout`, the server is not splicing and the held identification
    /// is delivered to the host as is.
    pub fn on_identification_received(&self, identification: &Identification) -> bool {
        let mut state = self.lock_hold();
        match state.hold {
            SpliceHold::Released => true,
            SpliceHold::AwaitingReduced => {
                tracing::debug!(
                    "reduced identification held ({} packages)",
                    identification.packages.len()
                );
                state.hold = SpliceHold::AwaitingFull;
                state.held = Some(identification.clone());
                state.timer = self.arm_hold_timeout();
                false
            }
            SpliceHold::AwaitingFull => {
                tracing::info!(
                    "full identification received ({} packages), releasing hold",
                    identification.packages.len()
                );
                state.release();
                true
            }
        }
    }

    fn arm_hold_timeout(&self) -> Option<JoinHandle<()>> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!("no async runtime, identification held without a timeout");
                return None;
            }
        };
        let state: Weak<Mutex<HoldState>> = Arc::downgrade(&self.hold);
        let host = Arc::clone(&self.host);
        let client = self.client();
        let timeout = self.config.hold_timeout;
        Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(state) = state.upgrade() else {
                return;
            };
            let held = {
                let mut state = lock_state(&state);
                if state.hold != SpliceHold::AwaitingFull {
                    return;
                }
                if client.is_some_and(|c| c.progress().announced > 0) {
                    tracing::debug!("splice under way, still holding identification");
                    return;
                }
                state.hold = SpliceHold::Released;
                state.timer = None;
                state.held.take()
            };
            if let Some(held) = held {
                tracing::warn!(
                    "no splice from the server within {:?}, delivering held identification",
                    timeout
                );
                host.deliver_identification(held);
            }
        }))
    }

    /// Whether the host should hand incoming packets to the plugin instead of
    /// its own handshake handling.
    pub fn suppresses_default_packet_handling(&self) -> bool {
        self.hold() != SpliceHold::Released
    }

    pub fn hold(&self) -> SpliceHold {
        self.lock_hold().hold
    }

    /// The connection went away.
    pub fn on_disconnected(&self) {
        self.lock_hold().release();
        if let Some(client) = self.client() {
            client.reset();
        }
    }

    /// Remove handlers and reset process-wide state. Safe to call twice.
    pub fn on_dispose(&self) {
        let client = match self.client.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if client.is_some() {
            if let Some(channel) = self.host.channels().get_channel(&self.config.channel_name) {
                channel.clear_handlers();
            }
            tracing::info!("undraft client disposed");
        }
        self.lock_hold().release();
        self.gate.reset();
    }

    fn lock_hold(&self) -> MutexGuard<'_, HoldState> {
        lock_state(&self.hold)
    }
}
