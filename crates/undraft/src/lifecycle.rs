//! Host lifecycle gating.
//!
//! At startup the plugin installs its seams and then re-enters the host's
//! phase runner inside a [`SelfInstall`] scope. While the scope is open the
//! host skips every phase except the plugin's own setup step, so the
//! interception layer is in place exactly once before anything else runs.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;

/// Host lifecycle phases the gate knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostPhase {
    /// Asset reload.
    ReloadAssets,
    /// Startup of other plugins.
    StartPlugins,
    /// UI-ready callbacks.
    UiReady,
    /// This plugin's own setup step.
    OwnSetup,
}

/// Result of a plugin's `on_pre_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    /// Seams installed and the phase runner re-entered.
    Installed,
    /// Already installed by an earlier call.
    AlreadyInstalled,
    /// Called from inside the self-install scope; nothing done.
    Reentered,
    /// Not applicable on this host.
    Inert,
}

/// The host's phase runner, re-entered during self-install.
pub trait PhaseRunner: Send + Sync {
    /// Run the host's pre-start phases again.
    ///
    /// Implementations must skip every phase `gate` does not allow and call
    /// `own_setup` when they reach [`HostPhase::OwnSetup`].
    fn rerun_pre_start(
        &self,
        gate: &LifecycleGate,
        own_setup: &mut dyn FnMut() -> Result<()>,
    ) -> Result<()>;
}

/// Process-wide gate over host lifecycle phases.
#[derive(Debug, Default)]
pub struct LifecycleGate {
    self_install: AtomicBool,
}

impl LifecycleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the self-install scope is open.
    pub fn is_self_installing(&self) -> bool {
        self.self_install.load(Ordering::SeqCst)
    }

    /// Whether the host may run `phase` now.
    pub fn allows(&self, phase: HostPhase) -> bool {
        !self.is_self_installing() || phase == HostPhase::OwnSetup
    }

    /// Open the self-install scope. It closes when the guard drops.
    ///
    /// # Panics
    ///
    /// If the scope is already open.
    pub fn self_install(&self) -> SelfInstall<'_> {
        let was_open = self.self_install.swap(true, Ordering::SeqCst);
        assert!(!was_open, "self-install scope opened twice");
        tracing::debug!("self-install scope opened");
        SelfInstall { gate: self }
    }

    /// Close any open scope.
    pub fn reset(&self) {
        self.self_install.store(false, Ordering::SeqCst);
    }
}

/// Guard for the self-install scope.
#[must_use = "the scope closes as soon as the guard drops"]
pub struct SelfInstall<'a> {
    gate: &'a LifecycleGate,
}

impl Drop for SelfInstall<'_> {
    fn drop(&mut self) {
        let was_open = self.gate.self_install.swap(false, Ordering::SeqCst);
        debug_assert!(was_open, "self-install scope closed while not open");
        tracing::debug!("self-install scope closed");
    }
}
