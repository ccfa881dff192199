//! Server context: the published draft set and catalog.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use undraft_core::{Catalog, DraftSet};

use crate::error::{ProtocolError, Result};

/// What the coordinator needs from startup: which packages are drafted and
/// where their files are.
#[derive(Debug, Clone, Default)]
pub struct DraftIndex {
    pub draft_set: DraftSet,
    pub catalog: Catalog,
}

impl DraftIndex {
    pub fn new(draft_set: DraftSet, catalog: Catalog) -> Self {
        Self { draft_set, catalog }
    }
}

/// Publishes the [`DraftIndex`] once per server process.
///
/// Sessions that connect before publication wait for it through
/// [`wait_ready`](Self::wait_ready).
pub struct ServerContext {
    tx: watch::Sender<Option<Arc<DraftIndex>>>,
}

impl ServerContext {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Publish the index. Fails if already published since the last reset.
    pub fn publish(&self, draft_set: DraftSet, catalog: Catalog) -> Result<Arc<DraftIndex>> {
        let index = Arc::new(DraftIndex::new(draft_set, catalog));
        let mut published = false;
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(Arc::clone(&index));
            published = true;
            true
        });
        if !published {
            return Err(ProtocolError::AlreadyPublished);
        }
        tracing::info!(
            "server context published: {} drafted, {} catalogued",
            index.draft_set.len(),
            index.catalog.len()
        );
        Ok(index)
    }

    /// The published index, if any.
    pub fn current(&self) -> Option<Arc<DraftIndex>> {
        self.tx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Wait up to `timeout` for publication.
    ///
    /// Fails open: after the timeout an empty index is returned, so the
    /// session proceeds with nothing drafted.
    pub async fn wait_ready(&self, timeout: Duration) -> Arc<DraftIndex> {
        let mut rx = self.tx.subscribe();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|slot| slot.is_some())).await;
        if let Ok(Ok(slot)) = waited {
            if let Some(index) = &*slot {
                return Arc::clone(index);
            }
        }
        tracing::warn!(
            "server context not ready after {:?}; proceeding with nothing drafted",
            timeout
        );
        Arc::new(DraftIndex::default())
    }

    /// Forget the published index.
    pub fn reset(&self) {
        self.tx.send_replace(None);
    }
}

impl Default for ServerContext {
    fn default() -> Self {
        Self::new()
    }
}
