//! Draft set population.
//!
//! Runs once at server startup, before connections are accepted.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use undraft_core::{DraftSet, PackageDescriptor, PackageId};

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::probe::{ProbeOutcome, RegistryProbe};

/// Result of a population run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PopulationReport {
    /// Number of packages probed.
    pub probed: usize,
    /// Number of packages found drafted.
    pub drafted: usize,
    /// Number of probes that failed or timed out (counted as not drafted).
    pub failed: usize,
}

/// Probe every client-required package except `own_id` and collect the
/// drafted ones.
///
/// Probes run with at most `config.max_concurrent_probes` in flight, each
/// bounded by `config.probe_timeout`. A failed probe never fails the run.
pub async fn populate_draft_set<P>(
    probe: Arc<P>,
    packages: &[PackageDescriptor],
    own_id: &str,
    config: &RegistryConfig,
) -> (DraftSet, PopulationReport)
where
    P: RegistryProbe + ?Sized + 'static,
{
    let mut seen = HashSet::new();
    let candidates: Vec<PackageId> = packages
        .iter()
        .filter(|p| p.is_draft_candidate(own_id))
        .filter(|p| seen.insert(p.id.clone()))
        .map(|p| p.id.clone())
        .collect();

    let mut report = PopulationReport {
        probed: candidates.len(),
        ..PopulationReport::default()
    };
    let mut builder = DraftSet::builder();

    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_probes.max(1)));
    let mut tasks = JoinSet::new();
    for package_id in candidates {
        let probe = Arc::clone(&probe);
        let semaphore = Arc::clone(&semaphore);
        let timeout = config.probe_timeout;
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let outcome = match tokio::time::timeout(timeout, probe.probe(&package_id)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(RegistryError::Timeout(package_id.to_string())),
            };
            (package_id, outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((package_id, Ok(ProbeOutcome::NotFound))) => {
                tracing::debug!("{} is drafted", package_id);
                builder.insert(package_id);
            }
            Ok((_, Ok(ProbeOutcome::Exists))) => {}
            Ok((package_id, Err(e))) => {
                tracing::warn!("probe for {} failed, treating as not drafted: {}", package_id, e);
                report.failed += 1;
            }
            Err(e) => {
                tracing::warn!("probe task failed: {}", e);
                report.failed += 1;
            }
        }
    }

    let draft_set = builder.build();
    report.drafted = draft_set.len();
    tracing::info!(
        "draft set ready: {} drafted of {} probed ({} failed)",
        report.drafted,
        report.probed,
        report.failed
    );
    (draft_set, report)
}
