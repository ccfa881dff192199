//! File transfer: composing announcements, serving requests, persisting
//! chunks.

use std::collections::HashSet;

use undraft_core::{Catalog, DraftSet, PackageDescriptor};
use undraft_store::{validate_file_name, PackageStore, WriteOutcome};

use crate::codec::ChannelToken;
use crate::error::Result;
use crate::messages::{limits, DraftAnnouncement, DraftEntry, TransferChunk};

/// Build the announcement for the packages withheld from a session.
///
/// Keeps withheld packages that are drafted and catalogued, in their
/// original order. Uncatalogued ones are dropped, as is everything past
/// [`limits::MAX_ANNOUNCED_ENTRIES`]. Packages left out stay withheld until
/// the full identification.
pub fn compose_announcement(
    withheld: &[PackageDescriptor],
    draft_set: &DraftSet,
    catalog: &Catalog,
    token: ChannelToken,
) -> DraftAnnouncement {
    let mut entries = withheld
        .iter()
        .filter(|p| draft_set.is_drafted(p.id.as_str()))
        .filter_map(|p| match catalog.lookup(p.id.as_str()) {
            Some(entry) if entry.file_name.len() > limits::MAX_FILE_NAME_LEN => {
                tracing::warn!("file name for drafted package {} too long, not announced", p.id);
                None
            }
            Some(entry) => Some(DraftEntry {
                site_id: entry.site_id.clone(),
                file_name: entry.file_name.clone(),
            }),
            None => {
                tracing::warn!("drafted package {} has no catalog entry, not announced", p.id);
                None
            }
        })
        .collect::<Vec<_>>();
    if entries.len() > limits::MAX_ANNOUNCED_ENTRIES {
        tracing::warn!(
            "{} drafted packages to announce, only the first {} are sent",
            entries.len(),
            limits::MAX_ANNOUNCED_ENTRIES
        );
        entries.truncate(limits::MAX_ANNOUNCED_ENTRIES);
    }
    DraftAnnouncement {
        entries,
        channel_token: token.0,
    }
}

/// Read each requested file, once, in request order.
///
/// Absent or unreadable files are skipped.
pub async fn serve_request<S>(store: &S, file_names: &[String]) -> Vec<TransferChunk>
where
    S: PackageStore + ?Sized,
{
    let mut seen = HashSet::new();
    let mut chunks = Vec::new();
    for name in file_names {
        if !seen.insert(name.as_str()) {
            continue;
        }
        match store.read(name).await {
            Ok(Some(data)) => chunks.push(TransferChunk {
                file_name: name.clone(),
                data,
            }),
            Ok(None) => tracing::debug!("requested file {} not in store, skipped", name),
            Err(e) => tracing::warn!("reading {} failed, skipped: {}", name, e),
        }
    }
    chunks
}

/// Write a received chunk unless the file is already present.
pub async fn persist_chunk<S>(store: &S, chunk: &TransferChunk) -> Result<WriteOutcome>
where
    S: PackageStore + ?Sized,
{
    let outcome = store
        .write_if_absent(&chunk.file_name, chunk.data.clone())
        .await?;
    match outcome {
        WriteOutcome::Written => {
            tracing::debug!("stored {} ({} bytes)", chunk.file_name, chunk.data.len())
        }
        WriteOutcome::AlreadyPresent => {
            tracing::debug!("{} already present, chunk ignored", chunk.file_name)
        }
        WriteOutcome::EmptyPayload => {
            tracing::warn!("empty chunk for {}, ignored", chunk.file_name)
        }
    }
    Ok(outcome)
}

/// File names from `entries` that the store does not hold, deduplicated in
/// announcement order. Names the store would reject are skipped.
pub async fn missing_entries<S>(store: &S, entries: &[DraftEntry]) -> Result<Vec<String>>
where
    S: PackageStore + ?Sized,
{
    let mut seen = HashSet::new();
    let mut missing = Vec::new();
    for entry in entries {
        let name = entry.file_name.as_str();
        if !seen.insert(name) {
            continue;
        }
        if let Err(e) = validate_file_name(name) {
            tracing::warn!("announced file name rejected: {}", e);
            continue;
        }
        if !store.contains(name).await? {
            missing.push(name.to_string());
        }
    }
    Ok(missing)
}
