//! Proptest generators for property-based testing.

use std::collections::BTreeSet;

use proptest::prelude::*;

use undraft_core::{Catalog, CatalogEntry, DraftSet, HandshakePhase, PackageDescriptor, PackageId};

/// Generate a package id.
pub fn package_id() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9_]{0,15}".prop_map(String::from)
}

/// Generate up to `max` distinct package ids.
pub fn package_ids(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(package_id(), 0..=max).prop_map(|ids| ids.into_iter().collect())
}

/// Generate a package file name.
pub fn file_name() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_.-]{1,40}\\.zip".prop_map(String::from)
}

/// Generate a handshake phase.
pub fn handshake_phase() -> impl Strategy<Value = HandshakePhase> {
    prop_oneof![
        Just(HandshakePhase::Idle),
        Just(HandshakePhase::AdvertisedReduced),
        Just(HandshakePhase::AwaitingRequest),
        Just(HandshakePhase::Transferring),
        Just(HandshakePhase::Finalizing),
        Just(HandshakePhase::Complete),
    ]
}

/// A server's packages, which of them are drafted, and which have metadata.
#[derive(Debug, Clone)]
pub struct SpliceScenario {
    pub package_ids: Vec<String>,
    pub drafted: BTreeSet<String>,
    pub catalogued: BTreeSet<String>,
}

impl SpliceScenario {
    /// File name the catalog gives `id`.
    pub fn file_name_of(id: &str) -> String {
        format!("{id}_1.0.zip")
    }

    /// Site id the catalog gives `id`.
    pub fn site_id_of(id: &str) -> String {
        format!("site-{id}")
    }

    pub fn descriptors(&self) -> Vec<PackageDescriptor> {
        self.package_ids.iter().map(|id| crate::fixtures::package(id)).collect()
    }

    pub fn draft_set(&self) -> DraftSet {
        self.drafted.iter().filter_map(|id| PackageId::new(id.as_str()).ok()).collect()
    }

    pub fn catalog(&self) -> Catalog {
        self.catalogued
            .iter()
            .filter_map(|id| {
                let package_id = PackageId::new(id.as_str()).ok()?;
                Some(CatalogEntry::new(
                    package_id,
                    Self::site_id_of(id),
                    Self::file_name_of(id),
                ))
            })
            .collect()
    }

    /// Package ids a client should see in the reduced identification.
    pub fn expected_reduced(&self) -> Vec<String> {
        self.package_ids
            .iter()
            .filter(|id| !self.drafted.contains(*id))
            .cloned()
            .collect()
    }

    /// File names a client should see announced, in package order.
    pub fn expected_announced(&self) -> Vec<String> {
        self.package_ids
            .iter()
            .filter(|id| self.drafted.contains(*id) && self.catalogued.contains(*id))
            .map(|id| Self::file_name_of(id))
            .collect()
    }
}

impl Arbitrary for SpliceScenario {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        package_ids(12)
            .prop_flat_map(|ids| {
                let n = ids.len();
                (
                    Just(ids),
                    prop::collection::vec(any::<bool>(), n),
                    prop::collection::vec(any::<bool>(), n),
                )
            })
            .prop_map(|(ids, drafted, catalogued)| {
                let pick = |mask: &[bool]| {
                    ids.iter()
                        .zip(mask)
                        .filter(|(_, keep)| **keep)
                        .map(|(id, _)| id.clone())
                        .collect::<BTreeSet<_>>()
                };
                SpliceScenario {
                    drafted: pick(&drafted),
                    catalogued: pick(&catalogued),
                    package_ids: ids,
                }
            })
            .boxed()
    }
}
