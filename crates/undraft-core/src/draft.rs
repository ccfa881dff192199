//! DraftSet: packages withheld from the first identification.

use std::collections::HashSet;

use crate::types::{PackageDescriptor, PackageId};

/// Read-only set of drafted package ids.
///
/// Built once per server process through [`DraftSetBuilder`].
#[derive(Debug, Clone, Default)]
pub struct DraftSet {
    ids: HashSet<PackageId>,
}

impl DraftSet {
    /// An empty draft set (nothing is withheld).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> DraftSetBuilder {
        DraftSetBuilder::default()
    }

    /// Whether the package is drafted.
    pub fn is_drafted(&self, package_id: &str) -> bool {
        self.ids.contains(package_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageId> {
        self.ids.iter()
    }

    /// Split a package list into `(advertised, withheld)`, preserving order.
    pub fn partition(
        &self,
        packages: Vec<PackageDescriptor>,
    ) -> (Vec<PackageDescriptor>, Vec<PackageDescriptor>) {
        let (withheld, advertised): (Vec<_>, Vec<_>) = packages
            .into_iter()
            .partition(|p| self.is_drafted(p.id.as_str()));
        (advertised, withheld)
    }
}

impl FromIterator<PackageId> for DraftSet {
    fn from_iter<I: IntoIterator<Item = PackageId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Append-only builder used while the registry is probed.
#[derive(Debug, Default)]
pub struct DraftSetBuilder {
    ids: HashSet<PackageId>,
}

impl DraftSetBuilder {
    /// Record a package as drafted. Returns false if it was already recorded.
    pub fn insert(&mut self, package_id: PackageId) -> bool {
        self.ids.insert(package_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn build(self) -> DraftSet {
        DraftSet { ids: self.ids }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(id: &str) -> PackageDescriptor {
        PackageDescriptor::universal(PackageId::new(id).unwrap(), "1.0")
    }

    #[test]
    fn test_is_drafted() {
        let mut builder = DraftSet::builder();
        assert!(builder.insert(PackageId::new("modX").unwrap()));
        assert!(!builder.insert(PackageId::new("modX").unwrap()));
        let set = builder.build();

        assert!(set.is_drafted("modX"));
        assert!(!set.is_drafted("modY"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_partition_preserves_order() {
        let set: DraftSet = ["b", "d"]
            .into_iter()
            .map(|s| PackageId::new(s).unwrap())
            .collect();

        let (advertised, withheld) = set.partition(vec![pkg("a"), pkg("b"), pkg("c"), pkg("d")]);

        let advertised: Vec<_> = advertised.iter().map(|p| p.id.as_str()).collect();
        let withheld: Vec<_> = withheld.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(advertised, vec!["a", "c"]);
        assert_eq!(withheld, vec!["b", "d"]);
    }

    #[test]
    fn test_empty_set_withholds_nothing() {
        let (advertised, withheld) = DraftSet::empty().partition(vec![pkg("a"), pkg("b")]);
        assert_eq!(advertised.len(), 2);
        assert!(withheld.is_empty());
    }
}
