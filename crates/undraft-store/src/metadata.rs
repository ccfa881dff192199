//! Metadata scan: builds the [`Catalog`] from unpacked package metadata.
//!
//! The host unpacks every package into its own directory, named after the
//! package file (optionally followed by a suffix), each holding a
//! `modinfo.json`:
//!
//! ```text
//! cache/
//!   modX_1.0.zip_3f2a/modinfo.json    -> modX -> modX_1.0.zip
//!   modY_2.1.zip/modinfo.json         -> modY -> modY_2.1.zip
//! ```

use std::path::Path;

use serde::Deserialize;
use walkdir::{DirEntry, WalkDir};

use undraft_core::{Catalog, CatalogEntry, PackageId};

use crate::error::{Result, StoreError};

/// Metadata file name (matched case-insensitively).
pub const MODINFO_FILE_NAME: &str = "modinfo.json";

/// File name used when the metadata directory has no usable name.
const FALLBACK_FILE_NAME: &str = "0.zip";

/// The fields of `modinfo.json` the catalog needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModInfo {
    #[serde(default, alias = "modID", alias = "ModID", alias = "ModId", alias = "modId")]
    pub modid: String,
    #[serde(
        default,
        alias = "websiteId",
        alias = "WebsiteId",
        alias = "websiteID",
        alias = "WebsiteID"
    )]
    pub websiteid: String,
}

impl ModInfo {
    /// Parse a `modinfo.json` document.
    pub fn parse(json: &str, path: &Path) -> Result<Self> {
        serde_json::from_str(json).map_err(|source| StoreError::Metadata {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Derive the package file name from the directory holding its metadata.
///
/// Everything after the first `.zip` is dropped.
pub fn package_file_name(dir_name: &str) -> String {
    if dir_name.is_empty() {
        return FALLBACK_FILE_NAME.to_string();
    }
    match dir_name.find(".zip") {
        Some(idx) => dir_name[..idx + ".zip".len()].to_string(),
        None => dir_name.to_string(),
    }
}

fn is_modinfo(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
        && entry
            .file_name()
            .to_str()
            .map(|name| name.eq_ignore_ascii_case(MODINFO_FILE_NAME))
            .unwrap_or(false)
}

/// Scan `root` recursively and build the catalog.
///
/// Blocking; run it on a blocking thread from async code. Entries are
/// visited in file-name order so duplicate ids resolve deterministically
/// (last writer wins). Unreadable or malformed files are skipped.
pub fn scan_metadata(root: impl AsRef<Path>) -> Result<Catalog> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(StoreError::InvalidRoot(root.display().to_string()));
    }
    tracing::debug!("scanning package metadata under {}", root.display());

    let mut builder = Catalog::builder();
    let files = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(is_modinfo);

    for entry in files {
        let path = entry.path();
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("skipping unreadable {}: {}", path.display(), e);
                continue;
            }
        };
        let info = match ModInfo::parse(&json, path) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("skipping {}", e);
                continue;
            }
        };
        let Ok(package_id) = PackageId::new(info.modid) else {
            tracing::warn!("skipping {}: empty mod id", path.display());
            continue;
        };

        let dir_name = path
            .parent()
            .filter(|parent| *parent != root)
            .and_then(|parent| parent.file_name())
            .and_then(|name| name.to_str())
            .unwrap_or_default();

        let entry = CatalogEntry::new(package_id, info.websiteid, package_file_name(dir_name));
        if let Some(previous) = builder.insert(entry) {
            tracing::debug!("catalog entry for {} replaced", previous.package_id);
        }
    }

    let catalog = builder.build();
    tracing::info!("catalog built with {} entries", catalog.len());
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_modinfo(root: &Path, dir: &str, file: &str, json: &str) {
        let dir = root.join(dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), json).unwrap();
    }

    #[test]
    fn test_package_file_name() {
        assert_eq!(package_file_name("modX_1.0.zip_3f2a"), "modX_1.0.zip");
        assert_eq!(package_file_name("modY_2.1.zip"), "modY_2.1.zip");
        assert_eq!(package_file_name("plainfolder"), "plainfolder");
        assert_eq!(package_file_name(""), "0.zip");
    }

    #[test]
    fn test_scan_builds_catalog() {
        let dir = TempDir::new().unwrap();
        write_modinfo(dir.path(), "a.zip", "modinfo.json", r#"{"modid":"a","websiteid":"11"}"#);
        write_modinfo(dir.path(), "b.zip_99", "ModInfo.JSON", r#"{"ModID":"b","WebsiteId":"22"}"#);

        let catalog = scan_metadata(dir.path()).unwrap();

        assert_eq!(catalog.len(), 2);
        let a = catalog.lookup("a").unwrap();
        assert_eq!(a.file_name, "a.zip");
        assert_eq!(a.site_id, "11");
        let b = catalog.lookup("b").unwrap();
        assert_eq!(b.file_name, "b.zip");
        assert_eq!(b.site_id, "22");
        assert!(catalog.lookup("c").is_none());
    }

    #[test]
    fn test_scan_skips_malformed_and_empty_ids() {
        let dir = TempDir::new().unwrap();
        write_modinfo(dir.path(), "bad.zip", "modinfo.json", "{ not json");
        write_modinfo(dir.path(), "anon.zip", "modinfo.json", r#"{"websiteid":"5"}"#);
        write_modinfo(dir.path(), "ok.zip", "modinfo.json", r#"{"modid":"ok"}"#);

        let catalog = scan_metadata(dir.path()).unwrap();

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.lookup("ok").unwrap().site_id, "");
    }

    #[test]
    fn test_scan_last_writer_wins() {
        let dir = TempDir::new().unwrap();
        write_modinfo(dir.path(), "a_1.0.zip", "modinfo.json", r#"{"modid":"a"}"#);
        write_modinfo(dir.path(), "a_1.1.zip", "modinfo.json", r#"{"modid":"a"}"#);

        let catalog = scan_metadata(dir.path()).unwrap();
        assert_eq!(catalog.lookup("a").unwrap().file_name, "a_1.1.zip");
    }

    #[test]
    fn test_modinfo_at_root_uses_fallback_name() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("modinfo.json"), r#"{"modid":"root"}"#).unwrap();

        let catalog = scan_metadata(dir.path()).unwrap();
        assert_eq!(catalog.lookup("root").unwrap().file_name, "0.zip");
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            scan_metadata(dir.path().join("missing")),
            Err(StoreError::InvalidRoot(_))
        ));
    }

    proptest! {
        #[test]
        fn suffix_after_zip_is_dropped(stem in "[a-zA-Z0-9_]{1,20}", suffix in "[a-z0-9_]{0,8}") {
            let dir_name = format!("{stem}.zip{suffix}");
            prop_assert_eq!(package_file_name(&dir_name), format!("{stem}.zip"));
        }
    }
}
