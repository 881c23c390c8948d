//! Bundle manifest inspection.
//!
//! A `.angry` bundle is a zip archive whose `data.json` entry declares the
//! bundle's identity and build hash.

use crate::catalog::BundleId;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Name of the manifest entry inside a bundle.
pub const MANIFEST_ENTRY: &str = "data.json";

/// Bundle format version current editors produce.
pub const CURRENT_BUNDLE_VERSION: i32 = 5;

fn default_bundle_version() -> i32 {
    2
}

/// Contents of a bundle's `data.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    #[serde(default)]
    pub bundle_name: Option<String>,
    #[serde(default)]
    pub bundle_author: Option<String>,
    #[serde(default = "default_bundle_version")]
    pub bundle_version: i32,
    pub bundle_guid: String,
    #[serde(default)]
    pub build_hash: Option<String>,
}

impl BundleManifest {
    /// Parse a manifest from its JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The declared bundle id.
    pub fn id(&self) -> Result<BundleId> {
        BundleId::parse(&self.bundle_guid)
    }

    pub fn name(&self) -> &str {
        self.bundle_name.as_deref().unwrap_or_default()
    }

    pub fn author(&self) -> &str {
        self.bundle_author.as_deref().unwrap_or_default()
    }

    pub fn build_hash(&self) -> &str {
        self.build_hash.as_deref().unwrap_or_default()
    }

    /// Non-fatal problems worth telling the operator about.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.name().is_empty() {
            warnings.push("No bundle name".to_string());
        }
        if self.author().is_empty() {
            warnings.push("No bundle author".to_string());
        }
        if self.bundle_version != CURRENT_BUNDLE_VERSION {
            warnings.push(format!("Old bundle version: {}", self.bundle_version));
        }
        warnings
    }
}

/// Bundle facts needed to catalog a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectedBundle {
    pub id: BundleId,
    pub manifest: BundleManifest,
    /// Byte length of the bundle file.
    pub size: u64,
}

/// Read and validate the manifest of the bundle at `path`.
pub fn inspect(path: &Path) -> Result<InspectedBundle> {
    if !path.is_file() {
        return Err(Error::file_not_found(path));
    }
    let file = fs::File::open(path)?;
    let size = file.metadata()?.len();

    let mut archive = zip::ZipArchive::new(file).map_err(|e| bundle_error(path, e))?;
    let mut entry = archive
        .by_name(MANIFEST_ENTRY)
        .map_err(|e| bundle_error(path, e))?;
    let mut json = String::new();
    entry.read_to_string(&mut json)?;

    let manifest = BundleManifest::from_json(&json)
        .map_err(|e| Error::invalid_bundle(path, e.to_string()))?;
    let id = manifest
        .id()
        .map_err(|e| Error::invalid_bundle(path, e.to_string()))?;
    if manifest.build_hash().is_empty() {
        return Err(Error::invalid_bundle(path, "manifest has no build hash"));
    }

    for warning in manifest.warnings() {
        tracing::warn!(path = %path.display(), "{}", warning);
    }

    Ok(InspectedBundle { id, manifest, size })
}

/// Resolve a bundle reference: an id, or the path of a bundle whose manifest
/// names it. Only the id is taken from the file.
pub fn resolve_id(target: &str) -> Result<BundleId> {
    let path = Path::new(target);
    if !BundleId::is_valid(target) && path.is_file() {
        return Ok(inspect(path)?.id);
    }
    BundleId::parse(target)
}

fn bundle_error(path: &Path, err: zip::result::ZipError) -> Error {
    match Error::from(err) {
        Error::InvalidBundle { reason, .. } => Error::invalid_bundle(path, reason),
        other => other,
    }
}
