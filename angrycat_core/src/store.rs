//! Catalog persistence with checksum sidecars.
//!
//! Each document is written next to a sidecar holding the hex digest of the
//! document's exact bytes:
//!
//! - `LevelCatalog.json` / `LevelCatalogHash.txt`
//! - `ScriptCatalog.json` / `ScriptCatalogHash.txt`
//!
//! Both files of a pair are replaced atomically, document first, so a reader
//! that checks the sidecar sees the old pair, the new pair, or a new document
//! with an old sidecar (reported as a mismatch), never a torn document.

use crate::catalog::{Catalog, LevelDocument, ScriptDocument};
use crate::error::{Error, Result};
use crate::hash::{Algorithm, Digest};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the level catalog document.
pub const LEVEL_CATALOG: &str = "LevelCatalog.json";
/// File name of the level catalog sidecar.
pub const LEVEL_CATALOG_HASH: &str = "LevelCatalogHash.txt";
/// File name of the script catalog document.
pub const SCRIPT_CATALOG: &str = "ScriptCatalog.json";
/// File name of the script catalog sidecar.
pub const SCRIPT_CATALOG_HASH: &str = "ScriptCatalogHash.txt";

/// Result of comparing one document against its sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarCheck {
    pub document: PathBuf,
    /// Digest of the document as it is on disk.
    pub actual: Digest,
    /// Sidecar contents, `None` if the sidecar is missing.
    pub recorded: Option<String>,
}

impl SidecarCheck {
    pub fn is_valid(&self) -> bool {
        self.recorded.as_deref() == Some(self.actual.to_hex().as_str())
    }
}

/// Sidecar checks for both catalog documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub levels: SidecarCheck,
    pub scripts: SidecarCheck,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        self.levels.is_valid() && self.scripts.is_valid()
    }
}

/// Reads and writes the catalog documents under a project root.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    root: PathBuf,
    algorithm: Algorithm,
}

impl CatalogStore {
    pub fn new<P: AsRef<Path>>(root: P, algorithm: Algorithm) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            algorithm,
        }
    }

    /// Get the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the digest algorithm used for sidecars.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Create an empty catalog pair. Fails if a catalog document already exists.
    pub fn init(&self) -> Result<Catalog> {
        for name in [LEVEL_CATALOG, SCRIPT_CATALOG] {
            let path = self.root.join(name);
            if path.exists() {
                return Err(Error::path_exists(path));
            }
        }

        fs::create_dir_all(&self.root)?;
        let catalog = Catalog::new();
        self.save(&catalog)?;
        Ok(catalog)
    }

    /// Load both catalog documents.
    ///
    /// A sidecar that does not match is logged, not rejected.
    pub fn load(&self) -> Result<Catalog> {
        let level_path = self.root.join(LEVEL_CATALOG);
        let level_bytes = fs::read(&level_path)?;
        let levels: LevelDocument = serde_json::from_slice(&level_bytes)
            .map_err(|e| Error::invalid_catalog(&level_path, e.to_string()))?;
        self.warn_on_mismatch(&level_path, &level_bytes, LEVEL_CATALOG_HASH);

        let script_path = self.root.join(SCRIPT_CATALOG);
        let script_bytes = fs::read(&script_path)?;
        let scripts: ScriptDocument = serde_json::from_slice(&script_bytes)
            .map_err(|e| Error::invalid_catalog(&script_path, e.to_string()))?;
        self.warn_on_mismatch(&script_path, &script_bytes, SCRIPT_CATALOG_HASH);

        let catalog = Catalog::from_documents(levels, scripts)
            .map_err(|e| Error::invalid_catalog(&self.root, e.to_string()))?;

        tracing::debug!(
            bundles = catalog.bundles().len(),
            scripts = catalog.scripts().len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    /// Write both catalog documents and their sidecars.
    ///
    /// After this returns, each sidecar equals the digest of its document.
    pub fn save(&self, catalog: &Catalog) -> Result<()> {
        let levels = serialize(&catalog.level_document())?;
        self.write_pair(LEVEL_CATALOG, LEVEL_CATALOG_HASH, &levels)?;

        let scripts = serialize(&catalog.script_document())?;
        self.write_pair(SCRIPT_CATALOG, SCRIPT_CATALOG_HASH, &scripts)?;

        tracing::info!(
            bundles = catalog.bundles().len(),
            scripts = catalog.scripts().len(),
            root = %self.root.display(),
            "catalog saved"
        );
        Ok(())
    }

    /// Compare both documents against their sidecars.
    pub fn verify(&self) -> Result<Verification> {
        Ok(Verification {
            levels: self.check(LEVEL_CATALOG, LEVEL_CATALOG_HASH)?,
            scripts: self.check(SCRIPT_CATALOG, SCRIPT_CATALOG_HASH)?,
        })
    }

    fn check(&self, document: &str, sidecar: &str) -> Result<SidecarCheck> {
        let document = self.root.join(document);
        let bytes = fs::read(&document)?;
        let actual = Digest::compute(self.algorithm, &bytes);

        let sidecar = self.root.join(sidecar);
        let recorded = if sidecar.exists() {
            Some(fs::read_to_string(&sidecar)?.trim_end().to_string())
        } else {
            None
        };

        Ok(SidecarCheck {
            document,
            actual,
            recorded,
        })
    }

    fn warn_on_mismatch(&self, document: &Path, bytes: &[u8], sidecar: &str) {
        let actual = Digest::compute(self.algorithm, bytes).to_hex();
        let recorded = fs::read_to_string(self.root.join(sidecar)).ok();
        if recorded.as_deref().map(str::trim_end) != Some(actual.as_str()) {
            tracing::warn!(
                document = %document.display(),
                actual = %actual,
                recorded = ?recorded,
                "catalog checksum does not match sidecar"
            );
        }
    }

    /// Replace a document and then its sidecar, each atomically.
    fn write_pair(&self, document: &str, sidecar: &str, bytes: &[u8]) -> Result<()> {
        let digest = Digest::compute(self.algorithm, bytes);

        write_atomic(&self.root.join(document), bytes)?;
        write_atomic(&self.root.join(sidecar), digest.to_hex().as_bytes())?;

        tracing::debug!(document, digest = %digest, "wrote catalog document");
        Ok(())
    }
}

/// Pretty-print with two-space indentation and `\n` line endings.
fn serialize<T: Serialize>(document: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(document)?)
}

/// Write a file atomically using tempfile in the target's directory.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;

    temp_file.write_all(bytes)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;

    temp_file.persist(path)?;
    Ok(())
}
