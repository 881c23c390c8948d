//! Catalog data model and its JSON document shapes.
//!
//! The level catalog is persisted as:
//!
//! ```text
//! { "Levels": [ { "Name", "Author", "Size", "Guid", "Hash", "ThumbnailHash",
//!                 "ExternalLink", "Parts", "LastUpdate", "Updates" }, ... ] }
//! ```
//!
//! and the script catalog as `{ "Scripts": [ { "FileName", "Hash", "Size",
//! "Updates" }, ... ] }`. Absent or `null` strings default to `""`, numbers to
//! 0 and lists to `[]`. Keys this model does not know are kept in `extra` and
//! written back as they were read.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Length of a bundle id in hex characters.
pub const ID_LEN: usize = 32;

/// Message recorded for the first build of a bundle.
pub const INITIAL_UPDATE_MESSAGE: &str = "Initial upload";

/// A 128-bit bundle identity, stored as 32 lowercase hex characters.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BundleId(String);

impl BundleId {
    /// Parse an id. Hex digits are accepted in either case.
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != ID_LEN {
            return Err(Error::invalid_id(format!(
                "Expected {} hex characters, got {}",
                ID_LEN,
                s.len()
            )));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::invalid_id(format!("Not a hex string: {}", s)));
        }
        Ok(BundleId(s.to_ascii_lowercase()))
    }

    /// Check whether a string is a well-formed id.
    pub fn is_valid(s: &str) -> bool {
        s.len() == ID_LEN && s.chars().all(|c| c.is_ascii_hexdigit())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BundleId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        BundleId::parse(&value)
    }
}

impl From<BundleId> for String {
    fn from(id: BundleId) -> Self {
        id.0
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BundleId({})", self.0)
    }
}

/// One accepted build in a bundle's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub hash: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
}

impl UpdateEntry {
    pub fn new(hash: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            message: message.into(),
        }
    }
}

/// Catalog entry for one distributable level bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BundleRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: u64,
    #[serde(rename = "Guid")]
    pub id: BundleId,
    /// Digest of the current build, as declared by the bundle.
    #[serde(rename = "Hash", default, deserialize_with = "null_as_default")]
    pub build_hash: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thumbnail_hash: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub external_link: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parts: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_update: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updates: Vec<UpdateEntry>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Identity and build information for a bundle being added.
#[derive(Debug, Clone)]
pub struct NewBundle {
    pub id: BundleId,
    pub name: String,
    pub author: String,
    pub build_hash: String,
    pub thumbnail_hash: String,
    pub size: u64,
}

impl BundleRecord {
    /// Build a fresh record whose update log holds only the initial build.
    pub fn new(bundle: NewBundle, links: &Links, link_template: &str, now: i64) -> Result<Self> {
        let mut record = Self {
            name: bundle.name,
            author: bundle.author,
            size: bundle.size,
            id: bundle.id,
            build_hash: bundle.build_hash.clone(),
            thumbnail_hash: bundle.thumbnail_hash,
            external_link: String::new(),
            parts: Vec::new(),
            last_update: now,
            updates: vec![UpdateEntry::new(bundle.build_hash, INITIAL_UPDATE_MESSAGE)],
            extra: BTreeMap::new(),
        };
        record.apply_links(links, link_template)?;
        Ok(record)
    }

    /// Whether `hash` is already recorded in the update log.
    pub fn has_update(&self, hash: &str) -> bool {
        self.updates.iter().any(|u| u.hash == hash)
    }

    /// Whether the artifact is served from this repository.
    pub fn is_hosted(&self, link_template: &str) -> bool {
        self.parts.len() == 1 && self.external_link == hosted_link(link_template, &self.id)
    }

    /// Set `external_link` and `parts` from a link choice.
    pub(crate) fn apply_links(&mut self, links: &Links, link_template: &str) -> Result<()> {
        links.validate()?;
        match links {
            Links::Hosted => {
                let link = hosted_link(link_template, &self.id);
                self.parts = vec![link.clone()];
                self.external_link = link;
            }
            Links::External(urls) => {
                self.parts = urls.clone();
                self.external_link = if urls.len() == 1 {
                    urls[0].clone()
                } else {
                    String::new()
                };
            }
        }
        Ok(())
    }

    /// Check the per-record invariants (unique update hashes, link/parts agreement).
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for update in &self.updates {
            if !seen.insert(update.hash.as_str()) {
                return Err(Error::invalid_record(format!(
                    "Bundle {} lists hash {} more than once",
                    self.id, update.hash
                )));
            }
        }

        if self.external_link.is_empty() == (self.parts.len() == 1) {
            return Err(Error::invalid_record(format!(
                "Bundle {} has {} parts but external link {:?}",
                self.id,
                self.parts.len(),
                self.external_link
            )));
        }

        Ok(())
    }

    /// Repair link/parts shapes written by older editors.
    ///
    /// Returns true if the record was changed.
    pub(crate) fn normalize_links(&mut self) -> bool {
        let before = self.parts.len();
        self.parts.retain(|p| !p.trim().is_empty());
        let dropped_blank = self.parts.len() != before;

        let reshaped = match self.parts.len() {
            0 if !self.external_link.is_empty() => {
                self.parts.push(self.external_link.clone());
                true
            }
            1 if self.external_link.is_empty() => {
                self.external_link = self.parts[0].clone();
                true
            }
            n if n > 1 && !self.external_link.is_empty() => {
                self.external_link.clear();
                true
            }
            _ => false,
        };
        dropped_blank || reshaped
    }
}

/// Where a bundle's artifact is downloaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Links {
    /// Served from this repository at the templated link.
    Hosted,
    /// One or more explicit locations, in download order.
    External(Vec<String>),
}

impl Links {
    /// Interpret operator-supplied links; no links means hosted.
    pub fn from_links(links: Vec<String>) -> Self {
        let links: Vec<String> = links
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if links.is_empty() {
            Links::Hosted
        } else {
            Links::External(links)
        }
    }

    fn validate(&self) -> Result<()> {
        if let Links::External(urls) = self {
            if urls.is_empty() {
                return Err(Error::invalid_record("External link list is empty"));
            }
            if urls.iter().any(|u| u.trim().is_empty()) {
                return Err(Error::invalid_record("External link is blank"));
            }
        }
        Ok(())
    }
}

/// Expand a link template for a bundle id.
pub fn hosted_link(template: &str, id: &BundleId) -> String {
    template.replace("{id}", id.as_str())
}

/// Catalog entry for one auxiliary script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScriptRecord {
    pub file_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hash: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updates: Vec<String>,
}

impl ScriptRecord {
    /// Build a fresh record whose update log holds only `hash`.
    pub fn new(file_name: impl Into<String>, hash: impl Into<String>, size: u64) -> Self {
        let hash = hash.into();
        Self {
            file_name: file_name.into(),
            hash: hash.clone(),
            size,
            updates: vec![hash],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.file_name.is_empty() {
            return Err(Error::invalid_record("Script file name is empty"));
        }
        let mut seen = HashSet::new();
        for hash in &self.updates {
            if !seen.insert(hash.as_str()) {
                return Err(Error::invalid_record(format!(
                    "Script {} lists hash {} more than once",
                    self.file_name, hash
                )));
            }
        }
        Ok(())
    }
}

/// The in-memory catalog: bundles and scripts in insertion order.
///
/// Mutated only through the operations in [`crate::registry`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub(crate) bundles: Vec<BundleRecord>,
    pub(crate) scripts: Vec<ScriptRecord>,
    pub(crate) level_extra: BTreeMap<String, serde_json::Value>,
    pub(crate) script_extra: BTreeMap<String, serde_json::Value>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bundles in catalog order.
    pub fn bundles(&self) -> &[BundleRecord] {
        &self.bundles
    }

    /// Scripts in catalog order.
    pub fn scripts(&self) -> &[ScriptRecord] {
        &self.scripts
    }

    /// Assemble a catalog from parsed documents, checking uniqueness.
    pub(crate) fn from_documents(levels: LevelDocument, scripts: ScriptDocument) -> Result<Self> {
        let mut bundles = levels.levels;
        let mut ids = HashSet::new();
        for bundle in &mut bundles {
            if !ids.insert(bundle.id.clone()) {
                return Err(Error::invalid_record(format!(
                    "Bundle id {} appears more than once",
                    bundle.id
                )));
            }
            if bundle.normalize_links() {
                tracing::debug!(id = %bundle.id, "normalized link/parts shape");
            }
            bundle.validate()?;
        }

        let mut names = HashSet::new();
        for script in &scripts.scripts {
            if !names.insert(script.file_name.as_str()) {
                return Err(Error::invalid_record(format!(
                    "Script {} appears more than once",
                    script.file_name
                )));
            }
            script.validate()?;
        }

        Ok(Self {
            bundles,
            scripts: scripts.scripts,
            level_extra: levels.extra,
            script_extra: scripts.extra,
        })
    }

    pub(crate) fn level_document(&self) -> LevelDocumentRef<'_> {
        LevelDocumentRef {
            levels: &self.bundles,
            extra: &self.level_extra,
        }
    }

    pub(crate) fn script_document(&self) -> ScriptDocumentRef<'_> {
        ScriptDocumentRef {
            scripts: &self.scripts,
            extra: &self.script_extra,
        }
    }
}

/// `LevelCatalog.json` as read from disk.
#[derive(Debug, Deserialize)]
pub(crate) struct LevelDocument {
    #[serde(rename = "Levels", default, deserialize_with = "null_as_default")]
    pub levels: Vec<BundleRecord>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// `LevelCatalog.json` as written to disk.
#[derive(Debug, Serialize)]
pub(crate) struct LevelDocumentRef<'a> {
    #[serde(rename = "Levels")]
    pub levels: &'a [BundleRecord],
    #[serde(flatten)]
    pub extra: &'a BTreeMap<String, serde_json::Value>,
}

/// `ScriptCatalog.json` as read from disk.
#[derive(Debug, Deserialize)]
pub(crate) struct ScriptDocument {
    #[serde(rename = "Scripts", default, deserialize_with = "null_as_default")]
    pub scripts: Vec<ScriptRecord>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// `ScriptCatalog.json` as written to disk.
#[derive(Debug, Serialize)]
pub(crate) struct ScriptDocumentRef<'a> {
    #[serde(rename = "Scripts")]
    pub scripts: &'a [ScriptRecord],
    #[serde(flatten)]
    pub extra: &'a BTreeMap<String, serde_json::Value>,
}

/// Treat an explicit `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
