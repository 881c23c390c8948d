//! Registry operations on the in-memory catalog.
//!
//! Every operation validates first and mutates second, so a failed call
//! leaves the catalog exactly as it was.

use crate::catalog::{BundleId, BundleRecord, Catalog, Links, ScriptRecord, UpdateEntry};
use crate::error::{Error, Result};

/// A new build replacing a bundle's current artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildChange {
    /// Build hash declared by the new bundle.
    pub hash: String,
    /// Byte length of the new artifact.
    pub size: u64,
    /// Update message shown to players.
    pub message: String,
}

/// Field changes for [`Catalog::update`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleMutation {
    pub name: Option<String>,
    pub author: Option<String>,
    pub build: Option<BuildChange>,
    pub links: Option<Links>,
    pub thumbnail_hash: Option<String>,
}

impl BundleMutation {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.author.is_none()
            && self.build.is_none()
            && self.links.is_none()
            && self.thumbnail_hash.is_none()
    }
}

/// Whether an upserted script was new or already catalogued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptChange {
    Created,
    Updated,
}

impl Catalog {
    /// Insert a bundle at the end of the catalog.
    pub fn add(&mut self, record: BundleRecord) -> Result<()> {
        if self.find(&record.id).is_some() {
            return Err(Error::duplicate_bundle(record.id.as_str()));
        }
        record.validate()?;

        tracing::debug!(id = %record.id, name = %record.name, "bundle added");
        self.bundles.push(record);
        Ok(())
    }

    /// Look up a bundle by id.
    pub fn find(&self, id: &BundleId) -> Option<&BundleRecord> {
        self.bundles.iter().find(|b| &b.id == id)
    }

    /// Apply a mutation, stamping build changes with the current time.
    pub fn update(
        &mut self,
        id: &BundleId,
        mutation: BundleMutation,
        link_template: &str,
    ) -> Result<&BundleRecord> {
        let now = chrono::Utc::now().timestamp();
        self.update_at(id, mutation, link_template, now)
    }

    /// Apply a mutation, stamping build changes with `now`.
    pub fn update_at(
        &mut self,
        id: &BundleId,
        mutation: BundleMutation,
        link_template: &str,
        now: i64,
    ) -> Result<&BundleRecord> {
        let index = self
            .bundles
            .iter()
            .position(|b| &b.id == id)
            .ok_or_else(|| Error::bundle_not_found(id.as_str()))?;

        let mut record = self.bundles[index].clone();

        if let Some(name) = mutation.name {
            record.name = name;
        }
        if let Some(author) = mutation.author {
            record.author = author;
        }
        if let Some(thumbnail_hash) = mutation.thumbnail_hash {
            record.thumbnail_hash = thumbnail_hash;
        }
        if let Some(build) = mutation.build {
            if record.has_update(&build.hash) {
                return Err(Error::duplicate_update(id.as_str(), build.hash));
            }
            record.build_hash = build.hash.clone();
            record.size = build.size;
            record.last_update = now;
            record.updates.push(UpdateEntry::new(build.hash, build.message));
        }
        if let Some(links) = &mutation.links {
            record.apply_links(links, link_template)?;
        }
        record.validate()?;

        tracing::debug!(id = %record.id, updates = record.updates.len(), "bundle updated");
        self.bundles[index] = record;
        Ok(&self.bundles[index])
    }

    /// Remove a bundle and return it; the caller removes its artifact directory.
    pub fn delete(&mut self, id: &BundleId) -> Result<BundleRecord> {
        let index = self
            .bundles
            .iter()
            .position(|b| &b.id == id)
            .ok_or_else(|| Error::bundle_not_found(id.as_str()))?;

        tracing::debug!(id = %id, "bundle deleted");
        Ok(self.bundles.remove(index))
    }

    /// Rename every bundle by `old` to `new`, returning how many changed.
    ///
    /// Refuses to merge into a name another author already uses.
    pub fn rename_author(&mut self, old: &str, new: &str) -> Result<usize> {
        if new.is_empty() {
            return Err(Error::invalid_record("New author name is empty"));
        }
        if !self.bundles.iter().any(|b| b.author == old) {
            return Err(Error::author_not_found(old));
        }
        if old != new && self.bundles.iter().any(|b| b.author == new) {
            return Err(Error::author_taken(new));
        }

        let mut renamed = 0;
        for bundle in self.bundles.iter_mut().filter(|b| b.author == old) {
            bundle.author = new.to_string();
            renamed += 1;
        }
        Ok(renamed)
    }

    /// Distinct author names in first-seen order.
    pub fn authors(&self) -> Vec<&str> {
        let mut authors: Vec<&str> = Vec::new();
        for bundle in &self.bundles {
            if !authors.contains(&bundle.author.as_str()) {
                authors.push(&bundle.author);
            }
        }
        authors
    }

    /// Bundles whose name contains every whitespace-separated word of `query`,
    /// ignoring case.
    pub fn search(&self, query: &str) -> Vec<&BundleRecord> {
        let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if words.is_empty() {
            return Vec::new();
        }

        self.bundles
            .iter()
            .filter(|b| {
                let name = b.name.to_lowercase();
                words.iter().all(|w| name.contains(w.as_str()))
            })
            .collect()
    }

    /// Look up a script by file name.
    pub fn find_script(&self, file_name: &str) -> Option<&ScriptRecord> {
        self.scripts.iter().find(|s| s.file_name == file_name)
    }

    /// Insert a script at the end of the catalog.
    pub fn add_script(&mut self, record: ScriptRecord) -> Result<()> {
        if self.find_script(&record.file_name).is_some() {
            return Err(Error::duplicate_script(&record.file_name));
        }
        record.validate()?;

        self.scripts.push(record);
        Ok(())
    }

    /// Record a new version of an existing script.
    pub fn update_script(&mut self, file_name: &str, hash: &str, size: u64) -> Result<&ScriptRecord> {
        let index = self
            .scripts
            .iter()
            .position(|s| s.file_name == file_name)
            .ok_or_else(|| Error::script_not_found(file_name))?;

        let script = &mut self.scripts[index];
        if script.updates.iter().any(|h| h == hash) {
            return Err(Error::duplicate_update(file_name, hash));
        }
        script.hash = hash.to_string();
        script.size = size;
        script.updates.push(hash.to_string());
        Ok(&self.scripts[index])
    }

    /// Add the script if it is new, otherwise record a new version.
    pub fn upsert_script(&mut self, file_name: &str, hash: &str, size: u64) -> Result<ScriptChange> {
        if self.find_script(file_name).is_some() {
            self.update_script(file_name, hash, size)?;
            Ok(ScriptChange::Updated)
        } else {
            self.add_script(ScriptRecord::new(file_name, hash, size))?;
            Ok(ScriptChange::Created)
        }
    }
}
