//! Project layout, configuration, locking and artifact management.
//!
//! A project root holds the catalog documents plus:
//! - `angrycat.conf` (optional) with version, algorithm, part size and link template
//! - `Levels/<id>/` with `thumbnail.png` and, for hosted bundles, `level.angry`
//! - `Scripts/` with each script and its `.cert` file
//! - `.angrycat.lock` while an operator holds the project

use crate::catalog::{BundleId, BundleRecord, Catalog, Links, NewBundle, ScriptRecord};
use crate::error::{Error, Result};
use crate::hash::{Algorithm, Digest};
use crate::manifest;
use crate::parts::DEFAULT_PART_SIZE;
use crate::registry::{BuildChange, BundleMutation, ScriptChange};
use crate::store::{CatalogStore, LEVEL_CATALOG};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the optional project config file.
pub const CONFIG_FILE: &str = "angrycat.conf";
/// Name of the advisory lock file.
pub const LOCK_FILE: &str = ".angrycat.lock";
/// Directory holding one subdirectory per bundle.
pub const LEVELS_DIR: &str = "Levels";
/// Directory holding scripts and their certificates.
pub const SCRIPTS_DIR: &str = "Scripts";
/// File name of a hosted bundle artifact.
pub const HOSTED_ARTIFACT: &str = "level.angry";
/// File name of a bundle thumbnail.
pub const THUMBNAIL: &str = "thumbnail.png";
/// Extension appended to a script's file name for its certificate.
pub const CERT_EXTENSION: &str = "cert";

/// Default template for hosted bundle links.
pub const DEFAULT_LINK_TEMPLATE: &str =
    "https://raw.githubusercontent.com/eternalUnion/AngryLevels/release/Levels/{id}/level.angry";

/// Project configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub algorithm: Algorithm,
    pub part_size: u64,
    /// Hosted link with `{id}` standing for the bundle id.
    pub link_template: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            part_size: DEFAULT_PART_SIZE,
            link_template: DEFAULT_LINK_TEMPLATE.to_string(),
        }
    }
}

impl Config {
    /// Read `angrycat.conf` from `root`, falling back to defaults if absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        Self::parse(&content).map_err(|reason| Error::invalid_config(&path, reason))
    }

    /// Parse `key=value` lines; `#` starts a comment line.
    fn parse(content: &str) -> std::result::Result<Self, String> {
        let mut config = Self::default();
        let mut version = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(format!("Expected key=value, got {:?}", line));
            };
            let value = value.trim();
            match key.trim() {
                "version" => version = Some(value.to_string()),
                "algo" => {
                    config.algorithm = Algorithm::parse(value).map_err(|e| e.to_string())?;
                }
                "part_size" => {
                    let size: u64 = value
                        .parse()
                        .map_err(|_| format!("Invalid part_size: {:?}", value))?;
                    if size == 0 {
                        return Err("part_size must be positive".to_string());
                    }
                    config.part_size = size;
                }
                "link_template" => {
                    if !value.contains("{id}") {
                        return Err(format!("link_template lacks {{id}}: {:?}", value));
                    }
                    config.link_template = value.to_string();
                }
                _ => {}
            }
        }

        if version.as_deref() != Some("1") {
            return Err(format!("Unsupported config version: {:?}", version));
        }
        Ok(config)
    }

    fn to_file_string(&self) -> String {
        format!(
            "version=1\nalgo={}\npart_size={}\nlink_template={}\n",
            self.algorithm.as_str(),
            self.part_size,
            self.link_template
        )
    }
}

/// Exclusive hold on a project for one load-mutate-save cycle.
///
/// The lock file is removed when this is dropped.
#[derive(Debug)]
pub struct ProjectLock {
    path: PathBuf,
}

impl ProjectLock {
    fn acquire(path: PathBuf) -> Result<Self> {
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::locked(path));
            }
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), "project lock acquired");
        let lock = Self { path };
        writeln!(file, "{}", std::process::id())?;
        Ok(lock)
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove project lock");
        }
    }
}

/// Operator input for adding a bundle.
#[derive(Debug, Clone, Default)]
pub struct AddBundle {
    pub bundle: PathBuf,
    /// Already processed preview image.
    pub thumbnail: PathBuf,
    /// Overrides the manifest's name.
    pub name: Option<String>,
    /// Overrides the manifest's author.
    pub author: Option<String>,
    /// Explicit download locations; empty means hosted here.
    pub links: Vec<String>,
}

/// Operator input for updating a bundle. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct UpdateBundle {
    pub name: Option<String>,
    pub author: Option<String>,
    /// New build; its manifest must declare the same id.
    pub bundle: Option<PathBuf>,
    pub message: String,
    /// New download locations. With a new build, `None` or empty means hosted.
    pub links: Option<Vec<String>>,
    /// Already processed preview image.
    pub thumbnail: Option<PathBuf>,
}

/// A catalog project rooted at a directory.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    config: Config,
    store: CatalogStore,
}

impl Project {
    /// Open the project at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.join(LEVEL_CATALOG).exists() {
            return Err(Error::invalid_project(&root, "LevelCatalog.json not found"));
        }
        let config = Config::load(&root)?;
        let store = CatalogStore::new(&root, config.algorithm);
        Ok(Self {
            root,
            config,
            store,
        })
    }

    /// Open the nearest ancestor of `start` holding a level catalog.
    pub fn discover(start: &Path) -> Result<Self> {
        for dir in start.ancestors() {
            if dir.join(LEVEL_CATALOG).is_file() {
                tracing::debug!(root = %dir.display(), "discovered project root");
                return Self::open(dir);
            }
        }
        Err(Error::invalid_project(start, "no LevelCatalog.json in any parent directory"))
    }

    /// Create a new project with empty catalogs.
    pub fn init<P: AsRef<Path>>(root: P, config: Config) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(LEVELS_DIR))?;
        fs::create_dir_all(root.join(SCRIPTS_DIR))?;

        let store = CatalogStore::new(&root, config.algorithm);
        store.init()?;

        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            fs::write(&config_path, config.to_file_string())?;
        }

        tracing::info!(root = %root.display(), algo = config.algorithm.as_str(), "project initialized");
        Ok(Self {
            root,
            config,
            store,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Take the advisory lock for a load-mutate-save cycle.
    pub fn lock(&self) -> Result<ProjectLock> {
        ProjectLock::acquire(self.root.join(LOCK_FILE))
    }

    pub fn load(&self) -> Result<Catalog> {
        self.store.load()
    }

    pub fn save(&self, catalog: &Catalog) -> Result<()> {
        self.store.save(catalog)
    }

    /// Directory holding a bundle's artifacts.
    pub fn level_dir(&self, id: &BundleId) -> PathBuf {
        self.root.join(LEVELS_DIR).join(id.as_str())
    }

    pub fn hosted_artifact_path(&self, id: &BundleId) -> PathBuf {
        self.level_dir(id).join(HOSTED_ARTIFACT)
    }

    pub fn thumbnail_path(&self, id: &BundleId) -> PathBuf {
        self.level_dir(id).join(THUMBNAIL)
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join(SCRIPTS_DIR)
    }

    /// Catalog a new bundle and install its artifacts.
    ///
    /// On error the catalog is unchanged and any directory created for the
    /// bundle is removed.
    pub fn add_bundle(&self, catalog: &mut Catalog, request: AddBundle) -> Result<BundleRecord> {
        let inspected = manifest::inspect(&request.bundle)?;
        if catalog.find(&inspected.id).is_some() {
            return Err(Error::duplicate_bundle(inspected.id.as_str()));
        }
        if !request.thumbnail.is_file() {
            return Err(Error::file_not_found(&request.thumbnail));
        }
        let thumbnail_hash = Digest::compute_file(self.config.algorithm, &request.thumbnail)?;

        let bundle = NewBundle {
            id: inspected.id.clone(),
            name: request
                .name
                .unwrap_or_else(|| inspected.manifest.name().to_string()),
            author: request
                .author
                .unwrap_or_else(|| inspected.manifest.author().to_string()),
            build_hash: inspected.manifest.build_hash().to_string(),
            thumbnail_hash: thumbnail_hash.to_hex(),
            size: inspected.size,
        };
        let links = Links::from_links(request.links);
        let now = chrono::Utc::now().timestamp();
        let record = BundleRecord::new(bundle, &links, &self.config.link_template, now)?;
        record.validate()?;

        let dir = self.level_dir(&record.id);
        let created_dir = !dir.exists();
        let installed = self.install_bundle_files(
            &record.id,
            &request.thumbnail,
            (links == Links::Hosted).then_some(request.bundle.as_path()),
        );
        if let Err(e) = installed {
            if created_dir {
                let _ = fs::remove_dir_all(&dir);
            }
            return Err(e);
        }

        catalog.add(record.clone())?;
        tracing::info!(id = %record.id, name = %record.name, "bundle catalogued");
        Ok(record)
    }

    fn install_bundle_files(
        &self,
        id: &BundleId,
        thumbnail: &Path,
        hosted_bundle: Option<&Path>,
    ) -> Result<()> {
        fs::create_dir_all(self.level_dir(id))?;
        copy_atomic(thumbnail, &self.thumbnail_path(id))?;
        if let Some(bundle) = hosted_bundle {
            copy_atomic(bundle, &self.hosted_artifact_path(id))?;
        }
        Ok(())
    }

    /// Apply operator changes to a bundle and its artifacts.
    ///
    /// Returns `None` if the request changes nothing. On error the catalog is
    /// unchanged.
    pub fn update_bundle(
        &self,
        catalog: &mut Catalog,
        id: &BundleId,
        request: UpdateBundle,
    ) -> Result<Option<BundleRecord>> {
        if catalog.find(id).is_none() {
            return Err(Error::bundle_not_found(id.as_str()));
        }

        let mut mutation = BundleMutation {
            name: request.name.filter(|n| !n.is_empty()),
            author: request.author.filter(|a| !a.is_empty()),
            ..BundleMutation::default()
        };

        if let Some(bundle) = &request.bundle {
            let inspected = manifest::inspect(bundle)?;
            if &inspected.id != id {
                return Err(Error::id_mismatch(id.as_str(), inspected.id.as_str()));
            }
            mutation.build = Some(BuildChange {
                hash: inspected.manifest.build_hash().to_string(),
                size: inspected.size,
                message: request.message.replace("\\n", "\n"),
            });
            mutation.links = Some(Links::from_links(request.links.clone().unwrap_or_default()));
        } else if let Some(links) = &request.links {
            if let Links::External(urls) = Links::from_links(links.clone()) {
                mutation.links = Some(Links::External(urls));
            }
        }

        if let Some(thumbnail) = &request.thumbnail {
            if !thumbnail.is_file() {
                return Err(Error::file_not_found(thumbnail));
            }
            let digest = Digest::compute_file(self.config.algorithm, thumbnail)?;
            mutation.thumbnail_hash = Some(digest.to_hex());
        }

        if mutation.is_empty() {
            return Ok(None);
        }

        let mut staged = catalog.clone();
        let record = staged
            .update(id, mutation.clone(), &self.config.link_template)?
            .clone();

        // Every copy is staged before any artifact is replaced or removed
        fs::create_dir_all(self.level_dir(id))?;
        let mut copies = Vec::new();
        if let Some(thumbnail) = &request.thumbnail {
            copies.push(StagedCopy::new(thumbnail, &self.thumbnail_path(id))?);
        }
        if let (Some(Links::Hosted), Some(bundle)) = (&mutation.links, &request.bundle) {
            copies.push(StagedCopy::new(bundle, &self.hosted_artifact_path(id))?);
        }
        for copy in copies {
            copy.commit()?;
        }
        if let Some(Links::External(_)) = &mutation.links {
            self.remove_hosted_artifact(id)?;
        }

        *catalog = staged;
        tracing::info!(id = %id, "bundle updated");
        Ok(Some(record))
    }

    fn remove_hosted_artifact(&self, id: &BundleId) -> Result<()> {
        let path = self.hosted_artifact_path(id);
        if path.exists() {
            fs::remove_file(&path)?;
            tracing::debug!(path = %path.display(), "removed hosted artifact");
        }
        Ok(())
    }

    /// Remove a deleted bundle's artifact directory.
    pub fn remove_level_dir(&self, id: &BundleId) -> Result<()> {
        let dir = self.level_dir(id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        } else {
            tracing::warn!(dir = %dir.display(), "bundle directory already absent");
        }
        Ok(())
    }

    /// Catalog a script from `path` and copy it with its certificate.
    pub fn upsert_script(
        &self,
        catalog: &mut Catalog,
        path: &Path,
    ) -> Result<(ScriptChange, ScriptRecord)> {
        if !path.is_file() {
            return Err(Error::file_not_found(path));
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::file_not_found(path))?
            .to_string();
        let cert = path.with_file_name(format!("{}.{}", file_name, CERT_EXTENSION));
        if !cert.is_file() {
            return Err(Error::file_not_found(cert));
        }

        let bytes = fs::read(path)?;
        let hash = Digest::compute(self.config.algorithm, &bytes).to_hex();

        let mut staged = catalog.clone();
        let change = staged.upsert_script(&file_name, &hash, bytes.len() as u64)?;

        let scripts_dir = self.scripts_dir();
        fs::create_dir_all(&scripts_dir)?;
        let script_copy = StagedCopy::new(path, &scripts_dir.join(&file_name))?;
        let cert_copy = StagedCopy::new(
            &cert,
            &scripts_dir.join(format!("{}.{}", file_name, CERT_EXTENSION)),
        )?;
        script_copy.commit()?;
        cert_copy.commit()?;

        *catalog = staged;
        let record = catalog
            .find_script(&file_name)
            .cloned()
            .ok_or_else(|| Error::script_not_found(&file_name))?;
        tracing::info!(script = %file_name, change = ?change, "script catalogued");
        Ok((change, record))
    }

    /// Recompute every bundle's thumbnail hash from its installed thumbnail.
    ///
    /// Bundles without a thumbnail file are skipped. Returns the number of
    /// records whose hash changed.
    pub fn rehash_thumbnails(&self, catalog: &mut Catalog) -> Result<usize> {
        let ids: Vec<BundleId> = catalog.bundles().iter().map(|b| b.id.clone()).collect();
        let mut staged = catalog.clone();
        let mut changed = 0;

        for id in ids {
            let path = self.thumbnail_path(&id);
            if !path.is_file() {
                tracing::warn!(id = %id, "no thumbnail to hash");
                continue;
            }
            let digest = Digest::compute_file(self.config.algorithm, &path)?.to_hex();
            if staged.find(&id).is_some_and(|b| b.thumbnail_hash == digest) {
                continue;
            }

            let mutation = BundleMutation {
                thumbnail_hash: Some(digest),
                ..BundleMutation::default()
            };
            staged.update(&id, mutation, &self.config.link_template)?;
            changed += 1;
        }

        *catalog = staged;
        Ok(changed)
    }
}

/// A file copied into a temporary file next to its target, not yet in place.
///
/// Dropping it without `commit` removes the temporary file.
struct StagedCopy {
    temp_file: tempfile::NamedTempFile,
    target: PathBuf,
}

impl StagedCopy {
    fn new(source: &Path, target: &Path) -> Result<Self> {
        let dir = target
            .parent()
            .ok_or_else(|| Error::file_not_found(target))?;
        let mut reader = fs::File::open(source)?;
        let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
        std::io::copy(&mut reader, &mut temp_file)?;
        temp_file.flush()?;
        Ok(Self {
            temp_file,
            target: target.to_path_buf(),
        })
    }

    fn commit(self) -> Result<()> {
        self.temp_file.persist(&self.target)?;
        Ok(())
    }
}

/// Copy a file into place through a temporary file in the target directory.
fn copy_atomic(source: &Path, target: &Path) -> Result<()> {
    StagedCopy::new(source, target)?.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::tests::{manifest_json, write_bundle};
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        project: Project,
        inputs: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let project = Project::init(temp_dir.path().join("repo"), Config::default()).unwrap();
        let inputs = temp_dir.path().join("inputs");
        fs::create_dir_all(&inputs).unwrap();
        Fixture {
            _temp_dir: temp_dir,
            project,
            inputs,
        }
    }

    fn guid(pair: &str) -> String {
        pair.repeat(16)
    }

    fn make_bundle(dir: &Path, file: &str, guid: &str, build: &str) -> PathBuf {
        let path = dir.join(file);
        write_bundle(&path, &manifest_json(guid, build));
        path
    }

    fn make_thumbnail(dir: &Path, file: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(file);
        fs::write(&path, bytes).unwrap();
        path
    }

    fn add_request(fx: &Fixture, pair: &str) -> AddBundle {
        AddBundle {
            bundle: make_bundle(&fx.inputs, &format!("{}.angry", pair), &guid(pair), "b1"),
            thumbnail: make_thumbnail(&fx.inputs, "thumb.png", b"png-1"),
            ..AddBundle::default()
        }
    }

    #[test]
    fn test_config_parse() {
        let config = Config::parse(
            "# project\nversion=1\nalgo=blake3-128\npart_size=1024\nlink_template=https://h/{id}\nextra=ignored\n",
        )
        .unwrap();
        assert_eq!(config.algorithm, Algorithm::Blake3);
        assert_eq!(config.part_size, 1024);
        assert_eq!(config.link_template, "https://h/{id}");
    }

    #[test]
    fn test_config_parse_invalid() {
        assert!(Config::parse("algo=md5\n").is_err());
        assert!(Config::parse("version=2\n").is_err());
        assert!(Config::parse("version=1\npart_size=0\n").is_err());
        assert!(Config::parse("version=1\nlink_template=https://h/\n").is_err());
        assert!(Config::parse("version=1\nalgo=crc32\n").is_err());
        assert!(Config::parse("version=1\ngarbage\n").is_err());
    }

    #[test]
    fn test_config_file_roundtrip() {
        let config = Config {
            algorithm: Algorithm::Blake3,
            part_size: 77,
            link_template: "https://h/{id}/x".to_string(),
        };
        assert_eq!(Config::parse(&config.to_file_string()).unwrap(), config);
    }

    #[test]
    fn test_init_and_discover() {
        let fx = fixture();
        let nested = fx.project.root().join(LEVELS_DIR).join("deep");
        fs::create_dir_all(&nested).unwrap();

        let found = Project::discover(&nested).unwrap();
        assert_eq!(found.root(), fx.project.root());
        assert_eq!(found.config(), &Config::default());

        assert!(Project::discover(&fx.inputs).is_err());
        assert!(Project::open(&fx.inputs).is_err());
    }

    #[test]
    fn test_lock_is_exclusive() {
        let fx = fixture();
        let lock = fx.project.lock().unwrap();
        assert!(matches!(fx.project.lock(), Err(Error::Locked { .. })));

        drop(lock);
        assert!(!fx.project.root().join(LOCK_FILE).exists());
        fx.project.lock().unwrap();
    }

    #[test]
    fn test_add_bundle_hosted() {
        let fx = fixture();
        let mut catalog = fx.project.load().unwrap();

        let record = fx.project.add_bundle(&mut catalog, add_request(&fx, "ab")).unwrap();
        let id = BundleId::parse(&guid("ab")).unwrap();

        assert_eq!(record.name, "Castle");
        assert_eq!(record.author, "ann");
        assert_eq!(record.build_hash, "b1");
        assert_eq!(record.updates.len(), 1);
        assert_eq!(
            record.thumbnail_hash,
            Digest::compute(Algorithm::Md5, b"png-1").to_hex()
        );
        assert!(record.is_hosted(DEFAULT_LINK_TEMPLATE));
        assert!(fx.project.hosted_artifact_path(&id).is_file());
        assert_eq!(fs::read(fx.project.thumbnail_path(&id)).unwrap(), b"png-1");

        fx.project.save(&catalog).unwrap();
        assert_eq!(fx.project.load().unwrap(), catalog);
    }

    #[test]
    fn test_add_bundle_external_parts() {
        let fx = fixture();
        let mut catalog = fx.project.load().unwrap();

        let mut request = add_request(&fx, "cd");
        request.links = vec!["https://a/1".to_string(), "https://a/2".to_string()];
        request.name = Some("Override".to_string());
        let record = fx.project.add_bundle(&mut catalog, request).unwrap();

        assert_eq!(record.name, "Override");
        assert_eq!(record.parts.len(), 2);
        assert_eq!(record.external_link, "");
        assert!(!fx.project.hosted_artifact_path(&record.id).exists());
        assert!(fx.project.thumbnail_path(&record.id).is_file());
    }

    #[test]
    fn test_add_bundle_duplicate_and_missing_thumbnail() {
        let fx = fixture();
        let mut catalog = fx.project.load().unwrap();
        fx.project.add_bundle(&mut catalog, add_request(&fx, "ab")).unwrap();
        let before = catalog.clone();

        let err = fx
            .project
            .add_bundle(&mut catalog, add_request(&fx, "ab"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateBundle { .. }));
        assert_eq!(catalog, before);

        let mut request = add_request(&fx, "ef");
        request.thumbnail = fx.inputs.join("missing.png");
        let err = fx.project.add_bundle(&mut catalog, request).unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
        assert_eq!(catalog, before);
        assert!(!fx.project.level_dir(&BundleId::parse(&guid("ef")).unwrap()).exists());
    }

    #[test]
    fn test_update_bundle_new_build() {
        let fx = fixture();
        let mut catalog = fx.project.load().unwrap();
        fx.project.add_bundle(&mut catalog, add_request(&fx, "ab")).unwrap();
        let id = BundleId::parse(&guid("ab")).unwrap();

        let request = UpdateBundle {
            bundle: Some(make_bundle(&fx.inputs, "v2.angry", &guid("ab"), "b2")),
            message: "line one\\nline two".to_string(),
            ..UpdateBundle::default()
        };
        let record = fx
            .project
            .update_bundle(&mut catalog, &id, request)
            .unwrap()
            .unwrap();

        assert_eq!(record.build_hash, "b2");
        assert_eq!(record.updates[1].message, "line one\nline two");
        assert!(record.is_hosted(DEFAULT_LINK_TEMPLATE));

        let rejected = UpdateBundle {
            bundle: Some(make_bundle(&fx.inputs, "v2b.angry", &guid("ab"), "b2")),
            ..UpdateBundle::default()
        };
        let before = catalog.clone();
        let err = fx
            .project
            .update_bundle(&mut catalog, &id, rejected)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateUpdate { .. }));
        assert_eq!(catalog, before);
    }

    #[test]
    fn test_update_bundle_id_mismatch() {
        let fx = fixture();
        let mut catalog = fx.project.load().unwrap();
        fx.project.add_bundle(&mut catalog, add_request(&fx, "ab")).unwrap();
        let id = BundleId::parse(&guid("ab")).unwrap();

        let request = UpdateBundle {
            bundle: Some(make_bundle(&fx.inputs, "other.angry", &guid("cd"), "b2")),
            ..UpdateBundle::default()
        };
        assert!(matches!(
            fx.project.update_bundle(&mut catalog, &id, request),
            Err(Error::IdMismatch { .. })
        ));
    }

    #[test]
    fn test_update_bundle_external_links_remove_hosted_copy() {
        let fx = fixture();
        let mut catalog = fx.project.load().unwrap();
        fx.project.add_bundle(&mut catalog, add_request(&fx, "ab")).unwrap();
        let id = BundleId::parse(&guid("ab")).unwrap();
        assert!(fx.project.hosted_artifact_path(&id).exists());

        let request = UpdateBundle {
            links: Some(vec!["https://a/1".to_string(), "https://a/2".to_string()]),
            ..UpdateBundle::default()
        };
        let record = fx
            .project
            .update_bundle(&mut catalog, &id, request)
            .unwrap()
            .unwrap();
        assert_eq!(record.parts.len(), 2);
        assert!(record.external_link.is_empty());
        assert_eq!(record.updates.len(), 1);
        assert!(!fx.project.hosted_artifact_path(&id).exists());
    }

    #[test]
    fn test_update_metadata_by_bundle_path() {
        let fx = fixture();
        let mut catalog = fx.project.load().unwrap();
        let request = add_request(&fx, "ab");
        let bundle_path = request.bundle.clone();
        fx.project.add_bundle(&mut catalog, request).unwrap();

        let id = manifest::resolve_id(bundle_path.to_str().unwrap()).unwrap();
        let request = UpdateBundle {
            name: Some("Renamed".to_string()),
            ..UpdateBundle::default()
        };
        let record = fx
            .project
            .update_bundle(&mut catalog, &id, request)
            .unwrap()
            .unwrap();
        assert_eq!(record.name, "Renamed");
        assert_eq!(record.build_hash, "b1");
        assert_eq!(record.updates.len(), 1);
    }

    #[test]
    fn test_update_failure_leaves_artifacts_in_place() {
        let fx = fixture();
        let mut catalog = fx.project.load().unwrap();
        fx.project.add_bundle(&mut catalog, add_request(&fx, "ab")).unwrap();
        let id = BundleId::parse(&guid("ab")).unwrap();
        let hosted = fs::read(fx.project.hosted_artifact_path(&id)).unwrap();
        let before = catalog.clone();

        // A directory in place of the thumbnail makes the final rename fail
        let thumbnail_path = fx.project.thumbnail_path(&id);
        fs::remove_file(&thumbnail_path).unwrap();
        fs::create_dir(&thumbnail_path).unwrap();

        let request = UpdateBundle {
            links: Some(vec!["https://a/1".to_string()]),
            thumbnail: Some(make_thumbnail(&fx.inputs, "new.png", b"png-2")),
            ..UpdateBundle::default()
        };
        assert!(fx.project.update_bundle(&mut catalog, &id, request).is_err());

        assert_eq!(catalog, before);
        assert_eq!(fs::read(fx.project.hosted_artifact_path(&id)).unwrap(), hosted);
        let leftovers: Vec<_> = fs::read_dir(fx.project.level_dir(&id))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 2, "{:?}", leftovers);
    }

    #[test]
    fn test_update_bundle_nothing_to_change() {
        let fx = fixture();
        let mut catalog = fx.project.load().unwrap();
        fx.project.add_bundle(&mut catalog, add_request(&fx, "ab")).unwrap();
        let id = BundleId::parse(&guid("ab")).unwrap();

        let request = UpdateBundle {
            name: Some(String::new()),
            links: Some(Vec::new()),
            ..UpdateBundle::default()
        };
        assert_eq!(fx.project.update_bundle(&mut catalog, &id, request).unwrap(), None);
    }

    #[test]
    fn test_update_bundle_thumbnail() {
        let fx = fixture();
        let mut catalog = fx.project.load().unwrap();
        fx.project.add_bundle(&mut catalog, add_request(&fx, "ab")).unwrap();
        let id = BundleId::parse(&guid("ab")).unwrap();

        let request = UpdateBundle {
            thumbnail: Some(make_thumbnail(&fx.inputs, "new.png", b"png-2")),
            ..UpdateBundle::default()
        };
        let record = fx
            .project
            .update_bundle(&mut catalog, &id, request)
            .unwrap()
            .unwrap();
        assert_eq!(
            record.thumbnail_hash,
            Digest::compute(Algorithm::Md5, b"png-2").to_hex()
        );
        assert_eq!(fs::read(fx.project.thumbnail_path(&id)).unwrap(), b"png-2");
    }

    #[test]
    fn test_remove_level_dir() {
        let fx = fixture();
        let mut catalog = fx.project.load().unwrap();
        let record = fx.project.add_bundle(&mut catalog, add_request(&fx, "ab")).unwrap();

        catalog.delete(&record.id).unwrap();
        fx.project.remove_level_dir(&record.id).unwrap();
        assert!(!fx.project.level_dir(&record.id).exists());

        // A second removal is tolerated
        fx.project.remove_level_dir(&record.id).unwrap();
    }

    #[test]
    fn test_upsert_script() {
        let fx = fixture();
        let mut catalog = fx.project.load().unwrap();

        let script = fx.inputs.join("helper.dll");
        fs::write(&script, b"v1").unwrap();
        assert!(matches!(
            fx.project.upsert_script(&mut catalog, &script),
            Err(Error::FileNotFound { .. })
        ));

        fs::write(fx.inputs.join("helper.dll.cert"), b"cert").unwrap();
        let (change, record) = fx.project.upsert_script(&mut catalog, &script).unwrap();
        assert_eq!(change, ScriptChange::Created);
        assert_eq!(record.size, 2);
        assert!(fx.project.scripts_dir().join("helper.dll").is_file());
        assert!(fx.project.scripts_dir().join("helper.dll.cert").is_file());

        fs::write(&script, b"v2!").unwrap();
        let (change, record) = fx.project.upsert_script(&mut catalog, &script).unwrap();
        assert_eq!(change, ScriptChange::Updated);
        assert_eq!(record.updates.len(), 2);

        assert!(matches!(
            fx.project.upsert_script(&mut catalog, &script),
            Err(Error::DuplicateUpdate { .. })
        ));
    }

    #[test]
    fn test_rehash_thumbnails() {
        let fx = fixture();
        let mut catalog = fx.project.load().unwrap();
        let record = fx.project.add_bundle(&mut catalog, add_request(&fx, "ab")).unwrap();

        assert_eq!(fx.project.rehash_thumbnails(&mut catalog).unwrap(), 0);

        fs::write(fx.project.thumbnail_path(&record.id), b"edited").unwrap();
        assert_eq!(fx.project.rehash_thumbnails(&mut catalog).unwrap(), 1);
        assert_eq!(
            catalog.find(&record.id).unwrap().thumbnail_hash,
            Digest::compute(Algorithm::Md5, b"edited").to_hex()
        );
    }
}
