//! # AngryCat Core
//!
//! Catalog management for a repository of community level bundles.
//!
//! This library maintains the level and script catalogs that clients poll,
//! together with content-addressed checksum sidecars so a client can tell
//! whether its cached copy is stale without downloading the catalog.
//!
//! ## Features
//!
//! - Level and script catalogs with per-bundle update logs
//! - Checksum sidecars written atomically alongside each document
//! - Hosted or externally linked bundle artifacts, optionally split into parts
//! - Splitting and joining of `X.angry1..N` part files
//! - Extraction of the legacy multi-bundle container format
//!
//! ## Example
//!
//! ```no_run
//! use angrycat_core::{AddBundle, Project};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let project = Project::discover(&std::env::current_dir()?)?;
//! let _lock = project.lock()?;
//!
//! let mut catalog = project.load()?;
//! let record = project.add_bundle(
//!     &mut catalog,
//!     AddBundle {
//!         bundle: PathBuf::from("castle.angry"),
//!         thumbnail: PathBuf::from("castle.png"),
//!         ..AddBundle::default()
//!     },
//! )?;
//! project.save(&catalog)?;
//!
//! println!("Added {} ({})", record.name, record.id);
//! # Ok(())
//! # }
//! ```

mod catalog;
pub mod container;
mod error;
mod hash;
pub mod manifest;
pub mod parts;
mod project;
mod registry;
mod store;

pub use catalog::{
    BundleId, BundleRecord, Catalog, INITIAL_UPDATE_MESSAGE, Links, NewBundle, ScriptRecord,
    UpdateEntry, hosted_link,
};
pub use error::{Error, ErrorKind, Result};
pub use hash::{Algorithm, DIGEST_SIZE, Digest};
pub use manifest::{BundleManifest, InspectedBundle};
pub use parts::JoinOutcome;
pub use project::{
    AddBundle, Config, DEFAULT_LINK_TEMPLATE, Project, ProjectLock, UpdateBundle,
};
pub use registry::{BuildChange, BundleMutation, ScriptChange};
pub use store::{CatalogStore, SidecarCheck, Verification};
