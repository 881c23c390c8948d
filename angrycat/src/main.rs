mod output;

use angrycat_core::{
    AddBundle, BundleId, Config, ErrorKind, Project, ScriptChange, UpdateBundle, container,
    manifest, parts,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use output::{
    AuthorsOutput, BundleInfo, BundleOutput, BundleSummary, InitOutput, JoinOutput, OutputWriter,
    RehashOutput, RenameAuthorOutput, ScriptOutput, SearchOutput, SidecarInfo, SidecarOutput,
    SplitOutput, UnpackOutput,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// AngryCat - Level catalog maintenance for an AngryLevels repository
#[derive(Parser)]
#[command(name = "angrycat")]
#[command(about = "Maintain level and script catalogs with checksum sidecars", long_about = None)]
#[command(version)]
struct Cli {
    /// Project root (defaults to ANGRYCAT_ROOT env var or the nearest parent with LevelCatalog.json)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project with empty catalogs
    Init {
        /// Hash algorithm for sidecars and thumbnails
        #[arg(long, default_value = "md5")]
        algo: String,
    },

    /// Catalog a new bundle
    Add {
        /// Path to the .angry bundle
        bundle: PathBuf,

        /// Processed preview image
        #[arg(long)]
        thumbnail: PathBuf,

        /// Display name (defaults to the bundle's manifest)
        #[arg(long)]
        name: Option<String>,

        /// Author (defaults to the bundle's manifest)
        #[arg(long)]
        author: Option<String>,

        /// External download link; repeat for a bundle split into parts
        #[arg(long = "link")]
        links: Vec<String>,
    },

    /// Update a catalogued bundle
    Update {
        /// Bundle id, or the path of a bundle file whose manifest names it
        target: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        author: Option<String>,

        /// New build of the bundle
        #[arg(long)]
        bundle: Option<PathBuf>,

        /// Update message; `\n` starts a new line
        #[arg(short, long, default_value = "")]
        message: String,

        /// External download link; repeat for a bundle split into parts
        #[arg(long = "link")]
        links: Option<Vec<String>>,

        /// Processed preview image
        #[arg(long)]
        thumbnail: Option<PathBuf>,
    },

    /// Remove a bundle and its artifacts
    Delete {
        /// Bundle id
        id: String,
    },

    /// Show a bundle's record
    Show {
        /// Bundle id
        id: String,
    },

    /// List distinct authors
    Authors,

    /// Rename an author across every bundle
    RenameAuthor {
        old: String,
        new: String,
    },

    /// Add or update a script; `<path>.cert` must exist alongside
    Script {
        path: PathBuf,
    },

    /// Find bundles whose name contains every word
    Search {
        #[arg(required = true)]
        words: Vec<String>,
    },

    /// Rewrite both catalogs and their sidecars
    Save,

    /// Check both sidecars against their documents
    Verify,

    /// Recompute thumbnail hashes from installed thumbnails
    RehashThumbnails,

    /// Split a file into numbered parts
    Split {
        file: PathBuf,

        /// Bytes per part (defaults to the project's part_size)
        #[arg(long)]
        part_size: Option<u64>,

        /// Directory for the parts (defaults to the file's directory)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Replace parts left by an earlier split
        #[arg(short, long)]
        force: bool,
    },

    /// Join numbered parts back into one file
    Join {
        /// Path of the first part, or the base name
        input: PathBuf,

        /// Directory holding the parts when a base name is given
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Replace an existing output file
        #[arg(short, long)]
        force: bool,
    },

    /// Extract the entries of a legacy multi-bundle container
    UnpackLegacy {
        file: PathBuf,

        /// Directory for the entries (defaults to the file's directory)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = OutputWriter::new(cli.json);
    match run(cli, &output) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let code = result_code(&e);
            output.write_error(&e, code);
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

/// Map a failure onto its process result code.
fn result_code(error: &anyhow::Error) -> u8 {
    let kind = error
        .chain()
        .find_map(|e| e.downcast_ref::<angrycat_core::Error>())
        .map(angrycat_core::Error::kind);
    match kind {
        Some(ErrorKind::NotFound) => 2,
        Some(ErrorKind::Duplicate) => 3,
        Some(ErrorKind::Format) => 4,
        Some(ErrorKind::MissingPart) => 5,
        Some(ErrorKind::Io) => 6,
        None => 1,
    }
}

fn run(cli: Cli, output: &OutputWriter) -> Result<u8> {
    let root = cli.root;
    match cli.command {
        Commands::Init { algo } => cmd_init(root, &algo, output),
        Commands::Add {
            bundle,
            thumbnail,
            name,
            author,
            links,
        } => {
            let request = AddBundle {
                bundle,
                thumbnail,
                name,
                author,
                links,
            };
            cmd_add(&open_project(root)?, request, output)
        }
        Commands::Update {
            target,
            name,
            author,
            bundle,
            message,
            links,
            thumbnail,
        } => {
            let request = UpdateBundle {
                name,
                author,
                bundle,
                message,
                links,
                thumbnail,
            };
            cmd_update(&open_project(root)?, &target, request, output)
        }
        Commands::Delete { id } => cmd_delete(&open_project(root)?, &id, output),
        Commands::Show { id } => cmd_show(&open_project(root)?, &id, output),
        Commands::Authors => cmd_authors(&open_project(root)?, output),
        Commands::RenameAuthor { old, new } => {
            cmd_rename_author(&open_project(root)?, &old, &new, output)
        }
        Commands::Script { path } => cmd_script(&open_project(root)?, &path, output),
        Commands::Search { words } => cmd_search(&open_project(root)?, &words.join(" "), output),
        Commands::Save => cmd_save(&open_project(root)?, output),
        Commands::Verify => cmd_verify(&open_project(root)?, output),
        Commands::RehashThumbnails => cmd_rehash_thumbnails(&open_project(root)?, output),
        Commands::Split {
            file,
            part_size,
            out_dir,
            force,
        } => {
            let part_size = match part_size {
                Some(size) => size,
                None => configured_part_size(root)?,
            };
            cmd_split(&file, part_size, out_dir, force, output)
        }
        Commands::Join { input, dir, force } => cmd_join(&input, dir, force, output),
        Commands::UnpackLegacy { file, out_dir } => cmd_unpack_legacy(&file, out_dir, output),
    }
}

/// Resolve the project root: CLI arg > ANGRYCAT_ROOT env var > nearest parent with a catalog.
fn open_project(root: Option<PathBuf>) -> Result<Project> {
    let root = root.or_else(|| std::env::var("ANGRYCAT_ROOT").ok().map(PathBuf::from));
    match root {
        Some(root) => Project::open(&root)
            .with_context(|| format!("Failed to open project at {}", root.display())),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            Project::discover(&cwd).context("Failed to find project root")
        }
    }
}

/// Part size from the project config, or the default outside any project.
fn configured_part_size(root: Option<PathBuf>) -> Result<u64> {
    match open_project(root) {
        Ok(project) => Ok(project.config().part_size),
        Err(e) => {
            let no_project = e
                .chain()
                .filter_map(|c| c.downcast_ref::<angrycat_core::Error>())
                .any(|c| matches!(c, angrycat_core::Error::InvalidProject { .. }));
            if no_project {
                Ok(parts::DEFAULT_PART_SIZE)
            } else {
                Err(e)
            }
        }
    }
}

fn parse_id(id: &str) -> Result<BundleId> {
    BundleId::parse(id).with_context(|| format!("Invalid bundle id: {}", id))
}

fn cmd_init(root: Option<PathBuf>, algo: &str, output: &OutputWriter) -> Result<u8> {
    let root = match root.or_else(|| std::env::var("ANGRYCAT_ROOT").ok().map(PathBuf::from)) {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let config = Config {
        algorithm: angrycat_core::Algorithm::parse(algo)?,
        ..Config::default()
    };

    let project = Project::init(&root, config)
        .with_context(|| format!("Failed to initialize project at {}", root.display()))?;

    let data = InitOutput {
        success: true,
        result_code: 0,
        root: project.root().display().to_string(),
        algorithm: project.config().algorithm.as_str().to_string(),
    };
    output.write(&data, || {
        format!(
            "Initialized angrycat project at {}\nAlgorithm: {}\n",
            data.root, data.algorithm
        )
    })?;
    Ok(0)
}

fn write_bundle(output: &OutputWriter, data: &BundleOutput) -> Result<()> {
    output.write(data, || {
        let mut text = match (data.action, data.changed) {
            ("show", _) => String::new(),
            ("add", _) => format!("Added {}\n", data.bundle.id),
            (_, false) => "Nothing to update\n".to_string(),
            (_, true) => format!("Updated {}\n", data.bundle.id),
        };
        text.push_str(&data.bundle.to_text());
        text
    })
}

fn cmd_add(project: &Project, request: AddBundle, output: &OutputWriter) -> Result<u8> {
    let bundle_path = request.bundle.clone();
    let _lock = project.lock()?;
    let mut catalog = project.load()?;

    let record = project
        .add_bundle(&mut catalog, request)
        .with_context(|| format!("Failed to add bundle {}", bundle_path.display()))?;
    project.save(&catalog).context("Failed to save catalog")?;

    let data = BundleOutput {
        success: true,
        result_code: 0,
        action: "add",
        changed: true,
        bundle: BundleInfo::new(&record, &project.config().link_template),
    };
    write_bundle(output, &data)?;
    Ok(0)
}

fn cmd_update(
    project: &Project,
    target: &str,
    request: UpdateBundle,
    output: &OutputWriter,
) -> Result<u8> {
    // A new build only ever comes from --bundle
    let id = manifest::resolve_id(target)
        .with_context(|| format!("Failed to resolve bundle {}", target))?;

    let _lock = project.lock()?;
    let mut catalog = project.load()?;

    let updated = project
        .update_bundle(&mut catalog, &id, request)
        .with_context(|| format!("Failed to update bundle {}", id))?;
    let (record, changed) = match updated {
        Some(record) => {
            project.save(&catalog).context("Failed to save catalog")?;
            (record, true)
        }
        None => {
            let record = catalog
                .find(&id)
                .cloned()
                .ok_or_else(|| angrycat_core::Error::bundle_not_found(id.as_str()))?;
            (record, false)
        }
    };

    let data = BundleOutput {
        success: true,
        result_code: 0,
        action: "update",
        changed,
        bundle: BundleInfo::new(&record, &project.config().link_template),
    };
    write_bundle(output, &data)?;
    Ok(0)
}

fn cmd_delete(project: &Project, id: &str, output: &OutputWriter) -> Result<u8> {
    let id = parse_id(id)?;
    let _lock = project.lock()?;
    let mut catalog = project.load()?;

    let record = catalog
        .delete(&id)
        .with_context(|| format!("Failed to delete bundle {}", id))?;
    project.save(&catalog).context("Failed to save catalog")?;
    project
        .remove_level_dir(&id)
        .with_context(|| format!("Catalog saved but failed to remove artifacts of {}", id))?;

    let data = BundleOutput {
        success: true,
        result_code: 0,
        action: "delete",
        changed: true,
        bundle: BundleInfo::new(&record, &project.config().link_template),
    };
    output.write(&data, || format!("Deleted {} ({})\n", data.bundle.id, data.bundle.name))?;
    Ok(0)
}

fn cmd_show(project: &Project, id: &str, output: &OutputWriter) -> Result<u8> {
    let id = parse_id(id)?;
    let catalog = project.load()?;
    let record = catalog
        .find(&id)
        .ok_or_else(|| angrycat_core::Error::bundle_not_found(id.as_str()))?;

    let data = BundleOutput {
        success: true,
        result_code: 0,
        action: "show",
        changed: false,
        bundle: BundleInfo::new(record, &project.config().link_template),
    };
    write_bundle(output, &data)?;
    Ok(0)
}

fn cmd_authors(project: &Project, output: &OutputWriter) -> Result<u8> {
    let catalog = project.load()?;

    let data = AuthorsOutput {
        success: true,
        result_code: 0,
        authors: catalog.authors().into_iter().map(str::to_string).collect(),
    };
    output.write(&data, || {
        if data.authors.is_empty() {
            "No authors\n".to_string()
        } else {
            data.authors.iter().map(|a| format!("{}\n", a)).collect()
        }
    })?;
    Ok(0)
}

fn cmd_rename_author(project: &Project, old: &str, new: &str, output: &OutputWriter) -> Result<u8> {
    let _lock = project.lock()?;
    let mut catalog = project.load()?;

    let records = catalog
        .rename_author(old, new)
        .with_context(|| format!("Failed to rename author {:?}", old))?;
    project.save(&catalog).context("Failed to save catalog")?;

    let data = RenameAuthorOutput {
        success: true,
        result_code: 0,
        old: old.to_string(),
        new: new.to_string(),
        records,
    };
    output.write(&data, || {
        format!("Renamed {:?} to {:?} in {} bundles\n", data.old, data.new, data.records)
    })?;
    Ok(0)
}

fn cmd_script(project: &Project, path: &Path, output: &OutputWriter) -> Result<u8> {
    let _lock = project.lock()?;
    let mut catalog = project.load()?;

    let (change, record) = project
        .upsert_script(&mut catalog, path)
        .with_context(|| format!("Failed to catalog script {}", path.display()))?;
    project.save(&catalog).context("Failed to save catalog")?;

    let data = ScriptOutput {
        success: true,
        result_code: 0,
        created: change == ScriptChange::Created,
        file_name: record.file_name.clone(),
        hash: record.hash.clone(),
        size: record.size,
        versions: record.updates.len(),
    };
    output.write(&data, || {
        let verb = if data.created { "Added" } else { "Updated" };
        format!(
            "{} script {} ({} bytes, version {})\n{}\n",
            verb, data.file_name, data.size, data.versions, data.hash
        )
    })?;
    Ok(0)
}

fn cmd_search(project: &Project, query: &str, output: &OutputWriter) -> Result<u8> {
    let catalog = project.load()?;

    let data = SearchOutput {
        success: true,
        result_code: 0,
        query: query.to_string(),
        results: catalog
            .search(query)
            .into_iter()
            .map(|b| BundleSummary {
                id: b.id.to_string(),
                name: b.name.clone(),
                author: b.author.clone(),
            })
            .collect(),
    };
    output.write(&data, || {
        if data.results.is_empty() {
            format!("No bundles match {:?}\n", data.query)
        } else {
            data.results
                .iter()
                .map(|b| format!("{} {} by {}\n", b.id, b.name, b.author))
                .collect()
        }
    })?;
    Ok(0)
}

fn sidecar_text(data: &SidecarOutput) -> String {
    data.documents
        .iter()
        .map(|d| {
            let status = if d.valid { "ok" } else { "MISMATCH" };
            format!(
                "{} {} {} (recorded {})\n",
                status,
                d.document,
                d.actual,
                d.recorded.as_deref().unwrap_or("none")
            )
        })
        .collect()
}

fn cmd_save(project: &Project, output: &OutputWriter) -> Result<u8> {
    let _lock = project.lock()?;
    let catalog = project.load()?;
    project.save(&catalog).context("Failed to save catalog")?;

    let verification = project.store().verify()?;
    let data = SidecarOutput {
        success: true,
        result_code: 0,
        documents: vec![
            SidecarInfo::from(&verification.levels),
            SidecarInfo::from(&verification.scripts),
        ],
    };
    output.write(&data, || sidecar_text(&data))?;
    Ok(0)
}

fn cmd_verify(project: &Project, output: &OutputWriter) -> Result<u8> {
    let verification = project
        .store()
        .verify()
        .context("Failed to read catalog documents")?;

    let valid = verification.is_valid();
    let result_code = if valid { 0 } else { 4 };
    let data = SidecarOutput {
        success: valid,
        result_code,
        documents: vec![
            SidecarInfo::from(&verification.levels),
            SidecarInfo::from(&verification.scripts),
        ],
    };
    output.write(&data, || sidecar_text(&data))?;
    Ok(result_code)
}

fn cmd_rehash_thumbnails(project: &Project, output: &OutputWriter) -> Result<u8> {
    let _lock = project.lock()?;
    let mut catalog = project.load()?;

    let changed = project
        .rehash_thumbnails(&mut catalog)
        .context("Failed to rehash thumbnails")?;
    if changed > 0 {
        project.save(&catalog).context("Failed to save catalog")?;
    }

    let data = RehashOutput {
        success: true,
        result_code: 0,
        bundles: catalog.bundles().len(),
        changed,
    };
    output.write(&data, || {
        format!("Rehashed {} bundles, {} changed\n", data.bundles, data.changed)
    })?;
    Ok(0)
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn cmd_split(
    file: &Path,
    part_size: u64,
    out_dir: Option<PathBuf>,
    force: bool,
    output: &OutputWriter,
) -> Result<u8> {
    let out_dir = out_dir.unwrap_or_else(|| parent_dir(file));
    let written = parts::split_file(file, &out_dir, part_size, force)
        .with_context(|| format!("Failed to split {}", file.display()))?;

    let data = SplitOutput {
        success: true,
        result_code: 0,
        source: file.display().to_string(),
        part_size,
        parts: written.iter().map(|p| p.display().to_string()).collect(),
    };
    output.write(&data, || {
        let mut text = format!("Split {} into {} parts\n", data.source, data.parts.len());
        for part in &data.parts {
            text.push_str(&format!("{}\n", part));
        }
        text
    })?;
    Ok(0)
}

fn cmd_join(input: &Path, dir: Option<PathBuf>, force: bool, output: &OutputWriter) -> Result<u8> {
    let dir = match dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let (base, dir) = parts::resolve_join_target(input, &dir)?;
    let outcome = parts::join(&base, &dir, force)
        .with_context(|| format!("Failed to join parts of {}", base))?;

    let data = JoinOutput {
        success: true,
        result_code: 0,
        output: outcome.output.display().to_string(),
        parts: outcome.parts,
        bytes: outcome.bytes,
    };
    output.write(&data, || {
        format!(
            "Joined {} parts into {} ({} bytes)\n",
            data.parts, data.output, data.bytes
        )
    })?;
    Ok(0)
}

fn cmd_unpack_legacy(file: &Path, out_dir: Option<PathBuf>, output: &OutputWriter) -> Result<u8> {
    let out_dir = out_dir.unwrap_or_else(|| parent_dir(file));
    let entries = container::unpack_file(file, &out_dir)
        .with_context(|| format!("Failed to unpack {}", file.display()))?;

    let data = UnpackOutput {
        success: true,
        result_code: 0,
        source: file.display().to_string(),
        entries: entries.iter().map(|p| p.display().to_string()).collect(),
    };
    output.write(&data, || {
        let mut text = format!("Extracted {} entries\n", data.entries.len());
        for entry in &data.entries {
            text.push_str(&format!("{}\n", entry));
        }
        text
    })?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_result_code_from_core_error() {
        let err = anyhow::Error::from(angrycat_core::Error::missing_part("castle", 2))
            .context("Failed to join parts of castle");
        assert_eq!(result_code(&err), 5);

        let err = anyhow::Error::from(angrycat_core::Error::bundle_not_found("x"));
        assert_eq!(result_code(&err), 2);

        assert_eq!(result_code(&anyhow::anyhow!("plain")), 1);
    }

    #[test]
    fn test_update_links_are_repeatable() {
        let cli = Cli::parse_from([
            "angrycat", "update", "abc", "--link", "https://a/1", "--link", "https://a/2",
        ]);
        match cli.command {
            Commands::Update { links, .. } => {
                assert_eq!(
                    links,
                    Some(vec!["https://a/1".to_string(), "https://a/2".to_string()])
                );
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn test_configured_part_size() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        assert_eq!(
            configured_part_size(Some(root.clone())).unwrap(),
            parts::DEFAULT_PART_SIZE
        );

        std::fs::write(root.join("LevelCatalog.json"), "{\"Levels\": []}").unwrap();
        std::fs::write(root.join("angrycat.conf"), "version=1\npart_size=1024\n").unwrap();
        assert_eq!(configured_part_size(Some(root.clone())).unwrap(), 1024);

        std::fs::write(root.join("angrycat.conf"), "version=1\npart_size=zero\n").unwrap();
        let err = configured_part_size(Some(root)).unwrap_err();
        assert_eq!(result_code(&err), 4);
    }

    #[test]
    fn test_split_force_flag() {
        let cli = Cli::parse_from(["angrycat", "split", "big.angry", "--force"]);
        assert!(matches!(cli.command, Commands::Split { force: true, .. }));
    }

    #[test]
    fn test_verbose_counts() {
        let cli = Cli::parse_from(["angrycat", "-vv", "authors"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.json);
    }
}
