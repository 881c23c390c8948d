//! Output formatting for CLI commands.
//!
//! Provides abstraction layer for outputting results in text or JSON format.

use anyhow::Result;
use angrycat_core::{BundleRecord, SidecarCheck};
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Write output using the configured format.
    ///
    /// The `data` parameter must be a serializable struct that includes
    /// `success: bool` and `result_code: u8` fields.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    /// In text mode, writes the error chain directly.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

/// Format a unix timestamp for humans.
pub fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init` command.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: String,
    pub algorithm: String,
}

/// One entry of a bundle's update log.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateInfo {
    pub hash: String,
    pub message: String,
}

/// Full view of a catalogued bundle.
#[derive(Debug, Clone, Serialize)]
pub struct BundleInfo {
    pub id: String,
    pub name: String,
    pub author: String,
    pub size: u64,
    pub build_hash: String,
    pub thumbnail_hash: String,
    pub hosted: bool,
    pub parts: Vec<String>,
    pub last_update: i64,
    pub updates: Vec<UpdateInfo>,
}

impl BundleInfo {
    pub fn new(record: &BundleRecord, link_template: &str) -> Self {
        Self {
            id: record.id.to_string(),
            name: record.name.clone(),
            author: record.author.clone(),
            size: record.size,
            build_hash: record.build_hash.clone(),
            thumbnail_hash: record.thumbnail_hash.clone(),
            hosted: record.is_hosted(link_template),
            parts: record.parts.clone(),
            last_update: record.last_update,
            updates: record
                .updates
                .iter()
                .map(|u| UpdateInfo {
                    hash: u.hash.clone(),
                    message: u.message.clone(),
                })
                .collect(),
        }
    }

    pub fn to_text(&self) -> String {
        let mut text = format!(
            "Id: {}\nName: {}\nAuthor: {}\nSize: {} bytes\nBuild: {}\nThumbnail: {}\nLast update: {}\n",
            self.id,
            self.name,
            self.author,
            self.size,
            self.build_hash,
            self.thumbnail_hash,
            format_timestamp(self.last_update),
        );
        if self.hosted {
            text.push_str("Hosted: yes\n");
        } else {
            for (i, part) in self.parts.iter().enumerate() {
                text.push_str(&format!("Part {}: {}\n", i + 1, part));
            }
        }
        text.push_str(&format!("Updates ({}):\n", self.updates.len()));
        for update in &self.updates {
            text.push_str(&format!("  {} {}\n", update.hash, update.message.replace('\n', " / ")));
        }
        text
    }
}

/// Output for `add`, `update`, `delete` and `show` commands.
#[derive(Debug, Serialize)]
pub struct BundleOutput {
    pub success: bool,
    pub result_code: u8,
    pub action: &'static str,
    /// False when an update request changed nothing.
    pub changed: bool,
    pub bundle: BundleInfo,
}

/// Output for `authors` command.
#[derive(Debug, Serialize)]
pub struct AuthorsOutput {
    pub success: bool,
    pub result_code: u8,
    pub authors: Vec<String>,
}

/// Output for `rename-author` command.
#[derive(Debug, Serialize)]
pub struct RenameAuthorOutput {
    pub success: bool,
    pub result_code: u8,
    pub old: String,
    pub new: String,
    pub records: usize,
}

/// Output for `script` command.
#[derive(Debug, Serialize)]
pub struct ScriptOutput {
    pub success: bool,
    pub result_code: u8,
    pub created: bool,
    pub file_name: String,
    pub hash: String,
    pub size: u64,
    pub versions: usize,
}

/// Short bundle view for search results.
#[derive(Debug, Clone, Serialize)]
pub struct BundleSummary {
    pub id: String,
    pub name: String,
    pub author: String,
}

/// Output for `search` command.
#[derive(Debug, Serialize)]
pub struct SearchOutput {
    pub success: bool,
    pub result_code: u8,
    pub query: String,
    pub results: Vec<BundleSummary>,
}

/// One document's sidecar comparison.
#[derive(Debug, Clone, Serialize)]
pub struct SidecarInfo {
    pub document: String,
    pub actual: String,
    pub recorded: Option<String>,
    pub valid: bool,
}

impl From<&SidecarCheck> for SidecarInfo {
    fn from(check: &SidecarCheck) -> Self {
        Self {
            document: check.document.display().to_string(),
            actual: check.actual.to_hex(),
            recorded: check.recorded.clone(),
            valid: check.is_valid(),
        }
    }
}

/// Output for `save` and `verify` commands.
#[derive(Debug, Serialize)]
pub struct SidecarOutput {
    pub success: bool,
    pub result_code: u8,
    pub documents: Vec<SidecarInfo>,
}

/// Output for `rehash-thumbnails` command.
#[derive(Debug, Serialize)]
pub struct RehashOutput {
    pub success: bool,
    pub result_code: u8,
    pub bundles: usize,
    pub changed: usize,
}

/// Output for `split` command.
#[derive(Debug, Serialize)]
pub struct SplitOutput {
    pub success: bool,
    pub result_code: u8,
    pub source: String,
    pub part_size: u64,
    pub parts: Vec<String>,
}

/// Output for `join` command.
#[derive(Debug, Serialize)]
pub struct JoinOutput {
    pub success: bool,
    pub result_code: u8,
    pub output: String,
    pub parts: u32,
    pub bytes: u64,
}

/// Output for `unpack-legacy` command.
#[derive(Debug, Serialize)]
pub struct UnpackOutput {
    pub success: bool,
    pub result_code: u8,
    pub source: String,
    pub entries: Vec<String>,
}
