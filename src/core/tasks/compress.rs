//! Gzip-compressed tar archives built in-process.

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::clean::expand_globs;
use super::{target_config, TaskOutcome};
use crate::error::{Error, Result};
use crate::project::Project;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressConfig {
    /// Output file, relative to the project root.
    pub archive: String,
    /// Base directory for `src` patterns and archive entry names.
    #[serde(default = "default_cwd")]
    pub cwd: String,
    #[serde(default = "default_src")]
    pub src: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_cwd() -> String {
    ".".to_string()
}

fn default_src() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_level() -> u32 {
    6
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveReport {
    pub archive: String,
    pub files: u64,
    pub bytes: u64,
    pub sha256: String,
}

pub(super) fn run(project: &Project, target: &str) -> Result<TaskOutcome> {
    let config: CompressConfig = target_config(&project.config, "compress", target)?;
    let report = build_archive(&project.layout.root, &config)?;

    TaskOutcome::message(format!(
        "Packed {} file(s), {} bytes into {}",
        report.files, report.bytes, report.archive
    ))
    .with_data(&report)
}

/// Archive path configured for `compress.<target>`, if any.
pub(super) fn configured_archive(project: &Project, target: &str) -> Option<PathBuf> {
    project
        .config
        .section("compress")
        .and_then(|s| s.get(target))
        .and_then(|t| t.get("archive"))
        .and_then(|a| a.as_str())
        .map(|a| project.layout.resolve(a))
}

/// Build the archive described by `config` relative to `root`.
pub fn build_archive(root: &Path, config: &CompressConfig) -> Result<ArchiveReport> {
    let archive_path = resolve(root, &config.archive);
    let archive_name = archive_path.display().to_string();
    let cwd = resolve(root, &config.cwd);

    if config.level > 9 {
        return Err(Error::config_invalid_value(
            "compress.level",
            Some(config.level.to_string()),
            "must be between 0 and 9",
        ));
    }
    if !cwd.is_dir() {
        return Err(Error::archive_failed(
            &archive_name,
            format!("source directory {} does not exist", cwd.display()),
        ));
    }

    let entries = collect_entries(&cwd, config, &archive_path)?;
    if entries.is_empty() {
        return Err(Error::archive_failed(&archive_name, "no files matched the src patterns"));
    }

    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::archive_failed(&archive_name, e.to_string()))?;
    }

    let bytes = write_archive(&archive_path, &entries, config.level)
        .map_err(|e| Error::archive_failed(&archive_name, e.to_string()))?;
    let sha256 = digest(&archive_path).map_err(|e| Error::archive_failed(&archive_name, e.to_string()))?;

    Ok(ArchiveReport {
        archive: archive_name,
        files: entries.len() as u64,
        bytes,
        sha256,
    })
}

fn resolve(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Entry name -> file on disk, sorted by entry name.
fn collect_entries(cwd: &Path, config: &CompressConfig, archive: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let previous_archive = fs::canonicalize(archive).ok();
    let mut entries = BTreeMap::new();

    for matched in expand_globs(cwd, &config.src)? {
        for entry in WalkDir::new(&matched) {
            let entry = entry.map_err(|e| Error::internal_io(e.to_string(), Some(format!("walk {}", matched.display()))))?;
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = path.strip_prefix(cwd) else {
                continue;
            };
            let name = relative.to_string_lossy().replace('\\', "/");

            if should_exclude(&name, &config.exclude) {
                continue;
            }
            if previous_archive.is_some() && fs::canonicalize(path).ok() == previous_archive {
                continue;
            }

            entries.insert(name, path.to_path_buf());
        }
    }

    Ok(entries)
}

/// Exclusions match the relative entry name or the bare file name.
fn should_exclude(name: &str, patterns: &[String]) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    patterns
        .iter()
        .any(|p| glob_match::glob_match(p, name) || glob_match::glob_match(p, file_name))
}

fn write_archive(archive: &Path, entries: &BTreeMap<String, PathBuf>, level: u32) -> std::io::Result<u64> {
    let file = File::create(archive)?;
    let encoder = GzEncoder::new(file, Compression::new(level));
    let mut builder = tar::Builder::new(encoder);

    let mut bytes = 0;
    for (name, path) in entries {
        bytes += fs::metadata(path)?.len();
        builder.append_path_with_name(path, name)?;
    }

    builder.into_inner()?.finish()?;
    Ok(bytes)
}

fn digest(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
