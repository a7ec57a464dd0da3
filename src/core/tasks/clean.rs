use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::{target_config, TaskOutcome};
use crate::error::{Error, Result};
use crate::project::Project;
use crate::utils::io;

/// One pattern or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Patterns {
    One(String),
    Many(Vec<String>),
}

impl Patterns {
    pub(crate) fn into_vec(self) -> Vec<String> {
        match self {
            Patterns::One(p) => vec![p],
            Patterns::Many(list) => list,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum CleanTarget {
    Patterns(Patterns),
    Spec { src: Patterns },
}

#[derive(Debug, Serialize)]
struct CleanReport {
    removed: Vec<String>,
}

pub(super) fn run(project: &Project, target: &str) -> Result<TaskOutcome> {
    let patterns = match target_config::<CleanTarget>(&project.config, "clean", target)? {
        CleanTarget::Patterns(p) | CleanTarget::Spec { src: p } => p.into_vec(),
    };

    let removed = clean(&project.layout.root, &patterns)?;
    TaskOutcome::message(format!("Removed {} path(s)", removed.len())).with_data(&CleanReport {
        removed: removed.iter().map(|p| p.display().to_string()).collect(),
    })
}

/// Delete everything matching `patterns` below `root`.
pub(crate) fn clean(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let root_canonical = fs::canonicalize(root)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("resolve {}", root.display()))))?;

    let mut removed = Vec::new();
    for path in expand_globs(root, patterns)? {
        let canonical = match fs::canonicalize(&path) {
            Ok(p) => p,
            // Removed together with an earlier match.
            Err(_) => continue,
        };
        if canonical == root_canonical || !canonical.starts_with(&root_canonical) {
            return Err(Error::validation_invalid_argument(
                "clean",
                format!("Refusing to delete {} outside the project directory", path.display()),
                None,
            ));
        }

        if io::remove_path(&path, "clean")? {
            removed.push(path.strip_prefix(root).map(Path::to_path_buf).unwrap_or(path));
        }
    }
    Ok(removed)
}

/// Expand glob `patterns` relative to `base`, in pattern order.
pub(crate) fn expand_globs(base: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut matches = Vec::new();
    for pattern in patterns {
        let full = Path::new(&glob::Pattern::escape(&base.to_string_lossy())).join(pattern);
        let paths = glob::glob(&full.to_string_lossy()).map_err(|e| {
            Error::config_invalid_value("pattern", Some(pattern.clone()), e.to_string())
        })?;
        for entry in paths {
            let path = entry.map_err(|e| Error::internal_io(e.to_string(), Some(format!("glob {}", pattern))))?;
            if !matches.contains(&path) {
                matches.push(path);
            }
        }
    }
    Ok(matches)
}
