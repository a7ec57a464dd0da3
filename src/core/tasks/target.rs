use std::fs;
use std::path::Path;

use super::TaskOutcome;
use crate::error::{Error, Result};
use crate::project::Project;
use crate::properties::ReservedKeys;

pub(super) fn run(project: &Project) -> Result<TaskOutcome> {
    let path = project
        .target_path()
        .ok_or_else(|| Error::config_missing_key(ReservedKeys::TARGET_PATH, Some("props".to_string())))?;

    if ensure_dir(&path)? {
        Ok(TaskOutcome::message(format!("Created {}", path.display())))
    } else {
        Ok(TaskOutcome::message(format!("{} already exists", path.display())))
    }
}

/// Create `path` unless it is already a directory. Returns whether it was created.
pub(crate) fn ensure_dir(path: &Path) -> Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    if path.exists() {
        return Err(Error::target_path_invalid(
            path.display().to_string(),
            "Target path exists, but is not a directory",
        ));
    }

    fs::create_dir_all(path).map_err(|e| {
        Error::target_path_invalid(
            path.display().to_string(),
            format!("Cannot create target path: {}", e),
        )
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::fixtures;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_directory_once() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("build/out");

        assert!(ensure_dir(&target).unwrap());
        assert!(target.is_dir());
        assert!(!ensure_dir(&target).unwrap());
    }

    #[test]
    fn file_in_the_way_is_an_error() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("dist");
        fs::write(&target, "not a dir").unwrap();

        let err = ensure_dir(&target).unwrap_err();
        assert_eq!(err.code.as_str(), "target.path_invalid");
    }

    #[test]
    fn task_requires_target_path_property() {
        let dir = tempdir().unwrap();
        let project = fixtures::project(dir.path(), "name: site\n", "{}\n");

        let err = run(&project).unwrap_err();
        assert_eq!(err.code.as_str(), "config.missing_key");
    }

    #[test]
    fn task_creates_target_path_relative_to_root() {
        let dir = tempdir().unwrap();
        let project = fixtures::project(dir.path(), "targetPath: dist\n", "{}\n");

        run(&project).unwrap();
        assert!(dir.path().join("dist").is_dir());
    }
}
