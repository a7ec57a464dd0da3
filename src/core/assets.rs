//! Asset-reference rewriting for the CMS template configuration file.
//!
//! The configuration file references one stylesheet and one script. A build
//! points them at the versioned bundles, a post-deploy cleanup resets them to
//! the canonical names so the working copy stays unchanged.

use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::Result;
use crate::properties::BuildId;
use crate::utils::io;

fn css_reference() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/[a-z0-9.]+\.css").expect("css pattern is valid"))
}

fn js_reference() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/[a-z0-9.]+\.js").expect("js pattern is valid"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteMode {
    /// Point references at `styles.<id>.css` / `scripts.<id>.js`.
    Versioned(BuildId),
    /// Point references back at `all.css` / `all.js`.
    Reset,
}

impl fmt::Display for RewriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewriteMode::Versioned(id) => write!(f, "versioned ({})", id),
            RewriteMode::Reset => write!(f, "reset"),
        }
    }
}

/// Replace the first stylesheet and the first script reference.
pub fn rewrite_asset_references(contents: &str, mode: RewriteMode) -> String {
    let (css, js) = match mode {
        RewriteMode::Versioned(id) => (format!("/styles.{}.css", id), format!("/scripts.{}.js", id)),
        RewriteMode::Reset => ("/all.css".to_string(), "/all.js".to_string()),
    };

    // NoExpand: the replacement is literal text, `$` must not be interpreted.
    let updated = css_reference().replace(contents, regex::NoExpand(&css));
    js_reference()
        .replace(&updated, regex::NoExpand(&js))
        .into_owned()
}

/// Rewrite the references of `path` in place. `None` is a no-op.
///
/// Returns whether the file was touched.
pub fn rewrite_file(path: Option<&Path>, mode: RewriteMode) -> Result<bool> {
    let Some(path) = path else {
        return Ok(false);
    };

    let contents = io::read_file(path, "read asset reference file")?;
    let updated = rewrite_asset_references(&contents, mode);
    io::write_file(path, &updated, "write asset reference file")?;

    log_status!("assets", "Rewrote {} ({})", path.display(), mode);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn versioned_rewrites_css_reference() {
        assert_eq!(
            rewrite_asset_references("url(/old.css)", RewriteMode::Versioned(BuildId::Number(42))),
            "url(/styles.42.css)"
        );
    }

    #[test]
    fn reset_rewrites_versioned_reference() {
        assert_eq!(
            rewrite_asset_references("url(/styles.42.css)", RewriteMode::Reset),
            "url(/all.css)"
        );
    }

    #[test]
    fn only_first_reference_per_extension_is_replaced() {
        let input = "page.includeCSS.a = fileadmin/all.css\n\
                     page.includeCSS.b = fileadmin/print.css\n\
                     page.includeJS.a = fileadmin/all.js\n\
                     page.includeJS.b = fileadmin/extra.js\n";

        let output = rewrite_asset_references(input, RewriteMode::Versioned(BuildId::Number(7)));

        assert!(output.contains("fileadmin/styles.7.css"));
        assert!(output.contains("fileadmin/print.css"));
        assert!(output.contains("fileadmin/scripts.7.js"));
        assert!(output.contains("fileadmin/extra.js"));
    }

    #[test]
    fn uppercase_names_are_not_matched() {
        let input = "url(/Main.CSS)";
        assert_eq!(rewrite_asset_references(input, RewriteMode::Reset), input);
    }

    #[test]
    fn rewrite_file_without_target_is_noop() {
        assert!(!rewrite_file(None, RewriteMode::Reset).unwrap());
    }

    #[test]
    fn rewrite_file_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("setup.ts");
        fs::write(&path, "css = /all.css\njs = /all.js\n").unwrap();

        rewrite_file(Some(&path), RewriteMode::Versioned(BuildId::Number(12))).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "css = /styles.12.css\njs = /scripts.12.js\n"
        );

        rewrite_file(Some(&path), RewriteMode::Reset).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "css = /all.css\njs = /all.js\n");
    }
}
