//! Project layout and the expanded build configuration.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config;
use crate::defaults::{self, Defaults};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::properties::{self, PropertySet, PropertySources, ReservedKeys, ResolvedProperties};
use crate::template;

/// Reserved config-tree key holding the resolved properties.
pub const PROPS_KEY: &str = "props";

/// Config-tree key holding pipeline definitions.
pub const PIPELINES_KEY: &str = "pipelines";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub base_properties: PathBuf,
    pub overrides_dir: PathBuf,
    pub build_config: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: &Path, defaults: &Defaults) -> Self {
        let overrides_dir = match &defaults.files.overrides_dir {
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        };

        Self {
            root: root.to_path_buf(),
            base_properties: root.join(&defaults.files.base_properties),
            overrides_dir,
            build_config: root.join(&defaults.files.build_config),
        }
    }

    pub fn property_sources(&self) -> PropertySources {
        PropertySources {
            base_path: self.base_properties.clone(),
            overrides_dir: self.overrides_dir.clone(),
        }
    }

    /// Resolve a config path against the project root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// The task configuration tree after placeholder expansion.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    tree: Value,
}

impl BuildConfig {
    pub fn load(path: &Path, properties: &PropertySet) -> Result<Self> {
        let raw = config::load_yaml_mapping(path)?;
        Self::from_raw(raw, properties)
    }

    /// Attach `properties` under `props` and expand the tree against itself,
    /// so placeholders can reach both properties and sibling sections.
    /// A referenced value that is itself a placeholder is not expanded
    /// again and fails with `template.unresolved`.
    pub fn from_raw(mut raw: Map<String, Value>, properties: &PropertySet) -> Result<Self> {
        if raw.contains_key(PROPS_KEY) {
            log_status!("config", "Replacing reserved '{}' section with resolved properties", PROPS_KEY);
        }
        raw.insert(PROPS_KEY.to_string(), properties.to_value());
        let context = Value::Object(raw);

        // Environment values are data, never templates.
        let mut unexpanded = context.clone();
        let env = unexpanded
            .get_mut(PROPS_KEY)
            .and_then(Value::as_object_mut)
            .and_then(|props| props.remove(ReservedKeys::ENV));

        let mut tree = template::expand(&unexpanded, &context)?;
        if let Some((path, expression)) = template::find_placeholder(&tree) {
            return Err(Error::template_unresolved(path, expression).with_hint(
                "A placeholder resolved to another placeholder; reference the underlying property directly",
            ));
        }
        if let (Some(env), Some(props)) = (env, tree.get_mut(PROPS_KEY).and_then(Value::as_object_mut)) {
            props.insert(ReservedKeys::ENV.to_string(), env);
        }
        Ok(Self { tree })
    }

    pub fn tree(&self) -> &Value {
        &self.tree
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.tree.get(name)
    }

    pub fn props(&self) -> &Value {
        self.tree.get(PROPS_KEY).unwrap_or(&Value::Null)
    }

    /// Pipelines declared in the config tree (`pipelines:`), if any.
    pub fn pipelines(&self) -> Result<BTreeMap<String, Vec<String>>> {
        match self.section(PIPELINES_KEY) {
            None | Some(Value::Null) => Ok(BTreeMap::new()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                Error::config_invalid_value(
                    PIPELINES_KEY,
                    None,
                    format!("expected a mapping of pipeline name to task list: {}", e),
                )
            }),
        }
    }

    /// Copy for display with the private key contents masked.
    pub fn redacted(&self) -> Value {
        let mut tree = self.tree.clone();
        if let Some(key) = tree
            .get_mut(PROPS_KEY)
            .and_then(|props| props.get_mut(ReservedKeys::SSH))
            .and_then(|ssh| ssh.get_mut(ReservedKeys::PRIVATE_KEY))
        {
            *key = Value::String("<redacted>".to_string());
        }
        tree
    }
}

/// Everything a run needs: layout, defaults, properties, expanded config.
#[derive(Debug, Clone)]
pub struct Project {
    pub layout: ProjectLayout,
    pub defaults: Defaults,
    pub resolved: ResolvedProperties,
    pub config: BuildConfig,
}

impl Project {
    /// Resolve properties and load the build configuration of `root`.
    pub fn open(root: &Path, env: &Environment) -> Result<Self> {
        let defaults = defaults::load_defaults(root)?;
        let layout = ProjectLayout::new(root, &defaults);

        let resolved = properties::resolve(&layout.property_sources(), env, &defaults)?;
        log_status!(
            "props",
            "Environment {} (build {})",
            resolved.environment,
            resolved.build_id
        );

        let config = BuildConfig::load(&layout.build_config, &resolved.properties)?;

        Ok(Self {
            layout,
            defaults,
            resolved,
            config,
        })
    }

    /// Built-in pipelines overlaid with those of the config tree.
    pub fn pipelines(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let mut pipelines = self.defaults.pipelines.clone();
        pipelines.extend(self.config.pipelines()?);
        Ok(pipelines)
    }

    pub fn target_path(&self) -> Option<PathBuf> {
        config::get_str(self.config.props(), ReservedKeys::TARGET_PATH)
            .map(|p| self.layout.resolve(p))
    }

    pub fn typoscript_file(&self) -> Option<PathBuf> {
        properties::typoscript_file(self.config.props()).map(|p| self.layout.resolve(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn write_project(dir: &Path) {
        fs::write(
            dir.join("props.yml"),
            "targetPath: dist\ntyposcriptFile: setup.ts\nssh:\n  host: example.com\n  username: deploy\n",
        )
        .unwrap();
        fs::write(
            dir.join("build.yml"),
            "clean:\n  assets: [\"<%= props.targetPath %>/*.css\"]\n\
             sshexec:\n  unpack: \"tar xzf current.tgz -C /var/www/<< props.env.ENVIRONMENT >>\"\n",
        )
        .unwrap();
    }

    #[test]
    fn open_expands_config_against_properties() {
        let dir = tempdir().unwrap();
        write_project(dir.path());

        let env = Environment::from_pairs([("BUILD_NUMBER", "3")]);
        let project = Project::open(dir.path(), &env).unwrap();

        assert_eq!(project.config.section("clean").unwrap()["assets"], json!(["dist/*.css"]));
        assert_eq!(
            project.config.section("sshexec").unwrap()["unpack"],
            "tar xzf current.tgz -C /var/www/Production"
        );
        assert_eq!(project.config.props()["buildId"], 3);
        assert_eq!(project.target_path(), Some(dir.path().join("dist")));
        assert_eq!(project.typoscript_file(), Some(dir.path().join("setup.ts")));
    }

    #[test]
    fn reserved_props_section_is_replaced() {
        let dir = tempdir().unwrap();
        write_project(dir.path());
        fs::write(dir.path().join("build.yml"), "props: {targetPath: elsewhere}\n").unwrap();

        let project = Project::open(dir.path(), &Environment::new()).unwrap();
        assert_eq!(project.config.props()["targetPath"], "dist");
    }

    #[test]
    fn environment_values_are_not_expanded() {
        let dir = tempdir().unwrap();
        write_project(dir.path());

        let env = Environment::from_pairs([("PS1", "<%= not.a.path %> $")]);
        let project = Project::open(dir.path(), &env).unwrap();

        assert_eq!(project.config.props()["env"]["PS1"], "<%= not.a.path %> $");
    }

    #[test]
    fn config_pipelines_extend_builtin_ones() {
        let dir = tempdir().unwrap();
        write_project(dir.path());
        fs::write(
            dir.path().join("build.yml"),
            "pipelines:\n  default: [clean]\n  assets: [clean, tsconfig]\n",
        )
        .unwrap();

        let project = Project::open(dir.path(), &Environment::new()).unwrap();
        let pipelines = project.pipelines().unwrap();

        assert_eq!(pipelines["default"], vec!["clean".to_string()]);
        assert_eq!(pipelines["assets"].len(), 2);
        assert!(pipelines.contains_key("deploy"));
    }

    #[test]
    fn unresolved_placeholder_in_config_is_fatal() {
        let dir = tempdir().unwrap();
        write_project(dir.path());
        fs::write(dir.path().join("build.yml"), "clean: [\"<< props.nope >>\"]\n").unwrap();

        let err = Project::open(dir.path(), &Environment::new()).unwrap_err();
        assert_eq!(err.code.as_str(), "template.unresolved");
        assert_eq!(err.details["path"], "props.nope");
    }

    #[test]
    fn missing_build_config_is_config_load_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("props.yml"), "name: x\n").unwrap();

        let err = Project::open(dir.path(), &Environment::new()).unwrap_err();
        assert_eq!(err.code.as_str(), "config.load_failed");
    }

    #[test]
    fn placeholder_reaching_another_placeholder_is_fatal() {
        let dir = tempdir().unwrap();
        write_project(dir.path());
        fs::write(
            dir.path().join("build.yml"),
            "compress:\n  deploy:\n    archive: \"<%= props.targetPath %>/current.tgz\"\n\
             sftp:\n  deploy:\n    files: \"<%= compress.deploy.archive %>\"\n",
        )
        .unwrap();

        let err = Project::open(dir.path(), &Environment::new()).unwrap_err();

        assert_eq!(err.code.as_str(), "template.unresolved");
        assert_eq!(err.details["path"], "props.targetPath");
        assert_eq!(err.hints.len(), 1);
    }

    #[test]
    fn sibling_section_reference_resolves_plain_values() {
        let dir = tempdir().unwrap();
        write_project(dir.path());
        fs::write(
            dir.path().join("build.yml"),
            "compress:\n  deploy:\n    archive: current.tgz\n\
             sftp:\n  deploy:\n    files: \"<%= compress.deploy.archive %>\"\n",
        )
        .unwrap();

        let project = Project::open(dir.path(), &Environment::new()).unwrap();
        assert_eq!(project.config.section("sftp").unwrap()["deploy"]["files"], "current.tgz");
    }

    #[test]
    fn custom_override_location_and_default_label() {
        let dir = tempdir().unwrap();
        write_project(dir.path());
        fs::create_dir(dir.path().join("envs")).unwrap();
        fs::write(dir.path().join("envs/Staging.yml"), "ssh:\n  host: stage\n").unwrap();
        fs::write(dir.path().join("envs/Live.yml"), "ssh:\n  host: live\n").unwrap();
        // Default pattern in the base directory must not be picked up.
        fs::write(dir.path().join("props.Staging.yml"), "ssh:\n  host: wrong\n").unwrap();
        fs::write(
            dir.path().join(".rigger.json"),
            r#"{"files": {"overridesDir": "envs", "overridePattern": "{env}.yml"},
                "environment": {"defaultLabel": "Live"}}"#,
        )
        .unwrap();

        let staging = Project::open(dir.path(), &Environment::from_pairs([("CONTEXT", "Staging")])).unwrap();
        assert_eq!(staging.resolved.environment, "Staging");
        assert_eq!(staging.resolved.override_file, Some(dir.path().join("envs/Staging.yml")));
        assert_eq!(staging.config.props()["ssh"]["host"], "stage");
        assert_eq!(staging.config.props()["ssh"]["username"], "deploy");

        let unset = Project::open(dir.path(), &Environment::new()).unwrap();
        assert_eq!(unset.resolved.environment, "Live");
        assert!(unset.resolved.override_file.is_none());
        assert_eq!(unset.config.props()["ssh"]["host"], "example.com");
        assert_eq!(unset.config.props()["env"]["ENVIRONMENT"], "Live");
    }
}
