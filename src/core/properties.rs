//! Property resolution: base file, environment override, injected values.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{self, get_str};
use crate::defaults::Defaults;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::template;

/// Reserved property keys written by the resolver.
pub struct ReservedKeys;

impl ReservedKeys {
    pub const BUILD_ID: &'static str = "buildId";
    pub const ENV: &'static str = "env";
    pub const SSH: &'static str = "ssh";
    pub const PRIVATE_KEY_FILE: &'static str = "privateKeyFile";
    pub const PRIVATE_KEY: &'static str = "privateKey";
    pub const TYPOSCRIPT_FILE: &'static str = "typoscriptFile";
    pub const TARGET_PATH: &'static str = "targetPath";
}

/// Identifier used to version generated asset filenames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BuildId {
    /// Supplied by CI through a build-number variable.
    Number(u64),
    /// Milliseconds since the Unix epoch at resolution time.
    Timestamp(i64),
}

impl BuildId {
    /// First numeric value among `names` wins, otherwise `now()`.
    pub fn resolve<S: AsRef<str>>(env: &Environment, names: &[S], now: impl FnOnce() -> i64) -> Self {
        for name in names {
            let Some(raw) = env.get(name.as_ref()).filter(|v| !v.is_empty()) else {
                continue;
            };
            match raw.trim().parse::<u64>() {
                Ok(number) => return BuildId::Number(number),
                Err(_) => {
                    log_status!(
                        "props",
                        "Ignoring non-numeric build number {}={}",
                        name.as_ref(),
                        raw
                    );
                }
            }
        }
        BuildId::Timestamp(now())
    }

    pub fn to_value(self) -> Value {
        match self {
            BuildId::Number(n) => json!(n),
            BuildId::Timestamp(ms) => json!(ms),
        }
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildId::Number(n) => write!(f, "{}", n),
            BuildId::Timestamp(ms) => write!(f, "{}", ms),
        }
    }
}

/// Where property files live.
#[derive(Debug, Clone)]
pub struct PropertySources {
    pub base_path: PathBuf,
    pub overrides_dir: PathBuf,
}

impl PropertySources {
    pub fn override_path(&self, selector: &str, defaults: &Defaults) -> PathBuf {
        self.overrides_dir
            .join(defaults.files.override_file_name(selector))
    }
}

/// Finalized, read-only property mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertySet(Map<String, Value>);

impl PropertySet {
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Copy for display with the private key contents masked.
    pub fn redacted(&self) -> Value {
        let mut value = self.to_value();
        if let Some(key) = value
            .get_mut(ReservedKeys::SSH)
            .and_then(|ssh| ssh.get_mut(ReservedKeys::PRIVATE_KEY))
        {
            *key = Value::String("<redacted>".to_string());
        }
        value
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedProperties {
    /// Effective environment label (`Production` when no selector is set).
    pub environment: String,
    /// Override file that was merged, if any.
    pub override_file: Option<PathBuf>,
    pub build_id: BuildId,
    pub properties: PropertySet,
}

/// Resolve properties using the current time for a timestamp build id.
pub fn resolve(sources: &PropertySources, env: &Environment, defaults: &Defaults) -> Result<ResolvedProperties> {
    resolve_at(sources, env, defaults, || chrono::Utc::now().timestamp_millis())
}

/// Resolve properties with an explicit clock.
pub fn resolve_at(
    sources: &PropertySources,
    env: &Environment,
    defaults: &Defaults,
    now: impl FnOnce() -> i64,
) -> Result<ResolvedProperties> {
    let mut properties = config::load_yaml_mapping(&sources.base_path)?;
    let mut env = env.clone();

    let selector = env
        .first_non_empty(defaults.environment.selector_vars.as_slice())
        .map(|(_, value)| value.to_string());

    let (environment, override_file) = match selector {
        Some(selector) => {
            let path = sources.override_path(&selector, defaults);
            if path.is_file() {
                let overrides = config::load_yaml_mapping(&path)?;
                properties = config::merge_maps(&properties, &overrides);
                log_status!("props", "Merged {} onto base properties", path.display());
                (selector, Some(path))
            } else {
                log_status!("props", "No override file for '{}', using base properties", selector);
                (selector, None)
            }
        }
        None => {
            let label = defaults.environment.default_label.clone();
            if let Some(first) = defaults.environment.selector_vars.first() {
                env.set(first.clone(), label.clone());
            }
            (label, None)
        }
    };

    let build_id = BuildId::resolve(&env, defaults.environment.build_number_vars.as_slice(), now);

    properties.insert(ReservedKeys::BUILD_ID.to_string(), build_id.to_value());
    properties.insert(ReservedKeys::ENV.to_string(), env.to_value());

    load_private_key(&mut properties, &env)?;

    Ok(ResolvedProperties {
        environment,
        override_file,
        build_id,
        properties: PropertySet(properties),
    })
}

/// Read `ssh.privateKeyFile` into `ssh.privateKey`.
///
/// The path may reference the caller's home directory as `<%= home %>`,
/// `<<home>>` or a leading `~`.
fn load_private_key(properties: &mut Map<String, Value>, env: &Environment) -> Result<()> {
    let Some(Value::Object(ssh)) = properties.get_mut(ReservedKeys::SSH) else {
        return Ok(());
    };

    let Some(raw_path) = ssh
        .get(ReservedKeys::PRIVATE_KEY_FILE)
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
    else {
        return Ok(());
    };

    let home = env.home().unwrap_or_default();
    let key_path = expand_home(raw_path, home)?;

    let contents = std::fs::read_to_string(&key_path)
        .map_err(|e| Error::secret_load_failed(key_path.display().to_string(), e.to_string()))?;

    ssh.insert(
        ReservedKeys::PRIVATE_KEY_FILE.to_string(),
        Value::String(key_path.display().to_string()),
    );
    ssh.insert(ReservedKeys::PRIVATE_KEY.to_string(), Value::String(contents));
    Ok(())
}

fn expand_home(raw_path: &str, home: &str) -> Result<PathBuf> {
    let context = json!({ "home": home });
    let templated = template::expand_str(raw_path, &context)
        .map_err(|e| Error::secret_load_failed(raw_path, e.message))?;

    let expanded = shellexpand::tilde_with_context(&templated, || {
        if home.is_empty() {
            None
        } else {
            Some(home.to_string())
        }
    });
    Ok(Path::new(expanded.as_ref()).to_path_buf())
}

/// Asset-reference file configured in the properties, if any.
pub fn typoscript_file(properties: &Value) -> Option<PathBuf> {
    get_str(properties, ReservedKeys::TYPOSCRIPT_FILE).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn sources(dir: &TempDir) -> PropertySources {
        PropertySources {
            base_path: dir.path().join("props.yml"),
            overrides_dir: dir.path().to_path_buf(),
        }
    }

    fn fixed_clock() -> i64 {
        1_700_000_000_000
    }

    fn lookup_str(properties: &PropertySet, path: &str) -> Option<String> {
        config::get_path(&properties.to_value(), path)
            .and_then(Value::as_str)
            .map(String::from)
    }

    #[test]
    fn build_number_variable_wins_over_timestamp() {
        let env = Environment::from_pairs([("BUILD_NUMBER", "7")]);
        let names = ["BUILD_NUMBER", "BUILDNUMBER"];

        assert_eq!(BuildId::resolve(&env, &names, fixed_clock), BuildId::Number(7));
        assert_eq!(BuildId::resolve(&env, &names, fixed_clock), BuildId::Number(7));
    }

    #[test]
    fn build_number_falls_back_through_priority_list() {
        let env = Environment::from_pairs([("BUILD_NUMBER", ""), ("BUILDNUMBER", "19")]);

        let id = BuildId::resolve(&env, &["BUILD_NUMBER", "BUILDNUMBER"], fixed_clock);
        assert_eq!(id, BuildId::Number(19));
    }

    #[test]
    fn non_numeric_build_number_uses_timestamp() {
        let env = Environment::from_pairs([("BUILD_NUMBER", "abc")]);

        let id = BuildId::resolve(&env, &["BUILD_NUMBER"], fixed_clock);
        assert_eq!(id, BuildId::Timestamp(1_700_000_000_000));
    }

    #[test]
    fn no_selector_means_production_without_override_lookup() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("props.yml"), "name: base\n").unwrap();
        fs::write(dir.path().join("props.Production.yml"), "name: override\n").unwrap();

        let resolved = resolve_at(&sources(&dir), &Environment::new(), &Defaults::default(), fixed_clock)
            .unwrap();

        assert_eq!(resolved.environment, "Production");
        assert!(resolved.override_file.is_none());
        assert_eq!(lookup_str(&resolved.properties, "name").as_deref(), Some("base"));
        assert_eq!(lookup_str(&resolved.properties, "env.ENVIRONMENT").as_deref(), Some("Production"));
    }

    #[test]
    fn selector_merges_matching_override_file() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("props.yml"),
            "ssh:\n  host: prod.example.com\n  username: deploy\n",
        )
        .unwrap();
        fs::write(dir.path().join("props.Development.yml"), "ssh:\n  host: localhost\n").unwrap();

        let env = Environment::from_pairs([("TYPO3_CONTEXT", "Development")]);
        let resolved = resolve_at(&sources(&dir), &env, &Defaults::default(), fixed_clock).unwrap();

        assert_eq!(resolved.environment, "Development");
        assert!(resolved.override_file.is_some());
        assert_eq!(lookup_str(&resolved.properties, "ssh.host").as_deref(), Some("localhost"));
        assert_eq!(lookup_str(&resolved.properties, "ssh.username").as_deref(), Some("deploy"));
    }

    #[test]
    fn selector_without_override_file_returns_base() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("props.yml"), "name: base\nlist: [1, 2]\n").unwrap();

        let env = Environment::from_pairs([("ENVIRONMENT", "Staging")]);
        let resolved = resolve_at(&sources(&dir), &env, &Defaults::default(), fixed_clock).unwrap();

        let mut expected = Map::new();
        expected.insert("name".to_string(), json!("base"));
        expected.insert("list".to_string(), json!([1, 2]));
        expected.insert("buildId".to_string(), json!(1_700_000_000_000i64));
        expected.insert("env".to_string(), env.to_value());

        assert_eq!(resolved.environment, "Staging");
        assert_eq!(resolved.properties.to_value(), Value::Object(expected));
    }

    #[test]
    fn missing_base_file_is_config_load_error() {
        let dir = tempdir().unwrap();
        let err = resolve_at(&sources(&dir), &Environment::new(), &Defaults::default(), fixed_clock)
            .unwrap_err();
        assert_eq!(err.code.as_str(), "config.load_failed");
    }

    #[test]
    fn private_key_is_loaded_from_home_template() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".ssh")).unwrap();
        fs::write(dir.path().join(".ssh/id_rsa"), "-----BEGIN KEY-----\n").unwrap();
        fs::write(
            dir.path().join("props.yml"),
            "ssh:\n  privateKeyFile: \"<%= home %>/.ssh/id_rsa\"\n",
        )
        .unwrap();

        let home = dir.path().display().to_string();
        let env = Environment::from_pairs([("HOME", home.as_str())]);
        let resolved = resolve_at(&sources(&dir), &env, &Defaults::default(), fixed_clock).unwrap();

        assert_eq!(
            lookup_str(&resolved.properties, "ssh.privateKey").as_deref(),
            Some("-----BEGIN KEY-----\n")
        );
        assert_eq!(
            lookup_str(&resolved.properties, "ssh.privateKeyFile").as_deref(),
            Some(format!("{}/.ssh/id_rsa", home).as_str())
        );
        assert_eq!(resolved.properties.redacted()["ssh"]["privateKey"], "<redacted>");
    }

    #[test]
    fn unreadable_private_key_is_secret_load_error() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("props.yml"),
            "ssh:\n  privateKeyFile: /nonexistent/rigger/id_rsa\n",
        )
        .unwrap();

        let err = resolve_at(&sources(&dir), &Environment::new(), &Defaults::default(), fixed_clock)
            .unwrap_err();
        assert_eq!(err.code.as_str(), "secret.load_failed");
    }
}
