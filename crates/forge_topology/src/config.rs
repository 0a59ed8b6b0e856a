//! Stack configuration.
//!
//! Settings live in a per-stack YAML file, `forge.<stack>.yaml`:
//!
//! ```yaml
//! config:
//!   project: web-app
//!   aws:region: eu-west-1
//! ```
//!
//! The stack (environment) label comes from the invoking tool, never from
//! the file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use tracing::debug;

use crate::defaults::DEFAULT_REGION;
use crate::error::{TopologyError, TopologyResult};

pub const PROJECT_KEY: &str = "project";
pub const REGION_KEY: &str = "aws:region";

/// Longest name a load balancer or target group may have.
const MAX_NAME_LEN: usize = 32;

/// Parsed stack settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSource {
    #[serde(default, deserialize_with = "scalar_values")]
    pub config: BTreeMap<String, String>,
}

/// Accept unquoted numbers and booleans (`project: 2024`) as strings.
fn scalar_values<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                _ => {
                    return Err(de::Error::custom(format!(
                        "configuration value '{}' must be a scalar",
                        key
                    )))
                }
            };
            Ok((key, value))
        })
        .collect()
}

impl ConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Default settings file for a stack.
    pub fn default_path(stack: &str) -> PathBuf {
        PathBuf::from(format!("forge.{}.yaml", stack))
    }

    pub fn from_yaml(content: &str) -> TopologyResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load a settings file.
    pub fn load(path: impl AsRef<Path>) -> TopologyResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            TopologyError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        debug!("Loaded stack settings from {:?}", path);
        Self::from_yaml(&content)
    }

    /// A value, treating empty strings as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Resolved inputs of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    pub project: String,
    pub environment: String,
    pub region: String,
}

impl StackConfig {
    /// Resolve the run inputs.
    ///
    /// `project` has no default. The derived resource names must be valid
    /// load balancer names, so they are checked here rather than failing
    /// halfway through an apply.
    pub fn resolve(source: &ConfigSource, environment: &str) -> TopologyResult<Self> {
        let project = source.get(PROJECT_KEY).ok_or_else(|| {
            TopologyError::configuration(format!("missing required configuration value '{}'", PROJECT_KEY))
        })?;

        let environment = environment.trim();
        if environment.is_empty() {
            return Err(TopologyError::configuration("stack name must not be empty"));
        }

        let config = Self {
            project: project.to_string(),
            environment: environment.to_string(),
            region: source.get(REGION_KEY).unwrap_or(DEFAULT_REGION).to_string(),
        };
        validate_name(&config.resource_name())?;
        Ok(config)
    }

    /// `{project}-{environment}`: security group, load balancer and target group name.
    pub fn resource_name(&self) -> String {
        format!("{}-{}", self.project, self.environment)
    }

    /// `Name` tag of the instance.
    pub fn instance_name(&self) -> String {
        format!("{}-ec2-{}", self.project, self.environment)
    }
}

fn validate_name(name: &str) -> TopologyResult<()> {
    let pattern = Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?$")
        .map_err(|e| TopologyError::configuration(e.to_string()))?;

    if name.len() > MAX_NAME_LEN || !pattern.is_match(name) {
        return Err(TopologyError::configuration(format!(
            "derived resource name '{}' must be 1-{} alphanumerics or hyphens, without a leading or trailing hyphen",
            name, MAX_NAME_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_names() {
        let source = ConfigSource::new().with("project", "web-app");
        let config = StackConfig::resolve(&source, "prod").unwrap();

        assert_eq!(config.resource_name(), "web-app-prod");
        assert_eq!(config.instance_name(), "web-app-ec2-prod");
        assert_eq!(config.region, DEFAULT_REGION);
    }

    #[test]
    fn test_missing_project_is_configuration_error() {
        let err = StackConfig::resolve(&ConfigSource::new(), "prod").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("project"));
    }

    #[test]
    fn test_empty_project_counts_as_missing() {
        let source = ConfigSource::new().with("project", "  ");
        assert!(StackConfig::resolve(&source, "prod")
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_empty_environment_rejected() {
        let source = ConfigSource::new().with("project", "web-app");
        assert!(StackConfig::resolve(&source, "").is_err());
    }

    #[test]
    fn test_invalid_derived_names_rejected() {
        for project in ["web_app", "-web", "a-very-long-project-name-that-overflows"] {
            let source = ConfigSource::new().with("project", project);
            assert!(
                StackConfig::resolve(&source, "prod").is_err(),
                "expected '{project}' to be rejected"
            );
        }
    }

    #[test]
    fn test_load_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("forge.staging.yaml");
        fs::write(
            &path,
            "config:\n  project: web-app\n  aws:region: eu-west-1\n",
        )
        .unwrap();

        let source = ConfigSource::load(&path).unwrap();
        let config = StackConfig::resolve(&source, "staging").unwrap();
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.project, "web-app");
    }

    #[test]
    fn test_unquoted_scalars_read_as_strings() {
        let source =
            ConfigSource::from_yaml("config:\n  project: 2024\n  debug: true\n  aws:region:\n")
                .unwrap();
        assert_eq!(source.get("project"), Some("2024"));
        assert_eq!(source.get("debug"), Some("true"));
        assert_eq!(source.get(REGION_KEY), None);

        let config = StackConfig::resolve(&source, "prod").unwrap();
        assert_eq!(config.resource_name(), "2024-prod");
    }

    #[test]
    fn test_nested_value_rejected() {
        let err = ConfigSource::from_yaml("config:\n  project:\n    - web\n").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = ConfigSource::load("/nonexistent/forge.prod.yaml").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_default_path() {
        assert_eq!(
            ConfigSource::default_path("prod"),
            PathBuf::from("forge.prod.yaml")
        );
    }
}
