//! Configuration parser for loading and merging configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, HalldyllError, Result};
use std::path::Path;
use tracing::{debug, info};

use super::spec::DeployConfig;

/// Configuration parser for loading deployment configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<std::path::PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(HalldyllError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            HalldyllError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeployConfig> {
        debug!("Parsing YAML configuration");

        let config: DeployConfig = serde_yaml::from_str(content).map_err(|e| {
            let file = source.map_or_else(|| String::from("<inline>"), |p| p.display().to_string());
            let location = e
                .location()
                .map_or_else(|| file.clone(), |l| format!("{file}:{}:{}", l.line(), l.column()));
            HalldyllError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: Some(location),
            })
        })?;

        debug!(
            "Parsed configuration for project {} (service {})",
            config.project.name, config.service.name
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Environment variables are checked in the format:
    /// `HALLDYLL_<SECTION>_<KEY>` (e.g., `HALLDYLL_PROJECT_NAME`)
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut DeployConfig) {
        Self::apply_overrides(config, |name| std::env::var(name).ok());
    }

    /// Applies `HALLDYLL_<SECTION>_<KEY>` overrides from a variable lookup.
    fn apply_overrides(config: &mut DeployConfig, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("HALLDYLL_PROJECT_NAME") {
            debug!("Overriding project.name from environment");
            config.project.name = name;
        }

        if let Some(env) = lookup("HALLDYLL_PROJECT_ENVIRONMENT") {
            debug!("Overriding project.environment from environment");
            config.project.environment = env;
        }

        if let Some(region) = lookup("HALLDYLL_PROJECT_REGION") {
            debug!("Overriding project.region from environment");
            config.project.region = Some(region);
        }

        if let Some(bucket) = lookup("HALLDYLL_STATE_BUCKET") {
            debug!("Overriding state.bucket from environment");
            config.state.bucket = Some(bucket);
        }

        if let Some(prefix) = lookup("HALLDYLL_STATE_PREFIX") {
            debug!("Overriding state.prefix from environment");
            config.state.prefix = Some(prefix);
        }

        if let Some(region) = lookup("HALLDYLL_STATE_REGION") {
            debug!("Overriding state.region from environment");
            config.state.region = Some(region);
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                HalldyllError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "halldyll.fargate.yaml",
    "halldyll.fargate.yml",
    "fargate.yaml",
    "fargate.yml",
];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(HalldyllError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PortProtocol, StateBackend};
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
project:
  name: test-project
service:
  name: web
  cpu: 256
  memory: 512
  containers:
    - name: web
      image: nginx:1.27
";
        let config = ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("minimal config parses");

        assert_eq!(config.project.name, "test-project");
        assert_eq!(config.project.environment, "dev");
        assert_eq!(config.state.backend, StateBackend::Local);
        assert_eq!(config.service.desired_count, 1);
        assert!(!config.service.expose_publicly);
        assert!(config.service.containers[0].essential);
        assert_eq!(config.timing.deploy_attempts, 10);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
project:
  name: halldyll-web
  environment: prod
  region: eu-west-1

state:
  backend: s3
  bucket: halldyll-state
  prefix: halldyll-web/prod

service:
  name: web
  cluster: apps
  cpu: 512
  memory: 1024
  desired_count: 2
  expose_publicly: true
  network:
    security_groups: [sg-1]
    subnets: [subnet-1, subnet-2]
  tags:
    team: platform
  containers:
    - name: web
      image: ghcr.io/halldyll/web:1.4.0
      memory: 512
      ports:
        - "8080/tcp"
        - "5353/udp"
      environment:
        RUST_LOG: info
      command: ["/app/web", "--port", "8080"]

timing:
  settle_secs: 5
  deploy_attempts: 20
"#;
        let config = ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("full config parses");

        assert_eq!(config.qualified_name(), "halldyll-web-prod");
        assert_eq!(config.service.cluster.as_deref(), Some("apps"));
        assert_eq!(config.service.containers[0].ports[1].protocol, PortProtocol::Udp);
        assert_eq!(
            config.service.network.as_ref().map(|n| n.subnets.len()),
            Some(2)
        );
        assert_eq!(config.service.tags.get("team").map(String::as_str), Some("platform"));
        assert_eq!(config.timing.settle_secs, 5);
        assert_eq!(config.timing.poll_interval_secs, 10);
        assert_eq!(config.timing.deploy_attempts, 20);
    }

    #[test]
    fn test_parse_invalid_port() {
        let yaml = r"
project:
  name: test-project
service:
  name: web
  cpu: 256
  memory: 512
  containers:
    - name: web
      image: nginx:1.27
      ports: [8080/http]
";
        let result = ConfigParser::new().parse_yaml(yaml, None);
        assert!(matches!(
            result,
            Err(HalldyllError::Config(ConfigError::ParseError { .. }))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let yaml = r"
project:
  name: test-project
service:
  name: web
  cpu: 256
  memory: 512
  containers: []
";
        let mut config = ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("config parses");

        let vars: std::collections::HashMap<&str, &str> = [
            ("HALLDYLL_PROJECT_ENVIRONMENT", "prod"),
            ("HALLDYLL_STATE_BUCKET", "team-state"),
        ]
        .into_iter()
        .collect();

        ConfigParser::apply_overrides(&mut config, |name| vars.get(name).map(|v| (*v).to_string()));

        assert_eq!(config.project.name, "test-project");
        assert_eq!(config.project.environment, "prod");
        assert_eq!(config.state.bucket.as_deref(), Some("team-state"));
        assert_eq!(config.state.prefix, None);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().expect("temp dir");
        let result = ConfigParser::new().load_file(temp.path().join("missing.yaml"));
        assert!(matches!(
            result,
            Err(HalldyllError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = TempDir::new().expect("temp dir");
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("create dirs");
        std::fs::write(temp.path().join(DEFAULT_CONFIG_FILES[0]), "").expect("write");

        let found = find_config_file(&nested).expect("config found");
        assert_eq!(found, temp.path().join(DEFAULT_CONFIG_FILES[0]));
    }
}
