//! Configuration loader.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::error::ConfigError;
use crate::schema::Config;

/// Environment variable overriding `server.port`.
pub const ENV_PORT: &str = "AGENTATION_PORT";
/// Environment variable overriding `server.host`.
pub const ENV_HOST: &str = "AGENTATION_HOST";
/// Environment variable overriding `logging.level`.
pub const ENV_LOG: &str = "AGENTATION_LOG";

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Load the file at `path`, or the default location when `None`.
    ///
    /// A missing default file yields the default configuration; a missing
    /// explicit file is an error. Environment overrides are applied last.
    pub fn load_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => match Self::default_path() {
                Ok(path) if path.exists() => Self::load(&path)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Config::default()
                }
            },
        };
        Self::apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// `~/.agentation/config.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::base_dir()?.join("config.toml"))
    }

    /// `~/.agentation`.
    pub fn base_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".agentation"))
            .ok_or(ConfigError::NoHomeDir)
    }

    /// Apply `AGENTATION_PORT`, `AGENTATION_HOST` and `AGENTATION_LOG`.
    pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
        Self::apply_overrides_with(config, |name| std::env::var(name).ok())
    }

    fn apply_overrides_with<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_PORT) {
            config.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: ENV_PORT.to_string(),
                message: format!("'{}' is not a port number", port),
            })?;
        }
        if let Some(host) = lookup(ENV_HOST).filter(|h| !h.is_empty()) {
            config.server.host = host;
        }
        if let Some(level) = lookup(ENV_LOG).filter(|l| !l.is_empty()) {
            config.logging.level = level;
        }
        Ok(())
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::InvalidValue {
            field: "pattern".to_string(),
            message: e.to_string(),
        })?;

        let mut result = content.to_string();
        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.agentation/logs`).
    pub fn expand_path(path: &Path) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.server.port, 19989);
    }

    #[test]
    fn test_load_full_config() {
        let content = r#"
            [server]
            host = "0.0.0.0"
            port = 3000

            [client]
            server_url = "ws://127.0.0.1:3000"
            max_reconnect_attempts = 5

            [sampling]
            max_tokens = 1024
            model_hints = ["claude"]

            [logging]
            level = "debug"
            file = false
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.client.max_reconnect_attempts, 5);
        assert_eq!(config.sampling.max_tokens, 1024);
        assert_eq!(config.sampling.model_hints, vec!["claude"]);
        assert!(!config.logging.file);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]").unwrap();
        writeln!(file, "port = 5000").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_explicit_missing_file() {
        let result = ConfigLoader::load_or_default(Some(Path::new("/nonexistent/agentation.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("invalid = [unclosed");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: unique test-only variable name
        unsafe {
            std::env::set_var("AGENTATION_TEST_CONFIG_HOST", "10.0.0.2");
        }
        let config = ConfigLoader::load_str("[server]\nhost = \"${AGENTATION_TEST_CONFIG_HOST}\"").unwrap();
        assert_eq!(config.server.host, "10.0.0.2");
        unsafe {
            std::env::remove_var("AGENTATION_TEST_CONFIG_HOST");
        }
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let result = ConfigLoader::expand_env_vars("value = \"${AGENTATION_NONEXISTENT_12345}\"");
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(name)) if name == "AGENTATION_NONEXISTENT_12345"));
    }

    #[test]
    fn test_expand_env_vars_no_vars() {
        let content = "value = \"no variables here\"";
        assert_eq!(ConfigLoader::expand_env_vars(content).unwrap(), content);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        let vars = lookup(&[(ENV_PORT, "4000"), (ENV_HOST, "0.0.0.0"), (ENV_LOG, "trace")]);
        ConfigLoader::apply_overrides_with(&mut config, vars).unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_env_override_bad_port() {
        let mut config = Config::default();
        let result = ConfigLoader::apply_overrides_with(&mut config, lookup(&[(ENV_PORT, "http")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        assert_eq!(config.server.port, 19989);
    }

    #[test]
    fn test_env_overrides_absent_keep_values() {
        let mut config = Config::default();
        ConfigLoader::apply_overrides_with(&mut config, lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = ConfigLoader::expand_path(Path::new("~/logs"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("logs"));
    }

    #[test]
    fn test_expand_path_no_tilde() {
        let expanded = ConfigLoader::expand_path(Path::new("/var/log/agentation"));
        assert_eq!(expanded, PathBuf::from("/var/log/agentation"));
    }
}
