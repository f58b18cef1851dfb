//! Configuration management for Loopauth
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! Precedence, lowest to highest: built-in defaults, YAML file,
//! `client_secret_file`, `LOOPAUTH_*` environment variables, CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::client::{
    ClientCredentials, Endpoints, GOOGLE_AUTHORIZATION_URL, GOOGLE_CODE_TOKEN_URL,
    GOOGLE_REFRESH_TOKEN_URL,
};
use crate::auth::manager::FlowSettings;
use crate::auth::token_store::DEFAULT_REFRESH_TOKEN_PATH;
use crate::error::{LoopauthError, Result};

/// Main configuration structure for Loopauth
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// OAuth client identity
    #[serde(default)]
    pub client: ClientConfig,
    /// Provider endpoints
    #[serde(default)]
    pub endpoints: EndpointConfig,
    /// Loopback redirect settings
    #[serde(default)]
    pub redirect: RedirectConfig,
    /// Refresh token persistence
    #[serde(default)]
    pub storage: StorageConfig,
    /// Browser launch settings
    #[serde(default)]
    pub browser: BrowserConfig,
}

/// OAuth client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// OAuth client id
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,

    /// Optional path to a provider-issued `client_secret.json`.
    ///
    /// Values from this file fill `client_id` and `client_secret` when they
    /// are not already set.
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
}

/// Provider endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Consent page URL
    #[serde(default = "default_authorization_url")]
    pub authorization_url: String,

    /// Token endpoint for the refresh-token grant
    #[serde(default = "default_refresh_token_url")]
    pub refresh_token_url: String,

    /// Token endpoint for the authorization-code grant
    #[serde(default = "default_code_token_url")]
    pub code_token_url: String,
}

fn default_authorization_url() -> String {
    GOOGLE_AUTHORIZATION_URL.to_string()
}

fn default_refresh_token_url() -> String {
    GOOGLE_REFRESH_TOKEN_URL.to_string()
}

fn default_code_token_url() -> String {
    GOOGLE_CODE_TOKEN_URL.to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            authorization_url: default_authorization_url(),
            refresh_token_url: default_refresh_token_url(),
            code_token_url: default_code_token_url(),
        }
    }
}

/// Loopback redirect configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectConfig {
    /// Host name in the redirect URI
    #[serde(default = "default_redirect_host")]
    pub host: String,

    /// Loopback port; 0 picks a free port
    #[serde(default = "default_redirect_port")]
    pub port: u16,

    /// Seconds to wait for the browser redirect; 0 waits indefinitely
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_seconds: u64,
}

fn default_redirect_host() -> String {
    "localhost".to_string()
}

fn default_redirect_port() -> u16 {
    8080
}

fn default_callback_timeout() -> u64 {
    300
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            host: default_redirect_host(),
            port: default_redirect_port(),
            callback_timeout_seconds: default_callback_timeout(),
        }
    }
}

/// Refresh token storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the refresh token file
    #[serde(default = "default_refresh_token_path")]
    pub refresh_token_path: PathBuf,
}

fn default_refresh_token_path() -> PathBuf {
    PathBuf::from(DEFAULT_REFRESH_TOKEN_PATH)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            refresh_token_path: default_refresh_token_path(),
        }
    }
}

/// Browser launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Launch a browser; when false the URL is only printed
    #[serde(default = "default_open_browser")]
    pub open: bool,

    /// Program to run instead of the platform URL opener
    #[serde(default)]
    pub command: Option<String>,
}

fn default_open_browser() -> bool {
    true
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            open: default_open_browser(),
            command: None,
        }
    }
}

// ---------------------------------------------------------------------------
// client_secret.json
// ---------------------------------------------------------------------------

/// Shape of a provider-issued client secret file.
///
/// Google wraps the values in an `installed` or `web` object; a flat
/// `{client_id, client_secret}` object is accepted as well.
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    #[serde(default)]
    installed: Option<ClientSecretEntry>,
    #[serde(default)]
    web: Option<ClientSecretEntry>,
    #[serde(flatten)]
    flat: ClientSecretEntry,
}

#[derive(Debug, Default, Deserialize)]
struct ClientSecretEntry {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
}

impl ClientSecretFile {
    fn into_entry(self) -> ClientSecretEntry {
        self.installed.or(self.web).unwrap_or(self.flat)
    }
}

impl Config {
    /// Load configuration from file, environment, and CLI overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed, or if
    /// the client secret file cannot be read.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);
        config.apply_client_secret_file()?;

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LoopauthError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| LoopauthError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(client_id) = std::env::var("LOOPAUTH_CLIENT_ID") {
            self.client.client_id = client_id;
        }

        if let Ok(client_secret) = std::env::var("LOOPAUTH_CLIENT_SECRET") {
            self.client.client_secret = client_secret;
        }

        if let Ok(file) = std::env::var("LOOPAUTH_CLIENT_SECRET_FILE") {
            self.client.client_secret_file = Some(PathBuf::from(file));
        }

        if let Ok(port) = std::env::var("LOOPAUTH_REDIRECT_PORT") {
            match port.parse() {
                Ok(port) => self.redirect.port = port,
                Err(_) => tracing::warn!("Ignoring invalid LOOPAUTH_REDIRECT_PORT: {}", port),
            }
        }

        if let Ok(path) = std::env::var("LOOPAUTH_REFRESH_TOKEN_PATH") {
            self.storage.refresh_token_path = PathBuf::from(path);
        }

        if let Ok(timeout) = std::env::var("LOOPAUTH_CALLBACK_TIMEOUT_SECONDS") {
            match timeout.parse() {
                Ok(secs) => self.redirect.callback_timeout_seconds = secs,
                Err(_) => tracing::warn!(
                    "Ignoring invalid LOOPAUTH_CALLBACK_TIMEOUT_SECONDS: {}",
                    timeout
                ),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(client_id) = &cli.client_id {
            self.client.client_id = client_id.clone();
        }
        if let Some(client_secret) = &cli.client_secret {
            self.client.client_secret = client_secret.clone();
        }
        if let Some(file) = &cli.client_secret_file {
            self.client.client_secret_file = Some(file.clone());
        }
        if let Some(port) = cli.port {
            self.redirect.port = port;
        }
        if let Some(path) = &cli.token_path {
            self.storage.refresh_token_path = path.clone();
        }
        if let Some(timeout) = cli.timeout {
            self.redirect.callback_timeout_seconds = timeout;
        }
        if cli.no_browser {
            self.browser.open = false;
        }
    }

    /// Fills missing client credentials from `client.client_secret_file`.
    fn apply_client_secret_file(&mut self) -> Result<()> {
        let Some(path) = self.client.client_secret_file.clone() else {
            return Ok(());
        };

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            LoopauthError::Config(format!(
                "Failed to read client secret file {}: {}",
                path.display(),
                e
            ))
        })?;
        let entry = serde_json::from_str::<ClientSecretFile>(&contents)
            .map_err(|e| {
                LoopauthError::Config(format!(
                    "Failed to parse client secret file {}: {}",
                    path.display(),
                    e
                ))
            })?
            .into_entry();

        if self.client.client_id.is_empty() {
            self.client.client_id = entry.client_id.unwrap_or_default();
        }
        if self.client.client_secret.is_empty() {
            self.client.client_secret = entry.client_secret.unwrap_or_default();
        }
        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if credentials are missing, an endpoint URL does not
    /// parse, or the refresh token path is empty.
    pub fn validate(&self) -> Result<()> {
        if self.client.client_id.trim().is_empty() {
            return Err(LoopauthError::Config(
                "client.client_id is required (config file, LOOPAUTH_CLIENT_ID, or --client-id)"
                    .to_string(),
            )
            .into());
        }

        if self.client.client_secret.trim().is_empty() {
            return Err(LoopauthError::Config(
                "client.client_secret is required (config file, LOOPAUTH_CLIENT_SECRET, or --client-secret)"
                    .to_string(),
            )
            .into());
        }

        self.endpoints()?;

        if self.redirect.host.trim().is_empty() {
            return Err(
                LoopauthError::Config("redirect.host cannot be empty".to_string()).into(),
            );
        }

        if self.storage.refresh_token_path.as_os_str().is_empty() {
            return Err(LoopauthError::Config(
                "storage.refresh_token_path cannot be empty".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// The configured client credentials.
    pub fn credentials(&self) -> ClientCredentials {
        ClientCredentials::new(&self.client.client_id, &self.client.client_secret)
    }

    /// The configured endpoints, parsed.
    ///
    /// # Errors
    ///
    /// Returns error naming the first endpoint URL that fails to parse.
    pub fn endpoints(&self) -> Result<Endpoints> {
        Ok(Endpoints::parse(
            &self.endpoints.authorization_url,
            &self.endpoints.refresh_token_url,
            &self.endpoints.code_token_url,
        )?)
    }

    /// Redirect and wait settings for the interactive flow.
    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            redirect_host: self.redirect.host.clone(),
            redirect_port: self.redirect.port,
            callback_timeout: match self.redirect.callback_timeout_seconds {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use serial_test::serial;
    use tempfile::TempDir;

    const ENV_VARS: [&str; 6] = [
        "LOOPAUTH_CLIENT_ID",
        "LOOPAUTH_CLIENT_SECRET",
        "LOOPAUTH_CLIENT_SECRET_FILE",
        "LOOPAUTH_REDIRECT_PORT",
        "LOOPAUTH_REFRESH_TOKEN_PATH",
        "LOOPAUTH_CALLBACK_TIMEOUT_SECONDS",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.client.client_id = "CID".to_string();
        config.client.client_secret = "SECRET".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.redirect.port, 8080);
        assert_eq!(config.redirect.host, "localhost");
        assert_eq!(
            config.storage.refresh_token_path,
            PathBuf::from(".refreshToken")
        );
        assert_eq!(config.endpoints.authorization_url, GOOGLE_AUTHORIZATION_URL);
        assert!(config.browser.open);
    }

    #[test]
    fn test_config_validation_success() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_missing_client_id() {
        let mut config = valid_config();
        config.client.client_id = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("client_id"), "{err}");
    }

    #[test]
    fn test_config_validation_missing_client_secret() {
        let mut config = valid_config();
        config.client.client_secret = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_endpoint() {
        let mut config = valid_config();
        config.endpoints.code_token_url = "::nope".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("code token"), "{err}");
    }

    #[test]
    fn test_config_validation_empty_token_path() {
        let mut config = valid_config();
        config.storage.refresh_token_path = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
client:
  client_id: yaml-id
  client_secret: yaml-secret
redirect:
  port: 9090
  callback_timeout_seconds: 0
storage:
  refresh_token_path: /tmp/loopauth-token
browser:
  open: false
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.client.client_id, "yaml-id");
        assert_eq!(config.redirect.port, 9090);
        assert_eq!(config.redirect.host, "localhost");
        assert!(!config.browser.open);
        assert_eq!(config.endpoints.code_token_url, GOOGLE_CODE_TOKEN_URL);

        let settings = config.flow_settings();
        assert_eq!(settings.redirect_port, 9090);
        assert_eq!(settings.callback_timeout, None);
    }

    #[test]
    fn test_flow_settings_timeout_in_seconds() {
        let settings = valid_config().flow_settings();
        assert_eq!(settings.callback_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_credentials_from_config() {
        let creds = valid_config().credentials();
        assert_eq!(creds.client_id, "CID");
        assert_eq!(creds.client_secret, "SECRET");
    }

    #[test]
    #[serial]
    fn test_load_applies_env_then_cli() {
        clear_env();
        std::env::set_var("LOOPAUTH_CLIENT_ID", "env-id");
        std::env::set_var("LOOPAUTH_CLIENT_SECRET", "env-secret");
        std::env::set_var("LOOPAUTH_REDIRECT_PORT", "7000");

        let cli = Cli::try_parse_from(["loopauth", "--port", "7100", "forget"]).unwrap();
        let config = Config::load("/definitely/not/here.yaml", &cli).unwrap();
        clear_env();

        assert_eq!(config.client.client_id, "env-id");
        assert_eq!(config.client.client_secret, "env-secret");
        assert_eq!(config.redirect.port, 7100, "CLI overrides env");
    }

    #[test]
    #[serial]
    fn test_load_ignores_invalid_env_port() {
        clear_env();
        std::env::set_var("LOOPAUTH_REDIRECT_PORT", "not-a-port");

        let cli = Cli::try_parse_from(["loopauth", "forget"]).unwrap();
        let config = Config::load("/definitely/not/here.yaml", &cli).unwrap();
        clear_env();

        assert_eq!(config.redirect.port, 8080);
    }

    #[test]
    #[serial]
    fn test_load_reads_installed_client_secret_file() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let secret_path = dir.path().join("client_secret.json");
        std::fs::write(
            &secret_path,
            r#"{"installed":{"client_id":"file-id","client_secret":"file-secret","redirect_uris":["http://localhost"]}}"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "loopauth",
            "--client-secret-file",
            secret_path.to_str().unwrap(),
            "forget",
        ])
        .unwrap();
        let config = Config::load("/definitely/not/here.yaml", &cli).unwrap();

        assert_eq!(config.client.client_id, "file-id");
        assert_eq!(config.client.client_secret, "file-secret");
    }

    #[test]
    #[serial]
    fn test_client_secret_file_does_not_override_explicit_values() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let secret_path = dir.path().join("client_secret.json");
        std::fs::write(
            &secret_path,
            r#"{"client_id":"flat-id","client_secret":"flat-secret"}"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "loopauth",
            "--client-id",
            "cli-id",
            "--client-secret-file",
            secret_path.to_str().unwrap(),
            "forget",
        ])
        .unwrap();
        let config = Config::load("/definitely/not/here.yaml", &cli).unwrap();

        assert_eq!(config.client.client_id, "cli-id");
        assert_eq!(config.client.client_secret, "flat-secret");
    }

    #[test]
    #[serial]
    fn test_missing_client_secret_file_is_an_error() {
        clear_env();
        let cli = Cli::try_parse_from([
            "loopauth",
            "--client-secret-file",
            "/definitely/not/client_secret.json",
            "forget",
        ])
        .unwrap();
        assert!(Config::load("/definitely/not/here.yaml", &cli).is_err());
    }

    #[test]
    #[serial]
    fn test_load_from_yaml_file() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loopauth.yaml");
        std::fs::write(&path, "client:\n  client_id: from-file\n  client_secret: s\n").unwrap();

        let cli = Cli::try_parse_from(["loopauth", "forget"]).unwrap();
        let config = Config::load(path.to_str().unwrap(), &cli).unwrap();

        assert_eq!(config.client.client_id, "from-file");
        assert!(config.validate().is_ok());
    }
}
