use std::path::{Path, PathBuf};
use std::time::Duration;

use facet::Facet;

use crate::error::VkdError;
use crate::{guard, host, paths};

/// Extra-data key VirtualBox reads the VirtualKD payload directory from.
pub const DEFAULT_CONFIG_KEY: &str = "VBoxInternal/Devices/VirtualKD/0/Config/Path";

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct Config {
    #[facet(default)]
    pub host: HostConfig,
    #[facet(default)]
    pub integration: IntegrationConfig,
    #[facet(default)]
    pub command: CommandConfig,
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct HostConfig {
    pub install_dir: Option<String>,
    #[facet(default = 5)]
    pub min_major_version: u32,
    #[facet(default)]
    pub extra_process_names: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            install_dir: None,
            min_major_version: 5,
            extra_process_names: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct IntegrationConfig {
    pub payload_dir: Option<String>,
    #[facet(default = "VBoxInternal/Devices/VirtualKD/0/Config/Path")]
    pub config_key: String,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            payload_dir: None,
            config_key: DEFAULT_CONFIG_KEY.into(),
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct CommandConfig {
    #[facet(default = 120)]
    pub timeout_s: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self { timeout_s: 120 }
    }
}

// ── Settings ──────────────────────────────────────────────

/// Resolved runtime values handed to the session at construction.
#[derive(Debug, Clone)]
pub struct Settings {
    pub install_dir: PathBuf,
    pub manage_exe: PathBuf,
    /// Directory whose path is written under the config key when enabled.
    pub payload_dir: PathBuf,
    pub config_key: String,
    pub timeout: Duration,
    pub min_major_version: u32,
    /// Executable names (without extension) that count as a running host.
    pub process_family: Vec<String>,
}

impl Settings {
    pub fn resolve(config: &Config) -> Result<Self, VkdError> {
        Self::resolve_with_env(config, &|key| std::env::var(key).ok())
    }

    pub fn resolve_with_env(
        config: &Config,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, VkdError> {
        let configured = config.host.install_dir.as_deref().map(Path::new);
        let install_dir = host::locate_install_dir(configured, env)?;

        let payload_dir = match config.integration.payload_dir.as_deref() {
            Some(dir) => PathBuf::from(dir),
            None => paths::exe_dir().map_err(|source| VkdError::Io {
                context: "locating the VirtualKD payload directory".into(),
                source,
            })?,
        };

        let mut process_family: Vec<String> = guard::HOST_PROCESS_FAMILY
            .iter()
            .map(|s| s.to_string())
            .collect();
        process_family.extend(config.host.extra_process_names.iter().cloned());

        Ok(Self {
            manage_exe: paths::manage_exe(&install_dir),
            install_dir,
            payload_dir,
            config_key: config.integration.config_key.clone(),
            timeout: Duration::from_secs(config.command.timeout_s),
            min_major_version: config.host.min_major_version,
            process_family,
        })
    }

    /// The exact string stored under the config key when integration is enabled.
    pub fn payload_path(&self) -> String {
        self.payload_dir.to_string_lossy().into_owned()
    }
}

// ── validation ────────────────────────────────────────────

fn validate_config(config: &Config) -> Result<(), VkdError> {
    if config.host.min_major_version < 1 {
        return Err(VkdError::Validation {
            message: "min_major_version must be at least 1".into(),
        });
    }
    if config.command.timeout_s < 1 {
        return Err(VkdError::Validation {
            message: "timeout_s must be at least 1".into(),
        });
    }

    let key = &config.integration.config_key;
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return Err(VkdError::Validation {
            message: format!("config_key must be non-empty without whitespace (got '{key}')"),
        });
    }

    if let Some(dir) = &config.integration.payload_dir
        && !Path::new(dir).is_absolute()
    {
        return Err(VkdError::Validation {
            message: format!("payload_dir must be absolute (got '{dir}')"),
        });
    }

    for name in &config.host.extra_process_names {
        if name.trim().is_empty() {
            return Err(VkdError::Validation {
                message: "extra_process_names must not contain empty names".into(),
            });
        }
    }

    Ok(())
}

// ── public API ────────────────────────────────────────────

pub fn parse_config(contents: &str, path: &Path) -> Result<Config, VkdError> {
    let config: Config = facet_toml::from_str(contents).map_err(|e| VkdError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config, VkdError> {
    let contents = std::fs::read_to_string(path).map_err(|source| VkdError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&contents, path)
}

/// Load the default config file, falling back to built-in defaults when it
/// does not exist. An explicitly requested file must exist.
pub fn load_or_default(path: Option<&Path>) -> Result<Config, VkdError> {
    match path {
        Some(p) => load_config(p),
        None => {
            let default = paths::default_config_path();
            if default.exists() {
                load_config(&default)
            } else {
                tracing::debug!(path = %default.display(), "no config file, using defaults");
                Ok(Config::default())
            }
        }
    }
}
