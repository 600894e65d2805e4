use anyhow::{bail, Context as _, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/falkyre/nhl-led-scoreboard/main/plugins_index.json";

#[cfg(target_os = "windows")]
const PROBE_BINARY: &str = "scorehub-probe.exe";
#[cfg(not(target_os = "windows"))]
const PROBE_BINARY: &str = "scorehub-probe";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HubConfig {
    #[serde(default = "default_python_exec", alias = "PYTHON_EXEC")]
    pub python_exec: String,
    #[serde(default = "default_supervisor_url", alias = "SUPERVISOR_URL")]
    pub supervisor_url: String,
    #[serde(default = "default_supervisor_port", alias = "SUPERVISOR_PORT")]
    pub supervisor_port: u16,
    #[serde(default = "default_scoreboard_dir")]
    pub scoreboard_dir: PathBuf,
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,
    #[serde(default)]
    pub probe_exec: Option<String>,
    #[serde(default)]
    pub hub_dir: Option<PathBuf>,
    #[serde(default)]
    pub debug: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            python_exec: default_python_exec(),
            supervisor_url: default_supervisor_url(),
            supervisor_port: default_supervisor_port(),
            scoreboard_dir: default_scoreboard_dir(),
            catalog_url: default_catalog_url(),
            probe_exec: None,
            hub_dir: None,
            debug: false,
        }
    }
}

/// Startup overrides that win over the config file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub scoreboard_dir: Option<PathBuf>,
    pub debug: bool,
}

impl HubConfig {
    pub fn supervisor_endpoint(&self) -> String {
        format!(
            "http://{}:{}/RPC2",
            self.supervisor_url.trim(),
            self.supervisor_port
        )
    }

    /// Directory holding the hub's own helper scripts (issue uploader).
    pub fn hub_dir(&self) -> PathBuf {
        self.hub_dir
            .clone()
            .or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(Path::to_path_buf))
            })
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Broker probe executable: the configured value, then `SCOREHUB_PROBE_BIN`,
    /// then the probe binary shipped next to the hub.
    pub fn probe_exec(&self) -> String {
        self.probe_exec
            .clone()
            .or_else(|| std::env::var("SCOREHUB_PROBE_BIN").ok())
            .filter(|exec| !exec.trim().is_empty())
            .unwrap_or_else(|| {
                self.hub_dir()
                    .join(PROBE_BINARY)
                    .to_string_lossy()
                    .into_owned()
            })
    }

    fn with_absolute_scoreboard_dir(mut self) -> Self {
        if self.scoreboard_dir.is_relative() {
            if let Ok(cwd) = std::env::current_dir() {
                self.scoreboard_dir = cwd.join(&self.scoreboard_dir);
            }
        }
        self
    }
}

pub fn default_config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("config.toml")))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Builds the process-wide configuration once at startup.
///
/// An explicitly named config file must exist. The default file is optional and
/// a broken default file degrades to built-in defaults with an error log.
pub fn load_config(overrides: &ConfigOverrides) -> Result<HubConfig> {
    let mut config = match overrides.config_path.as_deref() {
        Some(path) => {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            load_config_from_path(path)?
        }
        None => {
            let path = default_config_path();
            if path.exists() {
                match load_config_from_path(&path) {
                    Ok(config) => config,
                    Err(err) => {
                        tracing::error!(path = %path.display(), "failed to load config: {err:#}");
                        HubConfig::default()
                    }
                }
            } else {
                tracing::info!(
                    path = %path.display(),
                    "config file not found, using defaults"
                );
                HubConfig::default()
            }
        }
    };

    if let Some(dir) = overrides.scoreboard_dir.as_ref() {
        config.scoreboard_dir = dir.clone();
    }
    config.debug = config.debug || overrides.debug;
    Ok(config.with_absolute_scoreboard_dir())
}

pub fn load_config_from_path(path: &Path) -> Result<HubConfig> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("read config file: {}", path.display()))?;
    let config: HubConfig =
        toml::from_str(&raw).with_context(|| format!("parse config file: {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

fn default_python_exec() -> String {
    "python3".to_string()
}

fn default_supervisor_url() -> String {
    "127.0.0.1".to_string()
}

const fn default_supervisor_port() -> u16 {
    9001
}

fn default_scoreboard_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_catalog_url() -> String {
    DEFAULT_CATALOG_URL.to_string()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_fields_missing() {
        let config: HubConfig = toml::from_str("").expect("parse empty config");
        assert_eq!(config.supervisor_port, 9001);
        assert_eq!(config.supervisor_url, "127.0.0.1");
        assert_eq!(config.catalog_url, DEFAULT_CATALOG_URL);
    }

    #[test]
    fn accepts_upper_case_keys() {
        let raw = r#"
PORT = 8080
PYTHON_EXEC = "/opt/venv/bin/python"
SUPERVISOR_URL = "10.0.0.5"
SUPERVISOR_PORT = 9101
scoreboard_dir = "/home/pi/nhl-led-scoreboard"
"#;
        let config: HubConfig = toml::from_str(raw).expect("parse config");
        assert_eq!(config.python_exec, "/opt/venv/bin/python");
        assert_eq!(config.supervisor_endpoint(), "http://10.0.0.5:9101/RPC2");
        assert_eq!(
            config.scoreboard_dir,
            PathBuf::from("/home/pi/nhl-led-scoreboard")
        );
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let overrides = ConfigOverrides {
            config_path: Some(dir.path().join("nope.toml")),
            ..ConfigOverrides::default()
        };
        assert!(load_config(&overrides).is_err());
    }

    #[test]
    fn command_line_scoreboard_dir_wins_over_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "scoreboard_dir = \"/from/file\"\ndebug = false\n").expect("write");

        let overrides = ConfigOverrides {
            config_path: Some(path),
            scoreboard_dir: Some(PathBuf::from("/from/cli")),
            debug: true,
        };
        let config = load_config(&overrides).expect("load config");
        assert_eq!(config.scoreboard_dir, PathBuf::from("/from/cli"));
        assert!(config.debug);
    }

    #[test]
    fn relative_scoreboard_dir_is_made_absolute() {
        let config = HubConfig {
            scoreboard_dir: PathBuf::from("board"),
            ..HubConfig::default()
        }
        .with_absolute_scoreboard_dir();
        assert!(config.scoreboard_dir.is_absolute());
        assert!(config.scoreboard_dir.ends_with("board"));
    }

    #[test]
    fn probe_exec_defaults_next_to_hub_binaries() {
        let config = HubConfig {
            hub_dir: Some(PathBuf::from("/opt/scorehub")),
            ..HubConfig::default()
        };
        if std::env::var_os("SCOREHUB_PROBE_BIN").is_none() {
            assert_eq!(
                PathBuf::from(config.probe_exec()),
                PathBuf::from("/opt/scorehub").join(PROBE_BINARY)
            );
        }

        let configured = HubConfig {
            probe_exec: Some("/usr/local/bin/mqtt-check".to_string()),
            ..config
        };
        assert_eq!(configured.probe_exec(), "/usr/local/bin/mqtt-check");
    }
}
