use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory under the project root holding the database and project config.
pub const STATE_DIR: &str = ".talkbridge";

/// Default database file name inside [`STATE_DIR`].
pub const DEFAULT_DB_FILE: &str = "talkbridge.db";

pub const DEFAULT_PENDING_WARN_THRESHOLD: usize = 100;
pub const DEFAULT_WARN_PAUSE_SECS: u64 = 5;
pub const DEFAULT_DELAY_MS: u64 = 2_000;

/// One config file as written on disk. Every key is optional so a project
/// file can override only what it names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub actuator: ActuatorSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSection {
    #[serde(default)]
    pub pending_warn_threshold: Option<usize>,
    #[serde(default)]
    pub warn_pause_secs: Option<u64>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorSection {
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
}

impl ConfigFile {
    /// Layer `self` over `base`: keys set here win, unset keys fall through.
    #[must_use]
    pub fn over(self, base: Self) -> Self {
        Self {
            database: DatabaseSection {
                path: self.database.path.or(base.database.path),
            },
            run: RunSection {
                pending_warn_threshold: self
                    .run
                    .pending_warn_threshold
                    .or(base.run.pending_warn_threshold),
                warn_pause_secs: self.run.warn_pause_secs.or(base.run.warn_pause_secs),
                delay_ms: self.run.delay_ms.or(base.run.delay_ms),
            },
            actuator: ActuatorSection {
                program: self.actuator.program.or(base.actuator.program),
                args: self.actuator.args.or(base.actuator.args),
            },
        }
    }
}

/// Run-loop settings after defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSettings {
    pub pending_warn_threshold: usize,
    pub warn_pause_secs: u64,
    pub delay_ms: u64,
}

impl RunSettings {
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    #[must_use]
    pub const fn warn_pause(&self) -> Duration {
        Duration::from_secs(self.warn_pause_secs)
    }
}

/// Actuator settings after defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActuatorSettings {
    pub program: Option<String>,
    pub args: Vec<String>,
}

/// Project config layered over user config, with defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    /// Database path from config, already resolved against the project root.
    pub database_path: Option<PathBuf>,
    pub run: RunSettings,
    pub actuator: ActuatorSettings,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self::from_layers(ConfigFile::default(), ConfigFile::default(), Path::new("."))
    }
}

impl EffectiveConfig {
    fn from_layers(project: ConfigFile, user: ConfigFile, project_root: &Path) -> Self {
        let merged = project.over(user);
        Self {
            database_path: merged.database.path.map(|p| {
                if p.is_absolute() {
                    p
                } else {
                    project_root.join(p)
                }
            }),
            run: RunSettings {
                pending_warn_threshold: merged
                    .run
                    .pending_warn_threshold
                    .unwrap_or(DEFAULT_PENDING_WARN_THRESHOLD),
                warn_pause_secs: merged.run.warn_pause_secs.unwrap_or(DEFAULT_WARN_PAUSE_SECS),
                delay_ms: merged.run.delay_ms.unwrap_or(DEFAULT_DELAY_MS),
            },
            actuator: ActuatorSettings {
                program: merged
                    .actuator
                    .program
                    .filter(|program| !program.trim().is_empty()),
                args: merged.actuator.args.unwrap_or_default(),
            },
        }
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ConfigFile>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Path of the project config under `project_root`.
#[must_use]
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR).join("config.toml")
}

/// Path of the per-user config, if the platform has a config directory.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("talkbridge/config.toml"))
}

/// Load `.talkbridge/config.toml`; a missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ConfigFile> {
    read_config_file(&project_config_path(project_root))
}

/// Load the per-user config; a missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<ConfigFile> {
    let Some(path) = user_config_path() else {
        return Ok(ConfigFile::default());
    };
    read_config_file(&path)
}

/// Load project and user config and layer them.
///
/// `user_override` replaces the platform user config path (used by tests and
/// by `TALKBRIDGE_USER_CONFIG`).
///
/// # Errors
///
/// Returns an error if a config file exists but cannot be read or parsed.
pub fn resolve_config(project_root: &Path, user_override: Option<&Path>) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = match user_override {
        Some(path) => read_config_file(path)?,
        None => load_user_config()?,
    };
    let config = EffectiveConfig::from_layers(project, user, project_root);
    tracing::debug!(
        db = ?config.database_path,
        actuator = ?config.actuator.program,
        "resolved config"
    );
    Ok(config)
}

/// Pick the database path.
///
/// Precedence: `cli_db` > `env_db` (`TALKBRIDGE_DB`) > config (project,
/// then user) > `<project_root>/.talkbridge/talkbridge.db`.
#[must_use]
pub fn resolve_db_path(
    cli_db: Option<&Path>,
    env_db: Option<&str>,
    config: &EffectiveConfig,
    project_root: &Path,
) -> PathBuf {
    if let Some(path) = cli_db {
        return path.to_path_buf();
    }
    if let Some(path) = env_db.map(str::trim).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    if let Some(path) = &config.database_path {
        return path.clone();
    }
    default_db_path(project_root)
}

#[must_use]
pub fn default_db_path(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR).join(DEFAULT_DB_FILE)
}
