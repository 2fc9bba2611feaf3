//! Configuration Vault – reads/writes `~/.synapse/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use synapse_capabilities::Stimulus;
use synapse_kernel::{DEFAULT_MAX_WAITERS, DEFAULT_RETENTION_THRESHOLD, SummaryPolicy};
use synapse_runtime::CycleConfig;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("Failed to write config at {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Secrets
// ─────────────────────────────────────────────────────────────────────────────

/// An API key, wiped from memory on drop and never printed.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.is_empty() { "<not set>" } else { "<redacted>" })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

/// When the decision cycle compresses history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    #[default]
    Threshold,
    Always,
    Off,
}

/// Persisted user configuration stored in `~/.synapse/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity under which state is saved and restored.
    pub agent_name: String,
    /// System instructions describing the agent.
    pub instructions: String,
    /// Base URL of an OpenAI-compatible server.
    pub llm_base_url: String,
    pub decision_model: String,
    pub summary_model: String,
    #[serde(skip_serializing_if = "ApiKey::is_empty")]
    pub api_key: ApiKey,
    pub summary_mode: SummaryMode,
    pub summary_threshold: usize,
    pub max_waiters: usize,
    pub decision_timeout_secs: u64,
    pub summary_timeout_secs: u64,
    pub repeat_threshold: usize,
    /// SQLite file for agent state; no persistence when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_db: Option<PathBuf>,
    pub landmarks: Vec<String>,
    pub stimuli: Vec<Stimulus>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_name: "synapse".to_string(),
            instructions: "You are a helpful household robot. You can talk with the user, \
                           move between landmarks and use your arm."
                .to_string(),
            llm_base_url: "http://localhost:11434".to_string(),
            decision_model: "llama3".to_string(),
            summary_model: "llama3".to_string(),
            api_key: ApiKey::default(),
            summary_mode: SummaryMode::Threshold,
            summary_threshold: DEFAULT_RETENTION_THRESHOLD,
            max_waiters: DEFAULT_MAX_WAITERS,
            decision_timeout_secs: 60,
            summary_timeout_secs: 60,
            repeat_threshold: 3,
            state_db: None,
            landmarks: vec!["kitchen".into(), "living room".into(), "front door".into()],
            stimuli: Vec::new(),
        }
    }
}

impl Config {
    pub fn summary_policy(&self) -> SummaryPolicy {
        match self.summary_mode {
            SummaryMode::Threshold => SummaryPolicy::Threshold(self.summary_threshold),
            SummaryMode::Always => SummaryPolicy::Always,
            SummaryMode::Off => SummaryPolicy::Disabled,
        }
    }

    pub fn cycle_config(&self) -> CycleConfig {
        CycleConfig {
            decision_timeout: Duration::from_secs(self.decision_timeout_secs),
            summary_timeout: Duration::from_secs(self.summary_timeout_secs),
            repeat_threshold: self.repeat_threshold,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Disk access
// ─────────────────────────────────────────────────────────────────────────────

/// Return the path to `~/.synapse/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".synapse").join("config.toml")
}

/// Load the config at `path`, writing the defaults there first when the file
/// does not exist.  Returns the config and whether it was just created.
pub fn load_or_init(path: &Path) -> Result<(Config, bool), ConfigError> {
    match load_from(path)? {
        Some(cfg) => Ok((cfg, false)),
        None => {
            save_to(&Config::default(), path)?;
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            Ok((cfg, true))
        }
    }
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg: Config = toml::from_str(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `SYNAPSE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SYNAPSE_LLM_URL` | `llm_base_url` |
/// | `SYNAPSE_MODEL` | `decision_model` |
/// | `SYNAPSE_API_KEY` | `api_key` |
/// | `SYNAPSE_AGENT` | `agent_name` |
/// | `SYNAPSE_STATE_DB` | `state_db` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SYNAPSE_LLM_URL") {
        cfg.llm_base_url = v;
    }
    if let Ok(v) = std::env::var("SYNAPSE_MODEL") {
        cfg.decision_model = v;
    }
    if let Ok(v) = std::env::var("SYNAPSE_API_KEY") {
        cfg.api_key = ApiKey::new(v);
    }
    if let Ok(v) = std::env::var("SYNAPSE_AGENT")
        && !v.trim().is_empty()
    {
        cfg.agent_name = v;
    }
    if let Ok(v) = std::env::var("SYNAPSE_STATE_DB") {
        cfg.state_db = (!v.is_empty()).then(|| PathBuf::from(v));
    }
}

/// Save the config to `path`, creating its directory if necessary.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
        // Owner-only directory (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(write_err)?;
        }
    }
    let raw = toml::to_string_pretty(cfg)?;
    // Owner-only file (rw-------) on Unix; the API key may live here.
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_api_key() {
        let cfg = Config {
            api_key: ApiKey::new("sk-super-secret"),
            ..Config::default()
        };
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("sk-super-secret"));
        assert!(rendered.contains("<redacted>"));
        assert!(format!("{:?}", Config::default()).contains("<not set>"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).unwrap();

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn first_run_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let (_, created) = load_or_init(&path).unwrap();
        assert!(created);
        assert!(path.exists());

        let (cfg, created) = load_or_init(&path).unwrap();
        assert!(!created);
        assert_eq!(cfg.summary_threshold, 10);
        assert_eq!(cfg.max_waiters, 1);
        assert_eq!(cfg.summary_mode, SummaryMode::Threshold);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
agent_name = "helper"
summary_mode = "always"
stimuli = [{ label = "check the battery", every_secs = 600 }]
"#,
        )
        .unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.agent_name, "helper");
        assert_eq!(cfg.summary_policy(), SummaryPolicy::Always);
        assert_eq!(cfg.stimuli[0].every_secs, 600);
        assert_eq!(cfg.decision_timeout_secs, 60);
    }

    #[test]
    fn api_key_survives_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config {
            api_key: ApiKey::new("sk-test"),
            ..Config::default()
        };
        save_to(&cfg, &path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("api_key = \"sk-test\""));
        let loaded = load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.api_key.expose(), "sk-test");
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_waiters = \"many\"").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn modes_map_to_policies() {
        let mut cfg = Config::default();
        assert_eq!(cfg.summary_policy(), SummaryPolicy::Threshold(10));
        cfg.summary_mode = SummaryMode::Off;
        assert_eq!(cfg.summary_policy(), SummaryPolicy::Disabled);
        assert_eq!(cfg.cycle_config().repeat_threshold, 3);
    }

    #[test]
    fn env_overrides_apply() {
        // SAFETY: the only test in this crate that touches these variables.
        unsafe {
            std::env::set_var("SYNAPSE_MODEL", "gpt-4o");
            std::env::set_var("SYNAPSE_STATE_DB", "/tmp/synapse.db");
            std::env::set_var("SYNAPSE_AGENT", "   ");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.decision_model, "gpt-4o");
        assert_eq!(cfg.state_db, Some(PathBuf::from("/tmp/synapse.db")));
        assert_eq!(cfg.agent_name, "synapse");
        unsafe {
            std::env::remove_var("SYNAPSE_MODEL");
            std::env::remove_var("SYNAPSE_STATE_DB");
            std::env::remove_var("SYNAPSE_AGENT");
        }
    }
}
