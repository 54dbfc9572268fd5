use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::{DeskPilotError, DeskPilotResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions endpoint URL.
    pub api_base: String,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (falls back to env var DESKPILOT_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Maps oracle roles to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Text-only calls: intent resolution and step planning.
    pub planning: Option<RoleEntry>,
    /// Image calls: screen description and element grounding.
    pub vision: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    /// Use SSE streaming.
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
}

fn default_temperature() -> f64 {
    0.1
}

/// Engine tunables. Read-only while a phase runs; change them between
/// phases through [`SettingsHandle::update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_iterations: u32,
    pub inter_action_delay_secs: f64,
    pub observation_settle_delay_secs: f64,
    /// Number of trailing history entries rendered into each planning prompt.
    pub history_window: usize,
    pub max_response_tokens: u32,
    pub capture: CaptureSettings,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            inter_action_delay_secs: 0.5,
            observation_settle_delay_secs: 1.0,
            history_window: 10,
            max_response_tokens: 4096,
            capture: CaptureSettings::default(),
        }
    }
}

impl AgentSettings {
    /// Settings with every delay set to zero, used by tests and dry runs.
    pub fn without_delays() -> Self {
        Self {
            inter_action_delay_secs: 0.0,
            observation_settle_delay_secs: 0.0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// JPEG qualities tried at full resolution, highest first.
    pub quality_levels: Vec<u8>,
    /// Downscale factors tried once no quality level fits, largest first.
    pub scale_factors: Vec<f32>,
    /// JPEG quality used for every downscaled attempt.
    pub downscale_quality: u8,
    pub max_encoded_bytes: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            quality_levels: vec![90, 80, 70, 60, 50, 40],
            scale_factors: vec![0.75, 0.5, 0.35, 0.25],
            downscale_quality: 60,
            max_encoded_bytes: 4_718_592,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HistoryConfig {
    /// Append every history entry to a per-session JSONL file.
    #[serde(default)]
    pub persist: bool,
    /// Defaults to `<data-local-dir>/deskpilot/sessions`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Shared, explicitly updated view of [`AgentSettings`].
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<AgentSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: AgentSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Copy of the current settings; callers hold it for one phase only.
    pub async fn snapshot(&self) -> AgentSettings {
        self.inner.read().await.clone()
    }

    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut AgentSettings),
    {
        let mut guard = self.inner.write().await;
        f(&mut guard);
        tracing::info!(settings = ?*guard, "agent settings updated");
    }
}

fn resolve_config_path() -> DeskPilotResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(DeskPilotError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> DeskPilotResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> DeskPilotResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    validate(&config)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> DeskPilotResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

/// Upper bound for configured delays.
const MAX_DELAY_SECS: f64 = 3600.0;

fn validate(config: &AppConfig) -> DeskPilotResult<()> {
    let agent = &config.agent;
    if agent.max_iterations == 0 {
        return Err(DeskPilotError::Config("agent.max_iterations must be at least 1".into()));
    }
    if agent.history_window == 0 {
        return Err(DeskPilotError::Config("agent.history_window must be at least 1".into()));
    }
    for (name, secs) in [
        ("inter_action_delay_secs", agent.inter_action_delay_secs),
        ("observation_settle_delay_secs", agent.observation_settle_delay_secs),
    ] {
        if !secs.is_finite() || secs < 0.0 || secs > MAX_DELAY_SECS {
            return Err(DeskPilotError::Config(format!(
                "agent.{name} must be within 0..={MAX_DELAY_SECS} seconds"
            )));
        }
    }
    let capture = &agent.capture;
    if capture.quality_levels.iter().any(|q| *q == 0 || *q > 100)
        || capture.downscale_quality == 0
        || capture.downscale_quality > 100
    {
        return Err(DeskPilotError::Config("capture qualities must be within 1..=100".into()));
    }
    if capture.scale_factors.iter().any(|s| *s <= 0.0 || *s > 1.0) {
        return Err(DeskPilotError::Config("capture scale factors must be within (0, 1]".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[llm]
active_provider = "openai"

[llm.providers.openai]
display_name = "OpenAI"
api_base = "https://api.openai.com/v1/chat/completions"
model = "gpt-4o"
"#;

    #[test]
    fn missing_sections_use_defaults() {
        let config: AppConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.agent, AgentSettings::default());
        assert_eq!(config.agent.history_window, 10);
        assert_eq!(config.agent.capture.max_encoded_bytes, 4_718_592);
        assert!(!config.history.persist);
        assert_eq!(config.llm.providers["openai"].temperature, 0.1);
    }

    #[test]
    fn partial_agent_section_keeps_other_defaults() {
        let text = format!("{MINIMAL}\n[agent]\nmax_iterations = 30\n");
        let config: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(config.agent.max_iterations, 30);
        assert_eq!(config.agent.inter_action_delay_secs, 0.5);
        assert_eq!(config.agent.capture.quality_levels[0], 90);
    }

    #[test]
    fn load_rejects_zero_iterations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, format!("{MINIMAL}\n[agent]\nmax_iterations = 0\n")).unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, DeskPilotError::Config(_)));
    }

    #[test]
    fn load_rejects_out_of_range_delays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, format!("{MINIMAL}\n[agent]\ninter_action_delay_secs = 1e20\n")).unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("inter_action_delay_secs"));

        std::fs::write(&path, format!("{MINIMAL}\n[agent]\nobservation_settle_delay_secs = -1.0\n")).unwrap();
        assert!(matches!(load_config_from(&path), Err(DeskPilotError::Config(_))));
    }

    #[test]
    fn save_then_load_preserves_roles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config: AppConfig = toml::from_str(MINIMAL).unwrap();
        config.llm.roles.vision = Some(RoleEntry {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            stream: false,
            temperature: Some(0.0),
        });
        save_config(&config, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.llm.roles.vision.unwrap().temperature, Some(0.0));
    }

    #[tokio::test]
    async fn updates_are_visible_to_later_snapshots_only() {
        let handle = SettingsHandle::new(AgentSettings::default());
        let before = handle.snapshot().await;
        handle.update(|s| s.max_iterations = 3).await;
        assert_eq!(before.max_iterations, 25);
        assert_eq!(handle.snapshot().await.max_iterations, 3);
    }
}
