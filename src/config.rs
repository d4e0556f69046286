use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::agent::PolicySet;
use crate::error::TelosError;
use crate::store::StoreLayout;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub build: BuildConfig,
    pub agent: AgentConfig,
    pub review: ReviewConfig,
    pub planning: PlanningConfig,
    /// Per-identity allowlist overrides, keyed by identity name.
    pub policies: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub max_iterations: u32,
    pub escalation_threshold: u32,
    pub handoff_after: Option<u32>,
    pub prds_dir: PathBuf,
    pub progress_file: PathBuf,
    pub knowledge_file: PathBuf,
    pub status_file: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            escalation_threshold: 3,
            handoff_after: None,
            prds_dir: PathBuf::from("prds"),
            progress_file: PathBuf::from("progress.txt"),
            knowledge_file: PathBuf::from("AGENTS.md"),
            status_file: PathBuf::from(".telos/status.json"),
        }
    }
}

impl BuildConfig {
    pub fn layout(&self) -> StoreLayout {
        StoreLayout {
            prds_dir: self.prds_dir.clone(),
            progress_file: self.progress_file.clone(),
            knowledge_file: self.knowledge_file.clone(),
        }
    }
}

/// Launch spec for one MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub command: String,
    pub model: String,
    pub timeout_ms: u64,
    pub extra_args: Vec<String>,
    pub skip_permissions: bool,
    pub mcp: BTreeMap<String, McpServerConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let mut mcp = BTreeMap::new();
        mcp.insert(
            "gemini-context".to_string(),
            McpServerConfig {
                command: "uv".to_string(),
                args: vec!["run".into(), "python".into(), "-m".into(), "telos_agent.mcp.gemini".into()],
                env: BTreeMap::new(),
            },
        );
        // Built-in server; its approve tool carries the `confirmed` list the gate checks
        let telos = std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string());
        mcp.insert(
            "reviewer".to_string(),
            McpServerConfig {
                command: telos,
                args: vec!["reviewer-mcp".into()],
                env: BTreeMap::new(),
            },
        );
        mcp.insert(
            "twenty-crm".to_string(),
            McpServerConfig {
                command: "npx".to_string(),
                args: vec!["-y".into(), "twenty-mcp-server".into()],
                env: BTreeMap::new(),
            },
        );

        Self {
            command: "claude".to_string(),
            model: "opus".to_string(),
            timeout_ms: 900_000,
            extra_args: Vec::new(),
            skip_permissions: true,
            mcp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub test_command: Option<String>,
    pub test_timeout_ms: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            test_command: None,
            test_timeout_ms: 600_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    pub model: String,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            model: "sonnet".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            build: BuildConfig::default(),
            agent: AgentConfig::default(),
            review: ReviewConfig::default(),
            planning: PlanningConfig::default(),
            policies: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Primary: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Fallback: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config = Self::from_yaml(&content)?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> std::result::Result<(), TelosError> {
        if self.build.max_iterations == 0 {
            return Err(TelosError::Config("build.max_iterations must be at least 1".to_string()));
        }
        if self.build.escalation_threshold == 0 {
            return Err(TelosError::Config("build.escalation_threshold must be at least 1".to_string()));
        }
        if self.agent.timeout_ms == 0 {
            return Err(TelosError::Config("agent.timeout_ms must be at least 1".to_string()));
        }
        self.policy_set()?;
        Ok(())
    }

    /// Effective capability policies with overrides applied.
    pub fn policy_set(&self) -> std::result::Result<PolicySet, TelosError> {
        PolicySet::with_overrides(&self.policies)
    }
}
