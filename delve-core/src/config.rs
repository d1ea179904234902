//! Configuration system for Delve.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/delve/config.toml` and/or `.delve/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelveConfig {
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub research: ResearchConfig,
}

/// Completion service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name. Only "openai" is wired today.
    pub provider: String,
    /// Heavy-tier model used for planning, search, evaluation, expansion and reports.
    pub model: String,
    /// Light-tier model used for clarifying questions.
    pub light_model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Explicit API key. Takes precedence over `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Timeout for every HTTP request, in seconds.
    pub request_timeout_secs: u64,
    /// Developer instructions sent with every request.
    pub instructions: String,
}

/// The developer message sent with every request unless overridden.
pub const DEFAULT_INSTRUCTIONS: &str = "You are an expert Deep Researcher.\n\
You provide complete and in depth research to the user.";

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4.1".to_string(),
            light_model: "gpt-4.1-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            request_timeout_secs: 180,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }
}

impl LlmConfig {
    /// Validate this LLM config and return any warnings.
    ///
    /// Returns an empty Vec if the config is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.request_timeout_secs == 0 {
            warnings.push("request_timeout_secs is 0; every request will time out".to_string());
        }
        if self.model.trim().is_empty() {
            warnings.push("llm.model is empty".to_string());
        }
        if self.light_model.trim().is_empty() {
            warnings.push("llm.light_model is empty".to_string());
        }
        warnings
    }
}

/// Retry behaviour for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retries after the first attempt. 0 disables retrying.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// How the completeness verdict text is turned into a boolean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictRule {
    /// True iff the lowercased text contains "yes" anywhere.
    #[default]
    Substring,
    /// True iff the first word, stripped of punctuation, is "yes".
    Strict,
}

impl std::fmt::Display for VerdictRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerdictRule::Substring => write!(f, "substring"),
            VerdictRule::Strict => write!(f, "strict"),
        }
    }
}

impl std::str::FromStr for VerdictRule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "substring" => Ok(VerdictRule::Substring),
            "strict" => Ok(VerdictRule::Strict),
            other => Err(ConfigError::Invalid {
                message: format!("unknown verdict rule '{other}' (expected substring or strict)"),
            }),
        }
    }
}

/// Research loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Number of clarifying questions to ask.
    pub question_count: usize,
    /// Number of queries requested per plan or expansion.
    pub queries_per_batch: usize,
    /// Maximum rounds (executed batches) before the run is exhausted. 0 disables the cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
    /// Maximum total executed queries before the run is exhausted. 0 disables the cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queries: Option<usize>,
    /// Queries executed concurrently within one batch. 1 is sequential.
    pub query_concurrency: usize,
    pub verdict_rule: VerdictRule,
    /// Directory for exported markdown reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_dir: Option<PathBuf>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            question_count: 5,
            queries_per_batch: 5,
            max_iterations: Some(8),
            max_queries: None,
            query_concurrency: 1,
            verdict_rule: VerdictRule::Substring,
            report_dir: None,
        }
    }
}

impl ResearchConfig {
    /// Validate research settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queries_per_batch == 0 {
            return Err(ConfigError::Invalid {
                message: "research.queries_per_batch must be at least 1".to_string(),
            });
        }
        if self.query_concurrency == 0 {
            return Err(ConfigError::Invalid {
                message: "research.query_concurrency must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `DELVE_`)
/// 2. Workspace-local config (`.delve/config.toml`)
/// 3. User config (`~/.config/delve/config.toml`)
/// 4. Built-in defaults
pub fn load_config(workspace: Option<&Path>) -> Result<DelveConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(DelveConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // DELVE_LLM__MODEL, DELVE_RESEARCH__MAX_ITERATIONS, etc.
    figment = figment.merge(Env::prefixed("DELVE_").split("__"));

    figment.extract().map_err(Box::new)
}

/// Load configuration from a single explicit TOML file on top of the defaults.
pub fn load_config_file(path: &Path) -> Result<DelveConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Figment::from(Serialized::defaults(DelveConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DELVE_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

/// Path of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "delve", "delve")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".delve").join("config.toml")
}

/// Write the default configuration to `.delve/config.toml` in the workspace.
///
/// Returns `Ok(None)` without touching anything if the file already exists.
pub fn write_default_config(workspace: &Path) -> Result<Option<PathBuf>, crate::error::DelveError> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        return Ok(None);
    }
    let toml_str = toml::to_string_pretty(&DelveConfig::default()).map_err(|e| {
        ConfigError::ParseError {
            message: e.to_string(),
        }
    })?;
    crate::persistence::atomic_write(&path, toml_str.as_bytes())?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DelveConfig::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4.1");
        assert_eq!(config.llm.light_model, "gpt-4.1-mini");
        assert_eq!(config.research.queries_per_batch, 5);
        assert_eq!(config.research.query_concurrency, 1);
        assert_eq!(config.research.verdict_rule, VerdictRule::Substring);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = DelveConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: DelveConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.llm.model, config.llm.model);
        assert_eq!(
            deserialized.research.max_iterations,
            config.research.max_iterations
        );
        assert_eq!(deserialized.retry.max_retries, config.retry.max_retries);
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_workspace_config_can_lift_iteration_cap() {
        let dir = tempfile::tempdir().unwrap();
        let delve_dir = dir.path().join(".delve");
        std::fs::create_dir_all(&delve_dir).unwrap();
        std::fs::write(
            delve_dir.join("config.toml"),
            "[research]\nmax_iterations = 0\n",
        )
        .unwrap();

        let config = load_config(Some(dir.path())).unwrap();
        assert_eq!(config.research.max_iterations, Some(0));
        assert!(config.research.validate().is_ok());
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let delve_dir = dir.path().join(".delve");
        std::fs::create_dir_all(&delve_dir).unwrap();
        std::fs::write(
            delve_dir.join("config.toml"),
            r#"
[llm]
model = "gpt-4o"

[research]
queries_per_batch = 3
verdict_rule = "strict"
query_concurrency = 2
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path())).unwrap();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.light_model, "gpt-4.1-mini");
        assert_eq!(config.research.queries_per_batch, 3);
        assert_eq!(config.research.verdict_rule, VerdictRule::Strict);
        assert_eq!(config.research.query_concurrency, 2);
    }

    #[test]
    fn test_load_config_file_missing() {
        let err = load_config_file(Path::new("/nonexistent/delve.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_write_default_config_once() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_default_config(dir.path()).unwrap();
        assert!(first.is_some());
        let second = write_default_config(dir.path()).unwrap();
        assert!(second.is_none());

        let loaded = load_config_file(&first.unwrap()).unwrap();
        assert_eq!(loaded.research.question_count, 5);
    }

    #[test]
    fn test_verdict_rule_from_str() {
        assert_eq!("strict".parse::<VerdictRule>().unwrap(), VerdictRule::Strict);
        assert_eq!(
            "Substring".parse::<VerdictRule>().unwrap(),
            VerdictRule::Substring
        );
        assert!("fuzzy".parse::<VerdictRule>().is_err());
    }

    #[test]
    fn test_research_config_validate() {
        assert!(ResearchConfig::default().validate().is_ok());

        let zero_batch = ResearchConfig {
            queries_per_batch: 0,
            ..Default::default()
        };
        assert!(zero_batch.validate().is_err());

        let zero_concurrency = ResearchConfig {
            query_concurrency: 0,
            ..Default::default()
        };
        assert!(zero_concurrency.validate().is_err());
    }

    #[test]
    fn test_llm_config_validate() {
        assert!(LlmConfig::default().validate().is_empty());
        let bad = LlmConfig {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(bad.validate().len(), 1);
    }
}
