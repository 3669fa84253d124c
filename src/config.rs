//! Tool configuration.
//!
//! Config is optional. When present it is a JSON file, looked up in this
//! order: the `--config` flag, `<root>/sleec-report.json`, then the user
//! config directory. Missing fields fall back to the built-in defaults, and
//! a couple of environment variables override the file afterwards.
use crate::inference::ModelId;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const PROJECT_CONFIG_NAME: &str = "sleec-report.json";

/// Overrides the checker binary name used on POSIX hosts.
pub const CHECKER_ENV: &str = "SLEEC_CHECKER";
/// Routes completions through a local command instead of the HTTP endpoint.
pub const LM_COMMAND_ENV: &str = "SLEEC_LM_COMMAND";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub schema_version: u32,
    pub checker_binary: String,
    pub windows_checker_path: PathBuf,
    pub checker_locale: String,
    pub resources_dir: String,
    pub reference_spec_name: String,
    pub api_base: String,
    pub api_key_env: String,
    pub default_model: ModelId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lm_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            checker_binary: "refines".to_string(),
            windows_checker_path: PathBuf::from(r"C:\Program Files\FDR\bin\refines.exe"),
            checker_locale: "C".to_string(),
            resources_dir: "LLM Resources".to_string(),
            reference_spec_name: "SLEEC Spec.pdf".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            default_model: ModelId::default(),
            lm_command: None,
        }
    }
}

/// Resolve, load, override from the environment, and validate.
pub fn load_config(explicit: Option<&Path>, root: &Path) -> Result<Config> {
    let mut config = match resolve_config_path(explicit, root)? {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            read_config(&path)?
        }
        None => Config::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config)?;
    Ok(config)
}

fn resolve_config_path(explicit: Option<&Path>, root: &Path) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(anyhow!("config file not found: {}", path.display()));
        }
        return Ok(Some(path.to_path_buf()));
    }
    let project = root.join(PROJECT_CONFIG_NAME);
    if project.is_file() {
        return Ok(Some(project));
    }
    let user = dirs::config_dir().map(|dir| dir.join("sleec-report").join("config.json"));
    Ok(user.filter(|path| path.is_file()))
}

pub fn read_config(path: &Path) -> Result<Config> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: Config = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(binary) = lookup(CHECKER_ENV).filter(|value| !value.trim().is_empty()) {
        config.checker_binary = binary;
    }
    if let Some(command) = lookup(LM_COMMAND_ENV).filter(|value| !value.trim().is_empty()) {
        config.lm_command = Some(command);
    }
}

pub fn validate_config(config: &Config) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    let required = [
        ("checker_binary", config.checker_binary.as_str()),
        ("checker_locale", config.checker_locale.as_str()),
        ("resources_dir", config.resources_dir.as_str()),
        ("reference_spec_name", config.reference_spec_name.as_str()),
        ("api_base", config.api_base.as_str()),
        ("api_key_env", config.api_key_env.as_str()),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(anyhow!("{field} must be non-empty"));
        }
    }
    if config.windows_checker_path.parent().is_none() {
        return Err(anyhow!("windows_checker_path must include a directory"));
    }
    if matches!(config.lm_command.as_deref(), Some(command) if command.trim().is_empty()) {
        return Err(anyhow!("lm_command must be non-empty when set"));
    }
    Ok(())
}
