//! Syncer YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::SyncerConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();

    let result = ENV_VAR_RE.replace_all(input, |cap: &regex::Captures<'_>| {
        let var_name = &cap[1];
        std::env::var(var_name).unwrap_or_else(|_| {
            if !missing.iter().any(|m| m == var_name) {
                missing.push(var_name.to_string());
            }
            String::new()
        })
    });

    if !missing.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }

    Ok(result.into_owned())
}

/// Parse a syncer YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_syncer_str(yaml_str: &str) -> Result<SyncerConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    let config: SyncerConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse syncer YAML")?;
    Ok(config)
}

/// Parse a syncer YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_syncer(path: &Path) -> Result<SyncerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read syncer file: {}", path.display()))?;
    parse_syncer_str(&content)
}
