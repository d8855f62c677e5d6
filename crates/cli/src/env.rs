use crate::error::CliError;
use std::{collections::HashMap, path::Path};
use tracing::debug;

/// Variables available to `${VAR}` placeholders in the config document:
/// the process environment, optionally extended by a `.env` file.
#[derive(Debug, Clone, Default)]
pub struct EnvVars {
    vars: HashMap<String, String>,
}

impl EnvVars {
    pub fn from_process() -> Self {
        EnvVars {
            vars: std::env::vars().collect(),
        }
    }

    /// Adds variables from a `.env` file. Values already set in the process
    /// environment are kept.
    pub fn load_file(&mut self, path: &Path) -> Result<(), CliError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read env file {}: {e}", path.display()))
        })?;
        let added = self.merge(&content)?;
        debug!(path = %path.display(), added, "Env file loaded");
        Ok(())
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.vars
    }

    fn merge(&mut self, content: &str) -> Result<usize, CliError> {
        let mut added = 0;
        for (key, value) in parse_env(content)? {
            if !self.vars.contains_key(&key) {
                self.vars.insert(key, value);
                added += 1;
            }
        }
        Ok(added)
    }
}

fn parse_env(content: &str) -> Result<Vec<(String, String)>, CliError> {
    let mut pairs = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid env file: malformed line {} (expected KEY=VALUE)",
                idx + 1
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::Config(format!(
                "Invalid env file: empty key at line {}",
                idx + 1
            )));
        }
        pairs.push((key.to_string(), unquote(value.trim()).to_string()));
    }
    Ok(pairs)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
