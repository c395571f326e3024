//! Orchestrator configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::error::{OrchestratorError, Result};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_AGENT_COMMAND: &str = "claude";

const DEFAULT_PROMPT: &str =
    "Please read the INSTRUCTIONS.md file and complete all tasks. Remember to type \"exit\" when done.";

/// Settings shared by every agent the pool launches
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// Time between the `exit` token and a forced kill
    #[serde(serialize_with = "as_millis")]
    pub grace_period: Duration,
    /// Lifetime after which a still-running worker is asked to exit
    #[serde(serialize_with = "as_millis")]
    pub idle_timeout: Duration,
    /// Directory under which per-assignment workspaces are created
    pub workspace_root: PathBuf,
    /// Worker executable
    pub agent_command: String,
    /// Worker arguments
    pub agent_args: Vec<String>,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            workspace_root: PathBuf::from("./workspaces"),
            agent_command: DEFAULT_AGENT_COMMAND.to_string(),
            agent_args: vec![
                "--dangerously-skip-permissions".to_string(),
                DEFAULT_PROMPT.to_string(),
            ],
        }
    }
}

impl OrchestratorConfig {
    /// Build a config from `BOSS_*` environment variables, falling back to
    /// defaults for anything unset
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = lookup("BOSS_GRACE_PERIOD_MS") {
            config.grace_period = parse_millis("BOSS_GRACE_PERIOD_MS", &ms)?;
        }
        if let Some(ms) = lookup("BOSS_IDLE_TIMEOUT_MS") {
            config.idle_timeout = parse_millis("BOSS_IDLE_TIMEOUT_MS", &ms)?;
        }
        if let Some(root) = lookup("BOSS_WORKSPACE_ROOT") {
            config.workspace_root = PathBuf::from(root);
        }
        if let Some(command) = lookup("BOSS_AGENT_COMMAND") {
            config.agent_command = command;
        }
        if let Some(args) = lookup("BOSS_AGENT_ARGS") {
            config.agent_args = args.split_whitespace().map(str::to_string).collect();
        }

        Ok(config)
    }

    /// Set the grace period
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Set the idle timeout
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the workspace root
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Set the worker command and its arguments
    pub fn with_agent_command<I, S>(mut self, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.agent_command = command.into();
        self.agent_args = args.into_iter().map(Into::into).collect();
        self
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| OrchestratorError::InvalidConfig {
            key: key.to_string(),
            message: format!("{:?} is not a number of milliseconds: {}", value, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.grace_period, Duration::from_secs(1));
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
        assert_eq!(config.agent_command, "claude");
        assert_eq!(config.agent_args[0], "--dangerously-skip-permissions");
    }

    #[test]
    fn test_env_overrides() {
        let config = OrchestratorConfig::from_lookup(lookup_from(&[
            ("BOSS_GRACE_PERIOD_MS", "250"),
            ("BOSS_IDLE_TIMEOUT_MS", "5000"),
            ("BOSS_WORKSPACE_ROOT", "/tmp/boss"),
            ("BOSS_AGENT_COMMAND", "worker"),
            ("BOSS_AGENT_ARGS", "--fast  --quiet"),
        ]))
        .unwrap();

        assert_eq!(config.grace_period, Duration::from_millis(250));
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.workspace_root, PathBuf::from("/tmp/boss"));
        assert_eq!(config.agent_command, "worker");
        assert_eq!(config.agent_args, vec!["--fast", "--quiet"]);
    }

    #[test]
    fn test_malformed_duration_is_rejected() {
        let result =
            OrchestratorConfig::from_lookup(lookup_from(&[("BOSS_GRACE_PERIOD_MS", "soon")]));
        match result {
            Err(OrchestratorError::InvalidConfig { key, .. }) => {
                assert_eq!(key, "BOSS_GRACE_PERIOD_MS")
            }
            other => panic!("Expected InvalidConfig, got: {:?}", other),
        }
    }

    #[test]
    fn test_serializes_durations_as_millis() {
        let json = serde_json::to_value(OrchestratorConfig::default()).unwrap();
        assert_eq!(json["gracePeriod"], 1000);
        assert_eq!(json["idleTimeout"], 15000);
    }
}
