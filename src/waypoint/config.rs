// SPDX-License-Identifier: MIT

//! Runtime settings
//!
//! Settings come from an optional YAML file and are then overridden by
//! environment variables (loaded from `.env` by the binary).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{CheckpointStore, JsonFileCheckpointStore, MemoryCheckpointStore};
use crate::waypoint::error::WaypointError;

/// File picked up when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "waypoint.yaml";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Step executions allowed per invocation
    pub max_steps: usize,
    /// Directory of the JSON checkpoint store; in-memory when unset
    pub checkpoint_dir: Option<PathBuf>,
    /// Age after which in-memory checkpoints are evicted
    pub checkpoint_ttl_secs: Option<u64>,
    pub port: u16,
    #[serde(skip_serializing)]
    pub brave_api_key: Option<String>,
    pub outreach: OutreachSettings,
    pub collaboration: CollaborationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_steps: 100,
            checkpoint_dir: None,
            checkpoint_ttl_secs: None,
            port: 8080,
            brave_api_key: None,
            outreach: OutreachSettings::default(),
            collaboration: CollaborationSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OutreachSettings {
    pub default_delay_secs: u64,
    pub default_max_profiles: usize,
}

impl Default for OutreachSettings {
    fn default() -> Self {
        Self {
            default_delay_secs: 5,
            default_max_profiles: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CollaborationSettings {
    pub max_results: usize,
    pub max_pages: usize,
}

impl Default for CollaborationSettings {
    fn default() -> Self {
        Self {
            max_results: 10,
            max_pages: 10,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from `waypoint.yaml` when present,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, WaypointError> {
        let mut settings = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(WaypointError::config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                Self::from_yaml(&std::fs::read_to_string(path)?)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_yaml(&std::fs::read_to_string(DEFAULT_CONFIG_FILE)?)?
            }
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_yaml(content: &str) -> Result<Self, WaypointError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply `WAYPOINT_*` and `BRAVE_API_KEY` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), WaypointError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("WAYPOINT_MAX_STEPS") {
            self.max_steps = parse_var("WAYPOINT_MAX_STEPS", &value)?;
        }
        if let Some(value) = lookup("WAYPOINT_CHECKPOINT_DIR") {
            if !value.trim().is_empty() {
                self.checkpoint_dir = Some(PathBuf::from(value.trim()));
            }
        }
        if let Some(value) = lookup("WAYPOINT_CHECKPOINT_TTL_SECS") {
            self.checkpoint_ttl_secs = Some(parse_var("WAYPOINT_CHECKPOINT_TTL_SECS", &value)?);
        }
        if let Some(value) = lookup("WAYPOINT_PORT") {
            self.port = parse_var("WAYPOINT_PORT", &value)?;
        }
        if let Some(value) = lookup("BRAVE_API_KEY") {
            if !value.is_empty() {
                self.brave_api_key = Some(value);
            }
        }
        Ok(())
    }

    /// Build the checkpoint store for one workflow; file stores get a
    /// subdirectory per workflow so thread ids never cross graphs.
    ///
    /// The in-memory store gets a background sweeper when a TTL is set,
    /// so this must be called inside a tokio runtime in that case.
    pub fn checkpoint_store(&self, workflow: &str) -> Result<Arc<dyn CheckpointStore>, WaypointError> {
        if let Some(dir) = &self.checkpoint_dir {
            let dir = dir.join(workflow);
            log::info!("Using JSON checkpoint store at {}", dir.display());
            return Ok(Arc::new(JsonFileCheckpointStore::new(dir)?));
        }

        let store = Arc::new(MemoryCheckpointStore::new());
        if let Some(ttl) = self.checkpoint_ttl_secs {
            let ttl = Duration::from_secs(ttl);
            let interval = ttl.clamp(Duration::from_secs(1), Duration::from_secs(60));
            let _sweeper = store.clone().spawn_sweeper(ttl, interval);
            log::info!("In-memory checkpoints expire after {}s", ttl.as_secs());
        }
        Ok(store)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, WaypointError> {
    value
        .trim()
        .parse()
        .map_err(|_| WaypointError::config(format!("{} has an invalid value '{}'", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_steps, 100);
        assert_eq!(settings.port, 8080);
        assert!(settings.checkpoint_dir.is_none());
        assert_eq!(settings.outreach.default_delay_secs, 5);
        assert_eq!(settings.outreach.default_max_profiles, 10);
        assert_eq!(settings.collaboration.max_pages, 10);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
max_steps: 50
outreach:
  default_delay_secs: 1
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.max_steps, 50);
        assert_eq!(settings.outreach.default_delay_secs, 1);
        assert_eq!(settings.outreach.default_max_profiles, 10);
        assert_eq!(settings.port, 8080);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Settings::from_yaml("  \n").unwrap(), Settings::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut settings = Settings::from_yaml("port: 9000\nmax_steps: 20").unwrap();
        settings
            .apply_overrides(env(&[
                ("WAYPOINT_PORT", "3000"),
                ("WAYPOINT_CHECKPOINT_DIR", "/tmp/waypoint"),
                ("BRAVE_API_KEY", "key-123"),
            ]))
            .unwrap();

        assert_eq!(settings.port, 3000);
        assert_eq!(settings.max_steps, 20);
        assert_eq!(settings.checkpoint_dir, Some(PathBuf::from("/tmp/waypoint")));
        assert_eq!(settings.brave_api_key.as_deref(), Some("key-123"));
    }

    #[test]
    fn test_invalid_env_value() {
        let mut settings = Settings::default();
        let err = settings
            .apply_overrides(env(&[("WAYPOINT_MAX_STEPS", "lots")]))
            .unwrap_err();
        assert!(matches!(err, WaypointError::Config(_)));
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let settings = Settings {
            brave_api_key: Some("secret".to_string()),
            ..Settings::default()
        };
        let yaml = serde_yaml::to_string(&settings).unwrap();
        assert!(!yaml.contains("secret"));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Settings::load(Some(Path::new("/nonexistent/waypoint.yaml"))).unwrap_err();
        assert!(matches!(err, WaypointError::Config(_)));
    }

    #[tokio::test]
    async fn test_file_store_from_settings() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            checkpoint_dir: Some(dir.path().join("checkpoints")),
            ..Settings::default()
        };
        let store = settings.checkpoint_store("outreach").unwrap();
        assert!(store.thread_ids().await.unwrap().is_empty());
        assert!(dir.path().join("checkpoints").join("outreach").is_dir());
    }
}
