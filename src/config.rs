//! Application-level configuration loading, including the entity catalog and
//! trigger delivery policy.

use std::{collections::HashMap, env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::catalog::{EntityCategory, EntityDefinition};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "GRID_NATIONS_BACK_CONFIG_PATH";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    definitions: Vec<EntityDefinition>,
    delivery: DeliveryPolicy,
}

/// Retry budget applied when delivering a fired trigger to the finalizer.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryPolicy {
    /// Maximum finalize attempts before a trigger is dead-lettered.
    pub max_attempts: u32,
    /// Delay between consecutive delivery attempts.
    pub retry_delay: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// baked-in entity catalog and delivery policy.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        definitions = config.definitions.len(),
                        "loaded entity catalog from config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Entity definitions to seed the catalog with.
    pub fn definitions(&self) -> &[EntityDefinition] {
        &self.definitions
    }

    /// Trigger delivery retry policy.
    pub fn delivery(&self) -> DeliveryPolicy {
        self.delivery
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            definitions: default_definitions(),
            delivery: DeliveryPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    entities: Vec<EntityDefinition>,
    #[serde(default)]
    delivery: Option<RawDeliveryPolicy>,
}

#[derive(Debug, Deserialize)]
/// JSON representation of the trigger delivery policy.
struct RawDeliveryPolicy {
    max_attempts: u32,
    retry_delay_ms: u64,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let definitions = if value.entities.is_empty() {
            default_definitions()
        } else {
            value.entities
        };
        let delivery = value
            .delivery
            .map(|raw| DeliveryPolicy {
                max_attempts: raw.max_attempts.max(1),
                retry_delay: Duration::from_millis(raw.retry_delay_ms),
            })
            .unwrap_or_default();
        Self {
            definitions,
            delivery,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in entity catalog shipped with the binary.
fn default_definitions() -> Vec<EntityDefinition> {
    vec![
        EntityDefinition {
            id: "house".into(),
            name: "House".into(),
            category: EntityCategory::Building,
            width: 2,
            height: 2,
            price: 100,
            build_time_secs: 30,
            image: "https://placehold.co/100x100?text=House".into(),
            description: Some("Provides housing for your population.".into()),
            stats: HashMap::new(),
        },
        EntityDefinition {
            id: "barracks".into(),
            name: "Barracks".into(),
            category: EntityCategory::Building,
            width: 3,
            height: 3,
            price: 250,
            build_time_secs: 60,
            image: "https://placehold.co/100x100?text=Barracks".into(),
            description: Some("Trains basic military units.".into()),
            stats: HashMap::new(),
        },
        EntityDefinition {
            id: "farm".into(),
            name: "Farm".into(),
            category: EntityCategory::Resource,
            width: 3,
            height: 2,
            price: 150,
            build_time_secs: 45,
            image: "https://placehold.co/100x100?text=Farm".into(),
            description: Some("Generates food for the owning nation.".into()),
            stats: HashMap::from([("yield".to_string(), 5)]),
        },
        EntityDefinition {
            id: "soldier".into(),
            name: "Soldier".into(),
            category: EntityCategory::Unit,
            width: 1,
            height: 1,
            price: 50,
            build_time_secs: 20,
            image: "https://placehold.co/100x100?text=Soldier".into(),
            description: Some("Basic infantry unit with moderate attack power.".into()),
            stats: HashMap::from([("health".to_string(), 100), ("attack".to_string(), 10)]),
        },
    ]
}
