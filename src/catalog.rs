//! Static entity-definition catalog shared immutably across handlers.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Broad category of a placeable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityCategory {
    /// Static structure occupying a rectangle of cells.
    Building,
    /// Mobile unit that can receive move tasks.
    Unit,
    /// Resource-producing entity.
    Resource,
}

/// Read-only metadata describing one entity type.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityDefinition {
    /// Stable catalog identifier (e.g. `house`).
    pub id: String,
    /// Human readable display name.
    pub name: String,
    /// Category of the entity.
    #[serde(rename = "type")]
    pub category: EntityCategory,
    /// Width of the occupied rectangle, in grid cells.
    pub width: i64,
    /// Height of the occupied rectangle, in grid cells.
    pub height: i64,
    /// Build cost.
    pub price: u32,
    /// Seconds between placement and construction completing.
    #[serde(rename = "buildTime")]
    pub build_time_secs: u64,
    /// URL of the display image.
    pub image: String,
    /// Optional flavour text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form numeric stats (combat values, generation yield, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub stats: HashMap<String, i64>,
}

impl EntityDefinition {
    /// Quantity credited per generation tick for this entity type.
    pub fn generation_yield(&self) -> u64 {
        self.stats
            .get("yield")
            .copied()
            .filter(|value| *value > 0)
            .unwrap_or(1) as u64
    }
}

/// Immutable lookup table of entity definitions, loaded once at startup.
///
/// Definitions are owned externally (configuration), never written after
/// load, so the catalog is safe to share across all handlers without locking.
#[derive(Debug, Clone)]
pub struct Catalog {
    definitions: Arc<HashMap<String, Arc<EntityDefinition>>>,
}

impl Catalog {
    /// Build a catalog from the configured definition list.
    ///
    /// Later duplicates of the same id win, mirroring how configuration
    /// overrides baked-in defaults.
    pub fn new(definitions: Vec<EntityDefinition>) -> Self {
        let map = definitions
            .into_iter()
            .map(|definition| (definition.id.clone(), Arc::new(definition)))
            .collect();
        Self {
            definitions: Arc::new(map),
        }
    }

    /// Resolve a definition by its catalog id.
    pub fn get(&self, id: &str) -> Option<Arc<EntityDefinition>> {
        self.definitions.get(id).cloned()
    }

    /// All definitions, sorted by id for stable listings.
    pub fn all(&self) -> Vec<Arc<EntityDefinition>> {
        let mut all: Vec<_> = self.definitions.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Number of definitions in the catalog.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the catalog holds no definitions.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(id: &str, stats: &[(&str, i64)]) -> EntityDefinition {
        EntityDefinition {
            id: id.into(),
            name: id.to_uppercase(),
            category: EntityCategory::Building,
            width: 2,
            height: 2,
            price: 100,
            build_time_secs: 30,
            image: String::new(),
            description: None,
            stats: stats
                .iter()
                .map(|(key, value)| (key.to_string(), *value))
                .collect(),
        }
    }

    #[test]
    fn lookup_resolves_known_ids() {
        let catalog = Catalog::new(vec![definition("house", &[])]);
        assert!(catalog.get("house").is_some());
        assert!(catalog.get("castle").is_none());
    }

    #[test]
    fn generation_yield_defaults_to_one() {
        assert_eq!(definition("farm", &[("yield", 5)]).generation_yield(), 5);
        assert_eq!(definition("house", &[]).generation_yield(), 1);
        assert_eq!(definition("odd", &[("yield", -3)]).generation_yield(), 1);
    }

    #[test]
    fn all_is_sorted_by_id() {
        let catalog = Catalog::new(vec![definition("soldier", &[]), definition("barracks", &[])]);
        let ids: Vec<_> = catalog.all().iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec!["barracks", "soldier"]);
    }
}
