//! WebSocket message shapes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::map::EntityView;

/// Messages accepted from WebSocket clients.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "action")]
pub enum ClientMessage {
    /// Point this connection's subscription at a region, replacing any
    /// previous one.
    #[serde(rename = "SUBSCRIBE_REGION")]
    SubscribeRegion {
        /// Region to subscribe to.
        #[serde(rename = "regionId")]
        region_id: String,
    },
    /// Forward-compatibility catch-all for unrecognized actions.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a client frame from its JSON text.
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Kind of change carried by a region broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    /// A new entity was placed.
    Insert,
    /// An existing entity changed state.
    Modify,
    /// An entity was removed.
    Remove,
}

/// Event fanned out to every connection subscribed to a region.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "action")]
pub enum RegionEvent {
    /// An entity in the region was inserted, modified or removed.
    #[serde(rename = "ENTITY_UPDATED", rename_all = "camelCase")]
    EntityUpdated {
        /// Kind of change.
        change_type: ChangeType,
        /// Fully materialized entity, definition resolved.
        entity: EntityView,
    },
}

impl RegionEvent {
    /// Build an `ENTITY_UPDATED` event.
    pub fn entity_updated(change_type: ChangeType, entity: EntityView) -> Self {
        RegionEvent::EntityUpdated {
            change_type,
            entity,
        }
    }
}

/// Non-broadcast frames sent to an individual client.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "action")]
pub enum ServerMessage {
    /// Acknowledges a successful region subscription.
    #[serde(rename = "SUBSCRIBED", rename_all = "camelCase")]
    Subscribed {
        /// Region the connection is now subscribed to.
        region_id: String,
    },
    /// Reports a rejected or failed client frame.
    #[serde(rename = "ERROR")]
    Error {
        /// Human readable description.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_region_parses() {
        let message =
            ClientMessage::from_json_str(r#"{"action":"SUBSCRIBE_REGION","regionId":"R1"}"#)
                .unwrap();
        match message {
            ClientMessage::SubscribeRegion { region_id } => assert_eq!(region_id, "R1"),
            other => panic!("expected subscribe, got {other:?}"),
        }
    }

    #[test]
    fn unknown_actions_do_not_fail_parsing() {
        let message = ClientMessage::from_json_str(r#"{"action":"DANCE"}"#).unwrap();
        assert!(matches!(message, ClientMessage::Unknown));
    }

    #[test]
    fn region_event_wire_shape() {
        use crate::{
            catalog::{EntityCategory, EntityDefinition},
            dao::models::{EntityParams, EntityRecord},
        };

        let definition = EntityDefinition {
            id: "house".into(),
            name: "House".into(),
            category: EntityCategory::Building,
            width: 2,
            height: 2,
            price: 100,
            build_time_secs: 30,
            image: String::new(),
            description: None,
            stats: Default::default(),
        };
        let record = EntityRecord {
            region_id: "R1".into(),
            entity_key: "house#2_2#abc".into(),
            entity_definition_id: "house".into(),
            x: 2,
            y: 2,
            owner_id: None,
            params: EntityParams::default(),
        };
        let event = RegionEvent::entity_updated(
            ChangeType::Modify,
            EntityView::materialize(record, &definition),
        );

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["action"], "ENTITY_UPDATED");
        assert_eq!(json["changeType"], "MODIFY");
        assert_eq!(json["entity"]["entityKey"], "house#2_2#abc");
        assert_eq!(json["entity"]["entityDefinition"]["id"], "house");
    }
}
