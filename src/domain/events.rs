//! Domain Events
//!
//! The closed set of facts recorded on a user stream. The enum is
//! adjacently tagged, so a serialized event is exactly the log envelope
//! `{"type": "...", "data": {...}}` and nothing else travels on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Base fields carried by every event, flattened into the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    pub aggregate_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCreated {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordChanged {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub new_password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailChanged {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub old_email: String,
    pub new_email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDeactivated {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRecorded {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub ip_address: String,
    pub user_agent: String,
}

/// User-related events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UserEvent {
    #[serde(rename = "user.created")]
    Created(UserCreated),

    #[serde(rename = "user.password.changed")]
    PasswordChanged(PasswordChanged),

    #[serde(rename = "user.email.changed")]
    EmailChanged(EmailChanged),

    #[serde(rename = "user.deactivated")]
    Deactivated(UserDeactivated),

    #[serde(rename = "user.login.recorded")]
    LoginRecorded(LoginRecorded),
}

/// Wire names of all known event types.
pub const EVENT_TYPES: [&str; 5] = [
    "user.created",
    "user.password.changed",
    "user.email.changed",
    "user.deactivated",
    "user.login.recorded",
];

/// Whether `event_type` belongs to the closed set this service understands.
pub fn is_known_event_type(event_type: &str) -> bool {
    EVENT_TYPES.contains(&event_type)
}

impl UserEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "user.created",
            UserEvent::PasswordChanged(_) => "user.password.changed",
            UserEvent::EmailChanged(_) => "user.email.changed",
            UserEvent::Deactivated(_) => "user.deactivated",
            UserEvent::LoginRecorded(_) => "user.login.recorded",
        }
    }

    /// Base fields shared by every event.
    pub fn meta(&self) -> &EventMeta {
        match self {
            UserEvent::Created(e) => &e.meta,
            UserEvent::PasswordChanged(e) => &e.meta,
            UserEvent::EmailChanged(e) => &e.meta,
            UserEvent::Deactivated(e) => &e.meta,
            UserEvent::LoginRecorded(e) => &e.meta,
        }
    }

    pub fn aggregate_id(&self) -> Uuid {
        self.meta().aggregate_id
    }

    pub fn version(&self) -> i64 {
        self.meta().version
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.meta().timestamp
    }

    /// The envelope `data` object: base fields plus event-specific fields.
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        Ok(value
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    /// Rebuild an event from its stored parts. Returns `None` for event
    /// types outside the closed set so readers can skip them.
    pub fn from_parts(
        event_type: &str,
        data: &serde_json::Value,
    ) -> Result<Option<UserEvent>, serde_json::Error> {
        if !is_known_event_type(event_type) {
            return Ok(None);
        }
        let event = serde_json::from_value(serde_json::json!({
            "type": event_type,
            "data": data,
        }))?;
        Ok(Some(event))
    }
}

/// Loosely parsed log message. Consumers parse this first so an unknown
/// event type can be logged and skipped instead of failing the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
}

impl RawEnvelope {
    /// Decode into a typed event; `None` when the type is unknown.
    pub fn decode(&self) -> Result<Option<UserEvent>, serde_json::Error> {
        UserEvent::from_parts(&self.event_type, &self.data)
    }

    /// Base fields of the carried event.
    pub fn meta(&self) -> Result<EventMeta, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(version: i64) -> EventMeta {
        EventMeta {
            aggregate_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            version,
        }
    }

    #[test]
    fn test_event_serializes_as_envelope() {
        let event = UserEvent::Created(UserCreated {
            meta: meta(1),
            email: "alice@example.com".to_string(),
            password_hash: "$2b$12$hash".to_string(),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "user.created");
        assert_eq!(value["data"]["email"], "alice@example.com");
        assert!(value["data"]["aggregate_id"].is_string());
        assert_eq!(value["data"]["version"], 1);
        assert!(value["data"]["timestamp"].is_string());
    }

    #[test]
    fn test_event_roundtrip() {
        let event = UserEvent::EmailChanged(EmailChanged {
            meta: meta(3),
            old_email: "a@x.io".to_string(),
            new_email: "a@y.io".to_string(),
        });

        let json = serde_json::to_string(&event).unwrap();
        let back: UserEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
        assert_eq!(back.event_type(), "user.email.changed");
        assert_eq!(back.version(), 3);
    }

    #[test]
    fn test_payload_contains_base_fields() {
        let event = UserEvent::Deactivated(UserDeactivated {
            meta: meta(5),
            reason: Some("requested".to_string()),
        });

        let payload = event.payload().unwrap();
        assert_eq!(payload["version"], 5);
        assert_eq!(payload["reason"], "requested");
        assert!(payload.get("type").is_none());
    }

    #[test]
    fn test_unknown_type_is_skippable() {
        let raw = RawEnvelope {
            event_type: "user.profile.updated".to_string(),
            data: serde_json::json!({"aggregate_id": Uuid::new_v4(), "version": 1}),
        };
        assert!(raw.decode().unwrap().is_none());
        assert!(!is_known_event_type(&raw.event_type));
    }

    #[test]
    fn test_raw_envelope_meta() {
        let event = UserEvent::LoginRecorded(LoginRecorded {
            meta: meta(7),
            ip_address: "10.0.0.1".to_string(),
            user_agent: "curl/8.0".to_string(),
        });

        let raw: RawEnvelope =
            serde_json::from_value(serde_json::to_value(&event).unwrap()).unwrap();
        let parsed = raw.meta().unwrap();
        assert_eq!(parsed.version, 7);
        assert_eq!(parsed.aggregate_id, event.aggregate_id());
    }
}
