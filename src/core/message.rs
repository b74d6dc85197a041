use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::api::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Role as sent to the chat endpoint. System notes stay local.
    pub fn to_api_role(self) -> Option<&'static str> {
        match self {
            Role::User => Some("user"),
            Role::Assistant => Some("assistant"),
            Role::System => None,
        }
    }

    /// Capitalized label used in transcripts.
    pub fn title(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// One entry of a conversation. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(with = "local_timestamp")]
    pub timestamp: NaiveDateTime,
    #[serde(default)]
    pub model: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: now(),
            model: model.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    pub fn to_api_message(&self) -> Option<ChatMessage> {
        self.role.to_api_role().map(|role| ChatMessage {
            role: role.to_string(),
            content: self.content.clone(),
        })
    }
}

/// Local wall-clock time, the representation stored in history documents.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Naive local ISO-8601 timestamps (`2025-01-01T12:00:00.123456`).
///
/// Fractional seconds are optional on input so hand-edited documents load.
pub mod local_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

    pub fn format(timestamp: &NaiveDateTime) -> String {
        timestamp.format(FORMAT).to_string()
    }

    pub fn parse(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
    }

    pub fn serialize<S>(timestamp: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(timestamp))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 2)
            .and_then(|d| d.and_hms_micro_opt(13, 45, 6, 789_000))
            .expect("valid date")
    }

    #[test]
    fn messages_serialize_in_history_document_shape() {
        let message = Message {
            role: Role::Assistant,
            content: "Hi there".into(),
            timestamp: fixed_time(),
            model: "llama2:7b".into(),
        };
        let value = serde_json::to_value(&message).expect("serializes");
        assert_eq!(
            value,
            json!({
                "role": "assistant",
                "content": "Hi there",
                "timestamp": "2025-01-02T13:45:06.789000",
                "model": "llama2:7b"
            })
        );
    }

    #[test]
    fn timestamps_without_fraction_and_missing_model_still_load() {
        let message: Message = serde_json::from_value(json!({
            "role": "user",
            "content": "hello",
            "timestamp": "2024-12-31T23:59:59"
        }))
        .expect("deserializes");
        assert_eq!(message.role, Role::User);
        assert_eq!(message.model, "");
        assert_eq!(
            local_timestamp::format(&message.timestamp),
            "2024-12-31T23:59:59.000000"
        );
    }

    #[test]
    fn unknown_roles_are_rejected() {
        let result = serde_json::from_value::<Message>(json!({
            "role": "tool",
            "content": "x",
            "timestamp": "2024-12-31T23:59:59"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn system_messages_have_no_api_form() {
        let system = Message::new(Role::System, "Model switched", "");
        assert_eq!(system.to_api_message(), None);

        let user = Message::new(Role::User, "Hi", "llama2");
        assert_eq!(
            user.to_api_message(),
            Some(ChatMessage {
                role: "user".into(),
                content: "Hi".into()
            })
        );
        assert!(user.is_user());
        assert!(!user.is_assistant());
    }
}
