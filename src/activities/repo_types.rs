use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::storage::Record;

/// What happened; stored as the snake_case `type` field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Login,
    NewUser,
    EditUser,
    DeleteUser,
    NewProperty,
    EditProperty,
    DeleteProperty,
    ViewProperty,
}

/// Audit-log entry. Never edited once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Record for Activity {
    fn id(&self) -> Option<&str> {
        None
    }
}

/// An activity before it is stamped.
#[derive(Debug, Clone)]
pub struct ActivityInput {
    pub kind: ActivityKind,
    pub message: String,
    pub user_id: Option<String>,
    pub property_id: Option<String>,
}

impl ActivityInput {
    pub fn for_user(kind: ActivityKind, message: String, user_id: &str) -> Self {
        Self {
            kind,
            message,
            user_id: Some(user_id.to_string()),
            property_id: None,
        }
    }

    pub fn for_property(kind: ActivityKind, message: String, property_id: &str) -> Self {
        Self {
            kind,
            message,
            user_id: None,
            property_id: Some(property_id.to_string()),
        }
    }
}
