use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::storage::{null_as_default, Record};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Agent,
}

/// Agent account as stored in `users.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password: String, // plaintext; never sent to clients
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: Role,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for User {
    fn id(&self) -> Option<&str> {
        Some(&self.id)
    }
}
