use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::repo_types::{Role, User};

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Request body for a new agent.
#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NewUser {
    pub fn into_user(self, id: String) -> User {
        let mut extra = self.extra;
        extra.remove("id");
        User {
            id,
            username: self.username,
            password: self.password,
            name: self.name,
            role: self.role,
            extra,
        }
    }
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub name: String,
    pub role: Role,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            name: u.name,
            role: u.role,
        }
    }
}

/// Fields a patch may never change.
pub const PROTECTED_FIELDS: &[&str] = &["id"];
