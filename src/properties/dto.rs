use serde::Deserialize;
use serde_json::{Map, Value};

use super::repo_types::{Operation, Property, PropertyKind};

/// Request body for a new listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProperty {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: PropertyKind,
    pub operation: Operation,
    pub price: f64,
    #[serde(default)]
    pub surface: f64,
    #[serde(default)]
    pub bedrooms: u32,
    #[serde(default)]
    pub bathrooms: u32,
    #[serde(default)]
    pub parking: u32,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NewProperty {
    /// Server-assigned fields win over anything the client sent.
    pub fn into_property(self, id: String, now: String) -> Property {
        let mut extra = self.extra;
        extra.remove("id");
        extra.remove("views");
        let created_at = self.created_at.filter(|s| !s.trim().is_empty()).unwrap_or(now);
        Property {
            id,
            title: self.title,
            kind: self.kind,
            operation: self.operation,
            price: self.price,
            surface: self.surface,
            bedrooms: self.bedrooms,
            bathrooms: self.bathrooms,
            parking: self.parking,
            location: self.location,
            description: self.description,
            images: self.images,
            featured: self.featured,
            views: 0,
            created_at: Some(created_at),
            extra,
        }
    }
}

/// Fields a patch may never change.
pub const PROTECTED_FIELDS: &[&str] = &["id", "createdAt", "views"];
