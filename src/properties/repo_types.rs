use std::str::FromStr;

use serde::{de::IntoDeserializer, Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::{
    clock,
    storage::{null_as_default, Record},
};

/// Kind of listing. Spanish names from older documents are read as aliases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    #[serde(alias = "casa")]
    House,
    #[serde(alias = "departamento")]
    Apartment,
    #[serde(alias = "local")]
    Store,
    #[serde(alias = "oficina")]
    Office,
    #[serde(alias = "terreno")]
    Land,
    #[serde(alias = "bodega")]
    Warehouse,
    #[serde(alias = "otro")]
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[serde(alias = "venta")]
    Sale,
    #[serde(alias = "renta")]
    Rent,
}

fn from_serde_str<'a, T: Deserialize<'a>>(s: &'a str) -> Result<T, String> {
    T::deserialize(s.into_deserializer()).map_err(|e: serde::de::value::Error| e.to_string())
}

impl FromStr for PropertyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        from_serde_str(s)
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        from_serde_str(s)
    }
}

/// Listing as stored in `properties.json`. Unknown fields sent by the client
/// are kept in `extra` and written back untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: PropertyKind,
    pub operation: Operation,
    #[serde(default, deserialize_with = "null_as_default")]
    pub price: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub surface: f64, // m²
    #[serde(default, deserialize_with = "null_as_default")]
    pub bedrooms: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bathrooms: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parking: u32,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub featured: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub views: u64,
    /// ISO-8601; absent on legacy records until backfilled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Property {
    pub fn created_at_parsed(&self) -> Option<OffsetDateTime> {
        self.created_at.as_deref().and_then(clock::parse_loose)
    }

    pub fn needs_created_at(&self) -> bool {
        self.created_at
            .as_deref()
            .map_or(true, |s| s.trim().is_empty())
    }
}

impl Record for Property {
    fn id(&self) -> Option<&str> {
        Some(&self.id)
    }
}
