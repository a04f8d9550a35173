//! Listing search: AND-combined filters followed by a single stable sort.

use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer};

use super::repo_types::{Operation, Property, PropertyKind};

/// Every filter is optional. In a query string an empty value means "unset".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    /// Case-insensitive match on title, location or description.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub search: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "empty_as_none")]
    pub kind: Option<PropertyKind>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub operation: Option<Operation>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub min_price: Option<f64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub max_price: Option<f64>,
    /// Minimum number of bedrooms.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub bedrooms: Option<u32>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// `createdAt` descending; records without a valid date go last.
    #[default]
    Newest,
    PriceLow,
    PriceHigh,
    Surface,
    Views,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(SortKey::Newest),
            "price-low" => Ok(SortKey::PriceLow),
            "price-high" => Ok(SortKey::PriceHigh),
            "surface" => Ok(SortKey::Surface),
            "views" => Ok(SortKey::Views),
            other => Err(format!("unknown sort key {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SortParam {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub sort: Option<SortKey>,
}

fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(de::Error::custom),
    }
}

/// Free text is matched as typed; only an all-blank value counts as unset.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()))
}

fn contains_ci(haystack: Option<&str>, needle_lower: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle_lower))
}

impl Filters {
    pub fn is_unset(&self) -> bool {
        self.search.is_none()
            && self.kind.is_none()
            && self.operation.is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
            && self.bedrooms.is_none()
            && self.location.is_none()
    }

    pub fn matches(&self, p: &Property) -> bool {
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            let hit = contains_ci(Some(p.title.as_str()), &term)
                || contains_ci(p.location.as_deref(), &term)
                || contains_ci(p.description.as_deref(), &term);
            if !hit {
                return false;
            }
        }
        if self.kind.is_some_and(|k| k != p.kind) {
            return false;
        }
        if self.operation.is_some_and(|op| op != p.operation) {
            return false;
        }
        if self.min_price.is_some_and(|min| p.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| p.price > max) {
            return false;
        }
        if self.bedrooms.is_some_and(|n| p.bedrooms < n) {
            return false;
        }
        if let Some(loc) = &self.location {
            if !contains_ci(p.location.as_deref(), &loc.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

fn newest_first(a: &Property, b: &Property) -> Ordering {
    match (a.created_at_parsed(), b.created_at_parsed()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn apply(properties: &[Property], filters: &Filters, sort: SortKey) -> Vec<Property> {
    let mut out: Vec<Property> = properties
        .iter()
        .filter(|p| filters.matches(p))
        .cloned()
        .collect();

    // sort_by is stable: ties keep stored order
    match sort {
        SortKey::Newest => out.sort_by(newest_first),
        SortKey::PriceLow => out.sort_by(|a, b| a.price.total_cmp(&b.price)),
        SortKey::PriceHigh => out.sort_by(|a, b| b.price.total_cmp(&a.price)),
        SortKey::Surface => out.sort_by(|a, b| b.surface.total_cmp(&a.surface)),
        SortKey::Views => out.sort_by(|a, b| b.views.cmp(&a.views)),
    }
    out
}
