use serde_json::{Map, Value};
use tracing::{info, warn};

use super::{
    dto::{NewProperty, PROTECTED_FIELDS},
    query::{self, Filters, SortKey},
    repo_types::Property,
};
use crate::{
    activities::{services::record_best_effort, ActivityInput, ActivityKind},
    clock,
    error::{AppError, AppResult},
    state::AppState,
    storage::{merge_patch, new_id, Change, Collection},
};

/// Stamp `createdAt` on every record lacking it; returns how many changed.
fn fill_created_at(props: &mut [Property]) -> usize {
    let now = clock::now_iso();
    let mut filled = 0;
    for p in props.iter_mut().filter(|p| p.needs_created_at()) {
        p.created_at = Some(now.clone());
        filled += 1;
    }
    filled
}

/// Startup migration: persist `createdAt` on legacy records.
pub async fn backfill_created_at(st: &AppState) -> AppResult<usize> {
    let filled = st
        .store
        .modify(Collection::Properties, |props: &mut Vec<Property>| {
            let filled = fill_created_at(props);
            Ok(if filled > 0 {
                Change::Commit(filled)
            } else {
                Change::Skip(0)
            })
        })
        .await?;
    if filled > 0 {
        info!(filled, "createdAt backfilled on legacy properties");
    }
    Ok(filled)
}

/// All listings in stored order. Legacy records are backfilled (and the
/// collection saved) before returning.
pub async fn list_properties(st: &AppState) -> AppResult<Vec<Property>> {
    let (props, filled) = st
        .store
        .modify(Collection::Properties, |props: &mut Vec<Property>| {
            let filled = fill_created_at(props);
            let out = (props.clone(), filled);
            Ok(if filled > 0 {
                Change::Commit(out)
            } else {
                Change::Skip(out)
            })
        })
        .await?;
    if filled > 0 {
        info!(filled, "createdAt backfilled while listing properties");
    }
    Ok(props)
}

pub async fn search_properties(
    st: &AppState,
    filters: &Filters,
    sort: SortKey,
) -> AppResult<Vec<Property>> {
    let props = list_properties(st).await?;
    Ok(query::apply(&props, filters, sort))
}

/// Detail read. Counts as a view: `views` goes up by one and is persisted.
pub async fn get_property(st: &AppState, id: &str) -> AppResult<Property> {
    let property = st
        .store
        .modify(Collection::Properties, |props: &mut Vec<Property>| {
            let p = props
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(AppError::NotFound("Property"))?;
            p.views += 1;
            Ok(Change::Commit(p.clone()))
        })
        .await
        .inspect_err(|e| warn!(error = %e, property_id = %id, "get_property failed"))?;

    record_best_effort(
        st,
        ActivityInput::for_property(
            ActivityKind::ViewProperty,
            format!("Property viewed: {}", property.title),
            &property.id,
        ),
    )
    .await;
    Ok(property)
}

pub async fn create_property(st: &AppState, input: NewProperty) -> AppResult<Property> {
    let property = st
        .store
        .modify(Collection::Properties, |props: &mut Vec<Property>| {
            let id = new_id(Collection::Properties, props)?;
            let property = input.into_property(id, clock::now_iso());
            props.push(property.clone());
            Ok(Change::Commit(property))
        })
        .await?;

    info!(property_id = %property.id, title = %property.title, "property created");
    record_best_effort(
        st,
        ActivityInput::for_property(
            ActivityKind::NewProperty,
            format!("New property added: {}", property.title),
            &property.id,
        ),
    )
    .await;
    Ok(property)
}

pub async fn update_property(
    st: &AppState,
    id: &str,
    patch: Map<String, Value>,
) -> AppResult<Property> {
    let property = st
        .store
        .modify(Collection::Properties, |props: &mut Vec<Property>| {
            let idx = props
                .iter()
                .position(|p| p.id == id)
                .ok_or(AppError::NotFound("Property"))?;
            let merged = merge_patch(&props[idx], patch, PROTECTED_FIELDS)?;
            props[idx] = merged.clone();
            Ok(Change::Commit(merged))
        })
        .await
        .inspect_err(|e| warn!(error = %e, property_id = %id, "update_property failed"))?;

    info!(property_id = %property.id, "property updated");
    record_best_effort(
        st,
        ActivityInput::for_property(
            ActivityKind::EditProperty,
            format!("Property edited: {}", property.title),
            id,
        ),
    )
    .await;
    Ok(property)
}

pub async fn delete_property(st: &AppState, id: &str) -> AppResult<Property> {
    let removed = st
        .store
        .modify(Collection::Properties, |props: &mut Vec<Property>| {
            let idx = props
                .iter()
                .position(|p| p.id == id)
                .ok_or(AppError::NotFound("Property"))?;
            Ok(Change::Commit(props.remove(idx)))
        })
        .await
        .inspect_err(|e| warn!(error = %e, property_id = %id, "delete_property failed"))?;

    info!(property_id = %removed.id, "property deleted");
    record_best_effort(
        st,
        ActivityInput::for_property(
            ActivityKind::DeleteProperty,
            format!("Property deleted: {}", removed.title),
            id,
        ),
    )
    .await;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::services as activities;
    use crate::properties::repo_types::{Operation, PropertyKind};
    use serde_json::json;
    use std::collections::HashSet;

    fn new_listing(title: &str, price: f64) -> NewProperty {
        serde_json::from_value(json!({
            "title": title,
            "type": "apartment",
            "operation": "rent",
            "price": price,
            "surface": 85,
            "bedrooms": 2,
            "location": "Roma Norte, CDMX",
            "images": ["/uploads/a.jpg", "/uploads/b.jpg"]
        }))
        .unwrap()
    }

    fn patch(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("patch must be an object"),
        }
    }

    #[tokio::test]
    async fn create_assigns_id_views_and_created_at() {
        let st = AppState::fake();
        let before = clock::now();
        let p = create_property(&st, new_listing("A", 100.0)).await.unwrap();
        let after = clock::now();

        assert!(!p.id.is_empty());
        assert_eq!(p.views, 0);
        assert_eq!(p.kind, PropertyKind::Apartment);
        assert_eq!(p.operation, Operation::Rent);
        assert_eq!(p.images, vec!["/uploads/a.jpg", "/uploads/b.jpg"]);
        let created = p.created_at_parsed().unwrap();
        // stored with millisecond precision
        assert!(created >= before - time::Duration::milliseconds(1) && created <= after);

        let all = list_properties(&st).await.unwrap();
        assert_eq!(all, vec![p]);
    }

    #[tokio::test]
    async fn create_keeps_client_created_at_and_ignores_client_id_and_views() {
        let st = AppState::fake();
        let input: NewProperty = serde_json::from_value(json!({
            "id": "mine",
            "views": 999,
            "title": "Terreno",
            "type": "land",
            "operation": "sale",
            "price": 1,
            "createdAt": "2024-05-01T00:00:00.000Z",
            "agentPhone": "5512345678"
        }))
        .unwrap();
        let p = create_property(&st, input).await.unwrap();
        assert_ne!(p.id, "mine");
        assert_eq!(p.views, 0);
        assert_eq!(p.created_at.as_deref(), Some("2024-05-01T00:00:00.000Z"));

        let stored = serde_json::to_value(&p).unwrap();
        assert_eq!(stored["agentPhone"], "5512345678");
        assert_eq!(stored["id"], json!(p.id));
    }

    #[tokio::test]
    async fn ids_are_unique_across_rapid_creates() {
        let st = AppState::fake();
        let mut ids = HashSet::new();
        for n in 0..40 {
            let p = create_property(&st, new_listing(&format!("P{n}"), n as f64))
                .await
                .unwrap();
            assert!(ids.insert(p.id));
        }
        assert_eq!(list_properties(&st).await.unwrap().len(), 40);
    }

    #[tokio::test]
    async fn get_counts_each_view() {
        let st = AppState::fake();
        let p = create_property(&st, new_listing("A", 100.0)).await.unwrap();

        for n in 1..=5 {
            let seen = get_property(&st, &p.id).await.unwrap();
            assert_eq!(seen.views, n);
        }
        let stored = list_properties(&st).await.unwrap();
        assert_eq!(stored[0].views, 5);

        let log = activities::list(&st).await.unwrap();
        assert_eq!(log[0].kind, ActivityKind::ViewProperty);
        assert_eq!(log[0].message, "Property viewed: A");
        assert_eq!(log[0].property_id.as_deref(), Some(p.id.as_str()));
    }

    async fn view_concurrently(viewers: u64) -> AppState {
        let st = AppState::fake();
        let p = create_property(&st, new_listing("A", 100.0)).await.unwrap();

        let tasks: Vec<_> = (0..viewers)
            .map(|_| {
                let st = st.clone();
                let id = p.id.clone();
                tokio::spawn(async move { get_property(&st, &id).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        st
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_views_are_all_counted() {
        for viewers in [20u64, 60] {
            let st = view_concurrently(viewers).await;

            let stored = list_properties(&st).await.unwrap();
            assert_eq!(stored[0].views, viewers);

            // one new_property entry plus one per view, capped
            let log = activities::list(&st).await.unwrap();
            assert_eq!(log.len(), (viewers as usize + 1).min(50));
            let views = log.iter().filter(|a| a.kind == ActivityKind::ViewProperty).count();
            assert_eq!(views, (viewers as usize).min(50));
        }
    }

    #[tokio::test]
    async fn update_merges_over_existing_fields() {
        let st = AppState::fake();
        let p = create_property(&st, new_listing("A", 100.0)).await.unwrap();
        get_property(&st, &p.id).await.unwrap();

        let updated = update_property(
            &st,
            &p.id,
            patch(json!({
                "price": 150,
                "description": null,
                "id": "hijack",
                "views": 0,
                "createdAt": "1999-01-01"
            })),
        )
        .await
        .unwrap();
        assert_eq!(updated.price, 150.0);
        assert_eq!(updated.title, "A");
        assert_eq!(updated.location.as_deref(), Some("Roma Norte, CDMX"));
        assert_eq!(updated.description, None);
        assert_eq!(updated.id, p.id);
        assert_eq!(updated.views, 1);
        assert_eq!(updated.created_at, p.created_at);

        let fetched = get_property(&st, &p.id).await.unwrap();
        assert_eq!(fetched.price, 150.0);
        assert_eq!(fetched.title, "A");
    }

    #[tokio::test]
    async fn update_with_invalid_value_writes_nothing() {
        let st = AppState::fake();
        let p = create_property(&st, new_listing("A", 100.0)).await.unwrap();

        let err = update_property(&st, &p.id, patch(json!({ "type": "castle" })))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(list_properties(&st).await.unwrap()[0].kind, PropertyKind::Apartment);
    }

    #[tokio::test]
    async fn null_in_a_patch_resets_the_field() {
        let st = AppState::fake();
        let p = create_property(&st, new_listing("A", 100.0)).await.unwrap();

        let updated = update_property(&st, &p.id, patch(json!({ "price": null, "bedrooms": null })))
            .await
            .unwrap();
        assert_eq!(updated.price, 0.0);
        assert_eq!(updated.bedrooms, 0);
        assert_eq!(updated.title, "A");
        assert_eq!(list_properties(&st).await.unwrap()[0].price, 0.0);
    }

    #[tokio::test]
    async fn legacy_document_with_nulls_still_loads() {
        let st = AppState::fake();
        st.store
            .save::<Value>(
                Collection::Properties,
                &[json!({ "id": "1", "title": "Old", "type": "casa", "operation": "venta",
                          "price": null, "bedrooms": null, "createdAt": "2025-01-15" })],
            )
            .await
            .unwrap();

        st.verify_collections().await.unwrap();
        let props = list_properties(&st).await.unwrap();
        assert_eq!(props[0].price, 0.0);
        assert_eq!(props[0].bedrooms, 0);
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let st = AppState::fake();
        assert!(matches!(
            get_property(&st, "nope").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            update_property(&st, "nope", Map::new()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            delete_property(&st, "nope").await,
            Err(AppError::NotFound(_))
        ));
        assert!(activities::list(&st).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_edit_delete_scenario() {
        let st = AppState::fake();
        let p = create_property(&st, new_listing("A", 100.0)).await.unwrap();
        assert!(list_properties(&st).await.unwrap().iter().any(|x| x.id == p.id));

        update_property(&st, &p.id, patch(json!({ "price": 150 })))
            .await
            .unwrap();
        let fetched = get_property(&st, &p.id).await.unwrap();
        assert_eq!(fetched.price, 150.0);
        assert_eq!(fetched.title, "A");

        let removed = delete_property(&st, &p.id).await.unwrap();
        assert_eq!(removed.id, p.id);
        assert!(matches!(
            get_property(&st, &p.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(list_properties(&st).await.unwrap().is_empty());

        let kinds: Vec<_> = activities::list(&st)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ActivityKind::DeleteProperty,
                ActivityKind::ViewProperty,
                ActivityKind::EditProperty,
                ActivityKind::NewProperty,
            ]
        );
    }

    #[tokio::test]
    async fn sixty_mutations_keep_fifty_activities() {
        let st = AppState::fake();
        let p = create_property(&st, new_listing("A", 1.0)).await.unwrap();
        for n in 0..59 {
            update_property(&st, &p.id, patch(json!({ "title": format!("A{n}") })))
                .await
                .unwrap();
        }
        let log = activities::list(&st).await.unwrap();
        assert_eq!(log.len(), 50);
        assert_eq!(log[0].message, "Property edited: A58");
    }

    #[tokio::test]
    async fn backfill_only_writes_when_something_is_missing() {
        let st = AppState::fake();
        st.store
            .save::<Value>(
                Collection::Properties,
                &[
                    json!({ "id": "1", "title": "Old", "type": "casa", "operation": "venta", "price": 1 }),
                    json!({ "id": "2", "title": "New", "type": "house", "operation": "sale", "price": 2,
                            "createdAt": "2025-01-15" }),
                ],
            )
            .await
            .unwrap();

        assert_eq!(backfill_created_at(&st).await.unwrap(), 1);
        assert_eq!(backfill_created_at(&st).await.unwrap(), 0);

        let props = list_properties(&st).await.unwrap();
        assert!(props.iter().all(|p| !p.needs_created_at()));
        assert_eq!(props[1].created_at.as_deref(), Some("2025-01-15"));
    }

    #[tokio::test]
    async fn list_backfills_legacy_records() {
        let st = AppState::fake();
        st.store
            .save::<Value>(
                Collection::Properties,
                &[json!({ "id": "1", "title": "Old", "type": "local", "operation": "renta" })],
            )
            .await
            .unwrap();

        let props = list_properties(&st).await.unwrap();
        assert!(props[0].created_at_parsed().is_some());

        let raw: Vec<Value> = st.store.load(Collection::Properties).await.unwrap();
        assert!(raw[0]["createdAt"].is_string());
        assert_eq!(raw[0]["type"], "store");
    }

    #[tokio::test]
    async fn search_filters_the_stored_listings() {
        let st = AppState::fake();
        for (title, price) in [("A", 100.0), ("B", 200.0), ("C", 300.0)] {
            create_property(&st, new_listing(title, price)).await.unwrap();
        }
        let filters = Filters {
            min_price: Some(150.0),
            max_price: Some(250.0),
            ..Filters::default()
        };
        let hits = search_properties(&st, &filters, SortKey::Newest).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "B");
    }
}
