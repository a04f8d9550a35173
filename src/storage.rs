#[cfg(test)]
use std::collections::HashMap;
use std::{collections::HashSet, fmt, io, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{
    clock,
    error::{AppError, AppResult},
};

/// One of the three persisted record sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Properties,
    Users,
    Activities,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Properties => "properties",
            Collection::Users => "users",
            Collection::Activities => "activities",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.json", self.name())
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw byte access to the document backing each collection.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// `Ok(None)` when the document has never been written.
    async fn read(&self, collection: Collection) -> io::Result<Option<Vec<u8>>>;
    async fn write(&self, collection: Collection, body: Vec<u8>) -> io::Result<()>;
}

/// Keeps each collection in `<dir>/<collection>.json`.
#[derive(Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub async fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }
}

#[async_trait]
impl DocumentBackend for FileBackend {
    async fn read(&self, collection: Collection) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(collection)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, collection: Collection, body: Vec<u8>) -> io::Result<()> {
        // Write beside the target and rename over it, so a reader sees either
        // the old document or the new one.
        let target = self.path(collection);
        let tmp = self.dir.join(format!(".{}.tmp", collection.file_name()));
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &target).await
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryBackend {
    docs: std::sync::Mutex<HashMap<Collection, Vec<u8>>>,
}

#[cfg(test)]
impl MemoryBackend {
    fn docs(&self) -> io::Result<std::sync::MutexGuard<'_, HashMap<Collection, Vec<u8>>>> {
        self.docs
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory backend poisoned"))
    }
}

#[cfg(test)]
#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn read(&self, collection: Collection) -> io::Result<Option<Vec<u8>>> {
        Ok(self.docs()?.get(&collection).cloned())
    }

    async fn write(&self, collection: Collection, body: Vec<u8>) -> io::Result<()> {
        self.docs()?.insert(collection, body);
        Ok(())
    }
}

/// A stored record; `id()` is `None` for records without identity (activities).
pub trait Record {
    fn id(&self) -> Option<&str>;
}

/// Untyped records, for seeding raw documents.
#[cfg(test)]
impl Record for Value {
    fn id(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }
}

/// Outcome of a [`Store::modify`] closure.
pub enum Change<R> {
    /// Persist the mutated collection, then return the value.
    Commit(R),
    /// Return the value without writing.
    Skip(R),
}

/// Typed load/save over a [`DocumentBackend`], with one lock per collection.
pub struct Store {
    backend: Arc<dyn DocumentBackend>,
    properties: Mutex<()>,
    users: Mutex<()>,
    activities: Mutex<()>,
}

impl Store {
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            backend,
            properties: Mutex::new(()),
            users: Mutex::new(()),
            activities: Mutex::new(()),
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::default()))
    }

    fn lock_for(&self, collection: Collection) -> &Mutex<()> {
        match collection {
            Collection::Properties => &self.properties,
            Collection::Users => &self.users,
            Collection::Activities => &self.activities,
        }
    }

    /// Load the whole collection. A missing document is an empty collection,
    /// a malformed one is [`AppError::Parse`].
    pub async fn load<T>(&self, collection: Collection) -> AppResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let _guard = self.lock_for(collection).lock().await;
        self.read_records(collection).await
    }

    /// Replace the whole collection.
    #[cfg(test)]
    pub async fn save<T>(&self, collection: Collection, records: &[T]) -> AppResult<()>
    where
        T: Serialize + Record,
    {
        let _guard = self.lock_for(collection).lock().await;
        self.write_records(collection, records).await
    }

    /// Read-modify-write under the collection lock. Nothing is written when
    /// `f` fails or returns [`Change::Skip`].
    pub async fn modify<T, R, F>(&self, collection: Collection, f: F) -> AppResult<R>
    where
        T: DeserializeOwned + Serialize + Record,
        F: FnOnce(&mut Vec<T>) -> AppResult<Change<R>>,
    {
        let _guard = self.lock_for(collection).lock().await;
        let mut records = self.read_records(collection).await?;
        match f(&mut records)? {
            Change::Commit(out) => {
                self.write_records(collection, &records).await?;
                Ok(out)
            }
            Change::Skip(out) => Ok(out),
        }
    }

    async fn read_records<T>(&self, collection: Collection) -> AppResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        match self.backend.read(collection).await? {
            None => {
                debug!(%collection, "document missing; treating as empty");
                Ok(Vec::new())
            }
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|source| AppError::Parse { collection, source }),
        }
    }

    async fn write_records<T>(&self, collection: Collection, records: &[T]) -> AppResult<()>
    where
        T: Serialize + Record,
    {
        ensure_unique_ids(collection, records)?;
        let body = serde_json::to_vec_pretty(records)
            .map_err(|source| AppError::Encode { collection, source })?;
        self.backend.write(collection, body).await?;
        debug!(%collection, records = records.len(), "document saved");
        Ok(())
    }
}

fn ensure_unique_ids<T: Record>(collection: Collection, records: &[T]) -> AppResult<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for id in records.iter().filter_map(Record::id) {
        if !seen.insert(id) {
            return Err(AppError::IdCollision {
                collection,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

/// Shallow merge: every key in `patch` overwrites the stored field (`null`
/// included), keys in `protected` are ignored, and the result must still be a
/// valid `T`.
pub fn merge_patch<T>(current: &T, patch: Map<String, Value>, protected: &[&str]) -> AppResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut fields = match serde_json::to_value(current) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => return Err(AppError::Validation("record is not an object".into())),
        Err(e) => return Err(AppError::Validation(e.to_string())),
    };
    for (key, value) in patch {
        if protected.contains(&key.as_str()) {
            continue;
        }
        fields.insert(key, value);
    }
    serde_json::from_value(Value::Object(fields)).map_err(|e| AppError::Validation(e.to_string()))
}

/// `null` in a document reads the same as a missing key: the field's default.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

const ID_ATTEMPTS: usize = 8;

/// Generate `<unix-millis>-<8 hex>` not already used in `existing`.
pub fn new_id<T: Record>(collection: Collection, existing: &[T]) -> AppResult<String> {
    let millis = clock::now().unix_timestamp_nanos() / 1_000_000;
    let mut candidate = String::new();
    for _ in 0..ID_ATTEMPTS {
        let suffix = Uuid::new_v4().simple().to_string();
        candidate = format!("{}-{}", millis, &suffix[..8]);
        if !existing.iter().any(|r| r.id() == Some(candidate.as_str())) {
            return Ok(candidate);
        }
    }
    Err(AppError::IdCollision {
        collection,
        id: candidate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: String,
        n: u32,
    }

    impl Record for Row {
        fn id(&self) -> Option<&str> {
            Some(&self.id)
        }
    }

    fn row(id: &str, n: u32) -> Row {
        Row { id: id.into(), n }
    }

    #[tokio::test]
    async fn missing_document_loads_empty() {
        let store = Store::in_memory();
        let rows: Vec<Row> = store.load(Collection::Properties).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn corrupt_document_is_a_parse_error() {
        let backend = Arc::new(MemoryBackend::default());
        backend
            .write(Collection::Users, b"[{\"id\": ".to_vec())
            .await
            .unwrap();
        let store = Store::new(backend);

        let err = store.load::<Row>(Collection::Users).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Parse {
                collection: Collection::Users,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn save_rejects_duplicate_ids() {
        let store = Store::in_memory();
        let err = store
            .save(Collection::Properties, &[row("a", 1), row("a", 2)])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IdCollision { .. }));

        let rows: Vec<Row> = store.load(Collection::Properties).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn modify_commits_or_skips() {
        let store = Store::in_memory();
        store
            .save(Collection::Properties, &[row("a", 1)])
            .await
            .unwrap();

        let n = store
            .modify(Collection::Properties, |rows: &mut Vec<Row>| {
                rows[0].n += 1;
                Ok(Change::Commit(rows[0].n))
            })
            .await
            .unwrap();
        assert_eq!(n, 2);

        store
            .modify(Collection::Properties, |rows: &mut Vec<Row>| {
                rows[0].n = 99;
                Ok(Change::Skip(()))
            })
            .await
            .unwrap();

        let rows: Vec<Row> = store.load(Collection::Properties).await.unwrap();
        assert_eq!(rows, vec![row("a", 2)]);
    }

    #[tokio::test]
    async fn failed_modify_leaves_document_untouched() {
        let store = Store::in_memory();
        store
            .save(Collection::Users, &[row("a", 1)])
            .await
            .unwrap();

        let err = store
            .modify(Collection::Users, |rows: &mut Vec<Row>| {
                rows.clear();
                Err::<Change<()>, _>(AppError::NotFound("Row"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let rows: Vec<Row> = store.load(Collection::Users).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn file_backend_writes_pretty_json_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("data")).await.unwrap();
        let store = Store::new(Arc::new(backend));

        assert!(store.load::<Row>(Collection::Activities).await.unwrap().is_empty());

        store
            .save(Collection::Properties, &[row("x", 7)])
            .await
            .unwrap();

        let path = dir.path().join("data").join("properties.json");
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n  {"));
        let names: Vec<_> = std::fs::read_dir(dir.path().join("data"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["properties.json".to_string()]);

        let rows: Vec<Row> = store.load(Collection::Properties).await.unwrap();
        assert_eq!(rows, vec![row("x", 7)]);
    }

    #[test]
    fn merge_overwrites_present_keys_and_skips_protected_ones() {
        let current = row("a", 1);
        let patch = serde_json::json!({ "id": "b", "n": 5 });
        let Value::Object(patch) = patch else { unreachable!() };

        let merged: Row = merge_patch(&current, patch, &["id"]).unwrap();
        assert_eq!(merged, row("a", 5));
    }

    #[test]
    fn merge_rejects_results_that_no_longer_fit_the_record() {
        let Value::Object(patch) = serde_json::json!({ "n": "many" }) else { unreachable!() };
        let err = merge_patch(&row("a", 1), patch, &[]).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn new_ids_avoid_existing_ones() {
        let mut rows = Vec::new();
        for n in 0..200 {
            let id = new_id(Collection::Properties, &rows).unwrap();
            rows.push(row(&id, n));
        }
        let unique: HashSet<_> = rows.iter().map(|r| r.id.clone()).collect();
        assert_eq!(unique.len(), rows.len());
        assert!(rows[0].id.contains('-'));
    }
}
