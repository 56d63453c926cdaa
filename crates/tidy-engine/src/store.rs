use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tidy_contracts::events::EventWriter;
use tidy_contracts::records::{CoachSession, GeneratedComment, ItemRecord, UserProfile};

/// Document side of persistence: item history, profiles, comments, sessions.
pub trait DocumentStore: Send + Sync {
    /// Every record owned by `user_id`, in no particular order.
    fn items_for_user(&self, user_id: &str) -> Result<Vec<ItemRecord>>;

    fn profile_for_user(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// Appends `comment` to the record unless it already carries an automated
    /// comment. The check and the write happen under one lock; returns
    /// whether the comment was written.
    fn append_automated_comment(&self, item_id: &str, comment: &GeneratedComment) -> Result<bool>;

    fn create_session(&self, session: &CoachSession) -> Result<()>;
}

/// Object side of persistence. Stored blobs are publicly readable.
pub trait BlobStore: Send + Sync {
    fn put_public(&self, path: &str, content_type: &str, bytes: &[u8]) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct MemoryState {
    items: IndexMap<String, ItemRecord>,
    profiles: BTreeMap<String, UserProfile>,
    sessions: Vec<CoachSession>,
    blobs: BTreeMap<String, StoredBlob>,
    mutations: usize,
}

/// Mutex-guarded in-process store implementing both traits.
#[derive(Debug)]
pub struct MemoryStore {
    public_base_url: String,
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

impl MemoryStore {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn insert_item(&self, record: ItemRecord) -> Result<()> {
        let mut state = self.lock()?;
        state.items.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn insert_profile(&self, profile: UserProfile) -> Result<()> {
        let mut state = self.lock()?;
        state.profiles.insert(profile.user_id.clone(), profile);
        Ok(())
    }

    pub fn item(&self, item_id: &str) -> Option<ItemRecord> {
        self.lock().ok()?.items.get(item_id).cloned()
    }

    pub fn sessions(&self) -> Vec<CoachSession> {
        self.lock()
            .map(|state| state.sessions.clone())
            .unwrap_or_default()
    }

    pub fn blob(&self, path: &str) -> Option<StoredBlob> {
        self.lock().ok()?.blobs.get(path).cloned()
    }

    pub fn blob_paths(&self) -> Vec<String> {
        self.lock()
            .map(|state| state.blobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Writes performed through the trait methods since creation.
    pub fn mutation_count(&self) -> usize {
        self.lock().map(|state| state.mutations).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl DocumentStore for MemoryStore {
    fn items_for_user(&self, user_id: &str) -> Result<Vec<ItemRecord>> {
        let state = self.lock()?;
        Ok(state
            .items
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }

    fn profile_for_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.lock()?.profiles.get(user_id).cloned())
    }

    fn append_automated_comment(&self, item_id: &str, comment: &GeneratedComment) -> Result<bool> {
        let mut state = self.lock()?;
        let Some(record) = state.items.get_mut(item_id) else {
            bail!("item {item_id} not found");
        };
        if record.has_automated_comment() {
            return Ok(false);
        }
        record.comments.push(comment.clone());
        state.mutations += 1;
        Ok(true)
    }

    fn create_session(&self, session: &CoachSession) -> Result<()> {
        let mut state = self.lock()?;
        state.sessions.push(session.clone());
        state.mutations += 1;
        Ok(())
    }
}

impl BlobStore for MemoryStore {
    fn put_public(&self, path: &str, content_type: &str, bytes: &[u8]) -> Result<String> {
        let relative = checked_relative_path(path)?;
        let key = relative.to_string_lossy().replace('\\', "/");
        let mut state = self.lock()?;
        state.blobs.insert(
            key.clone(),
            StoredBlob {
                content_type: content_type.to_string(),
                bytes: bytes.to_vec(),
            },
        );
        state.mutations += 1;
        Ok(format!("{}/{key}", self.public_base_url))
    }
}

/// Directory-backed store: pretty-printed JSON documents plus blob files.
///
/// ```text
/// <root>/items/<item_id>.json
/// <root>/profiles/<user_id>.json
/// <root>/sessions/<session_id>.json
/// <root>/blobs/<path>
/// ```
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    public_base_url: String,
    write_lock: Mutex<()>,
    events: Option<EventWriter>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            write_lock: Mutex::new(()),
            events: None,
        }
    }

    /// Reports documents skipped while listing history.
    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn put_item(&self, record: &ItemRecord) -> Result<()> {
        write_json(&self.document_path("items", &record.id)?, record)
    }

    pub fn put_profile(&self, profile: &UserProfile) -> Result<()> {
        write_json(&self.document_path("profiles", &profile.user_id)?, profile)
    }

    pub fn item(&self, item_id: &str) -> Result<Option<ItemRecord>> {
        read_json(&self.document_path("items", item_id)?)
    }

    pub fn session(&self, session_id: &str) -> Result<Option<CoachSession>> {
        read_json(&self.document_path("sessions", session_id)?)
    }

    fn document_path(&self, collection: &str, id: &str) -> Result<PathBuf> {
        let trimmed = id.trim();
        if trimmed.is_empty()
            || trimmed.contains(['/', '\\'])
            || trimmed == "."
            || trimmed == ".."
        {
            bail!("invalid document id {id:?}");
        }
        Ok(self.root.join(collection).join(format!("{trimmed}.json")))
    }
}

impl DocumentStore for LocalStore {
    fn items_for_user(&self, user_id: &str) -> Result<Vec<ItemRecord>> {
        let dir = self.root.join("items");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in
            std::fs::read_dir(&dir).with_context(|| format!("failed listing {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let record = match read_json::<ItemRecord>(&path) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(err) => {
                    if let Some(events) = self.events.as_ref() {
                        let mut payload = serde_json::Map::new();
                        payload.insert("path".to_string(), json!(path.display().to_string()));
                        payload.insert("error".to_string(), json!(format!("{err:#}")));
                        events.record("document_skipped", payload);
                    }
                    continue;
                }
            };
            if record.user_id == user_id {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn profile_for_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        read_json(&self.document_path("profiles", user_id)?)
    }

    fn append_automated_comment(&self, item_id: &str, comment: &GeneratedComment) -> Result<bool> {
        let path = self.document_path("items", item_id)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("local store lock poisoned"))?;
        let Some(mut record) = read_json::<ItemRecord>(&path)? else {
            bail!("item {item_id} not found");
        };
        if record.has_automated_comment() {
            return Ok(false);
        }
        record.comments.push(comment.clone());
        write_json(&path, &record)?;
        Ok(true)
    }

    fn create_session(&self, session: &CoachSession) -> Result<()> {
        let path = self.document_path("sessions", &session.id)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("local store lock poisoned"))?;
        if path.exists() {
            bail!("session {} already exists", session.id);
        }
        write_json(&path, session)
    }
}

impl BlobStore for LocalStore {
    fn put_public(&self, path: &str, _content_type: &str, bytes: &[u8]) -> Result<String> {
        let relative = checked_relative_path(path)?;
        let target = self.root.join("blobs").join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, bytes)
            .with_context(|| format!("failed to write {}", target.display()))?;
        Ok(format!(
            "{}/{}",
            self.public_base_url,
            relative.to_string_lossy().replace('\\', "/")
        ))
    }
}

fn checked_relative_path(path: &str) -> Result<PathBuf> {
    let candidate = Path::new(path.trim().trim_start_matches('/'));
    let mut out = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => bail!("blob path {path:?} escapes the store"),
        }
    }
    if out.as_os_str().is_empty() {
        bail!("blob path is empty");
    }
    Ok(out)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    let parsed = serde_json::from_str(&raw)
        .with_context(|| format!("invalid JSON document {}", path.display()))?;
    Ok(Some(parsed))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tidy_contracts::analysis::AnalysisResult;
    use tidy_contracts::records::{CoachSession, GeneratedComment, ItemRecord, UserProfile};

    use super::*;

    fn record(id: &str, user_id: &str) -> ItemRecord {
        ItemRecord {
            id: id.to_string(),
            user_id: user_id.to_string(),
            name: Some("lamp".to_string()),
            category: Some("decor".to_string()),
            created_at: json!("2025-05-01T00:00:00Z"),
            ..ItemRecord::default()
        }
    }

    fn session(id: &str) -> CoachSession {
        CoachSession {
            id: id.to_string(),
            user_id: "u1".to_string(),
            before_image_url: "memory://blobs/a.jpg".to_string(),
            after_image_url: None,
            analysis: AnalysisResult::default(),
            created_at: "2025-05-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn memory_store_appends_only_one_automated_comment() -> Result<()> {
        let store = MemoryStore::default();
        store.insert_item(record("i1", "u1"))?;
        let comment = GeneratedComment::from_coach("Bright choice 💡", "2025-05-01T00:00:01Z");

        assert!(store.append_automated_comment("i1", &comment)?);
        assert!(!store.append_automated_comment("i1", &comment)?);
        assert_eq!(store.item("i1").map(|r| r.comments.len()), Some(1));
        assert_eq!(store.mutation_count(), 1);
        assert!(store.append_automated_comment("missing", &comment).is_err());
        Ok(())
    }

    #[test]
    fn memory_store_filters_by_user_and_serves_blobs() -> Result<()> {
        let store = MemoryStore::new("https://cdn.example/");
        store.insert_item(record("i1", "u1"))?;
        store.insert_item(record("i2", "u2"))?;
        store.insert_profile(UserProfile {
            user_id: "u1".to_string(),
            streak: 2,
            ..UserProfile::default()
        })?;

        assert_eq!(store.items_for_user("u1")?.len(), 1);
        assert_eq!(store.profile_for_user("u1")?.map(|p| p.streak), Some(2));
        assert_eq!(store.profile_for_user("u9")?, None);

        let url = store.put_public("/coach/u1/a.png", "image/png", b"bytes")?;
        assert_eq!(url, "https://cdn.example/coach/u1/a.png");
        assert_eq!(
            store.blob("coach/u1/a.png").map(|blob| blob.content_type),
            Some("image/png".to_string())
        );
        assert!(store.put_public("../etc/passwd", "text/plain", b"x").is_err());
        Ok(())
    }

    #[test]
    fn local_store_round_trips_documents() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store = LocalStore::new(temp.path(), "https://files.example");
        store.put_item(&record("i1", "u1"))?;
        store.put_item(&record("i2", "u2"))?;
        std::fs::write(temp.path().join("items").join("notes.txt"), "ignored")?;

        let items = store.items_for_user("u1")?;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "i1");

        let comment = GeneratedComment::from_coach("Less to dust ✨", "2025-05-01T00:00:01Z");
        assert!(store.append_automated_comment("i1", &comment)?);
        assert!(!store.append_automated_comment("i1", &comment)?);
        assert_eq!(store.item("i1")?.map(|r| r.comments.len()), Some(1));
        assert!(store.item("../i1").is_err());
        Ok(())
    }

    #[test]
    fn local_store_skips_unreadable_item_files() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events = EventWriter::memory("store");
        let store =
            LocalStore::new(temp.path(), "https://files.example").with_events(events.clone());
        store.put_item(&record("i1", "u1"))?;
        store.put_item(&record("i2", "u1"))?;
        std::fs::write(temp.path().join("items").join("broken.json"), "{\"id\": ")?;

        let mut ids: Vec<String> = store
            .items_for_user("u1")?
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["i1", "i2"]);

        let skipped = events.captured();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0]["type"], json!("document_skipped"));
        assert!(skipped[0]["path"].as_str().unwrap_or_default().ends_with("broken.json"));
        Ok(())
    }

    #[test]
    fn local_store_writes_sessions_and_blobs() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store = LocalStore::new(temp.path(), "https://files.example/");
        store.create_session(&session("s1"))?;
        assert!(store.create_session(&session("s1")).is_err());
        assert_eq!(store.session("s1")?.map(|s| s.user_id), Some("u1".to_string()));

        let url = store.put_public("coach-sessions/u1/x-before.jpg", "image/jpeg", b"jpeg")?;
        assert_eq!(url, "https://files.example/coach-sessions/u1/x-before.jpg");
        let on_disk = std::fs::read(
            temp.path()
                .join("blobs")
                .join("coach-sessions")
                .join("u1")
                .join("x-before.jpg"),
        )?;
        assert_eq!(on_disk, b"jpeg");
        Ok(())
    }
}
