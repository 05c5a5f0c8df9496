//! Storage seam for persisted person documents.
//!
//! The engine itself never decides where documents live. Callers hand the
//! repository a [`RoadmapStorage`]; the two implementations here cover
//! tests (in memory) and the operator CLI (one JSON file per person).

use async_trait::async_trait;
use dashmap::DashMap;
use milestone_graph::persistence::{person_from_json, person_to_json};
use milestone_graph::Person;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::{EngineError, Result};

/// Loads and saves whole person documents.
///
/// Implementations must be safe to share across tasks.
#[async_trait]
pub trait RoadmapStorage: Send + Sync {
    /// Backend identifier for logs.
    fn id(&self) -> &str;

    /// Load a person; `None` if nothing is stored for them.
    async fn load_person(&self, person_id: &str) -> Result<Option<Person>>;

    /// Replace the stored document for a person.
    async fn save_person(&self, person: &Person) -> Result<()>;
}

/// Keeps serialized documents in memory.
///
/// Documents still go through JSON so that load and save exercise the same
/// shape as file storage.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    documents: DashMap<String, String>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw JSON document, e.g. a legacy one.
    pub fn insert_json(&self, person_id: impl Into<String>, json: impl Into<String>) {
        self.documents.insert(person_id.into(), json.into());
    }

    pub fn raw(&self, person_id: &str) -> Option<String> {
        self.documents.get(person_id).map(|d| d.value().clone())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl RoadmapStorage for InMemoryStorage {
    fn id(&self) -> &str {
        "memory"
    }

    async fn load_person(&self, person_id: &str) -> Result<Option<Person>> {
        let Some(json) = self.raw(person_id) else {
            return Ok(None);
        };
        Ok(Some(person_from_json(person_id, &json)?))
    }

    async fn save_person(&self, person: &Person) -> Result<()> {
        let json = person_to_json(person)?;
        self.documents.insert(person.id.clone(), json);
        debug!(person_id = %person.id, "Person stored in memory");
        Ok(())
    }
}

/// One `<person>.json` file per person inside a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    root: PathBuf,
}

impl JsonFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for a person. Ids are restricted to a safe file-name alphabet.
    pub fn path_for(&self, person_id: &str) -> Result<PathBuf> {
        let valid = !person_id.is_empty()
            && person_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !person_id.starts_with('.');
        if !valid {
            return Err(EngineError::Storage(format!(
                "person id '{person_id}' is not a valid file name"
            )));
        }
        Ok(self.root.join(format!("{person_id}.json")))
    }
}

#[async_trait]
impl RoadmapStorage for JsonFileStorage {
    fn id(&self) -> &str {
        "json-file"
    }

    async fn load_person(&self, person_id: &str) -> Result<Option<Person>> {
        let path = self.path_for(person_id)?;
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        debug!(person_id = %person_id, path = %path.display(), "Person loaded from file");
        Ok(Some(person_from_json(person_id, &json)?))
    }

    async fn save_person(&self, person: &Person) -> Result<()> {
        let path = self.path_for(&person.id)?;
        tokio::fs::create_dir_all(&self.root).await?;
        let json = person_to_json(person)?;

        // Write then rename so a crash never leaves a truncated document.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        info!(person_id = %person.id, path = %path.display(), "Person saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_person() -> Person {
        let mut person = Person::new("carol");
        let goal_id = person.create_goal("Data engineer");
        let goal = person.goal_mut(&goal_id).unwrap();
        goal.add_milestone("SQL", 7, None, None).unwrap();
        person
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let storage = InMemoryStorage::new();
        assert!(storage.load_person("carol").await.unwrap().is_none());

        let person = sample_person();
        storage.save_person(&person).await.unwrap();
        let loaded = storage.load_person("carol").await.unwrap().unwrap();
        assert_eq!(loaded.goal_order, person.goal_order);
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_loads_legacy_document() {
        let storage = InMemoryStorage::new();
        storage.insert_json(
            "dave",
            r#"{"roadmaps": {"g1": {"title": "PM", "milestones": [{"name": "A"}, {"name": "B"}]}}}"#,
        );
        let person = storage.load_person("dave").await.unwrap().unwrap();
        assert_eq!(person.goal("g1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("people"));
        assert!(storage.load_person("carol").await.unwrap().is_none());

        storage.save_person(&sample_person()).await.unwrap();
        assert!(dir.path().join("people/carol.json").exists());
        let loaded = storage.load_person("carol").await.unwrap().unwrap();
        assert_eq!(loaded.goals.len(), 1);
    }

    #[test]
    fn test_memory_save_replaces_document() {
        let storage = InMemoryStorage::new();
        let mut person = sample_person();
        tokio_test::block_on(storage.save_person(&person)).unwrap();
        person.create_goal("Analytics engineer");
        tokio_test::block_on(storage.save_person(&person)).unwrap();

        let loaded = tokio_test::block_on(storage.load_person("carol"))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.goals.len(), 2);
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let storage = JsonFileStorage::new("/tmp/roadmaps");
        assert!(storage.path_for("../etc/passwd").is_err());
        assert!(storage.path_for(".hidden").is_err());
        assert!(storage.path_for("").is_err());
        assert!(storage.path_for("user_42").is_ok());
    }
}
