//! Saved locations, persisted as a small JSON document.
//!
//! File layout: `{ "locations": [ { "id", "location", "description" }, ... ] }`.
//! The whole document is held in memory and rewritten on every insert.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::services::options::Location;

pub const PLACES_FILE: &str = "places.json";

#[derive(Debug, thiserror::Error)]
pub enum PlaceStoreError {
    #[error("place store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("place store {path} is not valid JSON: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode place store: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("place id must not be empty")]
    EmptyId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Place {
    pub id: String,
    pub location: Location,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PlacesDocument {
    #[serde(default)]
    locations: Vec<Place>,
}

#[derive(Debug)]
pub struct PlaceStore {
    path: PathBuf,
    document: RwLock<PlacesDocument>,
}

impl PlaceStore {
    /// Load `<data_dir>/places.json`, starting empty if it does not exist yet.
    pub async fn open(data_dir: &Path) -> Result<Self, PlaceStoreError> {
        let path = data_dir.join(PLACES_FILE);
        let document = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| PlaceStoreError::Corrupt {
                path: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PlacesDocument::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            document: RwLock::new(document),
        })
    }

    pub async fn list(&self) -> Vec<Place> {
        self.document.read().await.locations.clone()
    }

    pub async fn get(&self, id: &str) -> Option<Place> {
        self.document
            .read()
            .await
            .locations
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// Insert `place` unless its id is already stored. Returns whether it was added.
    pub async fn save(&self, place: Place) -> Result<bool, PlaceStoreError> {
        if place.id.trim().is_empty() {
            return Err(PlaceStoreError::EmptyId);
        }

        let mut document = self.document.write().await;
        if document.locations.iter().any(|p| p.id == place.id) {
            return Ok(false);
        }

        document.locations.push(place);
        if let Err(e) = self.persist(&document).await {
            // Keep memory and disk in step.
            document.locations.pop();
            return Err(e);
        }
        Ok(true)
    }

    async fn persist(&self, document: &PlacesDocument) -> Result<(), PlaceStoreError> {
        let encoded = serde_json::to_vec_pretty(document).map_err(PlaceStoreError::Encode)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, encoded).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(id: &str, description: &str) -> Place {
        Place {
            id: id.to_string(),
            location: Location::new(47.3769, 8.5417),
            description: description.to_string(),
        }
    }

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlaceStore::open(dir.path()).await.unwrap();
        assert!(store.list().await.is_empty());
        assert!(store.get("zrh").await.is_none());
    }

    #[tokio::test]
    async fn test_save_is_noop_for_existing_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlaceStore::open(dir.path()).await.unwrap();

        assert!(store.save(place("zrh", "Zurich")).await.unwrap());
        assert!(!store.save(place("zrh", "Renamed")).await.unwrap());

        let saved = store.list().await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].description, "Zurich");
    }

    #[tokio::test]
    async fn test_saved_places_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PlaceStore::open(dir.path()).await.unwrap();
            store.save(place("zrh", "Zurich")).await.unwrap();
            store.save(place("cdg", "Paris")).await.unwrap();
        }

        let store = PlaceStore::open(dir.path()).await.unwrap();
        let ids: Vec<String> = store.list().await.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["zrh", "cdg"]);
        assert_eq!(store.get("cdg").await.unwrap().description, "Paris");
    }

    #[tokio::test]
    async fn test_reads_existing_document() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(PLACES_FILE),
            r#"{"locations":[{"id":"jfk","location":{"lat":40.64,"lon":-73.78}}]}"#,
        )
        .await
        .unwrap();

        let store = PlaceStore::open(dir.path()).await.unwrap();
        let jfk = store.get("jfk").await.unwrap();
        assert_eq!(jfk.location, Location::new(40.64, -73.78));
        assert_eq!(jfk.description, "");
    }

    #[tokio::test]
    async fn test_corrupt_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(PLACES_FILE), "{ nope")
            .await
            .unwrap();
        let err = PlaceStore::open(dir.path()).await.unwrap_err();
        assert!(matches!(err, PlaceStoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlaceStore::open(dir.path()).await.unwrap();
        let err = store.save(place("  ", "nowhere")).await.unwrap_err();
        assert!(matches!(err, PlaceStoreError::EmptyId));
    }
}
