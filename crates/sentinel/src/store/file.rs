//! File-based entity store: one JSON document per entity.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use super::EntityStore;
use crate::entity::Entity;
use crate::error::StoreError;

/// Stores each entity at `<root>/entities/<id>.json`.
pub struct FileStore {
    entities_dir: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            entities_dir: root.as_ref().join("entities"),
        }
    }

    /// Directory holding the entity documents.
    pub fn entities_dir(&self) -> &Path {
        &self.entities_dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.entities_dir.join(format!("{id}.json"))
    }

    fn io_error(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    async fn read_record(path: &Path) -> Result<Option<Entity>, StoreError> {
        match fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    path: path.display().to_string(),
                    source,
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(path, e)),
        }
    }
}

#[async_trait]
impl EntityStore for FileStore {
    async fn get(&self, id: &str) -> Result<Option<Entity>, StoreError> {
        Self::read_record(&self.record_path(id)).await
    }

    async fn upsert(&self, entity: &Entity) -> Result<(), StoreError> {
        fs::create_dir_all(&self.entities_dir)
            .await
            .map_err(|e| Self::io_error(&self.entities_dir, e))?;

        let content =
            serde_json::to_string_pretty(entity).map_err(|source| StoreError::Serialize {
                id: entity.id.clone(),
                source,
            })?;

        // Write-then-rename so a crash never leaves a half-written record.
        let path = self.record_path(&entity.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| Self::io_error(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| Self::io_error(&path, e))
    }

    async fn list(&self) -> Result<Vec<Entity>, StoreError> {
        let mut dir = match fs::read_dir(&self.entities_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error(&self.entities_dir, e)),
        };

        let mut entities = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| Self::io_error(&self.entities_dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(Some(entity)) => entities.push(entity),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable entity record"),
            }
        }

        entities.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entities)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self.record_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }
}
