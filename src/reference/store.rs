// Reference store — curated example diagrams loaded from `index.json`
//
// Layout on disk:
//   <dir>/index.json   {"metadata": {...}, "examples": [{id, source_context, caption, image_path, category}]}
//   <dir>/images/...   image files, referenced relative to <dir>

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

use crate::error::{PipelineError, PipelineResult};

pub const INDEX_FILE: &str = "index.json";

/// One curated example: the text it was drawn from and the published figure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub id: String,
    pub source_context: String,
    pub caption: String,
    /// Absolute once loaded through a store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ReferenceRecord {
    pub fn new(
        id: impl Into<String>,
        source_context: impl Into<String>,
        caption: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_context: source_context.into(),
            caption: caption.into(),
            image_path: None,
            category: None,
        }
    }

    pub fn with_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Image path, if set and present on disk
    pub fn existing_image(&self) -> Option<&Path> {
        self.image_path.as_deref().filter(|p| p.is_file())
    }
}

#[derive(Debug, Default)]
struct Catalog {
    records: Vec<ReferenceRecord>,
    by_id: HashMap<String, usize>,
}

impl Catalog {
    fn new(records: Vec<ReferenceRecord>) -> Self {
        let mut by_id = HashMap::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            if by_id.insert(record.id.clone(), idx).is_some() {
                tracing::warn!(id = %record.id, "Duplicate reference id; later entry shadows earlier");
            }
        }
        Self { records, by_id }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct IndexFile {
    #[serde(default)]
    metadata: serde_json::Value,
    #[serde(default)]
    examples: Vec<ReferenceRecord>,
}

/// Read-only catalog of reference examples, loaded on first access.
///
/// Safe to share across concurrent runs behind an `Arc`; the first caller
/// loads the index and everyone after reads the cached records.
#[derive(Debug)]
pub struct ReferenceStore {
    dir: PathBuf,
    catalog: OnceCell<Catalog>,
}

impl ReferenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            catalog: OnceCell::new(),
        }
    }

    /// Store backed by an in-memory list (no index file is read).
    pub fn from_records(dir: impl Into<PathBuf>, records: Vec<ReferenceRecord>) -> Self {
        Self {
            dir: dir.into(),
            catalog: OnceCell::new_with(Some(Catalog::new(records))),
        }
    }

    /// Write a new `index.json` under `dir` and return a store over it.
    pub fn create(
        dir: impl Into<PathBuf>,
        records: Vec<ReferenceRecord>,
        metadata: Option<serde_json::Value>,
    ) -> PipelineResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;

        let index = IndexFile {
            metadata: metadata.unwrap_or_else(|| serde_json::json!({})),
            examples: records,
        };
        let json = serde_json::to_string_pretty(&index).map_err(|source| {
            PipelineError::Serialization {
                what: "reference index",
                source,
            }
        })?;
        let path = dir.join(INDEX_FILE);
        std::fs::write(&path, json).map_err(|e| PipelineError::io(&path, e))?;

        tracing::info!(path = %dir.display(), count = index.examples.len(), "Created reference store");
        let records = resolve_paths(&dir, index.examples);
        Ok(Self::from_records(dir, records))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn catalog(&self) -> PipelineResult<&Catalog> {
        self.catalog
            .get_or_try_init(|| async { load_catalog(&self.dir).await })
            .await
    }

    /// All records in index order.
    pub async fn get_all(&self) -> PipelineResult<&[ReferenceRecord]> {
        Ok(&self.catalog().await?.records)
    }

    pub async fn get_by_id(&self, id: &str) -> PipelineResult<Option<&ReferenceRecord>> {
        let catalog = self.catalog().await?;
        Ok(catalog.by_id.get(id).map(|&idx| &catalog.records[idx]))
    }

    pub async fn get_by_category(&self, category: &str) -> PipelineResult<Vec<&ReferenceRecord>> {
        Ok(self
            .catalog()
            .await?
            .records
            .iter()
            .filter(|r| r.category.as_deref() == Some(category))
            .collect())
    }

    pub async fn count(&self) -> PipelineResult<usize> {
        Ok(self.catalog().await?.records.len())
    }
}

async fn load_catalog(dir: &Path) -> PipelineResult<Catalog> {
    let index_path = dir.join(INDEX_FILE);
    if !tokio::fs::try_exists(&index_path).await.unwrap_or(false) {
        tracing::warn!(path = %dir.display(), "No reference index found; catalog is empty");
        return Ok(Catalog::default());
    }

    let contents = tokio::fs::read_to_string(&index_path)
        .await
        .map_err(|e| PipelineError::Catalog {
            path: index_path.clone(),
            reason: e.to_string(),
        })?;
    let index: IndexFile =
        serde_json::from_str(&contents).map_err(|e| PipelineError::Catalog {
            path: index_path.clone(),
            reason: format!("invalid index.json: {}", e),
        })?;

    let records = resolve_paths(dir, index.examples);
    tracing::info!(count = records.len(), path = %dir.display(), "Loaded reference examples");
    Ok(Catalog::new(records))
}

/// Anchor relative image paths at the store directory; drop empty ones.
fn resolve_paths(dir: &Path, records: Vec<ReferenceRecord>) -> Vec<ReferenceRecord> {
    records
        .into_iter()
        .map(|mut record| {
            record.image_path = record
                .image_path
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| if p.is_absolute() { p } else { dir.join(p) });
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_index(dir: &Path, json: &str) {
        std::fs::write(dir.join(INDEX_FILE), json).unwrap();
    }

    #[tokio::test]
    async fn test_missing_index_is_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReferenceStore::new(dir.path());
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_loads_and_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        write_index(
            dir.path(),
            r#"{
                "metadata": {"source": "test"},
                "examples": [
                    {"id": "a", "source_context": "ctx a", "caption": "cap a", "image_path": "images/a.png", "category": "agent"},
                    {"id": "b", "source_context": "ctx b", "caption": "cap b", "image_path": "/abs/b.png"},
                    {"id": "c", "source_context": "ctx c", "caption": "cap c", "image_path": ""}
                ]
            }"#,
        );

        let store = ReferenceStore::new(dir.path());
        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].image_path.as_deref(), Some(dir.path().join("images/a.png").as_path()));
        assert_eq!(all[1].image_path.as_deref(), Some(Path::new("/abs/b.png")));
        assert_eq!(all[2].image_path, None);

        assert_eq!(store.get_by_id("b").await.unwrap().unwrap().caption, "cap b");
        assert!(store.get_by_id("zzz").await.unwrap().is_none());

        let agents = store.get_by_category("agent").await.unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].id, "a");
    }

    #[tokio::test]
    async fn test_corrupt_index_is_catalog_error() {
        let dir = tempfile::tempdir().unwrap();
        write_index(dir.path(), "{ not json");
        let store = ReferenceStore::new(dir.path());
        let err = store.get_all().await.unwrap_err();
        assert!(matches!(err, PipelineError::Catalog { .. }));
    }

    #[tokio::test]
    async fn test_create_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            ReferenceRecord::new("x", "context x", "caption x").with_image("images/x.png"),
            ReferenceRecord::new("y", "context y", "caption y").with_category("vision"),
        ];
        let created = ReferenceStore::create(dir.path(), records, None).unwrap();
        assert_eq!(created.count().await.unwrap(), 2);

        let reloaded = ReferenceStore::new(dir.path());
        let x = reloaded.get_by_id("x").await.unwrap().unwrap();
        assert_eq!(x.image_path.as_deref(), Some(dir.path().join("images/x.png").as_path()));
        assert_eq!(
            reloaded.get_by_id("y").await.unwrap().unwrap().category.as_deref(),
            Some("vision")
        );
    }

    #[tokio::test]
    async fn test_concurrent_first_reads_share_one_catalog() {
        let dir = tempfile::tempdir().unwrap();
        write_index(
            dir.path(),
            r#"{"examples": [{"id": "a", "source_context": "s", "caption": "c"}]}"#,
        );
        let store = std::sync::Arc::new(ReferenceStore::new(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.count().await.unwrap() })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 1);
        }
    }
}
