//! File-based work item storage implementation
//!
//! Stores work items as JSON in a file on disk.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;

use super::model::{NewWorkItem, WorkItem, WorkItemId, WorkItemStatus};
use super::repository::WorkItemRepository;
use crate::{Error, Result};

/// On-disk layout of the store
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreFile {
    next_id: WorkItemId,
    work_items: Vec<WorkItem>,
}

#[derive(Debug, Clone)]
struct Cache {
    next_id: WorkItemId,
    items: BTreeMap<WorkItemId, WorkItem>,
}

/// File-based work item store using JSON
pub struct FileWorkItemStore {
    /// Path to the JSON file
    path: PathBuf,
    /// In-memory cache of work items
    cache: RwLock<Cache>,
}

impl FileWorkItemStore {
    /// Create a new FileWorkItemStore
    ///
    /// If the file doesn't exist, it will be created on first write.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str::<StoreFile>(&content)?
        } else {
            StoreFile::default()
        };

        let max_id = file.work_items.iter().map(|w| w.id).max().unwrap_or(0);
        let cache = Cache {
            next_id: file.next_id.max(max_id + 1),
            items: file.work_items.into_iter().map(|w| (w.id, w)).collect(),
        };

        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    /// Persist `next` and only then make it the live cache
    ///
    /// Called with the write guard held so that snapshots hit the disk in
    /// the order they were taken. A failed write leaves the cache untouched.
    async fn commit(&self, cache: &mut Cache, next: Cache) -> Result<()> {
        self.persist(&next).await?;
        *cache = next;
        Ok(())
    }

    async fn persist(&self, cache: &Cache) -> Result<()> {
        let file = StoreFile {
            next_id: cache.next_id,
            work_items: cache.items.values().cloned().collect(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, content).await?;
        debug!("Persisted {} work items to {:?}", cache.items.len(), self.path);
        Ok(())
    }
}

fn newest_first(items: &mut [WorkItem]) {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl WorkItemRepository for FileWorkItemStore {
    async fn create(&self, item: NewWorkItem) -> Result<WorkItem> {
        if item.title.trim().is_empty() {
            return Err(Error::InvalidInput("Title cannot be empty".to_string()));
        }

        let mut cache = self.cache.write().await;
        let mut next = cache.clone();
        let id = next.next_id;
        let created = item.into_work_item(id);
        next.next_id += 1;
        next.items.insert(id, created.clone());
        self.commit(&mut cache, next).await?;
        Ok(created)
    }

    async fn get(&self, id: WorkItemId) -> Result<Option<WorkItem>> {
        let cache = self.cache.read().await;
        Ok(cache.items.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<WorkItem>> {
        let cache = self.cache.read().await;
        let mut items: Vec<WorkItem> = cache.items.values().cloned().collect();
        newest_first(&mut items);
        Ok(items)
    }

    async fn update(&self, mut item: WorkItem) -> Result<WorkItem> {
        item.updated_at = Utc::now();
        let mut cache = self.cache.write().await;
        if !cache.items.contains_key(&item.id) {
            return Err(Error::WorkItemNotFound(item.id));
        }
        let mut next = cache.clone();
        next.items.insert(item.id, item.clone());
        self.commit(&mut cache, next).await?;
        Ok(item)
    }

    async fn set_status(&self, id: WorkItemId, status: WorkItemStatus) -> Result<WorkItem> {
        let mut cache = self.cache.write().await;
        let mut next = cache.clone();
        let updated = {
            let item = next
                .items
                .get_mut(&id)
                .ok_or(Error::WorkItemNotFound(id))?;
            item.status = status;
            item.updated_at = Utc::now();
            item.clone()
        };
        self.commit(&mut cache, next).await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work_item::WorkItemPriority;
    use tempfile::TempDir;

    async fn create_test_store() -> (FileWorkItemStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("work_items.json");
        let store = FileWorkItemStore::new(&path).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_create_allocates_sequential_ids() {
        let (store, _temp) = create_test_store().await;

        let first = store.create(NewWorkItem::new("First")).await.unwrap();
        let second = store
            .create(NewWorkItem::new("Second").with_description("details"))
            .await
            .unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(second.description.as_deref(), Some("details"));
        assert_eq!(second.status, WorkItemStatus::Pending);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_title() {
        let (store, _temp) = create_test_store().await;

        let result = store.create(NewWorkItem::new("   ")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_work_item() {
        let (store, _temp) = create_test_store().await;

        let created = store.create(NewWorkItem::new("Lookup")).await.unwrap();
        let retrieved = store.get(created.id).await.unwrap();
        assert_eq!(retrieved.map(|w| w.title), Some("Lookup".to_string()));

        assert!(store.get(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let (store, _temp) = create_test_store().await;

        store.create(NewWorkItem::new("Item 1")).await.unwrap();
        store.create(NewWorkItem::new("Item 2")).await.unwrap();
        store.create(NewWorkItem::new("Item 3")).await.unwrap();

        let items = store.list().await.unwrap();
        let ids: Vec<_> = items.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_set_status() {
        let (store, _temp) = create_test_store().await;

        let created = store.create(NewWorkItem::new("Status")).await.unwrap();
        let updated = store
            .set_status(created.id, WorkItemStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(updated.status, WorkItemStatus::InProgress);
        assert!(updated.updated_at >= created.updated_at);

        let missing = store.set_status(42, WorkItemStatus::Completed).await;
        match missing {
            Err(Error::WorkItemNotFound(42)) => {}
            other => panic!("Expected WorkItemNotFound, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_nonexistent_work_item() {
        let (store, _temp) = create_test_store().await;

        let ghost = NewWorkItem::new("Ghost").into_work_item(77);
        let result = store.update(ghost).await;
        assert!(matches!(result, Err(Error::WorkItemNotFound(77))));
    }

    /// Swap the backing file for a directory so every write fails
    fn break_backing_file(path: &std::path::Path) {
        std::fs::remove_file(path).unwrap();
        std::fs::create_dir(path).unwrap();
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_unchanged() {
        let (store, temp) = create_test_store().await;
        let path = temp.path().join("work_items.json");

        let created = store.create(NewWorkItem::new("Fragile")).await.unwrap();
        break_backing_file(&path);

        assert!(store
            .set_status(created.id, WorkItemStatus::InProgress)
            .await
            .is_err());
        let mut renamed = created.clone();
        renamed.title = "Renamed".to_string();
        assert!(store.update(renamed).await.is_err());
        assert!(store.create(NewWorkItem::new("Lost")).await.is_err());

        let current = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(current.status, WorkItemStatus::Pending);
        assert_eq!(current.title, "Fragile");
        assert_eq!(store.list().await.unwrap().len(), 1);

        // Once the disk recovers the failed create did not burn an id
        std::fs::remove_dir(&path).unwrap();
        let next = store.create(NewWorkItem::new("Second")).await.unwrap();
        assert_eq!(next.id, 2);
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("work_items.json");

        let id = {
            let store = FileWorkItemStore::new(&path).await.unwrap();
            let item = NewWorkItem::new("Persistent")
                .with_description("Should survive reload")
                .with_priority(WorkItemPriority::High);
            store.create(item).await.unwrap().id
        };

        let store = FileWorkItemStore::new(&path).await.unwrap();
        let item = store.get(id).await.unwrap().unwrap();
        assert_eq!(item.title, "Persistent");
        assert_eq!(item.priority, WorkItemPriority::High);

        let next = store.create(NewWorkItem::new("After reload")).await.unwrap();
        assert_eq!(next.id, id + 1);
    }
}
