//! Filesystem task store — folder-as-status persistence.
//!
//! The filesystem is the sole source of truth for task state. Every
//! lifecycle transition is a `rename` within the same volume, which is
//! atomic: two agents racing on the same file see exactly one winner.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::task::{FIND_ORDER, Task, TaskFolder, TaskPatch, TaskWithStatus};

/// Backend-agnostic task store. The filesystem implementation is the only
/// one today; a database-backed store could slot in without changing
/// callers.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// List tasks across the folders matching `filter`, annotating each
    /// with the status derived from its folder. Unparseable documents are
    /// skipped and logged.
    async fn list(&self, filter: &str) -> Result<Vec<TaskWithStatus>, StoreError>;

    /// List one folder's documents as `(file_name, task)` pairs.
    async fn list_folder(&self, folder: TaskFolder) -> Result<Vec<(String, Task)>, StoreError>;

    /// Locate a task by ID, searching folders in `FIND_ORDER`.
    async fn find(&self, id: &str) -> Result<TaskFolder, StoreError>;

    /// Load a task by ID, returning it with its current folder.
    async fn load(&self, id: &str) -> Result<(Task, TaskFolder), StoreError>;

    /// Persist a new task, routing it to a backlog subfolder by
    /// provenance. The task carries its own ID and timestamps.
    async fn create(&self, task: Task) -> Result<Task, StoreError>;

    /// Merge a whitelisted patch into a task and write it back.
    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<Task, StoreError>;

    /// Remove a task document.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Rename a task document between folders. The only state-transition
    /// primitive; a lost race surfaces as `ClaimLost`.
    async fn transition(
        &self,
        id: &str,
        from: TaskFolder,
        to: TaskFolder,
    ) -> Result<(), StoreError>;

    /// Rewrite a task document in place, without moving it.
    async fn write_in_place(&self, task: &Task, folder: TaskFolder) -> Result<(), StoreError>;
}

/// Filesystem-backed task store rooted at `<base>/tasks`.
pub struct FsTaskStore {
    root: PathBuf,
}

impl FsTaskStore {
    /// Create a store over an existing tasks root. Use [`Self::bootstrap`]
    /// to also create the folder tree.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the store and its full folder tree.
    pub async fn bootstrap(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(root);
        for folder in FIND_ORDER {
            let dir = store.folder_path(folder);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| storage_err(&dir, e))?;
        }
        Ok(store)
    }

    /// Absolute path of a status folder.
    pub fn folder_path(&self, folder: TaskFolder) -> PathBuf {
        self.root.join(folder.rel_path())
    }

    /// Absolute path of a task document within a folder.
    pub fn doc_path(&self, folder: TaskFolder, id: &str) -> PathBuf {
        self.folder_path(folder).join(format!("{id}.yaml"))
    }

    async fn read_doc(&self, path: &Path) -> Result<Task, StoreError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| storage_err(path, e))?;
        serde_yaml::from_str(&raw).map_err(|e| StoreError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    async fn write_doc(&self, path: &Path, task: &Task) -> Result<(), StoreError> {
        let yaml = serde_yaml::to_string(task).map_err(|e| StoreError::Serialize(e.to_string()))?;
        tokio::fs::write(path, yaml)
            .await
            .map_err(|e| storage_err(path, e))
    }
}

fn storage_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Storage {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl TaskStore for FsTaskStore {
    async fn list(&self, filter: &str) -> Result<Vec<TaskWithStatus>, StoreError> {
        let mut tasks = Vec::new();
        for folder in TaskFolder::matching_filter(filter) {
            for (_, task) in self.list_folder(folder).await? {
                tasks.push(TaskWithStatus {
                    task,
                    status: folder.status_label(),
                });
            }
        }
        Ok(tasks)
    }

    async fn list_folder(&self, folder: TaskFolder) -> Result<Vec<(String, Task)>, StoreError> {
        let dir = self.folder_path(folder);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // A missing folder reads as empty; bootstrap creates them all.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err(&dir, e)),
        };

        let mut tasks = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_err(&dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            match self.read_doc(&path).await {
                Ok(task) => tasks.push((file_name, task)),
                Err(e) => {
                    // Listings tolerate bad documents; direct loads do not.
                    warn!(path = %path.display(), error = %e, "Skipping unparseable task document");
                }
            }
        }
        Ok(tasks)
    }

    async fn find(&self, id: &str) -> Result<TaskFolder, StoreError> {
        for folder in FIND_ORDER {
            let path = self.doc_path(folder, id);
            match tokio::fs::try_exists(&path).await {
                Ok(true) => return Ok(folder),
                Ok(false) => continue,
                Err(e) => return Err(storage_err(&path, e)),
            }
        }
        Err(StoreError::NotFound(id.to_string()))
    }

    async fn load(&self, id: &str) -> Result<(Task, TaskFolder), StoreError> {
        let folder = self.find(id).await?;
        let task = self.read_doc(&self.doc_path(folder, id)).await?;
        Ok((task, folder))
    }

    async fn create(&self, task: Task) -> Result<Task, StoreError> {
        let folder = if Task::is_automated_provenance(&task.created_by) {
            TaskFolder::BacklogGenerated
        } else {
            TaskFolder::BacklogManual
        };
        let path = self.doc_path(folder, &task.id);
        self.write_doc(&path, &task).await?;
        debug!(task_id = %task.id, folder = folder.rel_path(), "Created task");
        Ok(task)
    }

    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<Task, StoreError> {
        let (mut task, folder) = self.load(id).await?;
        patch.apply(&mut task);
        self.write_doc(&self.doc_path(folder, id), &task).await?;
        Ok(task)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let folder = self.find(id).await?;
        let path = self.doc_path(folder, id);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| storage_err(&path, e))
    }

    async fn transition(
        &self,
        id: &str,
        from: TaskFolder,
        to: TaskFolder,
    ) -> Result<(), StoreError> {
        let src = self.doc_path(from, id);
        let dst = self.doc_path(to, id);
        match tokio::fs::rename(&src, &dst).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::ClaimLost(id.to_string())),
            Err(e) => Err(storage_err(&src, e)),
        }
    }

    async fn write_in_place(&self, task: &Task, folder: TaskFolder) -> Result<(), StoreError> {
        self.write_doc(&self.doc_path(folder, &task.id), task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::task::Task;

    async fn scratch_store() -> (tempfile::TempDir, FsTaskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTaskStore::bootstrap(dir.path().join("tasks"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn create_routes_by_provenance() {
        let (_dir, store) = scratch_store().await;

        let manual = store.create(Task::new("User task", "api")).await.unwrap();
        let generated = store
            .create(Task::new("Scanned task", "problem-scanner"))
            .await
            .unwrap();

        assert_eq!(
            store.find(&manual.id).await.unwrap(),
            TaskFolder::BacklogManual
        );
        assert_eq!(
            store.find(&generated.id).await.unwrap(),
            TaskFolder::BacklogGenerated
        );
    }

    #[tokio::test]
    async fn list_annotates_status_from_folder() {
        let (_dir, store) = scratch_store().await;

        let t1 = store.create(Task::new("t1", "api")).await.unwrap();
        let t2 = store.create(Task::new("t2", "ai")).await.unwrap();
        let t3 = store.create(Task::new("t3", "api")).await.unwrap();
        store
            .transition(&t3.id, TaskFolder::BacklogManual, TaskFolder::Active)
            .await
            .unwrap();

        let all = store.list("all").await.unwrap();
        assert_eq!(all.len(), 3);

        let status_of = |id: &str| {
            all.iter()
                .find(|t| t.task.id == id)
                .map(|t| t.status)
                .unwrap()
        };
        assert_eq!(status_of(&t1.id), "backlog");
        assert_eq!(status_of(&t2.id), "backlog");
        assert_eq!(status_of(&t3.id), "active");
    }

    #[tokio::test]
    async fn list_skips_garbage_files() {
        let (_dir, store) = scratch_store().await;
        store.create(Task::new("good", "api")).await.unwrap();

        let staged_dir = store.folder_path(TaskFolder::BacklogManual);
        tokio::fs::write(staged_dir.join("junk.yaml"), ": not : valid : yaml :[")
            .await
            .unwrap();
        tokio::fs::write(staged_dir.join("README.md"), "not a task")
            .await
            .unwrap();

        let all = store.list("all").await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn move_and_move_back_is_byte_equal() {
        let (_dir, store) = scratch_store().await;
        let task = store.create(Task::new("roundtrip", "api")).await.unwrap();
        let original_path = store.doc_path(TaskFolder::BacklogManual, &task.id);
        let before = tokio::fs::read(&original_path).await.unwrap();

        store
            .transition(&task.id, TaskFolder::BacklogManual, TaskFolder::Staged)
            .await
            .unwrap();
        store
            .transition(&task.id, TaskFolder::Staged, TaskFolder::BacklogManual)
            .await
            .unwrap();

        let after = tokio::fs::read(&original_path).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn lost_claim_surfaces_as_claim_lost() {
        let (_dir, store) = scratch_store().await;
        let task = store.create(Task::new("contested", "api")).await.unwrap();
        store
            .transition(&task.id, TaskFolder::BacklogManual, TaskFolder::Staged)
            .await
            .unwrap();

        store
            .transition(&task.id, TaskFolder::Staged, TaskFolder::Active)
            .await
            .unwrap();
        // Second claim of the same file loses the race.
        let err = store
            .transition(&task.id, TaskFolder::Staged, TaskFolder::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ClaimLost(_)));
    }

    #[tokio::test]
    async fn find_unknown_id_is_not_found() {
        let (_dir, store) = scratch_store().await;
        let err = store.find("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_merges_whitelisted_patch() {
        let (_dir, store) = scratch_store().await;
        let task = store.create(Task::new("before", "api")).await.unwrap();

        let patch = TaskPatch {
            title: Some("after".into()),
            description: Some("new body".into()),
            notes: None,
        };
        let updated = store.update(&task.id, &patch).await.unwrap();
        assert_eq!(updated.title, "after");

        let (reloaded, _) = store.load(&task.id).await.unwrap();
        assert_eq!(reloaded.title, "after");
        assert_eq!(reloaded.description, "new body");
    }

    #[tokio::test]
    async fn delete_removes_the_document() {
        let (_dir, store) = scratch_store().await;
        let task = store.create(Task::new("gone", "api")).await.unwrap();
        store.delete(&task.id).await.unwrap();
        assert!(matches!(
            store.find(&task.id).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
