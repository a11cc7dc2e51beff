//! Project lifecycle: ingestion, replacement, deletion and read access.
//!
//! This is the surface callers outside the HTTP layer use. Every write goes
//! through the project's storage lock so the tree on disk and the row in the
//! store always describe the same upload.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ingest::{IngestError, IngestLimits, UploadInput, UploadManifest, ingest, resolve_entry};
use crate::storage::{BrowseError, FileEntry, ProjectStorage, StorageError, Swap};
use crate::store::Store;
use crate::types::{Project, UploadMode, User};

pub const NO_ENTRY_WARNING: &str =
    "No HTML file was found, so the project has no page to open yet. Upload one to make it viewable.";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Browse(#[from] BrowseError),
    #[error("database error: {0}")]
    Store(#[from] crate::error::Error),
    #[error("project not found")]
    NotFound,
    #[error("not allowed to access this project")]
    Forbidden,
    #[error("only students can upload projects")]
    UploadNotAllowed,
    #[error("ingestion task failed: {0}")]
    Task(String),
}

impl ProjectError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ingest(e) => e.kind(),
            Self::Storage(e) => e.kind(),
            Self::Browse(e) => e.kind(),
            Self::Store(_) | Self::Task(_) => "internal",
            Self::NotFound => "not_found",
            Self::Forbidden | Self::UploadNotAllowed => "forbidden",
        }
    }
}

pub struct NewProject {
    pub title: String,
    pub description: Option<String>,
    pub context: Option<String>,
    pub upload: UploadInput,
}

/// A stored project plus anything the uploader should be told about it.
#[derive(Debug, Serialize)]
pub struct IngestOutcome {
    #[serde(flatten)]
    pub project: Project,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl IngestOutcome {
    fn new(project: Project) -> Self {
        let warning = project
            .entry_file
            .is_none()
            .then(|| NO_ENTRY_WARNING.to_string());
        Self { project, warning }
    }
}

struct Prepared {
    manifest: UploadManifest,
    entry_file: Option<String>,
    mode: UploadMode,
}

pub struct ProjectService {
    store: Arc<dyn Store>,
    storage: Arc<ProjectStorage>,
    limits: IngestLimits,
}

impl ProjectService {
    pub fn new(store: Arc<dyn Store>, storage: Arc<ProjectStorage>, limits: IngestLimits) -> Self {
        Self {
            store,
            storage,
            limits,
        }
    }

    #[must_use]
    pub fn limits(&self) -> &IngestLimits {
        &self.limits
    }

    async fn prepare(&self, upload: UploadInput) -> Result<Prepared, ProjectError> {
        let mode = upload.mode();
        let limits = self.limits.clone();

        let manifest = tokio::task::spawn_blocking(move || ingest(upload, &limits))
            .await
            .map_err(|e| ProjectError::Task(e.to_string()))??;

        let entry_file = resolve_entry(manifest.paths());
        if entry_file.is_none() {
            warn!(files = manifest.len(), "upload has no entry file");
        }

        Ok(Prepared {
            manifest,
            entry_file,
            mode,
        })
    }

    pub async fn create_project(
        &self,
        owner: &User,
        new: NewProject,
    ) -> Result<IngestOutcome, ProjectError> {
        if !owner.role.can_upload() {
            return Err(ProjectError::UploadNotAllowed);
        }

        let prepared = self.prepare(new.upload).await?;

        let storage_key = ProjectStorage::new_storage_key();
        let guard = self.storage.lock(&storage_key).await?;
        let (written, swap) = self
            .storage
            .commit_locked(&guard, &prepared.manifest)
            .await?;

        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.id.clone(),
            title: new.title,
            description: new.description,
            context: new.context,
            storage_key,
            entry_file: prepared.entry_file,
            upload_mode: prepared.mode,
            file_count: written.files_written as i64,
            size_bytes: written.bytes_written as i64,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.store.create_project(&project) {
            rollback(swap, &project.id).await;
            return Err(e.into());
        }
        swap.finish().await;

        info!(
            project_id = %project.id,
            owner = %owner.username,
            mode = project.upload_mode.as_str(),
            files = project.file_count,
            "project created"
        );

        Ok(IngestOutcome::new(project))
    }

    /// Swaps a project's files for a new upload. The old tree is removed, never merged.
    ///
    /// The old tree is kept aside until the row is updated, so a failed update
    /// puts it back and the row never points at files it does not describe.
    pub async fn replace_files(
        &self,
        owner: &User,
        project_id: &str,
        upload: UploadInput,
    ) -> Result<IngestOutcome, ProjectError> {
        let project = self.owned_project(owner, project_id)?;
        let prepared = self.prepare(upload).await?;

        let guard = self.storage.lock(&project.storage_key).await?;

        // The project may have been deleted while we waited for the lock.
        let mut project = self
            .store
            .get_project(&project.id)?
            .ok_or(ProjectError::NotFound)?;

        let (written, swap) = self
            .storage
            .commit_locked(&guard, &prepared.manifest)
            .await?;

        project.entry_file = prepared.entry_file;
        project.upload_mode = prepared.mode;
        project.file_count = written.files_written as i64;
        project.size_bytes = written.bytes_written as i64;
        project.updated_at = Utc::now();

        if let Err(e) = self.store.update_project(&project) {
            rollback(swap, &project.id).await;
            return Err(e.into());
        }
        swap.finish().await;

        info!(
            project_id = %project.id,
            mode = project.upload_mode.as_str(),
            files = project.file_count,
            "project files replaced"
        );

        Ok(IngestOutcome::new(project))
    }

    pub async fn delete_project(&self, owner: &User, project_id: &str) -> Result<(), ProjectError> {
        let project = self.owned_project(owner, project_id)?;
        let guard = self.storage.lock(&project.storage_key).await?;

        let swap = self.storage.retire_locked(&guard).await?;

        let deleted = match self.store.delete_project(&project.id) {
            Ok(deleted) => deleted,
            Err(e) => {
                if let Some(swap) = swap {
                    rollback(swap, &project.id).await;
                }
                return Err(e.into());
            }
        };

        match swap {
            Some(swap) if deleted => swap.finish().await,
            Some(swap) => rollback(swap, &project.id).await,
            None if deleted => warn!(project_id = %project.id, "project had no files on disk"),
            None => {}
        }

        if !deleted {
            return Err(ProjectError::NotFound);
        }

        info!(project_id = %project.id, "project deleted");
        Ok(())
    }

    /// Deletes a user along with every project tree they own.
    pub async fn remove_user(&self, user_id: &str) -> Result<bool, ProjectError> {
        let keys = self.store.list_user_storage_keys(user_id)?;

        if !self.store.delete_user(user_id)? {
            return Ok(false);
        }

        for key in keys {
            if let Err(e) = self.storage.destroy(&key).await {
                warn!("Failed to remove project files {key}: {e}");
            }
        }

        Ok(true)
    }

    pub fn get_project(&self, viewer: &User, project_id: &str) -> Result<Project, ProjectError> {
        let project = self
            .store
            .get_project(project_id)?
            .ok_or(ProjectError::NotFound)?;

        if project.owner_id != viewer.id && !viewer.role.can_view_others() {
            return Err(ProjectError::Forbidden);
        }

        Ok(project)
    }

    pub fn list_projects(
        &self,
        owner: &User,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Project>, ProjectError> {
        Ok(self.store.list_projects(&owner.id, cursor, limit)?)
    }

    pub fn list_context_projects(
        &self,
        viewer: &User,
        context: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Project>, ProjectError> {
        if !viewer.role.can_view_others() {
            return Err(ProjectError::Forbidden);
        }

        Ok(self.store.list_context_projects(context, cursor, limit)?)
    }

    pub async fn list_files(
        &self,
        viewer: &User,
        project_id: &str,
    ) -> Result<(Project, Vec<FileEntry>), ProjectError> {
        let project = self.get_project(viewer, project_id)?;
        let files = self.storage.list_files(&project.storage_key).await?;
        Ok((project, files))
    }

    pub async fn read_file(
        &self,
        viewer: &User,
        project_id: &str,
        path: &str,
    ) -> Result<Vec<u8>, ProjectError> {
        let project = self.get_project(viewer, project_id)?;
        Ok(self.storage.read_file(&project.storage_key, path).await?)
    }

    fn owned_project(&self, owner: &User, project_id: &str) -> Result<Project, ProjectError> {
        let project = self
            .store
            .get_project(project_id)?
            .ok_or(ProjectError::NotFound)?;

        if project.owner_id != owner.id {
            return Err(ProjectError::Forbidden);
        }

        Ok(project)
    }
}

async fn rollback(swap: Swap, project_id: &str) {
    if let Err(e) = swap.rollback().await {
        warn!("Failed to restore files of project {project_id}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::Role;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        service: ProjectService,
        storage: Arc<ProjectStorage>,
        store: Arc<SqliteStore>,
        student: User,
        teacher: User,
        other: User,
    }

    fn user(store: &SqliteStore, name: &str, role: Role) -> User {
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: name.to_string(),
            role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_user(&user).unwrap();
        user
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::new(temp.path().join("test.db")).unwrap());
        store.initialize().unwrap();
        let storage = Arc::new(ProjectStorage::new(temp.path()));
        let service = ProjectService::new(
            store.clone(),
            storage.clone(),
            IngestLimits::default(),
        );

        let student = user(&store, "student", Role::Student);
        let teacher = user(&store, "teacher", Role::Teacher);
        let other = user(&store, "other", Role::Student);

        Fixture {
            _temp: temp,
            service,
            storage,
            store,
            student,
            teacher,
            other,
        }
    }

    fn files(entries: &[(&str, &[u8])]) -> UploadInput {
        UploadInput::MultipleFiles(
            entries
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_vec()))
                .collect(),
        )
    }

    fn new_project(upload: UploadInput) -> NewProject {
        NewProject {
            title: "My site".to_string(),
            description: None,
            context: Some("class-1".to_string()),
            upload,
        }
    }

    #[tokio::test]
    async fn test_create_project() {
        let f = fixture();

        let outcome = f
            .service
            .create_project(
                &f.student,
                new_project(files(&[
                    ("a/b/index.html", b"<p>"),
                    ("a/index.html", b"<p>"),
                    ("style.css", b"p{}"),
                ])),
            )
            .await
            .unwrap();

        let project = outcome.project;
        assert!(outcome.warning.is_none());
        assert_eq!(project.entry_file.as_deref(), Some("a/index.html"));
        assert_eq!(project.upload_mode, UploadMode::MultiFile);
        assert_eq!(project.file_count, 3);
        assert_eq!(project.size_bytes, 9);

        let stored = f.store.get_project(&project.id).unwrap().unwrap();
        assert_eq!(stored.storage_key, project.storage_key);

        let (_, listed) = f.service.list_files(&f.teacher, &project.id).await.unwrap();
        let paths: Vec<&str> = listed.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["style.css", "a/index.html", "a/b/index.html"]);
    }

    #[tokio::test]
    async fn test_create_without_markup_warns() {
        let f = fixture();

        let outcome = f
            .service
            .create_project(
                &f.student,
                new_project(files(&[("readme.txt", b"hi"), ("logo.png", b"png")])),
            )
            .await
            .unwrap();

        assert!(outcome.project.entry_file.is_none());
        assert_eq!(outcome.warning.as_deref(), Some(NO_ENTRY_WARNING));
    }

    #[tokio::test]
    async fn test_rejected_upload_creates_nothing() {
        let f = fixture();

        let err = f
            .service
            .create_project(
                &f.student,
                new_project(files(&[("index.html", b"1"), ("./index.html", b"2")])),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "duplicate_path");
        assert!(f.service.list_projects(&f.student, "", 10).unwrap().is_empty());
        assert!(!f._temp.path().join("projects").exists());
    }

    #[tokio::test]
    async fn test_replace_files() {
        let f = fixture();
        let created = f
            .service
            .create_project(&f.student, new_project(files(&[("old.html", b"old")])))
            .await
            .unwrap()
            .project;

        let replaced = f
            .service
            .replace_files(
                &f.student,
                &created.id,
                UploadInput::SingleFile {
                    filename: "new.html".to_string(),
                    content: b"new".to_vec(),
                },
            )
            .await
            .unwrap()
            .project;

        assert_eq!(replaced.entry_file.as_deref(), Some("new.html"));
        assert_eq!(replaced.upload_mode, UploadMode::SingleFile);

        let (_, listed) = f.service.list_files(&f.student, &created.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "new.html");
    }

    #[tokio::test]
    async fn test_failed_row_update_keeps_old_files() {
        let f = fixture();
        let created = f
            .service
            .create_project(&f.student, new_project(files(&[("old.html", b"old")])))
            .await
            .unwrap()
            .project;

        f.store
            .connection()
            .execute_batch(
                "CREATE TRIGGER block_updates BEFORE UPDATE ON projects
                 BEGIN SELECT RAISE(ABORT, 'read only'); END;",
            )
            .unwrap();

        let err = f
            .service
            .replace_files(&f.student, &created.id, files(&[("new.html", b"new")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "internal");

        let stored = f.store.get_project(&created.id).unwrap().unwrap();
        assert_eq!(stored.entry_file.as_deref(), Some("old.html"));

        let (_, listed) = f.service.list_files(&f.student, &created.id).await.unwrap();
        let paths: Vec<&str> = listed.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["old.html"]);
        assert_eq!(
            f.service
                .read_file(&f.student, &created.id, "old.html")
                .await
                .unwrap(),
            b"old".to_vec()
        );
    }

    #[tokio::test]
    async fn test_failed_row_delete_keeps_files() {
        let f = fixture();
        let created = f
            .service
            .create_project(&f.student, new_project(files(&[("index.html", b"1")])))
            .await
            .unwrap()
            .project;

        f.store
            .connection()
            .execute_batch(
                "CREATE TRIGGER block_deletes BEFORE DELETE ON projects
                 BEGIN SELECT RAISE(ABORT, 'read only'); END;",
            )
            .unwrap();

        let err = f
            .service
            .delete_project(&f.student, &created.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "internal");

        assert!(f.store.get_project(&created.id).unwrap().is_some());
        assert_eq!(
            f.service
                .read_file(&f.teacher, &created.id, "index.html")
                .await
                .unwrap(),
            b"1".to_vec()
        );
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_no_tree() {
        let f = fixture();

        f.store
            .connection()
            .execute_batch(
                "CREATE TRIGGER block_inserts BEFORE INSERT ON projects
                 BEGIN SELECT RAISE(ABORT, 'read only'); END;",
            )
            .unwrap();

        let err = f
            .service
            .create_project(&f.student, new_project(files(&[("index.html", b"1")])))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "internal");

        let projects = f._temp.path().join("projects");
        let leftovers: Vec<_> = std::fs::read_dir(&projects)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_file_and_folder_with_one_name_rejected() {
        let f = fixture();

        let err = f
            .service
            .create_project(
                &f.student,
                new_project(files(&[("x.html", b"<p>"), ("x.html/y.css", b"p{}")])),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "path_conflict");
        assert!(!f._temp.path().join("projects").exists());
    }

    #[tokio::test]
    async fn test_only_students_upload() {
        let f = fixture();
        let parent = user(&f.store, "parent", Role::Parent);

        for uploader in [&f.teacher, &parent] {
            let err = f
                .service
                .create_project(uploader, new_project(files(&[("index.html", b"1")])))
                .await
                .unwrap_err();
            assert!(matches!(err, ProjectError::UploadNotAllowed));
            assert_eq!(err.kind(), "forbidden");
        }

        assert!(
            f.service
                .list_context_projects(&f.teacher, "class-1", "", 10)
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_description_is_kept() {
        let f = fixture();
        let mut new = new_project(files(&[("index.html", b"1")]));
        new.description = Some("A page about volcanoes".to_string());

        let created = f
            .service
            .create_project(&f.student, new)
            .await
            .unwrap()
            .project;

        let stored = f.service.get_project(&f.teacher, &created.id).unwrap();
        assert_eq!(
            stored.description.as_deref(),
            Some("A page about volcanoes")
        );
    }

    #[tokio::test]
    async fn test_only_owner_may_write() {
        let f = fixture();
        let created = f
            .service
            .create_project(&f.student, new_project(files(&[("index.html", b"1")])))
            .await
            .unwrap()
            .project;

        let err = f
            .service
            .delete_project(&f.teacher, &created.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectError::Forbidden));

        let err = f
            .service
            .replace_files(&f.other, &created.id, files(&[("x.html", b"1")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectError::Forbidden));
    }

    #[tokio::test]
    async fn test_read_access() {
        let f = fixture();
        let created = f
            .service
            .create_project(&f.student, new_project(files(&[("index.html", b"hi")])))
            .await
            .unwrap()
            .project;

        assert_eq!(
            f.service
                .read_file(&f.teacher, &created.id, "index.html")
                .await
                .unwrap(),
            b"hi".to_vec()
        );
        assert!(matches!(
            f.service.read_file(&f.other, &created.id, "index.html").await,
            Err(ProjectError::Forbidden)
        ));
        assert_eq!(
            f.service
                .read_file(&f.student, &created.id, "../../etc/passwd")
                .await
                .unwrap_err()
                .kind(),
            "forbidden"
        );

        assert!(matches!(
            f.service.list_context_projects(&f.other, "class-1", "", 10),
            Err(ProjectError::Forbidden)
        ));
        let visible = f
            .service
            .list_context_projects(&f.teacher, "class-1", "", 10)
            .unwrap();
        assert_eq!(visible.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_project_removes_files() {
        let f = fixture();
        let created = f
            .service
            .create_project(&f.student, new_project(files(&[("index.html", b"1")])))
            .await
            .unwrap()
            .project;
        let root = f.storage.project_root(&created.storage_key).unwrap();
        assert!(root.exists());

        f.service
            .delete_project(&f.student, &created.id)
            .await
            .unwrap();

        assert!(!root.exists());
        assert!(matches!(
            f.service.get_project(&f.student, &created.id),
            Err(ProjectError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_remove_user_removes_trees() {
        let f = fixture();
        let created = f
            .service
            .create_project(&f.student, new_project(files(&[("index.html", b"1")])))
            .await
            .unwrap()
            .project;
        let root = f.storage.project_root(&created.storage_key).unwrap();

        assert!(f.service.remove_user(&f.student.id).await.unwrap());

        assert!(!root.exists());
        assert!(f.store.get_project(&created.id).unwrap().is_none());
        assert!(!f.service.remove_user(&f.student.id).await.unwrap());
    }
}
