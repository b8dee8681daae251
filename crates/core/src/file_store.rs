use crate::report::Report;
use crate::session::{InterviewConfig, Session, Turn, is_valid_session_id};
use crate::store::{HistoryStore, StoreError, attach_report, fill_answer};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Stores each session as a JSON document `<dir>/<session_id>.json`.
///
/// Writes go to a temporary file that is renamed over the document, so a
/// reader sees either the old or the new version. Read-modify-write cycles
/// are serialized by an in-process lock.
pub struct FileHistoryStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FileHistoryStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            StoreError::Unavailable(format!("cannot create {}: {e}", dir.display()))
        })?;
        tracing::info!("Using file history store at {}", dir.display());
        Ok(Self {
            dir,
            lock: RwLock::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_session_id(id) {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    async fn read(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let path = self.document_path(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Unavailable(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                id: id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn write(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.document_path(&session.id)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(session).map_err(|e| StoreError::Corrupt {
            id: session.id.clone(),
            reason: e.to_string(),
        })?;
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::Unavailable(format!("cannot write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Unavailable(format!("cannot replace {}: {e}", path.display())))
    }

    async fn modify<F>(&self, id: &str, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Session) -> Result<(), StoreError> + Send,
    {
        let _guard = self.lock.write().await;
        let mut session = self
            .read(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        change(&mut session)?;
        self.write(&session).await
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn create_session(
        &self,
        id: &str,
        role: &str,
        user_id: &str,
        config: &InterviewConfig,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.write().await;
        if self.read(id).await?.is_some() {
            return Err(StoreError::AlreadyExists(id.to_string()));
        }
        self.write(&Session::new(id, role, user_id, config)).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let _guard = self.lock.read().await;
        self.read(id).await
    }

    async fn get_history(&self, id: &str) -> Result<Vec<Turn>, StoreError> {
        let _guard = self.lock.read().await;
        Ok(self
            .read(id)
            .await?
            .map(|session| session.history)
            .unwrap_or_default())
    }

    async fn append_turn(&self, id: &str, question: &str, answer: &str) -> Result<(), StoreError> {
        self.modify(id, |session| {
            session.history.push(Turn::new(question, answer));
            Ok(())
        })
        .await
    }

    async fn update_last_turn_answer(
        &self,
        id: &str,
        question: &str,
        answer: &str,
    ) -> Result<(), StoreError> {
        self.modify(id, |session| fill_answer(session, question, answer))
            .await
    }

    async fn save_report(&self, id: &str, report: &Report) -> Result<(), StoreError> {
        self.modify(id, |session| attach_report(session, report))
            .await
    }
}
