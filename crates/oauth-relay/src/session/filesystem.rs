//! Server-side sessions stored as files.
//!
//! Each session is a JSON file named `session_<id>` under the store root.
//! The browser only holds the encrypted id. Files are written to a
//! temporary name and renamed into place so readers never see a partial
//! write.

use std::path::{Path, PathBuf};

use ::cookie::Key;
use async_trait::async_trait;

use super::{
    Session, SessionOptions, SessionStore, StoredRecord, generate_session_id,
    is_valid_session_id, read_private_cookie, removal_cookie, sealed_cookie,
};
use crate::AuthResult;
use crate::error::AuthError;
use crate::request::{AuthRequest, AuthResponse};

const FILE_PREFIX: &str = "session_";

/// Session store writing one file per session.
pub struct FilesystemStore {
    root: PathBuf,
    key: Key,
    options: SessionOptions,
}

impl FilesystemStore {
    /// Creates a store under `root`. An empty path means the system
    /// temporary directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, secret: &[u8]) -> Self {
        let root = root.into();
        let root = if root.as_os_str().is_empty() {
            std::env::temp_dir()
        } else {
            root
        };

        Self {
            root,
            key: super::derive_key(secret),
            options: SessionOptions::default(),
        }
    }

    /// Sets the cookie attributes for new sessions.
    #[must_use]
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Directory holding the session files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{FILE_PREFIX}{id}"))
    }

    async fn load(&self, id: &str) -> AuthResult<Option<StoredRecord>> {
        let path = self.file_path(id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AuthError::store(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let record: StoredRecord = match serde_json::from_slice(&data) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
                return Ok(None);
            }
        };

        if record.is_expired() {
            self.remove(id).await?;
            return Ok(None);
        }

        Ok(Some(record))
    }

    async fn write(&self, id: &str, record: &StoredRecord) -> AuthResult<()> {
        let data = serde_json::to_vec(record)
            .map_err(|e| AuthError::store(format!("failed to serialize session: {e}")))?;

        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            AuthError::store(format!("failed to create {}: {e}", self.root.display()))
        })?;

        let path = self.file_path(id);
        // Concurrent saves of one session each get their own temp file.
        let tmp = self
            .root
            .join(format!(".{FILE_PREFIX}{id}.{:016x}.tmp", rand::random::<u64>()));
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| AuthError::store(format!("failed to write {}: {e}", tmp.display())))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AuthError::store(format!(
                "failed to write {}: {e}",
                path.display()
            )));
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> AuthResult<()> {
        let path = self.file_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::store(format!(
                "failed to delete {}: {e}",
                path.display()
            ))),
        }
    }
}

#[async_trait]
impl SessionStore for FilesystemStore {
    fn options(&self) -> &SessionOptions {
        &self.options
    }

    async fn get(&self, req: &AuthRequest, name: &str) -> AuthResult<Option<Session>> {
        let Some(id) = read_private_cookie(req.headers(), name, &self.key) else {
            return Ok(None);
        };
        if !is_valid_session_id(&id) {
            tracing::debug!(session = name, "Ignoring malformed session id");
            return Ok(None);
        }

        Ok(self.load(&id).await?.map(|record| {
            Session::restored(name, Some(id), record.values, self.options.clone())
        }))
    }

    async fn save(
        &self,
        _req: &AuthRequest,
        resp: &mut AuthResponse,
        session: &mut Session,
    ) -> AuthResult<()> {
        if session.is_invalidated() {
            if let Some(id) = session.id() {
                self.remove(id).await?;
            }
            resp.set_cookie(removal_cookie(session.name(), session.options()));
            return Ok(());
        }

        let id = match session.id() {
            Some(id) => id.to_string(),
            None => {
                let id = generate_session_id();
                session.set_id(id.clone());
                id
            }
        };

        self.write(&id, &StoredRecord::from_session(session)?).await?;
        let cookie = sealed_cookie(session.name(), id, session.options(), &self.key)?;
        resp.set_cookie(cookie);
        Ok(())
    }
}
