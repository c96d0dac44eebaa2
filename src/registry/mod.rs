//! Session registry: the record of which workers are running.
//!
//! A session's presence is what `stop` and status reporting treat as
//! "running". It can lag reality when teardown fails, and a spawn that
//! fails after launching can leave a worker with no session.

pub mod lock;
pub mod store;

use tracing::{debug, info};

use crate::models::session::{Session, Sessions};
use crate::workspace::Workspace;
use crate::{AppError, Result};

pub use store::{JsonFileStore, MemoryStore, SessionStore};

/// Registry façade over a [`SessionStore`] backend.
#[derive(Debug, Clone)]
pub struct SessionRegistry<S: SessionStore = JsonFileStore> {
    store: S,
}

impl SessionRegistry<JsonFileStore> {
    /// Registry stored in `<workspace>/.yak-boxes/sessions.json`.
    #[must_use]
    pub fn for_workspace(workspace: &Workspace) -> Self {
        Self::new(JsonFileStore::new(workspace.sessions_path()))
    }
}

impl<S: SessionStore> SessionRegistry<S> {
    /// Registry over an explicit backend.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying backend.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read every session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` if the backing data is malformed.
    pub fn load(&self) -> Result<Sessions> {
        self.store.load()
    }

    /// Replace every session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` if the data cannot be written.
    pub fn save(&self, sessions: &Sessions) -> Result<()> {
        self.store.save(sessions)
    }

    /// Insert or overwrite the session stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` on lock, read, or write failure.
    pub fn register(&self, id: &str, session: Session) -> Result<()> {
        let mut pending = Some(session);
        self.store.update(&mut |sessions| {
            if let Some(session) = pending.take() {
                sessions.insert(id.to_owned(), session);
            }
            Ok(())
        })?;
        info!(session_id = id, "session registered");
        Ok(())
    }

    /// Remove the session stored under `id`; an absent id is not an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` on lock, read, or write failure.
    pub fn unregister(&self, id: &str) -> Result<()> {
        self.store.update(&mut |sessions| {
            if sessions.remove(id).is_none() {
                debug!(session_id = id, "unregister: no such session");
            }
            Ok(())
        })?;
        info!(session_id = id, "session unregistered");
        Ok(())
    }

    /// Session stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no such session exists.
    pub fn get(&self, id: &str) -> Result<Session> {
        self.load()?
            .remove(id)
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))
    }

    /// Session whose container name equals `container`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no session uses that container.
    pub fn get_by_container(&self, container: &str) -> Result<Session> {
        self.load()?
            .into_values()
            .find(|s| s.container.as_deref() == Some(container))
            .ok_or_else(|| AppError::NotFound(format!("no session for container {container}")))
    }

    /// Every session, keyed by id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` if the backing data is malformed.
    pub fn list(&self) -> Result<Sessions> {
        self.load()
    }
}
