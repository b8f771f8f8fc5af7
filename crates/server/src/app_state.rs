use std::{collections::HashMap, path::PathBuf, sync::Arc};

use chrono::{Duration, Utc};
use session::Session;
use shared::domain::SessionId;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

pub(crate) type SessionHandle = Arc<Mutex<Session>>;

pub(crate) struct AppState {
    pub(crate) sessions: SessionRegistry,
    pub(crate) max_upload_bytes: usize,
}

/// Live sessions keyed by the id stored in the browser cookie. Each session
/// sits behind its own mutex, which serializes evaluation for that session.
pub(crate) struct SessionRegistry {
    upload_root: PathBuf,
    idle_ttl: Duration,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub(crate) fn new(upload_root: PathBuf, idle_ttl: Duration) -> Self {
        Self {
            upload_root,
            idle_ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) async fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Returns the session for `id`, or a fresh one when the id is missing or
    /// unknown. The flag is true when a session was created.
    pub(crate) async fn resolve(
        &self,
        id: Option<SessionId>,
    ) -> anyhow::Result<(SessionId, SessionHandle, bool)> {
        if let Some(id) = id {
            if let Some(handle) = self.get(id).await {
                return Ok((id, handle, false));
            }
        }
        let (id, handle) = self.create().await?;
        Ok((id, handle, true))
    }

    pub(crate) async fn create(&self) -> anyhow::Result<(SessionId, SessionHandle)> {
        self.reap_idle().await;

        let id = SessionId::new_v4();
        let session = Session::new(id, &self.upload_root)?;
        let handle = Arc::new(Mutex::new(session));
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, handle.clone());
        info!(session = %id, active = sessions.len(), "session started");
        Ok((id, handle))
    }

    /// Drops sessions idle longer than the configured ttl. Sessions that are
    /// busy right now are kept.
    pub(crate) async fn reap_idle(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, handle| match handle.try_lock() {
            Ok(session) => {
                let keep = session.idle_for(now) <= self.idle_ttl;
                if !keep {
                    info!(session = %id, "session expired");
                }
                keep
            }
            Err(_) => true,
        });
        before - sessions.len()
    }
}

#[cfg(test)]
#[path = "tests/app_state_tests.rs"]
mod tests;
