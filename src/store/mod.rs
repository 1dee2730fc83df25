//! Mirror of the active upload session for observers outside the controller.
//!
//! The mirror is advisory. It is written while a session is active and cleared
//! on every terminal transition; nothing resumes from it after a restart.

use std::{future::Future, pin::Pin, sync::Mutex};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::db::Database;
use crate::session::UploadSession;

pub const SESSION_KEY: &str = "photodrop.upload-session";

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

pub trait SessionStore: Send + Sync {
    fn save(&self, session: UploadSession) -> StoreFuture<'_, ()>;

    fn load(&self) -> StoreFuture<'_, Option<UploadSession>>;

    fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Keeps the mirror in the `kv_store` table of the application database.
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: Database,
}

impl SqliteSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl SessionStore for SqliteSessionStore {
    fn save(&self, session: UploadSession) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let value =
                serde_json::to_string(&session).context("failed to serialise upload session")?;
            self.db.kv_put(SESSION_KEY, value, Utc::now()).await
        })
    }

    fn load(&self) -> StoreFuture<'_, Option<UploadSession>> {
        Box::pin(async move {
            let Some(value) = self.db.kv_get(SESSION_KEY).await? else {
                return Ok(None);
            };
            let session = serde_json::from_str(&value)
                .context("stored upload session is not valid JSON")?;
            Ok(Some(session))
        })
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.db.kv_delete(SESSION_KEY).await?;
            Ok(())
        })
    }
}

/// In-process mirror for hosts without a database.
#[derive(Default)]
pub struct MemorySessionStore {
    value: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.value.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, session: UploadSession) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let value =
                serde_json::to_string(&session).context("failed to serialise upload session")?;
            *self.slot() = Some(value);
            Ok(())
        })
    }

    fn load(&self) -> StoreFuture<'_, Option<UploadSession>> {
        Box::pin(async move {
            let value = self.slot().clone();
            value
                .map(|value| serde_json::from_str(&value).context("stored upload session is not valid JSON"))
                .transpose()
        })
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.slot().take();
            Ok(())
        })
    }
}
