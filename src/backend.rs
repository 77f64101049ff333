//! State backends.
//!
//! A [`Backend`] names where state lives. Import only runs through the local
//! execution capability ([`Backend::local`]); storage itself is a [`StateStore`]
//! (a local file or an HTTP endpoint) wrapped by [`LocalBackend`].

pub mod file;
pub mod http;
pub mod local;
pub mod remote;

pub use file::FileStateStore;
pub use http::HttpStateStore;
pub use local::{LocalBackend, ManagedState};
pub use remote::RemoteBackend;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::BackendConfig;
use crate::context::{ExecutionContext, OperationRequest};
use crate::settings::Settings;
use crate::state::{StateError, StateSnapshot};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unknown backend type: {0}")]
    UnknownBackend(String),

    #[error("backend configuration error: {0}")]
    Config(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("state is locked by another process\n{holder}")]
    Locked { holder: String },

    #[error("timed out after {timeout:?} waiting for the state lock, held by:\n{holder}")]
    LockTimeout { timeout: Duration, holder: String },

    #[error("lock ID {found:?} does not match held lock {expected:?}")]
    LockIdMismatch { expected: String, found: String },

    #[error(transparent)]
    State(#[from] StateError),
}

impl BackendError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        BackendError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Lock metadata, serialized with the same keys Terraform writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Operation")]
    pub operation: String,
    #[serde(rename = "Info", default)]
    pub info: String,
    #[serde(rename = "Who")]
    pub who: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Created")]
    pub created: DateTime<Utc>,
    #[serde(rename = "Path", default)]
    pub path: String,
}

impl LockInfo {
    pub fn new(operation: &str) -> Self {
        let host = whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: operation.to_string(),
            info: String::new(),
            who: format!("{}@{}", whoami::username(), host),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created: Utc::now(),
            path: String::new(),
        }
    }
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  ID:        {}", self.id)?;
        writeln!(f, "  Path:      {}", self.path)?;
        writeln!(f, "  Operation: {}", self.operation)?;
        writeln!(f, "  Who:       {}", self.who)?;
        writeln!(f, "  Version:   {}", self.version)?;
        write!(f, "  Created:   {}", self.created.to_rfc3339())
    }
}

/// Raw storage for a single state document.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Where the state lives, for log lines.
    fn describe(&self) -> String;

    /// True when writes land somewhere other than where state is read from,
    /// so even unchanged state has to be written once.
    fn writes_elsewhere(&self) -> bool {
        false
    }

    /// Current state bytes, or `None` if no state has been written yet.
    async fn read(&self) -> Result<Option<Vec<u8>>, BackendError>;

    /// Replaces the stored state. `lock_id` is the held lock, if any.
    async fn write(&self, data: &[u8], lock_id: Option<&str>) -> Result<(), BackendError>;

    /// Takes the lock, returning its ID. Fails with [`BackendError::Locked`]
    /// when another holder has it.
    async fn lock(&self, info: &LockInfo) -> Result<String, BackendError>;

    async fn unlock(&self, lock_id: &str) -> Result<(), BackendError>;
}

pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// The local execution capability, if this backend has one.
    fn local(&self) -> Option<&dyn LocalRun> {
        None
    }
}

#[async_trait]
pub trait LocalRun: Send + Sync {
    /// Locks and reads state, returning a context over it and the handle that
    /// owns the lock until [`StateHandle::unlock`].
    async fn context(
        &self,
        request: OperationRequest,
    ) -> Result<(ExecutionContext, Box<dyn StateHandle>), BackendError>;
}

#[async_trait]
pub trait StateHandle: Send {
    /// The snapshot most recently read or staged.
    fn state(&self) -> &StateSnapshot;

    /// Stages `state` in memory as the new current snapshot.
    async fn write_state(&mut self, state: StateSnapshot) -> Result<(), BackendError>;

    /// Writes the staged snapshot to storage.
    async fn persist_state(&mut self) -> Result<(), BackendError>;

    /// Releases the lock taken when the context was built. No-op when unlocked.
    async fn unlock(&mut self) -> Result<(), BackendError>;
}

/// Builds the backend described by the root module's `terraform.backend` block.
pub fn get_backend(
    config: Option<&BackendConfig>,
    settings: &Settings,
) -> Result<Box<dyn Backend>, BackendError> {
    let kind = config.map(|c| c.kind.as_str()).unwrap_or("local");
    match kind {
        "local" => {
            let configured = config
                .and_then(|c| c.settings.get("path"))
                .and_then(|v| v.as_str())
                .map(Path::new);
            let store = FileStateStore::new(
                settings.state_path_or(configured),
                settings.state_out_path_or(configured),
                settings.backup_path_or(configured),
            );
            Ok(Box::new(LocalBackend::new("local", Arc::new(store))))
        }
        "http" => {
            let settings = config.map(|c| c.settings.clone()).unwrap_or_default();
            let store = HttpStateStore::from_config(&settings)?;
            Ok(Box::new(LocalBackend::new("http", Arc::new(store))))
        }
        "remote" => {
            let settings = config.map(|c| c.settings.clone()).unwrap_or_default();
            Ok(Box::new(RemoteBackend::from_config(&settings)?))
        }
        other => Err(BackendError::UnknownBackend(other.to_string())),
    }
}
