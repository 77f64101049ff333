use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{BackendError, LockInfo, StateStore};

/// State kept in a local file, locked by exclusively creating a sibling
/// `.<name>.lock.info` file.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    out_path: PathBuf,
    backup_path: Option<PathBuf>,
    backed_up: AtomicBool,
}

impl FileStateStore {
    pub fn new(path: PathBuf, out_path: PathBuf, backup_path: Option<PathBuf>) -> Self {
        Self {
            path,
            out_path,
            backup_path,
            backed_up: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    pub fn backup_path(&self) -> Option<&Path> {
        self.backup_path.as_deref()
    }

    pub fn lock_info_path(&self) -> PathBuf {
        sibling(&self.path, ".", ".lock.info")
    }

    /// Copies the state that was read, once per store.
    async fn backup(&self) -> Result<(), BackendError> {
        let Some(backup_path) = &self.backup_path else {
            return Ok(());
        };
        if self.backed_up.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let prior = match fs::read(&self.path).await {
            Ok(prior) => prior,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(BackendError::io(&self.path, e)),
        };

        tracing::info!(path = %backup_path.display(), "backing up prior state");
        write_atomic(backup_path, &prior).await
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn writes_elsewhere(&self) -> bool {
        self.path != self.out_path
    }

    async fn read(&self) -> Result<Option<Vec<u8>>, BackendError> {
        match fs::read(&self.path).await {
            Ok(data) if data.iter().all(u8::is_ascii_whitespace) => Ok(None),
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::io(&self.path, e)),
        }
    }

    async fn write(&self, data: &[u8], _lock_id: Option<&str>) -> Result<(), BackendError> {
        self.backup().await?;
        write_atomic(&self.out_path, data).await?;
        tracing::debug!(path = %self.out_path.display(), bytes = data.len(), "state written");
        Ok(())
    }

    async fn lock(&self, info: &LockInfo) -> Result<String, BackendError> {
        let lock_path = self.lock_info_path();
        if let Some(parent) = non_empty_parent(&lock_path) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::io(parent, e))?;
        }

        let mut info = info.clone();
        info.path = self.path.display().to_string();
        let body = serde_json::to_vec(&info)
            .map_err(|e| BackendError::Config(format!("failed to encode lock info: {}", e)))?;

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .await;
        let mut file = match file {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(BackendError::Locked {
                    holder: self.read_holder(&lock_path).await,
                });
            }
            Err(e) => return Err(BackendError::io(&lock_path, e)),
        };

        let written = match file.write_all(&body).await {
            Ok(()) => file.sync_all().await,
            Err(e) => Err(e),
        };
        drop(file);
        discard_on_error(&lock_path, written).await?;

        tracing::debug!(lock_id = %info.id, path = %lock_path.display(), "state locked");
        Ok(info.id)
    }

    async fn unlock(&self, lock_id: &str) -> Result<(), BackendError> {
        let lock_path = self.lock_info_path();
        let data = match fs::read(&lock_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(BackendError::io(&lock_path, e)),
        };

        let held: Option<LockInfo> = serde_json::from_slice(&data).ok();
        if let Some(held) = held
            && held.id != lock_id
        {
            return Err(BackendError::LockIdMismatch {
                expected: held.id,
                found: lock_id.to_string(),
            });
        }

        fs::remove_file(&lock_path)
            .await
            .map_err(|e| BackendError::io(&lock_path, e))?;
        tracing::debug!(lock_id, "state unlocked");
        Ok(())
    }
}

impl FileStateStore {
    async fn read_holder(&self, lock_path: &Path) -> String {
        match fs::read(lock_path).await {
            Ok(data) => match serde_json::from_slice::<LockInfo>(&data) {
                Ok(info) => info.to_string(),
                Err(_) => format!("  (unreadable lock info in {})", lock_path.display()),
            },
            Err(_) => format!("  (lock file {})", lock_path.display()),
        }
    }
}

/// Writes to a temp file next to `path`, syncs, then renames over `path`, so a
/// reader sees either the old or the new content.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), BackendError> {
    if let Some(parent) = non_empty_parent(path) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| BackendError::io(parent, e))?;
    }

    let tmp = sibling(path, ".", &format!(".tmp-{}", uuid::Uuid::new_v4().simple()));
    let result = async {
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| BackendError::io(&tmp, e))?;
        file.write_all(data)
            .await
            .map_err(|e| BackendError::io(&tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| BackendError::io(&tmp, e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| BackendError::io(path, e))
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    result
}

/// Removes a half-written lock file so a failed attempt doesn't leave the
/// state locked.
async fn discard_on_error(
    lock_path: &Path,
    written: std::io::Result<()>,
) -> Result<(), BackendError> {
    let Err(e) = written else {
        return Ok(());
    };
    if let Err(remove_err) = fs::remove_file(lock_path).await {
        tracing::warn!(
            path = %lock_path.display(),
            error = %remove_err,
            "failed to remove lock file"
        );
    }
    Err(BackendError::io(lock_path, e))
}

fn sibling(path: &Path, prefix: &str, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "terraform.tfstate".to_string());
    path.with_file_name(format!("{}{}{}", prefix, name, suffix))
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}
