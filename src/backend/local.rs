use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{Backend, BackendError, LocalRun, LockInfo, StateHandle, StateStore};
use crate::context::{ExecutionContext, OperationRequest};
use crate::state::{StateError, StateSnapshot};

const IMPORT_OPERATION: &str = "OperationTypeImport";
const LOCK_RETRY_INITIAL: Duration = Duration::from_millis(100);
const LOCK_RETRY_MAX: Duration = Duration::from_secs(2);

/// Runs operations in-process against any [`StateStore`].
pub struct LocalBackend {
    name: String,
    store: Arc<dyn StateStore>,
}

impl LocalBackend {
    pub fn new(name: &str, store: Arc<dyn StateStore>) -> Self {
        Self {
            name: name.to_string(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    async fn read_state(&self) -> Result<StateSnapshot, BackendError> {
        match self.store.read().await? {
            Some(data) => Ok(StateSnapshot::from_json(&data)?),
            None => {
                tracing::debug!(store = %self.store.describe(), "no existing state, starting fresh");
                Ok(StateSnapshot::new())
            }
        }
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn local(&self) -> Option<&dyn LocalRun> {
        Some(self)
    }
}

#[async_trait]
impl LocalRun for LocalBackend {
    async fn context(
        &self,
        request: OperationRequest,
    ) -> Result<(ExecutionContext, Box<dyn StateHandle>), BackendError> {
        let lock_id = if request.lock {
            let info = LockInfo::new(IMPORT_OPERATION);
            Some(acquire_lock(self.store.as_ref(), &info, request.lock_timeout).await?)
        } else {
            None
        };

        let state = match self.read_state().await {
            Ok(state) => state,
            Err(e) => {
                if let Some(id) = &lock_id
                    && let Err(unlock_err) = self.store.unlock(id).await
                {
                    tracing::error!(error = %unlock_err, "failed to release state lock");
                }
                return Err(e);
            }
        };

        tracing::info!(
            store = %self.store.describe(),
            serial = state.serial,
            resources = state.resource_count(),
            "state loaded"
        );

        let handle = ManagedState {
            store: Arc::clone(&self.store),
            current: state.clone(),
            persisted: Some(state.clone()).filter(|s| s.serial > 0),
            unwritten: self.store.writes_elsewhere(),
            lock_id,
        };
        Ok((ExecutionContext::new(request, state), Box::new(handle)))
    }
}

/// Retries while another holder has the lock, backing off up to `timeout`.
async fn acquire_lock(
    store: &dyn StateStore,
    info: &LockInfo,
    timeout: Duration,
) -> Result<String, BackendError> {
    let deadline = Instant::now() + timeout;
    let mut delay = LOCK_RETRY_INITIAL;

    loop {
        match store.lock(info).await {
            Ok(id) => {
                tracing::debug!(lock_id = %id, store = %store.describe(), "state lock acquired");
                return Ok(id);
            }
            Err(BackendError::Locked { holder }) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(BackendError::LockTimeout { timeout, holder });
                }
                tracing::info!(retry_in = ?delay, "state is locked, retrying");
                tokio::time::sleep(delay.min(deadline - now)).await;
                delay = (delay * 2).min(LOCK_RETRY_MAX);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Handle over the state read by [`LocalBackend`]: stages snapshots, persists
/// them through the store and owns the lock.
pub struct ManagedState {
    store: Arc<dyn StateStore>,
    current: StateSnapshot,
    persisted: Option<StateSnapshot>,
    /// The output location hasn't received this state yet.
    unwritten: bool,
    lock_id: Option<String>,
}

impl ManagedState {
    pub fn lock_id(&self) -> Option<&str> {
        self.lock_id.as_deref()
    }
}

#[async_trait]
impl StateHandle for ManagedState {
    fn state(&self) -> &StateSnapshot {
        &self.current
    }

    async fn write_state(&mut self, state: StateSnapshot) -> Result<(), BackendError> {
        if !self.current.lineage.is_empty() && state.lineage != self.current.lineage {
            return Err(StateError::LineageMismatch {
                current: self.current.lineage.clone(),
                incoming: state.lineage,
            }
            .into());
        }
        if state.serial < self.current.serial {
            return Err(StateError::SerialRegression {
                current: self.current.serial,
                incoming: state.serial,
            }
            .into());
        }

        self.current = state;
        Ok(())
    }

    async fn persist_state(&mut self) -> Result<(), BackendError> {
        let mut next = self.current.clone();
        match &self.persisted {
            Some(prev) if prev.same_content(&next) => {
                if !self.unwritten {
                    tracing::debug!("state unchanged, nothing to persist");
                    return Ok(());
                }
            }
            Some(prev) => next.serial = next.serial.max(prev.serial) + 1,
            None => next.serial = next.serial.max(1),
        }

        let data = next.to_json()?;
        self.store.write(&data, self.lock_id.as_deref()).await?;
        tracing::info!(store = %self.store.describe(), serial = next.serial, "state persisted");

        self.current = next.clone();
        self.persisted = Some(next);
        self.unwritten = false;
        Ok(())
    }

    async fn unlock(&mut self) -> Result<(), BackendError> {
        let Some(id) = self.lock_id.take() else {
            return Ok(());
        };
        if let Err(e) = self.store.unlock(&id).await {
            self.lock_id = Some(id);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::ResourceAddress;
    use crate::backend::FileStateStore;
    use crate::config::ConfigTree;
    use crate::providers::ProviderSet;
    use crate::settings::Settings;
    use crate::state::{InstanceState, ResourceState};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn file_backend(dir: &TempDir) -> (LocalBackend, Arc<FileStateStore>) {
        let path = dir.path().join("terraform.tfstate");
        let store = Arc::new(FileStateStore::new(path.clone(), path, None));
        (LocalBackend::new("local", store.clone()), store)
    }

    fn request(lock: bool, timeout: Duration) -> OperationRequest {
        let settings = Settings {
            lock,
            lock_timeout: timeout,
            ..Settings::default()
        };
        OperationRequest::new(ConfigTree::empty(), ProviderSet::default(), &settings)
    }

    fn resource(id: &str) -> ResourceState {
        ResourceState {
            resource_type: "aws_instance".to_string(),
            depends_on: Vec::new(),
            primary: InstanceState {
                id: id.to_string(),
                attributes: BTreeMap::new(),
                meta: BTreeMap::new(),
                tainted: false,
            },
            deposed: Vec::new(),
            provider: "provider.aws".to_string(),
        }
    }

    #[tokio::test]
    async fn test_context_holds_lock_until_unlock() {
        let dir = TempDir::new().unwrap();
        let (backend, store) = file_backend(&dir);

        let (_ctx, mut handle) = backend
            .context(request(true, Duration::ZERO))
            .await
            .unwrap();
        assert!(store.lock_info_path().exists());

        handle.unlock().await.unwrap();
        assert!(!store.lock_info_path().exists());
    }

    #[tokio::test]
    async fn test_lock_timeout_when_held_elsewhere() {
        let dir = TempDir::new().unwrap();
        let (backend, store) = file_backend(&dir);
        store.lock(&LockInfo::new("OperationTypeApply")).await.unwrap();

        let started = Instant::now();
        let result = backend
            .context(request(true, Duration::from_millis(250)))
            .await;
        assert!(matches!(result, Err(BackendError::LockTimeout { .. })));
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_lock_acquired_once_released_within_timeout() {
        let dir = TempDir::new().unwrap();
        let (backend, store) = file_backend(&dir);
        let id = store.lock(&LockInfo::new("OperationTypeApply")).await.unwrap();

        let releaser = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                store.unlock(&id).await.unwrap();
            })
        };

        let result = backend.context(request(true, Duration::from_secs(5))).await;
        releaser.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_locking_disabled_ignores_existing_lock() {
        let dir = TempDir::new().unwrap();
        let (backend, store) = file_backend(&dir);
        store.lock(&LockInfo::new("OperationTypeApply")).await.unwrap();

        let (_ctx, handle) = backend
            .context(request(false, Duration::ZERO))
            .await
            .unwrap();
        assert!(!handle.state().lineage.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_state_releases_lock() {
        let dir = TempDir::new().unwrap();
        let (backend, store) = file_backend(&dir);
        std::fs::write(store.path(), b"{ corrupt").unwrap();

        let result = backend.context(request(true, Duration::ZERO)).await;
        assert!(matches!(
            result,
            Err(BackendError::State(StateError::Decode(_)))
        ));
        assert!(!store.lock_info_path().exists());
    }

    #[tokio::test]
    async fn test_persist_bumps_serial_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let (backend, store) = file_backend(&dir);

        let (ctx, mut handle) = backend
            .context(request(true, Duration::ZERO))
            .await
            .unwrap();
        let addr = ResourceAddress::managed("aws_instance", "foo");
        let next = ctx.state.with_resource(&addr, resource("i-123"));

        handle.write_state(next).await.unwrap();
        handle.persist_state().await.unwrap();
        assert_eq!(handle.state().serial, 1);
        handle.unlock().await.unwrap();

        let reread = StateSnapshot::from_json(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(&reread, handle.state());

        let (ctx, mut handle) = backend
            .context(request(true, Duration::ZERO))
            .await
            .unwrap();
        let next = ctx.state.with_resource(&addr, resource("i-456"));
        handle.write_state(next).await.unwrap();
        handle.persist_state().await.unwrap();
        assert_eq!(handle.state().serial, 2);
        handle.unlock().await.unwrap();
    }

    #[tokio::test]
    async fn test_persist_unchanged_state_is_noop() {
        let dir = TempDir::new().unwrap();
        let (backend, store) = file_backend(&dir);

        let (ctx, mut handle) = backend.context(request(false, Duration::ZERO)).await.unwrap();
        let addr = ResourceAddress::managed("aws_instance", "foo");
        handle
            .write_state(ctx.state.with_resource(&addr, resource("i-1")))
            .await
            .unwrap();
        handle.persist_state().await.unwrap();
        let written = std::fs::metadata(store.path()).unwrap().modified().unwrap();

        handle.persist_state().await.unwrap();
        assert_eq!(handle.state().serial, 1);
        assert_eq!(
            std::fs::metadata(store.path()).unwrap().modified().unwrap(),
            written
        );
    }

    #[tokio::test]
    async fn test_unchanged_state_still_written_to_separate_output() {
        let dir = TempDir::new().unwrap();
        let (backend, store) = file_backend(&dir);
        let addr = ResourceAddress::managed("aws_instance", "foo");

        let (ctx, mut handle) = backend.context(request(false, Duration::ZERO)).await.unwrap();
        handle
            .write_state(ctx.state.with_resource(&addr, resource("i-1")))
            .await
            .unwrap();
        handle.persist_state().await.unwrap();

        let output = dir.path().join("out.tfstate");
        let redirected = LocalBackend::new(
            "local",
            Arc::new(FileStateStore::new(store.path().to_path_buf(), output.clone(), None)),
        );
        let (ctx, mut handle) = redirected
            .context(request(false, Duration::ZERO))
            .await
            .unwrap();
        handle
            .write_state(ctx.state.with_resource(&addr, resource("i-1")))
            .await
            .unwrap();
        handle.persist_state().await.unwrap();

        let written = StateSnapshot::from_json(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!(written.serial, 1);
        assert!(written.same_content(&ctx.state));

        let modified = std::fs::metadata(&output).unwrap().modified().unwrap();
        handle.persist_state().await.unwrap();
        assert_eq!(std::fs::metadata(&output).unwrap().modified().unwrap(), modified);
    }

    #[tokio::test]
    async fn test_write_state_rejects_foreign_lineage() {
        let dir = TempDir::new().unwrap();
        let (backend, _store) = file_backend(&dir);

        let (_ctx, mut handle) = backend.context(request(false, Duration::ZERO)).await.unwrap();
        let foreign = StateSnapshot::new();
        assert!(matches!(
            handle.write_state(foreign).await,
            Err(BackendError::State(StateError::LineageMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_write_state_rejects_lower_serial() {
        let dir = TempDir::new().unwrap();
        let (backend, _store) = file_backend(&dir);

        let (ctx, mut handle) = backend.context(request(false, Duration::ZERO)).await.unwrap();
        let mut ahead = ctx.state.clone();
        ahead.serial = 5;
        handle.write_state(ahead).await.unwrap();

        let behind = ctx.state.clone();
        assert!(matches!(
            handle.write_state(behind).await,
            Err(BackendError::State(StateError::SerialRegression { .. }))
        ));
    }
}
