use std::time::Duration;

use crate::backend::{Backend, StateHandle};
use crate::config::ConfigTree;
use crate::error::ImportError;
use crate::providers::ProviderSet;
use crate::settings::Settings;
use crate::state::StateSnapshot;

/// What a backend needs to hand out an execution context.
#[derive(Debug)]
pub struct OperationRequest {
    pub tree: ConfigTree,
    pub providers: ProviderSet,
    pub lock: bool,
    pub lock_timeout: Duration,
    pub parallelism: usize,
}

impl OperationRequest {
    pub fn new(tree: ConfigTree, providers: ProviderSet, settings: &Settings) -> Self {
        Self {
            tree,
            providers,
            lock: settings.lock,
            lock_timeout: settings.lock_timeout,
            parallelism: settings.parallelism,
        }
    }
}

/// Configuration, providers and the state snapshot read under lock, owned by
/// one import invocation.
#[derive(Debug)]
pub struct ExecutionContext {
    pub tree: ConfigTree,
    pub providers: ProviderSet,
    pub state: StateSnapshot,
    pub parallelism: usize,
}

impl ExecutionContext {
    pub fn new(request: OperationRequest, state: StateSnapshot) -> Self {
        Self {
            tree: request.tree,
            providers: request.providers,
            state,
            parallelism: request.parallelism,
        }
    }
}

/// Obtains a locally executed context from `backend`.
///
/// Lock contention, unreadable state and transport failures are returned as
/// [`ImportError::ContextAcquisitionFailed`] without retrying beyond the lock
/// timeout.
pub async fn build(
    backend: &dyn Backend,
    request: OperationRequest,
) -> Result<(ExecutionContext, Box<dyn StateHandle>), ImportError> {
    let local = backend
        .local()
        .ok_or_else(|| ImportError::UnsupportedBackend {
            backend: backend.name().to_string(),
        })?;

    tracing::debug!(backend = backend.name(), lock = request.lock, "acquiring execution context");
    local
        .context(request)
        .await
        .map_err(ImportError::ContextAcquisitionFailed)
}
