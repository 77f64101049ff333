use crate::backend::StateHandle;
use crate::error::ImportError;
use crate::state::StateSnapshot;

/// Stages `state` on the handle and persists it. Success means both steps
/// returned without error; the lock is left for the caller to release.
pub async fn commit(handle: &mut dyn StateHandle, state: StateSnapshot) -> Result<(), ImportError> {
    handle
        .write_state(state)
        .await
        .map_err(ImportError::StateWriteError)?;
    handle
        .persist_state()
        .await
        .map_err(ImportError::StatePersistError)?;

    tracing::debug!(serial = handle.state().serial, "state committed");
    Ok(())
}
