//! The import command from start to finish: resolve the address, check it
//! against the configuration, build a locked context, import and commit.

use crate::address::{self, ResourceAddress};
use crate::backend::{self, Backend, StateHandle};
use crate::config::{self, ConfigTree};
use crate::context::{self, ExecutionContext, OperationRequest};
use crate::error::ImportError;
use crate::import::{ImportOutcome, ImportTarget};
use crate::providers::ProviderSet;
use crate::settings::Settings;

pub async fn run(settings: &Settings, address: &str, id: &str) -> Result<ImportOutcome, ImportError> {
    let address = address::resolve(address)?;

    let tree = config::load_module_tree(&settings.config_dir).map_err(|source| {
        ImportError::ConfigLoad {
            path: settings.config_dir.clone(),
            source,
        }
    })?;
    let target = prepare_target(&tree, address, id, settings.provider.as_deref())?;

    let backend = backend::get_backend(tree.backend_config(), settings)
        .map_err(ImportError::BackendInit)?;
    let providers = ProviderSet::from_config(&tree);
    tracing::debug!(backend = backend.name(), providers = ?providers, "collaborators ready");

    let request = OperationRequest::new(tree, providers, settings);
    execute(backend.as_ref(), request, target).await
}

/// Refuses addresses with no matching declaration, so import never creates
/// state that the configuration does not know about.
pub fn prepare_target(
    tree: &ConfigTree,
    address: ResourceAddress,
    id: &str,
    provider: Option<&str>,
) -> Result<ImportTarget, ImportError> {
    let decl = config::match_resource(tree, &address)?;
    tracing::debug!(address = %address, declaration = %decl.key(), "address matches configuration");

    let target = ImportTarget::new(address, id);
    Ok(match provider {
        Some(provider) => target.with_provider(provider),
        None => target,
    })
}

/// Builds the context on `backend`, imports `target` and commits the result.
/// The state lock is released afterwards whether or not that succeeded.
pub async fn execute(
    backend: &dyn Backend,
    request: OperationRequest,
    target: ImportTarget,
) -> Result<ImportOutcome, ImportError> {
    let (ctx, mut handle) = context::build(backend, request).await?;

    let result = import_and_commit(&ctx, handle.as_mut(), &[target]).await;

    if let Err(e) = handle.unlock().await {
        tracing::error!(
            error = %e,
            "failed to unlock state; it may need to be unlocked manually"
        );
    }
    result
}

async fn import_and_commit(
    ctx: &ExecutionContext,
    handle: &mut dyn StateHandle,
    targets: &[ImportTarget],
) -> Result<ImportOutcome, ImportError> {
    let outcome = ctx.import(targets).await?;
    crate::commit::commit(handle, outcome.state.clone()).await?;

    Ok(ImportOutcome {
        state: handle.state().clone(),
        imported: outcome.imported,
    })
}
