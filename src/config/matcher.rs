use super::{ConfigTree, ResourceDecl};
use crate::address::ResourceAddress;
use crate::error::ImportError;

/// Finds the declaration `addr` would be imported into.
///
/// Importing into an undeclared address would create state the next plan
/// proposes to destroy, so a missing module or declaration is an error.
pub fn match_resource<'a>(
    tree: &'a ConfigTree,
    addr: &ResourceAddress,
) -> Result<&'a ResourceDecl, ImportError> {
    if tree.is_empty() {
        return Err(ImportError::NoConfiguration);
    }

    let module = tree
        .child(&addr.module_path)
        .ok_or_else(|| ImportError::ModuleNotFound {
            module_path: addr.module_path.to_string(),
        })?;

    let decl = module
        .resources
        .iter()
        .find(|decl| decl.matches(addr))
        .ok_or_else(|| ImportError::ResourceNotDeclared {
            address: addr.to_string(),
            module_path: addr.module_path.describe(),
            resource_type: addr.resource_type.clone(),
            name: addr.name.clone(),
        })?;

    tracing::debug!(address = %addr, module = %module.path.describe(), "matched resource declaration");
    Ok(decl)
}
