use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::providers::ProviderError;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(
        "invalid resource address {input:?}: {reason}\n\n\
         For information on valid syntax, see:\n\
         https://www.terraform.io/docs/internals/resource-addressing.html"
    )]
    InvalidAddressSyntax { input: String, reason: String },

    #[error(
        "resource address {input:?} must include a full resource spec (TYPE.NAME)\n\n\
         For information on valid syntax, see:\n\
         https://www.terraform.io/docs/internals/resource-addressing.html"
    )]
    MissingResourceSpec { input: String },

    #[error(
        "resource address {input:?} must refer to a managed resource\n\n\
         Data resources are read-only and cannot be imported."
    )]
    UnsupportedResourceMode { input: String },

    #[error("failed to load root config module from {}: {source}", .path.display())]
    ConfigLoad {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    #[error(
        "no configuration files in this directory\n\n\
         Import can only be run in a Terraform configuration directory.\n\
         Create one or more .tf.json files here to import into."
    )]
    NoConfiguration,

    #[error(
        "{module_path} does not exist in the configuration\n\n\
         Add the configuration for the module before importing resources into it."
    )]
    ModuleNotFound { module_path: String },

    #[error(
        "resource address {address:?} does not exist in the configuration\n\n\
         Before importing this resource, create its configuration in {module_path}. For example:\n\n\
         resource {resource_type:?} {name:?} {{\n  # (resource arguments)\n}}"
    )]
    ResourceNotDeclared {
        address: String,
        module_path: String,
        resource_type: String,
        name: String,
    },

    #[error("failed to load backend: {0}")]
    BackendInit(#[source] BackendError),

    #[error(
        "backend {backend:?} does not support local operations\n\n\
         Import always runs locally; configure a backend that can execute locally."
    )]
    UnsupportedBackend { backend: String },

    #[error("error acquiring execution context: {0}")]
    ContextAcquisitionFailed(#[source] BackendError),

    #[error("error importing {address}: {source}")]
    ImportExecutionError {
        address: String,
        #[source]
        source: ProviderError,
    },

    #[error("error writing state: {0}")]
    StateWriteError(#[source] BackendError),

    #[error("error persisting state: {0}")]
    StatePersistError(#[source] BackendError),
}

impl ImportError {
    /// True for errors caused by what the user typed or declared, as opposed to
    /// lock contention, network or storage failures.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ImportError::InvalidAddressSyntax { .. }
                | ImportError::MissingResourceSpec { .. }
                | ImportError::UnsupportedResourceMode { .. }
                | ImportError::NoConfiguration
                | ImportError::ModuleNotFound { .. }
                | ImportError::ResourceNotDeclared { .. }
        )
    }
}
