//! tfimport - Terraform state import
//!
//! Imports an existing remote object into Terraform state: the target address is
//! resolved and checked against the configuration, a locked execution context is
//! obtained from the backend, the provider reads the remote object and the result
//! is merged into state and persisted.

pub mod address;
pub mod backend;
pub mod commit;
pub mod config;
pub mod context;
pub mod error;
pub mod import;
pub mod output;
pub mod providers;
pub mod settings;
pub mod state;
pub mod workflow;

pub use address::{ModulePath, ResourceAddress, ResourceMode};
pub use backend::{Backend, BackendError, LocalRun, StateHandle, StateStore};
pub use config::{ConfigTree, Count, Module, ResourceDecl};
pub use context::{ExecutionContext, OperationRequest};
pub use error::ImportError;
pub use import::{ImportOutcome, ImportTarget, ImportedInstance};
pub use providers::cloudflare::{CloudflareClient, CloudflareError};
pub use providers::{Provider, ProviderError, ProviderSet, RawInstanceState};
pub use settings::{BackupPolicy, Settings};
pub use state::{StateError, StateSnapshot};
