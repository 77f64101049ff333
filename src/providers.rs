pub mod cloudflare;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::ConfigTree;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider {0:?} is not configured")]
    NotConfigured(String),
    #[error("provider {provider} does not support importing {resource_type}")]
    UnsupportedResourceType {
        provider: String,
        resource_type: String,
    },
    #[error("invalid import ID {id:?} for {resource_type}: expected {expected}")]
    InvalidImportId {
        resource_type: String,
        id: String,
        expected: String,
    },
    #[error(
        "{resource_type} with ID {id:?} does not exist; verify the ID is correct, \
         non-existent resources cannot be imported"
    )]
    NoInstances { resource_type: String, id: String },
    #[error("authentication error: {0}")]
    Auth(String),
    #[error("cloudflare error: {0}")]
    Cloudflare(String),
}

/// One remote object as read by a provider during import. `resource_type` may
/// differ from the requested type when an import expands into several objects.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInstanceState {
    pub resource_type: String,
    pub id: String,
    pub attributes: BTreeMap<String, String>,
}

impl RawInstanceState {
    pub fn new(resource_type: &str, id: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl ToString) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    fn resource_types(&self) -> Vec<&str>;
    async fn import_resource_state(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<RawInstanceState>, ProviderError>;
}

pub fn get_provider(
    name: &str,
    config: &Map<String, Value>,
) -> Result<Box<dyn Provider>, ProviderError> {
    match name {
        "cloudflare" => Ok(Box::new(cloudflare::CloudflareProvider::from_config(config))),
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

/// Provider a resource type belongs to when none is given: the type prefix up
/// to the first underscore (`aws_instance` -> `aws`).
pub fn default_provider_name(resource_type: &str) -> &str {
    resource_type
        .split_once('_')
        .map(|(prefix, _)| prefix)
        .unwrap_or(resource_type)
}

/// Configured providers keyed by `name` or `name.alias`.
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, provider: Arc<dyn Provider>) {
        self.providers.insert(key.to_string(), provider);
    }

    pub fn with(mut self, key: &str, provider: Arc<dyn Provider>) -> Self {
        self.insert(key, provider);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn resolve(&self, key: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .get(key)
            .cloned()
            .ok_or_else(|| ProviderError::NotConfigured(key.to_string()))
    }

    /// Instantiates the root module's provider blocks, plus an unconfigured
    /// default provider for each resource type prefix without a block.
    /// Providers this build does not know are skipped; asking for one later
    /// reports it as not configured.
    pub fn from_config(tree: &ConfigTree) -> Self {
        let mut set = Self::new();
        let Some(root) = tree.root() else {
            return set;
        };

        for block in &root.providers {
            let key = block.full_name();
            match get_provider(&block.name, &block.settings) {
                Ok(provider) => set.insert(&key, Arc::from(provider)),
                Err(e) => tracing::warn!(provider = %key, error = %e, "skipping provider block"),
            }
        }

        let empty = Map::new();
        for module in root.walk() {
            for decl in &module.resources {
                let name = default_provider_name(&decl.resource_type);
                if set.providers.contains_key(name) {
                    continue;
                }
                match get_provider(name, &empty) {
                    Ok(provider) => set.insert(name, Arc::from(provider)),
                    Err(e) => tracing::debug!(provider = name, error = %e, "no built-in provider"),
                }
            }
        }

        set
    }
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}
