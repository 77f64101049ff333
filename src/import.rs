use std::collections::BTreeMap;

use crate::address::ResourceAddress;
use crate::context::ExecutionContext;
use crate::error::ImportError;
use crate::providers::{ProviderError, RawInstanceState, default_provider_name};
use crate::state::{InstanceState, ResourceState, StateSnapshot};

/// One resource to import: where it goes and the remote ID it comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportTarget {
    pub address: ResourceAddress,
    pub id: String,
    pub provider: Option<String>,
}

impl ImportTarget {
    pub fn new(address: ResourceAddress, id: &str) -> Self {
        Self {
            address,
            id: id.to_string(),
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = Some(provider.to_string());
        self
    }

    /// Explicit provider if given, else the resource type's prefix.
    pub fn provider_key(&self) -> &str {
        self.provider
            .as_deref()
            .unwrap_or_else(|| default_provider_name(&self.address.resource_type))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedInstance {
    pub address: ResourceAddress,
    pub id: String,
    pub provider: String,
}

#[derive(Debug)]
pub struct ImportOutcome {
    pub state: StateSnapshot,
    pub imported: Vec<ImportedInstance>,
}

impl ExecutionContext {
    /// Imports every target into a copy of the context's state.
    ///
    /// Targets run one after another. Any failure discards the whole copy, so
    /// the caller either gets every instance or none.
    pub async fn import(&self, targets: &[ImportTarget]) -> Result<ImportOutcome, ImportError> {
        let mut state = self.state.clone();
        let mut imported = Vec::new();

        tracing::debug!(
            targets = targets.len(),
            parallelism = self.parallelism,
            "starting import"
        );

        for target in targets {
            let key = target.provider_key();
            let fail = |source: ProviderError| ImportError::ImportExecutionError {
                address: target.address.to_string(),
                source,
            };

            let provider = self.providers.resolve(key).map_err(fail)?;
            tracing::info!(
                address = %target.address,
                id = %target.id,
                provider = key,
                "importing resource"
            );

            let instances = provider
                .import_resource_state(&target.address.resource_type, &target.id)
                .await
                .map_err(fail)?;
            if instances.is_empty() {
                return Err(fail(ProviderError::NoInstances {
                    resource_type: target.address.resource_type.clone(),
                    id: target.id.clone(),
                }));
            }

            let mut seen = BTreeMap::new();
            for raw in instances {
                let address = instance_address(&target.address, &raw, &mut seen);
                let resource = normalize(raw, key);
                tracing::debug!(address = %address, id = %resource.primary.id, "instance imported");

                imported.push(ImportedInstance {
                    address: address.clone(),
                    id: resource.primary.id.clone(),
                    provider: resource.provider.clone(),
                });
                state = state.with_resource(&address, resource);
            }
        }

        Ok(ImportOutcome { state, imported })
    }
}

/// Every instance keeps the target's module path, name and index but takes its
/// own type. Repeats of an address get a `-N` name suffix.
fn instance_address(
    target: &ResourceAddress,
    raw: &RawInstanceState,
    seen: &mut BTreeMap<String, usize>,
) -> ResourceAddress {
    let mut address = target.clone();
    address.resource_type = raw.resource_type.clone();

    let count = seen.entry(address.to_string()).or_insert(0);
    if *count > 0 {
        address.name = format!("{}-{}", target.name, count);
    }
    *count += 1;
    address
}

fn normalize(raw: RawInstanceState, provider_key: &str) -> ResourceState {
    let mut attributes = raw.attributes;
    attributes.insert("id".to_string(), raw.id.clone());

    ResourceState {
        resource_type: raw.resource_type,
        depends_on: Vec::new(),
        primary: InstanceState {
            id: raw.id,
            attributes,
            meta: Default::default(),
            tainted: false,
        },
        deposed: Vec::new(),
        provider: format!("provider.{}", provider_key),
    }
}
