//! Loaded Terraform configuration: a tree of modules and their declarations.

mod loader;
mod matcher;

pub use loader::{ConfigError, load_module_tree};
pub use matcher::match_resource;

use std::collections::BTreeMap;

use crate::address::{ModulePath, ResourceAddress, ResourceMode};

/// Configuration for a working directory. `root` is `None` when the directory
/// holds no configuration files at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    root: Option<Module>,
}

impl ConfigTree {
    pub fn empty() -> Self {
        Self { root: None }
    }

    pub fn new(root: Module) -> Self {
        Self { root: Some(root) }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn root(&self) -> Option<&Module> {
        self.root.as_ref()
    }

    /// Module at `path`, or `None` if any segment is missing.
    pub fn child(&self, path: &ModulePath) -> Option<&Module> {
        path.segments()
            .iter()
            .try_fold(self.root.as_ref()?, |module, name| module.children.get(name))
    }

    pub fn backend_config(&self) -> Option<&BackendConfig> {
        self.root.as_ref().and_then(|root| root.backend.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub path: ModulePath,
    pub resources: Vec<ResourceDecl>,
    pub providers: Vec<ProviderConfig>,
    pub backend: Option<BackendConfig>,
    pub children: BTreeMap<String, Module>,
}

impl Module {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, resource: ResourceDecl) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Adds a child module, rewriting its path (and its descendants') under this one.
    pub fn with_child(mut self, name: &str, mut child: Module) -> Self {
        child.reparent(self.path.child(name));
        self.children.insert(name.to_string(), child);
        self
    }

    fn reparent(&mut self, path: ModulePath) {
        for (name, child) in self.children.iter_mut() {
            child.reparent(path.child(name));
        }
        self.path = path;
    }

    /// Every module in the tree, depth first, starting with `self`.
    pub fn walk(&self) -> Vec<&Module> {
        let mut modules = vec![self];
        for child in self.children.values() {
            modules.extend(child.walk());
        }
        modules
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Count {
    Fixed(u32),
    /// Interpolated count whose value is unknown until evaluation.
    Dynamic(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDecl {
    pub mode: ResourceMode,
    pub resource_type: String,
    pub name: String,
    pub count: Option<Count>,
}

impl ResourceDecl {
    pub fn managed(resource_type: &str, name: &str) -> Self {
        Self {
            mode: ResourceMode::Managed,
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            count: None,
        }
    }

    pub fn data(resource_type: &str, name: &str) -> Self {
        Self {
            mode: ResourceMode::Data,
            ..Self::managed(resource_type, name)
        }
    }

    pub fn with_count(mut self, count: Count) -> Self {
        self.count = Some(count);
        self
    }

    /// Whether this declaration can hold the instance named by `addr`.
    ///
    /// An explicit index must fall inside a fixed count (any index is accepted
    /// for a dynamic count, only `0` for an uncounted resource). An address
    /// without an index refers to instance zero.
    pub fn matches(&self, addr: &ResourceAddress) -> bool {
        if self.mode != addr.mode
            || self.resource_type != addr.resource_type
            || self.name != addr.name
        {
            return false;
        }

        let index = addr.index.unwrap_or(0);
        match &self.count {
            None => index == 0,
            Some(Count::Fixed(n)) => index < *n,
            Some(Count::Dynamic(_)) => true,
        }
    }

    pub fn key(&self) -> String {
        match self.mode {
            ResourceMode::Managed => format!("{}.{}", self.resource_type, self.name),
            ResourceMode::Data => format!("data.{}.{}", self.resource_type, self.name),
        }
    }
}

/// A `provider` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub alias: Option<String>,
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl ProviderConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// `name` or `name.alias`, the key `--provider` selects by.
    pub fn full_name(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{}.{}", self.name, alias),
            None => self.name.clone(),
        }
    }
}

/// `terraform { backend "<kind>" { ... } }`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendConfig {
    pub kind: String,
    pub settings: serde_json::Map<String, serde_json::Value>,
}
