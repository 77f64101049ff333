use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::{BackendConfig, ConfigTree, Count, Module, ProviderConfig, ResourceDecl};
use crate::address::ModulePath;

const JSON_CONFIG_SUFFIX: &str = ".tf.json";
const NATIVE_CONFIG_SUFFIX: &str = ".tf";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: native HCL syntax is not supported, use JSON syntax (.tf.json)", .path.display())]
    NativeSyntax { path: PathBuf },

    #[error("{address} is declared more than once in {module}")]
    Duplicate { module: String, address: String },

    #[error("module {name:?} has source {source_addr:?}; only local paths (./, ../) are supported")]
    UnsupportedModuleSource { name: String, source_addr: String },

    #[error("module source {} includes itself", .path.display())]
    ModuleCycle { path: PathBuf },

    #[error("invalid {block} block {name:?}: {message}")]
    InvalidBlock {
        block: String,
        name: String,
        message: String,
    },
}

#[derive(Debug, Default, Deserialize)]
struct RawConfigFile {
    #[serde(default)]
    resource: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default)]
    data: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default)]
    module: BTreeMap<String, RawModuleCall>,
    #[serde(default)]
    provider: BTreeMap<String, OneOrMany<Map<String, Value>>>,
    #[serde(default)]
    terraform: Option<OneOrMany<RawTerraformBlock>>,
}

#[derive(Debug, Deserialize)]
struct RawModuleCall {
    source: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawTerraformBlock {
    #[serde(default)]
    backend: BTreeMap<String, Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// Loads the module rooted at `dir` and every local child module it calls.
///
/// A directory without configuration files yields an empty tree.
pub fn load_module_tree(dir: &Path) -> Result<ConfigTree, ConfigError> {
    let files = config_files(dir)?;
    if files.is_empty() {
        tracing::debug!(path = %dir.display(), "no configuration files found");
        return Ok(ConfigTree::empty());
    }

    let mut stack = Vec::new();
    let root = load_module(dir, ModulePath::root(), files, &mut stack)?;
    Ok(ConfigTree::new(root))
}

fn load_module(
    dir: &Path,
    path: ModulePath,
    files: Vec<PathBuf>,
    stack: &mut Vec<PathBuf>,
) -> Result<Module, ConfigError> {
    let canonical = fs::canonicalize(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    if stack.contains(&canonical) {
        return Err(ConfigError::ModuleCycle { path: canonical });
    }
    stack.push(canonical);

    let mut module = Module {
        path,
        ..Module::default()
    };
    let mut calls = BTreeMap::new();

    for file in files {
        let raw = read_file(&file)?;
        merge_file(&mut module, &mut calls, raw)?;
    }

    for (name, call) in calls {
        if !is_local_source(&call.source) {
            return Err(ConfigError::UnsupportedModuleSource {
                name,
                source_addr: call.source,
            });
        }
        let child_dir = dir.join(&call.source);
        let child_files = config_files(&child_dir)?;
        let child_path = module.path.child(&name);
        tracing::debug!(module = %child_path, source = %call.source, "loading child module");
        let child = load_module(&child_dir, child_path, child_files, stack)?;
        module.children.insert(name, child);
    }

    stack.pop();
    Ok(module)
}

fn merge_file(
    module: &mut Module,
    calls: &mut BTreeMap<String, RawModuleCall>,
    raw: RawConfigFile,
) -> Result<(), ConfigError> {
    for (resource_type, blocks) in raw.resource {
        for (name, body) in blocks {
            let decl = ResourceDecl::managed(&resource_type, &name);
            push_resource(module, decl, &body)?;
        }
    }

    for (resource_type, blocks) in raw.data {
        for (name, body) in blocks {
            let decl = ResourceDecl::data(&resource_type, &name);
            push_resource(module, decl, &body)?;
        }
    }

    for (name, call) in raw.module {
        if calls.contains_key(&name) {
            return Err(ConfigError::Duplicate {
                module: module.path.describe(),
                address: format!("module.{}", name),
            });
        }
        calls.insert(name, call);
    }

    for (name, blocks) in raw.provider {
        for mut settings in blocks.into_vec() {
            let alias = match settings.remove("alias") {
                None => None,
                Some(Value::String(alias)) => Some(alias),
                Some(other) => {
                    return Err(ConfigError::InvalidBlock {
                        block: "provider".to_string(),
                        name,
                        message: format!("alias must be a string, got {}", other),
                    });
                }
            };
            let provider = ProviderConfig {
                name: name.clone(),
                alias,
                settings,
            };
            let full_name = provider.full_name();
            if module.providers.iter().any(|p| p.full_name() == full_name) {
                return Err(ConfigError::Duplicate {
                    module: module.path.describe(),
                    address: format!("provider.{}", full_name),
                });
            }
            module.providers.push(provider);
        }
    }

    for block in raw.terraform.map(OneOrMany::into_vec).unwrap_or_default() {
        for (kind, settings) in block.backend {
            if module.backend.is_some() {
                return Err(ConfigError::Duplicate {
                    module: module.path.describe(),
                    address: format!("backend.{}", kind),
                });
            }
            module.backend = Some(BackendConfig { kind, settings });
        }
    }

    Ok(())
}

fn push_resource(module: &mut Module, mut decl: ResourceDecl, body: &Value) -> Result<(), ConfigError> {
    // JSON syntax allows a block body to be given as a list of objects.
    let count = match body {
        Value::Array(items) => items.iter().find_map(|item| item.get("count")),
        other => other.get("count"),
    };
    decl.count = count.map(|value| parse_count(&decl, value)).transpose()?;

    if module
        .resources
        .iter()
        .any(|existing| existing.key() == decl.key())
    {
        return Err(ConfigError::Duplicate {
            module: module.path.describe(),
            address: decl.key(),
        });
    }
    module.resources.push(decl);
    Ok(())
}

fn parse_count(decl: &ResourceDecl, value: &Value) -> Result<Count, ConfigError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Count::Fixed)
            .ok_or_else(|| ConfigError::InvalidBlock {
                block: "resource".to_string(),
                name: decl.key(),
                message: format!("count must be a non-negative integer, got {}", n),
            }),
        Value::String(s) => Ok(s
            .trim()
            .parse::<u32>()
            .map(Count::Fixed)
            .unwrap_or_else(|_| Count::Dynamic(s.clone()))),
        other => Err(ConfigError::InvalidBlock {
            block: "resource".to_string(),
            name: decl.key(),
            message: format!("count must be a number or expression, got {}", other),
        }),
    }
}

fn read_file(path: &Path) -> Result<RawConfigFile, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Sorted `*.tf.json` files in `dir`. A missing directory has no files.
fn config_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if name.ends_with(JSON_CONFIG_SUFFIX) {
            files.push(path);
        } else if name.ends_with(NATIVE_CONFIG_SUFFIX) {
            return Err(ConfigError::NativeSyntax { path });
        }
    }

    files.sort();
    Ok(files)
}

fn is_local_source(source: &str) -> bool {
    source.starts_with("./") || source.starts_with("../")
}
