//! Resource addresses as typed on the command line.
//!
//! Grammar accepted here:
//!
//! ```text
//! (module.NAME.)* [data.] TYPE.NAME [ '[' INDEX ']' ]
//! ```
//!
//! A bare module path (`module.network`) parses, but is rejected by [`resolve`]
//! because import always targets a single resource.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ImportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceMode {
    Managed,
    Data,
}

/// Ordered module instance names from the root, e.g. `["network", "subnets"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    /// Path as stored in state files: always prefixed with `root`.
    pub fn state_path(&self) -> Vec<String> {
        std::iter::once("root".to_string())
            .chain(self.0.iter().cloned())
            .collect()
    }

    /// Human-facing description used in error messages.
    pub fn describe(&self) -> String {
        if self.is_root() {
            "the root module".to_string()
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|m| format!("module.{}", m)).collect();
        write!(f, "{}", rendered.join("."))
    }
}

/// A fully specified resource address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceAddress {
    pub module_path: ModulePath,
    pub mode: ResourceMode,
    pub resource_type: String,
    pub name: String,
    pub index: Option<u32>,
}

impl ResourceAddress {
    pub fn managed(resource_type: &str, name: &str) -> Self {
        Self {
            module_path: ModulePath::root(),
            mode: ResourceMode::Managed,
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            index: None,
        }
    }

    pub fn in_module(mut self, module_path: ModulePath) -> Self {
        self.module_path = module_path;
        self
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    /// Key of this resource within its module in the state file.
    pub fn state_key(&self) -> String {
        let mut key = match self.mode {
            ResourceMode::Managed => format!("{}.{}", self.resource_type, self.name),
            ResourceMode::Data => format!("data.{}.{}", self.resource_type, self.name),
        };
        if let Some(index) = self.index {
            key.push_str(&format!(".{}", index));
        }
        key
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.module_path.is_root() {
            write!(f, "{}.", self.module_path)?;
        }
        if self.mode == ResourceMode::Data {
            write!(f, "data.")?;
        }
        write!(f, "{}.{}", self.resource_type, self.name)?;
        if let Some(index) = self.index {
            write!(f, "[{}]", index)?;
        }
        Ok(())
    }
}

/// Result of syntax-only parsing. `resource` is `None` for module-only addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    pub module_path: ModulePath,
    pub resource: Option<ResourceAddress>,
}

impl ParsedAddress {
    pub fn has_resource_spec(&self) -> bool {
        self.resource.is_some()
    }
}

/// Resolves user input into a managed resource address suitable for import.
pub fn resolve(input: &str) -> Result<ResourceAddress, ImportError> {
    let parsed = parse(input)?;
    let addr = parsed.resource.ok_or_else(|| ImportError::MissingResourceSpec {
        input: input.to_string(),
    })?;

    if addr.mode != ResourceMode::Managed {
        return Err(ImportError::UnsupportedResourceMode {
            input: input.to_string(),
        });
    }

    Ok(addr)
}

/// Parses an address without applying import-specific restrictions.
pub fn parse(input: &str) -> Result<ParsedAddress, ImportError> {
    let invalid = |reason: &str| ImportError::InvalidAddressSyntax {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid("address is empty"));
    }

    let (body, index) = split_index(trimmed).map_err(|reason| invalid(&reason))?;

    let segments: Vec<&str> = body.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(invalid("empty address segment"));
    }

    let mut modules = Vec::new();
    let mut rest = segments.as_slice();
    while let ["module", name, tail @ ..] = rest {
        if !is_identifier(name) {
            return Err(invalid(&format!("invalid module name {:?}", name)));
        }
        modules.push(name.to_string());
        rest = tail;
    }
    let module_path = ModulePath::new(modules);

    let (mode, resource_type, name) = match rest {
        [] => {
            if index.is_some() {
                return Err(invalid("an index requires a resource TYPE.NAME"));
            }
            return Ok(ParsedAddress {
                module_path,
                resource: None,
            });
        }
        ["data", resource_type, name] => (ResourceMode::Data, *resource_type, *name),
        ["data", _] => return Err(invalid("data resource address requires TYPE.NAME")),
        [resource_type, name] => (ResourceMode::Managed, *resource_type, *name),
        _ => return Err(invalid("expected [module.NAME.]*[data.]TYPE.NAME[INDEX]")),
    };

    if !is_identifier(resource_type) {
        return Err(invalid(&format!("invalid resource type {:?}", resource_type)));
    }
    if !is_identifier(name) {
        return Err(invalid(&format!("invalid resource name {:?}", name)));
    }

    Ok(ParsedAddress {
        module_path: module_path.clone(),
        resource: Some(ResourceAddress {
            module_path,
            mode,
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            index,
        }),
    })
}

fn split_index(input: &str) -> Result<(&str, Option<u32>), String> {
    let Some(stripped) = input.strip_suffix(']') else {
        return Ok((input, None));
    };
    let open = stripped
        .rfind('[')
        .ok_or_else(|| "unbalanced ']' in address".to_string())?;
    let digits = &stripped[open + 1..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("index {:?} is not a non-negative integer", digits));
    }
    let index = digits
        .parse::<u32>()
        .map_err(|e| format!("index {:?} out of range: {}", digits, e))?;
    Ok((&stripped[..open], Some(index)))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
