//! Terraform state snapshots (format version 3).
//!
//! Snapshots are plain values: import produces a new snapshot from the one read
//! out of the backend, and only the backend handle replaces the stored copy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::ResourceAddress;

pub const STATE_FORMAT_VERSION: u32 = 3;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to decode state: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode state: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("state format version {0} is newer than supported version {max}", max = STATE_FORMAT_VERSION)]
    UnsupportedVersion(u32),

    #[error("state lineage {incoming:?} does not match current lineage {current:?}")]
    LineageMismatch { current: String, incoming: String },

    #[error("state serial {incoming} is lower than current serial {current}")]
    SerialRegression { current: u64, incoming: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform_version: Option<String>,
    #[serde(default)]
    pub serial: u64,
    #[serde(default)]
    pub lineage: String,
    #[serde(default)]
    pub modules: Vec<ModuleState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub path: Vec<String>,
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceState>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ModuleState {
    fn new(path: Vec<String>) -> Self {
        Self {
            path,
            outputs: BTreeMap::new(),
            resources: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub primary: InstanceState,
    #[serde(default)]
    pub deposed: Vec<InstanceState>,
    #[serde(default)]
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceState {
    pub id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub tainted: bool,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSnapshot {
    /// An empty snapshot with a fresh lineage.
    pub fn new() -> Self {
        Self {
            version: STATE_FORMAT_VERSION,
            terraform_version: None,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            modules: vec![ModuleState::new(vec!["root".to_string()])],
        }
    }

    pub fn from_json(data: &[u8]) -> Result<Self, StateError> {
        let snapshot: StateSnapshot = serde_json::from_slice(data).map_err(StateError::Decode)?;
        if snapshot.version > STATE_FORMAT_VERSION {
            return Err(StateError::UnsupportedVersion(snapshot.version));
        }
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, StateError> {
        let mut data = serde_json::to_vec_pretty(self).map_err(StateError::Encode)?;
        data.push(b'\n');
        Ok(data)
    }

    pub fn module(&self, path: &[String]) -> Option<&ModuleState> {
        self.modules.iter().find(|m| m.path == path)
    }

    pub fn resource(&self, addr: &ResourceAddress) -> Option<&ResourceState> {
        self.module(&addr.module_path.state_path())?
            .resources
            .get(&addr.state_key())
    }

    pub fn resource_count(&self) -> usize {
        self.modules.iter().map(|m| m.resources.len()).sum()
    }

    /// A copy of this snapshot with `resource` stored at `addr`, replacing any
    /// resource already there.
    pub fn with_resource(&self, addr: &ResourceAddress, resource: ResourceState) -> Self {
        let mut next = self.clone();
        next.insert_resource(addr, resource);
        next
    }

    fn insert_resource(&mut self, addr: &ResourceAddress, resource: ResourceState) {
        let path = addr.module_path.state_path();
        let position = match self.modules.iter().position(|m| m.path == path) {
            Some(position) => position,
            None => {
                self.modules.push(ModuleState::new(path));
                self.modules.sort_by(|a, b| a.path.cmp(&b.path));
                self.modules
                    .iter()
                    .position(|m| m.path == addr.module_path.state_path())
                    .unwrap_or(0)
            }
        };
        self.modules[position]
            .resources
            .insert(addr.state_key(), resource);
    }

    /// Same resources and outputs, ignoring serial and version bookkeeping.
    pub fn same_content(&self, other: &StateSnapshot) -> bool {
        self.lineage == other.lineage && self.modules == other.modules
    }
}
