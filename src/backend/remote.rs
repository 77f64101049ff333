use serde_json::{Map, Value};

use super::{Backend, BackendError};

/// A backend whose operations run on a remote service. It stores state but
/// offers no local execution, so import cannot run against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBackend {
    hostname: String,
    organization: String,
}

impl RemoteBackend {
    pub fn new(hostname: &str, organization: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            organization: organization.to_string(),
        }
    }

    pub fn from_config(settings: &Map<String, Value>) -> Result<Self, BackendError> {
        let organization = settings
            .get("organization")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BackendError::Config("remote backend requires \"organization\"".to_string())
            })?;
        let hostname = settings
            .get("hostname")
            .and_then(Value::as_str)
            .unwrap_or("app.terraform.io");
        Ok(Self::new(hostname, organization))
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }
}

impl Backend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }
}
