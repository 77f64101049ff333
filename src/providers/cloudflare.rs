mod client;
mod error;
mod types;

pub use client::CloudflareClient;
pub use error::CloudflareError;
pub use types::{DnsRecord, PageRule, Ruleset, RulesetScope, Zone, is_zone_id};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Provider, ProviderError, RawInstanceState};

const TOKEN_ENV: &str = "CLOUDFLARE_API_TOKEN";

const SUPPORTED_TYPES: &[&str] = &[
    "cloudflare_zone",
    "cloudflare_dns_record",
    "cloudflare_page_rule",
    "cloudflare_ruleset",
];

/// What an import ID points at, parsed per resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportLocator {
    Zone(String),
    DnsRecord { zone_id: String, record_id: String },
    PageRule { zone_id: String, rule_id: String },
    Ruleset { scope: RulesetScope, ruleset_id: String },
}

impl ImportLocator {
    pub fn parse(resource_type: &str, id: &str) -> Result<Self, ProviderError> {
        let invalid = |expected: &str| ProviderError::InvalidImportId {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            expected: expected.to_string(),
        };
        let parts: Vec<&str> = id.split('/').collect();

        match resource_type {
            "cloudflare_zone" => match parts.as_slice() {
                [zone] if !zone.is_empty() => Ok(ImportLocator::Zone(zone.to_string())),
                _ => Err(invalid("<zone_id> or <zone_name>")),
            },
            "cloudflare_dns_record" => match parts.as_slice() {
                [zone_id, record_id] if !zone_id.is_empty() && !record_id.is_empty() => {
                    Ok(ImportLocator::DnsRecord {
                        zone_id: zone_id.to_string(),
                        record_id: record_id.to_string(),
                    })
                }
                _ => Err(invalid("<zone_id>/<dns_record_id>")),
            },
            "cloudflare_page_rule" => match parts.as_slice() {
                [zone_id, rule_id] if !zone_id.is_empty() && !rule_id.is_empty() => {
                    Ok(ImportLocator::PageRule {
                        zone_id: zone_id.to_string(),
                        rule_id: rule_id.to_string(),
                    })
                }
                _ => Err(invalid("<zone_id>/<page_rule_id>")),
            },
            "cloudflare_ruleset" => {
                let expected = "zones/<zone_id>/<ruleset_id> or accounts/<account_id>/<ruleset_id>";
                match parts.as_slice() {
                    [kind, owner, ruleset_id] if !owner.is_empty() && !ruleset_id.is_empty() => {
                        let scope = match *kind {
                            "zones" => RulesetScope::Zone(owner.to_string()),
                            "accounts" => RulesetScope::Account(owner.to_string()),
                            _ => return Err(invalid(expected)),
                        };
                        Ok(ImportLocator::Ruleset {
                            scope,
                            ruleset_id: ruleset_id.to_string(),
                        })
                    }
                    _ => Err(invalid(expected)),
                }
            }
            other => Err(ProviderError::UnsupportedResourceType {
                provider: "cloudflare".to_string(),
                resource_type: other.to_string(),
            }),
        }
    }
}

pub struct CloudflareProvider {
    token: Option<String>,
    base_url: Option<String>,
}

impl CloudflareProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            base_url: None,
        }
    }

    /// Builds the provider from a `provider "cloudflare"` block. Recognized
    /// settings are `api_token` and `base_url`.
    pub fn from_config(config: &Map<String, Value>) -> Self {
        let setting = |key: &str| {
            config
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            token: setting("api_token"),
            base_url: setting("base_url"),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    fn client(&self) -> Result<CloudflareClient, ProviderError> {
        let token = self
            .token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()))
            .ok_or_else(|| {
                ProviderError::Auth(format!(
                    "No API token provided. Set {} or api_token in the provider block",
                    TOKEN_ENV
                ))
            })?;

        let client = match &self.base_url {
            Some(base_url) => CloudflareClient::with_base_url(token, base_url.clone()),
            None => CloudflareClient::new(token),
        };
        Ok(client?)
    }

    async fn fetch(
        client: &CloudflareClient,
        locator: &ImportLocator,
    ) -> Result<RawInstanceState, CloudflareError> {
        match locator {
            ImportLocator::Zone(zone) => Ok(client.get_zone(zone).await?.into_instance()),
            ImportLocator::DnsRecord { zone_id, record_id } => Ok(client
                .get_dns_record(zone_id, record_id)
                .await?
                .into_instance(zone_id)),
            ImportLocator::PageRule { zone_id, rule_id } => Ok(client
                .get_page_rule(zone_id, rule_id)
                .await?
                .into_instance(zone_id)),
            ImportLocator::Ruleset { scope, ruleset_id } => Ok(client
                .get_ruleset(scope, ruleset_id)
                .await?
                .into_instance(scope)),
        }
    }
}

#[async_trait]
impl Provider for CloudflareProvider {
    fn name(&self) -> &str {
        "cloudflare"
    }

    fn resource_types(&self) -> Vec<&str> {
        SUPPORTED_TYPES.to_vec()
    }

    async fn import_resource_state(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<RawInstanceState>, ProviderError> {
        let locator = ImportLocator::parse(resource_type, id)?;
        let client = self.client()?;

        client.verify_auth().await?;
        tracing::debug!("Cloudflare authentication verified");

        match Self::fetch(&client, &locator).await {
            Ok(instance) => {
                tracing::info!(resource_type, id = %instance.id, "remote object found");
                Ok(vec![instance])
            }
            Err(CloudflareError::NotFound { .. }) => {
                tracing::debug!(resource_type, id, "remote object not found");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}
