use serde::Deserialize;

use crate::providers::RawInstanceState;

#[derive(Debug, Deserialize)]
pub struct CloudflareResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<CloudflareApiError>,
    pub result: Option<T>,
}

impl<T> CloudflareResponse<T> {
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(|e| e.message.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct CloudflareApiError {
    #[allow(dead_code)] // NOTE: Cloudflare error codes are not mapped yet
    pub code: u32,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub paused: bool,
    pub account: ZoneAccount,
}

#[derive(Debug, Deserialize)]
pub struct ZoneAccount {
    pub id: String,
}

impl Zone {
    pub fn into_instance(self) -> RawInstanceState {
        let mut instance = RawInstanceState::new("cloudflare_zone", &self.id)
            .with_attribute("zone", &self.name)
            .with_attribute("account_id", &self.account.id)
            .with_attribute("paused", self.paused);
        if let Some(status) = self.status {
            instance = instance.with_attribute("status", status);
        }
        instance
    }
}

pub fn is_zone_id(input: &str) -> bool {
    input.len() == 32 && input.chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Debug, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    #[serde(default)]
    pub zone_id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub proxied: Option<bool>,
}

impl DnsRecord {
    pub fn into_instance(self, zone_id: &str) -> RawInstanceState {
        let mut instance = RawInstanceState::new("cloudflare_dns_record", &self.id)
            .with_attribute("zone_id", self.zone_id.as_deref().unwrap_or(zone_id))
            .with_attribute("name", &self.name)
            .with_attribute("type", &self.type_);
        if let Some(content) = self.content {
            instance = instance.with_attribute("content", content);
        }
        if let Some(ttl) = self.ttl {
            instance = instance.with_attribute("ttl", ttl);
        }
        if let Some(proxied) = self.proxied {
            instance = instance.with_attribute("proxied", proxied);
        }
        instance
    }
}

#[derive(Debug, Deserialize)]
pub struct PageRuleTarget {
    pub target: String,
    pub constraint: PageRuleConstraint,
}

#[derive(Debug, Deserialize)]
pub struct PageRuleConstraint {
    pub operator: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct PageRule {
    pub id: String,
    pub targets: Vec<PageRuleTarget>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<u32>,
}

impl PageRule {
    pub fn into_instance(self, zone_id: &str) -> RawInstanceState {
        let mut instance =
            RawInstanceState::new("cloudflare_page_rule", &self.id).with_attribute("zone_id", zone_id);
        if let Some(target) = self.targets.first() {
            instance = instance.with_attribute("target", &target.constraint.value);
        }
        if let Some(status) = self.status {
            instance = instance.with_attribute("status", status);
        }
        if let Some(priority) = self.priority {
            instance = instance.with_attribute("priority", priority);
        }
        instance
    }
}

#[derive(Debug, Deserialize)]
pub struct Ruleset {
    pub id: String,
    pub name: String,
    pub phase: String,
    #[serde(default)]
    pub kind: Option<String>,
}

/// Where a ruleset lives; rulesets exist at zone and account level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulesetScope {
    Zone(String),
    Account(String),
}

impl RulesetScope {
    pub fn api_path(&self) -> String {
        match self {
            RulesetScope::Zone(id) => format!("zones/{}", id),
            RulesetScope::Account(id) => format!("accounts/{}", id),
        }
    }
}

impl Ruleset {
    pub fn into_instance(self, scope: &RulesetScope) -> RawInstanceState {
        let instance = RawInstanceState::new("cloudflare_ruleset", &self.id)
            .with_attribute("name", &self.name)
            .with_attribute("phase", &self.phase);
        let instance = match scope {
            RulesetScope::Zone(id) => instance.with_attribute("zone_id", id),
            RulesetScope::Account(id) => instance.with_attribute("account_id", id),
        };
        match self.kind {
            Some(kind) => instance.with_attribute("kind", kind),
            None => instance,
        }
    }
}
