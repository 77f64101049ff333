use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::de::DeserializeOwned;

use super::CloudflareError;
use super::types::{CloudflareResponse, DnsRecord, PageRule, Ruleset, RulesetScope, Zone, is_zone_id};

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

#[derive(Clone)]
pub struct CloudflareClient {
    client: reqwest::Client,
    base_url: String,
}

impl CloudflareClient {
    pub fn new(token: String) -> Result<Self, CloudflareError> {
        Self::with_base_url(token, CLOUDFLARE_API_BASE.to_string())
    }

    /// NOTE: Used by tests and by the provider's `base_url` setting.
    pub fn with_base_url(token: String, base_url: String) -> Result<Self, CloudflareError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", token);
        let header_value =
            HeaderValue::from_str(&auth_value).map_err(|_| CloudflareError::Auth {
                message: "Invalid token format".to_string(),
            })?;
        headers.insert(AUTHORIZATION, header_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(CloudflareError::Network)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.base_url
    }

    pub async fn verify_auth(&self) -> Result<(), CloudflareError> {
        let url = format!("{}/user/tokens/verify", self.base_url);

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        let body: CloudflareResponse<serde_json::Value> =
            response.json().await.map_err(|e| CloudflareError::Api {
                status: status.as_u16(),
                message: format!("Failed to parse response: {}", e),
            })?;

        if body.success {
            return Ok(());
        }

        Err(CloudflareError::Auth {
            message: body
                .first_error()
                .unwrap_or("Unknown authentication error")
                .to_string(),
        })
    }

    // NOTE: Auto-detects zone ID (32-char hex) vs zone name
    pub async fn get_zone(&self, zone: &str) -> Result<Zone, CloudflareError> {
        if is_zone_id(zone) {
            return self
                .get_single(&format!("zones/{}", zone), "cloudflare_zone", zone)
                .await;
        }

        let path = format!("zones?name={}", urlencoding::encode(zone));
        let zones: Vec<Zone> = self.get_single(&path, "cloudflare_zone", zone).await?;
        zones
            .into_iter()
            .next()
            .ok_or_else(|| CloudflareError::NotFound {
                resource_type: "cloudflare_zone".to_string(),
                id: zone.to_string(),
            })
    }

    pub async fn get_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
    ) -> Result<DnsRecord, CloudflareError> {
        let path = format!("zones/{}/dns_records/{}", zone_id, record_id);
        self.get_single(&path, "cloudflare_dns_record", record_id)
            .await
    }

    pub async fn get_page_rule(
        &self,
        zone_id: &str,
        rule_id: &str,
    ) -> Result<PageRule, CloudflareError> {
        let path = format!("zones/{}/pagerules/{}", zone_id, rule_id);
        self.get_single(&path, "cloudflare_page_rule", rule_id).await
    }

    pub async fn get_ruleset(
        &self,
        scope: &RulesetScope,
        ruleset_id: &str,
    ) -> Result<Ruleset, CloudflareError> {
        let path = format!("{}/rulesets/{}", scope.api_path(), ruleset_id);
        self.get_single(&path, "cloudflare_ruleset", ruleset_id)
            .await
    }

    /// Fetches one object; a 404 or an empty result is reported as
    /// [`CloudflareError::NotFound`].
    async fn get_single<T: DeserializeOwned>(
        &self,
        path: &str,
        resource_type: &str,
        id: &str,
    ) -> Result<T, CloudflareError> {
        let not_found = || CloudflareError::NotFound {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        };

        let url = format!("{}/{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        match status {
            StatusCode::NOT_FOUND => return Err(not_found()),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                return Err(CloudflareError::RateLimited { retry_after });
            }
            _ => {}
        }

        let body: CloudflareResponse<T> =
            response.json().await.map_err(|e| CloudflareError::Decode {
                resource_type: resource_type.to_string(),
                message: e.to_string(),
            })?;

        if !body.success {
            let message = body.first_error().unwrap_or("Unknown error").to_string();
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                return Err(CloudflareError::Auth { message });
            }
            return Err(CloudflareError::Api {
                status: status.as_u16(),
                message,
            });
        }

        body.result.ok_or_else(not_found)
    }
}

impl std::fmt::Debug for CloudflareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
