use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde_json::{Map, Value};

use super::{BackendError, LockInfo, StateStore};

const DEFAULT_LOCK_METHOD: &str = "LOCK";
const DEFAULT_UNLOCK_METHOD: &str = "UNLOCK";
const DEFAULT_UPDATE_METHOD: &str = "POST";

/// State stored behind a REST endpoint (GET to read, POST to update, optional
/// LOCK/UNLOCK endpoints).
#[derive(Clone)]
pub struct HttpStateStore {
    client: reqwest::Client,
    address: String,
    update_method: Method,
    lock_address: Option<String>,
    lock_method: Method,
    unlock_address: Option<String>,
    unlock_method: Method,
    username: Option<String>,
    password: Option<String>,
    held_lock: std::sync::Arc<Mutex<Option<LockInfo>>>,
}

impl HttpStateStore {
    pub fn new(address: String) -> Result<Self, BackendError> {
        let mut settings = Map::new();
        settings.insert("address".to_string(), Value::String(address));
        Self::from_config(&settings)
    }

    pub fn from_config(settings: &Map<String, Value>) -> Result<Self, BackendError> {
        let address = string_setting(settings, "address")?
            .ok_or_else(|| BackendError::Config("http backend requires \"address\"".to_string()))?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(BackendError::Network)?;

        Ok(Self {
            client,
            address,
            update_method: method_setting(settings, "update_method", DEFAULT_UPDATE_METHOD)?,
            lock_address: string_setting(settings, "lock_address")?,
            lock_method: method_setting(settings, "lock_method", DEFAULT_LOCK_METHOD)?,
            unlock_address: string_setting(settings, "unlock_address")?,
            unlock_method: method_setting(settings, "unlock_method", DEFAULT_UNLOCK_METHOD)?,
            username: string_setting(settings, "username")?,
            password: string_setting(settings, "password")?,
            held_lock: Default::default(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_deref()),
            None => builder,
        }
    }

    fn remember_lock(&self, info: Option<LockInfo>) {
        if let Ok(mut held) = self.held_lock.lock() {
            *held = info;
        }
    }

    fn held_lock(&self) -> Option<LockInfo> {
        self.held_lock.lock().ok().and_then(|held| held.clone())
    }
}

#[async_trait]
impl StateStore for HttpStateStore {
    fn describe(&self) -> String {
        self.address.clone()
    }

    async fn read(&self) -> Result<Option<Vec<u8>>, BackendError> {
        let response = self.request(Method::GET, &self.address).send().await?;
        let status = response.status();

        match status {
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(None),
            StatusCode::OK => {
                let body = response.bytes().await?;
                if body.iter().all(u8::is_ascii_whitespace) {
                    Ok(None)
                } else {
                    Ok(Some(body.to_vec()))
                }
            }
            _ => Err(http_error(status, response).await),
        }
    }

    async fn write(&self, data: &[u8], lock_id: Option<&str>) -> Result<(), BackendError> {
        let url = match lock_id {
            Some(id) if self.lock_address.is_some() => {
                let separator = if self.address.contains('?') { '&' } else { '?' };
                format!("{}{}ID={}", self.address, separator, urlencoding::encode(id))
            }
            _ => self.address.clone(),
        };

        let response = self
            .request(self.update_method.clone(), &url)
            .header(CONTENT_TYPE, "application/json")
            .body(data.to_vec())
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            tracing::debug!(address = %self.address, bytes = data.len(), "state written");
            return Ok(());
        }
        Err(http_error(status, response).await)
    }

    async fn lock(&self, info: &LockInfo) -> Result<String, BackendError> {
        let Some(lock_address) = &self.lock_address else {
            tracing::debug!(address = %self.address, "http backend has no lock_address, locking skipped");
            return Ok(info.id.clone());
        };

        let mut info = info.clone();
        info.path = self.address.clone();

        let response = self
            .request(self.lock_method.clone(), lock_address)
            .json(&info)
            .send()
            .await?;
        let status = response.status();

        match status {
            StatusCode::OK => {
                self.remember_lock(Some(info.clone()));
                Ok(info.id)
            }
            StatusCode::LOCKED | StatusCode::CONFLICT => {
                let body = response.bytes().await.unwrap_or_default();
                let holder = match serde_json::from_slice::<LockInfo>(&body) {
                    Ok(holder) => holder.to_string(),
                    Err(_) => format!("  (lock held at {})", lock_address),
                };
                Err(BackendError::Locked { holder })
            }
            _ => Err(http_error(status, response).await),
        }
    }

    async fn unlock(&self, lock_id: &str) -> Result<(), BackendError> {
        let Some(unlock_address) = &self.unlock_address else {
            return Ok(());
        };

        let body = match self.held_lock() {
            Some(held) if held.id == lock_id => serde_json::to_value(&held)
                .map_err(|e| BackendError::Config(format!("failed to encode lock info: {}", e)))?,
            _ => serde_json::json!({ "ID": lock_id }),
        };

        let response = self
            .request(self.unlock_method.clone(), unlock_address)
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            self.remember_lock(None);
            return Ok(());
        }
        Err(http_error(status, response).await)
    }
}

impl std::fmt::Debug for HttpStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStateStore")
            .field("address", &self.address)
            .field("lock_address", &self.lock_address)
            .field("unlock_address", &self.unlock_address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

async fn http_error(status: StatusCode, response: reqwest::Response) -> BackendError {
    let text = response.text().await.unwrap_or_default();
    let message = if text.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string()
    } else {
        text.trim().to_string()
    };
    BackendError::Http {
        status: status.as_u16(),
        message,
    }
}

fn string_setting(settings: &Map<String, Value>, key: &str) -> Result<Option<String>, BackendError> {
    match settings.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(BackendError::Config(format!(
            "http backend setting {:?} must be a string, got {}",
            key, other
        ))),
    }
}

fn method_setting(
    settings: &Map<String, Value>,
    key: &str,
    default: &str,
) -> Result<Method, BackendError> {
    let name = string_setting(settings, key)?.unwrap_or_else(|| default.to_string());
    Method::from_bytes(name.to_uppercase().as_bytes())
        .map_err(|_| BackendError::Config(format!("invalid HTTP method {:?} for {:?}", name, key)))
}
