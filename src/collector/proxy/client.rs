//! Minimal Swift object API client.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use url::Url;

/// Keystone domain used when none is configured.
const DEFAULT_DOMAIN: &str = "Default";

/// Object store errors.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote answered with a non-success status.
    #[error("unexpected http status {0}")]
    UnexpectedStatus(u16),

    /// A required response header is absent or not valid text.
    #[error("missing response header: {0}")]
    MissingHeader(&'static str),

    /// The Keystone catalog has no public object-store endpoint.
    #[error("no public object-store endpoint in service catalog")]
    MissingEndpoint,

    /// Storage URL could not be parsed or extended.
    #[error("invalid storage url: {0}")]
    InvalidUrl(String),
}

/// Authenticated storage session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub storage_url: String,
    pub token: String,
}

impl Session {
    pub fn new(storage_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            storage_url: storage_url.into(),
            token: token.into(),
        }
    }

    /// Account segment of the storage URL (e.g. `AUTH_test`).
    pub fn account(&self) -> Option<String> {
        let url = Url::parse(&self.storage_url).ok()?;
        url.path_segments()?
            .rev()
            .find(|s| !s.is_empty())
            .map(str::to_owned)
    }

    /// Same token, different storage endpoint.
    pub fn with_storage_url(mut self, storage_url: impl Into<String>) -> Self {
        self.storage_url = storage_url.into();
        self
    }

    /// `<storage_url>/<container>/<object>` with each segment escaped.
    pub fn object_url(&self, container: &str, object: &str) -> Result<Url, ObjectStoreError> {
        let mut url = Url::parse(&self.storage_url)
            .map_err(|e| ObjectStoreError::InvalidUrl(format!("{}: {e}", self.storage_url)))?;
        url.path_segments_mut()
            .map_err(|()| ObjectStoreError::InvalidUrl(self.storage_url.clone()))?
            .pop_if_empty()
            .push(container)
            .push(object);
        Ok(url)
    }
}

/// Operations the write/delete probe needs from Swift.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Obtain a token and the storage URL it is valid for.
    async fn authenticate(&self) -> Result<Session, ObjectStoreError>;

    /// Upload `payload` as `container/object`.
    async fn put_object(
        &self,
        session: &Session,
        container: &str,
        object: &str,
        payload: Vec<u8>,
    ) -> Result<(), ObjectStoreError>;

    /// Remove `container/object`.
    async fn delete_object(
        &self,
        session: &Session,
        container: &str,
        object: &str,
    ) -> Result<(), ObjectStoreError>;
}

/// Swift authentication settings.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: String,
    pub api_key: String,
    pub auth_url: String,
    /// Keystone user and project domain (v3 only).
    pub domain: String,
    /// Tenant or project name.
    pub tenant: String,
}

impl Credentials {
    /// Keystone v3 is used when the auth URL points at a `/v3` endpoint.
    pub fn is_v3(&self) -> bool {
        self.auth_url.contains("/v3")
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("api_key", &"<redacted>")
            .field("auth_url", &self.auth_url)
            .field("domain", &self.domain)
            .field("tenant", &self.tenant)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    interface: String,
    url: String,
}

/// reqwest-backed [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct SwiftClient {
    client: Client,
    credentials: Credentials,
}

impl SwiftClient {
    /// Build a client whose requests time out after `timeout`.
    pub fn new(credentials: Credentials, timeout: Duration) -> Result<Self, ObjectStoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            credentials,
        })
    }

    async fn authenticate_v1(&self) -> Result<Session, ObjectStoreError> {
        let creds = &self.credentials;
        let user = if creds.tenant.is_empty() {
            creds.username.clone()
        } else {
            format!("{}:{}", creds.tenant, creds.username)
        };

        let response = self
            .client
            .get(&creds.auth_url)
            .header("X-Auth-User", user)
            .header("X-Auth-Key", &creds.api_key)
            .send()
            .await?;
        let response = ensure_success(response)?;

        Ok(Session::new(
            header(&response, "X-Storage-Url")?,
            header(&response, "X-Auth-Token")?,
        ))
    }

    async fn authenticate_v3(&self) -> Result<Session, ObjectStoreError> {
        let creds = &self.credentials;
        let domain = if creds.domain.is_empty() {
            DEFAULT_DOMAIN
        } else {
            creds.domain.as_str()
        };

        let mut auth = json!({
            "identity": {
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": creds.username,
                        "domain": { "name": domain },
                        "password": creds.api_key,
                    }
                }
            }
        });
        if !creds.tenant.is_empty() {
            auth["scope"] = json!({
                "project": { "name": creds.tenant, "domain": { "name": domain } }
            });
        }

        let url = format!("{}/auth/tokens", creds.auth_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .json(&json!({ "auth": auth }))
            .send()
            .await?;
        let response = ensure_success(response)?;

        let token = header(&response, "X-Subject-Token")?;
        let body: TokenResponse = response.json().await?;
        let storage_url = body
            .token
            .catalog
            .into_iter()
            .filter(|entry| entry.kind == "object-store")
            .flat_map(|entry| entry.endpoints)
            .find(|endpoint| endpoint.interface == "public")
            .map(|endpoint| endpoint.url)
            .ok_or(ObjectStoreError::MissingEndpoint)?;

        Ok(Session::new(storage_url, token))
    }
}

fn ensure_success(response: Response) -> Result<Response, ObjectStoreError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ObjectStoreError::UnexpectedStatus(status.as_u16()))
    }
}

fn header(response: &Response, name: &'static str) -> Result<String, ObjectStoreError> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .ok_or(ObjectStoreError::MissingHeader(name))
}

#[async_trait::async_trait]
impl ObjectStore for SwiftClient {
    async fn authenticate(&self) -> Result<Session, ObjectStoreError> {
        if self.credentials.is_v3() {
            self.authenticate_v3().await
        } else {
            self.authenticate_v1().await
        }
    }

    async fn put_object(
        &self,
        session: &Session,
        container: &str,
        object: &str,
        payload: Vec<u8>,
    ) -> Result<(), ObjectStoreError> {
        let response = self
            .client
            .put(session.object_url(container, object)?)
            .header("X-Auth-Token", &session.token)
            .body(payload)
            .send()
            .await?;
        ensure_success(response).map(drop)
    }

    async fn delete_object(
        &self,
        session: &Session,
        container: &str,
        object: &str,
    ) -> Result<(), ObjectStoreError> {
        let response = self
            .client
            .delete(session.object_url(container, object)?)
            .header("X-Auth-Token", &session.token)
            .send()
            .await?;
        ensure_success(response).map(drop)
    }
}
