use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use shared::{
    domain::{token_preview, Credentials, Profile},
    error::AuthError,
    protocol::{ApiEnvelope, LoginRequest, LoginResponse, ProfileEnvelope},
};
use tracing::{debug, warn};
use url::Url;

use crate::error::{classify_body_error, classify_status, classify_transport_error};

pub const LOGIN_PATH: &str = "auth/login";
pub const DEFAULT_PROFILE_PATH: &str = "user/me";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub token: String,
    pub profile: Profile,
}

/// Backend the session controller talks to. Implementations classify every failure.
#[async_trait]
pub trait AuthRemote: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, AuthError>;
    async fn fetch_profile(&self, token: &str) -> Result<Profile, AuthError>;
}

pub struct HttpAuthRemote {
    http: Client,
    base_url: Url,
    login_url: Url,
    profile_url: Url,
}

impl HttpAuthRemote {
    pub fn new(base_url: &str, request_timeout: Option<Duration>) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("invalid api base url '{base_url}'"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(anyhow!("api base url must start with http:// or https://"));
        }
        // `Url::join` drops the last segment unless the base ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut builder = Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed to build http client")?;

        Ok(Self {
            http,
            login_url: endpoint(&base_url, LOGIN_PATH)?,
            profile_url: endpoint(&base_url, DEFAULT_PROFILE_PATH)?,
            base_url,
        })
    }

    pub fn with_profile_path(mut self, profile_path: &str) -> Result<Self> {
        self.profile_url = endpoint(&self.base_url, profile_path)?;
        Ok(self)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn login_url(&self) -> &Url {
        &self.login_url
    }

    pub fn profile_url(&self) -> &Url {
        &self.profile_url
    }
}

/// Resolves `path` under `base`; anything that escapes the api origin is refused.
fn endpoint(base: &Url, path: &str) -> Result<Url> {
    let url = base
        .join(path.trim_start_matches('/'))
        .with_context(|| format!("invalid endpoint path '{path}'"))?;
    if url.origin() != base.origin() {
        return Err(anyhow!(
            "endpoint path '{path}' must stay under the api base url {base}"
        ));
    }
    Ok(url)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LoginBody {
    Envelope(ApiEnvelope<LoginResponse>),
    Flat(LoginResponse),
}

#[async_trait]
impl AuthRemote for HttpAuthRemote {
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, AuthError> {
        debug!("remote: POST {} username={}", self.login_url, credentials.username);
        let response = self
            .http
            .post(self.login_url.clone())
            .json(&LoginRequest::from(credentials))
            .send()
            .await
            .map_err(classify_transport_error)?;
        let status = response.status();
        classify_status(status)?;

        let body = response.bytes().await.map_err(classify_transport_error)?;
        let login = match serde_json::from_slice::<LoginBody>(&body).map_err(classify_body_error)? {
            LoginBody::Flat(login) => login,
            LoginBody::Envelope(envelope) if !envelope.success => {
                warn!(
                    "remote: login declined status={} message={}",
                    status.as_u16(),
                    envelope.message.as_deref().unwrap_or_default()
                );
                return Err(AuthError::Rejected(status.as_u16()));
            }
            LoginBody::Envelope(envelope) => envelope.data.ok_or(AuthError::MalformedResponse)?,
        };

        if login.token.is_empty() {
            return Err(AuthError::MalformedResponse);
        }

        Ok(LoginGrant {
            profile: login.profile(),
            token: login.token,
        })
    }

    async fn fetch_profile(&self, token: &str) -> Result<Profile, AuthError> {
        debug!(
            "remote: GET {} token={}",
            self.profile_url,
            token_preview(token)
        );
        let response = self
            .http
            .get(self.profile_url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(classify_transport_error)?;
        let status = response.status();
        classify_status(status)?;

        let body = response.bytes().await.map_err(classify_transport_error)?;
        let envelope: ProfileEnvelope =
            serde_json::from_slice(&body).map_err(classify_body_error)?;
        if !envelope.success {
            warn!(
                "remote: profile fetch declined status={} message={}",
                status.as_u16(),
                envelope.message.as_deref().unwrap_or_default()
            );
            return Err(AuthError::Rejected(status.as_u16()));
        }
        envelope.data.ok_or(AuthError::MalformedResponse)
    }
}

#[cfg(test)]
#[path = "tests/remote_tests.rs"]
mod tests;
