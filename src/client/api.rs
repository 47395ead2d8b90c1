//! HTTP client for the admin session endpoints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

use super::ClientError;
use crate::APP_USER_AGENT;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub token: String,
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn login(
        &self,
        password: &str,
        recaptcha_token: Option<&str>,
    ) -> Result<TokenGrant, ClientError>;

    async fn refresh(&self, token: &str) -> Result<TokenGrant, ClientError>;

    async fn logout(&self, token: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<String>,
    #[serde(rename = "resetTime")]
    reset_time: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct HttpAdminApi {
    base: Url,
    client: Client,
}

impl HttpAdminApi {
    /// # Errors
    /// Returns `ClientError::Config` for an unusable base URL and
    /// `ClientError::Network` if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url)
            .map_err(|err| ClientError::Config(format!("invalid API base URL: {err}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { base, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path)
            .map_err(|err| ClientError::Config(format!("invalid endpoint {path}: {err}")))
    }
}

async fn error_from(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let payload = response.json::<ErrorPayload>().await.ok();
    ClientError::Http {
        status,
        message: payload.as_ref().and_then(|p| p.error.clone()),
        reset_time: payload.and_then(|p| p.reset_time),
    }
}

async fn grant_from(response: Response) -> Result<TokenGrant, ClientError> {
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }
    response
        .json::<TokenGrant>()
        .await
        .map_err(|err| ClientError::Parse(err.to_string()))
}

#[async_trait]
impl AdminApi for HttpAdminApi {
    async fn login(
        &self,
        password: &str,
        recaptcha_token: Option<&str>,
    ) -> Result<TokenGrant, ClientError> {
        let response = self
            .client
            .post(self.endpoint("admin/login")?)
            .json(&json!({ "password": password, "recaptchaToken": recaptcha_token }))
            .send()
            .await?;
        grant_from(response).await
    }

    async fn refresh(&self, token: &str) -> Result<TokenGrant, ClientError> {
        let response = self
            .client
            .post(self.endpoint("admin/refresh-token")?)
            .bearer_auth(token)
            .send()
            .await?;
        grant_from(response).await
    }

    async fn logout(&self, token: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.endpoint("admin/logout")?)
            .bearer_auth(token)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from(response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_base_path() -> Result<(), ClientError> {
        let api = HttpAdminApi::new("https://folio.dev/api")?;
        assert_eq!(
            api.endpoint("admin/login")?.as_str(),
            "https://folio.dev/api/admin/login"
        );

        let api = HttpAdminApi::new("http://localhost:8080")?;
        assert_eq!(
            api.endpoint("admin/logout")?.as_str(),
            "http://localhost:8080/admin/logout"
        );
        Ok(())
    }

    #[test]
    fn invalid_base_is_config_error() {
        assert!(matches!(
            HttpAdminApi::new("::not a url"),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn token_grant_parses_server_payload() -> anyhow::Result<()> {
        let grant: TokenGrant = serde_json::from_str(
            r#"{"token":"abc","expiresIn":900,"expiresAt":"2026-03-01T10:15:00.000Z"}"#,
        )?;
        assert_eq!(grant.expires_in, 900);
        assert_eq!(grant.expires_at.to_rfc3339(), "2026-03-01T10:15:00+00:00");
        Ok(())
    }

    #[test]
    fn error_payload_parses_reset_time() -> anyhow::Result<()> {
        let payload: ErrorPayload = serde_json::from_str(
            r#"{"error":"Too many login attempts","resetTime":"2026-03-01T10:15:00.000Z"}"#,
        )?;
        assert!(payload.reset_time.is_some());
        assert_eq!(payload.error.as_deref(), Some("Too many login attempts"));
        Ok(())
    }
}
