//! reCAPTCHA v3 style bot check.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, instrument};

use crate::APP_USER_AGENT;

pub const DEFAULT_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";
pub const DEFAULT_MIN_SCORE: f64 = 0.5;

#[async_trait]
pub trait BotVerifier: Send + Sync {
    /// Whether the check runs at all. A disabled verifier passes every token.
    fn enabled(&self) -> bool;

    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> bool;
}

/// Verifier used when no secret is configured.
#[derive(Clone, Debug)]
pub struct DisabledBotVerifier;

#[async_trait]
impl BotVerifier for DisabledBotVerifier {
    fn enabled(&self) -> bool {
        false
    }

    async fn verify(&self, _token: &str, _remote_ip: Option<&str>) -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SiteVerifyResponse {
    #[serde(default)]
    success: bool,
    score: Option<f64>,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// A response passes only when it succeeded and scored at least `min_score`.
/// A missing score counts as zero.
pub(crate) fn evaluate(response: &SiteVerifyResponse, min_score: f64) -> bool {
    response.success && response.score.unwrap_or(0.0) >= min_score
}

#[derive(Debug)]
pub struct RecaptchaVerifier {
    secret: SecretString,
    verify_url: String,
    min_score: f64,
    client: Client,
}

impl RecaptchaVerifier {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(secret: SecretString) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            secret,
            verify_url: DEFAULT_VERIFY_URL.to_string(),
            min_score: DEFAULT_MIN_SCORE,
            client,
        })
    }

    #[must_use]
    pub fn with_verify_url(mut self, verify_url: String) -> Self {
        self.verify_url = verify_url;
        self
    }

    #[must_use]
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }
}

#[async_trait]
impl BotVerifier for RecaptchaVerifier {
    fn enabled(&self) -> bool {
        !self.secret.expose_secret().is_empty()
    }

    #[instrument(skip_all)]
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> bool {
        if !self.enabled() {
            return true;
        }

        let mut form = vec![
            ("secret", self.secret.expose_secret().to_string()),
            ("response", token.to_string()),
        ];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip.to_string()));
        }

        let response = match self.client.post(&self.verify_url).form(&form).send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Error calling bot-check endpoint: {:?}", e);
                return false;
            }
        };

        if !response.status().is_success() {
            error!("Bot-check endpoint returned {}", response.status());
            return false;
        }

        match response.json::<SiteVerifyResponse>().await {
            Ok(body) => {
                let passed = evaluate(&body, self.min_score);
                if !passed {
                    debug!(
                        score = ?body.score,
                        errors = ?body.error_codes,
                        "bot-check rejected token"
                    );
                }
                passed
            }
            Err(e) => {
                error!("Error decoding bot-check response: {:?}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(success: bool, score: Option<f64>) -> SiteVerifyResponse {
        SiteVerifyResponse {
            success,
            score,
            error_codes: Vec::new(),
        }
    }

    #[test]
    fn evaluate_requires_success_and_score() {
        assert!(evaluate(&response(true, Some(0.9)), DEFAULT_MIN_SCORE));
        assert!(evaluate(&response(true, Some(0.5)), DEFAULT_MIN_SCORE));
        assert!(!evaluate(&response(true, Some(0.49)), DEFAULT_MIN_SCORE));
        assert!(!evaluate(&response(false, Some(0.9)), DEFAULT_MIN_SCORE));
        assert!(!evaluate(&response(true, None), DEFAULT_MIN_SCORE));
    }

    #[test]
    fn site_verify_response_parses_error_codes() -> anyhow::Result<()> {
        let body: SiteVerifyResponse = serde_json::from_str(
            r#"{"success": false, "error-codes": ["invalid-input-response"]}"#,
        )?;
        assert!(!body.success);
        assert_eq!(body.error_codes, vec!["invalid-input-response".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn disabled_verifier_passes() {
        assert!(!DisabledBotVerifier.enabled());
        assert!(DisabledBotVerifier.verify("anything", None).await);
    }

    #[tokio::test]
    async fn empty_secret_disables_check() -> anyhow::Result<()> {
        let verifier = RecaptchaVerifier::new(SecretString::from(String::new()))?;
        assert!(!verifier.enabled());
        assert!(verifier.verify("token", None).await);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_closed() -> anyhow::Result<()> {
        let verifier = RecaptchaVerifier::new(SecretString::from("secret".to_string()))?
            .with_verify_url("http://127.0.0.1:9/siteverify".to_string());
        assert!(verifier.enabled());
        assert!(!verifier.verify("token", Some("10.0.0.1")).await);
        Ok(())
    }
}
