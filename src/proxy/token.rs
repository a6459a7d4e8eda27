//! Service-token acquisition for proxied calls.
//!
//! The caller's identity token is exchanged (RFC 8693) for a short-lived
//! token whose audience is the target service.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TokenExchangeConfig;
use crate::error::AppError;

const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const SUBJECT_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:jwt";

#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchanges `subject_token` for an access token scoped to `audience`.
    async fn exchange(&self, subject_token: &str, audience: &str) -> Result<String, AppError>;
}

pub struct OAuthTokenExchange {
    http: reqwest::Client,
    config: TokenExchangeConfig,
}

#[derive(Serialize)]
struct ExchangeForm<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    subject_token_type: &'static str,
    subject_token: &'a str,
    audience: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl OAuthTokenExchange {
    pub fn new(config: TokenExchangeConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl TokenExchange for OAuthTokenExchange {
    async fn exchange(&self, subject_token: &str, audience: &str) -> Result<String, AppError> {
        let form = ExchangeForm {
            grant_type: GRANT_TYPE,
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            subject_token_type: SUBJECT_TOKEN_TYPE,
            subject_token,
            audience,
        };

        let res = self
            .http
            .post(&self.config.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(AppError::upstream)?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_else(|e| format!("<unreadable body: {e}>"));
            return Err(AppError::UpstreamUnavailable(format!(
                "token exchange responded {status}: {body}"
            )));
        }

        let token: TokenResponse = res.json().await.map_err(AppError::upstream)?;
        debug!(%audience, "service token acquired");
        Ok(token.access_token)
    }
}
