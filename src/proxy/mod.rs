//! Reverse proxy for the two authenticated backend services.
//!
//! A [`ProxyRule`] maps an inbound path prefix to an upstream base URL. The
//! prefix is stripped; everything after it, the query string, the method and
//! the body are forwarded untouched. Rules are built once at startup.
//!
//! ```text
//! /person/pb-kontakt-oss-api/enheter/123?x=1  →  $ENHETERRS_URL/123?x=1
//! ```

pub mod token;

use std::sync::Arc;
use std::time::Duration;

use http::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Config, UpstreamConfig};
use crate::error::{AppError, ConfigError};
use crate::identity::IdentityError;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

use self::token::TokenExchange;

const CONSUMER_ID: HeaderName = HeaderName::from_static("nav-consumer-id");
const CALL_ID: HeaderName = HeaderName::from_static("nav-call-id");
const API_KEY: HeaderName = HeaderName::from_static("x-nav-apikey");

/// A prefix-to-upstream forwarding rule.
#[derive(Clone, Debug)]
pub struct ProxyRule {
    name: &'static str,
    prefix: String,
    upstream: String,
    headers: HeaderMap,
    /// When set, a service token for this audience is obtained before
    /// forwarding and sent as the bearer token.
    exchange_audience: Option<String>,
}

impl ProxyRule {
    pub fn new(name: &'static str, prefix: &str, upstream: &str) -> Self {
        Self {
            name,
            prefix: prefix.trim_end_matches('/').to_owned(),
            upstream: upstream.trim_end_matches('/').to_owned(),
            headers: HeaderMap::new(),
            exchange_audience: None,
        }
    }

    /// Adds a header sent on every forwarded request.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_token_exchange(mut self, audience: impl Into<String>) -> Self {
        self.exchange_audience = Some(audience.into());
        self
    }

    /// Rule A: the enhet lookup service.
    pub fn enheter(base_path: &str, config: &Config) -> Result<Self, ConfigError> {
        Self::nav_service("enheter", base_path, &config.enheter, "ENHETER_API_KEY", &config.consumer_id)
    }

    /// Rule B: the feedback intake service, behind token exchange.
    pub fn mottak(base_path: &str, config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::nav_service("mottak", base_path, &config.mottak, "MOTTAK_API_KEY", &config.consumer_id)?
            .with_token_exchange(config.token_exchange.audience.clone()))
    }

    fn nav_service(
        name: &'static str,
        base_path: &str,
        upstream: &UpstreamConfig,
        api_key_var: &'static str,
        consumer_id: &str,
    ) -> Result<Self, ConfigError> {
        let invalid = |name: &'static str| {
            move |e: http::header::InvalidHeaderValue| ConfigError::Invalid { name, reason: e.to_string() }
        };

        let mut rule = Self::new(name, &format!("{base_path}/{name}"), &upstream.base_url)
            .with_header(CONSUMER_ID, HeaderValue::try_from(consumer_id).map_err(invalid("NAV_CONSUMER_ID"))?);
        if let Some(key) = &upstream.api_key {
            let mut value = HeaderValue::try_from(key.as_str()).map_err(invalid(api_key_var))?;
            value.set_sensitive(true);
            rule = rule.with_header(API_KEY, value);
        }
        Ok(rule)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Upstream URL for an inbound path, or `None` when the path is not
    /// under this rule's prefix.
    pub fn rewrite(&self, path: &str, query: Option<&str>) -> Option<String> {
        let rest = path.strip_prefix(&self.prefix)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        let mut url = format!("{}{rest}", self.upstream);
        if let Some(q) = query {
            url.push('?');
            url.push_str(q);
        }
        Some(url)
    }
}

/// Forwards requests according to a [`ProxyRule`].
pub struct Proxy {
    http: reqwest::Client,
    tokens: Arc<dyn TokenExchange>,
    identity_cookie: String,
}

impl Proxy {
    pub fn new(
        tokens: Arc<dyn TokenExchange>,
        identity_cookie: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        // Redirects go back to the caller untouched.
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { http, tokens, identity_cookie: identity_cookie.into() })
    }

    pub async fn forward(&self, rule: &ProxyRule, req: Request) -> Result<Response, AppError> {
        let Some(url) = rule.rewrite(req.path(), req.query()) else {
            return Ok(Response::status(Status::NotFound));
        };

        let mut headers = forwardable(req.headers());
        for (name, value) in &rule.headers {
            headers.insert(name.clone(), value.clone());
        }
        if !headers.contains_key(CALL_ID) {
            if let Ok(id) = HeaderValue::try_from(Uuid::new_v4().to_string()) {
                headers.insert(CALL_ID, id);
            }
        }

        if let Some(audience) = &rule.exchange_audience {
            let subject_token = req
                .cookie(&self.identity_cookie)
                .ok_or_else(|| IdentityError::MissingCookie(self.identity_cookie.clone()))?;
            let token = self.tokens.exchange(subject_token, audience).await?;
            let mut bearer = HeaderValue::try_from(format!("Bearer {token}"))
                .map_err(|_| AppError::upstream("token endpoint returned an unusable token"))?;
            bearer.set_sensitive(true);
            headers.insert(AUTHORIZATION, bearer);
        }

        info!(rule = rule.name, method = %req.method(), %url, "forwarding");

        let upstream = self
            .http
            .request(req.method().clone(), &url)
            .headers(headers)
            .body(req.body().clone())
            .send()
            .await
            .map_err(|e| {
                warn!(rule = rule.name, %url, "upstream request failed: {e}");
                AppError::upstream(e)
            })?;

        let status = upstream.status();
        let headers = forwardable(upstream.headers());
        let body = upstream.bytes().await.map_err(AppError::upstream)?;
        Ok(Response::from_upstream(status, headers, body))
    }
}

/// Copies `headers`, dropping hop-by-hop headers and those the HTTP layer
/// recomputes for the next leg.
fn forwardable(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// RFC 9110 §7.6.1 connection-specific headers, plus `host` and
/// `content-length`.
fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name,
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}
