//! Application state and route table.
//!
//! Everything a handler needs lives in one [`AppState`], built from the
//! [`Config`] at startup and shared behind an `Arc`. There is no global state.

use std::sync::Arc;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::content::{self, ContentBackend, ContentGateway, ContentType, SanityClient};
use crate::error::ConfigError;
use crate::health;
use crate::identity;
use crate::method::Method;
use crate::middleware::cors::CorsPolicy;
use crate::proxy::token::{OAuthTokenExchange, TokenExchange};
use crate::proxy::{Proxy, ProxyRule};
use crate::request::Request;
use crate::router::Router;

/// Every route lives under this path.
pub const BASE_PATH: &str = "/person/pb-kontakt-oss-api";

pub struct AppState {
    pub identity_cookie: String,
    pub cors: CorsPolicy,
    pub content: ContentGateway,
    pub proxy: Proxy,
    pub enheter: ProxyRule,
    pub mottak: ProxyRule,
}

impl AppState {
    /// Wires the production upstream clients.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let backend = SanityClient::new(config.sanity.clone(), config.upstream_timeout)?;
        let tokens = OAuthTokenExchange::new(config.token_exchange.clone(), config.upstream_timeout)?;
        Self::with_backends(config, Arc::new(backend), Arc::new(tokens))
    }

    /// Wires caller-supplied upstream clients around the configured rules
    /// and cache.
    pub fn with_backends(
        config: &Config,
        backend: Arc<dyn ContentBackend>,
        tokens: Arc<dyn TokenExchange>,
    ) -> Result<Self, ConfigError> {
        let cache = Arc::new(TtlCache::new(config.cache_ttl));
        Ok(Self {
            identity_cookie: config.identity_cookie.clone(),
            cors: CorsPolicy::for_env(config.env),
            content: ContentGateway::new(backend, cache),
            proxy: Proxy::new(tokens, config.identity_cookie.clone(), config.upstream_timeout)?,
            enheter: ProxyRule::enheter(BASE_PATH, config)?,
            mottak: ProxyRule::mottak(BASE_PATH, config)?,
        })
    }
}

fn path(suffix: &str) -> String {
    format!("{BASE_PATH}{suffix}")
}

/// Builds the full route table over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .cors(state.cors.clone())
        .on(Method::Get, &path("/internal/isAlive"), health::liveness)
        .on(Method::Get, &path("/internal/isReady"), health::readiness);

    let s = Arc::clone(&state);
    router = router.on(Method::Get, &path("/fodselsnr"), move |req: Request| {
        let s = Arc::clone(&s);
        async move { identity::fodselsnr(req, &s.identity_cookie).await }
    });

    for kind in ContentType::ALL {
        let s = Arc::clone(&state);
        router = router.on(Method::Get, &path(&format!("/{kind}")), move |_req: Request| {
            let s = Arc::clone(&s);
            async move { content::list(&s.content, kind).await }
        });
    }

    let s = Arc::clone(&state);
    router = router.on(Method::Get, &path("/update-permissions"), move |_req: Request| {
        let s = Arc::clone(&s);
        async move { content::update_permissions(&s.content).await }
    });

    // Called by the content backend's webhook on every publish.
    let s = Arc::clone(&state);
    router = router.on(Method::Post, &path("/clear-cache"), move |_req: Request| {
        let s = Arc::clone(&s);
        async move { content::clear_cache(&s.content) }
    });

    let s = Arc::clone(&state);
    router = router.mount(state.enheter.prefix(), move |req: Request| {
        let s = Arc::clone(&s);
        async move { s.proxy.forward(&s.enheter, req).await }
    });

    let s = Arc::clone(&state);
    router.mount(state.mottak.prefix(), move |req: Request| {
        let s = Arc::clone(&s);
        async move { s.proxy.forward(&s.mottak, req).await }
    })
}
