//! Origin gate.
//!
//! Advisory only: a request is never rejected here. The gate decides whether
//! the browser is told it may read the response cross-origin.
//!
//! | Environment | Allowed origins |
//! |---|---|
//! | production | `http(s)://<anything>.nav.no[:port]` |
//! | otherwise | `http://localhost:3000` |
//!
//! No `Origin` header means a same-origin request; nothing is attached.

use std::sync::LazyLock;

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_ORIGIN, HeaderMap, HeaderValue,
};
use regex::Regex;

use crate::config::RuntimeEnv;

const LOCAL_ORIGIN: &str = "http://localhost:3000";
const ALLOWED_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept";

static NAV_ORIGIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[A-Za-z0-9.-]+\.nav\.no(:\d+)?$").expect("static origin pattern")
});

#[derive(Clone, Debug)]
pub enum CorsPolicy {
    /// Any subdomain of nav.no.
    NavDomain,
    /// Exactly one origin.
    Exact(String),
}

impl CorsPolicy {
    pub fn for_env(env: RuntimeEnv) -> Self {
        match env {
            RuntimeEnv::Production => Self::NavDomain,
            RuntimeEnv::Development => Self::Exact(LOCAL_ORIGIN.to_owned()),
        }
    }

    pub fn allows(&self, origin: &str) -> bool {
        match self {
            Self::NavDomain => NAV_ORIGIN.is_match(origin),
            Self::Exact(allowed) => origin == allowed,
        }
    }

    /// Attaches the CORS headers to `headers` when `origin` is allowed.
    pub fn apply(&self, origin: Option<&str>, headers: &mut HeaderMap) {
        let Some(origin) = origin.filter(|o| self.allows(o)) else {
            return;
        };
        let Ok(value) = HeaderValue::try_from(origin) else {
            return;
        };
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS));
        headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    }
}
