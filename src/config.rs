//! Runtime configuration.
//!
//! Resolved once at startup from the environment and injected into the
//! components that need it. Nothing reads environment variables after
//! [`Config::from_env`] returns.
//!
//! In production, secrets are mounted as an env-file by the platform; locally
//! they come from `.env`. Either file is optional and never overrides a
//! variable that is already set.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ConfigError;

const VAULT_ENV_FILE: &str = "/var/run/secrets/nais.io/vault/environment.env";
const LOCAL_ENV_FILE: &str = ".env";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RuntimeEnv {
    Production,
    Development,
}

impl RuntimeEnv {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("production") => Self::Production,
            _ => Self::Development,
        }
    }

    /// Where this environment keeps its secrets.
    pub fn secret_file(self) -> &'static str {
        match self {
            Self::Production => VAULT_ENV_FILE,
            Self::Development => LOCAL_ENV_FILE,
        }
    }
}

/// Content backend (Sanity) coordinates.
#[derive(Clone)]
pub struct SanityConfig {
    pub project_id: String,
    pub dataset: String,
    pub token: String,
    pub api_version: String,
    /// Query API root, `https://<project>.api.sanity.io` unless overridden.
    pub api_host: String,
    /// Management API root.
    pub management_host: String,
}

/// A proxied service.
#[derive(Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

/// OAuth 2.0 token-exchange client used before forwarding to the mottak service.
#[derive(Clone)]
pub struct TokenExchangeConfig {
    pub endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    pub audience: String,
}

#[derive(Clone)]
pub struct Config {
    pub env: RuntimeEnv,
    pub bind_addr: SocketAddr,
    pub sanity: SanityConfig,
    pub enheter: UpstreamConfig,
    pub mottak: UpstreamConfig,
    pub token_exchange: TokenExchangeConfig,
    pub consumer_id: String,
    pub identity_cookie: String,
    pub cache_ttl: Duration,
    pub cache_sweep_interval: Duration,
    pub upstream_timeout: Duration,
}

impl Config {
    /// Loads the environment's secret file, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = RuntimeEnv::parse(std::env::var("APP_ENV").ok().as_deref());
        load_secret_file(Path::new(env.secret_file()));
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let env = RuntimeEnv::parse(vars.optional("APP_ENV").as_deref());
        let bind_addr = vars.parsed("BIND_ADDR", "0.0.0.0:8080")?;

        let project_id = vars.required("SANITY_PROJECT_ID")?;
        let sanity = SanityConfig {
            api_host: vars
                .optional("SANITY_API_HOST")
                .unwrap_or_else(|| format!("https://{project_id}.api.sanity.io")),
            management_host: vars
                .optional("SANITY_MANAGEMENT_HOST")
                .unwrap_or_else(|| "https://api.sanity.io".to_owned()),
            api_version: vars
                .optional("SANITY_API_VERSION")
                .unwrap_or_else(|| "v2021-06-07".to_owned()),
            dataset: vars.required("SANITY_DATASET")?,
            token: vars.required("SANITY_TOKEN")?,
            project_id,
        };

        Ok(Self {
            env,
            bind_addr,
            sanity,
            enheter: UpstreamConfig {
                base_url: vars.url("ENHETERRS_URL")?,
                api_key: vars.optional("ENHETER_API_KEY"),
            },
            mottak: UpstreamConfig {
                base_url: vars.url("TILBAKEMELDINGSMOTTAK_URL")?,
                api_key: vars.optional("MOTTAK_API_KEY"),
            },
            token_exchange: TokenExchangeConfig {
                endpoint: vars.url("TOKEN_ENDPOINT")?,
                client_id: vars.required("TOKEN_CLIENT_ID")?,
                client_secret: vars.required("TOKEN_CLIENT_SECRET")?,
                audience: vars.required("MOTTAK_AUDIENCE")?,
            },
            consumer_id: vars
                .optional("NAV_CONSUMER_ID")
                .unwrap_or_else(|| "pb-kontakt-oss-api".to_owned()),
            identity_cookie: vars
                .optional("IDENTITY_COOKIE")
                .unwrap_or_else(|| "selvbetjening-idtoken".to_owned()),
            cache_ttl: vars.seconds("CACHE_TTL_SECS", "60")?,
            cache_sweep_interval: vars.seconds("CACHE_SWEEP_SECS", "20")?,
            upstream_timeout: vars.seconds("UPSTREAM_TIMEOUT_SECS", "30")?,
        })
    }
}

fn load_secret_file(path: &Path) {
    match dotenvy::from_path(path) {
        Ok(()) => debug!(path = %path.display(), "loaded secret file"),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "failed to load secret file: {e}"),
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn url(&self, name: &'static str) -> Result<String, ConfigError> {
        let raw = self.required(name)?;
        let parsed: http::Uri = raw.parse().map_err(|e: http::uri::InvalidUri| {
            ConfigError::Invalid { name, reason: e.to_string() }
        })?;
        if parsed.scheme().is_none() || parsed.host().is_none() {
            return Err(ConfigError::Invalid {
                name,
                reason: "expected an absolute http(s) URL".to_owned(),
            });
        }
        Ok(raw.trim_end_matches('/').to_owned())
    }

    fn parsed<T>(&self, name: &'static str, default: &str) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.optional(name).unwrap_or_else(|| default.to_owned());
        raw.parse().map_err(|e: T::Err| ConfigError::Invalid { name, reason: e.to_string() })
    }

    /// A whole number of seconds, at least one.
    fn seconds(&self, name: &'static str, default: &str) -> Result<Duration, ConfigError> {
        match self.parsed(name, default)? {
            0 => Err(ConfigError::Invalid { name, reason: "must be at least 1 second".to_owned() }),
            secs => Ok(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_vars() -> std::collections::HashMap<&'static str, String> {
    [
        ("SANITY_PROJECT_ID", "proj"),
        ("SANITY_DATASET", "test"),
        ("SANITY_TOKEN", "sanity-token"),
        ("ENHETERRS_URL", "http://enheter.local/api/"),
        ("TILBAKEMELDINGSMOTTAK_URL", "http://mottak.local"),
        ("TOKEN_ENDPOINT", "http://tokens.local/token"),
        ("TOKEN_CLIENT_ID", "client"),
        ("TOKEN_CLIENT_SECRET", "secret"),
        ("MOTTAK_AUDIENCE", "dev-gcp:team:mottak"),
    ]
    .into_iter()
    .map(|(k, v)| (k, v.to_owned()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_values() {
        let vars = test_vars();
        let cfg = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(cfg.env, RuntimeEnv::Development);
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.sanity.api_host, "https://proj.api.sanity.io");
        assert_eq!(cfg.sanity.api_version, "v2021-06-07");
        assert_eq!(cfg.enheter.base_url, "http://enheter.local/api");
        assert_eq!(cfg.identity_cookie, "selvbetjening-idtoken");
        assert_eq!(cfg.cache_ttl, Duration::from_secs(60));
        assert_eq!(cfg.cache_sweep_interval, Duration::from_secs(20));
        assert!(cfg.enheter.api_key.is_none());
    }

    #[test]
    fn missing_required_value_fails_fast() {
        let mut vars = test_vars();
        vars.remove("SANITY_TOKEN");
        let err = Config::from_lookup(|k| vars.get(k).cloned()).err().unwrap();
        assert!(matches!(err, ConfigError::Missing("SANITY_TOKEN")));
    }

    #[test]
    fn blank_value_counts_as_missing() {
        let mut vars = test_vars();
        vars.insert("TOKEN_CLIENT_ID", "  ".to_owned());
        let err = Config::from_lookup(|k| vars.get(k).cloned()).err().unwrap();
        assert!(matches!(err, ConfigError::Missing("TOKEN_CLIENT_ID")));
    }

    #[test]
    fn relative_upstream_url_is_rejected() {
        let mut vars = test_vars();
        vars.insert("ENHETERRS_URL", "/enheter".to_owned());
        let err = Config::from_lookup(|k| vars.get(k).cloned()).err().unwrap();
        assert!(matches!(err, ConfigError::Invalid { name: "ENHETERRS_URL", .. }));
    }

    #[test]
    fn zero_durations_are_rejected() {
        for name in ["CACHE_TTL_SECS", "CACHE_SWEEP_SECS", "UPSTREAM_TIMEOUT_SECS"] {
            let mut vars = test_vars();
            vars.insert(name, "0".to_owned());
            let err = Config::from_lookup(|k| vars.get(k).cloned()).err().unwrap();
            assert!(matches!(err, ConfigError::Invalid { name: n, .. } if n == name), "{name}");
        }

        let mut vars = test_vars();
        vars.insert("CACHE_SWEEP_SECS", "5".to_owned());
        let cfg = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(cfg.cache_sweep_interval, Duration::from_secs(5));
    }

    #[test]
    fn production_flag_is_exact() {
        let mut vars = test_vars();
        vars.insert("APP_ENV", "production".to_owned());
        let cfg = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(cfg.env, RuntimeEnv::Production);
        assert_eq!(cfg.env.secret_file(), VAULT_ENV_FILE);
    }
}
