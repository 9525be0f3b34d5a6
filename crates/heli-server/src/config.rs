//! Server configuration from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use heli_core::{BoundingBox, ClassifierPolicy};
use heli_upstream::{adsbfi, opensky, ProviderKind};

pub const DEFAULT_BBOX: &str = "50.70,51.30,-114.40,-113.70";

/// Upper bound on retries after the first upstream attempt.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// How OpenSky requests authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenSkyAuthMode {
    /// OAuth if client credentials are present, else basic if a username is, else anonymous.
    Auto,
    OAuth,
    Basic,
    Anonymous,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub provider: ProviderKind,
    /// Overrides the provider's default classification policy
    pub classifier_policy: Option<ClassifierPolicy>,
    pub default_bbox: BoundingBox,
    pub cache_ttl: Duration,
    pub cache_precision: u32,
    pub cell_radius_nm: f64,
    pub cache_max_entries: usize,
    pub cache_sweep_interval: Duration,
    pub upstream_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_base: Duration,
    pub opensky_api_url: String,
    pub opensky_token_url: String,
    pub opensky_auth: OpenSkyAuthMode,
    pub opensky_client_id: Option<String>,
    pub opensky_client_secret: Option<String>,
    pub opensky_username: Option<String>,
    pub opensky_password: Option<String>,
    pub adsbfi_api_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 8080,
            provider: ProviderKind::AdsbFi,
            classifier_policy: None,
            default_bbox: default_bbox(),
            cache_ttl: Duration::from_secs(10),
            cache_precision: 1,
            cell_radius_nm: 100.0,
            cache_max_entries: 512,
            cache_sweep_interval: Duration::from_secs(60),
            upstream_timeout: Duration::from_secs(15),
            retry_attempts: 2,
            retry_base: Duration::from_millis(250),
            opensky_api_url: opensky::DEFAULT_API_URL.to_string(),
            opensky_token_url: opensky::DEFAULT_TOKEN_URL.to_string(),
            opensky_auth: OpenSkyAuthMode::Auto,
            opensky_client_id: None,
            opensky_client_secret: None,
            opensky_username: None,
            opensky_password: None,
            adsbfi_api_url: adsbfi::DEFAULT_API_URL.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let provider = match get("HELI_PROVIDER") {
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                tracing::warn!("{}, using {}", err, defaults.provider);
                defaults.provider
            }),
            None => defaults.provider,
        };

        let default_bbox = get("HELI_DEFAULT_BBOX")
            .and_then(|raw| match raw.parse::<BoundingBox>() {
                Ok(bbox) => Some(bbox),
                Err(err) => {
                    tracing::warn!("Ignoring HELI_DEFAULT_BBOX '{}': {}", raw, err);
                    None
                }
            })
            .unwrap_or(defaults.default_bbox);

        Self {
            server_port: parse_var(get("HELI_PORT")).unwrap_or(defaults.server_port),
            provider,
            classifier_policy: get("HELI_CLASSIFIER_POLICY").and_then(|raw| parse_policy(&raw)),
            default_bbox,
            cache_ttl: parse_var(get("HELI_CACHE_TTL_SECS"))
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            cache_precision: parse_var(get("HELI_CACHE_PRECISION")).unwrap_or(defaults.cache_precision),
            cell_radius_nm: parse_var(get("HELI_CELL_RADIUS_NM"))
                .filter(|nm: &f64| nm.is_finite() && *nm > 0.0)
                .unwrap_or(defaults.cell_radius_nm),
            cache_max_entries: parse_var(get("HELI_CACHE_MAX_ENTRIES")).unwrap_or(defaults.cache_max_entries),
            cache_sweep_interval: parse_var(get("HELI_CACHE_SWEEP_SECS"))
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_sweep_interval),
            upstream_timeout: parse_var(get("HELI_UPSTREAM_TIMEOUT_SECS"))
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream_timeout),
            retry_attempts: parse_var(get("HELI_RETRY_ATTEMPTS"))
                .unwrap_or(defaults.retry_attempts)
                .min(MAX_RETRY_ATTEMPTS),
            retry_base: parse_var(get("HELI_RETRY_BASE_MS"))
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base),
            opensky_api_url: get("OPENSKY_API_URL").unwrap_or(defaults.opensky_api_url),
            opensky_token_url: get("OPENSKY_TOKEN_URL").unwrap_or(defaults.opensky_token_url),
            opensky_auth: get("OPENSKY_AUTH")
                .and_then(|raw| parse_auth_mode(&raw))
                .unwrap_or(defaults.opensky_auth),
            opensky_client_id: get("OPENSKY_CLIENT_ID"),
            opensky_client_secret: get("OPENSKY_CLIENT_SECRET"),
            opensky_username: get("OPENSKY_USERNAME"),
            opensky_password: get("OPENSKY_PASSWORD"),
            adsbfi_api_url: get("ADSBFI_API_URL").unwrap_or(defaults.adsbfi_api_url),
        }
    }

    /// Policy in effect: explicit override or the provider's default.
    pub fn effective_policy(&self) -> ClassifierPolicy {
        self.classifier_policy
            .unwrap_or_else(|| self.provider.default_policy())
    }
}

fn default_bbox() -> BoundingBox {
    DEFAULT_BBOX.parse().expect("DEFAULT_BBOX is a valid bounding box")
}

fn parse_var<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|raw| raw.parse().ok())
}

fn parse_policy(raw: &str) -> Option<ClassifierPolicy> {
    match raw.to_ascii_lowercase().as_str() {
        "strict" | "category" => Some(ClassifierPolicy::strict()),
        "full" | "all" => Some(ClassifierPolicy::full()),
        other => {
            tracing::warn!("Unknown HELI_CLASSIFIER_POLICY '{}', using provider default", other);
            None
        }
    }
}

fn parse_auth_mode(raw: &str) -> Option<OpenSkyAuthMode> {
    match raw.to_ascii_lowercase().as_str() {
        "auto" => Some(OpenSkyAuthMode::Auto),
        "oauth" | "oauth2" => Some(OpenSkyAuthMode::OAuth),
        "basic" => Some(OpenSkyAuthMode::Basic),
        "none" | "anonymous" => Some(OpenSkyAuthMode::Anonymous),
        other => {
            tracing::warn!("Unknown OPENSKY_AUTH '{}', using auto", other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.provider, ProviderKind::AdsbFi);
        assert_eq!(config.default_bbox.to_array(), [50.70, 51.30, -114.40, -113.70]);
        assert_eq!(config.cache_ttl, Duration::from_secs(10));
        assert_eq!(config.effective_policy(), ClassifierPolicy::full());
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("HELI_PORT", "9000"),
            ("HELI_PROVIDER", "opensky"),
            ("HELI_CACHE_TTL_SECS", "30"),
            ("HELI_CACHE_PRECISION", "2"),
            ("HELI_DEFAULT_BBOX", "40,41,-75,-74"),
            ("OPENSKY_AUTH", "basic"),
            ("OPENSKY_USERNAME", "pilot"),
        ]);
        assert_eq!(config.server_port, 9000);
        assert_eq!(config.provider, ProviderKind::OpenSky);
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
        assert_eq!(config.cache_precision, 2);
        assert_eq!(config.default_bbox.to_array(), [40.0, 41.0, -75.0, -74.0]);
        assert_eq!(config.opensky_auth, OpenSkyAuthMode::Basic);
        assert_eq!(config.opensky_username.as_deref(), Some("pilot"));
        assert_eq!(config.effective_policy(), ClassifierPolicy::strict());
    }

    #[test]
    fn bad_values_fall_back() {
        let config = config_from(&[
            ("HELI_PORT", "not-a-port"),
            ("HELI_PROVIDER", "flightradar"),
            ("HELI_DEFAULT_BBOX", "91,1,2"),
            ("HELI_CELL_RADIUS_NM", "-4"),
            ("OPENSKY_CLIENT_ID", "   "),
        ]);
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.provider, ProviderKind::AdsbFi);
        assert_eq!(config.default_bbox, default_bbox());
        assert_eq!(config.cell_radius_nm, 100.0);
        assert!(config.opensky_client_id.is_none());
    }

    #[test]
    fn retry_attempts_are_capped() {
        assert_eq!(config_from(&[("HELI_RETRY_ATTEMPTS", "1")]).retry_attempts, 1);
        assert_eq!(config_from(&[("HELI_RETRY_ATTEMPTS", "0")]).retry_attempts, 0);
        assert_eq!(
            config_from(&[("HELI_RETRY_ATTEMPTS", "1000000")]).retry_attempts,
            MAX_RETRY_ATTEMPTS
        );
    }

    #[test]
    fn policy_override() {
        let config = config_from(&[("HELI_PROVIDER", "opensky"), ("HELI_CLASSIFIER_POLICY", "full")]);
        assert_eq!(config.effective_policy(), ClassifierPolicy::full());
    }
}
