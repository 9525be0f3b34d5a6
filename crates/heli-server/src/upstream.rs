//! Builds the active upstream adapter (and its token store) from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;

use heli_upstream::{
    AdsbFiAdapter, ClientCredentials, HttpSettings, OpenSkyAdapter, OpenSkyAuth, ProviderKind,
    RetryPolicy, TokenStore, UpstreamAdapter,
};

use crate::config::{Config, OpenSkyAuthMode};

pub fn http_settings(config: &Config) -> HttpSettings {
    HttpSettings {
        timeout: config.upstream_timeout,
        retry: RetryPolicy {
            max_retries: config.retry_attempts,
            base_delay: config.retry_base,
            ..RetryPolicy::default()
        },
        ..HttpSettings::default()
    }
}

/// Resolve OpenSky credentials. Missing credentials for an explicitly chosen
/// mode are deferred to the first fetch instead of failing startup.
pub fn opensky_auth(config: &Config, client: Client) -> OpenSkyAuth {
    let has_oauth = config.opensky_client_id.is_some() && config.opensky_client_secret.is_some();
    let has_basic = config.opensky_username.is_some();

    let mode = match config.opensky_auth {
        OpenSkyAuthMode::Auto if has_oauth => OpenSkyAuthMode::OAuth,
        OpenSkyAuthMode::Auto if has_basic => OpenSkyAuthMode::Basic,
        OpenSkyAuthMode::Auto => OpenSkyAuthMode::Anonymous,
        explicit => explicit,
    };

    match mode {
        OpenSkyAuthMode::OAuth => match (&config.opensky_client_id, &config.opensky_client_secret) {
            (Some(client_id), Some(client_secret)) => {
                OpenSkyAuth::OAuth(Arc::new(TokenStore::client_credentials(
                    ClientCredentials {
                        token_url: config.opensky_token_url.clone(),
                        client_id: client_id.clone(),
                        client_secret: client_secret.clone(),
                        scope: None,
                    },
                    client,
                )))
            }
            _ => OpenSkyAuth::Unconfigured(
                "OPENSKY_AUTH=oauth requires OPENSKY_CLIENT_ID and OPENSKY_CLIENT_SECRET".to_string(),
            ),
        },
        OpenSkyAuthMode::Basic => match &config.opensky_username {
            Some(username) => OpenSkyAuth::Basic {
                username: username.clone(),
                password: config.opensky_password.clone().unwrap_or_default(),
            },
            None => OpenSkyAuth::Unconfigured(
                "OPENSKY_AUTH=basic requires OPENSKY_USERNAME".to_string(),
            ),
        },
        OpenSkyAuthMode::Anonymous | OpenSkyAuthMode::Auto => OpenSkyAuth::Anonymous,
    }
}

pub fn build_adapter(config: &Config) -> Result<Arc<dyn UpstreamAdapter>> {
    let http = http_settings(config);
    let policy = config.effective_policy();

    let adapter: Arc<dyn UpstreamAdapter> = match config.provider {
        ProviderKind::OpenSky => {
            let token_client = http
                .build_client()
                .context("failed to build OpenSky token client")?;
            let auth = opensky_auth(config, token_client);
            tracing::info!("Using OpenSky upstream ({} auth)", auth.mode());
            Arc::new(
                OpenSkyAdapter::new(config.opensky_api_url.clone(), auth, &http)
                    .context("failed to build OpenSky adapter")?
                    .with_policy(policy),
            )
        }
        ProviderKind::AdsbFi => {
            tracing::info!("Using adsb.fi upstream");
            Arc::new(
                AdsbFiAdapter::new(config.adsbfi_api_url.clone(), &http)
                    .context("failed to build adsb.fi adapter")?
                    .with_policy(policy),
            )
        }
    };
    Ok(adapter)
}
