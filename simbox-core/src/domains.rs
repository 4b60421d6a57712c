//! Remote host discovery
//!
//! The domain endpoint hands out one terminal host, any number of preview
//! hosts, and the token terminals authenticate with.

use std::sync::Arc;
use std::time::Duration;

use simbox_utils::{Result, SimboxError};
use tracing::{info, warn};
use url::Url;

use crate::config::DomainsConfig;
use crate::remote::RemoteStoreClient;

/// Resolved addressing for the remote services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub terminal_host: String,
    pub preview_hosts: Vec<String>,
    pub token: String,
}

impl Endpoints {
    /// `ws://{terminal_host}/ws?Authorization={token}`
    pub fn terminal_url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("ws://{}/ws", self.terminal_host)).map_err(|e| {
            SimboxError::DomainResolution(format!(
                "terminal host '{}' is not addressable: {}",
                self.terminal_host, e
            ))
        })?;
        url.query_pairs_mut().append_pair("Authorization", &self.token);
        Ok(url)
    }
}

/// Fetches and interprets the domain list
pub struct DomainResolver {
    remote: Arc<RemoteStoreClient>,
}

impl DomainResolver {
    pub fn new(remote: Arc<RemoteStoreClient>) -> Self {
        Self { remote }
    }

    /// Single resolution attempt
    pub async fn resolve(&self) -> Result<Endpoints> {
        let response = self.remote.fetch_domains().await?;
        if !response.success {
            return Err(SimboxError::DomainResolution(response.message));
        }

        let data = response
            .data
            .ok_or_else(|| SimboxError::DomainResolution("response carries no data".into()))?;

        let mut domains = data.domains.into_iter();
        let terminal_host = domains
            .next()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| SimboxError::DomainResolution("no terminal host assigned".into()))?;

        Ok(Endpoints {
            terminal_host,
            preview_hosts: domains.collect(),
            token: data.token,
        })
    }

    /// Resolve, retrying at a fixed interval until success or `max_attempts`
    pub async fn resolve_with_retry(&self, config: &DomainsConfig) -> Result<Endpoints> {
        let interval = Duration::from_secs(config.retry_interval_secs);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.resolve().await {
                Ok(endpoints) => {
                    info!(
                        terminal_host = %endpoints.terminal_host,
                        previews = endpoints.preview_hosts.len(),
                        attempt,
                        "Resolved remote domains"
                    );
                    return Ok(endpoints);
                }
                Err(e) => {
                    if config.max_attempts.is_some_and(|max| attempt >= max) {
                        warn!(attempt, error = %e, "Giving up on domain resolution");
                        return Err(e);
                    }
                    warn!(attempt, error = %e, "Domain resolution failed, retrying in {:?}", interval);
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
}
