//! Client settings

use std::sync::Arc;
use std::time::Duration;

use fetchcraft_core::NodeId;
use fetchcraft_crypto::{KeyAlgorithm, KeyVersion, SigningKeypair};

use crate::{ClientError, Result};

/// How long a session established now stays valid
pub const DEFAULT_ESTABLISHMENT_TTL: Duration = Duration::from_secs(100);

/// Registry endpoint used when none is configured
pub const DEFAULT_REGISTER_URL: &str = "http://localhost:9020";

/// Period of the background pool refresh
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on one registry or gateway round trip
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable client configuration, built with [`ClientSettingsBuilder`]
#[derive(Debug, Clone)]
pub struct ClientSettings {
    client_id: NodeId,
    signing_keypair: Arc<SigningKeypair>,
    key_version: KeyVersion,
    key_algorithm: KeyAlgorithm,
    establishment_ttl: Duration,
    register_url: String,
    refresh_interval: Duration,
    request_timeout: Duration,
}

impl ClientSettings {
    pub fn builder() -> ClientSettingsBuilder {
        ClientSettingsBuilder::default()
    }

    pub fn client_id(&self) -> &NodeId {
        &self.client_id
    }

    pub fn signing_keypair(&self) -> &Arc<SigningKeypair> {
        &self.signing_keypair
    }

    pub fn key_version(&self) -> KeyVersion {
        self.key_version
    }

    pub fn key_algorithm(&self) -> KeyAlgorithm {
        self.key_algorithm
    }

    pub fn establishment_ttl(&self) -> Duration {
        self.establishment_ttl
    }

    pub fn register_url(&self) -> &str {
        &self.register_url
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// Builder for [`ClientSettings`].
///
/// The client id and signing keypair are required; everything else has a
/// default.
#[derive(Debug, Default)]
pub struct ClientSettingsBuilder {
    client_id: Option<NodeId>,
    signing_keypair: Option<Arc<SigningKeypair>>,
    key_version: Option<KeyVersion>,
    key_algorithm: Option<KeyAlgorithm>,
    establishment_ttl: Option<Duration>,
    register_url: Option<String>,
    refresh_interval: Option<Duration>,
    request_timeout: Option<Duration>,
}

impl ClientSettingsBuilder {
    pub fn client_id(mut self, id: NodeId) -> Self {
        self.client_id = Some(id);
        self
    }

    pub fn signing_keypair(mut self, keypair: SigningKeypair) -> Self {
        self.signing_keypair = Some(Arc::new(keypair));
        self
    }

    pub fn key_version(mut self, version: KeyVersion) -> Self {
        self.key_version = Some(version);
        self
    }

    pub fn key_algorithm(mut self, algorithm: KeyAlgorithm) -> Self {
        self.key_algorithm = Some(algorithm);
        self
    }

    pub fn establishment_ttl(mut self, ttl: Duration) -> Self {
        self.establishment_ttl = Some(ttl);
        self
    }

    pub fn register_url(mut self, url: impl Into<String>) -> Self {
        self.register_url = Some(url.into());
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<ClientSettings> {
        let client_id = self
            .client_id
            .ok_or_else(|| ClientError::MissingConfig("client id".to_string()))?;
        let signing_keypair = self
            .signing_keypair
            .ok_or_else(|| ClientError::MissingConfig("signing keypair".to_string()))?;

        let key_version = self.key_version.unwrap_or_default();
        if !key_version.is_valid() {
            return Err(ClientError::InvalidConfig(format!(
                "key version {key_version} (versions start at 1)"
            )));
        }

        let establishment_ttl = self.establishment_ttl.unwrap_or(DEFAULT_ESTABLISHMENT_TTL);
        if establishment_ttl.as_secs() == 0 {
            return Err(ClientError::InvalidConfig(
                "establishment TTL must be at least one second".to_string(),
            ));
        }
        let refresh_interval = self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL);
        if refresh_interval.is_zero() {
            return Err(ClientError::InvalidConfig(
                "refresh interval must be non-zero".to_string(),
            ));
        }
        let register_url = self
            .register_url
            .unwrap_or_else(|| DEFAULT_REGISTER_URL.to_string());
        if register_url.trim().is_empty() {
            return Err(ClientError::InvalidConfig("empty register URL".to_string()));
        }

        Ok(ClientSettings {
            client_id,
            signing_keypair,
            key_version,
            key_algorithm: self.key_algorithm.unwrap_or_default(),
            establishment_ttl,
            register_url,
            refresh_interval,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        })
    }
}
