//! Registry records for gateways and providers
//!
//! Records are immutable once fetched. A fresh fetch replaces the old record;
//! nothing mutates one in place.

use serde::{Deserialize, Serialize};

use crate::types::PublicKey;
use crate::{CoreError, NodeId};

/// A gateway as published by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRegistration {
    pub node_id: NodeId,
    /// Host (optionally `host:port`) serving the client API
    pub hostname: String,
    pub region_code: String,
    /// ISO 3166-1 alpha-2 country code
    pub country_code: String,
    /// ISO 3166-2 subdivision code
    pub subdivision_code: String,
    /// Hex-encoded ed25519 public key the gateway signs responses with
    pub signing_key: String,
}

impl GatewayRegistration {
    /// Check the record's static shape.
    ///
    /// Host resolvability is checked separately, at connection time.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.hostname.trim().is_empty() {
            return Err(invalid(&self.node_id, "empty hostname"));
        }
        if !is_location_code(&self.region_code) {
            return Err(invalid(&self.node_id, "malformed region code"));
        }
        if !is_country_code(&self.country_code) {
            return Err(invalid(&self.node_id, "malformed country code"));
        }
        if !is_location_code(&self.subdivision_code) {
            return Err(invalid(&self.node_id, "malformed subdivision code"));
        }
        self.signing_key_bytes()?;
        Ok(())
    }

    /// Decode the signing key.
    pub fn signing_key_bytes(&self) -> Result<PublicKey, CoreError> {
        decode_key(&self.node_id, &self.signing_key)
    }
}

/// A content provider as published by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRegistration {
    pub node_id: NodeId,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub region_code: String,
    /// Hex-encoded ed25519 public key the provider signs offers with
    pub signing_key: String,
}

impl ProviderRegistration {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.hostname.trim().is_empty() {
            return Err(invalid(&self.node_id, "empty hostname"));
        }
        self.signing_key_bytes()?;
        Ok(())
    }

    pub fn signing_key_bytes(&self) -> Result<PublicKey, CoreError> {
        decode_key(&self.node_id, &self.signing_key)
    }
}

fn invalid(node_id: &NodeId, reason: &str) -> CoreError {
    CoreError::InvalidRegistration(format!("{node_id}: {reason}"))
}

fn decode_key(node_id: &NodeId, key: &str) -> Result<PublicKey, CoreError> {
    let bytes = hex::decode(key.trim_start_matches("0x"))
        .map_err(|_| invalid(node_id, "signing key is not hex"))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| invalid(node_id, &format!("signing key is {len} bytes, expected 32")))
}

/// Region and subdivision codes: non-empty, ASCII alphanumerics and `-`.
fn is_location_code(code: &str) -> bool {
    !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_country_code(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic())
}
