//! Wire messages exchanged with gateways

use serde::{Deserialize, Serialize};

use fetchcraft_core::{hex32, ContentId, NodeId, SubCidOffer};

/// Protocol version spoken by this client
pub const CURRENT_PROTOCOL_VERSION: i32 = 1;

/// Message type discriminants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    EstablishmentRequest,
    EstablishmentResponse,
    StandardDiscoveryRequest,
    StandardDiscoveryResponse,
}

impl MessageType {
    pub fn code(self) -> i32 {
        match self {
            Self::EstablishmentRequest => 0,
            Self::EstablishmentResponse => 1,
            Self::StandardDiscoveryRequest => 2,
            Self::StandardDiscoveryResponse => 3,
        }
    }
}

impl TryFrom<i32> for MessageType {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::EstablishmentRequest),
            1 => Ok(Self::EstablishmentResponse),
            2 => Ok(Self::StandardDiscoveryRequest),
            3 => Ok(Self::StandardDiscoveryResponse),
            other => Err(other),
        }
    }
}

/// Protocol versions this client speaks.
///
/// Computed once and carried by the client instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub version: i32,
    /// Supported versions, most desirable first
    pub supported: Vec<i32>,
}

impl Default for ProtocolInfo {
    fn default() -> Self {
        Self {
            version: CURRENT_PROTOCOL_VERSION,
            supported: vec![CURRENT_PROTOCOL_VERSION],
        }
    }
}

impl ProtocolInfo {
    pub fn is_supported(&self, version: i32) -> bool {
        self.supported.contains(&version)
    }

    pub fn header(&self, message_type: MessageType, node_id: NodeId) -> MessageHeader {
        MessageHeader {
            protocol_version: self.version,
            protocol_supported: self.supported.clone(),
            message_type: message_type.code(),
            node_id,
        }
    }
}

/// Fields common to every message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub protocol_version: i32,
    pub protocol_supported: Vec<i32>,
    pub message_type: i32,
    /// Sender's node id
    pub node_id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstablishmentRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    #[serde(with = "hex32")]
    pub challenge: [u8; 32],
    /// Unix seconds after which the session lapses
    pub ttl: i64,
    #[serde(default)]
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstablishmentResponse {
    #[serde(flatten)]
    pub header: MessageHeader,
    #[serde(with = "hex32")]
    pub challenge: [u8; 32],
    #[serde(default)]
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub piece_cid: ContentId,
    pub nonce: i64,
    pub ttl: i64,
    #[serde(default)]
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    #[serde(flatten)]
    pub header: MessageHeader,
    pub piece_cid: ContentId,
    pub nonce: i64,
    pub found: bool,
    #[serde(default)]
    pub offers: Vec<SubCidOffer>,
    #[serde(default)]
    pub signature: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_codes() {
        for (ty, code) in [
            (MessageType::EstablishmentRequest, 0),
            (MessageType::EstablishmentResponse, 1),
            (MessageType::StandardDiscoveryRequest, 2),
            (MessageType::StandardDiscoveryResponse, 3),
        ] {
            assert_eq!(ty.code(), code);
            assert_eq!(MessageType::try_from(code), Ok(ty));
        }
        assert_eq!(MessageType::try_from(4), Err(4));
    }

    #[test]
    fn test_default_protocol_info() {
        let info = ProtocolInfo::default();
        assert_eq!(info.version, 1);
        assert_eq!(info.supported, vec![1]);
        assert!(info.is_supported(1));
        assert!(!info.is_supported(2));
    }

    #[test]
    fn test_header_is_flattened() {
        let request = EstablishmentRequest {
            header: ProtocolInfo::default()
                .header(MessageType::EstablishmentRequest, NodeId::from_bytes([1; 32])),
            challenge: [2; 32],
            ttl: 1_700_000_100,
            signature: String::new(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["message_type"], 0);
        assert_eq!(json["protocol_supported"], serde_json::json!([1]));
        assert_eq!(json["node_id"], "01".repeat(32));
        assert_eq!(json["challenge"], "02".repeat(32));
        assert!(json.get("header").is_none());
    }

    #[test]
    fn test_discovery_response_without_offers() {
        let json = serde_json::json!({
            "protocol_version": 1,
            "protocol_supported": [1],
            "message_type": 3,
            "node_id": "aa".repeat(32),
            "piece_cid": "bb".repeat(32),
            "nonce": 7,
            "found": false,
            "signature": "00",
        });
        let response: DiscoveryResponse = serde_json::from_value(json).unwrap();
        assert!(!response.found);
        assert!(response.offers.is_empty());
    }
}
