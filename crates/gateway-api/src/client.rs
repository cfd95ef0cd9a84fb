//! HTTP gateway client

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use fetchcraft_core::{ContentId, GatewayRegistration, NodeId, PublicKey, SubCidOffer};
use fetchcraft_crypto::{sign_message, verified_key_version, KeyVersion, SigningKeypair};

use crate::host::{api_url, validate_host};
use crate::messages::{
    DiscoveryRequest, DiscoveryResponse, EstablishmentRequest, EstablishmentResponse,
    MessageHeader, MessageType, ProtocolInfo,
};
use crate::{GatewayApiError, Result};

/// An established session with one gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySession {
    pub gateway_id: NodeId,
    pub api_url: String,
    /// Gateway's registered signing key, used to verify its responses
    pub signing_key: PublicKey,
    pub challenge: [u8; 32],
    /// Key version the gateway signed the establishment with; later replies
    /// on this session must carry the same version
    pub key_version: KeyVersion,
    /// Unix seconds after which the session must be re-established
    pub expires_at: i64,
}

impl GatewaySession {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Operations the pool manager needs from a gateway.
///
/// Implementations perform at most one network round trip per call and
/// return a recoverable error on any failure.
pub trait GatewayApi: Send + Sync {
    /// Run the establishment handshake with `gateway`
    fn establish<'a>(
        &'a self,
        gateway: &'a GatewayRegistration,
        challenge: [u8; 32],
        ttl: i64,
    ) -> BoxFuture<'a, Result<GatewaySession>>;

    /// Ask an established gateway for offers on `piece_cid`
    fn standard_discovery<'a>(
        &'a self,
        session: &'a GatewaySession,
        piece_cid: &'a ContentId,
        nonce: i64,
        ttl: i64,
    ) -> BoxFuture<'a, Result<Vec<SubCidOffer>>>;
}

/// Gateway client speaking JSON over HTTP
pub struct GatewayClient {
    http: reqwest::Client,
    node_id: NodeId,
    keypair: Arc<SigningKeypair>,
    key_version: KeyVersion,
    protocol: ProtocolInfo,
}

impl GatewayClient {
    /// Create a client that signs requests as `node_id` with `keypair`.
    ///
    /// `timeout` bounds every request end to end.
    pub fn new(
        node_id: NodeId,
        keypair: Arc<SigningKeypair>,
        key_version: KeyVersion,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            node_id,
            keypair,
            key_version,
            protocol: ProtocolInfo::default(),
        })
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn protocol(&self) -> &ProtocolInfo {
        &self.protocol
    }

    /// Establishment handshake: send a signed challenge, expect it back
    /// signed by the gateway's registered key.
    pub async fn establish_session(
        &self,
        gateway: &GatewayRegistration,
        challenge: [u8; 32],
        ttl: i64,
    ) -> Result<GatewaySession> {
        validate_host(&gateway.hostname).await?;
        let signing_key = gateway
            .signing_key_bytes()
            .map_err(|e| GatewayApiError::InvalidHost(e.to_string()))?;
        let url = api_url(&gateway.hostname);

        let mut request = EstablishmentRequest {
            header: self
                .protocol
                .header(MessageType::EstablishmentRequest, self.node_id),
            challenge,
            ttl,
            signature: String::new(),
        };
        request.signature = sign_message(&self.keypair, self.key_version, &request)?;

        let (response, raw): (EstablishmentResponse, Value) = self
            .exchange(&url, &request, MessageType::EstablishmentResponse)
            .await?;
        self.check_header(&response.header, &gateway.node_id)?;
        if response.challenge != challenge {
            return Err(GatewayApiError::ChallengeMismatch);
        }
        let key_version = verified_key_version(&signing_key, &raw, &response.signature)
            .ok_or(GatewayApiError::InvalidSignature)?;

        debug!("Established session with gateway {}", gateway.node_id);
        Ok(GatewaySession {
            gateway_id: gateway.node_id,
            api_url: url,
            signing_key,
            challenge,
            key_version,
            expires_at: ttl,
        })
    }

    /// Standard discovery: ask for offers on `piece_cid`.
    ///
    /// Offers are returned as received; trust checks happen downstream.
    pub async fn discover(
        &self,
        session: &GatewaySession,
        piece_cid: &ContentId,
        nonce: i64,
        ttl: i64,
    ) -> Result<Vec<SubCidOffer>> {
        let mut request = DiscoveryRequest {
            header: self
                .protocol
                .header(MessageType::StandardDiscoveryRequest, self.node_id),
            piece_cid: *piece_cid,
            nonce,
            ttl,
            signature: String::new(),
        };
        request.signature = sign_message(&self.keypair, self.key_version, &request)?;

        let (response, raw): (DiscoveryResponse, Value) = self
            .exchange(
                &session.api_url,
                &request,
                MessageType::StandardDiscoveryResponse,
            )
            .await?;
        self.check_header(&response.header, &session.gateway_id)?;
        if response.nonce != nonce {
            return Err(GatewayApiError::NonceMismatch);
        }
        if response.piece_cid != *piece_cid {
            return Err(GatewayApiError::MalformedResponse(format!(
                "asked for {piece_cid}, gateway answered for {}",
                response.piece_cid
            )));
        }
        let key_version = verified_key_version(&session.signing_key, &raw, &response.signature);
        if key_version != Some(session.key_version) {
            return Err(GatewayApiError::InvalidSignature);
        }

        if !response.found {
            return Ok(Vec::new());
        }
        debug!(
            "Gateway {} returned {} offers for {}",
            session.gateway_id,
            response.offers.len(),
            piece_cid
        );
        Ok(response.offers)
    }

    /// POST one message and decode the reply, checking its message type
    /// before the body shape.
    ///
    /// Returns the decoded reply together with the JSON exactly as received,
    /// which is what the gateway's signature covers.
    async fn exchange<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        url: &str,
        request: &Req,
        expected: MessageType,
    ) -> Result<(Resp, Value)> {
        debug!("POST {}", url);
        let resp = self.http.post(url).json(request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = resp.bytes().await?;
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| GatewayApiError::MalformedResponse(e.to_string()))?;
        let got = value
            .get("message_type")
            .and_then(Value::as_i64)
            .ok_or_else(|| GatewayApiError::MalformedResponse("missing message_type".to_string()))?;
        if got != i64::from(expected.code()) {
            return Err(GatewayApiError::UnexpectedMessageType {
                expected: expected.code(),
                got: i32::try_from(got).unwrap_or(-1),
            });
        }
        let typed = serde_json::from_value(value.clone())
            .map_err(|e| GatewayApiError::MalformedResponse(e.to_string()))?;
        Ok((typed, value))
    }

    fn check_header(&self, header: &MessageHeader, gateway_id: &NodeId) -> Result<()> {
        if !self.protocol.is_supported(header.protocol_version) {
            return Err(GatewayApiError::UnsupportedProtocol(header.protocol_version));
        }
        if header.node_id != *gateway_id {
            return Err(GatewayApiError::MalformedResponse(format!(
                "expected reply from {gateway_id}, got {}",
                header.node_id
            )));
        }
        Ok(())
    }
}

impl GatewayApi for GatewayClient {
    fn establish<'a>(
        &'a self,
        gateway: &'a GatewayRegistration,
        challenge: [u8; 32],
        ttl: i64,
    ) -> BoxFuture<'a, Result<GatewaySession>> {
        self.establish_session(gateway, challenge, ttl).boxed()
    }

    fn standard_discovery<'a>(
        &'a self,
        session: &'a GatewaySession,
        piece_cid: &'a ContentId,
        nonce: i64,
        ttl: i64,
    ) -> BoxFuture<'a, Result<Vec<SubCidOffer>>> {
        self.discover(session, piece_cid, nonce, ttl).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use fetchcraft_crypto::{build_group_offer, sub_offer_for, verify_message};

    /// How the mock gateway misbehaves
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mode {
        Honest,
        WrongChallenge,
        WrongNonce,
        BadSignature,
        WrongMessageType,
        FutureProtocol,
        NotFound,
        /// Signs a field the client does not model
        ExtraField,
        /// Sends its node id in uppercase hex
        UppercaseNodeId,
        /// Signs discovery replies with a different key version
        RotatedKeyVersion,
    }

    struct MockGateway {
        id: NodeId,
        keypair: SigningKeypair,
        client_key: PublicKey,
        offers: Vec<SubCidOffer>,
        mode: Mode,
    }

    async fn handle(
        State(gw): State<Arc<MockGateway>>,
        Json(body): Json<Value>,
    ) -> std::result::Result<Json<Value>, StatusCode> {
        let signature = body["signature"].as_str().unwrap_or_default().to_string();
        if !verify_message(&gw.client_key, &body, &signature) {
            return Err(StatusCode::UNAUTHORIZED);
        }

        let info = ProtocolInfo::default();
        let mut response = match body["message_type"].as_i64() {
            Some(0) => {
                let request: EstablishmentRequest = serde_json::from_value(body).unwrap();
                let mut challenge = request.challenge;
                if gw.mode == Mode::WrongChallenge {
                    challenge[0] ^= 1;
                }
                serde_json::to_value(EstablishmentResponse {
                    header: info.header(MessageType::EstablishmentResponse, gw.id),
                    challenge,
                    signature: String::new(),
                })
                .unwrap()
            }
            Some(2) => {
                let request: DiscoveryRequest = serde_json::from_value(body).unwrap();
                let nonce = if gw.mode == Mode::WrongNonce {
                    request.nonce + 1
                } else {
                    request.nonce
                };
                let found = gw.mode != Mode::NotFound;
                serde_json::to_value(DiscoveryResponse {
                    header: info.header(MessageType::StandardDiscoveryResponse, gw.id),
                    piece_cid: request.piece_cid,
                    nonce,
                    found,
                    offers: if found { gw.offers.clone() } else { Vec::new() },
                    signature: String::new(),
                })
                .unwrap()
            }
            _ => return Err(StatusCode::BAD_REQUEST),
        };

        let mut version = KeyVersion::default();
        match gw.mode {
            Mode::WrongMessageType => response["message_type"] = Value::from(3),
            Mode::FutureProtocol => response["protocol_version"] = Value::from(2),
            Mode::ExtraField => response["session_note"] = Value::from("maintenance at 02:00"),
            Mode::UppercaseNodeId => {
                response["node_id"] = Value::from(gw.id.to_canonical().to_uppercase())
            }
            Mode::RotatedKeyVersion if response["message_type"] == 3 => version = KeyVersion(2),
            _ => {}
        }
        let mut signature = sign_message(&gw.keypair, version, &response).unwrap();
        if gw.mode == Mode::BadSignature {
            let last = signature.pop().unwrap();
            signature.push(if last == '0' { '1' } else { '0' });
        }
        response["signature"] = Value::from(signature);
        Ok(Json(response))
    }

    struct Fixture {
        client: GatewayClient,
        registration: GatewayRegistration,
        piece: ContentId,
    }

    async fn fixture(mode: Mode) -> Fixture {
        let client_keypair = Arc::new(SigningKeypair::generate());
        let gateway_keypair = SigningKeypair::generate();
        let provider_keypair = SigningKeypair::generate();

        let piece = ContentId::from_bytes([5; 32]);
        let group = build_group_offer(
            &provider_keypair,
            KeyVersion::default(),
            NodeId::from_bytes([9; 32]),
            vec![ContentId::from_bytes([4; 32]), piece],
            500,
            1_900_000_000,
            10,
        );
        let offer = sub_offer_for(&group, &piece).unwrap();

        let gateway_id = NodeId::from_bytes([1; 32]);
        let state = Arc::new(MockGateway {
            id: gateway_id,
            keypair: gateway_keypair.clone(),
            client_key: client_keypair.public_key_bytes(),
            offers: vec![offer],
            mode,
        });
        let app = Router::new().route("/v1", post(handle)).with_state(state);
        let addr = serve(app).await;

        let registration = GatewayRegistration {
            node_id: gateway_id,
            hostname: addr.to_string(),
            region_code: "A".to_string(),
            country_code: "US".to_string(),
            subdivision_code: "US-CA".to_string(),
            signing_key: gateway_keypair.public_key_hex(),
        };
        let client = GatewayClient::new(
            NodeId::from_bytes([0xcc; 32]),
            client_keypair,
            KeyVersion::default(),
            Duration::from_secs(5),
        )
        .unwrap();

        Fixture {
            client,
            registration,
            piece,
        }
    }

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_establish_and_discover() {
        let f = fixture(Mode::Honest).await;
        let session = f
            .client
            .establish(&f.registration, [7; 32], 1_900_000_000)
            .await
            .unwrap();
        assert_eq!(session.gateway_id, f.registration.node_id);
        assert_eq!(session.api_url, format!("http://{}/v1", f.registration.hostname));
        assert_eq!(session.expires_at, 1_900_000_000);
        assert!(!session.is_expired(1_800_000_000));
        assert!(session.is_expired(1_900_000_000));

        let offers = f
            .client
            .standard_discovery(&session, &f.piece, 42, 1_900_000_000)
            .await
            .unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].sub_cid, f.piece);
    }

    #[tokio::test]
    async fn test_signature_covers_unmodelled_fields() {
        let f = fixture(Mode::ExtraField).await;
        let session = f.client.establish(&f.registration, [7; 32], 1).await.unwrap();
        let offers = f.client.standard_discovery(&session, &f.piece, 42, 1).await.unwrap();
        assert_eq!(offers.len(), 1);
    }

    #[tokio::test]
    async fn test_signature_covers_received_node_id_text() {
        let f = fixture(Mode::UppercaseNodeId).await;
        let session = f.client.establish(&f.registration, [7; 32], 1).await.unwrap();
        assert_eq!(session.gateway_id, f.registration.node_id);
        let offers = f.client.standard_discovery(&session, &f.piece, 42, 1).await.unwrap();
        assert_eq!(offers.len(), 1);
    }

    #[tokio::test]
    async fn test_key_version_pinned_per_session() {
        let f = fixture(Mode::RotatedKeyVersion).await;
        let session = f.client.establish(&f.registration, [7; 32], 1).await.unwrap();
        assert_eq!(session.key_version, KeyVersion(1));
        let result = f.client.standard_discovery(&session, &f.piece, 42, 1).await;
        assert!(matches!(result, Err(GatewayApiError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_challenge_mismatch() {
        let f = fixture(Mode::WrongChallenge).await;
        let result = f.client.establish(&f.registration, [7; 32], 1).await;
        assert!(matches!(result, Err(GatewayApiError::ChallengeMismatch)));
    }

    #[tokio::test]
    async fn test_bad_gateway_signature() {
        let f = fixture(Mode::BadSignature).await;
        let result = f.client.establish(&f.registration, [7; 32], 1).await;
        assert!(matches!(result, Err(GatewayApiError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_unexpected_message_type() {
        let f = fixture(Mode::WrongMessageType).await;
        let result = f.client.establish(&f.registration, [7; 32], 1).await;
        assert!(matches!(
            result,
            Err(GatewayApiError::UnexpectedMessageType { expected: 1, got: 3 })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_protocol() {
        let f = fixture(Mode::FutureProtocol).await;
        let result = f.client.establish(&f.registration, [7; 32], 1).await;
        assert!(matches!(result, Err(GatewayApiError::UnsupportedProtocol(2))));
    }

    #[tokio::test]
    async fn test_nonce_mismatch() {
        let f = fixture(Mode::WrongNonce).await;
        let session = f.client.establish(&f.registration, [7; 32], 1).await.unwrap();
        let result = f.client.standard_discovery(&session, &f.piece, 42, 1).await;
        assert!(matches!(result, Err(GatewayApiError::NonceMismatch)));
    }

    #[tokio::test]
    async fn test_not_found_is_empty() {
        let f = fixture(Mode::NotFound).await;
        let session = f.client.establish(&f.registration, [7; 32], 1).await.unwrap();
        let offers = f.client.standard_discovery(&session, &f.piece, 42, 1).await.unwrap();
        assert!(offers.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_signing_key_rejected() {
        let f = fixture(Mode::Honest).await;
        let mut registration = f.registration.clone();
        registration.signing_key = SigningKeypair::generate().public_key_hex();
        let result = f.client.establish(&registration, [7; 32], 1).await;
        assert!(matches!(result, Err(GatewayApiError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let f = fixture(Mode::Honest).await;
        // Signed with a key the gateway does not expect
        let stranger = GatewayClient::new(
            NodeId::from_bytes([0xdd; 32]),
            Arc::new(SigningKeypair::generate()),
            KeyVersion::default(),
            Duration::from_secs(5),
        )
        .unwrap();
        let result = stranger.establish(&f.registration, [7; 32], 1).await;
        assert!(matches!(result, Err(GatewayApiError::Status { status: 401, .. })));
    }

    #[tokio::test]
    async fn test_empty_hostname_fails_before_network() {
        let f = fixture(Mode::Honest).await;
        let mut registration = f.registration.clone();
        registration.hostname = String::new();
        let result = f.client.establish(&registration, [7; 32], 1).await;
        assert!(matches!(result, Err(GatewayApiError::InvalidHost(_))));
    }
}
