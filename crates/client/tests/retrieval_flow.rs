//! End-to-end retrieval flow over HTTP.
//!
//! Runs a registry and several gateways as axum servers on loopback, then
//! drives a `RetrievalClient` built with `RetrievalClient::new` through
//! gateway selection, establishment and offer discovery.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tokio::sync::oneshot;

use fetchcraft_client::{ClientSettings, RetrievalClient};
use fetchcraft_core::{ContentId, GatewayRegistration, NodeId, ProviderRegistration, SubCidOffer};
use fetchcraft_crypto::{
    build_group_offer, sign_message, sub_offer_for, verify_message, KeyVersion, SigningKeypair,
};
use fetchcraft_gateway_api::{
    DiscoveryRequest, DiscoveryResponse, EstablishmentRequest, EstablishmentResponse,
    MessageType, ProtocolInfo,
};

// ── Mock servers ─────────────────────────────────────────────────────────────

struct Server {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn serve(app: Router) -> Server {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
            .unwrap();
    });
    Server {
        addr,
        stop: Some(stop_tx),
    }
}

#[derive(Default)]
struct RegistryData {
    gateways: Vec<GatewayRegistration>,
    providers: Vec<ProviderRegistration>,
}

fn registry_app(data: Arc<RegistryData>) -> Router {
    Router::new()
        .route(
            "/registers/gateway",
            get(|State(data): State<Arc<RegistryData>>| async move {
                Json(data.gateways.clone())
            }),
        )
        .route(
            "/registers/gateway/{id}",
            get(
                |State(data): State<Arc<RegistryData>>, Path(id): Path<String>| async move {
                    let id = NodeId::parse(&id).map_err(|_| StatusCode::BAD_REQUEST)?;
                    data.gateways
                        .iter()
                        .find(|g| g.node_id == id)
                        .cloned()
                        .map(Json)
                        .ok_or(StatusCode::NOT_FOUND)
                },
            ),
        )
        .route(
            "/registers/provider/{id}",
            get(
                |State(data): State<Arc<RegistryData>>, Path(id): Path<String>| async move {
                    let id = NodeId::parse(&id).map_err(|_| StatusCode::BAD_REQUEST)?;
                    data.providers
                        .iter()
                        .find(|p| p.node_id == id)
                        .cloned()
                        .map(Json)
                        .ok_or(StatusCode::NOT_FOUND)
                },
            ),
        )
        .with_state(data)
}

struct GatewayData {
    id: NodeId,
    keypair: SigningKeypair,
    client_key: [u8; 32],
    offers: Vec<SubCidOffer>,
}

async fn gateway_handler(
    State(gw): State<Arc<GatewayData>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let signature = body["signature"].as_str().unwrap_or_default().to_string();
    if !verify_message(&gw.client_key, &body, &signature) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let info = ProtocolInfo::default();
    let mut response = match body["message_type"].as_i64() {
        Some(0) => {
            let request: EstablishmentRequest =
                serde_json::from_value(body).map_err(|_| StatusCode::BAD_REQUEST)?;
            serde_json::to_value(EstablishmentResponse {
                header: info.header(MessageType::EstablishmentResponse, gw.id),
                challenge: request.challenge,
                signature: String::new(),
            })
            .unwrap()
        }
        Some(2) => {
            let request: DiscoveryRequest =
                serde_json::from_value(body).map_err(|_| StatusCode::BAD_REQUEST)?;
            let offers: Vec<SubCidOffer> = gw
                .offers
                .iter()
                .filter(|o| o.sub_cid == request.piece_cid)
                .cloned()
                .collect();
            serde_json::to_value(DiscoveryResponse {
                header: info.header(MessageType::StandardDiscoveryResponse, gw.id),
                piece_cid: request.piece_cid,
                nonce: request.nonce,
                found: !offers.is_empty(),
                offers,
                signature: String::new(),
            })
            .unwrap()
        }
        _ => return Err(StatusCode::BAD_REQUEST),
    };
    let signature = sign_message(&gw.keypair, KeyVersion::default(), &response).unwrap();
    response["signature"] = Value::from(signature);
    Ok(Json(response))
}

// ── Network fixture ──────────────────────────────────────────────────────────

struct Network {
    registry: Server,
    gateways: Vec<Server>,
    gateway_ids: Vec<NodeId>,
    client_keypair: SigningKeypair,
    piece: ContentId,
}

fn node_id(byte: u8) -> NodeId {
    NodeId::from_bytes([byte; 32])
}

/// Three gateways in region "EU" and one in "US".
///
/// Gateway offers for `piece`:
/// - EU #1: honest offer at 400 and honest offer at 900
/// - EU #2: the same 400 offer again, plus a tampered one at 100
/// - EU #3: a validly signed offer claiming `piece` under a root that does
///   not contain it
/// - US #1: honest offer at 50 (not in the pool)
async fn network() -> Network {
    fetchcraft_logging::init_test();

    let client_keypair = SigningKeypair::generate();
    let provider_keypair = SigningKeypair::generate();
    let provider_id = node_id(0x70);
    let piece = ContentId::from_bytes([0x42; 32]);
    let other = ContentId::from_bytes([0x43; 32]);

    let offer_at = |price: u64, cids: Vec<ContentId>| {
        let group = build_group_offer(
            &provider_keypair,
            KeyVersion::default(),
            provider_id,
            cids,
            price,
            1_900_000_000,
            3,
        );
        sub_offer_for(&group, &piece).unwrap()
    };

    let cheap = offer_at(400, vec![piece, other]);
    let pricey = offer_at(900, vec![other, piece]);
    let mut tampered = offer_at(100, vec![piece]);
    tampered.price = 10;
    // Genuinely signed, but the root commits to other content
    let foreign = build_group_offer(
        &provider_keypair,
        KeyVersion::default(),
        provider_id,
        vec![other, ContentId::from_bytes([0x44; 32])],
        300,
        1_900_000_000,
        3,
    );
    let mut outside = sub_offer_for(&foreign, &other).unwrap();
    outside.sub_cid = piece;
    let us_offer = offer_at(50, vec![piece]);

    let offers_by_gateway = [
        ("EU", vec![cheap.clone(), pricey]),
        ("EU", vec![cheap, tampered]),
        ("EU", vec![outside]),
        ("US", vec![us_offer]),
    ];

    let mut gateways = Vec::new();
    let mut registrations = Vec::new();
    for (index, (region, offers)) in offers_by_gateway.into_iter().enumerate() {
        let id = node_id(index as u8 + 1);
        let keypair = SigningKeypair::generate();
        let signing_key = keypair.public_key_hex();
        let data = Arc::new(GatewayData {
            id,
            keypair,
            client_key: client_keypair.public_key_bytes(),
            offers,
        });
        let server = serve(Router::new().route("/v1", post(gateway_handler)).with_state(data)).await;
        registrations.push(GatewayRegistration {
            node_id: id,
            hostname: server.addr.to_string(),
            region_code: region.to_string(),
            country_code: if region == "EU" { "DE" } else { "US" }.to_string(),
            subdivision_code: if region == "EU" { "DE-BE" } else { "US-NY" }.to_string(),
            signing_key,
        });
        gateways.push(server);
    }

    let registry_data = Arc::new(RegistryData {
        gateways: registrations.clone(),
        providers: vec![ProviderRegistration {
            node_id: provider_id,
            hostname: "provider.example.org".to_string(),
            region_code: "EU".to_string(),
            signing_key: provider_keypair.public_key_hex(),
        }],
    });
    let registry = serve(registry_app(registry_data)).await;

    Network {
        registry,
        gateways,
        gateway_ids: registrations.iter().map(|g| g.node_id).collect(),
        client_keypair,
        piece,
    }
}

/// Client whose background refresh stays out of the way
fn client_for(net: &Network) -> RetrievalClient {
    client_with_refresh(net, Duration::from_secs(3600))
}

fn client_with_refresh(net: &Network, refresh_interval: Duration) -> RetrievalClient {
    let settings = ClientSettings::builder()
        .client_id(node_id(0xcc))
        .signing_keypair(net.client_keypair.clone())
        .register_url(format!("http://{}", net.registry.addr))
        .request_timeout(Duration::from_secs(5))
        .refresh_interval(refresh_interval)
        .build()
        .unwrap();
    RetrievalClient::new(settings).unwrap()
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_discovery_verifies_and_dedups() {
    let net = network().await;
    let client = client_for(&net);

    let eu = client.find_gateways("EU", 10).await.unwrap();
    assert_eq!(eu, net.gateway_ids[..3].to_vec());

    assert_eq!(client.add_gateways_to_use(&eu).await, 3);
    assert_eq!(client.add_active_gateways(&eu).await, 3);
    assert_eq!(client.connected_gateways().len(), 3);

    let offers = client.find_offers_standard_discovery(&net.piece).await.unwrap();
    let mut prices: Vec<u64> = offers.iter().map(|o| o.price).collect();
    prices.sort();
    // 400 once despite two gateways relaying it; tampered and out-of-tree dropped
    assert_eq!(prices, vec![400, 900]);

    let best = client.find_best_offers(&net.piece, 900, None).await.unwrap();
    assert_eq!(best.len(), 1);
    assert_eq!(best[0].price, 400);

    client.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_refresh_builds_sessions_in_background() {
    let net = network().await;
    let client = client_with_refresh(&net, Duration::from_millis(100));

    let eu = client.find_gateways("EU", 2).await.unwrap();
    assert_eq!(client.add_gateways_to_use(&eu).await, 2);
    assert!(client.active_gateways().is_empty());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while client.active_gateways().len() < 2 {
        assert!(tokio::time::Instant::now() < deadline, "refresh never established sessions");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    client.remove_gateways_to_use(&eu[..1]);
    assert_eq!(client.active_gateways(), vec![eu[1]]);

    client.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_gateway_is_skipped() {
    let mut net = network().await;
    let client = client_for(&net);

    let eu = client.find_gateways("EU", 10).await.unwrap();
    client.add_gateways_to_use(&eu).await;

    // Take the first gateway offline before the handshake
    drop(net.gateways.remove(0));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(client.add_active_gateways(&eu).await, 2);
    assert!(!client.active_gateways().contains(&eu[0]));

    let offers = client.find_offers_standard_discovery(&net.piece).await.unwrap();
    let prices: Vec<u64> = offers.iter().map(|o| o.price).collect();
    assert_eq!(prices, vec![400]);

    client.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_registry_down_fails_find_gateways() {
    let net = network().await;
    let client = client_for(&net);
    drop(net.registry);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(client.find_gateways("EU", 10).await.is_err());
    client.shutdown().await;
}
