//! Gateway host validation

use std::net::SocketAddr;

use tracing::debug;

use crate::{GatewayApiError, Result};

/// Port assumed when a registered hostname carries none
pub const DEFAULT_PORT: u16 = 80;

/// Check that a registered hostname is usable before any request is built.
///
/// The hostname may carry a `:port` suffix. It must resolve to at least one
/// socket address.
pub async fn validate_host(hostname: &str) -> Result<SocketAddr> {
    let hostname = hostname.trim();
    if hostname.is_empty() {
        return Err(GatewayApiError::InvalidHost("empty hostname".to_string()));
    }
    if hostname.contains('/') || hostname.contains(char::is_whitespace) {
        return Err(GatewayApiError::InvalidHost(hostname.to_string()));
    }

    if let Ok(addr) = hostname.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let (host, port) = split_port(hostname)?;
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| GatewayApiError::HostResolution {
            host: hostname.to_string(),
            reason: e.to_string(),
        })?;

    let addr = addrs.next().ok_or_else(|| GatewayApiError::HostResolution {
        host: hostname.to_string(),
        reason: "no addresses".to_string(),
    })?;
    debug!("Resolved {} to {}", hostname, addr);
    Ok(addr)
}

/// Gateway API endpoint for a registered hostname
pub fn api_url(hostname: &str) -> String {
    format!("http://{}/v1", hostname.trim())
}

fn split_port(hostname: &str) -> Result<(&str, u16)> {
    match hostname.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| GatewayApiError::InvalidHost(hostname.to_string()))?;
            if host.is_empty() {
                return Err(GatewayApiError::InvalidHost(hostname.to_string()));
            }
            Ok((host, port))
        }
        None => Ok((hostname, DEFAULT_PORT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_hostname() {
        assert!(matches!(
            validate_host("  ").await,
            Err(GatewayApiError::InvalidHost(_))
        ));
    }

    #[tokio::test]
    async fn test_ip_with_port() {
        let addr = validate_host("127.0.0.1:9010").await.unwrap();
        assert_eq!(addr.port(), 9010);
    }

    #[tokio::test]
    async fn test_bad_port() {
        assert!(matches!(
            validate_host("127.0.0.1:99999").await,
            Err(GatewayApiError::InvalidHost(_))
        ));
        assert!(matches!(
            validate_host(":8080").await,
            Err(GatewayApiError::InvalidHost(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_paths() {
        assert!(validate_host("127.0.0.1/v1").await.is_err());
    }

    #[test]
    fn test_split_port_default() {
        assert_eq!(split_port("gateway.example.org").unwrap(), ("gateway.example.org", 80));
        assert_eq!(split_port("gateway.example.org:9012").unwrap(), ("gateway.example.org", 9012));
    }

    #[test]
    fn test_api_url() {
        assert_eq!(api_url("127.0.0.1:9010"), "http://127.0.0.1:9010/v1");
    }
}
