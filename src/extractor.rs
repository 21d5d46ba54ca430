use std::convert::Infallible;
use std::net::SocketAddr;

use axum::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};

/// Caller details stored alongside each audit entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerMetadata {
    pub ip: String,
    pub user_agent: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerMetadata
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // First proxy hop wins, then X-Real-IP, then the socket peer.
        let ip = header_value(&parts.headers, "x-forwarded-for")
            .and_then(|value| value.split(',').next().map(|hop| hop.trim().to_string()))
            .filter(|hop| !hop.is_empty())
            .or_else(|| header_value(&parts.headers, "x-real-ip"))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_default();
        let user_agent =
            header_value(&parts.headers, header::USER_AGENT.as_str()).unwrap_or_default();
        Ok(CallerMetadata { ip, user_agent })
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<axum::body::Body>) -> CallerMetadata {
        let mut parts = request.into_parts().0;
        CallerMetadata::from_request_parts(&mut parts, &())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn forwarded_for_first_hop_is_used() {
        let request = Request::builder()
            .header("X-Forwarded-For", " 198.51.100.7 , 10.0.0.1")
            .header("X-Real-IP", "10.0.0.2")
            .header("User-Agent", "curl/8.0")
            .body(axum::body::Body::empty())
            .unwrap();
        let caller = extract(request).await;
        assert_eq!(caller.ip, "198.51.100.7");
        assert_eq!(caller.user_agent, "curl/8.0");
    }

    #[tokio::test]
    async fn real_ip_then_peer_address() {
        let request = Request::builder()
            .header("X-Real-IP", "10.0.0.2")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract(request).await.ip, "10.0.0.2");

        let mut request = Request::builder()
            .body(axum::body::Body::empty())
            .unwrap();
        let peer: SocketAddr = "192.0.2.44:51000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        let caller = extract(request).await;
        assert_eq!(caller.ip, "192.0.2.44");
        assert_eq!(caller.user_agent, "");
    }

    #[tokio::test]
    async fn missing_everything_yields_empty_metadata() {
        let request = Request::builder()
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract(request).await, CallerMetadata::default());
    }
}
