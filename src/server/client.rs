use axum::extract::{ ConnectInfo, FromRequestParts };
use axum::http::request::Parts;
use std::convert::Infallible;
use std::net::SocketAddr;

use super::api::AppState;

/// Identifier used for rate limiting: the peer IP, or the first
/// `X-Forwarded-For` hop when the proxy is trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if state.settings.trust_proxy {
            let forwarded = parts.headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(ip) = forwarded {
                return Ok(ClientAddr(ip.to_string()));
            }
        }

        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            return Ok(ClientAddr(addr.ip().to_string()));
        }

        Ok(ClientAddr("unknown".to_string()))
    }
}
