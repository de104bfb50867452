use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use tracing::warn;

use crate::config::DeployEnvironment;

pub const LOOPBACK_PLACEHOLDER: &str = "127.0.0.1";
const MAX_HEADER_VALUE_LEN: usize = 512;
const MAX_CLIENT_LEN: usize = 64;

/// Raw inputs for deriving the caller's address: proxy headers plus the
/// socket peer when the server was started with connect info.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientHints {
    pub forwarded_for: Option<String>,
    pub real_ip: Option<String>,
    pub peer: Option<IpAddr>,
}

impl ClientHints {
    pub fn from_headers(headers: &HeaderMap, peer: Option<IpAddr>) -> Self {
        Self {
            forwarded_for: header_text(headers, "x-forwarded-for"),
            real_ip: header_text(headers, "x-real-ip"),
            peer,
        }
    }

    /// Left-most `X-Forwarded-For` entry, then `X-Real-IP`. Without either,
    /// development uses a loopback placeholder and production the socket
    /// peer, so a proxy that drops the headers does not collapse every
    /// voter into one rate-limit bucket.
    pub fn resolve(&self, environment: DeployEnvironment) -> String {
        if let Some(first) = self
            .forwarded_for
            .as_deref()
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
        {
            return bounded(first);
        }

        if let Some(real_ip) = self
            .real_ip
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return bounded(real_ip);
        }

        match (environment, self.peer) {
            (DeployEnvironment::Production, Some(peer)) => {
                warn!("No forwarding headers on request; falling back to socket peer {peer}");
                peer.to_string()
            }
            (DeployEnvironment::Production, None) => {
                warn!("No forwarding headers or peer address; using loopback placeholder");
                LOOPBACK_PLACEHOLDER.to_string()
            }
            (DeployEnvironment::Development, _) => LOOPBACK_PLACEHOLDER.to_string(),
        }
    }
}

impl<S> FromRequestParts<S> for ClientHints
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(Self::from_headers(&parts.headers, peer))
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| value.len() <= MAX_HEADER_VALUE_LEN)
        .map(str::to_owned)
}

fn bounded(value: &str) -> String {
    value.chars().take(MAX_CLIENT_LEN).collect()
}
