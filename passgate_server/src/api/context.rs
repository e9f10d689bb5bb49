//! Client address and context extraction.
//!
//! The client address is the TCP peer. `X-Forwarded-For` is only believed
//! when the peer is one of the configured reverse proxies, and then only
//! up to the first hop that is not itself a trusted proxy.

use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{Extensions, HeaderMap, request::Parts},
};
use passgate::context::ClientContext;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Edge-proxy header carrying the client's country code
pub const COUNTRY_HEADER: &str = "cf-ipcountry";

/// Forwarded-for header set by the reverse proxy
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Peer address recorded by `into_make_service_with_connect_info`
pub fn peer_ip(extensions: &Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Reverse proxies whose `X-Forwarded-For` header is believed
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies(Arc<[IpAddr]>);

impl TrustedProxies {
    pub fn new(proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        Self(proxies.into_iter().collect())
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.contains(ip)
    }

    /// Address of the client behind any trusted proxies.
    ///
    /// Walks `X-Forwarded-For` from the right, starting at a trusted peer,
    /// and stops at the first address that is not a trusted proxy. An
    /// unparsable hop ends the walk at the last trusted address.
    pub fn client_ip(&self, peer: Option<IpAddr>, headers: &HeaderMap) -> Option<IpAddr> {
        let peer = peer?;
        if !self.contains(&peer) {
            return Some(peer);
        }
        let Some(forwarded) = header(headers, FORWARDED_FOR_HEADER) else {
            return Some(peer);
        };

        let mut client = peer;
        for hop in forwarded.rsplit(',') {
            let Ok(ip) = hop.trim().parse::<IpAddr>() else {
                break;
            };
            client = ip;
            if !self.contains(&ip) {
                break;
            }
        }
        Some(client)
    }
}

/// Axum extractor for the [`ClientContext`] of the current request
#[derive(Debug, Clone)]
pub struct RequestContext(pub ClientContext);

impl<S> FromRequestParts<S> for RequestContext
where
    TrustedProxies: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let proxies = TrustedProxies::from_ref(state);
        let headers = &parts.headers;
        let ip = proxies
            .client_ip(peer_ip(&parts.extensions), headers)
            .map(|ip| ip.to_string());

        Ok(RequestContext(ClientContext::capture(
            ip.as_deref(),
            header(headers, COUNTRY_HEADER),
            header(headers, axum::http::header::USER_AGENT.as_str()),
        )))
    }
}
