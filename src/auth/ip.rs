//! Client IP extraction utilities.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
};

/// Proxy header to trust for the client address.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    /// Last entry of `X-Forwarded-For`, the one appended by the trusted proxy
    XForwardedFor,
    /// `X-Real-IP`
    XRealIp,
}

impl ClientIpHeader {
    pub fn header_name(&self) -> &'static str {
        match self {
            ClientIpHeader::XForwardedFor => "x-forwarded-for",
            ClientIpHeader::XRealIp => "x-real-ip",
        }
    }

    fn parse(&self, value: &str) -> Result<IpAddr, &'static str> {
        let candidate = match self {
            ClientIpHeader::XForwardedFor => value.rsplit(',').next().unwrap_or_default(),
            ClientIpHeader::XRealIp => value,
        };
        candidate
            .trim()
            .parse()
            .map_err(|_| "IP header does not contain a valid address")
    }

    fn extract(&self, headers: &HeaderMap) -> Result<IpAddr, &'static str> {
        let value = headers
            .get(self.header_name())
            .ok_or("IP header not present")?
            .to_str()
            .map_err(|_| "IP header contains invalid characters")?;
        self.parse(value)
    }
}

/// Extract the client IP address.
///
/// With a configured header, the header must be present and valid; there is no
/// fallback to the socket address. Without one, the peer address from
/// `ConnectInfo` is used.
pub fn extract_client_ip(
    request: &Request,
    ip_header: Option<ClientIpHeader>,
) -> Result<String, &'static str> {
    match ip_header {
        Some(header) => header.extract(request.headers()).map(|ip| ip.to_string()),
        None => request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
            .ok_or("No client IP available"),
    }
}
