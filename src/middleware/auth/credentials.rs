//! Pull the single presented credential and the caller's network context out
//! of request headers.
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, header};

use crate::error::{AuthError, AuthResult};
use crate::services::api_keys::types::IpRule;
use crate::services::auth::{PresentedCredential, RequestContext};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const SESSION_HEADER: &str = "x-session-id";
pub const SESSION_COOKIE: &str = "session_id";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Exactly one credential. The same credential sent through two transports
/// counts once; two different ones are rejected.
pub fn presented_credential(headers: &HeaderMap) -> AuthResult<PresentedCredential> {
    let mut found: Vec<PresentedCredential> = Vec::new();

    if let Some(auth) = header_str(headers, header::AUTHORIZATION.as_str()) {
        let (scheme, value) = auth
            .split_once(' ')
            .ok_or(AuthError::Authentication("malformed authorization header"))?;
        let value = value.trim().to_string();
        if value.is_empty() {
            return Err(AuthError::Authentication("malformed authorization header"));
        }
        match scheme {
            s if s.eq_ignore_ascii_case("bearer") => found.push(PresentedCredential::Bearer(value)),
            s if s.eq_ignore_ascii_case("apikey") => found.push(PresentedCredential::ApiKey(value)),
            _ => return Err(AuthError::Authentication("unsupported authorization scheme")),
        }
    }
    if let Some(key) = header_str(headers, API_KEY_HEADER) {
        found.push(PresentedCredential::ApiKey(key.to_string()));
    }
    if let Some(id) = header_str(headers, SESSION_HEADER) {
        found.push(PresentedCredential::Session(id.to_string()));
    }
    if let Some(id) = session_cookie(headers) {
        found.push(PresentedCredential::Session(id));
    }

    found.dedup();
    let mut found = found.into_iter();
    match (found.next(), found.next()) {
        (Some(credential), None) => Ok(credential),
        (None, _) => Err(AuthError::Authentication("missing credentials")),
        (Some(_), Some(_)) => Err(AuthError::Authentication("multiple credentials presented")),
    }
}

/// Peer address and scheme from the connection. `X-Forwarded-For` /
/// `X-Forwarded-Proto` replace them only when the peer is a trusted proxy.
pub fn request_context<B>(req: &Request<B>, trusted_proxies: &[IpRule]) -> RequestContext {
    let headers = req.headers();

    let peer_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let via_proxy =
        peer_ip.is_some_and(|peer| trusted_proxies.iter().any(|rule| rule.matches(peer)));

    let mut ip = peer_ip;
    let mut is_https = req.uri().scheme_str() == Some("https");
    if via_proxy {
        if let Some(forwarded) = header_str(headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
        {
            ip = Some(forwarded);
        }
        is_https |= header_str(headers, "x-forwarded-proto")
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"));
    }

    RequestContext {
        ip,
        is_https,
        user_agent: header_str(headers, header::USER_AGENT.as_str()).map(str::to_string),
    }
}
