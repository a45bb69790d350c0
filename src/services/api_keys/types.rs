use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyStatus {
    Active,
    Suspended,
    Revoked,
    Expired,
}

impl ApiKeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKeyStatus::Active => "active",
            ApiKeyStatus::Suspended => "suspended",
            ApiKeyStatus::Revoked => "revoked",
            ApiKeyStatus::Expired => "expired",
        }
    }
}

/// Fixed-window granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateWindow {
    Minute,
    Hour,
    Day,
}

impl RateWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateWindow::Minute => "minute",
            RateWindow::Hour => "hour",
            RateWindow::Day => "day",
        }
    }

    pub fn length(&self) -> Duration {
        match self {
            RateWindow::Minute => Duration::minutes(1),
            RateWindow::Hour => Duration::hours(1),
            RateWindow::Day => Duration::days(1),
        }
    }

    /// `now` truncated to the window granularity (UTC).
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.duration_trunc(self.length()).unwrap_or(now)
    }
}

impl fmt::Display for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minute" => Ok(RateWindow::Minute),
            "hour" => Ok(RateWindow::Hour),
            "day" => Ok(RateWindow::Day),
            other => Err(format!("unknown rate window: {other}")),
        }
    }
}

/// `requests` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests: u64,
    pub window: RateWindow,
}

impl RateLimit {
    pub fn new(requests: u64, window: RateWindow) -> Self {
        Self { requests, window }
    }
}

/// Stored API key record. Holds the secret's hash, never the secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub owner_id: String,
    pub tenant_id: Option<String>,
    pub name: String,
    pub key_hash: String,
    /// Leading characters of the raw key, for display.
    pub prefix: String,
    pub scopes: Vec<String>,
    pub status: ApiKeyStatus,
    /// Empty means any address.
    pub allowed_ips: Vec<String>,
    pub require_https: bool,
    pub rate_limit: RateLimit,
    pub expires_at: Option<DateTime<Utc>>,

    pub total_requests: u64,
    pub failed_requests: u64,
    pub last_used_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Counts against the owner's cap.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ApiKeyStatus::Active && !self.is_expired_at(now)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateApiKeyRequest {
    pub owner_id: String,
    pub tenant_id: Option<String>,
    pub name: String,
    pub scopes: Vec<String>,
    pub expires_in_days: Option<u32>,
    /// Falls back to the service default.
    pub rate_limit: Option<RateLimit>,
    pub allowed_ips: Option<Vec<String>>,
    #[serde(default)]
    pub require_https: bool,
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiKeyUpdate {
    pub name: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub rate_limit: Option<RateLimit>,
    pub allowed_ips: Option<Vec<String>>,
    pub require_https: Option<bool>,
    /// `Some(None)` removes the expiry.
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

/// Returned once, at creation or rotation. The only place the raw key exists.
#[derive(Clone)]
pub struct CreatedApiKey {
    pub key: ApiKey,
    pub secret: String,
}

impl fmt::Debug for CreatedApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreatedApiKey")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// One allowlist entry: `*`, an exact address or a CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpRule {
    Any,
    Exact(IpAddr),
    Cidr { network: IpAddr, prefix_len: u8 },
}

impl FromStr for IpRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(IpRule::Any);
        }

        let Some((addr, len)) = s.split_once('/') else {
            return s
                .parse::<IpAddr>()
                .map(IpRule::Exact)
                .map_err(|_| format!("invalid IP address: {s}"));
        };

        let network = addr
            .parse::<IpAddr>()
            .map_err(|_| format!("invalid CIDR network: {s}"))?;
        let prefix_len = len
            .parse::<u8>()
            .map_err(|_| format!("invalid CIDR prefix: {s}"))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix_len > max {
            return Err(format!("invalid CIDR prefix: {s}"));
        }

        Ok(IpRule::Cidr {
            network,
            prefix_len,
        })
    }
}

impl IpRule {
    pub fn matches(&self, ip: IpAddr) -> bool {
        match *self {
            IpRule::Any => true,
            IpRule::Exact(addr) => addr == ip,
            IpRule::Cidr {
                network,
                prefix_len,
            } => match (network, ip) {
                (IpAddr::V4(net), IpAddr::V4(ip)) => {
                    prefix_eq(u32::from(net).into(), u32::from(ip).into(), prefix_len, 32)
                }
                (IpAddr::V6(net), IpAddr::V6(ip)) => {
                    prefix_eq(u128::from(net), u128::from(ip), prefix_len, 128)
                }
                _ => false,
            },
        }
    }
}

fn prefix_eq(net: u128, ip: u128, prefix_len: u8, bits: u32) -> bool {
    let prefix_len = u32::from(prefix_len);
    if prefix_len == 0 {
        return true;
    }
    let shift = bits - prefix_len;
    (net >> shift) == (ip >> shift)
}

/// True when `ip` satisfies at least one entry. An empty list allows everyone.
pub fn ip_allowed(allowed: &[String], ip: Option<IpAddr>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let mut rules = allowed.iter().filter_map(|entry| entry.parse::<IpRule>().ok());
    match ip {
        Some(ip) => rules.any(|rule| rule.matches(ip)),
        None => rules.any(|rule| rule == IpRule::Any),
    }
}
