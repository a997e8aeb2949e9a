//! Per-IP request quotas for the two public workflows.

use axum::http::HeaderMap;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBucket {
    Enrichment,
    Valuation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub success: bool,
}

pub struct RateLimiters {
    enrichment: DefaultKeyedRateLimiter<IpAddr>,
    valuation: DefaultKeyedRateLimiter<IpAddr>,
}

fn keyed(per_minute: u32) -> DefaultKeyedRateLimiter<IpAddr> {
    let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    RateLimiter::keyed(Quota::per_minute(per_minute))
}

impl RateLimiters {
    pub fn new(enrichment_per_minute: u32, valuation_per_minute: u32) -> Self {
        Self {
            enrichment: keyed(enrichment_per_minute),
            valuation: keyed(valuation_per_minute),
        }
    }

    pub fn check(&self, ip: IpAddr, bucket: RateLimitBucket) -> RateLimitDecision {
        let limiter = match bucket {
            RateLimitBucket::Enrichment => &self.enrichment,
            RateLimitBucket::Valuation => &self.valuation,
        };
        let success = limiter.check_key(&ip).is_ok();
        if !success {
            tracing::warn!("Rate limit hit for {} on {:?}", ip, bucket);
        }
        RateLimitDecision { success }
    }

    /// Drops state for callers whose quota has fully replenished.
    pub fn retain_recent(&self) {
        self.enrichment.retain_recent();
        self.valuation.retain_recent();
    }
}

/// Caller address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the socket.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok());

    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|ip| ip.trim().parse().ok())
        })
        .or_else(|| peer.map(|addr| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
