//! Per-IP rate limiting for the public share surface (§7): share-link
//! creation is capped at 20/hour, resolution at 60/minute, both keyed
//! by caller IP to bound token-enumeration attempts.
//!
//! One `governor::RateLimiter` per observed IP, kept in a `DashMap` the
//! way the teacher reaches for a concurrent map rather than a mutexed
//! `HashMap` when the access pattern is high-fanout, short-critical-
//! section lookups.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request};
use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::error::ApiError;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// One bucket of per-IP limiters for a single named limit (e.g.
/// "share-link creation"). Separate `IpLimiter`s are used for the
/// creation and resolution limits since their quotas differ.
pub struct IpLimiter {
    quota: Quota,
    buckets: DashMap<IpAddr, Arc<Limiter>>,
    label: &'static str,
}

impl IpLimiter {
    pub fn per_hour(max: u32, label: &'static str) -> Self {
        Self::new(Quota::per_hour(NonZeroU32::new(max).expect("max must be nonzero")), label)
    }

    pub fn per_minute(max: u32, label: &'static str) -> Self {
        Self::new(Quota::per_minute(NonZeroU32::new(max).expect("max must be nonzero")), label)
    }

    fn new(quota: Quota, label: &'static str) -> Self {
        Self {
            quota,
            buckets: DashMap::new(),
            label,
        }
    }

    /// Returns `Err` once the caller's IP has exceeded its quota.
    pub fn check(&self, ip: IpAddr) -> Result<(), ApiError> {
        let limiter = self
            .buckets
            .entry(ip)
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
            .clone();

        limiter.check().map_err(|_| {
            ApiError::BadRequest(format!("rate limit exceeded for {}", self.label))
        })
    }
}

/// Shared limiter state threaded through the router's extensions, one
/// instance per limited endpoint family.
pub struct RateLimiters {
    pub share_link_create: IpLimiter,
    pub share_link_resolve: IpLimiter,
}

impl RateLimiters {
    pub fn new() -> Self {
        Self {
            share_link_create: IpLimiter::per_hour(20, "share-link creation"),
            share_link_resolve: IpLimiter::per_minute(60, "share-link resolution"),
        }
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new()
    }
}

/// Pulled out of the connection info axum records when the server is
/// bound with `into_make_service_with_connect_info`; defaults to the
/// unspecified address if a handler is ever invoked without it (e.g. a
/// unit test calling the handler function directly).
pub fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_quota_then_rejects() {
        let limiter = IpLimiter::per_minute(2, "test");
        let ip = IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1));
        assert!(limiter.check(ip).is_ok());
        assert!(limiter.check(ip).is_ok());
        assert!(limiter.check(ip).is_err());
    }

    #[test]
    fn different_ips_have_independent_buckets() {
        let limiter = IpLimiter::per_minute(1, "test");
        let ip1 = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 1));
        let ip2 = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 2));
        assert!(limiter.check(ip1).is_ok());
        assert!(limiter.check(ip2).is_ok());
        assert!(limiter.check(ip1).is_err());
    }
}
