//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

use queryforge_common::errors::{AppError, Result};

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Limiter plus the configured rate, for error reporting
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<GlobalRateLimiter>,
    requests_per_second: u32,
}

/// Create a new rate limiter
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Result<RateLimit> {
    let per_second = NonZeroU32::new(requests_per_second).ok_or_else(|| AppError::Configuration {
        message: "rate_limit.requests_per_second must be greater than zero".to_string(),
    })?;
    let burst = NonZeroU32::new(burst).ok_or_else(|| AppError::Configuration {
        message: "rate_limit.burst must be greater than zero".to_string(),
    })?;

    Ok(RateLimit {
        limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second).allow_burst(burst))),
        requests_per_second,
    })
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimit>,
    request: Request,
    next: Next,
) -> Result<Response> {
    match rate_limit.limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!("Rate limit exceeded");
            Err(AppError::RateLimited {
                limit: rate_limit.requests_per_second,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let rate_limit = create_rate_limiter(100, 200).unwrap();
        assert!(rate_limit.limiter.check().is_ok());
    }

    #[test]
    fn test_burst_is_enforced() {
        let rate_limit = create_rate_limiter(1, 2).unwrap();
        assert!(rate_limit.limiter.check().is_ok());
        assert!(rate_limit.limiter.check().is_ok());
        assert!(rate_limit.limiter.check().is_err());
    }

    #[test]
    fn test_zero_rate_is_a_configuration_error() {
        assert!(matches!(
            create_rate_limiter(0, 10),
            Err(AppError::Configuration { .. })
        ));
        assert!(create_rate_limiter(10, 0).is_err());
    }
}
