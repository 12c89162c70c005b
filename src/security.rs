use crate::errors::AppError;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use http::HeaderMap;
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Process-wide request throttle. One bucket for everyone; there is no per-caller identity.
#[derive(Clone)]
pub struct Throttle {
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl Throttle {
    pub fn new(per_second: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(per_second).unwrap_or(nonzero!(1u32));
        let burst = NonZeroU32::new(burst).unwrap_or(rate);
        let quota = Quota::per_second(rate).allow_burst(burst);
        Self { limiter: Arc::new(RateLimiter::direct(quota)) }
    }

    pub fn check(&self) -> Result<(), AppError> { self.limiter.check().map_err(|_| AppError::RateLimited) }
}

pub fn content_length_ok(headers: &HeaderMap, max_kb: usize) -> Result<(), AppError> {
    if let Some(len) = headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok())
    {
        if len > max_kb * 1024 {
            return Err(AppError::RequestTooLarge);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_enforces_burst() {
        let t = Throttle::new(1, 3);
        for _ in 0..3 {
            assert!(t.check().is_ok());
        }
        assert!(matches!(t.check(), Err(AppError::RateLimited)));
    }

    #[test]
    fn throttle_is_shared_between_clones() {
        let t = Throttle::new(1, 1);
        let other = t.clone();
        assert!(t.check().is_ok());
        assert!(other.check().is_err());
    }

    #[test]
    fn content_length_limit() {
        let mut h = HeaderMap::new();
        assert!(content_length_ok(&h, 1).is_ok());
        h.insert(http::header::CONTENT_LENGTH, "1024".parse().unwrap());
        assert!(content_length_ok(&h, 1).is_ok());
        h.insert(http::header::CONTENT_LENGTH, "1025".parse().unwrap());
        assert!(matches!(content_length_ok(&h, 1), Err(AppError::RequestTooLarge)));
    }
}
