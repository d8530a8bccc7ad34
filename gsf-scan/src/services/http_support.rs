//! Shared plumbing for the remote service clients
//!
//! Every client gets its own `reqwest::Client` (user agent + request timeout) and
//! its own governor rate limiter; the analysis services are rate-sensitive.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

pub(crate) const USER_AGENT: &str = concat!("gsf-scan/", env!("CARGO_PKG_VERSION"));

pub(crate) type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter allowing `requests_per_second` (minimum 1)
pub(crate) fn rate_limiter(requests_per_second: u32) -> DirectRateLimiter {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_second(rps))
}

pub(crate) fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

/// `base` + `/` + `path`, tolerating a trailing slash on `base`
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Read an error body for logging, capped so a large HTML page does not flood logs
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let mut text = response.text().await.unwrap_or_default();
    if text.len() > 512 {
        let mut cut = 512;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}
