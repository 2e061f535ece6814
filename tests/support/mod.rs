//! Shared helpers for the integration tests

#![allow(dead_code)]

pub mod petstore;
pub mod storefront;

use std::path::PathBuf;
use std::time::Duration;

use scenario::wait::PollPolicy;

/// Path of a scenario file shipped in `scenarios/`
pub fn bundled(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name)
}

/// Tight polling so waits resolve quickly against in-process fakes
pub fn fast_policy() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(5),
        timeout: Duration::from_secs(2),
        max_attempts: None,
    }
}
