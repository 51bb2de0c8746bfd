//! Shared fixtures for the session integration tests.

#![allow(dead_code)]

pub mod db_utils;
pub mod fakes;

pub use db_utils::{context, seeded_db};
pub use fakes::{sample_annotation, FakeAnnotations, FakeEngine, RecordingEvents};

use std::future::Future;
use std::time::{Duration, Instant};

/// Polls `condition` until it holds or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
