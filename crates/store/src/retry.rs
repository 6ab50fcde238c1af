// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential backoff for durable-event writes and other Redis operations
//! that must not silently drop data on a transient connection blip.

use crate::error::StoreError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Maximum attempts before giving up and surfacing the last error.
const MAX_ATTEMPTS: u32 = 5;
/// Backoff after the first failure.
const INITIAL_DELAY: Duration = Duration::from_millis(100);
/// Backoff is doubled each retry, capped here.
const MAX_DELAY: Duration = Duration::from_millis(1_600);

/// Retry `op` with exponential backoff (0.1s, 0.2s, 0.4s, 0.8s, 1.6s),
/// retrying only errors [`StoreError::is_retryable`] reports as transient.
pub async fn with_backoff<T, F, Fut>(label: &str, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut delay = INITIAL_DELAY;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= MAX_ATTEMPTS || !e.is_retryable() => {
                if attempt > 1 {
                    return Err(StoreError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                return Err(e);
            }
            Err(e) => {
                warn!(operation = label, attempt, error = %e, delay_ms = delay.as_millis(), "retrying after transient store error");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}
