//! Rate-limit-aware retry executor.
//!
//! Wraps one conversion invocation. Only throttling is retried: an upstream
//! 429 is transient and usually clears within a second, whereas a bad file or
//! a missing OCR engine will fail the same way every time.
//!
//! ```text
//! attempt 0 ──429──▶ sleep base ──▶ attempt 1 ──429──▶ sleep 2·base ──▶ … ──429──▶ RateLimited
//!     │                                  │
//!     └─ other error ─▶ returned at once ┘
//! ```
//!
//! `max_attempts` bounds the *total* number of attempts, so the default of
//! 2 allows one retry. Backoff is pure exponential (`base_delay · 2^attempt`)
//! without jitter. Sleeps are `tokio::time::sleep`, so a waiting request
//! never holds up other requests and is cancelled with its future.

use crate::error::{DocToMdError, FailureKind};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry parameters for one executor invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Default: 2.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards. Default: 500 ms.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay slept after a throttled attempt number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent on throttling.
    ///
    /// Outcomes:
    /// - `Ok(T)` from the first successful attempt.
    /// - [`DocToMdError::RateLimited`] when the last allowed attempt is throttled.
    /// - [`DocToMdError::OcrUnavailable`] / [`DocToMdError::ConversionFailed`]
    ///   on the first non-throttling capability failure.
    /// - Any already-classified error (e.g. `UnsupportedFormat`) unchanged.
    /// - [`DocToMdError::ExhaustedRetries`] only when `max_attempts == 0`.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, DocToMdError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DocToMdError>>,
    {
        debug!("Starting conversion (max attempts: {})", self.max_attempts);

        for attempt in 0..self.max_attempts {
            debug!("Attempt {}/{}", attempt + 1, self.max_attempts);

            let err = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!("Conversion succeeded on attempt {}", attempt + 1);
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            let cause = match err {
                DocToMdError::Upstream(cause) => cause,
                classified => {
                    debug!("Attempt {} failed with classified error: {}", attempt + 1, classified);
                    return Err(classified);
                }
            };

            match cause.kind {
                FailureKind::RateLimited if attempt + 1 < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "Rate limit hit, retrying in {:?} (attempt {}/{}): {}",
                        delay,
                        attempt + 1,
                        self.max_attempts,
                        cause
                    );
                    tokio::time::sleep(delay).await;
                }
                FailureKind::RateLimited => {
                    warn!("Rate limit exceeded after {} attempts: {}", self.max_attempts, cause);
                    return Err(DocToMdError::RateLimited {
                        attempts: self.max_attempts,
                    });
                }
                FailureKind::OcrUnavailable => {
                    warn!("OCR subsystem unavailable, not retrying: {}", cause);
                    return Err(DocToMdError::OcrUnavailable {
                        detail: cause.message,
                    });
                }
                FailureKind::Permanent => {
                    warn!("Non-rate-limit error, not retrying: {}", cause);
                    return Err(DocToMdError::ConversionFailed { source: cause });
                }
            }
        }

        Err(DocToMdError::ExhaustedRetries {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CapabilityError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(500))
    }

    /// Call instants recorded by the operation; gaps between them are the
    /// backoff sleeps (time is paused, so they are exact).
    fn gaps(calls: &[Instant]) -> Vec<Duration> {
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[test]
    fn backoff_doubles() {
        let p = policy(4);
        assert_eq!(p.backoff(0), Duration::from_millis(500));
        assert_eq!(p.backoff(1), Duration::from_millis(1000));
        assert_eq!(p.backoff(2), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_rate_limits() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&calls);

        let result = policy(3)
            .execute(move || {
                let c = Arc::clone(&c);
                async move {
                    let mut calls = c.lock().unwrap();
                    calls.push(Instant::now());
                    if calls.len() <= 2 {
                        Err(DocToMdError::from(CapabilityError::classify("Error code: 429 - rate_limited")))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            gaps(&calls),
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_not_retried() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let start = Instant::now();

        let result: Result<(), _> = policy(5)
            .execute(move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DocToMdError::from(CapabilityError::classify("invalid document structure"))) }
            })
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO, "no sleep expected");
        match result {
            Err(DocToMdError::ConversionFailed { source }) => {
                assert_eq!(source.message, "invalid document structure")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_rate_limit_ends_in_rate_limited() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&calls);

        let result: Result<(), _> = policy(3)
            .execute(move || {
                c.lock().unwrap().push(Instant::now());
                async { Err::<(), _>(DocToMdError::from(CapabilityError::rate_limited("429 Too Many Requests"))) }
            })
            .await;

        assert!(matches!(result, Err(DocToMdError::RateLimited { attempts: 3 })));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        // No sleep after the final attempt.
        assert_eq!(
            gaps(&calls),
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn default_policy_makes_two_attempts() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);

        let result: Result<(), _> = RetryPolicy::default()
            .execute(move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DocToMdError::from(CapabilityError::rate_limited("429"))) }
            })
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(matches!(result, Err(DocToMdError::RateLimited { attempts: 2 })));
    }

    #[tokio::test]
    async fn zero_attempts_is_exhausted() {
        let result: Result<(), _> = policy(0)
            .execute(|| async { Ok::<(), DocToMdError>(()) })
            .await;
        assert!(matches!(result, Err(DocToMdError::ExhaustedRetries { attempts: 0 })));
    }

    #[tokio::test]
    async fn classified_error_passes_through_unchanged() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);

        let result: Result<(), _> = policy(3)
            .execute(move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err(DocToMdError::unsupported("txt", "Fast mode không hỗ trợ file txt")) }
            })
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        match result {
            Err(DocToMdError::UnsupportedFormat { extension, detail }) => {
                assert_eq!(extension, "txt");
                assert_eq!(detail, "Fast mode không hỗ trợ file txt");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ocr_unavailable_is_not_retried() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);

        let result: Result<(), _> = policy(3)
            .execute(move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DocToMdError::from(CapabilityError::classify("tesseract is not installed"))) }
            })
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(DocToMdError::OcrUnavailable { .. })));
    }
}
