//! Retry logic for transport failures with exponential backoff.

use std::time::Duration;

use log::debug;
use tracing::warn;

use super::request::RequestDescriptor;
use super::transport::{RawResponse, Transport, TransportError};

/// Default number of retries after the first attempt.
pub const MAX_RETRIES: u32 = 10;

/// Delay before the first retry, in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 2000;

/// Statuses that mark a raised transport error as transient.
pub const RETRYABLE_STATUSES: [u16; 3] = [429, 500, 502];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }
}

/// Remaining budget of one logical request.
///
/// A state is never mutated; [`RetryState::next`] yields the state for the
/// following attempt, or `None` once the budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    remaining: u32,
    backoff: Duration,
}

impl RetryState {
    pub fn start(policy: &RetryPolicy) -> Self {
        Self {
            remaining: policy.max_retries,
            backoff: policy.initial_backoff,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Delay to wait before the retry this state grants.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn next(self) -> Option<Self> {
        if self.remaining == 0 {
            return None;
        }
        Some(Self {
            remaining: self.remaining - 1,
            backoff: self.backoff.saturating_mul(2),
        })
    }
}

/// Returns true if the transport error is worth another attempt.
///
/// Only responses with a status in [`RETRYABLE_STATUSES`] and timeouts with
/// no response at all qualify.
pub fn is_retryable(error: &TransportError) -> bool {
    match error.status_code() {
        Some(status) => RETRYABLE_STATUSES.contains(&status),
        None => error.is_timeout(),
    }
}

fn error_code(error: &TransportError) -> String {
    match error.status_code() {
        Some(status) => status.to_string(),
        None if error.is_timeout() => "timeout".to_string(),
        None => "error".to_string(),
    }
}

/// Sends `request` through `transport`, retrying transient transport errors.
///
/// Any response that arrives without a raised error is returned as is. When
/// the budget runs out, or the error is not retryable, the last transport
/// error is returned unchanged.
pub async fn execute<T>(
    transport: &T,
    base_url: &str,
    request: &RequestDescriptor,
    policy: &RetryPolicy,
) -> Result<RawResponse, TransportError>
where
    T: Transport + ?Sized,
{
    let mut state = RetryState::start(policy);

    loop {
        let error = match transport.send(base_url, request).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };

        if !is_retryable(&error) {
            debug!("{} {}: non-retryable error: {}", request.method, request.path, error);
            return Err(error);
        }

        let Some(next) = state.next() else {
            debug!(
                "{} {}: giving up after {} retries: {}",
                request.method, request.path, policy.max_retries, error
            );
            return Err(error);
        };

        warn!(
            remaining = state.remaining(),
            backoff_ms = state.backoff().as_millis() as u64,
            code = %error_code(&error),
            "{} {} failed ({}), retrying",
            request.method,
            request.path,
            error
        );
        tokio::time::sleep(state.backoff()).await;
        state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::transport::MockTransport;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn request() -> RequestDescriptor {
        RequestDescriptor::put("/v3/education/submit/url/scan-1")
            .header("Authorization", "Bearer token")
    }

    fn policy(max_retries: u32, initial_ms: u64) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(initial_ms))
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 10);
        assert_eq!(policy.initial_backoff, Duration::from_millis(2000));
    }

    #[test]
    fn test_retry_state_sequence() {
        let mut state = RetryState::start(&policy(3, 100));
        let mut seen = vec![(state.remaining(), state.backoff())];
        while let Some(next) = state.next() {
            state = next;
            seen.push((state.remaining(), state.backoff()));
        }

        assert_eq!(
            seen,
            vec![
                (3, Duration::from_millis(100)),
                (2, Duration::from_millis(200)),
                (1, Duration::from_millis(400)),
                (0, Duration::from_millis(800)),
            ]
        );
        assert_eq!(state.next(), None);
    }

    #[test]
    fn test_retry_state_zero_budget() {
        assert_eq!(RetryState::start(&policy(0, 100)).next(), None);
    }

    #[test]
    fn test_is_retryable() {
        for status in [429, 500, 502] {
            let err = TransportError::status(RawResponse::new(status, ""));
            assert!(is_retryable(&err), "{} should be retryable", status);
        }
        for status in [400, 401, 403, 404, 503, 504, 512] {
            let err = TransportError::status(RawResponse::new(status, ""));
            assert!(!is_retryable(&err), "{} should not be retryable", status);
        }
        assert!(is_retryable(&TransportError::timeout("timed out")));
        assert!(!is_retryable(&TransportError::other("dns lookup failed")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_success_first_attempt() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(RawResponse::new(200, "ok")));

        let start = Instant::now();
        let response = execute(&transport, "http://api", &request(), &policy(3, 100))
            .await
            .unwrap();

        assert_eq!(response.body, "ok");
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_exhausts_budget_and_returns_last_error() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&attempts);

        let mut transport = MockTransport::new();
        transport.expect_send().times(4).returning(move |_, _| {
            let mut attempts = recorded.lock().unwrap();
            attempts.push(Instant::now());
            Err(TransportError::status(RawResponse::new(
                500,
                format!("failure {}", attempts.len()),
            )))
        });

        let start = Instant::now();
        let err = execute(&transport, "http://api", &request(), &policy(3, 100))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(500));
        assert_eq!(err.response().unwrap().body, "failure 4");

        let offsets: Vec<u128> = attempts
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.duration_since(start).as_millis())
            .collect();
        assert_eq!(offsets, vec![0, 100, 300, 700]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_non_retryable_short_circuits() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _| Err(TransportError::status(RawResponse::new(404, "missing"))));

        let start = Instant::now();
        let err = execute(&transport, "http://api", &request(), &policy(10, 2000))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(404));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_recovers_after_bad_gateway() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&attempts);

        let mut transport = MockTransport::new();
        transport.expect_send().times(3).returning(move |_, _| {
            let mut attempts = recorded.lock().unwrap();
            attempts.push(Instant::now());
            if attempts.len() < 3 {
                Err(TransportError::status(RawResponse::new(502, "")))
            } else {
                Ok(RawResponse::new(200, r#"{"done":true}"#))
            }
        });

        let start = Instant::now();
        let response = execute(&transport, "http://api", &request(), &policy(2, 100))
            .await
            .unwrap();

        assert_eq!(response.body, r#"{"done":true}"#);
        let offsets: Vec<u128> = attempts
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.duration_since(start).as_millis())
            .collect();
        assert_eq!(offsets, vec![0, 100, 300]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_retries_timeouts() {
        let mut transport = MockTransport::new();
        let mut seq = mockall::Sequence::new();
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(TransportError::timeout("timed out waiting for response")));
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(RawResponse::new(201, "")));

        let response = execute(&transport, "http://api", &request(), &policy(1, 50))
            .await
            .unwrap();
        assert_eq!(response.status, 201);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_returns_error_statuses_without_retrying() {
        // A response that was not raised is left to the classifier.
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(RawResponse::new(512, "")));

        let response = execute(&transport, "http://api", &request(), &policy(3, 100))
            .await
            .unwrap();
        assert_eq!(response.status, 512);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_replays_identical_descriptor() {
        let expected = request();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);

        let mut transport = MockTransport::new();
        transport.expect_send().times(3).returning(move |base, req| {
            recorded.lock().unwrap().push((base.to_string(), req.clone()));
            Err(TransportError::status(RawResponse::new(429, "")))
        });

        let err = execute(&transport, "http://api", &expected, &policy(2, 10))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(429));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(
            seen.iter()
                .all(|(base, req)| base == "http://api" && *req == expected)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_back_off_independently() {
        let mut slow = MockTransport::new();
        slow.expect_send()
            .returning(|_, _| Err(TransportError::status(RawResponse::new(500, ""))));
        let mut fast = MockTransport::new();
        fast.expect_send()
            .times(1)
            .returning(|_, _| Ok(RawResponse::new(200, "fast")));

        let request = request();
        let slow_policy = policy(2, 1000);
        let fast_policy = policy(2, 1000);
        let start = Instant::now();
        let (slow_result, fast_result) = tokio::join!(
            execute(&slow, "http://api", &request, &slow_policy),
            async {
                let response = execute(&fast, "http://api", &request, &fast_policy).await;
                (response, start.elapsed())
            }
        );

        assert!(slow_result.is_err());
        let (fast_response, fast_elapsed) = fast_result;
        assert_eq!(fast_response.unwrap().body, "fast");
        assert_eq!(fast_elapsed, Duration::ZERO);
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_logs_retry_fields() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut transport = MockTransport::new();
        let mut seq = mockall::Sequence::new();
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(TransportError::status(RawResponse::new(502, ""))));
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(TransportError::timeout("timed out")));
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(RawResponse::new(200, "")));

        execute(&transport, "http://api", &request(), &policy(2, 100))
            .await
            .unwrap();

        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = output.lines().filter(|l| l.contains("WARN")).collect();
        assert_eq!(lines.len(), 2, "unexpected log output: {}", output);
        assert!(lines[0].contains("remaining=2"));
        assert!(lines[0].contains("backoff_ms=100"));
        assert!(lines[0].contains("code=502"));
        assert!(lines[1].contains("remaining=1"));
        assert!(lines[1].contains("backoff_ms=200"));
        assert!(lines[1].contains("code=timeout"));
    }
}
