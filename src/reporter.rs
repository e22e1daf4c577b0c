//! Movement detection and reporting policy.
//!
//! [`ChangeDetector`] decides whether a fresh sample is worth sending, based
//! on its distance from the last coordinate the backend actually accepted.
//! [`ReportPolicy`] bounds how hard a single tick tries to deliver a report,
//! and [`CircuitBreaker`] pauses reporting after a run of failed ticks.

use crate::config::ReportConfig;
use crate::error::ApiError;
use crate::models::Coordinate;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_THRESHOLD_M: f64 = 100.0;

/// Destination for location reports.
pub trait LocationSink: Send + Sync {
    fn report(&self, coordinate: Coordinate)
        -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl<T: LocationSink> LocationSink for Arc<T> {
    fn report(&self, coordinate: Coordinate)
        -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).report(coordinate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// `distance_m` is `None` when there was no baseline to compare against.
    Report { distance_m: Option<f64> },
    Skip { distance_m: f64 },
}

impl Decision {
    pub fn should_report(&self) -> bool {
        matches!(self, Decision::Report { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ChangeDetector {
    threshold_m: f64,
    baseline: Option<Coordinate>,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_M)
    }
}

impl ChangeDetector {
    pub fn new(threshold_m: f64) -> Self {
        Self {
            threshold_m,
            baseline: None,
        }
    }

    pub fn baseline(&self) -> Option<Coordinate> {
        self.baseline
    }

    pub fn threshold_m(&self) -> f64 {
        self.threshold_m
    }

    /// The threshold is inclusive: moving exactly `threshold_m` reports.
    pub fn evaluate(&self, current: &Coordinate) -> Decision {
        match &self.baseline {
            None => Decision::Report { distance_m: None },
            Some(baseline) => {
                let distance_m = baseline.distance_to(current);
                if distance_m >= self.threshold_m {
                    Decision::Report {
                        distance_m: Some(distance_m),
                    }
                } else {
                    Decision::Skip { distance_m }
                }
            }
        }
    }

    /// Records `reported` as the new baseline. Only call after the backend
    /// accepted it.
    pub fn confirm(&mut self, reported: Coordinate) {
        self.baseline = Some(reported);
    }

    pub fn reset(&mut self) {
        self.baseline = None;
    }
}

/// Per-tick retry bounds for a single report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
}

impl Default for ReportPolicy {
    fn default() -> Self {
        Self::from(&ReportConfig::default())
    }
}

impl From<&ReportConfig> for ReportPolicy {
    fn from(config: &ReportConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            breaker_threshold: config.breaker_threshold,
            breaker_cooldown: Duration::from_secs(config.breaker_cooldown_seconds),
        }
    }
}

impl ReportPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` counts from 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Sends `coordinate`, retrying non-auth failures with exponential backoff.
    pub async fn deliver<S: LocationSink>(
        &self,
        sink: &S,
        coordinate: Coordinate,
    ) -> Result<(), ApiError> {
        let mut attempt = 1;
        loop {
            match sink.report(coordinate).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_auth() || attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.backoff(attempt);
                    warn!(attempt, ?delay, "Location report failed: {}. Retrying.", e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Opens after `threshold` consecutive failed ticks and stays open for
/// `cooldown`. A threshold of zero disables it.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            consecutive_failures: 0,
            open_until: None,
        }
    }

    pub fn is_open(&mut self) -> bool {
        match self.open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                debug!("Report circuit breaker closed after cooldown");
                self.open_until = None;
                self.consecutive_failures = 0;
                false
            }
            None => false,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.open_until = None;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.threshold > 0 && self.consecutive_failures >= self.threshold {
            warn!(
                failures = self.consecutive_failures,
                cooldown = ?self.cooldown,
                "Suspending location reports"
            );
            self.open_until = Some(Instant::now() + self.cooldown);
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{haversine_meters, EARTH_RADIUS_M};
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const ORIGIN: Coordinate = Coordinate::new(40.0, -74.0);

    fn north_of(origin: Coordinate, meters: f64) -> Coordinate {
        let d_lat = (meters / EARTH_RADIUS_M).to_degrees();
        Coordinate::new(origin.latitude + d_lat, origin.longitude)
    }

    #[test]
    fn first_sample_always_reports() {
        let detector = ChangeDetector::default();
        assert_eq!(
            detector.evaluate(&ORIGIN),
            Decision::Report { distance_m: None }
        );
    }

    #[test]
    fn hundred_meter_example_reports() {
        let mut detector = ChangeDetector::default();
        detector.confirm(ORIGIN);

        let moved = Coordinate::new(40.0009, -74.0);
        match detector.evaluate(&moved) {
            Decision::Report { distance_m: Some(d) } => assert!(d > 100.0 && d < 100.2),
            other => panic!("expected report, got {other:?}"),
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let target = north_of(ORIGIN, 100.0);
        let exact = haversine_meters(&ORIGIN, &target);
        assert!((exact - 100.0).abs() < 1e-6);

        let mut detector = ChangeDetector::new(exact);
        detector.confirm(ORIGIN);
        assert!(detector.evaluate(&target).should_report());
    }

    #[test]
    fn ninety_nine_meters_is_skipped() {
        let mut detector = ChangeDetector::default();
        detector.confirm(ORIGIN);

        let decision = detector.evaluate(&north_of(ORIGIN, 99.0));
        assert!(!decision.should_report());
        assert_eq!(detector.baseline(), Some(ORIGIN));
    }

    #[test]
    fn reset_forgets_baseline() {
        let mut detector = ChangeDetector::default();
        detector.confirm(ORIGIN);
        detector.reset();
        assert_eq!(detector.baseline(), None);
        assert!(detector.evaluate(&ORIGIN).should_report());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ReportPolicy {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            ..ReportPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(5));
        assert_eq!(policy.backoff(40), Duration::from_secs(5));
    }

    struct Scripted {
        responses: Mutex<VecDeque<Result<(), ApiError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<(), ApiError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl LocationSink for Scripted {
        async fn report(&self, _coordinate: Coordinate) -> Result<(), ApiError> {
            *self.calls.lock().unwrap() += 1;
            self.responses.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deliver_retries_server_errors() {
        let sink = Scripted::new(vec![
            Err(ApiError::Status(StatusCode::BAD_GATEWAY)),
            Err(ApiError::Status(StatusCode::SERVICE_UNAVAILABLE)),
        ]);
        let policy = ReportPolicy::default();

        assert!(policy.deliver(&sink, ORIGIN).await.is_ok());
        assert_eq!(sink.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn deliver_gives_up_after_max_attempts() {
        let sink = Scripted::new(vec![
            Err(ApiError::Status(StatusCode::INTERNAL_SERVER_ERROR)),
            Err(ApiError::Status(StatusCode::INTERNAL_SERVER_ERROR)),
            Err(ApiError::Status(StatusCode::INTERNAL_SERVER_ERROR)),
            Ok(()),
        ]);
        let policy = ReportPolicy::default();

        let result = policy.deliver(&sink, ORIGIN).await;
        assert!(matches!(result, Err(ApiError::Status(_))));
        assert_eq!(sink.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn deliver_never_retries_auth_failures() {
        let sink = Scripted::new(vec![Err(ApiError::Unauthorized(StatusCode::FORBIDDEN))]);
        let result = ReportPolicy::default().deliver(&sink, ORIGIN).await;
        assert!(result.unwrap_err().is_auth());
        assert_eq!(sink.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opens_then_recovers() {
        let mut breaker = CircuitBreaker::new(2, Duration::from_secs(30));
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!breaker.is_open());
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn zero_threshold_never_opens() {
        let mut breaker = CircuitBreaker::new(0, Duration::from_secs(30));
        for _ in 0..10 {
            breaker.record_failure();
        }
        assert!(!breaker.is_open());
    }
}
