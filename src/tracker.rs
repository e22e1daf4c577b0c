//! Permission gate and sampling loop.
//!
//! [`LocationTracker`] owns everything that changes over a session: the
//! permission state, the last known position, the reporting baseline and the
//! handle of the one sampling task. It runs that task iff permission is
//! [`PermissionState::Granted`] and a session is active, and reconciles
//! after every change to either signal.
//!
//! Each sampling task processes its ticks one at a time, so two cycles never
//! overlap. Every start and stop bumps a generation counter; a cycle that
//! finishes after its task was replaced or cancelled sees a stale generation
//! and drops its result instead of touching shared state.

use crate::config::Config;
use crate::error::{ApiError, LocationError};
use crate::events::Event;
use crate::location::LocationProvider;
use crate::models::{Coordinate, PermissionState, PositionOptions};
use crate::reporter::{ChangeDetector, CircuitBreaker, Decision, LocationSink, ReportPolicy};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSettings {
    pub sample_interval: Duration,
    /// Timeout for the one-shot acquisition behind `request_permission`.
    pub permission_timeout: Duration,
    /// Timeout for each acquisition inside the sampling loop.
    pub sample_timeout: Duration,
    pub threshold_m: f64,
    pub acquisition_retries: u32,
    pub acquisition_retry_delay: Duration,
    pub report: ReportPolicy,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl TrackerSettings {
    pub fn from_config(config: &Config) -> Self {
        let loc = &config.location;
        Self {
            sample_interval: Duration::from_secs(loc.sample_interval_seconds),
            permission_timeout: Duration::from_secs(loc.permission_timeout_seconds),
            sample_timeout: Duration::from_secs(loc.sample_timeout_seconds),
            threshold_m: loc.report_threshold_meters,
            acquisition_retries: loc.acquisition_retries,
            acquisition_retry_delay: Duration::from_secs(loc.acquisition_retry_delay_seconds),
            report: ReportPolicy::from(&config.report),
        }
    }
}

/// Read-only snapshot for display.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerStatus {
    pub permission: PermissionState,
    pub last_known: Option<Coordinate>,
    pub last_error: Option<String>,
    pub baseline: Option<Coordinate>,
    pub session_active: bool,
    pub sampling: bool,
}

struct State {
    permission: PermissionState,
    session_active: bool,
    last_known: Option<Coordinate>,
    last_error: Option<String>,
    detector: ChangeDetector,
    breaker: CircuitBreaker,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

struct Inner<P, S> {
    provider: P,
    sink: S,
    settings: TrackerSettings,
    state: Mutex<State>,
    events: UnboundedSender<Event>,
}

/// Cheap to clone; all clones drive the same tracker.
pub struct LocationTracker<P, S> {
    inner: Arc<Inner<P, S>>,
}

impl<P, S> Clone for LocationTracker<P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, S> LocationTracker<P, S>
where
    P: LocationProvider + 'static,
    S: LocationSink + 'static,
{
    pub fn new(provider: P, sink: S, settings: TrackerSettings, events: UnboundedSender<Event>) -> Self {
        let state = State {
            permission: PermissionState::Idle,
            session_active: false,
            last_known: None,
            last_error: None,
            detector: ChangeDetector::new(settings.threshold_m),
            breaker: CircuitBreaker::new(
                settings.report.breaker_threshold,
                settings.report.breaker_cooldown,
            ),
            timer: None,
            generation: 0,
        };
        Self {
            inner: Arc::new(Inner {
                provider,
                sink,
                settings,
                state: Mutex::new(state),
                events,
            }),
        }
    }

    pub fn status(&self) -> TrackerStatus {
        let st = self.inner.lock();
        TrackerStatus {
            permission: st.permission,
            last_known: st.last_known,
            last_error: st.last_error.clone(),
            baseline: st.detector.baseline(),
            session_active: st.session_active,
            sampling: st.timer.is_some(),
        }
    }

    pub fn is_sampling(&self) -> bool {
        self.inner.lock().timer.is_some()
    }

    /// Login and logout both start from a clean baseline.
    pub fn set_session_active(&self, active: bool) {
        let mut st = self.inner.lock();
        if st.session_active != active {
            info!(active, "Session state changed");
            st.session_active = active;
            st.detector.reset();
            st.breaker.record_success();
        }
        Inner::reconcile(&self.inner, &mut st);
    }

    /// Asks the platform for a position once. On success permission becomes
    /// `Granted` and sampling starts if a session is active; on failure the
    /// state drops to `Denied` or `Error` and sampling stops.
    ///
    /// Never retries on its own.
    pub async fn request_permission(&self) -> PermissionState {
        {
            let mut st = self.inner.lock();
            st.permission = PermissionState::Requesting;
            st.last_error = None;
            Inner::reconcile(&self.inner, &mut st);
        }
        self.inner.emit(Event::PermissionChanged {
            state: PermissionState::Requesting,
            error: None,
        });

        let result = self.inner.acquire(self.inner.settings.permission_timeout).await;

        let mut st = self.inner.lock();
        if st.permission != PermissionState::Requesting {
            // Superseded by a concurrent request.
            return st.permission;
        }
        match result {
            Ok(coordinate) => {
                info!("Location permission granted at {}", coordinate);
                st.permission = PermissionState::Granted;
                st.last_known = Some(coordinate);
                self.inner.emit(Event::PermissionChanged {
                    state: PermissionState::Granted,
                    error: None,
                });
                self.inner.emit(Event::PositionUpdated(coordinate));
                Inner::reconcile(&self.inner, &mut st);
            }
            Err(e) => self.inner.fail_permission(&mut st, e),
        }
        st.permission
    }

    /// Starts sampling if allowed, replacing any running loop. Returns
    /// whether a loop is running afterwards.
    pub fn start(&self) -> bool {
        let mut st = self.inner.lock();
        if st.can_sample() {
            Inner::start_locked(&self.inner, &mut st);
        }
        st.timer.is_some()
    }

    /// Cancels the sampling loop. Safe to call at any time.
    pub fn stop(&self) {
        self.inner.lock().stop_timer();
    }
}

impl State {
    fn can_sample(&self) -> bool {
        self.session_active && self.permission == PermissionState::Granted
    }

    /// Whether a cycle started under `generation` may still touch state.
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.can_sample()
    }

    fn stop_timer(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.timer.take() {
            handle.abort();
            debug!(generation = self.generation, "Sampling loop stopped");
        }
    }
}

impl<P, S> Inner<P, S>
where
    P: LocationProvider + 'static,
    S: LocationSink + 'static,
{
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: Event) {
        // Nobody listening is fine; the tracker works headless.
        self.events.send(event).ok();
    }

    fn reconcile(this: &Arc<Self>, st: &mut State) {
        if !st.can_sample() {
            st.stop_timer();
        } else if st.timer.is_none() {
            Self::start_locked(this, st);
        }
    }

    fn start_locked(this: &Arc<Self>, st: &mut State) {
        st.stop_timer();
        st.generation += 1;
        let generation = st.generation;
        let inner = Arc::clone(this);
        st.timer = Some(tokio::spawn(async move {
            inner.run(generation).await;
        }));
        debug!(generation, "Sampling loop started");
    }

    fn fail_permission(&self, st: &mut State, error: LocationError) {
        let state = error.permission_state();
        warn!(%state, "Location unavailable: {}", error);
        st.permission = state;
        st.last_error = Some(error.to_string());
        st.detector.reset();
        st.stop_timer();
        self.emit(Event::PermissionChanged {
            state,
            error: Some(error.to_string()),
        });
    }

    async fn run(&self, generation: u64) {
        let period = self.settings.sample_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if !self.sample(generation).await {
                break;
            }
        }
        debug!(generation, "Sampling loop exited");
    }

    async fn acquire(&self, timeout: Duration) -> Result<Coordinate, LocationError> {
        let options = PositionOptions {
            timeout,
            high_accuracy: false,
        };
        let fix = tokio::time::timeout(timeout, self.provider.current_position(options))
            .await
            .map_err(|_| LocationError::Timeout(timeout))??;
        fix.coordinate().ok_or_else(|| {
            LocationError::PositionUnavailable("provider returned an incomplete fix".to_string())
        })
    }

    async fn acquire_with_retries(&self) -> Result<Coordinate, LocationError> {
        let mut retries_left = self.settings.acquisition_retries;
        loop {
            match self.acquire(self.settings.sample_timeout).await {
                Err(e) if e.is_transient() && retries_left > 0 => {
                    retries_left -= 1;
                    debug!(retries_left, "Transient location failure: {}. Retrying.", e);
                    tokio::time::sleep(self.settings.acquisition_retry_delay).await;
                }
                other => return other,
            }
        }
    }

    /// One acquisition/detect/report cycle. Returns `false` once the loop
    /// should end.
    async fn sample(&self, generation: u64) -> bool {
        let acquired = self.acquire_with_retries().await;

        let (current, distance_m) = {
            let mut st = self.lock();
            if !st.is_current(generation) {
                return false;
            }
            let current = match acquired {
                Ok(c) => c,
                Err(e) => {
                    self.fail_permission(&mut st, e);
                    return false;
                }
            };

            st.last_known = Some(current);
            self.emit(Event::PositionUpdated(current));

            if st.breaker.is_open() {
                debug!("Reports suspended; skipping {}", current);
                return true;
            }
            match st.detector.evaluate(&current) {
                Decision::Skip { distance_m } => {
                    debug!(distance_m, "Moved less than {} m; not reporting", st.detector.threshold_m());
                    return true;
                }
                Decision::Report { distance_m } => (current, distance_m),
            }
        };

        let result = self.settings.report.deliver(&self.sink, current).await;

        let mut st = self.lock();
        if !st.is_current(generation) {
            debug!("Discarding report result from a cancelled loop");
            return false;
        }
        match result {
            Ok(()) => {
                info!(?distance_m, "Reported location {}", current);
                st.detector.confirm(current);
                st.breaker.record_success();
                self.emit(Event::LocationReported {
                    coordinate: current,
                    distance_m,
                    timestamp: Utc::now(),
                });
                true
            }
            Err(e @ ApiError::Unauthorized(_)) => {
                warn!("Location report rejected: {}. Ending session.", e);
                st.session_active = false;
                st.detector.reset();
                st.stop_timer();
                self.emit(Event::SessionExpired);
                false
            }
            Err(e) => {
                warn!("Location report failed: {}", e);
                st.breaker.record_failure();
                self.emit(Event::ReportFailed(e.to_string()));
                true
            }
        }
    }
}
