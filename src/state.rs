//! # Application State Management
//!
//! Shared state handed to every HTTP handler and websocket actor through `web::Data`.
//!
//! ## What lives here:
//! - **config**: Runtime configuration, readable by many handlers, patchable via `PUT /api/v1/config`
//! - **metrics**: Request and prediction counters, updated by middleware and handlers
//! - **predictor**: The loaded schema/vocabulary/model, read-only after startup
//! - **sessions**: Registry of live websocket sessions
//!
//! ## Arc<RwLock<T>> Pattern:
//! Config and metrics are read far more often than written, so both sit behind an
//! `RwLock`. The predictor and session registry manage their own locking internally and
//! are only wrapped in `Arc`.

use crate::config::AppConfig;
use crate::inference::predictor::SignPredictor;
use crate::inference::ranker::PredictionOutcome;
use crate::landmarks::session::SessionManager;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The main application state that's shared across all request handlers.
///
/// Cloning is cheap: every field is an `Arc` or `Copy`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Counters updated on every request and prediction
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,

    /// Schema, vocabulary and model shared by every session
    pub predictor: Arc<SignPredictor>,

    /// Live websocket sessions
    pub sessions: Arc<SessionManager>,
}

/// Counters collected since server start.
///
/// ## Prediction counters:
/// - **frames_received**: Frame events that were numbered and buffered
/// - **predictions_served**: Predict cycles that ran the model and produced candidates
/// - **no_frames_outcomes**: Predict cycles with nothing buffered
/// - **no_confident_outcomes**: Predict cycles where every score was NaN
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    pub frames_received: u64,
    pub predictions_served: u64,
    pub no_frames_outcomes: u64,
    pub no_confident_outcomes: u64,

    /// Key: endpoint name (e.g., "GET /health")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a single API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    pub error_count: u64,
}

impl AppState {
    /// Create the state from a validated config and a loaded predictor.
    pub fn new(config: AppConfig, predictor: Arc<SignPredictor>) -> Self {
        let sessions = Arc::new(SessionManager::new(
            predictor.clone(),
            config.performance.max_concurrent_sessions,
        ));

        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
            predictor,
            sessions,
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the lock immediately, so other threads aren't blocked.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it.
    ///
    /// The session limit is pushed into the live registry; model settings are ignored
    /// by the running predictor until the next restart.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                self.sessions
                    .set_max_concurrent_sessions(new_config.performance.max_concurrent_sessions);
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Candidates returned per prediction, read fresh on every cycle.
    pub fn top_k(&self) -> usize {
        self.config.read().unwrap().performance.top_k
    }

    /// Called by middleware for every request.
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Called for any 4xx/5xx response.
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record timing for a specific endpoint.
    ///
    /// The first time we see an endpoint, a default `EndpointMetric` is created.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn record_frame(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.frames_received += 1;
    }

    /// Count a finished predict cycle by its outcome.
    pub fn record_outcome(&self, outcome: &PredictionOutcome) {
        let mut metrics = self.metrics.write().unwrap();
        match outcome {
            PredictionOutcome::NoFrames => metrics.no_frames_outcomes += 1,
            PredictionOutcome::NoConfidentPrediction => metrics.no_confident_outcomes += 1,
            PredictionOutcome::Ranked(_) => metrics.predictions_served += 1,
        }
    }

    /// Snapshot of current metrics, cloned so the lock is not held while serializing.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::app_state;
    use super::*;
    use crate::inference::ranker::SignCandidate;

    #[test]
    fn test_endpoint_metrics() {
        let state = app_state();
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let metrics = state.get_metrics_snapshot();
        let health = &metrics.endpoint_metrics["GET /health"];
        assert_eq!(health.request_count, 2);
        assert_eq!(health.average_duration_ms(), 20.0);
        assert_eq!(health.error_rate(), 0.5);
    }

    #[test]
    fn test_outcome_counters() {
        let state = app_state();
        state.record_outcome(&PredictionOutcome::NoFrames);
        state.record_outcome(&PredictionOutcome::NoConfidentPrediction);
        state.record_outcome(&PredictionOutcome::Ranked(vec![SignCandidate {
            sign_id: 0,
            sign: "TV".to_string(),
            confidence: 0.9,
        }]));

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.no_frames_outcomes, 1);
        assert_eq!(metrics.no_confident_outcomes, 1);
        assert_eq!(metrics.predictions_served, 1);
    }

    #[test]
    fn test_update_config_resizes_session_limit() {
        let state = app_state();
        let mut config = state.get_config();
        config.performance.max_concurrent_sessions = 1;
        state.update_config(config).unwrap();

        state.sessions.connect(None).unwrap();
        assert!(state.sessions.connect(None).is_err());

        let mut invalid = state.get_config();
        invalid.performance.top_k = 0;
        assert!(state.update_config(invalid).is_err());
        assert_eq!(state.top_k(), 10);
    }
}
