//! # Session Management
//!
//! Registry of live sessions keyed by an opaque connection id. This is the whole public
//! surface the transport layer talks to:
//!
//! - `connect(session_id)` → creates an empty buffer
//! - `frame(session_id, detections)` → normalizes and buffers one frame
//! - `predict(session_id)` → runs the pipeline over the buffer, then clears it
//! - `disconnect(session_id)` → drops the buffer
//!
//! ## Session Isolation:
//! Each buffer sits behind its own `Mutex`, and only events carrying that session's id
//! reach it. The registry lock is held only long enough to look a session up, never
//! across normalization or inference.

use crate::error::PipelineError;
use crate::inference::predictor::SignPredictor;
use crate::inference::ranker::PredictionOutcome;
use crate::landmarks::buffer::SessionBuffer;
use crate::landmarks::frame::{NormalizedFrame, RawFrameDetections};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct SessionManager {
    /// Active sessions mapped by session ID
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionBuffer>>>>,

    /// Maximum number of concurrent sessions allowed (tunable at runtime)
    max_concurrent_sessions: AtomicUsize,

    /// Pipeline shared by every session
    predictor: Arc<SignPredictor>,
}

impl SessionManager {
    pub fn new(predictor: Arc<SignPredictor>, max_concurrent_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_concurrent_sessions: AtomicUsize::new(max_concurrent_sessions),
            predictor,
        }
    }

    /// Register a new connection.
    ///
    /// ## Parameters:
    /// - **session_id**: Connection id. If None, a UUID is generated
    ///
    /// ## Returns:
    /// - **Ok(session_id)**: Session created
    /// - **Err**: Session limit reached, or the id is already live
    pub fn connect(&self, session_id: Option<String>) -> Result<String, PipelineError> {
        let mut sessions = self.sessions.write().unwrap();

        let max_sessions = self.max_concurrent_sessions();
        if sessions.len() >= max_sessions {
            return Err(PipelineError::SessionLimit(max_sessions));
        }

        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if sessions.contains_key(&session_id) {
            return Err(PipelineError::DuplicateSession(session_id));
        }

        let buffer = SessionBuffer::new(self.predictor.schema().clone());
        sessions.insert(session_id.clone(), Arc::new(Mutex::new(buffer)));

        info!(session_id = %session_id, total = sessions.len(), "Client connected");
        Ok(session_id)
    }

    /// Drop a connection's buffer. Returns false if it was already gone.
    pub fn disconnect(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap();
        let removed = sessions.remove(session_id).is_some();

        if removed {
            info!(session_id = %session_id, total = sessions.len(), "Client disconnected");
        }
        removed
    }

    /// Handle a frame event.
    ///
    /// ## Returns:
    /// - **Ok(Some(n))**: frame numbered `n`
    /// - **Ok(None)**: empty payload, ignored
    /// - **Err(UnknownSession)**: no such connection
    pub fn frame(
        &self,
        session_id: &str,
        raw: Option<&RawFrameDetections>,
    ) -> Result<Option<u64>, PipelineError> {
        let session = self.session(session_id)?;
        let mut buffer = session.lock().unwrap();
        Ok(buffer.on_frame(raw))
    }

    /// Run a prediction over everything the session has buffered.
    ///
    /// ## Process:
    /// 1. Snapshot the buffered frames (session lock held briefly)
    /// 2. Run the pipeline without holding any session lock
    /// 3. On success, clear the frames that were consumed; frames that arrived in the
    ///    meantime stay for the next cycle
    ///
    /// On failure the buffer is left as it was.
    pub fn predict(
        &self,
        session_id: &str,
        top_k: usize,
    ) -> Result<PredictionOutcome, PipelineError> {
        let session = self.session(session_id)?;
        let frames: Vec<NormalizedFrame> = session.lock().unwrap().on_predict().to_vec();
        let last_frame = frames.iter().map(NormalizedFrame::frame_number).max();

        debug!(session_id = %session_id, frames = frames.len(), "Predict requested");
        let outcome = self.predictor.predict_frames(&frames, top_k)?;

        if let Some(last_frame) = last_frame {
            session.lock().unwrap().reset_through(last_frame);
        }

        Ok(outcome)
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn get_active_session_ids(&self) -> Vec<String> {
        self.sessions.read().unwrap().keys().cloned().collect()
    }

    pub fn max_concurrent_sessions(&self) -> usize {
        self.max_concurrent_sessions.load(Ordering::Relaxed)
    }

    /// Change the limit. Sessions already connected are never evicted.
    pub fn set_max_concurrent_sessions(&self, max_concurrent_sessions: usize) {
        self.max_concurrent_sessions
            .store(max_concurrent_sessions, Ordering::Relaxed);
    }

    /// Frames currently buffered across all sessions.
    pub fn total_buffered_frames(&self) -> usize {
        let sessions = self.sessions.read().unwrap();
        sessions.values().map(|session| session.lock().unwrap().len()).sum()
    }

    fn session(&self, session_id: &str) -> Result<Arc<Mutex<SessionBuffer>>, PipelineError> {
        let sessions = self.sessions.read().unwrap();
        match sessions.get(session_id) {
            Some(session) => Ok(session.clone()),
            None => {
                warn!(session_id = %session_id, "Event for unknown session");
                Err(PipelineError::UnknownSession(session_id.to_string()))
            }
        }
    }
}
