// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Detection workflow
//!
//! One attempt at a time: camera (or library pick), upload, inference,
//! results. A generation counter tags each attempt; an in-flight inference
//! reply whose tag no longer matches the live attempt is dropped on the
//! floor instead of being applied to a newer or empty attempt.
//!
//! The history append after a successful attempt is fire-and-forget: it
//! never gates the transition to `Ready`, and a failure is reported on the
//! notice channel, never as a workflow error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::history::{create_entry, HistoryStore};
use crate::identity::{Identity, SessionState};
use crate::inference::{ImageRef, Infer, InferenceReply, RawDetection};
use crate::taxonomy::{Condition, UNMAPPED_PLAN};
use crate::{Result, ScanError};

/// Summary text for a successful attempt with zero detections.
pub const NO_DISEASE_MARKER: &str = "No disease detected.";

/// Why an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    NetworkError,
    MalformedResponse,
}

/// Attempt lifecycle. Monotonic within one attempt; only `reset` (explicit
/// or implied by a new library pick) goes backwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AttemptStatus {
    #[default]
    Empty,
    CameraLive,
    Captured,
    Uploading,
    Ready,
    Failed(FailReason),
}

/// One shaped detection with its care plan attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f64,
    pub treatment: String,
    pub recommendation: String,
    pub prevention: String,
    pub source: String,
}

impl Detection {
    fn shape(raw: &RawDetection) -> Self {
        match Condition::from_label(&raw.label) {
            Some(condition) => {
                let plan = condition.care_plan();
                Self {
                    class_name: condition.display_name().to_string(),
                    confidence: raw.confidence,
                    treatment: plan.treatment.to_string(),
                    recommendation: plan.recommendation.to_string(),
                    prevention: plan.prevention.to_string(),
                    source: plan.source.to_string(),
                }
            }
            None => Self {
                class_name: raw.label.clone(),
                confidence: raw.confidence,
                treatment: UNMAPPED_PLAN.treatment.to_string(),
                recommendation: UNMAPPED_PLAN.recommendation.to_string(),
                prevention: UNMAPPED_PLAN.prevention.to_string(),
                source: UNMAPPED_PLAN.source.to_string(),
            },
        }
    }
}

/// The live detection attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionAttempt {
    pub image: Option<ImageRef>,
    pub status: AttemptStatus,
    pub detections: Vec<Detection>,
    pub overlay: Option<Vec<u8>>,
    pub summary: String,
}

/// Out-of-band reports that never change workflow state.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowNotice {
    HistoryAppendFailed(String),
}

pub struct DetectionWorkflow {
    inference: Arc<dyn Infer>,
    history: HistoryStore,
    session: watch::Receiver<SessionState>,
    timeout: Duration,
    state: watch::Sender<DetectionAttempt>,
    generation: AtomicU64,
    // Guards status check-and-publish; never held across an await
    transitions: Mutex<()>,
    notice_tx: mpsc::UnboundedSender<WorkflowNotice>,
    notice_rx: Mutex<Option<mpsc::UnboundedReceiver<WorkflowNotice>>>,
    last_append: Mutex<Option<JoinHandle<()>>>,
}

impl DetectionWorkflow {
    pub fn new(
        inference: Arc<dyn Infer>,
        history: HistoryStore,
        session: watch::Receiver<SessionState>,
        timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(DetectionAttempt::default());
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        Self {
            inference,
            history,
            session,
            timeout,
            state,
            generation: AtomicU64::new(0),
            transitions: Mutex::new(()),
            notice_tx,
            notice_rx: Mutex::new(Some(notice_rx)),
            last_append: Mutex::new(None),
        }
    }

    /// Observe attempt state changes.
    pub fn subscribe(&self) -> watch::Receiver<DetectionAttempt> {
        self.state.subscribe()
    }

    pub fn attempt(&self) -> DetectionAttempt {
        self.state.borrow().clone()
    }

    /// Take the notice receiver. Yields `Some` only on the first call.
    pub fn take_notices(&self) -> Option<mpsc::UnboundedReceiver<WorkflowNotice>> {
        self.notice_rx.lock().unwrap().take()
    }

    /// Open the camera for a fresh attempt.
    pub fn start_camera(&self) -> Result<()> {
        let _guard = self.transitions.lock().unwrap();
        match self.state.borrow().status {
            AttemptStatus::Empty => {}
            ref status => {
                return Err(ScanError::InvalidState(format!(
                    "Cannot open camera while {:?}",
                    status
                )))
            }
        }

        self.state.send_replace(DetectionAttempt {
            status: AttemptStatus::CameraLive,
            ..Default::default()
        });
        Ok(())
    }

    /// Take the live camera photo and submit it.
    pub async fn capture(&self, image: ImageRef) -> Result<()> {
        let token = {
            let _guard = self.transitions.lock().unwrap();
            if self.state.borrow().status != AttemptStatus::CameraLive {
                return Err(ScanError::InvalidState(
                    "Capture is only valid with the camera open".to_string(),
                ));
            }
            self.begin_upload(image.clone())
        };

        self.submit(image, token).await;
        Ok(())
    }

    /// Submit a library image. Valid on an empty or finished attempt; a
    /// finished attempt is implicitly reset first.
    pub async fn pick_from_library(&self, image: ImageRef) -> Result<()> {
        let token = {
            let _guard = self.transitions.lock().unwrap();
            match self.state.borrow().status {
                AttemptStatus::Empty | AttemptStatus::Ready | AttemptStatus::Failed(_) => {}
                ref status => {
                    return Err(ScanError::InvalidState(format!(
                        "Cannot start a new attempt while {:?}",
                        status
                    )))
                }
            }
            self.begin_upload(image.clone())
        };

        self.submit(image, token).await;
        Ok(())
    }

    /// Discard the current attempt. An in-flight inference reply for the
    /// discarded attempt will be ignored when it arrives; a history append
    /// already dispatched is unaffected.
    pub fn reset(&self) {
        let _guard = self.transitions.lock().unwrap();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(DetectionAttempt::default());
    }

    /// Wait for the most recently dispatched history append to settle.
    pub async fn flush_appends(&self) {
        let handle = self.last_append.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    // Caller holds the transitions lock.
    fn begin_upload(&self, image: ImageRef) -> u64 {
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(DetectionAttempt {
            image: Some(image.clone()),
            status: AttemptStatus::Captured,
            ..Default::default()
        });
        self.state.send_replace(DetectionAttempt {
            image: Some(image),
            status: AttemptStatus::Uploading,
            ..Default::default()
        });
        token
    }

    async fn submit(&self, image: ImageRef, token: u64) {
        let outcome = tokio::time::timeout(self.timeout, self.inference.predict(&image)).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(ScanError::Network("Inference request timed out".to_string())),
        };

        let _guard = self.transitions.lock().unwrap();
        if self.generation.load(Ordering::SeqCst) != token {
            debug!("Discarding stale inference reply for attempt {}", token);
            return;
        }

        match result {
            Ok(reply) => self.apply_reply(image, reply),
            Err(e) => {
                let reason = match e {
                    ScanError::MalformedResponse(_) => FailReason::MalformedResponse,
                    _ => FailReason::NetworkError,
                };
                warn!("Inference failed: {}", e);
                self.state.send_replace(DetectionAttempt {
                    image: Some(image),
                    status: AttemptStatus::Failed(reason),
                    ..Default::default()
                });
            }
        }
    }

    // Caller holds the transitions lock and has verified the token.
    fn apply_reply(&self, image: ImageRef, reply: InferenceReply) {
        let overlay = match reply.overlay_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Dropping undecodable overlay: {}", e);
                None
            }
        };

        if reply.detections.is_empty() {
            self.state.send_replace(DetectionAttempt {
                image: Some(image),
                status: AttemptStatus::Ready,
                detections: Vec::new(),
                overlay,
                summary: NO_DISEASE_MARKER.to_string(),
            });
            return;
        }

        let detections: Vec<Detection> = reply.detections.iter().map(Detection::shape).collect();
        let names: Vec<&str> = detections.iter().map(|d| d.class_name.as_str()).collect();
        let summary = format!("Detected classes: {}", names.join(", "));

        self.dispatch_history_append(&image, &detections);

        self.state.send_replace(DetectionAttempt {
            image: Some(image),
            status: AttemptStatus::Ready,
            detections,
            overlay,
            summary,
        });
    }

    fn dispatch_history_append(&self, image: &ImageRef, detections: &[Detection]) {
        // Identity is read now, at dispatch time, never cached earlier
        let identity = self
            .session
            .borrow()
            .identity()
            .cloned()
            .unwrap_or(Identity::SignedOut);

        let disease = detections
            .iter()
            .map(|d| d.class_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let confidence = detections
            .iter()
            .map(|d| d.confidence)
            .fold(0.0_f64, f64::max);
        let entry = create_entry(disease, confidence, image.as_str().to_string());

        let history = self.history.clone();
        let notices = self.notice_tx.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = history.append(&identity, entry).await {
                warn!("Failed to record detection history: {}", e);
                let _ = notices.send(WorkflowNotice::HistoryAppendFailed(e.to_string()));
            }
        });

        *self.last_append.lock().unwrap() = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalStore;
    use crate::users::MemoryUserDirectory;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    #[derive(Clone)]
    enum MockOutcome {
        Reply(InferenceReply),
        Network,
        Malformed,
        Hang,
    }

    struct MockInference {
        outcome: Mutex<MockOutcome>,
        gate: Option<Arc<Notify>>,
    }

    impl MockInference {
        fn replying(reply: InferenceReply) -> Self {
            Self {
                outcome: Mutex::new(MockOutcome::Reply(reply)),
                gate: None,
            }
        }

        fn with(outcome: MockOutcome) -> Self {
            Self {
                outcome: Mutex::new(outcome),
                gate: None,
            }
        }

        fn gated(reply: InferenceReply, gate: Arc<Notify>) -> Self {
            Self {
                outcome: Mutex::new(MockOutcome::Reply(reply)),
                gate: Some(gate),
            }
        }
    }

    #[async_trait]
    impl Infer for MockInference {
        async fn predict(&self, _image: &ImageRef) -> Result<InferenceReply> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let outcome = self.outcome.lock().unwrap().clone();
            match outcome {
                MockOutcome::Reply(reply) => Ok(reply),
                MockOutcome::Network => Err(ScanError::Network("connection refused".to_string())),
                MockOutcome::Malformed => {
                    Err(ScanError::MalformedResponse("not json".to_string()))
                }
                MockOutcome::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    fn reply_with(labels: &[(&str, f64)]) -> InferenceReply {
        InferenceReply {
            detections: labels
                .iter()
                .map(|(label, confidence)| RawDetection {
                    label: label.to_string(),
                    confidence: *confidence,
                })
                .collect(),
            overlay_base64: None,
        }
    }

    struct Fixture {
        workflow: Arc<DetectionWorkflow>,
        history: HistoryStore,
        _session_tx: watch::Sender<SessionState>,
    }

    fn fixture_with(inference: MockInference, identity: Identity) -> Fixture {
        let history = HistoryStore::new(
            Arc::new(MemoryUserDirectory::new()),
            LocalStore::in_memory().unwrap(),
        );
        let (session_tx, session_rx) = watch::channel(SessionState::Resolved(identity));
        let workflow = Arc::new(DetectionWorkflow::new(
            Arc::new(inference),
            history.clone(),
            session_rx,
            Duration::from_secs(5),
        ));
        Fixture {
            workflow,
            history,
            _session_tx: session_tx,
        }
    }

    fn img(name: &str) -> ImageRef {
        ImageRef::new(name)
    }

    #[tokio::test]
    async fn capture_requires_the_camera_to_be_open() {
        let f = fixture_with(MockInference::replying(reply_with(&[])), Identity::Guest);
        let err = f.workflow.capture(img("a.jpg")).await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidState(_)));
        assert_eq!(f.workflow.attempt().status, AttemptStatus::Empty);
    }

    #[tokio::test]
    async fn capture_flow_reaches_ready_with_shaped_detections() {
        let f = fixture_with(
            MockInference::replying(reply_with(&[("Caries", 0.91), ("Calculus", 0.4)])),
            Identity::Guest,
        );

        f.workflow.start_camera().unwrap();
        f.workflow.capture(img("mouth.jpg")).await.unwrap();

        let attempt = f.workflow.attempt();
        assert_eq!(attempt.status, AttemptStatus::Ready);
        assert_eq!(attempt.summary, "Detected classes: Caries, Calculus");
        assert_eq!(attempt.detections.len(), 2);
        assert!(attempt.detections[0].treatment.contains("filling"));
        assert_eq!(attempt.image, Some(img("mouth.jpg")));
    }

    #[tokio::test]
    async fn completed_attempt_appends_history_for_current_identity() {
        let f = fixture_with(
            MockInference::replying(reply_with(&[("Gingivitis", 0.77), ("Ulcers", 0.5)])),
            Identity::Guest,
        );

        f.workflow.pick_from_library(img("pick.jpg")).await.unwrap();
        f.workflow.flush_appends().await;

        let entries = f.history.list(&Identity::Guest).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].disease, "Gingivitis, Ulcers");
        assert!((entries[0].confidence - 0.77).abs() < 1e-9);
        assert_eq!(entries[0].image, "pick.jpg");
    }

    #[tokio::test]
    async fn zero_detections_is_ready_with_marker_not_failed() {
        let f = fixture_with(MockInference::replying(reply_with(&[])), Identity::Guest);

        f.workflow.pick_from_library(img("clean.jpg")).await.unwrap();

        let attempt = f.workflow.attempt();
        assert_eq!(attempt.status, AttemptStatus::Ready);
        assert!(attempt.detections.is_empty());
        assert_eq!(attempt.summary, NO_DISEASE_MARKER);

        // Nothing to record without a detection
        f.workflow.flush_appends().await;
        assert!(f.history.list(&Identity::Guest).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_reaches_failed_network() {
        let f = fixture_with(MockInference::with(MockOutcome::Network), Identity::Guest);
        f.workflow.pick_from_library(img("a.jpg")).await.unwrap();
        assert_eq!(
            f.workflow.attempt().status,
            AttemptStatus::Failed(FailReason::NetworkError)
        );
    }

    #[tokio::test]
    async fn undecodable_reply_reaches_failed_malformed() {
        let f = fixture_with(MockInference::with(MockOutcome::Malformed), Identity::Guest);
        f.workflow.pick_from_library(img("a.jpg")).await.unwrap();
        assert_eq!(
            f.workflow.attempt().status,
            AttemptStatus::Failed(FailReason::MalformedResponse)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hung_inference_times_out_as_network_failure() {
        let f = fixture_with(MockInference::with(MockOutcome::Hang), Identity::Guest);
        f.workflow.pick_from_library(img("a.jpg")).await.unwrap();
        assert_eq!(
            f.workflow.attempt().status,
            AttemptStatus::Failed(FailReason::NetworkError)
        );
    }

    #[tokio::test]
    async fn stale_reply_after_reset_is_discarded() {
        let gate = Arc::new(Notify::new());
        let f = fixture_with(
            MockInference::gated(reply_with(&[("Caries", 0.9)]), gate.clone()),
            Identity::Guest,
        );

        let workflow = f.workflow.clone();
        let inflight =
            tokio::spawn(async move { workflow.pick_from_library(img("stale.jpg")).await });

        let mut rx = f.workflow.subscribe();
        rx.wait_for(|a| a.status == AttemptStatus::Uploading)
            .await
            .unwrap();

        f.workflow.reset();
        assert_eq!(f.workflow.attempt().status, AttemptStatus::Empty);

        // Let attempt A's reply arrive now; it must not be applied
        gate.notify_one();
        inflight.await.unwrap().unwrap();

        let attempt = f.workflow.attempt();
        assert_eq!(attempt.status, AttemptStatus::Empty);
        assert!(attempt.detections.is_empty());
        f.workflow.flush_appends().await;
        assert!(f.history.list(&Identity::Guest).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn new_attempts_are_blocked_while_uploading() {
        let gate = Arc::new(Notify::new());
        let f = fixture_with(
            MockInference::gated(reply_with(&[]), gate.clone()),
            Identity::Guest,
        );

        let workflow = f.workflow.clone();
        let inflight =
            tokio::spawn(async move { workflow.pick_from_library(img("first.jpg")).await });

        let mut rx = f.workflow.subscribe();
        rx.wait_for(|a| a.status == AttemptStatus::Uploading)
            .await
            .unwrap();

        let err = f
            .workflow
            .pick_from_library(img("second.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidState(_)));
        assert!(matches!(
            f.workflow.start_camera(),
            Err(ScanError::InvalidState(_))
        ));

        gate.notify_one();
        inflight.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn library_pick_implicitly_resets_a_finished_attempt() {
        let f = fixture_with(
            MockInference::replying(reply_with(&[("Ulcers", 0.8)])),
            Identity::Guest,
        );

        f.workflow.pick_from_library(img("one.jpg")).await.unwrap();
        assert_eq!(f.workflow.attempt().status, AttemptStatus::Ready);

        f.workflow.pick_from_library(img("two.jpg")).await.unwrap();
        let attempt = f.workflow.attempt();
        assert_eq!(attempt.status, AttemptStatus::Ready);
        assert_eq!(attempt.image, Some(img("two.jpg")));
    }

    #[tokio::test]
    async fn reset_does_not_cancel_a_dispatched_append() {
        let f = fixture_with(
            MockInference::replying(reply_with(&[("Calculus", 0.66)])),
            Identity::Guest,
        );

        f.workflow.pick_from_library(img("kept.jpg")).await.unwrap();
        f.workflow.reset();
        assert_eq!(f.workflow.attempt().status, AttemptStatus::Empty);

        f.workflow.flush_appends().await;
        assert_eq!(f.history.list(&Identity::Guest).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unmapped_label_gets_the_placeholder_plan() {
        let f = fixture_with(
            MockInference::replying(reply_with(&[("Abscess", 0.7)])),
            Identity::Guest,
        );

        f.workflow.pick_from_library(img("a.jpg")).await.unwrap();

        let attempt = f.workflow.attempt();
        assert_eq!(attempt.status, AttemptStatus::Ready);
        assert_eq!(attempt.detections[0].class_name, "Abscess");
        assert_eq!(attempt.detections[0].treatment, "No treatment plan available.");
    }

    #[tokio::test]
    async fn signed_out_attempt_completes_without_persisting() {
        let f = fixture_with(
            MockInference::replying(reply_with(&[("Caries", 0.9)])),
            Identity::SignedOut,
        );

        f.workflow.pick_from_library(img("a.jpg")).await.unwrap();
        assert_eq!(f.workflow.attempt().status, AttemptStatus::Ready);

        f.workflow.flush_appends().await;
        assert!(f.history.list(&Identity::Guest).await.unwrap().is_empty());
        assert!(f
            .history
            .list(&Identity::SignedOut)
            .await
            .unwrap()
            .is_empty());
    }
}
