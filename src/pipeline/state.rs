//! Pipeline state tracking (spec §3 `PipelineState`, §4.11 `StateTracker`).
//!
//! Grounded on the teacher's use of `tokio::sync::broadcast` for
//! fan-out-to-many-subscribers notification; a single `StateTracker`
//! drives zero or more independent streaming consumers (spec §5 "Multiple
//! subscribers each receive all events").

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// A single point-in-time snapshot of pipeline progress (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineState {
    pub stage: String,
    pub progress: u8,
    pub message: String,
    pub details: Option<HashMap<String, Value>>,
    pub is_complete: bool,
    pub error: Option<String>,
}

impl PipelineState {
    fn initial() -> Self {
        Self {
            stage: "INIT".to_string(),
            progress: 0,
            message: "INIT".to_string(),
            details: None,
            is_complete: false,
            error: None,
        }
    }
}

const BROADCAST_CAPACITY: usize = 256;

/// Tracks one pipeline run's progress and fans state changes out to
/// subscribers (spec §4.11). `stage_progress` is the canonical
/// stage-name → percentage mapping `update_stage` consults.
pub struct StateTracker {
    category: String,
    stage_progress: Vec<(String, u8)>,
    state: RwLock<PipelineState>,
    sender: RwLock<broadcast::Sender<PipelineState>>,
}

impl StateTracker {
    pub fn new(category: impl Into<String>, stage_progress: Vec<(String, u8)>) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            category: category.into(),
            stage_progress,
            state: RwLock::new(PipelineState::initial()),
            sender: RwLock::new(sender),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// The registered `stage -> progress` mapping, in registration order
    /// (used to build the streamer's `config` event).
    pub fn stage_definitions(&self) -> Vec<(String, u8)> {
        self.stage_progress.clone()
    }

    pub fn current(&self) -> PipelineState {
        self.state.read().clone()
    }

    /// A bounded FIFO queue of every subsequent state change (spec §4.11
    /// "Subscribers obtain a bounded FIFO queue via `subscribe()`").
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineState> {
        self.sender.read().subscribe()
    }

    fn progress_for(&self, stage: &str) -> u8 {
        self.stage_progress
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, progress)| *progress)
            .unwrap_or(0)
    }

    fn publish(&self, state: PipelineState) {
        *self.state.write() = state.clone();
        // No active subscribers is not an error; the state is still recorded.
        let _ = self.sender.read().send(state);
    }

    /// `update_stage(stage)` (spec §4.11): sets `stage` and looks up its
    /// canonical progress from the registered mapping.
    pub fn update_stage(&self, stage: impl Into<String>) {
        let stage = stage.into();
        let progress = self.progress_for(&stage);
        self.publish(PipelineState {
            message: stage.clone(),
            stage,
            progress,
            details: None,
            is_complete: false,
            error: None,
        });
    }

    /// `update_stage_with_details(stage, message, details)`: same as
    /// `update_stage` but overrides message and attaches structured detail.
    pub fn update_stage_with_details(&self, stage: impl Into<String>, message: impl Into<String>, details: HashMap<String, Value>) {
        let stage = stage.into();
        let progress = self.progress_for(&stage);
        self.publish(PipelineState {
            stage,
            progress,
            message: message.into(),
            details: Some(details),
            is_complete: false,
            error: None,
        });
    }

    /// `update_complete(message)` (spec §4.11): `is_complete=true`,
    /// `progress=100`.
    pub fn update_complete(&self, message: impl Into<String>) {
        self.publish(PipelineState {
            stage: "COMPLETE".to_string(),
            progress: 100,
            message: message.into(),
            details: None,
            is_complete: true,
            error: None,
        });
    }

    /// `update_error(message)` (spec §4.11): sets `error`, `is_complete=true`.
    pub fn update_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.publish(PipelineState {
            stage: "ERROR".to_string(),
            progress: self.state.read().progress,
            message: message.clone(),
            details: None,
            is_complete: true,
            error: Some(message),
        });
    }

    /// `reset()` (spec §4.11): clears state and drains queues — replacing
    /// the broadcast sender drops every existing `Receiver`'s connection to
    /// past events, so current subscribers observe the channel close.
    pub fn reset(&self) {
        *self.state.write() = PipelineState::initial();
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        *self.sender.write() = sender;
    }
}

pub fn new_tracker(category: impl Into<String>, stage_progress: Vec<(String, u8)>) -> Arc<StateTracker> {
    Arc::new(StateTracker::new(category, stage_progress))
}
