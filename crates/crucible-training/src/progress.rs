use crate::run::{RunId, RunStatus, StageName, StageOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    RunStarted { run_id: RunId, dataset_type: String, model_type: String },
    StageStarted { run_id: RunId, stage: StageName },
    StageFinished { run_id: RunId, stage: StageName, outcome: StageOutcome, duration_ms: u64 },
    RunFinished { run_id: RunId, status: RunStatus },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_event(&self, _event: ProgressEvent) {}
}

/// Forwards events to `tracing` at info level.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { run_id, dataset_type, model_type } => {
                info!(
                    run_id = %run_id,
                    dataset = %dataset_type,
                    model = %model_type,
                    "Run started"
                );
            }
            ProgressEvent::StageStarted { run_id, stage } => {
                info!(run_id = %run_id, stage = %stage, "Stage started");
            }
            ProgressEvent::StageFinished { run_id, stage, outcome, duration_ms } => {
                info!(
                    run_id = %run_id,
                    stage = %stage,
                    outcome = ?outcome,
                    duration_ms,
                    "Stage finished"
                );
            }
            ProgressEvent::RunFinished { run_id, status } => {
                info!(run_id = %run_id, status = %status, "Run finished");
            }
        }
    }
}

/// Buffers events in memory.
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgressSink {
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ProgressSink for RecordingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
