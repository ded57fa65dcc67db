//! Run lifecycle tracking.
//!
//! Runs move `pending -> running -> {completed, failed}`. Every mutation
//! happens under the write lock, so the stage log of each run is
//! linearizable even when several pipelines share one tracker.

use chrono::Utc;
use crucible_training::{
    Run, RunId, RunPayload, RunSpec, RunStatus, StageRecord, TrainingError, TrainingResult,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// In-memory record of every run started through this instance.
#[derive(Clone, Default)]
pub struct RunTracker {
    runs: Arc<RwLock<HashMap<RunId, Run>>>,
}

impl fmt::Debug for RunTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunTracker")
            .field("run_count", &self.runs.try_read().map(|r| r.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl RunTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn transition(run: &mut Run, to: RunStatus) -> TrainingResult<()> {
        if !run.status.can_transition_to(to) {
            error!(
                run_id = %run.run_id,
                from = %run.status,
                to = %to,
                "Invalid run transition"
            );
            return Err(TrainingError::InvalidTransition {
                run_id: run.run_id.to_string(),
                from: run.status,
                to,
            });
        }
        debug!(run_id = %run.run_id, from = %run.status, to = %to, "Run transition");
        run.status = to;
        Ok(())
    }

    /// Register a new run and move it to `running`. The id is unique among
    /// runs held by this tracker.
    pub async fn start(&self, spec: RunSpec) -> TrainingResult<RunId> {
        let mut runs = self.runs.write().await;
        let mut run_id = RunId::new();
        while runs.contains_key(&run_id) {
            run_id = RunId::new();
        }

        let mut run = Run::new(run_id.clone(), spec);
        Self::transition(&mut run, RunStatus::Running)?;
        runs.insert(run_id.clone(), run);
        Ok(run_id)
    }

    /// Append a stage record. Rejected once the run is terminal.
    pub async fn record_stage(&self, run_id: &RunId, record: StageRecord) -> TrainingResult<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| TrainingError::RunNotFound(run_id.to_string()))?;
        if run.status.is_terminal() {
            error!(
                run_id = %run_id,
                stage = %record.stage,
                status = %run.status,
                "Stage recorded on terminal run"
            );
            return Err(TrainingError::InvalidTransition {
                run_id: run_id.to_string(),
                from: run.status,
                to: run.status,
            });
        }
        debug!(
            run_id = %run_id,
            stage = %record.stage,
            outcome = ?record.outcome,
            "Stage recorded"
        );
        run.stages.push(record);
        Ok(())
    }

    /// Move the run to a terminal `status`, attach the payload, and stamp `ended_at`.
    pub async fn finalize(
        &self,
        run_id: &RunId,
        status: RunStatus,
        payload: RunPayload,
    ) -> TrainingResult<Run> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| TrainingError::RunNotFound(run_id.to_string()))?;
        if !status.is_terminal() {
            error!(run_id = %run_id, to = %status, "Finalize requires a terminal status");
            return Err(TrainingError::InvalidTransition {
                run_id: run_id.to_string(),
                from: run.status,
                to: status,
            });
        }
        Self::transition(run, status)?;
        run.result = Some(payload);
        run.ended_at = Some(Utc::now());
        Ok(run.clone())
    }

    pub async fn get(&self, run_id: &RunId) -> Option<Run> {
        self.runs.read().await.get(run_id).cloned()
    }

    /// All runs ordered by start time, ties broken by id.
    pub async fn list(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| (a.started_at, &a.run_id).cmp(&(b.started_at, &b.run_id)));
        runs
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_training::StageName;

    fn spec() -> RunSpec {
        RunSpec { dataset_type: "iris".into(), model_type: "svm".into(), run_validation: true }
    }

    #[tokio::test]
    async fn test_start_creates_running_run() {
        let tracker = RunTracker::new();
        let run_id = tracker.start(spec()).await.unwrap();
        let run = tracker.get(&run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.ended_at.is_none());
        assert!(run.result.is_none());
    }

    #[tokio::test]
    async fn test_finalize_is_terminal() {
        let tracker = RunTracker::new();
        let run_id = tracker.start(spec()).await.unwrap();
        let run =
            tracker.finalize(&run_id, RunStatus::Completed, RunPayload::default()).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.ended_at.is_some());

        let err =
            tracker.finalize(&run_id, RunStatus::Failed, RunPayload::default()).await.unwrap_err();
        assert!(matches!(err, TrainingError::InvalidTransition { from: RunStatus::Completed, .. }));

        let err = tracker
            .record_stage(&run_id, StageRecord::skipped(StageName::Validate))
            .await
            .unwrap_err();
        assert!(err.is_defect());
        assert!(tracker.get(&run_id).await.unwrap().stages.is_empty());
    }

    #[tokio::test]
    async fn test_finalize_requires_terminal_status() {
        let tracker = RunTracker::new();
        let run_id = tracker.start(spec()).await.unwrap();
        let err =
            tracker.finalize(&run_id, RunStatus::Running, RunPayload::default()).await.unwrap_err();
        assert!(matches!(err, TrainingError::InvalidTransition { .. }));
        assert_eq!(tracker.get(&run_id).await.unwrap().status, RunStatus::Running);
    }

    #[tokio::test]
    async fn test_unknown_run() {
        let tracker = RunTracker::new();
        let missing = RunId("nope".into());
        assert!(matches!(
            tracker.record_stage(&missing, StageRecord::skipped(StageName::Train)).await,
            Err(TrainingError::RunNotFound(_))
        ));
        assert!(tracker.get(&missing).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_stage_appends_preserve_per_task_order() {
        let tracker = RunTracker::new();
        let run_id = tracker.start(spec()).await.unwrap();

        let mut handles = Vec::new();
        for stage in [StageName::Train, StageName::Evaluate] {
            let tracker = tracker.clone();
            let run_id = run_id.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25u64 {
                    let record = StageRecord::ok(stage, Utc::now(), i);
                    tracker.record_stage(&run_id, record).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let run = tracker.get(&run_id).await.unwrap();
        assert_eq!(run.stages.len(), 50);
        for stage in [StageName::Train, StageName::Evaluate] {
            let order: Vec<u64> =
                run.stages.iter().filter(|s| s.stage == stage).map(|s| s.duration_ms).collect();
            assert_eq!(order, (0..25).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_ids_unique() {
        let tracker = RunTracker::new();
        for _ in 0..10 {
            tracker.start(spec()).await.unwrap();
        }
        let runs = tracker.list().await;
        assert_eq!(runs.len(), 10);
        assert!(
            runs.windows(2)
                .all(|w| (w[0].started_at, &w[0].run_id) < (w[1].started_at, &w[1].run_id))
        );
    }

    #[tokio::test]
    async fn test_list_orders_by_start_time_not_id() {
        let tracker = RunTracker::new();
        let a = tracker.start(spec()).await.unwrap();
        let b = tracker.start(spec()).await.unwrap();
        let (low, high) = if a < b { (a, b) } else { (b, a) };

        // The higher id started first.
        let now = Utc::now();
        {
            let mut runs = tracker.runs.write().await;
            runs.get_mut(&high).unwrap().started_at = now - chrono::Duration::seconds(5);
            runs.get_mut(&low).unwrap().started_at = now;
        }

        let listed: Vec<RunId> = tracker.list().await.into_iter().map(|r| r.run_id).collect();
        assert_eq!(listed, vec![high, low]);
    }
}
