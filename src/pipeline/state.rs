//! Persisted progress of a pipeline run

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, Stage};
use crate::io::write_json_atomic;

/// Stage that failed and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

/// Contents of `run_state.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Last stage whose artifacts are committed
    pub completed: Option<Stage>,
    pub failed: Option<StageFailure>,
}

impl RunState {
    /// Load the state file; a missing file is a fresh run
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json_atomic(path, self)
    }

    /// First stage not yet committed
    pub fn next_stage(&self) -> Option<Stage> {
        match self.completed {
            None => Some(Stage::Step1),
            Some(Stage::Step1) => Some(Stage::Step2),
            Some(Stage::Step2) => Some(Stage::Step3),
            Some(Stage::Step3) => None,
        }
    }

    pub fn mark_completed(&mut self, stage: Stage) {
        self.completed = Some(stage);
        self.failed = None;
    }

    /// Record a failure. Stages from `stage` on are no longer committed,
    /// so a resumed run restarts there.
    pub fn mark_failed(&mut self, stage: Stage, message: String) {
        if self.completed.map_or(false, |done| done >= stage) {
            self.completed = stage.previous();
        }
        self.failed = Some(StageFailure { stage, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_fresh_run() {
        let dir = TempDir::new().unwrap();
        let state = RunState::load(dir.path().join("run_state.json")).unwrap();
        assert_eq!(state, RunState::default());
        assert_eq!(state.next_stage(), Some(Stage::Step1));
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run_state.json");
        let mut state = RunState::default();
        state.mark_completed(Stage::Step1);
        state.mark_failed(Stage::Step2, "schema error".to_string());
        state.save(&path).unwrap();

        let loaded = RunState::load(&path).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.next_stage(), Some(Stage::Step2));
    }

    #[test]
    fn test_failed_rerun_lowers_completed() {
        let mut state = RunState::default();
        state.mark_completed(Stage::Step3);
        state.mark_failed(Stage::Step1, "counts unreadable".to_string());
        assert_eq!(state.completed, None);
        assert_eq!(state.next_stage(), Some(Stage::Step1));

        let mut state = RunState::default();
        state.mark_completed(Stage::Step3);
        state.mark_failed(Stage::Step3, "bad pathways".to_string());
        assert_eq!(state.completed, Some(Stage::Step2));

        let mut state = RunState::default();
        state.mark_completed(Stage::Step1);
        state.mark_failed(Stage::Step3, "missing filtered matrix".to_string());
        assert_eq!(state.completed, Some(Stage::Step1));
    }
}
