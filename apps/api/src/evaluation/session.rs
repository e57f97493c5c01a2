//! Re-evaluation Session Tracker — per-candidate state machine for explicit,
//! user-initiated re-runs of evaluation.
//!
//! Independent of the batch coordinator's processed set: a candidate may be
//! manually re-evaluated any number of times regardless of batch history.
//! Exactly one source may be in flight per candidate at a time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

/// Which evaluation source the user picked from the options panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReEvalSource {
    Transcript,
    ExternalAssessment,
    SalesAssessment,
}

/// `Idle → OptionsShown → InFlight → (success → Idle) | (failure → OptionsShown + error)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "source")]
pub enum ReEvalPhase {
    Idle,
    OptionsShown,
    InFlight(ReEvalSource),
}

#[derive(Debug, Clone, Serialize)]
pub struct ReEvalState {
    pub phase: ReEvalPhase,
    pub error: Option<String>,
}

impl Default for ReEvalState {
    fn default() -> Self {
        Self {
            phase: ReEvalPhase::Idle,
            error: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReEvaluationTracker {
    states: HashMap<Uuid, ReEvalState>,
}

impl ReEvaluationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, candidate_id: Uuid) -> ReEvalState {
        self.states.get(&candidate_id).cloned().unwrap_or_default()
    }

    pub fn is_in_flight(&self, candidate_id: Uuid) -> bool {
        matches!(self.state(candidate_id).phase, ReEvalPhase::InFlight(_))
    }

    pub fn show_options(&mut self, candidate_id: Uuid) {
        let state = self.states.entry(candidate_id).or_default();
        if !matches!(state.phase, ReEvalPhase::InFlight(_)) {
            state.phase = ReEvalPhase::OptionsShown;
        }
    }

    pub fn hide_options(&mut self, candidate_id: Uuid) {
        if let Some(state) = self.states.get_mut(&candidate_id) {
            if !matches!(state.phase, ReEvalPhase::InFlight(_)) {
                *state = ReEvalState::default();
            }
        }
    }

    /// Begins a re-evaluation with the chosen source. Rejects if another
    /// source is already in flight for this candidate.
    pub fn begin(&mut self, candidate_id: Uuid, source: ReEvalSource) -> Result<(), AppError> {
        let state = self.states.entry(candidate_id).or_default();
        if let ReEvalPhase::InFlight(active) = state.phase {
            return Err(AppError::Validation(format!(
                "Re-evaluation already in flight for candidate {candidate_id} (source {active:?})"
            )));
        }
        state.phase = ReEvalPhase::InFlight(source);
        state.error = None;
        Ok(())
    }

    /// Success path: the new record replaced the old one; back to idle.
    pub fn complete(&mut self, candidate_id: Uuid) {
        self.states.insert(candidate_id, ReEvalState::default());
    }

    /// Failure path: back to the options panel with the error set, so the
    /// user can pick a source again.
    pub fn fail(&mut self, candidate_id: Uuid, error: impl Into<String>) {
        self.states.insert(
            candidate_id,
            ReEvalState {
                phase: ReEvalPhase::OptionsShown,
                error: Some(error.into()),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_candidate_is_idle() {
        let tracker = ReEvaluationTracker::new();
        let state = tracker.state(Uuid::new_v4());
        assert_eq!(state.phase, ReEvalPhase::Idle);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_full_success_cycle() {
        let id = Uuid::new_v4();
        let mut tracker = ReEvaluationTracker::new();

        tracker.show_options(id);
        assert_eq!(tracker.state(id).phase, ReEvalPhase::OptionsShown);

        tracker.begin(id, ReEvalSource::Transcript).unwrap();
        assert_eq!(
            tracker.state(id).phase,
            ReEvalPhase::InFlight(ReEvalSource::Transcript)
        );
        assert!(tracker.is_in_flight(id));

        tracker.complete(id);
        assert_eq!(tracker.state(id).phase, ReEvalPhase::Idle);
    }

    #[test]
    fn test_failure_returns_to_options_with_error() {
        let id = Uuid::new_v4();
        let mut tracker = ReEvaluationTracker::new();
        tracker.show_options(id);
        tracker.begin(id, ReEvalSource::ExternalAssessment).unwrap();

        tracker.fail(id, "assessment provider unavailable");
        let state = tracker.state(id);
        assert_eq!(state.phase, ReEvalPhase::OptionsShown);
        assert_eq!(
            state.error.as_deref(),
            Some("assessment provider unavailable")
        );
    }

    #[test]
    fn test_second_source_rejected_while_in_flight() {
        let id = Uuid::new_v4();
        let mut tracker = ReEvaluationTracker::new();
        tracker.begin(id, ReEvalSource::SalesAssessment).unwrap();

        let err = tracker.begin(id, ReEvalSource::Transcript);
        assert!(err.is_err());
        // The original source is still the one in flight.
        assert_eq!(
            tracker.state(id).phase,
            ReEvalPhase::InFlight(ReEvalSource::SalesAssessment)
        );
    }

    #[test]
    fn test_begin_clears_previous_error() {
        let id = Uuid::new_v4();
        let mut tracker = ReEvaluationTracker::new();
        tracker.begin(id, ReEvalSource::Transcript).unwrap();
        tracker.fail(id, "parse error");

        tracker.begin(id, ReEvalSource::Transcript).unwrap();
        assert!(tracker.state(id).error.is_none());
    }

    #[test]
    fn test_hide_options_does_not_cancel_in_flight() {
        let id = Uuid::new_v4();
        let mut tracker = ReEvaluationTracker::new();
        tracker.begin(id, ReEvalSource::Transcript).unwrap();
        tracker.hide_options(id);
        assert!(tracker.is_in_flight(id));
    }

    #[test]
    fn test_candidates_are_tracked_independently() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut tracker = ReEvaluationTracker::new();
        tracker.begin(a, ReEvalSource::Transcript).unwrap();

        assert!(tracker.begin(b, ReEvalSource::ExternalAssessment).is_ok());
        assert!(tracker.is_in_flight(a));
        assert!(tracker.is_in_flight(b));
    }
}
