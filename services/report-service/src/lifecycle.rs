use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Idle,
    Verifying,
    Generating,
    Polling,
    Completed,
    Failed,
    Timeout,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Idle => "idle",
            ReportStatus::Verifying => "verifying",
            ReportStatus::Generating => "generating",
            ReportStatus::Polling => "polling",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
            ReportStatus::Timeout => "timeout",
        }
    }

    /// Statuses the staleness sweep watches.
    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            ReportStatus::Verifying | ReportStatus::Generating | ReportStatus::Polling
        )
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(ReportStatus::Idle),
            "verifying" => Ok(ReportStatus::Verifying),
            "generating" => Ok(ReportStatus::Generating),
            "polling" => Ok(ReportStatus::Polling),
            "completed" => Ok(ReportStatus::Completed),
            "failed" => Ok(ReportStatus::Failed),
            "timeout" => Ok(ReportStatus::Timeout),
            _ => Err(()),
        }
    }
}

/// The legal-transition table for report jobs.
///
/// Terminal statuses only allow an explicit return to `idle`, so nothing can
/// retry a finished job automatically. `idle -> idle` stays legal to keep
/// resets idempotent, and `verifying -> completed` covers re-verifying a job
/// whose result already exists.
pub fn is_legal_transition(from: ReportStatus, to: ReportStatus) -> bool {
    use ReportStatus::*;

    match from {
        Idle => matches!(to, Verifying | Generating | Idle),
        Verifying => matches!(to, Generating | Polling | Completed | Failed | Timeout),
        Generating => matches!(to, Polling | Completed | Failed | Timeout),
        Polling => matches!(to, Completed | Failed | Timeout),
        Completed | Failed | Timeout => matches!(to, Idle),
    }
}

/// Lifecycle state of one report job as the machine sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobState {
    pub status: ReportStatus,
    pub report_id: Option<Uuid>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl JobState {
    pub fn initial() -> Self {
        Self {
            status: ReportStatus::Idle,
            report_id: None,
            error: None,
            started_at: None,
        }
    }
}

/// Optional field changes applied together with a status change. `None`
/// keeps the current value.
#[derive(Debug, Default, Clone)]
pub struct StateUpdate {
    pub report_id: Option<Uuid>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Applies a status change through the legal-transition table.
///
/// Illegal transitions are absorbed: the current state comes back unchanged
/// and a warning is emitted. Callers must treat the returned state as the
/// source of truth rather than expecting an error. Returning to `idle` is
/// the reset path and the only place `report_id`, `error` and `started_at`
/// are ever cleared.
pub fn transition(current: &JobState, next: ReportStatus, update: StateUpdate) -> JobState {
    if !is_legal_transition(current.status, next) {
        tracing::warn!(
            from = current.status.as_str(),
            to = next.as_str(),
            "transition rejected"
        );
        return current.clone();
    }

    if next == ReportStatus::Idle {
        return JobState::initial();
    }

    JobState {
        status: next,
        report_id: update.report_id.or(current.report_id),
        error: update.error.or_else(|| current.error.clone()),
        started_at: update.started_at.or(current.started_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const ALL: [ReportStatus; 7] = [
        ReportStatus::Idle,
        ReportStatus::Verifying,
        ReportStatus::Generating,
        ReportStatus::Polling,
        ReportStatus::Completed,
        ReportStatus::Failed,
        ReportStatus::Timeout,
    ];

    fn state_with(status: ReportStatus) -> JobState {
        JobState {
            status,
            report_id: Some(Uuid::new_v4()),
            error: Some("previous failure".to_string()),
            started_at: Some(Utc::now()),
        }
    }

    #[test]
    fn initial_state_is_idle_and_empty() {
        let state = JobState::initial();
        assert_eq!(state.status, ReportStatus::Idle);
        assert!(state.report_id.is_none());
        assert!(state.error.is_none());
        assert!(state.started_at.is_none());
    }

    #[test]
    fn table_matches_the_lifecycle() {
        use ReportStatus::*;
        let legal = [
            (Idle, Verifying),
            (Idle, Generating),
            (Idle, Idle),
            (Verifying, Generating),
            (Verifying, Polling),
            (Verifying, Completed),
            (Verifying, Failed),
            (Verifying, Timeout),
            (Generating, Polling),
            (Generating, Completed),
            (Generating, Failed),
            (Generating, Timeout),
            (Polling, Completed),
            (Polling, Failed),
            (Polling, Timeout),
            (Completed, Idle),
            (Failed, Idle),
            (Timeout, Idle),
        ];

        for from in ALL {
            for to in ALL {
                assert_eq!(
                    is_legal_transition(from, to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn illegal_transitions_return_the_state_unchanged() {
        for from in ALL {
            for to in ALL {
                if is_legal_transition(from, to) {
                    continue;
                }
                let current = state_with(from);
                let next = transition(&current, to, StateUpdate::default());
                assert_eq!(next, current, "{from} -> {to} should be a no-op");
            }
        }
    }

    #[test]
    fn terminal_states_only_leave_through_idle() {
        for terminal in [
            ReportStatus::Completed,
            ReportStatus::Failed,
            ReportStatus::Timeout,
        ] {
            let current = state_with(terminal);
            for to in ALL {
                let next = transition(&current, to, StateUpdate::default());
                if to == ReportStatus::Idle {
                    assert_eq!(next.status, ReportStatus::Idle);
                } else {
                    assert_eq!(next.status, terminal, "{terminal} -> {to}");
                }
            }
        }
    }

    #[test]
    fn reset_clears_assignment() {
        let current = state_with(ReportStatus::Completed);
        let next = transition(&current, ReportStatus::Idle, StateUpdate::default());
        assert_eq!(next, JobState::initial());
    }

    #[test]
    fn updates_merge_into_the_new_state() {
        let report_id = Uuid::new_v4();
        let started_at = Utc::now();
        let current = JobState {
            status: ReportStatus::Verifying,
            report_id: None,
            error: None,
            started_at: None,
        };

        let generating = transition(
            &current,
            ReportStatus::Generating,
            StateUpdate {
                report_id: Some(report_id),
                started_at: Some(started_at),
                error: None,
            },
        );
        assert_eq!(generating.status, ReportStatus::Generating);
        assert_eq!(generating.report_id, Some(report_id));
        assert_eq!(generating.started_at, Some(started_at));

        // Fields without an update carry over.
        let completed = transition(&generating, ReportStatus::Completed, StateUpdate::default());
        assert_eq!(completed.report_id, Some(report_id));
        assert_eq!(completed.started_at, Some(started_at));
    }

    #[test]
    fn verifying_completes_directly_on_the_fast_path() {
        let current = JobState {
            status: ReportStatus::Verifying,
            report_id: None,
            error: None,
            started_at: None,
        };
        let next = transition(&current, ReportStatus::Completed, StateUpdate::default());
        assert_eq!(next.status, ReportStatus::Completed);
    }

    #[test]
    fn status_labels_round_trip() {
        for status in ALL {
            assert_eq!(ReportStatus::from_str(status.as_str()), Ok(status));
        }
        assert!(ReportStatus::from_str("queued").is_err());
    }
}
