use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

/// Report kinds, ordered by expected generation latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    LifeSummary,
    YearAnalysis,
    FullLife,
    MajorLifePhase,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::LifeSummary => "life-summary",
            ReportType::YearAnalysis => "year-analysis",
            ReportType::FullLife => "full-life",
            ReportType::MajorLifePhase => "major-life-phase",
        }
    }

    /// Nominal ceiling for how long one attempt may sit in a processing
    /// status before the sweep flags it. Multi-section reports get more room.
    pub fn processing_ceiling(&self) -> Duration {
        match self {
            ReportType::LifeSummary => Duration::minutes(2),
            ReportType::YearAnalysis => Duration::minutes(4),
            ReportType::FullLife | ReportType::MajorLifePhase => Duration::minutes(6),
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "life-summary" => Ok(ReportType::LifeSummary),
            "year-analysis" => Ok(ReportType::YearAnalysis),
            "full-life" => Ok(ReportType::FullLife),
            "major-life-phase" => Ok(ReportType::MajorLifePhase),
            _ => Err(()),
        }
    }
}

/// Ceiling applied to report types the table does not know about.
fn default_ceiling() -> Duration {
    Duration::minutes(4)
}

/// No job is flagged stale before this much time has passed, whatever its
/// type ceiling says. Guards the fast report types against transient
/// upstream slowness.
fn stale_floor() -> Duration {
    Duration::minutes(10)
}

/// The two fields the detector needs, as they come out of storage.
pub struct StaleCheck<'a> {
    pub updated_at: Option<&'a str>,
    pub report_type: Option<&'a str>,
}

/// Decides whether a processing job has outlived its window, measured from
/// the last persisted update.
///
/// Missing or unreadable inputs answer `false`: without both fields there is
/// nothing safe to conclude, and "not stale" is the non-destructive default.
pub fn is_processing_stale_at(check: &StaleCheck<'_>, now: DateTime<Utc>) -> bool {
    let Some(raw) = check.updated_at else {
        return false;
    };
    let Some(kind) = check.report_type else {
        return false;
    };
    let Ok(updated_at) = DateTime::parse_from_rfc3339(raw) else {
        return false;
    };

    let ceiling = ReportType::from_str(kind)
        .map(|kind| kind.processing_ceiling())
        .unwrap_or_else(|_| default_ceiling())
        .max(stale_floor());

    now.signed_duration_since(updated_at.with_timezone(&Utc)) > ceiling
}

/// Convenience wrapper over [`is_processing_stale_at`] with the current time.
pub fn is_processing_stale(check: &StaleCheck<'_>) -> bool {
    is_processing_stale_at(check, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes_ago(now: DateTime<Utc>, minutes: i64) -> String {
        (now - Duration::minutes(minutes)).to_rfc3339()
    }

    #[test]
    fn floor_dominates_the_fast_types() {
        let now = Utc::now();
        let updated_at = minutes_ago(now, 3);
        let check = StaleCheck {
            updated_at: Some(&updated_at),
            report_type: Some("life-summary"),
        };
        // Three minutes is past the nominal two-minute ceiling, but still
        // inside the ten-minute floor.
        assert!(!is_processing_stale_at(&check, now));
    }

    #[test]
    fn every_type_is_stale_past_eleven_minutes() {
        let now = Utc::now();
        let updated_at = minutes_ago(now, 11);
        for kind in [
            "life-summary",
            "year-analysis",
            "full-life",
            "major-life-phase",
            "compatibility",
        ] {
            let check = StaleCheck {
                updated_at: Some(&updated_at),
                report_type: Some(kind),
            };
            assert!(is_processing_stale_at(&check, now), "{kind}");
        }
    }

    #[test]
    fn exact_floor_is_not_stale() {
        let now = Utc::now();
        let updated_at = minutes_ago(now, 10);
        let check = StaleCheck {
            updated_at: Some(&updated_at),
            report_type: Some("full-life"),
        };
        // The comparison is strict: exactly ten minutes is still alive.
        assert!(!is_processing_stale_at(&check, now));
    }

    #[test]
    fn missing_inputs_are_never_stale() {
        let now = Utc::now();
        let updated_at = minutes_ago(now, 60);
        assert!(!is_processing_stale_at(
            &StaleCheck {
                updated_at: None,
                report_type: Some("life-summary"),
            },
            now
        ));
        assert!(!is_processing_stale_at(
            &StaleCheck {
                updated_at: Some(&updated_at),
                report_type: None,
            },
            now
        ));
    }

    #[test]
    fn unparseable_timestamp_is_never_stale() {
        let check = StaleCheck {
            updated_at: Some("last tuesday"),
            report_type: Some("year-analysis"),
        };
        assert!(!is_processing_stale_at(&check, Utc::now()));
    }

    #[test]
    fn future_timestamp_is_not_stale() {
        let now = Utc::now();
        let updated_at = (now + Duration::minutes(5)).to_rfc3339();
        let check = StaleCheck {
            updated_at: Some(&updated_at),
            report_type: Some("life-summary"),
        };
        assert!(!is_processing_stale_at(&check, now));
    }

    #[test]
    fn report_type_labels_round_trip() {
        for kind in [
            ReportType::LifeSummary,
            ReportType::YearAnalysis,
            ReportType::FullLife,
            ReportType::MajorLifePhase,
        ] {
            assert_eq!(ReportType::from_str(kind.as_str()), Ok(kind));
        }
        assert!(ReportType::from_str("horoscope").is_err());
    }
}
