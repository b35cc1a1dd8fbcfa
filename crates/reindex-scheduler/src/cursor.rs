//! Cursor advancement for a job after a page has been processed.
//!
//! The new lower bound is derived only from timestamps of resources that
//! were actually reindexed, so conflicted or failed resources at the front
//! of a page never get skipped by a later scan.

use chrono::{DateTime, Duration, Utc};

use reindex_types::ReindexOutcome;

/// What to do with a job once its page of outcomes is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorDecision {
    /// The page was empty; the window is fully processed.
    Complete,
    /// Nothing on a non-empty page succeeded; back off.
    Suspend,
    /// Move `threshold_low` to `new_low`.
    Advance {
        new_low: DateTime<Utc>,
        /// Latest successful timestamp on the page
        latest: DateTime<Utc>,
        /// True when `latest` did not move past the old bound
        stalled: bool,
    },
}

/// Decide the next cursor position for a job scanned from `low`.
///
/// When every success carries the same timestamp the cursor steps one
/// millisecond past it, otherwise it lands exactly on the latest one so
/// resources sharing that timestamp are revisited. A cursor that would not
/// move forward is pushed one millisecond past `low`.
pub fn decide(low: DateTime<Utc>, outcomes: &[ReindexOutcome]) -> CursorDecision {
    if outcomes.is_empty() {
        return CursorDecision::Complete;
    }

    let mut successes = outcomes.iter().filter_map(ReindexOutcome::success_timestamp);
    let Some(first) = successes.next() else {
        return CursorDecision::Suspend;
    };

    let (earliest, latest) = successes.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts)));

    if latest <= low {
        return CursorDecision::Advance {
            new_low: low + Duration::milliseconds(1),
            latest,
            stalled: true,
        };
    }

    let new_low = if earliest == latest {
        latest + Duration::milliseconds(1)
    } else {
        latest
    };

    CursorDecision::Advance {
        new_low,
        latest,
        stalled: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reindex_types::ResourceId;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn ok(offset_ms: i64) -> ReindexOutcome {
        ReindexOutcome::Success(t0() + Duration::milliseconds(offset_ms))
    }

    #[test]
    fn test_empty_page_completes() {
        assert_eq!(decide(t0(), &[]), CursorDecision::Complete);
    }

    #[test]
    fn test_no_successes_suspends() {
        let outcomes = [
            ReindexOutcome::Failure(ResourceId(1)),
            ReindexOutcome::Conflict(ResourceId(2)),
        ];
        assert_eq!(decide(t0(), &outcomes), CursorDecision::Suspend);
    }

    #[test]
    fn test_varying_timestamps_land_on_latest() {
        let outcomes = [ok(1_000), ok(1_000), ok(2_000)];
        assert_eq!(
            decide(t0(), &outcomes),
            CursorDecision::Advance {
                new_low: t0() + Duration::milliseconds(2_000),
                latest: t0() + Duration::milliseconds(2_000),
                stalled: false,
            }
        );
    }

    #[test]
    fn test_identical_timestamps_step_past() {
        let outcomes = [ok(1_000), ok(1_000)];
        match decide(t0() - Duration::seconds(1), &outcomes) {
            CursorDecision::Advance { new_low, stalled, .. } => {
                assert_eq!(new_low, t0() + Duration::milliseconds(1_001));
                assert!(!stalled);
            }
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[test]
    fn test_failures_do_not_move_cursor() {
        // The failure at +5000 must not drag the cursor past the success at +1000
        let outcomes = [ok(1_000), ReindexOutcome::Failure(ResourceId(9)), ok(500)];
        match decide(t0(), &outcomes) {
            CursorDecision::Advance { new_low, .. } => {
                assert_eq!(new_low, t0() + Duration::milliseconds(1_000));
            }
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[test]
    fn test_stalled_cursor_is_forced_forward() {
        let outcomes = [ok(0), ok(0)];
        assert_eq!(
            decide(t0(), &outcomes),
            CursorDecision::Advance {
                new_low: t0() + Duration::milliseconds(1),
                latest: t0(),
                stalled: true,
            }
        );
    }

    #[test]
    fn test_cursor_never_moves_backwards() {
        let pages: [&[ReindexOutcome]; 4] = [
            &[ok(10), ok(20)],
            &[ok(20), ok(20)],
            &[ok(21), ok(30), ReindexOutcome::Conflict(ResourceId(3))],
            &[ok(30)],
        ];
        let mut low = t0();
        for page in pages {
            if let CursorDecision::Advance { new_low, .. } = decide(low, page) {
                assert!(new_low > low);
                low = new_low;
            }
        }
        assert_eq!(low, t0() + Duration::milliseconds(31));
    }
}
