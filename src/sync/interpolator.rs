use chrono::{DateTime, Duration, Local, Utc};

use crate::{
    classifier::Verdict,
    domain::{Timestamp, day_key},
    storage::{Entries, keys, put, put_timestamp},
};

use super::{
    merge::MergePolicy,
    writer::Coalesced,
};

/// Foreground copy of the daily second counters, advanced once per wall-clock second.
#[derive(Debug, Clone)]
pub struct TimeInterpolator {
    pub focus_seconds: u64,
    pub distracted_seconds: u64,
    pub day: String,
    anchor: Option<Timestamp>,
    last_writeback: Option<Timestamp>,
    writeback_secs: i64,
    max_catch_up_secs: i64,
}

impl TimeInterpolator {
    pub fn new(
        focus_seconds: u64,
        distracted_seconds: u64,
        day: impl Into<String>,
        writeback_secs: i64,
        max_catch_up_secs: i64,
    ) -> Self {
        Self {
            focus_seconds,
            distracted_seconds,
            day: day.into(),
            anchor: None,
            last_writeback: None,
            writeback_secs,
            max_catch_up_secs,
        }
    }

    /// Counts the whole seconds since the last call. A long gap (suspended popup)
    /// only counts up to the catch-up limit; the ticker owns that time.
    pub fn advance(&mut self, now_local: &DateTime<Local>, verdict: &Verdict) -> u64 {
        let now = now_local.with_timezone(&Utc);
        let today = day_key(now_local);
        if today != self.day {
            log::debug!("Interpolator rolled over from {} to {}", self.day, today);
            self.focus_seconds = 0;
            self.distracted_seconds = 0;
            self.day = today;
        }

        let anchor = match self.anchor {
            Some(anchor) if anchor <= now => anchor,
            _ => {
                self.anchor = Some(now);
                return 0;
            }
        };

        let elapsed = (now - anchor).num_seconds();
        if elapsed <= 0 {
            return 0;
        }
        self.anchor = Some(anchor + Duration::seconds(elapsed));

        if !verdict.has_site() {
            return 0;
        }

        let counted = elapsed.min(self.max_catch_up_secs).max(0) as u64;
        if verdict.is_distracting {
            self.distracted_seconds += counted;
        } else {
            self.focus_seconds += counted;
        }
        counted
    }

    /// One-directional reconcile with the stored counters. Returns true when a
    /// stored value was adopted.
    pub fn reconcile(
        &mut self,
        stored_focus: u64,
        stored_distracted: u64,
        stored_day: &str,
        reset_observed: bool,
    ) -> bool {
        if !stored_day.is_empty() && stored_day < self.day.as_str() {
            // The stored counters belong to a day this context already left.
            return false;
        }

        let day_reset = !stored_day.is_empty() && stored_day > self.day.as_str();
        if day_reset {
            self.day = stored_day.to_string();
        }
        let reset = reset_observed || day_reset;

        let policy = MergePolicy::AdoptIfAdvancedOrReset;
        let focus = policy.merge(self.focus_seconds, stored_focus, reset);
        let distracted = policy.merge(self.distracted_seconds, stored_distracted, reset);
        self.focus_seconds = focus.value();
        self.distracted_seconds = distracted.value();

        let adopted = focus.adopted() || distracted.adopted();
        if adopted {
            log::debug!(
                "Adopted stored counters focus={} distracted={} (reset={})",
                self.focus_seconds,
                self.distracted_seconds,
                reset
            );
        }
        adopted
    }

    /// Counters only, without claiming the foreground is active.
    pub fn counter_entries(&self) -> Entries {
        let mut entries = Entries::new();
        // Plain integers and strings always serialize.
        let _ = put(&mut entries, keys::FOCUS_SECONDS, &self.focus_seconds);
        let _ = put(&mut entries, keys::DISTRACTED_SECONDS, &self.distracted_seconds);
        let _ = put(&mut entries, keys::LAST_FOCUS_DATE, &self.day);
        entries
    }

    pub fn entries(&self, now: Timestamp) -> Entries {
        let mut entries = self.counter_entries();
        put_timestamp(&mut entries, keys::FOREGROUND_SEEN_AT, now);
        entries
    }

    /// Periodic write-back, which also marks the foreground as the active context.
    pub fn writeback_due(&mut self, now: Timestamp) -> Option<Coalesced> {
        let due = self
            .last_writeback
            .is_none_or(|last| (now - last).num_seconds() >= self.writeback_secs || now < last);
        if !due {
            return None;
        }
        self.last_writeback = Some(now);
        Some(Coalesced(self.entries(now)))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn local(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 1, 3, h, m, s)
            .single()
            .expect("unambiguous local time")
    }

    fn verdict(distracting: bool) -> Verdict {
        Verdict {
            is_distracting: distracting,
            in_work_hours: true,
            site: Some("example.com".to_string()),
        }
    }

    #[test]
    fn test_counts_whole_seconds() {
        let mut interp = TimeInterpolator::new(0, 0, "2024-01-03", 5, 12);
        let t0 = local(10, 0, 0);
        assert_eq!(interp.advance(&t0, &verdict(false)), 0);
        assert_eq!(interp.advance(&(t0 + Duration::milliseconds(1500)), &verdict(false)), 1);
        assert_eq!(interp.advance(&(t0 + Duration::milliseconds(2100)), &verdict(true)), 1);

        assert_eq!(interp.focus_seconds, 1);
        assert_eq!(interp.distracted_seconds, 1);
    }

    #[test]
    fn test_long_gap_is_capped() {
        let mut interp = TimeInterpolator::new(0, 0, "2024-01-03", 5, 12);
        let t0 = local(10, 0, 0);
        interp.advance(&t0, &verdict(false));
        assert_eq!(interp.advance(&(t0 + Duration::minutes(10)), &verdict(false)), 12);
    }

    #[test]
    fn test_no_site_does_not_count() {
        let mut interp = TimeInterpolator::new(0, 0, "2024-01-03", 5, 12);
        let t0 = local(10, 0, 0);
        let blank = Verdict {
            is_distracting: false,
            in_work_hours: true,
            site: None,
        };
        interp.advance(&t0, &blank);
        interp.advance(&(t0 + Duration::seconds(3)), &blank);
        assert_eq!(interp.focus_seconds, 0);
    }

    #[test]
    fn test_reconcile_adopts_advanced_values_only() {
        let mut interp = TimeInterpolator::new(100, 20, "2024-01-03", 5, 12);

        assert!(!interp.reconcile(90, 20, "2024-01-03", false));
        assert_eq!(interp.focus_seconds, 100);

        assert!(interp.reconcile(130, 20, "2024-01-03", false));
        assert_eq!(interp.focus_seconds, 130);
        // Second identical reconcile is a no-op.
        assert!(!interp.reconcile(130, 20, "2024-01-03", false));
    }

    #[test]
    fn test_reconcile_adopts_reset_values() {
        let mut interp = TimeInterpolator::new(100, 20, "2024-01-03", 5, 12);
        assert!(interp.reconcile(5, 0, "2024-01-04", false));
        assert_eq!((interp.focus_seconds, interp.distracted_seconds), (5, 0));
        assert_eq!(interp.day, "2024-01-04");

        let mut interp = TimeInterpolator::new(100, 20, "2024-01-03", 5, 12);
        assert!(interp.reconcile(0, 0, "2024-01-03", true));
        assert_eq!(interp.focus_seconds, 0);
    }

    #[test]
    fn test_reconcile_ignores_stale_day() {
        let mut interp = TimeInterpolator::new(3, 0, "2024-01-04", 5, 12);
        assert!(!interp.reconcile(5000, 10, "2024-01-03", false));
        assert_eq!(interp.focus_seconds, 3);
    }

    #[test]
    fn test_writeback_cadence() {
        let mut interp = TimeInterpolator::new(7, 1, "2024-01-03", 5, 12);
        let t0 = Utc::now();

        let first = interp.writeback_due(t0).expect("first write-back is immediate");
        assert_eq!(first.0.get(keys::FOCUS_SECONDS), Some(&serde_json::json!(7)));
        assert!(first.0.contains_key(keys::FOREGROUND_SEEN_AT));

        assert!(interp.writeback_due(t0 + Duration::seconds(4)).is_none());
        assert!(interp.writeback_due(t0 + Duration::seconds(5)).is_some());
    }
}
