//! Monotonic cost tally for a running host, computed on read rather than
//! accumulated — there is nothing to reconcile if the process restarts.

use chrono::{DateTime, Utc};

const HOURS_PER_MONTH: f64 = 30.0 * 24.0;

/// `(now - created_at) * hourly_rate`, capped at `monthly_rate` per elapsed
/// month so a long-lived host never reports more than the provider would
/// actually bill. Both terms are non-decreasing in `now`, so the minimum is
/// too.
pub fn compute(created_at: DateTime<Utc>, hourly_rate: f64, monthly_rate: f64, now: DateTime<Utc>) -> f64 {
    let elapsed_hours = (now - created_at).num_seconds() as f64 / 3600.0;
    if elapsed_hours <= 0.0 {
        return 0.0;
    }
    let raw = elapsed_hours * hourly_rate;
    let months_elapsed = (elapsed_hours / HOURS_PER_MONTH).ceil().max(1.0);
    let cap = monthly_rate * months_elapsed;
    raw.min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn cost_is_monotonic_over_time() {
        let created = Utc::now() - Duration::hours(100);
        let t1 = created + Duration::hours(10);
        let t2 = created + Duration::hours(50);
        let c1 = compute(created, 0.0045, 2.76, t1);
        let c2 = compute(created, 0.0045, 2.76, t2);
        assert!(c2 >= c1);
    }

    #[test]
    fn cost_respects_monthly_cap() {
        let created = Utc::now() - Duration::days(400);
        let now = Utc::now();
        let cost = compute(created, 0.0045, 2.76, now);
        let months = ((400.0 * 24.0) / HOURS_PER_MONTH).ceil();
        assert!(cost <= 2.76 * months + 1e-9);
    }

    #[test]
    fn zero_elapsed_is_zero_cost() {
        let now = Utc::now();
        assert_eq!(compute(now, 0.0045, 2.76, now), 0.0);
    }
}
