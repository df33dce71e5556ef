use crate::models::{DayCounters, DaySummary, ServiceConfig, ServiceHealth, ServiceState};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Day summaries kept per service; older entries are dropped oldest-first.
pub const RETENTION_DAYS: usize = 90;

impl ServiceState {
    pub fn from_config(config: &ServiceConfig, now: DateTime<Utc>) -> Self {
        Self {
            name: config.name.clone(),
            address: config.address.clone(),
            ping_interval: Duration::from_secs(config.ping_interval),
            show_ip: config.show_ip,
            expected_status_code: config.expected_status_code,
            last_ping: now,
            last_status: ServiceHealth::Unknown,
            last_response_time: None,
            daily_history: Vec::new(),
            counters: DayCounters::default(),
            downtime_start: None,
            incident_reported: false,
        }
    }

    /// Overlays the editable config fields, leaving history, counters and
    /// probe state untouched.
    pub fn apply_config(&mut self, config: &ServiceConfig) {
        self.address = config.address.clone();
        self.ping_interval = Duration::from_secs(config.ping_interval);
        self.show_ip = config.show_ip;
        self.expected_status_code = config.expected_status_code;
    }

    /// Zeroes the day counters once the calendar day has advanced past the
    /// last recorded summary. Idempotent; safe to call on every tick.
    pub fn reset_daily_counters(&mut self, now: DateTime<Utc>) {
        if let Some(last) = self.daily_history.last()
            && last.date != now.date_naive()
        {
            self.counters = DayCounters::default();
        }
    }

    /// Folds one probe result into today's summary.
    ///
    /// Appends the summary on the first probe of a day, then recomputes
    /// uptime from the day counters and downtime from the failed-probe count
    /// and the poll cadence. Must run after `reset_daily_counters` so a day
    /// boundary never mixes counters across dates.
    pub fn record_probe(&mut self, now: DateTime<Utc>, online: bool) {
        let today = now.date_naive();
        if self
            .daily_history
            .last()
            .is_none_or(|last| last.date < today)
        {
            self.daily_history.push(DaySummary {
                date: today,
                uptime: 100.0,
                downtime_hours: 0.0,
                issue_number: None,
            });
        }

        self.counters.total += 1;
        if online {
            self.counters.online += 1;
        }

        let uptime = if self.counters.total == 0 {
            0.0
        } else {
            100.0 * self.counters.online as f64 / self.counters.total as f64
        };
        let failed = self.counters.total - self.counters.online;
        let downtime_hours = failed as f64 * self.ping_interval.as_secs_f64() / 3600.0;

        if let Some(summary) = self
            .daily_history
            .iter_mut()
            .rev()
            .find(|day| day.date == today)
        {
            summary.uptime = uptime;
            summary.downtime_hours = downtime_hours;
        }

        if self.daily_history.len() > RETENTION_DAYS {
            let excess = self.daily_history.len() - RETENTION_DAYS;
            self.daily_history.drain(..excess);
        }
    }

    /// The summary for `now`'s calendar day, if one has been recorded.
    pub fn today_summary_mut(&mut self, now: DateTime<Utc>) -> Option<&mut DaySummary> {
        let today = now.date_naive();
        self.daily_history
            .iter_mut()
            .rev()
            .find(|day| day.date == today)
    }
}

/// Merges a freshly loaded service list into live state.
///
/// States matching a config by name take the new config's fields and keep
/// their history; configs with no matching state become fresh states; states
/// whose config disappeared survive unchanged. Order is updated-existing
/// first, appended-new last. Name uniqueness is guaranteed upstream by
/// config validation.
pub fn merge_config(
    existing: Vec<ServiceState>,
    configs: &[ServiceConfig],
    now: DateTime<Utc>,
) -> Vec<ServiceState> {
    let mut merged = existing;
    for state in &mut merged {
        if let Some(config) = configs.iter().find(|c| c.name == state.name) {
            state.apply_config(config);
        }
    }
    for config in configs {
        if !merged.iter().any(|state| state.name == config.name) {
            merged.push(ServiceState::from_config(config, now));
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_config(name: &str, interval_secs: u64) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            address: format!("https://{name}.example.com"),
            ping_interval: interval_secs,
            show_ip: false,
            expected_status_code: None,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, hour, minute, 0).unwrap()
    }

    #[test]
    fn fresh_state_starts_unknown_with_empty_history() {
        let state = ServiceState::from_config(&test_config("api", 60), at(8, 0));
        assert_eq!(state.last_status, ServiceHealth::Unknown);
        assert!(state.daily_history.is_empty());
        assert_eq!(state.counters, DayCounters::default());
        assert!(state.downtime_start.is_none());
    }

    #[test]
    fn uptime_and_downtime_for_mixed_day() {
        // Four probes an hour apart: online, online, offline, online.
        let mut state = ServiceState::from_config(&test_config("api", 3600), at(0, 0));
        for (hour, online) in [(0, true), (1, true), (2, false), (3, true)] {
            let now = at(hour, 0);
            state.reset_daily_counters(now);
            state.record_probe(now, online);
        }

        assert_eq!(state.daily_history.len(), 1);
        let day = &state.daily_history[0];
        assert_eq!(day.uptime, 75.0);
        assert_eq!(day.downtime_hours, 1.0);
    }

    #[test]
    fn counters_stay_consistent_and_uptime_bounded() {
        let mut state = ServiceState::from_config(&test_config("api", 60), at(0, 0));
        let results = [true, false, false, true, false, true, true, false, false];
        for (i, online) in results.into_iter().enumerate() {
            let now = at(1, i as u32);
            state.reset_daily_counters(now);
            state.record_probe(now, online);
            assert!(state.counters.online <= state.counters.total);
            let uptime = state.daily_history.last().unwrap().uptime;
            assert!((0.0..=100.0).contains(&uptime));
        }
    }

    #[test]
    fn one_summary_per_day() {
        let mut state = ServiceState::from_config(&test_config("api", 60), at(0, 0));
        for minute in 0..10 {
            state.record_probe(at(9, minute), true);
        }
        assert_eq!(state.daily_history.len(), 1);
    }

    #[test]
    fn retention_drops_oldest_after_91_days() {
        let mut state = ServiceState::from_config(&test_config("api", 60), at(0, 0));
        let start = at(12, 0);
        for day in 0..91 {
            let now = start + chrono::Duration::days(day);
            state.reset_daily_counters(now);
            state.record_probe(now, true);
        }

        assert_eq!(state.daily_history.len(), RETENTION_DAYS);
        let expected_oldest = (start + chrono::Duration::days(1)).date_naive();
        assert_eq!(state.daily_history[0].date, expected_oldest);
        for pair in state.daily_history.windows(2) {
            assert!(pair[0].date < pair[1].date);
        }
    }

    #[test]
    fn reset_is_idempotent_within_a_day() {
        let mut state = ServiceState::from_config(&test_config("api", 60), at(0, 0));
        state.record_probe(at(10, 0), true);
        state.record_probe(at(10, 1), false);
        let counters = state.counters;

        state.reset_daily_counters(at(10, 2));
        state.reset_daily_counters(at(10, 3));
        assert_eq!(state.counters, counters);
    }

    #[test]
    fn day_boundary_resets_counters_before_first_record() {
        let mut state = ServiceState::from_config(&test_config("api", 3600), at(0, 0));
        state.record_probe(at(22, 0), false);
        state.record_probe(at(23, 0), false);
        assert_eq!(state.counters.total, 2);

        let next_day = at(23, 0) + chrono::Duration::hours(2);
        state.reset_daily_counters(next_day);
        assert_eq!(state.counters, DayCounters::default());

        state.record_probe(next_day, true);
        assert_eq!(state.counters, DayCounters { online: 1, total: 1 });
        let today = state.daily_history.last().unwrap();
        assert_eq!(today.date, next_day.date_naive());
        assert_eq!(today.uptime, 100.0);
        assert_eq!(today.downtime_hours, 0.0);
    }

    #[test]
    fn merge_preserves_history_and_overlays_config() {
        let now = at(8, 0);
        let mut state = ServiceState::from_config(&test_config("api", 60), now);
        state.record_probe(now, true);
        let history = state.daily_history.clone();

        let mut updated = test_config("api", 120);
        updated.address = "https://api.internal.example.com".to_string();
        updated.show_ip = true;

        let merged = merge_config(vec![state], &[updated], now);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].ping_interval, Duration::from_secs(120));
        assert_eq!(merged[0].address, "https://api.internal.example.com");
        assert!(merged[0].show_ip);
        assert_eq!(merged[0].daily_history, history);
        assert_eq!(merged[0].counters.total, 1);
    }

    #[test]
    fn merge_appends_fresh_states_for_new_configs() {
        let now = at(8, 0);
        let existing = vec![ServiceState::from_config(&test_config("api", 60), now)];
        let merged = merge_config(existing, &[test_config("api", 60), test_config("db", 30)], now);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].name, "db");
        assert_eq!(merged[1].last_status, ServiceHealth::Unknown);
        assert!(merged[1].daily_history.is_empty());
    }

    #[test]
    fn merge_retains_states_missing_from_new_config() {
        let now = at(8, 0);
        let mut stale = ServiceState::from_config(&test_config("legacy", 60), now);
        stale.record_probe(now, false);
        let history = stale.daily_history.clone();

        let merged = merge_config(vec![stale], &[test_config("api", 60)], now);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "legacy");
        assert_eq!(merged[0].daily_history, history);
        assert_eq!(merged[1].name, "api");
    }
}
