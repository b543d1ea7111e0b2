// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Error history — bounded record of component failures for the operator
// surface (recent-error counts and per-component summaries).

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

/// Entries kept before the oldest are dropped.
pub const MAX_HISTORY: usize = 1000;

/// One recorded error.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub component: String,
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

/// Errors grouped over a trailing time period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorSummary {
    pub time_period_hours: u32,
    pub total_errors: usize,
    pub errors_by_component: BTreeMap<String, usize>,
    pub errors_by_type: BTreeMap<String, usize>,
    pub most_problematic_component: Option<String>,
}

#[derive(Debug, Default)]
pub struct ErrorHistory {
    records: Mutex<VecDeque<ErrorRecord>>,
}

impl ErrorHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: ErrorRecord) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push_back(record);
        while records.len() > MAX_HISTORY {
            records.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of errors recorded within `window` of `now`.
    pub fn count_since(&self, now: DateTime<Utc>, window: ChronoDuration) -> usize {
        let cutoff = now - window;
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .count()
    }

    pub fn summary(&self, now: DateTime<Utc>, hours: u32) -> ErrorSummary {
        let cutoff = now - ChronoDuration::hours(i64::from(hours));
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());

        let mut by_component: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut total = 0;
        for record in records.iter().filter(|r| r.timestamp >= cutoff) {
            total += 1;
            *by_component.entry(record.component.clone()).or_default() += 1;
            *by_type.entry(record.error_type.clone()).or_default() += 1;
        }

        // Ties resolve to the alphabetically first component.
        let most_problematic_component = by_component
            .iter()
            .fold(None::<(&String, usize)>, |best, (name, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((name, count)),
            })
            .map(|(name, _)| name.clone());

        ErrorSummary {
            time_period_hours: hours,
            total_errors: total,
            errors_by_component: by_component,
            errors_by_type: by_type,
            most_problematic_component,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(component: &str, error_type: &str, at: DateTime<Utc>) -> ErrorRecord {
        ErrorRecord {
            timestamp: at,
            component: component.to_string(),
            error_type: error_type.to_string(),
            message: "boom".to_string(),
            context: None,
        }
    }

    #[test]
    fn history_is_bounded() {
        let history = ErrorHistory::new();
        let now = Utc::now();
        for _ in 0..(MAX_HISTORY + 25) {
            history.push(record("generation", "timeout", now));
        }
        assert_eq!(history.len(), MAX_HISTORY);
    }

    #[test]
    fn recent_count_respects_window() {
        let history = ErrorHistory::new();
        let now = Utc::now();
        history.push(record("generation", "timeout", now - ChronoDuration::minutes(10)));
        history.push(record("generation", "timeout", now - ChronoDuration::minutes(1)));
        assert_eq!(history.count_since(now, ChronoDuration::minutes(5)), 1);
    }

    #[test]
    fn summary_groups_and_ranks() {
        let history = ErrorHistory::new();
        let now = Utc::now();
        history.push(record("code_executor", "call_failed", now));
        history.push(record("code_executor", "timeout", now));
        history.push(record("generation", "timeout", now));
        history.push(record("validation", "call_failed", now - ChronoDuration::hours(30)));

        let summary = history.summary(now, 24);
        assert_eq!(summary.total_errors, 3);
        assert_eq!(summary.errors_by_component["code_executor"], 2);
        assert_eq!(summary.errors_by_type["timeout"], 2);
        assert!(!summary.errors_by_component.contains_key("validation"));
        assert_eq!(summary.most_problematic_component.as_deref(), Some("code_executor"));
    }

    #[test]
    fn empty_summary_has_no_leader() {
        let summary = ErrorHistory::new().summary(Utc::now(), 1);
        assert_eq!(summary.total_errors, 0);
        assert_eq!(summary.most_problematic_component, None);
    }
}
