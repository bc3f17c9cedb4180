use crate::types::AnalysisReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Append-only log of analysis reports, most recent first.
///
/// Clearing the history never touches the library: items stay analyzed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    reports: VecDeque<AnalysisReport>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepends a report so it becomes the first entry of [`History::list`].
    pub fn append(&mut self, report: AnalysisReport) {
        self.reports.push_front(report);
    }

    /// Reports in most-recent-first order.
    pub fn list(&self) -> impl Iterator<Item = &AnalysisReport> {
        self.reports.iter()
    }

    pub fn latest(&self) -> Option<&AnalysisReport> {
        self.reports.front()
    }

    pub fn get(&self, id: i64) -> Option<&AnalysisReport> {
        self.reports.iter().find(|r| r.id == id)
    }

    /// Reports whose covered set includes `item_id`, most recent first.
    pub fn covering<'a>(&'a self, item_id: &'a str) -> impl Iterator<Item = &'a AnalysisReport> {
        self.reports.iter().filter(move |r| r.covers(item_id))
    }

    pub fn clear(&mut self) {
        self.reports.clear();
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Id for the next report: the timestamp in milliseconds, bumped past the newest stored id.
    pub fn next_id(&self, now: DateTime<Utc>) -> i64 {
        let candidate = now.timestamp_millis();
        match self.reports.iter().map(|r| r.id).max() {
            Some(last) if last >= candidate => last + 1,
            _ => candidate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReportPayload;

    fn report(id: i64, items: &[&str]) -> AnalysisReport {
        AnalysisReport::new(
            id,
            Utc::now(),
            ReportPayload {
                patterns: vec![format!("pattern {}", id)],
                ideas: vec![],
            },
            items.iter().map(|s| s.to_string()),
        )
    }

    #[test]
    fn test_append_prepends() {
        let mut history = History::new();
        history.append(report(1, &["a"]));
        history.append(report(2, &["b"]));
        history.append(report(3, &["c"]));

        let ids: Vec<i64> = history.list().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(history.latest().map(|r| r.id), Some(3));
    }

    #[test]
    fn test_lookup_by_id_and_item() {
        let mut history = History::new();
        history.append(report(10, &["a", "b"]));
        history.append(report(20, &["c"]));

        assert_eq!(history.get(10).unwrap().source_item_count, 2);
        assert!(history.get(30).is_none());

        let covering: Vec<i64> = history.covering("b").map(|r| r.id).collect();
        assert_eq!(covering, vec![10]);
        assert_eq!(history.covering("z").count(), 0);
    }

    #[test]
    fn test_next_id_is_strictly_increasing() {
        let now = Utc::now();
        let mut history = History::new();
        let first = history.next_id(now);
        assert_eq!(first, now.timestamp_millis());

        history.append(report(first, &[]));
        let second = history.next_id(now);
        assert_eq!(second, first + 1);
    }

    #[test]
    fn test_clear() {
        let mut history = History::new();
        history.append(report(1, &["a"]));
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.len(), 0);
    }
}
