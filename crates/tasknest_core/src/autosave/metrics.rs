//! Cumulative auto-save counters.

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSaveMetrics {
    pub total_operations: u64,
    pub successful_saves: u64,
    pub failed_saves: u64,
    pub conflict_count: u64,
    pub rollback_count: u64,
    /// Running mean over completed (successful + failed) operations.
    pub average_save_duration_ms: f64,
    /// Unix epoch milliseconds of the last successful save.
    pub last_save_timestamp: Option<i64>,
}

impl AutoSaveMetrics {
    pub(crate) fn record_started(&mut self) {
        self.total_operations += 1;
    }

    pub(crate) fn record_success(&mut self, duration_ms: f64, saved_at: i64) {
        self.successful_saves += 1;
        self.last_save_timestamp = Some(saved_at);
        self.record_duration(duration_ms);
    }

    pub(crate) fn record_failure(&mut self, duration_ms: f64) {
        self.failed_saves += 1;
        self.record_duration(duration_ms);
    }

    pub(crate) fn record_conflict(&mut self) {
        self.conflict_count += 1;
    }

    pub(crate) fn record_rollback(&mut self) {
        self.rollback_count += 1;
    }

    pub fn completed(&self) -> u64 {
        self.successful_saves + self.failed_saves
    }

    /// Successful share of completed operations, `None` before the first one.
    pub fn success_rate(&self) -> Option<f64> {
        match self.completed() {
            0 => None,
            completed => Some(self.successful_saves as f64 / completed as f64),
        }
    }

    fn record_duration(&mut self, duration_ms: f64) {
        let completed = self.completed() as f64;
        self.average_save_duration_ms += (duration_ms - self.average_save_duration_ms) / completed;
    }
}

#[cfg(test)]
mod tests {
    use super::AutoSaveMetrics;

    #[test]
    fn average_tracks_all_completed_operations() {
        let mut metrics = AutoSaveMetrics::default();
        metrics.record_success(10.0, 1);
        metrics.record_failure(30.0);
        metrics.record_success(20.0, 2);

        assert_eq!(metrics.completed(), 3);
        assert!((metrics.average_save_duration_ms - 20.0).abs() < f64::EPSILON);
        assert_eq!(metrics.last_save_timestamp, Some(2));
        assert_eq!(metrics.success_rate(), Some(2.0 / 3.0));
    }
}
