//! Occurrence History

use crate::{Occurrence, OccurrenceBuilder, TriggerValues};
use chrono::{DateTime, Utc};
use fault_templates::FaultState;
use std::collections::VecDeque;
use tracing::debug;

/// Closed occurrences plus at most one open occurrence, in time order.
///
/// With a limit set, the oldest closed occurrences are dropped first.
#[derive(Debug, Clone)]
pub struct OccurrenceLog {
    builder: OccurrenceBuilder,
    closed: VecDeque<Occurrence>,
    open: Option<Occurrence>,
    max_closed: Option<usize>,
    dropped: u64,
    faulted_total: usize,
}

impl OccurrenceLog {
    pub fn new(builder: OccurrenceBuilder) -> Self {
        Self {
            builder,
            closed: VecDeque::new(),
            open: None,
            max_closed: None,
            dropped: 0,
            faulted_total: 0,
        }
    }

    /// Keep at most `max_closed` closed occurrences
    pub fn with_limit(mut self, max_closed: usize) -> Self {
        self.max_closed = Some(max_closed);
        self
    }

    /// Apply the state observed at `at`.
    ///
    /// Extends the open occurrence when its state matches, otherwise closes it
    /// and opens a new one. `Unknown` only closes.
    /// Returns the newly opened occurrence, if any.
    pub fn record(&mut self, state: FaultState, at: DateTime<Utc>, values: TriggerValues) -> Option<&Occurrence> {
        if state == FaultState::Unknown {
            self.close_open(at);
            return None;
        }

        if let Some(open) = self.open.as_mut() {
            if open.state == state {
                self.builder.extend(open, at, values);
                return None;
            }
        }

        self.close_open(at);
        let occurrence = self.builder.open(state, at, values);
        if occurrence.is_faulted() {
            self.faulted_total += 1;
        }
        debug!(
            "Opened occurrence #{} ({}) for {} at {}",
            occurrence.sequence, state, occurrence.equipment_id, at
        );
        self.open = Some(occurrence);
        self.open.as_ref()
    }

    /// Record that input data is missing at `at`, described by `reason`.
    ///
    /// An open missing-data occurrence is extended and takes the latest reason.
    pub fn record_missing(
        &mut self,
        at: DateTime<Utc>,
        reason: String,
        values: TriggerValues,
    ) -> Option<&Occurrence> {
        if let Some(open) = self.open.as_mut() {
            if open.state == FaultState::Unknown {
                open.values = values;
                open.text = reason;
                return None;
            }
        }

        self.close_open(at);
        let occurrence = self.builder.open_missing(at, reason, values);
        debug!(
            "Opened occurrence #{} (missing data) for {} at {}: {}",
            occurrence.sequence, occurrence.equipment_id, at, occurrence.text
        );
        self.open = Some(occurrence);
        self.open.as_ref()
    }

    /// Close the open occurrence at `as_of`
    pub fn flush(&mut self, as_of: DateTime<Utc>) -> Option<&Occurrence> {
        if self.close_open(as_of) {
            self.closed.back()
        } else {
            None
        }
    }

    fn close_open(&mut self, at: DateTime<Utc>) -> bool {
        let Some(mut occurrence) = self.open.take() else {
            return false;
        };
        self.builder.close(&mut occurrence, at);
        self.closed.push_back(occurrence);
        if let Some(max) = self.max_closed {
            while self.closed.len() > max {
                self.closed.pop_front();
                self.dropped += 1;
            }
        }
        true
    }

    /// Retained occurrences, oldest first; the open one (if any) is last
    pub fn iter(&self) -> impl Iterator<Item = &Occurrence> + Clone + '_ {
        self.closed.iter().chain(self.open.iter())
    }

    pub fn open(&self) -> Option<&Occurrence> {
        self.open.as_ref()
    }

    pub fn len(&self) -> usize {
        self.closed.len() + usize::from(self.open.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closed occurrences dropped by the limit
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Faulted occurrences ever opened, including dropped ones
    pub fn faulted_count(&self) -> usize {
        self.faulted_total
    }

    pub fn clear(&mut self) {
        self.closed.clear();
        self.open = None;
        self.dropped = 0;
        self.faulted_total = 0;
        self.builder.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use expression::Value;
    use fault_templates::TemplateKind;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn log() -> OccurrenceLog {
        OccurrenceLog::new(OccurrenceBuilder::new(
            "rule",
            "AHU-1",
            TemplateKind::AnyFault,
            "Faulted for {duration}s",
            Some("Normal".to_string()),
        ))
    }

    fn values() -> TriggerValues {
        let mut values = TriggerValues::new();
        values.insert("result".to_string(), Some(Value::Bool(true)));
        values
    }

    #[test]
    fn test_transitions_close_previous() {
        let mut log = log();
        assert!(log.record(FaultState::Unknown, at(0), values()).is_none());
        assert!(log.is_empty());

        assert!(log.record(FaultState::Clear, at(10), values()).is_some());
        assert!(log.record(FaultState::Clear, at(20), values()).is_none());
        assert!(log.record(FaultState::Faulted, at(30), values()).is_some());
        log.record(FaultState::Faulted, at(90), values());
        log.record(FaultState::Clear, at(150), values());

        let all: Vec<_> = log.iter().collect();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].ended, Some(at(30)));
        assert_eq!(all[1].started, at(30));
        assert_eq!(all[1].ended, Some(at(150)));
        assert_eq!(all[1].text, "Faulted for 120s");
        assert!(all[2].is_open());
        assert_eq!(all[2].text, "Normal");
        assert_eq!(log.faulted_count(), 1);
    }

    #[test]
    fn test_flush_then_reopen() {
        let mut log = log();
        log.record(FaultState::Faulted, at(0), values());
        let flushed = log.flush(at(45)).cloned().unwrap();
        assert_eq!(flushed.ended, Some(at(45)));
        assert_eq!(flushed.text, "Faulted for 45s");
        assert!(log.flush(at(50)).is_none());

        log.record(FaultState::Faulted, at(60), values());
        assert_eq!(log.len(), 2);
        assert_eq!(log.open().map(|o| o.sequence), Some(1));
    }

    #[test]
    fn test_iter_is_restartable() {
        let mut log = log();
        log.record(FaultState::Faulted, at(0), values());
        log.record(FaultState::Clear, at(10), values());
        let iter = log.iter();
        assert_eq!(iter.clone().count(), 2);
        assert_eq!(iter.count(), 2);
    }

    #[test]
    fn test_missing_data_occurrence() {
        let mut log = log();
        log.record(FaultState::Faulted, at(0), values());
        assert!(log
            .record_missing(at(30), "Missing value: flow 10.0 min ago".to_string(), values())
            .is_some());
        assert!(log
            .record_missing(at(90), "Missing value: flow 11.0 min ago".to_string(), values())
            .is_none());
        log.record(FaultState::Clear, at(120), values());

        let all: Vec<_> = log.iter().collect();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].ended, Some(at(30)));
        assert_eq!(all[1].state, FaultState::Unknown);
        assert_eq!(all[1].text, "Missing value: flow 11.0 min ago");
        assert_eq!(all[1].ended, Some(at(120)));
        assert_eq!(all[2].state, FaultState::Clear);
        assert_eq!(log.faulted_count(), 1);
    }

    #[test]
    fn test_limit_drops_oldest_closed() {
        let mut log = log().with_limit(2);
        for i in 0..6 {
            let state = if i % 2 == 0 { FaultState::Faulted } else { FaultState::Clear };
            log.record(state, at(i * 10), values());
        }

        let all: Vec<_> = log.iter().collect();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].sequence, 3);
        assert!(all[2].is_open());
        assert_eq!(log.dropped(), 3);
        assert_eq!(log.faulted_count(), 3);

        log.clear();
        assert_eq!(log.dropped(), 0);
        assert!(log.is_empty());
    }
}
