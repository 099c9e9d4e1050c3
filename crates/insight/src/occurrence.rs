//! Occurrence Types

use crate::render;
use chrono::{DateTime, Duration, Utc};
use expression::Value;
use fault_templates::{FaultState, TemplateKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Text for clear occurrences when the rule has none
pub const DEFAULT_CLEAR_DESCRIPTION: &str = "No fault";

/// Named values captured at the triggering tick; `None` is undefined
pub type TriggerValues = BTreeMap<String, Option<Value>>;

/// An interval of faulted, clear or missing-data time for one rule on one
/// piece of equipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    /// Position in the actor's occurrence sequence, from 0
    pub sequence: u64,
    pub rule_id: String,
    pub equipment_id: String,
    pub template: TemplateKind,
    pub started: DateTime<Utc>,
    /// `None` while open
    pub ended: Option<DateTime<Utc>>,
    /// `Unknown` marks a span where input data was missing
    pub state: FaultState,
    /// Rendered description
    pub text: String,
    /// Values at the latest tick inside the occurrence
    pub values: TriggerValues,
}

impl Occurrence {
    pub fn is_open(&self) -> bool {
        self.ended.is_none()
    }

    pub fn is_faulted(&self) -> bool {
        self.state.is_faulted()
    }

    /// Length up to `ended`, or up to `as_of` while open
    pub fn duration(&self, as_of: DateTime<Utc>) -> Duration {
        self.ended.unwrap_or(as_of) - self.started
    }
}

/// Creates and re-renders occurrences for one rule/equipment pair
#[derive(Debug, Clone)]
pub struct OccurrenceBuilder {
    rule_id: String,
    equipment_id: String,
    template: TemplateKind,
    description: String,
    clear_description: String,
    next_sequence: u64,
}

impl OccurrenceBuilder {
    pub fn new(
        rule_id: impl Into<String>,
        equipment_id: impl Into<String>,
        template: TemplateKind,
        description: impl Into<String>,
        clear_description: Option<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            equipment_id: equipment_id.into(),
            template,
            description: description.into(),
            clear_description: clear_description
                .unwrap_or_else(|| DEFAULT_CLEAR_DESCRIPTION.to_string()),
            next_sequence: 0,
        }
    }

    /// Template for `state`; missing-data occurrences keep their reason
    fn text_for(&self, state: FaultState) -> Option<&str> {
        match state {
            FaultState::Faulted => Some(self.description.as_str()),
            FaultState::Clear => Some(self.clear_description.as_str()),
            FaultState::Unknown => None,
        }
    }

    fn start(&mut self, state: FaultState, at: DateTime<Utc>, text: String, values: TriggerValues) -> Occurrence {
        let occurrence = Occurrence {
            sequence: self.next_sequence,
            rule_id: self.rule_id.clone(),
            equipment_id: self.equipment_id.clone(),
            template: self.template,
            started: at,
            ended: None,
            state,
            text,
            values,
        };
        self.next_sequence += 1;
        occurrence
    }

    /// Start a new open occurrence at `at`
    pub fn open(&mut self, state: FaultState, at: DateTime<Utc>, values: TriggerValues) -> Occurrence {
        let text = self
            .text_for(state)
            .map(|template| render(template, &values, Duration::zero()))
            .unwrap_or_default();
        self.start(state, at, text, values)
    }

    /// Start an `Unknown` occurrence explaining which input is missing
    pub fn open_missing(&mut self, at: DateTime<Utc>, reason: impl Into<String>, values: TriggerValues) -> Occurrence {
        self.start(FaultState::Unknown, at, reason.into(), values)
    }

    fn rerender(&self, occurrence: &mut Occurrence, until: DateTime<Utc>) {
        if let Some(template) = self.text_for(occurrence.state) {
            occurrence.text = render(template, &occurrence.values, occurrence.duration(until));
        }
    }

    /// Refresh an open occurrence with the latest values
    pub fn extend(&self, occurrence: &mut Occurrence, at: DateTime<Utc>, values: TriggerValues) {
        occurrence.values = values;
        self.rerender(occurrence, at);
    }

    /// Close an occurrence at `at` (never before its start)
    pub fn close(&self, occurrence: &mut Occurrence, at: DateTime<Utc>) {
        let ended = at.max(occurrence.started);
        occurrence.ended = Some(ended);
        self.rerender(occurrence, ended);
    }

    /// Restart numbering from 0
    pub fn reset(&mut self) {
        self.next_sequence = 0;
    }
}
