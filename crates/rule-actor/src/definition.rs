//! Rule Definitions

use expression::split_assignment;
use fault_templates::TemplateKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParameterRepr")]
pub struct RuleParameter {
    pub name: String,
    pub expression: String,
}

impl RuleParameter {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }

    /// Parse the combined `name = formula` form
    pub fn parse(line: &str) -> Option<Self> {
        split_assignment(line).map(|(name, formula)| Self::new(name, formula))
    }
}

/// Accepts `{"name": .., "expression": ..}` or `"name = formula"`
#[derive(Deserialize)]
#[serde(untagged)]
enum ParameterRepr {
    Inline(String),
    Named { name: String, expression: String },
}

impl TryFrom<ParameterRepr> for RuleParameter {
    type Error = String;

    fn try_from(repr: ParameterRepr) -> Result<Self, Self::Error> {
        match repr {
            ParameterRepr::Named { name, expression } => Ok(Self::new(name, expression)),
            ParameterRepr::Inline(line) => {
                Self::parse(&line).ok_or_else(|| format!("expected 'name = formula', got '{}'", line))
            }
        }
    }
}

/// Everything needed to build a [`crate::RuleActor`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub rule_id: String,
    pub equipment_id: String,
    pub template: TemplateKind,
    /// Signal names samples may arrive for
    pub signals: Vec<String>,
    /// Evaluated in order; one must be named `result`
    pub parameters: Vec<RuleParameter>,
    /// Numeric UI fields (template settings, formula constants)
    #[serde(default)]
    pub fields: BTreeMap<String, f64>,
    /// Text for faulted occurrences, with `{name}` placeholders
    #[serde(default)]
    pub description: String,
    /// Text for clear occurrences
    #[serde(default)]
    pub clear_description: Option<String>,
    /// How far behind the newest sample a late sample may land
    #[serde(default)]
    pub out_of_order_tolerance_seconds: f64,
    /// Expected reporting interval in seconds for signals checked for staleness
    #[serde(default)]
    pub trend_intervals: BTreeMap<String, f64>,
    /// Closed occurrences kept before the oldest are dropped
    #[serde(default)]
    pub max_closed_occurrences: Option<usize>,
}

impl RuleDefinition {
    /// Minimal definition; add parameters and fields with the builder methods
    pub fn new(rule_id: impl Into<String>, equipment_id: impl Into<String>, template: TemplateKind) -> Self {
        Self {
            rule_id: rule_id.into(),
            equipment_id: equipment_id.into(),
            template,
            signals: Vec::new(),
            parameters: Vec::new(),
            fields: BTreeMap::new(),
            description: String::new(),
            clear_description: None,
            out_of_order_tolerance_seconds: 0.0,
            trend_intervals: BTreeMap::new(),
            max_closed_occurrences: None,
        }
    }

    pub fn signal(mut self, name: impl Into<String>) -> Self {
        self.signals.push(name.into());
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.parameters.push(RuleParameter::new(name, expression));
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn clear_description(mut self, text: impl Into<String>) -> Self {
        self.clear_description = Some(text.into());
        self
    }

    pub fn tolerance_seconds(mut self, seconds: f64) -> Self {
        self.out_of_order_tolerance_seconds = seconds;
        self
    }

    pub fn trend_interval(mut self, signal: impl Into<String>, seconds: f64) -> Self {
        self.trend_intervals.insert(signal.into(), seconds);
        self
    }

    pub fn history_limit(mut self, max_closed: usize) -> Self {
        self.max_closed_occurrences = Some(max_closed);
        self
    }
}
