//! Rule Actor Implementation

use crate::{ActorError, RuleDefinition};
use chrono::{DateTime, Duration, Utc};
use expression::{compile, CompiledExpression, Scope, SignalSource, Value, MAX_WINDOW_DAYS};
use fault_templates::{FaultState, FaultTemplate, TickReport};
use insight::{Occurrence, OccurrenceBuilder, OccurrenceLog, TriggerValues};
use metrics::counter;
use std::collections::HashSet;
use timed_buffer::{BufferError, TimedValueBuffer};
use tracing::{debug, info, warn};

/// Parameter that drives the fault template
pub const RESULT: &str = "result";
/// Faulted seconds inside the template window, as of the previous tick
pub const TIME: &str = "TIME";
/// Whether the previous tick was faulted
pub const IS_FAULTY: &str = "IS_FAULTY";
/// Seconds since the previous tick
pub const DELTA_TIME_S: &str = "DELTA_TIME_S";

const TIME_SLOT: usize = 0;
const IS_FAULTY_SLOT: usize = 1;
const DELTA_TIME_SLOT: usize = 2;
const CONTEXT_SLOTS: usize = 3;

#[derive(Debug, Clone)]
struct CompiledParameter {
    name: String,
    expression: CompiledExpression,
    slot: usize,
}

/// Buffers and variables seen by the expressions during one evaluation
struct Bindings<'a> {
    buffers: &'a [TimedValueBuffer],
    /// Stale signals read as undefined
    timely: &'a [bool],
    variables: &'a [Option<Value>],
}

impl SignalSource for Bindings<'_> {
    fn buffer(&self, slot: usize) -> Option<&TimedValueBuffer> {
        if *self.timely.get(slot)? {
            self.buffers.get(slot)
        } else {
            None
        }
    }

    fn variable(&self, slot: usize) -> Option<Value> {
        self.variables.get(slot).copied().flatten()
    }
}

/// What one accepted sample did
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// Instant the rule was evaluated at
    pub at: DateTime<Utc>,
    /// Value of `result`, `None` when undefined
    pub result: Option<Value>,
    /// Template classification after the tick
    pub report: TickReport,
    /// Why `result` is undefined, when input data is stale or too short
    pub missing: Option<String>,
}

/// Evaluates one rule against one piece of equipment
#[derive(Debug, Clone)]
pub struct RuleActor {
    definition: RuleDefinition,
    signal_names: Vec<String>,
    buffers: Vec<TimedValueBuffer>,
    /// Expected reporting interval per signal slot, for staleness checks
    trend_intervals: Vec<Option<Duration>>,
    /// Signal slots any parameter reads
    read_signals: Vec<usize>,
    /// Longest temporal window per signal slot
    temporal_windows: Vec<(usize, Duration)>,
    parameters: Vec<CompiledParameter>,
    result_slot: usize,
    variables: Vec<Option<Value>>,
    template: FaultTemplate,
    occurrences: OccurrenceLog,
    retention: Duration,
    clock: Option<DateTime<Utc>>,
}

impl RuleActor {
    /// Compile the definition into a ready actor
    pub fn new(definition: RuleDefinition) -> Result<Self, ActorError> {
        let mut scope = Scope::new();
        let mut declared = HashSet::new();
        let mut declare = |name: &str| -> Result<(), ActorError> {
            if declared.insert(name.to_string()) {
                Ok(())
            } else {
                Err(ActorError::DuplicateName(name.to_string()))
            }
        };

        for name in [TIME, IS_FAULTY, DELTA_TIME_S] {
            declare(name)?;
        }
        scope
            .declare_variable(TIME, TIME_SLOT)
            .declare_variable(IS_FAULTY, IS_FAULTY_SLOT)
            .declare_variable(DELTA_TIME_S, DELTA_TIME_SLOT);

        for (slot, name) in definition.signals.iter().enumerate() {
            declare(name.as_str())?;
            scope.declare_signal(name.as_str(), slot);
        }
        for (name, value) in &definition.fields {
            declare(name.as_str())?;
            scope.declare_constant(name.as_str(), *value);
        }

        let mut parameters = Vec::with_capacity(definition.parameters.len());
        for (index, parameter) in definition.parameters.iter().enumerate() {
            declare(parameter.name.as_str())?;
            let expression = compile(&parameter.expression, &scope).map_err(|source| {
                ActorError::InvalidExpression {
                    parameter: parameter.name.clone(),
                    source,
                }
            })?;
            let slot = CONTEXT_SLOTS + index;
            scope.declare_variable(parameter.name.as_str(), slot);
            parameters.push(CompiledParameter {
                name: parameter.name.clone(),
                expression,
                slot,
            });
        }

        let result_slot = parameters
            .iter()
            .find(|p| p.name == RESULT)
            .map(|p| p.slot)
            .ok_or(ActorError::MissingResult)?;

        let mut read_signals = Vec::new();
        let mut temporal_windows: Vec<(usize, Duration)> = Vec::new();
        for parameter in &parameters {
            for slot in parameter.expression.signals() {
                if !read_signals.contains(slot) {
                    read_signals.push(*slot);
                }
            }
            for (slot, window) in parameter.expression.temporal_windows() {
                match temporal_windows.iter_mut().find(|(s, _)| s == slot) {
                    Some((_, longest)) => *longest = (*longest).max(*window),
                    None => temporal_windows.push((*slot, *window)),
                }
            }
        }

        let mut trend_intervals = vec![None; definition.signals.len()];
        for (signal, seconds) in &definition.trend_intervals {
            let slot = definition
                .signals
                .iter()
                .position(|name| name == signal)
                .ok_or_else(|| ActorError::UnknownSignal(signal.clone()))?;
            trend_intervals[slot] = Some(trend_interval(signal, *seconds)?);
        }

        let template = FaultTemplate::from_fields(definition.template, &definition.fields)?;
        let lookback = parameters
            .iter()
            .map(|p| p.expression.max_lookback())
            .max()
            .unwrap_or_else(Duration::zero);
        let retention = template.window().max(lookback);

        let tolerance =
            Duration::milliseconds((definition.out_of_order_tolerance_seconds.max(0.0) * 1000.0) as i64);
        let buffers = definition
            .signals
            .iter()
            .map(|_| TimedValueBuffer::with_tolerance(tolerance))
            .collect();

        let mut occurrences = OccurrenceLog::new(OccurrenceBuilder::new(
            definition.rule_id.clone(),
            definition.equipment_id.clone(),
            definition.template,
            definition.description.clone(),
            definition.clear_description.clone(),
        ));
        if let Some(max_closed) = definition.max_closed_occurrences {
            occurrences = occurrences.with_limit(max_closed);
        }

        info!(
            "Creating rule actor {} for {}: {} template, {} signals, {} parameters, retention {}s",
            definition.rule_id,
            definition.equipment_id,
            definition.template,
            definition.signals.len(),
            parameters.len(),
            retention.num_seconds()
        );

        Ok(Self {
            signal_names: definition.signals.clone(),
            buffers,
            trend_intervals,
            read_signals,
            temporal_windows,
            variables: vec![None; CONTEXT_SLOTS + parameters.len()],
            parameters,
            result_slot,
            template,
            occurrences,
            retention,
            clock: None,
            definition,
        })
    }

    /// Route a sample into its buffer and re-evaluate the rule.
    ///
    /// The rule is evaluated at the later of `timestamp` and the actor clock.
    /// Rejected samples leave all state untouched.
    pub fn ingest(
        &mut self,
        signal: &str,
        timestamp: DateTime<Utc>,
        value: f64,
    ) -> Result<TickOutcome, ActorError> {
        let Some(slot) = self.signal_names.iter().position(|name| name == signal) else {
            self.reject("unknown_signal");
            warn!("Rule {} has no signal '{}'", self.definition.rule_id, signal);
            return Err(ActorError::UnknownSignal(signal.to_string()));
        };

        if let Err(e) = self.buffers[slot].append(timestamp, value) {
            self.reject("invalid_sample");
            warn!("Rule {} rejected sample: {}", self.definition.rule_id, e);
            return Err(match e {
                BufferError::OutOfOrderSample { head, .. } => ActorError::OutOfOrderSample {
                    signal: signal.to_string(),
                    timestamp,
                    head,
                },
                BufferError::NonFiniteValue { .. } => ActorError::NonFiniteValue {
                    signal: signal.to_string(),
                    timestamp,
                },
            });
        }
        counter!("rules_samples_ingested_total", "rule" => self.definition.rule_id.clone()).increment(1);

        let at = self.clock.map_or(timestamp, |clock| clock.max(timestamp));
        Ok(self.tick(at))
    }

    fn reject(&self, reason: &'static str) {
        counter!(
            "rules_samples_rejected_total",
            "rule" => self.definition.rule_id.clone(),
            "reason" => reason
        )
        .increment(1);
    }

    fn tick(&mut self, at: DateTime<Utc>) -> TickOutcome {
        self.variables[TIME_SLOT] = Some(Value::Number(self.template.faulted_seconds()));
        self.variables[IS_FAULTY_SLOT] = Some(Value::Bool(self.template.state().is_faulted()));
        self.variables[DELTA_TIME_SLOT] = self
            .clock
            .map(|clock| Value::Number((at - clock).num_milliseconds() as f64 / 1000.0));

        let timely = self.timeliness(at);
        let mut variables = std::mem::take(&mut self.variables);
        self.evaluate_parameters(at, &timely, &mut variables);
        self.variables = variables;

        let result = self.variables[self.result_slot];
        let missing = match result {
            Some(_) => None,
            None => self.missing_reason(at, &timely),
        };
        let report = self.template.tick(at, result);
        if let Some(transition) = report.transition {
            debug!(
                "Rule {} on {}: {} -> {} at {}",
                self.definition.rule_id, self.definition.equipment_id, transition.from, transition.to, at
            );
            counter!(
                "rules_transitions_total",
                "rule" => self.definition.rule_id.clone(),
                "to" => transition.to.to_string()
            )
            .increment(1);
        }

        let values = self.trigger_values(at, &report);
        match &missing {
            Some(reason) => self.occurrences.record_missing(at, reason.clone(), values),
            None => self.occurrences.record(report.state, at, values),
        };

        self.clock = Some(at);
        self.evict(at);

        TickOutcome {
            at,
            result,
            report,
            missing,
        }
    }

    /// Whether each signal slot is reporting regularly at `at`
    fn timeliness(&self, at: DateTime<Utc>) -> Vec<bool> {
        self.buffers
            .iter()
            .zip(&self.trend_intervals)
            .map(|(buffer, interval)| interval.map_or(true, |interval| buffer.is_timely(at, interval)))
            .collect()
    }

    /// Explain an undefined result: stale signals first, then short history
    fn missing_reason(&self, at: DateTime<Utc>, timely: &[bool]) -> Option<String> {
        let stale: Vec<String> = self
            .read_signals
            .iter()
            .filter(|slot| !timely[**slot])
            .map(|slot| {
                let name = &self.signal_names[*slot];
                match self.buffers[*slot].last() {
                    Some(last) => {
                        let minutes = (at - last.timestamp).num_milliseconds() as f64 / 60_000.0;
                        format!("{} {:.1} min ago", name, minutes)
                    }
                    None => format!("{} never", name),
                }
            })
            .collect();
        match stale.len() {
            0 => {}
            1 => return Some(format!("Missing value: {}", stale[0])),
            _ => return Some(format!("Missing values: {}", stale.join(", "))),
        }

        let short: Vec<String> = self
            .temporal_windows
            .iter()
            .filter(|(slot, window)| {
                at.checked_sub_signed(*window)
                    .map_or(true, |from| !self.buffers[*slot].covers(from))
            })
            .map(|(slot, window)| {
                let minutes = window.num_milliseconds() as f64 / 60_000.0;
                format!("{} needs {:.1} min of history", self.signal_names[*slot], minutes)
            })
            .collect();
        (!short.is_empty()).then(|| format!("Insufficient data: {}", short.join(", ")))
    }

    /// Run the parameter chain, each result feeding later parameters
    fn evaluate_parameters(&self, at: DateTime<Utc>, timely: &[bool], variables: &mut [Option<Value>]) {
        for parameter in &self.parameters {
            let value = parameter.expression.evaluate(
                &Bindings {
                    buffers: &self.buffers,
                    timely,
                    variables,
                },
                at,
            );
            variables[parameter.slot] = value;
        }
    }

    fn trigger_values(&self, at: DateTime<Utc>, report: &TickReport) -> TriggerValues {
        let mut values = TriggerValues::new();
        for (name, value) in &self.definition.fields {
            values.insert(name.clone(), Some(Value::Number(*value)));
        }
        for (name, buffer) in self.signal_names.iter().zip(&self.buffers) {
            values.insert(name.clone(), buffer.value_at(at).map(Value::Number));
        }
        for parameter in &self.parameters {
            values.insert(parameter.name.clone(), self.variables[parameter.slot]);
        }
        values.insert(TIME.to_string(), self.variables[TIME_SLOT]);
        values.insert(DELTA_TIME_S.to_string(), self.variables[DELTA_TIME_SLOT]);
        values.insert(IS_FAULTY.to_string(), Some(Value::Bool(report.state.is_faulted())));
        values.insert(
            "percentage_faulted".to_string(),
            Some(Value::Number(report.percentage_faulted * 100.0)),
        );
        values
    }

    fn evict(&mut self, at: DateTime<Utc>) {
        let Some(cutoff) = at.checked_sub_signed(self.retention) else {
            return;
        };
        let evicted: usize = self.buffers.iter_mut().map(|b| b.evict_before(cutoff)).sum();
        if evicted > 0 {
            debug!("Rule {} evicted {} samples before {}", self.definition.rule_id, evicted, cutoff);
        }
    }

    /// Close the open occurrence at `as_of`; the next tick opens a new one.
    ///
    /// The clock moves up to `as_of`, so later samples evaluate no earlier.
    pub fn flush(&mut self, as_of: DateTime<Utc>) -> Option<Occurrence> {
        self.clock = Some(self.clock.map_or(as_of, |clock| clock.max(as_of)));
        self.occurrences.flush(as_of).cloned()
    }

    /// Evaluate `result` at `at` against the current buffers without changing state
    pub fn evaluate_at(&self, at: DateTime<Utc>) -> Option<Value> {
        let timely = self.timeliness(at);
        let mut variables = self.variables.clone();
        self.evaluate_parameters(at, &timely, &mut variables);
        variables[self.result_slot]
    }

    /// Closed occurrences followed by the open one, oldest first
    pub fn occurrences(&self) -> impl Iterator<Item = &Occurrence> + Clone + '_ {
        self.occurrences.iter()
    }

    pub fn faulted_count(&self) -> usize {
        self.occurrences.faulted_count()
    }

    /// Closed occurrences dropped by the history limit
    pub fn dropped_occurrences(&self) -> u64 {
        self.occurrences.dropped()
    }

    pub fn state(&self) -> FaultState {
        self.template.state()
    }

    /// Latest evaluation or flush instant
    pub fn clock(&self) -> Option<DateTime<Utc>> {
        self.clock
    }

    /// How much history each buffer keeps
    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn signal(&self, name: &str) -> Option<&TimedValueBuffer> {
        self.signal_names
            .iter()
            .position(|n| n == name)
            .map(|slot| &self.buffers[slot])
    }

    pub fn definition(&self) -> &RuleDefinition {
        &self.definition
    }

    /// Drop all samples, template state and occurrences
    pub fn reset(&mut self) {
        self.buffers.iter_mut().for_each(TimedValueBuffer::clear);
        self.variables.iter_mut().for_each(|v| *v = None);
        self.template.reset();
        self.occurrences.clear();
        self.clock = None;
        info!("Reset rule actor {} for {}", self.definition.rule_id, self.definition.equipment_id);
    }
}

fn trend_interval(signal: &str, seconds: f64) -> Result<Duration, ActorError> {
    let invalid = || ActorError::InvalidTrendInterval {
        signal: signal.to_string(),
        seconds,
    };
    if !seconds.is_finite() || seconds <= 0.0 || seconds > (MAX_WINDOW_DAYS * 86_400) as f64 {
        return Err(invalid());
    }
    Duration::try_milliseconds((seconds * 1000.0).round() as i64).ok_or_else(invalid)
}
