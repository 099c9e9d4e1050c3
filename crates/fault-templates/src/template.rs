//! Template State Machines

use crate::{
    AnyFaultConfig, FaultState, HysteresisConfig, RollingWindow, TemplateError, TemplateKind,
    TickReport, Transition, UnchangingConfig,
};
use chrono::{DateTime, Duration, Utc};
use expression::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
struct HysteresisState {
    /// Violation of the last defined input, kept across undefined ticks
    violating: bool,
}

#[derive(Debug, Clone, Default)]
struct UnchangingState {
    /// Value at the last observed change
    reference: Option<f64>,
    /// Defined time since the last change
    unchanged: Duration,
    /// Whether any change was ever observed
    changed_once: bool,
}

#[derive(Debug, Clone)]
enum Policy {
    AnyFault(AnyFaultConfig),
    AnyHysteresis(HysteresisConfig, HysteresisState),
    Unchanging(UnchangingConfig, UnchangingState),
}

/// A fault template with its per-actor state
#[derive(Debug, Clone)]
pub struct FaultTemplate {
    policy: Policy,
    window: RollingWindow,
    state: FaultState,
    /// Instant and faulted flag of the previous tick; `None` flag when undefined
    last_tick: Option<(DateTime<Utc>, Option<bool>)>,
}

impl FaultTemplate {
    /// Build a template from its kind and the rule's numeric fields
    pub fn from_fields(kind: TemplateKind, fields: &BTreeMap<String, f64>) -> Result<Self, TemplateError> {
        let template = match kind {
            TemplateKind::AnyFault => Self::any_fault(AnyFaultConfig::from_fields(fields)?),
            TemplateKind::AnyHysteresis => Self::hysteresis(HysteresisConfig::from_fields(fields)?),
            TemplateKind::Unchanging => Self::unchanging(UnchangingConfig::from_fields(fields)?),
        };
        info!("Creating {} template over {}s", kind, template.window().num_seconds());
        Ok(template)
    }

    pub fn any_fault(config: AnyFaultConfig) -> Self {
        let window = RollingWindow::new(config.window);
        Self::with_policy(Policy::AnyFault(config), window)
    }

    pub fn hysteresis(config: HysteresisConfig) -> Self {
        let window = RollingWindow::new(config.window);
        Self::with_policy(Policy::AnyHysteresis(config, HysteresisState::default()), window)
    }

    pub fn unchanging(config: UnchangingConfig) -> Self {
        let window = RollingWindow::new(config.window);
        Self::with_policy(Policy::Unchanging(config, UnchangingState::default()), window)
    }

    fn with_policy(policy: Policy, window: RollingWindow) -> Self {
        Self {
            policy,
            window,
            state: FaultState::Unknown,
            last_tick: None,
        }
    }

    pub fn kind(&self) -> TemplateKind {
        match self.policy {
            Policy::AnyFault(_) => TemplateKind::AnyFault,
            Policy::AnyHysteresis(..) => TemplateKind::AnyHysteresis,
            Policy::Unchanging(..) => TemplateKind::Unchanging,
        }
    }

    /// Rolling window length, which is also the history the template needs
    pub fn window(&self) -> Duration {
        self.window.length()
    }

    /// State after the latest tick
    pub fn state(&self) -> FaultState {
        self.state
    }

    /// Faulted seconds inside the rolling window
    pub fn faulted_seconds(&self) -> f64 {
        self.window.faulted_seconds()
    }

    pub fn percentage_faulted(&self) -> f64 {
        self.window.percentage_faulted()
    }

    /// Instant of the latest tick
    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        self.last_tick.map(|(at, _)| at)
    }

    /// Advance to `at` with the `result` value observed there.
    ///
    /// Ticks at or before the previous one attribute no time.
    pub fn tick(&mut self, at: DateTime<Utc>, input: Option<Value>) -> TickReport {
        if let Some((previous_at, previous_faulted)) = self.last_tick {
            if at > previous_at {
                if let Some(faulted) = previous_faulted {
                    self.window.record(previous_at, at, faulted);
                } else {
                    self.window.advance(at);
                }
                if let Policy::Unchanging(_, state) = &mut self.policy {
                    if previous_faulted.is_some() {
                        state.unchanged = state.unchanged + (at - previous_at);
                    }
                }
            }
        }

        let (next, faulted_now) = self.classify(input);
        let at = self.last_tick.map_or(at, |(previous_at, _)| at.max(previous_at));
        self.last_tick = Some((at, faulted_now));

        let transition = (next != self.state).then(|| Transition {
            from: self.state,
            to: next,
            at,
        });
        if let Some(t) = &transition {
            debug!(
                "{} template {} -> {} at {} ({:.1}% of window)",
                self.kind(),
                t.from,
                t.to,
                at,
                self.window.percentage_faulted() * 100.0
            );
        }
        self.state = next;

        TickReport {
            state: next,
            transition,
            percentage_faulted: self.window.percentage_faulted(),
            faulted_seconds: self.window.faulted_seconds(),
        }
    }

    /// Compute the next state and whether the time from now on counts as faulted
    fn classify(&mut self, input: Option<Value>) -> (FaultState, Option<bool>) {
        let current = self.state;
        let window = &self.window;

        match &mut self.policy {
            Policy::AnyFault(_) => match input {
                Some(value) if value.as_bool() => (FaultState::Faulted, Some(true)),
                Some(_) => (FaultState::Clear, Some(false)),
                None => (current, None),
            },
            Policy::AnyHysteresis(config, state) => {
                let Some(value) = input else {
                    return (current, None);
                };
                let violating = match value {
                    Value::Bool(flag) => flag,
                    Value::Number(n) => config.violates(n, state.violating),
                };
                state.violating = violating;

                let next = match current {
                    FaultState::Faulted => {
                        if gate(window, config.clear_percentage_of_time, violating) {
                            FaultState::Faulted
                        } else {
                            FaultState::Clear
                        }
                    }
                    FaultState::Clear | FaultState::Unknown => {
                        if window.faulted_ms() > 0 && gate(window, config.percentage_of_time, violating) {
                            FaultState::Faulted
                        } else if config.percentage_of_time == 0.0 && violating {
                            FaultState::Faulted
                        } else {
                            FaultState::Clear
                        }
                    }
                };
                (next, Some(violating))
            }
            Policy::Unchanging(config, state) => {
                let Some(value) = input else {
                    return (current, None);
                };
                let value = value.as_f64();

                let changed = match state.reference {
                    Some(reference) => (value - reference).abs() > config.tolerance,
                    None => false,
                };
                if changed || state.reference.is_none() {
                    state.reference = Some(value);
                }
                if changed {
                    state.unchanged = Duration::zero();
                    state.changed_once = true;
                }

                let next = if changed {
                    FaultState::Clear
                } else if state.unchanged >= config.window {
                    FaultState::Faulted
                } else if state.changed_once {
                    FaultState::Clear
                } else {
                    FaultState::Unknown
                };
                (next, Some(next.is_faulted()))
            }
        }
    }

    /// Forget all history and return to `Unknown`
    pub fn reset(&mut self) {
        self.window.clear();
        self.state = FaultState::Unknown;
        self.last_tick = None;
        match &mut self.policy {
            Policy::AnyFault(_) => {}
            Policy::AnyHysteresis(_, state) => *state = HysteresisState::default(),
            Policy::Unchanging(_, state) => *state = UnchangingState::default(),
        }
    }
}

/// Percentage gate; a zero threshold holds while the input still violates
fn gate(window: &RollingWindow, ratio: f64, violating: bool) -> bool {
    if ratio == 0.0 {
        violating || window.faulted_ms() > 0
    } else {
        window.reaches(ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use chrono::TimeZone;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + minutes * 60, 0).unwrap()
    }

    fn map(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn num(v: f64) -> Option<Value> {
        Some(Value::Number(v))
    }

    #[test]
    fn test_any_fault_follows_result() {
        let mut template = FaultTemplate::any_fault(AnyFaultConfig::default());
        assert_eq!(template.state(), FaultState::Unknown);

        let report = template.tick(at(0), Some(Value::Bool(false)));
        assert_eq!(report.state, FaultState::Clear);
        assert_eq!(report.transition.map(|t| t.from), Some(FaultState::Unknown));

        let report = template.tick(at(1), Some(Value::Bool(true)));
        assert_eq!(report.state, FaultState::Faulted);
        assert_eq!(report.transition.map(|t| t.at), Some(at(1)));

        let report = template.tick(at(3), Some(Value::Bool(false)));
        assert_eq!(report.state, FaultState::Clear);
        assert_eq!(report.faulted_seconds, 120.0);
    }

    #[test]
    fn test_undefined_holds_state_and_is_not_accumulated() {
        let mut template = FaultTemplate::any_fault(AnyFaultConfig::default());
        template.tick(at(0), Some(Value::Bool(true)));
        let report = template.tick(at(5), None);
        assert_eq!(report.state, FaultState::Faulted);
        assert!(report.transition.is_none());
        assert_eq!(report.faulted_seconds, 300.0);

        // the undefined span [5, 10) is not counted
        let report = template.tick(at(10), Some(Value::Bool(true)));
        assert_eq!(report.faulted_seconds, 300.0);
    }

    #[test]
    fn test_hysteresis_percentage_gate() {
        let fields = map(&[
            (fields::MAX_TRIGGER, 30.0),
            (fields::OVER_HOW_MANY_HOURS, 1.0),
            (fields::PERCENTAGE_OF_TIME, 0.25),
        ]);
        let mut template = FaultTemplate::from_fields(TemplateKind::AnyHysteresis, &fields).unwrap();

        template.tick(at(0), num(35.0));
        assert_eq!(template.state(), FaultState::Clear);
        template.tick(at(14), num(35.0));
        assert_eq!(template.state(), FaultState::Clear);
        let report = template.tick(at(15), num(35.0));
        assert_eq!(report.state, FaultState::Faulted);
        assert_eq!(report.transition.map(|t| t.at), Some(at(15)));

        // drop below the trigger; violation time ages out of the window
        template.tick(at(16), num(20.0));
        assert_eq!(template.state(), FaultState::Faulted);
        template.tick(at(60), num(20.0));
        assert_eq!(template.state(), FaultState::Faulted);
        let report = template.tick(at(62), num(20.0));
        assert_eq!(report.state, FaultState::Clear);
    }

    #[test]
    fn test_hysteresis_holds_fault_through_undefined_span() {
        let fields = map(&[
            (fields::MAX_TRIGGER, 30.0),
            (fields::OVER_HOW_MANY_HOURS, 1.0),
            (fields::PERCENTAGE_OF_TIME, 0.25),
        ]);
        let mut template = FaultTemplate::from_fields(TemplateKind::AnyHysteresis, &fields).unwrap();
        template.tick(at(0), num(35.0));
        assert_eq!(template.tick(at(15), num(35.0)).state, FaultState::Faulted);

        // [15, 16) still counts, nothing after it does
        for minute in [16, 40, 60] {
            let report = template.tick(at(minute), None);
            assert_eq!(report.state, FaultState::Faulted);
            assert!(report.transition.is_none());
            assert_eq!(report.faulted_seconds, 16.0 * 60.0);
        }

        // window [10, 70) keeps 6 violating minutes, below 25%
        let report = template.tick(at(70), num(20.0));
        assert_eq!(report.state, FaultState::Clear);
        assert_eq!(report.faulted_seconds, 6.0 * 60.0);
    }

    #[test]
    fn test_hysteresis_clear_percentage() {
        let fields = map(&[
            (fields::MAX_TRIGGER, 30.0),
            (fields::OVER_HOW_MANY_HOURS, 1.0),
            (fields::PERCENTAGE_OF_TIME, 0.5),
            (fields::CLEAR_PERCENTAGE_OF_TIME, 0.25),
        ]);
        let mut template = FaultTemplate::from_fields(TemplateKind::AnyHysteresis, &fields).unwrap();
        template.tick(at(0), num(40.0));
        template.tick(at(30), num(10.0));
        assert_eq!(template.state(), FaultState::Faulted);

        // 30 violating minutes slide out; still >= 25% until minute 75
        template.tick(at(74), num(10.0));
        assert_eq!(template.state(), FaultState::Faulted);
        template.tick(at(76), num(10.0));
        assert_eq!(template.state(), FaultState::Clear);
    }

    #[test]
    fn test_hysteresis_reset_deadband_extends_violation() {
        let fields = map(&[
            (fields::MAX_TRIGGER, 30.0),
            (fields::MAX_RESET, 25.0),
            (fields::OVER_HOW_MANY_HOURS, 1.0),
            (fields::PERCENTAGE_OF_TIME, 0.0),
        ]);
        let mut template = FaultTemplate::from_fields(TemplateKind::AnyHysteresis, &fields).unwrap();
        assert_eq!(template.tick(at(0), num(28.0)).state, FaultState::Clear);
        assert_eq!(template.tick(at(1), num(31.0)).state, FaultState::Faulted);
        template.tick(at(2), num(27.0));
        template.tick(at(3), num(24.0));
        assert_eq!(template.faulted_seconds(), 120.0);
    }

    #[test]
    fn test_unchanging_detects_stuck_value() {
        let fields = map(&[(fields::OVER_HOW_MANY_HOURS, 1.0)]);
        let mut template = FaultTemplate::from_fields(TemplateKind::Unchanging, &fields).unwrap();

        template.tick(at(0), num(5.0));
        assert_eq!(template.state(), FaultState::Unknown);
        template.tick(at(59), num(5.0));
        assert_eq!(template.state(), FaultState::Unknown);
        let report = template.tick(at(60), num(5.0));
        assert_eq!(report.state, FaultState::Faulted);

        let report = template.tick(at(61), num(6.0));
        assert_eq!(report.state, FaultState::Clear);
    }

    #[test]
    fn test_unchanging_does_not_count_undefined_time() {
        let fields = map(&[(fields::OVER_HOW_MANY_HOURS, 1.0)]);
        let mut template = FaultTemplate::from_fields(TemplateKind::Unchanging, &fields).unwrap();

        template.tick(at(0), num(5.0));
        template.tick(at(10), None);
        // undefined from 10 to 70, so only 10 minutes are unchanged
        assert_eq!(template.tick(at(70), num(5.0)).state, FaultState::Unknown);
        assert_eq!(template.tick(at(119), num(5.0)).state, FaultState::Unknown);
        assert_eq!(template.tick(at(120), num(5.0)).state, FaultState::Faulted);
    }

    #[test]
    fn test_unchanging_tolerance_ignores_noise() {
        let fields = map(&[(fields::OVER_HOW_MANY_HOURS, 1.0), (fields::TOLERANCE, 0.5)]);
        let mut template = FaultTemplate::from_fields(TemplateKind::Unchanging, &fields).unwrap();
        template.tick(at(0), num(5.0));
        template.tick(at(30), num(5.4));
        template.tick(at(60), num(4.7));
        assert_eq!(template.state(), FaultState::Faulted);
    }

    #[test]
    fn test_reset() {
        let mut template = FaultTemplate::any_fault(AnyFaultConfig::default());
        template.tick(at(0), Some(Value::Bool(true)));
        template.tick(at(10), Some(Value::Bool(true)));
        template.reset();
        assert_eq!(template.state(), FaultState::Unknown);
        assert_eq!(template.faulted_seconds(), 0.0);
        assert_eq!(template.last_tick(), None);
    }
}
