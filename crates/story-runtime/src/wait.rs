//! Shared polling with an optional timeout, used by every waiting command.
//!
//! A wait may carry two trailing clauses: `set(var, value)` written when the
//! condition is met and `timeoutset(timeout, var, value)` written when the
//! timeout budget runs out first.

use story_core::{FunctionData, StoryVariant};

use crate::command::{ExecContext, LoadContext};
use crate::scope::VariableScope;
use crate::value::{EvalContext, StoryValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPoll {
    Satisfied,
    Pending,
    TimedOut,
}

/// Whether a count condition is met by zero (`Absent`) or by at least one
/// (`Present`) matching item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountPolarity {
    Absent,
    Present,
}

impl CountPolarity {
    pub fn is_satisfied(self, count: usize) -> bool {
        match self {
            Self::Absent => count == 0,
            Self::Present => count > 0,
        }
    }
}

/// `StartTimestamp` captures the clock on the first poll and hands it to the
/// condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitBaseline {
    None,
    StartTimestamp,
}

#[derive(Debug, Clone, Default)]
pub struct AssignClause {
    var: StoryValue<String>,
    value: StoryValue<StoryVariant>,
}

impl AssignClause {
    fn load(clause: &FunctionData, first: usize, ctx: &mut LoadContext<'_>) -> Self {
        Self {
            var: ctx.bind_variable_name(&clause.call, first),
            value: ctx.bind_param(&clause.call, first + 1),
        }
    }

    fn evaluate(&mut self, ctx: &EvalContext<'_>) {
        self.var.evaluate(ctx);
        self.value.evaluate(ctx);
    }

    fn apply(&self, scope: &mut VariableScope) {
        let name = self.var.value();
        if !name.is_empty() {
            scope.set_variable(name.clone(), self.value.value().clone());
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimeoutClause {
    timeout: StoryValue<i64>,
    assign: AssignClause,
}

#[derive(Debug)]
pub struct WaitWithTimeout {
    baseline: WaitBaseline,
    on_success: Option<AssignClause>,
    on_timeout: Option<TimeoutClause>,
    elapsed_millis: i64,
    start_timestamp: Option<i64>,
}

/// Clones carry the clauses but none of the run state.
impl Clone for WaitWithTimeout {
    fn clone(&self) -> Self {
        Self {
            baseline: self.baseline,
            on_success: self.on_success.clone(),
            on_timeout: self.on_timeout.clone(),
            elapsed_millis: 0,
            start_timestamp: None,
        }
    }
}

impl WaitWithTimeout {
    pub fn new(baseline: WaitBaseline) -> Self {
        Self {
            baseline,
            on_success: None,
            on_timeout: None,
            elapsed_millis: 0,
            start_timestamp: None,
        }
    }

    /// Accepts `set` and `timeoutset`. A clause with too few parameters is
    /// reported and left disabled, but still counts as recognized.
    pub fn load_clause(&mut self, clause: &FunctionData, ctx: &mut LoadContext<'_>) -> bool {
        match clause.id() {
            "set" => {
                if ctx.require_params(&clause.call, 2) {
                    self.on_success = Some(AssignClause::load(clause, 0, ctx));
                }
                true
            }
            "timeoutset" => {
                if ctx.require_params(&clause.call, 3) {
                    self.on_timeout = Some(TimeoutClause {
                        timeout: ctx.bind_param(&clause.call, 0),
                        assign: AssignClause::load(clause, 1, ctx),
                    });
                }
                true
            }
            _ => false,
        }
    }

    pub fn has_success_clause(&self) -> bool {
        self.on_success.is_some()
    }

    pub fn has_timeout_clause(&self) -> bool {
        self.on_timeout.is_some()
    }

    pub fn reset_state(&mut self) {
        self.elapsed_millis = 0;
        self.start_timestamp = None;
    }

    pub fn evaluate(&mut self, ctx: &EvalContext<'_>) {
        if let Some(clause) = &mut self.on_success {
            clause.evaluate(ctx);
        }
        if let Some(clause) = &mut self.on_timeout {
            clause.timeout.evaluate(ctx);
            clause.assign.evaluate(ctx);
        }
    }

    pub fn elapsed_millis(&self) -> i64 {
        self.elapsed_millis
    }

    pub fn start_timestamp(&self) -> Option<i64> {
        self.start_timestamp
    }

    /// Zero or negative means the wait never times out.
    pub fn timeout_millis(&self) -> i64 {
        self.on_timeout
            .as_ref()
            .map(|clause| *clause.timeout.value())
            .unwrap_or(0)
    }

    /// Advances the wait by one tick without touching any variables.
    pub fn poll(
        &mut self,
        now_millis: i64,
        delta: i64,
        condition: impl FnOnce(Option<i64>) -> bool,
    ) -> WaitPoll {
        if self.baseline == WaitBaseline::StartTimestamp && self.start_timestamp.is_none() {
            self.start_timestamp = Some(now_millis);
        }
        if condition(self.start_timestamp) {
            return WaitPoll::Satisfied;
        }
        self.elapsed_millis += delta;
        let timeout = self.timeout_millis();
        if timeout > 0 && self.elapsed_millis >= timeout {
            WaitPoll::TimedOut
        } else {
            WaitPoll::Pending
        }
    }

    /// Polls and writes the matching clause. Returns `true` while pending.
    pub fn step(
        &mut self,
        ctx: &mut ExecContext<'_>,
        delta: i64,
        condition: impl FnOnce(&ExecContext<'_>, Option<i64>) -> bool,
    ) -> bool {
        let outcome = {
            let view: &ExecContext<'_> = ctx;
            self.poll(view.now_millis, delta, |start| condition(view, start))
        };
        match outcome {
            WaitPoll::Pending => true,
            WaitPoll::Satisfied => {
                if let Some(clause) = &self.on_success {
                    clause.apply(ctx.scope);
                }
                false
            }
            WaitPoll::TimedOut => {
                if let Some(clause) = &self.on_timeout {
                    clause.assign.apply(ctx.scope);
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod wait_tests {
    use super::*;
    use crate::test_support::{function_data, ident, num, text, ExecHarness, LoadFixture};

    fn wait_with(clauses: &[FunctionData], baseline: WaitBaseline) -> WaitWithTimeout {
        let fixture = LoadFixture::new();
        let mut ctx = fixture.context();
        let mut wait = WaitWithTimeout::new(baseline);
        for clause in clauses {
            assert!(wait.load_clause(clause, &mut ctx));
        }
        assert!(ctx.diagnostics().is_empty(), "{:?}", ctx.diagnostics());
        wait
    }

    fn result_clauses(timeout: &str) -> Vec<FunctionData> {
        vec![
            function_data("set", vec![text("@r"), num("1")]),
            function_data("timeoutset", vec![num(timeout), text("@r"), num("0")]),
        ]
    }

    fn count_ab(ctx: &ExecContext<'_>, polarity: CountPolarity) -> bool {
        let count = ["a", "b"]
            .iter()
            .map(|id| ctx.director.count_story(id))
            .sum::<usize>();
        polarity.is_satisfied(count)
    }

    #[test]
    fn count_wait_times_out_on_the_tick_the_budget_is_reached() {
        let mut wait = wait_with(&result_clauses("500"), WaitBaseline::None);
        let mut harness = ExecHarness::new();
        wait.reset_state();
        for tick in 1..=4 {
            let mut ctx = harness.ctx();
            wait.evaluate(&ctx.eval(&StoryVariant::Absent, &[]));
            assert!(
                wait.step(&mut ctx, 100, |ctx, _| count_ab(ctx, CountPolarity::Present)),
                "tick {tick} should stay pending"
            );
            assert_eq!(wait.elapsed_millis(), tick * 100);
            assert!(harness.scope.get_variable("@r").is_none());
        }

        let mut ctx = harness.ctx();
        wait.evaluate(&ctx.eval(&StoryVariant::Absent, &[]));
        assert!(!wait.step(&mut ctx, 100, |ctx, _| count_ab(ctx, CountPolarity::Present)));
        assert_eq!(wait.elapsed_millis(), 500);
        assert_eq!(harness.scope.get_variable("@r"), Some(&StoryVariant::Int(0)));
    }

    #[test]
    fn count_wait_succeeds_without_adding_elapsed() {
        let mut wait = wait_with(&result_clauses("500"), WaitBaseline::None);
        let mut harness = ExecHarness::new();
        wait.reset_state();
        for tick in 1..=3 {
            if tick == 3 {
                harness.director.story_counts.insert("b".to_string(), 1);
            }
            let mut ctx = harness.ctx();
            wait.evaluate(&ctx.eval(&StoryVariant::Absent, &[]));
            let pending = wait.step(&mut ctx, 100, |ctx, _| count_ab(ctx, CountPolarity::Present));
            assert_eq!(pending, tick < 3);
        }
        assert_eq!(wait.elapsed_millis(), 200);
        assert_eq!(harness.scope.get_variable("@r"), Some(&StoryVariant::Int(1)));
    }

    #[test]
    fn satisfied_on_first_tick_has_zero_elapsed() {
        let mut wait = wait_with(&result_clauses("500"), WaitBaseline::None);
        let mut harness = ExecHarness::new();
        let mut ctx = harness.ctx();
        wait.evaluate(&ctx.eval(&StoryVariant::Absent, &[]));
        assert!(!wait.step(&mut ctx, 100, |ctx, _| count_ab(ctx, CountPolarity::Absent)));
        assert_eq!(wait.elapsed_millis(), 0);
        assert_eq!(harness.scope.get_variable("@r"), Some(&StoryVariant::Int(1)));
    }

    #[test]
    fn repeated_evaluate_before_step_does_not_change_the_outcome() {
        let clauses = vec![
            function_data("set", vec![text("@r"), ident("@msg")]),
            function_data("timeoutset", vec![ident("@limit"), text("@r"), text("late")]),
        ];
        let run = |evaluations: usize| {
            let mut wait = wait_with(&clauses, WaitBaseline::None);
            let mut harness = ExecHarness::new();
            harness.scope.set_variable("@limit", StoryVariant::Int(200));
            harness.scope.set_variable("@msg", StoryVariant::from("ok"));
            let mut outcomes = Vec::new();
            for _ in 0..2 {
                let mut ctx = harness.ctx();
                for _ in 0..evaluations {
                    wait.evaluate(&ctx.eval(&StoryVariant::Absent, &[]));
                }
                let pending = wait.step(&mut ctx, 100, |ctx, _| count_ab(ctx, CountPolarity::Present));
                outcomes.push((pending, wait.elapsed_millis()));
            }
            (outcomes, harness.scope.get_variable("@r").cloned())
        };

        let once = run(1);
        assert_eq!(once, run(3));
        assert_eq!(once.0, vec![(true, 100), (false, 200)]);
        assert_eq!(once.1, Some(StoryVariant::from("late")));
    }

    #[test]
    fn non_positive_timeout_never_fires() {
        for timeout in ["0", "-5"] {
            let mut wait = wait_with(&result_clauses(timeout), WaitBaseline::None);
            wait.evaluate(&crate::test_support::empty_eval());
            for _ in 0..1_000 {
                assert_eq!(wait.poll(0, 1_000, |_| false), WaitPoll::Pending);
            }
            assert_eq!(wait.elapsed_millis(), 1_000_000);
        }
    }

    #[test]
    fn missing_timeout_clause_means_no_timeout() {
        let mut wait = WaitWithTimeout::new(WaitBaseline::None);
        assert!(!wait.has_timeout_clause());
        assert_eq!(wait.timeout_millis(), 0);
        assert_eq!(wait.poll(0, 10_000, |_| false), WaitPoll::Pending);
    }

    #[test]
    fn baseline_is_captured_once() {
        let mut wait = WaitWithTimeout::new(WaitBaseline::StartTimestamp);
        let mut seen = Vec::new();
        wait.poll(100, 16, |start| {
            seen.push(start);
            false
        });
        wait.poll(116, 16, |start| {
            seen.push(start);
            false
        });
        assert_eq!(seen, vec![Some(100), Some(100)]);
        wait.reset_state();
        assert_eq!(wait.start_timestamp(), None);
    }

    #[test]
    fn clone_drops_run_state_and_keeps_clauses() {
        let mut wait = wait_with(&result_clauses("300"), WaitBaseline::StartTimestamp);
        wait.evaluate(&crate::test_support::empty_eval());
        assert_eq!(wait.poll(5, 100, |_| false), WaitPoll::Pending);

        let mut copy = wait.clone();
        assert_eq!(copy.elapsed_millis(), 0);
        assert_eq!(copy.start_timestamp(), None);
        assert!(copy.has_success_clause());
        assert_eq!(copy.timeout_millis(), 0, "clone starts unresolved");
        copy.evaluate(&crate::test_support::empty_eval());
        assert_eq!(copy.timeout_millis(), 300);
        assert_eq!(wait.elapsed_millis(), 100);
    }

    #[test]
    fn short_clauses_are_disabled_and_reported() {
        let fixture = LoadFixture::new();
        let mut ctx = fixture.context();
        let mut wait = WaitWithTimeout::new(WaitBaseline::None);
        assert!(wait.load_clause(&function_data("set", vec![text("@r")]), &mut ctx));
        assert!(wait.load_clause(
            &function_data("timeoutset", vec![num("10"), text("@r")]),
            &mut ctx
        ));
        assert!(!wait.load_clause(&function_data("result", vec![ident("@r")]), &mut ctx));
        assert!(!wait.has_success_clause());
        assert!(!wait.has_timeout_clause());
        assert_eq!(ctx.diagnostics().len(), 2);
    }

    #[test]
    fn variable_name_may_be_written_as_identifier() {
        let mut wait = wait_with(
            &[function_data("set", vec![ident("@done"), ident("@value")])],
            WaitBaseline::None,
        );
        let mut harness = ExecHarness::new();
        harness.scope.set_variable("@value", StoryVariant::from("yes"));
        let mut ctx = harness.ctx();
        wait.evaluate(&ctx.eval(&StoryVariant::Absent, &[]));
        assert!(!wait.step(&mut ctx, 16, |_, _| true));
        assert_eq!(
            harness.scope.get_variable("@done"),
            Some(&StoryVariant::from("yes"))
        );
    }
}
