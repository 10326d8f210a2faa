use story_core::{CallData, FunctionData};
use tracing::warn;

use crate::command::{ExecContext, LoadContext, StoryCommand};
use crate::value::{EvalContext, StoryValue};
use crate::wait::{CountPolarity, WaitBaseline, WaitWithTimeout};

fn evaluate_all(values: &mut [StoryValue<String>], ctx: &EvalContext<'_>) {
    for value in values {
        value.evaluate(ctx);
    }
}

fn ids(values: &[StoryValue<String>]) -> impl Iterator<Item = &str> {
    values
        .iter()
        .map(|value| value.value().as_str())
        .filter(|id| !id.is_empty())
}

/// `startstory(id)`
#[derive(Debug, Clone, Default)]
pub struct StartStoryCommand {
    story_id: StoryValue<String>,
}

impl StoryCommand for StartStoryCommand {
    fn name(&self) -> &'static str {
        "startstory"
    }

    fn load_call(&mut self, call: &CallData, ctx: &mut LoadContext<'_>) {
        if ctx.require_params(call, 1) {
            self.story_id = ctx.bind_param(call, 0);
        }
    }

    fn clone_command(&self) -> Box<dyn StoryCommand> {
        Box::new(self.clone())
    }

    fn evaluate(&mut self, ctx: &EvalContext<'_>) {
        self.story_id.evaluate(ctx);
    }

    fn exec_command(&mut self, ctx: &mut ExecContext<'_>, _delta: i64) -> bool {
        let story_id = self.story_id.value();
        if story_id.is_empty() {
            warn!("startstory without a story id is skipped");
        } else {
            ctx.director.start_story(story_id);
        }
        false
    }
}

/// `stopstory(id)`
#[derive(Debug, Clone, Default)]
pub struct StopStoryCommand {
    story_id: StoryValue<String>,
}

impl StoryCommand for StopStoryCommand {
    fn name(&self) -> &'static str {
        "stopstory"
    }

    fn load_call(&mut self, call: &CallData, ctx: &mut LoadContext<'_>) {
        if ctx.require_params(call, 1) {
            self.story_id = ctx.bind_param(call, 0);
        }
    }

    fn clone_command(&self) -> Box<dyn StoryCommand> {
        Box::new(self.clone())
    }

    fn evaluate(&mut self, ctx: &EvalContext<'_>) {
        self.story_id.evaluate(ctx);
    }

    fn exec_command(&mut self, ctx: &mut ExecContext<'_>, _delta: i64) -> bool {
        let story_id = self.story_id.value();
        if !story_id.is_empty() {
            ctx.director.stop_story(story_id);
        }
        false
    }
}

/// `waitstory(id, ...)[set(var, val)][timeoutset(ms, var, val)]`: waits until
/// none of the listed stories is running.
#[derive(Debug, Clone)]
pub struct WaitStoryCommand {
    story_ids: Vec<StoryValue<String>>,
    wait: WaitWithTimeout,
}

impl Default for WaitStoryCommand {
    fn default() -> Self {
        Self {
            story_ids: Vec::new(),
            wait: WaitWithTimeout::new(WaitBaseline::None),
        }
    }
}

impl StoryCommand for WaitStoryCommand {
    fn name(&self) -> &'static str {
        "waitstory"
    }

    fn load_call(&mut self, call: &CallData, ctx: &mut LoadContext<'_>) {
        if ctx.require_params(call, 1) {
            self.story_ids = ctx.bind_params_from(call, 0);
        }
    }

    fn load_clause(&mut self, clause: &FunctionData, ctx: &mut LoadContext<'_>) -> bool {
        self.wait.load_clause(clause, ctx)
    }

    fn clone_command(&self) -> Box<dyn StoryCommand> {
        Box::new(self.clone())
    }

    fn reset_state(&mut self) {
        self.wait.reset_state();
    }

    fn evaluate(&mut self, ctx: &EvalContext<'_>) {
        evaluate_all(&mut self.story_ids, ctx);
        self.wait.evaluate(ctx);
    }

    fn exec_command(&mut self, ctx: &mut ExecContext<'_>, delta: i64) -> bool {
        let story_ids = &self.story_ids;
        self.wait.step(ctx, delta, |ctx, _| {
            let running = ids(story_ids)
                .map(|id| ctx.director.count_story(id))
                .sum::<usize>();
            CountPolarity::Absent.is_satisfied(running)
        })
    }
}

/// `pausestory(id, ...)` and `resumestory(id, ...)`
#[derive(Debug, Clone, Default)]
pub struct PauseStoryCommand {
    paused: bool,
    story_ids: Vec<StoryValue<String>>,
}

impl PauseStoryCommand {
    pub fn new(paused: bool) -> Self {
        Self {
            paused,
            story_ids: Vec::new(),
        }
    }
}

impl StoryCommand for PauseStoryCommand {
    fn name(&self) -> &'static str {
        if self.paused {
            "pausestory"
        } else {
            "resumestory"
        }
    }

    fn load_call(&mut self, call: &CallData, ctx: &mut LoadContext<'_>) {
        self.story_ids = ctx.bind_params_from(call, 0);
    }

    fn clone_command(&self) -> Box<dyn StoryCommand> {
        Box::new(self.clone())
    }

    fn evaluate(&mut self, ctx: &EvalContext<'_>) {
        evaluate_all(&mut self.story_ids, ctx);
    }

    fn exec_command(&mut self, ctx: &mut ExecContext<'_>, _delta: i64) -> bool {
        for id in ids(&self.story_ids) {
            ctx.director.pause_story(id, self.paused);
        }
        false
    }
}

#[cfg(test)]
mod story_command_tests {
    use super::*;
    use crate::queue::CommandQueue;
    use crate::test_support::{call, compile_block, num, statement, text, ExecHarness};
    use story_core::StoryVariant;

    #[test]
    fn start_stop_and_pause_reach_the_director() {
        let mut queue = CommandQueue::new(compile_block(&[
            call("startstory", vec![text("side")]),
            call("pausestory", vec![text("side"), text("other")]),
            call("resumestory", vec![text("side")]),
            call("stopstory", vec![text("side")]),
        ]));
        let mut harness = ExecHarness::new();
        assert!(!queue.tick(&mut harness.ctx(), 16, &StoryVariant::Absent, &[]));
        assert_eq!(
            harness.director.calls,
            vec![
                "start:side",
                "pause:side:true",
                "pause:other:true",
                "pause:side:false",
                "stop:side",
            ]
        );
    }

    #[test]
    fn waitstory_completes_when_no_listed_story_runs() {
        let mut queue = CommandQueue::new(compile_block(&[statement(vec![
            ("waitstory", vec![text("a"), text("b")]),
            ("set", vec![text("@r"), num("1")]),
            ("timeoutset", vec![num("1000"), text("@r"), num("0")]),
        ])]));
        let mut harness = ExecHarness::new();
        harness.director.story_counts.insert("a".to_string(), 1);

        assert!(queue.tick(&mut harness.ctx(), 100, &StoryVariant::Absent, &[]));
        assert!(harness.scope.get_variable("@r").is_none());

        harness.director.story_counts.insert("a".to_string(), 0);
        assert!(!queue.tick(&mut harness.ctx(), 100, &StoryVariant::Absent, &[]));
        assert_eq!(harness.scope.get_variable("@r"), Some(&StoryVariant::Int(1)));
    }

    #[test]
    fn waitstory_times_out_while_story_keeps_running() {
        let mut queue = CommandQueue::new(compile_block(&[statement(vec![
            ("waitstory", vec![text("boss")]),
            ("timeoutset", vec![num("300"), text("@timedout"), num("1")]),
        ])]));
        let mut harness = ExecHarness::new();
        harness.director.story_counts.insert("boss".to_string(), 1);

        let mut ticks = 0;
        while queue.tick(&mut harness.ctx(), 100, &StoryVariant::Absent, &[]) {
            ticks += 1;
        }
        assert_eq!(ticks, 2);
        assert_eq!(
            harness.scope.get_variable("@timedout"),
            Some(&StoryVariant::Int(1))
        );
    }
}
