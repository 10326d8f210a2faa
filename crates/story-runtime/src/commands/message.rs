use story_core::{CallData, FunctionData, StoryVariant};

use crate::command::{ExecContext, LoadContext, StoryCommand};
use crate::value::{EvalContext, StoryValue};
use crate::wait::{CountPolarity, WaitBaseline, WaitWithTimeout};

fn evaluate_ids(values: &mut [StoryValue<String>], ctx: &EvalContext<'_>) {
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

/// `firemessage(msg, args...)` and `fireconcurrentmessage(msg, args...)`.
/// A concurrent message starts a parallel handler run instead of queueing
/// behind a busy handler.
#[derive(Debug, Clone, Default)]
pub struct FireMessageCommand {
    concurrent: bool,
    message_id: StoryValue<String>,
    args: Vec<StoryValue<StoryVariant>>,
}

impl FireMessageCommand {
    pub fn new(concurrent: bool) -> Self {
        Self {
            concurrent,
            ..Self::default()
        }
    }
}

impl StoryCommand for FireMessageCommand {
    fn name(&self) -> &'static str {
        if self.concurrent {
            "fireconcurrentmessage"
        } else {
            "firemessage"
        }
    }

    fn load_call(&mut self, call: &CallData, ctx: &mut LoadContext<'_>) {
        if ctx.require_params(call, 1) {
            self.message_id = ctx.bind_param(call, 0);
            self.args = ctx.bind_params_from(call, 1);
        }
    }

    fn clone_command(&self) -> Box<dyn StoryCommand> {
        Box::new(self.clone())
    }

    fn evaluate(&mut self, ctx: &EvalContext<'_>) {
        self.message_id.evaluate(ctx);
        for arg in &mut self.args {
            arg.evaluate(ctx);
        }
    }

    fn exec_command(&mut self, ctx: &mut ExecContext<'_>, _delta: i64) -> bool {
        let message_id = self.message_id.value();
        if !message_id.is_empty() {
            let args = self.args.iter().map(|arg| arg.value().clone()).collect();
            ctx.director.send_message(message_id, args, self.concurrent);
        }
        false
    }
}

/// `waitallmessage(msg, ...)[set][timeoutset]`: waits until any listed message
/// is delivered to this instance after the wait started.
#[derive(Debug, Clone)]
pub struct WaitAllMessageCommand {
    message_ids: Vec<StoryValue<String>>,
    wait: WaitWithTimeout,
}

impl Default for WaitAllMessageCommand {
    fn default() -> Self {
        Self {
            message_ids: Vec::new(),
            wait: WaitWithTimeout::new(WaitBaseline::StartTimestamp),
        }
    }
}

impl StoryCommand for WaitAllMessageCommand {
    fn name(&self) -> &'static str {
        "waitallmessage"
    }

    fn load_call(&mut self, call: &CallData, ctx: &mut LoadContext<'_>) {
        if ctx.require_params(call, 1) {
            self.message_ids = ctx.bind_params_from(call, 0);
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
        evaluate_ids(&mut self.message_ids, ctx);
        self.wait.evaluate(ctx);
    }

    fn exec_command(&mut self, ctx: &mut ExecContext<'_>, delta: i64) -> bool {
        let message_ids = &self.message_ids;
        self.wait.step(ctx, delta, |ctx, start| {
            let Some(start) = start else {
                return false;
            };
            ids(message_ids).any(|id| {
                ctx.scope
                    .message_trigger_time(id)
                    .is_some_and(|triggered| triggered > start)
            })
        })
    }
}

/// `waitallmessagehandler(msg, ...)[set][timeoutset]`: waits until no handler
/// for the listed messages is running or queued anywhere.
#[derive(Debug, Clone)]
pub struct WaitAllMessageHandlerCommand {
    message_ids: Vec<StoryValue<String>>,
    wait: WaitWithTimeout,
}

impl Default for WaitAllMessageHandlerCommand {
    fn default() -> Self {
        Self {
            message_ids: Vec::new(),
            wait: WaitWithTimeout::new(WaitBaseline::None),
        }
    }
}

impl StoryCommand for WaitAllMessageHandlerCommand {
    fn name(&self) -> &'static str {
        "waitallmessagehandler"
    }

    fn load_call(&mut self, call: &CallData, ctx: &mut LoadContext<'_>) {
        if ctx.require_params(call, 1) {
            self.message_ids = ctx.bind_params_from(call, 0);
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
        evaluate_ids(&mut self.message_ids, ctx);
        self.wait.evaluate(ctx);
    }

    fn exec_command(&mut self, ctx: &mut ExecContext<'_>, delta: i64) -> bool {
        let message_ids = &self.message_ids;
        self.wait.step(ctx, delta, |ctx, _| {
            let active = ids(message_ids)
                .map(|id| ctx.director.count_message_handlers(id))
                .sum::<usize>();
            CountPolarity::Absent.is_satisfied(active)
        })
    }
}

/// `pauseallmessagehandler(msg, ...)` and `resumeallmessagehandler(msg, ...)`
#[derive(Debug, Clone, Default)]
pub struct PauseMessageHandlerCommand {
    paused: bool,
    message_ids: Vec<StoryValue<String>>,
}

impl PauseMessageHandlerCommand {
    pub fn new(paused: bool) -> Self {
        Self {
            paused,
            message_ids: Vec::new(),
        }
    }
}

impl StoryCommand for PauseMessageHandlerCommand {
    fn name(&self) -> &'static str {
        if self.paused {
            "pauseallmessagehandler"
        } else {
            "resumeallmessagehandler"
        }
    }

    fn load_call(&mut self, call: &CallData, ctx: &mut LoadContext<'_>) {
        self.message_ids = ctx.bind_params_from(call, 0);
    }

    fn clone_command(&self) -> Box<dyn StoryCommand> {
        Box::new(self.clone())
    }

    fn evaluate(&mut self, ctx: &EvalContext<'_>) {
        evaluate_ids(&mut self.message_ids, ctx);
    }

    fn exec_command(&mut self, ctx: &mut ExecContext<'_>, _delta: i64) -> bool {
        for id in ids(&self.message_ids) {
            ctx.director.pause_message_handlers(id, self.paused);
        }
        false
    }
}
