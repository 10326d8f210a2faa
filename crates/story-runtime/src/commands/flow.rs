use story_core::{CallData, FunctionData, StoryError, StoryVariant};
use tracing::{info, warn};

use crate::command::{ExecContext, LoadContext, StoryCommand};
use crate::queue::CommandQueue;
use crate::value::{EvalContext, StoryValue};

/// `assign(@var, value)`
#[derive(Debug, Clone, Default)]
pub struct AssignCommand {
    var: StoryValue<String>,
    value: StoryValue<StoryVariant>,
}

impl StoryCommand for AssignCommand {
    fn name(&self) -> &'static str {
        "assign"
    }

    fn load_call(&mut self, call: &CallData, ctx: &mut LoadContext<'_>) {
        if ctx.require_params(call, 2) {
            self.var = ctx.bind_variable_name(call, 0);
            self.value = ctx.bind_param(call, 1);
        }
    }

    fn clone_command(&self) -> Box<dyn StoryCommand> {
        Box::new(self.clone())
    }

    fn evaluate(&mut self, ctx: &EvalContext<'_>) {
        self.var.evaluate(ctx);
        self.value.evaluate(ctx);
    }

    fn exec_command(&mut self, ctx: &mut ExecContext<'_>, _delta: i64) -> bool {
        let name = self.var.value();
        if name.is_empty() {
            warn!("assign without a target variable is skipped");
        } else {
            ctx.scope.set_variable(name.clone(), self.value.value().clone());
        }
        false
    }
}

/// `wait(ms)`. Completes once the accumulated delta reaches `ms` and never
/// starts its successor in the same tick.
#[derive(Debug, Default)]
pub struct WaitCommand {
    time: StoryValue<i64>,
    elapsed_millis: i64,
}

impl StoryCommand for WaitCommand {
    fn name(&self) -> &'static str {
        "wait"
    }

    fn load_call(&mut self, call: &CallData, ctx: &mut LoadContext<'_>) {
        if ctx.require_params(call, 1) {
            self.time = ctx.bind_param(call, 0);
        }
    }

    fn clone_command(&self) -> Box<dyn StoryCommand> {
        Box::new(Self {
            time: self.time.clone(),
            elapsed_millis: 0,
        })
    }

    fn reset_state(&mut self) {
        self.elapsed_millis = 0;
    }

    fn evaluate(&mut self, ctx: &EvalContext<'_>) {
        self.time.evaluate(ctx);
    }

    fn exec_command(&mut self, _ctx: &mut ExecContext<'_>, delta: i64) -> bool {
        self.elapsed_millis += delta;
        self.elapsed_millis < *self.time.value()
    }

    fn chains_in_same_tick(&self) -> bool {
        false
    }
}

/// Runs a cloned copy of a body once per iteration.
#[derive(Debug, Default)]
struct BlockRunner {
    body: Vec<Box<dyn StoryCommand>>,
    current: Option<CommandQueue>,
    index: usize,
}

impl Clone for BlockRunner {
    fn clone(&self) -> Self {
        Self {
            body: self.body.clone(),
            current: None,
            index: 0,
        }
    }
}

impl BlockRunner {
    fn load(&mut self, owner: &str, function: &FunctionData, ctx: &mut LoadContext<'_>) {
        if !function.has_body {
            ctx.report(StoryError::with_span(
                "STORY_BODY_MISSING",
                format!("\"{}\" needs a body block.", owner),
                function.call.location.clone(),
            ));
        }
        self.body = ctx.compile_block(&function.body);
    }

    fn reset(&mut self) {
        self.current = None;
        self.index = 0;
    }

    fn run(
        &mut self,
        ctx: &mut ExecContext<'_>,
        delta: i64,
        iterations: usize,
        item: impl Fn(usize) -> StoryVariant,
        args: &[StoryVariant],
    ) -> bool {
        loop {
            if self.current.is_none() {
                if self.index >= iterations {
                    return false;
                }
                if !ctx.try_consume_step() {
                    return true;
                }
                self.current = Some(CommandQueue::from_template(&self.body));
            }
            let iterator = item(self.index);
            let mut deferred = false;
            if let Some(queue) = self.current.as_mut() {
                if queue.tick(ctx, delta, &iterator, args) {
                    return true;
                }
                deferred = queue.deferred();
            }
            self.current = None;
            self.index += 1;
            // a body ending on wait/terminate hands the rest of the loop to the next tick
            if deferred {
                return true;
            }
        }
    }
}

/// `loop(count){ ... }`; `$$` is the zero-based iteration index.
#[derive(Debug, Default)]
pub struct LoopCommand {
    count: StoryValue<i64>,
    block: BlockRunner,
    total: Option<usize>,
    args: Vec<StoryVariant>,
}

impl StoryCommand for LoopCommand {
    fn name(&self) -> &'static str {
        "loop"
    }

    fn load_call(&mut self, call: &CallData, ctx: &mut LoadContext<'_>) {
        self.load_function(&FunctionData::from_call(call.clone()), ctx);
    }

    fn load_function(&mut self, function: &FunctionData, ctx: &mut LoadContext<'_>) {
        if ctx.require_params(&function.call, 1) {
            self.count = ctx.bind_param(&function.call, 0);
        }
        let name = self.name();
        self.block.load(name, function, ctx);
    }

    fn clone_command(&self) -> Box<dyn StoryCommand> {
        Box::new(Self {
            count: self.count.clone(),
            block: self.block.clone(),
            total: None,
            args: Vec::new(),
        })
    }

    fn reset_state(&mut self) {
        self.block.reset();
        self.total = None;
    }

    fn evaluate(&mut self, ctx: &EvalContext<'_>) {
        self.count.evaluate(ctx);
        self.args = ctx.args.to_vec();
    }

    fn exec_command(&mut self, ctx: &mut ExecContext<'_>, delta: i64) -> bool {
        let count = *self.count.value();
        let total = *self.total.get_or_insert(count.max(0) as usize);
        self.block.run(
            ctx,
            delta,
            total,
            |index| StoryVariant::Int(index as i64),
            &self.args,
        )
    }
}

/// `foreach(v1, v2, ...){ ... }`; `$$` is the current value. A single list
/// operand iterates its elements.
#[derive(Debug, Default)]
pub struct ForeachCommand {
    values: Vec<StoryValue<StoryVariant>>,
    block: BlockRunner,
    items: Option<Vec<StoryVariant>>,
    args: Vec<StoryVariant>,
}

impl ForeachCommand {
    fn snapshot(&self) -> Vec<StoryVariant> {
        match self.values.as_slice() {
            [single] => match single.value() {
                StoryVariant::List(items) => items.clone(),
                other => vec![other.clone()],
            },
            values => values.iter().map(|value| value.value().clone()).collect(),
        }
    }
}

impl StoryCommand for ForeachCommand {
    fn name(&self) -> &'static str {
        "foreach"
    }

    fn load_call(&mut self, call: &CallData, ctx: &mut LoadContext<'_>) {
        self.load_function(&FunctionData::from_call(call.clone()), ctx);
    }

    fn load_function(&mut self, function: &FunctionData, ctx: &mut LoadContext<'_>) {
        self.values = ctx.bind_params_from(&function.call, 0);
        let name = self.name();
        self.block.load(name, function, ctx);
    }

    fn clone_command(&self) -> Box<dyn StoryCommand> {
        Box::new(Self {
            values: self.values.clone(),
            block: self.block.clone(),
            items: None,
            args: Vec::new(),
        })
    }

    fn reset_state(&mut self) {
        self.block.reset();
        self.items = None;
    }

    fn evaluate(&mut self, ctx: &EvalContext<'_>) {
        for value in &mut self.values {
            value.evaluate(ctx);
        }
        self.args = ctx.args.to_vec();
    }

    fn exec_command(&mut self, ctx: &mut ExecContext<'_>, delta: i64) -> bool {
        if self.items.is_none() {
            self.items = Some(self.snapshot());
        }
        let items = self.items.as_deref().unwrap_or_default();
        self.block.run(
            ctx,
            delta,
            items.len(),
            |index| items[index].clone(),
            &self.args,
        )
    }
}

/// `localmessage(msg, args...)`: delivered to this instance on the next tick.
#[derive(Debug, Clone, Default)]
pub struct LocalMessageCommand {
    message_id: StoryValue<String>,
    args: Vec<StoryValue<StoryVariant>>,
}

impl StoryCommand for LocalMessageCommand {
    fn name(&self) -> &'static str {
        "localmessage"
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
            ctx.signals.post_local_message(message_id.clone(), args);
        }
        false
    }
}

/// `terminate()`: ends the owning instance after the current handler step.
#[derive(Debug, Clone, Default)]
pub struct TerminateCommand;

impl StoryCommand for TerminateCommand {
    fn name(&self) -> &'static str {
        "terminate"
    }

    fn load_call(&mut self, _call: &CallData, _ctx: &mut LoadContext<'_>) {}

    fn clone_command(&self) -> Box<dyn StoryCommand> {
        Box::new(Self)
    }

    fn evaluate(&mut self, _ctx: &EvalContext<'_>) {}

    fn exec_command(&mut self, ctx: &mut ExecContext<'_>, _delta: i64) -> bool {
        ctx.signals.request_terminate();
        false
    }

    fn chains_in_same_tick(&self) -> bool {
        false
    }
}

/// `log(args...)`
#[derive(Debug, Clone, Default)]
pub struct LogCommand {
    values: Vec<StoryValue<String>>,
}

impl StoryCommand for LogCommand {
    fn name(&self) -> &'static str {
        "log"
    }

    fn load_call(&mut self, call: &CallData, ctx: &mut LoadContext<'_>) {
        self.values = ctx.bind_params_from(call, 0);
    }

    fn clone_command(&self) -> Box<dyn StoryCommand> {
        Box::new(self.clone())
    }

    fn evaluate(&mut self, ctx: &EvalContext<'_>) {
        for value in &mut self.values {
            value.evaluate(ctx);
        }
    }

    fn exec_command(&mut self, _ctx: &mut ExecContext<'_>, _delta: i64) -> bool {
        let line = self
            .values
            .iter()
            .map(|value| value.value().as_str())
            .collect::<Vec<_>>()
            .join(" ");
        info!(target: "story", "{}", line);
        false
    }
}
