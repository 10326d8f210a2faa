use std::fmt;

use story_core::{
    CallData, FromVariant, FunctionData, StatementData, StoryError, StoryVariant, SyntaxNode,
    ValueToken,
};
use tracing::warn;

use crate::compiler::StoryCommandRegistry;
use crate::director::{HostFunctionRegistry, StoryDirector};
use crate::expr::ExpressionEngine;
use crate::functions::ValueFunctionRegistry;
use crate::scope::VariableScope;
use crate::value::{EvalContext, StoryValue};

pub const DEFAULT_MAX_STEPS_PER_TICK: usize = 10_000;

/// A resumable unit of story work.
///
/// A command is loaded once into a template, cloned per activation, and then
/// driven by the scheduler: `reset_state` before its first tick, `evaluate`
/// then `exec_command` on every tick. `exec_command` returns `true` while the
/// command still has work for later ticks and `false` once it is complete.
pub trait StoryCommand: fmt::Debug {
    fn name(&self) -> &'static str;

    fn load_call(&mut self, call: &CallData, ctx: &mut LoadContext<'_>);

    fn load_function(&mut self, function: &FunctionData, ctx: &mut LoadContext<'_>) {
        if function.has_body {
            ctx.report(StoryError::with_span(
                "STORY_BODY_UNEXPECTED",
                format!("Command \"{}\" does not take a body; it is ignored.", self.name()),
                function.call.location.clone(),
            ));
        }
        self.load_call(&function.call, ctx);
    }

    fn load_statement(&mut self, statement: &StatementData, ctx: &mut LoadContext<'_>) {
        let Some((first, clauses)) = statement.functions.split_first() else {
            return;
        };
        self.load_function(first, ctx);
        for clause in clauses {
            if !self.load_clause(clause, ctx) {
                ctx.report(StoryError::with_span(
                    "STORY_CLAUSE_UNKNOWN",
                    format!(
                        "Command \"{}\" does not accept clause \"{}\".",
                        self.name(),
                        clause.id()
                    ),
                    clause.call.location.clone(),
                ));
            }
        }
    }

    /// Returns `false` when the clause is not one this command understands.
    fn load_clause(&mut self, _clause: &FunctionData, _ctx: &mut LoadContext<'_>) -> bool {
        false
    }

    fn clone_command(&self) -> Box<dyn StoryCommand>;

    fn reset_state(&mut self) {}

    fn evaluate(&mut self, ctx: &EvalContext<'_>);

    fn exec_command(&mut self, ctx: &mut ExecContext<'_>, delta: i64) -> bool;

    /// Whether the successor may start in the tick this command completed in.
    fn chains_in_same_tick(&self) -> bool {
        true
    }
}

impl Clone for Box<dyn StoryCommand> {
    fn clone(&self) -> Self {
        self.clone_command()
    }
}

pub fn load_command(command: &mut dyn StoryCommand, node: &SyntaxNode, ctx: &mut LoadContext<'_>) {
    match node {
        SyntaxNode::Call(call) => command.load_call(call, ctx),
        SyntaxNode::Function(function) => command.load_function(function, ctx),
        SyntaxNode::Statement(statement) => command.load_statement(statement, ctx),
        SyntaxNode::Value(value) => command.load_call(
            &CallData {
                id: value.text.clone(),
                params: Vec::new(),
                location: value.location.clone(),
            },
            ctx,
        ),
    }
}

/// Registries and diagnostics used while compiling a story.
pub struct LoadContext<'a> {
    commands: &'a StoryCommandRegistry,
    functions: &'a ValueFunctionRegistry,
    expressions: &'a ExpressionEngine,
    diagnostics: Vec<StoryError>,
}

impl<'a> LoadContext<'a> {
    pub fn new(
        commands: &'a StoryCommandRegistry,
        functions: &'a ValueFunctionRegistry,
        expressions: &'a ExpressionEngine,
    ) -> Self {
        Self {
            commands,
            functions,
            expressions,
            diagnostics: Vec::new(),
        }
    }

    pub fn functions(&self) -> &ValueFunctionRegistry {
        self.functions
    }

    pub fn expressions(&self) -> &ExpressionEngine {
        self.expressions
    }

    pub fn diagnostics(&self) -> &[StoryError] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<StoryError> {
        self.diagnostics
    }

    pub fn report(&mut self, error: StoryError) {
        warn!(code = %error.code, message = %error.message, "story load diagnostic");
        self.diagnostics.push(error);
    }

    /// Binds `node` into `value`, recording a diagnostic on failure.
    pub fn bind<T: FromVariant>(&mut self, value: &mut StoryValue<T>, node: &SyntaxNode) -> bool {
        match value.init_from_dsl(node, self) {
            Ok(()) => true,
            Err(error) => {
                self.report(error);
                false
            }
        }
    }

    /// A missing parameter yields an unbound value.
    pub fn bind_param<T: FromVariant>(&mut self, call: &CallData, index: usize) -> StoryValue<T> {
        let mut value = StoryValue::new();
        if let Some(node) = call.param(index) {
            self.bind(&mut value, node);
        }
        value
    }

    /// A bare `@name` identifier names the variable instead of reading it.
    pub fn bind_variable_name(&mut self, call: &CallData, index: usize) -> StoryValue<String> {
        match call.param(index) {
            Some(SyntaxNode::Value(value))
                if value.token == ValueToken::Identifier && value.text.starts_with('@') =>
            {
                StoryValue::literal(value.text.as_str())
            }
            _ => self.bind_param(call, index),
        }
    }

    pub fn bind_params_from<T: FromVariant>(
        &mut self,
        call: &CallData,
        start: usize,
    ) -> Vec<StoryValue<T>> {
        (start..call.param_num())
            .map(|index| self.bind_param(call, index))
            .collect()
    }

    pub fn require_params(&mut self, call: &CallData, min: usize) -> bool {
        if call.param_num() >= min {
            return true;
        }
        self.report(StoryError::with_span(
            "STORY_PARSE_ARITY",
            format!(
                "\"{}\" expects at least {} parameter(s), got {}.",
                call.id,
                min,
                call.param_num()
            ),
            call.location.clone(),
        ));
        false
    }

    pub fn compile_command(&mut self, node: &SyntaxNode) -> Option<Box<dyn StoryCommand>> {
        let id = node.id();
        let Some(mut command) = self.commands.create(id) else {
            self.report(StoryError::with_span(
                "STORY_COMMAND_UNKNOWN",
                format!("Unknown story command \"{}\"; it is skipped.", id),
                node.location().clone(),
            ));
            return None;
        };
        load_command(command.as_mut(), node, self);
        Some(command)
    }

    pub fn compile_block(&mut self, nodes: &[SyntaxNode]) -> Vec<Box<dyn StoryCommand>> {
        nodes
            .iter()
            .filter_map(|node| self.compile_command(node))
            .collect()
    }
}

/// Effects a command asks its owning instance to apply.
#[derive(Debug, Default)]
pub struct InstanceSignals {
    local_messages: Vec<(String, Vec<StoryVariant>)>,
    terminate: bool,
}

impl InstanceSignals {
    pub fn post_local_message(&mut self, message_id: impl Into<String>, args: Vec<StoryVariant>) {
        self.local_messages.push((message_id.into(), args));
    }

    pub fn take_local_messages(&mut self) -> Vec<(String, Vec<StoryVariant>)> {
        std::mem::take(&mut self.local_messages)
    }

    pub fn request_terminate(&mut self) {
        self.terminate = true;
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate
    }
}

/// Everything a command may touch while executing.
pub struct ExecContext<'a> {
    pub scope: &'a mut VariableScope,
    pub director: &'a mut dyn StoryDirector,
    pub host_functions: &'a dyn HostFunctionRegistry,
    pub signals: &'a mut InstanceSignals,
    pub now_millis: i64,
    steps_remaining: usize,
}

impl<'a> ExecContext<'a> {
    pub fn new(
        scope: &'a mut VariableScope,
        director: &'a mut dyn StoryDirector,
        host_functions: &'a dyn HostFunctionRegistry,
        signals: &'a mut InstanceSignals,
        now_millis: i64,
        max_steps: usize,
    ) -> Self {
        Self {
            scope,
            director,
            host_functions,
            signals,
            now_millis,
            steps_remaining: max_steps,
        }
    }

    pub fn steps_remaining(&self) -> usize {
        self.steps_remaining
    }

    /// Takes one step from the per-tick budget; `false` once it is used up.
    pub fn try_consume_step(&mut self) -> bool {
        if self.steps_remaining == 0 {
            return false;
        }
        self.steps_remaining -= 1;
        true
    }

    pub fn eval<'b>(&'b self, iterator: &'b StoryVariant, args: &'b [StoryVariant]) -> EvalContext<'b> {
        EvalContext {
            scope: &*self.scope,
            iterator,
            args,
        }
    }
}
