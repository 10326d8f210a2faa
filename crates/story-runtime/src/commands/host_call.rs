use story_core::{CallData, FunctionData, StoryVariant};
use tracing::warn;

use crate::command::{ExecContext, LoadContext, StoryCommand};
use crate::value::{EvalContext, StoryValue};

/// `hostcall(name, args...)[result(@var)]`
///
/// Calls into the embedding application. When the call fails the side effect
/// is skipped, the result variable is left untouched and the command still
/// completes.
#[derive(Debug, Clone, Default)]
pub struct HostCallCommand {
    function: StoryValue<String>,
    args: Vec<StoryValue<StoryVariant>>,
    result_var: Option<StoryValue<String>>,
}

impl StoryCommand for HostCallCommand {
    fn name(&self) -> &'static str {
        "hostcall"
    }

    fn load_call(&mut self, call: &CallData, ctx: &mut LoadContext<'_>) {
        if ctx.require_params(call, 1) {
            self.function = ctx.bind_param(call, 0);
            self.args = ctx.bind_params_from(call, 1);
        }
    }

    fn load_clause(&mut self, clause: &FunctionData, ctx: &mut LoadContext<'_>) -> bool {
        if clause.id() != "result" {
            return false;
        }
        if ctx.require_params(&clause.call, 1) {
            self.result_var = Some(ctx.bind_variable_name(&clause.call, 0));
        }
        true
    }

    fn clone_command(&self) -> Box<dyn StoryCommand> {
        Box::new(self.clone())
    }

    fn evaluate(&mut self, ctx: &EvalContext<'_>) {
        self.function.evaluate(ctx);
        for arg in &mut self.args {
            arg.evaluate(ctx);
        }
        if let Some(var) = &mut self.result_var {
            var.evaluate(ctx);
        }
    }

    fn exec_command(&mut self, ctx: &mut ExecContext<'_>, _delta: i64) -> bool {
        let function = self.function.value();
        let args = self
            .args
            .iter()
            .map(|arg| arg.value().clone())
            .collect::<Vec<_>>();
        match ctx.host_functions.call(function, &args) {
            Ok(value) => {
                if let Some(var) = &self.result_var {
                    if !var.value().is_empty() {
                        ctx.scope.set_variable(var.value().clone(), value);
                    }
                }
            }
            Err(error) => {
                warn!(
                    function = %function,
                    code = %error.code,
                    message = %error.message,
                    "host call failed, skipping"
                );
            }
        }
        false
    }
}

#[cfg(test)]
mod host_call_tests {
    use super::*;
    use crate::queue::CommandQueue;
    use crate::test_support::{call, compile_block, ident, num, statement, text, ExecHarness};
    use story_core::ObjectHandle;

    #[test]
    fn result_clause_receives_host_value() {
        let mut queue = CommandQueue::new(compile_block(&[statement(vec![
            ("hostcall", vec![text("spawn"), text("guard"), num("2")]),
            ("result", vec![ident("@obj")]),
        ])]));
        let mut harness = ExecHarness::new();
        assert!(!queue.tick(&mut harness.ctx(), 16, &StoryVariant::Absent, &[]));
        assert_eq!(
            harness.scope.get_variable("@obj"),
            Some(&StoryVariant::Object(ObjectHandle { handle: 1 }))
        );
        assert_eq!(
            harness.host.calls(),
            vec!["spawn(guard 2)".to_string()]
        );
    }

    #[test]
    fn failed_host_call_completes_without_writing() {
        let mut queue = CommandQueue::new(compile_block(&[
            statement(vec![
                ("hostcall", vec![text("missing")]),
                ("result", vec![ident("@obj")]),
            ]),
            call("assign", vec![ident("@after"), num("1")]),
        ]));
        let mut harness = ExecHarness::new();
        assert!(!queue.tick(&mut harness.ctx(), 16, &StoryVariant::Absent, &[]));
        assert!(harness.scope.get_variable("@obj").is_none());
        assert_eq!(harness.scope.get_variable("@after"), Some(&StoryVariant::Int(1)));
    }
}
