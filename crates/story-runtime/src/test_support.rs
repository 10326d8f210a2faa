use std::collections::BTreeMap;
use std::sync::Mutex;

use story_core::{
    CallData, FunctionData, HandlerDecl, ObjectHandle, SourceSpan, StatementData, StoryDocument,
    StoryError, StoryVariant, SyntaxNode, ValueData, ValueToken,
};

use crate::command::{ExecContext, InstanceSignals, LoadContext, StoryCommand};
use crate::compiler::StoryCommandRegistry;
use crate::director::{HostFunctionRegistry, StoryDirector};
use crate::expr::ExpressionEngine;
use crate::functions::ValueFunctionRegistry;
use crate::scope::VariableScope;
use crate::value::EvalContext;

fn value(text: &str, token: ValueToken) -> SyntaxNode {
    SyntaxNode::Value(ValueData {
        text: text.to_string(),
        token,
        location: SourceSpan::synthetic(),
    })
}

pub(crate) fn num(text: &str) -> SyntaxNode {
    value(text, ValueToken::Number)
}

pub(crate) fn text(text: &str) -> SyntaxNode {
    value(text, ValueToken::String)
}

pub(crate) fn ident(text: &str) -> SyntaxNode {
    value(text, ValueToken::Identifier)
}

pub(crate) fn call_data(id: &str, params: Vec<SyntaxNode>) -> CallData {
    CallData {
        id: id.to_string(),
        params,
        location: SourceSpan::synthetic(),
    }
}

pub(crate) fn call(id: &str, params: Vec<SyntaxNode>) -> SyntaxNode {
    SyntaxNode::Call(call_data(id, params))
}

pub(crate) fn function_data(id: &str, params: Vec<SyntaxNode>) -> FunctionData {
    FunctionData::from_call(call_data(id, params))
}

pub(crate) fn function(id: &str, params: Vec<SyntaxNode>, body: Vec<SyntaxNode>) -> SyntaxNode {
    SyntaxNode::Function(FunctionData {
        call: call_data(id, params),
        body,
        has_body: true,
    })
}

pub(crate) fn statement(clauses: Vec<(&str, Vec<SyntaxNode>)>) -> SyntaxNode {
    SyntaxNode::Statement(StatementData {
        functions: clauses
            .into_iter()
            .map(|(id, params)| function_data(id, params))
            .collect(),
        location: SourceSpan::synthetic(),
    })
}

pub(crate) fn document(
    story_id: &str,
    persistent: bool,
    handlers: Vec<(&str, Vec<SyntaxNode>)>,
) -> StoryDocument {
    StoryDocument {
        story_id: story_id.to_string(),
        persistent,
        handlers: handlers
            .into_iter()
            .map(|(message_id, body)| HandlerDecl {
                message_id: message_id.to_string(),
                body,
                location: SourceSpan::synthetic(),
            })
            .collect(),
        location: SourceSpan::synthetic(),
    }
}

pub(crate) fn empty_eval() -> EvalContext<'static> {
    let scope: &'static VariableScope = Box::leak(Box::new(VariableScope::new()));
    let iterator: &'static StoryVariant = Box::leak(Box::new(StoryVariant::Absent));
    EvalContext {
        scope,
        iterator,
        args: &[],
    }
}

pub(crate) struct LoadFixture {
    commands: StoryCommandRegistry,
    functions: ValueFunctionRegistry,
    expressions: ExpressionEngine,
}

impl LoadFixture {
    pub(crate) fn new() -> Self {
        Self {
            commands: StoryCommandRegistry::with_builtins(),
            functions: ValueFunctionRegistry::with_builtins(),
            expressions: ExpressionEngine::new(),
        }
    }

    pub(crate) fn context(&self) -> LoadContext<'_> {
        LoadContext::new(&self.commands, &self.functions, &self.expressions)
    }
}

/// Compiles a block and fails the test on any diagnostic.
pub(crate) fn compile_block(nodes: &[SyntaxNode]) -> Vec<Box<dyn StoryCommand>> {
    let fixture = LoadFixture::new();
    let mut ctx = fixture.context();
    let block = ctx.compile_block(nodes);
    assert!(
        ctx.diagnostics().is_empty(),
        "unexpected diagnostics: {:?}",
        ctx.diagnostics()
    );
    block
}

#[derive(Debug, Default)]
pub(crate) struct RecordingDirector {
    pub(crate) story_counts: BTreeMap<String, usize>,
    pub(crate) handler_counts: BTreeMap<String, usize>,
    pub(crate) calls: Vec<String>,
}

impl StoryDirector for RecordingDirector {
    fn start_story(&mut self, story_id: &str) {
        self.calls.push(format!("start:{}", story_id));
    }

    fn stop_story(&mut self, story_id: &str) {
        self.calls.push(format!("stop:{}", story_id));
    }

    fn pause_story(&mut self, story_id: &str, paused: bool) {
        self.calls.push(format!("pause:{}:{}", story_id, paused));
    }

    fn count_story(&self, story_id: &str) -> usize {
        self.story_counts.get(story_id).copied().unwrap_or(0)
    }

    fn send_message(&mut self, message_id: &str, args: Vec<StoryVariant>, concurrent: bool) {
        let args = args
            .iter()
            .map(StoryVariant::to_text)
            .collect::<Vec<_>>()
            .join(" ");
        self.calls
            .push(format!("send:{}:{}:{}", message_id, args, concurrent));
    }

    fn count_message_handlers(&self, message_id: &str) -> usize {
        self.handler_counts.get(message_id).copied().unwrap_or(0)
    }

    fn pause_message_handlers(&mut self, message_id: &str, paused: bool) {
        self.calls
            .push(format!("pausehandlers:{}:{}", message_id, paused));
    }
}

/// Host registry knowing only `spawn`, which hands out increasing handles.
#[derive(Debug)]
pub(crate) struct RecordingHostFunctions {
    names: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl Default for RecordingHostFunctions {
    fn default() -> Self {
        Self {
            names: vec!["spawn".to_string()],
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingHostFunctions {
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl HostFunctionRegistry for RecordingHostFunctions {
    fn call(&self, name: &str, args: &[StoryVariant]) -> Result<StoryVariant, StoryError> {
        if name != "spawn" {
            return Err(StoryError::new(
                "HOST_FUNCTION_MISSING",
                format!("Host function \"{}\" is not registered.", name),
            ));
        }
        let mut calls = self.calls.lock().expect("calls lock");
        let rendered = args
            .iter()
            .map(StoryVariant::to_text)
            .collect::<Vec<_>>()
            .join(" ");
        calls.push(format!("{}({})", name, rendered));
        Ok(StoryVariant::Object(ObjectHandle {
            handle: calls.len() as u64,
        }))
    }

    fn names(&self) -> &[String] {
        &self.names
    }
}

/// Owns everything an `ExecContext` borrows.
pub(crate) struct ExecHarness {
    pub(crate) scope: VariableScope,
    pub(crate) director: RecordingDirector,
    pub(crate) host: RecordingHostFunctions,
    pub(crate) signals: InstanceSignals,
    pub(crate) now: i64,
    pub(crate) max_steps: usize,
}

impl ExecHarness {
    pub(crate) fn new() -> Self {
        Self {
            scope: VariableScope::new(),
            director: RecordingDirector::default(),
            host: RecordingHostFunctions::default(),
            signals: InstanceSignals::default(),
            now: 0,
            max_steps: crate::command::DEFAULT_MAX_STEPS_PER_TICK,
        }
    }

    pub(crate) fn ctx(&mut self) -> ExecContext<'_> {
        ExecContext::new(
            &mut self.scope,
            &mut self.director,
            &self.host,
            &mut self.signals,
            self.now,
            self.max_steps,
        )
    }
}
