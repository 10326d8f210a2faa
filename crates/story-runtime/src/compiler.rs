use std::collections::BTreeMap;
use std::rc::Rc;

use story_core::{StoryDocument, StoryError, SyntaxNode};
use tracing::debug;

use crate::command::{LoadContext, StoryCommand};
use crate::commands::{
    AssignCommand, FireMessageCommand, ForeachCommand, HostCallCommand, LocalMessageCommand,
    LogCommand, LoopCommand, PauseMessageHandlerCommand, PauseStoryCommand, StartStoryCommand,
    StopStoryCommand, TerminateCommand, WaitAllMessageCommand, WaitAllMessageHandlerCommand,
    WaitCommand, WaitStoryCommand,
};
use crate::expr::ExpressionEngine;
use crate::functions::ValueFunctionRegistry;
use crate::queue::CommandQueue;

pub type CommandFactory = Box<dyn Fn() -> Box<dyn StoryCommand>>;

/// Maps command names to factories producing unloaded commands.
pub struct StoryCommandRegistry {
    factories: BTreeMap<String, CommandFactory>,
}

impl std::fmt::Debug for StoryCommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryCommandRegistry")
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for StoryCommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl StoryCommandRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("assign", || Box::new(AssignCommand::default()));
        registry.register("wait", || Box::new(WaitCommand::default()));
        registry.register("sleep", || Box::new(WaitCommand::default()));
        registry.register("loop", || Box::new(LoopCommand::default()));
        registry.register("foreach", || Box::new(ForeachCommand::default()));
        registry.register("localmessage", || Box::new(LocalMessageCommand::default()));
        registry.register("terminate", || Box::new(TerminateCommand));
        registry.register("log", || Box::new(LogCommand::default()));
        registry.register("startstory", || Box::new(StartStoryCommand::default()));
        registry.register("stopstory", || Box::new(StopStoryCommand::default()));
        registry.register("waitstory", || Box::new(WaitStoryCommand::default()));
        registry.register("pausestory", || Box::new(PauseStoryCommand::new(true)));
        registry.register("resumestory", || Box::new(PauseStoryCommand::new(false)));
        registry.register("firemessage", || Box::new(FireMessageCommand::new(false)));
        registry.register("fireconcurrentmessage", || {
            Box::new(FireMessageCommand::new(true))
        });
        registry.register("waitallmessage", || Box::new(WaitAllMessageCommand::default()));
        registry.register("waitallmessagehandler", || {
            Box::new(WaitAllMessageHandlerCommand::default())
        });
        registry.register("pauseallmessagehandler", || {
            Box::new(PauseMessageHandlerCommand::new(true))
        });
        registry.register("resumeallmessagehandler", || {
            Box::new(PauseMessageHandlerCommand::new(false))
        });
        registry.register("hostcall", || Box::new(HostCallCommand::default()));
        registry
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn StoryCommand> + 'static,
    ) {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn create(&self, name: &str) -> Option<Box<dyn StoryCommand>> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

/// Loaded command trees of one story, one per message handler. Never run
/// directly; activations clone from it.
#[derive(Debug)]
pub struct StoryTemplate {
    pub story_id: String,
    pub persistent: bool,
    handlers: BTreeMap<String, Vec<Box<dyn StoryCommand>>>,
}

impl StoryTemplate {
    pub fn new(story_id: impl Into<String>, persistent: bool) -> Self {
        Self {
            story_id: story_id.into(),
            persistent,
            handlers: BTreeMap::new(),
        }
    }

    pub fn insert_handler(
        &mut self,
        message_id: impl Into<String>,
        commands: Vec<Box<dyn StoryCommand>>,
    ) {
        self.handlers.insert(message_id.into(), commands);
    }

    pub fn handler(&self, message_id: &str) -> Option<&[Box<dyn StoryCommand>]> {
        self.handlers.get(message_id).map(Vec::as_slice)
    }

    pub fn has_handler(&self, message_id: &str) -> bool {
        self.handlers.contains_key(message_id)
    }

    pub fn handler_ids(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn instantiate_handler(&self, message_id: &str) -> Option<CommandQueue> {
        self.handler(message_id).map(CommandQueue::from_template)
    }
}

#[derive(Debug)]
pub struct CompiledStory {
    pub template: StoryTemplate,
    pub diagnostics: Vec<StoryError>,
}

#[derive(Debug, Default)]
pub struct StoryCompiler {
    commands: StoryCommandRegistry,
    functions: ValueFunctionRegistry,
    expressions: ExpressionEngine,
}

impl StoryCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registries(
        commands: StoryCommandRegistry,
        functions: ValueFunctionRegistry,
    ) -> Self {
        Self {
            commands,
            functions,
            expressions: ExpressionEngine::new(),
        }
    }

    pub fn commands_mut(&mut self) -> &mut StoryCommandRegistry {
        &mut self.commands
    }

    pub fn functions_mut(&mut self) -> &mut ValueFunctionRegistry {
        &mut self.functions
    }

    pub fn load_context(&self) -> LoadContext<'_> {
        LoadContext::new(&self.commands, &self.functions, &self.expressions)
    }

    /// Compiles a single command node, returning it with its diagnostics.
    pub fn compile_command(
        &self,
        node: &SyntaxNode,
    ) -> (Option<Box<dyn StoryCommand>>, Vec<StoryError>) {
        let mut ctx = self.load_context();
        let command = ctx.compile_command(node);
        (command, ctx.into_diagnostics())
    }

    pub fn compile(&self, document: &StoryDocument) -> CompiledStory {
        let mut ctx = self.load_context();
        let mut template = StoryTemplate::new(document.story_id.clone(), document.persistent);

        for handler in &document.handlers {
            if template.has_handler(&handler.message_id) {
                ctx.report(StoryError::with_span(
                    "STORY_HANDLER_DUPLICATE",
                    format!(
                        "Story \"{}\" declares handler \"{}\" twice; the later one is ignored.",
                        document.story_id, handler.message_id
                    ),
                    handler.location.clone(),
                ));
                continue;
            }
            let commands = ctx.compile_block(&handler.body);
            debug!(
                story = %document.story_id,
                handler = %handler.message_id,
                commands = commands.len(),
                "compiled story handler"
            );
            template.insert_handler(handler.message_id.clone(), commands);
        }

        CompiledStory {
            template,
            diagnostics: ctx.into_diagnostics(),
        }
    }
}

/// Compiled templates by story id.
#[derive(Debug, Default, Clone)]
pub struct StoryLibrary {
    templates: BTreeMap<String, Rc<StoryTemplate>>,
}

impl StoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, template: StoryTemplate) -> Result<(), StoryError> {
        if self.templates.contains_key(&template.story_id) {
            return Err(StoryError::new(
                "STORY_DUPLICATE",
                format!("Story \"{}\" is already in the library.", template.story_id),
            ));
        }
        self.templates.insert(template.story_id.clone(), Rc::new(template));
        Ok(())
    }

    pub fn get(&self, story_id: &str) -> Option<Rc<StoryTemplate>> {
        self.templates.get(story_id).cloned()
    }

    pub fn contains(&self, story_id: &str) -> bool {
        self.templates.contains_key(story_id)
    }

    pub fn story_ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
