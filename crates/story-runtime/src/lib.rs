mod clock;
mod command;
pub mod commands;
mod compiler;
mod director;
mod expr;
mod functions;
mod host;
mod instance;
mod queue;
mod scope;
mod value;
mod wait;

#[cfg(test)]
mod test_support;

pub use clock::{ManualClock, StoryClock, SystemClock};
pub use command::{
    load_command, ExecContext, InstanceSignals, LoadContext, StoryCommand,
    DEFAULT_MAX_STEPS_PER_TICK,
};
pub use compiler::{
    CommandFactory, CompiledStory, StoryCommandRegistry, StoryCompiler, StoryLibrary,
    StoryTemplate,
};
pub use director::{EmptyHostFunctionRegistry, HostFunctionRegistry, NoopDirector, StoryDirector};
pub use expr::{ExpressionEngine, ScriptExpression};
pub use functions::{ValueFunction, ValueFunctionRegistry};
pub use host::{StoryHost, StoryHostOptions, START_MESSAGE};
pub use instance::{StoryInstance, TickEnv};
pub use queue::CommandQueue;
pub use scope::VariableScope;
pub use value::{EvalContext, StoryValue, ValueKind};
pub use wait::{AssignClause, CountPolarity, TimeoutClause, WaitBaseline, WaitPoll, WaitWithTimeout};
