//! Built-in story commands.

mod flow;
mod host_call;
mod message;
mod story;

pub use flow::{
    AssignCommand, ForeachCommand, LocalMessageCommand, LogCommand, LoopCommand,
    TerminateCommand, WaitCommand,
};
pub use host_call::HostCallCommand;
pub use message::{
    FireMessageCommand, PauseMessageHandlerCommand, WaitAllMessageCommand,
    WaitAllMessageHandlerCommand,
};
pub use story::{PauseStoryCommand, StartStoryCommand, StopStoryCommand, WaitStoryCommand};
