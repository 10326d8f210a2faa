use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "story-cli")]
#[command(about = "Runs story command scripts on a fixed tick schedule")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[arg(long = "stories-dir")]
    pub(crate) stories_dir: String,
    /// Story to start; repeat for several. Defaults to `main`.
    #[arg(long = "story")]
    pub(crate) stories: Vec<String>,
    #[arg(long = "ticks", default_value_t = 100)]
    pub(crate) ticks: u64,
    /// Milliseconds per tick.
    #[arg(long = "delta", default_value_t = 16)]
    pub(crate) delta: i64,
    /// `"<message> [arg ...]"` broadcast before the first tick.
    #[arg(long = "message")]
    pub(crate) messages: Vec<String>,
}
