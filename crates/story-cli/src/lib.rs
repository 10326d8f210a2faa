use std::ffi::OsString;

use clap::Parser;
use story_core::StoryError;
use tracing_subscriber::EnvFilter;

mod cli_args;
mod error_map;
mod runner;
mod source_loader;

pub(crate) use cli_args::{Cli, Mode, RunArgs};
pub(crate) use error_map::emit_error;

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    init_tracing();
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

/// `RUST_LOG` controls verbosity; logs go to stderr so stdout stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<i32, StoryError> {
    match cli.command {
        Mode::Run(args) => runner::run_stories(args),
    }
}
