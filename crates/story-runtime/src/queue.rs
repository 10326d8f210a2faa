use std::collections::VecDeque;

use story_core::StoryVariant;
use tracing::{debug, warn};

use crate::command::{ExecContext, StoryCommand};

/// Ordered commands of one activation. The front command is the active one.
#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: VecDeque<Box<dyn StoryCommand>>,
    active_started: bool,
    deferred: bool,
}

impl CommandQueue {
    pub fn new(commands: Vec<Box<dyn StoryCommand>>) -> Self {
        Self {
            commands: commands.into(),
            active_started: false,
            deferred: false,
        }
    }

    /// Clones every template command into a fresh queue.
    pub fn from_template(template: &[Box<dyn StoryCommand>]) -> Self {
        Self::new(template.iter().map(|command| command.clone_command()).collect())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn active_name(&self) -> Option<&'static str> {
        self.commands.front().map(|command| command.name())
    }

    /// Set when the last tick stopped on a command that does not chain, so
    /// whatever follows this queue must wait for the next tick too.
    pub fn deferred(&self) -> bool {
        self.deferred
    }

    /// Runs commands until one suspends. Returns `true` while work remains.
    pub fn tick(
        &mut self,
        ctx: &mut ExecContext<'_>,
        delta: i64,
        iterator: &StoryVariant,
        args: &[StoryVariant],
    ) -> bool {
        self.deferred = false;
        while let Some(command) = self.commands.front_mut() {
            if !self.active_started {
                if !ctx.try_consume_step() {
                    warn!(
                        command = command.name(),
                        "step budget exhausted, suspending until next tick"
                    );
                    return true;
                }
                command.reset_state();
                self.active_started = true;
            }

            command.evaluate(&ctx.eval(iterator, args));
            if command.exec_command(ctx, delta) {
                return true;
            }

            let chains = command.chains_in_same_tick();
            debug!(command = command.name(), "story command completed");
            self.commands.pop_front();
            self.active_started = false;
            if !chains {
                self.deferred = true;
                return !self.commands.is_empty();
            }
        }
        false
    }
}
