use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::Arc;

use story_core::{StoryError, StoryVariant};
use tracing::{debug, warn};

use crate::clock::{StoryClock, SystemClock};
use crate::command::DEFAULT_MAX_STEPS_PER_TICK;
use crate::compiler::StoryLibrary;
use crate::director::{EmptyHostFunctionRegistry, HostFunctionRegistry, StoryDirector};
use crate::instance::{StoryInstance, TickEnv};

pub const START_MESSAGE: &str = "start";

pub struct StoryHostOptions {
    pub library: StoryLibrary,
    pub host_functions: Option<Arc<dyn HostFunctionRegistry>>,
    pub clock: Option<Rc<dyn StoryClock>>,
    pub max_steps_per_tick: Option<usize>,
}

#[derive(Debug)]
enum BoardRequest {
    Start(String),
    Stop(String),
    PauseStory(String, bool),
    PauseHandlers(String, bool),
    Message {
        message_id: String,
        args: Vec<StoryVariant>,
        concurrent: bool,
    },
}

/// Director handed to commands during a tick. Counts come from the snapshot
/// taken at the start of the tick, adjusted by requests made since.
#[derive(Debug, Default)]
struct StoryBoard {
    story_counts: BTreeMap<String, usize>,
    handler_counts: BTreeMap<String, usize>,
    handler_owners: BTreeMap<String, usize>,
    requests: Vec<BoardRequest>,
}

impl StoryBoard {
    fn refresh(&mut self, instances: &[StoryInstance]) {
        self.story_counts.clear();
        self.handler_counts.clear();
        self.handler_owners.clear();
        for instance in instances.iter().filter(|instance| !instance.is_terminated()) {
            *self
                .story_counts
                .entry(instance.story_id().to_string())
                .or_default() += 1;
            for message_id in instance.handler_ids() {
                *self
                    .handler_owners
                    .entry(message_id.to_string())
                    .or_default() += 1;
                *self
                    .handler_counts
                    .entry(message_id.to_string())
                    .or_default() += instance.handler_count(message_id);
            }
        }
    }
}

impl StoryDirector for StoryBoard {
    fn start_story(&mut self, story_id: &str) {
        *self.story_counts.entry(story_id.to_string()).or_default() += 1;
        self.requests.push(BoardRequest::Start(story_id.to_string()));
    }

    fn stop_story(&mut self, story_id: &str) {
        self.story_counts.insert(story_id.to_string(), 0);
        self.requests.push(BoardRequest::Stop(story_id.to_string()));
    }

    fn pause_story(&mut self, story_id: &str, paused: bool) {
        let request = BoardRequest::PauseStory(story_id.to_string(), paused);
        self.requests.push(request);
    }

    fn count_story(&self, story_id: &str) -> usize {
        self.story_counts.get(story_id).copied().unwrap_or(0)
    }

    fn send_message(&mut self, message_id: &str, args: Vec<StoryVariant>, concurrent: bool) {
        let owners = self.handler_owners.get(message_id).copied().unwrap_or(0);
        *self
            .handler_counts
            .entry(message_id.to_string())
            .or_default() += owners;
        self.requests.push(BoardRequest::Message {
            message_id: message_id.to_string(),
            args,
            concurrent,
        });
    }

    fn count_message_handlers(&self, message_id: &str) -> usize {
        self.handler_counts.get(message_id).copied().unwrap_or(0)
    }

    fn pause_message_handlers(&mut self, message_id: &str, paused: bool) {
        let request = BoardRequest::PauseHandlers(message_id.to_string(), paused);
        self.requests.push(request);
    }
}

/// Owns the story library and every running instance, and drives them once
/// per tick.
pub struct StoryHost {
    library: StoryLibrary,
    host_functions: Arc<dyn HostFunctionRegistry>,
    clock: Rc<dyn StoryClock>,
    max_steps_per_tick: usize,
    board: StoryBoard,
    instances: Vec<StoryInstance>,
    paused_handlers: BTreeSet<String>,
    next_instance_id: u64,
    tick_count: u64,
}

impl StoryHost {
    pub fn new(options: StoryHostOptions) -> Self {
        Self {
            library: options.library,
            host_functions: options
                .host_functions
                .unwrap_or_else(|| Arc::new(EmptyHostFunctionRegistry::default())),
            clock: options.clock.unwrap_or_else(|| Rc::new(SystemClock)),
            max_steps_per_tick: options
                .max_steps_per_tick
                .unwrap_or(DEFAULT_MAX_STEPS_PER_TICK),
            board: StoryBoard::default(),
            instances: Vec::new(),
            paused_handlers: BTreeSet::new(),
            next_instance_id: 1,
            tick_count: 0,
        }
    }

    pub fn library(&self) -> &StoryLibrary {
        &self.library
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Starts a story now and delivers `start` to it.
    pub fn start_story(&mut self, story_id: &str) -> Result<u64, StoryError> {
        let template = self.library.get(story_id).ok_or_else(|| {
            StoryError::new(
                "HOST_STORY_NOT_FOUND",
                format!("Story \"{}\" is not in the library.", story_id),
            )
        })?;
        let instance_id = self.next_instance_id;
        self.next_instance_id += 1;
        let mut instance = StoryInstance::new(instance_id, template);
        instance.deliver_message(START_MESSAGE, Vec::new(), false, self.clock.now_millis());
        debug!(story = %story_id, instance = instance_id, "story started");
        self.instances.push(instance);
        Ok(instance_id)
    }

    pub fn stop_story(&mut self, story_id: &str) {
        for instance in self
            .instances
            .iter_mut()
            .filter(|instance| instance.story_id() == story_id)
        {
            instance.terminate();
        }
    }

    /// Broadcast to every instance at the start of the next tick.
    pub fn send_message(&mut self, message_id: &str, args: Vec<StoryVariant>) {
        self.board.send_message(message_id, args, false);
    }

    pub fn send_concurrent_message(&mut self, message_id: &str, args: Vec<StoryVariant>) {
        self.board.send_message(message_id, args, true);
    }

    pub fn count_story(&self, story_id: &str) -> usize {
        self.instances
            .iter()
            .filter(|instance| !instance.is_terminated() && instance.story_id() == story_id)
            .count()
    }

    pub fn count_message_handlers(&self, message_id: &str) -> usize {
        self.instances
            .iter()
            .filter(|instance| !instance.is_terminated())
            .map(|instance| instance.handler_count(message_id))
            .sum()
    }

    pub fn instances(&self) -> &[StoryInstance] {
        &self.instances
    }

    /// Variables of the first live instance of a story.
    pub fn variables(&self, story_id: &str) -> Option<&BTreeMap<String, StoryVariant>> {
        self.instances
            .iter()
            .find(|instance| instance.story_id() == story_id)
            .map(|instance| instance.scope().variables())
    }

    pub fn is_idle(&self) -> bool {
        self.instances.is_empty() && self.board.requests.is_empty()
    }

    pub fn tick(&mut self, delta: i64) {
        self.tick_count += 1;
        let now_millis = self.clock.now_millis();
        self.apply_requests(now_millis);
        self.board.refresh(&self.instances);

        for instance in &mut self.instances {
            let mut env = TickEnv {
                director: &mut self.board,
                host_functions: self.host_functions.as_ref(),
                paused_handlers: &self.paused_handlers,
                now_millis,
                max_steps: self.max_steps_per_tick,
            };
            instance.tick(delta, &mut env);
        }

        self.instances.retain(|instance| {
            let finished = instance.is_finished();
            if finished {
                debug!(
                    story = %instance.story_id(),
                    instance = instance.instance_id(),
                    "story ended"
                );
            }
            !finished
        });
    }

    fn apply_requests(&mut self, now_millis: i64) {
        let requests = std::mem::take(&mut self.board.requests);
        for request in requests {
            match request {
                BoardRequest::Start(story_id) => {
                    if let Err(error) = self.start_story(&story_id) {
                        warn!(code = %error.code, message = %error.message, "startstory skipped");
                    }
                }
                BoardRequest::Stop(story_id) => self.stop_story(&story_id),
                BoardRequest::PauseStory(story_id, paused) => {
                    for instance in self
                        .instances
                        .iter_mut()
                        .filter(|instance| instance.story_id() == story_id)
                    {
                        instance.set_paused(paused);
                    }
                }
                BoardRequest::PauseHandlers(message_id, paused) => {
                    if paused {
                        self.paused_handlers.insert(message_id);
                    } else {
                        self.paused_handlers.remove(&message_id);
                    }
                }
                BoardRequest::Message {
                    message_id,
                    args,
                    concurrent,
                } => {
                    for instance in &mut self.instances {
                        instance.deliver_message(&message_id, args.clone(), concurrent, now_millis);
                    }
                }
            }
        }
    }
}
