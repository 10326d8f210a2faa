use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use story_core::StoryVariant;
use tracing::debug;

use crate::command::{ExecContext, InstanceSignals};
use crate::compiler::StoryTemplate;
use crate::director::{HostFunctionRegistry, StoryDirector};
use crate::queue::CommandQueue;
use crate::scope::VariableScope;

/// Host-side collaborators for one tick of one instance.
pub struct TickEnv<'a> {
    pub director: &'a mut dyn StoryDirector,
    pub host_functions: &'a dyn HostFunctionRegistry,
    pub paused_handlers: &'a BTreeSet<String>,
    pub now_millis: i64,
    pub max_steps: usize,
}

#[derive(Debug)]
struct HandlerRunner {
    message_id: String,
    queue: CommandQueue,
    args: Vec<StoryVariant>,
}

#[derive(Debug)]
struct PendingMessage {
    message_id: String,
    args: Vec<StoryVariant>,
    concurrent: bool,
}

/// A running story: its own variables, message ledger and handler runs.
#[derive(Debug)]
pub struct StoryInstance {
    instance_id: u64,
    template: Rc<StoryTemplate>,
    scope: VariableScope,
    signals: InstanceSignals,
    runners: Vec<HandlerRunner>,
    queued: BTreeMap<String, VecDeque<Vec<StoryVariant>>>,
    pending: VecDeque<PendingMessage>,
    paused: bool,
    terminated: bool,
}

impl StoryInstance {
    pub fn new(instance_id: u64, template: Rc<StoryTemplate>) -> Self {
        Self {
            instance_id,
            template,
            scope: VariableScope::new(),
            signals: InstanceSignals::default(),
            runners: Vec::new(),
            queued: BTreeMap::new(),
            pending: VecDeque::new(),
            paused: false,
            terminated: false,
        }
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    pub fn story_id(&self) -> &str {
        &self.template.story_id
    }

    pub fn scope(&self) -> &VariableScope {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut VariableScope {
        &mut self.scope
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    pub fn has_handler(&self, message_id: &str) -> bool {
        self.template.has_handler(message_id)
    }

    pub fn handler_ids(&self) -> impl Iterator<Item = &str> {
        self.template.handler_ids()
    }

    /// Running plus queued activations of a handler.
    pub fn handler_count(&self, message_id: &str) -> usize {
        let running = self
            .runners
            .iter()
            .filter(|runner| runner.message_id == message_id)
            .count();
        let queued = self.queued.get(message_id).map_or(0, VecDeque::len);
        running + queued
    }

    pub fn is_idle(&self) -> bool {
        self.runners.is_empty()
            && self.pending.is_empty()
            && self.queued.values().all(VecDeque::is_empty)
    }

    /// Terminated instances end at once; others end when idle unless the story
    /// is persistent.
    pub fn is_finished(&self) -> bool {
        self.terminated || (!self.template.persistent && self.is_idle())
    }

    /// Queues a message for delivery at the start of this instance's next tick.
    pub fn post_message(&mut self, message_id: impl Into<String>, args: Vec<StoryVariant>) {
        self.pending.push_back(PendingMessage {
            message_id: message_id.into(),
            args,
            concurrent: false,
        });
    }

    /// Records the trigger and activates the handler now. A non-concurrent
    /// message waits behind a running activation of the same handler.
    pub fn deliver_message(
        &mut self,
        message_id: &str,
        args: Vec<StoryVariant>,
        concurrent: bool,
        now_millis: i64,
    ) {
        if self.terminated {
            return;
        }
        self.scope.record_message_trigger(message_id, now_millis);
        if !self.template.has_handler(message_id) {
            return;
        }
        let busy = self
            .runners
            .iter()
            .any(|runner| runner.message_id == message_id);
        if busy && !concurrent {
            self.queued
                .entry(message_id.to_string())
                .or_default()
                .push_back(args);
            return;
        }
        self.start_runner(message_id, args);
    }

    fn start_runner(&mut self, message_id: &str, args: Vec<StoryVariant>) {
        let Some(queue) = self.template.instantiate_handler(message_id) else {
            return;
        };
        debug!(
            story = %self.template.story_id,
            instance = self.instance_id,
            handler = %message_id,
            "handler activated"
        );
        self.runners.push(HandlerRunner {
            message_id: message_id.to_string(),
            queue,
            args,
        });
    }

    pub fn tick(&mut self, delta: i64, env: &mut TickEnv<'_>) {
        if self.terminated || self.paused {
            return;
        }
        while let Some(message) = self.pending.pop_front() {
            self.deliver_message(
                &message.message_id,
                message.args,
                message.concurrent,
                env.now_millis,
            );
        }

        let mut steps = env.max_steps;
        let mut index = 0;
        while index < self.runners.len() {
            if env.paused_handlers.contains(&self.runners[index].message_id) {
                index += 1;
                continue;
            }
            let runner = &mut self.runners[index];
            let mut ctx = ExecContext::new(
                &mut self.scope,
                &mut *env.director,
                env.host_functions,
                &mut self.signals,
                env.now_millis,
                steps,
            );
            let pending = runner
                .queue
                .tick(&mut ctx, delta, &StoryVariant::Absent, &runner.args);
            steps = ctx.steps_remaining();

            if pending {
                index += 1;
            } else {
                let finished = self.runners.remove(index);
                debug!(
                    story = %self.template.story_id,
                    instance = self.instance_id,
                    handler = %finished.message_id,
                    "handler finished"
                );
                let next = self
                    .queued
                    .get_mut(&finished.message_id)
                    .and_then(VecDeque::pop_front);
                if let Some(args) = next {
                    self.start_runner(&finished.message_id, args);
                }
            }

            if self.signals.terminate_requested() {
                debug!(
                    story = %self.template.story_id,
                    instance = self.instance_id,
                    "instance terminated"
                );
                self.terminated = true;
                self.runners.clear();
                self.queued.clear();
                return;
            }
        }

        for (message_id, args) in self.signals.take_local_messages() {
            self.post_message(message_id, args);
        }
    }
}

#[cfg(test)]
mod instance_tests {
    use super::*;
    use crate::compiler::StoryCompiler;
    use crate::director::EmptyHostFunctionRegistry;
    use crate::test_support::{call, document, ident, num, text, RecordingDirector};

    struct Driver {
        director: RecordingDirector,
        host: EmptyHostFunctionRegistry,
        paused: BTreeSet<String>,
        now: i64,
    }

    impl Driver {
        fn new() -> Self {
            Self {
                director: RecordingDirector::default(),
                host: EmptyHostFunctionRegistry::default(),
                paused: BTreeSet::new(),
                now: 0,
            }
        }

        fn tick(&mut self, instance: &mut StoryInstance, delta: i64) {
            self.now += delta;
            let mut env = TickEnv {
                director: &mut self.director,
                host_functions: &self.host,
                paused_handlers: &self.paused,
                now_millis: self.now,
                max_steps: crate::command::DEFAULT_MAX_STEPS_PER_TICK,
            };
            instance.tick(delta, &mut env);
        }
    }

    fn instance(
        persistent: bool,
        handlers: Vec<(&str, Vec<story_core::SyntaxNode>)>,
    ) -> StoryInstance {
        let compiled = StoryCompiler::new().compile(&document("story", persistent, handlers));
        assert!(compiled.diagnostics.is_empty(), "{:?}", compiled.diagnostics);
        StoryInstance::new(1, Rc::new(compiled.template))
    }

    #[test]
    fn busy_handler_queues_plain_messages() {
        let mut story = instance(
            false,
            vec![(
                "hit",
                vec![
                    call("wait", vec![num("10")]),
                    call("assign", vec![ident("@last"), ident("$0")]),
                ],
            )],
        );
        let mut driver = Driver::new();
        story.deliver_message("hit", vec![StoryVariant::Int(1)], false, 0);
        story.deliver_message("hit", vec![StoryVariant::Int(2)], false, 0);
        assert_eq!(story.handler_count("hit"), 2);

        driver.tick(&mut story, 10);
        driver.tick(&mut story, 10);
        assert_eq!(story.scope().get_variable("@last"), Some(&StoryVariant::Int(1)));
        assert_eq!(story.handler_count("hit"), 1);

        driver.tick(&mut story, 10);
        assert_eq!(story.scope().get_variable("@last"), Some(&StoryVariant::Int(2)));
        assert!(story.is_idle());
        assert!(story.is_finished());
    }

    #[test]
    fn concurrent_messages_run_in_parallel() {
        let mut story = instance(
            true,
            vec![(
                "hit",
                vec![
                    call("wait", vec![num("10")]),
                    call("assign", vec![ident("@last"), ident("$0")]),
                ],
            )],
        );
        story.deliver_message("hit", vec![StoryVariant::Int(1)], true, 0);
        story.deliver_message("hit", vec![StoryVariant::Int(2)], true, 0);
        let mut driver = Driver::new();
        driver.tick(&mut story, 10);
        driver.tick(&mut story, 10);
        assert_eq!(story.handler_count("hit"), 0);
        assert_eq!(story.scope().get_variable("@last"), Some(&StoryVariant::Int(2)));
        assert!(story.is_idle());
        assert!(!story.is_finished(), "persistent stories stay alive");
    }

    #[test]
    fn delivery_records_trigger_even_without_handler() {
        let mut story = instance(true, vec![("start", vec![])]);
        story.deliver_message("other", Vec::new(), false, 42);
        assert_eq!(story.scope().message_trigger_time("other"), Some(42));
        assert_eq!(story.handler_count("other"), 0);
    }

    #[test]
    fn local_messages_arrive_on_the_next_tick() {
        let mut story = instance(
            false,
            vec![
                ("start", vec![call("localmessage", vec![text("ping"), num("5")])]),
                ("ping", vec![call("assign", vec![ident("@got"), ident("$0")])]),
            ],
        );
        let mut driver = Driver::new();
        story.deliver_message("start", Vec::new(), false, 0);
        driver.tick(&mut story, 16);
        assert!(story.scope().get_variable("@got").is_none());
        assert!(!story.is_finished());

        driver.tick(&mut story, 16);
        assert_eq!(story.scope().get_variable("@got"), Some(&StoryVariant::Int(5)));
        assert_eq!(story.scope().message_trigger_time("ping"), Some(32));
        assert!(story.is_finished());
    }

    #[test]
    fn terminate_stops_every_runner() {
        let mut story = instance(
            true,
            vec![
                ("start", vec![call("terminate", vec![])]),
                ("loop", vec![call("wait", vec![num("1000")])]),
            ],
        );
        story.deliver_message("loop", Vec::new(), false, 0);
        story.deliver_message("start", Vec::new(), false, 0);
        let mut driver = Driver::new();
        driver.tick(&mut story, 16);
        assert!(story.is_terminated());
        assert!(story.is_finished());
        assert_eq!(story.handler_count("loop"), 0);
    }

    #[test]
    fn paused_instances_and_handlers_do_not_advance() {
        let mut story = instance(
            true,
            vec![("start", vec![call("assign", vec![ident("@ran"), num("1")])])],
        );
        story.deliver_message("start", Vec::new(), false, 0);
        let mut driver = Driver::new();

        story.set_paused(true);
        driver.tick(&mut story, 16);
        assert!(story.scope().get_variable("@ran").is_none());
        story.set_paused(false);

        driver.paused.insert("start".to_string());
        driver.tick(&mut story, 16);
        assert!(story.scope().get_variable("@ran").is_none());

        driver.paused.clear();
        driver.tick(&mut story, 16);
        assert_eq!(story.scope().get_variable("@ran"), Some(&StoryVariant::Int(1)));
    }
}
