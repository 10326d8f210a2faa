use story_core::{StoryError, StoryVariant};

/// Story-level collaborator the built-in commands talk to.
///
/// Requests made through a director take effect at the start of the next
/// tick; counts are answered from the state observed at the start of the
/// current tick plus requests already made during it.
pub trait StoryDirector {
    fn start_story(&mut self, story_id: &str);
    fn stop_story(&mut self, story_id: &str);
    fn pause_story(&mut self, story_id: &str, paused: bool);
    fn count_story(&self, story_id: &str) -> usize;
    fn send_message(&mut self, message_id: &str, args: Vec<StoryVariant>, concurrent: bool);
    fn count_message_handlers(&self, message_id: &str) -> usize;
    fn pause_message_handlers(&mut self, message_id: &str, paused: bool);
}

/// Director for queues run outside a host. Every request is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDirector;

impl StoryDirector for NoopDirector {
    fn start_story(&mut self, _story_id: &str) {}

    fn stop_story(&mut self, _story_id: &str) {}

    fn pause_story(&mut self, _story_id: &str, _paused: bool) {}

    fn count_story(&self, _story_id: &str) -> usize {
        0
    }

    fn send_message(&mut self, _message_id: &str, _args: Vec<StoryVariant>, _concurrent: bool) {}

    fn count_message_handlers(&self, _message_id: &str) -> usize {
        0
    }

    fn pause_message_handlers(&mut self, _message_id: &str, _paused: bool) {}
}

pub trait HostFunctionRegistry: Send + Sync {
    fn call(&self, name: &str, args: &[StoryVariant]) -> Result<StoryVariant, StoryError>;
    fn names(&self) -> &[String];
}

#[derive(Debug, Default)]
pub struct EmptyHostFunctionRegistry {
    names: Vec<String>,
}

impl HostFunctionRegistry for EmptyHostFunctionRegistry {
    fn call(&self, name: &str, _args: &[StoryVariant]) -> Result<StoryVariant, StoryError> {
        Err(StoryError::new(
            "HOST_FUNCTION_MISSING",
            format!("Host function \"{}\" is not registered.", name),
        ))
    }

    fn names(&self) -> &[String] {
        &self.names
    }
}
