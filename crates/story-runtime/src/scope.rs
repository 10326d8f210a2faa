use std::collections::BTreeMap;

use story_core::StoryVariant;

/// Per-instance variables and the message trigger ledger.
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    variables: BTreeMap<String, StoryVariant>,
    message_triggers: BTreeMap<String, i64>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_variable(&self, name: &str) -> Option<&StoryVariant> {
        self.variables.get(name)
    }

    /// Unknown names read as `Absent`.
    pub fn variable_or_absent(&self, name: &str) -> StoryVariant {
        self.variables.get(name).cloned().unwrap_or_default()
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: StoryVariant) {
        self.variables.insert(name.into(), value);
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<StoryVariant> {
        self.variables.remove(name)
    }

    pub fn variables(&self) -> &BTreeMap<String, StoryVariant> {
        &self.variables
    }

    pub fn record_message_trigger(&mut self, message_id: impl Into<String>, now_millis: i64) {
        self.message_triggers.insert(message_id.into(), now_millis);
    }

    pub fn message_trigger_time(&self, message_id: &str) -> Option<i64> {
        self.message_triggers.get(message_id).copied()
    }
}
