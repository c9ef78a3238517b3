use serde::{Deserialize, Serialize};
use std::fmt;

/// Routed intent of the latest message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    Unset,
    CustomerService,
    InternalTest,
    Handoff,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Unset => "",
            Intent::CustomerService => "customer_service",
            Intent::InternalTest => "internal_test",
            Intent::Handoff => "handoff",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Steps of the turn graph. `End` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    IdentityCheck,
    Route,
    RagService,
    TestProcess,
    HandoffService,
    End,
}

/// Per-turn record threaded through the graph by value.
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    user_id: String,
    messages: Vec<String>,
    intent: Intent,
    is_internal: bool,
    final_response: String,
}

impl AgentState {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            messages: vec![message.into()],
            intent: Intent::Unset,
            is_internal: false,
            final_response: String::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// The message being answered; empty when the history is empty.
    pub fn last_message(&self) -> &str {
        self.messages.last().map(String::as_str).unwrap_or("")
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn is_internal(&self) -> bool {
        self.is_internal
    }

    pub fn final_response(&self) -> &str {
        &self.final_response
    }

    pub fn push_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub(crate) fn with_identity(mut self, is_internal: bool) -> Self {
        self.is_internal = is_internal;
        self
    }

    /// Intent is written once per turn, by the router.
    pub(crate) fn with_intent(mut self, intent: Intent) -> Self {
        debug_assert_eq!(self.intent, Intent::Unset, "intent already routed this turn");
        self.intent = intent;
        self
    }

    pub(crate) fn respond(mut self, text: impl Into<String>) -> Self {
        self.final_response = text.into();
        self
    }
}

/// Nodes visited during one turn, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TurnTrace {
    visited: Vec<Node>,
}

impl TurnTrace {
    pub(crate) fn record(&mut self, node: Node) {
        debug_assert!(!self.visited.contains(&node), "node {:?} visited twice", node);
        self.visited.push(node);
    }

    pub fn visited(&self) -> &[Node] {
        &self.visited
    }

    pub fn contains(&self, node: Node) -> bool {
        self.visited.contains(&node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_unrouted() {
        let state = AgentState::new("user_003", "你好");
        assert_eq!(state.intent(), Intent::Unset);
        assert!(!state.is_internal());
        assert!(state.final_response().is_empty());
        assert_eq!(state.last_message(), "你好");
    }

    #[test]
    fn last_message_follows_appends() {
        let mut state = AgentState::new("u", "first");
        state.push_message("second");
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.last_message(), "second");
    }

    #[test]
    fn intent_labels() {
        assert_eq!(Intent::InternalTest.to_string(), "internal_test");
        assert_eq!(Intent::Handoff.as_str(), "handoff");
    }

    #[test]
    #[should_panic(expected = "intent already routed")]
    #[cfg(debug_assertions)]
    fn intent_is_set_once() {
        let _ = AgentState::new("u", "m")
            .with_intent(Intent::Handoff)
            .with_intent(Intent::CustomerService);
    }
}
