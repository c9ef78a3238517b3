//! Customer-support agent
//!
//! Each turn runs a small state machine over an [`AgentState`]:
//! - `identity_check`: is the user an internal QA engineer?
//! - `route`: classify the message into one [`Intent`]
//! - `rag_service`: FAQ shortcut, otherwise hybrid retrieval + grounded answer
//! - `test_process`: privilege-gated whitelist request
//! - `handoff_service`: human-agent ticket pre-fill
//!
//! The three service nodes are terminal.

pub mod directory;
pub mod graph;
pub mod router;
pub mod state;
pub mod templates;

pub use directory::{FaqEntry, FaqTable, JsonUserDirectory, UserDirectory, UserRecord};
pub use graph::AgentGraph;
pub use router::{classify, parse_intent, route_decision};
pub use state::{AgentState, Intent, Node, TurnTrace};
