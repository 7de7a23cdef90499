//! Conversation orchestration for Helmsman.
//!
//! One operator utterance becomes one answer by driving an assistants-style
//! conversation engine through its run lifecycle and executing the
//! infrastructure capabilities it asks for along the way.
//!
//! # Architecture
//!
//! 1. **Capabilities** (`capabilities`) - named operations against the cluster,
//!    the network and the clock, gated by permission groups.
//! 2. **Dispatch** (`dispatcher`) - executes one tool call by name; failures
//!    are folded into text so the engine can reason about them.
//! 3. **Engine** (`engine`) - the thread/run protocol, selected once at startup.
//! 4. **Run loop** (`run_loop`) - polls a run until it completes, answering
//!    every `requires_action` round with a full output batch.
//! 5. **Session** (`session`) - thread lifecycle plus optional persistence.

pub mod capabilities;
pub mod cluster;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod prompt;
pub mod run_loop;
pub mod session;

#[cfg(test)]
mod testing;

pub use capabilities::{ActiveCapabilities, Capability, CapabilityRegistry, ToolDefinition};
pub use context::ExecutionContext;
pub use dispatcher::Dispatcher;
pub use engine::{ConversationEngine, EngineError};
pub use run_loop::{RunDriver, RunError, RunPolicy};
pub use session::{ConversationServices, ConversationSession, ServicesError, SessionError};
