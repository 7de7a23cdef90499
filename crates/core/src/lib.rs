//! Helmsman core types shared by every crate in the workspace.
//!
//! - `config` - layered application configuration (defaults, TOML file, env, overrides)
//! - `errors` - application and interface error taxonomy
//! - `domain` - threads, runs, tool calls, chat records, channel events and capability permissions

pub mod config;
pub mod domain;
pub mod errors;

pub use domain::capability::{CapabilityGroup, Permissions};
pub use domain::channel::ChannelEvent;
pub use domain::chat::ChatRecord;
pub use domain::run::{Run, RunId, RunStatus, ToolCall, ToolOutput};
pub use domain::thread::{ThreadHandle, ThreadId};
pub use errors::{ApplicationError, InterfaceError};
