//! Slack channel integration for Helmsman.
//!
//! - **Payloads** (`payload`) - Events API envelope and message shapes
//! - **Resolver** (`resolver`) - raw delivery to [`ChannelEvent`], with bot
//!   and mention identities looked up through [`SlackDirectory`]
//! - **Correlator** (`correlator`) - ignore / fresh mention / continuation
//! - **Client** (`client`) - Slack Web API calls used for replies and lookups
//! - **Format** (`format`) - mrkdwn shaping and canned channel messages
//!
//! ```text
//! POST /event/slack → EventResolver → EventCorrelator → ConversationSession
//!                                           ↓
//!                             SlackApi::post_message ← answer
//! ```
//!
//! [`ChannelEvent`]: helmsman_core::domain::channel::ChannelEvent

pub mod client;
pub mod correlator;
pub mod format;
pub mod payload;
pub mod resolver;

pub use client::{HttpSlackClient, SlackApi, SlackApiError, SlackDirectory};
pub use correlator::{Correlation, CorrelationError, EventCorrelator, IgnoreReason};
pub use payload::EventEnvelope;
pub use resolver::EventResolver;
