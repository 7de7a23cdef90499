use serde::{Deserialize, Serialize};

/// An inbound notification from a push-based messaging channel, already
/// resolved against the assistant's identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub event_id: String,
    /// Marker of the channel thread this event replies to, if any.
    pub thread_reference: Option<String>,
    pub sender_id: String,
    pub text: String,
    pub is_from_self: bool,
    pub is_bot: bool,
    pub addresses_assistant: bool,
    pub attachment_title: Option<String>,
}
