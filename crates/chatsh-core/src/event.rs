//! Chat-side identifier types and the input events delivered by a
//! transport adapter.

/// Identifier of a conversation on the external transport.
pub type ChatId = i64;

/// Identifier of a message within a chat.
pub type MessageId = i64;

/// Handle of an outward message the engine created, usable for later edits.
pub type MessageHandle = i64;

/// Session identifier: the OS-assigned process id of the spawned shell,
/// reused as the external correlation key in button callback data.
pub type SessionId = u32;

/// An input event delivered by a chat transport adapter.
///
/// Adapters convert their native update types into this at the boundary;
/// the engine never sees transport-specific widgets or payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A plain text message from the operator.
    Message {
        chat: ChatId,
        message_id: MessageId,
        text: String,
    },
    /// An inline button press carrying `action&id` callback data.
    Callback {
        chat: ChatId,
        /// The message the pressed button was attached to.
        message_id: MessageId,
        /// Opaque id the transport needs to acknowledge the press.
        callback_id: String,
        data: String,
    },
}
