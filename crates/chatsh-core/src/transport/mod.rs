//! Abstract chat transport trait.
//!
//! The engine pushes session snapshots outward through this interface; a
//! concrete adapter (a chat network client) converts the calls into its
//! native message and widget types at the boundary. All methods are
//! object-safe so the engine can hold an `Arc<dyn ChatTransport>`.

pub mod mock;

use crate::buttons::ButtonDescriptor;
use crate::error::ChatshResult;
use crate::event::{ChatId, MessageHandle, MessageId};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

/// Outward chat operations consumed by the session engine.
pub trait ChatTransport: Send + Sync {
    /// Send a new message. `text` may be absent for button-only or
    /// file-only messages. Returns a handle usable for later edits.
    fn send_message<'a>(
        &'a self,
        chat: ChatId,
        text: Option<&'a str>,
        buttons: Option<&'a [ButtonDescriptor]>,
        file: Option<&'a Path>,
        reply_to: Option<MessageId>,
    ) -> Pin<Box<dyn Future<Output = ChatshResult<MessageHandle>> + Send + 'a>>;

    /// Edit a previously sent message in place. Absent `text` leaves the
    /// body untouched and applies only the button/file update.
    fn edit_message<'a>(
        &'a self,
        chat: ChatId,
        handle: MessageHandle,
        text: Option<&'a str>,
        buttons: Option<&'a [ButtonDescriptor]>,
        file: Option<&'a Path>,
    ) -> Pin<Box<dyn Future<Output = ChatshResult<()>> + Send + 'a>>;

    fn delete_message<'a>(
        &'a self,
        chat: ChatId,
        handle: MessageHandle,
    ) -> Pin<Box<dyn Future<Output = ChatshResult<()>> + Send + 'a>>;

    /// Acknowledge an inline button press with a short notice; `alert`
    /// requests a prominent display instead of a transient toast.
    fn answer_callback<'a>(
        &'a self,
        callback_id: &'a str,
        text: &'a str,
        alert: bool,
    ) -> Pin<Box<dyn Future<Output = ChatshResult<()>> + Send + 'a>>;
}
