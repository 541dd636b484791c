//! chatsh-core: shared types for the chatsh session engine.
//!
//! Provides the error taxonomy, chat event and identifier types,
//! transport-agnostic inline button descriptors, and the trait boundaries
//! for the two external collaborators the engine consumes: the chat
//! transport and the screen renderer.

pub mod buttons;
pub mod error;
pub mod event;
pub mod render;
pub mod transport;

// Re-export commonly used items at crate root.
pub use buttons::{button_set, parse_callback_data, ButtonDescriptor, SessionAction};
pub use error::{ChatshError, ChatshResult};
pub use event::{ChatEvent, ChatId, MessageHandle, MessageId, SessionId};
pub use render::{Rendered, ScreenRenderer};
pub use transport::ChatTransport;
