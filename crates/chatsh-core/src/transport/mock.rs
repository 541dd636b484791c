//! Recording transport for tests.
//!
//! Captures every outward call in memory so tests can assert on what the
//! engine pushed and in what order. Can be switched into a failing mode to
//! exercise the engine's transport-failure handling.

use super::ChatTransport;
use crate::buttons::ButtonDescriptor;
use crate::error::{ChatshError, ChatshResult};
use crate::event::{ChatId, MessageHandle, MessageId};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

/// One outward call as the engine issued it.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Send {
        chat: ChatId,
        text: Option<String>,
        buttons: Option<Vec<ButtonDescriptor>>,
        file: Option<PathBuf>,
        reply_to: Option<MessageId>,
        handle: MessageHandle,
    },
    Edit {
        chat: ChatId,
        handle: MessageHandle,
        text: Option<String>,
        buttons: Option<Vec<ButtonDescriptor>>,
        file: Option<PathBuf>,
    },
    Delete {
        chat: ChatId,
        handle: MessageHandle,
    },
    Answer {
        callback_id: String,
        text: String,
        alert: bool,
    },
}

pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    next_handle: AtomicI64,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_handle: AtomicI64::new(1),
            failing: AtomicBool::new(false),
        }
    }

    /// Every recorded call, in issue order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Make all outward calls fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    fn check(&self) -> ChatshResult<()> {
        if self.failing.load(Ordering::Relaxed) {
            Err(ChatshError::Transport("transport unavailable".into()))
        } else {
            Ok(())
        }
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatTransport for RecordingTransport {
    fn send_message<'a>(
        &'a self,
        chat: ChatId,
        text: Option<&'a str>,
        buttons: Option<&'a [ButtonDescriptor]>,
        file: Option<&'a Path>,
        reply_to: Option<MessageId>,
    ) -> Pin<Box<dyn Future<Output = ChatshResult<MessageHandle>> + Send + 'a>> {
        Box::pin(async move {
            self.check()?;
            let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
            self.record(TransportCall::Send {
                chat,
                text: text.map(str::to_string),
                buttons: buttons.map(<[ButtonDescriptor]>::to_vec),
                file: file.map(Path::to_path_buf),
                reply_to,
                handle,
            });
            Ok(handle)
        })
    }

    fn edit_message<'a>(
        &'a self,
        chat: ChatId,
        handle: MessageHandle,
        text: Option<&'a str>,
        buttons: Option<&'a [ButtonDescriptor]>,
        file: Option<&'a Path>,
    ) -> Pin<Box<dyn Future<Output = ChatshResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.check()?;
            self.record(TransportCall::Edit {
                chat,
                handle,
                text: text.map(str::to_string),
                buttons: buttons.map(<[ButtonDescriptor]>::to_vec),
                file: file.map(Path::to_path_buf),
            });
            Ok(())
        })
    }

    fn delete_message<'a>(
        &'a self,
        chat: ChatId,
        handle: MessageHandle,
    ) -> Pin<Box<dyn Future<Output = ChatshResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.check()?;
            self.record(TransportCall::Delete { chat, handle });
            Ok(())
        })
    }

    fn answer_callback<'a>(
        &'a self,
        callback_id: &'a str,
        text: &'a str,
        alert: bool,
    ) -> Pin<Box<dyn Future<Output = ChatshResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.check()?;
            self.record(TransportCall::Answer {
                callback_id: callback_id.to_string(),
                text: text.to_string(),
                alert,
            });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn calls_are_recorded_in_order() {
        let transport = RecordingTransport::new();
        let handle = transport
            .send_message(1, Some("hello"), None, None, Some(9))
            .await
            .unwrap();
        transport
            .edit_message(1, handle, Some("edited"), None, None)
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], TransportCall::Send { handle: 1, .. }));
        assert!(matches!(&calls[1], TransportCall::Edit { handle: 1, .. }));
    }

    #[tokio::test]
    async fn failing_mode_rejects_calls_without_recording() {
        let transport = RecordingTransport::new();
        transport.set_failing(true);
        assert!(transport
            .send_message(1, Some("hello"), None, None, None)
            .await
            .is_err());
        assert!(transport.calls().is_empty());

        transport.set_failing(false);
        assert!(transport
            .send_message(1, Some("hello"), None, None, None)
            .await
            .is_ok());
        assert_eq!(transport.calls().len(), 1);
    }
}
