//! Console transport adapter for local development.
//!
//! Drives the engine without a chat network: operator input is read line
//! by line from stdin, outward messages are printed to stdout. A line
//! starting with `@` simulates an inline button press with the rest of the
//! line as callback data, e.g. `@terminate&4321`.

use chatsh_core::{
    ButtonDescriptor, ChatEvent, ChatId, ChatTransport, ChatshResult, MessageHandle, MessageId,
};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::debug;

/// The single pseudo-chat all console traffic belongs to.
const CONSOLE_CHAT: ChatId = 0;

pub struct ConsoleTransport {
    next_handle: AtomicI64,
}

impl ConsoleTransport {
    /// Start the adapter: returns the outward half and the event stream.
    ///
    /// The reader task ends (closing the stream) when stdin does.
    pub fn start() -> (Arc<Self>, mpsc::Receiver<ChatEvent>) {
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut lines = stdin.lines();
            let mut next_message_id: MessageId = 1;
            let mut next_callback: u64 = 1;
            while let Ok(Some(line)) = lines.next_line().await {
                if line.is_empty() {
                    continue;
                }
                let message_id = next_message_id;
                next_message_id += 1;
                let event = match line.strip_prefix('@') {
                    Some(data) => {
                        let callback_id = format!("cb-{next_callback}");
                        next_callback += 1;
                        ChatEvent::Callback {
                            chat: CONSOLE_CHAT,
                            message_id,
                            callback_id,
                            data: data.to_string(),
                        }
                    }
                    None => ChatEvent::Message {
                        chat: CONSOLE_CHAT,
                        message_id,
                        text: line,
                    },
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            debug!("console input closed");
        });

        (
            Arc::new(Self {
                next_handle: AtomicI64::new(1),
            }),
            rx,
        )
    }

    fn print(
        header: &str,
        text: Option<&str>,
        buttons: Option<&[ButtonDescriptor]>,
        file: Option<&Path>,
    ) {
        println!("--- {header} ---");
        match text {
            Some(text) => println!("{text}"),
            None => println!("(no content)"),
        }
        if let Some(buttons) = buttons {
            let row: Vec<String> = buttons
                .iter()
                .map(|b| format!("[{} @{}]", b.label, b.callback_data()))
                .collect();
            println!("{}", row.join(" "));
        }
        if let Some(file) = file {
            println!("(file: {})", file.display());
        }
    }
}

impl ChatTransport for ConsoleTransport {
    fn send_message<'a>(
        &'a self,
        _chat: ChatId,
        text: Option<&'a str>,
        buttons: Option<&'a [ButtonDescriptor]>,
        file: Option<&'a Path>,
        _reply_to: Option<MessageId>,
    ) -> Pin<Box<dyn Future<Output = ChatshResult<MessageHandle>> + Send + 'a>> {
        Box::pin(async move {
            let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
            Self::print(&format!("message #{handle}"), text, buttons, file);
            Ok(handle)
        })
    }

    fn edit_message<'a>(
        &'a self,
        _chat: ChatId,
        handle: MessageHandle,
        text: Option<&'a str>,
        buttons: Option<&'a [ButtonDescriptor]>,
        file: Option<&'a Path>,
    ) -> Pin<Box<dyn Future<Output = ChatshResult<()>> + Send + 'a>> {
        Box::pin(async move {
            Self::print(&format!("edit of message #{handle}"), text, buttons, file);
            Ok(())
        })
    }

    fn delete_message<'a>(
        &'a self,
        _chat: ChatId,
        handle: MessageHandle,
    ) -> Pin<Box<dyn Future<Output = ChatshResult<()>> + Send + 'a>> {
        Box::pin(async move {
            println!("--- message #{handle} deleted ---");
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
            let kind = if alert { "alert" } else { "notice" };
            println!("--- {kind} ({callback_id}) ---");
            println!("{text}");
            Ok(())
        })
    }
}
