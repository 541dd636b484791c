//! Control plane.
//!
//! Receives chat events from the transport adapter and dispatches them:
//! plain text to the router, control commands to the components they
//! steer, button callbacks through an explicit registry lookup with a
//! user-visible not-found path.

use crate::config::ServerConfig;
use crate::render::{RenderPipeline, Vt100Renderer};
use crate::router::InteractionRouter;
use crate::session::SessionRegistry;
use chatsh_core::{
    parse_callback_data, ChatEvent, ChatId, ChatTransport, ChatshResult, MessageId, ScreenRenderer,
    SessionAction,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct App {
    registry: Arc<SessionRegistry>,
    router: Arc<InteractionRouter>,
    render: Arc<RenderPipeline>,
    transport: Arc<dyn ChatTransport>,
}

impl App {
    pub fn new(config: ServerConfig, transport: Arc<dyn ChatTransport>) -> ChatshResult<Self> {
        std::fs::create_dir_all(&config.scratch_dir)?;

        let renderer: Arc<dyn ScreenRenderer> = Arc::new(Vt100Renderer::new(
            config.render_cols,
            config.render_rows,
            config.render_scrollback,
        ));
        let render = Arc::new(RenderPipeline::new(
            Some(renderer),
            config.render_enabled,
            config.scratch_dir.clone(),
        ));
        let registry = Arc::new(SessionRegistry::new(
            config.shell.clone(),
            config.scratch_dir.clone(),
            config.reap_interval,
            config.output_lifetime,
            config.render_cols,
            config.render_rows,
        ));
        let router = InteractionRouter::new(
            registry.clone(),
            transport.clone(),
            render.clone(),
            config.push_timing(),
            config.echo_gap,
        );

        Ok(Self {
            registry,
            router,
            render,
            transport,
        })
    }

    /// Run the event loop and the registry reaper until the event stream
    /// ends.
    pub async fn run(self, mut events: mpsc::Receiver<ChatEvent>) -> ChatshResult<()> {
        let reaper = {
            let registry = self.registry.clone();
            tokio::spawn(async move { registry.run_reaper().await })
        };

        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }

        info!(
            sessions = self.registry.count().await,
            "event stream closed, shutting down"
        );
        reaper.abort();
        Ok(())
    }

    /// Dispatch one chat event. Errors are reported to the operator where
    /// possible; they never end the loop.
    pub async fn handle_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::Message {
                chat,
                message_id,
                text,
            } => self.handle_message(chat, message_id, text).await,
            ChatEvent::Callback {
                chat,
                message_id,
                callback_id,
                data,
            } => {
                self.handle_callback(chat, message_id, &callback_id, &data)
                    .await
            }
        }
    }

    async fn handle_message(&self, chat: ChatId, message_id: MessageId, text: String) {
        // a leading backslash escapes command parsing: `\/usr/bin/env`
        // runs as a command instead of being read as a control command
        let (text, escaped) = match text.strip_prefix('\\') {
            Some(rest) => (rest.to_string(), true),
            None => (text, false),
        };

        if !escaped && text.starts_with('/') {
            self.handle_command(chat, message_id, text.trim()).await;
            return;
        }

        if let Err(e) = self.router.route_input(&text, chat, message_id).await {
            warn!(error = %e, "input routing failed");
            self.notify(chat, message_id, &e.to_string()).await;
        }
    }

    async fn handle_command(&self, chat: ChatId, message_id: MessageId, command: &str) {
        let reply = match command {
            "/interactive" => self.router.interactive_to_last().await,
            "/normal" => self.router.clear_interactive().await,
            "/render_on" => {
                self.render.set_enabled(true);
                "Rendered snapshots enabled".to_string()
            }
            "/render_off" => {
                self.render.set_enabled(false);
                "Rendered snapshots disabled".to_string()
            }
            _ => format!("Unknown command: {command}"),
        };
        self.notify(chat, message_id, &reply).await;
    }

    async fn handle_callback(
        &self,
        chat: ChatId,
        message_id: MessageId,
        callback_id: &str,
        data: &str,
    ) {
        let Some((action, id)) = parse_callback_data(data) else {
            debug!(data, "ignoring malformed callback data");
            return;
        };

        let Some(session) = self.registry.get(id).await else {
            // the session was reaped after the buttons were sent: tell the
            // operator and clear the dangling buttons
            let _ = self
                .transport
                .answer_callback(callback_id, "this session no longer exists", true)
                .await;
            let _ = self
                .transport
                .edit_message(chat, message_id, None, Some(&[]), None)
                .await;
            return;
        };

        match action {
            SessionAction::Info => {
                let info = session.lock().await.info_text();
                let _ = self.transport.answer_callback(callback_id, &info, true).await;
            }
            SessionAction::Enter => {
                let reply = match session.lock().await.push_input("^m") {
                    Ok(()) => "Enter key pressed",
                    Err(_) => "Session is no longer running",
                };
                let _ = self.transport.answer_callback(callback_id, reply, false).await;
            }
            SessionAction::Interact => {
                let answer = self.router.toggle_interactive(&session).await;
                let _ = self
                    .transport
                    .answer_callback(callback_id, &answer, true)
                    .await;
                // reflect the new button set promptly
                let hint = { session.lock().await.push_hint() };
                hint.notify_one();
            }
            SessionAction::Terminate => {
                session.lock().await.terminate();
                let _ = self
                    .transport
                    .answer_callback(callback_id, "Terminating", false)
                    .await;
            }
            SessionAction::Html => {
                let (id, command, output, request_id) = {
                    let session = session.lock().await;
                    (
                        session.id(),
                        session.command().to_string(),
                        session.full_output().to_string(),
                        session.request_id(),
                    )
                };
                match self.render.write_html(id, &command, &output) {
                    Ok(path) => {
                        let _ = self
                            .transport
                            .send_message(chat, None, None, Some(&path), Some(request_id))
                            .await;
                    }
                    Err(e) => {
                        warn!(session_id = id, error = %e, "HTML snapshot failed");
                        let _ = self
                            .transport
                            .answer_callback(callback_id, "Snapshot failed", true)
                            .await;
                    }
                }
            }
        }
    }

    async fn notify(&self, chat: ChatId, reply_to: MessageId, text: &str) {
        let _ = self
            .transport
            .send_message(chat, Some(text), None, None, Some(reply_to))
            .await;
    }
}
