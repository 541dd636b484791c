//! Input routing.
//!
//! Tracks which single session, if any, is the exclusive recipient of raw
//! operator keystrokes, and routes incoming text either into that session
//! or to a freshly spawned one with its own update scheduler.

use crate::render::RenderPipeline;
use crate::scheduler::{PushTiming, UpdateScheduler};
use crate::session::{SessionRegistry, ShellSession};
use chatsh_core::{ChatId, ChatTransport, ChatshResult, MessageId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Default)]
struct RouterState {
    /// The exclusive interactive session, if any.
    interactive: Option<Arc<Mutex<ShellSession>>>,
    /// Last session that produced its first outward message; the
    /// `/interactive` command targets it without explicit selection.
    last_observed: Option<Arc<Mutex<ShellSession>>>,
}

pub struct InteractionRouter {
    registry: Arc<SessionRegistry>,
    transport: Arc<dyn ChatTransport>,
    render: Arc<RenderPipeline>,
    timing: PushTiming,
    /// Minimum wall-clock gap since a session's last outward update before
    /// interactive typing triggers an immediate push; editing the message
    /// once per keystroke is neither reasonable nor allowed by transport
    /// rate limits.
    echo_gap: Duration,
    state: Mutex<RouterState>,
}

impl InteractionRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        transport: Arc<dyn ChatTransport>,
        render: Arc<RenderPipeline>,
        timing: PushTiming,
        echo_gap: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            transport,
            render,
            timing,
            echo_gap,
            state: Mutex::new(RouterState::default()),
        })
    }

    /// Make `session` the exclusive recipient of raw keystrokes, clearing
    /// the flag on whichever session previously held it.
    pub async fn set_interactive(&self, session: &Arc<Mutex<ShellSession>>) -> String {
        let mut state = self.state.lock().await;
        if let Some(previous) = state.interactive.take() {
            previous.lock().await.set_interactive(false);
        }
        let id = {
            let mut session = session.lock().await;
            session.set_interactive(true);
            session.id()
        };
        state.interactive = Some(session.clone());
        info!(session_id = id, "interactive mode enabled");
        format!("You are talking to session {id}")
    }

    /// Leave interactive mode; future input spawns new sessions.
    pub async fn clear_interactive(&self) -> String {
        let mut state = self.state.lock().await;
        if let Some(previous) = state.interactive.take() {
            previous.lock().await.set_interactive(false);
        }
        info!("interactive mode disabled");
        "Normal mode activated".to_string()
    }

    /// Toggle used by the interact button: pressing it on the current
    /// interactive session leaves interactive mode, on any other session
    /// it moves the flag there.
    pub async fn toggle_interactive(&self, session: &Arc<Mutex<ShellSession>>) -> String {
        let is_current = {
            let state = self.state.lock().await;
            state
                .interactive
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, session))
        };
        if is_current {
            self.clear_interactive().await
        } else {
            self.set_interactive(session).await
        }
    }

    /// Make the most recently observed session interactive, if it is still
    /// running.
    pub async fn interactive_to_last(&self) -> String {
        let last = { self.state.lock().await.last_observed.clone() };
        match last {
            Some(session) if session.lock().await.is_running() => {
                self.set_interactive(&session).await
            }
            _ => "No running session to talk to; use a session's Interactive button".to_string(),
        }
    }

    pub async fn current_interactive(&self) -> Option<Arc<Mutex<ShellSession>>> {
        self.state.lock().await.interactive.clone()
    }

    /// Scheduler callback: `session` just produced its first outward
    /// message.
    pub async fn mark_first_push(&self, session: &Arc<Mutex<ShellSession>>) {
        self.state.lock().await.last_observed = Some(session.clone());
    }

    /// Scheduler shutdown: drop interactive mode if this session held it.
    pub async fn release(&self, session: &Arc<Mutex<ShellSession>>) {
        let mut state = self.state.lock().await;
        if state
            .interactive
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            state.interactive = None;
            session.lock().await.set_interactive(false);
            debug!("interactive session finished, back to normal mode");
        }
    }

    /// Route one input event: keystrokes for the interactive session,
    /// otherwise a command spawning a new session and its scheduler.
    pub async fn route_input(
        self: &Arc<Self>,
        text: &str,
        chat: ChatId,
        request_id: MessageId,
    ) -> ChatshResult<()> {
        if let Some(session) = self.current_interactive().await {
            let (result, hint_due, hint) = {
                let mut session = session.lock().await;
                let result = session.push_input(text);
                (
                    result,
                    session.last_update_elapsed() >= self.echo_gap,
                    session.push_hint(),
                )
            };
            result?;
            if hint_due {
                hint.notify_one();
            }
            return Ok(());
        }

        let session = self.registry.create(text, request_id).await?;
        UpdateScheduler::new(
            session,
            chat,
            self.transport.clone(),
            self.render.clone(),
            Arc::clone(self),
            self.timing.clone(),
        )
        .spawn();
        Ok(())
    }
}
