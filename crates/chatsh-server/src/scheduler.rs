//! Per-session update loop.
//!
//! Drains process output on a fast tick and pushes rendered snapshots
//! outward on a coarser, rate-limited cadence: the first push happens
//! quickly after spawn, steady-state pushes ride a run-time cycle with a
//! minimum spacing between attempts. The loop ends with one final push
//! after the session finishes so the terminal state is always reflected.

use crate::render::RenderPipeline;
use crate::router::InteractionRouter;
use crate::session::{SessionState, ShellSession};
use chatsh_core::{ChatId, ChatTransport, ChatshResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Cadence parameters for one scheduler loop. All of them are tunable; the
/// defaults aim for a fast first response and a throttled steady state.
#[derive(Debug, Clone)]
pub struct PushTiming {
    /// Output-ingestion tick.
    pub drain_tick: Duration,
    /// Steady-state push cycle, in whole seconds of accumulated run time.
    pub push_cycle_secs: u64,
    /// How soon after spawn the first push may happen.
    pub first_push_delay: Duration,
    /// Minimum spacing between attempts once a message exists, to respect
    /// outward-transport rate limits.
    pub min_push_spacing: Duration,
}

impl Default for PushTiming {
    fn default() -> Self {
        Self {
            drain_tick: Duration::from_millis(100),
            push_cycle_secs: 4,
            first_push_delay: Duration::from_millis(500),
            min_push_spacing: Duration::from_millis(1100),
        }
    }
}

/// Supervises one session's visibility to the outward transport.
pub struct UpdateScheduler {
    session: Arc<Mutex<ShellSession>>,
    chat: ChatId,
    transport: Arc<dyn ChatTransport>,
    render: Arc<RenderPipeline>,
    router: Arc<InteractionRouter>,
    timing: PushTiming,
}

impl UpdateScheduler {
    pub fn new(
        session: Arc<Mutex<ShellSession>>,
        chat: ChatId,
        transport: Arc<dyn ChatTransport>,
        render: Arc<RenderPipeline>,
        router: Arc<InteractionRouter>,
        timing: PushTiming,
    ) -> Self {
        Self {
            session,
            chat,
            transport,
            render,
            router,
            timing,
        }
    }

    /// Run the loop as a background task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let (session_id, push_hint) = {
            let session = self.session.lock().await;
            (session.id(), session.push_hint())
        };
        let started = Instant::now();
        let mut last_attempt: Option<Instant> = None;
        let mut ticker = tokio::time::interval(self.timing.drain_tick);

        debug!(session_id, "scheduler started");

        loop {
            let hinted = tokio::select! {
                _ = ticker.tick() => false,
                _ = push_hint.notified() => true,
            };

            let (done, run_time, pushed) = {
                let mut session = self.session.lock().await;
                session.drain_once();
                (
                    session.state() == SessionState::Done,
                    session.run_time_secs(),
                    session.message_handle().is_some(),
                )
            };

            if done {
                break;
            }

            let due = hinted
                || if pushed {
                    run_time % self.timing.push_cycle_secs == 0
                        && last_attempt
                            .map_or(true, |at| at.elapsed() >= self.timing.min_push_spacing)
                } else {
                    started.elapsed() >= self.timing.first_push_delay
                };

            if due {
                last_attempt = Some(Instant::now());
                if let Err(e) = self.try_push().await {
                    // transient outward failures must never abort ingestion
                    warn!(session_id, error = %e, "push attempt failed");
                }
            }
        }

        // reflect the terminal state outward, then hand back interactive
        // mode if this session held it
        if let Err(e) = self.try_push().await {
            warn!(session_id, error = %e, "final push attempt failed");
        }
        self.router.release(&self.session).await;
        debug!(session_id, "scheduler stopped");
    }

    /// One push attempt: gate cheaply on pending output and button
    /// changes, render, gate again on the rendered candidate, then create
    /// or edit the outward message.
    async fn try_push(&self) -> ChatshResult<()> {
        let (id, output, request_id, buttons, buttons_changed, pending, handle) = {
            let mut session = self.session.lock().await;
            let (buttons, buttons_changed) = session.compute_buttons();
            (
                session.id(),
                session.full_output().to_string(),
                session.request_id(),
                buttons,
                buttons_changed,
                session.has_pending_output(),
                session.message_handle(),
            )
        };

        // nothing appended since the last successful push and no button
        // change means the rendered candidate cannot differ either
        if !buttons_changed && !pending {
            return Ok(());
        }

        // render without holding the session lock
        let rendered = self.render.snapshot(&output, id).await;

        if !self
            .session
            .lock()
            .await
            .has_new_state(buttons_changed, &rendered.text)
        {
            return Ok(());
        }

        // a process killed mid-line can leave nothing but blank lines; the
        // transport cannot display an empty body, so push buttons only
        let body = if all_blank(&rendered.text) {
            None
        } else {
            Some(rendered.text.as_str())
        };

        match handle {
            Some(handle) => {
                self.transport
                    .edit_message(
                        self.chat,
                        handle,
                        body,
                        Some(&buttons),
                        rendered.image.as_deref(),
                    )
                    .await?;
                self.session.lock().await.record_push(&rendered.text, handle);
            }
            None => {
                let handle = self
                    .transport
                    .send_message(
                        self.chat,
                        body,
                        Some(&buttons),
                        rendered.image.as_deref(),
                        Some(request_id),
                    )
                    .await?;
                self.session.lock().await.record_push(&rendered.text, handle);
                self.router.mark_first_push(&self.session).await;
            }
        }
        debug!(session_id = id, "snapshot pushed");
        Ok(())
    }
}

/// Whether a candidate body consists solely of blank lines.
fn all_blank(text: &str) -> bool {
    text.split('\n').all(|line| line.trim().is_empty())
}
