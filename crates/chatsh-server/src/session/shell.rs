//! A single PTY-backed shell session.
//!
//! Owns the spawned process, its append-only output buffer, lifecycle
//! state, timing bookkeeping, and keystroke injection. Change detection
//! against the last pushed snapshot lives here too, since it is state the
//! session carries between pushes.

use super::pty::{PtyProcess, PtyRead};
use chatsh_core::{
    button_set, ButtonDescriptor, ChatshError, ChatshResult, MessageHandle, MessageId, SessionId,
};
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Process creation requested but not yet confirmed running.
    Spawning,
    /// Process is alive and may still produce output.
    Running,
    /// Process has finished; the buffer is frozen.
    Done,
}

/// A single unit of input sent to the PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keystroke {
    /// A control code by letter; `Control('m')` is Enter.
    Control(char),
    /// Literal bytes.
    Bytes(String),
}

/// Translate operator text into the keystroke sequence sent to the PTY.
///
/// A two-character `^x` sequence (caret plus one letter) maps to the
/// control code for `x`. Anything else is split on line breaks: each break
/// becomes an Enter, an empty line sends only the Enter, and the final
/// line is sent without a trailing Enter so the operator submits it
/// explicitly (the Enter button, or `^m`).
pub fn input_keystrokes(text: &str) -> Vec<Keystroke> {
    let mut chars = text.chars();
    if let (Some('^'), Some(letter), None) = (chars.next(), chars.next(), chars.next()) {
        if letter.is_ascii_alphabetic() {
            return vec![Keystroke::Control(letter)];
        }
    }

    let mut keys = Vec::new();
    for (index, line) in text.split('\n').enumerate() {
        if index != 0 {
            keys.push(Keystroke::Control('m'));
        }
        if line.is_empty() {
            keys.push(Keystroke::Control('m'));
        } else {
            keys.push(Keystroke::Bytes(line.to_string()));
        }
    }
    keys
}

pub struct ShellSession {
    id: SessionId,
    command: String,
    request_id: MessageId,
    pty: PtyProcess,
    buffer: String,
    state: SessionState,
    /// Done was reached via explicit kill rather than end-of-stream.
    terminated: bool,
    started_at: DateTime<Local>,
    start_time: Instant,
    done_time: Option<Instant>,
    run_time_secs: u64,
    interactive: bool,
    pending_output: bool,
    last_pushed: String,
    /// Signature of the last computed button set.
    buttons: Option<Vec<ButtonDescriptor>>,
    message_handle: Option<MessageHandle>,
    last_update_time: Instant,
    push_hint: Arc<Notify>,
}

impl ShellSession {
    /// Spawn `shell -c command` and return the session in Running state.
    ///
    /// Spawn failures are fatal to this request and propagate; nothing is
    /// retried.
    pub fn spawn(
        shell: &str,
        command: &str,
        request_id: MessageId,
        cols: u16,
        rows: u16,
    ) -> ChatshResult<Self> {
        let pty = PtyProcess::spawn(shell, command, cols, rows)?;
        let now = Instant::now();
        let mut session = Self {
            id: pty.pid(),
            command: command.to_string(),
            request_id,
            pty,
            buffer: String::new(),
            state: SessionState::Spawning,
            terminated: false,
            started_at: Local::now(),
            start_time: now,
            done_time: None,
            run_time_secs: 0,
            interactive: false,
            pending_output: false,
            last_pushed: String::new(),
            buttons: None,
            message_handle: None,
            last_update_time: now,
            push_hint: Arc::new(Notify::new()),
        };
        session.state = SessionState::Running;
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn request_id(&self) -> MessageId {
        self.request_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state != SessionState::Done
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    pub fn run_time_secs(&self) -> u64 {
        self.run_time_secs
    }

    pub fn message_handle(&self) -> Option<MessageHandle> {
        self.message_handle
    }

    pub fn has_pending_output(&self) -> bool {
        self.pending_output
    }

    /// Time since the session finished, if it has.
    pub fn done_elapsed(&self) -> Option<Duration> {
        self.done_time.map(|t| t.elapsed())
    }

    /// Time since the last successful outward push.
    pub fn last_update_elapsed(&self) -> Duration {
        self.last_update_time.elapsed()
    }

    /// Notifier the router uses to request an immediate push attempt from
    /// the owning scheduler.
    pub fn push_hint(&self) -> Arc<Notify> {
        self.push_hint.clone()
    }

    /// One non-blocking read attempt from the process output channel.
    ///
    /// Appends available output to the buffer, transitions to Done on
    /// end-of-stream, and recomputes the run time while Running. A no-op
    /// once Done.
    pub fn drain_once(&mut self) {
        if self.state == SessionState::Done {
            return;
        }
        match self.pty.try_read() {
            PtyRead::Data(bytes) => {
                self.buffer.push_str(&String::from_utf8_lossy(&bytes));
                self.pending_output = true;
            }
            PtyRead::WouldBlock => {}
            PtyRead::Eof => {
                self.finish();
                return;
            }
        }
        self.run_time_secs = self.start_time.elapsed().as_secs();
    }

    /// Kill the process and mark the session finished immediately, without
    /// waiting for end-of-stream. Idempotent.
    pub fn terminate(&mut self) {
        if self.state == SessionState::Done {
            return;
        }
        self.terminated = true;
        if let Err(e) = self.pty.kill() {
            debug!(session_id = self.id, error = %e, "kill failed, process may have already exited");
        }
        self.finish();
    }

    fn finish(&mut self) {
        if self.state == SessionState::Done {
            return;
        }
        self.state = SessionState::Done;
        let done = Instant::now();
        self.done_time = Some(done);
        self.run_time_secs = done.duration_since(self.start_time).as_secs();
        self.pty.try_reap();
        info!(
            session_id = self.id,
            run_time_secs = self.run_time_secs,
            terminated = self.terminated,
            "session finished"
        );
    }

    /// Inject operator keystrokes into the process input.
    pub fn push_input(&mut self, text: &str) -> ChatshResult<()> {
        if self.state == SessionState::Done {
            return Err(ChatshError::SessionNotRunning(self.id));
        }
        for key in input_keystrokes(text) {
            match key {
                Keystroke::Control(letter) => self.pty.send_control(letter)?,
                Keystroke::Bytes(bytes) => self.pty.send_bytes(bytes.as_bytes())?,
            }
        }
        Ok(())
    }

    /// The entire accumulated output since spawn, not a delta.
    pub fn full_output(&self) -> &str {
        &self.buffer
    }

    /// Derive the current action-button set from session state.
    ///
    /// Returns whether the set differs from the previously computed one,
    /// storing the new signature as a side effect.
    pub fn compute_buttons(&mut self) -> (Vec<ButtonDescriptor>, bool) {
        let buttons = button_set(self.id, self.is_running(), self.interactive);
        let changed = self.buttons.as_deref() != Some(&buttons[..]);
        if changed {
            self.buttons = Some(buttons.clone());
        }
        (buttons, changed)
    }

    /// Whether an outward push would show the viewer anything new. The
    /// sole gate deciding whether transport I/O happens.
    pub fn has_new_state(&self, buttons_changed: bool, candidate: &str) -> bool {
        buttons_changed || (!candidate.is_empty() && self.last_pushed != candidate)
    }

    /// Record a successfully delivered snapshot. Assigns the outward
    /// message handle on the first push; later pushes edit that message.
    pub fn record_push(&mut self, snapshot: &str, handle: MessageHandle) {
        if self.message_handle.is_none() {
            self.message_handle = Some(handle);
        }
        self.last_pushed.clear();
        self.last_pushed.push_str(snapshot);
        self.pending_output = false;
        self.last_update_time = Instant::now();
    }

    /// Human-readable status block shown by the Info button.
    pub fn info_text(&self) -> String {
        let status = match self.state {
            SessionState::Done if self.terminated => "terminated",
            SessionState::Done => "done",
            _ if self.is_interactive() => "running (interactive)",
            _ => "running",
        };
        format!(
            "session {}\nstatus: {}\ncommand: {}\nstarted: {}\nlast update: {}s ago\nrun time: {}",
            self.id,
            status,
            self.command,
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.last_update_time.elapsed().as_secs(),
            format_run_time(self.run_time_secs),
        )
    }
}

/// Format a run time as `1h 2m 3s`, omitting leading zero units.
fn format_run_time(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain_until_done(session: &mut ShellSession) {
        for _ in 0..1000 {
            session.drain_once();
            if session.state() == SessionState::Done {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session did not finish in time");
    }

    #[test]
    fn control_sequence_becomes_control_keystroke() {
        assert_eq!(input_keystrokes("^c"), vec![Keystroke::Control('c')]);
        assert_eq!(input_keystrokes("^M"), vec![Keystroke::Control('M')]);
    }

    #[test]
    fn multiline_input_interleaves_enters_without_trailing_enter() {
        assert_eq!(
            input_keystrokes("ls\npwd"),
            vec![
                Keystroke::Bytes("ls".into()),
                Keystroke::Control('m'),
                Keystroke::Bytes("pwd".into()),
            ]
        );
    }

    #[test]
    fn empty_lines_send_only_enter() {
        assert_eq!(input_keystrokes(""), vec![Keystroke::Control('m')]);
        assert_eq!(
            input_keystrokes("a\n\nb"),
            vec![
                Keystroke::Bytes("a".into()),
                Keystroke::Control('m'),
                Keystroke::Control('m'),
                Keystroke::Control('m'),
                Keystroke::Bytes("b".into()),
            ]
        );
    }

    #[test]
    fn caret_with_non_letter_is_literal() {
        assert_eq!(input_keystrokes("^1"), vec![Keystroke::Bytes("^1".into())]);
        assert_eq!(input_keystrokes("^cd"), vec![Keystroke::Bytes("^cd".into())]);
    }

    #[tokio::test]
    async fn output_accumulates_in_receipt_order() {
        let mut session = ShellSession::spawn("/bin/sh", "echo one; echo two", 1, 80, 24).unwrap();
        assert_eq!(session.state(), SessionState::Running);
        drain_until_done(&mut session).await;
        let output = session.full_output();
        let one = output.find("one").expect("first chunk missing");
        let two = output.find("two").expect("second chunk missing");
        assert!(one < two, "output out of order: {output:?}");
    }

    #[tokio::test]
    async fn buffer_is_frozen_after_done() {
        let mut session = ShellSession::spawn("/bin/sh", "echo hi", 1, 80, 24).unwrap();
        drain_until_done(&mut session).await;
        let before = session.full_output().to_string();
        session.drain_once();
        session.drain_once();
        assert_eq!(session.full_output(), before);
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let mut session = ShellSession::spawn("/bin/sh", "sleep 30", 1, 80, 24).unwrap();
        session.terminate();
        assert_eq!(session.state(), SessionState::Done);
        let first_done = session.done_elapsed().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.terminate();
        let second_done = session.done_elapsed().unwrap();
        // the second call must not restamp the finish time
        assert!(second_done >= first_done);
        assert_eq!(session.state(), SessionState::Done);
    }

    #[tokio::test]
    async fn push_input_after_done_is_rejected() {
        let mut session = ShellSession::spawn("/bin/sh", "true", 1, 80, 24).unwrap();
        drain_until_done(&mut session).await;
        match session.push_input("ls") {
            Err(ChatshError::SessionNotRunning(id)) => assert_eq!(id, session.id()),
            other => panic!("expected SessionNotRunning, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn interactive_input_reaches_the_process() {
        let mut session = ShellSession::spawn("/bin/sh", "cat", 1, 80, 24).unwrap();
        session.push_input("hello").unwrap();
        session.push_input("^m").unwrap();
        // cat echoes the line back once it sees the carriage return
        for _ in 0..500 {
            session.drain_once();
            if session.full_output().contains("hello") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(session.full_output().contains("hello"));
        session.terminate();
    }

    #[tokio::test]
    async fn button_sets_follow_lifecycle() {
        let mut session = ShellSession::spawn("/bin/sh", "sleep 30", 1, 80, 24).unwrap();

        let (buttons, changed) = session.compute_buttons();
        assert_eq!(buttons.len(), 5);
        assert!(changed, "first computation must report a change");

        let (_, changed) = session.compute_buttons();
        assert!(!changed, "unchanged state must not report a change");

        session.set_interactive(true);
        let (_, changed) = session.compute_buttons();
        assert!(changed, "interactive toggle changes the set");

        session.terminate();
        let (buttons, changed) = session.compute_buttons();
        assert_eq!(buttons.len(), 2);
        assert!(changed);
    }

    #[tokio::test]
    async fn has_new_state_gates_on_content_and_buttons() {
        let mut session = ShellSession::spawn("/bin/sh", "sleep 30", 1, 80, 24).unwrap();

        assert!(!session.has_new_state(false, ""));
        assert!(session.has_new_state(true, ""));
        assert!(session.has_new_state(false, "hi"));

        session.record_push("hi", 7);
        assert!(!session.has_new_state(false, "hi"));
        assert!(session.has_new_state(false, "hi\nbye"));
        assert_eq!(session.message_handle(), Some(7));

        // the handle is assigned at most once
        session.record_push("hi\nbye", 9);
        assert_eq!(session.message_handle(), Some(7));

        session.terminate();
    }

    #[test]
    fn run_time_formatting() {
        assert_eq!(format_run_time(0), "0s");
        assert_eq!(format_run_time(59), "59s");
        assert_eq!(format_run_time(61), "1m 1s");
        assert_eq!(format_run_time(3723), "1h 2m 3s");
    }
}
