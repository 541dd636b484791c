//! Host process primitive: a shell command running under a PTY.
//!
//! Spawns `shell -c command` on a pseudo-terminal via portable-pty. A
//! dedicated reader thread drains the PTY into a channel so the session
//! engine can poll for output without ever blocking; channel exhaustion
//! after the thread exits is observed as end-of-stream.

use chatsh_core::{ChatshError, ChatshResult, SessionId};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};
use tracing::{debug, info};

/// Result of one non-blocking read attempt.
#[derive(Debug)]
pub enum PtyRead {
    /// A chunk of output bytes was ready.
    Data(Vec<u8>),
    /// No data ready right now; not an error.
    WouldBlock,
    /// The process closed its output.
    Eof,
}

/// A shell process running under a PTY.
pub struct PtyProcess {
    pid: SessionId,
    rx: UnboundedReceiver<Vec<u8>>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    /// Kept alive for the session's lifetime; dropping the master closes
    /// the PTY under the child.
    _master: Box<dyn MasterPty + Send>,
}

impl PtyProcess {
    /// Spawn `shell -c command` under a new PTY of the given size.
    pub fn spawn(shell: &str, command: &str, cols: u16, rows: u16) -> ChatshResult<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ChatshError::Spawn(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.args(["-c", command]);
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ChatshError::Spawn(format!("failed to spawn command: {e}")))?;
        let pid = child
            .process_id()
            .ok_or_else(|| ChatshError::Spawn("spawned process has no pid".into()))?;

        // The slave must not stay open in this process, or the master
        // would never report end-of-stream after the child exits.
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ChatshError::Spawn(format!("failed to clone PTY reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| ChatshError::Spawn(format!("failed to take PTY writer: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
            // dropping tx closes the channel; the session sees Eof
        });

        info!(pid, command, "PTY spawned");

        Ok(Self {
            pid,
            rx,
            writer,
            child,
            _master: pair.master,
        })
    }

    pub fn pid(&self) -> SessionId {
        self.pid
    }

    /// One non-blocking read attempt against the output channel.
    pub fn try_read(&mut self) -> PtyRead {
        match self.rx.try_recv() {
            Ok(bytes) => PtyRead::Data(bytes),
            Err(TryRecvError::Empty) => PtyRead::WouldBlock,
            Err(TryRecvError::Disconnected) => PtyRead::Eof,
        }
    }

    /// Write literal bytes to the process input.
    pub fn send_bytes(&mut self, bytes: &[u8]) -> ChatshResult<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Send the control code for a letter (`c` is the interrupt, `m` is
    /// carriage return).
    pub fn send_control(&mut self, letter: char) -> ChatshResult<()> {
        self.send_bytes(&[control_byte(letter)])
    }

    /// Kill the child process. The caller decides what a failure means; a
    /// process that already exited on its own is the common cause.
    pub fn kill(&mut self) -> std::io::Result<()> {
        debug!(pid = self.pid, "killing PTY child");
        self.child.kill()
    }

    /// Collect the child's exit status if it has already terminated.
    pub fn try_reap(&mut self) {
        let _ = self.child.try_wait();
    }
}

/// Map a letter to its terminal control code.
fn control_byte(letter: char) -> u8 {
    (letter.to_ascii_lowercase() as u8)
        .wrapping_sub(b'a')
        .wrapping_add(1)
}
