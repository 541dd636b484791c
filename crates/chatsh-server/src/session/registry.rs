//! Session registry: id → session map plus the periodic reaper.
//!
//! The reaper purges sessions that finished more than the output lifetime
//! ago, along with the render artifacts derived from them. It runs
//! independently of the per-session schedulers.

use super::shell::{SessionState, ShellSession};
use chatsh_core::{ChatshResult, MessageId, SessionId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Process-wide mapping of session id to session.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<ShellSession>>>>,
    shell: String,
    scratch_dir: PathBuf,
    reap_interval: Duration,
    output_lifetime: Duration,
    pty_cols: u16,
    pty_rows: u16,
}

impl SessionRegistry {
    pub fn new(
        shell: String,
        scratch_dir: PathBuf,
        reap_interval: Duration,
        output_lifetime: Duration,
        pty_cols: u16,
        pty_rows: u16,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            shell,
            scratch_dir,
            reap_interval,
            output_lifetime,
            pty_cols,
            pty_rows,
        }
    }

    /// Spawn a session for `command` and insert it keyed by its id.
    pub async fn create(
        &self,
        command: &str,
        request_id: MessageId,
    ) -> ChatshResult<Arc<Mutex<ShellSession>>> {
        let session = ShellSession::spawn(
            &self.shell,
            command,
            request_id,
            self.pty_cols,
            self.pty_rows,
        )?;
        let id = session.id();
        let session = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, session.clone());
        info!(session_id = id, "session registered");
        Ok(session)
    }

    /// Look up a session by id. Callers present a "session no longer
    /// exists" notice on `None`; a stale button callback is the common
    /// cause.
    pub async fn get(&self, id: SessionId) -> Option<Arc<Mutex<ShellSession>>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Run the reaper until the owning task is dropped.
    pub async fn run_reaper(&self) {
        let mut interval = tokio::time::interval(self.reap_interval);
        loop {
            interval.tick().await;
            self.reap_once().await;
        }
    }

    /// One reap pass: remove finished sessions whose output lifetime has
    /// expired and delete their derived artifacts. Returns the removed ids.
    pub async fn reap_once(&self) -> Vec<SessionId> {
        let mut expired = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, session) in sessions.iter() {
                let session = session.lock().await;
                if session.state() == SessionState::Done
                    && session
                        .done_elapsed()
                        .is_some_and(|elapsed| elapsed > self.output_lifetime)
                {
                    expired.push(*id);
                }
            }
        }
        if expired.is_empty() {
            return expired;
        }

        let mut sessions = self.sessions.write().await;
        for id in &expired {
            sessions.remove(id);
            remove_artifact(&self.scratch_dir.join(format!("{id}.html")));
            remove_artifact(&self.scratch_dir.join(format!("{id}.png")));
            info!(session_id = id, "session reaped");
        }
        expired
    }
}

/// Best-effort artifact removal; a missing file is not an error.
fn remove_artifact(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(scratch: &Path, lifetime: Duration) -> SessionRegistry {
        SessionRegistry::new(
            "/bin/sh".to_string(),
            scratch.to_path_buf(),
            Duration::from_secs(100),
            lifetime,
            80,
            24,
        )
    }

    async fn wait_done(session: &Arc<Mutex<ShellSession>>) {
        for _ in 0..1000 {
            {
                let mut session = session.lock().await;
                session.drain_once();
                if session.state() == SessionState::Done {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session did not finish in time");
    }

    #[tokio::test]
    async fn get_returns_registered_sessions_and_misses_unknown_ids() {
        let scratch = tempfile::tempdir().unwrap();
        let registry = registry(scratch.path(), Duration::from_secs(60));
        let session = registry.create("sleep 30", 1).await.unwrap();
        let id = session.lock().await.id();

        assert!(registry.get(id).await.is_some());
        assert!(registry.get(id.wrapping_add(99999)).await.is_none());

        session.lock().await.terminate();
    }

    #[tokio::test]
    async fn reap_removes_expired_sessions_and_artifacts() {
        let scratch = tempfile::tempdir().unwrap();
        let registry = registry(scratch.path(), Duration::ZERO);
        let session = registry.create("true", 1).await.unwrap();
        let id = session.lock().await.id();
        wait_done(&session).await;

        let html = scratch.path().join(format!("{id}.html"));
        let png = scratch.path().join(format!("{id}.png"));
        std::fs::write(&html, "snapshot").unwrap();
        std::fs::write(&png, "image").unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let removed = registry.reap_once().await;
        assert_eq!(removed, vec![id]);
        assert_eq!(registry.count().await, 0);
        assert!(!html.exists());
        assert!(!png.exists());
    }

    #[tokio::test]
    async fn reap_keeps_sessions_inside_the_grace_period() {
        let scratch = tempfile::tempdir().unwrap();
        let registry = registry(scratch.path(), Duration::from_secs(3600));
        let session = registry.create("true", 1).await.unwrap();
        wait_done(&session).await;

        assert!(registry.reap_once().await.is_empty());
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn reap_ignores_running_sessions() {
        let scratch = tempfile::tempdir().unwrap();
        let registry = registry(scratch.path(), Duration::ZERO);
        let session = registry.create("sleep 30", 1).await.unwrap();

        assert!(registry.reap_once().await.is_empty());
        assert_eq!(registry.count().await, 1);

        session.lock().await.terminate();
    }

    #[tokio::test]
    async fn missing_artifacts_do_not_fail_the_reap() {
        let scratch = tempfile::tempdir().unwrap();
        let registry = registry(scratch.path(), Duration::ZERO);
        let session = registry.create("true", 1).await.unwrap();
        let id = session.lock().await.id();
        wait_done(&session).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        // no artifacts were ever written for this session
        assert_eq!(registry.reap_once().await, vec![id]);
    }
}
