//! Engine configuration: TOML file + CLI overrides.

use crate::scheduler::PushTiming;
use chatsh_core::{ChatshError, ChatshResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub render: RenderSection,
}

/// `[engine]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,
    /// Output-ingestion tick in milliseconds.
    #[serde(default = "default_drain_tick_ms")]
    pub drain_tick_ms: u64,
    /// Steady-state push cycle in seconds of run time.
    #[serde(default = "default_push_cycle_secs")]
    pub push_cycle_secs: u64,
    /// Delay before the first push after spawn, in milliseconds.
    #[serde(default = "default_first_push_delay_ms")]
    pub first_push_delay_ms: u64,
    /// Minimum spacing between push attempts, in milliseconds.
    #[serde(default = "default_min_push_spacing_ms")]
    pub min_push_spacing_ms: u64,
    /// Minimum gap since the last update before interactive typing
    /// triggers an immediate push, in seconds.
    #[serde(default = "default_echo_gap_secs")]
    pub echo_gap_secs: u64,
    /// Reaper pass interval in seconds.
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
    /// How long a finished session's output stays available, in seconds.
    #[serde(default = "default_output_lifetime_secs")]
    pub output_lifetime_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            scratch_dir: default_scratch_dir(),
            drain_tick_ms: default_drain_tick_ms(),
            push_cycle_secs: default_push_cycle_secs(),
            first_push_delay_ms: default_first_push_delay_ms(),
            min_push_spacing_ms: default_min_push_spacing_ms(),
            echo_gap_secs: default_echo_gap_secs(),
            reap_interval_secs: default_reap_interval_secs(),
            output_lifetime_secs: default_output_lifetime_secs(),
        }
    }
}

/// `[render]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default = "default_scrollback")]
    pub scrollback: usize,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            cols: default_cols(),
            rows: default_rows(),
            scrollback: default_scrollback(),
        }
    }
}

fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}
fn default_scratch_dir() -> String {
    "~/.cache/chatsh".to_string()
}
fn default_drain_tick_ms() -> u64 {
    100
}
fn default_push_cycle_secs() -> u64 {
    4
}
fn default_first_push_delay_ms() -> u64 {
    500
}
fn default_min_push_spacing_ms() -> u64 {
    1100
}
fn default_echo_gap_secs() -> u64 {
    2
}
fn default_reap_interval_secs() -> u64 {
    100
}
fn default_output_lifetime_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}
fn default_cols() -> u16 {
    80
}
fn default_rows() -> u16 {
    24
}
fn default_scrollback() -> usize {
    1000
}

/// Resolved configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub shell: String,
    pub scratch_dir: PathBuf,
    pub drain_tick: Duration,
    pub push_cycle_secs: u64,
    pub first_push_delay: Duration,
    pub min_push_spacing: Duration,
    pub echo_gap: Duration,
    pub reap_interval: Duration,
    pub output_lifetime: Duration,
    pub render_enabled: bool,
    pub render_cols: u16,
    pub render_rows: u16,
    pub render_scrollback: usize,
}

impl ServerConfig {
    /// Load config from a TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_shell: Option<&str>,
        cli_scratch_dir: Option<&str>,
        cli_no_render: bool,
        cli_output_lifetime: Option<u64>,
    ) -> ChatshResult<Self> {
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| ChatshError::Config(format!("config parse error: {e}")))?
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
        } else {
            ConfigFile::default()
        };

        let engine = file_config.engine;
        let render = file_config.render;

        let shell = cli_shell.map(str::to_string).unwrap_or(engine.shell);
        let scratch_dir = cli_scratch_dir
            .map(str::to_string)
            .unwrap_or(engine.scratch_dir);
        let output_lifetime = cli_output_lifetime.unwrap_or(engine.output_lifetime_secs);

        Ok(Self {
            shell,
            scratch_dir: expand_tilde_str(&scratch_dir),
            drain_tick: Duration::from_millis(engine.drain_tick_ms.max(1)),
            push_cycle_secs: engine.push_cycle_secs.max(1),
            first_push_delay: Duration::from_millis(engine.first_push_delay_ms),
            min_push_spacing: Duration::from_millis(engine.min_push_spacing_ms),
            echo_gap: Duration::from_secs(engine.echo_gap_secs),
            reap_interval: Duration::from_secs(engine.reap_interval_secs.max(1)),
            output_lifetime: Duration::from_secs(output_lifetime),
            render_enabled: render.enabled && !cli_no_render,
            render_cols: render.cols,
            render_rows: render.rows,
            render_scrollback: render.scrollback,
        })
    }

    /// Scheduler cadence derived from the engine section.
    pub fn push_timing(&self) -> PushTiming {
        PushTiming {
            drain_tick: self.drain_tick,
            push_cycle_secs: self.push_cycle_secs,
            first_push_delay: self.first_push_delay,
            min_push_spacing: self.min_push_spacing,
        }
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_config_file() {
        let config = ServerConfig::load(None, None, None, false, None).unwrap();
        assert_eq!(config.drain_tick, Duration::from_millis(100));
        assert_eq!(config.push_cycle_secs, 4);
        assert_eq!(config.first_push_delay, Duration::from_millis(500));
        assert_eq!(config.min_push_spacing, Duration::from_millis(1100));
        assert_eq!(config.reap_interval, Duration::from_secs(100));
        assert_eq!(config.output_lifetime, Duration::from_secs(60));
        assert!(config.render_enabled);
    }

    #[test]
    fn file_values_and_cli_overrides_are_merged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[engine]
shell = "/bin/bash"
output_lifetime_secs = 120

[render]
enabled = true
rows = 50
"#,
        )
        .unwrap();

        let config =
            ServerConfig::load(Some(&path), None, Some("/tmp/scratch"), true, Some(90)).unwrap();
        assert_eq!(config.shell, "/bin/bash");
        assert_eq!(config.scratch_dir, PathBuf::from("/tmp/scratch"));
        // CLI wins over the file
        assert_eq!(config.output_lifetime, Duration::from_secs(90));
        assert!(!config.render_enabled);
        assert_eq!(config.render_rows, 50);
    }

    #[test]
    fn malformed_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine]\ndrain_tick_ms = \"fast\"\n").unwrap();
        assert!(ServerConfig::load(Some(&path), None, None, false, None).is_err());
    }

    #[test]
    fn tilde_paths_expand_to_home() {
        let expanded = expand_tilde_str("~/.cache/chatsh");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join(".cache/chatsh"));
        }
    }
}
