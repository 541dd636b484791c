//! Snapshot pipeline.
//!
//! Turns a session's raw buffered output into the text (and optional
//! image) pushed outward, and writes the on-demand standalone HTML
//! terminal snapshot. Renderer failures degrade to the raw buffered text
//! with no image; they never propagate to the scheduler loop as anything
//! worse than a fallback.

use chatsh_core::{ChatshResult, Rendered, ScreenRenderer, SessionId};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct RenderPipeline {
    renderer: Option<Arc<dyn ScreenRenderer>>,
    /// Runtime toggle for the renderer (`/render_on`, `/render_off`).
    enabled: AtomicBool,
    scratch_dir: PathBuf,
}

impl RenderPipeline {
    pub fn new(
        renderer: Option<Arc<dyn ScreenRenderer>>,
        enabled: bool,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            renderer,
            enabled: AtomicBool::new(enabled),
            scratch_dir,
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Produce the outward snapshot for `output`.
    pub async fn snapshot(&self, output: &str, id: SessionId) -> Rendered {
        if self.enabled.load(Ordering::Relaxed) {
            if let Some(renderer) = self.renderer.as_ref() {
                match renderer.render(output, id).await {
                    Ok(rendered) => return rendered,
                    Err(e) => {
                        warn!(session_id = id, error = %e, "renderer failed, using raw output")
                    }
                }
            }
        }
        Rendered {
            text: output.to_string(),
            image: None,
        }
    }

    /// Write the standalone HTML terminal snapshot for a session and
    /// return its path. The file is keyed by session id and removed by the
    /// registry reaper.
    pub fn write_html(&self, id: SessionId, command: &str, output: &str) -> ChatshResult<PathBuf> {
        std::fs::create_dir_all(&self.scratch_dir)?;
        let path = self.scratch_dir.join(format!("{id}.html"));
        let title = format!("{id} - {command}");
        std::fs::write(&path, html_document(&title, output))?;
        debug!(session_id = id, path = %path.display(), "HTML snapshot written");
        Ok(path)
    }
}

/// Build a standalone xterm.js document that replays the captured output.
fn html_document(title: &str, output: &str) -> String {
    // a JSON string is a valid JS string literal, escaping included
    let payload = serde_json::to_string(output).unwrap_or_else(|_| "\"\"".to_string());
    let title = escape_html(title);
    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/xterm@5/css/xterm.css">
<script src="https://cdn.jsdelivr.net/npm/xterm@5/lib/xterm.js"></script>
<style>html, body {{ margin: 0; background: #000; }}</style>
</head>
<body>
<div id="terminal"></div>
<script>
const term = new Terminal({{ scrollback: 100000, convertEol: true }});
term.open(document.getElementById('terminal'));
term.write({payload});
</script>
</body>
</html>
"#
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Plain-text renderer backed by a terminal emulator.
///
/// Feeds the raw output through vt100 and extracts the rendered screen, so
/// escape sequences, carriage-return overwrites, and progress-bar redraws
/// collapse to what a viewer would actually see.
pub struct Vt100Renderer {
    cols: u16,
    rows: u16,
    scrollback: usize,
}

impl Vt100Renderer {
    pub fn new(cols: u16, rows: u16, scrollback: usize) -> Self {
        Self {
            cols,
            rows,
            scrollback,
        }
    }
}

impl ScreenRenderer for Vt100Renderer {
    fn render<'a>(
        &'a self,
        output: &'a str,
        _id: SessionId,
    ) -> Pin<Box<dyn Future<Output = ChatshResult<Rendered>> + Send + 'a>> {
        Box::pin(async move {
            let mut parser = vt100::Parser::new(self.rows, self.cols, self.scrollback);
            parser.process(output.as_bytes());
            Ok(Rendered {
                text: parser.screen().contents(),
                image: None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsh_core::ChatshError;

    struct FailingRenderer;

    impl ScreenRenderer for FailingRenderer {
        fn render<'a>(
            &'a self,
            _output: &'a str,
            _id: SessionId,
        ) -> Pin<Box<dyn Future<Output = ChatshResult<Rendered>> + Send + 'a>> {
            Box::pin(async { Err(ChatshError::Render("capture backend unavailable".into())) })
        }
    }

    #[tokio::test]
    async fn renderer_failure_degrades_to_raw_text() {
        let scratch = tempfile::tempdir().unwrap();
        let pipeline = RenderPipeline::new(
            Some(Arc::new(FailingRenderer)),
            true,
            scratch.path().to_path_buf(),
        );
        let rendered = pipeline.snapshot("raw output", 1).await;
        assert_eq!(rendered.text, "raw output");
        assert!(rendered.image.is_none());
    }

    #[tokio::test]
    async fn disabled_pipeline_skips_the_renderer() {
        let scratch = tempfile::tempdir().unwrap();
        let pipeline = RenderPipeline::new(
            Some(Arc::new(Vt100Renderer::new(80, 24, 1000))),
            false,
            scratch.path().to_path_buf(),
        );
        // vt100 would strip this escape sequence; disabled means raw
        let rendered = pipeline.snapshot("\x1b[31mred\x1b[0m", 1).await;
        assert_eq!(rendered.text, "\x1b[31mred\x1b[0m");
    }

    #[tokio::test]
    async fn vt100_renderer_strips_escape_sequences() {
        let renderer = Vt100Renderer::new(80, 24, 1000);
        let rendered = renderer.render("\x1b[31mred\x1b[0m plain", 1).await.unwrap();
        assert_eq!(rendered.text, "red plain");
    }

    #[tokio::test]
    async fn vt100_renderer_applies_carriage_return_overwrites() {
        let renderer = Vt100Renderer::new(80, 24, 1000);
        let rendered = renderer.render("10%\r20%\r30%", 1).await.unwrap();
        assert_eq!(rendered.text, "30%");
    }

    #[test]
    fn html_snapshot_embeds_the_output_safely() {
        let scratch = tempfile::tempdir().unwrap();
        let pipeline = RenderPipeline::new(None, false, scratch.path().to_path_buf());
        let path = pipeline
            .write_html(1234, "echo `hi` && ls", "line `one`\nline \"two\"")
            .unwrap();
        assert_eq!(path, scratch.path().join("1234.html"));
        let document = std::fs::read_to_string(&path).unwrap();
        assert!(document.contains("1234 - echo `hi` &amp;&amp; ls"));
        assert!(document.contains(r#""line `one`\nline \"two\"""#));
    }
}
