//! Abstract screen renderer trait.
//!
//! A renderer turns a session's accumulated output into a
//! viewer-appropriate snapshot: plain text, optionally with a richer
//! capture such as a terminal screenshot. Failures are surfaced as errors
//! so the caller can degrade to the raw buffered text with no image.

use crate::error::ChatshResult;
use crate::event::SessionId;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

/// A snapshot produced by a renderer.
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    /// Plain-text extraction of the session output.
    pub text: String,
    /// Optional richer capture on disk (e.g. a screenshot).
    pub image: Option<PathBuf>,
}

/// Renders a session's accumulated output into a viewer snapshot.
pub trait ScreenRenderer: Send + Sync {
    fn render<'a>(
        &'a self,
        output: &'a str,
        id: SessionId,
    ) -> Pin<Box<dyn Future<Output = ChatshResult<Rendered>> + Send + 'a>>;
}
