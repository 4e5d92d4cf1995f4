//! htmlsnap
//!
//! Renders HTML documents to PNG snapshots. A caller submits a job (markup
//! plus an optional output size) over a message channel; the service lays the
//! document out off-screen, rasterizes it and replies with the PNG encoded as
//! base64.
//!
//! # Architecture
//!
//! - **Render engine** ([`RenderEngine`], [`HtmlEngine`]): owns the single
//!   document session. `load` is non-blocking and reports layout completion
//!   through a one-shot [`LayoutSignal`].
//! - **Snapshot service** ([`service::SnapshotService`]): parses jobs,
//!   resolves the viewport, drives the engine and emits exactly one outbound
//!   record per job.
//! - **Transport** ([`transport`]): JSON-lines framing between byte streams
//!   and the service's typed channels.
//!
//! # Example
//!
//! ```no_run
//! use htmlsnap::message::Outbound;
//! use htmlsnap::service::{ServiceConfig, SnapshotService};
//! use htmlsnap::EngineConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = htmlsnap::new_engine(EngineConfig::default())?;
//! let mut service = SnapshotService::new(engine, ServiceConfig::default());
//!
//! let job = serde_json::json!({ "html": "<div>x</div>", "width": 10, "height": 10 });
//! match service.handle(&job).await {
//!     Outbound::Image(result) => println!("{} base64 chars", result.image.len()),
//!     Outbound::Failure(failure) => eprintln!("{}", failure.error.message),
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, ErrorKind, Result};

pub mod engine;
pub use engine::{HtmlEngine, LayoutNotifier, LayoutSignal};

pub mod message;
pub mod rendering;
pub mod script;
pub mod service;
pub mod transport;

use image::RgbaImage;

/// Configuration for the render engine
///
/// Fixed for the engine's lifetime. Script execution in particular cannot be
/// toggled per job.
///
/// # Examples
///
/// ```
/// let cfg = htmlsnap::EngineConfig::default();
/// assert!(cfg.enable_javascript);
/// assert_eq!(cfg.default_font_size, 16);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whether inline scripts run before layout
    pub enable_javascript: bool,
    /// Maximum loop iterations before Boa throws an error (0 => disabled)
    pub script_loop_iteration_limit: u64,
    /// Maximum recursion depth before Boa throws (usize::MAX => disabled)
    pub script_recursion_limit: usize,
    /// Font size in px for text with no `font-size` set
    pub default_font_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_javascript: true,
            script_loop_iteration_limit: 1_000_000,
            script_recursion_limit: 1024,
            default_font_size: rendering::style::DEFAULT_FONT_SIZE,
        }
    }
}

/// Viewport dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Contract between the snapshot service and a layout/paint backend
///
/// One document is live at a time. Callers must wait on the signal returned
/// by `load` before querying size or painting; until then those calls fail
/// with [`Error::LayoutPending`].
pub trait RenderEngine {
    /// Replace the current document. Layout runs asynchronously; the
    /// returned signal fires exactly once when it has completed. Malformed
    /// markup is laid out best-effort and never fails the load.
    fn load(&mut self, html: &str) -> Result<LayoutSignal>;

    /// Intrinsic size of the laid out content
    fn natural_content_size(&self) -> Result<Viewport>;

    /// Fix the viewport used by `paint`
    fn set_output_size(&mut self, size: Viewport) -> Result<()>;

    /// Rasterize the current layout at the output size (the natural size if
    /// none was set). Repeated calls without a new `load` return equal buffers.
    fn paint(&self) -> Result<RgbaImage>;
}

/// Create the default render engine
pub fn new_engine(config: EngineConfig) -> Result<HtmlEngine> {
    HtmlEngine::new(config)
}
