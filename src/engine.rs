//! HtmlEngine: pure-Rust render engine with an asynchronous layout pass.
//!
//! `load` hands the markup to a dedicated layout thread and returns at once.
//! The thread parses the document, runs inline scripts when enabled, builds
//! the box tree and lays it out at its natural width, then publishes the
//! result into the shared session and fires the load's `LayoutSignal`.
//! Size queries and painting read the session on the caller's thread.

use crate::rendering::layout::{build_box_tree, layout_document, BoxNode, DocumentLayout, LAYOUT_STACK_SIZE};
use crate::rendering::paint::build_display_list;
use crate::rendering::raster::rasterize;
use crate::{script, EngineConfig, Error, RenderEngine, Result, Viewport};
use image::RgbaImage;
use scraper::Html;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tokio::sync::oneshot;

/// Fires once when the layout started by a `load` call has completed
#[derive(Debug)]
pub struct LayoutSignal {
    rx: oneshot::Receiver<Result<()>>,
}

/// Sending half of a `LayoutSignal`
#[derive(Debug)]
pub struct LayoutNotifier {
    tx: oneshot::Sender<Result<()>>,
}

impl LayoutSignal {
    /// A connected notifier/signal pair for one load
    pub fn pair() -> (LayoutNotifier, LayoutSignal) {
        let (tx, rx) = oneshot::channel();
        (LayoutNotifier { tx }, LayoutSignal { rx })
    }

    /// A signal that has already fired, for engines that lay out synchronously
    pub fn ready(result: Result<()>) -> Self {
        let (notifier, signal) = Self::pair();
        notifier.complete(result);
        signal
    }

    /// Wait for layout to complete
    pub async fn wait(self) -> Result<()> {
        self.rx
            .await
            .map_err(|_| Error::EngineUnavailable("layout worker dropped the load".into()))?
    }
}

impl LayoutNotifier {
    /// Fire the signal with the outcome of the layout
    pub fn complete(self, result: Result<()>) {
        // The receiver may have given up (timeout); nothing to report then
        let _ = self.tx.send(result);
    }
}

/// Laid out state of the current document
struct Document {
    tree: BoxNode,
    natural: Viewport,
    layout: DocumentLayout,
    output: Option<Viewport>,
}

/// The single document/layout context owned by the engine
#[derive(Default)]
struct EngineSession {
    generation: u64,
    document: Option<Document>,
}

struct LayoutJob {
    generation: u64,
    html: String,
    notifier: LayoutNotifier,
}

/// Pure-Rust `RenderEngine` backed by a dedicated layout thread
pub struct HtmlEngine {
    config: EngineConfig,
    session: Arc<Mutex<EngineSession>>,
    job_tx: Option<Sender<LayoutJob>>,
    worker: Option<JoinHandle<()>>,
}

impl HtmlEngine {
    /// Start the layout worker. No document is loaded yet.
    pub fn new(config: EngineConfig) -> Result<Self> {
        if config.enable_javascript && !cfg!(feature = "scripting") {
            log::warn!("JavaScript requested but htmlsnap was built without the `scripting` feature; scripts will not run");
        }

        let session = Arc::new(Mutex::new(EngineSession::default()));
        let (job_tx, job_rx) = mpsc::channel::<LayoutJob>();
        let worker_session = Arc::clone(&session);
        let worker_config = config.clone();

        let worker = std::thread::Builder::new()
            .name("htmlsnap-layout".into())
            .stack_size(LAYOUT_STACK_SIZE)
            .spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    let document = match lay_out(&job.html, &worker_config) {
                        Ok(document) => document,
                        Err(e) => {
                            log::error!("layout for load #{} failed: {}", job.generation, e);
                            job.notifier.complete(Err(e));
                            continue;
                        }
                    };
                    match worker_session.lock() {
                        Ok(mut session) if session.generation == job.generation => {
                            session.document = Some(document);
                            drop(session);
                            job.notifier.complete(Ok(()));
                        }
                        Ok(_) => {
                            log::debug!("layout for load #{} superseded before completion", job.generation);
                            job.notifier.complete(Ok(()));
                        }
                        Err(_) => {
                            job.notifier.complete(Err(Error::EngineUnavailable("engine session poisoned".into())));
                        }
                    }
                }
            })
            .map_err(|e| Error::InitializationError(format!("Failed to spawn layout worker: {}", e)))?;

        Ok(Self {
            config,
            session,
            job_tx: Some(job_tx),
            worker: Some(worker),
        })
    }

    /// Configuration fixed at construction
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn session(&self) -> Result<MutexGuard<'_, EngineSession>> {
        self.session
            .lock()
            .map_err(|_| Error::EngineUnavailable("engine session poisoned".into()))
    }

    /// Stop the layout worker and wait for it to exit
    pub fn close(mut self) -> Result<()> {
        self.job_tx.take();
        if let Some(handle) = self.worker.take() {
            handle
                .join()
                .map_err(|_| Error::EngineUnavailable("layout worker panicked".into()))?;
        }
        Ok(())
    }
}

impl Drop for HtmlEngine {
    fn drop(&mut self) {
        // Closing the queue lets the worker finish on its own
        self.job_tx.take();
    }
}

fn lay_out(html: &str, config: &EngineConfig) -> Result<Document> {
    let mut document = Html::parse_document(html);

    if config.enable_javascript {
        let scripts = script::inline_scripts(&document);
        let output = script::run_inline_scripts(&scripts, config);
        if !output.written.is_empty() {
            // Markup after </html> is reparsed into the body
            document = Html::parse_document(&format!("{}{}", html, output.written));
        }
    }
    if !document.errors.is_empty() {
        log::debug!("recovered from {} HTML parse errors", document.errors.len());
    }

    let tree = build_box_tree(&document, config.default_font_size);
    let layout = layout_document(&tree, None)?;
    let (width, height) = layout.content_size();
    log::debug!("layout complete: natural content size {}x{}", width, height);

    Ok(Document {
        tree,
        natural: Viewport { width, height },
        layout,
        output: None,
    })
}

impl RenderEngine for HtmlEngine {
    fn load(&mut self, html: &str) -> Result<LayoutSignal> {
        let generation = {
            let mut session = self.session()?;
            session.generation += 1;
            session.document = None;
            session.generation
        };

        let (notifier, signal) = LayoutSignal::pair();
        let job = LayoutJob { generation, html: html.to_string(), notifier };
        self.job_tx
            .as_ref()
            .ok_or_else(|| Error::EngineUnavailable("engine closed".into()))?
            .send(job)
            .map_err(|_| Error::EngineUnavailable("layout worker exited".into()))?;
        Ok(signal)
    }

    fn natural_content_size(&self) -> Result<Viewport> {
        let session = self.session()?;
        session.document.as_ref().map(|d| d.natural).ok_or(Error::LayoutPending)
    }

    fn set_output_size(&mut self, size: Viewport) -> Result<()> {
        let mut session = self.session()?;
        let document = session.document.as_mut().ok_or(Error::LayoutPending)?;
        if document.layout.width != size.width {
            document.layout = layout_document(&document.tree, Some(size.width))?;
        }
        document.output = Some(size);
        Ok(())
    }

    fn paint(&self) -> Result<RgbaImage> {
        let session = self.session()?;
        let document = session.document.as_ref().ok_or(Error::LayoutPending)?;
        let size = document.output.unwrap_or(document.natural);
        let commands = build_display_list(&document.layout.nodes, size);
        rasterize(&commands, size.width, size.height)
    }
}
