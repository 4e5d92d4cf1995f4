//! Snapshot service: the per-job state machine
//!
//! Jobs move through `Idle -> AwaitingLayout -> Resolving -> Rasterizing ->
//! Responding -> Idle`. One job is in flight at a time. `run` drains a queue
//! of inbound records strictly in order, so a message that arrives while a
//! job is running simply waits in the channel.

use crate::message::{Outbound, ParsedJob, RenderJob, RenderResult, SizeRequest};
use crate::rendering::Screenshot;
use crate::{Error, RenderEngine, Result, Viewport};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

/// Largest width or height accepted by default
pub const DEFAULT_MAX_DIMENSION: u32 = 16384;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Upper bound on waiting for layout; `None` waits indefinitely
    pub layout_timeout: Option<Duration>,
    /// Largest width or height, requested or natural
    pub max_dimension: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            layout_timeout: None,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    AwaitingLayout,
    Resolving,
    Rasterizing,
    Responding,
}

pub struct SnapshotService<E> {
    engine: E,
    config: ServiceConfig,
    state: ServiceState,
    served: u64,
}

impl<E: RenderEngine> SnapshotService<E> {
    pub fn new(engine: E, config: ServiceConfig) -> Self {
        Self {
            engine,
            config,
            state: ServiceState::Idle,
            served: 0,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Jobs handled so far, including rejected ones
    pub fn served(&self) -> u64 {
        self.served
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    /// Process one inbound record and produce its single reply
    pub async fn handle(&mut self, message: &Value) -> Outbound {
        self.served += 1;
        let ParsedJob { job, size_error } = match RenderJob::from_message(message) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("job #{} rejected: {}", self.served, e);
                return Outbound::failure(&e);
            }
        };

        match size_error {
            Some(e) => log::warn!("job #{}: {}; using content size", self.served, e),
            None if job.size.is_auto() => log::debug!("job #{}: no size specified, using content size", self.served),
            None => {}
        }

        match self.render(&job).await {
            Ok(shot) => {
                log::info!("job #{} rendered {}x{} ({} bytes)", self.served, shot.width, shot.height, shot.png_data.len());
                Outbound::Image(RenderResult::from_screenshot(&shot))
            }
            Err(e) => {
                log::error!("job #{} failed: {}", self.served, e);
                Outbound::failure(&e)
            }
        }
    }

    /// Run a validated job through the engine. Always ends back in `Idle`.
    pub async fn render(&mut self, job: &RenderJob) -> Result<Screenshot> {
        let result = self.render_job(job).await;
        self.transition(ServiceState::Idle);
        result
    }

    async fn render_job(&mut self, job: &RenderJob) -> Result<Screenshot> {
        self.transition(ServiceState::AwaitingLayout);
        let signal = self.engine.load(&job.html)?;
        match self.config.layout_timeout {
            Some(limit) => tokio::time::timeout(limit, signal.wait())
                .await
                .map_err(|_| Error::Timeout(limit.as_millis() as u64))??,
            None => signal.wait().await?,
        }

        self.transition(ServiceState::Resolving);
        let size = self.resolve_size(job.size)?;

        self.transition(ServiceState::Rasterizing);
        self.engine.set_output_size(size)?;
        let pixels = self.engine.paint()?;

        self.transition(ServiceState::Responding);
        Screenshot::encode(&pixels)
    }

    /// Explicit axes win; the engine is only asked for the natural size when
    /// at least one axis is auto.
    fn resolve_size(&self, request: SizeRequest) -> Result<Viewport> {
        let size = match (request.width, request.height) {
            (Some(width), Some(height)) => Viewport { width, height },
            (w, h) => {
                let natural = self.engine.natural_content_size()?;
                log::debug!("natural content size {}", natural);
                Viewport {
                    width: w.unwrap_or(natural.width),
                    height: h.unwrap_or(natural.height),
                }
            }
        };

        if size.width == 0 || size.height == 0 {
            return Err(Error::DegenerateViewport { width: size.width, height: size.height });
        }
        let max = self.config.max_dimension;
        if size.width > max || size.height > max {
            return Err(Error::ViewportTooLarge { width: size.width, height: size.height, max });
        }
        log::debug!("resolved viewport {}", size);
        Ok(size)
    }

    fn transition(&mut self, next: ServiceState) {
        if self.state != next {
            log::trace!("{:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Serve jobs until the inbound channel closes. A closed outbound
    /// channel means the transport is gone and ends the loop with an error.
    pub async fn run(&mut self, mut inbound: mpsc::Receiver<Value>, outbound: mpsc::Sender<Outbound>) -> Result<()> {
        while let Some(message) = inbound.recv().await {
            let reply = self.handle(&message).await;
            outbound.send(reply).await.map_err(|_| {
                Error::TransportError(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "outbound channel closed"))
            })?;
        }
        log::info!("inbound channel closed after {} jobs", self.served);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, LayoutNotifier, LayoutSignal};
    use image::RgbaImage;
    use serde_json::json;
    use std::cell::Cell;

    #[derive(Default)]
    struct StubEngine {
        natural: Option<Viewport>,
        hang: bool,
        loads: usize,
        natural_queries: Cell<usize>,
        output: Option<Viewport>,
        pending: Vec<LayoutNotifier>,
    }

    impl StubEngine {
        fn with_natural(width: u32, height: u32) -> Self {
            Self { natural: Some(Viewport { width, height }), ..Default::default() }
        }
    }

    impl RenderEngine for StubEngine {
        fn load(&mut self, _html: &str) -> Result<LayoutSignal> {
            self.loads += 1;
            self.output = None;
            if self.hang {
                let (notifier, signal) = LayoutSignal::pair();
                self.pending.push(notifier);
                return Ok(signal);
            }
            Ok(LayoutSignal::ready(Ok(())))
        }

        fn natural_content_size(&self) -> Result<Viewport> {
            self.natural_queries.set(self.natural_queries.get() + 1);
            self.natural.ok_or(Error::LayoutPending)
        }

        fn set_output_size(&mut self, size: Viewport) -> Result<()> {
            self.output = Some(size);
            Ok(())
        }

        fn paint(&self) -> Result<RgbaImage> {
            let size = self.output.ok_or(Error::LayoutPending)?;
            Ok(RgbaImage::new(size.width, size.height))
        }
    }

    fn decoded_size(reply: &Outbound) -> (u32, u32) {
        match reply {
            Outbound::Image(result) => {
                let png = result.png_bytes().expect("base64");
                let img = image::load_from_memory(&png).expect("png");
                (img.width(), img.height())
            }
            Outbound::Failure(f) => panic!("unexpected failure: {:?}", f),
        }
    }

    fn failure_kind(reply: &Outbound) -> ErrorKind {
        match reply {
            Outbound::Failure(f) => f.error.kind,
            Outbound::Image(_) => panic!("expected a failure"),
        }
    }

    #[tokio::test]
    async fn explicit_size_skips_natural_query() {
        let mut svc = SnapshotService::new(StubEngine::with_natural(50, 20), ServiceConfig::default());
        let reply = svc.handle(&json!({"html": "<div>x</div>", "width": 10, "height": 10})).await;
        assert_eq!(decoded_size(&reply), (10, 10));
        assert_eq!(svc.engine().natural_queries.get(), 0);
        assert_eq!(svc.state(), ServiceState::Idle);
    }

    #[tokio::test]
    async fn auto_and_mixed_axes_use_natural_size() {
        let mut svc = SnapshotService::new(StubEngine::with_natural(50, 20), ServiceConfig::default());
        assert_eq!(decoded_size(&svc.handle(&json!({"html": ""})).await), (50, 20));
        assert_eq!(decoded_size(&svc.handle(&json!({"html": "", "width": 7})).await), (7, 20));
        assert_eq!(decoded_size(&svc.handle(&json!({"html": "", "height": 3})).await), (50, 3));
    }

    #[tokio::test]
    async fn bad_size_recovers_to_auto() {
        let mut svc = SnapshotService::new(StubEngine::with_natural(4, 6), ServiceConfig::default());
        let reply = svc.handle(&json!({"html": "", "width": "abc", "height": 100})).await;
        assert_eq!(decoded_size(&reply), (4, 6));
    }

    #[tokio::test]
    async fn invalid_job_never_reaches_engine() {
        let mut svc = SnapshotService::new(StubEngine::with_natural(4, 6), ServiceConfig::default());
        let reply = svc.handle(&json!({"width": 5, "height": 5})).await;
        assert_eq!(failure_kind(&reply), ErrorKind::InvalidJob);
        assert_eq!(svc.engine().loads, 0);
        assert_eq!(svc.state(), ServiceState::Idle);
    }

    #[tokio::test]
    async fn empty_content_is_degenerate() {
        let mut svc = SnapshotService::new(StubEngine::with_natural(0, 0), ServiceConfig::default());
        let reply = svc.handle(&json!({"html": ""})).await;
        assert_eq!(failure_kind(&reply), ErrorKind::DegenerateViewport);
        // a fixed width does not rescue a zero natural height
        let reply = svc.handle(&json!({"html": "", "width": 9})).await;
        assert_eq!(failure_kind(&reply), ErrorKind::DegenerateViewport);
        assert_eq!(svc.state(), ServiceState::Idle);
    }

    #[tokio::test]
    async fn oversized_natural_size_is_rejected() {
        let config = ServiceConfig { max_dimension: 100, ..Default::default() };
        let mut svc = SnapshotService::new(StubEngine::with_natural(101, 5), config);
        let reply = svc.handle(&json!({"html": ""})).await;
        assert_eq!(failure_kind(&reply), ErrorKind::ViewportTooLarge);
    }

    #[tokio::test]
    async fn oversized_explicit_size_fails_instead_of_shrinking() {
        let mut svc = SnapshotService::new(StubEngine::with_natural(50, 20), ServiceConfig::default());
        let reply = svc.handle(&json!({"html": "", "width": 20000, "height": 10})).await;
        assert_eq!(failure_kind(&reply), ErrorKind::ViewportTooLarge);
        assert_eq!(svc.engine().natural_queries.get(), 0);

        let reply = svc.handle(&json!({"html": "", "height": "4294967296"})).await;
        assert_eq!(failure_kind(&reply), ErrorKind::ViewportTooLarge);
        assert_eq!(svc.state(), ServiceState::Idle);
    }

    #[tokio::test]
    async fn layout_timeout_fails_the_job() {
        let engine = StubEngine { hang: true, ..StubEngine::with_natural(1, 1) };
        let config = ServiceConfig { layout_timeout: Some(Duration::from_millis(20)), ..Default::default() };
        let mut svc = SnapshotService::new(engine, config);
        let reply = svc.handle(&json!({"html": ""})).await;
        assert_eq!(failure_kind(&reply), ErrorKind::EngineTimeout);
        assert_eq!(svc.state(), ServiceState::Idle);
    }

    #[tokio::test]
    async fn run_replies_in_order_and_stops_when_inbound_closes() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        in_tx.send(json!({"html": "", "width": 2, "height": 2})).await.unwrap();
        in_tx.send(json!("not a job")).await.unwrap();
        in_tx.send(json!({"html": "", "width": 3, "height": 1})).await.unwrap();
        drop(in_tx);

        let mut svc = SnapshotService::new(StubEngine::default(), ServiceConfig::default());
        svc.run(in_rx, out_tx).await.unwrap();

        assert_eq!(decoded_size(&out_rx.recv().await.unwrap()), (2, 2));
        assert_eq!(failure_kind(&out_rx.recv().await.unwrap()), ErrorKind::InvalidJob);
        assert_eq!(decoded_size(&out_rx.recv().await.unwrap()), (3, 1));
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_outbound_is_fatal() {
        let (in_tx, in_rx) = mpsc::channel(1);
        let (out_tx, out_rx) = mpsc::channel(1);
        drop(out_rx);
        in_tx.send(json!({"html": ""})).await.unwrap();
        let mut svc = SnapshotService::new(StubEngine::with_natural(1, 1), ServiceConfig::default());
        let err = svc.run(in_rx, out_tx).await.unwrap_err();
        assert!(matches!(err, Error::TransportError(_)));
    }
}
