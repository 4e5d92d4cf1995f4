use criterion::{criterion_group, criterion_main, Criterion};
use htmlsnap::message::{RenderJob, SizeRequest};
use htmlsnap::rendering::Screenshot;
use htmlsnap::service::{ServiceConfig, SnapshotService};
use htmlsnap::{EngineConfig, RenderEngine, Viewport};

const PAGE: &str = r#"<html><head><title>Bench</title>
<style>.row { padding: 2px; border: 1px solid #336699; background: #eef2f8 }</style>
</head><body>
<h1>Snapshot bench</h1>
<div class="row">alpha beta gamma delta epsilon</div>
<div class="row">zeta eta theta iota kappa lambda</div>
<p>The quick brown fox jumps over the lazy dog.</p>
</body></html>"#;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime")
}

fn bench_load_and_layout(c: &mut Criterion) {
    let rt = runtime();
    let mut engine = htmlsnap::new_engine(EngineConfig::default()).expect("failed to create engine");

    c.bench_function("load_and_layout", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine.load(PAGE).unwrap().wait().await.unwrap();
            });
            engine.natural_content_size().unwrap()
        })
    });
}

fn bench_paint_and_encode(c: &mut Criterion) {
    let rt = runtime();
    let mut engine = htmlsnap::new_engine(EngineConfig::default()).expect("failed to create engine");
    rt.block_on(async { engine.load(PAGE).unwrap().wait().await.unwrap() });
    engine.set_output_size(Viewport { width: 400, height: 200 }).unwrap();

    c.bench_function("paint_400x200", |b| b.iter(|| engine.paint().unwrap()));

    let frame = engine.paint().unwrap();
    c.bench_function("encode_png_400x200", |b| b.iter(|| Screenshot::encode(&frame).unwrap()));
}

fn bench_full_job(c: &mut Criterion) {
    let rt = runtime();
    let engine = htmlsnap::new_engine(EngineConfig::default()).expect("failed to create engine");
    let mut service = SnapshotService::new(engine, ServiceConfig::default());
    let auto = RenderJob::new(PAGE, SizeRequest::auto());
    let fixed = RenderJob::new(PAGE, SizeRequest { width: Some(320), height: Some(240) });

    c.bench_function("render_job_auto_size", |b| {
        b.iter(|| rt.block_on(service.render(&auto)).unwrap())
    });
    c.bench_function("render_job_fixed_size", |b| {
        b.iter(|| rt.block_on(service.render(&fixed)).unwrap())
    });
}

criterion_group!(benches, bench_load_and_layout, bench_paint_and_encode, bench_full_job);
criterion_main!(benches);
