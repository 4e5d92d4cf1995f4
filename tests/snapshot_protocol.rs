//! End-to-end job handling against the real engine

use htmlsnap::message::Outbound;
use htmlsnap::service::{ServiceConfig, SnapshotService, ServiceState};
use htmlsnap::{EngineConfig, ErrorKind, HtmlEngine, RenderEngine};
use image::RgbaImage;
use serde_json::{json, Value};

fn service() -> SnapshotService<HtmlEngine> {
    let engine = htmlsnap::new_engine(EngineConfig::default()).expect("Failed to create engine");
    SnapshotService::new(engine, ServiceConfig::default())
}

fn decode(reply: &Outbound) -> RgbaImage {
    match reply {
        Outbound::Image(result) => {
            let png = result.png_bytes().expect("image is not base64");
            assert_eq!(&png[0..8], b"\x89PNG\r\n\x1a\n");
            image::load_from_memory(&png).expect("decode png").to_rgba8()
        }
        Outbound::Failure(f) => panic!("expected an image, got {:?}", f.error),
    }
}

fn kind(reply: &Outbound) -> ErrorKind {
    match reply {
        Outbound::Failure(f) => f.error.kind,
        Outbound::Image(_) => panic!("expected a failure"),
    }
}

async fn snap(svc: &mut SnapshotService<HtmlEngine>, job: Value) -> Outbound {
    svc.handle(&job).await
}

#[tokio::test]
async fn fixed_block_autosizes_to_its_box() {
    let mut svc = service();
    let reply = snap(&mut svc, json!({"html": "<div style='width:50px;height:20px'></div>"})).await;
    assert_eq!(decode(&reply).dimensions(), (50, 20));
}

#[tokio::test]
async fn explicit_size_wins_over_content() {
    let mut svc = service();
    let reply = snap(&mut svc, json!({"html": "<div>x</div>", "width": 10, "height": 10})).await;
    assert_eq!(decode(&reply).dimensions(), (10, 10));

    let reply = snap(&mut svc, json!({"html": "<div style='width:500px;height:500px'></div>", "width": 3, "height": 2})).await;
    assert_eq!(decode(&reply).dimensions(), (3, 2));
}

#[tokio::test]
async fn width_only_keeps_natural_height() {
    let mut svc = service();
    let reply = snap(&mut svc, json!({"html": "<div style='width:50px;height:20px'></div>", "width": 10})).await;
    assert_eq!(decode(&reply).dimensions(), (10, 20));
}

#[tokio::test]
async fn unparsable_size_still_renders() {
    let mut svc = service();
    let reply = snap(
        &mut svc,
        json!({"html": "<div style='width:50px;height:20px'></div>", "width": "abc", "height": 5}),
    )
    .await;
    assert_eq!(decode(&reply).dimensions(), (50, 20));
}

#[tokio::test]
async fn missing_html_is_rejected_without_residue() {
    let mut svc = service();
    let first = snap(&mut svc, json!({"html": "<div style='width:7px;height:7px'></div>"})).await;
    assert_eq!(decode(&first).dimensions(), (7, 7));

    let bad = snap(&mut svc, json!({"width": 10, "height": 10})).await;
    assert_eq!(kind(&bad), ErrorKind::InvalidJob);
    assert_eq!(svc.state(), ServiceState::Idle);
    // the engine still holds the previous document untouched
    assert_eq!(svc.engine().natural_content_size().unwrap().width, 7);

    let next = snap(&mut svc, json!({"html": "<div style='width:4px;height:9px'></div>"})).await;
    assert_eq!(decode(&next).dimensions(), (4, 9));
}

#[tokio::test]
async fn empty_document_is_degenerate() {
    let mut svc = service();
    let reply = snap(&mut svc, json!({"html": ""})).await;
    assert_eq!(kind(&reply), ErrorKind::DegenerateViewport);

    let reply = snap(&mut svc, json!({"html": "<div>ok</div>"})).await;
    assert!(reply.is_success());
}

#[tokio::test]
async fn pixels_follow_styles() {
    let mut svc = service();
    let html = "<div style='width:4px;height:4px;background:#ff0000'></div><div style='width:4px;height:4px;background:rgba(0,0,255,1)'></div>";
    let img = decode(&snap(&mut svc, json!({"html": html, "width": 6})).await);
    assert_eq!(img.dimensions(), (6, 8));
    assert_eq!(img.get_pixel(1, 1).0, [255, 0, 0, 255]);
    assert_eq!(img.get_pixel(1, 6).0, [0, 0, 255, 255]);
    assert_eq!(img.get_pixel(5, 1).0, [255, 255, 255, 255]);
}

#[tokio::test]
async fn repainting_encodes_identically() {
    let mut engine = htmlsnap::new_engine(EngineConfig::default()).unwrap();
    engine.load("<p style='color:navy'>same bytes</p>").unwrap().wait().await.unwrap();
    let size = engine.natural_content_size().unwrap();
    engine.set_output_size(size).unwrap();

    let first = htmlsnap::rendering::Screenshot::encode(&engine.paint().unwrap()).unwrap();
    let second = htmlsnap::rendering::Screenshot::encode(&engine.paint().unwrap()).unwrap();
    assert_eq!(first.png_data, second.png_data);
    assert_eq!((first.width, first.height), (size.width, size.height));
    engine.close().unwrap();
}

#[tokio::test]
async fn script_toggle_is_fixed_per_engine() {
    let html = "<script>document.write(\"<div style='width:12px;height:12px'></div>\")</script><div style='width:2px;height:2px'></div>";

    let mut with_js = service();
    let img = decode(&snap(&mut with_js, json!({"html": html})).await);
    if cfg!(feature = "scripting") {
        assert_eq!(img.dimensions(), (12, 14));
    } else {
        assert_eq!(img.dimensions(), (2, 2));
    }

    let engine = htmlsnap::new_engine(EngineConfig { enable_javascript: false, ..Default::default() }).unwrap();
    let mut without_js = SnapshotService::new(engine, ServiceConfig::default());
    let img = decode(&snap(&mut without_js, json!({"html": html})).await);
    assert_eq!(img.dimensions(), (2, 2));
}

#[tokio::test]
async fn explicit_size_above_limit_is_refused() {
    let mut svc = service();
    let html = "<div style='width:50px;height:20px'></div>";
    let reply = snap(&mut svc, json!({"html": html, "width": 20000, "height": 10})).await;
    assert_eq!(kind(&reply), ErrorKind::ViewportTooLarge);

    let reply = snap(&mut svc, json!({"html": html, "width": 16384, "height": 1})).await;
    assert_eq!(decode(&reply).dimensions(), (16384, 1));
}

#[tokio::test]
async fn very_tall_content_under_a_small_explicit_size() {
    let mut svc = service();
    let html = "<div style='height:1048576px;border:1px solid red'></div>".repeat(2100);
    let img = decode(&snap(&mut svc, json!({"html": html, "width": 10, "height": 10})).await);
    assert_eq!(img.dimensions(), (10, 10));
    // top border of the first block
    assert_eq!(img.get_pixel(5, 0).0, [255, 0, 0, 255]);

    // auto height is far beyond the limit
    let reply = snap(&mut svc, json!({"html": "<div style='height:1048576px'></div>".repeat(2100), "width": 10})).await;
    assert_eq!(kind(&reply), ErrorKind::ViewportTooLarge);
}

#[tokio::test]
async fn deeply_nested_markup_renders() {
    let mut svc = service();
    let depth = 200_000;
    let html = format!("{}x{}", "<span>".repeat(depth), "</span>".repeat(depth));
    let img = decode(&snap(&mut svc, json!({"html": html})).await);
    assert_eq!(img.dimensions(), (12, 16));

    let html = format!("{}x{}", "<div>".repeat(20_000), "</div>".repeat(20_000));
    let img = decode(&snap(&mut svc, json!({"html": html, "width": 20, "height": 20})).await);
    assert_eq!(img.dimensions(), (20, 20));
}
