use htmlsnap::message::Outbound;
use htmlsnap::service::{ServiceConfig, SnapshotService};
use htmlsnap::EngineConfig;
use serde_json::json;

const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Visual Test Page</title></head>
<body>
<h1>Hello Visual</h1>
<p>This is a visual integration test.</p>
</body>
</html>"#;

#[tokio::test]
async fn visual_integration_screenshot() {
    let engine = htmlsnap::new_engine(EngineConfig::default()).expect("Failed to create engine");
    let mut svc = SnapshotService::new(engine, ServiceConfig::default());

    let reply = svc.handle(&json!({"html": PAGE, "width": 256, "height": 128})).await;
    let Outbound::Image(result) = reply else {
        panic!("render failed: {:?}", reply);
    };
    let png_data = result.png_bytes().expect("base64");

    // Basic sanity checks
    assert!(png_data.len() > 100, "PNG data seems too small");
    assert_eq!(&png_data[0..8], b"\x89PNG\r\n\x1a\n");

    let img = image::load_from_memory(&png_data).expect("decode").to_rgba8();
    assert_eq!(img.dimensions(), (256, 128));

    // Look for a black pixel (text) and white pixel (background)
    let found_black = img.pixels().any(|p| p.0 == [0, 0, 0, 255]);
    let found_white = img.pixels().any(|p| p.0 == [255, 255, 255, 255]);
    assert!(found_black, "Expected rendered text pixels (black) in PNG");
    assert!(found_white, "Expected white background pixels in PNG");

    svc.into_engine().close().ok();
}

#[tokio::test]
async fn narrow_viewport_wraps_text_instead_of_widening() {
    let engine = htmlsnap::new_engine(EngineConfig::default()).expect("Failed to create engine");
    let mut svc = SnapshotService::new(engine, ServiceConfig::default());

    let reply = svc.handle(&json!({"html": "<p style='margin:0'>one two three four</p>", "width": 60, "height": 64})).await;
    let Outbound::Image(result) = reply else {
        panic!("render failed: {:?}", reply);
    };
    let img = image::load_from_memory(&result.png_bytes().unwrap()).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (60, 64));

    // "one two" does not fit in 60px at 12px per glyph, so the second word
    // starts a new 16px line
    let row_has_ink = |y: u32| (0..60).any(|x| img.get_pixel(x, y).0 != [255, 255, 255, 255]);
    assert!(row_has_ink(8));
    assert!(row_has_ink(24));
    assert!(row_has_ink(40));
    assert!(row_has_ink(56));
}
