/// Rasterizer: display list -> tiny-skia pixmap -> RGBA pixel buffer -> PNG

use crate::rendering::font;
use crate::rendering::paint::PaintCommand;
use crate::rendering::Screenshot;
use crate::{Error, Result};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Rect, Transform};

/// Canvas color under all content
pub const CANVAS: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Paint `commands` onto an opaque white `width` x `height` canvas.
/// Anything outside the canvas is clipped.
pub fn rasterize(commands: &[PaintCommand], width: u32, height: u32) -> Result<RgbaImage> {
    let mut pixmap = Pixmap::new(width, height).ok_or(Error::DegenerateViewport { width, height })?;
    let [r, g, b, a] = CANVAS.0;
    pixmap.fill(tiny_skia::Color::from_rgba8(r, g, b, a));

    for cmd in commands {
        match cmd {
            PaintCommand::SolidRect { x, y, width, height, rgba } => {
                let Some(rect) = clip_rect(&pixmap, *x as i64, *y as i64, *width as i64, *height as i64) else {
                    continue;
                };
                pixmap.fill_rect(rect, &solid(*rgba), Transform::identity(), None);
            }
            PaintCommand::Text { x, y, text, scale, rgba } => {
                draw_text(&mut pixmap, *x as i64, *y as i64, text, *scale, *rgba);
            }
        }
    }
    to_rgba_image(&pixmap)
}

fn solid((r, g, b, a): (u8, u8, u8, u8)) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = false;
    paint
}

/// Intersect a rect with the pixmap bounds in integer space
fn clip_rect(pixmap: &Pixmap, x: i64, y: i64, w: i64, h: i64) -> Option<Rect> {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = x.saturating_add(w).min(pixmap.width() as i64);
    let y1 = y.saturating_add(h).min(pixmap.height() as i64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Rect::from_ltrb(x0 as f32, y0 as f32, x1 as f32, y1 as f32)
}

/// Each lit glyph cell becomes a `scale` x `scale` square of one path
fn draw_text(pixmap: &mut Pixmap, x: i64, y: i64, text: &str, scale: u32, rgba: (u8, u8, u8, u8)) {
    let s = scale as i64;
    let advance = (font::CELL_WIDTH * scale) as i64;
    let mut path = PathBuilder::new();
    for (i, ch) in text.chars().enumerate() {
        let gx = x.saturating_add((i as i64).saturating_mul(advance));
        if gx >= pixmap.width() as i64 {
            break;
        }
        for (col, bits) in font::glyph(ch).iter().enumerate() {
            for row in 0..font::GLYPH_ROWS {
                if bits & (1 << row) == 0 {
                    continue;
                }
                let cell = clip_rect(pixmap, gx + col as i64 * s, y.saturating_add(row as i64 * s), s, s);
                if let Some(rect) = cell {
                    path.push_rect(rect);
                }
            }
        }
    }
    if let Some(path) = path.finish() {
        pixmap.fill_path(&path, &solid(rgba), FillRule::Winding, Transform::identity(), None);
    }
}

/// Unpremultiply into an `image` buffer
fn to_rgba_image(pixmap: &Pixmap) -> Result<RgbaImage> {
    let mut raw = Vec::with_capacity(pixmap.data().len());
    for px in pixmap.pixels() {
        let c = px.demultiply();
        raw.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), raw)
        .ok_or_else(|| Error::EncodingFailure("pixel buffer size mismatch".into()))
}

/// Encode a pixel buffer as PNG
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgba8)
        .map_err(|e| Error::EncodingFailure(e.to_string()))?;
    Ok(png)
}

impl Screenshot {
    /// Encode `img` into a screenshot of the same size
    pub fn encode(img: &RgbaImage) -> Result<Self> {
        Ok(Self {
            width: img.width(),
            height: img.height(),
            png_data: encode_png(img)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_canvas_is_white() {
        let img = rasterize(&[], 3, 2).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert!(img.pixels().all(|p| *p == CANVAS));
    }

    #[test]
    fn rects_clip_and_blend() {
        let cmds = vec![
            PaintCommand::SolidRect { x: -5, y: -5, width: 7, height: 7, rgba: (255, 0, 0, 255) },
            PaintCommand::SolidRect { x: 3, y: 3, width: 100, height: 100, rgba: (0, 0, 0, 128) },
        ];
        let img = rasterize(&cmds, 4, 4).unwrap();
        assert_eq!(img.get_pixel(1, 1), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(2, 2), &CANVAS);
        let [r, g, b, a] = img.get_pixel(3, 3).0;
        assert!((126..=128).contains(&r) && r == g && g == b, "half black over white, got {:?}", (r, g, b));
        assert_eq!(a, 255);
    }

    #[test]
    fn text_sets_glyph_pixels() {
        let cmds = vec![PaintCommand::Text { x: 0, y: 0, text: "|".into(), scale: 1, rgba: (0, 0, 0, 255) }];
        let img = rasterize(&cmds, 6, 8).unwrap();
        // '|' is a full-height bar in the middle column
        for row in 0..7 {
            assert_eq!(img.get_pixel(2, row), &Rgba([0, 0, 0, 255]));
        }
        assert_eq!(img.get_pixel(2, 7), &CANVAS);
        assert_eq!(img.get_pixel(0, 0), &CANVAS);
    }

    #[test]
    fn far_away_commands_are_clipped() {
        let cmds = vec![
            PaintCommand::SolidRect { x: i32::MAX - 1, y: i32::MAX - 1, width: u32::MAX, height: u32::MAX, rgba: (0, 0, 0, 255) },
            PaintCommand::SolidRect { x: i32::MIN, y: i32::MIN, width: 3, height: 3, rgba: (0, 0, 0, 255) },
            PaintCommand::Text { x: 0, y: i32::MAX, text: "far".into(), scale: 2, rgba: (0, 0, 0, 255) },
        ];
        let img = rasterize(&cmds, 4, 4).unwrap();
        assert!(img.pixels().all(|p| *p == CANVAS));
    }

    #[test]
    fn zero_area_canvas_is_rejected() {
        assert!(matches!(rasterize(&[], 0, 5), Err(Error::DegenerateViewport { width: 0, height: 5 })));
    }

    #[test]
    fn encode_is_deterministic() {
        let img = rasterize(&[PaintCommand::SolidRect { x: 0, y: 0, width: 2, height: 2, rgba: (9, 8, 7, 255) }], 5, 5)
            .unwrap();
        let a = Screenshot::encode(&img).unwrap();
        let b = Screenshot::encode(&img).unwrap();
        assert_eq!(&a.png_data[0..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(a.png_data, b.png_data);
        assert_eq!((a.width, a.height), (5, 5));
    }
}
