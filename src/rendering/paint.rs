/// Display list built from a document layout

use crate::rendering::layout::{LayoutNode, Rect};
use crate::Viewport;

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    SolidRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        rgba: (u8, u8, u8, u8),
    },
    Text {
        x: i32,
        y: i32,
        text: String,
        scale: u32,
        rgba: (u8, u8, u8, u8),
    },
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Whether `rect` overlaps the `viewport`-sized canvas at the origin
fn intersects(rect: &Rect, viewport: Viewport) -> bool {
    rect.right() > 0 && rect.bottom() > 0 && (rect.x as i64) < viewport.width as i64 && (rect.y as i64) < viewport.height as i64
}

/// Backgrounds, then borders, then text, per node in document order.
/// Nodes entirely outside `viewport` are skipped.
pub fn build_display_list(nodes: &[LayoutNode], viewport: Viewport) -> Vec<PaintCommand> {
    let mut commands = Vec::new();
    for node in nodes.iter().filter(|n| intersects(n.rect(), viewport)) {
        match node {
            LayoutNode::Block { lb, background, border_color } => {
                let Rect { x, y, width, height } = lb.rect;
                if background.is_visible() && width > 0 && height > 0 {
                    commands.push(PaintCommand::SolidRect { x, y, width, height, rgba: background.to_tuple() });
                }
                if !border_color.is_visible() {
                    continue;
                }
                let b = lb.box_model.border;
                let rgba = border_color.to_tuple();
                let (x64, y64) = (x as i64, y as i64);
                let edges = [
                    (x64, y64, width, b.top),
                    (x64, lb.rect.bottom() - b.bottom as i64, width, b.bottom),
                    (x64, y64, b.left, height),
                    (lb.rect.right() - b.right as i64, y64, b.right, height),
                ];
                for (x, y, width, height) in edges {
                    if width > 0 && height > 0 {
                        commands.push(PaintCommand::SolidRect { x: clamp_i32(x), y: clamp_i32(y), width, height, rgba });
                    }
                }
            }
            LayoutNode::Text { rect, text, color, scale } => {
                if color.is_visible() {
                    commands.push(PaintCommand::Text {
                        x: rect.x,
                        y: rect.y,
                        text: text.clone(),
                        scale: *scale,
                        rgba: color.to_tuple(),
                    });
                }
            }
        }
    }
    commands
}
