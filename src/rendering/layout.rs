/// Block and inline layout over a styled box tree
///
/// The box tree is built once per document from the parsed DOM and owns all
/// of its data, so it can outlive the `Html` it came from and be laid out
/// again at a different width without re-parsing. Block boxes are handed to
/// taffy as column flex containers (children stack vertically and stretch to
/// the container width, margins never collapse); runs of inline content are
/// taffy leaves measured by the line breaker below.

use crate::rendering::font;
use crate::rendering::style::{parse_declarations, Color, ComputedStyle, Display, Edges, Stylesheet};
use crate::{Error, Result};
use scraper::{ElementRef, Html, Node};
use taffy::prelude::{AvailableSpace, NodeId, Rect as TaffyRect, Size};
use taffy::style::{
    AlignItems, BoxSizing, Dimension, Display as TaffyDisplay, FlexDirection, LengthPercentage,
    LengthPercentageAuto, Style,
};

/// Elements nested deeper than this are flattened into their ancestor's
/// inline content
pub const MAX_NESTING: usize = 256;

/// Stack for threads that build and lay out box trees up to `MAX_NESTING`
/// levels deep
pub const LAYOUT_STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxModel {
    pub margin: Edges,
    pub border: Edges,
    pub padding: Edges,
}

/// A laid out block. `rect` is the border box.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBox {
    pub rect: Rect,
    pub box_model: BoxModel,
}

impl LayoutBox {
    pub fn content_width(&self) -> u32 {
        let frame = self.box_model.border.horizontal() + self.box_model.padding.horizontal();
        self.rect.width.saturating_sub(frame)
    }
}

/// Output of layout, in paint order
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutNode {
    Block {
        lb: LayoutBox,
        background: Color,
        border_color: Color,
    },
    Text {
        rect: Rect,
        text: String,
        color: Color,
        scale: u32,
    },
}

impl LayoutNode {
    pub fn rect(&self) -> &Rect {
        match self {
            LayoutNode::Block { lb, .. } => &lb.rect,
            LayoutNode::Text { rect, .. } => rect,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InlineItem {
    Word { text: String, color: Color, scale: u32 },
    Space { scale: u32 },
    Break { scale: u32 },
}

#[derive(Debug, Clone)]
pub enum BoxChild {
    Block(BoxNode),
    /// Anonymous block holding a run of inline content
    Inline(Vec<InlineItem>),
}

#[derive(Debug, Clone)]
pub struct BoxNode {
    pub style: ComputedStyle,
    pub children: Vec<BoxChild>,
}

/// Build the box tree for `document`, rooted at `<html>`
pub fn build_box_tree(document: &Html, font_size: u32) -> BoxNode {
    let user_agent = Stylesheet::user_agent();
    let author = author_styles(document);
    let builder = BoxBuilder { sheets: [&user_agent, &author] };

    let root = document.root_element();
    let style = builder.cascade(&root, &ComputedStyle::root(font_size));
    if style.display == Display::None {
        return BoxNode { style, children: Vec::new() };
    }
    builder.build_block(root, style, 0)
}

fn author_styles(document: &Html) -> Stylesheet {
    let mut css = String::new();
    for el in document.root_element().descendants().filter_map(ElementRef::wrap) {
        if el.value().name() == "style" {
            css.extend(el.text());
            css.push('\n');
        }
    }
    Stylesheet::parse(&css)
}

struct BoxBuilder<'s> {
    sheets: [&'s Stylesheet; 2],
}

impl BoxBuilder<'_> {
    fn cascade(&self, el: &ElementRef, parent: &ComputedStyle) -> ComputedStyle {
        let mut style = ComputedStyle::inherit_from(parent);
        for sheet in self.sheets {
            sheet.apply_matching(el, &mut style);
        }
        if let Some(inline) = el.value().attr("style") {
            for decl in parse_declarations(inline) {
                style.apply(&decl);
            }
        }
        style
    }

    fn build_block(&self, el: ElementRef, style: ComputedStyle, depth: usize) -> BoxNode {
        let mut children = Vec::new();
        let mut pending = Vec::new();
        self.collect(el, &style, &mut children, &mut pending, depth);
        flush_inline(&mut children, &mut pending);
        BoxNode { style, children }
    }

    /// Walk `el`'s children, appending blocks to `children` and inline
    /// content to `pending`. Inline elements are flattened into the run.
    fn collect(
        &self,
        el: ElementRef,
        style: &ComputedStyle,
        children: &mut Vec<BoxChild>,
        pending: &mut Vec<InlineItem>,
        depth: usize,
    ) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => push_text(pending, text, style),
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else { continue };
                    let child_style = self.cascade(&child_el, style);
                    if child_style.display == Display::None {
                        continue;
                    }
                    if depth >= MAX_NESTING {
                        // text-only, walked without recursion
                        for text in child_el.text() {
                            push_text(pending, text, style);
                        }
                        continue;
                    }
                    match child_style.display {
                        Display::None => {}
                        Display::Block => {
                            flush_inline(children, pending);
                            children.push(BoxChild::Block(self.build_block(child_el, child_style, depth + 1)));
                        }
                        Display::Inline if child_el.value().name() == "br" => {
                            pending.push(InlineItem::Break {
                                scale: font::scale_for(child_style.font_size),
                            });
                        }
                        Display::Inline => self.collect(child_el, &child_style, children, pending, depth + 1),
                    }
                }
                _ => {}
            }
        }
    }
}

fn push_text(pending: &mut Vec<InlineItem>, text: &str, style: &ComputedStyle) {
    let scale = font::scale_for(style.font_size);
    let mut word = String::new();
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !word.is_empty() {
                pending.push(InlineItem::Word { text: std::mem::take(&mut word), color: style.color, scale });
            }
            if !matches!(pending.last(), Some(InlineItem::Space { .. })) {
                pending.push(InlineItem::Space { scale });
            }
        } else {
            word.push(ch);
        }
    }
    if !word.is_empty() {
        pending.push(InlineItem::Word { text: word, color: style.color, scale });
    }
}

fn flush_inline(children: &mut Vec<BoxChild>, pending: &mut Vec<InlineItem>) {
    let has_content = pending.iter().any(|i| !matches!(i, InlineItem::Space { .. }));
    if has_content {
        children.push(BoxChild::Inline(std::mem::take(pending)));
    } else {
        pending.clear();
    }
}

#[derive(Debug, Default)]
struct Line {
    fragments: Vec<Fragment>,
    width: u32,
    height: u32,
}

#[derive(Debug)]
struct Fragment {
    x: u32,
    text: String,
    color: Color,
    scale: u32,
}

/// Greedy line breaking at word boundaries. Words wider than `avail` get a
/// line of their own and overflow.
fn break_lines(items: &[InlineItem], avail: u32) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut cur = Line::default();
    let mut space = 0u32;
    for item in items {
        match item {
            InlineItem::Space { scale } => {
                if !cur.fragments.is_empty() {
                    space = font::CELL_WIDTH * scale;
                }
            }
            InlineItem::Word { text, color, scale } => {
                let w = font::text_width(text, *scale);
                if !cur.fragments.is_empty() && cur.width.saturating_add(space).saturating_add(w) > avail {
                    lines.push(std::mem::take(&mut cur));
                    space = 0;
                }
                let x = cur.width.saturating_add(space);
                cur.fragments.push(Fragment { x, text: text.clone(), color: *color, scale: *scale });
                cur.width = x.saturating_add(w);
                cur.height = cur.height.max(font::line_height(*scale));
                space = 0;
            }
            InlineItem::Break { scale } => {
                let mut line = std::mem::take(&mut cur);
                line.height = line.height.max(font::line_height(*scale));
                lines.push(line);
                space = 0;
            }
        }
    }
    if !cur.fragments.is_empty() {
        lines.push(cur);
    }
    lines
}

fn px(v: f64) -> i32 {
    v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

fn length(v: f32) -> u32 {
    v.round().clamp(0.0, u32::MAX as f32) as u32
}

fn edges<T>(e: Edges, f: fn(f32) -> T) -> TaffyRect<T> {
    TaffyRect {
        left: f(e.left as f32),
        right: f(e.right as f32),
        top: f(e.top as f32),
        bottom: f(e.bottom as f32),
    }
}

fn dimension(v: Option<u32>) -> Dimension {
    v.map_or(Dimension::auto(), |v| Dimension::length(v as f32))
}

/// Shared by every box: stack children, stretch them across, never shrink
fn flow_style() -> Style {
    Style {
        display: TaffyDisplay::Flex,
        flex_direction: FlexDirection::Column,
        align_items: Some(AlignItems::Stretch),
        flex_shrink: 0.0,
        min_size: Size { width: Dimension::length(0.0), height: Dimension::length(0.0) },
        ..Style::default()
    }
}

fn block_style(s: &ComputedStyle) -> Style {
    Style {
        box_sizing: BoxSizing::ContentBox,
        size: Size { width: dimension(s.width), height: dimension(s.height) },
        margin: edges(s.margin, LengthPercentageAuto::length),
        padding: edges(s.padding, LengthPercentage::length),
        border: edges(s.border, LengthPercentage::length),
        ..flow_style()
    }
}

/// Size of an inline run given what taffy already knows about it
fn measure_run(items: &[InlineItem], known: Size<Option<f32>>, available: Size<AvailableSpace>) -> Size<f32> {
    let limit = match (known.width, available.width) {
        (Some(w), _) => length(w),
        (None, AvailableSpace::Definite(w)) => length(w),
        (None, AvailableSpace::MinContent) => 0,
        (None, AvailableSpace::MaxContent) => u32::MAX,
    };
    let lines = break_lines(items, limit);
    let widest = lines.iter().map(|l| l.width).max().unwrap_or(0);
    let tall = lines.iter().fold(0u32, |h, l| h.saturating_add(l.height));
    Size {
        width: known.width.unwrap_or(widest as f32),
        height: known.height.unwrap_or(tall as f32),
    }
}

/// A box tree mirrored into taffy. Leaf contexts index `runs`.
struct FlowTree<'a> {
    taffy: taffy::TaffyTree<usize>,
    runs: Vec<&'a [InlineItem]>,
}

impl<'a> FlowTree<'a> {
    fn insert(&mut self, node: &'a BoxNode) -> std::result::Result<NodeId, taffy::TaffyError> {
        let mut kids = Vec::with_capacity(node.children.len());
        for child in &node.children {
            let id = match child {
                BoxChild::Block(b) => self.insert(b)?,
                BoxChild::Inline(items) => {
                    self.runs.push(items);
                    self.taffy.new_leaf_with_context(flow_style(), self.runs.len() - 1)?
                }
            };
            kids.push(id);
        }
        self.taffy.new_with_children(block_style(&node.style), &kids)
    }

    fn compute(&mut self, viewport: NodeId, width: Option<u32>) -> std::result::Result<(), taffy::TaffyError> {
        let available = Size {
            width: width.map_or(AvailableSpace::MaxContent, |w| AvailableSpace::Definite(w as f32)),
            height: AvailableSpace::MaxContent,
        };
        let runs = &self.runs;
        self.taffy.compute_layout_with_measure(
            viewport,
            available,
            |known_dimensions, available_space, _node_id, node_context, _style| match node_context {
                Some(idx) => measure_run(runs[*idx], known_dimensions, available_space),
                None => known_dimensions.unwrap_or(Size::ZERO),
            },
        )
    }

    /// Emit `node` and its descendants in paint order. `origin` is the
    /// absolute position of the parent's border box.
    fn emit(
        &self,
        node: &BoxNode,
        id: NodeId,
        origin: (f64, f64),
        out: &mut Vec<LayoutNode>,
    ) -> std::result::Result<(), taffy::TaffyError> {
        let layout = self.taffy.layout(id)?;
        let x = origin.0 + layout.location.x as f64;
        let y = origin.1 + layout.location.y as f64;
        let s = &node.style;
        out.push(LayoutNode::Block {
            lb: LayoutBox {
                rect: Rect { x: px(x), y: px(y), width: length(layout.size.width), height: length(layout.size.height) },
                box_model: BoxModel { margin: s.margin, border: s.border, padding: s.padding },
            },
            background: s.background,
            border_color: s.border_color,
        });

        for (child, child_id) in node.children.iter().zip(self.taffy.children(id)?) {
            match child {
                BoxChild::Block(b) => self.emit(b, child_id, (x, y), out)?,
                BoxChild::Inline(items) => {
                    let run = self.taffy.layout(child_id)?;
                    let left = x + run.location.x as f64;
                    let top = y + run.location.y as f64;
                    emit_lines(items, left, top, length(run.size.width), out);
                }
            }
        }
        Ok(())
    }
}

fn emit_lines(items: &[InlineItem], x: f64, y: f64, width: u32, out: &mut Vec<LayoutNode>) {
    let mut top = y;
    for line in break_lines(items, width) {
        for frag in line.fragments {
            let glyph_h = font::line_height(frag.scale);
            out.push(LayoutNode::Text {
                rect: Rect {
                    x: px(x + frag.x as f64),
                    // bottom-align mixed sizes on a line
                    y: px(top + (line.height - glyph_h) as f64),
                    width: font::text_width(&frag.text, frag.scale),
                    height: glyph_h,
                },
                text: frag.text,
                color: frag.color,
                scale: frag.scale,
            });
        }
        top += line.height as f64;
    }
}

#[derive(Debug, Clone)]
pub struct DocumentLayout {
    pub nodes: Vec<LayoutNode>,
    /// Width the root was laid out against
    pub width: u32,
    /// Height of the root's margin box
    pub height: u32,
}

impl DocumentLayout {
    /// Size of everything laid out, including overflow past the root box
    pub fn content_size(&self) -> (u32, u32) {
        let (mut w, mut h) = (self.width as i64, self.height as i64);
        for node in &self.nodes {
            let r = node.rect();
            if r.width > 0 && r.height > 0 {
                w = w.max(r.right());
                h = h.max(r.bottom());
            }
        }
        (w.clamp(0, u32::MAX as i64) as u32, h.clamp(0, u32::MAX as i64) as u32)
    }
}

/// Lay out the tree. `None` lays out at the document's max-content width.
pub fn layout_document(root: &BoxNode, viewport_width: Option<u32>) -> Result<DocumentLayout> {
    let failed = |e: taffy::TaffyError| Error::LayoutFailure(e.to_string());

    let mut flow = FlowTree { taffy: taffy::TaffyTree::new(), runs: Vec::new() };
    let html = flow.insert(root).map_err(failed)?;
    let viewport_style = Style {
        size: Size { width: dimension(viewport_width), height: Dimension::auto() },
        ..flow_style()
    };
    let viewport = flow.taffy.new_with_children(viewport_style, &[html]).map_err(failed)?;
    flow.compute(viewport, viewport_width).map_err(failed)?;

    let mut nodes = Vec::new();
    flow.emit(root, html, (0.0, 0.0), &mut nodes).map_err(failed)?;
    let frame = flow.taffy.layout(viewport).map_err(failed)?;
    Ok(DocumentLayout {
        nodes,
        width: length(frame.size.width),
        height: length(frame.size.height),
    })
}
