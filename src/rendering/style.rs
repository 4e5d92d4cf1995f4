//! CSS subset used by the layout engine
//!
//! Styles come from three places, applied in this order: the built-in
//! user-agent sheet, author `<style>` sheets, then the element's own
//! `style=""` attribute. Within a sheet, later rules win; selector
//! specificity is not considered.

use scraper::{ElementRef, Selector};

/// Default font size in px when nothing sets one
pub const DEFAULT_FONT_SIZE: u32 = 16;

/// Upper bound for any single length, in px
pub const MAX_LENGTH: u32 = 1 << 20;

const USER_AGENT_CSS: &str = r#"
html, body, div, p, h1, h2, h3, h4, h5, h6, ul, ol, li, dl, dt, dd,
section, article, header, footer, nav, main, aside, blockquote, pre,
figure, figcaption, form, fieldset, address, table, tr, hr, center {
    display: block;
}
head, script, style, title, meta, link, template, base {
    display: none;
}
h1 { font-size: 32px; margin: 8px 0; }
h2 { font-size: 24px; margin: 8px 0; }
h3 { font-size: 19px; margin: 8px 0; }
h4, h5, h6 { margin: 8px 0; }
p, ul, ol, blockquote, pre, figure { margin: 8px 0; }
ul, ol { padding-left: 24px; }
hr { border-top: 1px solid #808080; margin: 4px 0; }
a { color: #0000ee; }
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color { r: 0, g: 0, b: 0, a: 0 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b, a: 255 }
    }

    pub fn is_visible(&self) -> bool {
        self.a > 0
    }

    pub fn to_tuple(self) -> (u8, u8, u8, u8) {
        (self.r, self.g, self.b, self.a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Inline,
    None,
}

/// Per-side lengths in px
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Edges {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl Edges {
    pub fn uniform(v: u32) -> Self {
        Edges { top: v, right: v, bottom: v, left: v }
    }

    pub fn horizontal(&self) -> u32 {
        self.left.saturating_add(self.right)
    }

    pub fn vertical(&self) -> u32 {
        self.top.saturating_add(self.bottom)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    pub display: Display,
    /// Content-box width in px, `None` for auto
    pub width: Option<u32>,
    /// Content-box height in px, `None` for auto
    pub height: Option<u32>,
    pub margin: Edges,
    pub padding: Edges,
    pub border: Edges,
    pub border_color: Color,
    pub background: Color,
    pub color: Color,
    pub font_size: u32,
}

impl ComputedStyle {
    /// Style of the initial containing block
    pub fn root(font_size: u32) -> Self {
        Self {
            display: Display::Block,
            width: None,
            height: None,
            margin: Edges::default(),
            padding: Edges::default(),
            border: Edges::default(),
            border_color: Color::BLACK,
            background: Color::TRANSPARENT,
            color: Color::BLACK,
            font_size,
        }
    }

    /// Fresh style for a child: only `color` and `font-size` inherit
    pub fn inherit_from(parent: &ComputedStyle) -> Self {
        Self {
            display: Display::Inline,
            color: parent.color,
            font_size: parent.font_size,
            border_color: parent.color,
            ..Self::root(parent.font_size)
        }
    }

    /// Horizontal margin + border + padding
    pub fn frame_horizontal(&self) -> u32 {
        self.margin
            .horizontal()
            .saturating_add(self.border.horizontal())
            .saturating_add(self.padding.horizontal())
    }

    pub fn apply(&mut self, decl: &Declaration) {
        let value = decl.value.as_str();
        match decl.name.as_str() {
            "display" => {
                self.display = match value {
                    "none" => Display::None,
                    "inline" | "inline-block" | "contents" => Display::Inline,
                    _ => Display::Block,
                }
            }
            "width" => self.width = self.parse_size(value),
            "height" => self.height = self.parse_size(value),
            "margin" => {
                if let Some(e) = self.parse_edges(value) {
                    self.margin = e;
                }
            }
            "padding" => {
                if let Some(e) = self.parse_edges(value) {
                    self.padding = e;
                }
            }
            "border-width" => {
                if let Some(e) = self.parse_edges(value) {
                    self.border = e;
                }
            }
            "border-color" => {
                if let Some(c) = parse_color(value) {
                    self.border_color = c;
                }
            }
            "border" => {
                let (width, color) = self.parse_border(value);
                if let Some(w) = width {
                    self.border = Edges::uniform(w);
                }
                if let Some(c) = color {
                    self.border_color = c;
                }
            }
            "background" | "background-color" => {
                if let Some(c) = split_tokens(value).iter().find_map(|t| parse_color(t)) {
                    self.background = c;
                }
            }
            "color" => {
                if let Some(c) = parse_color(value) {
                    self.color = c;
                }
            }
            "font-size" => {
                let size = match value {
                    "xx-small" => Some(9),
                    "x-small" => Some(10),
                    "small" => Some(13),
                    "medium" => Some(16),
                    "large" => Some(18),
                    "x-large" => Some(24),
                    "xx-large" => Some(32),
                    _ => parse_length(value, self.font_size),
                };
                if let Some(s) = size {
                    self.font_size = s;
                }
            }
            name => {
                if let Some((prop, side)) = side_property(name) {
                    self.apply_side(prop, side, value);
                }
            }
        }
    }

    fn apply_side(&mut self, prop: &str, side: Side, value: &str) {
        match prop {
            "margin" | "padding" | "border-width" => {
                let length = if value == "auto" { Some(0) } else { parse_length(value, self.font_size) };
                let Some(v) = length else { return };
                let edges = match prop {
                    "margin" => &mut self.margin,
                    "padding" => &mut self.padding,
                    _ => &mut self.border,
                };
                *side.of(edges) = v;
            }
            "border" => {
                let (width, color) = self.parse_border(value);
                if let Some(w) = width {
                    *side.of(&mut self.border) = w;
                }
                if let Some(c) = color {
                    self.border_color = c;
                }
            }
            _ => {}
        }
    }

    fn parse_size(&self, value: &str) -> Option<u32> {
        if value == "auto" {
            return None;
        }
        parse_length(value, self.font_size)
    }

    fn parse_edges(&self, value: &str) -> Option<Edges> {
        let vals = split_tokens(value)
            .iter()
            .map(|t| if *t == "auto" { Some(0) } else { parse_length(t, self.font_size) })
            .collect::<Option<Vec<u32>>>()?;
        let e = match vals.as_slice() {
            [a] => Edges::uniform(*a),
            [v, h] => Edges { top: *v, right: *h, bottom: *v, left: *h },
            [t, h, b] => Edges { top: *t, right: *h, bottom: *b, left: *h },
            [t, r, b, l] => Edges { top: *t, right: *r, bottom: *b, left: *l },
            _ => return None,
        };
        Some(e)
    }

    /// `border: 1px solid red` -> (width, color); `none` zeroes the width
    fn parse_border(&self, value: &str) -> (Option<u32>, Option<Color>) {
        let mut width = None;
        let mut color = None;
        let mut styled = false;
        for token in split_tokens(value) {
            match token {
                "none" | "hidden" => return (Some(0), None),
                "solid" | "dashed" | "dotted" | "double" | "groove" | "ridge" | "inset" | "outset" => {
                    styled = true
                }
                "thin" => width = Some(1),
                "medium" => width = Some(3),
                "thick" => width = Some(5),
                t => {
                    if let Some(l) = parse_length(t, self.font_size) {
                        width = Some(l);
                    } else if let Some(c) = parse_color(t) {
                        color = Some(c);
                    }
                }
            }
        }
        if width.is_none() && styled {
            width = Some(3);
        }
        (width, color)
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Top,
    Right,
    Bottom,
    Left,
}

impl Side {
    fn of(self, edges: &mut Edges) -> &mut u32 {
        match self {
            Side::Top => &mut edges.top,
            Side::Right => &mut edges.right,
            Side::Bottom => &mut edges.bottom,
            Side::Left => &mut edges.left,
        }
    }
}

fn side_property(name: &str) -> Option<(&'static str, Side)> {
    let (prop, rest) = if let Some(r) = name.strip_prefix("margin-") {
        ("margin", r)
    } else if let Some(r) = name.strip_prefix("padding-") {
        ("padding", r)
    } else if let Some(r) = name.strip_prefix("border-") {
        match r.strip_suffix("-width") {
            Some(side) => ("border-width", side),
            None => ("border", r),
        }
    } else {
        return None;
    };
    let side = match rest {
        "top" => Side::Top,
        "right" => Side::Right,
        "bottom" => Side::Bottom,
        "left" => Side::Left,
        _ => return None,
    };
    Some((prop, side))
}

/// A single `name: value` pair, name lowercased, `!important` dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
}

pub fn parse_declarations(text: &str) -> Vec<Declaration> {
    text.split(';')
        .filter_map(|part| {
            let (name, value) = part.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            let value = value.strip_suffix("!important").unwrap_or(value).trim();
            if name.is_empty() || value.is_empty() {
                return None;
            }
            Some(Declaration { name, value: value.to_ascii_lowercase() })
        })
        .collect()
}

#[derive(Debug)]
pub struct StyleRule {
    pub selector: Selector,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Default)]
pub struct Stylesheet {
    pub rules: Vec<StyleRule>,
}

impl Stylesheet {
    pub fn user_agent() -> Self {
        Self::parse(USER_AGENT_CSS)
    }

    /// Parse a sheet. At-rules and selectors scraper cannot parse are skipped.
    pub fn parse(css: &str) -> Self {
        let css = strip_comments(css);
        let mut rules = Vec::new();
        let mut rest = css.as_str();
        while let Some(open) = rest.find('{') {
            let prelude = rest[..open].trim();
            let Some(close) = matching_brace(rest, open) else { break };
            let body = &rest[open + 1..close];
            rest = &rest[close + 1..];

            if prelude.starts_with('@') || prelude.is_empty() {
                continue;
            }
            match Selector::parse(prelude) {
                Ok(selector) => rules.push(StyleRule {
                    selector,
                    declarations: parse_declarations(body),
                }),
                Err(_) => log::debug!("skipping unsupported selector `{}`", prelude),
            }
        }
        Self { rules }
    }

    /// Apply every rule matching `element`, in source order
    pub fn apply_matching(&self, element: &ElementRef, style: &mut ComputedStyle) {
        for rule in self.rules.iter().filter(|r| r.selector.matches(element)) {
            for decl in &rule.declarations {
                style.apply(decl);
            }
        }
    }
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

fn matching_brace(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, ch) in s[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a value on whitespace, keeping `fn(a, b)` groups intact
pub fn split_tokens(value: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    for (i, ch) in value.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c.is_whitespace() && depth == 0 => {
                if let Some(s) = start.take() {
                    tokens.push(&value[s..i]);
                }
                continue;
            }
            _ => {}
        }
        if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(&value[s..]);
    }
    tokens
}

/// Parse a length into whole px. Negative lengths clamp to zero.
pub fn parse_length(value: &str, font_size: u32) -> Option<u32> {
    let value = value.trim();
    let (number, factor) = if let Some(n) = value.strip_suffix("px") {
        (n, 1.0)
    } else if let Some(n) = value.strip_suffix("rem") {
        (n, DEFAULT_FONT_SIZE as f64)
    } else if let Some(n) = value.strip_suffix("em") {
        (n, font_size as f64)
    } else if let Some(n) = value.strip_suffix("pt") {
        (n, 4.0 / 3.0)
    } else {
        (value, 1.0)
    };
    let n: f64 = number.trim().parse().ok()?;
    if !n.is_finite() {
        return None;
    }
    Some((n * factor).round().clamp(0.0, MAX_LENGTH as f64) as u32)
}

/// Any CSS color csscolorparser understands. `currentcolor` is not
/// resolved here and yields `None`.
pub fn parse_color(value: &str) -> Option<Color> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("currentcolor") {
        return None;
    }
    let [r, g, b, a] = value.parse::<csscolorparser::Color>().ok()?.to_rgba8();
    Some(Color { r, g, b, a })
}
