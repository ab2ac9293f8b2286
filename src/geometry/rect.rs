// ============================================================================
// POINTS, RECTANGLES, SCANLINES
// ============================================================================

use serde::{Deserialize, Serialize};

/// Integer grid point (pixel corner or pixel index depending on context).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Floating point vertex used by outlines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<Point> for PointF {
    fn from(p: Point) -> Self {
        PointF::new(p.x as f64, p.y as f64)
    }
}

/// Axis-aligned integer rectangle. `right`/`bottom` are exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_ltrb(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            x: left,
            y: top,
            width: right.saturating_sub(left),
            height: bottom.saturating_sub(top),
        }
    }

    #[inline]
    pub fn left(&self) -> i32 { self.x }
    #[inline]
    pub fn top(&self) -> i32 { self.y }
    #[inline]
    pub fn right(&self) -> i32 { self.x.saturating_add(self.width) }
    #[inline]
    pub fn bottom(&self) -> i32 { self.y.saturating_add(self.height) }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Pixel count, saturating at `u32::MAX`.
    pub fn area(&self) -> u32 {
        if self.is_empty() {
            return 0;
        }
        (self.width as u32).saturating_mul(self.height as u32)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left() && p.x < self.right() && p.y >= self.top() && p.y < self.bottom()
    }

    /// Intersection; an empty result is normalized to `Rect::default()`.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let l = self.left().max(other.left());
        let t = self.top().max(other.top());
        let r = self.right().min(other.right());
        let b = self.bottom().min(other.bottom());
        if r <= l || b <= t {
            Rect::default()
        } else {
            Rect::from_ltrb(l, t, r, b)
        }
    }

    /// Smallest rectangle covering both. Empty rectangles are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_ltrb(
            self.left().min(other.left()),
            self.top().min(other.top()),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Split into `count` horizontal strips of (nearly) equal height.
    /// Strips that would be empty are still produced so the result always has
    /// `count` entries.
    pub fn split(&self, count: usize) -> Vec<Rect> {
        let count = count.max(1);
        let mut out = Vec::with_capacity(count);
        let h = self.height.max(0) as i64;
        for i in 0..count as i64 {
            let top = self.y as i64 + h * i / count as i64;
            let bottom = self.y as i64 + h * (i + 1) / count as i64;
            out.push(Rect::from_ltrb(self.left(), top as i32, self.right(), bottom as i32));
        }
        out
    }
}

/// Axis-aligned floating point rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectF {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 { self.x + self.width }
    pub fn bottom(&self) -> f64 { self.y + self.height }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Smallest integer rectangle fully covering this one.
    pub fn round_out(&self) -> Rect {
        let l = self.x.floor();
        let t = self.y.floor();
        let r = self.right().ceil();
        let b = self.bottom().ceil();
        Rect::from_ltrb(l as i32, t as i32, r as i32, b as i32)
    }

    /// Integer rectangle obtained by truncating origin and size.
    pub fn truncate(&self) -> Rect {
        Rect::new(self.x as i32, self.y as i32, self.width as i32, self.height as i32)
    }
}

impl From<Rect> for RectF {
    fn from(r: Rect) -> Self {
        RectF::new(r.x as f64, r.y as f64, r.width as f64, r.height as f64)
    }
}

/// A horizontal run of pixels: `[x, x + length)` on row `y`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scanline {
    pub x: i32,
    pub y: i32,
    pub length: i32,
}

impl Scanline {
    pub const fn new(x: i32, y: i32, length: i32) -> Self {
        Self { x, y, length }
    }
}
