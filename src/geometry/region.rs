// ============================================================================
// REGION - exact pixel sets as y-banded rectangle lists
// ============================================================================
//
// A region is stored as horizontal bands sorted by y. Each band covers rows
// [top, bottom) and holds sorted, disjoint, non-touching x spans. Vertically
// adjacent bands with identical spans are always merged, so two regions that
// cover the same pixels have identical band lists.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};

use super::matrix::Affine;
use super::outline::{FillRule, Outline};
use super::rect::{Point, PointF, Rect, Scanline};
use super::tracer;

/// Half extent of [`Region::infinite`].
pub const INFINITE_EXTENT: i32 = 1 << 22;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Band {
    top: i32,
    bottom: i32,
    /// `[x0, x1)` pairs.
    spans: Vec<(i32, i32)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SetOp {
    Union,
    Intersect,
    Exclude,
    Xor,
    /// `b − a`
    ReverseExclude,
}

impl SetOp {
    #[inline]
    fn apply(self, a: bool, b: bool) -> bool {
        match self {
            SetOp::Union => a || b,
            SetOp::Intersect => a && b,
            SetOp::Exclude => a && !b,
            SetOp::Xor => a != b,
            SetOp::ReverseExclude => b && !a,
        }
    }
}

/// Values derived from the bands, rebuilt lazily after a mutation.
struct Derived {
    scans: Arc<[Rect]>,
    area: u32,
    bounds: Rect,
}

/// Second operand of a region combine.
pub enum Operand<'a> {
    Region(&'a Region),
    Rect(Rect),
    Outline(&'a Outline),
}

impl<'a> From<&'a Region> for Operand<'a> {
    fn from(r: &'a Region) -> Self {
        Operand::Region(r)
    }
}

impl From<Rect> for Operand<'_> {
    fn from(r: Rect) -> Self {
        Operand::Rect(r)
    }
}

impl<'a> From<&'a Rect> for Operand<'a> {
    fn from(r: &'a Rect) -> Self {
        Operand::Rect(*r)
    }
}

impl<'a> From<&'a Outline> for Operand<'a> {
    fn from(o: &'a Outline) -> Self {
        Operand::Outline(o)
    }
}

/// Set of pixels with exact boolean algebra.
///
/// Reads (`scans`, `area`, `bounds`) go through a per-instance lock so a
/// shared `&Region` can be queried from several threads; mutation requires
/// `&mut self`.
pub struct Region {
    bands: Vec<Band>,
    cache: Mutex<Option<Derived>>,
}

impl Default for Region {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Region {
    fn clone(&self) -> Self {
        Self::from_bands(self.bands.clone())
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.bands == other.bands
    }
}

impl Eq for Region {}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Region").field(&self.scans()).finish()
    }
}

impl Region {
    // ========================================================================
    // CONSTRUCTORS
    // ========================================================================

    /// Empty region.
    pub fn new() -> Self {
        Self::from_bands(Vec::new())
    }

    fn from_bands(bands: Vec<Band>) -> Self {
        Self { bands, cache: Mutex::new(None) }
    }

    pub fn from_rect(rect: Rect) -> Self {
        if rect.is_empty() {
            return Self::new();
        }
        Self::from_bands(vec![Band {
            top: rect.top(),
            bottom: rect.bottom(),
            spans: vec![(rect.left(), rect.right())],
        }])
    }

    /// Union of arbitrary (possibly overlapping) rectangles.
    pub fn from_rects(rects: &[Rect]) -> Self {
        let mut sorted: Vec<Rect> = rects.iter().copied().filter(|r| !r.is_empty()).collect();
        if sorted.is_empty() {
            return Self::new();
        }
        sorted.sort_by_key(|r| r.top());

        let mut ys: Vec<i32> = sorted.iter().flat_map(|r| [r.top(), r.bottom()]).collect();
        ys.sort_unstable();
        ys.dedup();

        let mut bands = Vec::new();
        let mut active: Vec<Rect> = Vec::new();
        let mut next = 0;
        for w in ys.windows(2) {
            let (y0, y1) = (w[0], w[1]);
            while next < sorted.len() && sorted[next].top() <= y0 {
                active.push(sorted[next]);
                next += 1;
            }
            active.retain(|r| r.bottom() > y0);
            let mut spans: Vec<(i32, i32)> = active.iter().map(|r| (r.left(), r.right())).collect();
            spans.sort_unstable();
            push_band(&mut bands, y0, y1, merge_sorted_spans(spans));
        }
        Self::from_bands(bands)
    }

    /// Region built from row spans sorted by row then x.
    pub fn from_scanlines(scans: &[Scanline]) -> Self {
        let mut bands: Vec<Band> = Vec::new();
        let mut i = 0;
        while i < scans.len() {
            let y = scans[i].y;
            let mut spans = Vec::new();
            while i < scans.len() && scans[i].y == y {
                let s = scans[i];
                if s.length > 0 {
                    spans.push((s.x, s.x.saturating_add(s.length)));
                }
                i += 1;
            }
            spans.sort_unstable();
            push_band(&mut bands, y, y + 1, merge_sorted_spans(spans));
        }
        Self::from_bands(bands)
    }

    /// Pixel coverage of an outline (cached on the outline itself).
    pub fn from_outline(outline: &Outline) -> Self {
        outline.region().clone()
    }

    pub(crate) fn from_fill(figures: &[Vec<PointF>], rule: FillRule) -> Self {
        Self::from_scanlines(&tracer::fill_spans(figures, rule, None))
    }

    /// A region large enough to stand in for "everything".
    pub fn infinite() -> Self {
        Self::from_rect(Rect::new(
            -INFINITE_EXTENT,
            -INFINITE_EXTENT,
            2 * INFINITE_EXTENT,
            2 * INFINITE_EXTENT,
        ))
    }

    pub fn make_empty(&mut self) {
        self.bands.clear();
        self.invalidate();
    }

    pub fn make_infinite(&mut self) {
        *self = Self::infinite();
    }

    // ========================================================================
    // DERIVED DATA
    // ========================================================================

    fn invalidate(&mut self) {
        match self.cache.get_mut() {
            Ok(c) => *c = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    fn derived(&self) -> MutexGuard<'_, Option<Derived>> {
        let mut guard = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            let mut scans = Vec::new();
            let mut area: u64 = 0;
            let mut bounds = Rect::default();
            for band in &self.bands {
                for &(x0, x1) in &band.spans {
                    let r = Rect::from_ltrb(x0, band.top, x1, band.bottom);
                    area = area.saturating_add(r.width as u64 * r.height as u64);
                    bounds = bounds.union(&r);
                    scans.push(r);
                }
            }
            *guard = Some(Derived {
                scans: scans.into(),
                area: area.min(u32::MAX as u64) as u32,
                bounds,
            });
        }
        guard
    }

    /// Non-overlapping rectangles covering exactly this region, sorted by y
    /// then x.
    pub fn scans(&self) -> Arc<[Rect]> {
        match &*self.derived() {
            Some(d) => Arc::clone(&d.scans),
            None => Arc::from(Vec::new()),
        }
    }

    pub fn scan_count(&self) -> usize {
        self.scans().len()
    }

    pub fn scan(&self, index: usize) -> Result<Rect> {
        let scans = self.scans();
        scans.get(index).copied().ok_or_else(|| {
            Error::out_of_range("index", index as i64, 0, scans.len() as i64 - 1)
        })
    }

    /// Pixel count, saturating at `u32::MAX`.
    pub fn area(&self) -> u32 {
        self.derived().as_ref().map_or(0, |d| d.area)
    }

    pub fn bounds(&self) -> Rect {
        self.derived().as_ref().map_or(Rect::default(), |d| d.bounds)
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn is_visible(&self, p: Point) -> bool {
        let idx = self.bands.partition_point(|b| b.bottom <= p.y);
        let Some(band) = self.bands.get(idx) else {
            return false;
        };
        if band.top > p.y {
            return false;
        }
        let s = band.spans.partition_point(|&(_, x1)| x1 <= p.x);
        band.spans.get(s).is_some_and(|&(x0, _)| x0 <= p.x)
    }

    // ========================================================================
    // COMBINE
    // ========================================================================

    fn combine_with(&mut self, other: Operand<'_>, op: SetOp) {
        let bands = match other {
            Operand::Region(r) => combine_bands(&self.bands, &r.bands, op),
            Operand::Rect(r) => combine_bands(&self.bands, &Region::from_rect(r).bands, op),
            Operand::Outline(o) => combine_bands(&self.bands, &o.region().bands, op),
        };
        self.bands = bands;
        self.invalidate();
    }

    pub fn union<'a>(&mut self, other: impl Into<Operand<'a>>) {
        self.combine_with(other.into(), SetOp::Union);
    }

    pub fn intersect<'a>(&mut self, other: impl Into<Operand<'a>>) {
        self.combine_with(other.into(), SetOp::Intersect);
    }

    /// `self := self − other`
    pub fn exclude<'a>(&mut self, other: impl Into<Operand<'a>>) {
        self.combine_with(other.into(), SetOp::Exclude);
    }

    pub fn xor<'a>(&mut self, other: impl Into<Operand<'a>>) {
        self.combine_with(other.into(), SetOp::Xor);
    }

    /// `self := other − self`
    pub fn complement<'a>(&mut self, other: impl Into<Operand<'a>>) {
        self.combine_with(other.into(), SetOp::ReverseExclude);
    }

    // ========================================================================
    // TRANSFORMS
    // ========================================================================

    pub fn translate(&mut self, dx: i32, dy: i32) {
        if (dx == 0 && dy == 0) || self.bands.is_empty() {
            return;
        }
        for band in &mut self.bands {
            band.top = band.top.saturating_add(dy);
            band.bottom = band.bottom.saturating_add(dy);
            for span in &mut band.spans {
                span.0 = span.0.saturating_add(dx);
                span.1 = span.1.saturating_add(dx);
            }
        }
        self.invalidate();
    }

    /// Whole-pixel translations shift the bands directly. Other matrices go
    /// through the traced outline and are rasterized back.
    pub fn transform(&mut self, m: &Affine) {
        if m.is_identity() || self.bands.is_empty() {
            return;
        }
        if let Some((dx, dy)) = m.integer_translation() {
            self.translate(dx, dy);
            return;
        }
        if !m.is_invertible() {
            self.make_empty();
            return;
        }
        let mut outline = Outline::from_region(self);
        outline.transform(m);
        *self = Region::from_outline(&outline);
    }
}

// ============================================================================
// BAND ALGEBRA
// ============================================================================

/// Append a band, merging with the previous one when they touch and carry
/// identical spans. Empty span lists are dropped.
fn push_band(bands: &mut Vec<Band>, top: i32, bottom: i32, spans: Vec<(i32, i32)>) {
    if spans.is_empty() || bottom <= top {
        return;
    }
    if let Some(last) = bands.last_mut() {
        if last.bottom == top && last.spans == spans {
            last.bottom = bottom;
            return;
        }
    }
    bands.push(Band { top, bottom, spans });
}

/// Merge x-sorted spans, joining any that overlap or touch.
fn merge_sorted_spans(spans: Vec<(i32, i32)>) -> Vec<(i32, i32)> {
    let mut out: Vec<(i32, i32)> = Vec::with_capacity(spans.len());
    for (x0, x1) in spans {
        if x1 <= x0 {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.1 >= x0 => last.1 = last.1.max(x1),
            _ => out.push((x0, x1)),
        }
    }
    out
}

fn combine_spans(a: &[(i32, i32)], b: &[(i32, i32)], op: SetOp) -> Vec<(i32, i32)> {
    let mut xs: Vec<i32> = a.iter().chain(b).flat_map(|&(x0, x1)| [x0, x1]).collect();
    xs.sort_unstable();
    xs.dedup();

    let mut out: Vec<(i32, i32)> = Vec::new();
    let (mut ia, mut ib) = (0, 0);
    for w in xs.windows(2) {
        let (x0, x1) = (w[0], w[1]);
        while ia < a.len() && a[ia].1 <= x0 {
            ia += 1;
        }
        while ib < b.len() && b[ib].1 <= x0 {
            ib += 1;
        }
        let in_a = ia < a.len() && a[ia].0 <= x0;
        let in_b = ib < b.len() && b[ib].0 <= x0;
        if op.apply(in_a, in_b) {
            match out.last_mut() {
                Some(last) if last.1 == x0 => last.1 = x1,
                _ => out.push((x0, x1)),
            }
        }
    }
    out
}

fn combine_bands(a: &[Band], b: &[Band], op: SetOp) -> Vec<Band> {
    let mut ys: Vec<i32> = a.iter().chain(b).flat_map(|band| [band.top, band.bottom]).collect();
    ys.sort_unstable();
    ys.dedup();

    let mut out = Vec::new();
    let (mut ia, mut ib) = (0, 0);
    for w in ys.windows(2) {
        let (y0, y1) = (w[0], w[1]);
        while ia < a.len() && a[ia].bottom <= y0 {
            ia += 1;
        }
        while ib < b.len() && b[ib].bottom <= y0 {
            ib += 1;
        }
        let sa: &[(i32, i32)] = match a.get(ia) {
            Some(band) if band.top <= y0 => &band.spans,
            _ => &[],
        };
        let sb: &[(i32, i32)] = match b.get(ib) {
            Some(band) if band.top <= y0 => &band.spans,
            _ => &[],
        };
        push_band(&mut out, y0, y1, combine_spans(sa, sb, op));
    }
    out
}
