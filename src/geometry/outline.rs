// ============================================================================
// OUTLINE - figures of straight edges with a fill rule
// ============================================================================

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::matrix::Affine;
use super::rect::{Point, PointF, RectF};
use super::region::Region;
use super::stencil::BitMatrix;
use super::tracer;

/// Point type tags used by [`OutlineData`].
pub const POINT_TYPE_START: u8 = 0;
pub const POINT_TYPE_LINE: u8 = 1;
pub const POINT_TYPE_CUBIC: u8 = 3;
pub const POINT_TYPE_MASK: u8 = 0x07;
pub const POINT_FLAG_CLOSE: u8 = 0x80;

/// Segments used when a cubic run is flattened on load.
const CUBIC_FLATTEN_STEPS: usize = 16;

/// How overlapping figures decide coverage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FillRule {
    /// A point is inside when a ray from it crosses an odd number of edges.
    #[default]
    EvenOdd,
    /// A point is inside when the signed crossing count is non-zero.
    NonZero,
}

impl FillRule {
    pub fn code(self) -> u8 {
        match self {
            FillRule::EvenOdd => 0,
            FillRule::NonZero => 1,
        }
    }
}

impl TryFrom<u8> for FillRule {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(FillRule::EvenOdd),
            1 => Ok(FillRule::NonZero),
            other => Err(Error::invalid_argument(format!("unknown fill rule code {}", other))),
        }
    }
}

/// Flat point/type-tag representation of an outline, as stored on disk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlineData {
    pub points: Vec<[f64; 2]>,
    pub types: Vec<u8>,
    pub fill_mode: u8,
}

/// A list of figures. Every figure is rasterized as closed; the `closed`
/// flag only records whether the figure was explicitly closed.
pub struct Outline {
    figures: Vec<Vec<PointF>>,
    closed: Vec<bool>,
    fill_rule: FillRule,
    /// Whether `add_line(s)` keeps extending the last figure.
    figure_open: bool,
    region_cache: OnceLock<Region>,
}

impl Default for Outline {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Outline {
    fn clone(&self) -> Self {
        Self {
            figures: self.figures.clone(),
            closed: self.closed.clone(),
            fill_rule: self.fill_rule,
            figure_open: self.figure_open,
            region_cache: self.region_cache.clone(),
        }
    }
}

impl PartialEq for Outline {
    fn eq(&self, other: &Self) -> bool {
        self.fill_rule == other.fill_rule && self.figures == other.figures && self.closed == other.closed
    }
}

impl std::fmt::Debug for Outline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outline")
            .field("fill_rule", &self.fill_rule)
            .field("figures", &self.figures)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Outline {
    pub fn new() -> Self {
        Self::with_fill_rule(FillRule::EvenOdd)
    }

    pub fn with_fill_rule(fill_rule: FillRule) -> Self {
        Self {
            figures: Vec::new(),
            closed: Vec::new(),
            fill_rule,
            figure_open: false,
            region_cache: OnceLock::new(),
        }
    }

    /// Drop derived data after any mutation.
    fn changed(&mut self) {
        self.region_cache.take();
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn fill_rule(&self) -> FillRule {
        self.fill_rule
    }

    pub fn set_fill_rule(&mut self, rule: FillRule) {
        if self.fill_rule != rule {
            self.changed();
            self.fill_rule = rule;
        }
    }

    pub fn figures(&self) -> &[Vec<PointF>] {
        &self.figures
    }

    pub fn figure_count(&self) -> usize {
        self.figures.len()
    }

    pub fn is_figure_closed(&self, index: usize) -> bool {
        self.closed.get(index).copied().unwrap_or(false)
    }

    pub fn point_count(&self) -> usize {
        self.figures.iter().map(|f| f.len()).sum()
    }

    /// True when the outline has no points at all.
    pub fn is_empty(&self) -> bool {
        self.point_count() == 0
    }

    /// Tight bounds of all vertices; empty outlines report an empty rect.
    pub fn bounds(&self) -> RectF {
        let mut pts = self.figures.iter().flatten();
        let Some(first) = pts.next() else {
            return RectF::default();
        };
        let (mut l, mut t, mut r, mut b) = (first.x, first.y, first.x, first.y);
        for p in pts {
            l = l.min(p.x);
            t = t.min(p.y);
            r = r.max(p.x);
            b = b.max(p.y);
        }
        RectF::new(l, t, r - l, b - t)
    }

    /// Geometric containment under the fill rule. Points exactly on a left
    /// or top edge count as inside, on a right or bottom edge as outside,
    /// which matches how pixels are rasterized.
    pub fn is_visible(&self, p: PointF) -> bool {
        let mut winding = 0i32;
        for fig in &self.figures {
            if fig.len() < 2 {
                continue;
            }
            for i in 0..fig.len() {
                let a = fig[i];
                let b = fig[(i + 1) % fig.len()];
                let dir = if a.y <= p.y && b.y > p.y {
                    1
                } else if b.y <= p.y && a.y > p.y {
                    -1
                } else {
                    continue;
                };
                let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if x > p.x {
                    winding += dir;
                }
            }
        }
        match self.fill_rule {
            FillRule::EvenOdd => winding % 2 != 0,
            FillRule::NonZero => winding != 0,
        }
    }

    /// Pixel coverage of this outline, computed once and cached until the
    /// next mutation.
    pub fn region(&self) -> &Region {
        self.region_cache
            .get_or_init(|| Region::from_fill(&self.figures, self.fill_rule))
    }

    // ========================================================================
    // FIGURE BUILDING
    // ========================================================================

    /// The next `add_line(s)` call starts a new figure.
    pub fn start_figure(&mut self) {
        self.figure_open = false;
    }

    pub fn close_figure(&mut self) {
        if self.figure_open {
            if let Some(last) = self.closed.last_mut() {
                *last = true;
            }
            self.changed();
        }
        self.figure_open = false;
    }

    pub fn close_all_figures(&mut self) {
        self.closed.iter_mut().for_each(|c| *c = true);
        self.figure_open = false;
        self.changed();
    }

    pub fn add_line(&mut self, a: PointF, b: PointF) {
        self.add_lines(&[a, b]);
    }

    /// Append connected line segments to the open figure (or a new one).
    pub fn add_lines(&mut self, points: &[PointF]) {
        if points.is_empty() {
            return;
        }
        self.changed();
        if !self.figure_open || self.figures.is_empty() {
            self.figures.push(Vec::with_capacity(points.len()));
            self.closed.push(false);
            self.figure_open = true;
        }
        if let Some(fig) = self.figures.last_mut() {
            for &p in points {
                if fig.last() != Some(&p) {
                    fig.push(p);
                }
            }
        }
    }

    /// Add a closed polygon as its own figure.
    pub fn add_polygon(&mut self, points: impl IntoIterator<Item = PointF>) {
        let fig: Vec<PointF> = points.into_iter().collect();
        if fig.is_empty() {
            return;
        }
        self.changed();
        self.figures.push(fig);
        self.closed.push(true);
        self.figure_open = false;
    }

    pub fn add_polygons(&mut self, polygons: &[Vec<PointF>]) {
        for poly in polygons {
            self.add_polygon(poly.iter().copied());
        }
    }

    pub fn add_int_polygons(&mut self, polygons: &[Vec<Point>]) {
        for poly in polygons {
            self.add_polygon(poly.iter().map(|&p| PointF::from(p)));
        }
    }

    pub fn add_rectangle(&mut self, r: RectF) {
        if r.is_empty() {
            return;
        }
        self.add_polygon([
            PointF::new(r.x, r.y),
            PointF::new(r.right(), r.y),
            PointF::new(r.right(), r.bottom()),
            PointF::new(r.x, r.bottom()),
        ]);
    }

    /// Ellipse inscribed in `r`, approximated by a polygon fine enough that
    /// adjacent vertices are at most a couple of pixels apart.
    pub fn add_ellipse(&mut self, r: RectF) {
        if r.is_empty() {
            return;
        }
        let rx = r.width / 2.0;
        let ry = r.height / 2.0;
        let cx = r.x + rx;
        let cy = r.y + ry;
        let circumference = std::f64::consts::PI * (rx + ry);
        let segments = ((circumference / 2.0).ceil() as usize).clamp(16, 1024);
        self.add_polygon((0..segments).map(|i| {
            let theta = std::f64::consts::TAU * i as f64 / segments as f64;
            PointF::new(cx + rx * theta.cos(), cy + ry * theta.sin())
        }));
    }

    /// Append every figure of `other`.
    pub fn add_outline(&mut self, other: &Outline) {
        if other.is_empty() {
            return;
        }
        self.changed();
        self.figures.extend(other.figures.iter().cloned());
        self.closed.extend(other.closed.iter().copied());
        self.figure_open = false;
    }

    pub fn reset(&mut self) {
        self.changed();
        self.figures.clear();
        self.closed.clear();
        self.figure_open = false;
        self.fill_rule = FillRule::EvenOdd;
    }

    // ========================================================================
    // TRANSFORMS
    // ========================================================================

    pub fn transform(&mut self, m: &Affine) {
        if m.is_identity() {
            return;
        }
        self.changed();
        for fig in &mut self.figures {
            m.transform_points(fig);
        }
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.transform(&Affine::translation(dx, dy));
    }

    // ========================================================================
    // CONVERSIONS
    // ========================================================================

    /// Outline of a region's pixels. A single rectangle is emitted as-is;
    /// anything else is traced from a stencil covering the region bounds.
    pub fn from_region(region: &Region) -> Outline {
        let scans = region.scans();
        let mut outline = Outline::new();
        match scans.len() {
            0 => {}
            1 => {
                outline.add_rectangle(RectF::from(scans[0]));
                outline.close_figure();
            }
            _ => {
                let bounds = region.bounds();
                let mut stencil = BitMatrix::from_region(region, bounds);
                let full = stencil.bounds();
                let polygons = tracer::trace_polygons(&mut stencil, full, bounds.x, bounds.y);
                outline.add_int_polygons(&polygons);
            }
        }
        outline
    }

    pub fn to_data(&self) -> OutlineData {
        let mut data = OutlineData {
            points: Vec::with_capacity(self.point_count()),
            types: Vec::with_capacity(self.point_count()),
            fill_mode: self.fill_rule.code(),
        };
        for (fig, &closed) in self.figures.iter().zip(&self.closed) {
            for (i, p) in fig.iter().enumerate() {
                data.points.push([p.x, p.y]);
                data.types.push(if i == 0 { POINT_TYPE_START } else { POINT_TYPE_LINE });
            }
            if closed {
                if let Some(last) = data.types.last_mut() {
                    *last |= POINT_FLAG_CLOSE;
                }
            }
        }
        data
    }

    /// Rebuild an outline from point/type data. Cubic runs (three points:
    /// two control points and an end point) are flattened to lines.
    pub fn from_data(data: &OutlineData) -> Result<Outline> {
        if data.points.len() != data.types.len() {
            return Err(Error::invalid_argument(format!(
                "outline has {} points but {} type tags",
                data.points.len(),
                data.types.len()
            )));
        }
        let mut outline = Outline::with_fill_rule(FillRule::try_from(data.fill_mode)?);
        let mut current: Vec<PointF> = Vec::new();
        let mut i = 0;

        while i < data.points.len() {
            let tag = data.types[i];
            let p = PointF::new(data.points[i][0], data.points[i][1]);
            let mut close = tag & POINT_FLAG_CLOSE != 0;

            match tag & POINT_TYPE_MASK {
                POINT_TYPE_START => {
                    outline.push_figure(std::mem::take(&mut current), false);
                    current.push(p);
                    i += 1;
                }
                POINT_TYPE_LINE => {
                    if current.is_empty() {
                        return Err(Error::invalid_argument("line segment without a start point"));
                    }
                    current.push(p);
                    i += 1;
                }
                POINT_TYPE_CUBIC => {
                    let Some(&p0) = current.last() else {
                        return Err(Error::invalid_argument("curve segment without a start point"));
                    };
                    if i + 2 >= data.points.len()
                        || data.types[i + 1] & POINT_TYPE_MASK != POINT_TYPE_CUBIC
                        || data.types[i + 2] & POINT_TYPE_MASK != POINT_TYPE_CUBIC
                    {
                        return Err(Error::invalid_argument("truncated curve segment"));
                    }
                    let c1 = p;
                    let c2 = PointF::new(data.points[i + 1][0], data.points[i + 1][1]);
                    let p3 = PointF::new(data.points[i + 2][0], data.points[i + 2][1]);
                    flatten_cubic(p0, c1, c2, p3, &mut current);
                    close = data.types[i + 2] & POINT_FLAG_CLOSE != 0;
                    i += 3;
                }
                other => {
                    return Err(Error::invalid_argument(format!("unknown point type {}", other)));
                }
            }

            if close {
                outline.push_figure(std::mem::take(&mut current), true);
            }
        }
        outline.push_figure(current, false);
        Ok(outline)
    }

    fn push_figure(&mut self, fig: Vec<PointF>, closed: bool) {
        if fig.is_empty() {
            return;
        }
        self.changed();
        self.figures.push(fig);
        self.closed.push(closed);
        self.figure_open = !closed;
    }
}

fn flatten_cubic(p0: PointF, c1: PointF, c2: PointF, p3: PointF, out: &mut Vec<PointF>) {
    for step in 1..=CUBIC_FLATTEN_STEPS {
        let t = step as f64 / CUBIC_FLATTEN_STEPS as f64;
        let mt = 1.0 - t;
        let a = mt * mt * mt;
        let b = 3.0 * mt * mt * t;
        let c = 3.0 * mt * t * t;
        let d = t * t * t;
        out.push(PointF::new(
            a * p0.x + b * c1.x + c * c2.x + d * p3.x,
            a * p0.y + b * c1.y + c * c2.y + d * p3.y,
        ));
    }
}

impl From<&Region> for Outline {
    fn from(region: &Region) -> Self {
        Outline::from_region(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    fn square(x: f64, y: f64, s: f64) -> Outline {
        let mut o = Outline::new();
        o.add_rectangle(RectF::new(x, y, s, s));
        o
    }

    #[test]
    fn test_empty_outline() {
        let o = Outline::new();
        assert!(o.is_empty());
        assert_eq!(o.bounds(), RectF::default());
        assert!(o.region().is_empty());
    }

    #[test]
    fn test_lines_extend_open_figure_until_closed() {
        let mut o = Outline::new();
        o.add_lines(&[PointF::new(0.0, 0.0), PointF::new(4.0, 0.0)]);
        o.add_lines(&[PointF::new(4.0, 4.0)]);
        assert_eq!(o.figure_count(), 1);
        assert_eq!(o.point_count(), 3);
        o.close_figure();
        assert!(o.is_figure_closed(0));
        o.add_lines(&[PointF::new(10.0, 10.0), PointF::new(12.0, 10.0)]);
        assert_eq!(o.figure_count(), 2);
        assert!(!o.is_figure_closed(1));
    }

    #[test]
    fn test_region_cache_invalidated_by_mutation() {
        let mut o = square(0.0, 0.0, 2.0);
        assert_eq!(o.region().area(), 4);
        o.translate(1.0, 0.0);
        assert_eq!(o.region().bounds(), Rect::new(1, 0, 2, 2));
        o.add_rectangle(RectF::new(10.0, 10.0, 1.0, 1.0));
        assert_eq!(o.region().area(), 5);
    }

    #[test]
    fn test_clone_is_independent() {
        let a = square(0.0, 0.0, 3.0);
        let mut b = a.clone();
        b.translate(5.0, 5.0);
        assert_eq!(a.bounds(), RectF::new(0.0, 0.0, 3.0, 3.0));
        assert_eq!(b.bounds(), RectF::new(5.0, 5.0, 3.0, 3.0));
    }

    #[test]
    fn test_is_visible_edges() {
        let o = square(0.0, 0.0, 4.0);
        assert!(o.is_visible(PointF::new(0.0, 0.0)));
        assert!(o.is_visible(PointF::new(3.5, 3.5)));
        assert!(!o.is_visible(PointF::new(4.0, 2.0)));
        assert!(!o.is_visible(PointF::new(2.0, 4.0)));
    }

    #[test]
    fn test_from_region_single_scan_is_rectangle() {
        let region = Region::from_rect(Rect::new(2, 3, 4, 5));
        let o = Outline::from_region(&region);
        assert_eq!(o.figure_count(), 1);
        assert_eq!(o.bounds(), RectF::new(2.0, 3.0, 4.0, 5.0));
    }

    #[test]
    fn test_from_region_traces_l_shape() {
        let region = Region::from_rects(&[Rect::new(0, 0, 4, 2), Rect::new(0, 2, 2, 2)]);
        let o = Outline::from_region(&region);
        assert_eq!(o.figure_count(), 1);
        assert_eq!(o.point_count(), 6);
        assert_eq!(o.region(), &region);
    }

    #[test]
    fn test_data_round_trip() {
        let mut o = square(1.0, 1.0, 2.0);
        o.add_lines(&[PointF::new(5.0, 5.0), PointF::new(7.0, 5.0), PointF::new(7.0, 7.0)]);
        o.set_fill_rule(FillRule::NonZero);
        let data = o.to_data();
        assert_eq!(data.types[0], POINT_TYPE_START);
        assert_eq!(data.types[3], POINT_TYPE_LINE | POINT_FLAG_CLOSE);
        let back = Outline::from_data(&data).unwrap();
        assert_eq!(back, o);
    }

    #[test]
    fn test_cubic_flattened_on_load() {
        let data = OutlineData {
            points: vec![[0.0, 0.0], [0.0, 10.0], [10.0, 10.0], [10.0, 0.0]],
            types: vec![0, 3, 3, 3 | POINT_FLAG_CLOSE],
            fill_mode: 0,
        };
        let o = Outline::from_data(&data).unwrap();
        assert_eq!(o.figure_count(), 1);
        assert_eq!(o.point_count(), 1 + CUBIC_FLATTEN_STEPS);
        assert!(o.is_figure_closed(0));
        assert_eq!(o.figures()[0].last(), Some(&PointF::new(10.0, 0.0)));
    }

    #[test]
    fn test_malformed_data_rejected() {
        let bad_type = OutlineData { points: vec![[0.0, 0.0]], types: vec![2], fill_mode: 0 };
        assert!(matches!(Outline::from_data(&bad_type), Err(Error::InvalidArgument(_))));
        let bad_fill = OutlineData { points: vec![], types: vec![], fill_mode: 9 };
        assert!(matches!(Outline::from_data(&bad_fill), Err(Error::InvalidArgument(_))));
        let mismatch = OutlineData { points: vec![[0.0, 0.0]], types: vec![], fill_mode: 0 };
        assert!(Outline::from_data(&mismatch).is_err());
        let truncated = OutlineData {
            points: vec![[0.0, 0.0], [1.0, 1.0]],
            types: vec![0, 3],
            fill_mode: 0,
        };
        assert!(Outline::from_data(&truncated).is_err());
    }

    #[test]
    fn test_ellipse_is_roughly_round() {
        let mut o = Outline::new();
        o.add_ellipse(RectF::new(0.0, 0.0, 100.0, 100.0));
        let area = o.region().area() as f64;
        let expected = std::f64::consts::PI * 50.0 * 50.0;
        assert!((area - expected).abs() / expected < 0.01);
        assert!(o.is_visible(PointF::new(50.0, 50.0)));
        assert!(!o.is_visible(PointF::new(2.0, 2.0)));
    }
}
