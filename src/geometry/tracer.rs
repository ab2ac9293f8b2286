// ============================================================================
// BOUNDARY TRACER - stencil ↔ outline conversion
// ============================================================================
//
// Tracing walks a cursor along grid corners with the covered cells on its
// right-hand side. Every time the walk changes direction a vertex is emitted,
// so a traced island is a rectilinear polygon with integer vertices. Once an
// island is closed its scanlines are XOR-inverted in the stencil: this clears
// the island and turns any holes inside it into fresh islands, which the
// even-odd fill rule then renders as holes again.

use crate::log_err;

use super::outline::{FillRule, Outline};
use super::rect::{Point, PointF, Rect, Scanline};
use super::stencil::BitMatrix;

/// Rows further than this from the origin are never scan converted.
pub(crate) const COORD_LIMIT: i32 = 1 << 22;

/// Trace every island of `stencil` inside `bounds` into polygons, offset by
/// `(translate_x, translate_y)`.
///
/// NOTE: the stencil is consumed; all bits inside `bounds` are clear on return.
pub fn trace_polygons(
    stencil: &mut BitMatrix,
    bounds: Rect,
    translate_x: i32,
    translate_y: i32,
) -> Vec<Vec<Point>> {
    let bounds = bounds.intersect(&stencil.bounds());
    let mut polygons = Vec::new();
    if stencil.is_empty() || bounds.is_empty() {
        return polygons;
    }

    let max_steps = 4 * (bounds.width as usize + 1) * (bounds.height as usize + 1);
    let mut start = Point::new(bounds.left(), bounds.top());
    let mut pts: Vec<Point> = Vec::new();

    // find all islands
    loop {
        let mut found = false;
        while start.y < bounds.bottom() {
            if stencil.bit(start.x, start.y) {
                found = true;
                break;
            }
            start.x += 1;
            if start.x >= bounds.right() {
                start.x = bounds.left();
                start.y += 1;
            }
        }
        if !found {
            break;
        }

        pts.clear();
        let mut last = Point::new(start.x, start.y + 1);
        let mut curr = start;
        let mut steps = 0usize;

        // trace island outline
        loop {
            let (dx, dy) = (curr.x - last.x, curr.y - last.y);

            // The two cells diagonally ahead of the cursor.
            let left = Point::new((dx + dy + 2) / 2 + curr.x - 1, (dy - dx + 2) / 2 + curr.y - 1);
            let right = Point::new((dx - dy + 2) / 2 + curr.x - 1, (dy + dx + 2) / 2 + curr.y - 1);

            let next = if bounds.contains(left) && stencil.bit(left.x, left.y) {
                // turn left
                Point::new(curr.x + dy, curr.y - dx)
            } else if bounds.contains(right) && stencil.bit(right.x, right.y) {
                // straight on
                Point::new(curr.x + dx, curr.y + dy)
            } else {
                // turn right
                Point::new(curr.x - dy, curr.y + dx)
            };

            if (next.x - curr.x).signum() != dx.signum() || (next.y - curr.y).signum() != dy.signum() {
                pts.push(curr);
            }

            last = curr;
            curr = next;

            if next == start {
                break;
            }

            steps += 1;
            if steps > max_steps {
                log_err!("trace: walk did not close after {} steps at {:?}", steps, start);
                break;
            }
        }

        for scan in polygon_scans(&pts) {
            stencil.invert_span(&scan);
        }

        polygons.push(
            pts.iter()
                .map(|p| Point::new(p.x + translate_x, p.y + translate_y))
                .collect(),
        );
    }

    polygons
}

/// Trace `stencil` inside `bounds` into an even-odd outline.
///
/// NOTE: the stencil is consumed; see [`trace_polygons`].
pub fn trace(stencil: &mut BitMatrix, bounds: Rect) -> Outline {
    let polygons = trace_polygons(stencil, bounds, 0, 0);
    let mut outline = Outline::new();
    for poly in &polygons {
        outline.add_polygon(poly.iter().map(|&p| PointF::from(p)));
    }
    outline
}

/// Rasterize `outline` into a fresh `width × height` stencil whose cell
/// `(0, 0)` is the outline's pixel `(0, 0)`.
pub fn rasterize(outline: &Outline, width: i32, height: i32) -> BitMatrix {
    let mut stencil = BitMatrix::new(width, height);
    rasterize_into(outline, &mut stencil, Point::new(0, 0), true);
    stencil
}

/// Rasterize `outline` into `stencil`, where stencil cell `(0, 0)` maps to
/// outline pixel `origin`. Covered cells are set to `value`.
pub fn rasterize_into(outline: &Outline, stencil: &mut BitMatrix, origin: Point, value: bool) {
    let clip = stencil.bounds().offset(origin.x, origin.y);
    for scan in fill_spans(outline.figures(), outline.fill_rule(), Some(clip)) {
        stencil.set_span(&Scanline::new(scan.x - origin.x, scan.y - origin.y, scan.length), value);
    }
}

/// Even-odd scanlines of a single integer polygon.
pub fn polygon_scans(points: &[Point]) -> Vec<Scanline> {
    let figure: Vec<PointF> = points.iter().map(|&p| PointF::from(p)).collect();
    fill_spans(std::slice::from_ref(&figure), FillRule::EvenOdd, None)
}

struct Edge {
    y_top: f64,
    y_bottom: f64,
    x_at_top: f64,
    dxdy: f64,
    winding: i32,
}

impl Edge {
    #[inline]
    fn x_at(&self, y: f64) -> f64 {
        self.x_at_top + (y - self.y_top) * self.dxdy
    }
}

/// Scan convert closed figures into pixel spans. A pixel is covered when its
/// centre `(x + 0.5, y + 0.5)` is inside according to `rule`. Spans come out
/// sorted by row, then by x, and never overlap.
pub fn fill_spans(figures: &[Vec<PointF>], rule: FillRule, clip: Option<Rect>) -> Vec<Scanline> {
    let mut edges: Vec<Edge> = Vec::new();
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for fig in figures {
        if fig.len() < 2 {
            continue;
        }
        for i in 0..fig.len() {
            let a = fig[i];
            let b = fig[(i + 1) % fig.len()];
            if !(a.x.is_finite() && a.y.is_finite() && b.x.is_finite() && b.y.is_finite()) {
                continue;
            }
            if a.y == b.y {
                continue;
            }
            let (top, bottom, winding) = if a.y < b.y { (a, b, 1) } else { (b, a, -1) };
            edges.push(Edge {
                y_top: top.y,
                y_bottom: bottom.y,
                x_at_top: top.x,
                dxdy: (bottom.x - top.x) / (bottom.y - top.y),
                winding,
            });
            min_y = min_y.min(top.y);
            max_y = max_y.max(bottom.y);
        }
    }

    let mut out = Vec::new();
    if edges.is_empty() {
        return out;
    }

    // Rows whose centres can fall inside [min_y, max_y).
    let mut row_start = (min_y - 0.5).ceil().max(-(COORD_LIMIT as f64)) as i32;
    let mut row_end = (max_y - 0.5).ceil().min(COORD_LIMIT as f64) as i32;
    let (col_min, col_max) = match clip {
        Some(c) => {
            row_start = row_start.max(c.top());
            row_end = row_end.min(c.bottom());
            (c.left(), c.right())
        }
        None => (-COORD_LIMIT, COORD_LIMIT),
    };
    if row_start >= row_end || col_min >= col_max {
        return out;
    }

    edges.sort_by(|a, b| a.y_top.total_cmp(&b.y_top));
    let mut next_edge = 0usize;
    let mut active: Vec<usize> = Vec::new();
    let mut crossings: Vec<(f64, i32)> = Vec::new();

    for y in row_start..row_end {
        let yc = y as f64 + 0.5;

        while next_edge < edges.len() && edges[next_edge].y_top <= yc {
            active.push(next_edge);
            next_edge += 1;
        }
        active.retain(|&i| edges[i].y_bottom > yc);
        if active.is_empty() {
            if next_edge >= edges.len() {
                break;
            }
            continue;
        }

        crossings.clear();
        for &i in &active {
            let e = &edges[i];
            if e.y_top <= yc {
                crossings.push((e.x_at(yc), e.winding));
            }
        }
        crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut winding = 0;
        let mut span_start = 0.0;
        let mut row_spans: Vec<(i32, i32)> = Vec::new();
        for &(x, w) in &crossings {
            let was_inside = match rule {
                FillRule::EvenOdd => winding % 2 != 0,
                FillRule::NonZero => winding != 0,
            };
            winding += match rule {
                FillRule::EvenOdd => 1,
                FillRule::NonZero => w,
            };
            let is_inside = match rule {
                FillRule::EvenOdd => winding % 2 != 0,
                FillRule::NonZero => winding != 0,
            };
            if !was_inside && is_inside {
                span_start = x;
            } else if was_inside && !is_inside {
                let x0 = ((span_start - 0.5).ceil().max(col_min as f64)) as i32;
                let x1 = ((x - 0.5).ceil().min(col_max as f64)) as i32;
                if x1 > x0 {
                    match row_spans.last_mut() {
                        Some(last) if last.1 >= x0 => last.1 = last.1.max(x1),
                        _ => row_spans.push((x0, x1)),
                    }
                }
            }
        }
        out.extend(row_spans.into_iter().map(|(x0, x1)| Scanline::new(x0, y, x1 - x0)));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Region;

    fn block_stencil() -> BitMatrix {
        let mut s = BitMatrix::new(4, 4);
        s.set_rect(&Rect::new(1, 1, 2, 2), true);
        s
    }

    #[test]
    fn test_empty_stencil_traces_to_empty_outline() {
        let mut s = BitMatrix::new(5, 5);
        let outline = trace(&mut s, Rect::new(0, 0, 5, 5));
        assert!(outline.is_empty());
        assert_eq!(outline.figure_count(), 0);
    }

    #[test]
    fn test_block_traces_to_four_vertices() {
        let mut s = block_stencil();
        let polys = trace_polygons(&mut s, Rect::new(0, 0, 4, 4), 0, 0);
        assert_eq!(polys.len(), 1);
        assert_eq!(
            polys[0],
            vec![Point::new(1, 1), Point::new(3, 1), Point::new(3, 3), Point::new(1, 3)]
        );
        assert!(!s.any_set());
    }

    #[test]
    fn test_block_outline_region_is_single_scan() {
        let mut s = block_stencil();
        let outline = trace(&mut s, Rect::new(0, 0, 4, 4));
        assert_eq!(outline.figure_count(), 1);
        let region = Region::from_outline(&outline);
        assert_eq!(&*region.scans(), &[Rect::new(1, 1, 2, 2)]);
        assert_eq!(region.area(), 4);
    }

    #[test]
    fn test_translation_applied_to_vertices() {
        let mut s = block_stencil();
        let polys = trace_polygons(&mut s, Rect::new(0, 0, 4, 4), 10, -1);
        assert_eq!(polys[0][0], Point::new(11, 0));
    }

    #[test]
    fn test_round_trip_with_hole() {
        let mut s = BitMatrix::new(8, 8);
        s.set_rect(&Rect::new(1, 1, 5, 5), true);
        s.set_rect(&Rect::new(2, 2, 2, 2), false);
        s.set_rect(&Rect::new(0, 7, 3, 1), true);
        let original = s.clone();

        let outline = trace(&mut s, Rect::new(0, 0, 8, 8));
        assert_eq!(outline.figure_count(), 3);
        assert_eq!(rasterize(&outline, 8, 8), original);
    }

    #[test]
    fn test_round_trip_touching_diagonals() {
        let mut s = BitMatrix::new(4, 4);
        s.set_rect(&Rect::new(0, 0, 2, 2), true);
        s.set_rect(&Rect::new(2, 2, 2, 2), true);
        let original = s.clone();
        let bounds = s.bounds();
        let outline = trace(&mut s, bounds);
        assert_eq!(rasterize(&outline, 4, 4), original);
    }

    #[test]
    fn test_polygon_scans_rectangle() {
        let pts = [Point::new(1, 1), Point::new(3, 1), Point::new(3, 3), Point::new(1, 3)];
        assert_eq!(polygon_scans(&pts), vec![Scanline::new(1, 1, 2), Scanline::new(1, 2, 2)]);
    }

    #[test]
    fn test_fill_rules_differ_on_overlap() {
        // Two overlapping squares wound the same way.
        let a = vec![
            PointF::new(0.0, 0.0), PointF::new(4.0, 0.0), PointF::new(4.0, 4.0), PointF::new(0.0, 4.0),
        ];
        let b = vec![
            PointF::new(2.0, 0.0), PointF::new(6.0, 0.0), PointF::new(6.0, 4.0), PointF::new(2.0, 4.0),
        ];
        let figs = vec![a, b];
        let even_odd = fill_spans(&figs, FillRule::EvenOdd, None);
        let non_zero = fill_spans(&figs, FillRule::NonZero, None);
        assert_eq!(even_odd[0], Scanline::new(0, 0, 2));
        assert_eq!(even_odd[1], Scanline::new(4, 0, 2));
        assert_eq!(non_zero[0], Scanline::new(0, 0, 6));
    }

    #[test]
    fn test_clip_limits_rows_and_columns() {
        let fig = vec![
            PointF::new(-10.0, -10.0), PointF::new(10.0, -10.0), PointF::new(10.0, 10.0), PointF::new(-10.0, 10.0),
        ];
        let spans = fill_spans(&[fig], FillRule::EvenOdd, Some(Rect::new(0, 0, 3, 2)));
        assert_eq!(spans, vec![Scanline::new(0, 0, 3), Scanline::new(0, 1, 3)]);
    }
}
