use image::{Rgba, RgbaImage};

use pixelsel::geometry::{combine, BitMatrix};
use pixelsel::history::HistoryManager;
use pixelsel::selection::{ContinuationShape, SelectionEvent};
use pixelsel::{Affine, CombineMode, MaskedBuffer, Outline, Point, Rect, RectF, Region, Sampling, Selection};

use std::sync::{Arc, Mutex};

fn checker(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        if (x / 2 + y / 2) % 2 == 0 {
            Rgba([250, 20, 20, 255])
        } else {
            Rgba([20, 20, 250, 255])
        }
    })
}

#[test]
fn test_stencil_trace_rasterize_round_trip() {
    let mut stencil = BitMatrix::new(12, 10);
    stencil.set_rect(&Rect::new(1, 1, 6, 6), true);
    stencil.set_rect(&Rect::new(3, 3, 2, 2), false);
    stencil.set_rect(&Rect::new(8, 2, 3, 7), true);
    let original = stencil.clone();

    let bounds = stencil.bounds();
    let outline = pixelsel::geometry::trace(&mut stencil, bounds);
    assert_eq!(outline.figure_count(), 3);

    let back = pixelsel::geometry::rasterize(&outline, 12, 10);
    for y in 0..10 {
        for x in 0..12 {
            assert_eq!(back.get(x, y).unwrap(), original.get(x, y).unwrap(), "pixel {},{}", x, y);
        }
    }
}

#[test]
fn test_selection_continuation_matches_direct_combine() {
    let mut base = Outline::new();
    base.add_rectangle(RectF::new(0.0, 0.0, 20.0, 20.0));
    let mut shape = Outline::new();
    shape.add_ellipse(RectF::new(10.0, 10.0, 20.0, 20.0));

    for mode in CombineMode::ALL {
        let mut sel = Selection::new();
        sel.set_continuation_rect(Rect::new(0, 0, 20, 20), CombineMode::Replace);
        sel.commit_continuation();
        sel.set_continuation_ellipse(RectF::new(10.0, 10.0, 20.0, 20.0), mode);
        let expected = combine(&base, mode, &shape);
        assert_eq!(sel.create_region_raw(), *expected.region(), "mode {}", mode);
    }
}

#[test]
fn test_edit_session_with_undo_and_masked_move() {
    let src = checker(64, 48);
    let mut sel = Selection::with_clip_rect(Rect::new(0, 0, 64, 48));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    sel.subscribe(move |e| sink.lock().unwrap().push(e));

    let mut history = HistoryManager::new(20);
    history.record("Rectangle", &mut sel, |s| {
        s.set_continuation(ContinuationShape::Rect(Rect::new(4, 4, 16, 12)), CombineMode::Replace);
        s.commit_continuation();
    });
    history.record("Add rectangle", &mut sel, |s| {
        s.set_continuation(ContinuationShape::Rect(Rect::new(12, 10, 16, 12)), CombineMode::Union);
        s.commit_continuation();
    });
    let region = sel.create_region();
    assert_eq!(region.area(), 16 * 12 * 2 - 8 * 6);
    assert!(sel.is_visible(Point::new(25, 20)));
    assert!(!sel.is_visible(Point::new(25, 5)));

    // every recorded edit produced balanced notifications
    {
        let ev = events.lock().unwrap();
        assert!(!ev.is_empty());
        assert_eq!(ev.len() % 2, 0);
        assert!(ev.chunks(2).all(|p| p == [SelectionEvent::Changing, SelectionEvent::Changed]));
    }

    let buffer = MaskedBuffer::extract(&src, &region);
    let mut dst = RgbaImage::from_pixel(64, 48, Rgba([0, 0, 0, 0]));
    buffer.draw(&mut dst, &Affine::translation(30.0, 20.0), Sampling::NearestNeighbor).unwrap();

    let mut moved = region.clone();
    moved.translate(30, 20);
    for (x, y, p) in dst.enumerate_pixels() {
        let pt = Point::new(x as i32, y as i32);
        if moved.is_visible(pt) {
            assert_eq!(p, src.get_pixel(x - 30, y - 20));
        } else {
            assert_eq!(p[3], 0);
        }
    }

    history.undo(&mut sel);
    assert_eq!(sel.create_region(), Region::from_rect(Rect::new(4, 4, 16, 12)));
    history.redo(&mut sel);
    assert_eq!(sel.create_region(), region);
}

#[test]
fn test_rotated_draw_stays_inside_transformed_region() {
    let src = checker(40, 40);
    let region = Region::from_rect(Rect::new(10, 10, 20, 20));
    let buffer = MaskedBuffer::extract(&src, &region);
    let m = Affine::rotation_about(30.0, 20.0, 20.0);

    for sampling in [Sampling::NearestNeighbor, Sampling::Bilinear] {
        let mut dst = RgbaImage::new(40, 40);
        buffer.draw_with_buckets(&mut dst, &m, sampling, 5).unwrap();

        let mut rotated = region.clone();
        rotated.transform(&m);
        for (x, y, p) in dst.enumerate_pixels() {
            if !rotated.is_visible(Point::new(x as i32, y as i32)) {
                assert_eq!(p[3], 0, "{:?} wrote outside the mask at {},{}", sampling, x, y);
            }
        }
        // centre pixel maps to itself under a rotation about the centre
        assert_eq!(dst.get_pixel(20, 20)[3], 255);
    }
}
