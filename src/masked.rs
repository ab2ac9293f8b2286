// ============================================================================
// MASKED BUFFER - irregularly shaped pixel block + transformed compositing
// ============================================================================
//
// A MaskedBuffer holds the pixels under a region, cropped to the region's
// bounding box, together with the region itself. Drawing maps every covered
// destination pixel back through the inverse transform and samples the
// buffer, so pixels outside the (transformed) region are never touched.

use std::sync::{Arc, OnceLock};

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::{Affine, Outline, Point, PointF, Rect, Region};
use crate::{log_info, log_warn};

// Fixed-point stepping for nearest-neighbour sampling.
const FP_SHIFT: u32 = 14;
const FP_MULT: f64 = (1 << FP_SHIFT) as f64;
const FP_MAX_VALUE: f64 = ((1 << (31 - FP_SHIFT)) - 1) as f64;
const FP_ROUND: i64 = ((1 << FP_SHIFT) >> 1) - 1;

/// Resampling used when drawing through a transform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sampling {
    NearestNeighbor,
    #[default]
    Bilinear,
}

impl Sampling {
    pub fn code(self) -> u8 {
        match self {
            Sampling::NearestNeighbor => 0,
            Sampling::Bilinear => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Sampling::NearestNeighbor => "nearest",
            Sampling::Bilinear => "bilinear",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "nearest" | "nearest-neighbor" | "nn" => Some(Sampling::NearestNeighbor),
            "bilinear" | "linear" => Some(Sampling::Bilinear),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Sampling {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Sampling::NearestNeighbor),
            1 => Ok(Sampling::Bilinear),
            other => Err(Error::invalid_argument(format!("unknown sampling code {}", other))),
        }
    }
}

struct Contents {
    /// `None` when the clipped region is empty.
    pixels: Option<Arc<RgbaImage>>,
    /// Canvas position of pixel (0, 0) of `pixels`.
    origin: Point,
    region: Region,
    outline: OnceLock<Outline>,
}

impl Clone for Contents {
    fn clone(&self) -> Self {
        Self {
            pixels: self.pixels.clone(),
            origin: self.origin,
            region: self.region.clone(),
            outline: self.outline.clone(),
        }
    }
}

/// Pixels of a source image under a mask. Immutable once built; clones
/// share the pixel data.
#[derive(Clone)]
pub struct MaskedBuffer {
    contents: Option<Contents>,
}

impl std::fmt::Debug for MaskedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.contents {
            Some(c) => f
                .debug_struct("MaskedBuffer")
                .field("origin", &c.origin)
                .field("size", &c.pixels.as_ref().map(|p| p.dimensions()))
                .field("region", &c.region)
                .finish(),
            None => f.write_str("MaskedBuffer(released)"),
        }
    }
}

/// Everything a worker needs to fill its share of the destination.
struct DrawContext<'a> {
    src: &'a RgbaImage,
    inverse: Affine,
    bounds_x: i32,
    bounds_y: i32,
    dsxddx: f64,
    dsyddx: f64,
    dsxddy: f64,
    dsyddy: f64,
    fp_dsxddx: i64,
    fp_dsyddx: i64,
    fp_dsxddy: i64,
    fp_dsyddy: i64,
    scans: &'a [Rect],
    dst_width: u32,
    sampling: Sampling,
}

impl MaskedBuffer {
    // ========================================================================
    // CONSTRUCTION
    // ========================================================================

    /// Copy the pixels of `source` covered by `roi`. The region is clipped to
    /// the source bounds first; uncovered pixels of the buffer stay
    /// transparent.
    pub fn extract(source: &RgbaImage, roi: &Region) -> Self {
        let mut clipped = roi.clone();
        clipped.intersect(image_bounds(source));
        Self::build(source, clipped, None)
    }

    /// Like [`MaskedBuffer::extract`] with the mask given as an outline.
    pub fn extract_outline(source: &RgbaImage, outline: &Outline) -> Self {
        let src_bounds = image_bounds(source);
        let bounds = outline.bounds().round_out();
        if bounds.intersect(&src_bounds) == bounds && !bounds.is_empty() {
            Self::build(source, outline.region().clone(), Some(outline.clone()))
        } else {
            let mut clipped = outline.region().clone();
            clipped.intersect(src_bounds);
            Self::build(source, clipped, None)
        }
    }

    fn build(source: &RgbaImage, region: Region, outline: Option<Outline>) -> Self {
        let bounds = region.bounds();
        let pixels = if bounds.is_empty() {
            None
        } else {
            let mut buf = RgbaImage::new(bounds.width as u32, bounds.height as u32);
            let row_bytes = bounds.width as usize * 4;
            let src_stride = source.width() as usize * 4;
            let src_raw = source.as_raw();
            let dst_raw: &mut [u8] = buf.as_mut();
            for scan in region.scans().iter() {
                let len = scan.width as usize * 4;
                for y in scan.top()..scan.bottom() {
                    let s = y as usize * src_stride + scan.x as usize * 4;
                    let d = (y - bounds.y) as usize * row_bytes + (scan.x - bounds.x) as usize * 4;
                    dst_raw[d..d + len].copy_from_slice(&src_raw[s..s + len]);
                }
            }
            Some(Arc::new(buf))
        };

        let cell = OnceLock::new();
        if let Some(o) = outline {
            let _ = cell.set(o);
        }
        Self {
            contents: Some(Contents {
                pixels,
                origin: Point::new(bounds.x, bounds.y),
                region,
                outline: cell,
            }),
        }
    }

    /// Reassemble a buffer from stored parts. `pixels` must be sized to the
    /// region's bounding box.
    pub fn from_parts(pixels: Option<RgbaImage>, region: Region) -> Result<Self> {
        let bounds = region.bounds();
        match &pixels {
            Some(p) if p.dimensions() != (bounds.width as u32, bounds.height as u32) => {
                return Err(Error::invalid_argument(format!(
                    "pixel buffer is {}x{} but region bounds are {}x{}",
                    p.width(),
                    p.height(),
                    bounds.width,
                    bounds.height
                )));
            }
            None if !bounds.is_empty() => {
                return Err(Error::invalid_argument("non-empty region without pixel data"));
            }
            _ => {}
        }
        Ok(Self {
            contents: Some(Contents {
                pixels: pixels.map(Arc::new),
                origin: Point::new(bounds.x, bounds.y),
                region,
                outline: OnceLock::new(),
            }),
        })
    }

    fn contents(&self) -> Result<&Contents> {
        self.contents.as_ref().ok_or(Error::AlreadyReleased("MaskedBuffer"))
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// Copy of the mask region, in source coordinates.
    pub fn region(&self) -> Result<Region> {
        Ok(self.contents()?.region.clone())
    }

    /// Pixel-edge outline of the mask, traced on first use.
    pub fn outline(&self) -> Result<Outline> {
        let c = self.contents()?;
        Ok(c.outline.get_or_init(|| Outline::from_region(&c.region)).clone())
    }

    /// Canvas rectangle covered by the pixel buffer.
    pub fn bounds(&self) -> Result<Rect> {
        let c = self.contents()?;
        Ok(match &c.pixels {
            Some(p) => Rect::new(c.origin.x, c.origin.y, p.width() as i32, p.height() as i32),
            None => Rect::default(),
        })
    }

    pub fn pixels(&self) -> Result<Option<&RgbaImage>> {
        Ok(self.contents()?.pixels.as_deref())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.contents()?.pixels.is_none())
    }

    pub fn is_released(&self) -> bool {
        self.contents.is_none()
    }

    /// Drop the pixel data and mask now. Later calls fail with
    /// [`Error::AlreadyReleased`].
    pub fn release(&mut self) -> Result<()> {
        self.contents()?;
        self.contents = None;
        Ok(())
    }

    // ========================================================================
    // DRAWING
    // ========================================================================

    /// Draw translated by whole pixels.
    pub fn draw_at(&self, dst: &mut RgbaImage, tx: i32, ty: i32) -> Result<()> {
        self.draw(dst, &Affine::translation(tx as f64, ty as f64), Sampling::Bilinear)
    }

    /// Draw through `transform` using one bucket per rayon worker.
    pub fn draw(&self, dst: &mut RgbaImage, transform: &Affine, sampling: Sampling) -> Result<()> {
        self.draw_with_buckets(dst, transform, sampling, rayon::current_num_threads())
    }

    /// Draw through `transform`, splitting the destination into `buckets`
    /// horizontal strips. All strips but the last are handed to the rayon
    /// pool; the last one is drawn on the calling thread.
    pub fn draw_with_buckets(
        &self,
        dst: &mut RgbaImage,
        transform: &Affine,
        sampling: Sampling,
        buckets: usize,
    ) -> Result<()> {
        let c = self.contents()?;
        let Some(src) = c.pixels.as_deref() else {
            return Ok(());
        };
        let Some(inverse) = transform.invert() else {
            log_warn!("MaskedBuffer::draw: transform {:?} is not invertible, nothing drawn", transform);
            return Ok(());
        };

        let mut dst_region = c.region.clone();
        dst_region.transform(transform);
        let dst_bounds = image_bounds(dst);
        let scans: Vec<Rect> = dst_region
            .scans()
            .iter()
            .map(|r| r.intersect(&dst_bounds))
            .filter(|r| !r.is_empty())
            .collect();
        if scans.is_empty() {
            return Ok(());
        }

        // change in source-[x|y] w.r.t. destination-[x|y]
        let clamp_delta = |v: f64| if v.abs() > FP_MAX_VALUE { 0.0 } else { v };
        let ddx = inverse.transform_vector(PointF::new(1.0, 0.0));
        let ddy = inverse.transform_vector(PointF::new(0.0, 1.0));
        let (dsxddx, dsyddx) = (clamp_delta(ddx.x), clamp_delta(ddx.y));
        let (dsxddy, dsyddy) = (clamp_delta(ddy.x), clamp_delta(ddy.y));

        let ctx = DrawContext {
            src,
            inverse,
            bounds_x: c.origin.x,
            bounds_y: c.origin.y,
            dsxddx,
            dsyddx,
            dsxddy,
            dsyddy,
            fp_dsxddx: (dsxddx * FP_MULT) as i64,
            fp_dsyddx: (dsyddx * FP_MULT) as i64,
            fp_dsxddy: (dsxddy * FP_MULT) as i64,
            fp_dsyddy: (dsyddy * FP_MULT) as i64,
            scans: &scans,
            dst_width: dst.width(),
            sampling,
        };

        let covered = scans.iter().fold(Rect::default(), |acc, r| acc.union(r));
        let strips = covered.split(buckets.max(1));
        let row_bytes = dst.width() as usize * 4;

        // Carve the destination into one disjoint row slice per strip.
        let dst_raw: &mut [u8] = dst.as_mut();
        let mut rest = &mut dst_raw[covered.top() as usize * row_bytes..];
        let mut work: Vec<(Rect, &mut [u8])> = Vec::with_capacity(strips.len());
        for strip in strips {
            let (head, tail) = rest.split_at_mut(strip.height as usize * row_bytes);
            work.push((strip, head));
            rest = tail;
        }

        log_info!(
            "MaskedBuffer::draw: {} scans into {} strips ({:?})",
            scans.len(),
            work.len(),
            sampling
        );

        let last = work.pop();
        let ctx = &ctx;
        rayon::scope(|s| {
            for (strip, rows) in work {
                s.spawn(move |_| ctx.draw_strip(strip, rows));
            }
            if let Some((strip, rows)) = last {
                ctx.draw_strip(strip, rows);
            }
        });
        Ok(())
    }
}

impl DrawContext<'_> {
    /// `rows` holds the destination rows `strip.top()..strip.bottom()`.
    fn draw_strip(&self, strip: Rect, rows: &mut [u8]) {
        if strip.is_empty() {
            return;
        }
        for scan in self.scans {
            let r = scan.intersect(&strip);
            if r.is_empty() {
                continue;
            }
            match self.sampling {
                Sampling::NearestNeighbor => self.draw_rect_nearest(r, strip.top(), rows),
                Sampling::Bilinear => self.draw_rect_bilinear(r, strip.top(), rows),
            }
        }
    }

    fn row_span<'r>(&self, rows: &'r mut [u8], strip_top: i32, y: i32, r: &Rect) -> &'r mut [u8] {
        let row_bytes = self.dst_width as usize * 4;
        let start = (y - strip_top) as usize * row_bytes;
        &mut rows[start + r.left() as usize * 4..start + r.right() as usize * 4]
    }

    /// Source position of destination pixel `(x, y)`, relative to the buffer.
    fn source_origin(&self, x: i32, y: i32) -> PointF {
        let p = self.inverse.transform_point(PointF::new(x as f64, y as f64));
        PointF::new(p.x - self.bounds_x as f64, p.y - self.bounds_y as f64)
    }

    fn draw_rect_nearest(&self, r: Rect, strip_top: i32, rows: &mut [u8]) {
        let origin = self.source_origin(r.left(), r.top());
        let mut fp_row_x = (origin.x * FP_MULT) as i64;
        let mut fp_row_y = (origin.y * FP_MULT) as i64;

        for y in r.top()..r.bottom() {
            let (fp_col_x, fp_col_y) = (fp_row_x, fp_row_y);
            fp_row_x += self.fp_dsxddy;
            fp_row_y += self.fp_dsyddy;
            let row = self.row_span(rows, strip_top, y, &r);
            self.nearest_row(row, fp_col_x, fp_col_y);
        }
    }

    /// One destination row. The left and right ends clamp their source
    /// coordinates until they find a pixel that needed no clamping; the
    /// source coordinates are monotonic along the row, so every pixel
    /// between those two is in range and is copied without clamping.
    fn nearest_row(&self, row: &mut [u8], mut fx: i64, mut fy: i64) {
        let src = self.src.as_raw();
        let sw = self.src.width() as i64;
        let sh = self.src.height() as i64;
        let stride = sw as usize * 4;
        let width = row.len() / 4;
        if width == 0 {
            return;
        }

        let mut copy = |di: usize, sx: i64, sy: i64| {
            let s = sy as usize * stride + sx as usize * 4;
            row[di * 4..di * 4 + 4].copy_from_slice(&src[s..s + 4]);
        };

        // Left side
        let mut i = 0;
        while i < width {
            let ux = (fx + FP_ROUND) >> FP_SHIFT;
            let uy = (fy + FP_ROUND) >> FP_SHIFT;
            let sx = ux.clamp(0, sw - 1);
            let sy = uy.clamp(0, sh - 1);
            copy(i, sx, sy);
            i += 1;
            fx += self.fp_dsxddx;
            fy += self.fp_dsyddx;
            if sx == ux && sy == uy {
                break;
            }
        }
        let start_fast = i;

        // Right side
        let steps_back = (width - 1) as i64;
        let mut lx = fx + self.fp_dsxddx * (steps_back - start_fast as i64);
        let mut ly = fy + self.fp_dsyddx * (steps_back - start_fast as i64);
        let mut end_fast = width;
        while end_fast > start_fast {
            let k = end_fast - 1;
            let ux = (lx + FP_ROUND) >> FP_SHIFT;
            let uy = (ly + FP_ROUND) >> FP_SHIFT;
            let sx = ux.clamp(0, sw - 1);
            let sy = uy.clamp(0, sh - 1);
            copy(k, sx, sy);
            end_fast = k;
            if sx == ux && sy == uy {
                break;
            }
            lx -= self.fp_dsxddx;
            ly -= self.fp_dsyddx;
        }

        // Middle
        for k in start_fast..end_fast {
            let sx = (fx + FP_ROUND) >> FP_SHIFT;
            let sy = (fy + FP_ROUND) >> FP_SHIFT;
            debug_assert!(sx >= 0 && sx < sw && sy >= 0 && sy < sh);
            copy(k, sx, sy);
            fx += self.fp_dsxddx;
            fy += self.fp_dsyddx;
        }
    }

    fn draw_rect_bilinear(&self, r: Rect, strip_top: i32, rows: &mut [u8]) {
        let mut origin = self.source_origin(r.left(), r.top());
        // tiny negative values from rounding would otherwise sample as transparent
        origin.x = origin.x.max(0.0);
        origin.y = origin.y.max(0.0);

        let mut row_pt = origin;
        for y in r.top()..r.bottom() {
            let mut col = row_pt;
            row_pt.x += self.dsxddy;
            row_pt.y += self.dsyddy;
            let row = self.row_span(rows, strip_top, y, &r);
            for px in row.chunks_exact_mut(4) {
                px.copy_from_slice(&bilinear_sample(self.src, col.x, col.y).0);
                col.x += self.dsxddx;
                col.y += self.dsyddx;
            }
        }
    }
}

fn image_bounds(img: &RgbaImage) -> Rect {
    Rect::new(0, 0, img.width() as i32, img.height() as i32)
}

/// Bilinear sample at `(x, y)` with 8-bit fractional weights. The right and
/// bottom neighbours clamp at the last column/row; positions outside
/// `[0, w) × [0, h)` (or NaN) are transparent.
pub fn bilinear_sample(img: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let (w, h) = (img.width() as i64, img.height() as i64);
    if !(x >= 0.0 && y >= 0.0 && x < w as f64 && y < h as f64) {
        return Rgba([0, 0, 0, 0]);
    }

    let iu = x.floor() as i64;
    let iv = y.floor() as i64;
    let sxfrac = (256.0 * (x - iu as f64)) as u32;
    let syfrac = (256.0 * (y - iv as f64)) as u32;
    let sxfracinv = 256 - sxfrac;
    let syfracinv = 256 - syfrac;

    let wul = sxfracinv * syfracinv;
    let wur = sxfrac * syfracinv;
    let wll = sxfracinv * syfrac;
    let wlr = sxfrac * syfrac;

    let left = iu as u32;
    let right = if iu == w - 1 { left } else { left + 1 };
    let top = iv as u32;
    let bottom = if iv == h - 1 { top } else { top + 1 };

    blend4(
        [
            *img.get_pixel(left, top),
            *img.get_pixel(right, top),
            *img.get_pixel(left, bottom),
            *img.get_pixel(right, bottom),
        ],
        [wul, wur, wll, wlr],
    )
}

/// Alpha-weighted blend of four colours with weights summing to 65536.
fn blend4(colors: [Rgba<u8>; 4], weights: [u32; 4]) -> Rgba<u8> {
    let af: u64 = colors
        .iter()
        .zip(weights)
        .map(|(c, w)| c[3] as u64 * w as u64)
        .sum();
    let a = (af + 32768) >> 16;
    if a == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |ch: usize| -> u8 {
        let sum: u64 = colors
            .iter()
            .zip(weights)
            .map(|(c, w)| c[3] as u64 * c[ch] as u64 * w as u64)
            .sum();
        (sum / af).min(255) as u8
    };
    Rgba([channel(0), channel(1), channel(2), a.min(255) as u8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::RectF;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 10) as u8, (y * 10) as u8, 200, 255]))
    }

    #[test]
    fn test_sampling_codes() {
        assert_eq!(Sampling::try_from(0).unwrap(), Sampling::NearestNeighbor);
        assert_eq!(Sampling::try_from(1).unwrap(), Sampling::Bilinear);
        assert!(matches!(Sampling::try_from(7), Err(Error::InvalidArgument(_))));
        assert_eq!(Sampling::from_name("Nearest"), Some(Sampling::NearestNeighbor));
    }

    #[test]
    fn test_extract_clips_to_source_and_masks() {
        let src = gradient(8, 8);
        let roi = Region::from_rects(&[Rect::new(6, 6, 5, 5), Rect::new(4, 6, 2, 1)]);
        let mb = MaskedBuffer::extract(&src, &roi);
        assert_eq!(mb.bounds().unwrap(), Rect::new(4, 6, 4, 2));
        let px = mb.pixels().unwrap().unwrap();
        // (4, 7) is inside the bounding box but outside the mask
        assert_eq!(*px.get_pixel(0, 1), Rgba([0, 0, 0, 0]));
        assert_eq!(*px.get_pixel(2, 1), *src.get_pixel(6, 7));
        assert_eq!(mb.region().unwrap().area(), 2 * 2 + 2);
    }

    #[test]
    fn test_extract_outside_source_is_empty() {
        let src = gradient(4, 4);
        let mb = MaskedBuffer::extract(&src, &Region::from_rect(Rect::new(10, 10, 3, 3)));
        assert!(mb.is_empty().unwrap());
        let mut dst = RgbaImage::new(4, 4);
        mb.draw(&mut dst, &Affine::identity(), Sampling::NearestNeighbor).unwrap();
        assert!(dst.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_identity_nearest_reproduces_pixels() {
        let src = gradient(16, 12);
        let roi = Region::from_rects(&[Rect::new(2, 2, 6, 5), Rect::new(9, 1, 3, 9)]);
        let mb = MaskedBuffer::extract(&src, &roi);
        let background = Rgba([1, 2, 3, 4]);
        let mut dst = RgbaImage::from_pixel(16, 12, background);
        mb.draw_with_buckets(&mut dst, &Affine::identity(), Sampling::NearestNeighbor, 3)
            .unwrap();
        for (x, y, p) in dst.enumerate_pixels() {
            if roi.is_visible(Point::new(x as i32, y as i32)) {
                assert_eq!(p, src.get_pixel(x, y), "at {},{}", x, y);
            } else {
                assert_eq!(*p, background, "at {},{}", x, y);
            }
        }
    }

    #[test]
    fn test_identity_bilinear_reproduces_opaque_pixels() {
        let src = gradient(10, 10);
        let mb = MaskedBuffer::extract(&src, &Region::from_rect(Rect::new(1, 1, 7, 7)));
        let mut dst = RgbaImage::new(10, 10);
        mb.draw(&mut dst, &Affine::identity(), Sampling::Bilinear).unwrap();
        assert_eq!(dst.get_pixel(4, 5), src.get_pixel(4, 5));
        assert_eq!(dst.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_translation_moves_pixels() {
        let src = gradient(12, 12);
        let mb = MaskedBuffer::extract(&src, &Region::from_rect(Rect::new(0, 0, 3, 3)));
        let mut dst = RgbaImage::new(12, 12);
        mb.draw(&mut dst, &Affine::translation(5.0, 4.0), Sampling::NearestNeighbor).unwrap();
        assert_eq!(dst.get_pixel(5, 4), src.get_pixel(0, 0));
        assert_eq!(dst.get_pixel(7, 6), src.get_pixel(2, 2));
        assert_eq!(dst.get_pixel(4, 4)[3], 0);
        assert_eq!(dst.get_pixel(8, 4)[3], 0);

        let mut dst2 = RgbaImage::new(12, 12);
        mb.draw_at(&mut dst2, 5, 4).unwrap();
        assert_eq!(dst2.get_pixel(6, 5), src.get_pixel(1, 1));
    }

    #[test]
    fn test_scale_nearest_duplicates_pixels() {
        let src = gradient(4, 4);
        let mb = MaskedBuffer::extract(&src, &Region::from_rect(Rect::new(0, 0, 4, 4)));
        let mut dst = RgbaImage::new(8, 8);
        mb.draw(&mut dst, &Affine::scaling(2.0, 2.0), Sampling::NearestNeighbor).unwrap();
        assert_eq!(dst.get_pixel(0, 0), src.get_pixel(0, 0));
        assert_eq!(dst.get_pixel(7, 7), src.get_pixel(3, 3));
        assert!(dst.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_destination_clipping_with_many_buckets() {
        let src = gradient(8, 8);
        let mb = MaskedBuffer::extract(&src, &Region::from_rect(Rect::new(0, 0, 8, 8)));
        let mut dst = RgbaImage::new(5, 5);
        mb.draw_with_buckets(&mut dst, &Affine::translation(-2.0, -2.0), Sampling::NearestNeighbor, 16)
            .unwrap();
        assert_eq!(dst.get_pixel(0, 0), src.get_pixel(2, 2));
        assert_eq!(dst.get_pixel(4, 4), src.get_pixel(6, 6));
    }

    #[test]
    fn test_singular_transform_is_noop() {
        let src = gradient(4, 4);
        let mb = MaskedBuffer::extract(&src, &Region::from_rect(Rect::new(0, 0, 4, 4)));
        let mut dst = RgbaImage::new(4, 4);
        mb.draw(&mut dst, &Affine::scaling(0.0, 0.0), Sampling::Bilinear).unwrap();
        assert!(dst.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_release() {
        let src = gradient(4, 4);
        let mut mb = MaskedBuffer::extract(&src, &Region::from_rect(Rect::new(0, 0, 2, 2)));
        let shared = mb.clone();
        mb.release().unwrap();
        assert!(mb.is_released());
        assert!(matches!(mb.region(), Err(Error::AlreadyReleased(_))));
        assert!(matches!(mb.release(), Err(Error::AlreadyReleased(_))));
        let mut dst = RgbaImage::new(4, 4);
        assert!(mb.draw_at(&mut dst, 0, 0).is_err());
        // the clone keeps its own handle on the pixels
        assert_eq!(shared.bounds().unwrap(), Rect::new(0, 0, 2, 2));
    }

    #[test]
    fn test_extract_outline() {
        let src = gradient(10, 10);
        let mut o = Outline::new();
        o.add_rectangle(RectF::new(2.0, 2.0, 3.0, 3.0));
        let mb = MaskedBuffer::extract_outline(&src, &o);
        assert_eq!(mb.bounds().unwrap(), Rect::new(2, 2, 3, 3));
        assert_eq!(mb.outline().unwrap(), o);

        let mut big = Outline::new();
        big.add_rectangle(RectF::new(-5.0, -5.0, 8.0, 8.0));
        let clipped = MaskedBuffer::extract_outline(&src, &big);
        assert_eq!(clipped.bounds().unwrap(), Rect::new(0, 0, 3, 3));
    }

    #[test]
    fn test_bilinear_sample_edges() {
        let img = RgbaImage::from_fn(2, 1, |x, _| if x == 0 { Rgba([0, 0, 0, 255]) } else { Rgba([200, 100, 50, 255]) });
        assert_eq!(bilinear_sample(&img, 0.0, 0.0), Rgba([0, 0, 0, 255]));
        let mid = bilinear_sample(&img, 0.5, 0.0);
        assert_eq!(mid, Rgba([100, 50, 25, 255]));
        // right neighbour clamps at the last column
        assert_eq!(bilinear_sample(&img, 1.5, 0.0), Rgba([200, 100, 50, 255]));
        assert_eq!(bilinear_sample(&img, 2.0, 0.0), Rgba([0, 0, 0, 0]));
        assert_eq!(bilinear_sample(&img, -0.1, 0.0), Rgba([0, 0, 0, 0]));
        assert_eq!(bilinear_sample(&img, f64::NAN, 0.0), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_transparent_neighbours_do_not_darken() {
        let img = RgbaImage::from_fn(2, 1, |x, _| if x == 0 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 0, 0]) });
        let p = bilinear_sample(&img, 0.5, 0.0);
        assert_eq!(p[0], 255);
        assert_eq!(p[3], 128);
    }
}
