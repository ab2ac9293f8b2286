// ============================================================================
// BIT MATRIX - dense per-pixel boolean coverage ("stencil")
// ============================================================================

use crate::error::{Error, Result};

use super::rect::{Rect, Scanline};
use super::region::Region;

const WORD_BITS: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunOp {
    Set,
    Clear,
    Invert,
}

/// Row-major packed bit matrix. Each row starts on a word boundary so whole
/// runs can be set, cleared or inverted a word at a time.
#[derive(Clone, PartialEq, Eq)]
pub struct BitMatrix {
    width: i32,
    height: i32,
    words_per_row: usize,
    bits: Vec<u64>,
}

impl std::fmt::Debug for BitMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "BitMatrix {}x{}", self.width, self.height)?;
        for y in 0..self.height {
            let row: String = (0..self.width)
                .map(|x| if self.bit(x, y) { '#' } else { '.' })
                .collect();
            writeln!(f, "  {}", row)?;
        }
        Ok(())
    }
}

impl BitMatrix {
    /// All-false matrix. Negative dimensions are treated as zero.
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        let words_per_row = (width as usize).div_ceil(WORD_BITS);
        Self {
            width,
            height,
            words_per_row,
            bits: vec![0; words_per_row * height as usize],
        }
    }

    /// Stencil covering `bounds`, with cell `(0, 0)` at `bounds.location`.
    /// Region pixels outside `bounds` are ignored.
    pub fn from_region(region: &Region, bounds: Rect) -> Self {
        let mut stencil = Self::new(bounds.width, bounds.height);
        for scan in region.scans().iter() {
            stencil.set_rect(&scan.offset(-bounds.x, -bounds.y), true);
        }
        stencil
    }

    pub fn width(&self) -> i32 { self.width }
    pub fn height(&self) -> i32 { self.height }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// True when the matrix has no cells at all (not when all cells are clear).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn check(&self, x: i32, y: i32) -> Result<()> {
        if x < 0 || x >= self.width {
            return Err(Error::out_of_range("x", x as i64, 0, self.width as i64 - 1));
        }
        if y < 0 || y >= self.height {
            return Err(Error::out_of_range("y", y as i64, 0, self.height as i64 - 1));
        }
        Ok(())
    }

    pub fn get(&self, x: i32, y: i32) -> Result<bool> {
        self.check(x, y)?;
        Ok(self.bit(x, y))
    }

    pub fn set(&mut self, x: i32, y: i32, value: bool) -> Result<()> {
        self.check(x, y)?;
        self.set_bit(x, y, value);
        Ok(())
    }

    pub fn invert(&mut self, x: i32, y: i32) -> Result<()> {
        self.check(x, y)?;
        let v = self.bit(x, y);
        self.set_bit(x, y, !v);
        Ok(())
    }

    /// Bit lookup for callers that already proved `(x, y)` is in range.
    #[inline]
    pub(crate) fn bit(&self, x: i32, y: i32) -> bool {
        debug_assert!(x >= 0 && y >= 0 && x < self.width && y < self.height);
        let idx = y as usize * self.words_per_row + x as usize / WORD_BITS;
        (self.bits[idx] >> (x as usize % WORD_BITS)) & 1 == 1
    }

    #[inline]
    pub(crate) fn set_bit(&mut self, x: i32, y: i32, value: bool) {
        debug_assert!(x >= 0 && y >= 0 && x < self.width && y < self.height);
        let idx = y as usize * self.words_per_row + x as usize / WORD_BITS;
        let mask = 1u64 << (x as usize % WORD_BITS);
        if value {
            self.bits[idx] |= mask;
        } else {
            self.bits[idx] &= !mask;
        }
    }

    pub fn clear(&mut self, value: bool) {
        let fill = if value { u64::MAX } else { 0 };
        self.bits.iter_mut().for_each(|w| *w = fill);
        if value {
            self.mask_row_tails();
        }
    }

    // Keeps the padding bits past `width` at zero so equality and counting
    // only ever see real cells.
    fn mask_row_tails(&mut self) {
        let tail = self.width as usize % WORD_BITS;
        if tail == 0 || self.words_per_row == 0 {
            return;
        }
        let mask = (1u64 << tail) - 1;
        for row in 0..self.height as usize {
            let last = row * self.words_per_row + self.words_per_row - 1;
            self.bits[last] &= mask;
        }
    }

    fn apply_run(&mut self, y: i32, x0: i32, x1: i32, op: RunOp) {
        let x0 = x0.max(0) as usize;
        let x1 = x1.min(self.width).max(0) as usize;
        if y < 0 || y >= self.height || x0 >= x1 {
            return;
        }
        let row = y as usize * self.words_per_row;
        let first = x0 / WORD_BITS;
        let last = (x1 - 1) / WORD_BITS;
        for w in first..=last {
            let lo = if w == first { x0 % WORD_BITS } else { 0 };
            let hi = if w == last { (x1 - 1) % WORD_BITS + 1 } else { WORD_BITS };
            let mask = if hi - lo == WORD_BITS {
                u64::MAX
            } else {
                ((1u64 << (hi - lo)) - 1) << lo
            };
            let word = &mut self.bits[row + w];
            match op {
                RunOp::Set => *word |= mask,
                RunOp::Clear => *word &= !mask,
                RunOp::Invert => *word ^= mask,
            }
        }
    }

    fn apply_rect(&mut self, rect: &Rect, op: RunOp) {
        let r = rect.intersect(&self.bounds());
        for y in r.top()..r.bottom() {
            self.apply_run(y, r.left(), r.right(), op);
        }
    }

    /// Set or clear every cell of `rect` (clipped to the matrix).
    pub fn set_rect(&mut self, rect: &Rect, value: bool) {
        self.apply_rect(rect, if value { RunOp::Set } else { RunOp::Clear });
    }

    pub fn invert_rect(&mut self, rect: &Rect) {
        self.apply_rect(rect, RunOp::Invert);
    }

    pub fn set_span(&mut self, scan: &Scanline, value: bool) {
        let op = if value { RunOp::Set } else { RunOp::Clear };
        self.apply_run(scan.y, scan.x, scan.x.saturating_add(scan.length), op);
    }

    pub fn invert_span(&mut self, scan: &Scanline) {
        self.apply_run(scan.y, scan.x, scan.x.saturating_add(scan.length), RunOp::Invert);
    }

    /// Number of set cells.
    pub fn count_set(&self) -> u64 {
        self.bits.iter().map(|w| w.count_ones() as u64).sum()
    }

    pub fn any_set(&self) -> bool {
        self.bits.iter().any(|&w| w != 0)
    }

    /// Maximal horizontal runs of set cells, row by row.
    pub fn runs(&self) -> Vec<Scanline> {
        let mut out = Vec::new();
        for y in 0..self.height {
            let mut x = 0;
            while x < self.width {
                if !self.bit(x, y) {
                    x += 1;
                    continue;
                }
                let start = x;
                while x < self.width && self.bit(x, y) {
                    x += 1;
                }
                out.push(Scanline::new(start, y, x - start));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_out_of_range_reports_parameter() {
        let m = BitMatrix::new(4, 3);
        match m.get(4, 0) {
            Err(Error::OutOfRange { param, max, .. }) => {
                assert_eq!(param, "x");
                assert_eq!(max, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(m.get(0, -1), Err(Error::OutOfRange { param: "y", .. })));
    }

    #[test]
    fn test_rect_ops_across_word_boundary() {
        let mut m = BitMatrix::new(130, 2);
        m.set_rect(&Rect::new(60, 0, 10, 2), true);
        assert_eq!(m.count_set(), 20);
        m.invert_rect(&Rect::new(65, 0, 70, 1));
        // 60..65 still set on row 0, 70..135 clipped to 70..130 newly set
        assert!(m.bit(64, 0));
        assert!(!m.bit(65, 0));
        assert!(m.bit(129, 0));
        assert_eq!(m.count_set(), 5 + 60 + 10);
    }

    #[test]
    fn test_clear_true_keeps_padding_zero() {
        let mut m = BitMatrix::new(3, 2);
        m.clear(true);
        assert_eq!(m.count_set(), 6);
        let mut other = BitMatrix::new(3, 2);
        other.set_rect(&Rect::new(0, 0, 3, 2), true);
        assert_eq!(m, other);
    }

    #[test]
    fn test_from_region_offsets_by_bounds() {
        let region = Region::from_rects(&[Rect::new(10, 20, 2, 1), Rect::new(11, 21, 1, 1)]);
        let m = BitMatrix::from_region(&region, region.bounds());
        assert_eq!((m.width(), m.height()), (2, 2));
        assert_eq!(m.count_set(), 3);
        assert!(!m.bit(0, 1));
        assert!(m.bit(1, 1));
    }

    #[test]
    fn test_runs() {
        let mut m = BitMatrix::new(8, 1);
        m.set_rect(&Rect::new(1, 0, 2, 1), true);
        m.set_rect(&Rect::new(5, 0, 3, 1), true);
        assert_eq!(m.runs(), vec![Scanline::new(1, 0, 2), Scanline::new(5, 0, 3)]);
    }
}
