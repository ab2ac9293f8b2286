// ============================================================================
// OUTLINE COMBINER - boolean combine via rasterize → stencil → re-trace
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::outline::Outline;
use super::region::Region;
use super::stencil::BitMatrix;
use super::tracer;

/// How a new shape is merged into an existing one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombineMode {
    /// The new shape replaces the old one.
    Replace,
    Intersect,
    Union,
    #[default]
    Xor,
    /// Old minus new.
    Exclude,
    /// New minus old.
    Complement,
}

impl CombineMode {
    pub const ALL: [CombineMode; 6] = [
        CombineMode::Replace,
        CombineMode::Intersect,
        CombineMode::Union,
        CombineMode::Xor,
        CombineMode::Exclude,
        CombineMode::Complement,
    ];

    pub fn code(self) -> u8 {
        match self {
            CombineMode::Replace => 0,
            CombineMode::Intersect => 1,
            CombineMode::Union => 2,
            CombineMode::Xor => 3,
            CombineMode::Exclude => 4,
            CombineMode::Complement => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CombineMode::Replace => "replace",
            CombineMode::Intersect => "intersect",
            CombineMode::Union => "union",
            CombineMode::Xor => "xor",
            CombineMode::Exclude => "exclude",
            CombineMode::Complement => "complement",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.name().eq_ignore_ascii_case(name))
    }
}

impl TryFrom<u8> for CombineMode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.code() == code)
            .ok_or_else(|| Error::invalid_argument(format!("unknown combine mode code {}", code)))
    }
}

impl std::fmt::Display for CombineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-rectangle stencil operation applied by the raw region combine.
#[derive(Clone, Copy)]
enum StencilOp {
    Set,
    Clear,
    Invert,
}

/// Combine two outlines. The result is always a fresh outline; neither
/// operand is modified.
pub fn combine(subject: &Outline, mode: CombineMode, clip: &Outline) -> Outline {
    match mode {
        CombineMode::Complement => return combine(clip, CombineMode::Exclude, subject),
        CombineMode::Replace => return clip.clone(),
        _ => {}
    }

    match (subject.is_empty(), clip.is_empty()) {
        (true, true) => return Outline::new(),
        (true, false) => {
            return match mode {
                CombineMode::Xor | CombineMode::Union => clip.clone(),
                _ => Outline::new(),
            };
        }
        (false, true) => {
            return match mode {
                CombineMode::Intersect => Outline::new(),
                _ => subject.clone(),
            };
        }
        (false, false) => {}
    }

    let lhs = subject.region();
    let rhs = clip.region();
    match mode {
        CombineMode::Intersect => {
            let mut both = lhs.clone();
            both.intersect(rhs);
            Outline::from_region(&both)
        }
        CombineMode::Union => stencil_combine(lhs, StencilOp::Set, rhs),
        CombineMode::Exclude => stencil_combine(lhs, StencilOp::Clear, rhs),
        // Complement and Replace returned above.
        _ => stencil_combine(lhs, StencilOp::Invert, rhs),
    }
}

/// Raw region combine through a stencil. Only `Union`, `Exclude` and `Xor`
/// are meaningful here.
pub fn combine_regions(lhs: &Region, mode: CombineMode, rhs: &Region) -> Result<Outline> {
    let op = match mode {
        CombineMode::Union => StencilOp::Set,
        CombineMode::Exclude => StencilOp::Clear,
        CombineMode::Xor => StencilOp::Invert,
        CombineMode::Complement | CombineMode::Intersect | CombineMode::Replace => {
            return Err(Error::invalid_argument(format!(
                "combine mode can't be {} for a raw region combine",
                mode
            )));
        }
    };
    Ok(stencil_combine(lhs, op, rhs))
}

fn stencil_combine(lhs: &Region, op: StencilOp, rhs: &Region) -> Outline {
    let bounds = lhs.bounds().union(&rhs.bounds());
    let mut stencil = BitMatrix::new(bounds.width, bounds.height);

    for rect in lhs.scans().iter() {
        stencil.set_rect(&rect.offset(-bounds.x, -bounds.y), true);
    }
    for rect in rhs.scans().iter() {
        let local = rect.offset(-bounds.x, -bounds.y);
        match op {
            StencilOp::Set => stencil.set_rect(&local, true),
            StencilOp::Clear => stencil.set_rect(&local, false),
            StencilOp::Invert => stencil.invert_rect(&local),
        }
    }

    let full = stencil.bounds();
    let polygons = tracer::trace_polygons(&mut stencil, full, bounds.x, bounds.y);
    let mut outline = Outline::new();
    outline.add_int_polygons(&polygons);
    outline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::rect::{Rect, RectF};

    fn rect_outline(x: f64, y: f64, w: f64, h: f64) -> Outline {
        let mut o = Outline::new();
        o.add_rectangle(RectF::new(x, y, w, h));
        o
    }

    #[test]
    fn test_codes_round_trip_and_reject_unknown() {
        for mode in CombineMode::ALL {
            assert_eq!(CombineMode::try_from(mode.code()).unwrap(), mode);
            assert_eq!(CombineMode::from_name(mode.name()), Some(mode));
        }
        assert!(matches!(CombineMode::try_from(6), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_operand_truth_table() {
        let empty = Outline::new();
        let a = rect_outline(0.0, 0.0, 4.0, 4.0);

        for mode in [CombineMode::Union, CombineMode::Xor] {
            assert_eq!(combine(&empty, mode, &a), a);
        }
        for mode in [CombineMode::Intersect, CombineMode::Exclude] {
            assert!(combine(&empty, mode, &a).is_empty());
        }
        for mode in [CombineMode::Union, CombineMode::Xor, CombineMode::Exclude] {
            assert_eq!(combine(&a, mode, &empty), a);
        }
        assert!(combine(&a, CombineMode::Intersect, &empty).is_empty());
        for mode in CombineMode::ALL {
            assert!(combine(&empty, mode, &empty).is_empty());
        }
    }

    #[test]
    fn test_replace_and_complement() {
        let a = rect_outline(0.0, 0.0, 4.0, 4.0);
        let b = rect_outline(2.0, 0.0, 4.0, 4.0);
        assert_eq!(combine(&a, CombineMode::Replace, &b), b);
        let c = combine(&a, CombineMode::Complement, &b);
        assert_eq!(c.region(), &Region::from_rect(Rect::new(4, 0, 2, 4)));
    }

    #[test]
    fn test_general_modes() {
        let a = rect_outline(0.0, 0.0, 4.0, 4.0);
        let b = rect_outline(2.0, 2.0, 4.0, 4.0);

        assert_eq!(combine(&a, CombineMode::Union, &b).region().area(), 28);
        assert_eq!(combine(&a, CombineMode::Intersect, &b).region().area(), 4);
        assert_eq!(combine(&a, CombineMode::Exclude, &b).region().area(), 12);
        assert_eq!(combine(&a, CombineMode::Xor, &b).region().area(), 24);
    }

    #[test]
    fn test_xor_self_is_empty() {
        let a = rect_outline(3.0, 3.0, 5.0, 2.0);
        let x = combine(&a, CombineMode::Xor, &a);
        assert!(x.is_empty());
        assert_eq!(x.region().area(), 0);
    }

    #[test]
    fn test_raw_combine_rejects_unsupported_modes() {
        let a = Region::from_rect(Rect::new(0, 0, 2, 2));
        for mode in [CombineMode::Intersect, CombineMode::Complement, CombineMode::Replace] {
            assert!(matches!(combine_regions(&a, mode, &a), Err(Error::InvalidArgument(_))));
        }
        let u = combine_regions(&a, CombineMode::Union, &Region::from_rect(Rect::new(2, 0, 2, 2))).unwrap();
        assert_eq!(u.figure_count(), 1);
        assert_eq!(u.region(), &Region::from_rect(Rect::new(0, 0, 4, 2)));
    }
}
