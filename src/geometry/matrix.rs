// ============================================================================
// AFFINE MATRIX - 2×3 transform shared by outlines, regions and compositing
// ============================================================================

use serde::{Deserialize, Serialize};

use super::rect::PointF;

/// Epsilon used for identity / translation comparisons.
pub const AFFINE_EPSILON: f64 = 1e-12;

/// Which side of the current matrix a multiplication is applied on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatrixOrder {
    /// `self` is applied first, then `other`.
    Append,
    /// `other` is applied first, then `self`.
    Prepend,
}

/// 2D affine transform in row-vector form:
///
/// ```text
///   x' = m11 * x + m21 * y + dx
///   y' = m12 * x + m22 * y + dy
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    pub m11: f64,
    pub m12: f64,
    pub m21: f64,
    pub m22: f64,
    pub dx: f64,
    pub dy: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    pub const fn new(m11: f64, m12: f64, m21: f64, m22: f64, dx: f64, dy: f64) -> Self {
        Self { m11, m12, m21, m22, dx, dy }
    }

    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    pub const fn translation(dx: f64, dy: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, dx, dy)
    }

    pub const fn scaling(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Clockwise rotation in screen space (y grows downward).
    pub fn rotation_degrees(degrees: f64) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        Self::new(c, s, -s, c, 0.0, 0.0)
    }

    /// Rotation about an arbitrary centre point.
    pub fn rotation_about(degrees: f64, cx: f64, cy: f64) -> Self {
        Self::translation(-cx, -cy)
            .then(&Self::rotation_degrees(degrees))
            .then(&Self::translation(cx, cy))
    }

    /// Multiply in place.
    pub fn multiply(&mut self, other: &Affine, order: MatrixOrder) {
        *self = match order {
            MatrixOrder::Append => Self::product(self, other),
            MatrixOrder::Prepend => Self::product(other, self),
        };
    }

    /// `self` followed by `other`.
    pub fn then(&self, other: &Affine) -> Affine {
        Self::product(self, other)
    }

    fn product(a: &Affine, b: &Affine) -> Affine {
        Affine {
            m11: a.m11 * b.m11 + a.m12 * b.m21,
            m12: a.m11 * b.m12 + a.m12 * b.m22,
            m21: a.m21 * b.m11 + a.m22 * b.m21,
            m22: a.m21 * b.m12 + a.m22 * b.m22,
            dx: a.dx * b.m11 + a.dy * b.m21 + b.dx,
            dy: a.dx * b.m12 + a.dy * b.m22 + b.dy,
        }
    }

    pub fn determinant(&self) -> f64 {
        self.m11 * self.m22 - self.m12 * self.m21
    }

    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det != 0.0 && det.is_finite() && self.dx.is_finite() && self.dy.is_finite()
    }

    /// Inverse matrix, or `None` when singular.
    pub fn invert(&self) -> Option<Affine> {
        if !self.is_invertible() {
            return None;
        }
        let inv = 1.0 / self.determinant();
        let m11 = self.m22 * inv;
        let m12 = -self.m12 * inv;
        let m21 = -self.m21 * inv;
        let m22 = self.m11 * inv;
        Some(Affine {
            m11,
            m12,
            m21,
            m22,
            dx: -(self.dx * m11 + self.dy * m21),
            dy: -(self.dx * m12 + self.dy * m22),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.is_translation() && self.dx.abs() < AFFINE_EPSILON && self.dy.abs() < AFFINE_EPSILON
    }

    /// True when the linear part is the identity.
    pub fn is_translation(&self) -> bool {
        (self.m11 - 1.0).abs() < AFFINE_EPSILON
            && self.m12.abs() < AFFINE_EPSILON
            && self.m21.abs() < AFFINE_EPSILON
            && (self.m22 - 1.0).abs() < AFFINE_EPSILON
    }

    /// `Some((dx, dy))` when this is a translation by whole pixels.
    pub fn integer_translation(&self) -> Option<(i32, i32)> {
        if !self.is_translation() {
            return None;
        }
        let rx = self.dx.round();
        let ry = self.dy.round();
        if (self.dx - rx).abs() < AFFINE_EPSILON
            && (self.dy - ry).abs() < AFFINE_EPSILON
            && rx.abs() < i32::MAX as f64
            && ry.abs() < i32::MAX as f64
        {
            Some((rx as i32, ry as i32))
        } else {
            None
        }
    }

    #[inline]
    pub fn transform_point(&self, p: PointF) -> PointF {
        PointF::new(
            self.m11 * p.x + self.m21 * p.y + self.dx,
            self.m12 * p.x + self.m22 * p.y + self.dy,
        )
    }

    /// Transform a direction vector (translation ignored).
    #[inline]
    pub fn transform_vector(&self, v: PointF) -> PointF {
        PointF::new(self.m11 * v.x + self.m21 * v.y, self.m12 * v.x + self.m22 * v.y)
    }

    pub fn transform_points(&self, pts: &mut [PointF]) {
        for p in pts.iter_mut() {
            *p = self.transform_point(*p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: PointF, b: PointF) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn test_append_applies_self_first() {
        let mut m = Affine::scaling(2.0, 2.0);
        m.multiply(&Affine::translation(5.0, 0.0), MatrixOrder::Append);
        assert!(approx(m.transform_point(PointF::new(1.0, 1.0)), PointF::new(7.0, 2.0)));

        let mut p = Affine::scaling(2.0, 2.0);
        p.multiply(&Affine::translation(5.0, 0.0), MatrixOrder::Prepend);
        assert!(approx(p.transform_point(PointF::new(1.0, 1.0)), PointF::new(12.0, 2.0)));
    }

    #[test]
    fn test_invert_round_trip() {
        let m = Affine::rotation_about(30.0, 10.0, 4.0).then(&Affine::scaling(1.5, 0.5));
        let inv = m.invert().unwrap();
        let p = PointF::new(3.25, -7.0);
        assert!(approx(inv.transform_point(m.transform_point(p)), p));
        assert!(m.then(&inv).is_identity());
    }

    #[test]
    fn test_singular_has_no_inverse() {
        let m = Affine::scaling(0.0, 1.0);
        assert!(!m.is_invertible());
        assert!(m.invert().is_none());
    }

    #[test]
    fn test_integer_translation() {
        assert_eq!(Affine::translation(3.0, -2.0).integer_translation(), Some((3, -2)));
        assert_eq!(Affine::translation(0.5, 0.0).integer_translation(), None);
        assert_eq!(Affine::scaling(2.0, 2.0).integer_translation(), None);
    }

    #[test]
    fn test_rotation_is_clockwise_on_screen() {
        let m = Affine::rotation_degrees(90.0);
        assert!(approx(m.transform_point(PointF::new(1.0, 0.0)), PointF::new(0.0, 1.0)));
    }
}
