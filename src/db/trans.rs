//! Manhattan transformations used by cell instances.
//!
//! Only the eight axis-preserving orientations are supported, which keeps every
//! transformed box a box and lets sizing commute with instance placement.

use std::ops::Mul;

use strum::{Display, EnumIter, IntoEnumIterator};

use crate::db::{Point, Rect};

/// One of the eight rotations/mirrorings that map the grid onto itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, EnumIter, Display)]
pub enum Orientation {
    /// No rotation
    #[default]
    R0,
    /// Rotation by 90 degrees counterclockwise
    R90,
    /// Rotation by 180 degrees
    R180,
    /// Rotation by 270 degrees counterclockwise
    R270,
    /// Mirror at the x axis
    M0,
    /// Mirror at the 45 degree axis
    M45,
    /// Mirror at the y axis
    M90,
    /// Mirror at the 135 degree axis
    M135,
}

impl Orientation {
    /// Applies the orientation to a point (around the origin).
    #[must_use]
    pub fn apply(self, p: Point) -> Point {
        let (x, y) = (p.x, p.y);
        match self {
            Orientation::R0 => Point::new(x, y),
            Orientation::R90 => Point::new(-y, x),
            Orientation::R180 => Point::new(-x, -y),
            Orientation::R270 => Point::new(y, -x),
            Orientation::M0 => Point::new(x, -y),
            Orientation::M45 => Point::new(y, x),
            Orientation::M90 => Point::new(-x, y),
            Orientation::M135 => Point::new(-y, -x),
        }
    }

    /// Returns the orientation equivalent to applying `inner` first and `self` second.
    #[must_use]
    pub fn compose(self, inner: Orientation) -> Orientation {
        let ex = Point::new(1, 0);
        let ey = Point::new(0, 1);
        let want_x = self.apply(inner.apply(ex));
        let want_y = self.apply(inner.apply(ey));
        Orientation::iter()
            .find(|o| o.apply(ex) == want_x && o.apply(ey) == want_y)
            .unwrap_or_default()
    }

    /// Returns the orientation undoing this one.
    #[must_use]
    pub fn inverted(self) -> Orientation {
        Orientation::iter()
            .find(|o| o.compose(self) == Orientation::R0)
            .unwrap_or_default()
    }

    /// Returns `true` for the four mirroring orientations.
    #[must_use]
    pub fn is_mirror(self) -> bool {
        matches!(
            self,
            Orientation::M0 | Orientation::M45 | Orientation::M90 | Orientation::M135
        )
    }
}

/// An orientation followed by a displacement.
///
/// # Examples
///
/// ```rust
/// use xorscope::db::{Orientation, Point, Trans};
///
/// let t = Trans::new(Orientation::R90, Point::new(100, 0));
/// assert_eq!(t.apply(Point::new(10, 0)), Point::new(100, 10));
/// assert_eq!(t.inverted().apply(Point::new(100, 10)), Point::new(10, 0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Trans {
    /// Rotation/mirroring, applied first
    pub orientation: Orientation,
    /// Displacement, applied second
    pub disp: Point,
}

impl Trans {
    /// Creates a new transformation.
    #[must_use]
    pub const fn new(orientation: Orientation, disp: Point) -> Self {
        Self { orientation, disp }
    }

    /// A pure displacement.
    #[must_use]
    pub const fn displacement(x: i64, y: i64) -> Self {
        Self {
            orientation: Orientation::R0,
            disp: Point::new(x, y),
        }
    }

    /// Returns `true` if this is the identity transformation.
    #[must_use]
    pub fn is_unity(&self) -> bool {
        self.orientation == Orientation::R0 && self.disp == Point::default()
    }

    /// Transforms a point.
    #[must_use]
    pub fn apply(&self, p: Point) -> Point {
        self.orientation.apply(p) + self.disp
    }

    /// Transforms a box.
    #[must_use]
    pub fn apply_rect(&self, r: &Rect) -> Rect {
        if r.is_empty() {
            return *r;
        }
        Rect::from_points(self.apply(r.p1()), self.apply(r.p2()))
    }

    /// Returns the inverse transformation.
    #[must_use]
    pub fn inverted(&self) -> Trans {
        let orientation = self.orientation.inverted();
        Trans {
            orientation,
            disp: -orientation.apply(self.disp),
        }
    }
}

impl Mul for Trans {
    type Output = Trans;

    /// `a * b` applies `b` first, then `a`.
    fn mul(self, rhs: Trans) -> Trans {
        Trans {
            orientation: self.orientation.compose(rhs.orientation),
            disp: self.orientation.apply(rhs.disp) + self.disp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_group_closed() {
        for a in Orientation::iter() {
            for b in Orientation::iter() {
                let c = a.compose(b);
                let p = Point::new(3, 7);
                assert_eq!(c.apply(p), a.apply(b.apply(p)), "{a} * {b}");
            }
        }
    }

    #[test]
    fn test_orientation_inverse() {
        for o in Orientation::iter() {
            assert_eq!(o.compose(o.inverted()), Orientation::R0, "{o}");
            assert_eq!(o.inverted().compose(o), Orientation::R0, "{o}");
        }
    }

    #[test]
    fn test_trans_composition() {
        let a = Trans::new(Orientation::R90, Point::new(5, -2));
        let b = Trans::new(Orientation::M45, Point::new(-1, 8));
        let p = Point::new(4, 9);

        assert_eq!((a * b).apply(p), a.apply(b.apply(p)));
        assert_eq!((a * a.inverted()).apply(p), p);
        assert!((b.inverted() * b).is_unity());
    }

    #[test]
    fn test_trans_rect() {
        let t = Trans::new(Orientation::R180, Point::new(10, 10));
        let r = t.apply_rect(&Rect::new(0, 0, 4, 2));
        assert_eq!(r, Rect::new(6, 8, 10, 10));
        assert!(t.apply_rect(&Rect::empty()).is_empty());
    }
}
