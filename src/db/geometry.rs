//! Integer points and boxes in database units.
//!
//! All geometry handled by this crate lives on an integer grid. A [`Rect`] is a closed,
//! axis-aligned box; boxes with `left > right` or `bottom > top` are empty and absorb
//! nothing when used in unions.

use std::{
    fmt,
    ops::{Add, Neg, Sub},
};

use crate::db::Trans;

/// A coordinate in database units.
pub type Coord = i64;

/// A point on the database grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Point {
    /// Horizontal coordinate
    pub x: Coord,
    /// Vertical coordinate
    pub y: Coord,
}

impl Point {
    /// Creates a new point.
    #[must_use]
    pub const fn new(x: Coord, y: Coord) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// A closed axis-aligned box.
///
/// # Examples
///
/// ```rust
/// use xorscope::db::Rect;
///
/// let tile = Rect::new(0, 0, 100, 100);
/// let shape = Rect::new(10, 10, 20, 20);
///
/// assert!(tile.contains_rect(&shape));
/// assert!(tile.enlarged(-1).contains_rect(&shape));
/// assert_eq!(shape.area(), 100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rect {
    /// Minimum x
    pub left: Coord,
    /// Minimum y
    pub bottom: Coord,
    /// Maximum x
    pub right: Coord,
    /// Maximum y
    pub top: Coord,
}

impl Default for Rect {
    fn default() -> Self {
        Self::empty()
    }
}

impl Rect {
    /// Creates a box from two opposite corners, normalizing the coordinate order.
    #[must_use]
    pub fn new(x1: Coord, y1: Coord, x2: Coord, y2: Coord) -> Self {
        Self {
            left: x1.min(x2),
            bottom: y1.min(y2),
            right: x1.max(x2),
            top: y1.max(y2),
        }
    }

    /// Creates a box from two corner points.
    #[must_use]
    pub fn from_points(p1: Point, p2: Point) -> Self {
        Self::new(p1.x, p1.y, p2.x, p2.y)
    }

    /// The canonical empty box.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            left: 1,
            bottom: 1,
            right: -1,
            top: -1,
        }
    }

    /// Returns `true` if the box contains no points at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.left > self.right || self.bottom > self.top
    }

    /// Returns `true` if the box has a positive area.
    #[must_use]
    pub fn has_area(&self) -> bool {
        self.left < self.right && self.bottom < self.top
    }

    /// Width of the box, zero if empty.
    #[must_use]
    pub fn width(&self) -> Coord {
        if self.is_empty() {
            0
        } else {
            self.right - self.left
        }
    }

    /// Height of the box, zero if empty.
    #[must_use]
    pub fn height(&self) -> Coord {
        if self.is_empty() {
            0
        } else {
            self.top - self.bottom
        }
    }

    /// Area of the box in square database units.
    #[must_use]
    pub fn area(&self) -> i128 {
        i128::from(self.width()) * i128::from(self.height())
    }

    /// The lower-left corner.
    #[must_use]
    pub fn p1(&self) -> Point {
        Point::new(self.left, self.bottom)
    }

    /// The upper-right corner.
    #[must_use]
    pub fn p2(&self) -> Point {
        Point::new(self.right, self.top)
    }

    /// The box center, rounded towards negative infinity.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.right).div_euclid(2),
            (self.bottom + self.top).div_euclid(2),
        )
    }

    /// Returns `true` if `other` lies completely inside this box (boundaries included).
    ///
    /// An empty `other` is never contained.
    #[must_use]
    pub fn contains_rect(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && other.left >= self.left
            && other.right <= self.right
            && other.bottom >= self.bottom
            && other.top <= self.top
    }

    /// Returns `true` if the point lies inside the box or on its boundary.
    #[must_use]
    pub fn contains_point(&self, p: Point) -> bool {
        !self.is_empty()
            && p.x >= self.left
            && p.x <= self.right
            && p.y >= self.bottom
            && p.y <= self.top
    }

    /// Returns `true` if both boxes share at least one point (touching counts).
    #[must_use]
    pub fn touches(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.left <= other.right
            && other.left <= self.right
            && self.bottom <= other.top
            && other.bottom <= self.top
    }

    /// Returns `true` if the intersection of both boxes has a positive area.
    #[must_use]
    pub fn overlaps(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.left < other.right
            && other.left < self.right
            && self.bottom < other.top
            && other.bottom < self.top
    }

    /// The intersection of both boxes, empty if they don't touch.
    #[must_use]
    pub fn intersection(&self, other: &Rect) -> Rect {
        if !self.touches(other) {
            return Rect::empty();
        }
        Rect {
            left: self.left.max(other.left),
            bottom: self.bottom.max(other.bottom),
            right: self.right.min(other.right),
            top: self.top.min(other.top),
        }
    }

    /// The bounding box of both boxes. Empty boxes are ignored.
    #[must_use]
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect {
            left: self.left.min(other.left),
            bottom: self.bottom.min(other.bottom),
            right: self.right.max(other.right),
            top: self.top.max(other.top),
        }
    }

    /// Grows the box by `d` on each side. Negative values shrink; a box shrunk
    /// beyond its extent becomes empty.
    #[must_use]
    pub fn enlarged(&self, d: Coord) -> Rect {
        if self.is_empty() {
            return *self;
        }
        let r = Rect {
            left: self.left - d,
            bottom: self.bottom - d,
            right: self.right + d,
            top: self.top + d,
        };
        if r.is_empty() {
            Rect::empty()
        } else {
            r
        }
    }

    /// Shifts the box by `d`.
    #[must_use]
    pub fn moved(&self, d: Point) -> Rect {
        if self.is_empty() {
            return *self;
        }
        Rect {
            left: self.left + d.x,
            bottom: self.bottom + d.y,
            right: self.right + d.x,
            top: self.top + d.y,
        }
    }

    /// Applies a Manhattan transformation.
    #[must_use]
    pub fn transformed(&self, trans: &Trans) -> Rect {
        trans.apply_rect(self)
    }

    /// Scales all coordinates by an integer factor.
    #[must_use]
    pub fn scaled(&self, factor: Coord) -> Rect {
        if self.is_empty() {
            return *self;
        }
        Rect::new(
            self.left * factor,
            self.bottom * factor,
            self.right * factor,
            self.top * factor,
        )
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "()")
        } else {
            write!(f, "({};{})", self.p1(), self.p2())
        }
    }
}
