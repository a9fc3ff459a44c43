//! Mergeable rectilinear regions.
//!
//! A [`Region`] is a bag of boxes with "merged semantics": overlapping or abutting
//! boxes describe one connected area, and all boolean operations act on the covered
//! point set rather than on the individual boxes.
//!
//! # Canonical form
//!
//! [`Region::merged`] produces a canonical decomposition: the plane is cut into vertical
//! slabs at every box edge, the covered y intervals inside a slab are coalesced, and
//! neighbouring slabs with identical intervals are fused. Two regions covering the same
//! area always merge to the same box list, which is what [`PartialEq`] compares.
//!
//! # Polygons
//!
//! A merged polygon is a connected component of the covered area where connection
//! requires a shared boundary of positive length. Boxes touching in a single corner
//! belong to different polygons. Holes do not split a polygon.
//!
//! # Sizing
//!
//! [`Region::sized`] grows by the Minkowski sum with a square of half-width `d`. This is
//! exact for rectilinear geometry. Shrinking is implemented as growing the complement.

use std::{
    collections::HashMap,
    ops::{BitAnd, BitOr, BitXor, Sub},
};

use crate::db::{Coord, Point, Rect, Trans};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoolOp {
    Or,
    And,
    Xor,
    Not,
}

impl BoolOp {
    fn eval(self, a: bool, b: bool) -> bool {
        match self {
            BoolOp::Or => a || b,
            BoolOp::And => a && b,
            BoolOp::Xor => a != b,
            BoolOp::Not => a && !b,
        }
    }
}

type Interval = (Coord, Coord);

/// Sorts and coalesces overlapping or touching intervals.
fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort_unstable();
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for (lo, hi) in intervals {
        match merged.last_mut() {
            Some(last) if lo <= last.1 => last.1 = last.1.max(hi),
            _ => merged.push((lo, hi)),
        }
    }
    merged
}

/// Combines two merged interval lists with a boolean operation.
fn combine_intervals(a: &[Interval], b: &[Interval], op: BoolOp) -> Vec<Interval> {
    let mut breaks: Vec<Coord> = a
        .iter()
        .chain(b.iter())
        .flat_map(|&(lo, hi)| [lo, hi])
        .collect();
    breaks.sort_unstable();
    breaks.dedup();

    let mut result: Vec<Interval> = Vec::new();
    let (mut ia, mut ib) = (0, 0);
    for window in breaks.windows(2) {
        let (y0, y1) = (window[0], window[1]);
        while ia < a.len() && a[ia].1 <= y0 {
            ia += 1;
        }
        while ib < b.len() && b[ib].1 <= y0 {
            ib += 1;
        }
        let in_a = ia < a.len() && a[ia].0 <= y0;
        let in_b = ib < b.len() && b[ib].0 <= y0;
        if op.eval(in_a, in_b) {
            match result.last_mut() {
                Some(last) if last.1 == y0 => last.1 = y1,
                _ => result.push((y0, y1)),
            }
        }
    }
    result
}

/// Runs a slab sweep over both inputs and returns the canonical merged result.
fn sweep(a: &[Rect], b: &[Rect], op: BoolOp) -> Vec<Rect> {
    let mut a: Vec<Rect> = a.iter().filter(|r| r.has_area()).copied().collect();
    let mut b: Vec<Rect> = b.iter().filter(|r| r.has_area()).copied().collect();
    if a.is_empty() && b.is_empty() {
        return Vec::new();
    }
    a.sort_unstable_by_key(|r| r.left);
    b.sort_unstable_by_key(|r| r.left);

    let mut xs: Vec<Coord> = a
        .iter()
        .chain(b.iter())
        .flat_map(|r| [r.left, r.right])
        .collect();
    xs.sort_unstable();
    xs.dedup();

    let mut slabs: Vec<(Coord, Coord, Vec<Interval>)> = Vec::new();
    let (mut next_a, mut next_b) = (0, 0);
    let mut active_a: Vec<Rect> = Vec::new();
    let mut active_b: Vec<Rect> = Vec::new();

    for window in xs.windows(2) {
        let (x0, x1) = (window[0], window[1]);

        while next_a < a.len() && a[next_a].left <= x0 {
            active_a.push(a[next_a]);
            next_a += 1;
        }
        while next_b < b.len() && b[next_b].left <= x0 {
            active_b.push(b[next_b]);
            next_b += 1;
        }
        active_a.retain(|r| r.right > x0);
        active_b.retain(|r| r.right > x0);

        let ia = merge_intervals(active_a.iter().map(|r| (r.bottom, r.top)).collect());
        let ib = merge_intervals(active_b.iter().map(|r| (r.bottom, r.top)).collect());
        let intervals = combine_intervals(&ia, &ib, op);
        if intervals.is_empty() {
            continue;
        }

        match slabs.last_mut() {
            Some(last) if last.1 == x0 && last.2 == intervals => last.1 = x1,
            _ => slabs.push((x0, x1, intervals)),
        }
    }

    slabs
        .into_iter()
        .flat_map(|(x0, x1, intervals)| {
            intervals
                .into_iter()
                .map(move |(y0, y1)| Rect::new(x0, y0, x1, y1))
        })
        .collect()
}

/// A single merged polygon: a connected set of boxes from a merged region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polygon {
    boxes: Vec<Rect>,
    bbox: Rect,
}

impl Polygon {
    /// The boxes composing this polygon.
    #[must_use]
    pub fn boxes(&self) -> &[Rect] {
        &self.boxes
    }

    /// The bounding box of the polygon.
    #[must_use]
    pub fn bbox(&self) -> Rect {
        self.bbox
    }

    /// The covered area.
    #[must_use]
    pub fn area(&self) -> i128 {
        self.boxes.iter().map(Rect::area).sum()
    }
}

/// Minimal union-find used for polygon extraction.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// A mergeable set of rectilinear shapes.
///
/// # Examples
///
/// ```rust
/// use xorscope::db::{Rect, Region};
///
/// let a = Region::from(Rect::new(0, 0, 10, 10));
/// let b = Region::from(Rect::new(1, 0, 11, 10));
///
/// let diff = &a ^ &b;
/// assert_eq!(diff.count(), 2);
///
/// // a tolerance of 2 units (1 on each side) swallows the 1-unit slivers
/// assert!(diff.opened(1).is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Region {
    boxes: Vec<Rect>,
    merged: bool,
}

impl Region {
    /// Creates an empty region.
    #[must_use]
    pub fn new() -> Self {
        Self {
            boxes: Vec::new(),
            merged: true,
        }
    }

    /// Creates a region from raw boxes (not merged).
    pub fn from_rects<I: IntoIterator<Item = Rect>>(rects: I) -> Self {
        let mut region = Self::new();
        for r in rects {
            region.insert(r);
        }
        region
    }

    fn from_merged(boxes: Vec<Rect>) -> Self {
        Self {
            boxes,
            merged: true,
        }
    }

    /// Adds a box. Boxes without area are ignored.
    pub fn insert(&mut self, rect: Rect) {
        if rect.has_area() {
            self.boxes.push(rect);
            self.merged = false;
        }
    }

    /// Adds all boxes of another region.
    pub fn insert_region(&mut self, other: &Region) {
        if other.boxes.is_empty() {
            return;
        }
        self.boxes.extend_from_slice(&other.boxes);
        self.merged = false;
    }

    /// Adds all boxes of a polygon.
    pub fn insert_polygon(&mut self, polygon: &Polygon) {
        for r in polygon.boxes() {
            self.insert(*r);
        }
    }

    /// The raw boxes, in merged form only if [`Region::is_merged`] is true.
    #[must_use]
    pub fn rects(&self) -> &[Rect] {
        &self.boxes
    }

    /// Consumes the region and returns its boxes.
    #[must_use]
    pub fn into_rects(self) -> Vec<Rect> {
        self.boxes
    }

    /// Number of raw boxes stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// Returns `true` if the region covers no area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Returns `true` if the boxes are in canonical merged form.
    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.merged
    }

    /// The bounding box of all shapes.
    #[must_use]
    pub fn bbox(&self) -> Rect {
        self.boxes.iter().fold(Rect::empty(), |acc, r| acc.union(r))
    }

    /// The covered area (overlaps counted once).
    #[must_use]
    pub fn area(&self) -> i128 {
        if self.merged {
            self.boxes.iter().map(Rect::area).sum()
        } else {
            self.merged().area()
        }
    }

    /// Returns the merged (canonical) form of this region.
    #[must_use]
    pub fn merged(&self) -> Region {
        if self.merged {
            return self.clone();
        }
        Region::from_merged(sweep(&self.boxes, &[], BoolOp::Or))
    }

    /// Merges this region in place.
    pub fn merge(&mut self) {
        if !self.merged {
            self.boxes = sweep(&self.boxes, &[], BoolOp::Or);
            self.merged = true;
        }
    }

    /// Union of both regions.
    #[must_use]
    pub fn or(&self, other: &Region) -> Region {
        Region::from_merged(sweep(&self.boxes, &other.boxes, BoolOp::Or))
    }

    /// Intersection of both regions.
    #[must_use]
    pub fn and(&self, other: &Region) -> Region {
        Region::from_merged(sweep(&self.boxes, &other.boxes, BoolOp::And))
    }

    /// Symmetric difference of both regions.
    #[must_use]
    pub fn xor(&self, other: &Region) -> Region {
        Region::from_merged(sweep(&self.boxes, &other.boxes, BoolOp::Xor))
    }

    /// Everything in `self` that is not in `other`.
    #[must_use]
    pub fn not(&self, other: &Region) -> Region {
        Region::from_merged(sweep(&self.boxes, &other.boxes, BoolOp::Not))
    }

    /// Clips the region to a box.
    #[must_use]
    pub fn clipped(&self, rect: &Rect) -> Region {
        let clipped: Vec<Rect> = self
            .boxes
            .iter()
            .map(|r| r.intersection(rect))
            .filter(Rect::has_area)
            .collect();
        if self.merged {
            // Clipping canonical slabs keeps slabs intact but may leave fusable neighbours.
            Region::from_merged(sweep(&clipped, &[], BoolOp::Or))
        } else {
            Region {
                boxes: clipped,
                merged: false,
            }
        }
    }

    /// Applies a transformation to all shapes.
    #[must_use]
    pub fn transformed(&self, trans: &Trans) -> Region {
        if trans.is_unity() {
            return self.clone();
        }
        Region {
            boxes: self.boxes.iter().map(|r| trans.apply_rect(r)).collect(),
            merged: self.boxes.is_empty(),
        }
    }

    /// Shifts all shapes by `d`.
    #[must_use]
    pub fn translated(&self, d: Point) -> Region {
        Region {
            boxes: self.boxes.iter().map(|r| r.moved(d)).collect(),
            merged: self.merged,
        }
    }

    /// Grows (`d > 0`) or shrinks (`d < 0`) the region by `|d|` on every side.
    ///
    /// The result is merged.
    #[must_use]
    pub fn sized(&self, d: Coord) -> Region {
        if d == 0 || self.is_empty() {
            return self.merged();
        }
        if d > 0 {
            let grown: Vec<Rect> = self.boxes.iter().map(|r| r.enlarged(d)).collect();
            return Region::from_merged(sweep(&grown, &[], BoolOp::Or));
        }

        let e = -d;
        let frame = Region::from(self.bbox().enlarged(e));
        let outside = frame.not(self).sized(e);
        self.not(&outside)
    }

    /// Shrinks by `d`, then grows by `d` again (morphological opening).
    ///
    /// Features narrower than `2 * d` vanish, everything else keeps its outline.
    #[must_use]
    pub fn opened(&self, d: Coord) -> Region {
        if d <= 0 {
            return self.merged();
        }
        self.sized(-d).sized(d)
    }

    fn components(merged: &[Rect]) -> DisjointSet {
        let mut by_left: HashMap<Coord, Vec<usize>> = HashMap::new();
        for (i, r) in merged.iter().enumerate() {
            by_left.entry(r.left).or_default().push(i);
        }

        let mut sets = DisjointSet::new(merged.len());
        for (i, r) in merged.iter().enumerate() {
            if let Some(neighbours) = by_left.get(&r.right) {
                for &j in neighbours {
                    let n = &merged[j];
                    if r.bottom.max(n.bottom) < r.top.min(n.top) {
                        sets.union(i, j);
                    }
                }
            }
        }
        sets
    }

    /// Number of merged polygons.
    #[must_use]
    pub fn count(&self) -> u64 {
        let merged = self.merged();
        let mut sets = Self::components(&merged.boxes);
        (0..merged.boxes.len()).filter(|&i| sets.find(i) == i).count() as u64
    }

    /// The merged polygons, in a deterministic order.
    #[must_use]
    pub fn polygons(&self) -> Vec<Polygon> {
        let merged = self.merged();
        let mut sets = Self::components(&merged.boxes);

        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        let mut polygons: Vec<Polygon> = Vec::new();
        for (i, r) in merged.boxes.iter().enumerate() {
            let root = sets.find(i);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                polygons.push(Polygon {
                    boxes: Vec::new(),
                    bbox: Rect::empty(),
                });
                polygons.len() - 1
            });
            let polygon = &mut polygons[slot];
            polygon.boxes.push(*r);
            polygon.bbox = polygon.bbox.union(r);
        }
        polygons
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        let mut region = Region::new();
        region.insert(rect);
        region.merged = true;
        region
    }
}

impl FromIterator<Rect> for Region {
    fn from_iter<I: IntoIterator<Item = Rect>>(iter: I) -> Self {
        Region::from_rects(iter)
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        match (self.merged, other.merged) {
            (true, true) => self.boxes == other.boxes,
            _ => self.merged().boxes == other.merged().boxes,
        }
    }
}

impl Eq for Region {}

impl BitXor for &Region {
    type Output = Region;

    fn bitxor(self, rhs: &Region) -> Region {
        self.xor(rhs)
    }
}

impl BitOr for &Region {
    type Output = Region;

    fn bitor(self, rhs: &Region) -> Region {
        self.or(rhs)
    }
}

impl BitAnd for &Region {
    type Output = Region;

    fn bitand(self, rhs: &Region) -> Region {
        self.and(rhs)
    }
}

impl Sub for &Region {
    type Output = Region;

    fn sub(self, rhs: &Region) -> Region {
        self.not(rhs)
    }
}
