//! Hierarchy-preserving XOR.
//!
//! [`HierarchicalXor`] walks the cell trees of both layouts in parallel, starting at the two
//! top cells. Inside a cell pair every child placement becomes an *item*: a placement found
//! with the same child name and transformation in both layouts is a matched item, the others
//! are one-sided. An item whose area is strictly separated from everything else in the cell
//! (other items and the cell's own shapes, in both layouts) cannot interact with its
//! surroundings, so it is pushed down: its XOR is computed once per child pair, in child
//! coordinates, and referenced by an instance. Everything else is flattened into the cell and
//! XORed locally.
//!
//! The result is a [`DeepRegion`]. Because pushed-down content never touches anything else,
//! polygon counts add up across cells and the morphological opening used for tolerances can
//! be applied cell by cell.

use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
};

use crate::db::{CellIndex, LayerIndex, Layout, Rect, Region, Shapes, Trans};

/// The input a cached value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The first layout
    A,
    /// The second layout
    B,
}

/// Worker-private memo of flattened cell contents.
///
/// Each worker owns one cache, so flattening a cell that is instantiated many times costs one
/// traversal per worker and never takes a lock.
#[derive(Debug, Default)]
pub struct HierarchyCache {
    flat: HashMap<(Side, CellIndex, LayerIndex), Rc<Region>>,
    bboxes: HashMap<(Side, CellIndex, LayerIndex), Rect>,
    hits: usize,
}

impl HierarchyCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recursive bounding box of `cell` on `layer`.
    pub fn bbox(&mut self, layout: &Layout, side: Side, cell: CellIndex, layer: LayerIndex) -> Rect {
        *self
            .bboxes
            .entry((side, cell, layer))
            .or_insert_with(|| layout.cell_bbox(cell, Some(layer)))
    }

    /// The merged, flattened content of `cell` on `layer`.
    pub fn flat(
        &mut self,
        layout: &Layout,
        side: Side,
        cell: CellIndex,
        layer: LayerIndex,
    ) -> Rc<Region> {
        if let Some(region) = self.flat.get(&(side, cell, layer)) {
            self.hits += 1;
            return Rc::clone(region);
        }
        let Some(c) = layout.cell(cell) else {
            return Rc::new(Region::new());
        };

        let mut region = c.shapes(layer).map(Shapes::to_region).unwrap_or_default();
        let mut placed = HashSet::new();
        for instance in c.instances() {
            if self.bbox(layout, side, instance.cell, layer).is_empty() {
                continue;
            }
            let child = self.flat(layout, side, instance.cell, layer);
            for trans in instance.placements() {
                if placed.insert((instance.cell, trans)) {
                    region.insert_region(&child.transformed(&trans));
                }
            }
        }
        region.merge();

        let region = Rc::new(region);
        self.flat.insert((side, cell, layer), Rc::clone(&region));
        region
    }

    /// Number of cached flattened cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flat.len()
    }

    /// Returns `true` if nothing was flattened yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }

    /// Number of lookups served from the cache.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits
    }
}

/// A placement of a result cell inside its parent result cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepInstance {
    /// Index of the child in [`DeepRegion::cells`]
    pub cell: usize,
    /// Placement relative to the parent
    pub trans: Trans,
}

/// One cell of a hierarchical result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepCell {
    /// Name of the source cell
    pub name: String,
    /// Local XOR shapes, merged
    pub region: Region,
    /// Pushed-down children
    pub instances: Vec<DeepInstance>,
}

/// A hierarchical region: result cells with local shapes and child placements.
///
/// A compacted deep region only holds cells reachable from the top that carry content in
/// their subtree, in depth-first discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepRegion {
    cells: Vec<DeepCell>,
    top: usize,
}

impl DeepRegion {
    /// An empty result with a named top cell.
    #[must_use]
    pub fn empty(name: &str) -> Self {
        Self {
            cells: vec![DeepCell {
                name: name.to_string(),
                region: Region::new(),
                instances: Vec::new(),
            }],
            top: 0,
        }
    }

    /// Builds a deep region from raw cells and compacts it.
    #[must_use]
    pub fn from_cells(cells: Vec<DeepCell>, top: usize) -> Self {
        Self { cells, top }.compacted()
    }

    /// All cells.
    #[must_use]
    pub fn cells(&self) -> &[DeepCell] {
        &self.cells
    }

    /// Index of the top cell.
    #[must_use]
    pub fn top(&self) -> usize {
        self.top
    }

    /// Returns `true` if the result holds no shapes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells
            .iter()
            .all(|c| c.region.is_empty())
    }

    /// Number of polygons stored in the hierarchy, each cell counted once.
    #[must_use]
    pub fn hier_count(&self) -> u64 {
        self.cells.iter().map(|c| c.region.count()).sum()
    }

    /// Number of polygons after expanding all placements.
    #[must_use]
    pub fn flat_count(&self) -> u64 {
        let mut memo: Vec<Option<u64>> = vec![None; self.cells.len()];
        self.flat_count_of(self.top, &mut memo)
    }

    fn flat_count_of(&self, cell: usize, memo: &mut Vec<Option<u64>>) -> u64 {
        if let Some(count) = memo.get(cell).copied().flatten() {
            return count;
        }
        let Some(c) = self.cells.get(cell) else {
            return 0;
        };
        let mut count = c.region.count();
        for instance in &c.instances {
            count = count.saturating_add(self.flat_count_of(instance.cell, memo));
        }
        memo[cell] = Some(count);
        count
    }

    /// The flattened result in top cell coordinates.
    #[must_use]
    pub fn flatten(&self) -> Region {
        let mut memo: Vec<Option<Region>> = vec![None; self.cells.len()];
        self.flatten_cell(self.top, &mut memo)
    }

    fn flatten_cell(&self, cell: usize, memo: &mut Vec<Option<Region>>) -> Region {
        if let Some(Some(region)) = memo.get(cell) {
            return region.clone();
        }
        let Some(c) = self.cells.get(cell) else {
            return Region::new();
        };
        let mut region = c.region.clone();
        for instance in &c.instances {
            let child = self.flatten_cell(instance.cell, memo);
            region.insert_region(&child.transformed(&instance.trans));
        }
        region.merge();
        memo[cell] = Some(region.clone());
        region
    }

    /// Applies a morphological opening of `d` to every cell.
    #[must_use]
    pub fn opened(&self, d: i64) -> DeepRegion {
        let cells = self
            .cells
            .iter()
            .map(|c| DeepCell {
                name: c.name.clone(),
                region: c.region.opened(d),
                instances: c.instances.clone(),
            })
            .collect();
        Self::from_cells(cells, self.top)
    }

    /// Drops cells without content in their subtree and renumbers the rest.
    fn compacted(self) -> DeepRegion {
        let mut alive: Vec<Option<bool>> = vec![None; self.cells.len()];
        for index in 0..self.cells.len() {
            self.has_content(index, &mut alive);
        }

        let mut renumbered: HashMap<usize, usize> = HashMap::new();
        let mut cells: Vec<DeepCell> = Vec::new();
        let top = self.copy_cell(self.top, &alive, &mut renumbered, &mut cells);
        DeepRegion { cells, top }
    }

    fn has_content(&self, cell: usize, alive: &mut Vec<Option<bool>>) -> bool {
        if let Some(known) = alive.get(cell).copied().flatten() {
            return known;
        }
        let Some(c) = self.cells.get(cell) else {
            return false;
        };
        let mut content = !c.region.is_empty();
        for instance in &c.instances {
            content |= self.has_content(instance.cell, alive);
        }
        alive[cell] = Some(content);
        content
    }

    fn copy_cell(
        &self,
        cell: usize,
        alive: &[Option<bool>],
        renumbered: &mut HashMap<usize, usize>,
        cells: &mut Vec<DeepCell>,
    ) -> usize {
        if let Some(&index) = renumbered.get(&cell) {
            return index;
        }
        let source = &self.cells[cell];
        let index = cells.len();
        renumbered.insert(cell, index);
        cells.push(DeepCell {
            name: source.name.clone(),
            region: source.region.clone(),
            instances: Vec::new(),
        });

        let mut instances = Vec::new();
        for instance in &source.instances {
            if alive.get(instance.cell).copied().flatten() == Some(true) {
                let child = self.copy_cell(instance.cell, alive, renumbered, cells);
                instances.push(DeepInstance {
                    cell: child,
                    trans: instance.trans,
                });
            }
        }
        cells[index].instances = instances;
        index
    }
}

struct Item {
    a: Option<CellIndex>,
    b: Option<CellIndex>,
    trans: Trans,
    area: Rect,
}

/// XOR of one layer pair over the cell hierarchies of both layouts.
///
/// A missing layer index makes its side contribute nothing.
pub struct HierarchicalXor<'a, 'c> {
    a: &'a Layout,
    b: &'a Layout,
    layer_a: Option<LayerIndex>,
    layer_b: Option<LayerIndex>,
    cache: &'c mut HierarchyCache,
    memo: HashMap<(Option<CellIndex>, Option<CellIndex>), usize>,
    cells: Vec<DeepCell>,
}

impl<'a, 'c> HierarchicalXor<'a, 'c> {
    /// Prepares the comparison of `layer_a` in `a` against `layer_b` in `b`.
    pub fn new(
        a: &'a Layout,
        b: &'a Layout,
        layer_a: Option<LayerIndex>,
        layer_b: Option<LayerIndex>,
        cache: &'c mut HierarchyCache,
    ) -> Self {
        Self {
            a,
            b,
            layer_a,
            layer_b,
            cache,
            memo: HashMap::new(),
            cells: Vec::new(),
        }
    }

    /// Computes the XOR below the two top cells.
    #[must_use]
    pub fn run(mut self, top_a: CellIndex, top_b: CellIndex) -> DeepRegion {
        let ca = self.layer_a.map(|_| top_a);
        let cb = self.layer_b.map(|_| top_b);
        let top = match (ca, cb) {
            (None, None) => return DeepRegion::empty(self.a.cell_name(top_a)),
            _ => self.xor_cell(ca, cb),
        };
        // The top result cell carries the name of the first layout's top.
        if let Some(cell) = self.cells.get_mut(top) {
            cell.name = self.a.cell_name(top_a).to_string();
        }
        DeepRegion::from_cells(self.cells, top)
    }

    fn own(&self, layout: &Layout, cell: Option<CellIndex>, layer: Option<LayerIndex>) -> Region {
        match (cell, layer) {
            (Some(cell), Some(layer)) => layout
                .cell(cell)
                .and_then(|c| c.shapes(layer))
                .map(|s| s.to_region().merged())
                .unwrap_or_default(),
            _ => Region::new(),
        }
    }

    fn placements(
        &mut self,
        side: Side,
        cell: Option<CellIndex>,
    ) -> Vec<(CellIndex, Trans, Rect)> {
        let (layout, layer) = match side {
            Side::A => (self.a, self.layer_a),
            Side::B => (self.b, self.layer_b),
        };
        let (Some(cell), Some(layer)) = (cell, layer) else {
            return Vec::new();
        };
        let Some(c) = layout.cell(cell) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut placements = Vec::new();
        for instance in c.instances() {
            let bbox = self.cache.bbox(layout, side, instance.cell, layer);
            if bbox.is_empty() {
                continue;
            }
            for trans in instance.placements() {
                if seen.insert((instance.cell, trans)) {
                    placements.push((instance.cell, trans, bbox));
                }
            }
        }
        placements
    }

    fn items(&mut self, ca: Option<CellIndex>, cb: Option<CellIndex>) -> Vec<Item> {
        let a_places = self.placements(Side::A, ca);
        let b_places = self.placements(Side::B, cb);

        let mut by_key: HashMap<(&str, Trans), Vec<usize>> = HashMap::new();
        for (i, (cell, trans, _)) in b_places.iter().enumerate().rev() {
            by_key
                .entry((self.b.cell_name(*cell), *trans))
                .or_default()
                .push(i);
        }

        let mut taken = vec![false; b_places.len()];
        let mut items = Vec::with_capacity(a_places.len() + b_places.len());
        for (cell, trans, bbox) in a_places {
            let partner = by_key
                .get_mut(&(self.a.cell_name(cell), trans))
                .and_then(Vec::pop);
            match partner {
                Some(j) => {
                    taken[j] = true;
                    let (b_cell, _, b_bbox) = b_places[j];
                    items.push(Item {
                        a: Some(cell),
                        b: Some(b_cell),
                        trans,
                        area: trans.apply_rect(&bbox.union(&b_bbox)),
                    });
                }
                None => items.push(Item {
                    a: Some(cell),
                    b: None,
                    trans,
                    area: trans.apply_rect(&bbox),
                }),
            }
        }
        for (j, (cell, trans, bbox)) in b_places.into_iter().enumerate() {
            if !taken[j] {
                items.push(Item {
                    a: None,
                    b: Some(cell),
                    trans,
                    area: trans.apply_rect(&bbox),
                });
            }
        }
        items
    }

    fn xor_cell(&mut self, ca: Option<CellIndex>, cb: Option<CellIndex>) -> usize {
        if let Some(&index) = self.memo.get(&(ca, cb)) {
            return index;
        }

        let name = match (ca, cb) {
            (Some(c), _) => self.a.cell_name(c).to_string(),
            (None, Some(c)) => self.b.cell_name(c).to_string(),
            (None, None) => String::new(),
        };
        let mut local_a = self.own(self.a, ca, self.layer_a);
        let mut local_b = self.own(self.b, cb, self.layer_b);
        let items = self.items(ca, cb);

        let mut obstacles: Vec<(Rect, Option<usize>)> = local_a
            .rects()
            .iter()
            .chain(local_b.rects())
            .map(|r| (*r, None))
            .collect();
        obstacles.extend(items.iter().enumerate().map(|(i, item)| (item.area, Some(i))));
        let blocked = blocked_items(&obstacles, items.len());

        let mut instances = Vec::new();
        for (item, blocked) in items.iter().zip(blocked) {
            if !blocked {
                let child = self.xor_cell(item.a, item.b);
                instances.push(DeepInstance {
                    cell: child,
                    trans: item.trans,
                });
                continue;
            }
            if let (Some(cell), Some(layer)) = (item.a, self.layer_a) {
                let flat = self.cache.flat(self.a, Side::A, cell, layer);
                local_a.insert_region(&flat.transformed(&item.trans));
            }
            if let (Some(cell), Some(layer)) = (item.b, self.layer_b) {
                let flat = self.cache.flat(self.b, Side::B, cell, layer);
                local_b.insert_region(&flat.transformed(&item.trans));
            }
        }

        let region = if local_b.is_empty() {
            local_a.merged()
        } else if local_a.is_empty() {
            local_b.merged()
        } else {
            local_a.xor(&local_b)
        };

        let index = self.cells.len();
        self.cells.push(DeepCell {
            name,
            region,
            instances,
        });
        self.memo.insert((ca, cb), index);
        index
    }
}

/// Marks every item whose area touches any other entry.
fn blocked_items(entries: &[(Rect, Option<usize>)], items: usize) -> Vec<bool> {
    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by_key(|&i| entries[i].0.left);

    let mut blocked = vec![false; items];
    for (k, &i) in order.iter().enumerate() {
        let (ri, item_i) = entries[i];
        for &j in &order[k + 1..] {
            let (rj, item_j) = entries[j];
            if rj.left > ri.right {
                break;
            }
            if ri.touches(&rj) {
                if let Some(x) = item_i {
                    blocked[x] = true;
                }
                if let Some(x) = item_j {
                    blocked[x] = true;
                }
            }
        }
    }
    blocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{Instance, Orientation, Point, RecursiveShapeIterator},
        test::{
            factories::{arrayed_layout, square_layout},
            layer_region,
        },
    };

    fn flat_xor(a: &Layout, b: &Layout, la: LayerIndex, lb: LayerIndex) -> Region {
        let top_a = a.top_cells()[0];
        let top_b = b.top_cells()[0];
        let ra = RecursiveShapeIterator::new(a, top_a, la).into_region();
        let rb = RecursiveShapeIterator::new(b, top_b, lb).into_region();
        ra.xor(&rb)
    }

    #[test]
    fn test_identical_hierarchies_are_empty() {
        let (a, la) = arrayed_layout(4, 3, None);
        let (b, lb) = arrayed_layout(4, 3, None);
        let mut cache = HierarchyCache::new();
        let result = HierarchicalXor::new(&a, &b, Some(la), Some(lb), &mut cache)
            .run(a.top_cells()[0], b.top_cells()[0]);

        assert!(result.is_empty());
        assert_eq!(result.hier_count(), 0);
        assert_eq!(result.cells().len(), 1);
    }

    #[test]
    fn test_changed_leaf_is_pushed_down() {
        let (a, la) = arrayed_layout(4, 3, None);
        // the leaf carries an extra tab in B
        let (b, lb) = arrayed_layout(4, 3, Some(Rect::new(10, 2, 12, 4)));
        let mut cache = HierarchyCache::new();
        let result = HierarchicalXor::new(&a, &b, Some(la), Some(lb), &mut cache)
            .run(a.top_cells()[0], b.top_cells()[0]);

        assert_eq!(result.hier_count(), 1);
        assert_eq!(result.flat_count(), 12);
        assert_eq!(result.cells().len(), 2);
        assert_eq!(result.flatten(), flat_xor(&a, &b, la, lb));
    }

    #[test]
    fn test_interacting_placement_is_flattened() {
        let (a, la) = square_layout(Rect::new(0, 0, 10, 10));
        let (mut b, lb) = square_layout(Rect::new(0, 0, 10, 10));
        let top_b = b.top_cells()[0];
        let child = b.add_cell("CHILD").unwrap();
        b.insert(child, lb, Rect::new(0, 0, 5, 5)).unwrap();
        // overlaps the square of the top cell, so it cannot be pushed down
        b.insert_instance(
            top_b,
            Instance::new(child, Trans::new(Orientation::R90, Point::new(12, 2))),
        )
        .unwrap();

        let mut cache = HierarchyCache::new();
        let result = HierarchicalXor::new(&a, &b, Some(la), Some(lb), &mut cache)
            .run(a.top_cells()[0], top_b);

        let expected = flat_xor(&a, &b, la, lb);
        assert_eq!(result.flatten(), expected);
        assert_eq!(result.cells().len(), 1);
        assert_eq!(result.flat_count(), expected.count());
    }

    #[test]
    fn test_missing_side_yields_other_side() {
        let (a, la) = arrayed_layout(2, 2, None);
        let (b, _) = arrayed_layout(2, 2, None);
        let mut cache = HierarchyCache::new();
        let result = HierarchicalXor::new(&a, &b, Some(la), None, &mut cache)
            .run(a.top_cells()[0], b.top_cells()[0]);

        let top = a.top_cells()[0];
        assert_eq!(result.flatten(), layer_region(&a, top, la));
        assert_eq!(result.flat_count(), 4);
        assert_eq!(result.hier_count(), 1);
    }

    #[test]
    fn test_opened_per_cell() {
        let (a, la) = arrayed_layout(3, 1, None);
        let (b, lb) = arrayed_layout(3, 1, Some(Rect::new(2, 2, 3, 30)));
        let mut cache = HierarchyCache::new();
        let result = HierarchicalXor::new(&a, &b, Some(la), Some(lb), &mut cache)
            .run(a.top_cells()[0], b.top_cells()[0]);

        assert_eq!(result.flat_count(), 3);
        // the 1-unit wide sliver vanishes under an opening of 1
        let opened = result.opened(1);
        assert!(opened.is_empty());
        assert_eq!(opened.cells().len(), 1);
        assert_eq!(opened.flatten(), flat_xor(&a, &b, la, lb).opened(1));
    }

    #[test]
    fn test_cache_reuses_flattened_cells() {
        let (a, la) = arrayed_layout(5, 5, None);
        let mut cache = HierarchyCache::new();
        let top = a.top_cells()[0];
        let first = cache.flat(&a, Side::A, top, la);
        let second = cache.flat(&a, Side::A, top, la);
        assert!(Rc::ptr_eq(&first, &second));
        assert!(cache.hits() >= 1);
        assert_eq!(first.count(), 25);
    }
}
