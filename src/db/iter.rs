//! Lazy traversal of the shapes below a cell.

use std::{collections::HashSet, sync::Arc};

use crate::db::{layout::BboxTable, CellIndex, LayerIndex, Layout, Rect, Region, Trans};

struct Frame<'a> {
    trans: Trans,
    shapes: Box<dyn Iterator<Item = &'a Rect> + 'a>,
    instances: std::slice::Iter<'a, crate::db::Instance>,
}

/// Delivers all shapes of one layer below a start cell, transformed into the start
/// cell's coordinate system.
///
/// The traversal is depth first and lazy: child cells are only entered when their
/// bounding box touches the confinement box (if one is set). Shapes are not clipped;
/// a shape is delivered if it touches the confinement box. Bounding boxes are read from
/// a snapshot taken when the traversal starts, so a running iterator never locks the layout.
///
/// With [`RecursiveShapeIterator::for_merged_input`] enabled, placements of the same
/// cell with identical absolute transformations are visited only once. Such duplicates
/// do not change the merged result but would multiply the work of the union.
///
/// # Examples
///
/// ```rust
/// use xorscope::db::{Instance, LayerInfo, Layout, Rect, RecursiveShapeIterator, Trans};
///
/// let mut layout = Layout::new(0.001);
/// let l1 = layout.insert_layer(LayerInfo::new(1, 0));
/// let top = layout.add_cell("TOP")?;
/// let leaf = layout.add_cell("LEAF")?;
/// layout.insert(leaf, l1, Rect::new(0, 0, 10, 10))?;
/// layout.insert_instance(top, Instance::new(leaf, Trans::displacement(0, 0)))?;
/// layout.insert_instance(top, Instance::new(leaf, Trans::displacement(0, 0)))?;
///
/// assert_eq!(RecursiveShapeIterator::new(&layout, top, l1).count(), 2);
///
/// let iter = RecursiveShapeIterator::new(&layout, top, l1).for_merged_input(true);
/// assert_eq!(iter.count(), 1);
/// # Ok::<(), xorscope::Error>(())
/// ```
pub struct RecursiveShapeIterator<'a> {
    layout: &'a Layout,
    top: CellIndex,
    layer: LayerIndex,
    confinement: Option<Rect>,
    merged_input: bool,
    stack: Vec<Frame<'a>>,
    visited: HashSet<(CellIndex, Trans)>,
    bboxes: Option<Arc<BboxTable>>,
}

impl<'a> RecursiveShapeIterator<'a> {
    /// Creates an iterator over `layer` below `top`.
    #[must_use]
    pub fn new(layout: &'a Layout, top: CellIndex, layer: LayerIndex) -> Self {
        Self {
            layout,
            top,
            layer,
            confinement: None,
            merged_input: false,
            stack: Vec::new(),
            visited: HashSet::new(),
            bboxes: None,
        }
    }

    /// Restricts the traversal to shapes touching `rect` (top cell coordinates).
    #[must_use]
    pub fn confined(mut self, rect: Rect) -> Self {
        self.confinement = Some(rect);
        self.restart();
        self
    }

    /// Enables suppression of duplicate placements.
    #[must_use]
    pub fn for_merged_input(mut self, enabled: bool) -> Self {
        self.merged_input = enabled;
        self.restart();
        self
    }

    /// Rewinds the iterator to the first shape.
    pub fn restart(&mut self) {
        self.stack.clear();
        self.visited.clear();
        self.bboxes = None;
    }

    /// Collects all remaining shapes into a region.
    #[must_use]
    pub fn into_region(self) -> Region {
        self.collect()
    }

    fn push(&mut self, cell: CellIndex, trans: Trans) {
        let Some(c) = self.layout.cell(cell) else {
            return;
        };
        let shapes: Box<dyn Iterator<Item = &'a Rect> + 'a> = match c.shapes(self.layer) {
            Some(shapes) => Box::new(shapes.iter()),
            None => Box::new(std::iter::empty()),
        };
        self.stack.push(Frame {
            trans,
            shapes,
            instances: c.instances().iter(),
        });
    }

    fn bbox(&self, cell: CellIndex) -> Rect {
        self.bboxes
            .as_ref()
            .and_then(|table| table.get(&(cell, Some(self.layer))))
            .copied()
            .unwrap_or_else(Rect::empty)
    }

    fn admits(&self, rect: &Rect) -> bool {
        self.confinement.map_or(true, |c| rect.touches(&c))
    }
}

impl Iterator for RecursiveShapeIterator<'_> {
    type Item = Rect;

    fn next(&mut self) -> Option<Rect> {
        if self.bboxes.is_none() {
            self.bboxes = Some(self.layout.bbox_table());
            if self.admits(&self.bbox(self.top)) {
                self.push(self.top, Trans::default());
            }
        }

        loop {
            let frame = self.stack.last_mut()?;
            let trans = frame.trans;

            for rect in frame.shapes.by_ref() {
                let placed = trans.apply_rect(rect);
                if self.confinement.map_or(true, |c| placed.touches(&c)) {
                    return Some(placed);
                }
            }

            let Some(instance) = frame.instances.next().copied() else {
                self.stack.pop();
                continue;
            };

            let child_bbox = self.bbox(instance.cell);
            if child_bbox.is_empty() {
                continue;
            }
            // Arrays are expanded here; each placement becomes its own frame.
            let confinement = self.confinement;
            let merged_input = self.merged_input;
            let visited = &mut self.visited;
            let placements: Vec<Trans> = instance
                .placements()
                .map(|p| trans * p)
                .filter(|t| confinement.map_or(true, |c| t.apply_rect(&child_bbox).touches(&c)))
                .filter(|t| !merged_input || visited.insert((instance.cell, *t)))
                .collect();
            for t in placements.into_iter().rev() {
                self.push(instance.cell, t);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Instance, LayerInfo, Orientation, Point};

    fn layout() -> (Layout, CellIndex, LayerIndex, LayerIndex) {
        let mut layout = Layout::new(0.001);
        let l1 = layout.insert_layer(LayerInfo::new(1, 0));
        let l2 = layout.insert_layer(LayerInfo::new(2, 0));
        let top = layout.add_cell("TOP").unwrap();
        let mid = layout.add_cell("MID").unwrap();
        let leaf = layout.add_cell("LEAF").unwrap();

        layout.insert(leaf, l1, Rect::new(0, 0, 10, 10)).unwrap();
        layout.insert(mid, l1, Rect::new(500, 500, 501, 501)).unwrap();
        layout
            .insert_instance(
                mid,
                Instance::array(
                    leaf,
                    Trans::default(),
                    2,
                    2,
                    Point::new(100, 0),
                    Point::new(0, 100),
                ),
            )
            .unwrap();
        layout
            .insert_instance(top, Instance::new(mid, Trans::displacement(1000, 0)))
            .unwrap();
        layout
            .insert_instance(
                top,
                Instance::new(mid, Trans::new(Orientation::R90, Point::new(0, 0))),
            )
            .unwrap();
        layout.insert(top, l2, Rect::new(0, 0, 5, 5)).unwrap();
        (layout, top, l1, l2)
    }

    #[test]
    fn test_flattened_shapes() {
        let (layout, top, l1, l2) = layout();
        let shapes: Vec<Rect> = RecursiveShapeIterator::new(&layout, top, l1).collect();
        assert_eq!(shapes.len(), 10);
        assert!(shapes.contains(&Rect::new(1100, 100, 1110, 110)));
        assert!(shapes.contains(&Rect::new(-110, 100, -100, 110)));
        assert!(shapes.contains(&Rect::new(-501, 500, -500, 501)));

        assert_eq!(RecursiveShapeIterator::new(&layout, top, l2).count(), 1);
    }

    #[test]
    fn test_confinement_prunes() {
        let (layout, top, l1, _) = layout();
        let iter = RecursiveShapeIterator::new(&layout, top, l1)
            .confined(Rect::new(1050, -50, 2000, 50));
        let shapes: Vec<Rect> = iter.collect();
        assert_eq!(shapes, vec![Rect::new(1100, 0, 1110, 10)]);
    }

    #[test]
    fn test_restart() {
        let (layout, top, l1, _) = layout();
        let mut iter = RecursiveShapeIterator::new(&layout, top, l1);
        let first: Vec<Rect> = iter.by_ref().take(3).collect();
        iter.restart();
        let again: Vec<Rect> = iter.take(3).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn test_merged_input_skips_duplicates() {
        let (mut layout, top, l1, _) = layout();
        let mid = layout.cell_by_name("MID").unwrap();
        layout
            .insert_instance(top, Instance::new(mid, Trans::displacement(1000, 0)))
            .unwrap();

        assert_eq!(RecursiveShapeIterator::new(&layout, top, l1).count(), 15);
        let merged = RecursiveShapeIterator::new(&layout, top, l1).for_merged_input(true);
        assert_eq!(merged.count(), 10);
    }

    #[test]
    fn test_into_region() {
        let (layout, top, l1, _) = layout();
        assert_eq!(RecursiveShapeIterator::new(&layout, top, l1).count(), 10);
        let region = RecursiveShapeIterator::new(&layout, top, l1).into_region();
        assert_eq!(region.count(), 10);
        assert!(region.bbox().contains_rect(&Rect::new(1500, 500, 1501, 501)));
    }
}
