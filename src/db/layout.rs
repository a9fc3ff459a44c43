//! Hierarchical layout database.
//!
//! A [`Layout`] owns a list of layers, a list of cells and a database unit. Cells hold
//! shapes per layer and instances of other cells. The structure is deliberately small:
//! it is what the comparison engines need to read two inputs and to produce an output,
//! nothing more.
//!
//! # Concurrent insertion
//!
//! Shape containers are append-only [`boxcar::Vec`]s, so once a cell/layer slot has been
//! prepared through [`Layout::prepare_shapes`] any number of threads may insert into it
//! through a shared reference with [`Layout::insert_shape`]. Structural edits (new cells,
//! new layers, new instances) still require `&mut Layout`.
//!
//! # Change transactions
//!
//! Bounding boxes are computed lazily for all cells at once and cached. A batch of
//! insertions can be wrapped in [`Layout::start_changes`] / [`Layout::end_changes`]; while
//! such a transaction is open, inserts do not invalidate the cache, and the outermost
//! `end_changes` invalidates it once.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use crate::{
    db::{Coord, Point, Rect, Region, Trans},
    Error, Result,
};

/// Index of a layer inside a [`Layout`].
pub type LayerIndex = usize;

/// Index of a cell inside a [`Layout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellIndex(pub usize);

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Layer properties as stored in a layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerInfo {
    /// GDS-style layer number
    pub layer: i32,
    /// GDS-style datatype
    pub datatype: i32,
    /// Optional layer name
    pub name: Option<String>,
}

impl LayerInfo {
    /// Creates an unnamed layer.
    #[must_use]
    pub fn new(layer: i32, datatype: i32) -> Self {
        Self {
            layer,
            datatype,
            name: None,
        }
    }

    /// Creates a named layer.
    #[must_use]
    pub fn named(layer: i32, datatype: i32, name: &str) -> Self {
        Self {
            layer,
            datatype,
            name: Some(name.to_string()),
        }
    }

    /// Returns `true` if the layer carries a layer/datatype number.
    #[must_use]
    pub fn is_numbered(&self) -> bool {
        self.layer >= 0 && self.datatype >= 0
    }
}

impl fmt::Display for LayerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}/{} ({})", self.layer, self.datatype, name),
            None => write!(f, "{}/{}", self.layer, self.datatype),
        }
    }
}

/// Regular array repetition of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayRepetition {
    /// Number of columns (at least 1)
    pub columns: u32,
    /// Number of rows (at least 1)
    pub rows: u32,
    /// Displacement between two columns
    pub column_step: Point,
    /// Displacement between two rows
    pub row_step: Point,
}

/// A placement of a child cell inside a parent cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instance {
    /// The child cell
    pub cell: CellIndex,
    /// Transformation of the first placement
    pub trans: Trans,
    /// Optional array repetition
    pub array: Option<ArrayRepetition>,
}

impl Instance {
    /// A single placement.
    #[must_use]
    pub fn new(cell: CellIndex, trans: Trans) -> Self {
        Self {
            cell,
            trans,
            array: None,
        }
    }

    /// A regular `columns x rows` array.
    #[must_use]
    pub fn array(
        cell: CellIndex,
        trans: Trans,
        columns: u32,
        rows: u32,
        column_step: Point,
        row_step: Point,
    ) -> Self {
        Self {
            cell,
            trans,
            array: Some(ArrayRepetition {
                columns: columns.max(1),
                rows: rows.max(1),
                column_step,
                row_step,
            }),
        }
    }

    /// Number of placements described by this instance.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.array
            .map_or(1, |a| u64::from(a.columns) * u64::from(a.rows))
    }

    /// Iterates all placements of the instance.
    pub fn placements(&self) -> impl Iterator<Item = Trans> + '_ {
        let (columns, rows, column_step, row_step) = match self.array {
            Some(a) => (a.columns, a.rows, a.column_step, a.row_step),
            None => (1, 1, Point::default(), Point::default()),
        };
        (0..rows).flat_map(move |j| {
            (0..columns).map(move |i| {
                let shift = Point::new(
                    Coord::from(i) * column_step.x + Coord::from(j) * row_step.x,
                    Coord::from(i) * column_step.y + Coord::from(j) * row_step.y,
                );
                Trans::new(self.trans.orientation, self.trans.disp + shift)
            })
        })
    }

    /// The placements at the array corners; enough to bound the whole array.
    fn corner_placements(&self) -> Vec<Trans> {
        match self.array {
            None => vec![self.trans],
            Some(a) if a.columns == 0 || a.rows == 0 => Vec::new(),
            Some(a) => {
                let last_i = Coord::from(a.columns - 1);
                let last_j = Coord::from(a.rows - 1);
                [(0, 0), (last_i, 0), (0, last_j), (last_i, last_j)]
                    .into_iter()
                    .map(|(i, j)| {
                        let shift = Point::new(
                            i * a.column_step.x + j * a.row_step.x,
                            i * a.column_step.y + j * a.row_step.y,
                        );
                        Trans::new(self.trans.orientation, self.trans.disp + shift)
                    })
                    .collect()
            }
        }
    }
}

/// Append-only shape container of one cell on one layer.
#[derive(Debug, Default)]
pub struct Shapes {
    items: boxcar::Vec<Rect>,
}

impl Shapes {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a box. Safe to call concurrently.
    pub fn insert(&self, rect: Rect) {
        self.items.push(rect);
    }

    /// Number of stored shapes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.count()
    }

    /// Returns `true` if no shape is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates the stored shapes.
    pub fn iter(&self) -> impl Iterator<Item = &Rect> + '_ {
        self.items.iter().map(|(_, r)| r)
    }

    /// Collects the shapes into a (non-merged) region.
    #[must_use]
    pub fn to_region(&self) -> Region {
        self.iter().copied().collect()
    }

    /// Bounding box of all stored shapes.
    #[must_use]
    pub fn bbox(&self) -> Rect {
        self.iter().fold(Rect::empty(), |acc, r| acc.union(r))
    }
}

/// A cell: shapes per layer plus child instances.
#[derive(Debug)]
pub struct Cell {
    name: String,
    shapes: BTreeMap<LayerIndex, Shapes>,
    instances: Vec<Instance>,
}

impl Cell {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            shapes: BTreeMap::new(),
            instances: Vec::new(),
        }
    }

    /// The cell name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shapes on a layer, if the layer slot exists.
    #[must_use]
    pub fn shapes(&self, layer: LayerIndex) -> Option<&Shapes> {
        self.shapes.get(&layer)
    }

    /// The child instances.
    #[must_use]
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Returns `true` if the cell holds no shapes and no instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty() && self.shapes.values().all(Shapes::is_empty)
    }
}

pub(crate) type BboxTable = HashMap<(CellIndex, Option<LayerIndex>), Rect>;

/// A hierarchical layout.
///
/// # Examples
///
/// ```rust
/// use xorscope::db::{Instance, LayerInfo, Layout, Rect, Trans};
///
/// let mut layout = Layout::new(0.001);
/// let m1 = layout.insert_layer(LayerInfo::new(1, 0));
/// let top = layout.add_cell("TOP")?;
/// let via = layout.add_cell("VIA")?;
///
/// layout.insert(via, m1, Rect::new(0, 0, 10, 10))?;
/// layout.insert_instance(top, Instance::new(via, Trans::displacement(100, 0)))?;
///
/// assert_eq!(layout.top_cells(), vec![top]);
/// assert_eq!(layout.cell_bbox(top, Some(m1)), Rect::new(100, 0, 110, 10));
/// # Ok::<(), xorscope::Error>(())
/// ```
#[derive(Debug)]
pub struct Layout {
    dbu: f64,
    layers: Vec<LayerInfo>,
    cells: Vec<Cell>,
    changes: AtomicUsize,
    bboxes: Mutex<Option<Arc<BboxTable>>>,
    generation: AtomicUsize,
}

impl Layout {
    /// Creates an empty layout with the given database unit (micrometers per unit).
    #[must_use]
    pub fn new(dbu: f64) -> Self {
        Self {
            dbu,
            layers: Vec::new(),
            cells: Vec::new(),
            changes: AtomicUsize::new(0),
            bboxes: Mutex::new(None),
            generation: AtomicUsize::new(0),
        }
    }

    /// The database unit in micrometers.
    #[must_use]
    pub fn dbu(&self) -> f64 {
        self.dbu
    }

    /// Appends a layer and returns its index.
    pub fn insert_layer(&mut self, info: LayerInfo) -> LayerIndex {
        self.layers.push(info);
        self.layers.len() - 1
    }

    /// Finds a layer by layer number and datatype.
    #[must_use]
    pub fn find_layer(&self, layer: i32, datatype: i32) -> Option<LayerIndex> {
        self.layers
            .iter()
            .position(|l| l.is_numbered() && l.layer == layer && l.datatype == datatype)
    }

    /// Finds a layer with the same logical identity as `info`.
    ///
    /// Numbered layers match by layer and datatype, unnumbered ones by name.
    #[must_use]
    pub fn find_layer_info(&self, info: &LayerInfo) -> Option<LayerIndex> {
        if info.is_numbered() {
            return self.find_layer(info.layer, info.datatype);
        }
        self.layers
            .iter()
            .position(|l| !l.is_numbered() && l.name == info.name)
    }

    /// Returns the index of a matching layer, inserting it if necessary.
    pub fn find_or_insert_layer(&mut self, info: LayerInfo) -> LayerIndex {
        match self.find_layer_info(&info) {
            Some(index) => index,
            None => self.insert_layer(info),
        }
    }

    /// Layer properties by index.
    #[must_use]
    pub fn layer(&self, index: LayerIndex) -> Option<&LayerInfo> {
        self.layers.get(index)
    }

    /// Iterates all layers with their index.
    pub fn layers(&self) -> impl Iterator<Item = (LayerIndex, &LayerInfo)> + '_ {
        self.layers.iter().enumerate()
    }

    /// Number of layers.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Adds a new, empty cell.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateCell`] if a cell with that name already exists.
    pub fn add_cell(&mut self, name: &str) -> Result<CellIndex> {
        if self.cell_by_name(name).is_some() {
            return Err(Error::DuplicateCell(name.to_string()));
        }
        self.cells.push(Cell::new(name));
        self.invalidate();
        Ok(CellIndex(self.cells.len() - 1))
    }

    /// Returns a cell name that is not used yet, derived from `base`.
    #[must_use]
    pub fn unique_cell_name(&self, base: &str) -> String {
        if self.cell_by_name(base).is_none() {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}${n}"))
            .find(|candidate| self.cell_by_name(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    /// Looks up a cell by name.
    #[must_use]
    pub fn cell_by_name(&self, name: &str) -> Option<CellIndex> {
        self.cells
            .iter()
            .position(|c| c.name == name)
            .map(CellIndex)
    }

    /// A cell by index.
    #[must_use]
    pub fn cell(&self, index: CellIndex) -> Option<&Cell> {
        self.cells.get(index.0)
    }

    fn cell_checked(&self, index: CellIndex) -> Result<&Cell> {
        self.cells.get(index.0).ok_or(Error::InvalidCell(index.0))
    }

    /// The name of a cell, or an empty string for an invalid index.
    #[must_use]
    pub fn cell_name(&self, index: CellIndex) -> &str {
        self.cells.get(index.0).map_or("", |c| c.name.as_str())
    }

    /// Iterates all cells with their index.
    pub fn cells(&self) -> impl Iterator<Item = (CellIndex, &Cell)> + '_ {
        self.cells.iter().enumerate().map(|(i, c)| (CellIndex(i), c))
    }

    /// Number of cells.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Cells that are not instantiated by any other cell, in index order.
    #[must_use]
    pub fn top_cells(&self) -> Vec<CellIndex> {
        let children: HashSet<CellIndex> = self
            .cells
            .iter()
            .flat_map(|c| c.instances.iter().map(|i| i.cell))
            .collect();
        (0..self.cells.len())
            .map(CellIndex)
            .filter(|c| !children.contains(c))
            .collect()
    }

    /// Returns `true` if `ancestor` (transitively) instantiates `cell`, or both are equal.
    fn reaches(&self, ancestor: CellIndex, cell: CellIndex) -> bool {
        let mut stack = vec![ancestor];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == cell {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(c) = self.cells.get(current.0) {
                stack.extend(c.instances.iter().map(|i| i.cell));
            }
        }
        false
    }

    /// Adds an instance of a child cell to a parent cell.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCell`] for unknown cells, [`Error::EmptyArray`] for an array
    /// without columns or rows and [`Error::RecursiveHierarchy`] if the child already
    /// (transitively) contains the parent.
    pub fn insert_instance(&mut self, parent: CellIndex, instance: Instance) -> Result<()> {
        self.cell_checked(parent)?;
        self.cell_checked(instance.cell)?;
        if instance.size() == 0 {
            return Err(Error::EmptyArray(self.cell_name(instance.cell).to_string()));
        }
        if self.reaches(instance.cell, parent) {
            return Err(Error::RecursiveHierarchy(format!(
                "{} -> {}",
                self.cell_name(parent),
                self.cell_name(instance.cell)
            )));
        }
        self.cells[parent.0].instances.push(instance);
        self.invalidate();
        Ok(())
    }

    /// Makes sure the shape slot of `cell` on `layer` exists.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown cell or layer.
    pub fn prepare_shapes(&mut self, cell: CellIndex, layer: LayerIndex) -> Result<()> {
        self.cell_checked(cell)?;
        if layer >= self.layers.len() {
            return Err(Error::InvalidLayer(layer));
        }
        self.cells[cell.0].shapes.entry(layer).or_default();
        Ok(())
    }

    /// Mutable access to the shape slot of `cell` on `layer`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown cell or layer.
    pub fn shapes_mut(&mut self, cell: CellIndex, layer: LayerIndex) -> Result<&mut Shapes> {
        self.prepare_shapes(cell, layer)?;
        if !self.is_under_construction() {
            self.invalidate();
        }
        self.cells[cell.0]
            .shapes
            .get_mut(&layer)
            .ok_or(Error::InvalidLayer(layer))
    }

    /// Inserts a box, creating the shape slot if needed.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown cell or layer.
    pub fn insert(&mut self, cell: CellIndex, layer: LayerIndex, rect: Rect) -> Result<()> {
        self.prepare_shapes(cell, layer)?;
        self.insert_shape(cell, layer, rect)
    }

    /// Inserts a box into a prepared slot through a shared reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLayer`] if the slot was not prepared.
    pub fn insert_shape(&self, cell: CellIndex, layer: LayerIndex, rect: Rect) -> Result<()> {
        let shapes = self
            .cell_checked(cell)?
            .shapes
            .get(&layer)
            .ok_or(Error::InvalidLayer(layer))?;
        shapes.insert(rect);
        if !self.is_under_construction() {
            self.invalidate();
        }
        Ok(())
    }

    /// Inserts all boxes of a region into a prepared slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLayer`] if the slot was not prepared.
    pub fn insert_region(&self, cell: CellIndex, layer: LayerIndex, region: &Region) -> Result<()> {
        let shapes = self
            .cell_checked(cell)?
            .shapes
            .get(&layer)
            .ok_or(Error::InvalidLayer(layer))?;
        for r in region.rects() {
            shapes.insert(*r);
        }
        if !self.is_under_construction() {
            self.invalidate();
        }
        Ok(())
    }

    /// Opens a batched-change transaction. Transactions nest.
    pub fn start_changes(&self) {
        self.changes.fetch_add(1, Ordering::AcqRel);
    }

    /// Closes a batched-change transaction; the outermost one invalidates cached data.
    pub fn end_changes(&self) {
        let previous = self
            .changes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1));
        if matches!(previous, Ok(1) | Err(_)) {
            self.invalidate();
        }
    }

    /// Returns `true` while a change transaction is open.
    #[must_use]
    pub fn is_under_construction(&self) -> bool {
        self.changes.load(Ordering::Acquire) > 0
    }

    fn invalidate(&self) {
        let mut guard = self.bboxes.lock().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::AcqRel);
        *guard = None;
    }

    /// Shared snapshot of all recursive bounding boxes.
    ///
    /// The table is computed outside the lock; concurrent readers may compute it twice,
    /// the first one stored wins. A table computed across an invalidation is not stored.
    pub(crate) fn bbox_table(&self) -> Arc<BboxTable> {
        let generation = {
            let guard = self.bboxes.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(table) = guard.as_ref() {
                return Arc::clone(table);
            }
            self.generation.load(Ordering::Acquire)
        };
        let table = Arc::new(self.compute_bboxes());
        let mut guard = self.bboxes.lock().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::Acquire) != generation {
            return table;
        }
        Arc::clone(guard.get_or_insert(table))
    }

    fn compute_bboxes(&self) -> BboxTable {
        let mut table = BboxTable::new();
        let keys: Vec<Option<LayerIndex>> = std::iter::once(None)
            .chain((0..self.layers.len()).map(Some))
            .collect();
        for index in 0..self.cells.len() {
            for &layer in &keys {
                self.bbox_recursive(CellIndex(index), layer, &mut table);
            }
        }
        table
    }

    fn bbox_recursive(
        &self,
        cell: CellIndex,
        layer: Option<LayerIndex>,
        table: &mut BboxTable,
    ) -> Rect {
        if let Some(bbox) = table.get(&(cell, layer)) {
            return *bbox;
        }
        let Some(c) = self.cells.get(cell.0) else {
            return Rect::empty();
        };

        let mut bbox = match layer {
            Some(l) => c.shapes.get(&l).map_or(Rect::empty(), Shapes::bbox),
            None => c
                .shapes
                .values()
                .fold(Rect::empty(), |acc, s| acc.union(&s.bbox())),
        };
        for instance in &c.instances {
            let child = self.bbox_recursive(instance.cell, layer, table);
            if child.is_empty() {
                continue;
            }
            for placement in instance.corner_placements() {
                bbox = bbox.union(&placement.apply_rect(&child));
            }
        }

        table.insert((cell, layer), bbox);
        bbox
    }

    /// Recursive bounding box of a cell on one layer (`Some`) or on all layers (`None`).
    #[must_use]
    pub fn cell_bbox(&self, cell: CellIndex, layer: Option<LayerIndex>) -> Rect {
        self.bbox_table()
            .get(&(cell, layer))
            .copied()
            .unwrap_or_else(Rect::empty)
    }

    /// Returns a copy of this layout expressed in a finer database unit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DbuMismatch`] unless `dbu` divides this layout's unit by an
    /// integer factor.
    pub fn scaled_to(&self, dbu: f64) -> Result<Layout> {
        let factor = scale_factor(self.dbu, dbu)?;

        let mut scaled = Layout::new(dbu);
        scaled.layers = self.layers.clone();
        for cell in &self.cells {
            let mut copy = Cell::new(&cell.name);
            for (layer, shapes) in &cell.shapes {
                let target = Shapes::new();
                for r in shapes.iter() {
                    target.insert(r.scaled(factor));
                }
                copy.shapes.insert(*layer, target);
            }
            copy.instances = cell
                .instances
                .iter()
                .map(|i| Instance {
                    cell: i.cell,
                    trans: Trans::new(
                        i.trans.orientation,
                        Point::new(i.trans.disp.x * factor, i.trans.disp.y * factor),
                    ),
                    array: i.array.map(|a| ArrayRepetition {
                        column_step: Point::new(a.column_step.x * factor, a.column_step.y * factor),
                        row_step: Point::new(a.row_step.x * factor, a.row_step.y * factor),
                        ..a
                    }),
                })
                .collect();
            scaled.cells.push(copy);
        }
        Ok(scaled)
    }
}

/// Integer ratio between a coarse and a fine database unit.
///
/// # Errors
///
/// Returns [`Error::DbuMismatch`] if the ratio is not a positive integer.
#[allow(clippy::cast_possible_truncation)]
pub fn scale_factor(coarse: f64, fine: f64) -> Result<Coord> {
    if coarse <= 0.0 || fine <= 0.0 {
        return Err(Error::DbuMismatch {
            first: coarse,
            second: fine,
        });
    }
    let ratio = coarse / fine;
    let factor = ratio.round();
    if factor < 1.0 || (ratio - factor).abs() > 1e-6 * ratio {
        return Err(Error::DbuMismatch {
            first: coarse,
            second: fine,
        });
    }
    Ok(factor as Coord)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Orientation;

    fn sample() -> (Layout, CellIndex, CellIndex, LayerIndex) {
        let mut layout = Layout::new(0.001);
        let l1 = layout.insert_layer(LayerInfo::new(1, 0));
        let top = layout.add_cell("TOP").unwrap();
        let child = layout.add_cell("CHILD").unwrap();
        layout.insert(child, l1, Rect::new(0, 0, 10, 5)).unwrap();
        layout
            .insert_instance(top, Instance::new(child, Trans::displacement(100, 100)))
            .unwrap();
        (layout, top, child, l1)
    }

    #[test]
    fn test_top_cells() {
        let (layout, top, _, _) = sample();
        assert_eq!(layout.top_cells(), vec![top]);
    }

    #[test]
    fn test_duplicate_cell() {
        let (mut layout, _, _, _) = sample();
        assert!(matches!(layout.add_cell("TOP"), Err(Error::DuplicateCell(_))));
        assert_eq!(layout.unique_cell_name("TOP"), "TOP$1");
        assert_eq!(layout.unique_cell_name("OTHER"), "OTHER");
    }

    #[test]
    fn test_recursive_instance_rejected() {
        let (mut layout, top, child, _) = sample();
        let result = layout.insert_instance(child, Instance::new(top, Trans::default()));
        assert!(matches!(result, Err(Error::RecursiveHierarchy(_))));
        let result = layout.insert_instance(child, Instance::new(child, Trans::default()));
        assert!(matches!(result, Err(Error::RecursiveHierarchy(_))));
    }

    #[test]
    fn test_empty_array_rejected() {
        let (mut layout, top, child, l1) = sample();
        let mut empty = Instance::array(
            child,
            Trans::default(),
            1,
            3,
            Point::new(20, 0),
            Point::new(0, 20),
        );
        if let Some(array) = empty.array.as_mut() {
            array.columns = 0;
        }
        assert_eq!(empty.size(), 0);
        assert!(empty.corner_placements().is_empty());

        let result = layout.insert_instance(top, empty);
        assert!(matches!(result, Err(Error::EmptyArray(name)) if name == "CHILD"));
        assert_eq!(layout.cell(top).unwrap().instances().len(), 1);
        assert_eq!(layout.cell_bbox(top, Some(l1)), Rect::new(100, 100, 110, 105));
    }

    #[test]
    fn test_running_iterator_reads_bbox_snapshot() {
        let (mut layout, top, child, l1) = sample();
        layout
            .insert_instance(
                top,
                Instance::array(child, Trans::default(), 4, 4, Point::new(20, 0), Point::new(0, 20)),
            )
            .unwrap();
        assert!(Arc::ptr_eq(&layout.bbox_table(), &layout.bbox_table()));

        let mut iter = crate::db::RecursiveShapeIterator::new(&layout, top, l1);
        assert!(iter.next().is_some());
        let _guard = layout.bboxes.lock().unwrap();
        assert_eq!(iter.count(), 16);
    }

    #[test]
    fn test_cell_bbox_and_invalidation() {
        let (mut layout, top, child, l1) = sample();
        assert_eq!(layout.cell_bbox(top, Some(l1)), Rect::new(100, 100, 110, 105));
        assert_eq!(layout.cell_bbox(top, None), Rect::new(100, 100, 110, 105));

        layout.insert(child, l1, Rect::new(-5, 0, 0, 5)).unwrap();
        assert_eq!(layout.cell_bbox(top, Some(l1)), Rect::new(95, 100, 110, 105));
    }

    #[test]
    fn test_array_bbox_and_placements() {
        let (mut layout, top, child, l1) = sample();
        let array = Instance::array(
            child,
            Trans::new(Orientation::R90, Point::new(0, 0)),
            3,
            2,
            Point::new(20, 0),
            Point::new(0, 30),
        );
        assert_eq!(array.size(), 6);
        assert_eq!(array.placements().count(), 6);

        layout.insert_instance(top, array).unwrap();
        // R90 turns (0,0;10,5) into (-5,0;0,10)
        assert_eq!(
            layout.cell_bbox(top, Some(l1)),
            Rect::new(-5, 0, 110, 105)
        );
    }

    #[test]
    fn test_transaction_defers_invalidation() {
        let (mut layout, top, child, l1) = sample();
        layout.prepare_shapes(child, l1).unwrap();
        let before = layout.cell_bbox(top, Some(l1));

        layout.start_changes();
        assert!(layout.is_under_construction());
        layout
            .insert_shape(child, l1, Rect::new(0, 0, 50, 50))
            .unwrap();
        assert_eq!(layout.cell_bbox(top, Some(l1)), before);
        layout.end_changes();

        assert!(!layout.is_under_construction());
        assert_eq!(
            layout.cell_bbox(top, Some(l1)),
            Rect::new(100, 100, 150, 150)
        );
    }

    #[test]
    fn test_insert_shape_requires_prepared_slot() {
        let (layout, top, _, l1) = sample();
        let result = layout.insert_shape(top, l1, Rect::new(0, 0, 1, 1));
        assert!(matches!(result, Err(Error::InvalidLayer(_))));
    }

    #[test]
    fn test_scaled_to() {
        let (layout, top, _, l1) = sample();
        let scaled = layout.scaled_to(0.0005).unwrap();
        assert_eq!(scaled.dbu(), 0.0005);
        assert_eq!(
            scaled.cell_bbox(top, Some(l1)),
            Rect::new(200, 200, 220, 210)
        );
        assert!(matches!(
            layout.scaled_to(0.0003),
            Err(Error::DbuMismatch { .. })
        ));
    }

    #[test]
    fn test_concurrent_insert() {
        let (mut layout, top, _, l1) = sample();
        layout.prepare_shapes(top, l1).unwrap();
        let layout = &layout;

        std::thread::scope(|s| {
            for t in 0..4 {
                s.spawn(move || {
                    for i in 0..100 {
                        layout
                            .insert_shape(top, l1, Rect::new(i, t * 10, i + 1, t * 10 + 1))
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(layout.cell(top).unwrap().shapes(l1).unwrap().len(), 400);
    }
}
