use crate::db::{
    CellIndex, Coord, Instance, LayerIndex, LayerInfo, Layout, Orientation, Point, Rect, Trans,
};

/// A layout with a single box on layer 1/0 in cell `TOP`.
pub fn square_layout(rect: Rect) -> (Layout, LayerIndex) {
    let mut layout = Layout::new(0.001);
    let layer = layout.insert_layer(LayerInfo::new(1, 0));
    let top = layout.add_cell("TOP").unwrap();
    layout.insert(top, layer, rect).unwrap();
    (layout, layer)
}

/// `TOP` holding an `nx x ny` array (pitch 20) of `LEAF`, a 10x10 box plus an optional extra
/// box, on layer 1/0.
pub fn arrayed_layout(nx: u32, ny: u32, extra: Option<Rect>) -> (Layout, LayerIndex) {
    let mut layout = Layout::new(0.001);
    let layer = layout.insert_layer(LayerInfo::new(1, 0));
    let top = layout.add_cell("TOP").unwrap();
    let leaf = layout.add_cell("LEAF").unwrap();
    layout.insert(leaf, layer, Rect::new(0, 0, 10, 10)).unwrap();
    if let Some(extra) = extra {
        layout.insert(leaf, layer, extra).unwrap();
    }
    layout
        .insert_instance(
            top,
            Instance::array(
                leaf,
                Trans::default(),
                nx,
                ny,
                Point::new(20, 0),
                Point::new(0, 20),
            ),
        )
        .unwrap();
    (layout, layer)
}

/// Deterministic pseudo random boxes.
pub struct BoxSource {
    state: u64,
}

impl BoxSource {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_mul(6364136223846793005).wrapping_add(1),
        }
    }

    fn next(&mut self, bound: Coord) -> Coord {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.state >> 33) % bound as u64) as Coord
    }

    pub fn rect(&mut self, extent: Coord, max_size: Coord) -> Rect {
        let x = self.next(extent);
        let y = self.next(extent);
        let w = 5 + self.next(max_size);
        let h = 5 + self.next(max_size);
        Rect::new(x, y, x + w, y + h)
    }
}

/// A small but non-trivial hierarchy on layers 1/0 and 2/0.
///
/// `LEAF` (an L shape) is arrayed inside `MACRO`, which is placed three times in `TOP` with
/// different orientations. `TOP` also carries scattered boxes that straddle tile boundaries.
/// The `variant` flag introduces a handful of differences: a tab on `LEAF`, shifted scattered
/// boxes and a longer bar on layer 2/0.
pub fn mixed_layout(variant: bool) -> (Layout, CellIndex, LayerIndex, LayerIndex) {
    let mut layout = Layout::new(0.001);
    let l1 = layout.insert_layer(LayerInfo::new(1, 0));
    let l2 = layout.insert_layer(LayerInfo::new(2, 0));
    let top = layout.add_cell("TOP").unwrap();
    let macro_cell = layout.add_cell("MACRO").unwrap();
    let leaf = layout.add_cell("LEAF").unwrap();

    layout.insert(leaf, l1, Rect::new(0, 0, 40, 10)).unwrap();
    layout.insert(leaf, l1, Rect::new(0, 0, 10, 40)).unwrap();
    if variant {
        layout.insert(leaf, l1, Rect::new(40, 0, 45, 5)).unwrap();
    }

    layout
        .insert_instance(
            macro_cell,
            Instance::array(
                leaf,
                Trans::default(),
                3,
                3,
                Point::new(60, 0),
                Point::new(0, 60),
            ),
        )
        .unwrap();
    layout
        .insert(macro_cell, l1, Rect::new(0, -20, 180, -10))
        .unwrap();

    for trans in [
        Trans::displacement(0, 0),
        Trans::new(Orientation::R90, Point::new(600, 100)),
        Trans::new(Orientation::M0, Point::new(1000, 1000)),
    ] {
        layout
            .insert_instance(top, Instance::new(macro_cell, trans))
            .unwrap();
    }

    let mut source = BoxSource::new(7);
    for i in 0..40 {
        let rect = source.rect(1400, 120);
        let rect = if variant && i % 7 == 0 {
            rect.moved(Point::new(3, 0))
        } else {
            rect
        };
        layout.insert(top, l1, rect).unwrap();
    }

    let bar_end = if variant { 905 } else { 900 };
    layout
        .insert(top, l2, Rect::new(100, 1200, bar_end, 1230))
        .unwrap();

    (layout, top, l1, l2)
}
