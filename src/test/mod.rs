//! Shared fixtures for unit tests.

pub mod factories;

use crate::db::{CellIndex, LayerIndex, Layout, RecursiveShapeIterator, Region};

/// The merged, flattened content of `cell` on `layer`.
pub fn layer_region(layout: &Layout, cell: CellIndex, layer: LayerIndex) -> Region {
    RecursiveShapeIterator::new(layout, cell, layer)
        .into_region()
        .merged()
}

/// The merged, flattened content of the layer with the given number in the first top cell.
pub fn output_region(layout: &Layout, layer: i32, datatype: i32) -> Region {
    let Some(index) = layout.find_layer(layer, datatype) else {
        return Region::new();
    };
    layout
        .top_cells()
        .first()
        .map(|top| layer_region(layout, *top, index))
        .unwrap_or_default()
}
