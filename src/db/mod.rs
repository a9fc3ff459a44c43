//! Layout database and geometry primitives.
//!
//! This module provides the collaborators the comparison engines are built on:
//!
//! - [`Rect`], [`Point`] and [`Trans`]: integer geometry on the database grid
//! - [`Region`]: a mergeable set of rectilinear shapes with boolean and sizing operations
//! - [`Layout`]: a hierarchical cell database with per-layer shape storage
//! - [`RecursiveShapeIterator`]: lazy flattening of a cell subtree
//!
//! Only rectilinear (Manhattan) geometry is supported.

mod geometry;
mod iter;
mod layout;
mod region;
mod trans;

pub use geometry::{Coord, Point, Rect};
pub use iter::RecursiveShapeIterator;
pub use layout::{
    scale_factor, ArrayRepetition, Cell, CellIndex, Instance, LayerIndex, LayerInfo, Layout,
    Shapes,
};
pub use region::{Polygon, Region};
pub use trans::{Orientation, Trans};
